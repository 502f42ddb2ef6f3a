pub mod audio;
pub mod completion;
pub mod config;
pub mod error;
pub mod session;
pub mod speech;
pub mod store;
pub mod transport;

pub use audio::{AudioBackend, AudioChunk, AudioFrame, CapturePipeline, FileBackend, MicrophoneConstraints};
pub use completion::{CompletionHandler, Evaluator, HttpEvaluator, Outcome};
pub use config::Config;
pub use error::SessionError;
pub use session::{
    CallState, SessionBackends, SessionConfig, SessionControl, SessionMode, SessionOptions,
    SessionStats, SessionUpdate, TranscriptEntry, VoiceSession,
};
pub use speech::{CommandEngine, SpeechEngine, SpeechOutput};
pub use store::{JsonFileStore, MemoryStore, RecordStore};
pub use transport::{NatsTransport, Transport, TransportEvent, WebSocketTransport};

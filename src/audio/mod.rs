pub mod backend;
pub mod capture;
pub mod chunk;
pub mod file;

pub use backend::{AudioBackend, AudioFrame, MicrophoneConstraints};
pub use capture::{CapturePipeline, CaptureState};
pub use chunk::{AudioChunk, ChunkEncoder};
pub use file::{AudioFile, FileBackend};

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::audio::{AudioBackend, FileBackend, MicrophoneConstraints};
use crate::completion::HttpEvaluator;
use crate::session::SessionOptions;
use crate::speech::{CommandEngine, VoicePreference};
use crate::store::JsonFileStore;
use crate::transport::{NatsTransport, Transport, WebSocketTransport};

#[derive(Debug, Deserialize)]
pub struct Config {
    pub agent: AgentConfig,
    pub audio: AudioConfig,
    pub speech: SpeechConfig,
    pub evaluation: EvaluationConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Websocket,
    Nats,
}

#[derive(Debug, Deserialize)]
pub struct AgentConfig {
    pub transport: TransportKind,
    pub url: String,
    #[serde(default = "default_subject_prefix")]
    pub subject_prefix: String,
    /// Checked before connecting (WebSocket only)
    #[serde(default)]
    pub health_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub chunk_interval_ms: u64,
    #[serde(default = "default_true")]
    pub echo_cancellation: bool,
    #[serde(default = "default_true")]
    pub noise_suppression: bool,
    #[serde(default = "default_true")]
    pub auto_gain_control: bool,
    /// WAV file played in place of a microphone
    #[serde(default)]
    pub input_file: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
pub struct SpeechConfig {
    pub program: String,
    pub language: String,
    #[serde(default)]
    pub preferred_voices: Vec<String>,
    #[serde(default)]
    pub rate: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct EvaluationConfig {
    pub url: String,
    #[serde(default = "default_evaluation_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct StoreConfig {
    pub path: PathBuf,
}

fn default_subject_prefix() -> String {
    "interview".to_string()
}

fn default_true() -> bool {
    true
}

fn default_evaluation_timeout() -> u64 {
    120
}

impl Config {
    /// Load `path` (extension optional) with `INTERVIEW_AGENT__SECTION__KEY` overrides
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("INTERVIEW_AGENT").separator("__"))
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would stall or break audio processing
    pub fn validate(&self) -> Result<()> {
        if self.audio.sample_rate == 0 {
            anyhow::bail!("audio.sample_rate must be greater than zero");
        }
        if self.audio.channels == 0 {
            anyhow::bail!("audio.channels must be greater than zero");
        }
        if self.audio.chunk_interval_ms == 0 {
            anyhow::bail!("audio.chunk_interval_ms must be greater than zero");
        }
        Ok(())
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            microphone: MicrophoneConstraints {
                sample_rate: self.audio.sample_rate,
                channels: self.audio.channels,
                echo_cancellation: self.audio.echo_cancellation,
                noise_suppression: self.audio.noise_suppression,
                auto_gain_control: self.audio.auto_gain_control,
                ..MicrophoneConstraints::default()
            },
            chunk_interval: Duration::from_millis(self.audio.chunk_interval_ms),
            voice: VoicePreference {
                preferred: self.speech.preferred_voices.clone(),
                language: self.speech.language.clone(),
            },
        }
    }

    pub fn transport(&self) -> Box<dyn Transport> {
        match self.agent.transport {
            TransportKind::Websocket => {
                let mut transport = WebSocketTransport::new(&self.agent.url);
                if let Some(health) = &self.agent.health_url {
                    transport = transport.with_health_check(health);
                }
                Box::new(transport)
            }
            TransportKind::Nats => Box::new(NatsTransport::new(
                &self.agent.url,
                &self.agent.subject_prefix,
            )),
        }
    }

    pub fn microphone(&self) -> Result<Box<dyn AudioBackend>> {
        let path = self
            .audio
            .input_file
            .as_ref()
            .context(
                "audio.input_file is required: no live microphone backend is built in, \
                 point it at a WAV file to stand in for the microphone",
            )?;
        Ok(Box::new(FileBackend::new(path)))
    }

    pub fn speech_engine(&self) -> Arc<CommandEngine> {
        let mut engine = CommandEngine::new(&self.speech.program);
        if let Some(rate) = self.speech.rate {
            engine = engine.with_rate(rate);
        }
        Arc::new(engine)
    }

    pub fn evaluator(&self) -> Arc<HttpEvaluator> {
        Arc::new(
            HttpEvaluator::new(&self.evaluation.url)
                .with_timeout(Duration::from_secs(self.evaluation.timeout_secs)),
        )
    }

    pub fn store(&self) -> JsonFileStore {
        JsonFileStore::new(&self.store.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &tempfile::TempDir, body: &str) -> String {
        let path = dir.path().join("agent.toml");
        std::fs::write(&path, body).unwrap();
        path.to_string_lossy().into_owned()
    }

    const SAMPLE: &str = r#"
[agent]
transport = "nats"
url = "nats://localhost:4222"

[audio]
sample_rate = 16000
channels = 1
chunk_interval_ms = 500
noise_suppression = false

[speech]
program = "espeak-ng"
language = "en-GB"
preferred_voices = ["Daniel"]

[evaluation]
url = "http://localhost:3000/api/feedback"

[store]
path = "data"
"#;

    #[test]
    fn test_load_with_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let cfg = Config::load(&write_config(&dir, SAMPLE)).unwrap();

        assert_eq!(cfg.agent.transport, TransportKind::Nats);
        assert_eq!(cfg.agent.subject_prefix, "interview");
        assert!(cfg.agent.health_url.is_none());
        assert!(cfg.audio.echo_cancellation);
        assert!(!cfg.audio.noise_suppression);
        assert_eq!(cfg.evaluation.timeout_secs, 120);

        let options = cfg.session_options();
        assert_eq!(options.chunk_interval, Duration::from_millis(500));
        assert_eq!(options.voice.preferred, vec!["Daniel"]);
        assert_eq!(options.voice.language, "en-GB");
        assert!(!options.microphone.noise_suppression);

        assert_eq!(cfg.transport().name(), "nats");
    }

    #[test]
    fn test_microphone_requires_input() {
        let dir = tempfile::TempDir::new().unwrap();
        let cfg = Config::load(&write_config(&dir, SAMPLE)).unwrap();
        let err = cfg.microphone().err().unwrap();
        assert!(err.to_string().contains("audio.input_file is required"));

        let with_input = SAMPLE.replace(
            "noise_suppression = false",
            "noise_suppression = false\ninput_file = \"fixtures/answer.wav\"",
        );
        let cfg = Config::load(&write_config(&dir, &with_input)).unwrap();
        assert_eq!(cfg.microphone().unwrap().name(), "wav-file");
    }

    #[test]
    fn test_load_rejects_zero_audio_values() {
        let dir = tempfile::TempDir::new().unwrap();

        for (from, to, field) in [
            ("chunk_interval_ms = 500", "chunk_interval_ms = 0", "chunk_interval_ms"),
            ("sample_rate = 16000", "sample_rate = 0", "sample_rate"),
            ("channels = 1", "channels = 0", "channels"),
        ] {
            let body = SAMPLE.replace(from, to);
            let err = Config::load(&write_config(&dir, &body)).unwrap_err();
            assert!(
                err.to_string().contains(field),
                "expected {} to be rejected, got: {}",
                field,
                err
            );
        }
    }
}

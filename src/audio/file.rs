use anyhow::{Context, Result};
use hound::WavReader;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::backend::{conform_frame, AudioBackend, AudioFrame, MicrophoneConstraints};

pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path).context("Failed to open WAV file")?;

        let spec = reader.spec();
        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read audio samples")?;

        let duration_seconds =
            samples.len() as f64 / (spec.sample_rate as f64 * spec.channels as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }

    /// Split into frames of `frame_ms`, timestamped from zero
    pub fn frames(&self, frame_ms: u64) -> Vec<AudioFrame> {
        let per_frame =
            (self.sample_rate as u64 * frame_ms / 1000) as usize * self.channels.max(1) as usize;
        if per_frame == 0 {
            return Vec::new();
        }

        self.samples
            .chunks(per_frame)
            .enumerate()
            .map(|(i, chunk)| AudioFrame {
                samples: chunk.to_vec(),
                sample_rate: self.sample_rate,
                channels: self.channels,
                timestamp_ms: i as u64 * frame_ms,
            })
            .collect()
    }
}

/// Plays a WAV file into the capture pipeline in real time.
///
/// Stands in for a live microphone: once the file is exhausted it keeps
/// producing silent frames until released, like a quiet room would.
pub struct FileBackend {
    path: PathBuf,
    feeder: Option<JoinHandle<()>>,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            feeder: None,
        }
    }
}

#[async_trait::async_trait]
impl AudioBackend for FileBackend {
    async fn probe(&self) -> bool {
        tokio::fs::metadata(&self.path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }

    async fn open(&mut self, constraints: &MicrophoneConstraints) -> Result<mpsc::Receiver<AudioFrame>> {
        if self.feeder.is_some() {
            anyhow::bail!("{} is already open", self.path.display());
        }

        let path = self.path.clone();
        let audio = tokio::task::spawn_blocking(move || AudioFile::open(path))
            .await
            .context("Audio file reader panicked")??;

        let frame_ms = constraints.frame_duration_ms.max(1);
        let frames: Vec<AudioFrame> = audio
            .frames(frame_ms)
            .into_iter()
            .map(|f| conform_frame(f, constraints))
            .collect();
        let silence_len = (constraints.sample_rate as u64 * frame_ms / 1000) as usize
            * constraints.channels as usize;
        let sample_rate = constraints.sample_rate;
        let channels = constraints.channels;

        let (tx, rx) = mpsc::channel(100);

        let feeder = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(frame_ms));
            let mut timestamp_ms = 0;
            let mut frames = frames.into_iter();

            loop {
                ticker.tick().await;
                let frame = match frames.next() {
                    Some(mut frame) => {
                        frame.timestamp_ms = timestamp_ms;
                        frame
                    }
                    None => AudioFrame {
                        samples: vec![0; silence_len],
                        sample_rate,
                        channels,
                        timestamp_ms,
                    },
                };
                timestamp_ms += frame_ms;

                if tx.send(frame).await.is_err() {
                    debug!("Frame receiver dropped, file feeder exiting");
                    break;
                }
            }
        });

        self.feeder = Some(feeder);
        info!("Microphone stand-in opened: {}", self.path.display());
        Ok(rx)
    }

    async fn release(&mut self) -> Result<()> {
        if let Some(feeder) = self.feeder.take() {
            feeder.abort();
            let _ = feeder.await;
            info!("Microphone stand-in released: {}", self.path.display());
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.feeder.is_some()
    }

    fn name(&self) -> &str {
        "wav-file"
    }
}

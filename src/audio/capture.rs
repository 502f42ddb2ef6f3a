use anyhow::{Context, Result};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::backend::{AudioBackend, AudioFrame, MicrophoneConstraints};
use super::chunk::{AudioChunk, ChunkEncoder};

/// Lifecycle of the capture pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    /// No device held
    Idle,
    /// Device acquired, not emitting
    Ready,
    /// Emitting chunks
    Capturing,
    /// Device held, emission suspended
    Paused,
}

#[derive(Debug)]
enum Control {
    Pause,
    Resume,
    Stop,
}

/// Microphone to timed, encoded chunks.
///
/// Chunks go out through an unbounded channel so that emission never waits on
/// (or calls back into) whoever is stopping the pipeline. Teardown runs in one
/// direction only: signal the worker, let it flush once, then release the device.
pub struct CapturePipeline {
    backend: Box<dyn AudioBackend>,
    constraints: MicrophoneConstraints,
    state: CaptureState,
    frames: Option<mpsc::Receiver<AudioFrame>>,
    control: Option<mpsc::UnboundedSender<Control>>,
    worker: Option<JoinHandle<u64>>,
    chunks_emitted: u64,
}

impl CapturePipeline {
    pub fn new(backend: Box<dyn AudioBackend>, constraints: MicrophoneConstraints) -> Self {
        Self {
            backend,
            constraints,
            state: CaptureState::Idle,
            frames: None,
            control: None,
            worker: None,
            chunks_emitted: 0,
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    /// True while chunks are being produced
    pub fn is_emitting(&self) -> bool {
        self.state == CaptureState::Capturing
    }

    /// Chunks emitted by completed capture runs
    pub fn chunks_emitted(&self) -> u64 {
        self.chunks_emitted
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Ask the backend whether a microphone can be used
    pub async fn probe(&self) -> bool {
        self.backend.probe().await
    }

    /// Acquire the microphone with the configured constraints
    pub async fn initialize(&mut self) -> Result<()> {
        match self.state {
            CaptureState::Idle => {}
            CaptureState::Ready => return Ok(()),
            CaptureState::Capturing | CaptureState::Paused => {
                anyhow::bail!("Capture already running")
            }
        }

        info!(
            "Opening microphone via {} ({}Hz, {}ch, echo_cancellation={}, noise_suppression={})",
            self.backend.name(),
            self.constraints.sample_rate,
            self.constraints.channels,
            self.constraints.echo_cancellation,
            self.constraints.noise_suppression
        );

        let frames = self
            .backend
            .open(&self.constraints)
            .await
            .context("Microphone access failed")?;

        self.frames = Some(frames);
        self.state = CaptureState::Ready;
        Ok(())
    }

    /// Begin emitting one chunk per `chunk_interval` into `sink`
    pub fn start(
        &mut self,
        chunk_interval: Duration,
        sink: mpsc::UnboundedSender<AudioChunk>,
    ) -> Result<()> {
        if self.state != CaptureState::Ready {
            anyhow::bail!("Capture cannot start from {:?}", self.state);
        }
        if chunk_interval.is_zero() {
            anyhow::bail!("Chunk interval must be greater than zero");
        }

        let frames = self
            .frames
            .take()
            .context("Microphone stream missing")?;
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let encoder = ChunkEncoder::new(self.constraints.sample_rate, self.constraints.channels);

        self.worker = Some(tokio::spawn(run_worker(
            frames,
            control_rx,
            chunk_interval,
            sink,
            encoder,
        )));
        self.control = Some(control_tx);
        self.state = CaptureState::Capturing;

        info!("Capture started ({}ms chunks)", chunk_interval.as_millis());
        Ok(())
    }

    /// Suspend emission. No-op unless capturing.
    pub fn pause(&mut self) {
        if self.state != CaptureState::Capturing {
            return;
        }
        if let Some(control) = &self.control {
            let _ = control.send(Control::Pause);
        }
        self.state = CaptureState::Paused;
        info!("Capture paused");
    }

    /// Continue emission. No-op unless paused.
    pub fn resume(&mut self) {
        if self.state != CaptureState::Paused {
            return;
        }
        if let Some(control) = &self.control {
            let _ = control.send(Control::Resume);
        }
        self.state = CaptureState::Capturing;
        info!("Capture resumed");
    }

    /// Flush the buffered chunk and release the microphone. Idempotent.
    pub async fn stop(&mut self) -> Result<()> {
        if self.state == CaptureState::Idle {
            return Ok(());
        }

        info!("Stopping capture");

        if let Some(control) = self.control.take() {
            let _ = control.send(Control::Stop);
        }

        if let Some(worker) = self.worker.take() {
            match worker.await {
                Ok(emitted) => self.chunks_emitted += emitted,
                Err(e) => error!("Capture worker panicked: {}", e),
            }
        }

        self.frames = None;
        self.state = CaptureState::Idle;

        self.backend
            .release()
            .await
            .context("Failed to release microphone")?;

        info!("Microphone released");
        Ok(())
    }
}

async fn run_worker(
    mut frames: mpsc::Receiver<AudioFrame>,
    mut control: mpsc::UnboundedReceiver<Control>,
    chunk_interval: Duration,
    sink: mpsc::UnboundedSender<AudioChunk>,
    mut encoder: ChunkEncoder,
) -> u64 {
    let mut ticker = interval_at(Instant::now() + chunk_interval, chunk_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut paused = false;

    loop {
        tokio::select! {
            biased;

            cmd = control.recv() => match cmd {
                Some(Control::Pause) => paused = true,
                Some(Control::Resume) => {
                    paused = false;
                    ticker.reset();
                }
                Some(Control::Stop) | None => break,
            },

            frame = frames.recv() => match frame {
                Some(frame) => {
                    if !paused {
                        encoder.push(&frame);
                    }
                }
                None => {
                    warn!("Microphone stream ended");
                    break;
                }
            },

            _ = ticker.tick(), if !paused => emit(&mut encoder, &sink),
        }
    }

    // Frames captured before the stop belong in the last chunk
    if !paused {
        while let Ok(frame) = frames.try_recv() {
            encoder.push(&frame);
        }
    }

    // Final flush, exactly once per run
    emit(&mut encoder, &sink);

    debug!("Capture worker exiting after {} chunks", encoder.chunks_sealed());
    encoder.chunks_sealed()
}

fn emit(encoder: &mut ChunkEncoder, sink: &mpsc::UnboundedSender<AudioChunk>) {
    match encoder.seal() {
        Ok(Some(chunk)) => {
            debug!(
                "Chunk {} ready: {}ms - {}ms ({} samples)",
                chunk.sequence, chunk.start_ms, chunk.end_ms, chunk.sample_count
            );
            if sink.send(chunk).is_err() {
                debug!("Chunk receiver dropped");
            }
        }
        Ok(None) => {}
        Err(e) => error!("Failed to encode audio chunk: {}", e),
    }
}

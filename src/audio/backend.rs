use anyhow::Result;
use tokio::sync::mpsc;

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

/// Parameters requested when the microphone is opened
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MicrophoneConstraints {
    /// Target sample rate (backends resample if needed)
    pub sample_rate: u32,
    /// Target channel count (1 = mono)
    pub channels: u16,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
    /// Frame size in milliseconds (affects latency)
    pub frame_duration_ms: u64,
}

impl Default for MicrophoneConstraints {
    fn default() -> Self {
        Self {
            sample_rate: 16000, // speech models expect 16kHz
            channels: 1,        // Mono
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
            frame_duration_ms: 100,
        }
    }
}

/// Microphone backend trait
///
/// Implementations:
/// - File: stream a WAV file as if it were a live microphone
/// - Tests: scripted fakes
#[async_trait::async_trait]
pub trait AudioBackend: Send + Sync {
    /// Whether a device exists and may be used. Never fails.
    async fn probe(&self) -> bool;

    /// Acquire the device and start producing frames
    ///
    /// Returns a channel receiver that will receive audio frames
    async fn open(&mut self, constraints: &MicrophoneConstraints) -> Result<mpsc::Receiver<AudioFrame>>;

    /// Release the device. Safe to call when nothing is held.
    async fn release(&mut self) -> Result<()>;

    /// Check if the device is currently held
    fn is_open(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Resample by linear interpolation between neighbouring samples.
///
/// Works for any rate pair (44.1kHz -> 16kHz included). A zero rate on either
/// side leaves the frame untouched.
pub fn resample_frame(frame: AudioFrame, target_rate: u32) -> AudioFrame {
    if frame.sample_rate == target_rate || target_rate == 0 || frame.sample_rate == 0 {
        return frame;
    }

    let channels = frame.channels.max(1) as usize;
    let in_len = frame.samples.len() / channels;
    let out_len = (in_len as u64 * target_rate as u64 / frame.sample_rate as u64) as usize;
    let step = frame.sample_rate as f64 / target_rate as f64;

    let mut samples = Vec::with_capacity(out_len * channels);
    for i in 0..out_len {
        let pos = i as f64 * step;
        let idx = pos as usize;
        let frac = pos - idx as f64;
        let next = (idx + 1).min(in_len - 1);
        for ch in 0..channels {
            let a = frame.samples[idx * channels + ch] as f64;
            let b = frame.samples[next * channels + ch] as f64;
            samples.push((a + (b - a) * frac).round() as i16);
        }
    }

    AudioFrame {
        samples,
        sample_rate: target_rate,
        channels: frame.channels,
        timestamp_ms: frame.timestamp_ms,
    }
}

/// Convert stereo to mono by averaging channels
pub fn stereo_to_mono(frame: AudioFrame) -> AudioFrame {
    if frame.channels != 2 {
        return frame; // Only support stereo -> mono
    }

    let mono_samples = frame
        .samples
        .chunks_exact(2)
        .map(|pair| ((pair[0] as i32 + pair[1] as i32) / 2) as i16)
        .collect();

    AudioFrame {
        samples: mono_samples,
        sample_rate: frame.sample_rate,
        channels: 1,
        timestamp_ms: frame.timestamp_ms,
    }
}

/// Bring a frame to the requested format
pub fn conform_frame(frame: AudioFrame, constraints: &MicrophoneConstraints) -> AudioFrame {
    let mut processed = frame;

    if processed.channels != constraints.channels && constraints.channels == 1 {
        processed = stereo_to_mono(processed);
    }

    if processed.sample_rate != constraints.sample_rate {
        processed = resample_frame(processed, constraints.sample_rate);
    }

    processed
}

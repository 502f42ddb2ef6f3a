use anyhow::{Context, Result};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{SpeechEngine, Voice};

/// Speaks through an `espeak-ng` compatible program.
///
/// The synthesizer process is killed if the utterance is cancelled.
pub struct CommandEngine {
    program: String,
    /// Words per minute, passed as `-s`
    rate: Option<u32>,
}

impl CommandEngine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            rate: None,
        }
    }

    pub fn with_rate(mut self, words_per_minute: u32) -> Self {
        self.rate = Some(words_per_minute);
        self
    }
}

#[async_trait::async_trait]
impl SpeechEngine for CommandEngine {
    async fn probe(&self) -> bool {
        Command::new(&self.program)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    async fn voices(&self) -> Vec<Voice> {
        let output = match Command::new(&self.program).arg("--voices").output().await {
            Ok(output) if output.status.success() => output,
            Ok(output) => {
                warn!("{} --voices exited with {}", self.program, output.status);
                return Vec::new();
            }
            Err(e) => {
                warn!("Failed to list voices from {}: {}", self.program, e);
                return Vec::new();
            }
        };

        parse_voice_list(&String::from_utf8_lossy(&output.stdout))
    }

    async fn speak(&self, text: &str, voice: Option<&Voice>) -> Result<()> {
        let mut command = Command::new(&self.program);
        if let Some(voice) = voice {
            command.arg("-v").arg(&voice.name);
        }
        if let Some(rate) = self.rate {
            command.arg("-s").arg(rate.to_string());
        }

        debug!("{} speaking {} chars", self.program, text.len());

        let status = command
            .arg(text)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await
            .with_context(|| format!("Failed to run {}", self.program))?;

        if !status.success() {
            anyhow::bail!("{} exited with {}", self.program, status);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.program
    }
}

/// Parse the table printed by `espeak-ng --voices`
fn parse_voice_list(listing: &str) -> Vec<Voice> {
    listing
        .lines()
        .skip(1)
        .filter_map(|line| {
            let mut columns = line.split_whitespace();
            let _priority = columns.next()?;
            let language = columns.next()?;
            let _age_gender = columns.next()?;
            let name = columns.next()?;
            Some(Voice::new(name, language))
        })
        .collect()
}

use std::process::Stdio;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::providers::AudioClip;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("Device unavailable: {0}")]
    Unavailable(String),

    #[error("Recording failed: {0}")]
    Recording(String),

    #[error("Playback failed: {0}")]
    Playback(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Source of recorded audio. Opening it claims the device until the returned
/// recording is released.
#[async_trait]
pub trait Microphone: Send + Sync {
    async fn open(&self) -> Result<Box<dyn Recording>, DeviceError>;
}

#[async_trait]
pub trait Recording: Send {
    /// Stop capturing and hand back everything recorded so far.
    async fn stop(&mut self) -> Result<AudioClip, DeviceError>;

    /// Give the device back. Called exactly once per recording.
    fn release(&mut self);
}

#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Play `clip` until it ends or `cancel` fires.
    async fn play(&self, clip: AudioClip, cancel: CancellationToken) -> Result<(), DeviceError>;
}

fn split_command(argv: &[String]) -> Result<(&String, &[String]), DeviceError> {
    argv.split_first()
        .ok_or_else(|| DeviceError::Unavailable("No command configured".to_string()))
}

/// Records by running an external program that writes audio to stdout
/// (e.g. `arecord -f cd -t wav -`).
pub struct CommandMicrophone {
    argv: Vec<String>,
    mime_type: String,
}

impl CommandMicrophone {
    pub fn new(argv: Vec<String>, mime_type: impl Into<String>) -> Self {
        Self {
            argv,
            mime_type: mime_type.into(),
        }
    }
}

#[async_trait]
impl Microphone for CommandMicrophone {
    async fn open(&self) -> Result<Box<dyn Recording>, DeviceError> {
        let (program, args) = split_command(&self.argv)?;
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DeviceError::Unavailable(format!("{}: {}", program, e)))?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| DeviceError::Unavailable("Recorder has no stdout".to_string()))?;

        let reader = tokio::spawn(async move {
            let mut buffer = BytesMut::new();
            let mut chunk = [0u8; 8192];
            loop {
                let n = stdout.read(&mut chunk).await?;
                if n == 0 {
                    break;
                }
                buffer.extend_from_slice(&chunk[..n]);
            }
            Ok::<Bytes, std::io::Error>(buffer.freeze())
        });

        tracing::debug!(recorder = %program, "Recording started");
        Ok(Box::new(CommandRecording {
            child,
            reader: Some(reader),
            mime_type: self.mime_type.clone(),
        }))
    }
}

struct CommandRecording {
    child: Child,
    reader: Option<JoinHandle<std::io::Result<Bytes>>>,
    mime_type: String,
}

#[async_trait]
impl Recording for CommandRecording {
    async fn stop(&mut self) -> Result<AudioClip, DeviceError> {
        // Killing the recorder closes its stdout, which ends the reader.
        self.child.start_kill()?;
        let _ = self.child.wait().await;

        let reader = self
            .reader
            .take()
            .ok_or_else(|| DeviceError::Recording("Recording already stopped".to_string()))?;
        let data = reader
            .await
            .map_err(|e| DeviceError::Recording(e.to_string()))??;

        if data.is_empty() {
            return Err(DeviceError::Recording("No audio captured".to_string()));
        }
        Ok(AudioClip::new(self.mime_type.clone(), data))
    }

    fn release(&mut self) {
        let _ = self.child.start_kill();
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

/// Plays by piping audio into an external program (e.g. `ffplay -nodisp -autoexit -`).
pub struct CommandAudioSink {
    argv: Vec<String>,
}

impl CommandAudioSink {
    pub fn new(argv: Vec<String>) -> Self {
        Self { argv }
    }
}

#[async_trait]
impl AudioSink for CommandAudioSink {
    async fn play(&self, clip: AudioClip, cancel: CancellationToken) -> Result<(), DeviceError> {
        let (program, args) = split_command(&self.argv)?;
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DeviceError::Unavailable(format!("{}: {}", program, e)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| DeviceError::Playback("Player has no stdin".to_string()))?;

        let feed = async move {
            stdin.write_all(&clip.data).await?;
            stdin.shutdown().await
        };

        let finished = tokio::select! {
            _ = cancel.cancelled() => None,
            result = async {
                feed.await?;
                child.wait().await
            } => Some(result),
        };

        match finished {
            None => {
                let _ = child.start_kill();
                Ok(())
            }
            Some(result) => {
                let status = result?;
                if status.success() {
                    Ok(())
                } else {
                    Err(DeviceError::Playback(format!("{} exited with {}", program, status)))
                }
            }
        }
    }
}

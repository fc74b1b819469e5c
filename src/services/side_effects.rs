use tokio::sync::mpsc;

/// Outcome of a background task started off the critical path.
#[derive(Debug, Clone, PartialEq)]
pub enum SideEffectReport {
    SkillsExtracted {
        conversation_id: String,
        skills: Vec<String>,
    },
    ExtractionFailed {
        conversation_id: String,
        error: String,
    },
    NarrationFinished,
    NarrationStopped,
    NarrationFailed {
        error: String,
    },
}

/// Where best-effort tasks report. Every report is logged; when built with
/// [`SideEffectSink::channel`] it is also forwarded to a receiver.
#[derive(Debug, Clone, Default)]
pub struct SideEffectSink {
    tx: Option<mpsc::UnboundedSender<SideEffectReport>>,
}

impl SideEffectSink {
    pub fn logging() -> Self {
        Self { tx: None }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SideEffectReport>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    pub fn report(&self, report: SideEffectReport) {
        match &report {
            SideEffectReport::SkillsExtracted {
                conversation_id,
                skills,
            } => {
                tracing::info!(%conversation_id, ?skills, "Recorded skills from reply");
            }
            SideEffectReport::ExtractionFailed {
                conversation_id,
                error,
            } => {
                tracing::warn!(%conversation_id, "Skill extraction failed: {}", error);
            }
            SideEffectReport::NarrationFinished => tracing::debug!("Narration finished"),
            SideEffectReport::NarrationStopped => tracing::debug!("Narration stopped"),
            SideEffectReport::NarrationFailed { error } => {
                tracing::warn!("Narration failed: {}", error);
            }
        }

        if let Some(tx) = &self.tx {
            // Receiver gone means nobody is listening any more
            let _ = tx.send(report);
        }
    }
}

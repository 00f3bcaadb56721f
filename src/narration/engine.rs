use anyhow::Result;
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

use super::VoiceProfile;

pub type UtteranceId = u64;

/// One block of text submitted to a narration engine.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Utterance {
    pub id: UtteranceId,
    pub text: String,
    pub language_tag: String,
    /// `None` when no installed voice matched; engines may still honor `language_tag`.
    pub voice: Option<VoiceProfile>,
    pub rate: f32,
    pub pitch: f32,
}

/// Playback lifecycle reported asynchronously by an engine.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum NarrationEvent {
    Started { id: UtteranceId },
    Ended { id: UtteranceId },
    Cancelled { id: UtteranceId },
    Failed { id: UtteranceId, reason: String },
}

impl NarrationEvent {
    pub fn id(&self) -> UtteranceId {
        match self {
            Self::Started { id }
            | Self::Ended { id }
            | Self::Cancelled { id }
            | Self::Failed { id, .. } => *id,
        }
    }

    /// Whether the utterance is finished after this event.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Started { .. })
    }
}

/// Host speech capability. Shared process-wide, so callers must cancel before speaking.
pub trait NarrationEngine: Send + Sync {
    /// Voices currently known to the engine; may be empty while the host is still loading them.
    fn voices(&self) -> Vec<VoiceProfile>;

    /// Queues `utterance` and returns without waiting for playback.
    fn speak(&self, utterance: Utterance, events: UnboundedSender<NarrationEvent>) -> Result<()>;

    fn cancel(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_started_is_non_terminal() {
        assert!(!NarrationEvent::Started { id: 1 }.is_terminal());
        assert!(NarrationEvent::Ended { id: 1 }.is_terminal());
        assert!(NarrationEvent::Cancelled { id: 1 }.is_terminal());
        assert!(NarrationEvent::Failed {
            id: 2,
            reason: "device busy".into()
        }
        .is_terminal());
        assert_eq!(NarrationEvent::Cancelled { id: 9 }.id(), 9);
    }
}

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex, PoisonError,
};

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, UnboundedSender};

use crate::error::NarrationError;

use super::{
    engine::{NarrationEngine, NarrationEvent, Utterance, UtteranceId},
    VoiceResolver,
};

/// Slightly below normal speed for clarity.
pub const DEFAULT_RATE: f32 = 0.9;
pub const DEFAULT_PITCH: f32 = 1.0;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NarrationRequest {
    pub text: String,
    /// Active UI locale, e.g. `hi` or `hi-IN`.
    pub requested_language_tag: String,
    pub use_fallback: bool,
}

/// Plays at most one narration at a time on a shared engine.
#[derive(Clone)]
pub struct NarrationController {
    engine: Option<Arc<dyn NarrationEngine>>,
    active: Arc<Mutex<Option<UtteranceId>>>,
    /// Held from cancel through submit so competing callers never overlap audio.
    turn: Arc<Mutex<()>>,
    next_id: Arc<AtomicU64>,
    events_tx: UnboundedSender<NarrationEvent>,
    rate: f32,
    pitch: f32,
}

impl NarrationController {
    /// `None` models a host without speech support. Must be called inside a Tokio runtime.
    pub fn new(engine: Option<Arc<dyn NarrationEngine>>) -> Self {
        let (events_tx, mut events_rx) = mpsc::unbounded_channel::<NarrationEvent>();
        let active = Arc::new(Mutex::new(None::<UtteranceId>));

        let listener_active = active.clone();
        tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                let mut current = listener_active
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                if *current != Some(event.id()) {
                    debug!("Ignoring {:?} for superseded utterance", event);
                    continue;
                }
                match &event {
                    NarrationEvent::Started { id } => debug!("Narration {id} started"),
                    NarrationEvent::Ended { id } => debug!("Narration {id} finished"),
                    NarrationEvent::Cancelled { id } => debug!("Narration {id} cancelled"),
                    NarrationEvent::Failed { id, reason } => {
                        error!("Narration {id} failed: {reason}")
                    }
                }
                if event.is_terminal() {
                    *current = None;
                }
            }
        });

        Self {
            engine,
            active,
            turn: Arc::new(Mutex::new(())),
            next_id: Arc::new(AtomicU64::new(1)),
            events_tx,
            rate: DEFAULT_RATE,
            pitch: DEFAULT_PITCH,
        }
    }

    pub fn with_voice(mut self, rate: f32, pitch: f32) -> Self {
        self.rate = rate;
        self.pitch = pitch;
        self
    }

    pub fn is_supported(&self) -> bool {
        self.engine.is_some()
    }

    pub fn is_speaking(&self) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Fire-and-forget narration. Failures are logged, never returned.
    pub fn speak(&self, request: &NarrationRequest) -> Option<UtteranceId> {
        match self.try_speak(request) {
            Ok(id) => Some(id),
            Err(NarrationError::Unsupported) => {
                warn!("Speech synthesis not supported on this host; skipping narration");
                None
            }
            Err(err) => {
                error!("Error in speech synthesis: {err:#}");
                None
            }
        }
    }

    /// Interrupts any current narration, then submits `request`.
    pub fn try_speak(&self, request: &NarrationRequest) -> Result<UtteranceId, NarrationError> {
        let engine = self.engine.as_ref().ok_or(NarrationError::Unsupported)?;

        let _turn = self.turn.lock().unwrap_or_else(PoisonError::into_inner);
        self.interrupt();

        let voices = engine.voices();
        let language_tag =
            VoiceResolver::target_tag(&request.requested_language_tag, request.use_fallback);
        let voice = VoiceResolver::resolve(
            &request.requested_language_tag,
            &voices,
            request.use_fallback,
        )
        .cloned();

        match &voice {
            Some(voice) => info!("Speaking in {language_tag} with voice: {}", voice.name),
            None => info!(
                "No matching voice found for {language_tag} among {} voices; engine picks by language",
                voices.len()
            ),
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let utterance = Utterance {
            id,
            text: request.text.clone(),
            language_tag: language_tag.to_string(),
            voice,
            rate: self.rate,
            pitch: self.pitch,
        };

        *self.active.lock().unwrap_or_else(PoisonError::into_inner) = Some(id);
        if let Err(err) = engine.speak(utterance, self.events_tx.clone()) {
            self.active
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            return Err(NarrationError::Engine(err));
        }
        Ok(id)
    }

    /// Cancels in-flight narration. Safe to call when nothing is playing.
    pub fn stop(&self) {
        let _turn = self.turn.lock().unwrap_or_else(PoisonError::into_inner);
        self.interrupt();
    }

    fn interrupt(&self) {
        if let Some(engine) = &self.engine {
            engine.cancel();
        }
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use anyhow::{bail, Result};
    use tokio::sync::mpsc::UnboundedSender;

    use crate::narration::{
        engine::{NarrationEngine, NarrationEvent, Utterance, UtteranceId},
        VoiceProfile,
    };

    #[derive(Default)]
    struct Recorded {
        spoken: Vec<Utterance>,
        playing: Vec<UtteranceId>,
        cancel_calls: usize,
        events: Option<UnboundedSender<NarrationEvent>>,
    }

    /// In-memory engine that plays until told to finish or cancel.
    #[derive(Default)]
    pub struct RecordingEngine {
        voices: Vec<VoiceProfile>,
        fail_speak: bool,
        inner: Mutex<Recorded>,
    }

    impl RecordingEngine {
        pub fn with_voices(voices: Vec<VoiceProfile>) -> Self {
            Self {
                voices,
                ..Self::default()
            }
        }

        pub fn failing() -> Self {
            Self {
                fail_speak: true,
                ..Self::default()
            }
        }

        pub fn spoken(&self) -> Vec<Utterance> {
            self.inner.lock().unwrap().spoken.clone()
        }

        pub fn playing(&self) -> Vec<UtteranceId> {
            self.inner.lock().unwrap().playing.clone()
        }

        pub fn cancel_calls(&self) -> usize {
            self.inner.lock().unwrap().cancel_calls
        }

        pub fn finish(&self, id: UtteranceId) {
            let mut inner = self.inner.lock().unwrap();
            inner.playing.retain(|playing| *playing != id);
            if let Some(tx) = &inner.events {
                let _ = tx.send(NarrationEvent::Ended { id });
            }
        }
    }

    impl NarrationEngine for RecordingEngine {
        fn voices(&self) -> Vec<VoiceProfile> {
            self.voices.clone()
        }

        fn speak(&self, utterance: Utterance, events: UnboundedSender<NarrationEvent>) -> Result<()> {
            if self.fail_speak {
                bail!("audio device busy");
            }
            let mut inner = self.inner.lock().unwrap();
            let _ = events.send(NarrationEvent::Started { id: utterance.id });
            inner.playing.push(utterance.id);
            inner.spoken.push(utterance);
            inner.events = Some(events);
            Ok(())
        }

        fn cancel(&self) {
            let mut inner = self.inner.lock().unwrap();
            inner.cancel_calls += 1;
            let cancelled: Vec<_> = inner.playing.drain(..).collect();
            if let Some(tx) = &inner.events {
                for id in cancelled {
                    let _ = tx.send(NarrationEvent::Cancelled { id });
                }
            }
        }
    }
}

pub mod controller;
pub mod engine;
pub mod espeak;
pub mod voice;

pub use controller::{NarrationController, NarrationRequest, DEFAULT_PITCH, DEFAULT_RATE};
pub use engine::{NarrationEngine, NarrationEvent, Utterance, UtteranceId};
pub use espeak::EspeakEngine;
pub use voice::{language_tag_for, VoiceProfile, VoiceResolver, BASE_LANGUAGE_TAG};

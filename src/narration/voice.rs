use serde::{Deserialize, Serialize};

/// Tag used when narration is forced to the base language or the locale is unknown.
pub const BASE_LANGUAGE_TAG: &str = "en-US";

/// UI locale code to the BCP-47 tag requested from the narration engine.
const LANGUAGE_TAGS: [(&str, &str); 5] = [
    ("en", "en-US"),
    ("hi", "hi-IN"),
    ("ta", "ta-IN"),
    ("kn", "kn-IN"),
    ("bn", "bn-IN"),
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VoiceProfile {
    pub language_tag: String,
    pub name: String,
}

impl VoiceProfile {
    pub fn new(language_tag: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            language_tag: language_tag.into(),
            name: name.into(),
        }
    }
}

/// Full tag for a locale code. Region suffixes on the input are ignored (`hi-IN` -> `hi`).
pub fn language_tag_for(locale: &str) -> &'static str {
    let code = primary_subtag(locale);
    LANGUAGE_TAGS
        .iter()
        .find(|(short, _)| short.eq_ignore_ascii_case(code))
        .map(|(_, tag)| *tag)
        .unwrap_or(BASE_LANGUAGE_TAG)
}

pub fn primary_subtag(tag: &str) -> &str {
    tag.split(['-', '_']).next().unwrap_or(tag).trim()
}

/// Picks the voice that best matches a requested locale.
///
/// Exact tag matches win; otherwise any voice sharing the primary language
/// subtag is accepted. Tags compare case-insensitively since engines disagree
/// on casing (`en-US` vs `en-us`).
#[derive(Debug, Clone, Copy, Default)]
pub struct VoiceResolver;

impl VoiceResolver {
    /// Tag narration should be spoken in for this request.
    pub fn target_tag(requested: &str, force_fallback: bool) -> &'static str {
        if force_fallback {
            BASE_LANGUAGE_TAG
        } else {
            language_tag_for(requested)
        }
    }

    pub fn resolve<'a>(
        requested: &str,
        voices: &'a [VoiceProfile],
        force_fallback: bool,
    ) -> Option<&'a VoiceProfile> {
        let target = Self::target_tag(requested, force_fallback);
        let language = primary_subtag(target);

        voices
            .iter()
            .find(|voice| voice.language_tag.trim().eq_ignore_ascii_case(target))
            .or_else(|| {
                voices.iter().find(|voice| {
                    primary_subtag(&voice.language_tag).eq_ignore_ascii_case(language)
                })
            })
    }
}

use std::{collections::HashMap, fs, path::Path};

use anyhow::{Context, Result};
use log::{info, warn};

pub const FALLBACK_LOCALE: &str = "en";

/// Locales the interface offers in its language switcher.
pub const SUPPORTED_LOCALES: [&str; 5] = ["en", "hi", "ta", "kn", "bn"];

const EMBEDDED_BUNDLES: [(&str, &str); 5] = [
    ("en", include_str!("../../locales/en.json")),
    ("hi", include_str!("../../locales/hi.json")),
    ("ta", include_str!("../../locales/ta.json")),
    ("kn", include_str!("../../locales/kn.json")),
    ("bn", include_str!("../../locales/bn.json")),
];

/// Resolves a symbolic key to display text for a locale.
pub trait Translator: Send + Sync {
    fn translate(&self, key: &str, locale: &str) -> String;
}

/// Flat key/value bundles per locale, falling back to English and then to the key.
#[derive(Debug, Default, Clone)]
pub struct BundleTranslator {
    bundles: HashMap<String, HashMap<String, String>>,
}

impl BundleTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Translator preloaded with the bundles shipped inside the crate.
    pub fn with_default_bundle() -> Self {
        let mut translator = Self::new();
        for (locale, raw) in EMBEDDED_BUNDLES {
            if let Err(err) = translator.add_bundle_json(locale, raw) {
                warn!("Skipping embedded {locale} bundle: {err:#}");
            }
        }
        translator
    }

    pub fn add_bundle(&mut self, locale: &str, entries: HashMap<String, String>) {
        self.bundles
            .entry(normalize_locale(locale))
            .or_default()
            .extend(entries);
    }

    pub fn add_bundle_json(&mut self, locale: &str, raw: &str) -> Result<()> {
        let entries: HashMap<String, String> = serde_json::from_str(raw)
            .with_context(|| format!("invalid translation bundle for {locale}"))?;
        self.add_bundle(locale, entries);
        Ok(())
    }

    /// Loads every `<locale>.json` file in `dir`, merging over existing entries.
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize> {
        let mut loaded = 0;
        let entries = fs::read_dir(dir)
            .with_context(|| format!("Failed to read locale directory {}", dir.display()))?;

        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let Some(locale) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read bundle {}", path.display()))?;
            self.add_bundle_json(locale, &raw)?;
            loaded += 1;
        }

        info!("Loaded {} translation bundles from {}", loaded, dir.display());
        Ok(loaded)
    }

    fn lookup(&self, locale: &str, key: &str) -> Option<&str> {
        self.bundles
            .get(locale)
            .and_then(|bundle| bundle.get(key))
            .map(String::as_str)
    }
}

impl Translator for BundleTranslator {
    fn translate(&self, key: &str, locale: &str) -> String {
        let locale = normalize_locale(locale);
        self.lookup(&locale, key)
            .or_else(|| self.lookup(FALLBACK_LOCALE, key))
            .unwrap_or(key)
            .to_string()
    }
}

pub fn is_supported_locale(locale: &str) -> bool {
    SUPPORTED_LOCALES.contains(&normalize_locale(locale).as_str())
}

/// Reduces a locale or language tag to its lowercase primary subtag (`hi-IN` -> `hi`).
pub fn normalize_locale(locale: &str) -> String {
    locale
        .split(['-', '_'])
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

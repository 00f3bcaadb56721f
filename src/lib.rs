pub mod catalog;
pub mod detection;
pub mod error;
pub mod i18n;
pub mod identity;
pub mod narration;
pub mod settings;
mod utils;

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{bail, Context, Result};
use log::{info, warn};

use catalog::{DiagnosisCatalog, LocalizedDiagnosis};
use detection::{
    AnyClassifier, Classifier, DetectionController, DetectionSnapshot, DetectionStatus,
    ImageHandle,
};
use error::DetectionError;
use i18n::{is_supported_locale, normalize_locale, BundleTranslator, Translator};
use identity::{EnvIdentity, IdentityProvider};
use narration::{EspeakEngine, NarrationController, NarrationEngine, NarrationRequest, UtteranceId};
use settings::SettingsStore;

/// The leaf detection page: one signed-in user, one detection session, one narrator.
pub struct DetectionFeature<C> {
    user: String,
    detection: DetectionController<C>,
    narration: NarrationController,
    translator: Arc<dyn Translator>,
    settings: Arc<SettingsStore>,
}

impl<C: Classifier> DetectionFeature<C> {
    /// Opens the feature for the current user; signed-out callers are turned away.
    pub fn enter(
        identity: &dyn IdentityProvider,
        classifier: C,
        narration: NarrationController,
        translator: Arc<dyn Translator>,
        settings: Arc<SettingsStore>,
    ) -> Result<Self, DetectionError> {
        let user = identity.current_user().ok_or(DetectionError::Unauthenticated)?;
        let detection = DetectionController::new(classifier, DiagnosisCatalog::new())
            .with_timeout(settings.detection().analysis_timeout());

        info!("{user} entered leaf detection");
        Ok(Self {
            user,
            detection,
            narration,
            translator,
            settings,
        })
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn detection(&self) -> &DetectionController<C> {
        &self.detection
    }

    pub fn narration(&self) -> &NarrationController {
        &self.narration
    }

    pub async fn select_image(&self, image: ImageHandle) -> DetectionSnapshot {
        self.narration.stop();
        self.detection.select_image(image).await
    }

    pub async fn clear_image(&self) -> DetectionSnapshot {
        self.narration.stop();
        self.detection.clear_image().await
    }

    /// Runs one analysis to completion and returns the settled snapshot.
    pub async fn analyze(&self) -> Result<DetectionSnapshot, DetectionError> {
        self.detection.start_analysis().await?;
        let settled = self.detection.wait_for_settled().await;
        match &settled.last_error {
            Some(err) if settled.status != DetectionStatus::Complete => Err(err.clone()),
            _ => Ok(settled),
        }
    }

    /// The diagnosis for the active locale, once analysis has completed.
    pub async fn diagnosis(&self) -> Option<LocalizedDiagnosis> {
        let snapshot = self.detection.snapshot().await;
        if snapshot.status != DetectionStatus::Complete {
            return None;
        }
        let index = snapshot.diagnosis_index?;
        let record = self.detection.catalog().get(index)?;
        Some(record.localize(self.translator.as_ref(), &self.settings.narration().locale))
    }

    /// Speaks the remediation steps for the current diagnosis, interrupting any prior reading.
    pub async fn read_remediations(&self) -> Option<UtteranceId> {
        let Some(diagnosis) = self.diagnosis().await else {
            warn!("No diagnosis to read yet");
            return None;
        };
        let prefs = self.settings.narration();
        self.narration.speak(&NarrationRequest {
            text: diagnosis.remediation_text(),
            requested_language_tag: prefs.locale,
            use_fallback: prefs.use_fallback,
        })
    }

    pub fn stop_reading(&self) {
        self.narration.stop();
    }

    /// Switches the display and narration language; only offered locales are accepted.
    pub fn set_locale(&self, locale: &str) -> Result<()> {
        if !is_supported_locale(locale) {
            bail!("unsupported locale '{locale}'");
        }
        let mut prefs = self.settings.narration();
        prefs.locale = normalize_locale(locale);
        self.settings.update_narration(prefs)
    }

    pub fn set_use_fallback(&self, use_fallback: bool) -> Result<()> {
        let mut prefs = self.settings.narration();
        prefs.use_fallback = use_fallback;
        self.settings.update_narration(prefs)
    }

    /// Stops narration and drops the session, abandoning any running analysis.
    pub async fn leave(self) {
        self.narration.stop();
        self.detection.clear_image().await;
        info!("{} left leaf detection", self.user);
    }
}

/// Analyzes the image named on the command line and reads the remedies aloud.
pub async fn run() -> Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("Vitalis leaf detection starting up...");

    let mut args = std::env::args().skip(1);
    let image_path = PathBuf::from(args.next().context("usage: vitalis <leaf-image> [cycles]")?);
    let cycles: usize = match args.next() {
        Some(raw) => raw.parse().with_context(|| format!("invalid cycle count '{raw}'"))?,
        None => 1,
    };

    let settings_path = std::env::var("VITALIS_SETTINGS")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("vitalis-settings.json"));
    let settings = Arc::new(SettingsStore::new(settings_path)?);

    let mut translator = BundleTranslator::with_default_bundle();
    if let Ok(dir) = std::env::var("VITALIS_LOCALES") {
        translator.load_dir(&PathBuf::from(dir))?;
    }

    let detection_settings = settings.detection();
    let classifier = AnyClassifier::from_kind(
        &detection_settings.classifier,
        detection_settings.analysis_delay(),
    );

    let prefs = settings.narration();
    let engine = EspeakEngine::detect().map(|engine| Arc::new(engine) as Arc<dyn NarrationEngine>);
    let narration = NarrationController::new(engine).with_voice(prefs.rate, prefs.pitch);

    let feature = DetectionFeature::enter(
        &EnvIdentity::new("VITALIS_USER"),
        classifier,
        narration,
        Arc::new(translator),
        settings.clone(),
    )?;

    for cycle in 1..=cycles {
        feature.select_image(ImageHandle::open(&image_path)?).await;
        if let Err(err) = feature.analyze().await {
            warn!("Analysis {cycle} failed: {err}");
            continue;
        }
        if let Some(diagnosis) = feature.diagnosis().await {
            println!(
                "[{cycle}] {} ({}, {})",
                diagnosis.disease_name,
                diagnosis.severity_label,
                diagnosis.confidence_label()
            );
            for symptom in &diagnosis.symptoms {
                println!("    symptom: {symptom}");
            }
            for remedy in &diagnosis.remediations {
                println!("    cure:    {remedy}");
            }
        }
    }

    if feature.read_remediations().await.is_some() {
        while feature.narration().is_speaking() {
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    }

    feature.leave().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::detection::{classifier::DeterministicStub, image::fixtures::png};
    use crate::identity::StaticIdentity;
    use crate::narration::{controller::testing::RecordingEngine, VoiceProfile};

    struct Harness {
        feature: DetectionFeature<DeterministicStub>,
        engine: Arc<RecordingEngine>,
        _dir: tempfile::TempDir,
    }

    fn harness() -> Harness {
        harness_with(DeterministicStub::instant())
    }

    fn harness_with(classifier: DeterministicStub) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let settings = Arc::new(SettingsStore::new(dir.path().join("settings.json")).unwrap());
        let engine = Arc::new(RecordingEngine::with_voices(vec![
            VoiceProfile::new("en-US", "Samantha"),
            VoiceProfile::new("hi-IN", "Lekha"),
        ]));
        let shared: Arc<dyn NarrationEngine> = engine.clone();

        let feature = DetectionFeature::enter(
            &StaticIdentity::signed_in("farmer"),
            classifier,
            NarrationController::new(Some(shared)),
            Arc::new(BundleTranslator::with_default_bundle()),
            settings,
        )
        .unwrap();

        Harness {
            feature,
            engine,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn signed_out_user_cannot_enter() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Arc::new(SettingsStore::new(dir.path().join("settings.json")).unwrap());
        let result = DetectionFeature::enter(
            &StaticIdentity::anonymous(),
            DeterministicStub::instant(),
            NarrationController::new(None),
            Arc::new(BundleTranslator::with_default_bundle()),
            settings,
        );
        assert!(matches!(result, Err(DetectionError::Unauthenticated)));
    }

    #[tokio::test]
    async fn four_cycles_expose_catalog_in_order() {
        let Harness { feature, _dir, .. } = harness();
        let mut seen = Vec::new();

        for _ in 0..4 {
            feature.select_image(png()).await;
            assert!(feature.diagnosis().await.is_none());
            feature.analyze().await.unwrap();
            let diagnosis = feature.diagnosis().await.unwrap();
            seen.push((diagnosis.disease_name, diagnosis.confidence_percent));
        }

        assert_eq!(
            seen,
            [
                ("Moderate Blight".to_string(), 75),
                ("Early Blight".to_string(), 85),
                ("Late Blight".to_string(), 90),
                ("Moderate Blight".to_string(), 75),
            ]
        );
    }

    #[tokio::test]
    async fn remediations_are_read_in_active_locale() {
        let Harness { feature, engine, _dir } = harness();
        feature.set_locale("hi").unwrap();
        feature.select_image(png()).await;
        feature.analyze().await.unwrap();

        assert!(feature.read_remediations().await.is_some());

        let utterance = engine.spoken().remove(0);
        assert_eq!(utterance.language_tag, "hi-IN");
        assert_eq!(utterance.voice.unwrap().name, "Lekha");
        assert!(utterance.text.starts_with("प्रभावित पत्तियों"));
        assert_eq!(utterance.text.matches(". ").count(), 2);
    }

    #[tokio::test]
    async fn fallback_toggle_forces_english_voice() {
        let Harness { feature, engine, _dir } = harness();
        feature.set_locale("hi").unwrap();
        feature.set_use_fallback(true).unwrap();
        feature.select_image(png()).await;
        feature.analyze().await.unwrap();
        feature.read_remediations().await;

        let utterance = engine.spoken().remove(0);
        assert_eq!(utterance.language_tag, "en-US");
        assert_eq!(utterance.voice.unwrap().name, "Samantha");
    }

    #[tokio::test]
    async fn nothing_to_read_before_analysis() {
        let Harness { feature, engine, _dir } = harness();
        feature.select_image(png()).await;
        assert_eq!(feature.read_remediations().await, None);
        assert!(engine.spoken().is_empty());
    }

    #[tokio::test]
    async fn clearing_image_stops_narration() {
        let Harness { feature, engine, _dir } = harness();
        feature.select_image(png()).await;
        feature.analyze().await.unwrap();
        feature.read_remediations().await.unwrap();
        assert_eq!(engine.playing().len(), 1);

        let snapshot = feature.clear_image().await;
        assert_eq!(snapshot.status, DetectionStatus::Idle);
        assert!(engine.playing().is_empty());
        assert!(!feature.narration().is_speaking());
    }

    #[tokio::test]
    async fn only_offered_locales_are_accepted() {
        let Harness { feature, _dir, .. } = harness();

        assert!(feature.set_locale("fr").is_err());
        assert_eq!(feature.settings.narration().locale, "en");

        feature.set_locale("ta-IN").unwrap();
        assert_eq!(feature.settings.narration().locale, "ta");
    }

    #[tokio::test]
    async fn leaving_mid_analysis_abandons_result() {
        let Harness { feature, engine, _dir } =
            harness_with(DeterministicStub::new(Duration::from_millis(50)));
        let detection = feature.detection().clone();

        feature.select_image(png()).await;
        detection.start_analysis().await.unwrap();
        feature.leave().await;

        tokio::time::sleep(Duration::from_millis(150)).await;
        let snapshot = detection.snapshot().await;
        assert_eq!(snapshot.status, DetectionStatus::Idle);
        assert_eq!(snapshot.diagnosis_index, None);
        assert_eq!(snapshot.diagnosis_cursor, 0);
        assert!(engine.spoken().is_empty());
    }
}

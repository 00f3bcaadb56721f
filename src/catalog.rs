use serde::Serialize;

use crate::i18n::Translator;

/// One fixed outcome the classifier can resolve to.
///
/// Display text is held as translation keys; only `disease_name` is shown verbatim.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosisRecord {
    pub id: usize,
    pub severity_key: &'static str,
    pub disease_name: &'static str,
    pub confidence_percent: u8,
    pub symptom_keys: [&'static str; 4],
    pub remediation_keys: [&'static str; 3],
}

/// A diagnosis record with every key resolved for one locale.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LocalizedDiagnosis {
    pub id: usize,
    pub severity_label: String,
    pub disease_name: String,
    pub confidence_percent: u8,
    pub symptoms: Vec<String>,
    pub remediations: Vec<String>,
}

impl LocalizedDiagnosis {
    pub fn confidence_label(&self) -> String {
        format!("{}% confidence", self.confidence_percent)
    }

    /// Remediations joined into a single passage for narration.
    pub fn remediation_text(&self) -> String {
        self.remediations.join(". ")
    }
}

impl DiagnosisRecord {
    pub fn localize(&self, translator: &dyn Translator, locale: &str) -> LocalizedDiagnosis {
        LocalizedDiagnosis {
            id: self.id,
            severity_label: translator.translate(self.severity_key, locale),
            disease_name: self.disease_name.to_string(),
            confidence_percent: self.confidence_percent,
            symptoms: self
                .symptom_keys
                .iter()
                .map(|key| translator.translate(key, locale))
                .collect(),
            remediations: self
                .remediation_keys
                .iter()
                .map(|key| translator.translate(key, locale))
                .collect(),
        }
    }
}

static RECORDS: [DiagnosisRecord; 3] = [
    DiagnosisRecord {
        id: 0,
        severity_key: "moderateSeverity",
        disease_name: "Moderate Blight",
        confidence_percent: 75,
        symptom_keys: ["symptom1", "symptom2", "symptom3", "symptom4"],
        remediation_keys: [
            "cures.moderateBlight.0",
            "cures.moderateBlight.1",
            "cures.moderateBlight.2",
        ],
    },
    DiagnosisRecord {
        id: 1,
        severity_key: "mediumSeverity",
        disease_name: "Early Blight",
        confidence_percent: 85,
        symptom_keys: ["symptom5", "symptom6", "symptom7", "symptom8"],
        remediation_keys: [
            "cures.earlyBlight.0",
            "cures.earlyBlight.1",
            "cures.earlyBlight.2",
        ],
    },
    DiagnosisRecord {
        id: 2,
        severity_key: "highSeverity",
        disease_name: "Late Blight",
        confidence_percent: 90,
        symptom_keys: ["symptom9", "symptom10", "symptom11", "symptom12"],
        remediation_keys: [
            "cures.lateBlight.0",
            "cures.lateBlight.1",
            "cures.lateBlight.2",
        ],
    },
];

/// Immutable, ordered diagnosis list. Selection is strictly positional.
#[derive(Debug, Clone, Copy)]
pub struct DiagnosisCatalog {
    records: &'static [DiagnosisRecord],
}

impl Default for DiagnosisCatalog {
    fn default() -> Self {
        Self { records: &RECORDS }
    }
}

impl DiagnosisCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, index: usize) -> Option<&DiagnosisRecord> {
        self.records.get(index)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DiagnosisRecord> {
        self.records.iter()
    }
}

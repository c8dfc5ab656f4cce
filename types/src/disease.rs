use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RecordKind {
    Disease,
    Pest,
    Healthy,
}

/// Coarse, confidence derived tag describing how pronounced a detected condition appears
#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
    Mild,
    Moderate,
    Severe,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Treatment {
    #[serde(default)]
    pub organic: Vec<String>,
    #[serde(default)]
    pub chemical: Vec<String>,
}

/// What each severity level looks like in the field for a given disease
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityIndicators {
    pub mild: String,
    pub moderate: String,
    pub severe: String,
}

impl SeverityIndicators {
    pub fn describe(&self, severity: Severity) -> &str {
        match severity {
            Severity::Mild => &self.mild,
            Severity::Moderate => &self.moderate,
            Severity::Severe => &self.severe,
        }
    }
}

/// Curated reference entry for one class label
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiseaseRecord {
    pub key: String,
    /// Alternative label spellings that resolve to this record
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    pub name: String,
    pub crop: String,
    pub kind: RecordKind,
    pub pathogen: String,
    pub symptoms: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity_indicators: Option<SeverityIndicators>,
    pub treatment: Treatment,
    #[serde(default)]
    pub prevention: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spray_schedule: Option<String>,
}

impl DiseaseRecord {
    pub fn is_healthy(&self) -> bool {
        self.kind == RecordKind::Healthy
    }
}

use crate::engine::registry::LabelCoverage;
use crate::error::CropScanError;
use cropscan_types::disease::DiseaseRecord;
use std::collections::HashMap;
use std::path::Path;

const EMBEDDED_KNOWLEDGE: &str = include_str!("../../data/disease_knowledge.json");

/// Canonical form used for every lookup.
///
/// Lower-cases and collapses runs of underscores so that dataset spellings such as
/// `Pepper__bell___Bacterial_spot` and curated keys such as `pepper_bell_bacterial_spot` meet.
pub fn normalize_label(label: &str) -> String {
    label
        .trim()
        .to_lowercase()
        .split(|c: char| c == '_' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

/// Read only reference data keyed by class label
#[derive(Debug)]
pub struct KnowledgeBase {
    records: Vec<DiseaseRecord>,
    index: HashMap<String, usize>,
}

impl KnowledgeBase {
    /// Curated dataset compiled into the binary
    pub fn embedded() -> Result<Self, CropScanError> {
        Self::from_json(EMBEDDED_KNOWLEDGE)
    }

    pub fn load(override_path: Option<&Path>) -> Result<Self, CropScanError> {
        match override_path {
            Some(path) => Self::from_file(path),
            None => Self::embedded(),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, CropScanError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            CropScanError::KnowledgeBaseLoadError(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, CropScanError> {
        let records: Vec<DiseaseRecord> = serde_json::from_str(raw)
            .map_err(|e| CropScanError::KnowledgeBaseLoadError(e.to_string()))?;
        Self::from_records(records)
    }

    pub fn from_records(records: Vec<DiseaseRecord>) -> Result<Self, CropScanError> {
        if records.is_empty() {
            return Err(CropScanError::KnowledgeBaseLoadError(
                "knowledge base has no records".to_string(),
            ));
        }
        let mut index = HashMap::new();
        for (position, record) in records.iter().enumerate() {
            for name in std::iter::once(&record.key).chain(record.aliases.iter()) {
                let normalized = normalize_label(name);
                if normalized.is_empty() {
                    return Err(CropScanError::KnowledgeBaseLoadError(format!(
                        "record at position {position} has an empty key or alias"
                    )));
                }
                if let Some(existing) = index.insert(normalized.clone(), position) {
                    return Err(CropScanError::KnowledgeBaseLoadError(format!(
                        "[{normalized}] is claimed by both {} and {}",
                        records[existing].key, record.key
                    )));
                }
            }
        }
        tracing::debug!(records = records.len(), "Knowledge base loaded");
        Ok(Self { records, index })
    }

    pub fn lookup(&self, label: &str) -> Result<&DiseaseRecord, CropScanError> {
        self.index
            .get(&normalize_label(label))
            .and_then(|position| self.records.get(*position))
            .ok_or_else(|| CropScanError::LabelNotFound(label.to_string()))
    }

    pub fn contains(&self, label: &str) -> bool {
        self.index.contains_key(&normalize_label(label))
    }

    /// All records for a crop, case insensitive
    pub fn search_by_crop(&self, crop: &str) -> Vec<&DiseaseRecord> {
        let crop = crop.trim().to_lowercase();
        self.records
            .iter()
            .filter(|record| record.crop.to_lowercase() == crop)
            .collect()
    }

    pub fn records(&self) -> &[DiseaseRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl LabelCoverage for KnowledgeBase {
    fn missing_labels(&self, labels: &[String]) -> Vec<String> {
        labels
            .iter()
            .filter(|label| !self.contains(label))
            .cloned()
            .collect()
    }
}

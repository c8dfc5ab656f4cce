use crate::cli::ServiceConfig;
use crate::engine::knowledge::KnowledgeBase;
use crate::error::CropScanError;
use cropscan_types::backend::{BackendKind, OutputActivation};
use cropscan_types::disease::Severity;
use cropscan_types::server::ErrorKind;
use pretty_assertions::assert_eq;
use std::time::Duration;
use test_case::test_case;

#[test_case(ServiceConfig::default().set_max_batch_size(0); "empty batches")]
#[test_case(ServiceConfig::default().set_max_image_mb(0); "zero payload limit")]
#[test_case(ServiceConfig::default().set_max_image_mb(usize::MAX); "payload limit overflows")]
#[test_case(ServiceConfig::default().set_request_timeout(0); "zero timeout")]
#[test_case(ServiceConfig::default().set_severity_thresholds(0.4, 0.6); "thresholds inverted")]
#[test_case(ServiceConfig::default().set_severity_thresholds(1.2, 0.5); "threshold above one")]
fn invalid_config_is_rejected(config: ServiceConfig) {
    let err = config.validate().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[test]
fn unknown_image_format_is_a_config_error() {
    let mut config = ServiceConfig::default();
    config.allowed_formats = vec!["jpeg".to_string(), "heic".to_string()];
    assert!(matches!(
        config.validate(),
        Err(CropScanError::InvalidConfig(_))
    ));
}

#[test]
fn oversized_payload_limit_cannot_build_a_normalizer() {
    let config = ServiceConfig::default().set_max_image_mb(usize::MAX / 1024);
    assert!(matches!(
        config.normalizer(),
        Err(CropScanError::InvalidConfig(_))
    ));
    assert!(matches!(
        config.max_payload_bytes(),
        Err(CropScanError::InvalidConfig(_))
    ));
}

#[test]
fn default_top_k_cannot_exceed_max() {
    let mut config = ServiceConfig::default();
    config.default_top_k = 5;
    config.max_top_k = Some(4);
    assert!(config.validate().is_err());
    config.max_top_k = None;
    config.default_top_k = 15;
    assert!(config.validate().is_ok());
}

#[test]
fn tracing_needs_an_endpoint() {
    let mut config = ServiceConfig::default();
    config.enable_tracing = true;
    assert!(config.validate().is_err());
    config.otel_endpoint = Some("http://localhost:4317".to_string());
    assert!(config.validate().is_ok());
    assert_eq!(
        config.tracing_options().otel_endpoint,
        Some("http://localhost:4317")
    );
}

#[test]
fn derived_components_follow_config() {
    let config = ServiceConfig::default()
        .set_severity_thresholds(0.9, 0.4)
        .set_max_image_mb(2)
        .set_request_timeout(5);

    let ranker = config.ranker().unwrap();
    assert_eq!(ranker.severity_for(0.85), Severity::Moderate);
    assert_eq!(ranker.severity_for(0.9), Severity::Severe);
    assert_eq!(ranker.severity_for(0.39), Severity::Mild);

    assert_eq!(config.normalizer().unwrap().max_payload_bytes(), 2 * 1024 * 1024);
    assert_eq!(config.limits().request_timeout, Duration::from_secs(5));
}

#[test]
fn model_sources_are_per_backend() {
    let mut config = ServiceConfig::default().set_model(
        BackendKind::Optimized,
        "quantized.onnx".into(),
        "quantized_labels.json".into(),
    );
    config.optimized_activation = OutputActivation::Logits;

    let full = config.model_source(BackendKind::Full);
    let optimized = config.model_source(BackendKind::Optimized);
    assert_eq!(full.model_path, ServiceConfig::default().full_model);
    assert_eq!(full.activation, OutputActivation::Probabilities);
    assert_eq!(optimized.model_path.to_str(), Some("quantized.onnx"));
    assert_eq!(optimized.labels_path.to_str(), Some("quantized_labels.json"));
    assert_eq!(optimized.activation, OutputActivation::Logits);
}

#[test]
fn knowledge_base_override_is_honoured() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kb.json");
    let embedded = KnowledgeBase::embedded().unwrap();
    let records = &embedded.records()[..1];
    std::fs::write(&path, serde_json::to_vec(records).unwrap()).unwrap();

    let config = ServiceConfig::default().set_knowledge_base(path);
    let knowledge = KnowledgeBase::load(config.knowledge_base.as_deref()).unwrap();
    assert_eq!(knowledge.len(), 1);

    let missing = ServiceConfig::default().set_knowledge_base(dir.path().join("absent.json"));
    assert_eq!(
        KnowledgeBase::load(missing.knowledge_base.as_deref())
            .unwrap_err()
            .kind(),
        ErrorKind::Configuration
    );
}

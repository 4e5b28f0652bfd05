use std::path::PathBuf;

use elastix_core::config::RegistrationConfig;
use elastix_core::error::ElastixError;
use elastix_core::params::{ParamValue, Scalar, TransformType};
use elastix_core::progress::Verbosity;

#[test]
fn test_default_config() {
    let config = RegistrationConfig::default();
    assert_eq!(config.moving, PathBuf::from("moving.png"));
    assert_eq!(config.fixed, PathBuf::from("fixed.png"));
    assert_eq!(config.output, PathBuf::from("registered.tiff"));
    assert_eq!(config.transform, TransformType::BSpline);
    assert_eq!(config.verbosity, Verbosity::Progress);
    assert!(config.parameters.is_empty());
    assert!(config.field_output.is_none());
}

#[test]
fn test_minimal_toml_uses_defaults() {
    let config = RegistrationConfig::from_toml(
        r#"
moving = "a.mhd"
fixed = "b.mhd"
output = "out.mhd"
"#,
    )
    .unwrap();
    assert_eq!(config.moving, PathBuf::from("a.mhd"));
    assert_eq!(config.transform, TransformType::BSpline);
    assert!(!config.exact_params);
    assert!(config.elastix_path.is_none());
}

#[test]
fn test_full_toml() {
    let config = RegistrationConfig::from_toml(
        r#"
moving = "a.png"
fixed = "b.png"
output = "out.tiff"
field_output = "fields"
transform = "affine"
verbosity = "full"
keep_workspace = true
elastix_path = "/opt/elastix/bin"

[parameters]
MaximumNumberOfIterations = 200
FinalGridSpacingInPhysicalUnits = [8.0, 8.0]
Metric = "AdvancedNormalizedCorrelation"
UseDirectionCosines = false
"#,
    )
    .unwrap();

    assert_eq!(config.transform, TransformType::Affine);
    assert_eq!(config.verbosity, Verbosity::Full);
    assert!(config.keep_workspace);
    assert_eq!(config.field_output, Some(PathBuf::from("fields")));
    assert_eq!(config.parameters.len(), 4);
    assert_eq!(
        config.parameters.get("FinalGridSpacingInPhysicalUnits"),
        Some(&ParamValue::List(vec![Scalar::Float(8.0), Scalar::Float(8.0)]))
    );
    assert_eq!(
        config.parameters.get("UseDirectionCosines"),
        Some(&ParamValue::from(false))
    );
}

#[test]
fn test_toml_roundtrip() {
    let mut config = RegistrationConfig::default();
    config.transform = TransformType::Rigid;
    config.verbosity = Verbosity::Quiet;
    config.parameters.set("NumberOfResolutions", 3).set("Metric", "AdvancedMeanSquares");

    let text = config.to_toml().unwrap();
    assert!(text.contains("transform = \"rigid\""), "{text}");
    assert!(!text.contains("field_output"), "{text}");

    let back = RegistrationConfig::from_toml(&text).unwrap();
    assert_eq!(back.transform, TransformType::Rigid);
    assert_eq!(back.verbosity, Verbosity::Quiet);
    assert_eq!(back.parameters.len(), 2);
    for (key, value) in config.parameters.iter() {
        assert_eq!(back.parameters.get(key), Some(value));
    }
}

#[test]
fn test_invalid_toml_is_config_error() {
    let err = RegistrationConfig::from_toml("transform = \"spline\"\n").unwrap_err();
    assert!(matches!(err, ElastixError::Config(_)));

    let err = RegistrationConfig::from_toml("moving = \n").unwrap_err();
    assert!(matches!(err, ElastixError::Config(_)));
}

#[test]
fn test_effective_params_merge_over_defaults() {
    let mut config = RegistrationConfig::default();
    config.parameters.set("MaximumNumberOfIterations", 200).set("Extra", "x");

    let p = config.effective_params();
    assert_eq!(p.transform(), Some("BSplineTransform"));
    assert_eq!(p.get("MaximumNumberOfIterations").and_then(ParamValue::as_i64), Some(200));
    assert_eq!(p.get("Extra").and_then(ParamValue::as_str), Some("x"));
    assert!(p.contains("FinalGridSpacingInPhysicalUnits"));
}

#[test]
fn test_options_follow_config() {
    let mut config = RegistrationConfig::default();
    config.exact_params = true;
    config.verbosity = Verbosity::Full;

    let options = config.options();
    assert!(options.exact_params);
    assert!(!options.keep_workspace);
    assert_eq!(options.verbosity, Verbosity::Full);
}

#[test]
fn test_load_reads_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("job.toml");
    let text = RegistrationConfig::default().to_toml().unwrap();
    std::fs::write(&path, text).unwrap();

    let config = RegistrationConfig::load(&path).unwrap();
    assert_eq!(config.output, PathBuf::from("registered.tiff"));

    assert!(matches!(
        RegistrationConfig::load(&dir.path().join("missing.toml")),
        Err(ElastixError::Io(_))
    ));
}

use elastix_core::error::ElastixError;
use elastix_core::params::{
    apply_groupwise, compile_params, get_advanced_params, get_default_params, ParamValue,
    Parameters, Scalar, TransformType,
};

fn list(values: &[i64]) -> ParamValue {
    ParamValue::List(values.iter().map(|&v| Scalar::Int(v)).collect())
}

// ---------------------------------------------------------------------------
// Merging
// ---------------------------------------------------------------------------

#[test]
fn test_merge_is_right_biased() {
    let a = Parameters::new().with("A", 1).with("B", "x");
    let b = Parameters::new().with("B", "y").with("C", 2.5);

    let merged = a.clone() + b.clone();
    assert_eq!(merged.len(), 3);
    assert_eq!(merged.get("A"), Some(&ParamValue::from(1)));
    assert_eq!(merged.get("B"), Some(&ParamValue::from("y")));
    assert_eq!(merged.get("C"), Some(&ParamValue::from(2.5)));

    // Inputs are untouched
    assert_eq!(a.get("B"), Some(&ParamValue::from("x")));
    assert!(!a.contains("C"));
    assert_eq!(b.len(), 2);
}

#[test]
fn test_merge_keeps_first_position_of_shared_keys() {
    let a = Parameters::new().with("A", 1).with("B", 2);
    let b = Parameters::new().with("C", 3).with("A", 10);
    let merged = a.merge(&b);
    let keys: Vec<&str> = merged.keys().collect();
    assert_eq!(keys, vec!["A", "B", "C"]);
    assert_eq!(merged.get("A").and_then(ParamValue::as_i64), Some(10));
}

#[test]
fn test_merge_all_matches_chained_merges() {
    let a = Parameters::new().with("A", 1).with("B", 1);
    let b = Parameters::new().with("B", 2).with("C", 2);
    let c = Parameters::new().with("C", 3);

    let folded = Parameters::merge_all([&a, &b, &c]);
    assert_eq!(folded, a.merge(&b).merge(&c));
    assert_eq!(folded.get("C").and_then(ParamValue::as_i64), Some(3));
    assert!(Parameters::merge_all(std::iter::empty()).is_empty());
}

#[test]
fn test_set_replaces_and_remove() {
    let mut p = Parameters::new();
    p.set("Metric", "A").set("Metric", "B");
    assert_eq!(p.len(), 1);
    assert_eq!(p.get("Metric").and_then(ParamValue::as_str), Some("B"));
    assert_eq!(p.remove("Metric"), Some(ParamValue::from("B")));
    assert_eq!(p.remove("Metric"), None);
    assert!(p.is_empty());
}

#[test]
fn test_from_iterator() {
    let p: Parameters = vec![("A", 1), ("B", 2), ("A", 3)].into_iter().collect();
    assert_eq!(p.len(), 2);
    assert_eq!(p.get("A").and_then(ParamValue::as_i64), Some(3));
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

#[test]
fn test_default_params_bspline() {
    let p = get_default_params(TransformType::BSpline);
    assert_eq!(p.transform(), Some("BSplineTransform"));
    assert_eq!(
        p.get("FinalGridSpacingInPhysicalUnits").and_then(ParamValue::as_i64),
        Some(16)
    );
    assert_eq!(p.get("NumberOfResolutions").and_then(ParamValue::as_i64), Some(4));
    assert_eq!(p.get("MaximumNumberOfIterations").and_then(ParamValue::as_i64), Some(500));
    assert_eq!(p.get("NumberOfSpatialSamples").and_then(ParamValue::as_i64), Some(2048));
    assert!(!p.contains("AutomaticScalesEstimation"));
}

#[test]
fn test_default_params_rigid_and_affine() {
    let rigid = get_default_params(TransformType::Rigid);
    assert_eq!(rigid.transform(), Some("EulerTransform"));
    assert_eq!(
        rigid.get("AutomaticScalesEstimation"),
        Some(&ParamValue::from(true))
    );
    assert!(!rigid.contains("FinalGridSpacingInPhysicalUnits"));

    let affine = get_default_params(TransformType::Affine);
    assert_eq!(affine.transform(), Some("AffineTransform"));
    assert_eq!(
        affine.get("AutomaticTransformInitialization"),
        Some(&ParamValue::from(true))
    );
}

#[test]
fn test_default_params_share_common_keys() {
    for t in [TransformType::Rigid, TransformType::Affine, TransformType::BSpline] {
        let p = get_default_params(t);
        assert_eq!(
            p.get("Metric").and_then(ParamValue::as_str),
            Some("AdvancedMattesMutualInformation")
        );
        assert_eq!(
            p.get("Optimizer").and_then(ParamValue::as_str),
            Some("AdaptiveStochasticGradientDescent")
        );
    }
}

#[test]
fn test_advanced_params() {
    let p = get_advanced_params();
    assert_eq!(p.get("FixedInternalImagePixelType").and_then(ParamValue::as_str), Some("float"));
    assert_eq!(p.get("BSplineInterpolationOrder").and_then(ParamValue::as_i64), Some(1));
    assert_eq!(p.get("FinalBSplineInterpolationOrder").and_then(ParamValue::as_i64), Some(3));
    assert_eq!(p.get("HowToCombineTransforms").and_then(ParamValue::as_str), Some("Compose"));
    assert!(p.transform().is_none());
}

// ---------------------------------------------------------------------------
// TransformType
// ---------------------------------------------------------------------------

#[test]
fn test_transform_type_parse() {
    assert_eq!("rigid".parse::<TransformType>().unwrap(), TransformType::Rigid);
    assert_eq!("Euler".parse::<TransformType>().unwrap(), TransformType::Rigid);
    assert_eq!(" AFFINE ".parse::<TransformType>().unwrap(), TransformType::Affine);
    assert_eq!("b".parse::<TransformType>().unwrap(), TransformType::BSpline);
    assert_eq!("B-spline".parse::<TransformType>().unwrap(), TransformType::BSpline);
    assert_eq!("bspline".parse::<TransformType>().unwrap(), TransformType::BSpline);
}

#[test]
fn test_transform_type_parse_invalid() {
    let err = "spline".parse::<TransformType>().unwrap_err();
    assert!(matches!(err, ElastixError::InvalidTransformType(ref s) if s == "spline"));
}

#[test]
fn test_transform_type_display_and_default() {
    assert_eq!(format!("{}", TransformType::Rigid), "Rigid");
    assert_eq!(format!("{}", TransformType::Affine), "Affine");
    assert_eq!(format!("{}", TransformType::BSpline), "B-spline");
    assert_eq!(TransformType::default(), TransformType::BSpline);
}

// ---------------------------------------------------------------------------
// Text format
// ---------------------------------------------------------------------------

#[test]
fn test_to_elastix_text() {
    let p = Parameters::new()
        .with("Metric", "AdvancedMattesMutualInformation")
        .with("NewSamplesEveryIteration", true)
        .with("FinalGridSpacingInPhysicalUnits", 16.0)
        .with("GridSpacingSchedule", vec![4.0, 2.0, 1.5])
        .with("NumberOfResolutions", 4)
        .with("ImagePyramidSchedule", [2, 2, 1, 1]);

    assert_eq!(
        p.to_elastix_text(),
        "(Metric \"AdvancedMattesMutualInformation\")\n\
         (NewSamplesEveryIteration \"true\")\n\
         (FinalGridSpacingInPhysicalUnits 16.0)\n\
         (GridSpacingSchedule 4.0 2.0 1.5)\n\
         (NumberOfResolutions 4)\n\
         (ImagePyramidSchedule 2 2 1 1)\n"
    );
}

#[test]
fn test_parse_elastix_text() {
    let text = "// Written by elastix\n\
                \n\
                (Transform \"BSplineTransform\")\n\
                (NumberOfParameters 4)\n\
                (TransformParameters 0.5 -1 2 3.25)\n\
                (UseDirectionCosines \"false\")\n\
                (GridSpacing 16.000000 16.000000)\n";
    let p = Parameters::parse_elastix_text(text).unwrap();

    assert_eq!(p.len(), 5);
    assert_eq!(p.transform(), Some("BSplineTransform"));
    assert_eq!(p.get("NumberOfParameters"), Some(&ParamValue::from(4)));
    assert_eq!(
        p.get("TransformParameters"),
        Some(&ParamValue::List(vec![
            Scalar::Float(0.5),
            Scalar::Int(-1),
            Scalar::Int(2),
            Scalar::Float(3.25),
        ]))
    );
    assert_eq!(p.get("UseDirectionCosines"), Some(&ParamValue::from(false)));
    assert_eq!(p.get("GridSpacing"), Some(&ParamValue::from(vec![16.0, 16.0])));
}

#[test]
fn test_parse_keeps_spaces_inside_quotes() {
    let p = Parameters::parse_elastix_text("(Name \"two words\" \"\")\n").unwrap();
    assert_eq!(
        p.get("Name"),
        Some(&ParamValue::List(vec![
            Scalar::Str("two words".into()),
            Scalar::Str(String::new()),
        ]))
    );
}

#[test]
fn test_text_survives_rewrite() {
    let p = compile_params(&get_default_params(TransformType::BSpline), Some(2));
    let parsed = Parameters::parse_elastix_text(&p.to_elastix_text()).unwrap();
    assert_eq!(parsed, p);
}

#[test]
fn test_parse_errors_name_the_line() {
    for bad in ["(Transform \"Euler\"", "Transform 1)", "(Name \"open)", "(Name)", "()"] {
        let text = format!("(Ok 1)\n{}\n", bad);
        let err = Parameters::parse_elastix_text(&text).unwrap_err();
        match err {
            ElastixError::InvalidParameter(msg) => assert!(msg.contains("line 2"), "{msg}"),
            other => panic!("expected InvalidParameter for {bad:?}, got {other:?}"),
        }
    }
}

// ---------------------------------------------------------------------------
// compile_params
// ---------------------------------------------------------------------------

#[test]
fn test_compile_adds_fixed_and_advanced() {
    let p = compile_params(&get_default_params(TransformType::BSpline), Some(2));
    assert_eq!(p.get("FixedImageDimension").and_then(ParamValue::as_i64), Some(2));
    assert_eq!(p.get("MovingImageDimension").and_then(ParamValue::as_i64), Some(2));
    assert_eq!(p.get("WriteResultImage"), Some(&ParamValue::from(true)));
    assert_eq!(p.get("ResultImageFormat").and_then(ParamValue::as_str), Some("mhd"));
    assert_eq!(p.get("Resampler").and_then(ParamValue::as_str), Some("DefaultResampler"));
    assert_eq!(p.keys().next(), Some("FixedImageDimension"));
}

#[test]
fn test_compile_user_params_win() {
    let user = Parameters::new()
        .with("Interpolator", "LinearInterpolator")
        .with("ResultImageFormat", "nii");
    let p = compile_params(&user, Some(3));
    assert_eq!(p.get("Interpolator").and_then(ParamValue::as_str), Some("LinearInterpolator"));
    assert_eq!(p.get("ResultImageFormat").and_then(ParamValue::as_str), Some("nii"));
}

#[test]
fn test_compile_broadcasts_grid_spacing() {
    let p = compile_params(&get_default_params(TransformType::BSpline), Some(3));
    assert_eq!(p.get("FinalGridSpacingInPhysicalUnits"), Some(&list(&[16, 16, 16])));
    assert!(p.to_elastix_text().contains("(FinalGridSpacingInPhysicalUnits 16 16 16)\n"));
}

#[test]
fn test_compile_keeps_explicit_lists() {
    let user = get_default_params(TransformType::BSpline)
        .with("FinalGridSpacingInPhysicalUnits", [8, 16]);
    let p = compile_params(&user, Some(2));
    assert_eq!(p.get("FinalGridSpacingInPhysicalUnits"), Some(&list(&[8, 16])));
}

#[test]
fn test_compile_without_dimensions() {
    let p = compile_params(&get_default_params(TransformType::BSpline), None);
    assert!(!p.contains("FixedImageDimension"));
    assert!(!p.contains("WriteResultImage"));
    assert_eq!(
        p.get("FinalGridSpacingInPhysicalUnits").and_then(ParamValue::as_i64),
        Some(16)
    );
    assert!(p.contains("Resampler"));
}

#[test]
fn test_compile_voxel_spacing_replaces_physical() {
    let user = get_default_params(TransformType::BSpline).with("FinalGridSpacingInVoxels", 10);
    let p = compile_params(&user, Some(2));
    assert!(!p.contains("FinalGridSpacingInPhysicalUnits"));
    assert_eq!(p.get("FinalGridSpacingInVoxels"), Some(&list(&[10, 10])));
}

#[test]
fn test_compile_drops_bspline_keys_for_rigid() {
    let user = get_default_params(TransformType::Rigid)
        .with("FinalGridSpacingInPhysicalUnits", 16)
        .with("GridSpacingSchedule", [4.0, 2.0, 1.0]);
    let p = compile_params(&user, Some(2));
    assert!(!p.contains("FinalGridSpacingInPhysicalUnits"));
    assert!(!p.contains("GridSpacingSchedule"));
    assert!(p.contains("AutomaticScalesEstimation"));
}

#[test]
fn test_compile_drops_linear_keys_for_bspline() {
    let user = get_default_params(TransformType::BSpline).with("AutomaticScalesEstimation", true);
    let p = compile_params(&user, Some(2));
    assert!(!p.contains("AutomaticScalesEstimation"));
    assert!(p.contains("FinalGridSpacingInPhysicalUnits"));
}

#[test]
fn test_compile_is_pure() {
    let user = get_default_params(TransformType::BSpline);
    let before = user.clone();
    let _ = compile_params(&user, Some(3));
    assert_eq!(user, before);
}

// ---------------------------------------------------------------------------
// Groupwise
// ---------------------------------------------------------------------------

#[test]
fn test_groupwise_schedule_two_levels_2d() {
    let mut p = Parameters::new().with("NumberOfResolutions", 2);
    apply_groupwise(&mut p, 2).unwrap();
    assert_eq!(p.get("ImagePyramidSchedule"), Some(&list(&[2, 2, 0, 1, 1, 0])));
    assert_eq!(p.get("FixedImageDimension").and_then(ParamValue::as_i64), Some(3));
    assert_eq!(p.transform(), Some("BSplineStackTransform"));
    assert_eq!(
        p.get("Metric").and_then(ParamValue::as_str),
        Some("VarianceOverLastDimensionMetric")
    );
    assert_eq!(
        p.get("FixedImagePyramid").and_then(ParamValue::as_str),
        Some("FixedSmoothingImagePyramid")
    );
    assert_eq!(p.get("NumSamplesLastDimension").and_then(ParamValue::as_i64), Some(5));
    assert_eq!(p.get("SubtractMean"), Some(&ParamValue::from(true)));
}

#[test]
fn test_groupwise_schedule_3d_default_levels() {
    let mut p = Parameters::new();
    apply_groupwise(&mut p, 3).unwrap();
    assert_eq!(
        p.get("ImagePyramidSchedule"),
        Some(&list(&[8, 8, 8, 0, 4, 4, 4, 0, 2, 2, 2, 0, 1, 1, 1, 0]))
    );
    assert_eq!(p.get("MovingImageDimension").and_then(ParamValue::as_i64), Some(4));
}

#[test]
fn test_groupwise_rejects_bad_resolutions() {
    let mut p = Parameters::new().with("NumberOfResolutions", [2, 2]);
    assert!(matches!(
        apply_groupwise(&mut p, 2),
        Err(ElastixError::InvalidParameter(_))
    ));

    let mut p = Parameters::new().with("NumberOfResolutions", 0);
    assert!(matches!(
        apply_groupwise(&mut p, 2),
        Err(ElastixError::InvalidParameter(_))
    ));
}

#[test]
fn test_groupwise_rejects_too_many_resolutions() {
    for levels in [33, 100, i64::MAX] {
        let mut p = Parameters::new().with("NumberOfResolutions", levels);
        let err = apply_groupwise(&mut p, 2).unwrap_err();
        assert!(matches!(err, ElastixError::InvalidParameter(_)), "got {err:?}");
        assert!(p.get("ImagePyramidSchedule").is_none());
    }

    let mut p = Parameters::new().with("NumberOfResolutions", 32);
    apply_groupwise(&mut p, 2).unwrap();
    let text = p.to_elastix_text();
    assert!(
        text.contains("(ImagePyramidSchedule 2147483648 2147483648 0 1073741824 "),
        "{text}"
    );
}

// ---------------------------------------------------------------------------
// Display and serde
// ---------------------------------------------------------------------------

#[test]
fn test_parameters_display() {
    let p = Parameters::new().with("A", 1).with("Long", "x").with("L", [1.0, 2.0]);
    assert_eq!(
        format!("{}", p),
        "<3 parameters>\n       A: 1\n    Long: \"x\"\n       L: [1.0, 2.0]\n"
    );
}

#[test]
fn test_parameters_serde_json_keeps_order_and_types() {
    let p = Parameters::new()
        .with("Transform", "BSplineTransform")
        .with("NumberOfResolutions", 4)
        .with("FinalGridSpacingInPhysicalUnits", 16.5)
        .with("WriteResultImage", true)
        .with("ImagePyramidSchedule", [2, 1]);

    let json = serde_json::to_string(&p).unwrap();
    assert_eq!(
        json,
        r#"{"Transform":"BSplineTransform","NumberOfResolutions":4,"FinalGridSpacingInPhysicalUnits":16.5,"WriteResultImage":true,"ImagePyramidSchedule":[2,1]}"#
    );
    let back: Parameters = serde_json::from_str(&json).unwrap();
    assert_eq!(back, p);
}

//! Registration parameter sets.
//!
//! A [`Parameters`] value is an ordered list of elastix parameter names and
//! values. Sets combine with a right-biased merge (`a + b` keeps `b`'s value
//! for shared keys) and render to elastix's `(Name value ...)` text format.

use std::fmt;
use std::ops::Add;
use std::str::FromStr;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::warn;

use crate::consts::{
    BSPLINE_ONLY_PARAMS, DEFAULT_GRID_SPACING, DEFAULT_MAX_ITERATIONS,
    DEFAULT_NUMBER_OF_RESOLUTIONS, GROUPWISE_SAMPLES_LAST_DIMENSION, LINEAR_ONLY_PARAMS,
    MAX_NUMBER_OF_RESOLUTIONS, PER_DIMENSION_PARAMS,
};
use crate::error::{ElastixError, Result};

/// A single parameter value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Scalar {
    /// Render in elastix syntax: strings and booleans quoted, floats always
    /// carrying a decimal point.
    pub fn to_elastix(&self) -> String {
        match self {
            Self::Bool(b) => format!("\"{}\"", b),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => format_float(*f),
            Self::Str(s) => format!("\"{}\"", s),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(v) => write!(f, "{}", format_float(*v)),
            Self::Str(s) => write!(f, "{:?}", s),
        }
    }
}

/// A parameter value: a scalar, or a list with one entry per dimension
/// (or per resolution level).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Scalar(Scalar),
    List(Vec<Scalar>),
}

impl ParamValue {
    pub fn to_elastix(&self) -> String {
        match self {
            Self::Scalar(s) => s.to_elastix(),
            Self::List(items) => items
                .iter()
                .map(Scalar::to_elastix)
                .collect::<Vec<_>>()
                .join(" "),
        }
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Self::Scalar(s) => Some(s),
            Self::List(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_scalar().and_then(Scalar::as_str)
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_scalar().and_then(Scalar::as_i64)
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Self::List(_))
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(s) => write!(f, "{}", s),
            Self::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

macro_rules! impl_scalar_from {
    ($($t:ty => $variant:ident as $target:ty),* $(,)?) => {
        $(
            impl From<$t> for Scalar {
                fn from(v: $t) -> Self {
                    Scalar::$variant(v as $target)
                }
            }

            impl From<$t> for ParamValue {
                fn from(v: $t) -> Self {
                    ParamValue::Scalar(v.into())
                }
            }

            impl From<Vec<$t>> for ParamValue {
                fn from(v: Vec<$t>) -> Self {
                    ParamValue::List(v.into_iter().map(Scalar::from).collect())
                }
            }

            impl<const N: usize> From<[$t; N]> for ParamValue {
                fn from(v: [$t; N]) -> Self {
                    ParamValue::List(v.into_iter().map(Scalar::from).collect())
                }
            }
        )*
    };
}

impl_scalar_from!(
    i32 => Int as i64,
    i64 => Int as i64,
    u32 => Int as i64,
    usize => Int as i64,
    f32 => Float as f64,
    f64 => Float as f64,
);

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Scalar::Bool(v)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Scalar::Str(v.to_string())
    }
}

impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Scalar::Str(v)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Scalar(v.into())
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Scalar(v.into())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::Scalar(v.into())
    }
}

impl From<Scalar> for ParamValue {
    fn from(v: Scalar) -> Self {
        ParamValue::Scalar(v)
    }
}

impl From<Vec<Scalar>> for ParamValue {
    fn from(v: Vec<Scalar>) -> Self {
        ParamValue::List(v)
    }
}

fn format_float(v: f64) -> String {
    let s = v.to_string();
    if s.contains('.') || !v.is_finite() {
        s
    } else {
        format!("{}.0", s)
    }
}

/// Ordered set of named registration parameters.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Parameters {
    entries: Vec<(String, ParamValue)>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Set a parameter. An existing key keeps its position.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> &mut Self {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
        self
    }

    /// Builder form of [`Parameters::set`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.set(key, value);
        self
    }

    pub fn remove(&mut self, key: &str) -> Option<ParamValue> {
        let idx = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(idx).1)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// The `Transform` parameter, if set to a string.
    pub fn transform(&self) -> Option<&str> {
        self.get("Transform").and_then(ParamValue::as_str)
    }

    /// Right-biased merge: keys present in both take `other`'s value.
    pub fn merge(&self, other: &Parameters) -> Parameters {
        let mut merged = self.clone();
        for (k, v) in &other.entries {
            merged.set(k.clone(), v.clone());
        }
        merged
    }

    /// Fold a sequence of sets left to right with [`Parameters::merge`].
    pub fn merge_all<'a, I>(sets: I) -> Parameters
    where
        I: IntoIterator<Item = &'a Parameters>,
    {
        sets.into_iter()
            .fold(Parameters::new(), |acc, p| acc.merge(p))
    }

    /// Render in elastix parameter-file syntax, one `(Name value ...)` per line.
    pub fn to_elastix_text(&self) -> String {
        let mut text = String::new();
        for (key, value) in &self.entries {
            text.push('(');
            text.push_str(key);
            text.push(' ');
            text.push_str(&value.to_elastix());
            text.push_str(")\n");
        }
        text
    }

    /// Parse elastix parameter-file text. Comment lines (`//`) and blank
    /// lines are skipped; quoted `"true"`/`"false"` become booleans.
    pub fn parse_elastix_text(text: &str) -> Result<Parameters> {
        let mut params = Parameters::new();
        for (lineno, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with("//") {
                continue;
            }
            let (key, value) = parse_line(line).map_err(|msg| {
                ElastixError::InvalidParameter(format!("line {}: {} ({:?})", lineno + 1, msg, raw))
            })?;
            params.set(key, value);
        }
        Ok(params)
    }
}

fn parse_line(line: &str) -> std::result::Result<(String, ParamValue), &'static str> {
    let body = line.strip_prefix('(').ok_or("expected '('")?;

    let mut tokens: Vec<(String, bool)> = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut quoted = false;
    let mut closed = false;

    for c in body.chars() {
        if in_quotes {
            if c == '"' {
                in_quotes = false;
            } else {
                current.push(c);
            }
            continue;
        }
        match c {
            '"' => {
                in_quotes = true;
                quoted = true;
            }
            ')' => {
                closed = true;
                break;
            }
            c if c.is_whitespace() => {
                if !current.is_empty() || quoted {
                    tokens.push((std::mem::take(&mut current), quoted));
                    quoted = false;
                }
            }
            c => current.push(c),
        }
    }
    if in_quotes {
        return Err("unterminated string");
    }
    if !closed {
        return Err("expected ')'");
    }
    if !current.is_empty() || quoted {
        tokens.push((current, quoted));
    }

    let mut tokens = tokens.into_iter();
    let (key, key_quoted) = tokens.next().ok_or("missing parameter name")?;
    if key_quoted {
        return Err("parameter name must not be quoted");
    }
    let mut values: Vec<Scalar> = tokens.map(|(t, q)| parse_token(t, q)).collect();

    match values.len() {
        0 => Err("missing value"),
        1 => Ok((key, ParamValue::Scalar(values.remove(0)))),
        _ => Ok((key, ParamValue::List(values))),
    }
}

fn parse_token(token: String, quoted: bool) -> Scalar {
    if quoted {
        return match token.as_str() {
            "true" => Scalar::Bool(true),
            "false" => Scalar::Bool(false),
            _ => Scalar::Str(token),
        };
    }
    if let Ok(i) = token.parse::<i64>() {
        return Scalar::Int(i);
    }
    if let Ok(f) = token.parse::<f64>() {
        return Scalar::Float(f);
    }
    Scalar::Str(token)
}

impl Add for Parameters {
    type Output = Parameters;

    fn add(self, other: Parameters) -> Parameters {
        self.merge(&other)
    }
}

impl<K: Into<String>, V: Into<ParamValue>> FromIterator<(K, V)> for Parameters {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Parameters::new();
        for (k, v) in iter {
            params.set(k, v);
        }
        params
    }
}

impl fmt::Display for Parameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self.keys().map(str::len).max().unwrap_or(0);
        writeln!(f, "<{} parameters>", self.len())?;
        for (key, value) in self.iter() {
            writeln!(f, "{:>w$}: {}", key, value, w = width + 4)?;
        }
        Ok(())
    }
}

impl Serialize for Parameters {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Parameters {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct ParametersVisitor;

        impl<'de> Visitor<'de> for ParametersVisitor {
            type Value = Parameters;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of elastix parameter names to values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<Parameters, A::Error> {
                let mut params = Parameters::new();
                while let Some((key, value)) = access.next_entry::<String, ParamValue>()? {
                    params.set(key, value);
                }
                Ok(params)
            }
        }

        deserializer.deserialize_map(ParametersVisitor)
    }
}

/// Transformation model used for registration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransformType {
    /// Rotation and translation (elastix `EulerTransform`).
    Rigid,
    Affine,
    /// Free-form deformation on a B-spline control grid.
    #[default]
    BSpline,
}

impl TransformType {
    /// Name of the corresponding elastix transform component.
    pub fn elastix_name(&self) -> &'static str {
        match self {
            Self::Rigid => "EulerTransform",
            Self::Affine => "AffineTransform",
            Self::BSpline => "BSplineTransform",
        }
    }
}

impl FromStr for TransformType {
    type Err = ElastixError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "RIGID" | "EULER" => Ok(Self::Rigid),
            "AFFINE" => Ok(Self::Affine),
            "B" | "BSPLINE" | "B-SPLINE" => Ok(Self::BSpline),
            _ => Err(ElastixError::InvalidTransformType(s.to_string())),
        }
    }
}

impl fmt::Display for TransformType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rigid => write!(f, "Rigid"),
            Self::Affine => write!(f, "Affine"),
            Self::BSpline => write!(f, "B-spline"),
        }
    }
}

/// Parameters most callers never need to tune.
pub fn get_advanced_params() -> Parameters {
    Parameters::new()
        // Internal pixel type used during registration
        .with("FixedInternalImagePixelType", "float")
        .with("MovingInternalImagePixelType", "float")
        .with("UseDirectionCosines", true)
        .with("Registration", "MultiResolutionRegistration")
        // Recursive pyramids downsample; smoothing pyramids do not
        .with("FixedImagePyramid", "FixedRecursiveImagePyramid")
        .with("MovingImagePyramid", "MovingRecursiveImagePyramid")
        .with("HowToCombineTransforms", "Compose")
        .with("DefaultPixelValue", 0)
        // Linear interpolation while optimizing, cubic for the final resample
        .with("Interpolator", "BSplineInterpolator")
        .with("BSplineInterpolationOrder", 1)
        .with("ResampleInterpolator", "FinalBSplineInterpolator")
        .with("FinalBSplineInterpolationOrder", 3)
        .with("Resampler", "DefaultResampler")
}

/// Commonly tuned parameters for the given transform type.
pub fn get_default_params(transform: TransformType) -> Parameters {
    let mut p = Parameters::new()
        .with("Metric", "AdvancedMattesMutualInformation")
        .with("NumberOfHistogramBins", 32)
        .with("ImageSampler", "RandomCoordinate")
        .with("NumberOfSpatialSamples", 2048)
        .with("NewSamplesEveryIteration", true)
        .with("NumberOfResolutions", DEFAULT_NUMBER_OF_RESOLUTIONS)
        .with("Transform", transform.elastix_name());

    match transform {
        TransformType::BSpline => {
            p.set("FinalGridSpacingInPhysicalUnits", DEFAULT_GRID_SPACING);
        }
        TransformType::Rigid | TransformType::Affine => {
            p.set("AutomaticScalesEstimation", true);
            p.set("AutomaticTransformInitialization", true);
        }
    }

    p.with("Optimizer", "AdaptiveStochasticGradientDescent")
        .with("MaximumNumberOfIterations", DEFAULT_MAX_ITERATIONS)
}

/// Parameters derived from the input image that the caller does not choose.
fn fixed_params(ndim: usize) -> Parameters {
    Parameters::new()
        .with("FixedImageDimension", ndim)
        .with("MovingImageDimension", ndim)
        .with("WriteResultImage", true)
        .with("ResultImagePixelType", "float")
        .with("ResultImageFormat", "mhd")
}

/// Complete and sanitize a caller's parameter set.
///
/// Combines image-derived parameters, [`get_advanced_params`] and `params`
/// (in that order of precedence, last wins), broadcasts per-dimension
/// scalars to `ndim` entries, and drops parameters that conflict with the
/// selected transform. `ndim` is `None` when the image is only known by path.
pub fn compile_params(params: &Parameters, ndim: Option<usize>) -> Parameters {
    let fixed = ndim.map(fixed_params).unwrap_or_default();
    let mut p = Parameters::merge_all([&fixed, &get_advanced_params(), params]);

    if let Some(ndim) = ndim {
        for key in PER_DIMENSION_PARAMS {
            if let Some(ParamValue::Scalar(s)) = p.get(key) {
                let list = vec![s.clone(); ndim];
                p.set(key, list);
            }
        }
    }

    if p.contains("FinalGridSpacingInVoxels") && p.contains("FinalGridSpacingInPhysicalUnits") {
        warn!("FinalGridSpacingInVoxels is set; dropping FinalGridSpacingInPhysicalUnits");
        p.remove("FinalGridSpacingInPhysicalUnits");
    }

    if let Some(transform) = p.transform().map(str::to_string) {
        let is_bspline = transform.contains("BSpline");
        let incompatible: &[&str] = if is_bspline {
            &LINEAR_ONLY_PARAMS
        } else {
            &BSPLINE_ONLY_PARAMS
        };
        for key in incompatible {
            if p.remove(key).is_some() {
                warn!(parameter = key, transform = %transform, "Dropping parameter incompatible with transform");
            }
        }
    }

    p
}

/// Switch a compiled parameter set to groupwise registration of a stack of
/// `ndim`-dimensional images (the stack adds one trailing elastix dimension).
pub fn apply_groupwise(params: &mut Parameters, ndim: usize) -> Result<()> {
    let levels = match params.get("NumberOfResolutions") {
        Some(v) => v.as_i64().ok_or_else(|| {
            ElastixError::InvalidParameter(format!(
                "NumberOfResolutions must be a single integer, got {}",
                v
            ))
        })?,
        None => DEFAULT_NUMBER_OF_RESOLUTIONS,
    };
    if !(1..=MAX_NUMBER_OF_RESOLUTIONS).contains(&levels) {
        return Err(ElastixError::InvalidParameter(format!(
            "NumberOfResolutions must be between 1 and {}, got {}",
            MAX_NUMBER_OF_RESOLUTIONS, levels
        )));
    }

    params
        .set("FixedImageDimension", ndim + 1)
        .set("MovingImageDimension", ndim + 1)
        .set("FixedImagePyramid", "FixedSmoothingImagePyramid")
        .set("MovingImagePyramid", "MovingSmoothingImagePyramid")
        .set("Metric", "VarianceOverLastDimensionMetric")
        .set("Transform", "BSplineStackTransform")
        .set("Interpolator", "ReducedDimensionBSplineInterpolator")
        .set("SampleLastDimensionRandomly", true)
        .set("NumSamplesLastDimension", GROUPWISE_SAMPLES_LAST_DIMENSION)
        .set("SubtractMean", true);

    // Coarsest level first; the stack axis (listed last by elastix) is never smoothed.
    let mut schedule: Vec<i64> = Vec::with_capacity(levels as usize * (ndim + 1));
    for level in (0..levels).rev() {
        schedule.extend(std::iter::repeat(1i64 << level).take(ndim));
        schedule.push(0);
    }
    params.set("ImagePyramidSchedule", schedule);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_float_keeps_decimal_point() {
        assert_eq!(format_float(16.0), "16.0");
        assert_eq!(format_float(0.25), "0.25");
        assert_eq!(format_float(-3.0), "-3.0");
        assert_eq!(format_float(1e21), "1000000000000000000000.0");
    }

    #[test]
    fn test_parse_token_types() {
        assert_eq!(parse_token("7".into(), false), Scalar::Int(7));
        assert_eq!(parse_token("7".into(), true), Scalar::Str("7".into()));
        assert_eq!(parse_token("1e-3".into(), false), Scalar::Float(0.001));
        assert_eq!(parse_token("true".into(), true), Scalar::Bool(true));
        assert_eq!(parse_token("true".into(), false), Scalar::Str("true".into()));
    }
}

//! Algorithm resolution: maps an arm's algorithm name and params to a method.
use crate::arm::ArmKind;
use crate::bundled::{self, BundledMacro};
use crate::error::ArmError;
use crate::template::ArgRenderer;
use serde_json::Value;
use std::path::PathBuf;
use tako_core::Params;

/// Algorithms every arm accepts
pub const GENERIC_ALGORITHMS: &[&str] = &["ijmacro", "exec", "copy"];

/// Auto-threshold methods understood by ImageJ
pub const THRESHOLD_METHODS: &[&str] = &[
    "Default", "Huang", "Intermodes", "IsoData", "IJ_IsoData", "Li", "MaxEntropy", "Mean",
    "MinError", "Minimum", "Moments", "Otsu", "Percentile", "RenyiEntropy", "Shanbhag",
    "Triangle", "Yen",
];

const DEFAULT_EXEC_ARGS: [&str; 2] = ["{{input}}", "{{output}}"];

#[derive(Debug, Clone)]
pub enum Method {
    /// Headless ImageJ run of a macro
    ImageJMacro { source: MacroSource, extra: Vec<String> },
    /// Any executable, arguments rendered as templates
    Exec { program: PathBuf, args: Vec<String> },
    /// In-process copy of input to output
    Copy,
}

#[derive(Debug, Clone)]
pub enum MacroSource {
    File(PathBuf),
    Bundled(&'static BundledMacro),
}

impl Method {
    pub fn resolve(kind: ArmKind, algorithm: &str, params: &Params) -> Result<Self, ArmError> {
        match (kind, algorithm) {
            (_, "ijmacro") => {
                let name = required_str(params, "macro", algorithm)?;
                // a bare bundled name selects the shipped macro
                let source = match bundled::lookup(name) {
                    Some(bundled) => MacroSource::Bundled(bundled),
                    None => MacroSource::File(PathBuf::from(name)),
                };
                Ok(Method::ImageJMacro {
                    source,
                    extra: string_list(params, "args")?.unwrap_or_default(),
                })
            }
            (_, "exec") => {
                let program = PathBuf::from(required_str(params, "program", algorithm)?);
                let args = string_list(params, "args")?
                    .unwrap_or_else(|| DEFAULT_EXEC_ARGS.iter().map(|s| s.to_string()).collect());
                for arg in &args {
                    ArgRenderer::check(arg)?;
                }
                Ok(Method::Exec { program, args })
            }
            (_, "copy") => Ok(Method::Copy),
            (ArmKind::Alignment, "sift" | "method1") => Ok(Method::ImageJMacro {
                source: MacroSource::Bundled(&bundled::ALIGNMENT),
                extra: Vec::new(),
            }),
            (ArmKind::Correction, "background") => {
                let radius = optional_u64(params, "radius")?.unwrap_or(50);
                if radius == 0 {
                    return Err(invalid("radius", "must be positive"));
                }
                Ok(Method::ImageJMacro {
                    source: MacroSource::Bundled(&bundled::CORRECTION),
                    extra: vec![radius.to_string()],
                })
            }
            (ArmKind::Segmentation, "threshold") => {
                let method = optional_str(params, "method")?.unwrap_or("Default");
                if !THRESHOLD_METHODS.contains(&method) {
                    return Err(invalid(
                        "method",
                        &format!("unknown threshold method '{}'", method),
                    ));
                }
                Ok(Method::ImageJMacro {
                    source: MacroSource::Bundled(&bundled::SEGMENTATION),
                    extra: vec![method.to_string()],
                })
            }
            (ArmKind::Visualization, "projection") => {
                let lut = optional_str(params, "lut")?.unwrap_or("Fire");
                Ok(Method::ImageJMacro {
                    source: MacroSource::Bundled(&bundled::VISUALIZATION),
                    extra: vec![lut.to_string()],
                })
            }
            _ => Err(ArmError::UnknownAlgorithm {
                arm: kind.as_str().to_string(),
                algorithm: algorithm.to_string(),
                available: kind.algorithms().join(", "),
            }),
        }
    }

    /// SIFT matching relies on RANSAC, so its result varies run to run.
    pub fn deterministic(&self) -> bool {
        !matches!(
            self,
            Method::ImageJMacro {
                source: MacroSource::Bundled(m),
                ..
            } if m.name == bundled::ALIGNMENT.name
        )
    }
}

fn invalid(param: &str, reason: &str) -> ArmError {
    ArmError::InvalidParam {
        param: param.to_string(),
        reason: reason.to_string(),
    }
}

fn required_str<'a>(params: &'a Params, key: &str, algorithm: &str) -> Result<&'a str, ArmError> {
    optional_str(params, key)?.ok_or_else(|| ArmError::MissingParam {
        algorithm: algorithm.to_string(),
        param: key.to_string(),
    })
}

fn optional_str<'a>(params: &'a Params, key: &str) -> Result<Option<&'a str>, ArmError> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.is_empty() => Err(invalid(key, "must not be empty")),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(_) => Err(invalid(key, "expected a string")),
    }
}

fn optional_u64(params: &Params, key: &str) -> Result<Option<u64>, ArmError> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_u64()
            .map(Some)
            .ok_or_else(|| invalid(key, "expected a non-negative integer")),
    }
}

/// Scalars or a list of scalars, rendered as strings
fn string_list(params: &Params, key: &str) -> Result<Option<Vec<String>>, ArmError> {
    let scalar = |value: &Value| match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        _ => Err(invalid(key, "expected strings, numbers or booleans")),
    };

    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => items.iter().map(scalar).collect::<Result<_, _>>().map(Some),
        Some(value) => scalar(value).map(|s| Some(vec![s])),
    }
}

//! TAKO Arms: configurable stage templates.
//!
//! Each arm wraps an algorithm name, an input reference and a parameter
//! set, and resolves to a headless ImageJ macro run, an arbitrary
//! executable, or an in-process copy.
//!
//! # Chaining
//!
//! ```no_run
//! use tako_arms::Arm;
//! use tako_core::StageConfig;
//!
//! let alignment = Arm::alignment(StageConfig::new("sift", "data/myxo-small.tif"))?;
//! let segmentation = Arm::segmentation(
//!     StageConfig::new("threshold", alignment.output()).with_param("method", "Otsu"),
//! )?;
//! # Ok::<(), tako_arms::ArmError>(())
//! ```

pub mod arm;
pub mod bundled;
pub mod error;
pub mod method;
pub mod template;

pub use arm::{Arm, ArmKind};
pub use error::ArmError;
pub use method::{MacroSource, Method};
pub use template::ArgRenderer;

use serde::Serialize;

/// Arm and the algorithms it accepts
#[derive(Debug, Clone, Serialize)]
pub struct ArmInfo {
    pub arm: ArmKind,
    pub suffix: &'static str,
    pub algorithms: Vec<AlgorithmInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AlgorithmInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub params: &'static [&'static str],
}

fn describe(name: &'static str) -> AlgorithmInfo {
    let (description, params): (&'static str, &'static [&'static str]) = match name {
        "ijmacro" => ("run an ImageJ macro headless", &["macro", "args"]),
        "exec" => ("run an executable with templated arguments", &["program", "args"]),
        "copy" => ("copy the input unchanged", &[]),
        "sift" => (bundled::ALIGNMENT.description, &[]),
        "method1" => ("alias of sift", &[]),
        "background" => (bundled::CORRECTION.description, &["radius"]),
        "threshold" => (bundled::SEGMENTATION.description, &["method"]),
        "projection" => (bundled::VISUALIZATION.description, &["lut"]),
        _ => ("", &[]),
    };
    AlgorithmInfo {
        name,
        description,
        params,
    }
}

/// Every arm with its algorithms
pub fn catalog() -> Vec<ArmInfo> {
    ArmKind::ALL
        .into_iter()
        .map(|arm| ArmInfo {
            arm,
            suffix: arm.suffix(),
            algorithms: arm.algorithms().into_iter().map(describe).collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_covers_every_arm() {
        let catalog = catalog();
        assert_eq!(catalog.len(), 5);
        for info in &catalog {
            assert!(info.algorithms.iter().all(|a| !a.description.is_empty()));
        }
        let segmentation = catalog.iter().find(|i| i.arm == ArmKind::Segmentation).unwrap();
        assert_eq!(segmentation.algorithms[0].name, "threshold");
        assert_eq!(segmentation.algorithms[0].params, &["method"]);
    }
}

//! ImageJ macros shipped inside the binary.
//!
//! They are written to the run's macro directory before use, since the
//! imaging tool only accepts macro files.

use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

static STAGING: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, PartialEq, Eq)]
pub struct BundledMacro {
    pub name: &'static str,
    pub description: &'static str,
    pub source: &'static str,
}

pub static ALIGNMENT: BundledMacro = BundledMacro {
    name: "alignment",
    description: "SIFT linear stack alignment",
    source: include_str!("../macros/alignment.ijm"),
};

pub static CORRECTION: BundledMacro = BundledMacro {
    name: "correction",
    description: "rolling-ball background subtraction",
    source: include_str!("../macros/correction.ijm"),
};

pub static SEGMENTATION: BundledMacro = BundledMacro {
    name: "segmentation",
    description: "mean-shift smoothing, auto-threshold, binary mask",
    source: include_str!("../macros/segmentation.ijm"),
};

pub static VISUALIZATION: BundledMacro = BundledMacro {
    name: "visualization",
    description: "maximum intensity projection with a LUT",
    source: include_str!("../macros/visualization.ijm"),
};

static BY_NAME: Lazy<HashMap<&'static str, &'static BundledMacro>> = Lazy::new(|| {
    [&ALIGNMENT, &CORRECTION, &SEGMENTATION, &VISUALIZATION]
        .into_iter()
        .map(|m| (m.name, m))
        .collect()
});

pub fn lookup(name: &str) -> Option<&'static BundledMacro> {
    BY_NAME.get(name).copied()
}

impl BundledMacro {
    pub fn file_name(&self) -> String {
        format!("{}.ijm", self.name)
    }

    /// Write the macro into `dir` unless an identical copy is already there
    pub fn materialize(&self, dir: &Path) -> io::Result<PathBuf> {
        let path = dir.join(self.file_name());
        if std::fs::read_to_string(&path).is_ok_and(|existing| existing == self.source) {
            return Ok(path);
        }

        std::fs::create_dir_all(dir)?;
        // Rename keeps concurrent readers from seeing a half-written file.
        let staging = dir.join(format!(
            ".{}.{}-{}.tmp",
            self.file_name(),
            std::process::id(),
            STAGING.fetch_add(1, Ordering::Relaxed)
        ));
        std::fs::write(&staging, self.source)?;
        std::fs::rename(&staging, &path)?;
        tracing::debug!(path = %path.display(), "materialised bundled macro");
        Ok(path)
    }
}

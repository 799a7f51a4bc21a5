//! Data Model: StageConfig, OutputHandle, RunReport
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Algorithm-specific parameters
pub type Params = BTreeMap<String, serde_json::Value>;

/// Configuration of one arm
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    /// Algorithm name (ex: "sift", "ijmacro")
    pub algorithm: String,
    /// Input: a file path or an upstream output handle
    pub data: DataRef,
    /// Explicit output path; derived from the input when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    #[serde(default)]
    pub params: Params,
}

impl StageConfig {
    pub fn new(algorithm: impl Into<String>, data: impl Into<DataRef>) -> Self {
        Self {
            algorithm: algorithm.into(),
            data: data.into(),
            output: None,
            params: Params::new(),
        }
    }

    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn with_param(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

/// Where a stage reads its input from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataRef {
    Path(PathBuf),
    Output(OutputHandle),
}

impl DataRef {
    /// File the reference points at
    pub fn path(&self) -> &Path {
        match self {
            DataRef::Path(path) => path,
            DataRef::Output(handle) => &handle.path,
        }
    }

    /// Producing stage, when the input is an upstream output
    pub fn upstream(&self) -> Option<&str> {
        match self {
            DataRef::Path(_) => None,
            DataRef::Output(handle) => Some(&handle.stage),
        }
    }
}

impl From<OutputHandle> for DataRef {
    fn from(handle: OutputHandle) -> Self {
        DataRef::Output(handle)
    }
}

impl From<&OutputHandle> for DataRef {
    fn from(handle: &OutputHandle) -> Self {
        DataRef::Output(handle.clone())
    }
}

impl From<PathBuf> for DataRef {
    fn from(path: PathBuf) -> Self {
        DataRef::Path(path)
    }
}

impl From<&Path> for DataRef {
    fn from(path: &Path) -> Self {
        DataRef::Path(path.to_path_buf())
    }
}

impl From<&str> for DataRef {
    fn from(path: &str) -> Self {
        DataRef::Path(PathBuf::from(path))
    }
}

impl From<String> for DataRef {
    fn from(path: String) -> Self {
        DataRef::Path(PathBuf::from(path))
    }
}

/// Reference to the file a stage produces
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutputHandle {
    pub stage: String,
    pub path: PathBuf,
}

impl OutputHandle {
    pub fn new(stage: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            stage: stage.into(),
            path: path.into(),
        }
    }
}

impl fmt::Display for OutputHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// Default output path: `<dir>/<stem>_<suffix>.<ext>`, `tif` when the input has no extension
pub fn default_output_path(input: &Path, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "data".to_string());
    let ext = input
        .extension()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "tif".to_string());
    let name = format!("{}_{}.{}", stem, suffix, ext);
    match input.parent() {
        Some(parent) => parent.join(name),
        None => PathBuf::from(name),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded,
    DryRun,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Succeeded,
    Skipped,
}

/// Outcome of one executed stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRecord {
    pub id: String,
    pub arm: String,
    pub algorithm: String,
    pub input: PathBuf,
    pub output: PathBuf,
    pub status: StageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// blake3 of the produced file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_hash: Option<String>,
    pub deterministic: bool,
    pub latency_ms: u64,
    pub started_at: DateTime<Utc>,
}

/// Outcome of a whole workflow run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub workflow: String,
    pub pipeline_id: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub stages: Vec<StageRecord>,
}

impl RunReport {
    pub fn stage(&self, id: &str) -> Option<&StageRecord> {
        self.stages.iter().find(|s| s.id == id)
    }

    /// Output of the last stage to finish
    pub fn final_output(&self) -> Option<&Path> {
        self.stages.last().map(|s| s.output.as_path())
    }

    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_output_path() {
        assert_eq!(
            default_output_path(Path::new("/data/myxo-small.tif"), "align"),
            PathBuf::from("/data/myxo-small_align.tif")
        );
        assert_eq!(
            default_output_path(Path::new("raw"), "seg"),
            PathBuf::from("raw_seg.tif")
        );
    }

    #[test]
    fn test_handle_becomes_data() {
        let handle = OutputHandle::new("alignment", "/data/a_align.tif");
        let data: DataRef = handle.clone().into();
        assert_eq!(data.path(), Path::new("/data/a_align.tif"));
        assert_eq!(data.upstream(), Some("alignment"));
        assert_eq!(DataRef::from("in.tif").upstream(), None);
    }

    #[test]
    fn test_stage_config_json() {
        let config: StageConfig = serde_json::from_value(serde_json::json!({
            "algorithm": "ijmacro",
            "data": { "path": "in.tif" },
            "params": { "macro": "m.ijm" }
        }))
        .unwrap();
        assert_eq!(config.data, DataRef::Path(PathBuf::from("in.tif")));
        assert!(config.output.is_none());
        assert_eq!(config.params["macro"], "m.ijm");
    }
}

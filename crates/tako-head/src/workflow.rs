//! Workflows: ordered arms and parallel groups, built in code or from YAML.
//!
//! ```yaml
//! name: myxo
//! stages:
//!   - arm: alignment
//!     algorithm: sift
//!     data: myxo-small.tif
//!   - parallel:
//!       - { id: seg, arm: segmentation, algorithm: threshold, data: PREVIOUS }
//!       - { id: vis, arm: visualization, algorithm: projection, data: PREVIOUS }
//!   - arm: correction
//!     algorithm: background
//!     data: PREVIOUS.seg
//! ```

use crate::error::HeadError;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tako_arms::{Arm, ArmKind};
use tako_core::{DataRef, OutputHandle, Params, StageConfig};

/// Output of the preceding step
pub const PREVIOUS: &str = "PREVIOUS";

#[derive(Debug, Clone)]
pub enum WorkflowItem {
    Arm(Arm),
    /// Arms run concurrently
    Group(Vec<Arm>),
}

impl WorkflowItem {
    pub fn arms(&self) -> &[Arm] {
        match self {
            WorkflowItem::Arm(arm) => std::slice::from_ref(arm),
            WorkflowItem::Group(arms) => arms,
        }
    }
}

impl From<Arm> for WorkflowItem {
    fn from(arm: Arm) -> Self {
        WorkflowItem::Arm(arm)
    }
}

impl From<Vec<Arm>> for WorkflowItem {
    fn from(arms: Vec<Arm>) -> Self {
        WorkflowItem::Group(arms)
    }
}

#[derive(Debug, Clone)]
pub struct Workflow {
    name: String,
    items: Vec<WorkflowItem>,
}

impl Workflow {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            items: Vec::new(),
        }
    }

    pub fn then(mut self, item: impl Into<WorkflowItem>) -> Self {
        self.items.push(item.into());
        self
    }

    pub fn parallel(self, arms: Vec<Arm>) -> Self {
        self.then(WorkflowItem::Group(arms))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn items(&self) -> &[WorkflowItem] {
        &self.items
    }

    pub fn into_items(self) -> Vec<WorkflowItem> {
        self.items
    }

    /// Every arm, in declaration order
    pub fn arms(&self) -> impl Iterator<Item = &Arm> {
        self.items.iter().flat_map(|item| item.arms())
    }

    /// Load and resolve a YAML workflow; relative paths are taken from the
    /// file's directory.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, HeadError> {
        let path = path.as_ref();
        let file = WorkflowFile::load(path)?;
        let base_dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        file.into_workflow(base_dir)
    }
}

impl From<Vec<Arm>> for Workflow {
    fn from(arms: Vec<Arm>) -> Self {
        arms.into_iter().fold(Workflow::new("workflow"), |workflow, arm| workflow.then(arm))
    }
}

impl From<Vec<WorkflowItem>> for Workflow {
    fn from(items: Vec<WorkflowItem>) -> Self {
        Self {
            name: "workflow".to_string(),
            items,
        }
    }
}

/// Serialised workflow document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkflowFile {
    pub name: String,
    pub stages: Vec<StageEntry>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum StageEntry {
    Parallel { parallel: Vec<StageSpec> },
    Stage(StageSpec),
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ParallelGroup {
    parallel: Vec<StageSpec>,
}

// A `parallel` key selects the group form; anything else must be a stage, so
// field errors reach the user instead of a generic variant mismatch.
impl<'de> Deserialize<'de> for StageEntry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let entry = if value.get("parallel").is_some() {
            serde_json::from_value::<ParallelGroup>(value).map(|group| StageEntry::Parallel {
                parallel: group.parallel,
            })
        } else {
            serde_json::from_value(value).map(StageEntry::Stage)
        };
        entry.map_err(D::Error::custom)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageSpec {
    /// Defaults to the arm name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub arm: ArmKind,
    pub algorithm: String,
    /// Path, `PREVIOUS` or `PREVIOUS.<id>`
    pub data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Params::is_empty")]
    pub params: Params,
}

/// What `PREVIOUS` points at while resolving
enum Previous {
    Start,
    Single(OutputHandle),
    Group(Vec<String>),
}

impl WorkflowFile {
    pub fn from_yaml(yaml: &str) -> Result<Self, HeadError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, HeadError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|source| HeadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&yaml)
    }

    /// Resolve `PREVIOUS` references and relative paths into arms
    pub fn into_workflow(self, base_dir: &Path) -> Result<Workflow, HeadError> {
        let mut workflow = Workflow::new(self.name);
        let mut produced: HashMap<String, OutputHandle> = HashMap::new();
        let mut previous = Previous::Start;

        for (index, entry) in self.stages.into_iter().enumerate() {
            match entry {
                StageEntry::Stage(spec) => {
                    let arm = build_arm(spec, &previous, &produced, base_dir)?;
                    previous = Previous::Single(arm.output());
                    produced.insert(arm.id().to_string(), arm.output());
                    workflow = workflow.then(arm);
                }
                StageEntry::Parallel { parallel } => {
                    if parallel.is_empty() {
                        return Err(HeadError::Workflow(format!(
                            "parallel group at step {} is empty",
                            index + 1
                        )));
                    }
                    // siblings only see what came before the group
                    let arms = parallel
                        .into_iter()
                        .map(|spec| build_arm(spec, &previous, &produced, base_dir))
                        .collect::<Result<Vec<_>, _>>()?;

                    previous = match arms.as_slice() {
                        [only] => Previous::Single(only.output()),
                        many => Previous::Group(many.iter().map(|a| a.id().to_string()).collect()),
                    };
                    for arm in &arms {
                        produced.insert(arm.id().to_string(), arm.output());
                    }
                    workflow = workflow.parallel(arms);
                }
            }
        }

        Ok(workflow)
    }
}

fn build_arm(
    spec: StageSpec,
    previous: &Previous,
    produced: &HashMap<String, OutputHandle>,
    base_dir: &Path,
) -> Result<Arm, HeadError> {
    let id = spec.id.unwrap_or_else(|| spec.arm.as_str().to_string());
    let data = resolve_data(&id, &spec.data, previous, produced, base_dir)?;

    let mut config = StageConfig::new(spec.algorithm, data);
    config.output = spec.output.map(|output| base_dir.join(output));
    config.params = spec.params;
    match config.algorithm.as_str() {
        "ijmacro" => relative_param(&mut config.params, "macro", base_dir, |v| v.ends_with(".ijm")),
        // bare program names are left to PATH lookup
        "exec" => relative_param(&mut config.params, "program", base_dir, |v| v.contains('/')),
        _ => {}
    }

    Arm::with_id(spec.arm, id.clone(), config)
        .map_err(|source| HeadError::Arm { stage: id, source })
}

/// Rebase a relative file parameter onto the workflow directory
fn relative_param(params: &mut Params, key: &str, base_dir: &Path, is_file: fn(&str) -> bool) {
    if let Some(Value::String(value)) = params.get_mut(key) {
        if is_file(value) && Path::new(value.as_str()).is_relative() {
            *value = base_dir.join(value.as_str()).to_string_lossy().into_owned();
        }
    }
}

fn resolve_data(
    id: &str,
    data: &str,
    previous: &Previous,
    produced: &HashMap<String, OutputHandle>,
    base_dir: &Path,
) -> Result<DataRef, HeadError> {
    if data == PREVIOUS {
        return match previous {
            Previous::Single(handle) => Ok(DataRef::Output(handle.clone())),
            Previous::Start => Err(HeadError::Workflow(format!(
                "stage '{}': PREVIOUS has no preceding step",
                id
            ))),
            Previous::Group(ids) => Err(HeadError::Workflow(format!(
                "stage '{}': PREVIOUS after a parallel group is ambiguous, use one of {}",
                id,
                ids.iter()
                    .map(|s| format!("PREVIOUS.{}", s))
                    .collect::<Vec<_>>()
                    .join(", ")
            ))),
        };
    }

    if let Some(upstream) = data.strip_prefix("PREVIOUS.") {
        return produced
            .get(upstream)
            .cloned()
            .map(DataRef::Output)
            .ok_or_else(|| {
                HeadError::Workflow(format!(
                    "stage '{}': no earlier stage named '{}'",
                    id, upstream
                ))
            });
    }

    Ok(DataRef::Path(base_dir.join(data)))
}

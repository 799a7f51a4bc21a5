//! Execution plan: a workflow checked for ids, references and output paths.
use crate::error::HeadError;
use crate::workflow::{Workflow, WorkflowItem};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use tako_arms::Arm;
use tako_core::{DataRef, PipelineRunner, Stage, Step};

#[derive(Debug, Clone)]
pub struct Plan {
    workflow: Workflow,
}

/// Serialisable summary of a plan
#[derive(Debug, Clone, Serialize)]
pub struct PlanView {
    pub name: String,
    pub pipeline_id: String,
    pub steps: Vec<StepView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepView {
    pub parallel: bool,
    pub stages: Vec<StageView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageView {
    pub id: String,
    pub arm: String,
    pub algorithm: String,
    pub input: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream: Option<String>,
    pub output: PathBuf,
    pub deterministic: bool,
}

impl Plan {
    pub fn build(workflow: Workflow) -> Result<Self, HeadError> {
        if workflow.items().is_empty() {
            return Err(plan_error(format!("workflow '{}' has no stages", workflow.name())));
        }

        // stage id -> step index
        let mut steps_by_id: HashMap<&str, usize> = HashMap::new();
        for (index, item) in workflow.items().iter().enumerate() {
            if item.arms().is_empty() {
                return Err(plan_error(format!("parallel group at step {} is empty", index + 1)));
            }
            for arm in item.arms() {
                if steps_by_id.insert(arm.id(), index).is_some() {
                    return Err(plan_error(format!("duplicate stage id '{}'", arm.id())));
                }
            }
        }

        let mut writers: HashMap<&PathBuf, &str> = HashMap::new();
        let mut external_inputs: Vec<(&PathBuf, &str)> = Vec::new();

        for (index, item) in workflow.items().iter().enumerate() {
            for arm in item.arms() {
                match &arm.config().data {
                    DataRef::Path(path) => external_inputs.push((path, arm.id())),
                    DataRef::Output(handle) => {
                        let producer = match steps_by_id.get(handle.stage.as_str()) {
                            Some(&step) if step < index => workflow.items()[step]
                                .arms()
                                .iter()
                                .find(|a| a.id() == handle.stage),
                            Some(&step) if step == index => {
                                return Err(plan_error(format!(
                                    "stage '{}' consumes the output of its parallel sibling '{}'",
                                    arm.id(),
                                    handle.stage
                                )))
                            }
                            Some(_) => {
                                return Err(plan_error(format!(
                                    "stage '{}' consumes the output of '{}', which runs later",
                                    arm.id(),
                                    handle.stage
                                )))
                            }
                            None => None,
                        };
                        match producer {
                            Some(producer) if producer.output().path == handle.path => {}
                            Some(_) => {
                                return Err(plan_error(format!(
                                    "stage '{}' holds a stale handle to '{}'",
                                    arm.id(),
                                    handle.stage
                                )))
                            }
                            None => {
                                return Err(plan_error(format!(
                                    "stage '{}' consumes the output of unknown stage '{}'",
                                    arm.id(),
                                    handle.stage
                                )))
                            }
                        }
                    }
                }

                if let Some(other) = writers.insert(arm.output_path(), arm.id()) {
                    return Err(plan_error(format!(
                        "stages '{}' and '{}' both write {}",
                        other,
                        arm.id(),
                        arm.output_path().display()
                    )));
                }
            }
        }

        for (path, reader) in external_inputs {
            if let Some(writer) = writers.get(path) {
                return Err(plan_error(format!(
                    "stage '{}' writes {}, which stage '{}' reads as an input",
                    writer,
                    path.display(),
                    reader
                )));
            }
        }

        Ok(Self { workflow })
    }

    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    pub fn name(&self) -> &str {
        self.workflow.name()
    }

    /// Number of stages
    pub fn len(&self) -> usize {
        self.workflow.arms().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn steps(&self) -> Vec<Step> {
        self.workflow
            .items()
            .iter()
            .map(|item| match item {
                WorkflowItem::Arm(arm) => Step::Single(as_stage(arm)),
                WorkflowItem::Group(arms) => Step::Parallel(arms.iter().map(as_stage).collect()),
            })
            .collect()
    }

    pub fn runner(&self) -> PipelineRunner {
        PipelineRunner::new(self.steps())
    }

    pub fn view(&self) -> PlanView {
        PlanView {
            name: self.name().to_string(),
            pipeline_id: self.runner().pipeline_id().to_string(),
            steps: self
                .workflow
                .items()
                .iter()
                .map(|item| StepView {
                    parallel: matches!(item, WorkflowItem::Group(_)),
                    stages: item.arms().iter().map(stage_view).collect(),
                })
                .collect(),
        }
    }

    /// Graphviz rendering: external inputs as notes, stages as boxes,
    /// parallel groups as clusters.
    pub fn to_dot(&self) -> String {
        let mut dot = String::new();
        let _ = writeln!(dot, "digraph {} {{", quote(self.name()));
        let _ = writeln!(dot, "  rankdir=LR;");
        let _ = writeln!(dot, "  node [shape=box];");

        let mut inputs = HashSet::new();
        for arm in self.workflow.arms() {
            if let DataRef::Path(path) = &arm.config().data {
                let node = format!("input:{}", path.display());
                if inputs.insert(node.clone()) {
                    let _ = writeln!(
                        dot,
                        "  {} [shape=note, label={}];",
                        quote(&node),
                        quote(&file_name(path))
                    );
                }
            }
        }

        for (index, item) in self.workflow.items().iter().enumerate() {
            let indent = match item {
                WorkflowItem::Arm(_) => "  ",
                WorkflowItem::Group(_) => "    ",
            };
            if let WorkflowItem::Group(_) = item {
                let _ = writeln!(dot, "  subgraph cluster_{} {{", index);
                let _ = writeln!(dot, "    label=\"parallel\";");
                let _ = writeln!(dot, "    style=dashed;");
            }
            for arm in item.arms() {
                let label = format!("{}\\n{} ({})", arm.id(), arm.kind(), arm.config().algorithm);
                let node = quote(arm.id());
                let _ = writeln!(dot, "{}{} [label=\"{}\"];", indent, node, escape(&label));
            }
            if let WorkflowItem::Group(_) = item {
                let _ = writeln!(dot, "  }}");
            }
        }

        for arm in self.workflow.arms() {
            match &arm.config().data {
                DataRef::Path(path) => {
                    let _ = writeln!(
                        dot,
                        "  {} -> {};",
                        quote(&format!("input:{}", path.display())),
                        quote(arm.id())
                    );
                }
                DataRef::Output(handle) => {
                    let _ = writeln!(
                        dot,
                        "  {} -> {} [label={}];",
                        quote(&handle.stage),
                        quote(arm.id()),
                        quote(&file_name(&handle.path))
                    );
                }
            }
        }

        dot.push_str("}\n");
        dot
    }
}

fn as_stage(arm: &Arm) -> Arc<dyn Stage> {
    Arc::new(arm.clone())
}

fn stage_view(arm: &Arm) -> StageView {
    StageView {
        id: arm.id().to_string(),
        arm: arm.kind().to_string(),
        algorithm: arm.config().algorithm.clone(),
        input: arm.config().data.path().to_path_buf(),
        upstream: arm.config().data.upstream().map(str::to_string),
        output: arm.output_path().clone(),
        deterministic: arm.method().deterministic(),
    }
}

fn plan_error(message: String) -> HeadError {
    HeadError::Plan(message)
}

fn file_name(path: &std::path::Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn escape(s: &str) -> String {
    s.replace('"', "\\\"")
}

fn quote(s: &str) -> String {
    format!("\"{}\"", escape(&s.replace('\\', "\\\\")))
}

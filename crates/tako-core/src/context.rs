//! Execution Context: state shared by every stage of one run
use crate::settings::Settings;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub run_id: String,
    pub workflow: String,
    pub settings: Settings,
    pub dry_run: bool,
}

impl ExecutionContext {
    pub fn new(workflow: impl Into<String>, settings: Settings) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            workflow: workflow.into(),
            settings,
            dry_run: false,
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Directory bundled macros are written to
    pub fn macro_dir(&self) -> PathBuf {
        self.settings.work_dir.join("macros")
    }

    /// Environment handed to every subprocess
    pub fn task_env(&self, stage: &str) -> Vec<(String, String)> {
        vec![
            ("TAKO_RUN_ID".to_string(), self.run_id.clone()),
            ("TAKO_WORKFLOW".to_string(), self.workflow.clone()),
            ("TAKO_STAGE".to_string(), stage.to_string()),
        ]
    }
}

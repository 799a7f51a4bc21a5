use crate::error::ArmError;
use crate::method::{MacroSource, Method, GENERIC_ALGORITHMS};
use crate::template::ArgRenderer;
use ijmacro::{ImageJInvocation, MacroArgs};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tako_core::data_model::default_output_path;
use tako_core::{
    CommandSpec, DataRef, ExecutionContext, OutputHandle, Stage, StageConfig, StageError, StageIo,
    Task,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArmKind {
    Alignment,
    Correction,
    Segmentation,
    Visualization,
    Reconstruction,
}

impl ArmKind {
    pub const ALL: [ArmKind; 5] = [
        ArmKind::Alignment,
        ArmKind::Correction,
        ArmKind::Segmentation,
        ArmKind::Visualization,
        ArmKind::Reconstruction,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArmKind::Alignment => "alignment",
            ArmKind::Correction => "correction",
            ArmKind::Segmentation => "segmentation",
            ArmKind::Visualization => "visualization",
            ArmKind::Reconstruction => "reconstruction",
        }
    }

    /// Appended to the input stem to name a derived output
    pub fn suffix(&self) -> &'static str {
        match self {
            ArmKind::Alignment => "align",
            ArmKind::Correction => "corr",
            ArmKind::Segmentation => "seg",
            ArmKind::Visualization => "vis",
            ArmKind::Reconstruction => "recon",
        }
    }

    /// Algorithms specific to this arm
    pub fn specific_algorithms(&self) -> &'static [&'static str] {
        match self {
            ArmKind::Alignment => &["sift", "method1"],
            ArmKind::Correction => &["background"],
            ArmKind::Segmentation => &["threshold"],
            ArmKind::Visualization => &["projection"],
            ArmKind::Reconstruction => &[],
        }
    }

    pub fn algorithms(&self) -> Vec<&'static str> {
        self.specific_algorithms()
            .iter()
            .chain(GENERIC_ALGORITHMS)
            .copied()
            .collect()
    }
}

impl fmt::Display for ArmKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArmKind {
    type Err = ArmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ArmKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ArmError::UnknownArm(s.to_string()))
    }
}

/// A configured stage template
#[derive(Debug, Clone)]
pub struct Arm {
    id: String,
    kind: ArmKind,
    config: StageConfig,
    method: Method,
    output_path: PathBuf,
}

impl Arm {
    /// Build an arm whose id is its kind name
    pub fn new(kind: ArmKind, config: StageConfig) -> Result<Self, ArmError> {
        Self::with_id(kind, kind.as_str(), config)
    }

    pub fn with_id(
        kind: ArmKind,
        id: impl Into<String>,
        config: StageConfig,
    ) -> Result<Self, ArmError> {
        let id = id.into();
        if !valid_id(&id) {
            return Err(ArmError::InvalidId(id));
        }

        let method = Method::resolve(kind, &config.algorithm, &config.params)?;
        let output_path = config
            .output
            .clone()
            .unwrap_or_else(|| default_output_path(config.data.path(), kind.suffix()));

        Ok(Self {
            id,
            kind,
            config,
            method,
            output_path,
        })
    }

    pub fn alignment(config: StageConfig) -> Result<Self, ArmError> {
        Self::new(ArmKind::Alignment, config)
    }

    pub fn correction(config: StageConfig) -> Result<Self, ArmError> {
        Self::new(ArmKind::Correction, config)
    }

    pub fn segmentation(config: StageConfig) -> Result<Self, ArmError> {
        Self::new(ArmKind::Segmentation, config)
    }

    pub fn visualization(config: StageConfig) -> Result<Self, ArmError> {
        Self::new(ArmKind::Visualization, config)
    }

    pub fn reconstruction(config: StageConfig) -> Result<Self, ArmError> {
        Self::new(ArmKind::Reconstruction, config)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> ArmKind {
        self.kind
    }

    pub fn config(&self) -> &StageConfig {
        &self.config
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn output_path(&self) -> &PathBuf {
        &self.output_path
    }

    /// Handle to pass as the next arm's `data`
    pub fn output(&self) -> OutputHandle {
        OutputHandle::new(self.id.clone(), self.output_path.clone())
    }

    fn imagej_task(
        &self,
        source: &MacroSource,
        extra: &[String],
        io: &StageIo,
        ctx: &ExecutionContext,
    ) -> Result<Task, StageError> {
        let macro_path = match source {
            MacroSource::File(path) => {
                if !path.is_file() {
                    return Err(StageError::ValidationFailed(format!(
                        "macro not found: {}",
                        path.display()
                    )));
                }
                path.clone()
            }
            MacroSource::Bundled(bundled) => bundled.materialize(&ctx.macro_dir()).map_err(|e| {
                StageError::ExecutionFailed(format!("cannot write macro {}: {}", bundled.name, e))
            })?,
        };

        let args = MacroArgs {
            input: io.input.clone(),
            output: io.output.clone(),
            extra: extra.to_vec(),
        };
        let imagej = &ctx.settings.imagej;
        let invocation = ImageJInvocation::new(imagej.executable.clone(), macro_path, args)
            .headless(imagej.headless);
        let argv = invocation
            .argv()
            .map_err(|e| StageError::ValidationFailed(e.to_string()))?;

        Ok(Task::Executable(CommandSpec::new(invocation.executable).args(argv)))
    }

    fn exec_task(
        &self,
        program: &Path,
        args: &[String],
        io: &StageIo,
        ctx: &ExecutionContext,
    ) -> Result<Task, StageError> {
        let (input, output) = (utf8(&io.input)?, utf8(&io.output)?);
        let renderer = ArgRenderer::new();
        let data = json!({
            "input": input,
            "output": output,
            "stage": self.id,
            "run_id": ctx.run_id,
            "params": self.config.params,
        });
        let rendered = args
            .iter()
            .map(|arg| renderer.render(arg, &data))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StageError::ValidationFailed(e.to_string()))?;

        Ok(Task::Executable(CommandSpec::new(program.to_path_buf()).args(rendered)))
    }
}

impl Stage for Arm {
    fn id(&self) -> &str {
        &self.id
    }

    fn arm(&self) -> &str {
        self.kind.as_str()
    }

    fn algorithm(&self) -> &str {
        &self.config.algorithm
    }

    fn input(&self) -> &DataRef {
        &self.config.data
    }

    fn output(&self) -> OutputHandle {
        Arm::output(self)
    }

    fn deterministic(&self) -> bool {
        self.method.deterministic()
    }

    fn prepare(&self, io: &StageIo, ctx: &ExecutionContext) -> Result<Task, StageError> {
        match &self.method {
            Method::ImageJMacro { source, extra } => self.imagej_task(source, extra, io, ctx),
            Method::Exec { program, args } => self.exec_task(program, args, io, ctx),
            Method::Copy => Ok(Task::function(|io| {
                std::fs::copy(&io.input, &io.output)
                    .map(|_| ())
                    .map_err(|e| StageError::ExecutionFailed(format!("copy failed: {}", e)))
            })),
        }
    }
}

/// Template arguments are strings, so the paths must be UTF-8
fn utf8(path: &Path) -> Result<&str, StageError> {
    path.to_str().ok_or_else(|| {
        StageError::ValidationFailed(format!("path is not valid UTF-8: {}", path.display()))
    })
}

fn valid_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;
    use tako_core::Settings;

    fn ctx(work_dir: &Path) -> ExecutionContext {
        let mut settings = Settings::default();
        settings.work_dir = work_dir.to_path_buf();
        settings.imagej.executable = PathBuf::from("/opt/Fiji.app/ImageJ-linux64");
        ExecutionContext::new("test", settings)
    }

    fn io(arm: &Arm) -> StageIo {
        StageIo {
            input: arm.config().data.path().to_path_buf(),
            output: arm.output().path,
        }
    }

    #[test]
    fn test_output_feeds_next_arm() {
        let alignment = Arm::alignment(StageConfig::new("sift", "/data/myxo-small.tif")).unwrap();
        let segmentation =
            Arm::segmentation(StageConfig::new("threshold", alignment.output())).unwrap();

        assert_eq!(alignment.output().path, PathBuf::from("/data/myxo-small_align.tif"));
        assert_eq!(
            segmentation.config().data.path(),
            Path::new("/data/myxo-small_align.tif")
        );
        assert_eq!(segmentation.config().data.upstream(), Some("alignment"));
        assert_eq!(
            segmentation.output().path,
            PathBuf::from("/data/myxo-small_align_seg.tif")
        );
    }

    #[test]
    fn test_explicit_output_wins() {
        let arm = Arm::visualization(
            StageConfig::new("projection", "in.tif").with_output("/tmp/vis/final.tif"),
        )
        .unwrap();
        assert_eq!(arm.output().path, PathBuf::from("/tmp/vis/final.tif"));
    }

    #[test]
    fn test_unknown_algorithm_refused() {
        let err = Arm::correction(StageConfig::new("method2", "in.tif")).unwrap_err();
        assert!(matches!(err, ArmError::UnknownAlgorithm { .. }));
    }

    #[test]
    fn test_invalid_id() {
        let err = Arm::with_id(ArmKind::Correction, "bad id", StageConfig::new("copy", "in.tif"))
            .unwrap_err();
        assert!(matches!(err, ArmError::InvalidId(_)));
    }

    #[test]
    fn test_bundled_macro_invocation() {
        let dir = tempfile::tempdir().unwrap();
        let arm = Arm::segmentation(
            StageConfig::new("threshold", "img.tif")
                .with_output("out.tif")
                .with_param("method", "Otsu"),
        )
        .unwrap();

        let task = arm.prepare(&io(&arm), &ctx(dir.path())).unwrap();
        let argv = task.command_line().unwrap();
        let macro_path = dir.path().join("macros/segmentation.ijm");

        assert_eq!(
            argv,
            vec![
                "/opt/Fiji.app/ImageJ-linux64".to_string(),
                "--headless".to_string(),
                "-batch".to_string(),
                macro_path.to_string_lossy().into_owned(),
                "img.tif:out.tif:Otsu".to_string(),
            ]
        );
        assert!(macro_path.is_file());
    }

    #[test]
    fn test_user_macro_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let arm = Arm::correction(
            StageConfig::new("ijmacro", "img.tif").with_param("macro", "/no/such/macro.ijm"),
        )
        .unwrap();
        let err = arm.prepare(&io(&arm), &ctx(dir.path())).unwrap_err();
        assert!(matches!(err, StageError::ValidationFailed(_)));
    }

    #[test]
    fn test_colon_in_path_refused_at_prepare() {
        let dir = tempfile::tempdir().unwrap();
        let config = StageConfig::new("sift", "scan:1.tif").with_output("out.tif");
        let arm = Arm::alignment(config).unwrap();
        let err = arm.prepare(&io(&arm), &ctx(dir.path())).unwrap_err();
        assert!(err.to_string().contains("':'"));
    }

    #[test]
    fn test_exec_templates_rendered() {
        let dir = tempfile::tempdir().unwrap();
        let arm = Arm::with_id(
            ArmKind::Reconstruction,
            "wbp",
            StageConfig::new("exec", "/data/tilt.mrc")
                .with_output("/data/tomo.mrc")
                .with_param("program", "tomo-wbp")
                .with_param(
                    "args",
                    json!([
                        "-i",
                        "{{input}}",
                        "-o",
                        "{{output}}",
                        "--tag={{stage}}-{{stem input}}",
                        "--fsize={{params.fsize}}"
                    ]),
                )
                .with_param("fsize", 3),
        )
        .unwrap();

        let argv = arm.prepare(&io(&arm), &ctx(dir.path())).unwrap().command_line().unwrap();
        assert_eq!(
            argv,
            vec![
                "tomo-wbp",
                "-i",
                "/data/tilt.mrc",
                "-o",
                "/data/tomo.mrc",
                "--tag=wbp-tilt",
                "--fsize=3"
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_exec_refuses_non_utf8_paths() {
        use std::os::unix::ffi::OsStrExt;
        let dir = tempfile::tempdir().unwrap();
        let input = Path::new(std::ffi::OsStr::from_bytes(b"/data/scan\xff.tif"));
        let arm = Arm::reconstruction(StageConfig::new("exec", input).with_param("program", "cp"))
            .unwrap();

        let err = arm.prepare(&io(&arm), &ctx(dir.path())).unwrap_err();
        assert!(matches!(err, StageError::ValidationFailed(ref m) if m.contains("UTF-8")));
    }

    #[test]
    fn test_kind_round_trip_names() {
        for kind in ArmKind::ALL {
            assert_eq!(kind.as_str().parse::<ArmKind>().unwrap(), kind);
            assert!(kind.algorithms().contains(&"copy"));
        }
        assert!("tentacle".parse::<ArmKind>().is_err());
    }
}

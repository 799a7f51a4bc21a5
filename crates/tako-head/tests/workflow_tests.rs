//! End-to-end runs of YAML and programmatic workflows, with `cp` and `sh`
//! standing in for ImageJ.

use std::fs;
use std::path::{Path, PathBuf};
use tako_arms::{Arm, ArmKind};
use tako_core::{RunStatus, Settings, StageConfig, StageStatus, TakoError, TaskState};
use tako_head::{Head, HeadError, Workflow};

fn head(dir: &Path) -> Head {
    let mut settings = Settings::default();
    settings.work_dir = dir.join(".tako");
    settings.runner.stage_timeout_secs = Some(30);
    Head::new(settings).unwrap()
}

fn write_workflow(dir: &Path, yaml: &str) -> PathBuf {
    let path = dir.join("workflow.yaml");
    fs::write(&path, yaml).unwrap();
    path
}

const CHAIN: &str = r#"
name: chain
stages:
  - id: ingest
    arm: correction
    algorithm: copy
    data: scan.txt
  - id: stage2
    arm: reconstruction
    algorithm: exec
    data: PREVIOUS
    params:
      program: cp
  - id: shout
    arm: segmentation
    algorithm: exec
    data: PREVIOUS
    params:
      program: sh
      args: ["-c", "tr a-z A-Z < \"$0\" > \"$1\"", "{{input}}", "{{output}}"]
"#;

#[tokio::test]
async fn test_three_stage_chain() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("scan.txt"), "myxo\n").unwrap();
    let workflow = Workflow::from_file(write_workflow(dir.path(), CHAIN)).unwrap();

    let report = head(dir.path()).do_workflow(workflow).await.unwrap();

    assert_eq!(report.status, RunStatus::Succeeded);
    assert_eq!(report.pipeline_id, "ingest→stage2→shout");
    assert_eq!(report.stages.len(), 3);
    assert!(report
        .stages
        .iter()
        .all(|s| s.status == StageStatus::Succeeded && s.output_hash.is_some()));

    let ingest = report.stage("ingest").unwrap();
    let stage2 = report.stage("stage2").unwrap();
    assert_eq!(ingest.output, dir.path().join("scan_corr.txt"));
    assert_eq!(stage2.input, ingest.output);
    assert_eq!(stage2.output, dir.path().join("scan_corr_recon.txt"));
    assert_eq!(ingest.output_hash, stage2.output_hash);

    let final_output = report.final_output().unwrap();
    assert_eq!(final_output, dir.path().join("scan_corr_recon_seg.txt"));
    assert_eq!(fs::read_to_string(final_output).unwrap(), "MYXO\n");
    assert_eq!(report.stage("shout").unwrap().command.as_ref().unwrap()[0], "sh");
}

#[tokio::test]
async fn test_failing_stage_stops_run() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("scan.txt"), "data").unwrap();
    let yaml = r#"
name: broken
stages:
  - { id: first, arm: correction, algorithm: copy, data: scan.txt }
  - id: second
    arm: reconstruction
    algorithm: exec
    data: PREVIOUS
    params: { program: sh, args: ["-c", "echo no tilt axis >&2; exit 3"] }
  - { id: third, arm: segmentation, algorithm: copy, data: PREVIOUS }
"#;
    let workflow = Workflow::from_file(write_workflow(dir.path(), yaml)).unwrap();

    let submission = head(dir.path()).submit(workflow).await;

    match &submission.outcome {
        Err(HeadError::Run(TakoError::StageFailed { stage, source })) => {
            assert_eq!(stage, "second");
            assert!(source.to_string().contains("no tilt axis"));
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(submission.log.check("first"), Some(TaskState::Done));
    assert_eq!(submission.log.check("second"), Some(TaskState::Failed));
    assert_eq!(submission.log.check("third"), None);
    assert!(!dir.path().join("scan_corr_recon_seg.txt").exists());
}

#[tokio::test]
async fn test_parallel_fan_out() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("scan.txt"), "data").unwrap();
    let yaml = r#"
name: fan
stages:
  - { arm: alignment, algorithm: copy, data: scan.txt }
  - parallel:
      - { id: seg, arm: segmentation, algorithm: copy, data: PREVIOUS }
      - { id: vis, arm: visualization, algorithm: copy, data: PREVIOUS }
  - { arm: correction, algorithm: copy, data: PREVIOUS.seg }
"#;
    let workflow = Workflow::from_file(write_workflow(dir.path(), yaml)).unwrap();

    let report = head(dir.path()).do_workflow(workflow).await.unwrap();

    assert_eq!(report.pipeline_id, "alignment→{seg|vis}→correction");
    let ids: Vec<&str> = report.stages.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["alignment", "seg", "vis", "correction"]);
    assert_eq!(report.stage("seg").unwrap().input, report.stage("vis").unwrap().input);
    assert!(dir.path().join("scan_align_vis.txt").is_file());
    assert!(dir.path().join("scan_align_seg_corr.txt").is_file());
}

#[tokio::test]
async fn test_rejected_plan_keeps_run_id_and_log() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = r#"
name: dup
stages:
  - { arm: correction, algorithm: copy, data: a.txt }
  - { arm: correction, algorithm: copy, data: b.txt }
"#;
    let workflow = Workflow::from_file(write_workflow(dir.path(), yaml)).unwrap();

    let submission = head(dir.path()).submit(workflow).await;

    assert!(!submission.run_id.is_empty());
    assert!(matches!(submission.outcome, Err(HeadError::Plan(_))));
    let failed = submission.log.failed();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].activity, "plan");
}

#[tokio::test]
async fn test_dry_run_resolves_without_writing() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("scan.tif"), "pixels").unwrap();
    let yaml = r#"
name: dry
stages:
  - { arm: alignment, algorithm: sift, data: scan.tif }
  - { arm: segmentation, algorithm: threshold, data: PREVIOUS, params: { method: Otsu } }
"#;
    let workflow = Workflow::from_file(write_workflow(dir.path(), yaml)).unwrap();

    let submission = head(dir.path()).dry_run(workflow).await;
    let report = submission.outcome.unwrap();

    assert_eq!(report.status, RunStatus::DryRun);
    assert!(report.stages.iter().all(|s| s.status == StageStatus::Skipped));
    let argv = report.stage("segmentation").unwrap().command.clone().unwrap();
    assert_eq!(argv[1..3], ["--headless".to_string(), "-batch".to_string()]);
    assert_eq!(
        argv[4],
        format!(
            "{}:{}:Otsu",
            dir.path().join("scan_align.tif").display(),
            dir.path().join("scan_align_seg.tif").display()
        )
    );
    assert!(!dir.path().join("scan_align.tif").exists());
    assert!(dir.path().join(".tako/macros/segmentation.ijm").is_file());
}

#[tokio::test]
async fn test_programmatic_chain() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("stack.tif");
    fs::write(&input, "pixels").unwrap();

    let correction = Arm::correction(StageConfig::new("copy", input.as_path())).unwrap();
    let project = Arm::with_id(
        ArmKind::Visualization,
        "project",
        StageConfig::new("copy", correction.output()).with_output(dir.path().join("out/final.tif")),
    )
    .unwrap();

    let report = head(dir.path())
        .do_workflow(vec![correction, project])
        .await
        .unwrap();

    assert_eq!(report.workflow, "workflow");
    assert_eq!(fs::read_to_string(dir.path().join("out/final.tif")).unwrap(), "pixels");
}

/// Checks the headless batch argv, logs it next to itself, then copies
/// `<input>` to `<output>` from the `input:output[:...]` argument.
const IMAGEJ_STAND_IN: &str = r#"#!/bin/sh
if [ "$#" -ne 4 ] || [ "$1" != "--headless" ] || [ "$2" != "-batch" ]; then
    echo "unexpected argv: $*" >&2
    exit 2
fi
[ -f "$3" ] || { echo "macro not found: $3" >&2; exit 2; }
printf '%s\n' "$@" >> "$(dirname "$0")/argv.log"
input="${4%%:*}"
rest="${4#*:}"
cp "$input" "${rest%%:*}"
"#;

#[cfg(unix)]
fn imagej_stand_in(dir: &Path) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;
    let script = dir.join("imagej");
    fs::write(&script, IMAGEJ_STAND_IN).unwrap();
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
    script
}

#[cfg(unix)]
#[tokio::test]
async fn test_imagej_stages_run_in_batch_mode() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("scan.tif"), "pixels").unwrap();
    fs::create_dir(dir.path().join("macros")).unwrap();
    fs::write(dir.path().join("macros/vis.ijm"), "// projection").unwrap();

    let mut settings = Settings::default();
    settings.work_dir = dir.path().join(".tako");
    settings.imagej.executable = imagej_stand_in(dir.path());
    settings.runner.stage_timeout_secs = Some(30);
    let yaml = r#"
name: batch
stages:
  - { arm: alignment, algorithm: sift, data: scan.tif }
  - { arm: segmentation, algorithm: threshold, data: PREVIOUS, params: { method: Otsu } }
  - arm: visualization
    algorithm: ijmacro
    data: PREVIOUS
    params: { macro: macros/vis.ijm, args: [Fire] }
"#;
    let workflow = Workflow::from_file(write_workflow(dir.path(), yaml)).unwrap();

    let report = Head::new(settings).unwrap().do_workflow(workflow).await.unwrap();

    let scan = dir.path().join("scan.tif");
    let aligned = dir.path().join("scan_align.tif");
    let mask = dir.path().join("scan_align_seg.tif");
    let shown = dir.path().join("scan_align_seg_vis.tif");
    assert_eq!(fs::read_to_string(&shown).unwrap(), "pixels");
    assert_eq!(report.stages.len(), 3);
    for stage in &report.stages {
        assert_eq!(stage.status, StageStatus::Succeeded);
        assert_eq!(stage.exit_code, Some(0));
        assert!(stage.output_hash.as_deref().unwrap().starts_with("blake3:"));
    }
    assert_eq!(report.stages[0].output_hash, report.stages[2].output_hash);

    let macros = dir.path().join(".tako/macros");
    let calls = [
        (macros.join("alignment.ijm"), format!("{}:{}", scan.display(), aligned.display())),
        (macros.join("segmentation.ijm"), format!("{}:{}:Otsu", aligned.display(), mask.display())),
        (dir.path().join("macros/vis.ijm"), format!("{}:{}:Fire", mask.display(), shown.display())),
    ];
    let expected: Vec<String> = calls
        .iter()
        .flat_map(|(macro_path, arg)| {
            [
                "--headless".to_string(),
                "-batch".to_string(),
                macro_path.display().to_string(),
                arg.clone(),
            ]
        })
        .collect();
    let argv = fs::read_to_string(dir.path().join("argv.log")).unwrap();
    assert_eq!(argv.lines().collect::<Vec<_>>(), expected);
}

#[cfg(unix)]
#[tokio::test]
async fn test_non_utf8_input_path() {
    use std::os::unix::ffi::OsStrExt;
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join(std::ffi::OsStr::from_bytes(b"scan\xff.tif"));
    fs::write(&input, "pixels").unwrap();
    let arm = Arm::correction(StageConfig::new("copy", input.as_path())).unwrap();
    let output = arm.output_path().clone();

    let submission = head(dir.path()).submit(vec![arm]).await;

    let report = submission.outcome.unwrap();
    assert_eq!(report.stages[0].output, output);
    assert_eq!(fs::read_to_string(&output).unwrap(), "pixels");
    let start = submission.log.for_stage("correction")[0];
    let logged = start.context.as_ref().unwrap()["input"].as_str().unwrap();
    assert!(logged.contains("scan"));
}

fn fixture(relative: &str) -> PathBuf {
    let manifest_dir = std::env::var("CARGO_MANIFEST_DIR").unwrap();
    let workspace_root = Path::new(&manifest_dir).parent().unwrap().parent().unwrap();
    workspace_root.join("testing/fixtures").join(relative)
}

#[test]
fn test_fixture_workflow_plans() {
    let settings = Settings::load(fixture("settings/tako.yaml")).unwrap();
    let head = Head::new(settings).unwrap();
    let workflow = Workflow::from_file(fixture("workflows/myxo.yaml")).unwrap();

    let plan = head.plan(workflow).unwrap();
    let view = plan.view();

    assert_eq!(view.pipeline_id, "alignment→{seg|vis}→correction");
    assert_eq!(
        view.steps[2].stages[0].output,
        fixture("workflows/results/myxo_mask.tif")
    );
    assert!(plan.to_dot().contains("\"seg\" -> \"correction\""));
}

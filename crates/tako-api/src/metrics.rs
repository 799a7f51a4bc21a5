//! Prometheus registry behind `/metrics`.
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounterVec, Opts, Registry, TextEncoder,
};
use tako_head::Submission;

pub struct Metrics {
    registry: Registry,
    runs: IntCounterVec,
    stages: IntCounterVec,
    run_duration: Histogram,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let runs = IntCounterVec::new(
            Opts::new("tako_runs_total", "Workflow submissions by outcome"),
            &["status"],
        )?;
        let stages = IntCounterVec::new(
            Opts::new("tako_stages_total", "Finished stages by arm"),
            &["arm"],
        )?;
        let run_duration = Histogram::with_opts(
            HistogramOpts::new("tako_run_duration_seconds", "Wall clock time of successful runs")
                .buckets(vec![0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 300.0, 1800.0]),
        )?;

        registry.register(Box::new(runs.clone()))?;
        registry.register(Box::new(stages.clone()))?;
        registry.register(Box::new(run_duration.clone()))?;

        Ok(Self {
            registry,
            runs,
            stages,
            run_duration,
        })
    }

    pub fn observe(&self, submission: &Submission) {
        match &submission.outcome {
            Ok(report) => {
                self.runs.with_label_values(&[status_label(report.status)]).inc();
                for stage in &report.stages {
                    self.stages.with_label_values(&[stage.arm.as_str()]).inc();
                }
                self.run_duration.observe(report.duration_ms() as f64 / 1000.0);
            }
            Err(_) => self.runs.with_label_values(&["failed"]).inc(),
        }
    }

    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).to_string())
    }
}

fn status_label(status: tako_core::RunStatus) -> &'static str {
    match status {
        tako_core::RunStatus::Succeeded => "succeeded",
        tako_core::RunStatus::DryRun => "dry_run",
    }
}

//! Binary entrypoint for the TAKO API server.
use anyhow::Context;
use std::sync::Arc;
use tako_api::{run, AppState};
use tako_core::Settings;
use tako_head::{init_tracing, Head};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // TAKO_ADDR and TAKO_SETTINGS pick the listen address and settings file
    let addr = std::env::var("TAKO_ADDR").unwrap_or_else(|_| "0.0.0.0:8787".to_string());
    let settings = match std::env::var("TAKO_SETTINGS") {
        Ok(path) => {
            Settings::load(&path).with_context(|| format!("cannot load settings {}", path))?
        }
        Err(_) => Settings::default(),
    }
    .apply_env()?;
    init_tracing(&settings.log);

    let state = AppState::new(Head::new(settings)?)?;
    run(&addr, Arc::new(state))
        .await
        .with_context(|| format!("server on {} stopped", addr))
}

/// digit-cnn Studio
///
/// Browser front end for the digit classifier, served by a synchronous
/// tiny_http server; no JavaScript frameworks required.
///
/// Run with:
///   cargo run --bin studio --release
/// Then open http://127.0.0.1:7878
///
/// Tabs:
///   1. Train: load MNIST, build a variant, watch per-epoch progress over
///              SSE, then read test accuracy, per-class accuracy and the
///              confusion matrix
///   2. Draw : draw on a canvas; every stroke runs one prediction

mod state;
mod render;
mod routes;
mod handlers;
mod util;

use std::sync::{Arc, Mutex};
use anyhow::{anyhow, Context};
use log::info;
use tiny_http::Server;

use state::StudioState;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let addr = std::env::var("STUDIO_ADDR").unwrap_or_else(|_| "127.0.0.1:7878".to_owned());
    let server = Server::http(&addr).map_err(|e| anyhow!("failed to bind {}: {}", addr, e))?;

    std::fs::create_dir_all(handlers::train::MODEL_DIR)
        .with_context(|| format!("creating {}/", handlers::train::MODEL_DIR))?;

    let shared_state = Arc::new(Mutex::new(StudioState::new()));
    info!("studio listening on http://{}", addr);

    // Each request is dispatched on its own thread so the SSE handler
    // (which blocks for the entire training duration) does not stall
    // regular page loads and predictions.
    for request in server.incoming_requests() {
        let state_clone = shared_state.clone();
        std::thread::spawn(move || {
            routes::dispatch(request, state_clone);
        });
    }
    Ok(())
}

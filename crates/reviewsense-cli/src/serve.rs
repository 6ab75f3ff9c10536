//! `reviewsense serve`: one process hosting the API and the webhook routes.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Args;
use reviewsense_ai::{DEFAULT_MODEL_ID, RemoteClassifier, SentimentModel};
use reviewsense_api::{AppState, PredictionService, build_router};
use reviewsense_store::DuckStore;
use reviewsense_sync::{HookState, PredictClient, TriggerHandler, hook_routes};
use tokio::signal;
use tracing::{info, warn};

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// DuckDB file, or `:memory:`.
    #[arg(long, env = "REVIEWSENSE_DATABASE")]
    database: String,

    #[arg(long, env = "REVIEWSENSE_MODEL_ID", default_value = DEFAULT_MODEL_ID)]
    model_id: String,

    /// Directory with `model.onnx` and `tokenizer.json` [default: models/<model-id>].
    #[arg(long, env = "REVIEWSENSE_MODEL_DIR")]
    model_dir: Option<PathBuf>,

    /// Use a remote inference endpoint instead of the local model.
    /// `huggingface` selects the hosted endpoint for `--model-id`.
    #[arg(long, env = "REVIEWSENSE_INFERENCE_URL")]
    inference_url: Option<String>,

    #[arg(long, env = "REVIEWSENSE_BIND", default_value = "0.0.0.0:8001")]
    bind: SocketAddr,

    /// Bound on each model call and each store call.
    #[arg(long, default_value_t = 5)]
    timeout_secs: u64,
}

pub async fn run(args: ServeArgs) -> anyhow::Result<()> {
    info!("reviewsense v{}", env!("CARGO_PKG_VERSION"));

    let store = DuckStore::open_location(&args.database)
        .with_context(|| format!("opening store {}", args.database))?;
    info!(database = %args.database, "store ready");

    let model = load_model(&args)?;
    let service = PredictionService::new(model, Arc::new(store.clone()))
        .with_timeout(Duration::from_secs(args.timeout_secs));

    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("binding {}", args.bind))?;
    let local = listener.local_addr()?;

    // The trigger handler reaches /predict over HTTP, like any other caller.
    let self_url = loopback_url(local);
    let handler = TriggerHandler::new(PredictClient::new(self_url.clone())?, Arc::new(store));

    let app = build_router(AppState::new(service)).merge(hook_routes(HookState::new(handler)));

    info!(addr = %local, trigger_target = %self_url, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("server shutdown complete");
    Ok(())
}

fn load_model(args: &ServeArgs) -> anyhow::Result<Arc<dyn SentimentModel>> {
    if let Some(url) = &args.inference_url {
        let token = std::env::var("HF_TOKEN").ok();
        let remote = if url.eq_ignore_ascii_case("huggingface") {
            RemoteClassifier::hugging_face(&args.model_id)?
        } else {
            RemoteClassifier::new(url.as_str(), args.model_id.as_str())?
        };
        let remote = remote.with_token(token);
        info!(url = %remote.url(), model = %args.model_id, "using remote inference endpoint");
        return Ok(Arc::new(remote));
    }
    load_local_model(args)
}

#[cfg(feature = "onnx")]
fn load_local_model(args: &ServeArgs) -> anyhow::Result<Arc<dyn SentimentModel>> {
    let dir = args
        .model_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("models").join(&args.model_id));
    let model = reviewsense_ai::OnnxClassifier::load(&dir, args.model_id.as_str())
        .with_context(|| format!("loading model from {}", dir.display()))?;
    Ok(Arc::new(model))
}

#[cfg(not(feature = "onnx"))]
fn load_local_model(_args: &ServeArgs) -> anyhow::Result<Arc<dyn SentimentModel>> {
    anyhow::bail!("built without ONNX support; pass --inference-url")
}

/// URL for reaching a server bound at `addr` from the same host.
fn loopback_url(addr: SocketAddr) -> String {
    let target = match addr {
        SocketAddr::V4(v4) if v4.ip().is_unspecified() => {
            SocketAddr::from((Ipv4Addr::LOCALHOST, v4.port()))
        }
        SocketAddr::V6(v6) if v6.ip().is_unspecified() => {
            SocketAddr::from((Ipv6Addr::LOCALHOST, v6.port()))
        }
        other => other,
    };
    format!("http://{target}")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, shutting down"),
        _ = terminate => info!("received terminate signal, shutting down"),
    }
}

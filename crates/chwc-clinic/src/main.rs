use anyhow::Context;
use axum_login::{
    tower_sessions::{MemoryStore, SessionManagerLayer},
    AuthManagerLayerBuilder,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod appointments;
mod approval;
mod cipher;
mod clinic;
mod config;
mod domain;
mod eligibility;
mod emergency;
mod error;
mod login;
#[cfg(test)]
mod memory;
mod onboarding;
mod routes;
mod store;

const DEFAULT_FILTER: &str = "info";

#[tokio::main]
pub async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = config::load().context("loading configuration")?;
    init_tracing(&config.tracing);
    let cipher = Arc::new(
        cipher::Cipher::from_base64_encoded(&config.master_secret).context("configuring cipher")?,
    );
    let uploads = approval::UploadDir::new(config.upload_dir);
    tokio::fs::create_dir_all(uploads.path())
        .await
        .with_context(|| format!("creating upload directory {}", uploads.path().display()))?;
    let store = chwc_db::create(&config.database)
        .await
        .context("creating database store")?;
    let clinic = clinic::Clinic::new(Arc::new(store), config.store_timeout);
    let session_layer =
        SessionManagerLayer::new(MemoryStore::default()).with_secure(config.secure_cookies);
    let login_backend = login::create_backend(clinic.clone());
    let auth_layer = AuthManagerLayerBuilder::new(login_backend, session_layer).build();
    let app_state = AppState {
        clinic,
        cipher,
        uploads,
    };
    let app = routes::setup(app_state, auth_layer, config.max_upload_size);
    let listener = tokio::net::TcpListener::bind((config.bind_address.as_str(), config.bind_port))
        .await
        .context("binding listener")?;
    tracing::info!(address = ?listener.local_addr().ok(), "serving");

    let cancellation_token = CancellationToken::new();
    tokio::spawn(cancel_on_ctrl_c(cancellation_token.clone()));
    axum::serve(listener, app)
        .with_graceful_shutdown(cancellation_token.cancelled_owned())
        .await
        .context("serving application")?;
    tracing::info!("stopped");
    Ok(())
}

fn init_tracing(config: &config::TracingConfig) {
    if config.console {
        console_subscriber::init();
        return;
    }
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(config.filter.as_deref().unwrap_or(DEFAULT_FILTER))
    });
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn cancel_on_ctrl_c(cancellation_token: CancellationToken) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(%err, "unable to listen for shutdown signal");
        return;
    }
    tracing::info!("shutting down");
    cancellation_token.cancel();
}

#[derive(Clone)]
struct AppState {
    clinic: clinic::Clinic,
    cipher: Arc<cipher::Cipher>,
    uploads: approval::UploadDir,
}

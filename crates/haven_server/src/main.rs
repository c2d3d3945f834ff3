//! Haven server - main entry point.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use haven_chat::{ChatError, ChatService, ModelSettings, OpenAiGenerator};
use haven_server::{app, AppState, ServerArgs};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> ExitCode {
    let args = ServerArgs::parse();
    init_logging(args.log_json);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("haven=info,haven_chat=info,haven_server=info,tower_http=info"));

    let registry = tracing_subscriber::registry().with(filter);
    let log_result = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().with_target(false)).try_init()
    };

    if log_result.is_err() {
        // Logging already initialized, continue
    }
}

async fn run(args: ServerArgs) -> anyhow::Result<()> {
    let settings = match &args.settings {
        Some(path) => ModelSettings::from_file(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => ModelSettings::default(),
    };

    let api_key = args
        .openai_api_key
        .clone()
        .filter(|key| !key.is_empty())
        .ok_or(ChatError::LlmNotConfigured)?;
    let mut generator = OpenAiGenerator::new(api_key);
    if let Some(base_url) = &args.openai_base_url {
        generator = generator.with_base_url(base_url);
    }
    info!(
        base_url = generator.base_url(),
        classifier = %settings.classifier_model,
        issue_detector = %settings.issue_detector_model,
        tenancy_expert = %settings.tenancy_expert_model,
        "Model client configured"
    );

    let chat = ChatService::from_generator(Arc::new(generator), &settings);
    let router = app(AppState::new(chat), args.max_upload_bytes);

    let addr = args.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(%addr, "Haven listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        error!("Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

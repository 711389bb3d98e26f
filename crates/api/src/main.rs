use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;

use officedesk_ai::OpenAiCompletionService;
use officedesk_infra::{ServiceConfig, Services};

// The completion service uses a blocking HTTP client, so the services are
// built (and dropped) outside the async runtime.
fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    officedesk_observability::init();

    let config = ServiceConfig::from_env().context("invalid configuration")?;
    if config.openai.api_key.is_empty() {
        tracing::warn!("OPENAI_API_KEY not set; completion requests will fail");
    }
    if config.schedule_key.is_none() {
        tracing::warn!("DISPOSABLE_APP_KEY not set; schedule trigger endpoints are disabled");
    }

    let completion = Arc::new(OpenAiCompletionService::new(config.openai.clone())?);
    let services = Arc::new(Services::start(config.clone(), completion)?);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    let served = runtime.block_on(serve(config.bind_addr, services.clone()));
    drop(runtime);

    services.shutdown();
    served
}

async fn serve(addr: SocketAddr, services: Arc<Services>) -> anyhow::Result<()> {
    let app = officedesk_api::app::build_app(services);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await?;
    Ok(())
}

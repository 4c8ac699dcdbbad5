use anyhow::Result;
use pulse_api::{build_app, ServiceConfig};
use pulse_ml::StackOptions;
use pulse_observability::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("pulse_api");

    let config = ServiceConfig::from_env();
    let options = StackOptions::from_env();
    let bind = config.bind.clone();
    let model_path = options.model_path.display().to_string();

    let app = build_app(options, config).await?;

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    tracing::info!(bind = %bind, model_path = %model_path, "complaint service api started");

    axum::serve(listener, app).await?;
    Ok(())
}

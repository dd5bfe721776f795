use medscan_service::{ServiceConfig, create_app};
use tokio::net::TcpListener;
use tracing::{Level, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = ServiceConfig::from_env();
    let app = create_app(&config);
    let listener = TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    let addr = listener.local_addr()?;

    info!("MedScan service starting on {}", addr);
    info!("Health check endpoint: http://{}/health", addr);
    info!("Upload endpoint: POST http://{}/upload", addr);
    info!("Analysis endpoint: POST http://{}/analyze", addr);
    info!("Upload limit: {} bytes", config.max_upload_bytes);

    axum::serve(listener, app).await?;

    Ok(())
}

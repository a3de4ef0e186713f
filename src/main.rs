use std::sync::Arc;

use delivery_tracker::api::rest::router;
use delivery_tracker::auth::login;
use delivery_tracker::client::{
    HttpBackend, LocationSource, ManualLocation, NominatimGeocoder, ReverseGeocoder,
    TrackingBackend,
};
use delivery_tracker::config::Config;
use delivery_tracker::error::AppError;
use delivery_tracker::state::AppState;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false)
        .compact()
        .init();

    let backend: Arc<dyn TrackingBackend> =
        Arc::new(HttpBackend::new(&config.api_url, config.request_timeout)?);
    let geocoder: Arc<dyn ReverseGeocoder> =
        Arc::new(NominatimGeocoder::new(&config.geocoder_url, config.request_timeout)?);
    let location: Arc<dyn LocationSource> = Arc::new(ManualLocation::new(config.device_position));

    // an authentication failure stops startup here
    let session = login(backend.as_ref(), &config.email, &config.password).await?;

    let state = Arc::new(AppState::new(
        config.clone(),
        session,
        backend,
        location,
        Some(geocoder),
    ));
    state.start().await;

    let app = router(state.clone());

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(http_port = config.http_port, api_url = %config.api_url, "dashboard api started");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")));

    state.shutdown();
    served
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}

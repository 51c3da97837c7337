use axum::extract::DefaultBodyLimit;
use question_bank::{
    config::{get_config, init_config, LogFormat},
    database::pool::{create_pool, run_migrations},
    models::question::IMAGE_DIR_NAME,
    routes, AppState,
};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_config()?;
    let config = get_config();
    init_tracing(config.log_format);

    let pool = create_pool().await?;
    run_migrations(&pool).await?;

    let app_state = AppState::new(pool);

    let images_dir = config.asset_root.join(IMAGE_DIR_NAME);
    info!("Storing extracted images in: {}", images_dir.display());
    if config.warm_image_cache {
        let cache = app_state.image_cache.clone();
        let dir = images_dir.clone();
        match tokio::task::spawn_blocking(move || cache.warm_from_dir(&dir)).await? {
            Ok(added) => info!(added, "Image cache warmed from disk"),
            Err(e) => tracing::warn!(error = %e, "Could not warm image cache"),
        }
    }

    let app = routes::api_router()
        .with_state(app_state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(config.max_upload_bytes));

    let addr: SocketAddr = config.server_address.parse()?;
    info!("Server listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

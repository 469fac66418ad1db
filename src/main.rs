use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::Context;
use dotenv::dotenv;
use qaboard_server::config::CorsConfig;
use qaboard_server::{configure_routes, AppState, Settings};
use std::net::TcpListener;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

fn build_cors(config: &CorsConfig) -> Cors {
    let cors = if config.allows_any_origin() {
        Cors::default().allow_any_origin()
    } else {
        config
            .allowed_origins
            .iter()
            .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
            .supports_credentials()
    };

    cors.allow_any_method().allow_any_header()
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv().ok();

    // Initialize logging
    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    let config = Settings::new().context("failed to load configuration")?;
    info!("Configuration loaded successfully ({} environment)", config.environment);

    let state = AppState::new(config.clone())
        .await
        .context("failed to initialise application state")?;
    let state = web::Data::new(state);

    let listener = TcpListener::bind(format!("{}:{}", config.server.host, config.server.port))
        .with_context(|| format!("failed to bind {}:{}", config.server.host, config.server.port))?;

    info!(
        "Q&A board listening on http://{0}:{1}, live updates at ws://{0}:{1}/api/v1/questions/ws",
        config.server.host, config.server.port
    );

    let cors_config = config.cors.clone();
    let app_state = state.clone();
    HttpServer::new(move || {
        App::new()
            .wrap(build_cors(&cors_config))
            .app_data(app_state.clone())
            .configure(configure_routes)
    })
    .listen(listener)?
    .workers(config.server.workers as usize)
    .run()
    .await
    .context("server terminated with an error")?;

    state.shutdown().await?;
    info!("Server stopped");
    Ok(())
}

use actix_web::{middleware::Logger, web, App, HttpServer};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use reviewboard::config::Config;
use reviewboard::handlers::{configure, AppState};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::load();
    let bind_addr = config.bind_addr.clone();
    info!("Using content API at {}", config.api_url);

    let state = web::Data::new(AppState::new(config)?);

    info!("Server listening on http://{}", bind_addr);
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(Logger::default())
            .configure(configure)
    })
    .bind(&bind_addr)?
    .run()
    .await?;

    info!("Server shutting down");
    Ok(())
}

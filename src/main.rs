use axum::serve;
use jsonapi_engine::config::AppConfig;
use jsonapi_engine::{build_app, build_handler};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    use env_logger::Builder;
    use log::LevelFilter;

    Builder::new()
        .filter_level(LevelFilter::Info)
        .filter_module("jsonapi_engine", LevelFilter::Debug)
        .parse_default_env()
        .init();

    println!("JSON:API query-resolution engine");

    // Load configuration
    let config = AppConfig::load()?;
    println!(
        "Configuration loaded: server={}:{} languages={}",
        config.server.host,
        config.server.port,
        config.engine.languages.join(",")
    );

    if config.engine.load_seed_data {
        println!("Loading seed data...");
    }
    let handler = build_handler(&config).await?;

    run_server(build_app(handler), &config).await?;

    Ok(())
}

async fn run_server(app: axum::Router, config: &AppConfig) -> anyhow::Result<()> {
    let bind_address = config.server_address();
    let listener = TcpListener::bind(&bind_address).await?;
    println!("Server running on http://{}", bind_address);

    serve(listener, app).await?;

    Ok(())
}

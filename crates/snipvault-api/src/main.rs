mod auth;
mod config;
mod error;
mod rate_limit;
mod routes;
mod store;

#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::time::Duration;

use auth::JwtVerifier;
use config::AppConfig;
use routes::{app_router, AppState};
use store::ServerStore;

const DEV_TOKEN_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Only load .env in development; production uses platform-native env injection.
    #[cfg(debug_assertions)]
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("snipvault_api=info".parse().expect("valid directive")),
        )
        .init();

    let config = Arc::new(AppConfig::from_env()?);

    // `snipvault-api mint-token <user-id>` prints a bearer token signed with
    // the configured secret, for local setups without an identity provider.
    let args: Vec<String> = std::env::args().skip(1).collect();
    if let [command, user_id] = args.as_slice() {
        if command == "mint-token" {
            let token = JwtVerifier::from_config(&config).issue_token(user_id, DEV_TOKEN_TTL)?;
            println!("{token}");
            return Ok(());
        }
    }

    tracing::info!("Starting snipvault-api with config: {:?}", config);

    let store = ServerStore::open(&config.db_path)?;
    let state = AppState::new(config, store);
    let bind_addr = state.config.bind_addr.clone();
    let router = app_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("snipvault-api listening on {}", bind_addr);
    axum::serve(listener, router).await?;
    Ok(())
}

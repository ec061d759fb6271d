use clap::{Arg, Command};
use piping_relay::{build_router, AppState};
use tracing::info;

fn validate_bind_addr(value: &str) -> Result<String, String> {
    value
        .parse::<std::net::SocketAddr>()
        .map(|_| value.to_owned())
        .map_err(|_| "invalid bind address, expected host:port".to_owned())
}

#[tokio::main]
async fn main() {
    let matches = Command::new("piping-relay")
        .version(env!("CARGO_PKG_VERSION"))
        .author("iwismer <isaac@iwismer.ca>")
        .about("A streaming HTTP rendezvous relay: one sender, N receivers, zero storage")
        .arg(
            Arg::new("bind")
                .help("The address to bind the HTTP server to")
                .short('b')
                .long("bind")
                .value_parser(validate_bind_addr)
                .env("BIND_ADDR")
                .default_value("0.0.0.0:8080"),
        )
        .arg(
            Arg::new("root")
                .help("Mount prefix reserved for future use; rendezvous keys are always resolved against '/'")
                .long("root")
                .env("ROOT_PATH")
                .default_value("/"),
        )
        .arg(
            Arg::new("log-level")
                .help("Tracing verbosity (overridden by RUST_LOG/LOG_LEVEL if set)")
                .long("log-level")
                .env("LOG_LEVEL")
                .default_value("info"),
        )
        .get_matches();

    let log_level = matches
        .get_one::<String>("log-level")
        .expect("has a default value")
        .clone();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "piping-relay starting");

    let bind_addr = matches
        .get_one::<String>("bind")
        .expect("has a default value")
        .clone();

    let state = AppState::new();
    let registry = std::sync::Arc::clone(&state.registry);
    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("failed to bind");
    info!(addr = %bind_addr, "server listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_and_destroy_transfers(registry))
        .await
        .expect("server error");
    info!("server shut down gracefully");
}

/// Waits for the shutdown signal, then forcibly aborts every in-flight
/// transfer task so its participants' connections are torn down rather than
/// drained (spec.md §9: shutdown "must destroy any in-flight transfers by
/// tearing down participant connections", not merely stop accepting new
/// ones). Resolving this future is what lets `with_graceful_shutdown`'s wait
/// for open connections finish promptly instead of stalling on a long-lived
/// transfer.
async fn shutdown_and_destroy_transfers(registry: std::sync::Arc<piping_relay::registry::Registry>) {
    shutdown_signal().await;
    info!("destroying in-flight transfers");
    registry.abort_all_transfers();
}

/// Waits for SIGTERM or Ctrl-C (SIGINT) and returns to trigger graceful shutdown.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("received Ctrl+C, shutting down"); },
        _ = terminate => { info!("received SIGTERM, shutting down"); },
    }
}

mod app;
mod config;
mod profiles;
mod qr;
mod scan;
mod state;
mod storage;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "emergency_network=debug,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let app_state = state::AppState::init().await?;
    tracing::info!(
        helpers = app_state.store.len().await,
        qr_size = app_state.config.qr.size,
        qr_fg = %app_state.config.qr.foreground,
        qr_bg = %app_state.config.qr.background,
        scan_fps = app_state.config.scan.fps,
        camera_allowed = app_state.config.scan.camera_allowed,
        "directory ready"
    );

    let mut scan_states = app_state.scanner.subscribe();
    tokio::spawn(async move {
        while scan_states.changed().await.is_ok() {
            let current = scan_states.borrow_and_update().clone();
            tracing::debug!(state = ?current, "scan state changed");
        }
    });

    let addr = app_state.config.bind_addr();
    app::serve(app::build_app(app_state), &addr).await
}

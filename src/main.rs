use std::sync::Arc;
use std::time::SystemTime;

use axum::extract::{State, WebSocketUpgrade};
use axum::http::Method;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use blitz::engine::{CoordinateEngine, PositionEngine};
use blitz::lobby::{next_sweep_delay, Lobby};
use blitz::socket::SocketService;

// Liveness probe
async fn hello_world() -> &'static str {
    "Hello from the blitz backend!"
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(service): State<SocketService>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move { service.handle_connection(socket).await })
}

// Daily full-registry sweep at 02:00 UTC. A blunt leak-prevention net
// on top of per-session retirement; it cuts off any game still running
// at that instant.
fn spawn_daily_sweep(lobby: Arc<Lobby>) {
    tokio::spawn(async move {
        loop {
            let delay = next_sweep_delay(SystemTime::now());
            tokio::time::sleep(delay).await;
            let cleared = lobby.clear_all_sessions().await;
            log::info!("daily sweep cleared {} session registry entries", cleared);
        }
    });
}

#[shuttle_runtime::main]
async fn main() -> shuttle_axum::ShuttleAxum {
    // Initialize logger
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    let _ = env_logger::try_init();

    let engine: Arc<dyn PositionEngine> = Arc::new(CoordinateEngine);
    let lobby = Arc::new(Lobby::new(engine.clone()));
    let service = SocketService::new(lobby.clone(), engine);

    spawn_daily_sweep(lobby);

    // Configure CORS
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any)
        .allow_origin(Any);

    // Create router with routes
    let app = Router::new()
        .route("/", get(hello_world))
        .route("/ws", get(ws_handler))
        .with_state(service)
        .layer(cors);

    log::info!("starting blitz backend server v{}", blitz::VERSION);

    Ok(app.into())
}

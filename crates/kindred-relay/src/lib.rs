pub mod connection;
pub mod rooms;

use axum::Router;
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use tower_http::trace::TraceLayer;

pub use rooms::Rooms;

/// Routes served by the relay: the channel endpoint at `/socket`.
pub fn router(rooms: Rooms) -> Router {
    Router::new()
        .route("/socket", get(ws_upgrade))
        .with_state(rooms)
        .layer(TraceLayer::new_for_http())
}

async fn ws_upgrade(State(rooms): State<Rooms>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| connection::handle_connection(socket, rooms))
}

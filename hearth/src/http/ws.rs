use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::response::IntoResponse;

use crate::session::READ_FRAME_LIMIT;
use crate::state::AppState;

/// `GET /ws`. Upgrades to the persistent viewer channel. The frame-size cap
/// is enforced by axum itself so an oversized client frame never reaches
/// [`crate::session::run_session`].
pub async fn upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.max_message_size(READ_FRAME_LIMIT)
        .on_upgrade(move |socket| crate::session::run_session(socket, state.hub))
}

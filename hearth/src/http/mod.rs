pub mod health;
pub mod ws;

use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/ping", get(health::ping))
        .route("/ws", get(ws::upgrade))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// End-to-end tests that bind a real socket and drive the router the way a
/// producer or viewer actually would, rather than going through
/// `tower::ServiceExt::oneshot`. Mirrors the in-crate real-listener test
/// style used elsewhere in this workspace's ingestion front-ends.
#[cfg(test)]
mod e2e_tests {
    use crate::hub::Hub;
    use crate::pipeline::Pipeline;
    use crate::state::AppState;
    use futures_util::{SinkExt, StreamExt};
    use std::time::Duration;
    use tokio_tungstenite::tungstenite::Message as WsMessage;

    async fn spawn_server() -> (std::net::SocketAddr, Hub) {
        let (hub, actor) = Hub::new();
        actor.run();
        let pipeline = Pipeline::new_detached();
        let state = AppState::new(hub.clone(), pipeline);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, super::build_router(state)).await.unwrap();
        });
        (addr, hub)
    }

    #[tokio::test]
    async fn health_reports_ok_over_a_real_socket() {
        let (addr, _hub) = spawn_server().await;

        let resp = reqwest::get(format!("http://{addr}/health")).await.unwrap();
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["message"], "Health Check");
        assert_eq!(body["data"]["status"], "ok");
        assert_eq!(body["data"]["sessions"], 0);
    }

    #[tokio::test]
    async fn ping_returns_pong_over_a_real_socket() {
        let (addr, _hub) = spawn_server().await;

        let resp = reqwest::get(format!("http://{addr}/ping")).await.unwrap();
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["message"], "pong");
    }

    /// S5 from the property table: a paused viewer gets evicted while every
    /// other healthy viewer keeps receiving the full, in-order stream.
    #[tokio::test]
    async fn slow_viewer_is_evicted_while_healthy_viewer_receives_everything() {
        let (addr, hub) = spawn_server().await;
        let url = format!("ws://{addr}/ws");

        let (slow_stream, _) = tokio_tungstenite::connect_async(url.clone()).await.unwrap();
        let (healthy_stream, _) = tokio_tungstenite::connect_async(url).await.unwrap();
        let (_slow_write, _slow_read) = slow_stream.split();
        let (mut healthy_write, mut healthy_read) = healthy_stream.split();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(hub.session_count().await, 2);

        // The slow session's read half is never polled, so its queue fills
        // and the Hub must evict it without stalling delivery to the other.
        for i in 0..300 {
            hub.broadcast(format!("{{\"seq\":{i}}}").into_bytes()).await;
        }

        let mut received = Vec::new();
        while received.len() < 300 {
            match tokio::time::timeout(Duration::from_secs(5), healthy_read.next()).await {
                Ok(Some(Ok(WsMessage::Text(text)))) => {
                    for line in text.split('\n') {
                        received.push(line.to_owned());
                    }
                }
                Ok(Some(Ok(_))) => continue,
                _ => break,
            }
        }

        assert_eq!(received.len(), 300);
        for (i, line) in received.iter().enumerate() {
            assert_eq!(line, &format!("{{\"seq\":{i}}}"));
        }

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(
            hub.session_count().await,
            1,
            "slow viewer should have been evicted"
        );

        let _ = healthy_write.close().await;
    }
}

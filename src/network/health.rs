//! Health Endpoint
//!
//! Minimal HTTP responder on its own port. `GET /health` asks the game loop
//! for a [`HealthReport`] and returns it as JSON.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info};

use crate::network::server::GameServerError;
use crate::network::session::{GameCommand, HealthReport};

/// How long to wait for the game loop to answer.
const QUERY_TIMEOUT: Duration = Duration::from_secs(2);

/// Build the HTTP response for a raw request.
///
/// `report` is `None` when the game loop did not answer.
pub fn http_response(request: &str, report: Option<&HealthReport>) -> String {
    if !request.starts_with("GET /health") {
        return "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string();
    }

    let (status, body) = match report.map(serde_json::to_string) {
        Some(Ok(body)) => ("200 OK", body),
        _ => ("503 Service Unavailable", r#"{"status":"unavailable"}"#.to_string()),
    };

    format!(
        "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    )
}

/// Ask the game loop for its numbers.
pub async fn query(commands: &mpsc::Sender<GameCommand>) -> Option<HealthReport> {
    let (reply, rx) = oneshot::channel();
    commands.send(GameCommand::Health { reply }).await.ok()?;
    tokio::time::timeout(QUERY_TIMEOUT, rx).await.ok()?.ok()
}

/// Serve health checks until shutdown.
pub async fn run_health_server(
    addr: SocketAddr,
    commands: mpsc::Sender<GameCommand>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), GameServerError> {
    let listener = TcpListener::bind(addr).await?;
    info!("Health endpoint listening on http://{}/health", addr);

    loop {
        let (mut socket, peer) = tokio::select! {
            accepted = listener.accept() => accepted?,
            _ = shutdown_rx.recv() => return Ok(()),
        };
        let commands = commands.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 1024];

            match socket.read(&mut buffer).await {
                Ok(n) if n > 0 => {
                    let request = String::from_utf8_lossy(&buffer[..n]);
                    let report = if request.starts_with("GET /health") {
                        query(&commands).await
                    } else {
                        None
                    };
                    let response = http_response(&request, report.as_ref());

                    if let Err(e) = socket.write_all(response.as_bytes()).await {
                        debug!("Failed to write health response to {}: {}", peer, e);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    debug!("Failed to read from health socket {}: {}", peer, e);
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> HealthReport {
        HealthReport {
            status: "ok".to_string(),
            players: 2,
            pieces: 5,
            score: 120,
            game_over: false,
        }
    }

    #[test]
    fn test_health_json() {
        let response = http_response("GET /health HTTP/1.1\r\n\r\n", Some(&report()));
        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.contains("application/json"));
        assert!(response.ends_with(r#"{"status":"ok","players":2,"pieces":5,"score":120,"gameOver":false}"#));
    }

    #[test]
    fn test_unknown_path_and_no_answer() {
        assert!(http_response("GET /metrics HTTP/1.1", Some(&report())).starts_with("HTTP/1.1 404"));
        assert!(http_response("GET /health HTTP/1.1", None).starts_with("HTTP/1.1 503"));
    }

    #[tokio::test]
    async fn test_query_round_trip() {
        let (tx, mut rx) = mpsc::channel(4);
        let responder = tokio::spawn(async move {
            if let Some(GameCommand::Health { reply }) = rx.recv().await {
                let _ = reply.send(report());
            }
        });

        let answer = query(&tx).await;
        responder.await.unwrap();
        assert_eq!(answer, Some(report()));
    }
}

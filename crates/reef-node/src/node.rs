//! Host entry point: connect to a coordinator and serve jobs until disconnect.

use reqwest::Url;

use crate::bridge::transport::WsTransport;
use crate::checkpoint::check_environment;
use crate::config::{EngineConfig, connect_url, http_base_url};
use crate::dataset::HttpDatasetStore;
use crate::engine::Engine;
use crate::error::EngineError;
use crate::executor::ExecutorFactory;
use crate::version::{NODE_VERSION, PROTOCOL_VERSION};

/// Run one node session against `manager_url`.
///
/// Returns `Ok(())` when the coordinator closes the connection. Reconnecting
/// is left to the caller.
pub async fn run_node<X>(
    manager_url: &Url,
    executor: X,
    config: EngineConfig,
) -> Result<(), EngineError>
where
    X: ExecutorFactory,
{
    check_environment()?;

    let socket_url = connect_url(manager_url)?;
    let datasets = HttpDatasetStore::new(http_base_url(manager_url)?);

    tracing::info!(
        version = NODE_VERSION,
        protocol = PROTOCOL_VERSION,
        label = %config.label,
        "Starting reef node"
    );
    let transport = WsTransport::connect(&socket_url).await?;

    let mut engine = Engine::new(transport, executor, datasets, config)?;
    let result = engine.run().await;
    engine.close().await;

    match &result {
        Ok(()) => tracing::info!("Node session ended"),
        Err(e) => tracing::error!(error = %e, "Node session failed"),
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::protocol::{InboundMessage, OutboundMessage, StartJob};
    use crate::test_support::ScriptedFactory;
    use futures::{SinkExt, StreamExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio_tungstenite::WebSocketStream;
    use tokio_tungstenite::tungstenite::Message;

    fn frame(message: &InboundMessage) -> Message {
        Message::Binary(serde_json::to_vec(message).unwrap())
    }

    async fn next_outbound(ws: &mut WebSocketStream<TcpStream>) -> OutboundMessage {
        loop {
            match ws.next().await.expect("node hung up").unwrap() {
                Message::Binary(data) => return serde_json::from_slice(&data).unwrap(),
                _ => continue,
            }
        }
    }

    #[tokio::test]
    async fn serves_coordinator_over_websocket() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let coordinator = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            // Later connections are dataset requests; hang up on them.
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    drop(stream);
                }
            });

            let begin = frame(&InboundMessage::BeginHandshake);
            ws.send(begin).await.unwrap();
            let response = next_outbound(&mut ws).await;
            ws.send(frame(&InboundMessage::IdentityAssigned {
                identity: "node-9".to_string(),
            }))
            .await
            .unwrap();
            ws.send(frame(&InboundMessage::StartJob(StartJob {
                job_id: "j1".to_string(),
                dataset_ref: "d1".to_string(),
                program_image: vec![0x00],
                prior_state: None,
                initial_progress: 0.0,
            })))
            .await
            .unwrap();
            let result = next_outbound(&mut ws).await;
            ws.close(None).await.unwrap();
            (response, result)
        });

        let url = Url::parse(&format!("http://{addr}")).unwrap();
        let config = EngineConfig::default().with_label("node@ws");
        let factory = ScriptedFactory::default();
        run_node(&url, factory, config).await.unwrap();

        let (response, result) = coordinator.await.unwrap();
        assert_eq!(
            response,
            OutboundMessage::HandshakeResponse {
                protocol_version: PROTOCOL_VERSION,
                label: "node@ws".to_string(),
            }
        );
        match result {
            OutboundMessage::JobResult(result) => {
                assert_eq!(result.job_id, "j1");
                assert!(!result.success);
                let message = String::from_utf8_lossy(&result.payload);
                assert!(message.starts_with("dataset unavailable"));
            }
            other => panic!("expected job result, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unsupported_scheme_fails_before_connecting() {
        let url = Url::parse("ftp://reef.example.com").unwrap();
        let err = run_node(&url, ScriptedFactory::default(), EngineConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[tokio::test]
    async fn unreachable_coordinator_is_transport_error() {
        // Bind then drop to get a port nobody listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let url = Url::parse(&format!("http://127.0.0.1:{port}")).unwrap();
        let err = run_node(&url, ScriptedFactory::default(), EngineConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Transport(_)));
    }
}

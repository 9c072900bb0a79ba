//! EventSub websocket client. Maintains one long-lived read connection,
//! decoding frames and handing them to the service; any disconnect falls
//! back to a delayed reconnect against the default endpoint.

use std::sync::Arc;

use futures::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

use crate::bot::Service;
use crate::constants::{EVENTSUB_WS_URL, SOCKET_RETRY_DELAY};
use crate::eventsub::payload::{TransportFrame, parse_frame};

type Stream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connects and reads until the process is shut down. A session requesting
/// migration is followed to its reconnect url once; every other exit path
/// retries the default endpoint after a delay.
pub async fn run(service: Arc<Service>) {
    let mut url = EVENTSUB_WS_URL.to_string();

    loop {
        match connect_async(url.as_str()).await {
            Ok((stream, _)) => {
                info!(url, "eventsub websocket connected");
                if let Some(reconnect_url) = read_loop(&service, stream).await {
                    url = reconnect_url;
                    continue;
                }
            }
            Err(e) => warn!(url, error = %e, "eventsub websocket connection failed"),
        }

        url = EVENTSUB_WS_URL.to_string();
        tokio::time::sleep(SOCKET_RETRY_DELAY).await;
    }
}

/// Reads frames until the connection dies. Returns the migration url when
/// upstream asked for one.
async fn read_loop(service: &Arc<Service>, stream: Stream) -> Option<String> {
    let (_, mut reader) = stream.split();

    while let Some(incoming) = reader.next().await {
        let message = match incoming {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "websocket read failed");
                break;
            }
        };

        match message {
            Message::Text(text) => {
                let frame = match parse_frame(&text) {
                    Ok(frame) => frame,
                    Err(e) => {
                        debug!(error = %e, "ignoring undecodable frame");
                        continue;
                    }
                };

                let migration = match &frame {
                    TransportFrame::Reconnect { reconnect_url } if !reconnect_url.is_empty() => {
                        Some(reconnect_url.clone())
                    }
                    _ => None,
                };

                service.handle_frame(frame).await;
                if migration.is_some() {
                    return migration;
                }
            }
            Message::Close(frame) => {
                info!(?frame, "websocket closed by upstream");
                break;
            }
            _ => {}
        }
    }

    None
}

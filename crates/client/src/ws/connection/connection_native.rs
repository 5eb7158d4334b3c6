//! Native/Desktop WebSocket implementation using tokio-tungstenite.

use async_trait::async_trait;
use furioso_shared::RealtimeError;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{protocol::frame::coding::CloseCode, Message},
};

use super::{CloseInfo, Connector, Outgoing, Socket, SocketPeer};

/// Opens sockets with tokio-tungstenite. Must be used inside a tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeConnector;

#[async_trait]
impl Connector for NativeConnector {
    async fn open(&self, url: &str) -> Result<Socket, RealtimeError> {
        let (ws_stream, _response) = connect_async(url)
            .await
            .map_err(|e| RealtimeError::Transport(e.to_string()))?;
        crate::log_debug!("WebSocket opened: {}", url);

        let (socket, peer) = Socket::pair();
        let (mut write, mut read) = ws_stream.split();
        let SocketPeer {
            mut outgoing,
            sink,
        } = peer;

        // Write task: drains what the client queued
        tokio::spawn(async move {
            while let Some(out) = outgoing.next().await {
                match out {
                    Outgoing::Text(text) => {
                        if let Err(e) = write.send(Message::Text(text.into())).await {
                            crate::log_error!("Send failed: {}", e);
                            break;
                        }
                    }
                    Outgoing::Close => {
                        let _ = write.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
            let _ = write.close().await;
        });

        // Read task: reports frames and the close
        tokio::spawn(async move {
            let info = loop {
                match read.next().await {
                    Some(Ok(Message::Text(text))) => {
                        if !sink.push_text(text.as_str()) {
                            break CloseInfo::clean(1000, "client stopped listening");
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        break match frame {
                            Some(frame) => CloseInfo {
                                clean: frame.code == CloseCode::Normal,
                                code: Some(u16::from(frame.code)),
                                reason: frame.reason.to_string(),
                            },
                            None => CloseInfo::clean(1000, ""),
                        };
                    }
                    // Pong replies to protocol-level pings are handled by tungstenite
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break CloseInfo::abnormal(e.to_string()),
                    None => break CloseInfo::abnormal("connection dropped"),
                }
            };
            crate::log_debug!("WebSocket closed: {}", info);
            sink.close(info);
        });

        Ok(socket)
    }
}

//! tokio-tungstenite implementation of the transport seam

use crate::traits::*;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::borrow::Cow;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame as TungsteniteCloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens TLS or plain WebSocket connections
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Connection>> {
        let (stream, response) = connect_async(url)
            .await
            .map_err(|e| GatewayError::WebSocket(format!("Failed to connect: {}", e)))?;
        debug!("WebSocket handshake completed ({})", response.status());
        Ok(Box::new(WebSocketConnection { stream }))
    }
}

pub struct WebSocketConnection {
    stream: WsStream,
}

#[async_trait]
impl Connection for WebSocketConnection {
    async fn send(&mut self, message: WsMessage) -> Result<()> {
        let message = match message {
            WsMessage::Text(text) => Message::Text(text),
            WsMessage::Binary(bytes) => Message::Binary(bytes),
        };
        self.stream
            .send(message)
            .await
            .map_err(|e| GatewayError::WebSocket(format!("Failed to send: {}", e)))
    }

    async fn recv(&mut self) -> Option<Result<Frame>> {
        loop {
            let message = match self.stream.next().await? {
                Ok(message) => message,
                Err(e) => return Some(Err(GatewayError::WebSocket(e.to_string()))),
            };
            match message {
                Message::Text(text) => return Some(Ok(Frame::Message(WsMessage::Text(text)))),
                Message::Binary(bytes) => return Some(Ok(Frame::Message(WsMessage::Binary(bytes)))),
                Message::Close(frame) => {
                    let frame = frame.map(|f| CloseFrame::new(u16::from(f.code), f.reason.into_owned()));
                    return Some(Ok(Frame::Close(frame)));
                }
                // Pings are answered by tungstenite on the next write
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            }
        }
    }

    async fn close(&mut self, code: u16, reason: &str) -> Result<()> {
        let frame = TungsteniteCloseFrame {
            code: CloseCode::from(code),
            reason: Cow::Owned(reason.to_string()),
        };
        self.stream
            .close(Some(frame))
            .await
            .map_err(|e| GatewayError::WebSocket(format!("Failed to close: {}", e)))
    }
}

//! Duplex text link to the real-time message bus.
//!
//! [`BusLink`] hides the transport behind a pair of channels: outbound text
//! frames go into an `mpsc` sender, inbound text frames (or the error that
//! ended the link) come out of an `mpsc` receiver. The WebSocket
//! implementation runs one writer pump and one reader pump; tests use
//! [`BusLink::pair`] to get an in-memory link with a scriptable [`BusPeer`].
//!
//! # Example
//!
//! ```rust,ignore
//! use racklink_api::websocket::BusLink;
//! use tokio_util::sync::CancellationToken;
//!
//! let url = url::Url::parse("wss://bus.example.com/socket")?;
//! let mut link = BusLink::connect(&url, CancellationToken::new()).await?;
//! link.send(r#"{"event":"authenticate","data":{"userId":"u-1"}}"#.into()).await?;
//! while let Some(Ok(text)) = link.recv().await {
//!     println!("{text}");
//! }
//! ```

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Error;
use crate::frame::RawFrame;

// ── Channel capacity ─────────────────────────────────────────────────

const LINK_CHANNEL_CAPACITY: usize = 256;

// ── BusLink ──────────────────────────────────────────────────────────

/// One established connection to the bus.
///
/// Dropping the outbound half (or the whole link) closes the connection
/// with a WebSocket Close frame.
#[derive(Debug)]
pub struct BusLink {
    outbound: mpsc::Sender<String>,
    inbound: mpsc::Receiver<Result<String, Error>>,
}

impl BusLink {
    /// Open a WebSocket to `url` and spawn the reader/writer pumps.
    ///
    /// Cancelling `cancel` stops both pumps; the inbound receiver then
    /// yields `None`.
    pub async fn connect(url: &Url, cancel: CancellationToken) -> Result<Self, Error> {
        tracing::info!(url = %url, "connecting to bus");

        let uri: tungstenite::http::Uri = url
            .as_str()
            .parse()
            .map_err(|e: tungstenite::http::uri::InvalidUri| Error::WebSocketConnect(e.to_string()))?;

        let (ws_stream, _response) = tokio_tungstenite::connect_async(uri)
            .await
            .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

        tracing::debug!("bus link established");

        let (mut write, mut read) = ws_stream.split();
        let (out_tx, mut out_rx) = mpsc::channel::<String>(LINK_CHANNEL_CAPACITY);
        let (in_tx, in_rx) = mpsc::channel::<Result<String, Error>>(LINK_CHANNEL_CAPACITY);

        // Writer pump: single writer keeps outbound order intact.
        let writer_cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    () = writer_cancel.cancelled() => break,
                    next = out_rx.recv() => {
                        let Some(text) = next else { break };
                        if let Err(e) = write.send(Message::text(text)).await {
                            tracing::debug!(error = %e, "bus write failed");
                            return;
                        }
                    }
                }
            }
            let _ = write.send(Message::Close(None)).await;
            let _ = write.close().await;
            tracing::debug!("bus writer exiting");
        });

        // Reader pump.
        tokio::spawn(async move {
            loop {
                let item = tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    frame = read.next() => frame,
                };
                let forwarded = match item {
                    Some(Ok(Message::Text(text))) => Ok(text.as_str().to_owned()),
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = frame.map_or((1005, String::new()), |cf| {
                            (u16::from(cf.code), cf.reason.as_str().to_owned())
                        });
                        tracing::info!(code, reason = %reason, "bus close frame received");
                        let _ = in_tx.send(Err(Error::WebSocketClosed { code, reason })).await;
                        break;
                    }
                    Some(Ok(Message::Ping(_))) => {
                        // tungstenite queues the pong itself
                        tracing::trace!("bus ping");
                        continue;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => Err(Error::WebSocketConnect(e.to_string())),
                    None => {
                        tracing::info!("bus stream ended");
                        break;
                    }
                };
                let fatal = forwarded.is_err();
                if in_tx.send(forwarded).await.is_err() || fatal {
                    break;
                }
            }
            tracing::debug!("bus reader exiting");
        });

        Ok(Self {
            outbound: out_tx,
            inbound: in_rx,
        })
    }

    /// In-memory link plus the far end, for driving a session in tests.
    pub fn pair(capacity: usize) -> (Self, BusPeer) {
        let (out_tx, out_rx) = mpsc::channel(capacity);
        let (in_tx, in_rx) = mpsc::channel(capacity);
        (
            Self {
                outbound: out_tx,
                inbound: in_rx,
            },
            BusPeer {
                inbound: in_tx,
                outbound: out_rx,
            },
        )
    }

    /// Queue one text frame for the writer.
    pub async fn send(&self, text: String) -> Result<(), Error> {
        self.outbound
            .send(text)
            .await
            .map_err(|_| Error::WebSocketClosed {
                code: 1006,
                reason: "link writer stopped".into(),
            })
    }

    /// Next inbound text frame. `None` once the link is gone.
    pub async fn recv(&mut self) -> Option<Result<String, Error>> {
        self.inbound.recv().await
    }

    /// Split into the raw channel halves so writer and reader can live on
    /// separate tasks.
    pub fn into_parts(self) -> (mpsc::Sender<String>, mpsc::Receiver<Result<String, Error>>) {
        (self.outbound, self.inbound)
    }
}

// ── BusPeer ──────────────────────────────────────────────────────────

/// The bus side of an in-memory [`BusLink`].
#[derive(Debug)]
pub struct BusPeer {
    inbound: mpsc::Sender<Result<String, Error>>,
    outbound: mpsc::Receiver<String>,
}

impl BusPeer {
    /// Next frame the client wrote. `None` after the client hung up.
    pub async fn recv(&mut self) -> Option<String> {
        self.outbound.recv().await
    }

    /// Next frame the client wrote, decoded.
    pub async fn recv_frame(&mut self) -> Option<RawFrame> {
        let text = self.recv().await?;
        RawFrame::decode(&text).ok()
    }

    /// Deliver a text frame to the client. Returns `false` if the client is gone.
    pub async fn send_text(&self, text: impl Into<String>) -> bool {
        self.inbound.send(Ok(text.into())).await.is_ok()
    }

    /// Deliver an event frame to the client.
    pub async fn send_event(&self, event: &str, data: serde_json::Value) -> bool {
        match RawFrame::new(event, data).encode() {
            Ok(text) => self.send_text(text).await,
            Err(_) => false,
        }
    }

    /// Terminate the link from the bus side with an error.
    pub async fn fail(&self, error: Error) {
        let _ = self.inbound.send(Err(error)).await;
    }
}

#![allow(clippy::unwrap_used)]

// Loopback tests for the WebSocket `BusLink`.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use url::Url;

use racklink_api::{BusLink, Error};

/// Accept one WebSocket client, echo text frames back with a prefix and
/// report the frames it saw once the client closes.
async fn spawn_echo_server() -> (Url, tokio::task::JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let mut seen = Vec::new();
        while let Some(Ok(msg)) = ws.next().await {
            match msg {
                Message::Text(text) => {
                    let text = text.as_str().to_owned();
                    ws.send(Message::text(format!("echo:{text}"))).await.unwrap();
                    seen.push(text);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
        seen
    });

    (Url::parse(&format!("ws://{addr}/")).unwrap(), handle)
}

#[tokio::test]
async fn test_frames_round_trip_in_order() {
    let (url, server) = spawn_echo_server().await;
    let mut link = BusLink::connect(&url, CancellationToken::new()).await.unwrap();

    link.send("first".into()).await.unwrap();
    link.send("second".into()).await.unwrap();

    assert_eq!(link.recv().await.unwrap().unwrap(), "echo:first");
    assert_eq!(link.recv().await.unwrap().unwrap(), "echo:second");

    // Dropping the link sends a close frame and ends the server loop.
    drop(link);
    let seen = server.await.unwrap();
    assert_eq!(seen, vec!["first".to_owned(), "second".to_owned()]);
}

#[tokio::test]
async fn test_server_close_surfaces_as_closed_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.close(None).await.unwrap();
    });

    let url = Url::parse(&format!("ws://{addr}/")).unwrap();
    let mut link = BusLink::connect(&url, CancellationToken::new()).await.unwrap();

    let err = link.recv().await.unwrap().unwrap_err();
    assert!(err.is_link_closed(), "got {err:?}");
    assert!(link.recv().await.is_none());
}

#[tokio::test]
async fn test_connect_refused() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let url = Url::parse(&format!("ws://127.0.0.1:{port}/")).unwrap();

    let err = BusLink::connect(&url, CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::WebSocketConnect(_)));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_memory_pair_delivers_both_ways() {
    let (mut link, mut peer) = BusLink::pair(8);

    link.send("hello".into()).await.unwrap();
    assert_eq!(peer.recv().await.as_deref(), Some("hello"));

    assert!(peer.send_text("world").await);
    assert_eq!(link.recv().await.unwrap().unwrap(), "world");

    drop(peer);
    assert!(link.recv().await.is_none());
}

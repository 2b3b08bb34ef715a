//! Integration tests for the WebSocket connector.
//!
//! These tests spin up a real WebSocket server on a random port and
//! point the connector at it, so the request line, headers and frames
//! all cross an actual TCP socket.

#[cfg(feature = "websocket")]
mod websocket {
    use std::sync::{Arc, Mutex};

    use futures_util::{SinkExt, StreamExt};
    use rxlive_transport::{Connection, Connector, TransportError, WebSocketConnector};
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::handshake::server::{
        ErrorResponse, Request, Response,
    };
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
    use tokio_tungstenite::tungstenite::protocol::CloseFrame;
    use tokio_tungstenite::tungstenite::Message;

    /// What the server saw during the HTTP upgrade.
    #[derive(Default, Clone)]
    struct SeenRequest {
        uri: String,
        authorization: Option<String>,
    }

    /// Binds a listener on an OS-assigned port and returns it with its address.
    async fn bind() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("should bind");
        let addr = listener.local_addr().expect("local addr").to_string();
        (listener, addr)
    }

    #[tokio::test]
    async fn test_connect_sends_outlet_and_bearer_token() {
        let (listener, addr) = bind().await;
        let seen = Arc::new(Mutex::new(SeenRequest::default()));

        let server_seen = Arc::clone(&seen);
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let callback = move |req: &Request, resp: Response| {
                let mut seen = server_seen.lock().unwrap();
                seen.uri = req.uri().to_string();
                seen.authorization = req
                    .headers()
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                Ok::<_, ErrorResponse>(resp)
            };
            let mut ws = tokio_tungstenite::accept_hdr_async(stream, callback)
                .await
                .unwrap();
            ws.send(Message::Text(r#"{"type":"roster","entries":[]}"#.into()))
                .await
                .unwrap();
            ws.send(Message::Binary(b"bin".to_vec().into())).await.unwrap();
            ws.close(None).await.unwrap();
        });

        let connector = WebSocketConnector::new(format!("ws://{addr}/presence"));
        let mut conn = connector
            .connect("outlet-7", "header.payload.sig")
            .await
            .expect("should connect");

        let first = conn.recv().await.unwrap().expect("text frame");
        assert_eq!(first, br#"{"type":"roster","entries":[]}"#.to_vec());
        let second = conn.recv().await.unwrap().expect("binary frame");
        assert_eq!(second, b"bin".to_vec());
        assert_eq!(conn.recv().await.unwrap(), None);

        server.await.unwrap();
        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen.uri, "/presence?outletId=outlet-7");
        assert_eq!(
            seen.authorization.as_deref(),
            Some("Bearer header.payload.sig")
        );
    }

    #[tokio::test]
    async fn test_error_close_code_is_reported() {
        let (listener, addr) = bind().await;
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            ws.close(Some(CloseFrame {
                code: CloseCode::Policy,
                reason: "session revoked".into(),
            }))
            .await
            .unwrap();
            while let Some(Ok(_)) = ws.next().await {}
        });

        let connector = WebSocketConnector::new(format!("ws://{addr}/presence"));
        let mut conn = connector.connect("o", "t").await.unwrap();
        match conn.recv().await {
            Err(TransportError::ConnectionClosed(reason)) => {
                assert_eq!(reason, "1008 session revoked");
            }
            other => panic!("expected an error close, got {other:?}"),
        }
        drop(conn);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_to_closed_port_fails() {
        let (listener, addr) = bind().await;
        drop(listener);

        let connector = WebSocketConnector::new(format!("ws://{addr}/presence"));
        let result = connector.connect("o", "t").await;
        assert!(matches!(result, Err(TransportError::ConnectFailed(_))));
    }

    #[tokio::test]
    async fn test_connect_with_invalid_endpoint_fails() {
        let connector = WebSocketConnector::new("not a url");
        let result = connector.connect("o", "t").await;
        assert!(matches!(result, Err(TransportError::InvalidEndpoint(_))));
    }

    #[tokio::test]
    async fn test_client_close_reaches_server() {
        let (listener, addr) = bind().await;
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            // The client's close frame ends the stream.
            while let Some(msg) = ws.next().await {
                if matches!(msg, Ok(Message::Close(_)) | Err(_)) {
                    break;
                }
            }
        });

        let connector = WebSocketConnector::new(format!("ws://{addr}/"));
        let mut conn = connector.connect("o", "t").await.unwrap();
        conn.close().await.expect("close should succeed");
        server.await.unwrap();
    }
}

//! WebSocket connector implementation using `tokio-tungstenite`.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;

use crate::{Connection, ConnectionId, Connector, TransportError};

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Default name of the query parameter that carries the outlet id.
const DEFAULT_OUTLET_PARAM: &str = "outletId";

/// Characters escaped in a query value: everything but RFC 3986 unreserved.
const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// A [`Connector`] that opens one WebSocket per attempt.
///
/// The outlet id travels as a query parameter on the endpoint URL and the
/// token as a bearer `Authorization` header, so neither ends up in a
/// message body.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    endpoint: String,
    outlet_param: String,
}

impl WebSocketConnector {
    /// Creates a connector for the given `ws://` or `wss://` endpoint.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            outlet_param: DEFAULT_OUTLET_PARAM.to_string(),
        }
    }

    /// Overrides the query parameter name used for the outlet id.
    pub fn outlet_param(mut self, name: impl Into<String>) -> Self {
        self.outlet_param = name.into();
        self
    }

    /// Builds the URL for an outlet-scoped connection.
    pub fn request_url(&self, outlet: &str) -> String {
        let separator = if self.endpoint.contains('?') { '&' } else { '?' };
        format!(
            "{}{}{}={}",
            self.endpoint,
            separator,
            self.outlet_param,
            utf8_percent_encode(outlet, QUERY_VALUE)
        )
    }
}

impl Connector for WebSocketConnector {
    type Connection = WebSocketConnection;
    type Error = TransportError;

    async fn connect(
        &self,
        outlet: &str,
        token: &str,
    ) -> Result<Self::Connection, Self::Error> {
        let url = self.request_url(outlet);
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::InvalidEndpoint(e.to_string()))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| TransportError::InvalidEndpoint(e.to_string()))?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        let (ws, response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| {
                TransportError::ConnectFailed(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    e,
                ))
            })?;

        let id = ConnectionId::next();
        tracing::debug!(
            %id,
            outlet,
            status = %response.status(),
            "WebSocket connection established"
        );

        Ok(WebSocketConnection { id, ws })
    }
}

/// A single outbound WebSocket connection.
pub struct WebSocketConnection {
    id: ConnectionId,
    ws: WsStream,
}

impl Connection for WebSocketConnection {
    type Error = TransportError;

    async fn recv(&mut self) -> Result<Option<Vec<u8>>, Self::Error> {
        use futures_util::StreamExt;
        loop {
            match self.ws.next().await {
                Some(Ok(Message::Binary(data))) => {
                    return Ok(Some(data.into()));
                }
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(text.as_bytes().to_vec()));
                }
                Some(Ok(Message::Close(Some(frame))))
                    if !matches!(frame.code, CloseCode::Normal | CloseCode::Away) =>
                {
                    return Err(TransportError::ConnectionClosed(format!(
                        "{} {}",
                        u16::from(frame.code),
                        frame.reason.as_str()
                    )));
                }
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue, // skip ping/pong/frame
                Some(Err(e)) => {
                    return Err(TransportError::ReceiveFailed(
                        std::io::Error::new(
                            std::io::ErrorKind::ConnectionReset,
                            e,
                        ),
                    ));
                }
            }
        }
    }

    async fn close(&mut self) -> Result<(), Self::Error> {
        self.ws.close(None).await.map_err(|e| {
            TransportError::CloseFailed(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                e,
            ))
        })
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}

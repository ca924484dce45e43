//! Upstream connection establishment.
//!
//! Builds the upstream URL from the configured base plus the client-selected
//! model, and performs the WebSocket handshake with the credential and
//! protocol headers the upstream realtime API requires. The credential only
//! ever appears here; it is never echoed to the client side.

use http::Request;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::handshake::client::generate_key;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info};
use url::Url;

use crate::errors::{RelayError, RelayResult};

/// The upstream WebSocket stream type.
pub type UpstreamSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Build the upstream URL with the model as a query parameter.
///
/// The model value is percent-encoded by the query serializer, so arbitrary
/// client-supplied strings cannot smuggle extra parameters.
pub fn build_upstream_url(base: &str, model: &str) -> RelayResult<Url> {
    let mut url = Url::parse(base)?;
    url.query_pairs_mut().append_pair("model", model);
    Ok(url)
}

/// Open the upstream WebSocket with authentication headers.
pub async fn connect(url: &Url, api_key: &str) -> RelayResult<UpstreamSocket> {
    let host = url
        .host_str()
        .ok_or_else(|| RelayError::Internal(format!("upstream URL has no host: {url}")))?;
    let host_header = match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };

    let request = Request::builder()
        .uri(url.as_str())
        .header("Authorization", format!("Bearer {api_key}"))
        .header("OpenAI-Beta", "realtime=v1")
        .header("Sec-WebSocket-Protocol", "realtime")
        .header("Sec-WebSocket-Key", generate_key())
        .header("Sec-WebSocket-Version", "13")
        .header("Connection", "Upgrade")
        .header("Upgrade", "websocket")
        .header("Host", host_header)
        .body(())
        .map_err(|e| RelayError::Internal(e.to_string()))?;

    debug!(%url, "connecting upstream");
    let (stream, _response) = connect_async(request)
        .await
        .map_err(|e| RelayError::UpstreamConnect(e.to_string()))?;

    info!(%host, "upstream connection established");
    Ok(stream)
}

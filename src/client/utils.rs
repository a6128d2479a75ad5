use secrecy::ExposeSecret;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;

use crate::client::config::ClientConfig;
use crate::client::consts::{AUTHORIZATION_HEADER, SESSION_PATH};
use crate::error::TransportError;

/// Endpoint of one session: `{base}/ws/{client_id}`.
pub fn session_url(base_url: &str, client_id: &str) -> String {
    format!("{}/{}/{}", base_url.trim_end_matches('/'), SESSION_PATH, client_id)
}

pub fn build_request(config: &ClientConfig, client_id: &str) -> Result<Request, TransportError> {
    let url = session_url(config.base_url(), client_id);
    let mut request = url.as_str().into_client_request()?;
    if let Some(token) = config.token() {
        let value = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
            .map_err(|e| TransportError::InvalidUrl(e.to_string()))?;
        request.headers_mut().insert(AUTHORIZATION_HEADER, value);
    }
    Ok(request)
}

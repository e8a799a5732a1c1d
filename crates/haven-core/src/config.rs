use secrecy::SecretString;

use crate::ids::ParticipantId;

/// Connection endpoints and credentials for one client instance.
///
/// Owned and passed explicitly; nothing here is process-global, so multiple
/// independent clients (or test harnesses) can coexist.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Base URL of the HTTP API, e.g. `http://localhost:8000`.
    pub api_base_url: String,
    /// URL of the persistent-connection endpoint, e.g. `ws://localhost:8000/ws`.
    pub socket_url: String,
    /// Bearer credential attached to every HTTP request and to the
    /// persistent connection's handshake.
    pub token: SecretString,
    /// Identity this client connects as.
    pub participant_id: ParticipantId,
}

impl ClientConfig {
    pub fn new(
        api_base_url: impl Into<String>,
        socket_url: impl Into<String>,
        token: impl Into<String>,
        participant_id: ParticipantId,
    ) -> Self {
        Self {
            api_base_url: trim_trailing_slash(api_base_url.into()),
            socket_url: trim_trailing_slash(socket_url.into()),
            token: SecretString::from(token.into()),
            participant_id,
        }
    }

    /// Read configuration from `HAVEN_API_URL`, `HAVEN_SOCKET_URL`,
    /// `HAVEN_TOKEN` and `HAVEN_USER_ID`, with localhost defaults for the
    /// endpoints.
    pub fn from_env() -> Self {
        let api = std::env::var("HAVEN_API_URL")
            .unwrap_or_else(|_| "http://localhost:8000".to_string());
        let socket = std::env::var("HAVEN_SOCKET_URL")
            .unwrap_or_else(|_| "ws://localhost:8000/ws".to_string());
        let token = std::env::var("HAVEN_TOKEN").unwrap_or_default();
        let participant = std::env::var("HAVEN_USER_ID")
            .map(ParticipantId::from_raw)
            .unwrap_or_default();
        Self::new(api, socket, token, participant)
    }

    pub fn api_endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_base_url, path.trim_start_matches('/'))
    }
}

fn trim_trailing_slash(mut s: String) -> String {
    while s.ends_with('/') {
        s.pop();
    }
    s
}

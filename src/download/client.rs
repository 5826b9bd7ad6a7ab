//! HTTP client wrapper for download requests.
//!
//! One [`HttpClient`] is shared by every task of a coordinator so connections
//! are pooled. Transparent decompression stays off: the bytes on disk are the
//! bytes the server sent, and Content-Length matches what is streamed.

use reqwest::Client;
use reqwest::header::{ACCEPT, ACCEPT_ENCODING, CONTENT_LENGTH, USER_AGENT};
use tracing::{debug, instrument};
use url::Url;

use super::error::DownloadError;
use crate::config::EngineConfig;

/// HTTP client for streaming downloads.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    default_user_agent: String,
}

impl HttpClient {
    /// Builds a client with the connect/read timeouts of `config`.
    ///
    /// # Errors
    ///
    /// Returns the reqwest builder error if the TLS backend cannot be
    /// initialised.
    pub fn new(config: &EngineConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .read_timeout(config.read_timeout())
            .user_agent(config.default_user_agent.clone())
            .build()?;
        Ok(Self {
            client,
            default_user_agent: config.default_user_agent.clone(),
        })
    }

    /// Sends the download GET and checks the status.
    ///
    /// The caller's User-Agent is used when given and non-empty, otherwise the
    /// configured default.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Connect`] when the request cannot be sent and
    /// [`DownloadError::HttpStatus`] for any non-2xx answer.
    #[instrument(level = "debug", skip(self, user_agent), fields(url = %url))]
    pub async fn send(
        &self,
        url: &Url,
        user_agent: Option<&str>,
    ) -> Result<reqwest::Response, DownloadError> {
        let user_agent = user_agent
            .map(str::trim)
            .filter(|ua| !ua.is_empty())
            .unwrap_or(&self.default_user_agent);

        let response = self
            .client
            .get(url.clone())
            .header(USER_AGENT, user_agent)
            .header(ACCEPT, "*/*")
            .header(ACCEPT_ENCODING, "identity")
            .send()
            .await
            .map_err(|e| DownloadError::connect(&e))?;

        let status = response.status();
        if !status.is_success() {
            debug!(status = status.as_u16(), "server rejected download");
            return Err(DownloadError::http_status(status));
        }
        Ok(response)
    }
}

/// Declared body length, or 0 when the server sent none.
///
/// Reads the header rather than `Response::content_length`, which reports the
/// size hint of the body stream and can be absent for chunked bodies.
#[must_use]
pub fn declared_length(response: &reqwest::Response) -> i64 {
    response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<i64>().ok())
        .filter(|len| *len > 0)
        .unwrap_or(0)
}

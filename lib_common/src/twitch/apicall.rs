use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT};
use serde_json::Value;

use crate::error::{Result, TrackerError};
use crate::retrieve::ky_http::{ApiClient, ClientOptions};

/// Media type that pins kraken responses to API version 5.
pub const KRAKEN_ACCEPT: &str = "application/vnd.twitchtv.v5+json";

/// Default base URL of the v5 API.
pub const KRAKEN_BASE_URL: &str = "https://api.twitch.tv/kraken/";

pub struct TwitchApi {
    client: ApiClient,
}

impl TwitchApi {
    /// Builds a kraken client. `base_url` gets a trailing slash if it lacks
    /// one so that relative paths like `streams/123` join under it.
    pub fn new(base_url: &str, client_id: &str, mut options: ClientOptions) -> Result<Self> {
        let base = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };

        options.default_headers.extend(Self::kraken_headers(client_id)?);

        Ok(Self {
            client: ApiClient::new(&base, options)?,
        })
    }

    /// Performs a GET against a kraken path and returns the decoded JSON.
    ///
    /// Anything but a 2xx with a JSON body is an error.
    pub async fn fetch_kraken(&self, path: &str) -> Result<Value> {
        let body: Value = self.client.get_json(path).await.map_err(|e| {
            log::debug!("Kraken request for '{}' failed: {}", path, e);
            e
        })?;
        Ok(body)
    }

    /// Internal helper to construct the per-client headers.
    fn kraken_headers(client_id: &str) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(KRAKEN_ACCEPT));

        let value = HeaderValue::from_str(client_id).map_err(|_| TrackerError::InvalidHeader("Client-ID"))?;
        headers.insert(HeaderName::from_static("client-id"), value);

        Ok(headers)
    }
}

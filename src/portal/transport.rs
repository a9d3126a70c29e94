use crate::portal::error::PortalError;
use log::{debug, warn};
use reqwest::header::{HeaderMap, HeaderValue, REFERER, USER_AGENT};
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use std::future::Future;

const REFERER_URL: &str = "https://rtdms.cpcb.gov.in/data/";
const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0";

/// A single JSON request/response exchange with the portal. No retries, no caching.
pub trait Transport {
    fn get_json(&self, url: &str) -> impl Future<Output = Result<Value, PortalError>>;

    fn post_json(&self, url: &str, body: &Value) -> impl Future<Output = Result<Value, PortalError>>;
}

/// [`Transport`] over HTTPS using `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Builds a client that presents itself like the portal's own web page.
    ///
    /// `accept_invalid_certs` disables certificate verification; the portal has served
    /// incomplete certificate chains in the past.
    pub fn new(accept_invalid_certs: bool) -> Result<Self, PortalError> {
        let mut headers = HeaderMap::new();
        headers.insert(REFERER, HeaderValue::from_static(REFERER_URL));
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
        let client = Client::builder()
            .default_headers(headers)
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()
            .map_err(PortalError::ClientBuild)?;
        Ok(Self { client })
    }

    async fn send(&self, url: &str, request: RequestBuilder) -> Result<Value, PortalError> {
        let response = request
            .send()
            .await
            .map_err(|e| PortalError::NetworkRequest(url.to_string(), e))?;

        let status = response.status();
        if !status.is_success() {
            warn!("HTTP error for {}: {}", url, status);
            return Err(PortalError::HttpStatus {
                url: url.to_string(),
                status,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| PortalError::NetworkRequest(url.to_string(), e))?;
        debug!("Received {} bytes from {}", bytes.len(), url);
        serde_json::from_slice(&bytes).map_err(|e| PortalError::InvalidJson {
            url: url.to_string(),
            source: e,
        })
    }
}

impl Transport for HttpTransport {
    async fn get_json(&self, url: &str) -> Result<Value, PortalError> {
        self.send(url, self.client.get(url)).await
    }

    async fn post_json(&self, url: &str, body: &Value) -> Result<Value, PortalError> {
        self.send(url, self.client.post(url).json(body)).await
    }
}

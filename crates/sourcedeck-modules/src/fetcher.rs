//! Remote fetch capability used to retrieve descriptors and scripts.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use url::Url;

use crate::config::ModulesConfig;
use crate::error::ModuleError;

/// User-Agent sent with every module fetch.
const USER_AGENT: &str = concat!("SourceDeck/", env!("CARGO_PKG_VERSION"));

/// Abstraction over "fetch bytes from URL".
///
/// `HttpFetcher` is the production implementation; tests plug in an
/// in-memory double.
#[async_trait]
pub trait ModuleFetcher: Send + Sync + 'static {
    async fn fetch(&self, url: &Url) -> Result<Bytes, ModuleError>;
}

/// `reqwest`-backed fetcher.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    http: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: &ModulesConfig) -> Result<Self, ModuleError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.fetch_timeout_secs))
            .build()
            .map_err(|e| ModuleError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl ModuleFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<Bytes, ModuleError> {
        let resp = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|e| ModuleError::Network(format!("GET {url} failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ModuleError::Network(format!("GET {url} returned {status}")));
        }

        resp.bytes()
            .await
            .map_err(|e| ModuleError::Network(format!("failed to read body of {url}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new(&ModulesConfig {
            fetch_timeout_secs: 5,
            ..ModulesConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_fetch_ok() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/module.json"))
            .and(header_exists("user-agent"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"a\":1}"))
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/module.json", server.uri())).unwrap();
        let body = fetcher().fetch(&url).await.unwrap();
        assert_eq!(&body[..], b"{\"a\":1}");
    }

    #[tokio::test]
    async fn test_fetch_non_success_is_network_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/gone.json", server.uri())).unwrap();
        let err = fetcher().fetch(&url).await.unwrap_err();
        assert!(matches!(err, ModuleError::Network(_)));
        assert!(err.to_string().contains("404"));
    }

    #[tokio::test]
    async fn test_fetch_unreachable_is_network_error() {
        // Port 9 (discard) on localhost is not expected to serve HTTP.
        let url = Url::parse("http://127.0.0.1:9/module.json").unwrap();
        let err = fetcher().fetch(&url).await.unwrap_err();
        assert!(matches!(err, ModuleError::Network(_)));
    }
}

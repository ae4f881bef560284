use anyhow::{Context, Result};
use async_trait::async_trait;
use anyhow::bail;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error, info, trace};
use url::Url;

use super::{
    CollectionDescriptor, CollectionMemberSource, CollectionRegistrySource, DeniedEntry,
    DenyListSource, PackageListSource,
};

const REQUEST_TIMEOUT: u64 = 30; // seconds
const CONNECT_TIMEOUT: u64 = 10; // seconds
const MAX_MEMBER_LIST_BYTES: usize = 1024 * 1024;

pub const DEFAULT_PACKAGE_LIST_URL: &str =
    "https://raw.githubusercontent.com/SwiftPackageIndex/PackageList/main/packages.json";
pub const DEFAULT_DENY_LIST_URL: &str =
    "https://raw.githubusercontent.com/SwiftPackageIndex/PackageList/main/denylist.json";
pub const DEFAULT_COLLECTIONS_URL: &str =
    "https://raw.githubusercontent.com/SwiftPackageIndex/PackageList/main/custom-package-collections.json";

/// Where the lists live and how to reach them
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub package_list_url: String,
    pub deny_list_url: String,
    pub collections_url: String,

    pub user_agent: String,
    pub request_timeout: Duration,
    pub connection_timeout: Duration,
    /// Sent as a bearer token to the three configured lists only
    pub github_token: Option<String>,
    /// Largest collection member list body accepted
    pub max_member_list_bytes: usize,
}

impl FetcherConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_package_list_url(mut self, url: impl Into<String>) -> Self {
        self.package_list_url = url.into();
        self
    }

    pub fn with_deny_list_url(mut self, url: impl Into<String>) -> Self {
        self.deny_list_url = url.into();
        self
    }

    pub fn with_collections_url(mut self, url: impl Into<String>) -> Self {
        self.collections_url = url.into();
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    pub fn with_github_token(mut self, token: Option<String>) -> Self {
        self.github_token = token;
        self
    }

    pub fn with_max_member_list_bytes(mut self, limit: usize) -> Self {
        self.max_member_list_bytes = limit;
        self
    }
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            package_list_url: DEFAULT_PACKAGE_LIST_URL.to_string(),
            deny_list_url: DEFAULT_DENY_LIST_URL.to_string(),
            collections_url: DEFAULT_COLLECTIONS_URL.to_string(),
            user_agent: "CatalogReconciler/1.0".to_string(),
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT),
            connection_timeout: Duration::from_secs(CONNECT_TIMEOUT),
            github_token: None,
            max_member_list_bytes: MAX_MEMBER_LIST_BYTES,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDeniedEntry {
    package_url: String,
}

#[derive(Debug, Deserialize)]
struct RawCollection {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    badge: Option<String>,
    url: String,
}

/// Who a request goes to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    /// One of the configured lists; carries the token
    Configured,
    /// A member list named by the registry; anonymous and size-capped
    Collection,
}

/// Fetches every list over HTTP as JSON
///
/// Entries whose URL does not parse are dropped; a non-success status or an
/// undecodable body fails the whole fetch.
#[derive(Debug, Clone)]
pub struct HttpSources {
    client: Client,
    config: FetcherConfig,
}

impl HttpSources {
    pub fn new(config: FetcherConfig) -> Result<Self> {
        debug!("Initializing HTTP client with user agent: {}", config.user_agent);
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .context("Failed to create User-Agent header")?,
        );

        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connection_timeout)
            .default_headers(headers)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, origin: Origin) -> Result<T> {
        debug!("Sending request to {}", url);
        let mut request = self.client.get(url);
        if origin == Origin::Configured {
            if let Some(token) = &self.config.github_token {
                request = request.bearer_auth(token);
            }
        }
        let resp = request
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", url))?;

        debug!("Response status: {}", resp.status());
        let mut resp = resp.error_for_status().map_err(|e| {
            error!("Unexpected response from {}: {}", url, e);
            anyhow::Error::new(e)
        })?;

        let limit = match origin {
            Origin::Configured => None,
            Origin::Collection => Some(self.config.max_member_list_bytes),
        };
        if let (Some(limit), Some(len)) = (limit, resp.content_length()) {
            if len > limit as u64 {
                bail!("Response from {} is {} bytes, limit is {}", url, len, limit);
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = resp
            .chunk()
            .await
            .with_context(|| format!("Failed to read response from {}", url))?
        {
            body.extend_from_slice(&chunk);
            if let Some(limit) = limit {
                if body.len() > limit {
                    bail!("Response from {} exceeds {} bytes", url, limit);
                }
            }
        }

        serde_json::from_slice(&body)
            .with_context(|| format!("Failed to decode response from {}", url))
    }

    async fn get_url_list(&self, url: &str, origin: Origin) -> Result<Vec<Url>> {
        let raw: Vec<String> = self.get_json(url, origin).await?;
        let total = raw.len();
        let urls: Vec<Url> = raw.iter().filter_map(|s| parse_or_skip(s)).collect();
        info!("Fetched {} URLs from {} ({} malformed)", urls.len(), url, total - urls.len());
        Ok(urls)
    }
}

fn parse_or_skip(raw: &str) -> Option<Url> {
    match Url::parse(raw.trim()) {
        Ok(url) => Some(url),
        Err(e) => {
            debug!("Skipping malformed URL '{}': {}", raw, e);
            None
        }
    }
}

#[async_trait]
impl PackageListSource for HttpSources {
    async fn fetch_package_list(&self) -> Result<Vec<Url>> {
        self.get_url_list(&self.config.package_list_url, Origin::Configured)
            .await
    }
}

#[async_trait]
impl DenyListSource for HttpSources {
    async fn fetch_deny_list(&self) -> Result<Vec<DeniedEntry>> {
        let raw: Vec<RawDeniedEntry> = self
            .get_json(&self.config.deny_list_url, Origin::Configured)
            .await?;
        let entries: Vec<DeniedEntry> = raw
            .iter()
            .filter_map(|entry| parse_or_skip(&entry.package_url))
            .map(|package_url| DeniedEntry { package_url })
            .collect();
        info!("Fetched {} deny list entries", entries.len());
        Ok(entries)
    }
}

#[async_trait]
impl CollectionRegistrySource for HttpSources {
    async fn fetch_collection_registry(&self) -> Result<Vec<CollectionDescriptor>> {
        let raw: Vec<RawCollection> = self
            .get_json(&self.config.collections_url, Origin::Configured)
            .await?;
        let descriptors: Vec<CollectionDescriptor> = raw
            .into_iter()
            .filter_map(|c| {
                let url = parse_or_skip(&c.url)?;
                Some(CollectionDescriptor {
                    name: c.name,
                    description: c.description,
                    badge: c.badge,
                    url,
                })
            })
            .collect();
        info!("Fetched {} custom collections", descriptors.len());
        Ok(descriptors)
    }
}

#[async_trait]
impl CollectionMemberSource for HttpSources {
    async fn fetch_collection_members(&self, source: &Url) -> Result<Vec<Url>> {
        trace!("Fetching collection members from {}", source);
        self.get_url_list(source.as_str(), Origin::Collection).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn sources_for(server: &mockito::Server) -> HttpSources {
        let base = server.url();
        let config = FetcherConfig::new()
            .with_package_list_url(format!("{}/packages.json", base))
            .with_deny_list_url(format!("{}/denylist.json", base))
            .with_collections_url(format!("{}/collections.json", base));
        HttpSources::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_package_list_skips_malformed_entries() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/packages.json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"["https://github.com/a/one.git", "not a url", "https://github.com/b/two.git"]"#)
            .create_async()
            .await;

        let urls = sources_for(&server).await.fetch_package_list().await.unwrap();
        assert_eq!(urls.len(), 2);
        assert_eq!(urls[0].as_str(), "https://github.com/a/one.git");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_deny_list_decodes_entries() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/denylist.json")
            .with_status(200)
            .with_body(r#"[{"packageUrl": "https://github.com/bad/pkg.git"}]"#)
            .create_async()
            .await;

        let entries = sources_for(&server).await.fetch_deny_list().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].package_url.as_str(), "https://github.com/bad/pkg.git");
    }

    #[tokio::test]
    async fn test_fetch_registry_decodes_optional_fields() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/collections.json")
            .with_status(200)
            .with_body(
                r#"[
                    {"name": "Server", "description": "Server-side", "badge": "S", "url": "https://lists/server.json"},
                    {"name": "Minimal", "url": "https://lists/minimal.json"}
                ]"#,
            )
            .create_async()
            .await;

        let registry = sources_for(&server).await.fetch_collection_registry().await.unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry[0].badge.as_deref(), Some("S"));
        assert_eq!(registry[1].description, None);
    }

    #[tokio::test]
    async fn test_server_error_is_a_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/packages.json")
            .with_status(500)
            .create_async()
            .await;

        assert!(sources_for(&server).await.fetch_package_list().await.is_err());
    }

    #[tokio::test]
    async fn test_undecodable_body_is_a_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/denylist.json")
            .with_status(200)
            .with_body("<html>rate limited</html>")
            .create_async()
            .await;

        assert!(sources_for(&server).await.fetch_deny_list().await.is_err());
    }

    #[tokio::test]
    async fn test_github_token_is_sent() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/packages.json")
            .match_header("authorization", "Bearer secret")
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let config = FetcherConfig::new()
            .with_package_list_url(format!("{}/packages.json", server.url()))
            .with_github_token(Some("secret".to_string()));
        let urls = HttpSources::new(config).unwrap().fetch_package_list().await.unwrap();
        assert!(urls.is_empty());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_token_is_not_sent_to_collection_hosts() {
        let lists = mockito::Server::new_async().await;
        let mut third_party = mockito::Server::new_async().await;
        let members = third_party
            .mock("GET", "/members.json")
            .match_header("authorization", mockito::Matcher::Missing)
            .with_status(200)
            .with_body(r#"["https://github.com/a/one.git"]"#)
            .create_async()
            .await;

        let config = FetcherConfig::new()
            .with_package_list_url(format!("{}/packages.json", lists.url()))
            .with_github_token(Some("secret".to_string()));
        let source = Url::parse(&format!("{}/members.json", third_party.url())).unwrap();
        let urls = HttpSources::new(config)
            .unwrap()
            .fetch_collection_members(&source)
            .await
            .unwrap();

        assert_eq!(urls.len(), 1);
        members.assert_async().await;
    }

    #[tokio::test]
    async fn test_oversized_member_list_is_a_failure() {
        let mut server = mockito::Server::new_async().await;
        let entries: Vec<String> = (0..100)
            .map(|i| format!("\"https://github.com/big/pkg-{}.git\"", i))
            .collect();
        server
            .mock("GET", "/members.json")
            .with_status(200)
            .with_body(format!("[{}]", entries.join(",")))
            .create_async()
            .await;

        let config = FetcherConfig::new().with_max_member_list_bytes(256);
        let source = Url::parse(&format!("{}/members.json", server.url())).unwrap();
        let err = HttpSources::new(config)
            .unwrap()
            .fetch_collection_members(&source)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("256"));
    }

    #[tokio::test]
    async fn test_size_cap_does_not_apply_to_configured_lists() {
        let mut server = mockito::Server::new_async().await;
        let entries: Vec<String> = (0..100)
            .map(|i| format!("\"https://github.com/big/pkg-{}.git\"", i))
            .collect();
        server
            .mock("GET", "/packages.json")
            .with_status(200)
            .with_body(format!("[{}]", entries.join(",")))
            .create_async()
            .await;

        let config = FetcherConfig::new()
            .with_package_list_url(format!("{}/packages.json", server.url()))
            .with_max_member_list_bytes(256);
        let urls = HttpSources::new(config).unwrap().fetch_package_list().await.unwrap();
        assert_eq!(urls.len(), 100);
    }
}

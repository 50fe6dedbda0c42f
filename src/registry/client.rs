//! HTTP client for the Factorio mod portal

use super::model::{ModRecord, ReleaseRecord};
use super::options::PageOptions;
use super::ModRegistry;
use crate::config::ServerCredentials;
use crate::download::ArchiveFetcher;
use crate::error::{Result, SyncError};
use anyhow::{bail, Context};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderValue, CONTENT_TYPE, RETRY_AFTER};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use url::Url;

pub const DEFAULT_REGISTRY_URL: &str = "https://mods.factorio.com/";
const MAX_RETRIES: u32 = 3;
const BASE_RETRY_DELAY_MS: u64 = 500;
const MAX_RETRY_DELAY_MS: u64 = 10_000;

#[derive(Deserialize)]
struct ModList {
    #[serde(default)]
    results: Vec<ModRecord>,
}

/// Stateless portal client; clones share one connection pool.
#[derive(Clone)]
pub struct RegistryClient {
    client: Arc<reqwest::Client>,
    base_url: Url,
}

impl RegistryClient {
    /// Create a client for `base_url` with a per-request timeout.
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let mut base_url = Url::parse(base_url.trim())
            .with_context(|| format!("Invalid registry URL '{}'", base_url))?;
        if base_url.cannot_be_a_base() {
            bail!("Registry URL '{}' cannot be used as a base URL", base_url);
        }
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = reqwest::Client::builder()
            .user_agent(concat!("factorio-mod-sync/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client: Arc::new(client),
            base_url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// `/api/mods` with the page options as query parameters.
    pub fn page_url(&self, options: &PageOptions) -> Url {
        let mut url = self.endpoint(&["api", "mods"]);
        url.query_pairs_mut().extend_pairs(options.query_pairs());
        url
    }

    /// `/api/mods/{name}` or `/api/mods/{name}/full`.
    pub fn mod_url(&self, name: &str, full: bool) -> Url {
        if full {
            self.endpoint(&["api", "mods", name, "full"])
        } else {
            self.endpoint(&["api", "mods", name])
        }
    }

    /// Absolute, authenticated URL for a release archive.
    pub fn archive_url(
        &self,
        release: &ReleaseRecord,
        credentials: &ServerCredentials,
    ) -> std::result::Result<Url, url::ParseError> {
        let mut url = self
            .base_url
            .join(release.download_url.trim_start_matches('/'))?;
        url.query_pairs_mut()
            .append_pair("username", &credentials.username)
            .append_pair("token", &credentials.token);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        what: &str,
        cancel: &CancellationToken,
    ) -> Result<T> {
        let response = self.send(url, cancel).await?;
        let url = response.url().to_string();
        let body = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SyncError::Cancelled),
            body = response.text() => body.map_err(|e| SyncError::network(&url, e))?,
        };
        serde_json::from_str(&body).map_err(|e| SyncError::decode(what, e))
    }

    /// GET with retries on 429/5xx. Any other non-success status is an error.
    async fn send(&self, url: Url, cancel: &CancellationToken) -> Result<reqwest::Response> {
        let mut attempt = 0;

        loop {
            attempt += 1;

            let response = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(SyncError::Cancelled),
                response = self.client.get(url.clone()).send() => {
                    response.map_err(|e| SyncError::network(redact(&url), e))?
                }
            };

            let status = response.status();
            let retryable =
                status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();

            if retryable && attempt < MAX_RETRIES {
                let delay = retry_delay(attempt, response.headers().get(RETRY_AFTER));
                tracing::warn!(
                    "Registry returned {} (attempt {}/{}), retrying in {}ms",
                    status,
                    attempt,
                    MAX_RETRIES,
                    delay.as_millis()
                );
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(SyncError::Cancelled),
                    _ = sleep(delay) => {}
                }
                continue;
            }

            if !status.is_success() {
                return Err(SyncError::Http {
                    url: redact(&url),
                    status: status.as_u16(),
                });
            }

            return Ok(response);
        }
    }
}

/// Retry-After when the server sends seconds, else exponential backoff with jitter.
fn retry_delay(attempt: u32, retry_after: Option<&HeaderValue>) -> Duration {
    if let Some(secs) = retry_after
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
    {
        return Duration::from_millis(secs.saturating_mul(1000).min(MAX_RETRY_DELAY_MS));
    }

    let base = BASE_RETRY_DELAY_MS.saturating_mul(1 << (attempt.saturating_sub(1)).min(16));
    let jitter = rand::random::<f64>() * 0.3 + 0.85;
    Duration::from_millis(((base as f64 * jitter) as u64).min(MAX_RETRY_DELAY_MS))
}

/// Drop credentials from a URL before it lands in logs or errors.
fn redact(url: &Url) -> String {
    let mut clean = url.clone();
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != "token")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        clean.set_query(None);
    } else {
        clean.query_pairs_mut().clear().extend_pairs(kept);
    }
    clean.to_string()
}

#[async_trait]
impl ModRegistry for RegistryClient {
    async fn fetch_page(
        &self,
        options: &PageOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<ModRecord>> {
        let url = self.page_url(options);
        tracing::debug!("Fetching mod page: {}", url);

        let list: ModList = self.get_json(url, "mod list", cancel).await?;
        let mut mods = list.results;

        // The portal does not reliably honour its own sort parameter.
        options.sort_by.sort(&mut mods);

        tracing::info!(
            "Fetched {} mods (page={}, page_size={}, version={})",
            mods.len(),
            options.page,
            options.page_size,
            options.version
        );
        Ok(mods)
    }

    async fn fetch_one(
        &self,
        name: &str,
        full: bool,
        cancel: &CancellationToken,
    ) -> Result<ModRecord> {
        let name = name.trim();
        if name.is_empty() || name == "base" {
            return Err(SyncError::NotFound(name.to_string()));
        }

        let url = self.mod_url(name, full);
        tracing::debug!("Fetching mod details: {}", url);

        let record: ModRecord = match self.get_json(url, name, cancel).await {
            Ok(record) => record,
            Err(SyncError::Http { status: 404, .. }) => {
                return Err(SyncError::NotFound(name.to_string()))
            }
            Err(e) => return Err(e),
        };

        if record.name.is_empty() {
            return Err(SyncError::NotFound(name.to_string()));
        }
        Ok(record)
    }
}

#[async_trait]
impl ArchiveFetcher for RegistryClient {
    async fn fetch_archive(
        &self,
        release: &ReleaseRecord,
        credentials: &ServerCredentials,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let url = self
            .archive_url(release, credentials)
            .map_err(|e| SyncError::download(&release.file_name, e))?;

        let response = self.send(url, cancel).await?;

        // Rejected credentials land on the HTML login page instead of the archive.
        let is_html = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.starts_with("text/html"))
            .unwrap_or(false);
        if is_html {
            return Err(SyncError::download(
                &release.file_name,
                "portal answered with an HTML page; check username and token",
            ));
        }

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| SyncError::io(dest, e))?;

        let source = redact(response.url());
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;

        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(SyncError::Cancelled),
                chunk = stream.next() => chunk,
            };
            let Some(chunk) = chunk else { break };
            let chunk = chunk.map_err(|e| SyncError::network(&source, e))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| SyncError::io(dest, e))?;
            written += chunk.len() as u64;
        }

        file.flush().await.map_err(|e| SyncError::io(dest, e))?;
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::options::PageSize;

    fn client() -> RegistryClient {
        RegistryClient::new(DEFAULT_REGISTRY_URL, Duration::from_secs(5)).unwrap()
    }

    fn credentials() -> ServerCredentials {
        ServerCredentials {
            username: "engineer".to_string(),
            token: "s3cret".to_string(),
        }
    }

    #[test]
    fn test_page_url_carries_options() {
        let options = PageOptions {
            page: 3,
            page_size: PageSize::Max,
            name_list: Some(vec!["bobplates".to_string(), "Krastorio 2".to_string()]),
            ..Default::default()
        };
        let url = client().page_url(&options);
        assert_eq!(url.path(), "/api/mods");
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert!(pairs.contains(&("hide_deprecated".to_string(), "true".to_string())));
        assert!(pairs.contains(&("page".to_string(), "3".to_string())));
        assert!(pairs.contains(&("page_size".to_string(), "max".to_string())));
        assert!(pairs.contains(&("version".to_string(), "1.1".to_string())));
        assert!(pairs.contains(&("namelist".to_string(), "Krastorio 2".to_string())));
    }

    #[test]
    fn test_mod_url_variants() {
        let client = client();
        assert_eq!(
            client.mod_url("bobplates", true).as_str(),
            "https://mods.factorio.com/api/mods/bobplates/full"
        );
        assert_eq!(
            client.mod_url("bobplates", false).as_str(),
            "https://mods.factorio.com/api/mods/bobplates"
        );
        assert_eq!(
            client.mod_url("Krastorio 2", false).path(),
            "/api/mods/Krastorio%202"
        );
    }

    #[test]
    fn test_base_url_without_trailing_slash_keeps_prefix() {
        let client = RegistryClient::new("http://localhost:8080/portal", Duration::from_secs(1)).unwrap();
        assert_eq!(
            client.mod_url("bobplates", false).as_str(),
            "http://localhost:8080/portal/api/mods/bobplates"
        );
    }

    #[test]
    fn test_rejects_invalid_base_url() {
        assert!(RegistryClient::new("not a url", Duration::from_secs(1)).is_err());
        assert!(RegistryClient::new("mailto:someone@example.com", Duration::from_secs(1)).is_err());
    }

    #[test]
    fn test_archive_url_is_authenticated() {
        let release = ReleaseRecord {
            download_url: "/download/bobplates/5a5f1ae6adcc441024d72b91".to_string(),
            file_name: "bobplates_1.1.5.zip".to_string(),
            ..Default::default()
        };
        let url = client().archive_url(&release, &credentials()).unwrap();
        assert_eq!(url.path(), "/download/bobplates/5a5f1ae6adcc441024d72b91");
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("username".to_string(), "engineer".to_string()),
                ("token".to_string(), "s3cret".to_string()),
            ]
        );
    }

    #[test]
    fn test_redact_strips_token() {
        let url = Url::parse("https://mods.factorio.com/download/x?username=engineer&token=s3cret").unwrap();
        let redacted = redact(&url);
        assert!(!redacted.contains("s3cret"));
        assert!(redacted.contains("username=engineer"));
    }

    #[test]
    fn test_retry_delay_honours_retry_after() {
        let header = HeaderValue::from_static("2");
        assert_eq!(retry_delay(1, Some(&header)), Duration::from_millis(2000));

        let huge = HeaderValue::from_static("3600");
        assert_eq!(
            retry_delay(1, Some(&huge)),
            Duration::from_millis(MAX_RETRY_DELAY_MS)
        );

        let overflowing = HeaderValue::from_static("99999999999999999");
        assert_eq!(
            retry_delay(1, Some(&overflowing)),
            Duration::from_millis(MAX_RETRY_DELAY_MS)
        );
    }

    #[test]
    fn test_retry_delay_backs_off() {
        let first = retry_delay(1, None);
        let third = retry_delay(3, None);
        assert!(first <= Duration::from_millis(BASE_RETRY_DELAY_MS * 2));
        assert!(third > first);
        assert!(third <= Duration::from_millis(MAX_RETRY_DELAY_MS));
    }

    #[test]
    fn test_decode_page_body() {
        let body = r#"{"pagination": {"count": 2}, "results": [
            {"name": "bobplates", "downloads_count": 10},
            {"name": "angelsrefining", "downloads_count": 500}
        ]}"#;
        let list: ModList = serde_json::from_str(body).unwrap();
        assert_eq!(list.results.len(), 2);
        assert_eq!(list.results[1].name, "angelsrefining");
    }

    #[tokio::test]
    async fn test_cancelled_fetch_returns_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = client().fetch_page(&PageOptions::default(), &cancel).await;
        assert!(matches!(result, Err(SyncError::Cancelled)));
    }

    /// One canned HTTP/1.1 response per accepted connection, in order.
    async fn serve(responses: Vec<(&'static str, &'static str, Vec<u8>)>) -> RegistryClient {
        use tokio::io::AsyncReadExt;
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            for (status, content_type, body) in responses {
                let Ok((mut socket, _)) = listener.accept().await else { return };
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }
                let head = format!(
                    "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    status,
                    content_type,
                    body.len()
                );
                let _ = socket.write_all(head.as_bytes()).await;
                let _ = socket.write_all(&body).await;
                let _ = socket.shutdown().await;
            }
        });

        RegistryClient::new(&format!("http://{}/", addr), Duration::from_secs(5)).unwrap()
    }

    fn json(body: &str) -> (&'static str, &'static str, Vec<u8>) {
        ("200 OK", "application/json", body.as_bytes().to_vec())
    }

    fn archive_release() -> ReleaseRecord {
        ReleaseRecord {
            version: "1.1.5".to_string(),
            download_url: "/download/bobplates/abc".to_string(),
            file_name: "bobplates_1.1.5.zip".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_fetch_page_sorts_client_side() {
        let client = serve(vec![json(
            r#"{"results": [
                {"name": "a", "downloads_count": 1},
                {"name": "b", "downloads_count": 9}
            ]}"#,
        )])
        .await;

        let mods = client
            .fetch_page(&PageOptions::default(), &CancellationToken::new())
            .await
            .unwrap();
        let names: Vec<&str> = mods.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn test_fetch_page_malformed_body_is_decode_error() {
        let client = serve(vec![json(r#"{"results": [{"name": "a", "downl"#)]).await;

        let result = client
            .fetch_page(&PageOptions::default(), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(SyncError::Decode { what, .. }) if what == "mod list"));
    }

    #[tokio::test]
    async fn test_fetch_one_missing_mod_is_not_found() {
        let client = serve(vec![(
            "404 Not Found",
            "application/json",
            br#"{"message": "Mod not found"}"#.to_vec(),
        )])
        .await;

        let result = client.fetch_one("x", true, &CancellationToken::new()).await;
        assert!(matches!(result, Err(SyncError::NotFound(name)) if name == "x"));
    }

    #[tokio::test]
    async fn test_fetch_one_decodes_full_record() {
        let client = serve(vec![json(
            r#"{"name": "bobplates", "title": "Bob's Metals", "releases": [
                {"version": "1.1.5", "download_url": "/download/bobplates/abc",
                 "file_name": "bobplates_1.1.5.zip",
                 "info_json": {"factorio_version": "1.1", "dependencies": ["base >= 1.1.0"]}}
            ]}"#,
        )])
        .await;

        let record = client
            .fetch_one("bobplates", true, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(record.name, "bobplates");
        assert_eq!(record.latest_release().version, "1.1.5");
    }

    #[tokio::test]
    async fn test_fetch_archive_rejects_login_page() {
        let client = serve(vec![(
            "200 OK",
            "text/html; charset=utf-8",
            b"<html>Log in</html>".to_vec(),
        )])
        .await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("bobplates_1.1.5.zip.part");

        let result = client
            .fetch_archive(&archive_release(), &credentials(), &dest, &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(SyncError::Download { name, .. }) if name == "bobplates_1.1.5.zip"));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_fetch_archive_streams_into_destination() {
        let body: Vec<u8> = (0..50_000u32).map(|i| (i % 251) as u8).collect();
        let client = serve(vec![("200 OK", "application/zip", body.clone())]).await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("bobplates_1.1.5.zip.part");

        let written = client
            .fetch_archive(&archive_release(), &credentials(), &dest, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(written, body.len() as u64);
        assert_eq!(tokio::fs::read(&dest).await.unwrap(), body);
    }

    #[tokio::test]
    async fn test_fetch_archive_forbidden_is_http_error_without_token() {
        let client = serve(vec![("403 Forbidden", "application/json", b"{}".to_vec())]).await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("bobplates_1.1.5.zip.part");

        let result = client
            .fetch_archive(&archive_release(), &credentials(), &dest, &CancellationToken::new())
            .await;
        match result {
            Err(SyncError::Http { url, status }) => {
                assert_eq!(status, 403);
                assert!(!url.contains("s3cret"));
            }
            other => panic!("expected Http error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_one_rejects_base_game() {
        let cancel = CancellationToken::new();
        let result = client().fetch_one("base", false, &cancel).await;
        assert!(matches!(result, Err(SyncError::NotFound(name)) if name == "base"));
    }
}

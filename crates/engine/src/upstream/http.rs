use super::headers::{parse_last_modified, parse_max_age};
use super::{ByteStream, FetchedManifest, Upstream};
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::{OptionExt, ResultExt};
use futures::StreamExt;
use kiosk_cache::Manifest;
use reqwest::header::{CACHE_CONTROL, HeaderMap, HeaderName, LAST_MODIFIED};
use reqwest::{RequestBuilder, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{debug, instrument};

const API_KEY_HEADER: &str = "X-API-Key";
const SUCCESS: i64 = 1;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
// Only the manifest request is bounded; package downloads are large.
const MANIFEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Every JSON response from upstream is wrapped in this envelope.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Envelope<T> {
    error_code: i64,
    #[serde(default)]
    error_status: String,
    #[serde(default)]
    message: String,
    response: Option<T>,
}

/// Upstream over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpUpstream {
    client: reqwest::Client,
    manifest_url: String,
    content_url: String,
    api_key: Option<String>,
}

impl HttpUpstream {
    pub fn new(manifest_url: impl Into<String>, content_url: impl Into<String>, api_key: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(concat!("kiosk/", env!("CARGO_PKG_VERSION")))
            .build()
            .or_raise(|| ErrorKind::Transport)?;
        Ok(Self::with_client(client, manifest_url, content_url, api_key))
    }

    pub fn with_client(
        client: reqwest::Client,
        manifest_url: impl Into<String>,
        content_url: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self { client, manifest_url: manifest_url.into(), content_url: content_url.into(), api_key }
    }

    /// Absolute URL of an upstream path.
    pub fn content_url(&self, path: &str) -> String {
        absolute_url(&self.content_url, path)
    }

    fn get(&self, url: &str) -> RequestBuilder {
        let request = self.client.get(url);
        match &self.api_key {
            Some(key) => request.header(API_KEY_HEADER, key),
            None => request,
        }
    }
}

/// Resolve `path` against `base`, leaving absolute URLs alone.
pub(crate) fn absolute_url(base: &str, path: &str) -> String {
    if path.starts_with("https://") || path.starts_with("http://") {
        return path.to_string();
    }
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

fn header<'a>(headers: &'a HeaderMap, name: HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Unwrap the manifest from an envelope, turning upstream-reported failures
/// into [`ErrorKind::Upstream`].
fn decode_manifest(status: StatusCode, body: &[u8]) -> Result<Manifest> {
    let envelope = serde_json::from_slice::<Envelope<Manifest>>(body);
    // Gateways in front of upstream answer errors with HTML.
    if envelope.is_err() && !status.is_success() {
        exn::bail!(ErrorKind::Upstream {
            code: i64::from(status.as_u16()),
            status: status.as_str().to_string(),
            message: status.canonical_reason().unwrap_or_default().to_string(),
        });
    }
    let envelope = envelope.or_raise(|| ErrorKind::InvalidResponse)?;
    if envelope.error_code != SUCCESS || !status.is_success() {
        exn::bail!(ErrorKind::Upstream {
            code: envelope.error_code,
            status: envelope.error_status,
            message: envelope.message,
        });
    }
    envelope.response.ok_or_raise(|| ErrorKind::InvalidResponse)
}

#[async_trait]
impl Upstream for HttpUpstream {
    #[instrument(level = "debug", skip(self), fields(url = %self.manifest_url))]
    async fn manifest(&self) -> Result<FetchedManifest> {
        let response = self
            .get(&self.manifest_url)
            .timeout(MANIFEST_TIMEOUT)
            .send()
            .await
            .or_raise(|| ErrorKind::Transport)?;
        let status = response.status();
        let headers = response.headers();
        let last_modified = header(headers, LAST_MODIFIED).and_then(parse_last_modified);
        let max_age = header(headers, CACHE_CONTROL).and_then(parse_max_age);
        let body = response.bytes().await.or_raise(|| ErrorKind::Transport)?;
        let manifest = decode_manifest(status, &body)?;
        debug!(version = %manifest.version, ?max_age, "fetched manifest");
        Ok(FetchedManifest {
            manifest,
            last_modified: last_modified.unwrap_or_else(OffsetDateTime::now_utc),
            max_age: max_age.unwrap_or(0),
        })
    }

    #[instrument(level = "debug", skip(self))]
    async fn archive(&self, content_path: &str) -> Result<ByteStream> {
        let url = self.content_url(content_path);
        let response = self.get(&url).send().await.or_raise(|| ErrorKind::Transport)?;
        let status = response.status();
        if !status.is_success() {
            exn::bail!(ErrorKind::Upstream {
                code: i64::from(status.as_u16()),
                status: status.as_str().to_string(),
                message: url,
            });
        }
        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).or_raise(|| ErrorKind::Transport))
            .boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("https://cdn.example", "/common/world.content", "https://cdn.example/common/world.content")]
    #[case("https://cdn.example/", "common/world.content", "https://cdn.example/common/world.content")]
    #[case("https://cdn.example", "https://mirror.example/w.content", "https://mirror.example/w.content")]
    fn test_joins_content_urls(#[case] base: &str, #[case] path: &str, #[case] expected: &str) {
        assert_eq!(absolute_url(base, path), expected);
    }

    #[test]
    fn test_decodes_successful_envelope() {
        let body = br#"{
            "ErrorCode": 1,
            "ErrorStatus": "Success",
            "Message": "Ok",
            "Response": {"version": "v9", "mobileWorldContentPaths": {"en": "/c/world_v9.content"}}
        }"#;
        let manifest = decode_manifest(StatusCode::OK, body).unwrap();
        assert_eq!(manifest.version, "v9");
        assert_eq!(manifest.content_path("en"), Some("/c/world_v9.content"));
    }

    #[test]
    fn test_upstream_error_code_is_reported() {
        let body = br#"{"ErrorCode": 5, "ErrorStatus": "SystemDisabled", "Message": "Maintenance"}"#;
        let err = decode_manifest(StatusCode::SERVICE_UNAVAILABLE, body).unwrap_err();
        assert_eq!(*err, ErrorKind::Upstream {
            code: 5,
            status: "SystemDisabled".into(),
            message: "Maintenance".into(),
        });
    }

    #[test]
    fn test_non_json_error_page_uses_http_status() {
        let err = decode_manifest(StatusCode::BAD_GATEWAY, b"<html>bad gateway</html>").unwrap_err();
        assert_eq!(*err, ErrorKind::Upstream { code: 502, status: "502".into(), message: "Bad Gateway".into() });
        assert!(err.is_retryable());
    }

    #[test]
    fn test_garbage_success_is_invalid_response() {
        let err = decode_manifest(StatusCode::OK, b"not json").unwrap_err();
        assert_eq!(*err, ErrorKind::InvalidResponse);
        let err = decode_manifest(StatusCode::OK, br#"{"ErrorCode": 1}"#).unwrap_err();
        assert_eq!(*err, ErrorKind::InvalidResponse);
    }

    #[test]
    fn test_api_key_header_is_sent() {
        let upstream = HttpUpstream::new("https://api.example/manifest", "https://cdn.example", Some("k3y".into()))
            .unwrap();
        let request = upstream.get("https://api.example/manifest").build().unwrap();
        assert_eq!(request.headers().get(API_KEY_HEADER).unwrap(), "k3y");
        assert_eq!(upstream.content_url("/x.content"), "https://cdn.example/x.content");
    }
}

//! Same-origin relay for remote model files the browser cannot fetch directly.

use crate::services::task_error::{TaskError, TaskResult};
use bytes::Bytes;
use reqwest::{Client, header::CONTENT_TYPE};
use std::time::Duration;
use tracing::{debug, warn};

const SERVICE: &str = "proxy";
const FETCH_TIMEOUT: Duration = Duration::from_secs(60);

/// Content type used when the remote does not declare one.
pub const DEFAULT_CONTENT_TYPE: &str = "model/gltf-binary";

#[derive(Debug)]
pub struct ProxiedBinary {
    pub bytes: Bytes,
    pub content_type: String,
}

/// Fetch `remote_url` (percent-encoded or not) in one buffered GET.
pub async fn proxy_binary(http: &Client, remote_url: &str) -> TaskResult<ProxiedBinary> {
    let decoded = urlencoding::decode(remote_url)
        .map(|url| url.into_owned())
        .unwrap_or_else(|_| remote_url.to_string());

    if !(decoded.starts_with("http://") || decoded.starts_with("https://")) {
        return Err(TaskError::Validation(format!("not an http(s) url: {}", decoded)));
    }

    let resp = http
        .get(&decoded)
        .timeout(FETCH_TIMEOUT)
        .send()
        .await
        .map_err(|e| TaskError::transport(SERVICE, "fetch", e))?;

    if !resp.status().is_success() {
        warn!("remote {} answered {}; forwarding body as-is", decoded, resp.status());
    }

    let content_type = resp
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());

    let bytes = resp
        .bytes()
        .await
        .map_err(|e| TaskError::transport(SERVICE, "fetch", e))?;
    debug!("proxied {} bytes ({}) from {}", bytes.len(), content_type, decoded);

    Ok(ProxiedBinary {
        bytes,
        content_type,
    })
}

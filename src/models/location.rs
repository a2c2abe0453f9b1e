//! Where a pipeline stage left its output.

use base64::{Engine as _, engine::general_purpose};
use std::path::PathBuf;

/// A stage result is either addressable by URL or a file on our disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultLocation {
    /// `http://`, `https://` or `data:` — usable by an upstream as-is.
    Remote(String),
    /// A file written by the local blob store.
    Local(PathBuf),
}

impl ResultLocation {
    /// Client-facing form: the URL, or the stored path.
    pub fn display(&self) -> String {
        match self {
            ResultLocation::Remote(url) => url.clone(),
            ResultLocation::Local(path) => path.display().to_string(),
        }
    }
}

/// `data:<mime>;base64,<payload>` over the full buffer.
pub fn data_uri(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, general_purpose::STANDARD.encode(bytes))
}

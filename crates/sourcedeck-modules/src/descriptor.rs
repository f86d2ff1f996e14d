//! Module descriptor parsing and validation.
//!
//! A descriptor is the remote JSON document that declares a module's
//! metadata, the location of its script and its capability flags.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ModuleError;

/// URL schemes a module may be fetched from.
const ALLOWED_SCHEMES: &[&str] = &["http", "https"];

/// Remote-declared module metadata, as published at the metadata URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleDescriptor {
    pub source_name: String,
    pub author: Author,
    pub icon_url: String,
    /// Opaque version string. Only ever compared for inequality.
    pub version: String,
    pub language: String,
    pub base_url: String,
    pub stream_type: String,
    pub quality: String,
    pub search_base_url: String,
    pub script_url: String,
    #[serde(rename = "asyncJS", default, skip_serializing_if = "Option::is_none")]
    pub async_js: Option<bool>,
    #[serde(
        rename = "streamAsyncJS",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub stream_async_js: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub softsub: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multi_stream: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multi_subs: Option<bool>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

/// Module author section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    pub icon: String,
}

// ─── Validation helpers ─────────────────────────────────────────────

/// Parse and validate a URL a module document is fetched from.
///
/// Only `http` and `https` are accepted; anything else (including
/// `file://`) is rejected before a request is made.
pub fn parse_module_url(raw: &str) -> Result<Url, ModuleError> {
    let trimmed = raw.trim();
    let url = Url::parse(trimmed)
        .map_err(|e| ModuleError::InvalidUrl(format!("'{trimmed}': {e}")))?;

    if !ALLOWED_SCHEMES.contains(&url.scheme()) {
        return Err(ModuleError::InvalidUrl(format!(
            "unsupported scheme '{}' in '{trimmed}'",
            url.scheme()
        )));
    }

    if url.host_str().is_none() {
        return Err(ModuleError::InvalidUrl(format!("URL has no host: '{trimmed}'")));
    }

    Ok(url)
}

impl ModuleDescriptor {
    /// Decode a descriptor from the raw bytes of the metadata document.
    pub fn parse(bytes: &[u8]) -> Result<Self, ModuleError> {
        serde_json::from_slice(bytes).map_err(|e| ModuleError::Decode(e.to_string()))
    }

    /// Decode and validate in one step.
    pub fn parse_and_validate(bytes: &[u8]) -> Result<Self, ModuleError> {
        let descriptor = Self::parse(bytes)?;
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// Reject descriptors that parse but cannot identify a module.
    pub fn validate(&self) -> Result<(), ModuleError> {
        if self.source_name.trim().is_empty() {
            return Err(ModuleError::Decode("sourceName must not be empty".into()));
        }
        if self.version.trim().is_empty() {
            return Err(ModuleError::Decode("version must not be empty".into()));
        }
        if self.script_url.trim().is_empty() {
            return Err(ModuleError::Decode("scriptUrl must not be empty".into()));
        }
        Ok(())
    }

    /// Resolve the script location declared by this descriptor.
    pub fn script_url(&self) -> Result<Url, ModuleError> {
        parse_module_url(&self.script_url)
    }

    pub fn requires_async_js(&self) -> bool {
        self.async_js.unwrap_or(false)
    }

    pub fn requires_async_stream(&self) -> bool {
        self.stream_async_js.unwrap_or(false)
    }

    pub fn supports_softsub(&self) -> bool {
        self.softsub.unwrap_or(false)
    }

    pub fn supports_multi_stream(&self) -> bool {
        self.multi_stream.unwrap_or(false)
    }

    pub fn supports_multi_subs(&self) -> bool {
        self.multi_subs.unwrap_or(false)
    }
}

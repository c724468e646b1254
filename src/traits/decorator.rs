//! Request parameter decoration.

use tracing::debug;

use crate::config::SDK_VERSION;
use crate::request::{HttpMethod, RequestParams};

/// Enriches outgoing request parameters before the request is signed.
///
/// The decorator runs exactly once per dispatch attempt, ahead of signature
/// computation, so everything it adds is covered by the signature.
pub trait ParamsDecorator: Send + Sync {
    fn decorate(&self, method: HttpMethod, resource: &str, params: &mut RequestParams);
}

/// Default decorator: reports the device language and SDK version.
///
/// Values are only added when the caller has not already set them, so
/// explicit parameters always win.
#[derive(Debug, Clone)]
pub struct DefaultParamsDecorator {
    pub lang: Option<String>,
    pub sdk_version: String,
}

impl DefaultParamsDecorator {
    pub fn new() -> Self {
        Self {
            lang: detect_lang(),
            sdk_version: SDK_VERSION.to_string(),
        }
    }
}

impl Default for DefaultParamsDecorator {
    fn default() -> Self {
        Self::new()
    }
}

impl ParamsDecorator for DefaultParamsDecorator {
    fn decorate(&self, _method: HttpMethod, resource: &str, params: &mut RequestParams) {
        if let Some(lang) = &self.lang {
            if !params.contains("lang") {
                params.add("lang", lang.clone());
            }
        }
        if !params.contains("sdkVersion") {
            params.add("sdkVersion", self.sdk_version.clone());
        }
        debug!(resource, "decorated request parameters");
    }
}

/// Language tag from the `LANG` environment variable, e.g. `en_US`.
fn detect_lang() -> Option<String> {
    let raw = std::env::var("LANG").ok()?;
    let tag = raw.split('.').next().unwrap_or("").trim();
    match tag {
        "" | "C" | "POSIX" => None,
        tag => Some(tag.to_string()),
    }
}

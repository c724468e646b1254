//! Signed request dispatch over HTTP.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::{debug, trace, warn};

use crate::config::ClientConfig;
use crate::error::{ApiError, ApiResult};
use crate::network::NetworkStatus;
use crate::request::{HttpMethod, Request};
use crate::signer::{authorization_header, AUTHORIZATION_HEADER};
use crate::traits::{DefaultParamsDecorator, ParamsDecorator, TimeSyncObserver};

/// Sends individual API requests: decorates parameters, signs, dispatches,
/// and classifies the response.
///
/// The executor is stateless with respect to authentication. Attaching an
/// access token and reacting to auth failures is the session manager's job.
pub struct RequestExecutor {
    pub base_url: String,
    client_secret: Option<String>,
    http: reqwest::Client,
    network: NetworkStatus,
    decorator: Mutex<Option<Arc<dyn ParamsDecorator>>>,
    time_sync: Mutex<Option<Arc<dyn TimeSyncObserver>>>,
}

impl RequestExecutor {
    pub fn new(config: &ClientConfig, network: NetworkStatus) -> Self {
        Self {
            base_url: config.base_url.clone(),
            client_secret: config.client_secret.clone(),
            http: reqwest::Client::new(),
            network,
            decorator: Mutex::new(Some(Arc::new(DefaultParamsDecorator::new()))),
            time_sync: Mutex::new(None),
        }
    }

    /// Replaces the parameter decorator. `None` disables decoration.
    pub fn set_params_decorator(&self, decorator: Option<Arc<dyn ParamsDecorator>>) {
        *self.decorator.lock().unwrap() = decorator;
    }

    pub fn set_time_sync_observer(&self, observer: Arc<dyn TimeSyncObserver>) {
        *self.time_sync.lock().unwrap() = Some(observer);
    }

    /// Performs one dispatch attempt of `request`.
    ///
    /// GET and DELETE parameters travel in the query string, everything else
    /// as a form body. A request that cannot be signed is never sent. The
    /// returned value is always a JSON object; any 2xx response with a
    /// different shape surfaces as [`ApiError::Malformed`].
    pub async fn execute(&self, request: &Request) -> ApiResult<Value> {
        let mut params = request.params.clone();
        let decorator = self.decorator.lock().unwrap().clone();
        if let Some(decorator) = decorator {
            decorator.decorate(request.method, &request.resource, &mut params);
        }

        let header = authorization_header(
            request.method,
            &self.base_url,
            &request.resource,
            &params,
            self.client_secret.as_deref(),
        )?;

        let url = format!("{}{}", self.base_url, request.resource);
        let pairs: Vec<(&str, &str)> = params.iter().collect();
        let mut builder = match request.method {
            HttpMethod::Get => self.http.get(&url).query(&pairs),
            HttpMethod::Delete => self.http.delete(&url).query(&pairs),
            HttpMethod::Post => self.http.post(&url).form(&pairs),
            HttpMethod::Put => self.http.put(&url).form(&pairs),
            HttpMethod::Patch => self.http.patch(&url).form(&pairs),
        };
        if let Some(header) = header {
            builder = builder.header(AUTHORIZATION_HEADER, header);
        }

        debug!(method = %request.method, url = %url, "dispatching request");
        let sent = Utc::now();
        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                self.network.set_reachable(false);
                return Err(ApiError::Transport(e.to_string()));
            }
        };
        let status = response.status();
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                self.network.set_reachable(false);
                return Err(ApiError::Transport(e.to_string()));
            }
        };
        let received = Utc::now();

        let body: Option<Value> = serde_json::from_str(&text).ok();
        if let Some(body) = &body {
            self.observe_server_time(body, sent, received);
        }

        match (status.is_success(), body) {
            (true, Some(Value::Object(object))) => {
                self.network.set_reachable(true);
                trace!(status = %status, "request succeeded");
                Ok(Value::Object(object))
            }
            (true, Some(_)) => Err(ApiError::Malformed(format!(
                "expected a JSON object, got: {}",
                snippet(&text)
            ))),
            (true, None) => {
                self.network.set_reachable(false);
                Err(ApiError::Malformed(format!(
                    "unparseable response body: {}",
                    snippet(&text)
                )))
            }
            (false, Some(Value::Object(object))) => {
                self.network.set_reachable(true);
                let (code, message) = classify_error_body(&object);
                warn!(status = %status, code, message, "server rejected request");
                Err(ApiError::Server {
                    status: status.as_u16(),
                    code,
                    message,
                })
            }
            (false, _) => {
                self.network.set_reachable(false);
                Err(ApiError::Server {
                    status: status.as_u16(),
                    code: 0,
                    message: snippet(&text),
                })
            }
        }
    }

    /// Forwards `_serverTime` and `_serverTook` to the observer. Error
    /// bodies carry these fields too, so this runs before classification.
    fn observe_server_time(&self, body: &Value, sent: DateTime<Utc>, received: DateTime<Utc>) {
        let Some(object) = body.as_object() else { return };
        let Some(server_time) = object.get("_serverTime").and_then(json_i64) else {
            return;
        };
        let server_took = object.get("_serverTook").and_then(json_i64);
        let observer = self.time_sync.lock().unwrap().clone();
        if let Some(observer) = observer {
            observer.on_server_time(server_time, server_took, sent, received);
        }
    }
}

/// Extracts `(code, message)` from an error body. The nested
/// `{"error": {"code", "message"}}` form wins over flat fields; a missing
/// or zero code means "no code".
fn classify_error_body(body: &Map<String, Value>) -> (i64, String) {
    if let Some(Value::Object(error)) = body.get("error") {
        let code = error.get("code").and_then(json_i64).unwrap_or(0);
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown server error")
            .to_string();
        return (code, message);
    }
    let code = body.get("errorCode").and_then(json_i64).unwrap_or(0);
    let message = body
        .get("errorMessage")
        .and_then(Value::as_str)
        .or_else(|| body.get("message").and_then(Value::as_str))
        .unwrap_or("unknown server error")
        .to_string();
    (code, message)
}

/// Accepts both JSON numbers and numeric strings.
fn json_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn snippet(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return "<empty body>".to_string();
    }
    trimmed.chars().take(200).collect()
}

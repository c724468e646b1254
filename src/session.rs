//! Session lifecycle: anonymous access token acquisition and authenticated
//! request orchestration.
//!
//! At most one access token fetch is in flight at any time. Every caller
//! that needs a token parks on the current fetch and receives a clone of its
//! terminal outcome; the fetch itself runs on a detached task so it survives
//! callers giving up. Authenticated requests transparently acquire a token
//! first, and react to an invalid token rejection with a single
//! invalidate-refetch-retry cycle before surfacing the error.

use std::collections::VecDeque;
use std::mem;
use std::sync::{Arc, Mutex, Weak};

use serde_json::Value;
use tokio::sync::{oneshot, watch};
use tracing::{debug, error, info, warn};

use crate::config::ClientConfig;
use crate::credentials::{CredentialStore, Session};
use crate::error::{ApiError, ApiResult};
use crate::executor::RequestExecutor;
use crate::request::{HttpMethod, Request, RequestParams};
use crate::traits::{RequestOutbox, ServerPropertiesListener};

const ACCESS_TOKEN_RESOURCE: &str = "/authentication/accessToken";

/// Retry budget for a request whose access token the server rejects.
const BAD_AUTH_RETRIES: u32 = 1;

#[derive(Default)]
struct FetchState {
    in_flight: bool,
    waiters: VecDeque<oneshot::Sender<ApiResult<Value>>>,
}

/// Owns authentication state and turns plain requests into authenticated
/// dispatches.
pub struct SessionManager {
    config: ClientConfig,
    store: Arc<CredentialStore>,
    executor: Arc<RequestExecutor>,
    fetch: Mutex<FetchState>,
    initialized: watch::Sender<bool>,
    outbox: Mutex<Option<Arc<dyn RequestOutbox>>>,
    properties_listener: Mutex<Option<Weak<dyn ServerPropertiesListener>>>,
    /// Handed to spawned tasks so they keep the manager alive.
    weak_self: Weak<SessionManager>,
}

impl SessionManager {
    pub fn new(
        config: ClientConfig,
        store: Arc<CredentialStore>,
        executor: Arc<RequestExecutor>,
    ) -> Arc<Self> {
        let (initialized, _) = watch::channel(false);
        Arc::new_cyclic(|weak| Self {
            config,
            store,
            executor,
            fetch: Mutex::new(FetchState::default()),
            initialized,
            outbox: Mutex::new(None),
            properties_listener: Mutex::new(None),
            weak_self: weak.clone(),
        })
    }

    /// Opens the gate: requests accepted before this resolve now.
    pub fn mark_initialized(&self) {
        self.initialized.send_replace(true);
    }

    pub fn is_initialized(&self) -> bool {
        *self.initialized.borrow()
    }

    async fn await_initialized(&self) {
        if *self.initialized.borrow() {
            return;
        }
        let mut rx = self.initialized.subscribe();
        // The sender lives on self, so this cannot fail.
        let _ = rx.wait_for(|ready| *ready).await;
    }

    pub fn set_outbox(&self, outbox: Arc<dyn RequestOutbox>) {
        *self.outbox.lock().unwrap() = Some(outbox);
    }

    pub fn set_server_properties_listener(&self, listener: Weak<dyn ServerPropertiesListener>) {
        *self.properties_listener.lock().unwrap() = Some(listener);
    }

    /// Active user id, `None` for the anonymous user.
    pub fn active_user(&self) -> Option<String> {
        let user = self.store.active_user();
        if user.is_empty() {
            None
        } else {
            Some(user)
        }
    }

    /// Runs `request` with authentication, waiting for initialization first.
    ///
    /// Acquires an access token for the request's user when none is stored.
    /// If the server rejects the attached token, the token is dropped and the
    /// request retried once with a fresh one; a second rejection surfaces.
    pub async fn request_authenticated(&self, request: &Request) -> ApiResult<Value> {
        self.await_initialized().await;
        let user_id = request.user_id.clone().unwrap_or_default();
        let mut auth_retries_left = BAD_AUTH_RETRIES;
        loop {
            let Some(token) = self.store.access_token(&user_id) else {
                self.ensure_access_token(&user_id).await?;
                continue;
            };
            let mut attempt = request.clone();
            attempt.params.set("accessToken", token);
            match self.executor.execute(&attempt).await {
                Err(err) if err.is_invalid_access_token() && auth_retries_left > 0 => {
                    auth_retries_left -= 1;
                    warn!(
                        resource = %request.resource,
                        "access token rejected, refreshing and retrying"
                    );
                    self.store.invalidate_access_token(&user_id);
                    tokio::time::sleep(self.config.bad_auth_retry_interval).await;
                }
                outcome => return outcome,
            }
        }
    }

    /// Hands `request` to the outbox, or fires it on a background task when
    /// no outbox is installed. Never waits for the outcome.
    pub fn post_eventually(&self, request: Request) {
        let outbox = self.outbox.lock().unwrap().clone();
        if let Some(outbox) = outbox {
            outbox.enqueue(request, 0);
            return;
        }
        if tokio::runtime::Handle::try_current().is_err() {
            warn!(resource = %request.resource, "dropping background request, no async runtime");
            return;
        }
        let Some(this) = self.weak_self.upgrade() else { return };
        tokio::spawn(async move {
            if let Err(err) = this.request_authenticated(&request).await {
                warn!(error = %err, resource = %request.resource, "background request failed");
            }
        });
    }

    /// Blocks until `user_id` has an access token, fetching if necessary.
    async fn ensure_access_token(&self, user_id: &str) -> ApiResult<()> {
        loop {
            if self.store.access_token(user_id).is_some() {
                return Ok(());
            }
            match self.join_token_fetch(user_id).await {
                // The completed fetch may have targeted another user, so
                // loop and check again.
                Ok(Ok(_)) => continue,
                Ok(Err(err)) => return Err(err),
                Err(_) => {
                    return Err(ApiError::Transport(
                        "access token fetch interrupted".to_string(),
                    ))
                }
            }
        }
    }

    /// Parks the caller on the in-flight token fetch, starting one when idle.
    ///
    /// The fetch runs on a detached task: dropping the returned receiver
    /// abandons the wait but never the fetch itself.
    fn join_token_fetch(&self, user_id: &str) -> oneshot::Receiver<ApiResult<Value>> {
        let (tx, rx) = oneshot::channel();
        let mut fetch = self.fetch.lock().unwrap();
        fetch.waiters.push_back(tx);
        if !fetch.in_flight {
            match self.weak_self.upgrade() {
                Some(this) => {
                    fetch.in_flight = true;
                    let user_id = user_id.to_string();
                    tokio::spawn(async move {
                        let outcome = this.fetch_anonymous_access_token(&user_id).await;
                        let waiters = {
                            let mut fetch = this.fetch.lock().unwrap();
                            fetch.in_flight = false;
                            mem::take(&mut fetch.waiters)
                        };
                        debug!(waiters = waiters.len(), "completing access token waiters");
                        for waiter in waiters {
                            let _ = waiter.send(outcome.clone());
                        }
                    });
                }
                // Only reachable mid-teardown; fail the waiter rather than
                // leave it parked forever.
                None => {
                    fetch.waiters.pop_back();
                }
            }
        }
        rx
    }

    /// One fetch cycle, including the configured retry budget.
    ///
    /// A credentials rejection is terminal immediately: retrying a bad
    /// clientId/clientSecret pair cannot succeed. A grant payload the client
    /// cannot adopt is terminal too; only transport and server errors spend
    /// the retry budget.
    async fn fetch_anonymous_access_token(&self, user_id: &str) -> ApiResult<Value> {
        let mut retries_left = self.config.token_fetch_retries;
        loop {
            match self.fetch_access_token_once(user_id).await {
                Ok(body) => return Ok(body),
                Err(err) if err.is_invalid_credentials() => {
                    error!("invalid client credentials, check your clientId and clientSecret");
                    return Err(err);
                }
                Err(err @ ApiError::Malformed(_)) => {
                    error!(error = %err, "access token grant unusable, not retrying");
                    return Err(err);
                }
                Err(err) if retries_left > 0 => {
                    retries_left -= 1;
                    warn!(error = %err, retries_left, "access token fetch failed, will retry");
                    tokio::time::sleep(self.config.token_retry_interval).await;
                }
                Err(err) => {
                    error!(error = %err, "could not obtain an anonymous access token");
                    return Err(err);
                }
            }
        }
    }

    async fn fetch_access_token_once(&self, user_id: &str) -> ApiResult<Value> {
        let mut params = RequestParams::new();
        params.add("clientId", self.config.client_id.clone());
        params.add("devicePlatform", self.config.device_platform.clone());
        params.add("deviceModel", self.config.device_model.clone());
        if let Some(device_id) = &self.config.device_id {
            params.add("deviceId", device_id.clone());
        }
        if !user_id.is_empty() {
            params.add("userId", user_id.to_string());
        }
        let request = Request::new(
            if user_id.is_empty() {
                None
            } else {
                Some(user_id.to_string())
            },
            HttpMethod::Post,
            ACCESS_TOKEN_RESOURCE,
            params,
        );
        debug!(user_id, "fetching anonymous access token");
        let body = self.executor.execute(&request).await?;
        self.adopt_token_response(user_id, &body)?;
        Ok(body)
    }

    /// Validates and stores a token grant, then forwards any server-side
    /// installation state piggybacked on the response.
    fn adopt_token_response(&self, user_id: &str, body: &Value) -> ApiResult<()> {
        let token = body.get("token").and_then(Value::as_str);
        let data = body.get("data").and_then(Value::as_object);
        let (Some(token), Some(data)) = (token, data) else {
            return Err(ApiError::Malformed(
                "access token response missing token or data".to_string(),
            ));
        };
        let Some(installation_id) = data.get("installationId").and_then(Value::as_str) else {
            return Err(ApiError::Malformed(
                "access token response missing installationId".to_string(),
            ));
        };

        // The grant echoes the user id it resolved; prefer it over the
        // requested one.
        let granted_user = data
            .get("userId")
            .and_then(Value::as_str)
            .unwrap_or(user_id);
        let session = Session {
            access_token: Some(token.to_string()),
            session_id: data.get("sid").and_then(Value::as_str).map(str::to_string),
            installation_id: Some(installation_id.to_string()),
            user_id: if granted_user.is_empty() {
                None
            } else {
                Some(granted_user.to_string())
            },
        };
        info!(user_id, installation_id, "anonymous access token acquired");
        {
            let _active = self.store.swap_active_user(user_id);
            self.store.set_session(user_id, session);
        }

        if let Some(custom) = body
            .pointer("/_installation/custom")
            .filter(|custom| custom.is_object())
        {
            self.notify_server_properties(custom);
        }
        Ok(())
    }

    fn notify_server_properties(&self, custom: &Value) {
        let listener = self.properties_listener.lock().unwrap().clone();
        if let Some(listener) = listener.and_then(|weak| weak.upgrade()) {
            listener.receive_server_properties(custom);
        }
    }
}

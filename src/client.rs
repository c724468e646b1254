//! High-level client facade wiring the pipeline together.

use std::sync::{Arc, Weak};

use serde_json::Value;
use tracing::debug;

use crate::config::ClientConfig;
use crate::credentials::CredentialStore;
use crate::error::ApiResult;
use crate::executor::RequestExecutor;
use crate::network::NetworkStatus;
use crate::request::{HttpMethod, Request, RequestParams};
use crate::session::SessionManager;
use crate::sync::PropertySynchronizer;
use crate::traits::{ParamsDecorator, RequestOutbox, TimeSyncObserver};

/// Entry point of the SDK.
///
/// Owns the credential store, the session manager, and the installation
/// property synchronizer. Construct it with [`ClientConfig`], install any
/// extension points, then call [`initialize`](Self::initialize) from inside
/// a Tokio runtime; requests issued earlier wait for initialization instead
/// of failing.
pub struct WonderPushClient {
    config: ClientConfig,
    store: Arc<CredentialStore>,
    executor: Arc<RequestExecutor>,
    session: Arc<SessionManager>,
    synchronizer: Arc<PropertySynchronizer>,
    network: NetworkStatus,
}

impl WonderPushClient {
    pub fn new(config: ClientConfig) -> Self {
        let network = NetworkStatus::new();
        let store = Arc::new(CredentialStore::new(config.storage_dir.as_deref()));
        let executor = Arc::new(RequestExecutor::new(&config, network.clone()));
        let session =
            SessionManager::new(config.clone(), Arc::clone(&store), Arc::clone(&executor));
        let synchronizer = PropertySynchronizer::new(&config, Arc::clone(&session));
        let listener: Weak<PropertySynchronizer> = Arc::downgrade(&synchronizer);
        session.set_server_properties_listener(listener);
        Self {
            config,
            store,
            executor,
            session,
            synchronizer,
            network,
        }
    }

    /// Installs a durable queue for fire-and-forget requests.
    pub fn with_outbox(self, outbox: Arc<dyn RequestOutbox>) -> Self {
        self.session.set_outbox(outbox);
        self
    }

    pub fn with_time_sync_observer(self, observer: Arc<dyn TimeSyncObserver>) -> Self {
        self.executor.set_time_sync_observer(observer);
        self
    }

    pub fn with_params_decorator(self, decorator: Arc<dyn ParamsDecorator>) -> Self {
        self.executor.set_params_decorator(Some(decorator));
        self
    }

    /// Loads persisted state, rearms any pending property flush, and opens
    /// the request gate. Must be called from inside a Tokio runtime.
    pub fn initialize(&self) {
        self.store.load();
        self.synchronizer.load();
        self.synchronizer.restore_pending_flush();
        self.session.mark_initialized();
        debug!(client_id = %self.config.client_id, "client initialized");
    }

    pub async fn get(&self, resource: &str, params: RequestParams) -> ApiResult<Value> {
        self.request(HttpMethod::Get, resource, params).await
    }

    pub async fn post(&self, resource: &str, params: RequestParams) -> ApiResult<Value> {
        self.request(HttpMethod::Post, resource, params).await
    }

    pub async fn put(&self, resource: &str, params: RequestParams) -> ApiResult<Value> {
        self.request(HttpMethod::Put, resource, params).await
    }

    pub async fn delete(&self, resource: &str) -> ApiResult<Value> {
        self.request(HttpMethod::Delete, resource, RequestParams::new())
            .await
    }

    /// Authenticated request on behalf of the active user.
    pub async fn request(
        &self,
        method: HttpMethod,
        resource: &str,
        params: RequestParams,
    ) -> ApiResult<Value> {
        self.request_for_user(self.active_user().as_deref(), method, resource, params)
            .await
    }

    /// Authenticated request on behalf of a specific user, `None` for the
    /// anonymous user.
    pub async fn request_for_user(
        &self,
        user_id: Option<&str>,
        method: HttpMethod,
        resource: &str,
        params: RequestParams,
    ) -> ApiResult<Value> {
        let request = Request::new(user_id.map(str::to_owned), method, resource, params);
        self.session.request_authenticated(&request).await
    }

    /// Queues a POST that must eventually reach the server. Returns
    /// immediately; delivery is owned by the outbox when one is installed.
    pub fn post_eventually(&self, resource: &str, params: RequestParams) {
        let request = Request::new(self.active_user(), HttpMethod::Post, resource, params);
        self.session.post_eventually(request);
    }

    /// Merges `properties` into the installation's custom properties and
    /// lets the synchronizer flush them when the debounce window closes.
    pub fn put_properties(&self, properties: &Value) {
        self.synchronizer.put_properties(properties);
    }

    /// Local desired state of the installation's custom properties.
    pub fn properties(&self) -> Value {
        self.synchronizer.properties()
    }

    /// Flushes pending property writes now instead of waiting for the timer.
    pub fn flush_properties(&self) {
        self.synchronizer.flush();
    }

    /// Re-fetches the installation from the server and realigns local
    /// synchronization state with it.
    pub async fn resync_installation(&self) -> ApiResult<()> {
        self.synchronizer.resync_from_server().await
    }

    pub fn network_status(&self) -> NetworkStatus {
        self.network.clone()
    }

    pub fn is_reachable(&self) -> bool {
        self.network.is_reachable()
    }

    /// Active user id, `None` for the anonymous user.
    pub fn active_user(&self) -> Option<String> {
        self.session.active_user()
    }

    pub fn set_active_user(&self, user_id: Option<&str>) {
        self.store.set_active_user(user_id.unwrap_or_default());
    }

    /// Installation id granted to the active user's session, if any.
    pub fn installation_id(&self) -> Option<String> {
        self.store
            .session(&self.store.active_user())
            .installation_id
    }

    /// Access token of the active user's session, if any.
    pub fn access_token(&self) -> Option<String> {
        self.store.access_token(&self.store.active_user())
    }
}

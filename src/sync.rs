//! Debounced synchronization of installation custom properties.
//!
//! Local writes land in a desired-state object and are flushed to the server
//! as a diff against the last server-known state. Flushes wait out a quiet
//! period so bursts of writes coalesce into one request, but never longer
//! than a hard deadline counted from the first unflushed write. Both state
//! objects survive restarts when a storage directory is configured.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::ApiResult;
use crate::json;
use crate::request::{HttpMethod, Request, RequestParams};
use crate::session::SessionManager;
use crate::traits::ServerPropertiesListener;

const INSTALLATION_RESOURCE: &str = "/installation";
const INSTALLATION_FILE: &str = "installation.json";

/// Synchronization state: what the server knows and what we want it to know.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Snapshot {
    written: Map<String, Value>,
    updated: Map<String, Value>,
    written_date: Option<i64>,
    updated_date: Option<i64>,
    /// Epoch millis of the first write still awaiting a flush. Bounds how
    /// long the debounce window can keep sliding.
    first_delayed_write_timestamp: Option<i64>,
}

#[derive(Default)]
struct TimerState {
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

/// Debounces installation property writes and reconciles them with
/// server-side state.
pub struct PropertySynchronizer {
    session: Arc<SessionManager>,
    state: Mutex<Snapshot>,
    timer: Mutex<TimerState>,
    min_delay: Duration,
    max_delay: Duration,
    path: Option<PathBuf>,
    weak_self: Weak<PropertySynchronizer>,
}

impl PropertySynchronizer {
    pub fn new(config: &ClientConfig, session: Arc<SessionManager>) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            session,
            state: Mutex::new(Snapshot::default()),
            timer: Mutex::new(TimerState::default()),
            min_delay: config.properties_min_delay,
            max_delay: config.properties_max_delay,
            path: config
                .storage_dir
                .as_ref()
                .map(|dir| dir.join(INSTALLATION_FILE)),
            weak_self: weak.clone(),
        })
    }

    /// Replaces in-memory state with whatever the disk holds.
    pub fn load(&self) {
        let Some(path) = &self.path else { return };
        let snapshot = match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!(error = %e, "failed to parse installation state file, starting fresh");
                    Snapshot::default()
                }
            },
            Err(_) => Snapshot::default(),
        };
        *self.state.lock().unwrap() = snapshot;
    }

    /// Merges `properties` into the desired state and schedules a flush.
    ///
    /// A JSON `null` value removes the property. Writes that change nothing
    /// neither reset the debounce window nor touch the flush deadline.
    /// Anything other than a JSON object is ignored.
    pub fn put_properties(&self, properties: &Value) {
        let Some(delta) = properties.as_object() else {
            warn!("ignoring non-object installation properties");
            return;
        };
        let delay;
        {
            let mut state = self.state.lock().unwrap();
            let mut merged = state.updated.clone();
            json::merge_into(&mut merged, delta);
            if merged == state.updated {
                debug!("installation properties unchanged, nothing to do");
                return;
            }
            let now = Utc::now().timestamp_millis();
            let first = *state.first_delayed_write_timestamp.get_or_insert(now);
            state.updated = merged;
            state.updated_date = Some(now);
            self.persist(&state);
            delay = flush_delay(first, now, self.min_delay, self.max_delay);
        }
        self.schedule_flush(delay);
    }

    /// Desired state of the installation's custom properties.
    pub fn properties(&self) -> Value {
        Value::Object(self.state.lock().unwrap().updated.clone())
    }

    /// Delta the next flush would send, deletions included as `null` entries.
    pub fn pending_diff(&self) -> Value {
        let state = self.state.lock().unwrap();
        Value::Object(json::diff(&state.written, &state.updated))
    }

    /// Sends whatever is pending, immediately and regardless of timers.
    ///
    /// The delta is handed to `post_eventually`, which owns delivery from
    /// that point on: the server-known state advances at submission, and a
    /// later resync realigns if delivery ultimately failed. The flush
    /// deadline resets even when there was nothing to send.
    pub fn flush(&self) {
        let request = {
            let mut state = self.state.lock().unwrap();
            let delta = json::diff(&state.written, &state.updated);
            let request = if delta.is_empty() {
                None
            } else {
                let body = serde_json::json!({ "custom": Value::Object(delta) });
                let mut params = RequestParams::new();
                params.add("body", body.to_string());
                params.add("overwrite", "false");
                state.written = state.updated.clone();
                state.written_date = Some(Utc::now().timestamp_millis());
                Some(Request::new(
                    self.session.active_user(),
                    HttpMethod::Post,
                    INSTALLATION_RESOURCE,
                    params,
                ))
            };
            state.first_delayed_write_timestamp = None;
            self.persist(&state);
            request
        };
        // The hand-off runs outside the state lock so an outbox may read the
        // synchronizer from inside `enqueue`.
        if let Some(request) = request {
            debug!("flushing installation property delta");
            self.session.post_eventually(request);
        }
    }

    /// Fetches the installation from the server and realigns local state
    /// against its custom properties.
    pub async fn resync_from_server(&self) -> ApiResult<()> {
        let request = Request::new(
            self.session.active_user(),
            HttpMethod::Get,
            INSTALLATION_RESOURCE,
            RequestParams::new(),
        );
        let body = self.session.request_authenticated(&request).await?;
        let custom = match body.get("custom") {
            Some(Value::Object(custom)) => Value::Object(custom.clone()),
            _ => Value::Object(Map::new()),
        };
        self.adopt_server_state(&custom);
        Ok(())
    }

    /// Reschedules the flush timer for state loaded from disk. A deadline
    /// that already passed while we were not running flushes immediately.
    pub fn restore_pending_flush(&self) {
        let delay;
        {
            let mut state = self.state.lock().unwrap();
            if json::diff(&state.written, &state.updated).is_empty() {
                return;
            }
            let now = Utc::now().timestamp_millis();
            let first = *state.first_delayed_write_timestamp.get_or_insert(now);
            self.persist(&state);
            delay = flush_delay(first, now, self.min_delay, self.max_delay);
        }
        debug!("restoring pending installation property flush");
        self.schedule_flush(delay);
    }

    /// Adopts the server's view as the new baseline, replaying writes that
    /// were still pending locally on top of it.
    fn adopt_server_state(&self, custom: &Value) {
        let server = custom.as_object().cloned().unwrap_or_default();
        let delay;
        {
            let mut state = self.state.lock().unwrap();
            let outstanding = json::diff(&state.written, &state.updated);
            let mut updated = server.clone();
            json::merge_into(&mut updated, &outstanding);
            state.written = server;
            state.updated = updated;
            let now = Utc::now().timestamp_millis();
            state.written_date = Some(now);
            state.updated_date = Some(now);
            let remaining = json::diff(&state.written, &state.updated);
            if remaining.is_empty() {
                state.first_delayed_write_timestamp = None;
                self.persist(&state);
                debug!("server installation state adopted, nothing outstanding");
                return;
            }
            let first = *state.first_delayed_write_timestamp.get_or_insert(now);
            self.persist(&state);
            delay = flush_delay(first, now, self.min_delay, self.max_delay);
        }
        self.schedule_flush(delay);
    }

    /// Arms the debounce timer, replacing any previously armed one.
    fn schedule_flush(&self, delay: Duration) {
        let Some(this) = self.weak_self.upgrade() else { return };
        if tokio::runtime::Handle::try_current().is_err() {
            warn!("no async runtime available, flush will run on the next write");
            return;
        }
        let mut timer = self.timer.lock().unwrap();
        if let Some(handle) = timer.handle.take() {
            handle.abort();
        }
        timer.generation += 1;
        let generation = timer.generation;
        debug!(delay_ms = delay.as_millis() as u64, "scheduled property flush");
        timer.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if !this.is_current_timer(generation) {
                return;
            }
            this.flush();
        }));
    }

    fn is_current_timer(&self, generation: u64) -> bool {
        self.timer.lock().unwrap().generation == generation
    }

    fn persist(&self, snapshot: &Snapshot) -> bool {
        let Some(path) = &self.path else { return true };
        if let Some(parent) = path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                warn!(error = %e, "failed to create installation state directory");
                return false;
            }
        }
        let file = match File::create(path) {
            Ok(file) => file,
            Err(e) => {
                warn!(error = %e, "failed to create installation state file");
                return false;
            }
        };
        let mut writer = BufWriter::new(file);
        if let Err(e) = serde_json::to_writer_pretty(&mut writer, snapshot) {
            warn!(error = %e, "failed to write installation state file");
            return false;
        }
        if let Err(e) = writer.flush() {
            warn!(error = %e, "failed to flush installation state file");
            return false;
        }
        true
    }

    #[cfg(test)]
    fn snapshot(&self) -> Snapshot {
        self.state.lock().unwrap().clone()
    }
}

impl ServerPropertiesListener for PropertySynchronizer {
    fn receive_server_properties(&self, custom: &Value) {
        self.adopt_server_state(custom);
    }
}

/// Delay before the next flush: the quiet period, clamped so the flush never
/// lands later than `first_ms + max_delay`.
fn flush_delay(first_ms: i64, now_ms: i64, min_delay: Duration, max_delay: Duration) -> Duration {
    let deadline = first_ms.saturating_add(max_delay.as_millis() as i64);
    let until_deadline = deadline.saturating_sub(now_ms).max(0) as u64;
    Duration::from_millis((min_delay.as_millis() as u64).min(until_deadline))
}

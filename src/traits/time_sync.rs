//! Server clock observation seam.

use chrono::{DateTime, Utc};

/// Receives server timing information extracted from API responses.
///
/// Whenever a response body carries a `_serverTime` field, the observer is
/// called with the server's clock reading, the server-reported processing
/// duration when present, and the local send and receive instants of the
/// exchange. Implementations typically estimate the local-to-server clock
/// offset from these four values.
pub trait TimeSyncObserver: Send + Sync {
    fn on_server_time(
        &self,
        server_time_ms: i64,
        server_took_ms: Option<i64>,
        sent: DateTime<Utc>,
        received: DateTime<Utc>,
    );
}

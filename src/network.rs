//! Shared network reachability flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cheaply cloneable handle onto the client's reachability estimate.
///
/// The flag starts out `false` and is updated by the request pipeline: any
/// parseable JSON response proves the API is reachable, while transport
/// failures and unparseable bodies count against it.
#[derive(Debug, Clone, Default)]
pub struct NetworkStatus {
    reachable: Arc<AtomicBool>,
}

impl NetworkStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::Relaxed)
    }

    pub(crate) fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::Relaxed);
    }
}

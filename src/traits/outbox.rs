//! Durable request queue seam.

use crate::request::Request;

/// Destination for requests that must eventually reach the server.
///
/// When an outbox is installed, `post_eventually` hands requests to it
/// instead of firing them inline, and the outbox owns persistence, replay
/// and retry from that point on. Lower `priority` values run first; `0` is
/// the default.
pub trait RequestOutbox: Send + Sync {
    fn enqueue(&self, request: Request, priority: i32);
}

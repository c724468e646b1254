//! Server-side installation state delivery seam.

use serde_json::Value;

/// Receives the server's view of the installation's custom properties.
///
/// Called when a token response or an installation fetch reveals what the
/// server currently holds, so local synchronization state can be realigned.
/// `custom` is always a JSON object.
pub trait ServerPropertiesListener: Send + Sync {
    fn receive_server_properties(&self, custom: &Value);
}

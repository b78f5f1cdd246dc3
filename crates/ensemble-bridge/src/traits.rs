//! Bridge trait definitions

use ensemble_core::RoutedMessage;

/// Fire-and-forget sink for routed messages.
///
/// `emit` is synchronous and infallible from the caller's point of view:
/// implementations log and drop anything they cannot deliver. Routing logic
/// never sees an outbound failure.
pub trait Emitter: Send + Sync {
    /// Send one message toward the sink
    fn emit(&self, message: &RoutedMessage);

    /// Whether the emitter still accepts messages
    fn is_open(&self) -> bool;

    /// Stop sending; later emits are dropped
    fn close(&self);
}

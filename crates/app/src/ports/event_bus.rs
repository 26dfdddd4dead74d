//! Event bus port — fan-out of automation activity.

use nodehook_domain::event::Event;

/// Publishes automation events to interested subscribers.
///
/// Publishing is synchronous because it happens on the inline trigger path,
/// which runs inside the store's write and may not await.
pub trait EventPublisher: Send + Sync {
    /// Publish an event to all current subscribers. Never fails; events with
    /// no audience are dropped.
    fn publish(&self, event: Event);
}

impl<T: EventPublisher> EventPublisher for std::sync::Arc<T> {
    fn publish(&self, event: Event) {
        (**self).publish(event);
    }
}

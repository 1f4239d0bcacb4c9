//! User-facing notifications for terminal states.

/// Receives a message for every terminal state an operation produces.
pub trait Notifier: Send + Sync {
    /// Called with the envelope message when an operation succeeds.
    fn on_default(&self, message: &str);

    /// Called with the failure detail when an operation fails.
    fn on_error(&self, detail: &str);
}

/// Notifier that writes to the tracing log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn on_default(&self, message: &str) {
        tracing::info!("{}", message);
    }

    fn on_error(&self, detail: &str) {
        tracing::error!("{}", detail);
    }
}

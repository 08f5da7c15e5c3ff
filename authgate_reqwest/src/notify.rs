/// Display options for a notification
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NotifyOptions {
    /// Keep the notification visible while the pointer rests on it
    pub keep_alive_on_hover: bool,
}

impl NotifyOptions {
    /// Options for notifications that stay visible while hovered
    pub const fn keep_alive_on_hover() -> Self {
        Self {
            keep_alive_on_hover: true,
        }
    }
}

/// A sink for user-facing error notifications
///
/// Notifications are fire-and-forget. Closures taking the message and
/// options can be used directly.
pub trait Notifier: Send + Sync {
    /// Reports an error message to the user
    fn error(&self, message: &str, options: NotifyOptions);
}

impl<F> Notifier for F
where
    F: Fn(&str, NotifyOptions) + Send + Sync,
{
    #[inline]
    fn error(&self, message: &str, options: NotifyOptions) {
        self(message, options)
    }
}

/// A notifier that emits notifications as `tracing` events
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn error(&self, message: &str, options: NotifyOptions) {
        tracing::warn!(
            keep_alive_on_hover = options.keep_alive_on_hover,
            "{message}"
        );
    }
}

//! Alert dispatch.
//!
//! One attempt per cycle, bounded by a timeout, with the outcome reported
//! exactly once. Failures are not retried: a failed alert ends the cycle in
//! `Failed` and the user can trigger again.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;

use crate::channel::AlertChannel;
use crate::error::ChannelError;
use crate::types::{AlertMessage, DispatchResult};

/// Sends composed alerts through a channel.
#[derive(Clone)]
pub struct AlertDispatcher {
    channel: Arc<dyn AlertChannel>,
    timeout: Duration,
}

impl AlertDispatcher {
    pub fn new(channel: Arc<dyn AlertChannel>, timeout: Duration) -> Self {
        Self { channel, timeout }
    }

    /// Perform a single send and fold the outcome into a [`DispatchResult`].
    pub async fn dispatch(&self, recipient: &str, message: &AlertMessage) -> DispatchResult {
        let kind = self.channel.kind();
        tracing::info!(channel = %kind, recipient, format = ?message.format, "dispatching alert");

        let send = self
            .channel
            .send(recipient, &message.subject, &message.body);
        let outcome = match tokio::time::timeout(self.timeout, send).await {
            Ok(result) => result,
            Err(_) => Err(ChannelError::TimedOut {
                after_ms: self.timeout.as_millis() as u64,
            }),
        };

        match outcome {
            Ok(()) => {
                tracing::info!(channel = %kind, "alert delivered");
                DispatchResult::Success
            }
            Err(err) => {
                tracing::warn!(channel = %kind, error = %err, "alert dispatch failed");
                DispatchResult::Failure {
                    error_detail: err.to_string(),
                }
            }
        }
    }

    /// Run [`dispatch`](Self::dispatch) as its own task.
    ///
    /// The receiver yields the result once. If the task is aborted the
    /// receiver reports a closed channel, which the caller treats as a
    /// failure.
    pub fn spawn(&self, recipient: String, message: AlertMessage) -> oneshot::Receiver<DispatchResult> {
        let (tx, rx) = oneshot::channel();
        let dispatcher = self.clone();
        tokio::spawn(async move {
            let result = dispatcher.dispatch(&recipient, &message).await;
            // Receiver gone means the orchestrator shut down mid-send.
            let _ = tx.send(result);
        });
        rx
    }
}

impl std::fmt::Debug for AlertDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertDispatcher")
            .field("channel", &self.channel.kind())
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{ChannelKind, LoggingChannel};
    use crate::types::MessageFormat;

    fn message() -> AlertMessage {
        AlertMessage {
            subject: "SOS ALERT from Asha".into(),
            body: "SOS ALERT! I'm Asha, I need HELP! Location unavailable (14:05 UTC)".into(),
            format: MessageFormat::Terse,
        }
    }

    #[tokio::test]
    async fn test_dispatch_success() {
        let channel = Arc::new(LoggingChannel::new(ChannelKind::Sms));
        let dispatcher = AlertDispatcher::new(channel.clone(), Duration::from_secs(30));
        let result = dispatcher.dispatch("+919876543210", &message()).await;
        assert_eq!(result, DispatchResult::Success);
        assert_eq!(channel.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_failure_is_not_retried() {
        let channel = Arc::new(
            LoggingChannel::new(ChannelKind::Sms)
                .failing_with(ChannelError::Transport("network unreachable".into())),
        );
        let dispatcher = AlertDispatcher::new(channel.clone(), Duration::from_secs(30));
        let result = dispatcher.dispatch("+919876543210", &message()).await;
        assert_eq!(
            result,
            DispatchResult::Failure {
                error_detail: "network unreachable".into()
            }
        );
        assert_eq!(channel.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatch_times_out() {
        let channel = Arc::new(
            LoggingChannel::new(ChannelKind::Sms).with_latency(Duration::from_secs(60)),
        );
        let dispatcher = AlertDispatcher::new(channel, Duration::from_secs(30));
        let result = dispatcher.dispatch("+919876543210", &message()).await;
        assert_eq!(
            result,
            DispatchResult::Failure {
                error_detail: "send timed out after 30000 ms".into()
            }
        );
    }

    #[tokio::test]
    async fn test_spawn_delivers_result_once() {
        let channel = Arc::new(LoggingChannel::new(ChannelKind::Email));
        let dispatcher = AlertDispatcher::new(channel, Duration::from_secs(30));
        let rx = dispatcher.spawn("help@example.com".into(), message());
        assert_eq!(rx.await, Ok(DispatchResult::Success));
    }
}

//! Alert sink that writes alerts to the log.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::domain::foundation::DomainError;
use crate::ports::{Alert, AlertSink};

/// Emits each alert as an `error` event under the `alert` target.
#[derive(Default)]
pub struct TracingAlertSink {
    raised: AtomicUsize,
}

impl TracingAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raised_count(&self) -> usize {
        self.raised.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl AlertSink for TracingAlertSink {
    async fn raise(&self, alert: Alert) -> Result<(), DomainError> {
        self.raised.fetch_add(1, Ordering::Relaxed);
        match alert {
            Alert::CapacityExhausted {
                since,
                raised_at,
                profiles,
            } => {
                let exhausted_secs = raised_at.duration_since(&since).num_seconds();
                tracing::error!(
                    target: "alert",
                    since = %since.as_datetime(),
                    exhausted_secs,
                    profiles,
                    "automation profile capacity exhausted"
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::Timestamp;

    #[tokio::test]
    async fn counts_raised_alerts() {
        let sink = TracingAlertSink::new();
        let now = Timestamp::now();
        sink.raise(Alert::CapacityExhausted {
            since: now,
            raised_at: now.plus_secs(900),
            profiles: 2,
        })
        .await
        .unwrap();
        assert_eq!(sink.raised_count(), 1);
    }
}

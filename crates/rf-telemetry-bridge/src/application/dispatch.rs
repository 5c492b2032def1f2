//! Command dispatch: writes a client's command batch to the serial device.
//!
//! The use case depends only on the [`CommandSink`] trait.  The infrastructure
//! implementation hands each command to the serial owner thread and waits for
//! its reply; tests use a recording sink.

use async_trait::async_trait;
use rf_telemetry_core::CommandBatch;
use tracing::{debug, warn};

use crate::domain::BridgeNotice;

/// Anything that can write one command line to the serial device.
#[async_trait]
pub trait CommandSink: Send + Sync {
    /// Writes `command` as a single line and resolves once the write has
    /// completed or failed.
    async fn write_command(&self, command: &str) -> Result<(), String>;
}

/// Result of dispatching one batch.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Commands written successfully.
    pub written: usize,
    /// Commands never attempted because an earlier one failed.
    pub skipped: usize,
    /// Notice for the client when a write failed.
    pub failure: Option<BridgeNotice>,
}

impl DispatchOutcome {
    /// `true` when every command in the batch was written.
    pub fn is_complete(&self) -> bool {
        self.failure.is_none()
    }
}

/// Writes every command in `batch` through `sink`, in order.
///
/// Each write is awaited before the next starts.  The first failure stops the
/// batch: the rest are counted as skipped and the returned outcome carries a
/// [`BridgeNotice`] for the client.
pub async fn dispatch_batch(batch: &CommandBatch, sink: &dyn CommandSink) -> DispatchOutcome {
    let mut outcome = DispatchOutcome::default();

    for (index, command) in batch.iter().enumerate() {
        match sink.write_command(command).await {
            Ok(()) => {
                outcome.written += 1;
                debug!(command = %command, "command written to serial");
            }
            Err(reason) => {
                outcome.skipped = batch.len() - index - 1;
                warn!(
                    command = %command,
                    reason = %reason,
                    skipped = outcome.skipped,
                    "serial write failed"
                );
                outcome.failure = Some(BridgeNotice::SerialWriteFailed {
                    command: command.to_string(),
                    reason,
                });
                break;
            }
        }
    }

    outcome
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        written: Mutex<Vec<String>>,
        /// Fail on the write with this index (0-based), if set.
        fail_at: Option<usize>,
    }

    #[async_trait]
    impl CommandSink for RecordingSink {
        async fn write_command(&self, command: &str) -> Result<(), String> {
            let mut written = self.written.lock().unwrap();
            if self.fail_at == Some(written.len()) {
                return Err("injected failure".to_string());
            }
            written.push(command.to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_commands_are_written_in_order() {
        // Arrange
        let sink = RecordingSink::default();
        let batch = CommandBatch::parse(r#"{"cmds":["AT+ID?","AT+FREQ=915000000"]}"#).unwrap();

        // Act
        let outcome = dispatch_batch(&batch, &sink).await;

        // Assert
        assert_eq!(outcome.written, 2);
        assert!(outcome.is_complete());
        assert_eq!(
            *sink.written.lock().unwrap(),
            vec!["AT+ID?".to_string(), "AT+FREQ=915000000".to_string()]
        );
    }

    #[tokio::test]
    async fn test_malformed_entries_never_reach_the_sink() {
        let sink = RecordingSink::default();
        let batch = CommandBatch::parse(r#"{"cmds":["AT+OK",42,""]}"#).unwrap();

        let outcome = dispatch_batch(&batch, &sink).await;

        assert_eq!(outcome.written, 1);
        assert_eq!(*sink.written.lock().unwrap(), vec!["AT+OK".to_string()]);
    }

    #[tokio::test]
    async fn test_failure_stops_batch_and_yields_notice() {
        // Arrange: second write fails
        let sink = RecordingSink {
            fail_at: Some(1),
            ..Default::default()
        };
        let batch = CommandBatch::parse(r#"{"cmds":["A","B","C","D"]}"#).unwrap();

        // Act
        let outcome = dispatch_batch(&batch, &sink).await;

        // Assert
        assert_eq!(outcome.written, 1);
        assert_eq!(outcome.skipped, 2);
        assert_eq!(
            outcome.failure,
            Some(BridgeNotice::SerialWriteFailed {
                command: "B".to_string(),
                reason: "injected failure".to_string(),
            })
        );
        assert_eq!(*sink.written.lock().unwrap(), vec!["A".to_string()]);
    }

    #[tokio::test]
    async fn test_empty_batch_writes_nothing() {
        let sink = RecordingSink::default();
        let batch = CommandBatch::parse(r#"{"cmds":[]}"#).unwrap();

        let outcome = dispatch_batch(&batch, &sink).await;

        assert_eq!(outcome, DispatchOutcome::default());
        assert!(sink.written.lock().unwrap().is_empty());
    }
}

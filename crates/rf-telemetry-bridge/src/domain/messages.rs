//! Messages the bridge itself sends to clients.
//!
//! Almost every server → client frame is a telemetry line, forwarded verbatim
//! from the device and never wrapped.  The one exception is a
//! [`BridgeNotice`], which tells the client that one of *its* commands could
//! not be written.  Notices are tagged with an `"event"` field so clients can
//! tell them apart from device records:
//!
//! ```json
//! {"event":"serial_write_failed","command":"AT+FREQ=915000000","reason":"serial I/O error: broken pipe"}
//! ```

use serde::{Deserialize, Serialize};

/// A bridge-generated notice addressed to a single client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BridgeNotice {
    /// A command from this client could not be written to the serial device.
    SerialWriteFailed {
        /// The command as the client sent it.
        command: String,
        /// Human-readable cause.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_failed_notice_serializes_with_event_tag() {
        // Arrange
        let notice = BridgeNotice::SerialWriteFailed {
            command: "AT+ID?".to_string(),
            reason: "device detached".to_string(),
        };

        // Act
        let json = serde_json::to_string(&notice).unwrap();

        // Assert
        assert!(json.contains(r#""event":"serial_write_failed""#));
        assert!(json.contains(r#""command":"AT+ID?""#));
        assert!(json.contains("device detached"));
    }

    #[test]
    fn test_notice_is_parseable_by_clients() {
        let json = r#"{"event":"serial_write_failed","command":"AT","reason":"x"}"#;
        let notice: BridgeNotice = serde_json::from_str(json).unwrap();
        assert_eq!(
            notice,
            BridgeNotice::SerialWriteFailed {
                command: "AT".to_string(),
                reason: "x".to_string()
            }
        );
    }
}

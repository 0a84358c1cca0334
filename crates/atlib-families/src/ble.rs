//! BLE modules with single-CR framing and `%`-delimited status messages.
//!
//! Every reply and status line ends in a lone CR. Commands are confirmed
//! with `AOK` or `Err`. Connection state arrives as `%` lines
//! (`%CONNECT,0,001122334455`, `%DISCONNECT`); GATT traffic and RSSI
//! reports use `+`.

use atlib_core::config::{EngineConfig, FramingConfig, Vocabulary};
use atlib_core::error::Result;
use atlib_core::types::Terminators;
use atlib_session::matcher::EventTable;

use crate::{Family, FamilyInfo};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BleEvent {
    /// Module rebooted and is accepting commands.
    Reboot,
    /// Command mode entered.
    CommandMode,
    Connected,
    Disconnected,
    /// Peer enabled a transparent-UART stream.
    StreamOpen,
    /// Advertisement seen while scanning.
    Advertisement,
    /// Peer wrote a characteristic.
    Write,
    /// Notification or indication from a peer.
    Notify,
    /// RSSI report of the active link.
    Rssi,
    /// Any other `%` status line.
    Status,
}

/// Family marker for single-CR BLE modules.
#[derive(Debug, Clone, Copy, Default)]
pub struct BleModule;

impl Family for BleModule {
    type Event = BleEvent;

    fn info() -> FamilyInfo {
        FamilyInfo {
            id: "ble",
            name: "BLE module (single-CR framing)",
            default_baud_rate: 115_200,
            terminators: Terminators::CR,
        }
    }

    fn engine_config() -> EngineConfig {
        EngineConfig {
            framing: FramingConfig {
                terminators: Terminators::CR,
                ..FramingConfig::default()
            },
            vocabulary: Vocabulary {
                success: "AOK".into(),
                // `ERR` also covers firmware that spells it out.
                failures: vec!["ERR".into()],
                sentinels: vec!['%', '+'],
                command_separators: vec!['+', '%'],
                ..Vocabulary::default()
            },
            ..EngineConfig::default()
        }
    }

    fn event_table() -> Result<EventTable<BleEvent>> {
        EventTable::builder()
            .event("CONNECT", BleEvent::Connected)
            .event("DISCONNECT", BleEvent::Disconnected)
            .event("STREAM_OPEN", BleEvent::StreamOpen)
            .event("ADV", BleEvent::Advertisement)
            .event("WV", BleEvent::Write)
            .event("NOTI", BleEvent::Notify)
            .event("RSSI", BleEvent::Rssi)
            .otherwise(BleEvent::Status)
            .bare("REBOOT", BleEvent::Reboot)
            .bare("CMD>", BleEvent::CommandMode)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atlib_core::types::ConfirmationStatus;
    use atlib_test_harness::MockTransport;
    use std::time::Duration;

    #[test]
    fn config_is_valid() {
        BleModule::engine_config().validate().unwrap();
    }

    #[test]
    fn connect_carries_handle_and_address() {
        let table = BleModule::event_table().unwrap();
        let m = table.resolve("CONNECT,0,001122334455").unwrap();
        assert_eq!(m.event, BleEvent::Connected);
        assert_eq!(m.args, "0,001122334455");
    }

    #[test]
    fn unknown_status_falls_to_otherwise() {
        let table = BleModule::event_table().unwrap();
        let m = table.resolve("SECURED").unwrap();
        assert_eq!(m.event, BleEvent::Status);
        assert_eq!(m.args, "SECURED");
    }

    #[test]
    fn disconnect_is_not_taken_for_connect() {
        let table = BleModule::event_table().unwrap();
        assert_eq!(
            table.resolve("DISCONNECT").unwrap().event,
            BleEvent::Disconnected
        );
    }

    #[tokio::test]
    async fn single_cr_session() {
        let mut mock = MockTransport::new();
        mock.expect(b"AT+NAME=tag\r", b"%CONNECT,0,001122334455\rAOK\r");
        mock.expect(b"AT+BOND=9\r", b"Err\r");
        let mut session = BleModule::session_builder()
            .unwrap()
            .build_with_transport(Box::new(mock))
            .await
            .unwrap();

        session
            .request("AT+NAME=tag\r", ConfirmationStatus::Success)
            .await
            .unwrap();
        let n = session.next_event().await.unwrap();
        assert_eq!(n.event, BleEvent::Connected);

        session.send("AT+BOND=9\r").await.unwrap();
        session
            .wait(Duration::from_secs(1), ConfirmationStatus::Failure)
            .await
            .unwrap();
    }
}

//! LoRaWAN modems with an `+EVT:` event channel.
//!
//! Commands are confirmed with `OK` or one of a family of `AT_*` error
//! tokens (`AT_PARAM_ERROR`, `AT_BUSY_ERROR`, ...). Network activity is
//! reported asynchronously under a single `EVT` category, with fields
//! separated by colons:
//!
//! ```text
//! +EVT:JOINED
//! +EVT:JOIN_FAILED_RX_TIMEOUT
//! +EVT:TX_DONE
//! +EVT:RX_1:-70:8:UNICAST:1:4865
//! +EVT:RXP2P:-40:10:48656C6C6F
//! ```
//!
//! A join (`AT+JOIN`) answers `OK` at once; the outcome arrives later as
//! `+EVT:JOINED` or `+EVT:JOIN_FAILED_*`.

use std::time::Duration;

use atlib_core::config::{EngineConfig, Timeouts, Timing, Vocabulary};
use atlib_core::error::Result;
use atlib_core::types::Terminators;
use atlib_session::matcher::EventTable;

use crate::{Family, FamilyInfo};

/// Failure tokens reported by the modem.
pub const FAILURE_TOKENS: &[&str] = &[
    "AT_ERROR",
    "AT_PARAM_ERROR",
    "AT_BUSY_ERROR",
    "AT_TEST_PARAM_OVERFLOW",
    "AT_NO_CLASSB_ENABLE",
    "AT_NO_NETWORK_JOINED",
    "AT_RX_ERROR",
    "AT_MODE_NO_SUPPORT",
    "AT_COMMAND_NOT_FOUND",
];

/// Reasons appended to `JOIN_FAILED_`.
const JOIN_FAILURE_REASONS: &[&str] = &["RX_TIMEOUT", "TX_TIMEOUT", "MIC", "DUTY_CYCLE"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoraEvent {
    Joined,
    JoinFailed,
    TxDone,
    SendConfirmedOk,
    SendConfirmedFailed,
    /// Downlink in the first receive window.
    Rx1,
    /// Downlink in the second receive window.
    Rx2,
    /// Class C downlink.
    RxC,
    /// Class B ping-slot downlink.
    RxB,
    /// Point-to-point receive.
    RxP2p,
    /// Point-to-point transmission complete.
    TxP2pDone,
    LinkCheck,
    /// Any `+EVT:` line not listed above.
    Other,
}

/// Family marker for LoRaWAN modems.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoraModule;

impl Family for LoraModule {
    type Event = LoraEvent;

    fn info() -> FamilyInfo {
        FamilyInfo {
            id: "lora",
            name: "LoRaWAN modem",
            default_baud_rate: 115_200,
            terminators: Terminators::CRLF,
        }
    }

    fn engine_config() -> EngineConfig {
        EngineConfig {
            vocabulary: Vocabulary {
                failures: FAILURE_TOKENS.iter().map(|t| t.to_string()).collect(),
                ..Vocabulary::default()
            },
            timing: Timing {
                // The modem loses characters sent right after a reply.
                min_command_interval: Duration::from_millis(50),
                ..Timing::default()
            },
            timeouts: Timeouts {
                short: Duration::from_millis(300),
                standard: Duration::from_secs(1),
                long: Duration::from_secs(10),
            },
            ..EngineConfig::default()
        }
    }

    fn event_table() -> Result<EventTable<LoraEvent>> {
        EventTable::builder()
            .category("EVT", |evt| {
                let evt = JOIN_FAILURE_REASONS
                    .iter()
                    .fold(evt.delimiters(&[':']), |evt, reason| {
                        evt.event(&format!("JOIN_FAILED_{reason}"), LoraEvent::JoinFailed)
                    });
                evt.event("JOINED", LoraEvent::Joined)
                    .event("TX_DONE", LoraEvent::TxDone)
                    .event("SEND_CONFIRMED_OK", LoraEvent::SendConfirmedOk)
                    .event("SEND_CONFIRMED_FAILED", LoraEvent::SendConfirmedFailed)
                    .event("RX_1", LoraEvent::Rx1)
                    .event("RX_2", LoraEvent::Rx2)
                    .event("RX_C", LoraEvent::RxC)
                    .event("RX_B", LoraEvent::RxB)
                    .event("RXP2P", LoraEvent::RxP2p)
                    .event("TXP2P DONE", LoraEvent::TxP2pDone)
                    .event("LINKCHECK", LoraEvent::LinkCheck)
                    .otherwise(LoraEvent::Other)
            })
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atlib_core::error::Error;
    use atlib_core::types::{ConfirmationStatus, FailureInfo};
    use atlib_test_harness::MockTransport;

    #[test]
    fn config_is_valid() {
        LoraModule::engine_config().validate().unwrap();
    }

    #[test]
    fn downlink_fields_follow_subtype() {
        let table = LoraModule::event_table().unwrap();
        let m = table.resolve("EVT:RX_1:-70:8:UNICAST:1:4865").unwrap();
        assert_eq!(m.event, LoraEvent::Rx1);
        assert_eq!(m.args, "-70:8:UNICAST:1:4865");
    }

    #[test]
    fn join_failure_reasons_share_event() {
        let table = LoraModule::event_table().unwrap();
        for line in ["EVT:JOIN_FAILED_RX_TIMEOUT", "EVT:JOIN_FAILED_MIC"] {
            assert_eq!(table.resolve(line).unwrap().event, LoraEvent::JoinFailed);
        }
    }

    #[test]
    fn unlisted_subtype_is_other() {
        let table = LoraModule::event_table().unwrap();
        let m = table.resolve("EVT:BEACON_LOST").unwrap();
        assert_eq!(m.event, LoraEvent::Other);
        assert_eq!(m.args, "BEACON_LOST");
    }

    #[test]
    fn comma_is_not_a_delimiter_inside_evt() {
        let table = LoraModule::event_table().unwrap();
        assert_eq!(table.resolve("EVT:TX_DONE,1").unwrap().event, LoraEvent::Other);
    }

    #[test]
    fn non_evt_line_is_unknown() {
        let table = LoraModule::event_table().unwrap();
        assert!(matches!(table.resolve("DEVEUI:1"), Err(Error::UnknownEvent(_))));
    }

    #[tokio::test]
    async fn join_then_event() {
        let mut mock = MockTransport::new();
        mock.expect(b"AT+JOIN=1:0:10:8\r\n", b"OK\r\n+EVT:JOINED\r\n");
        let mut session = LoraModule::session_builder()
            .unwrap()
            .build_with_transport(Box::new(mock))
            .await
            .unwrap();

        session
            .request("AT+JOIN=1:0:10:8\r\n", ConfirmationStatus::Success)
            .await
            .unwrap();
        assert_eq!(session.next_event().await.unwrap().event, LoraEvent::Joined);
    }

    #[tokio::test]
    async fn specific_error_token_is_reported() {
        let mut mock = MockTransport::new();
        mock.expect(b"AT+SEND=2:1234\r\n", b"AT_NO_NETWORK_JOINED\r\n");
        let mut session = LoraModule::session_builder()
            .unwrap()
            .build_with_transport(Box::new(mock))
            .await
            .unwrap();

        let err = session
            .request("AT+SEND=2:1234\r\n", ConfirmationStatus::Success)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Mismatch {
                actual: ConfirmationStatus::Failure,
                failure: Some(FailureInfo { .. }),
                ..
            }
        ));
    }
}

//! Cellular modems speaking 3GPP TS 27.007 / 27.005 AT commands.
//!
//! Besides `OK` and `ERROR`, commands fail with extended result codes:
//! `+CME ERROR: <n>` for equipment errors and `+CMS ERROR: <n>` for SMS
//! errors. Sending an SMS in text mode is a two-step exchange: `AT+CMGS`
//! is answered by a `> ` prompt with no `OK`, the message text follows,
//! terminated by Ctrl-Z.
//!
//! Unsolicited result codes of note:
//! - `+CMT: <oa>,,<scts>` is followed by one line holding the message text,
//!   which must not be classified;
//! - `RING` and `NO CARRIER` carry no sentinel.

use std::time::Duration;

use atlib_core::config::{EngineConfig, FramingConfig, Timeouts, Vocabulary};
use atlib_core::error::Result;
use atlib_core::types::{ConfirmationStatus, Terminators};
use atlib_session::matcher::EventTable;

use crate::{Family, FamilyInfo};

/// Ctrl-Z, ends an SMS body.
pub const CTRL_Z: u8 = 0x1A;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellularEvent {
    /// Modem ready after power-up (`RDY`).
    Ready,
    /// Circuit-switched network registration (`+CREG`).
    Registration,
    /// GPRS registration (`+CGREG`).
    GprsRegistration,
    /// EPS registration (`+CEREG`).
    EpsRegistration,
    /// SMS delivered directly; args hold the header, a newline, and the text.
    SmsReceived,
    /// SMS stored; args hold the storage and index.
    SmsStored,
    Ring,
    /// Calling line identification.
    CallerId,
    CallEnded,
    /// SIM state (`+CPIN: READY`, `+CPIN: NOT INSERTED`).
    SimStatus,
    /// Phone functionality level after startup.
    Functionality,
    /// Network time zone report.
    TimeZone,
}

/// Family marker for 3GPP cellular modems.
#[derive(Debug, Clone, Copy, Default)]
pub struct CellularModem;

impl Family for CellularModem {
    type Event = CellularEvent;

    fn info() -> FamilyInfo {
        FamilyInfo {
            id: "cellular",
            name: "Cellular modem (3GPP 27.007)",
            default_baud_rate: 115_200,
            terminators: Terminators::CRLF,
        }
    }

    fn engine_config() -> EngineConfig {
        EngineConfig {
            framing: FramingConfig {
                prompt_byte: Some(b'>'),
                ..FramingConfig::default()
            },
            vocabulary: Vocabulary {
                failures: vec!["ERROR".into(), "+CME ERROR".into(), "+CMS ERROR".into()],
                extra_confirmations: vec![(">".into(), ConfirmationStatus::ReadyForData)],
                continuation_delimiter: '\n',
                ..Vocabulary::default()
            },
            timeouts: Timeouts {
                short: Duration::from_millis(500),
                standard: Duration::from_secs(5),
                // Network operations (COPS, CGATT, CMGS) may take minutes.
                long: Duration::from_secs(180),
            },
            ..EngineConfig::default()
        }
    }

    fn event_table() -> Result<EventTable<CellularEvent>> {
        EventTable::builder()
            .event("CREG", CellularEvent::Registration)
            .event("CGREG", CellularEvent::GprsRegistration)
            .event("CEREG", CellularEvent::EpsRegistration)
            .event_with_lines("CMT", CellularEvent::SmsReceived, 1)
            .event("CMTI", CellularEvent::SmsStored)
            .event("CLIP", CellularEvent::CallerId)
            .event("CPIN", CellularEvent::SimStatus)
            .event("CFUN", CellularEvent::Functionality)
            .event("CTZV", CellularEvent::TimeZone)
            .bare("RDY", CellularEvent::Ready)
            .bare("RING", CellularEvent::Ring)
            .bare("NO CARRIER", CellularEvent::CallEnded)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atlib_core::error::Error;
    use atlib_core::types::FailureInfo;
    use atlib_test_harness::MockTransport;

    #[test]
    fn config_is_valid() {
        CellularModem::engine_config().validate().unwrap();
    }

    #[test]
    fn cmt_and_cmti_are_distinct() {
        let table = CellularModem::event_table().unwrap();
        let cmt = table.resolve("CMT: \"+15551234\",,\"24/05/01,10:00:00+00\"").unwrap();
        assert_eq!(cmt.event, CellularEvent::SmsReceived);
        assert_eq!(cmt.trailing_lines, 1);
        let cmti = table.resolve("CMTI: \"SM\",3").unwrap();
        assert_eq!(cmti.event, CellularEvent::SmsStored);
        assert_eq!(cmti.args, "\"SM\",3");
    }

    #[tokio::test]
    async fn cme_error_carries_code() {
        let mut mock = MockTransport::new();
        mock.expect(b"AT+CPIN?\r\n", b"\r\n+CME ERROR: 10\r\n");
        let mut session = CellularModem::session_builder()
            .unwrap()
            .build_with_transport(Box::new(mock))
            .await
            .unwrap();

        let err = session
            .request("AT+CPIN?\r\n", ConfirmationStatus::Success)
            .await
            .unwrap_err();
        match err {
            Error::Mismatch { failure, .. } => assert_eq!(
                failure,
                Some(FailureInfo {
                    label: String::new(),
                    code: 10
                })
            ),
            other => panic!("expected Mismatch, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn registration_query_body() {
        let mut mock = MockTransport::new();
        mock.expect(b"AT+CREG?\r\n", b"\r\n+CREG: 0,1\r\n\r\nOK\r\n");
        let mut session = CellularModem::session_builder()
            .unwrap()
            .build_with_transport(Box::new(mock))
            .await
            .unwrap();

        let body = session
            .request("AT+CREG?\r\n", ConfirmationStatus::Success)
            .await
            .unwrap();
        assert_eq!(body, "0,1");
    }

    #[tokio::test]
    async fn sms_send_prompt_then_ok() {
        let mut mock = MockTransport::new();
        mock.expect(b"AT+CMGS=\"+15551234\"\r", b"\r\n> ");
        let mut text = b"hello".to_vec();
        text.push(CTRL_Z);
        mock.expect(&text, b"\r\n+CMGS: 42\r\n\r\nOK\r\n");
        let mut session = CellularModem::session_builder()
            .unwrap()
            .build_with_transport(Box::new(mock))
            .await
            .unwrap();

        session
            .request("AT+CMGS=\"+15551234\"\r", ConfirmationStatus::ReadyForData)
            .await
            .unwrap();

        // The message text is not an AT command, so the reply body cannot
        // be attributed to it.
        let payload = format!("hello{}", CTRL_Z as char);
        let body = session
            .request(&payload, ConfirmationStatus::Success)
            .await
            .unwrap();
        assert_eq!(body, "");
    }

    #[tokio::test]
    async fn incoming_sms_text_is_captured() {
        let mock = MockTransport::new();
        let handle = mock.handle();
        let mut session = CellularModem::session_builder()
            .unwrap()
            .build_with_transport(Box::new(mock))
            .await
            .unwrap();

        handle.inject(b"\r\n+CMT: \"+15551234\",,\"24/05/01,10:00:00+00\"\r\nOK see you at 5\r\nRING\r\n");
        let sms = session.next_event().await.unwrap();
        assert_eq!(sms.event, CellularEvent::SmsReceived);
        assert_eq!(
            sms.args,
            "\"+15551234\",,\"24/05/01,10:00:00+00\"\nOK see you at 5"
        );
        assert_eq!(session.next_event().await.unwrap().event, CellularEvent::Ring);
        assert_eq!(session.stats().await.unwrap().stray_confirmations, 0);
    }
}

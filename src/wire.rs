use serde::{Deserialize, Serialize};

/// Width of the fixed event tag the push feed prefixes to every reading
/// line (a `data:`-style server-push marker, not part of the JSON).
pub(crate) const EVENT_TAG_WIDTH: usize = 5;

/// Error reported in-band on the input stream, as a raw JSON line instead
/// of an HTTP status.
#[derive(Deserialize, Debug)]
pub struct ErrorEnvelope {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub error: String,
    pub message: String,
}

/// One reading event from the input feed. Everything except
/// `payload.percent` is parsed for shape only and then ignored.
#[derive(Deserialize, Debug)]
pub struct InputEvent {
    #[serde(rename = "type")]
    pub kind: Option<String>,

    // unix millis
    pub timestamp: Option<i64>,

    pub from: Option<EventSource>,
    pub payload: EventPayload,
}

#[derive(Deserialize, Debug)]
pub struct EventPayload {
    // 0-100
    pub percent: u8,
    pub absolute: Option<i64>,
}

/// Who emitted the event: account, device and relay server identifiers.
#[derive(Deserialize, Debug)]
pub struct EventSource {
    pub user: Option<UserRef>,
    pub device: Option<DeviceRef>,
    pub server: Option<ServerRef>,
}

#[derive(Deserialize, Debug)]
pub struct UserRef {
    pub id: Option<i64>,
}

#[derive(Deserialize, Debug)]
pub struct DeviceRef {
    pub id: Option<String>,
    pub mac: Option<String>,
    pub firmware_version: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct ServerRef {
    pub id: Option<String>,
}

/// One entry from the account-wide `GET /devices` listing.
#[derive(Deserialize, Debug)]
pub struct DeviceStatusEntry {
    pub id: String,
    pub label: Option<String>,
    pub user_id: Option<i64>,
    #[serde(default)]
    pub is_connected: bool,
}

/// Body for `POST /devices/{id}/output`. The service holds the output at
/// `percent` for `duration_ms` (-1: until the next write).
#[derive(Serialize, Debug)]
pub(crate) struct OutputCommand {
    pub percent: u8,
    pub duration_ms: i64,
}

pub(crate) enum StreamLine {
    Error(ErrorEnvelope),
    Reading(InputEvent),
    Unparseable,
}

/// Classify one non-empty line from the input feed. Error envelopes arrive
/// unframed; reading events carry the fixed-width event tag. Both schemas
/// are attempted so minor framing drift doesn't misclassify a line.
pub(crate) fn classify_line(line: &str) -> StreamLine {
    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(line) {
        return StreamLine::Error(envelope);
    }
    let framed = line.get(EVENT_TAG_WIDTH..).unwrap_or("");
    match serde_json::from_str::<InputEvent>(framed) {
        Ok(event) => StreamLine::Reading(event),
        Err(_) => StreamLine::Unparseable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_error_envelope() {
        let line = r#"{"statusCode":404,"error":"Not Found","message":"no input stream"}"#;
        match classify_line(line) {
            StreamLine::Error(envelope) => {
                assert_eq!(envelope.status_code, 404);
                assert_eq!(envelope.error, "Not Found");
            }
            _ => panic!("expected an error envelope"),
        }
    }

    #[test]
    fn classifies_framed_reading() {
        let line = r#"data:{"type":"input","payload":{"percent":42,"absolute":120}}"#;
        match classify_line(line) {
            StreamLine::Reading(event) => {
                assert_eq!(event.payload.percent, 42);
                assert_eq!(event.payload.absolute, Some(120));
            }
            _ => panic!("expected a reading"),
        }
    }

    #[test]
    fn reading_with_full_envelope() {
        let line = concat!(
            "data:",
            r#"{"type":"input","timestamp":1424029481169,"#,
            r#""from":{"user":{"id":175},"device":{"id":"00e04c036f15","mac":"00e04c036f15"},"server":{"id":"srv-1"}},"#,
            r#""payload":{"percent":71,"absolute":921}}"#,
        );
        match classify_line(line) {
            StreamLine::Reading(event) => {
                assert_eq!(event.payload.percent, 71);
                assert_eq!(event.timestamp, Some(1424029481169));
                let from = event.from.expect("from");
                assert_eq!(from.user.expect("user").id, Some(175));
            }
            _ => panic!("expected a reading"),
        }
    }

    #[test]
    fn malformed_error_envelope_is_unparseable() {
        // looks like an error line, but truncated
        assert!(matches!(
            classify_line(r#"{"statusCode":404,"error""#),
            StreamLine::Unparseable
        ));
    }

    #[test]
    fn short_line_is_unparseable() {
        assert!(matches!(classify_line("xx"), StreamLine::Unparseable));
        assert!(matches!(classify_line("data:"), StreamLine::Unparseable));
    }

    #[test]
    fn garbage_after_tag_is_unparseable() {
        assert!(matches!(
            classify_line("data:not-json-at-all"),
            StreamLine::Unparseable
        ));
    }

    #[test]
    fn listing_defaults_missing_connected_flag() {
        let entry: DeviceStatusEntry = serde_json::from_str(r#"{"id":"abc"}"#).unwrap();
        assert!(!entry.is_connected);
    }
}

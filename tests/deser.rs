use cloudbit::{DeviceStatusEntry, ErrorEnvelope, InputEvent};

#[test]
fn input_event() {
    let event: InputEvent = serde_json::from_str(include_str!("input-event-1.json")).unwrap();
    assert_eq!(event.payload.percent, 71);
    assert_eq!(event.timestamp, Some(1424029481169));
    assert_eq!(
        event.from.unwrap().device.unwrap().id.as_deref(),
        Some("00e04c036f15")
    );
}

#[test]
fn device_listing() {
    let devices: Vec<DeviceStatusEntry> =
        serde_json::from_str(include_str!("devices-1.json")).unwrap();
    assert_eq!(devices.len(), 2);
    assert!(devices[0].is_connected);
    assert!(!devices[1].is_connected);
    assert_eq!(devices[1].label.as_deref(), Some("porch light"));
}

#[test]
fn error_envelope() {
    let envelope: ErrorEnvelope =
        serde_json::from_str(r#"{"statusCode":404,"error":"Not Found","message":"no input"}"#)
            .unwrap();
    assert_eq!(envelope.status_code, 404);
}

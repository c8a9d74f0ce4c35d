use super::{collect, Reconciler, TickOutcome};
use crate::device::{Device, DeviceId};
use crate::messages::{Generated, MessageError, MqttMessage, Topics};
use crate::panel::PanelError;
use serde_json::{json, Value as JsonValue};

fn reconciler() -> Reconciler {
    Reconciler::new(Topics::new("homeassistant", "climax2mqtt"), false)
}

fn device(record: JsonValue) -> Device {
    Device::from_record(&record).expect("device")
}

fn kitchen(status: &str) -> Device {
    device(json!({"id": "ZB:445001", "type": 20, "name": "Kök", "status": status}))
}

fn heater(status: &str) -> Device {
    device(json!({"id": "ZB:b02a01", "type": 48, "name": "Heater", "status": status}))
}

fn topics_of(outcome: &TickOutcome) -> Vec<&str> {
    outcome.messages.iter().map(|m| m.topic.as_str()).collect()
}

#[test]
fn new_temperature_sensor_gets_discovery_then_state() {
    let mut reconciler = reconciler();
    let outcome = reconciler.reconcile(&[kitchen("6.68 °C")]);

    assert_eq!(outcome.new_devices, vec![DeviceId::normalize("ZB445001")]);
    assert_eq!(
        topics_of(&outcome),
        vec![
            "homeassistant/sensor/ZB445001/temperature/config",
            "climax2mqtt/sensors/ZB445001/state",
        ]
    );
    assert_eq!(
        String::from_utf8_lossy(&outcome.messages[1].payload),
        r#"{"temperature":6.68}"#
    );

    let repeat = reconciler.reconcile(&[kitchen("6.68 °C")]);
    assert!(repeat.messages.is_empty());
    assert!(repeat.new_devices.is_empty());
    assert_eq!(repeat.changed_devices, 0);
}

#[test]
fn discovery_is_never_repeated_after_changes() {
    let mut reconciler = reconciler();
    reconciler.reconcile(&[heater("On, 10W, 1.0kWh")]);

    let outcome = reconciler.reconcile(&[heater("Off, 0W, 1.2kWh")]);
    assert!(outcome.new_devices.is_empty());
    assert_eq!(topics_of(&outcome), vec!["climax2mqtt/sensors/ZBb02a01/state"]);
    let state: JsonValue = serde_json::from_slice(&outcome.messages[0].payload).expect("json");
    assert_eq!(state, json!({"power_state": "OFF", "power": 0.0, "energy": 1.2}));
}

#[test]
fn power_meter_discovery_precedes_its_first_update() {
    let mut reconciler = reconciler();
    let outcome = reconciler.reconcile(&[heater("On, 12.3W, 4.5kWh")]);
    let topics = topics_of(&outcome);
    assert_eq!(topics.len(), 4);
    assert!(topics[..3].iter().all(|t| t.ends_with("/config")));
    assert_eq!(topics[3], "climax2mqtt/sensors/ZBb02a01/state");
    assert!(outcome.messages[..3].iter().all(|m| m.retain));
    assert!(!outcome.messages[3].retain);
}

#[test]
fn devices_are_processed_in_poll_order() {
    let mut reconciler = reconciler();
    let outcome = reconciler.reconcile(&[heater("On, 1W, 1kWh"), kitchen("5 °C")]);
    let topics = topics_of(&outcome);
    assert_eq!(topics[3], "climax2mqtt/sensors/ZBb02a01/state");
    assert_eq!(topics[4], "homeassistant/sensor/ZB445001/temperature/config");
    assert_eq!(topics[5], "climax2mqtt/sensors/ZB445001/state");
}

#[test]
fn unsupported_devices_are_reported_once_and_still_stored() {
    let mut reconciler = reconciler();
    let smoke = device(json!({"id": "ZB:9", "type": 11, "name": "Hall", "status": "Normal"}));

    let outcome = reconciler.reconcile(&[smoke.clone()]);
    assert!(outcome.messages.is_empty());
    assert_eq!(outcome.unsupported, vec![DeviceId::normalize("ZB9")]);
    assert!(!reconciler.repository().is_new_device(smoke.identity()));

    let repeat = reconciler.reconcile(&[smoke]);
    assert!(repeat.unsupported.is_empty());
    assert_eq!(repeat.changed_devices, 0);
}

#[test]
fn duplicate_identity_in_one_poll_is_new_only_once() {
    let mut reconciler = reconciler();
    let outcome = reconciler.reconcile(&[kitchen("6.68 °C"), kitchen("7.5 °C")]);
    assert_eq!(outcome.new_devices.len(), 1);
    let discovery = topics_of(&outcome)
        .into_iter()
        .filter(|t| t.ends_with("/config"))
        .count();
    assert_eq!(discovery, 1);
    assert_eq!(outcome.changed_devices, 2);
}

#[test]
fn stale_devices_are_kept_unless_pruning() {
    let mut keep = reconciler();
    keep.reconcile(&[kitchen("6.68 °C")]);
    let outcome = keep.reconcile(&[]);
    assert!(outcome.pruned.is_empty());
    assert_eq!(keep.repository().len(), 1);

    let mut prune = Reconciler::new(Topics::new("homeassistant", "climax2mqtt"), true);
    prune.reconcile(&[kitchen("6.68 °C")]);
    let outcome = prune.reconcile(&[]);
    assert_eq!(outcome.pruned, vec![DeviceId::normalize("ZB445001")]);

    let back = prune.reconcile(&[kitchen("6.68 °C")]);
    assert_eq!(back.new_devices.len(), 1, "a pruned device is rediscovered");
}

fn panel_down() -> PanelError {
    PanelError::Rejected {
        result: 0,
        message: "session expired".to_string(),
    }
}

#[test]
fn failed_fetch_skips_the_tick_without_touching_state() {
    let mut reconciler = reconciler();
    assert!(reconciler.apply_fetch(Err(panel_down())).is_none());
    assert!(reconciler.repository().is_empty());

    let outcome = reconciler
        .apply_fetch(Ok(vec![kitchen("6.68 °C")]))
        .expect("tick outcome");
    assert_eq!(outcome.polled, 1);
    assert_eq!(
        topics_of(&outcome)[0],
        "homeassistant/sensor/ZB445001/temperature/config"
    );

    assert!(reconciler.apply_fetch(Err(panel_down())).is_none());
    let known = reconciler
        .repository()
        .get_device(&DeviceId::normalize("ZB445001"))
        .expect("still known");
    assert_eq!(known.info().status, "6.68 °C");

    let outcome = reconciler
        .apply_fetch(Ok(vec![kitchen("7.5 °C")]))
        .expect("tick outcome");
    assert!(outcome.new_devices.is_empty());
    assert_eq!(topics_of(&outcome), vec!["climax2mqtt/sensors/ZB445001/state"]);
}

#[test]
fn empty_poll_keeps_known_devices() {
    let mut reconciler = reconciler();
    reconciler.reconcile(&[kitchen("6.68 °C")]);
    let outcome = reconciler.apply_fetch(Ok(Vec::new())).expect("tick outcome");
    assert_eq!(outcome.polled, 0);
    assert!(outcome.messages.is_empty());
    assert_eq!(reconciler.repository().len(), 1);
}

#[test]
fn failed_message_build_keeps_the_rest_of_the_batch() {
    let sensor = kitchen("6.68 °C");
    let message = |topic: &str| MqttMessage {
        topic: topic.to_string(),
        payload: b"{}".to_vec(),
        retain: false,
    };
    let source = serde_json::from_str::<u8>("not a number").expect_err("invalid json");
    let failure = MessageError {
        device_id: sensor.identity().clone(),
        kind: "discovery",
        source,
    };

    let mut outcome = TickOutcome::default();
    collect(
        &mut outcome,
        &sensor,
        "discovery",
        Generated::Messages(vec![Ok(message("a")), Err(failure), Ok(message("b"))]),
    );
    assert_eq!(outcome.failed_messages, 1);
    assert_eq!(topics_of(&outcome), vec!["a", "b"]);
}

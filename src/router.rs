//! JSON command envelope parsing, validation, and dispatch (spec §4.6).
//!
//! Unlike the original daemon, which matched on raw command bytes inside
//! the still-unparsed message buffer before ever calling a JSON decoder
//! (flagged in spec §9 as a defect to fix), this router always parses the
//! full envelope first and dispatches on the parsed `cmd` field.

use std::sync::Arc;

use log::warn;
use parking_lot::Mutex;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::bus::topics;
use crate::codec::PayoutOption;
use crate::device::{Device, DeviceState};

/// Which device a topic's commands are addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Hopper,
    Validator,
}

/// Outcome of dispatching one envelope: the topic to publish on, the reply
/// body, and whether the caller (the supervisor) should begin shutdown.
pub struct DispatchOutcome {
    pub response_topic: String,
    pub payload: Vec<u8>,
    pub quit: bool,
}

/// Parses, validates, and dispatches inbound command envelopes against the
/// two devices, producing correlated JSON responses (spec §4.6).
pub struct CommandRouter {
    hopper: Arc<Mutex<Device>>,
    validator: Arc<Mutex<Device>>,
}

impl CommandRouter {
    pub fn new(hopper: Arc<Mutex<Device>>, validator: Arc<Mutex<Device>>) -> Self {
        Self { hopper, validator }
    }

    /// Resolves a request topic into a target device and its paired
    /// response topic, or `None` for anything else (the reserved
    /// `metacash` topic, or an unrecognized one).
    fn resolve_topic(topic: &str) -> Option<(Target, &'static str)> {
        match topic {
            topics::HOPPER_REQUEST => Some((Target::Hopper, topics::HOPPER_RESPONSE)),
            topics::VALIDATOR_REQUEST => Some((Target::Validator, topics::VALIDATOR_RESPONSE)),
            _ => None,
        }
    }

    pub fn dispatch(&self, topic: &str, raw: &[u8]) -> Option<DispatchOutcome> {
        let (target, response_topic) = Self::resolve_topic(topic)?;

        let value: Value = match serde_json::from_slice(raw) {
            Ok(value) => value,
            Err(err) => {
                return Some(DispatchOutcome {
                    response_topic: response_topic.to_string(),
                    payload: encode(&json!({
                        "error": "could not parse json",
                        "reason": err.to_string(),
                        "line": err.line(),
                    })),
                    quit: false,
                });
            }
        };

        let msg_id = value.get("msgId").and_then(Value::as_str).map(str::to_string);
        let cmd = value.get("cmd").and_then(Value::as_str).map(str::to_string);

        let Some(msg_id) = msg_id else {
            return Some(DispatchOutcome {
                response_topic: response_topic.to_string(),
                payload: encode(&json!({
                    "error": "missing or malformed required field",
                    "fields": ["msgId", "cmd"],
                })),
                quit: false,
            });
        };

        let Some(cmd) = cmd else {
            return Some(DispatchOutcome {
                response_topic: response_topic.to_string(),
                payload: encode(&json!({
                    "correlId": msg_id,
                    "error": "missing or malformed required field",
                    "fields": ["cmd"],
                })),
                quit: false,
            });
        };

        let reply_id = Uuid::now_v1(&[0u8; 6]).to_string();

        if cmd == "quit" {
            return Some(DispatchOutcome {
                response_topic: response_topic.to_string(),
                payload: encode(&envelope(&reply_id, &msg_id, json!({ "result": "ok" }))),
                quit: true,
            });
        }

        let device = match target {
            Target::Hopper => &self.hopper,
            Target::Validator => &self.validator,
        };

        {
            let guard = device.lock();
            if guard.state() != DeviceState::Ready {
                return Some(DispatchOutcome {
                    response_topic: response_topic.to_string(),
                    payload: encode(&envelope(&reply_id, &msg_id, json!({ "error": "hardware unavailable" }))),
                    quit: false,
                });
            }
        }

        let payload = self.dispatch_command(&cmd, &value, device);
        Some(DispatchOutcome {
            response_topic: response_topic.to_string(),
            payload: encode(&envelope(&reply_id, &msg_id, payload)),
            quit: false,
        })
    }

    fn dispatch_command(&self, cmd: &str, value: &Value, device: &Arc<Mutex<Device>>) -> Value {
        match cmd {
            "empty" => accepted_or_error(device.lock().empty()),
            "smart-empty" => accepted_or_error(device.lock().smart_empty()),
            "enable" => accepted_or_error(device.lock().enable()),
            "disable" => accepted_or_error(device.lock().disable()),

            "enable-channels" => match channel_mask(value) {
                Some(mask) => result_ok_or_failed(device.lock().enable_channels(mask)),
                None => missing_field("channels"),
            },
            "disable-channels" => match channel_mask(value) {
                Some(mask) => result_ok_or_failed(device.lock().disable_channels(mask)),
                None => missing_field("channels"),
            },
            "inhibit-channels" => match channel_mask(value) {
                Some(mask) => result_ok_or_failed(device.lock().inhibit_channels(mask)),
                None => missing_field("channels"),
            },

            "test-payout" => payout_reply(value, device, PayoutOption::Test, false),
            "do-payout" => payout_reply(value, device, PayoutOption::Do, false),
            "test-float" => payout_reply(value, device, PayoutOption::Test, true),
            "do-float" => payout_reply(value, device, PayoutOption::Do, true),

            "get-firmware-version" => match device.lock().get_firmware_version() {
                Ok(version) => json!({ "version": version }),
                Err(err) => error_reply(&err),
            },
            "get-dataset-version" => match device.lock().get_dataset_version() {
                Ok(version) => json!({ "version": version }),
                Err(err) => error_reply(&err),
            },
            "channel-security-data" => match device.lock().channel_security_data() {
                Ok(security) => json!({ "security": security }),
                Err(err) => error_reply(&err),
            },
            "get-all-levels" => match device.lock().get_all_levels() {
                Ok(levels) => json!({ "levels": levels }),
                Err(err) => error_reply(&err),
            },
            "set-denomination-level" => match (as_u16(value, "level"), as_u32(value, "amount")) {
                (Some(level), Some(amount)) => {
                    result_ok_or_failed(device.lock().set_denomination_level(level, amount))
                }
                _ => missing_field("level/amount"),
            },
            "last-reject-note" => match device.lock().last_reject_note() {
                Ok(reason) => json!({ "reason": reject_reason(reason), "code": reason }),
                Err(err) => error_reply(&err),
            },

            other => json!({ "error": "unknown command", "cmd": other }),
        }
    }
}

fn payout_reply(value: &Value, device: &Arc<Mutex<Device>>, option: PayoutOption, is_float: bool) -> Value {
    let Some(amount) = as_u32(value, "amount") else {
        return missing_field("amount");
    };
    let mut guard = device.lock();
    let outcome = if is_float { guard.float(amount, option) } else { guard.payout(amount, option) };
    match outcome {
        Ok(()) => json!({ "result": "ok" }),
        Err(failure) => json!({ "result": "failed", "reason": failure.message() }),
    }
}

fn channel_mask(value: &Value) -> Option<u8> {
    let channels = value.get("channels")?.as_str()?;
    let mut mask = 0u8;
    for ch in channels.chars() {
        if let Some(digit) = ch.to_digit(10) {
            if (1..=8).contains(&digit) {
                mask |= 1 << (digit - 1);
            }
        }
    }
    Some(mask)
}

/// Reads a numeric field, truncating a floating-point JSON number to an
/// integer (spec §8: "`amount` field of floating-point kind is truncated
/// to integer cents").
fn as_u32(value: &Value, field: &str) -> Option<u32> {
    let n = value.get(field)?;
    n.as_u64()
        .and_then(|n| u32::try_from(n).ok())
        .or_else(|| n.as_f64().and_then(|n| u32::try_from(n.trunc() as i64).ok()))
}

fn as_u16(value: &Value, field: &str) -> Option<u16> {
    let n = value.get(field)?;
    n.as_u64()
        .and_then(|n| u16::try_from(n).ok())
        .or_else(|| n.as_f64().and_then(|n| u16::try_from(n.trunc() as i64).ok()))
}

fn accepted_or_error(result: crate::error::Result<()>) -> Value {
    match result {
        Ok(()) => json!({ "accepted": "true" }),
        Err(err) => error_reply(&err),
    }
}

fn result_ok_or_failed(result: crate::error::Result<()>) -> Value {
    match result {
        Ok(()) => json!({ "result": "ok" }),
        Err(err) => {
            warn!("command failed: {err}");
            json!({ "result": "failed" })
        }
    }
}

fn missing_field(field: &str) -> Value {
    json!({ "error": "missing or malformed required field", "fields": [field] })
}

fn error_reply(err: &crate::error::SspError) -> Value {
    json!({ "error": err.to_string() })
}

fn envelope(msg_id: &str, correl_id: &str, body: Value) -> Value {
    let mut out = json!({ "msgId": msg_id, "correlId": correl_id });
    if let (Value::Object(out), Value::Object(body)) = (&mut out, body) {
        out.extend(body);
    }
    out
}

fn encode(value: &Value) -> Vec<u8> {
    serde_json::to_vec(value).unwrap_or_else(|_| b"{\"error\":\"internal encode failure\"}".to_vec())
}

/// Last-reject-note reason table (spec §4.2 / original `payoutd.c`
/// `rejectionStrings`).
fn reject_reason(code: u8) -> &'static str {
    match code {
        0x00 => "note accepted",
        0x01 => "note length incorrect",
        0x02 => "reject reason 2",
        0x03 => "reject reason 3",
        0x04 => "reject reason 4",
        0x05 => "reject reason 5",
        0x06 => "channel inhibited",
        0x07 => "second note inserted",
        0x08 => "reject reason 8",
        0x09 => "note recognized but fails currency requirement",
        0x0A => "reject reason 10",
        0x0B => "note too long",
        0x0C => "reject reason 12",
        0x0D => "mechanism slow/stalled",
        0x0E => "strimming attempt detected",
        0x0F => "fraud channel reject",
        0x10 => "no notes inserted",
        0x11 => "peak detect fail",
        0x12 => "twisted note detected",
        0x13 => "escrow time-out",
        0x14 => "bar code scan fail",
        0x15 => "no data in data set",
        0x16 => "note too short",
        0x17 => "reject reason 23",
        0x18 => "reject reason 24",
        0x19 => "reject reason 25",
        0x1A => "reject reason 26",
        0x1B => "reject reason 27",
        0x1C => "channel disabled via datastrobe",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::mock::InMemoryBus;
    use crate::bus::{EventSink, RequestSource, ResponsePublisher};
    use crate::device::DeviceRole;
    use crate::transport::SspTransport;
    use std::io::{Read, Write};

    struct DeadLink;
    impl Read for DeadLink {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::TimedOut, "no hardware"))
        }
    }
    impl Write for DeadLink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn uninitialized_device(role: DeviceRole) -> Arc<Mutex<Device>> {
        let transport = Arc::new(SspTransport::from_link(Box::new(DeadLink)));
        Arc::new(Mutex::new(Device::new(0x10, role, "Mr. Coin", transport)))
    }

    fn router() -> CommandRouter {
        CommandRouter::new(
            uninitialized_device(DeviceRole::Hopper),
            uninitialized_device(DeviceRole::Validator),
        )
    }

    #[test]
    fn malformed_json_produces_parse_error_reply() {
        let outcome = router().dispatch(topics::HOPPER_REQUEST, b"not json").unwrap();
        let value: Value = serde_json::from_slice(&outcome.payload).unwrap();
        assert_eq!(value["error"], "could not parse json");
    }

    #[test]
    fn missing_cmd_field_produces_error_reply() {
        let outcome = router().dispatch(topics::HOPPER_REQUEST, br#"{"msgId":"abc"}"#).unwrap();
        let value: Value = serde_json::from_slice(&outcome.payload).unwrap();
        assert_eq!(value["error"], "missing or malformed required field");
        assert_eq!(value["correlId"], "abc");
    }

    #[test]
    fn missing_msg_id_produces_error_reply_without_correl_id() {
        let outcome = router().dispatch(topics::HOPPER_REQUEST, br#"{"cmd":"empty"}"#).unwrap();
        let value: Value = serde_json::from_slice(&outcome.payload).unwrap();
        assert_eq!(value["error"], "missing or malformed required field");
        assert!(value.get("correlId").is_none());
    }

    #[test]
    fn floating_point_amount_is_truncated_to_integer_cents() {
        assert_eq!(as_u32(&serde_json::json!({ "amount": 1000.7 }), "amount"), Some(1000));
        assert_eq!(as_u32(&serde_json::json!({ "amount": 1000.0 }), "amount"), Some(1000));
        assert_eq!(as_u16(&serde_json::json!({ "level": 7.9 }), "level"), Some(7));
    }

    #[test]
    fn quit_signals_shutdown_and_replies_ok() {
        let outcome = router()
            .dispatch(topics::HOPPER_REQUEST, br#"{"msgId":"abc","cmd":"quit"}"#)
            .unwrap();
        assert!(outcome.quit);
        let value: Value = serde_json::from_slice(&outcome.payload).unwrap();
        assert_eq!(value["result"], "ok");
        assert_eq!(value["correlId"], "abc");
    }

    #[test]
    fn uninitialized_device_reports_hardware_unavailable() {
        let outcome = router()
            .dispatch(topics::HOPPER_REQUEST, br#"{"msgId":"abc","cmd":"empty"}"#)
            .unwrap();
        let value: Value = serde_json::from_slice(&outcome.payload).unwrap();
        assert_eq!(value["error"], "hardware unavailable");
    }

    #[test]
    fn unresolvable_topic_is_ignored() {
        assert!(router().dispatch(topics::RESERVED, b"{}").is_none());
    }

    #[test]
    fn in_memory_bus_can_carry_a_dispatch_round_trip() {
        let mut bus = InMemoryBus::new();
        bus.push_request(topics::HOPPER_REQUEST, br#"{"msgId":"x","cmd":"quit"}"#);
        let msg = bus.recv().unwrap();
        let outcome = router().dispatch(&msg.topic, &msg.payload).unwrap();
        bus.publish_response(&outcome.response_topic, &outcome.payload);
        bus.publish_event(topics::HOPPER_EVENT, b"{\"event\":\"unit reset\"}");
        assert_eq!(bus.responses.len(), 1);
        assert_eq!(bus.events.len(), 1);
    }
}

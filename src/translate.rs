//! Pure mapping from raw poll events to domain event JSON (spec §4.5).
//!
//! One function per role because channel indices mean different things: a
//! coin channel's value is carried directly in the raw event, while a note
//! channel only carries an index into the cached [`SetupReport`] the
//! validator returned at `setup_request` time.

use serde_json::{json, Value};

use crate::codec::{PollEvent, PollEventCode, SetupReport};
use crate::device::DeviceRole;

/// Calibration-fail sub-error codes (`CALIBRATION_FAIL`'s single data byte).
mod calibration_fail {
    pub const NO_FAILURE: u32 = 0x00;
    pub const SENSOR_FLAP: u32 = 0x01;
    pub const SENSOR_EXIT: u32 = 0x02;
    pub const SENSOR_COIL_1: u32 = 0x03;
    pub const SENSOR_COIL_2: u32 = 0x04;
    pub const NOT_INITIALIZED: u32 = 0x05;
    pub const CHECKSUM_ERROR: u32 = 0x06;
    pub const COMMAND_RECAL: u32 = 0x07;
}

/// Result of translating one raw poll event: zero or more JSON events to
/// publish, plus whether the caller must follow up with `run_calibration`
/// (the one case where a translation has a hardware side effect, spec §4.5).
pub struct Translation {
    pub events: Vec<Value>,
    pub needs_recalibration: bool,
}

impl Translation {
    fn single(event: Value) -> Self {
        Self { events: vec![event], needs_recalibration: false }
    }
}

/// Translates one raw poll event into its domain JSON representation(s).
///
/// `setup_report` is required to resolve a validator's channel value; it is
/// `None` only before the device has completed its handshake, in which case
/// channel-indexed events degrade to the channel-only shape.
pub fn translate(role: DeviceRole, raw: &PollEvent, setup_report: Option<&SetupReport>) -> Translation {
    let cc = currency_str(&raw.currency);

    match raw.code {
        PollEventCode::Reset => Translation::single(json!({ "event": "unit reset" })),

        PollEventCode::Read if raw.data1 == 0 => Translation::single(json!({ "event": "reading" })),
        PollEventCode::Read => match role {
            DeviceRole::Hopper => Translation::single(json!({ "event": "read", "channel": raw.data1 })),
            DeviceRole::Validator => Translation::single(json!({
                "event": "read",
                "amount": channel_value(setup_report, raw.data1),
                "channel": raw.data1,
            })),
        },

        PollEventCode::Credit => match role {
            DeviceRole::Hopper => {
                Translation::single(json!({ "event": "credit", "channel": raw.data1, "cc": cc }))
            }
            DeviceRole::Validator => Translation::single(json!({
                "event": "credit",
                "amount": channel_value(setup_report, raw.data1),
                "channel": raw.data1,
            })),
        },

        PollEventCode::Dispensing => amount_event("dispensing", raw.data1, &cc),
        PollEventCode::Dispensed => amount_event("dispensed", raw.data1, &cc),
        PollEventCode::CoinCredit => amount_event("coin credit", raw.data1, &cc),
        PollEventCode::CashboxPaid => amount_event("cashbox paid", raw.data1, &cc),
        PollEventCode::Floating => amount_event("floating", raw.data1, &cc),
        PollEventCode::Floated => amount_event("floated", raw.data1, &cc),
        PollEventCode::SmartEmptying => amount_event("smart emptying", raw.data1, &cc),
        PollEventCode::SmartEmptied => amount_event("smart emptied", raw.data1, &cc),

        PollEventCode::IncompletePayout => Translation::single(json!({
            "event": "incomplete payout",
            "dispensed": raw.data1,
            "requested": raw.data2,
            "cc": cc,
        })),
        PollEventCode::IncompleteFloat => Translation::single(json!({
            "event": "incomplete float",
            "dispensed": raw.data1,
            "requested": raw.data2,
            "cc": cc,
        })),

        PollEventCode::CalibrationFail => translate_calibration_fail(raw.data1),

        PollEventCode::Stacked => literal("stacked"),
        PollEventCode::Stored => literal("stored"),
        PollEventCode::Rejected => literal("rejected"),
        PollEventCode::Stacking => literal("stacking"),
        PollEventCode::Rejecting => literal("rejecting"),
        PollEventCode::SafeJam => literal("safe jam"),
        PollEventCode::UnsafeJam => literal("unsafe jam"),
        PollEventCode::StackerFull => literal("stacker full"),
        PollEventCode::CashboxRemoved => literal("cashbox removed"),
        PollEventCode::CashboxReplaced => literal("cashbox replaced"),
        PollEventCode::ClearedFromFront => literal("cleared from front"),
        PollEventCode::ClearedIntoCashbox => literal("cleared into cashbox"),

        PollEventCode::Empty => literal("empty"),
        PollEventCode::Emptying => literal("emptying"),
        PollEventCode::Disabled => literal("disabled"),
        PollEventCode::Jammed => literal("jammed"),

        PollEventCode::FraudAttempt => match role {
            DeviceRole::Validator => {
                Translation::single(json!({ "event": "fraud attempt", "dispensed": raw.data1 }))
            }
            DeviceRole::Hopper => literal("fraud attempt"),
        },

        PollEventCode::Unknown(code) => {
            Translation::single(json!({ "event": "unknown", "id": format!("{code:#04X}") }))
        }
    }
}

fn literal(name: &str) -> Translation {
    Translation::single(json!({ "event": name }))
}

fn amount_event(name: &str, amount: u32, cc: &str) -> Translation {
    Translation::single(json!({ "event": name, "amount": amount, "cc": cc }))
}

fn translate_calibration_fail(sub_code: u32) -> Translation {
    let reason = match sub_code {
        calibration_fail::NO_FAILURE => "no error",
        calibration_fail::SENSOR_FLAP => "sensor flap",
        calibration_fail::SENSOR_EXIT => "sensor exit",
        calibration_fail::SENSOR_COIL_1 => "sensor coil 1",
        calibration_fail::SENSOR_COIL_2 => "sensor coil 2",
        calibration_fail::NOT_INITIALIZED => "not initialized",
        calibration_fail::CHECKSUM_ERROR => "checksum error",
        calibration_fail::COMMAND_RECAL => {
            return Translation {
                events: vec![json!({ "event": "recalibrating" })],
                needs_recalibration: true,
            };
        }
        _ => "unknown",
    };
    Translation::single(json!({ "event": "calibration fail", "error": reason }))
}

fn channel_value(setup_report: Option<&SetupReport>, channel: u32) -> u32 {
    setup_report
        .and_then(|report| report.channel_data.get(channel.saturating_sub(1) as usize))
        .map(|channel| channel.value * 100)
        .unwrap_or(0)
}

fn currency_str(cc: &[u8; 3]) -> String {
    String::from_utf8_lossy(cc).trim_end_matches('\0').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::ChannelDatum;

    fn report_with_values(values: &[u32]) -> SetupReport {
        SetupReport {
            unit_type: 0,
            protocol_version: 6,
            channel_data: values.iter().map(|&value| ChannelDatum { value, currency: *b"EUR" }).collect(),
        }
    }

    fn event(code: PollEventCode, data1: u32, data2: u32) -> PollEvent {
        PollEvent { code, data1, data2, currency: *b"EUR" }
    }

    #[test]
    fn reset_emits_unit_reset() {
        let t = translate(DeviceRole::Hopper, &event(PollEventCode::Reset, 0, 0), None);
        assert_eq!(t.events, vec![json!({ "event": "unit reset" })]);
        assert!(!t.needs_recalibration);
    }

    #[test]
    fn hopper_read_carries_channel_only() {
        let t = translate(DeviceRole::Hopper, &event(PollEventCode::Read, 2, 0), None);
        assert_eq!(t.events, vec![json!({ "event": "read", "channel": 2 })]);
    }

    #[test]
    fn validator_read_resolves_channel_value_times_100() {
        let report = report_with_values(&[5, 10, 20]);
        let t = translate(DeviceRole::Validator, &event(PollEventCode::Read, 2, 0), Some(&report));
        assert_eq!(t.events, vec![json!({ "event": "read", "amount": 1000, "channel": 2 })]);
    }

    #[test]
    fn incomplete_payout_carries_both_values_and_currency() {
        let raw = PollEvent { code: PollEventCode::IncompletePayout, data1: 500, data2: 1000, currency: *b"EUR" };
        let t = translate(DeviceRole::Hopper, &raw, None);
        assert_eq!(
            t.events,
            vec![json!({ "event": "incomplete payout", "dispensed": 500, "requested": 1000, "cc": "EUR" })]
        );
    }

    #[test]
    fn calibration_fail_command_recal_signals_recalibration() {
        let t = translate(DeviceRole::Hopper, &event(PollEventCode::CalibrationFail, 0x07, 0), None);
        assert_eq!(t.events, vec![json!({ "event": "recalibrating" })]);
        assert!(t.needs_recalibration);
    }

    #[test]
    fn calibration_fail_known_code_maps_to_reason_string() {
        let t = translate(DeviceRole::Hopper, &event(PollEventCode::CalibrationFail, 0x02, 0), None);
        assert_eq!(t.events, vec![json!({ "event": "calibration fail", "error": "sensor exit" })]);
        assert!(!t.needs_recalibration);
    }

    #[test]
    fn fraud_attempt_on_validator_carries_dispensed_amount() {
        let t = translate(DeviceRole::Validator, &event(PollEventCode::FraudAttempt, 250, 0), None);
        assert_eq!(t.events, vec![json!({ "event": "fraud attempt", "dispensed": 250 })]);
    }

    #[test]
    fn unknown_code_reports_hex_id() {
        let t = translate(DeviceRole::Hopper, &event(PollEventCode::Unknown(0x9B), 0, 0), None);
        assert_eq!(t.events, vec![json!({ "event": "unknown", "id": "0x9B" })]);
    }
}

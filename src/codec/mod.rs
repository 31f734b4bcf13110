//! Stateless mapping between typed SSP6 operations and their on-wire byte
//! shape (spec §4.2). Every function here is pure: given typed input it
//! produces payload bytes, and given response bytes it produces a typed
//! result. Framing (STX, length, CRC, byte-stuffing, sequencing) lives in
//! [`crate::transport`]; this module only ever sees/produces the inner
//! command/response payload.

pub mod crypto;

use std::fmt;

use crate::error::SspError;

/// Start-of-transmission byte for SSP6 frames.
pub const STX: u8 = 0x7F;

/// Command byte values used by the operations this daemon issues.
pub mod command_byte {
    pub const SYNC: u8 = 0x11;
    pub const HOST_PROTOCOL: u8 = 0x06;
    pub const SET_GENERATOR: u8 = 0x4C;
    pub const SET_MODULUS: u8 = 0x4D;
    pub const REQUEST_KEY_EXCHANGE: u8 = 0x4E;
    pub const SET_ENCRYPTION_KEY: u8 = 0x4F;
    pub const SETUP_REQUEST: u8 = 0x05;
    pub const ENABLE: u8 = 0x0A;
    pub const DISABLE: u8 = 0x09;
    pub const SET_INHIBITS: u8 = 0x02;
    pub const SET_ROUTE: u8 = 0x3B;
    pub const ENABLE_PAYOUT: u8 = 0x5C;
    pub const PAYOUT: u8 = 0x33;
    pub const FLOAT: u8 = 0x3D;
    pub const SET_DENOMINATION_LEVEL: u8 = 0x34;
    pub const GET_ALL_LEVELS: u8 = 0x22;
    pub const GET_FIRMWARE_VERSION: u8 = 0x20;
    pub const GET_DATASET_VERSION: u8 = 0x21;
    pub const LAST_REJECT_NOTE: u8 = 0x17;
    pub const SET_COINMECH_INHIBITS: u8 = 0x4A;
    pub const SET_REFILL_MODE: u8 = 0x30;
    pub const EMPTY: u8 = 0x3F;
    pub const SMART_EMPTY: u8 = 0x52;
    pub const POLL: u8 = 0x07;
    pub const RUN_CALIBRATION: u8 = 0x16;
    pub const CHANNEL_SECURITY_DATA: u8 = 0x3C;
}

/// Response status byte, the first byte of every SSP6 response payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    Ok,
    GenericFail,
    KeyNotSet,
    CommandNotKnown,
    IncorrectParameters,
    CommandCannotBeProcessed,
    Unknown(u8),
}

impl ResponseStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, ResponseStatus::Ok)
    }
}

impl From<u8> for ResponseStatus {
    fn from(b: u8) -> Self {
        match b {
            0xF0 => ResponseStatus::Ok,
            0xF5 => ResponseStatus::GenericFail,
            0xFA => ResponseStatus::KeyNotSet,
            0xF2 => ResponseStatus::CommandNotKnown,
            0xF3 => ResponseStatus::IncorrectParameters,
            0xF4 => ResponseStatus::CommandCannotBeProcessed,
            other => ResponseStatus::Unknown(other),
        }
    }
}

impl fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseStatus::Ok => write!(f, "OK"),
            ResponseStatus::GenericFail => write!(f, "GENERIC_FAIL"),
            ResponseStatus::KeyNotSet => write!(f, "KEY_NOT_SET"),
            ResponseStatus::CommandNotKnown => write!(f, "COMMAND_NOT_KNOWN"),
            ResponseStatus::IncorrectParameters => write!(f, "INCORRECT_PARAMETERS"),
            ResponseStatus::CommandCannotBeProcessed => write!(f, "COMMAND_CANNOT_BE_PROCESSED"),
            ResponseStatus::Unknown(b) => write!(f, "UNKNOWN({b:#04x})"),
        }
    }
}

/// Note/coin routing destination for [`Command::SetRoute`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Storage,
    Cashbox,
}

impl Route {
    fn byte(self) -> u8 {
        match self {
            Route::Storage => 0x00,
            Route::Cashbox => 0x01,
        }
    }
}

/// `TEST` dry-runs a payout/float without moving cash; `Do` performs it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayoutOption {
    Test,
    Do,
}

impl PayoutOption {
    fn byte(self) -> u8 {
        match self {
            PayoutOption::Test => 0x19,
            PayoutOption::Do => 0x58,
        }
    }
}

/// The 0x01..0x04 failure codes a fialed payout/float response carries in
/// `data[0]` (spec §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayoutFailure {
    NotEnoughValue,
    CannotPayExact,
    Busy,
    Disabled,
    Unknown(u8),
}

impl From<u8> for PayoutFailure {
    fn from(b: u8) -> Self {
        match b {
            0x01 => PayoutFailure::NotEnoughValue,
            0x02 => PayoutFailure::CannotPayExact,
            0x03 => PayoutFailure::Busy,
            0x04 => PayoutFailure::Disabled,
            other => PayoutFailure::Unknown(other),
        }
    }
}

impl PayoutFailure {
    pub fn message(self) -> String {
        match self {
            PayoutFailure::NotEnoughValue => "not enough value in smart payout".to_string(),
            PayoutFailure::CannotPayExact => "can't pay exact amount".to_string(),
            PayoutFailure::Busy => "smart payout busy".to_string(),
            PayoutFailure::Disabled => "smart payout disabled".to_string(),
            PayoutFailure::Unknown(_) => "unknown".to_string(),
        }
    }
}

/// A single channel's denomination data, as reported by `setup_request`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelDatum {
    /// Value in minor currency units / 100 (see spec §4.2 numeric semantics).
    pub value: u32,
    pub currency: [u8; 3],
}

/// The cached, immutable-per-session report produced by `setup_request`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupReport {
    pub unit_type: u8,
    pub protocol_version: u8,
    pub channel_data: Vec<ChannelDatum>,
}

/// A single denomination counter returned by `get_all_levels`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct LevelEntry {
    pub level: u16,
    pub value: u32,
    pub currency: String,
}

/// Typed SSP6 commands the daemon issues. `command_byte`/`payload` produce
/// the wire shape described in spec §4.2.
#[derive(Debug, Clone)]
pub enum Command {
    Sync,
    HostProtocol(u8),
    SetGenerator(crypto::GeneratorKey),
    SetModulus(crypto::ModulusKey),
    RequestKeyExchange(crypto::IntermediateKey),
    SetEncryptionKey(crypto::FixedKey),
    SetupRequest,
    Enable,
    Disable,
    SetInhibits { low: u8, high: u8 },
    SetRoute { amount: u32, currency: [u8; 3], route: Route },
    EnablePayout { unit_type: u8 },
    Payout { amount: u32, currency: [u8; 3], option: PayoutOption },
    Float { keep_amount: u32, currency: [u8; 3], option: PayoutOption },
    SetDenominationLevel { level: u16, amount: u32, currency: [u8; 3] },
    GetAllLevels,
    GetFirmwareVersion,
    GetDatasetVersion,
    LastRejectNote,
    SetCoinMechInhibits { value: u16, currency: [u8; 3], enabled: bool },
    SetRefillMode,
    Empty,
    SmartEmpty,
    Poll,
    RunCalibration,
    ChannelSecurityData,
}

impl Command {
    pub fn command_byte(&self) -> u8 {
        use command_byte::*;
        match self {
            Command::Sync => SYNC,
            Command::HostProtocol(_) => HOST_PROTOCOL,
            Command::SetGenerator(_) => SET_GENERATOR,
            Command::SetModulus(_) => SET_MODULUS,
            Command::RequestKeyExchange(_) => REQUEST_KEY_EXCHANGE,
            Command::SetEncryptionKey(_) => SET_ENCRYPTION_KEY,
            Command::SetupRequest => SETUP_REQUEST,
            Command::Enable => ENABLE,
            Command::Disable => DISABLE,
            Command::SetInhibits { .. } => SET_INHIBITS,
            Command::SetRoute { .. } => SET_ROUTE,
            Command::EnablePayout { .. } => ENABLE_PAYOUT,
            Command::Payout { .. } => PAYOUT,
            Command::Float { .. } => FLOAT,
            Command::SetDenominationLevel { .. } => SET_DENOMINATION_LEVEL,
            Command::GetAllLevels => GET_ALL_LEVELS,
            Command::GetFirmwareVersion => GET_FIRMWARE_VERSION,
            Command::GetDatasetVersion => GET_DATASET_VERSION,
            Command::LastRejectNote => LAST_REJECT_NOTE,
            Command::SetCoinMechInhibits { .. } => SET_COINMECH_INHIBITS,
            Command::SetRefillMode => SET_REFILL_MODE,
            Command::Empty => EMPTY,
            Command::SmartEmpty => SMART_EMPTY,
            Command::Poll => POLL,
            Command::RunCalibration => RUN_CALIBRATION,
            Command::ChannelSecurityData => CHANNEL_SECURITY_DATA,
        }
    }

    /// Encodes the command byte followed by its operation-specific payload.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![self.command_byte()];
        match self {
            Command::Sync
            | Command::SetupRequest
            | Command::Enable
            | Command::Disable
            | Command::GetAllLevels
            | Command::GetFirmwareVersion
            | Command::GetDatasetVersion
            | Command::LastRejectNote
            | Command::Empty
            | Command::SmartEmpty
            | Command::Poll
            | Command::RunCalibration
            | Command::ChannelSecurityData => {}
            Command::HostProtocol(version) => out.push(*version),
            Command::SetGenerator(key) => out.extend_from_slice(&key.to_le_bytes()),
            Command::SetModulus(key) => out.extend_from_slice(&key.to_le_bytes()),
            Command::RequestKeyExchange(key) => out.extend_from_slice(&key.to_le_bytes()),
            Command::SetEncryptionKey(key) => out.extend_from_slice(&key.to_le_bytes()),
            Command::SetInhibits { low, high } => {
                out.push(*low);
                out.push(*high);
            }
            Command::SetRoute { amount, currency, route } => {
                out.extend_from_slice(&amount.to_le_bytes());
                out.extend_from_slice(currency);
                out.push(route.byte());
            }
            Command::EnablePayout { unit_type } => out.push(*unit_type),
            Command::Payout { amount, currency, option } => {
                out.extend_from_slice(&amount.to_le_bytes());
                out.extend_from_slice(currency);
                out.push(option.byte());
            }
            Command::Float { keep_amount, currency, option } => {
                out.extend_from_slice(&100u16.to_le_bytes());
                out.extend_from_slice(&keep_amount.to_le_bytes());
                out.extend_from_slice(currency);
                out.push(option.byte());
            }
            Command::SetDenominationLevel { level, amount, currency } => {
                out.extend_from_slice(&level.to_le_bytes());
                out.extend_from_slice(&amount.to_le_bytes());
                out.extend_from_slice(currency);
            }
            Command::SetCoinMechInhibits { value, currency, enabled } => {
                out.extend_from_slice(&value.to_le_bytes());
                out.extend_from_slice(currency);
                out.push(if *enabled { 0x01 } else { 0x00 });
            }
            Command::SetRefillMode => {
                out.extend_from_slice(&[0x81, 0x10, 0x11, 0x01, 0x01, 0x52, 0xF5]);
            }
        }
        out
    }
}

/// Decodes the `setup_request` response body (status byte already stripped).
pub fn decode_setup_report(data: &[u8]) -> Result<SetupReport, SspError> {
    if data.is_empty() {
        return Err(SspError::Malformed("empty setup_request response"));
    }
    let unit_type = data[0];
    let mut idx = 1;
    if idx >= data.len() {
        return Err(SspError::Malformed("setup_request truncated"));
    }
    let num_channels = data[idx] as usize;
    idx += 1;

    let mut channel_data = Vec::with_capacity(num_channels);
    for _ in 0..num_channels {
        if idx + 2 > data.len() {
            return Err(SspError::Malformed("setup_request channel value truncated"));
        }
        let raw = u16::from_le_bytes([data[idx], data[idx + 1]]);
        channel_data.push(ChannelDatum { value: raw as u32, currency: [0; 3] });
        idx += 2;
    }

    // Protocol version trails the fixed-size fields; currency codes follow
    // per channel only under protocol 6.
    let protocol_version = *data.last().unwrap_or(&6);
    if protocol_version >= 6 {
        for channel in channel_data.iter_mut() {
            if idx + 3 > data.len() {
                break;
            }
            channel.currency.copy_from_slice(&data[idx..idx + 3]);
            idx += 3;
        }
    }

    Ok(SetupReport { unit_type, protocol_version, channel_data })
}

/// Decodes the `get_all_levels` response body.
pub fn decode_all_levels(data: &[u8]) -> Result<Vec<LevelEntry>, SspError> {
    if data.is_empty() {
        return Err(SspError::Malformed("empty get_all_levels response"));
    }
    let count = data[0] as usize;
    let mut idx = 1;
    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        if idx + 9 > data.len() {
            return Err(SspError::Malformed("get_all_levels entry truncated"));
        }
        let level = u16::from_le_bytes([data[idx], data[idx + 1]]);
        let value = u32::from_le_bytes([data[idx + 2], data[idx + 3], data[idx + 4], data[idx + 5]]);
        let currency = String::from_utf8_lossy(&data[idx + 6..idx + 9]).to_string();
        entries.push(LevelEntry { level, value, currency });
        idx += 9;
    }
    Ok(entries)
}

/// Decodes a fixed-length ASCII field (firmware/dataset version).
pub fn decode_ascii_field(data: &[u8], len: usize) -> Result<String, SspError> {
    if data.len() < len {
        return Err(SspError::Malformed("ascii field truncated"));
    }
    Ok(String::from_utf8_lossy(&data[..len])
        .trim_end_matches('\0')
        .to_string())
}

/// Decodes the `last_reject_note` response body, returning the reason byte.
pub fn decode_last_reject(data: &[u8]) -> Result<u8, SspError> {
    data.first()
        .copied()
        .ok_or(SspError::Malformed("empty last_reject_note response"))
}

/// Decodes a failed payout/float response's error byte (`data[0]`).
pub fn decode_payout_failure(data: &[u8]) -> PayoutFailure {
    data.first().copied().map(PayoutFailure::from).unwrap_or(PayoutFailure::Unknown(0))
}

/// Decodes `channel_security_data`'s response body into per-channel status
/// bytes (`0=unused,1=low,2=std,3=high,4=inhibited`).
pub fn decode_channel_security(data: &[u8]) -> Result<Vec<u8>, SspError> {
    let count = *data.first().ok_or(SspError::Malformed("empty channel_security response"))? as usize;
    if data.len() < 1 + count {
        return Err(SspError::Malformed("channel_security response truncated"));
    }
    Ok(data[1..1 + count].to_vec())
}

/// One event decoded out of a `poll` response's event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollEvent {
    pub code: PollEventCode,
    pub data1: u32,
    pub data2: u32,
    pub currency: [u8; 3],
}

/// Raw poll event codes (spec §4.2), each with its own data-byte arity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollEventCode {
    Reset,
    Read,
    Credit,
    Rejecting,
    Rejected,
    Stacking,
    Stored,
    Stacked,
    SafeJam,
    UnsafeJam,
    Disabled,
    FraudAttempt,
    StackerFull,
    CashboxRemoved,
    CashboxReplaced,
    ClearedFromFront,
    ClearedIntoCashbox,
    CalibrationFail,
    Dispensing,
    Dispensed,
    Floating,
    Floated,
    CashboxPaid,
    Jammed,
    CoinCredit,
    Empty,
    Emptying,
    SmartEmptying,
    SmartEmptied,
    IncompletePayout,
    IncompleteFloat,
    Unknown(u8),
}

/// How many trailing data bytes follow a poll event's code byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventArity {
    None,
    OneValue,
    OneValueWithCurrency,
    TwoValuesWithCurrency,
    OneByte,
}

const POLL_EVENT_TABLE: &[(u8, PollEventCode, EventArity)] = &[
    (0xF1, PollEventCode::Reset, EventArity::None),
    (0xEF, PollEventCode::Read, EventArity::OneValue),
    (0xEE, PollEventCode::Credit, EventArity::OneValueWithCurrency),
    (0xED, PollEventCode::Rejecting, EventArity::None),
    (0xEC, PollEventCode::Rejected, EventArity::None),
    (0xCC, PollEventCode::Stacking, EventArity::None),
    (0xEB, PollEventCode::Stored, EventArity::None),
    (0xEA, PollEventCode::Stacked, EventArity::None),
    (0xE9, PollEventCode::SafeJam, EventArity::None),
    (0xE8, PollEventCode::UnsafeJam, EventArity::None),
    (0xE7, PollEventCode::Disabled, EventArity::None),
    (0xE6, PollEventCode::FraudAttempt, EventArity::OneValue),
    (0xE4, PollEventCode::StackerFull, EventArity::None),
    (0xE3, PollEventCode::CashboxRemoved, EventArity::None),
    (0xE2, PollEventCode::CashboxReplaced, EventArity::None),
    (0xE1, PollEventCode::ClearedFromFront, EventArity::None),
    (0xE0, PollEventCode::ClearedIntoCashbox, EventArity::None),
    (0xDF, PollEventCode::CalibrationFail, EventArity::OneByte),
    (0xDA, PollEventCode::Dispensing, EventArity::OneValueWithCurrency),
    (0xD2, PollEventCode::Dispensed, EventArity::OneValueWithCurrency),
    (0xD6, PollEventCode::Floating, EventArity::OneValueWithCurrency),
    (0xD7, PollEventCode::Floated, EventArity::OneValueWithCurrency),
    (0xD1, PollEventCode::CashboxPaid, EventArity::OneValueWithCurrency),
    (0xD5, PollEventCode::Jammed, EventArity::None),
    (0xD3, PollEventCode::CoinCredit, EventArity::OneValueWithCurrency),
    (0xD4, PollEventCode::Empty, EventArity::None),
    (0xC2, PollEventCode::Emptying, EventArity::None),
    (0xC3, PollEventCode::SmartEmptying, EventArity::OneValueWithCurrency),
    (0xC4, PollEventCode::SmartEmptied, EventArity::OneValueWithCurrency),
    (0xD8, PollEventCode::IncompletePayout, EventArity::TwoValuesWithCurrency),
    (0xD9, PollEventCode::IncompleteFloat, EventArity::TwoValuesWithCurrency),
];

fn lookup(code: u8) -> (PollEventCode, EventArity) {
    POLL_EVENT_TABLE
        .iter()
        .find(|(b, _, _)| *b == code)
        .map(|(_, kind, arity)| (*kind, *arity))
        .unwrap_or((PollEventCode::Unknown(code), EventArity::None))
}

/// Table-driven parse of a `poll` response's variable-length event stream
/// (spec §4.2: "must be table-driven by event code because the payload
/// length varies").
pub fn decode_poll_events(data: &[u8]) -> Result<Vec<PollEvent>, SspError> {
    let mut events = Vec::new();
    let mut idx = 0;
    while idx < data.len() {
        let code = data[idx];
        idx += 1;
        let (kind, arity) = lookup(code);

        let (data1, data2, currency) = match arity {
            EventArity::None => (0, 0, [0u8; 3]),
            EventArity::OneByte => {
                let v = *data.get(idx).ok_or(SspError::Malformed("poll event truncated"))?;
                idx += 1;
                (v as u32, 0, [0u8; 3])
            }
            EventArity::OneValue => {
                let v = read_u32(data, &mut idx)?;
                (v, 0, [0u8; 3])
            }
            EventArity::OneValueWithCurrency => {
                let v = read_u32(data, &mut idx)?;
                let cc = read_cc(data, &mut idx)?;
                (v, 0, cc)
            }
            EventArity::TwoValuesWithCurrency => {
                let v1 = read_u32(data, &mut idx)?;
                let v2 = read_u32(data, &mut idx)?;
                let cc = read_cc(data, &mut idx)?;
                (v1, v2, cc)
            }
        };

        events.push(PollEvent { code: kind, data1, data2, currency });
    }
    Ok(events)
}

fn read_u32(data: &[u8], idx: &mut usize) -> Result<u32, SspError> {
    if *idx + 4 > data.len() {
        return Err(SspError::Malformed("poll event value truncated"));
    }
    let v = u32::from_le_bytes([data[*idx], data[*idx + 1], data[*idx + 2], data[*idx + 3]]);
    *idx += 4;
    Ok(v)
}

fn read_cc(data: &[u8], idx: &mut usize) -> Result<[u8; 3], SspError> {
    if *idx + 3 > data.len() {
        return Err(SspError::Malformed("poll event currency truncated"));
    }
    let mut cc = [0u8; 3];
    cc.copy_from_slice(&data[*idx..*idx + 3]);
    *idx += 3;
    Ok(cc)
}

/// SSP6 CRC-16, polynomial 0x8005, seeded with 0xFFFF, computed MSB-first
/// over every byte following STX up to (but excluding) the CRC field.
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ 0x8005;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_has_no_payload() {
        assert_eq!(Command::Sync.encode(), vec![command_byte::SYNC]);
    }

    #[test]
    fn set_inhibits_roundtrip_shape() {
        let cmd = Command::SetInhibits { low: 0x15, high: 0xFF };
        assert_eq!(cmd.encode(), vec![command_byte::SET_INHIBITS, 0x15, 0xFF]);
    }

    #[test]
    fn set_refill_mode_matches_fixed_literal() {
        let bytes = Command::SetRefillMode.encode();
        assert_eq!(bytes, vec![0x30, 0x81, 0x10, 0x11, 0x01, 0x01, 0x52, 0xF5]);
    }

    #[test]
    fn payout_amount_and_currency_encode_little_endian() {
        let cmd = Command::Payout { amount: 1000, currency: *b"EUR", option: PayoutOption::Do };
        let bytes = cmd.encode();
        assert_eq!(&bytes[1..5], &1000u32.to_le_bytes());
        assert_eq!(&bytes[5..8], b"EUR");
    }

    #[test]
    fn decode_setup_report_roundtrips_channel_values() {
        // unit_type, num_channels=2, two u16 values, two 3-byte currencies, protocol version
        let data = [
            0x03, 0x02, 0x05, 0x00, 0x0A, 0x00, b'E', b'U', b'R', b'E', b'U', b'R', 0x06,
        ];
        let report = decode_setup_report(&data).unwrap();
        assert_eq!(report.channel_data.len(), 2);
        assert_eq!(report.channel_data[0].value, 5);
        assert_eq!(report.channel_data[1].value, 10);
        assert_eq!(&report.channel_data[0].currency, b"EUR");
    }

    #[test]
    fn decode_poll_events_handles_mixed_arity() {
        let mut data = vec![0xF1]; // reset, no args
        data.push(0xEF); // read
        data.extend_from_slice(&3u32.to_le_bytes());
        data.push(0xD8); // incomplete payout
        data.extend_from_slice(&500u32.to_le_bytes());
        data.extend_from_slice(&1000u32.to_le_bytes());
        data.extend_from_slice(b"EUR");

        let events = decode_poll_events(&data).unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].code, PollEventCode::Reset);
        assert_eq!(events[1].code, PollEventCode::Read);
        assert_eq!(events[1].data1, 3);
        assert_eq!(events[2].code, PollEventCode::IncompletePayout);
        assert_eq!(events[2].data1, 500);
        assert_eq!(events[2].data2, 1000);
        assert_eq!(&events[2].currency, b"EUR");
    }

    #[test]
    fn payout_failure_codes_map_to_messages() {
        assert_eq!(PayoutFailure::from(0x03).message(), "smart payout busy");
        assert_eq!(PayoutFailure::from(0x04).message(), "smart payout disabled");
    }

    #[test]
    fn crc16_is_deterministic() {
        let a = crc16(b"hello");
        let b = crc16(b"hello");
        assert_eq!(a, b);
        assert_ne!(a, crc16(b"hellp"));
    }
}

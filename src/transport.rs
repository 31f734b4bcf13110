//! Frame-level I/O with the shared serial link (spec §4.1).
//!
//! Handles SSP framing (STX, length, sequence bit, CRC-16), byte-stuffing of
//! STX inside the payload, per-address sequence-bit toggling, retransmission
//! on framing errors, and the 1000ms per-exchange timeout. Encryption, when
//! a key has been negotiated for the address, wraps the payload in an
//! AES-128-CBC envelope with a per-address counter.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::time::{Duration, Instant};

use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use log::{debug, trace, warn};
use parking_lot::Mutex;
use serialport::TTYPort;

use crate::codec::{self, crypto::AesKey, ResponseStatus, STX};
use crate::error::TransportError;

/// Timeout for a single request/response exchange (spec §4.1).
pub const EXCHANGE_TIMEOUT_MS: u64 = 1000;
/// Default number of retransmissions on a framing error.
pub const DEFAULT_RETRY_LEVEL: u8 = 3;
/// Baud rate SSP6 communicates at (spec §6).
pub const BAUD_RATE: u32 = 9600;
/// Timeout for acquiring the serial port's mutex.
const LOCK_TIMEOUT_MS: u64 = 5_000;

const ENCRYPTED_COMMAND_BYTE: u8 = 0x7E;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

/// A decoded response: status byte plus whatever data followed it.
#[derive(Debug, Clone)]
pub struct SspResponse {
    pub status: ResponseStatus,
    pub data: Vec<u8>,
}

/// Anything the transport can write frames to and read frames from. Real
/// hardware uses [`serialport::TTYPort`]; tests substitute an in-memory
/// double.
pub trait SerialLink: Read + Write + Send {}
impl<T: Read + Write + Send> SerialLink for T {}

#[derive(Default)]
struct AddressState {
    sequence_set: bool,
    counter: u32,
}

/// Frame-level transport serializing access to the shared serial link
/// across both peripherals (spec §5: "serial link... never held across a
/// suspension point other than the 300ms wait between exchanges").
pub struct SspTransport {
    link: Mutex<Box<dyn SerialLink>>,
    state: Mutex<HashMap<u8, AddressState>>,
    retry_level: u8,
}

impl SspTransport {
    /// Opens `serial_path` as a character device at SSP6 line parameters.
    pub fn open(serial_path: &str) -> Result<Self, TransportError> {
        let port = serialport::new(serial_path, BAUD_RATE)
            .flow_control(serialport::FlowControl::None)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::Two)
            .timeout(Duration::from_millis(EXCHANGE_TIMEOUT_MS))
            .open_native()?;

        Ok(Self::from_link(Box::new(port)))
    }

    /// Builds a transport around an arbitrary link; used by tests and by
    /// [`Self::open`].
    pub fn from_link(link: Box<dyn SerialLink>) -> Self {
        Self {
            link: Mutex::new(link),
            state: Mutex::new(HashMap::new()),
            retry_level: DEFAULT_RETRY_LEVEL,
        }
    }

    /// Issues one request/response exchange with the device at `address`.
    ///
    /// When `key` is `Some`, the payload is wrapped in an encrypted
    /// envelope first. Retries (up to `retry_level`) are attempted on
    /// framing errors; the sequence bit only advances once a frame is
    /// acknowledged (spec §4.1: "Retries do not advance the sequence bit").
    pub fn exchange(
        &self,
        address: u8,
        payload: &[u8],
        key: Option<&AesKey>,
    ) -> Result<SspResponse, TransportError> {
        let seq_flag = {
            let state = self.state.lock();
            state.get(&address).map(|s| s.sequence_set).unwrap_or(false)
        };

        let wire_payload = match key {
            Some(key) => {
                let counter = {
                    let mut state = self.state.lock();
                    let entry = state.entry(address).or_default();
                    entry.counter = entry.counter.wrapping_add(1);
                    entry.counter
                };
                self.encrypt_payload(payload, key, counter)
            }
            None => payload.to_vec(),
        };

        let deadline = Instant::now() + Duration::from_millis(EXCHANGE_TIMEOUT_MS);
        let mut attempt = 0;
        let mut last_err = TransportError::Timeout(address);

        while attempt <= self.retry_level {
            if Instant::now() >= deadline {
                return Err(TransportError::Timeout(address));
            }

            match self.exchange_once(address, seq_flag, &wire_payload) {
                Ok(frame) => {
                    let mut state = self.state.lock();
                    let entry = state.entry(address).or_default();
                    entry.sequence_set = !seq_flag;

                    let status = ResponseStatus::from(*frame.first().unwrap_or(&0));
                    let mut data = frame.get(1..).unwrap_or(&[]).to_vec();

                    if status == ResponseStatus::KeyNotSet {
                        return Ok(SspResponse { status, data });
                    }

                    if let Some(key) = key {
                        data = self.decrypt_payload(&data, key)?;
                    }

                    return Ok(SspResponse { status, data });
                }
                Err(err) => {
                    warn!("ssp exchange with {address:#04x} attempt {attempt} failed: {err}");
                    last_err = err;
                    attempt += 1;
                }
            }
        }

        Err(last_err)
    }

    fn exchange_once(
        &self,
        address: u8,
        seq_flag: bool,
        payload: &[u8],
    ) -> Result<Vec<u8>, TransportError> {
        let frame = build_frame(address, seq_flag, payload);
        let mut link = self.link.lock();
        link.write_all(&frame)?;
        trace!("wrote {} bytes to address {address:#04x}", frame.len());
        read_frame(&mut *link, address)
    }

    fn encrypt_payload(&self, payload: &[u8], key: &AesKey, counter: u32) -> Vec<u8> {
        let mut inner = Vec::with_capacity(payload.len() + 8);
        inner.extend_from_slice(&(payload.len() as u16).to_le_bytes());
        inner.extend_from_slice(&counter.to_le_bytes());
        inner.extend_from_slice(payload);
        let crc = codec::crc16(&inner);
        inner.extend_from_slice(&crc.to_le_bytes());

        // PKCS7-style pad to a 16-byte boundary.
        let pad_len = 16 - (inner.len() % 16);
        inner.extend(std::iter::repeat(pad_len as u8).take(pad_len));

        let mut buf = inner;
        let encryptor = Aes128CbcEnc::new(key.into(), &[0u8; 16].into());
        let mut out = vec![0u8; buf.len()];
        out.copy_from_slice(&buf);
        let _ = encryptor.encrypt_padded_mut::<aes::cipher::block_padding::NoPadding>(
            &mut buf,
            buf.len(),
        );
        out.copy_from_slice(&buf);

        let mut wrapped = vec![ENCRYPTED_COMMAND_BYTE];
        wrapped.extend_from_slice(&out);
        wrapped
    }

    fn decrypt_payload(&self, data: &[u8], key: &AesKey) -> Result<Vec<u8>, TransportError> {
        if data.is_empty() {
            return Ok(Vec::new());
        }
        let mut buf = data.to_vec();
        if buf.len() % 16 != 0 {
            return Err(TransportError::ShortFrame);
        }
        let decryptor = Aes128CbcDec::new(key.into(), &[0u8; 16].into());
        decryptor
            .decrypt_padded_mut::<aes::cipher::block_padding::NoPadding>(&mut buf)
            .map_err(|_| TransportError::ShortFrame)?;

        if buf.len() < 8 {
            return Err(TransportError::ShortFrame);
        }
        let len = u16::from_le_bytes([buf[0], buf[1]]) as usize;
        if buf.len() < 6 + len + 2 {
            return Err(TransportError::ShortFrame);
        }
        Ok(buf[6..6 + len].to_vec())
    }
}

/// Stuffs any STX byte occurring inside `data` by doubling it, per SSP6
/// framing rules.
fn stuff(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    for &b in data {
        out.push(b);
        if b == STX {
            out.push(b);
        }
    }
    out
}

fn build_frame(address: u8, seq_flag: bool, payload: &[u8]) -> Vec<u8> {
    let addr_byte = if seq_flag { address | 0x80 } else { address & 0x7F };
    let mut body = vec![addr_byte, payload.len() as u8];
    body.extend_from_slice(payload);
    let crc = codec::crc16(&body);
    body.extend_from_slice(&crc.to_le_bytes());

    let mut frame = vec![STX];
    frame.extend(stuff(&body));
    frame
}

/// Reads and de-stuffs one frame, validating STX and CRC.
fn read_frame(link: &mut dyn SerialLink, address: u8) -> Result<Vec<u8>, TransportError> {
    let mut stx = [0u8; 1];
    link.read_exact(&mut stx)?;
    if stx[0] != STX {
        return Err(TransportError::InvalidStx(stx[0]));
    }

    let mut header = [0u8; 2];
    read_destuffed(link, &mut header)?;
    let len = header[1] as usize;

    let mut rest = vec![0u8; len + 2]; // data + CRC-16
    read_destuffed(link, &mut rest)?;

    let mut body = Vec::with_capacity(2 + rest.len());
    body.extend_from_slice(&header);
    body.extend_from_slice(&rest);

    let data_end = body.len() - 2;
    let crc_received = u16::from_le_bytes([body[data_end], body[data_end + 1]]);
    let crc_computed = codec::crc16(&body[..data_end]);
    if crc_received != crc_computed {
        return Err(TransportError::CrcFail(address));
    }

    debug!("read {} byte frame from {address:#04x}", body.len());
    Ok(body[2..data_end].to_vec())
}

/// Reads `out.len()` de-stuffed bytes, transparently consuming doubled STX
/// bytes the sender inserted.
fn read_destuffed(link: &mut dyn SerialLink, out: &mut [u8]) -> Result<(), TransportError> {
    let mut i = 0;
    while i < out.len() {
        let mut byte = [0u8; 1];
        link.read_exact(&mut byte)?;
        if byte[0] == STX {
            let mut stuffed = [0u8; 1];
            link.read_exact(&mut stuffed)?;
            if stuffed[0] != STX {
                return Err(TransportError::ShortFrame);
            }
        }
        out[i] = byte[0];
        i += 1;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    struct Loopback {
        written: Vec<u8>,
        to_read: Cursor<Vec<u8>>,
    }

    impl Read for Loopback {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.to_read.read(buf)
        }
    }

    impl Write for Loopback {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn response_frame(status: u8, data: &[u8]) -> Vec<u8> {
        let mut body = vec![0x00, (1 + data.len()) as u8, status];
        body.extend_from_slice(data);
        let crc = codec::crc16(&body);
        body.extend_from_slice(&crc.to_le_bytes());

        let mut out = vec![STX];
        out.extend_from_slice(&stuff(&body));
        out
    }

    #[test]
    fn stuffing_doubles_stx_bytes() {
        let data = [0x01, STX, 0x02];
        let stuffed = stuff(&data);
        assert_eq!(stuffed, vec![0x01, STX, STX, 0x02]);
    }

    #[test]
    fn exchange_decodes_ok_response() {
        let frame = response_frame(0xF0, &[]);
        let link = Loopback { written: Vec::new(), to_read: Cursor::new(frame) };
        let transport = SspTransport::from_link(Box::new(link));
        let resp = transport.exchange(0x00, &[0x11], None).unwrap();
        assert_eq!(resp.status, ResponseStatus::Ok);
        assert!(resp.data.is_empty());
    }

    #[test]
    fn exchange_surfaces_key_not_set_as_response_not_error() {
        let frame = response_frame(0xFA, &[]);
        let link = Loopback { written: Vec::new(), to_read: Cursor::new(frame) };
        let transport = SspTransport::from_link(Box::new(link));
        let resp = transport.exchange(0x00, &[0x11], None).unwrap();
        assert_eq!(resp.status, ResponseStatus::KeyNotSet);
    }

    #[test]
    fn sequence_bit_advances_after_successful_exchange() {
        let frame = response_frame(0xF0, &[]);
        let link = Loopback { written: Vec::new(), to_read: Cursor::new(frame) };
        let transport = SspTransport::from_link(Box::new(link));
        transport.exchange(0x10, &[0x11], None).unwrap();
        let state = transport.state.lock();
        assert!(state.get(&0x10).unwrap().sequence_set);
    }
}

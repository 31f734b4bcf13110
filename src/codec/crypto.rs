//! SSP6 encryption-negotiation subprotocol.
//!
//! Implements the Diffie-Hellman-style key exchange the SSP6 implementation
//! guide describes (§7, "Encrypted Commands"): the host and the device each
//! pick a generator/modulus pair, exchange intermediate keys, and derive a
//! shared 64-bit key which becomes the low 8 bytes of a 16-byte AES key (the
//! high 8 bytes being a host-chosen "fixed key" sent to the device once
//! negotiation succeeds).

use rand::RngCore;

/// A prime generator value, g, used in the key exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeneratorKey(u64);

/// A prime modulus value, n, smaller than the generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModulusKey(u64);

/// The host's random secret exponent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RandomKey(u64);

/// `generator^random mod modulus`, sent to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntermediateKey(u64);

/// The negotiated shared secret: `device_intermediate^random mod modulus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncryptionKey(u64);

/// A host-chosen 64-bit value folded into the high half of the AES key once
/// negotiation succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedKey(u64);

/// 16-byte AES-128 key used for encrypted command wrapping.
pub type AesKey = [u8; 16];

/// Device default encryption key (§3 of the spec): a well-known constant
/// used until a fresh negotiation replaces it.
pub const DEFAULT_KEY: u64 = 0x0123_4567_0123_4567;

fn mod_pow(mut base: u64, mut exp: u64, modulus: u64) -> u64 {
    if modulus == 1 {
        return 0;
    }
    let mut result: u128 = 1;
    let modulus = modulus as u128;
    base = base % modulus as u64;
    while exp > 0 {
        if exp & 1 == 1 {
            result = (result * base as u128) % modulus;
        }
        exp >>= 1;
        base = ((base as u128 * base as u128) % modulus) as u64;
    }
    result as u64
}

/// Small fixed list of primes large enough to give a non-trivial exchange
/// while keeping the arithmetic in 64-bit integers, as real SSP6
/// implementations do.
const CANDIDATE_PRIMES: &[u64] = &[
    0x7FFF_FFFF_FFFF_FFE7,
    0x7FFF_FFFF_FFFF_FFC5,
    0x7FFF_FFFF_FFFF_FF8D,
    0x7FFF_FFFF_FFFF_FF75,
];

fn random_u64() -> u64 {
    rand::thread_rng().next_u64()
}

impl GeneratorKey {
    pub fn from_entropy() -> Self {
        let idx = (random_u64() as usize) % CANDIDATE_PRIMES.len();
        Self(CANDIDATE_PRIMES[idx])
    }

    pub fn as_inner(&self) -> u64 {
        self.0
    }

    pub fn to_le_bytes(&self) -> [u8; 8] {
        self.0.to_le_bytes()
    }
}

impl ModulusKey {
    pub fn from_entropy() -> Self {
        let idx = (random_u64() as usize) % CANDIDATE_PRIMES.len();
        Self(CANDIDATE_PRIMES[idx].wrapping_sub(2))
    }

    pub fn as_inner(&self) -> u64 {
        self.0
    }

    pub fn to_le_bytes(&self) -> [u8; 8] {
        self.0.to_le_bytes()
    }
}

impl RandomKey {
    pub fn from_entropy() -> Self {
        Self(random_u64() | 1)
    }

    pub fn as_inner(&self) -> u64 {
        self.0
    }
}

impl IntermediateKey {
    /// Computes `generator^random mod modulus`.
    pub fn from_keys(generator: &GeneratorKey, random: &RandomKey, modulus: &ModulusKey) -> Self {
        Self(mod_pow(generator.0, random.0, modulus.0))
    }

    pub fn from_le_bytes(bytes: [u8; 8]) -> Self {
        Self(u64::from_le_bytes(bytes))
    }

    pub fn as_inner(&self) -> u64 {
        self.0
    }

    pub fn to_le_bytes(&self) -> [u8; 8] {
        self.0.to_le_bytes()
    }
}

impl EncryptionKey {
    /// Derives the shared secret from the device's intermediate key.
    pub fn from_keys(
        device_intermediate: &IntermediateKey,
        random: &RandomKey,
        modulus: &ModulusKey,
    ) -> Self {
        Self(mod_pow(device_intermediate.0, random.0, modulus.0))
    }

    pub fn as_inner(&self) -> u64 {
        self.0
    }
}

impl FixedKey {
    pub fn from_entropy() -> Self {
        Self(random_u64())
    }

    pub fn to_le_bytes(&self) -> [u8; 8] {
        self.0.to_le_bytes()
    }
}

impl Default for FixedKey {
    /// The well-known host fixed key real deployments hard-code rather
    /// than generate fresh per session (spec §3's `DEFAULT_KEY`).
    fn default() -> Self {
        Self(DEFAULT_KEY)
    }
}

/// Builds the 16-byte AES key from a fixed key (high bytes) and the
/// negotiated shared secret (low bytes), overwriting the low 8 bytes with
/// `enc_key` as [`crate::device_handle`]-style implementations do.
pub fn build_aes_key(fixed: &FixedKey, enc_key: &EncryptionKey) -> AesKey {
    let mut key = [0u8; 16];
    key[8..].copy_from_slice(&fixed.to_le_bytes());
    key[..8].copy_from_slice(&enc_key.as_inner().to_le_bytes());
    key
}

//! DES primitives for VNC Authentication.
//!
//! VNC uses single DES in ECB mode with a key built from the password's
//! first 8 bytes, each byte bit-reversed (LSB becomes MSB). The reversal
//! is a historical quirk of VNC's key schedule, not an endianness
//! artifact, and must be preserved for interoperability.
//!
//! DES is cryptographically obsolete; it survives here only because
//! RFC 6143 requires it. The helpers in this module limit the damage:
//! sensitive buffers are wiped, comparisons are constant-time, and the
//! response computation runs under a fixed minimum duration with jitter
//! so success and failure are not distinguishable by latency.

use std::future::Future;
use std::time::Duration;

use des::cipher::{BlockEncrypt, KeyInit};
use des::Des;
use rand::Rng;
use tokio::time::Instant;

use crate::error::{Result, RfbError};

/// Length of the server challenge in VNC Authentication.
pub const CHALLENGE_LEN: usize = 16;

/// Length of a DES key, and the number of significant password bytes.
pub const DES_KEY_LEN: usize = 8;

/// Bit-reversal lookup table: `REVERSE_BITS[b]` has the bits of `b` in
/// reverse order.
const REVERSE_BITS: [u8; 256] = [
    0x00, 0x80, 0x40, 0xc0, 0x20, 0xa0, 0x60, 0xe0, //
    0x10, 0x90, 0x50, 0xd0, 0x30, 0xb0, 0x70, 0xf0, //
    0x08, 0x88, 0x48, 0xc8, 0x28, 0xa8, 0x68, 0xe8, //
    0x18, 0x98, 0x58, 0xd8, 0x38, 0xb8, 0x78, 0xf8, //
    0x04, 0x84, 0x44, 0xc4, 0x24, 0xa4, 0x64, 0xe4, //
    0x14, 0x94, 0x54, 0xd4, 0x34, 0xb4, 0x74, 0xf4, //
    0x0c, 0x8c, 0x4c, 0xcc, 0x2c, 0xac, 0x6c, 0xec, //
    0x1c, 0x9c, 0x5c, 0xdc, 0x3c, 0xbc, 0x7c, 0xfc, //
    0x02, 0x82, 0x42, 0xc2, 0x22, 0xa2, 0x62, 0xe2, //
    0x12, 0x92, 0x52, 0xd2, 0x32, 0xb2, 0x72, 0xf2, //
    0x0a, 0x8a, 0x4a, 0xca, 0x2a, 0xaa, 0x6a, 0xea, //
    0x1a, 0x9a, 0x5a, 0xda, 0x3a, 0xba, 0x7a, 0xfa, //
    0x06, 0x86, 0x46, 0xc6, 0x26, 0xa6, 0x66, 0xe6, //
    0x16, 0x96, 0x56, 0xd6, 0x36, 0xb6, 0x76, 0xf6, //
    0x0e, 0x8e, 0x4e, 0xce, 0x2e, 0xae, 0x6e, 0xee, //
    0x1e, 0x9e, 0x5e, 0xde, 0x3e, 0xbe, 0x7e, 0xfe, //
    0x01, 0x81, 0x41, 0xc1, 0x21, 0xa1, 0x61, 0xe1, //
    0x11, 0x91, 0x51, 0xd1, 0x31, 0xb1, 0x71, 0xf1, //
    0x09, 0x89, 0x49, 0xc9, 0x29, 0xa9, 0x69, 0xe9, //
    0x19, 0x99, 0x59, 0xd9, 0x39, 0xb9, 0x79, 0xf9, //
    0x05, 0x85, 0x45, 0xc5, 0x25, 0xa5, 0x65, 0xe5, //
    0x15, 0x95, 0x55, 0xd5, 0x35, 0xb5, 0x75, 0xf5, //
    0x0d, 0x8d, 0x4d, 0xcd, 0x2d, 0xad, 0x6d, 0xed, //
    0x1d, 0x9d, 0x5d, 0xdd, 0x3d, 0xbd, 0x7d, 0xfd, //
    0x03, 0x83, 0x43, 0xc3, 0x23, 0xa3, 0x63, 0xe3, //
    0x13, 0x93, 0x53, 0xd3, 0x33, 0xb3, 0x73, 0xf3, //
    0x0b, 0x8b, 0x4b, 0xcb, 0x2b, 0xab, 0x6b, 0xeb, //
    0x1b, 0x9b, 0x5b, 0xdb, 0x3b, 0xbb, 0x7b, 0xfb, //
    0x07, 0x87, 0x47, 0xc7, 0x27, 0xa7, 0x67, 0xe7, //
    0x17, 0x97, 0x57, 0xd7, 0x37, 0xb7, 0x77, 0xf7, //
    0x0f, 0x8f, 0x4f, 0xcf, 0x2f, 0xaf, 0x6f, 0xef, //
    0x1f, 0x9f, 0x5f, 0xdf, 0x3f, 0xbf, 0x7f, 0xff, //
];

/// Reverses the bit order within a byte via table lookup.
pub fn reverse_bits(byte: u8) -> u8 {
    REVERSE_BITS[usize::from(byte)]
}

/// Builds the 8-byte DES key from a password: first 8 bytes, zero-padded,
/// each byte bit-reversed.
pub fn prepare_key(password: &[u8]) -> [u8; DES_KEY_LEN] {
    let mut key = [0u8; DES_KEY_LEN];
    for (slot, &byte) in key.iter_mut().zip(password.iter().take(DES_KEY_LEN)) {
        *slot = reverse_bits(byte);
    }
    key
}

/// Encrypts a 16-byte challenge with the VNC-derived DES key.
///
/// The two 8-byte halves are encrypted independently (ECB). The prepared
/// key material is wiped before returning.
pub fn encrypt_challenge(
    password: &[u8],
    challenge: &[u8; CHALLENGE_LEN],
) -> Result<[u8; CHALLENGE_LEN]> {
    const OP: &str = "des_encrypt_challenge";

    let mut key = prepare_key(password);
    let cipher = Des::new_from_slice(&key).map_err(|_| {
        secure_zero(&mut key);
        RfbError::authentication(OP, "failed to initialize DES cipher")
    })?;
    secure_zero(&mut key);

    let mut response = [0u8; CHALLENGE_LEN];
    for half in 0..2 {
        let range = half * DES_KEY_LEN..(half + 1) * DES_KEY_LEN;
        let mut block_bytes = [0u8; DES_KEY_LEN];
        block_bytes.copy_from_slice(&challenge[range.clone()]);
        let mut block = block_bytes.into();
        cipher.encrypt_block(&mut block);
        response[range].copy_from_slice(&block);
        secure_zero(&mut block_bytes);
    }

    Ok(response)
}

/// Compares two byte slices in constant time.
///
/// The run time depends only on the lengths; differing lengths return
/// false immediately, which leaks nothing beyond the length itself.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (&x, &y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Best-effort overwrite of sensitive bytes.
///
/// Volatile writes keep the compiler from eliding the wipe; this is a
/// boundary measure, not a guarantee against copies the allocator or OS
/// may have made.
pub fn secure_zero(buf: &mut [u8]) {
    for byte in buf.iter_mut() {
        // SAFETY: `byte` is a valid, aligned, exclusive reference.
        unsafe { std::ptr::write_volatile(byte, 0) };
    }
    std::sync::atomic::fence(std::sync::atomic::Ordering::SeqCst);
}

/// Runs a future and pads its wall-clock time to at least `base` plus a
/// small random jitter, equalizing success and failure latency.
pub(crate) async fn with_min_duration<T, F>(base: Duration, fut: F) -> T
where
    F: Future<Output = T>,
{
    let start = Instant::now();
    let out = fut.await;

    let elapsed = start.elapsed();
    if elapsed < base {
        let jitter_ceiling = (base.as_micros() as u64 / 10).max(1);
        let jitter = Duration::from_micros(rand::thread_rng().gen_range(0..jitter_ceiling));
        tokio::time::sleep(base - elapsed + jitter).await;
    }
    out
}

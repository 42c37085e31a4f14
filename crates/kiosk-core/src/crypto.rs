use crate::error::{KioskError, Result};
use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

pub const PBKDF2_ITERATIONS: u32 = 100_000;
pub const DIGEST_LEN: usize = 32;
pub const SALT_LEN: usize = 32;
pub const FALLBACK_ROUNDS: u32 = 10_000;

/// Derive the stored digest for `pin`: PBKDF2-HMAC-SHA256, 100k rounds,
/// 32 bytes rendered as lowercase hex.
pub fn derive(pin: &str, salt: &[u8]) -> String {
    derive_with_rounds(pin, salt, PBKDF2_ITERATIONS)
}

pub(crate) fn derive_with_rounds(pin: &str, salt: &[u8], rounds: u32) -> String {
    let mut out = Zeroizing::new([0u8; DIGEST_LEN]);
    pbkdf2_hmac::<Sha256>(pin.as_bytes(), salt, rounds, &mut out[..]);
    hex::encode(&out[..])
}

/// Weak iterated string hash written by devices that had no PBKDF2 available.
///
/// Not a KDF. Only used to check a digest that an older install already
/// persisted so it can be replaced with [`derive`]; new credentials are never
/// produced with it.
pub fn derive_fallback(pin: &str, salt: &[u8]) -> String {
    let seed = format!("{pin}{}", hex::encode(salt));
    let mut state: Vec<u16> = seed.encode_utf16().collect();
    for round in 0..FALLBACK_ROUNDS {
        let mut h: i32 = 0;
        for &unit in &state {
            h = h.wrapping_shl(5).wrapping_sub(h).wrapping_add(unit as i32);
        }
        let mut next: Vec<u16> = to_base36(h as i64).encode_utf16().collect();
        next.extend(to_base36(round as i64).encode_utf16());
        next.extend(state.iter().take(20));
        state = next;
    }
    String::from_utf16_lossy(&state)
}

/// PBKDF2 digests are always 64 hex chars; anything else came from
/// [`derive_fallback`].
pub fn is_fallback_digest(hash: &str) -> bool {
    !(hash.len() == DIGEST_LEN * 2 && hash.bytes().all(|b| b.is_ascii_hexdigit()))
}

pub fn generate_salt() -> Result<[u8; SALT_LEN]> {
    let mut salt = [0u8; SALT_LEN];
    OsRng
        .try_fill_bytes(&mut salt)
        .map_err(|e| KioskError::Crypto(format!("os rng: {e}")))?;
    Ok(salt)
}

pub fn digests_match(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

fn to_base36(value: i64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut n = value.unsigned_abs();
    let mut buf = Vec::new();
    while n > 0 {
        buf.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    if value < 0 {
        buf.push(b'-');
    }
    buf.reverse();
    String::from_utf8_lossy(&buf).into_owned()
}

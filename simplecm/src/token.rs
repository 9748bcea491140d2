//! Message tokens for outgoing messages.
//!
//! A token is 26 Crockford base32 characters: 48 bits of millisecond
//! timestamp followed by 80 random bits, so tokens sort by send time.

use rand::Rng;

const ALPHABET: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";
const TOKEN_LEN: usize = 26;
const TIME_CHARS: usize = 10;

/// Fresh token for a message sent at the current time.
pub fn message_token() -> String {
    let millis = chrono::Utc::now().timestamp_millis().max(0) as u64;
    let entropy: u128 = rand::thread_rng().r#gen::<u128>() & ((1u128 << 80) - 1);
    encode(millis, entropy)
}

fn encode(millis: u64, entropy: u128) -> String {
    let mut out = [0u8; TOKEN_LEN];

    let mut time = millis;
    for slot in out[..TIME_CHARS].iter_mut().rev() {
        *slot = ALPHABET[(time & 0x1f) as usize];
        time >>= 5;
    }

    let mut rest = entropy;
    for slot in out[TIME_CHARS..].iter_mut().rev() {
        *slot = ALPHABET[(rest & 0x1f) as usize];
        rest >>= 5;
    }

    out.iter().map(|&b| b as char).collect()
}

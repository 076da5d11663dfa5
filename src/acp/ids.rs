//! Short identifier generation.
//!
//! Used for `toolCallRequestID`, `externalCallID`, and lease-name suffixes.
//! The grammar matches the resource store's naming rule: first character in
//! `[a-z]`, remaining characters in `[a-z0-9]`. Randomness comes from
//! [`rand`]'s thread-local CSPRNG, never a predictable counter.

use rand::Rng;

const ALPHA: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const ALNUM: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Generate a random identifier of `len` characters satisfying the grammar above.
///
/// # Panics
///
/// Panics if `len == 0` — every call site needs at least one character.
pub fn generate_short_id(len: usize) -> String {
    assert!(len > 0, "short id length must be positive");
    let mut rng = rand::rng();
    let mut out = String::with_capacity(len);
    out.push(ALPHA[rng.random_range(0..ALPHA.len())] as char);
    for _ in 1..len {
        out.push(ALNUM[rng.random_range(0..ALNUM.len())] as char);
    }
    out
}

/// Seven-character id used for `toolCallRequestID` and `externalCallID`.
pub fn generate_tool_call_request_id() -> String {
    generate_short_id(7)
}

/// Fallback pod name when `POD_NAME` is unset: `acp-controller-manager-<8 chars>`.
pub fn generate_pod_name_suffix() -> String {
    generate_short_id(8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn grammar_holds_for_every_character() {
        for _ in 0..100 {
            let id = generate_short_id(7);
            assert_eq!(id.len(), 7);
            let mut chars = id.chars();
            let first = chars.next().unwrap();
            assert!(first.is_ascii_lowercase(), "first char {first} not a-z");
            for c in chars {
                assert!(
                    c.is_ascii_lowercase() || c.is_ascii_digit(),
                    "char {c} not a-z0-9"
                );
            }
        }
    }

    #[test]
    fn hundred_consecutive_outputs_have_no_duplicates() {
        let mut seen = HashSet::new();
        for _ in 0..100 {
            let id = generate_short_id(7);
            assert!(seen.insert(id), "duplicate short id generated");
        }
    }
}

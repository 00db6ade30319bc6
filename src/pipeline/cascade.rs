//! Pure helpers for the tier cascade: truncation and confidence aggregation.
//! Kept separate from the state machine so the rules in §3/§9 can be unit tested
//! without a KV store or a driver in hand.

/// Truncates `text` to at most `max_bytes` on a UTF-8 boundary. Returns the
/// possibly-truncated text, whether truncation occurred, and the original
/// (un-truncated) byte length.
pub fn truncate_for_emit(text: &str, max_bytes: usize) -> (String, bool, usize) {
    let original_len = text.len();
    if original_len <= max_bytes {
        return (text.to_string(), false, original_len);
    }
    let mut boundary = max_bytes;
    while boundary > 0 && !text.is_char_boundary(boundary) {
        boundary -= 1;
    }
    (text[..boundary].to_string(), true, original_len)
}

/// "Native if present, else validator" (§9, open question resolved).
/// `validator_confidence` is a mandatory field on `ValidatorVerdict`, never
/// absent, so there is no case along this call path where a heuristic
/// fallback is reachable — a validator that legitimately reports `0.0` must
/// be honored as `0.0`, not silently overridden by a guess.
pub fn aggregate_confidence(native_confidence: Option<f32>, validator_confidence: f32) -> f32 {
    native_confidence.unwrap_or(validator_confidence)
}

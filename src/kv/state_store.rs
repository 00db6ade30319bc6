//! Pending Validation State persistence, keyed `ocr:pending:{correlation_id}`.
//!
//! Single-writer semantics (§4.4): a resuming worker must `load` then `delete`.
//! We do this atomically with a Lua script (GET-then-DEL in one round trip) so two
//! workers racing on the same callback can never both succeed.

use anyhow::{Context, Result};
use redis::{AsyncCommands, Script};

use super::Kv;
use crate::models::PendingValidationState;

const KEY_PREFIX: &str = "ocr:pending:";
/// Sorted set of live correlation ids, scored by logical expiry (unix seconds).
/// This index is the source of truth for when the sweep should act; the key's
/// own Redis TTL is set longer, purely as a leak backstop, so a value is still
/// readable when the sweep (or a late callback) goes looking for it.
const INDEX_KEY: &str = "ocr:pending:index";

/// Atomically returns the value and deletes the key, or returns nil if absent.
const TAKE_SCRIPT: &str = r#"
local v = redis.call('GET', KEYS[1])
if v then
    redis.call('DEL', KEYS[1])
end
redis.call('ZREM', KEYS[2], ARGV[1])
return v
"#;

pub struct StateStore {
    kv: Kv,
}

impl StateStore {
    pub fn new(kv: Kv) -> Self {
        StateStore { kv }
    }

    fn key(correlation_id: &str) -> String {
        format!("{KEY_PREFIX}{correlation_id}")
    }

    pub async fn save(
        &self,
        correlation_id: &str,
        state: &PendingValidationState,
        ttl_secs: u64,
    ) -> Result<()> {
        let mut conn = self.kv.conn.clone();
        let payload = serde_json::to_string(state).context("serializing pending state")?;
        let expires_at = chrono::Utc::now().timestamp() + ttl_secs as i64;
        // The index's score is the *logical* TTL the sweep acts on. The key's own
        // Redis expiry is set to twice that as a pure safety net (§8 invariant: no
        // key leaked past 2x TTL) — it must never fire before the sweep (or a late
        // callback) has had a chance to read the value back, or the job's cursor
        // would be lost with no trace.
        redis::pipe()
            .set_ex(Self::key(correlation_id), payload, ttl_secs.saturating_mul(2).max(1))
            .zadd(INDEX_KEY, correlation_id, expires_at)
            .query_async::<()>(&mut conn)
            .await
            .context("state store save failed")?;
        Ok(())
    }

    /// Non-destructive read, used only by diagnostics; resumption must use
    /// [`Self::take`] for the single-writer guarantee.
    pub async fn load(&self, correlation_id: &str) -> Result<Option<PendingValidationState>> {
        let mut conn = self.kv.conn.clone();
        let raw: Option<String> = conn
            .get(Self::key(correlation_id))
            .await
            .context("state store load failed")?;
        raw.map(|s| serde_json::from_str(&s).context("deserializing pending state"))
            .transpose()
    }

    /// Load-then-delete in one atomic step. Returns `Ok(None)` when the key is
    /// already gone — the caller must treat that as "some other worker is
    /// handling this" and abandon the resumption rather than erroring.
    pub async fn take(&self, correlation_id: &str) -> Result<Option<PendingValidationState>> {
        let mut conn = self.kv.conn.clone();
        let raw: Option<String> = Script::new(TAKE_SCRIPT)
            .key(Self::key(correlation_id))
            .key(INDEX_KEY)
            .arg(correlation_id)
            .invoke_async(&mut conn)
            .await
            .context("state store take failed")?;
        raw.map(|s| serde_json::from_str(&s).context("deserializing pending state"))
            .transpose()
    }

    pub async fn delete(&self, correlation_id: &str) -> Result<()> {
        let mut conn = self.kv.conn.clone();
        redis::pipe()
            .del(Self::key(correlation_id))
            .zrem(INDEX_KEY, correlation_id)
            .query_async::<()>(&mut conn)
            .await
            .context("state store delete failed")?;
        Ok(())
    }

    /// Correlation ids whose expiry score has already passed. The sweep takes
    /// each candidate through the normal `take` path, so a key that already
    /// got a legitimate callback between the scan and the take is silently
    /// skipped (it's gone, `take` returns `None`).
    pub async fn expired_candidates(&self, now_unix: i64) -> Result<Vec<String>> {
        let mut conn = self.kv.conn.clone();
        let ids: Vec<String> = conn
            .zrangebyscore(INDEX_KEY, "-inf", now_unix)
            .await
            .context("state store index scan failed")?;
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_has_expected_prefix() {
        assert_eq!(StateStore::key("abc-123"), "ocr:pending:abc-123");
    }
}

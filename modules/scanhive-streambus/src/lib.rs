//! Stream Bus access layer (§4.3): the operations the core itself needs
//! against the append-only, consumer-group log used for producer→consumer
//! handoff. Workers read and write stream entries directly; this crate
//! never touches artifact payloads, only stream/group bookkeeping.

pub mod error;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use scanhive_common::{short_correlation_id, AssetId, ModuleName, ScanId};
use tracing::{debug, warn};

pub use error::StreamBusError;

/// Reserved field name a producer writes, with value `"true"`, on the
/// sentinel entry marking end-of-stream.
const EOS_FIELD: &str = "__eos__";
/// How many of the most recent entries to scan for the sentinel — the
/// marker is always the last entry written, but a small window tolerates a
/// handful of late, out-of-order consumer acks landing after it.
const EOS_SCAN_WINDOW: i64 = 8;

#[derive(Clone)]
pub struct StreamBus {
    conn: ConnectionManager,
}

impl StreamBus {
    pub async fn connect(redis_url: &str) -> Result<Self, StreamBusError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| StreamBusError::Infrastructure(e.to_string()))?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    /// Deterministic stream key for one asset's pipeline: §4.3's
    /// `scan:{short-correlation}:{asset_id}:{primary-producer-module}`.
    pub fn stream_key(scan_id: ScanId, asset_id: AssetId, producer: &ModuleName) -> String {
        format!(
            "scan:{}:{}:{}",
            short_correlation_id(scan_id),
            asset_id,
            producer.as_str()
        )
    }

    /// Deterministic consumer group name so a worker re-launch for the same
    /// `(module, stream)` rejoins the same group instead of starting a new
    /// cursor.
    pub fn consumer_group_name(module_name: &ModuleName, stream_key: &str) -> String {
        format!("cg:{module_name}:{stream_key}")
    }

    /// Idempotent: creates the stream (via `XGROUP CREATE ... MKSTREAM`) if
    /// it does not already exist, otherwise this is a no-op.
    pub async fn create_stream(&self, key: &str) -> Result<String, StreamBusError> {
        let mut conn = self.conn.clone();
        let result: redis::RedisResult<()> = conn
            .xgroup_create_mkstream(key, "scanhive-bootstrap", "$")
            .await;
        if let Err(err) = result {
            if !err.to_string().contains("BUSYGROUP") {
                return Err(err.into());
            }
        }
        Ok(key.to_string())
    }

    /// Ensures a named consumer group exists on an already-created stream.
    pub async fn ensure_group(&self, key: &str, group: &str) -> Result<(), StreamBusError> {
        let mut conn = self.conn.clone();
        let result: redis::RedisResult<()> = conn.xgroup_create(key, group, "$").await;
        if let Err(err) = result {
            if !err.to_string().contains("BUSYGROUP") {
                return Err(err.into());
            }
        }
        Ok(())
    }

    /// Number of entries delivered to `group` but not yet acknowledged.
    /// Advisory only (§4.3) — never used to infer completion.
    pub async fn pending_count(&self, stream_key: &str, group: &str) -> Result<i64, StreamBusError> {
        let mut conn = self.conn.clone();
        let reply: redis::streams::StreamPendingReply =
            conn.xpending(stream_key, group).await?;
        let count = match reply {
            redis::streams::StreamPendingReply::Data(data) => data.count,
            redis::streams::StreamPendingReply::Empty => 0,
        };
        Ok(count as i64)
    }

    pub async fn stream_length(&self, stream_key: &str) -> Result<i64, StreamBusError> {
        let mut conn = self.conn.clone();
        let len: i64 = conn.xlen(stream_key).await?;
        Ok(len)
    }

    /// Scans the last few entries for the producer's end-of-stream sentinel.
    /// Advisory progress signal only — never a completion signal (§4.3,
    /// §4.5.3). A stream that does not exist yet reports `false` rather
    /// than erroring, since a pipeline may check this before the producer
    /// has written anything.
    pub async fn completion_marker_present(&self, stream_key: &str) -> Result<bool, StreamBusError> {
        let mut conn = self.conn.clone();
        let reply: redis::RedisResult<redis::streams::StreamRangeReply> = conn
            .xrevrange_count(stream_key, "+", "-", EOS_SCAN_WINDOW as usize)
            .await;
        let reply = match reply {
            Ok(r) => r,
            Err(err) if err.to_string().contains("no such key") => return Ok(false),
            Err(err) => return Err(err.into()),
        };

        for entry in reply.ids {
            let has_marker = entry
                .map
                .get(EOS_FIELD)
                .map(|v| matches!(v, redis::Value::BulkString(b) if b == b"true"))
                .unwrap_or(false);
            if has_marker {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Best-effort per §4.3: invoked after terminal completion of every
    /// consumer job bound to this stream. Errors are logged, not
    /// propagated — a leftover stream key is harmless clutter, not a
    /// correctness problem.
    pub async fn delete_stream(&self, key: &str) {
        let mut conn = self.conn.clone();
        let result: redis::RedisResult<i64> = conn.del(key).await;
        match result {
            Ok(_) => debug!(stream = key, "stream deleted"),
            Err(err) => warn!(stream = key, error = %err, "failed to delete stream, leaving it behind"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn stream_key_follows_convention() {
        let scan_id = Uuid::new_v4();
        let asset_id = Uuid::new_v4();
        let producer = ModuleName::from("enumerator");
        let key = StreamBus::stream_key(scan_id, asset_id, &producer);
        assert!(key.starts_with("scan:"));
        assert!(key.contains(&asset_id.to_string()));
        assert!(key.ends_with("enumerator"));
    }

    #[test]
    fn consumer_group_name_is_deterministic() {
        let module = ModuleName::from("resolver");
        let key = "scan:abcd1234:asset:enumerator";
        let g1 = StreamBus::consumer_group_name(&module, key);
        let g2 = StreamBus::consumer_group_name(&module, key);
        assert_eq!(g1, g2);
        assert_ne!(
            g1,
            StreamBus::consumer_group_name(&ModuleName::from("prober"), key)
        );
    }

    /// Obtains a connected bus for integration tests, or skips when no test
    /// Redis instance is configured.
    async fn test_bus() -> Option<StreamBus> {
        let url = std::env::var("REDIS_TEST_URL").ok()?;
        StreamBus::connect(&url).await.ok()
    }

    #[tokio::test]
    async fn create_stream_is_idempotent() {
        let Some(bus) = test_bus().await else {
            return;
        };
        let key = format!("test:{}", Uuid::new_v4());
        bus.create_stream(&key).await.unwrap();
        bus.create_stream(&key).await.unwrap();
        let len = bus.stream_length(&key).await.unwrap();
        assert_eq!(len, 0);
        bus.delete_stream(&key).await;
    }

    #[tokio::test]
    async fn missing_stream_reports_no_completion_marker() {
        let Some(bus) = test_bus().await else {
            return;
        };
        let key = format!("test:{}", Uuid::new_v4());
        let present = bus.completion_marker_present(&key).await.unwrap();
        assert!(!present);
    }
}

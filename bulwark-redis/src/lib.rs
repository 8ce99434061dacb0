//! Redis counter store for `bulwark`'s sliding-window limiter (companion crate).
//!
//! Each limiter key is a sorted set of request members scored by their timestamp. One check is
//! a single `MULTI`/`EXEC` pipeline:
//!
//! ```text
//! ZREMRANGEBYSCORE key 0 <now - window>   (once a full window has elapsed)
//! ZCARD key
//! ZRANGE key 0 0 WITHSCORES
//! ZADD key <now> <member>
//! EXPIRE key <ceil(window / 1s)>
//! ```
//!
//! so concurrent instances sharing the server never both see room for the last slot.

use async_trait::async_trait;
use bulwark::rate_limit::{WindowRequest, WindowSnapshot, WindowStore};
use bulwark::StoreError;
use redis::aio::ConnectionManager;

#[derive(Clone)]
pub struct RedisWindowStore {
    conn: ConnectionManager,
}

impl std::fmt::Debug for RedisWindowStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisWindowStore").field("conn", &"<ConnectionManager>").finish()
    }
}

impl RedisWindowStore {
    /// Connect to `url` (e.g. `redis://127.0.0.1:6379/0`).
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(map_redis_error)?;
        let conn = ConnectionManager::new(client).await.map_err(map_redis_error)?;
        tracing::debug!(target: "bulwark::redis", "rate limit store connected");
        Ok(Self { conn })
    }

    /// Use an existing connection manager.
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl WindowStore for RedisWindowStore {
    async fn record(&self, request: WindowRequest<'_>) -> Result<WindowSnapshot, StoreError> {
        let mut conn = self.conn.clone();
        let (count, oldest): (u64, Vec<String>) =
            window_pipeline(&request).query_async(&mut conn).await.map_err(|e| {
                tracing::warn!(target: "bulwark::redis", key = request.key, error = %e, "rate limit pipeline failed");
                map_redis_error(e)
            })?;

        Ok(WindowSnapshot { count, oldest_ms: parse_oldest(&oldest)? })
    }
}

/// The atomic batch for one check. The trim is left out until a full window has elapsed.
fn window_pipeline(request: &WindowRequest<'_>) -> redis::Pipeline {
    let mut pipe = redis::pipe();
    pipe.atomic();
    if let Some(start) = request.window_start() {
        pipe.cmd("ZREMRANGEBYSCORE").arg(request.key).arg(0).arg(start).ignore();
    }
    pipe.cmd("ZCARD")
        .arg(request.key)
        .cmd("ZRANGE")
        .arg(request.key)
        .arg(0)
        .arg(0)
        .arg("WITHSCORES")
        .cmd("ZADD")
        .arg(request.key)
        .arg(request.now_ms)
        .arg(&request.member)
        .ignore()
        .cmd("EXPIRE")
        .arg(request.key)
        .arg(request.expiry_secs())
        .ignore();
    pipe
}

/// `ZRANGE ... WITHSCORES` answers `[member, score]`; the score is the timestamp.
fn parse_oldest(reply: &[String]) -> Result<Option<u64>, StoreError> {
    match reply {
        [] => Ok(None),
        [_member, score] => score
            .parse::<f64>()
            .map(|s| Some(s as u64))
            .map_err(|_| StoreError::Protocol(format!("non-numeric score {score:?}"))),
        other => Err(StoreError::Protocol(format!("expected [member, score], got {} items", other.len()))),
    }
}

fn map_redis_error(e: redis::RedisError) -> StoreError {
    if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout() {
        StoreError::Unavailable(e.to_string())
    } else {
        StoreError::Protocol(e.to_string())
    }
}

use redis::{aio::MultiplexedConnection, Client};
use tracing::info;

pub mod search;

/// Кеш поверх Redis. Используется только для результатов поиска событий;
/// счётчики билетов не кешируются никогда.
#[derive(Clone)]
pub struct CacheService {
    conn: MultiplexedConnection,
    search_ttl_seconds: u64,
}

impl CacheService {
    pub async fn connect(redis_url: &str, search_ttl_seconds: u64) -> redis::RedisResult<Self> {
        let client = Client::open(redis_url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        info!("Redis connected");
        Ok(Self { conn, search_ttl_seconds })
    }
}

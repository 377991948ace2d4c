use crate::cache::CacheService;
use redis::AsyncCommands;
use tracing::info;

pub const SEARCH_KEY_PATTERN: &str = "search:events:*";

impl CacheService {
    /// Получает закешированный результат поиска по ключу.
    pub async fn get_cached_search(&self, key: &str) -> Result<Option<String>, redis::RedisError> {
        let mut conn = self.conn.clone();
        conn.get(key).await
    }

    /// Сохраняет результат поиска в кеш на `SEARCH_CACHE_TTL_SECONDS`.
    pub async fn cache_search_result(&self, key: &str, value: &str) -> Result<(), redis::RedisError> {
        let mut conn = self.conn.clone();
        conn.set_ex(key, value, self.search_ttl_seconds).await
    }

    /// Сбрасывает все закешированные выборки (после создания события).
    pub async fn invalidate_searches(&self) -> Result<usize, redis::RedisError> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = redis::cmd("KEYS")
            .arg(SEARCH_KEY_PATTERN)
            .query_async(&mut conn)
            .await?;
        if !keys.is_empty() {
            let _: () = conn.del(&keys).await?;
            info!("Invalidated {} cached event searches", keys.len());
        }
        Ok(keys.len())
    }
}

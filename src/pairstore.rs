//! Durable bidirectional `(source_id, target_id)` lookup, one table per
//! configured channel pair and outgoing direction.

use sqlx::any::AnyPoolOptions;
use sqlx::{AnyPool, Row};

use crate::model::ChannelId;

/// `pair_<src>_<tgt>`, also used as the table name in the pair store.
pub fn pair_id(source_channel: ChannelId, target_channel: ChannelId) -> String {
    format!("pair_{}_{}", source_channel, target_channel)
}

#[derive(Clone)]
pub struct PairStore {
    pool: AnyPool,
}

impl PairStore {
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        sqlx::any::install_default_drivers();
        let pool = AnyPoolOptions::new().max_connections(5).connect(database_url).await?;
        Ok(PairStore { pool })
    }

    /// Idempotent. `pair_id` is always derived from configured channel ids,
    /// never from untrusted input, so it's safe to interpolate directly --
    /// table names can't be bound as query parameters.
    pub async fn create_table(&self, pair_id: &str) -> Result<(), sqlx::Error> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {pair_id} (source_id TEXT PRIMARY KEY, target_id TEXT NOT NULL, inserted_at INTEGER NOT NULL)"
        );
        sqlx::query(&sql).execute(&self.pool).await?;
        Ok(())
    }

    pub async fn add_pair(&self, pair_id: &str, source_id: &str, target_id: &str) -> bool {
        let sql = format!(
            "INSERT INTO {pair_id} (source_id, target_id, inserted_at) VALUES (?, ?, ?) \
             ON CONFLICT (source_id) DO UPDATE SET target_id = excluded.target_id, inserted_at = excluded.inserted_at"
        );
        let now = now_unix();
        sqlx::query(&sql)
            .bind(source_id)
            .bind(target_id)
            .bind(now)
            .execute(&self.pool)
            .await
            .map(|_| true)
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, pair_id, "failed to insert message pair");
                false
            })
    }

    pub async fn get_target(&self, pair_id: &str, source_id: &str) -> Option<String> {
        let sql = format!("SELECT target_id FROM {pair_id} WHERE source_id = ?");
        sqlx::query(&sql)
            .bind(source_id)
            .fetch_optional(&self.pool)
            .await
            .ok()
            .flatten()
            .and_then(|row| row.try_get::<String, _>("target_id").ok())
    }

    /// Used when the replied-to message was itself a mirror the bridge
    /// authored on this side -- the other direction's table owns the
    /// mapping back to the side it originated on.
    pub async fn get_source(&self, pair_id: &str, target_id: &str) -> Option<String> {
        let sql = format!("SELECT source_id FROM {pair_id} WHERE target_id = ?");
        sqlx::query(&sql)
            .bind(target_id)
            .fetch_optional(&self.pool)
            .await
            .ok()
            .flatten()
            .and_then(|row| row.try_get::<String, _>("source_id").ok())
    }

    pub async fn delete_pair(&self, pair_id: &str, source_id: &str) -> bool {
        let sql = format!("DELETE FROM {pair_id} WHERE source_id = ?");
        sqlx::query(&sql).bind(source_id).execute(&self.pool).await.is_ok()
    }

    /// Deletes rows older than `pair_lifetime_days` across every configured
    /// pair table. Invoked periodically by the orchestrator.
    pub async fn cleanup(&self, pair_ids: &[String], pair_lifetime_days: i64) {
        let cutoff = now_unix() - pair_lifetime_days * 86_400;
        for pair_id in pair_ids {
            let sql = format!("DELETE FROM {pair_id} WHERE inserted_at < ?");
            if let Err(e) = sqlx::query(&sql).bind(cutoff).execute(&self.pool).await {
                tracing::warn!(error = %e, pair_id, "pair store cleanup failed");
            }
        }
    }
}

fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_id_formats_as_pair_src_tgt() {
        assert_eq!(pair_id(ChannelId(1), ChannelId(2)), "pair_1_2");
    }

    #[tokio::test]
    async fn round_trips_a_pair_through_sqlite_memory() {
        let store = PairStore::connect("sqlite::memory:").await.unwrap();
        let pid = pair_id(ChannelId(1), ChannelId(2));
        store.create_table(&pid).await.unwrap();

        assert!(store.add_pair(&pid, "100", "200").await);
        assert_eq!(store.get_target(&pid, "100").await, Some("200".to_string()));
        assert_eq!(store.get_source(&pid, "200").await, Some("100".to_string()));

        assert!(store.delete_pair(&pid, "100").await);
        assert_eq!(store.get_target(&pid, "100").await, None);
    }

    #[tokio::test]
    async fn add_pair_replaces_existing_mapping_for_same_source() {
        let store = PairStore::connect("sqlite::memory:").await.unwrap();
        let pid = pair_id(ChannelId(1), ChannelId(2));
        store.create_table(&pid).await.unwrap();

        store.add_pair(&pid, "100", "200").await;
        store.add_pair(&pid, "100", "201").await;
        assert_eq!(store.get_target(&pid, "100").await, Some("201".to_string()));
    }
}

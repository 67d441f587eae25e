//! 异步 SQLite 持久化：检查点 + 长期记忆
//!
//! 使用 sqlx 提供完全异步的数据库操作，避免在 async 上下文中阻塞。
//! 需要启用 `async-sqlite` feature。检查点按追加写入，load 取最新一行（最后写入者胜出），
//! 旧行可用 cleanup_checkpoints 清理。

#[cfg(feature = "async-sqlite")]
mod sqlx_impl {
    use std::path::Path;

    use async_trait::async_trait;
    use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
    use sqlx::Row;

    use crate::core::AgentError;
    use crate::memory::{Checkpoint, CheckpointStore, LongTermMemory};

    fn db_err(e: sqlx::Error) -> AgentError {
        AgentError::Persistence(e.to_string())
    }

    /// SQLite 存储：同一个库里放检查点与长期记忆
    pub struct SqliteStore {
        pool: SqlitePool,
    }

    impl SqliteStore {
        /// 打开（不存在则创建）数据库并建表
        pub async fn new(db_path: impl AsRef<Path>) -> Result<Self, sqlx::Error> {
            let db_url = format!("sqlite:{}?mode=rwc", db_path.as_ref().display());

            let pool = SqlitePoolOptions::new()
                .max_connections(5)
                .connect(&db_url)
                .await?;

            let store = Self { pool };
            store.init_tables().await?;
            Ok(store)
        }

        /// 从连接池创建
        pub fn from_pool(pool: SqlitePool) -> Self {
            Self { pool }
        }

        async fn init_tables(&self) -> Result<(), sqlx::Error> {
            sqlx::query(
                "CREATE TABLE IF NOT EXISTS checkpoints (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    conversation_id TEXT NOT NULL,
                    version INTEGER NOT NULL,
                    state TEXT NOT NULL,
                    saved_at TEXT NOT NULL
                )",
            )
            .execute(&self.pool)
            .await?;

            sqlx::query(
                "CREATE INDEX IF NOT EXISTS idx_checkpoints_conversation ON checkpoints(conversation_id)",
            )
            .execute(&self.pool)
            .await?;

            sqlx::query(
                "CREATE TABLE IF NOT EXISTS memories (
                    id TEXT PRIMARY KEY,
                    namespace TEXT NOT NULL,
                    data TEXT NOT NULL,
                    created_at TEXT NOT NULL
                )",
            )
            .execute(&self.pool)
            .await?;

            sqlx::query("CREATE INDEX IF NOT EXISTS idx_memories_namespace ON memories(namespace)")
                .execute(&self.pool)
                .await?;

            Ok(())
        }

        /// 清理旧检查点（保留最近 n 个）
        pub async fn cleanup_checkpoints(
            &self,
            conversation_id: &str,
            keep_count: i64,
        ) -> Result<u64, sqlx::Error> {
            let result = sqlx::query(
                "DELETE FROM checkpoints WHERE conversation_id = ? AND id NOT IN (
                    SELECT id FROM checkpoints WHERE conversation_id = ? ORDER BY id DESC LIMIT ?
                )",
            )
            .bind(conversation_id)
            .bind(conversation_id)
            .bind(keep_count)
            .execute(&self.pool)
            .await?;

            Ok(result.rows_affected())
        }

        /// 关闭连接池
        pub async fn close(&self) {
            self.pool.close().await;
        }
    }

    #[async_trait]
    impl CheckpointStore for SqliteStore {
        async fn save(&self, conversation_id: &str, checkpoint: &Checkpoint) -> Result<(), AgentError> {
            sqlx::query(
                "INSERT INTO checkpoints (conversation_id, version, state, saved_at) VALUES (?, ?, ?, ?)",
            )
            .bind(conversation_id)
            .bind(checkpoint.version as i64)
            .bind(&checkpoint.state)
            .bind(&checkpoint.saved_at)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
            Ok(())
        }

        async fn load(&self, conversation_id: &str) -> Result<Option<Checkpoint>, AgentError> {
            let row = sqlx::query(
                "SELECT version, state, saved_at FROM checkpoints WHERE conversation_id = ? ORDER BY id DESC LIMIT 1",
            )
            .bind(conversation_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

            Ok(row.map(|row| {
                let version: i64 = row.get("version");
                Checkpoint {
                    conversation_id: conversation_id.to_string(),
                    version: version.max(0) as u64,
                    state: row.get("state"),
                    saved_at: row.get("saved_at"),
                }
            }))
        }
    }

    #[async_trait]
    impl LongTermMemory for SqliteStore {
        async fn put(&self, namespace: &str, text: &str) -> Result<String, AgentError> {
            let id = uuid::Uuid::new_v4().to_string();
            let now = chrono::Utc::now().to_rfc3339();
            sqlx::query("INSERT INTO memories (id, namespace, data, created_at) VALUES (?, ?, ?, ?)")
                .bind(&id)
                .bind(namespace)
                .bind(text.trim())
                .bind(&now)
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
            Ok(id)
        }

        async fn search(&self, namespace: &str, _query: &str) -> Result<Vec<String>, AgentError> {
            let rows = sqlx::query("SELECT data FROM memories WHERE namespace = ? ORDER BY created_at ASC")
                .bind(namespace)
                .fetch_all(&self.pool)
                .await
                .map_err(db_err)?;
            Ok(rows.into_iter().map(|r| r.get("data")).collect())
        }
    }
}

#[cfg(feature = "async-sqlite")]
pub use sqlx_impl::SqliteStore;

#[cfg(all(test, feature = "async-sqlite"))]
mod tests {
    use super::*;
    use crate::memory::{Checkpoint, CheckpointStore, LongTermMemory};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_checkpoint_round_trip_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("test.db");

        let store = SqliteStore::new(&db_path).await.unwrap();
        let cp1 = Checkpoint::capture("thread-5", 1, &vec!["a"]).unwrap();
        let cp2 = Checkpoint::capture("thread-5", 2, &vec!["a", "b"]).unwrap();
        store.save("thread-5", &cp1).await.unwrap();
        store.save("thread-5", &cp2).await.unwrap();
        store.close().await;

        let reopened = SqliteStore::new(&db_path).await.unwrap();
        assert_eq!(reopened.load("thread-5").await.unwrap(), Some(cp2));
        assert!(reopened.load("missing").await.unwrap().is_none());
        assert_eq!(reopened.cleanup_checkpoints("thread-5", 1).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_memories() {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::new(dir.path().join("m.db")).await.unwrap();
        store.put("memories/1", "我的名字叫gq").await.unwrap();
        store.put("memories/2", "other").await.unwrap();
        assert_eq!(store.search("memories/1", "").await.unwrap(), vec!["我的名字叫gq"]);
    }
}

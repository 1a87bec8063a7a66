//! Keypoint persistence.
//!
//! One row per `KeypointRecord`; the record itself is stored as JSON so the
//! optional world landmarks and segmentation masks round-trip unchanged.

use std::future::Future;
use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::{params, Connection};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::pose::KeypointRecord;

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS keypoints (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    video_id  TEXT    NOT NULL,
    timestamp REAL    NOT NULL,
    payload   TEXT    NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_keypoints_video_ts ON keypoints(video_id, timestamp);
";

/// 動画ごとのキーポイント列の保存先
pub trait KeypointStore: Send + Sync {
    fn has(&self, video_id: &str) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// タイムスタンプ順で返す
    fn get(&self, video_id: &str) -> impl Future<Output = Result<Vec<KeypointRecord>, StoreError>> + Send;

    /// 既存のレコードを消してから新しい列を書き込む（1トランザクション）
    fn replace_all(
        &self,
        video_id: &str,
        records: Vec<KeypointRecord>,
    ) -> impl Future<Output = Result<usize, StoreError>> + Send;

    /// 削除した件数を返す
    fn delete(&self, video_id: &str) -> impl Future<Output = Result<usize, StoreError>> + Send;

    fn count(&self, video_id: &str) -> impl Future<Output = Result<usize, StoreError>> + Send;

    /// キーポイントを持つ動画ID
    fn video_ids(&self) -> impl Future<Output = Result<Vec<String>, StoreError>> + Send;
}

/// SQLite によるキーポイントストア
///
/// rusqlite はブロッキングなので、各操作は `spawn_blocking` で実行する。
#[derive(Clone)]
pub struct SqliteKeypointStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteKeypointStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| StoreError::Task(e.to_string()))?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )?;
        info!(path = %path.display(), "keypoint store opened");
        Self::with_schema(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_schema(Connection::open_in_memory()?)
    }

    fn with_schema(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| StoreError::Task("connection mutex poisoned".to_string()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

impl KeypointStore for SqliteKeypointStore {
    async fn has(&self, video_id: &str) -> Result<bool, StoreError> {
        Ok(self.count(video_id).await? > 0)
    }

    async fn get(&self, video_id: &str) -> Result<Vec<KeypointRecord>, StoreError> {
        let video_id = video_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT payload FROM keypoints WHERE video_id = ?1 ORDER BY timestamp, id",
            )?;
            let rows = stmt.query_map(params![video_id], |row| row.get::<_, String>(0))?;
            let mut records = Vec::new();
            for payload in rows {
                records.push(serde_json::from_str(&payload?)?);
            }
            Ok(records)
        })
        .await
    }

    async fn replace_all(&self, video_id: &str, records: Vec<KeypointRecord>) -> Result<usize, StoreError> {
        let video_id = video_id.to_string();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let removed = tx.execute("DELETE FROM keypoints WHERE video_id = ?1", params![video_id])?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO keypoints (video_id, timestamp, payload) VALUES (?1, ?2, ?3)",
                )?;
                for mut record in records.iter().cloned() {
                    record.video_id.clone_from(&video_id);
                    let payload = serde_json::to_string(&record)?;
                    stmt.execute(params![video_id, record.timestamp, payload])?;
                }
            }
            tx.commit()?;
            debug!(video_id = %video_id, removed, inserted = records.len(), "keypoints replaced");
            Ok(records.len())
        })
        .await
    }

    async fn delete(&self, video_id: &str) -> Result<usize, StoreError> {
        let video_id = video_id.to_string();
        self.with_conn(move |conn| {
            let removed = conn.execute("DELETE FROM keypoints WHERE video_id = ?1", params![video_id])?;
            Ok(removed)
        })
        .await
    }

    async fn count(&self, video_id: &str) -> Result<usize, StoreError> {
        let video_id = video_id.to_string();
        self.with_conn(move |conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM keypoints WHERE video_id = ?1",
                params![video_id],
                |row| row.get(0),
            )?;
            Ok(n as usize)
        })
        .await
    }

    async fn video_ids(&self) -> Result<Vec<String>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT DISTINCT video_id FROM keypoints ORDER BY video_id")?;
            let ids = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ids)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::{Keypoint, KeypointIndex, Pose, SegmentationMask};

    fn record(video_id: &str, t: f64) -> KeypointRecord {
        let mut keypoints = [Keypoint::default(); KeypointIndex::COUNT];
        keypoints[0] = Keypoint::new(0.5, 0.5, t as f32);
        KeypointRecord {
            video_id: video_id.into(),
            timestamp: t,
            landmarks: vec![Pose::new(keypoints)],
            world_landmarks: None,
            segmentation_mask: None,
        }
    }

    #[tokio::test]
    async fn test_empty_store() {
        let store = SqliteKeypointStore::open_in_memory().unwrap();
        assert!(!store.has("v1").await.unwrap());
        assert!(store.get("v1").await.unwrap().is_empty());
        assert_eq!(store.delete("v1").await.unwrap(), 0);
        assert!(store.video_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_returns_timestamp_order() {
        let store = SqliteKeypointStore::open_in_memory().unwrap();
        let records = vec![record("v1", 0.6), record("v1", 0.0), record("v1", 0.2)];
        assert_eq!(store.replace_all("v1", records).await.unwrap(), 3);

        let got = store.get("v1").await.unwrap();
        let ts: Vec<f64> = got.iter().map(|r| r.timestamp).collect();
        assert_eq!(ts, vec![0.0, 0.2, 0.6]);
        assert!(store.has("v1").await.unwrap());
    }

    #[tokio::test]
    async fn test_replace_all_leaves_no_residue() {
        let store = SqliteKeypointStore::open_in_memory().unwrap();
        store
            .replace_all("v1", vec![record("v1", 0.0), record("v1", 0.2), record("v1", 0.4)])
            .await
            .unwrap();
        store.replace_all("v2", vec![record("v2", 1.0)]).await.unwrap();

        store
            .replace_all("v1", vec![record("v1", 0.0), record("v1", 0.2)])
            .await
            .unwrap();
        assert_eq!(store.count("v1").await.unwrap(), 2);
        assert_eq!(store.count("v2").await.unwrap(), 1);

        // 同じ内容で再処理しても重複しない
        store
            .replace_all("v1", vec![record("v1", 0.0), record("v1", 0.2)])
            .await
            .unwrap();
        assert_eq!(store.get("v1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_replace_all_normalizes_video_id() {
        let store = SqliteKeypointStore::open_in_memory().unwrap();
        store.replace_all("v1", vec![record("other", 0.0)]).await.unwrap();
        let got = store.get("v1").await.unwrap();
        assert_eq!(got[0].video_id, "v1");
        assert!(!store.has("other").await.unwrap());
    }

    #[tokio::test]
    async fn test_record_round_trip_with_optionals() {
        let store = SqliteKeypointStore::open_in_memory().unwrap();
        let mut rec = record("v1", 0.4);
        rec.segmentation_mask = Some(SegmentationMask {
            width: 1,
            height: 2,
            data: vec![0.25, 0.75],
        });
        store.replace_all("v1", vec![rec.clone()]).await.unwrap();
        assert_eq!(store.get("v1").await.unwrap(), vec![rec]);
    }

    #[tokio::test]
    async fn test_delete_and_list() {
        let store = SqliteKeypointStore::open_in_memory().unwrap();
        store.replace_all("b", vec![record("b", 0.0)]).await.unwrap();
        store
            .replace_all("a", vec![record("a", 0.0), record("a", 1.0)])
            .await
            .unwrap();
        assert_eq!(store.video_ids().await.unwrap(), vec!["a".to_string(), "b".to_string()]);

        assert_eq!(store.delete("a").await.unwrap(), 2);
        assert!(!store.has("a").await.unwrap());
        assert_eq!(store.video_ids().await.unwrap(), vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn test_replace_with_empty_clears() {
        let store = SqliteKeypointStore::open_in_memory().unwrap();
        store.replace_all("v1", vec![record("v1", 0.0)]).await.unwrap();
        assert_eq!(store.replace_all("v1", Vec::new()).await.unwrap(), 0);
        assert!(!store.has("v1").await.unwrap());
    }
}

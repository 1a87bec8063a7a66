//! Typed failure reasons surfaced by the library.

/// 動画ソースのエラー
#[derive(Debug, thiserror::Error)]
pub enum VideoError {
    #[error("video is not ready: dimensions unknown")]
    NotReady,

    #[error("failed to seek to {time:.3}s: {reason}")]
    Seek { time: f64, reason: String },

    #[error("failed to read frame: {0}")]
    Read(String),
}

/// 姿勢推定アダプタのエラー
#[derive(Debug, thiserror::Error)]
pub enum EstimatorError {
    #[error("pose estimator unavailable: {0}")]
    Unavailable(String),

    #[error("detector timestamp went backwards: {timestamp_ms}ms < {last_ms}ms")]
    NonMonotonicTimestamp { timestamp_ms: f64, last_ms: f64 },

    #[error("detector timestamp must be positive, got {0}ms")]
    InvalidTimestamp(f64),

    #[error("detection failed: {0}")]
    Detection(String),
}

/// キーポイントストアのエラー
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("record serialization: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("store task failed: {0}")]
    Task(String),
}

/// フレーム抽出パイプラインのエラー（1フレームの検出失敗はここに来ない）
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("video is not loaded")]
    NotReady,

    #[error("invalid extraction request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Video(#[from] VideoError),

    #[error(transparent)]
    Estimator(#[from] EstimatorError),

    #[error("processing cancelled")]
    Cancelled,
}

/// 抽出＋保存のエラー
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error("failed to persist keypoints: {0}")]
    Store(#[from] StoreError),
}

//! Frame extraction: walk a video at a fixed sampling rate and collect the
//! detected poses as a timestamp-ordered keypoint sequence.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{EstimatorError, ExtractError, ProcessError};
use crate::pose::{KeypointRecord, PoseEstimator, PoseRuntime};
use crate::store::KeypointStore;
use crate::video::VideoSource;

/// デフォルトの推定レート (Hz)
pub const DEFAULT_SAMPLE_RATE_HZ: f64 = 5.0;

/// 検出器に渡すタイムスタンプの下限 (ms)
pub const MIN_DETECTOR_TIMESTAMP_MS: f64 = 1.0;

/// 抽出のパラメータ
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractRequest {
    pub video_id: String,
    /// 開始位置（秒）
    pub start_time: f64,
    /// 終了位置（秒、含まない）。None なら動画の最後まで
    pub end_time: Option<f64>,
    pub sample_rate_hz: f64,
}

impl ExtractRequest {
    pub fn new(video_id: impl Into<String>) -> Self {
        Self {
            video_id: video_id.into(),
            start_time: 0.0,
            end_time: None,
            sample_rate_hz: DEFAULT_SAMPLE_RATE_HZ,
        }
    }

    pub fn with_range(mut self, start_time: f64, end_time: Option<f64>) -> Self {
        self.start_time = start_time;
        self.end_time = end_time;
        self
    }

    pub fn with_sample_rate(mut self, sample_rate_hz: f64) -> Self {
        self.sample_rate_hz = sample_rate_hz;
        self
    }
}

/// 進捗 (処理済み / 予定数)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub processed: usize,
    pub total: usize,
}

impl Progress {
    /// 0.0〜1.0。予定数0なら完了扱い
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.processed as f64 / self.total as f64
        }
    }
}

/// [start, end) を 1/rate 間隔で区切ったときのサンプル数
///
/// 範囲か周期が有限でなければ 0。
pub fn sample_count(start: f64, end: f64, sample_rate_hz: f64) -> usize {
    if !(end > start) || !(sample_rate_hz > 0.0) {
        return 0;
    }
    // 浮動小数の誤差で1つ余計に数えないよう僅かに引く
    let count = ((end - start) * sample_rate_hz - 1e-9).ceil();
    if !count.is_finite() {
        return 0;
    }
    count.max(0.0) as usize
}

/// [start, end) を 1/rate 間隔で区切った時刻列（遅延評価）
pub fn sample_instants(start: f64, end: f64, sample_rate_hz: f64) -> impl Iterator<Item = f64> {
    (0..sample_count(start, end, sample_rate_hz)).map(move |i| start + i as f64 / sample_rate_hz)
}

/// 再生時刻を検出器用のタイムスタンプ (ms) に変換する
///
/// 0以下の時刻は下限に引き上げ、前回の実行の最後 `base_ms` より後ろにずらす。
/// レコードに保存するのは元の再生時刻のほう。
pub fn detector_timestamp_ms(base_ms: f64, instant: f64) -> f64 {
    base_ms + (instant * 1000.0).max(MIN_DETECTOR_TIMESTAMP_MS)
}

/// 動画から姿勢を抽出する
///
/// 1フレームの検出失敗はログに残して次へ進む。シーク・読み込みの失敗と
/// 推定器の初期化失敗だけが全体を中断する。キャンセルされた場合は
/// 実行中の検出を待ってから途中結果を捨てて `Cancelled` を返す。
pub async fn extract<V, R, P>(
    video: &mut V,
    estimator: &PoseEstimator<R>,
    request: &ExtractRequest,
    cancel: &CancellationToken,
    mut on_progress: P,
) -> Result<Vec<KeypointRecord>, ExtractError>
where
    V: VideoSource,
    R: PoseRuntime,
    P: FnMut(Progress),
{
    let metadata = video.metadata().ok_or(ExtractError::NotReady)?;
    if metadata.width == 0 || metadata.height == 0 {
        return Err(ExtractError::NotReady);
    }
    if !(request.sample_rate_hz > 0.0) || !request.sample_rate_hz.is_finite() {
        return Err(ExtractError::InvalidRequest(format!(
            "sample rate must be positive, got {}",
            request.sample_rate_hz
        )));
    }
    if !(request.start_time >= 0.0) {
        return Err(ExtractError::InvalidRequest(format!(
            "start time must be non-negative, got {}",
            request.start_time
        )));
    }

    let end_time = request
        .end_time
        .map_or(metadata.duration, |end| end.min(metadata.duration));
    if !end_time.is_finite() {
        return Err(ExtractError::InvalidRequest(format!(
            "end of range must be finite (duration {}, end {:?})",
            metadata.duration, request.end_time
        )));
    }
    let total = sample_count(request.start_time, end_time, request.sample_rate_hz);

    info!(
        video_id = %request.video_id,
        start = request.start_time,
        end = end_time,
        rate = request.sample_rate_hz,
        samples = total,
        "extraction started"
    );

    estimator.initialize().await?;
    let base_ms = estimator.last_timestamp_ms().await.unwrap_or(0.0);

    let mut records = Vec::new();
    let mut failures = 0usize;

    if total == 0 {
        on_progress(Progress { processed: 0, total });
    }

    let instants = sample_instants(request.start_time, end_time, request.sample_rate_hz);
    for (i, instant) in instants.enumerate() {
        if cancel.is_cancelled() {
            info!(video_id = %request.video_id, processed = i, "extraction cancelled");
            return Err(ExtractError::Cancelled);
        }

        video.seek(instant).await?;
        let frame = video.capture_frame()?;

        let timestamp_ms = detector_timestamp_ms(base_ms, instant);
        match estimator.detect(&frame, timestamp_ms).await {
            Ok(result) => match KeypointRecord::from_result(&request.video_id, instant, result) {
                Some(record) => records.push(record),
                None => debug!(instant, "no pose detected"),
            },
            Err(EstimatorError::Detection(reason)) => {
                failures += 1;
                warn!(video_id = %request.video_id, instant, error = %reason, "detection failed, skipping frame");
            }
            Err(e) => return Err(e.into()),
        }

        on_progress(Progress {
            processed: i + 1,
            total,
        });
    }

    if cancel.is_cancelled() {
        return Err(ExtractError::Cancelled);
    }

    info!(
        video_id = %request.video_id,
        records = records.len(),
        failures,
        "extraction finished"
    );
    Ok(records)
}

/// 抽出してストアの内容を置き換える。保存したレコード数を返す。
pub async fn process_video<V, R, S, P>(
    video: &mut V,
    estimator: &PoseEstimator<R>,
    store: &S,
    request: &ExtractRequest,
    cancel: &CancellationToken,
    on_progress: P,
) -> Result<usize, ProcessError>
where
    V: VideoSource,
    R: PoseRuntime,
    S: KeypointStore,
    P: FnMut(Progress),
{
    let records = extract(video, estimator, request, cancel, on_progress).await?;
    let saved = store.replace_all(&request.video_id, records).await?;
    info!(video_id = %request.video_id, saved, "keypoints persisted");
    Ok(saved)
}

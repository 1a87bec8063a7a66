use std::future::Future;

use tokio::sync::Mutex;
use tracing::{debug, info};

use super::record::PoseResult;
use crate::config::{EstimatorConfig, RunningMode};
use crate::error::EstimatorError;
use crate::video::Frame;

/// 外部の姿勢推定ランタイム（モデルの読み込み）
pub trait PoseRuntime: Send + Sync {
    type Model: PoseModel;

    fn load(
        &self,
        config: &EstimatorConfig,
    ) -> impl Future<Output = Result<Self::Model, EstimatorError>> + Send;
}

/// 読み込み済みの姿勢推定モデル
///
/// 動画モードのモデルは内部に時系列の追跡状態を持つため、
/// 呼び出しは1つずつ、タイムスタンプは単調非減少でなければならない。
pub trait PoseModel: Send {
    fn detect_for_video(
        &mut self,
        frame: &Frame,
        timestamp_ms: f64,
    ) -> impl Future<Output = Result<PoseResult, EstimatorError>> + Send;
}

struct State<M> {
    config: EstimatorConfig,
    model: Option<M>,
    last_timestamp_ms: Option<f64>,
}

/// 姿勢推定アダプタ
///
/// 初期化と検出はすべて1つの Mutex で直列化される。tokio の Mutex は
/// 待機した順（FIFO）にロックを渡すので、同時に来た `detect` は到着順に
/// 1件ずつ処理され、実行中の初期化は後続の呼び出しが待って共有する。
pub struct PoseEstimator<R: PoseRuntime> {
    runtime: R,
    state: Mutex<State<R::Model>>,
}

impl<R: PoseRuntime> PoseEstimator<R> {
    pub fn new(runtime: R, config: EstimatorConfig) -> Self {
        Self {
            runtime,
            state: Mutex::new(State {
                config,
                model: None,
                last_timestamp_ms: None,
            }),
        }
    }

    /// モデルを読み込む（読み込み済みなら何もしない）
    pub async fn initialize(&self) -> Result<(), EstimatorError> {
        let mut state = self.state.lock().await;
        self.ensure_loaded(&mut state).await
    }

    pub async fn is_initialized(&self) -> bool {
        self.state.lock().await.model.is_some()
    }

    /// 最後に受け付けた検出用タイムスタンプ (ms)
    pub async fn last_timestamp_ms(&self) -> Option<f64> {
        self.state.lock().await.last_timestamp_ms
    }

    /// 設定を差し替える。現在のモデルは破棄され、次回使用時に再読み込みされる。
    pub async fn reconfigure(&self, config: EstimatorConfig) {
        let mut state = self.state.lock().await;
        info!(num_poses = config.num_poses, "pose estimator reconfigured");
        state.config = config;
        state.model = None;
        state.last_timestamp_ms = None;
    }

    /// 1フレームの姿勢を検出する
    ///
    /// 動画モードでは `timestamp_ms` は正の値で、前回以上でなければならない。
    pub async fn detect(&self, frame: &Frame, timestamp_ms: f64) -> Result<PoseResult, EstimatorError> {
        let mut state = self.state.lock().await;
        self.ensure_loaded(&mut state).await?;

        if state.config.running_mode == RunningMode::Video {
            if !(timestamp_ms > 0.0) || !timestamp_ms.is_finite() {
                return Err(EstimatorError::InvalidTimestamp(timestamp_ms));
            }
            if let Some(last_ms) = state.last_timestamp_ms {
                if timestamp_ms < last_ms {
                    return Err(EstimatorError::NonMonotonicTimestamp { timestamp_ms, last_ms });
                }
            }
        }

        let State {
            model,
            last_timestamp_ms,
            ..
        } = &mut *state;
        let model = model
            .as_mut()
            .ok_or_else(|| EstimatorError::Unavailable("model not loaded".to_string()))?;

        *last_timestamp_ms = Some(timestamp_ms);
        let result = model.detect_for_video(frame, timestamp_ms).await;
        debug!(timestamp_ms, ok = result.is_ok(), "detect");
        result
    }

    async fn ensure_loaded(&self, state: &mut State<R::Model>) -> Result<(), EstimatorError> {
        if state.model.is_some() {
            return Ok(());
        }
        info!(model = %state.config.model_path, "loading pose model");
        let model = self.runtime.load(&state.config).await.map_err(|e| match e {
            EstimatorError::Unavailable(_) => e,
            other => EstimatorError::Unavailable(other.to_string()),
        })?;
        state.model = Some(model);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{blank_frame, FakeRuntime};
    use assert_matches::assert_matches;
    use futures::future::join_all;

    fn estimator(runtime: FakeRuntime) -> PoseEstimator<FakeRuntime> {
        PoseEstimator::new(runtime, EstimatorConfig::default())
    }

    #[tokio::test]
    async fn test_concurrent_initialize_loads_once() {
        let runtime = FakeRuntime::new();
        let loads = runtime.loads.clone();
        let est = estimator(runtime);

        let results = join_all((0..5).map(|_| est.initialize())).await;
        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(loads.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert!(est.is_initialized().await);

        est.initialize().await.unwrap();
        assert_eq!(loads.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_detect_lazily_initializes() {
        let runtime = FakeRuntime::new();
        let loads = runtime.loads.clone();
        let est = estimator(runtime);

        let result = est.detect(&blank_frame(), 200.0).await.unwrap();
        assert_eq!(result.landmarks.len(), 1);
        assert_eq!(loads.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_detect_is_serialized_in_order() {
        let runtime = FakeRuntime::new();
        let log = runtime.log.clone();
        let est = estimator(runtime);
        est.initialize().await.unwrap();

        let frame = blank_frame();
        let timestamps = [100.0, 200.0, 300.0, 400.0, 500.0];
        let results = join_all(timestamps.iter().map(|&ts| est.detect(&frame, ts))).await;
        assert!(results.iter().all(|r| r.is_ok()));

        let log = log.lock().unwrap();
        assert_eq!(log.calls, timestamps.to_vec());
        assert_eq!(log.max_in_flight, 1);
    }

    #[tokio::test]
    async fn test_equal_timestamps_are_accepted() {
        let est = estimator(FakeRuntime::new());
        let frame = blank_frame();
        for _ in 0..3 {
            assert!(est.detect(&frame, 200.0).await.is_ok());
        }
        assert_eq!(est.last_timestamp_ms().await, Some(200.0));
    }

    #[tokio::test]
    async fn test_decreasing_timestamp_is_rejected() {
        let est = estimator(FakeRuntime::new());
        let frame = blank_frame();
        est.detect(&frame, 400.0).await.unwrap();

        let err = est.detect(&frame, 200.0).await.unwrap_err();
        assert_matches!(err, EstimatorError::NonMonotonicTimestamp { timestamp_ms, last_ms }
            if timestamp_ms == 200.0 && last_ms == 400.0);
        assert_eq!(est.last_timestamp_ms().await, Some(400.0));
    }

    #[tokio::test]
    async fn test_non_positive_timestamp_is_rejected() {
        let est = estimator(FakeRuntime::new());
        let err = est.detect(&blank_frame(), 0.0).await.unwrap_err();
        assert_matches!(err, EstimatorError::InvalidTimestamp(_));
    }

    #[tokio::test]
    async fn test_image_mode_skips_timestamp_checks() {
        let config = EstimatorConfig {
            running_mode: RunningMode::Image,
            ..Default::default()
        };
        let est = PoseEstimator::new(FakeRuntime::new(), config);
        let frame = blank_frame();
        est.detect(&frame, 500.0).await.unwrap();
        assert!(est.detect(&frame, 100.0).await.is_ok());
    }

    #[tokio::test]
    async fn test_failed_load_reports_unavailable() {
        let est = estimator(FakeRuntime::failing());
        assert_matches!(est.initialize().await, Err(EstimatorError::Unavailable(_)));
        assert_matches!(
            est.detect(&blank_frame(), 100.0).await,
            Err(EstimatorError::Unavailable(_))
        );
        assert!(!est.is_initialized().await);
    }

    #[tokio::test]
    async fn test_reconfigure_forces_reload() {
        let runtime = FakeRuntime::new();
        let loads = runtime.loads.clone();
        let est = estimator(runtime);
        est.detect(&blank_frame(), 900.0).await.unwrap();

        est.reconfigure(EstimatorConfig {
            num_poses: 2,
            output_segmentation_masks: true,
            ..Default::default()
        })
        .await;
        assert!(!est.is_initialized().await);
        assert_eq!(est.last_timestamp_ms().await, None);

        est.detect(&blank_frame(), 100.0).await.unwrap();
        assert_eq!(loads.load(std::sync::atomic::Ordering::SeqCst), 2);
    }
}

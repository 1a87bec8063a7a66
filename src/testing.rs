//! Scripted collaborators for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::EstimatorConfig;
use crate::error::{EstimatorError, VideoError};
use crate::pose::{Pose, PoseModel, PoseResult, PoseRuntime};
use crate::video::{Frame, VideoMetadata, VideoSource};

pub fn blank_frame() -> Frame {
    Frame::new(4, 4)
}

pub fn one_pose() -> PoseResult {
    PoseResult {
        landmarks: vec![Pose::default()],
        ..Default::default()
    }
}

type Responder = Arc<dyn Fn(f64) -> Result<PoseResult, EstimatorError> + Send + Sync>;

#[derive(Debug, Default)]
pub struct CallLog {
    /// 検出に渡されたタイムスタンプ (ms)
    pub calls: Vec<f64>,
    pub max_in_flight: usize,
}

pub struct FakeRuntime {
    pub loads: Arc<AtomicUsize>,
    pub log: Arc<Mutex<CallLog>>,
    fail: bool,
    respond: Responder,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::responding(|_| Ok(one_pose()))
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    pub fn responding<F>(respond: F) -> Self
    where
        F: Fn(f64) -> Result<PoseResult, EstimatorError> + Send + Sync + 'static,
    {
        Self {
            loads: Arc::new(AtomicUsize::new(0)),
            log: Arc::new(Mutex::new(CallLog::default())),
            fail: false,
            respond: Arc::new(respond),
        }
    }
}

pub struct FakeModel {
    log: Arc<Mutex<CallLog>>,
    in_flight: Arc<AtomicUsize>,
    respond: Responder,
}

impl PoseRuntime for FakeRuntime {
    type Model = FakeModel;

    async fn load(&self, _config: &EstimatorConfig) -> Result<FakeModel, EstimatorError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        if self.fail {
            return Err(EstimatorError::Detection("model asset missing".to_string()));
        }
        Ok(FakeModel {
            log: self.log.clone(),
            in_flight: Arc::new(AtomicUsize::new(0)),
            respond: self.respond.clone(),
        })
    }
}

impl PoseModel for FakeModel {
    async fn detect_for_video(&mut self, _frame: &Frame, timestamp_ms: f64) -> Result<PoseResult, EstimatorError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut log = self.log.lock().unwrap();
            log.calls.push(timestamp_ms);
            log.max_in_flight = log.max_in_flight.max(now);
        }
        tokio::task::yield_now().await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        (self.respond)(timestamp_ms)
    }
}

/// シーク位置を記録するだけの動画
pub struct FakeVideo {
    pub metadata: Option<VideoMetadata>,
    pub seeks: Vec<f64>,
    /// この回数目のシークで失敗する
    pub fail_seek_at: Option<usize>,
}

impl FakeVideo {
    pub fn with_duration(duration: f64) -> Self {
        Self {
            metadata: Some(VideoMetadata {
                width: 64,
                height: 48,
                duration,
            }),
            seeks: Vec::new(),
            fail_seek_at: None,
        }
    }

    pub fn unloaded() -> Self {
        Self {
            metadata: None,
            seeks: Vec::new(),
            fail_seek_at: None,
        }
    }
}

impl VideoSource for FakeVideo {
    fn metadata(&self) -> Option<VideoMetadata> {
        self.metadata
    }

    async fn seek(&mut self, time: f64) -> Result<(), VideoError> {
        if self.fail_seek_at == Some(self.seeks.len()) {
            return Err(VideoError::Seek {
                time,
                reason: "decoder error".to_string(),
            });
        }
        tokio::task::yield_now().await;
        self.seeks.push(time);
        Ok(())
    }

    fn capture_frame(&mut self) -> Result<Frame, VideoError> {
        Ok(blank_frame())
    }
}

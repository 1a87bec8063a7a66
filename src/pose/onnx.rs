//! BlazePose landmark model on ONNX Runtime.
//!
//! Input is a `[1, 256, 256, 3]` RGB tensor in 0..1. The frame is stretched to
//! the input size, so normalized output coordinates map straight back onto the
//! source frame.

use image::imageops::{self, FilterType};
use ndarray::Array4;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::{Session, SessionOutputs};
use ort::value::Tensor;
use tracing::info;

use super::estimator::{PoseModel, PoseRuntime};
use super::keypoint::{Keypoint, KeypointIndex, Pose};
use super::record::{PoseResult, SegmentationMask, WorldLandmark};
use crate::config::{EstimatorConfig, RunningMode};
use crate::error::EstimatorError;
use crate::video::Frame;

/// モデルの入力サイズ
pub const INPUT_SIZE: u32 = 256;

/// 出力は33点＋補助点6点
const MODEL_LANDMARKS: usize = 39;
/// x, y, z, visibility, presence
const LANDMARK_STRIDE: usize = 5;
/// x, y, z
const WORLD_STRIDE: usize = 3;

/// ファイルから ONNX モデルを読み込むランタイム
#[derive(Debug, Clone, Copy, Default)]
pub struct OnnxRuntime;

impl PoseRuntime for OnnxRuntime {
    type Model = OnnxPoseModel;

    async fn load(&self, config: &EstimatorConfig) -> Result<OnnxPoseModel, EstimatorError> {
        let config = config.clone();
        tokio::task::spawn_blocking(move || OnnxPoseModel::new(config))
            .await
            .map_err(|e| EstimatorError::Unavailable(e.to_string()))?
    }
}

/// 読み込み済みの BlazePose ランドマークモデル
pub struct OnnxPoseModel {
    session: Session,
    config: EstimatorConfig,
    /// 前フレームで人物を見つけたか（動画モードの追跡状態）
    tracking: bool,
}

impl OnnxPoseModel {
    pub fn new(config: EstimatorConfig) -> Result<Self, EstimatorError> {
        let session = Session::builder()
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|b| b.commit_from_file(&config.model_path))
            .map_err(|e| {
                EstimatorError::Unavailable(format!("failed to load {}: {}", config.model_path, e))
            })?;
        info!(model = %config.model_path, "ONNX pose model loaded");
        Ok(Self {
            session,
            config,
            tracking: false,
        })
    }

    /// 人物ありと判定する存在スコアの閾値
    ///
    /// 追跡中は追跡用の閾値、見失っている間は検出用の閾値を使う。
    fn presence_threshold(&self) -> f32 {
        if self.tracking && self.config.running_mode == RunningMode::Video {
            self.config.min_tracking_confidence
        } else {
            self.config
                .min_pose_detection_confidence
                .max(self.config.min_pose_presence_confidence)
        }
    }

    fn infer(&mut self, frame: &Frame) -> Result<PoseResult, EstimatorError> {
        if self.config.num_poses == 0 {
            return Ok(PoseResult::default());
        }
        let threshold = self.presence_threshold();

        let input = Tensor::from_array(preprocess(frame)).map_err(detection_error)?;
        let outputs = self
            .session
            .run(ort::inputs![self.config.tensors.input.as_str() => input])
            .map_err(detection_error)?;

        let presence = first_value(&outputs, &self.config.tensors.presence)?;
        if presence < threshold {
            self.tracking = false;
            return Ok(PoseResult::default());
        }

        let raw = extract(&outputs, &self.config.tensors.landmarks)?;
        let pose = decode_landmarks(&raw).ok_or_else(|| {
            EstimatorError::Detection(format!("unexpected landmark tensor length {}", raw.len()))
        })?;

        let world = extract(&outputs, &self.config.tensors.world_landmarks)
            .ok()
            .and_then(|raw| decode_world_landmarks(&raw, &pose));

        let segmentation_mask = if self.config.output_segmentation_masks {
            Some(decode_segmentation(&outputs, &self.config.tensors.segmentation)?)
        } else {
            None
        };

        self.tracking = true;
        Ok(PoseResult {
            landmarks: vec![pose],
            world_landmarks: world.map(|w| vec![w]),
            segmentation_mask,
        })
    }
}

impl PoseModel for OnnxPoseModel {
    async fn detect_for_video(&mut self, frame: &Frame, _timestamp_ms: f64) -> Result<PoseResult, EstimatorError> {
        self.infer(frame)
    }
}

fn detection_error(e: ort::Error) -> EstimatorError {
    EstimatorError::Detection(e.to_string())
}

fn extract(outputs: &SessionOutputs<'_>, name: &str) -> Result<Vec<f32>, EstimatorError> {
    let value = outputs
        .get(name)
        .ok_or_else(|| EstimatorError::Detection(format!("missing output tensor {}", name)))?;
    let array: ndarray::ArrayViewD<f32> = value.try_extract_array().map_err(detection_error)?;
    Ok(array.iter().copied().collect())
}

fn first_value(outputs: &SessionOutputs<'_>, name: &str) -> Result<f32, EstimatorError> {
    extract(outputs, name)?
        .first()
        .copied()
        .ok_or_else(|| EstimatorError::Detection(format!("empty output tensor {}", name)))
}

fn decode_segmentation(outputs: &SessionOutputs<'_>, name: &str) -> Result<SegmentationMask, EstimatorError> {
    let value = outputs
        .get(name)
        .ok_or_else(|| EstimatorError::Detection(format!("missing output tensor {}", name)))?;
    let array: ndarray::ArrayViewD<f32> = value.try_extract_array().map_err(detection_error)?;
    // [1, H, W, 1]
    let (height, width) = match array.shape() {
        [_, h, w, ..] => (*h as u32, *w as u32),
        shape => {
            return Err(EstimatorError::Detection(format!(
                "unexpected segmentation shape {:?}",
                shape
            )))
        }
    };
    Ok(SegmentationMask {
        width,
        height,
        data: array.iter().map(|&logit| sigmoid(logit)).collect(),
    })
}

/// RGBA フレームを `[1, 256, 256, 3]` の 0..1 テンソルにする
pub fn preprocess(frame: &Frame) -> Array4<f32> {
    let resized = imageops::resize(frame, INPUT_SIZE, INPUT_SIZE, FilterType::Triangle);
    let size = INPUT_SIZE as usize;
    let mut input = Array4::<f32>::zeros((1, size, size, 3));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..3 {
            input[[0, y as usize, x as usize, c]] = pixel.0[c] as f32 / 255.0;
        }
    }
    input
}

/// ランドマーク出力を正規化座標の Pose に変換する
///
/// 座標は入力画像のピクセル単位、visibility はロジット。
pub fn decode_landmarks(raw: &[f32]) -> Option<Pose> {
    if raw.len() < KeypointIndex::COUNT * LANDMARK_STRIDE {
        return None;
    }
    let size = INPUT_SIZE as f32;
    let mut keypoints = [Keypoint::default(); KeypointIndex::COUNT];
    for (i, kp) in keypoints.iter_mut().enumerate() {
        let base = i * LANDMARK_STRIDE;
        *kp = Keypoint::new(raw[base] / size, raw[base + 1] / size, sigmoid(raw[base + 3]));
    }
    Some(Pose::new(keypoints))
}

/// 3次元ランドマーク（メートル単位、腰の中心が原点）
fn decode_world_landmarks(raw: &[f32], pose: &Pose) -> Option<Vec<WorldLandmark>> {
    if raw.len() < KeypointIndex::COUNT * WORLD_STRIDE || raw.len() > MODEL_LANDMARKS * WORLD_STRIDE {
        return None;
    }
    Some(
        pose.keypoints
            .iter()
            .enumerate()
            .map(|(i, kp)| WorldLandmark {
                x: raw[i * WORLD_STRIDE],
                y: raw[i * WORLD_STRIDE + 1],
                z: raw[i * WORLD_STRIDE + 2],
                visibility: kp.visibility,
            })
            .collect(),
    )
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

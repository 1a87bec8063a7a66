use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::pose::Region;
use crate::render::{Color, VisualizationOptions};

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub estimator: EstimatorConfig,
    #[serde(default)]
    pub extract: ExtractConfig,
    #[serde(default)]
    pub render: RenderConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// SQLiteファイルのパス
    #[serde(default = "default_store_path")]
    pub path: String,
}

fn default_store_path() -> String { "keypoints.db".to_string() }

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

/// 推定モデルの動作モード
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunningMode {
    /// 1枚ずつ独立に推定
    Image,
    /// 前フレームからの追跡を使う（タイムスタンプは単調非減少）
    Video,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct EstimatorConfig {
    /// モデルファイルのパス
    #[serde(default = "default_model_path")]
    pub model_path: String,
    /// 同時に追跡する最大人数
    #[serde(default = "default_num_poses")]
    pub num_poses: usize,
    #[serde(default = "default_confidence")]
    pub min_pose_detection_confidence: f32,
    #[serde(default = "default_confidence")]
    pub min_pose_presence_confidence: f32,
    #[serde(default = "default_confidence")]
    pub min_tracking_confidence: f32,
    #[serde(default)]
    pub output_segmentation_masks: bool,
    #[serde(default = "default_running_mode")]
    pub running_mode: RunningMode,
    /// ONNXモデルの入出力テンソル名
    #[serde(default)]
    pub tensors: TensorNames,
}

fn default_model_path() -> String { "models/pose_landmark_full.onnx".to_string() }
fn default_num_poses() -> usize { 1 }
fn default_confidence() -> f32 { 0.5 }
fn default_running_mode() -> RunningMode { RunningMode::Video }

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            model_path: default_model_path(),
            num_poses: default_num_poses(),
            min_pose_detection_confidence: default_confidence(),
            min_pose_presence_confidence: default_confidence(),
            min_tracking_confidence: default_confidence(),
            output_segmentation_masks: false,
            running_mode: default_running_mode(),
            tensors: TensorNames::default(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct TensorNames {
    #[serde(default = "default_input_tensor")]
    pub input: String,
    /// [1, 195] = 39点 × (x, y, z, visibility, presence)
    #[serde(default = "default_landmarks_tensor")]
    pub landmarks: String,
    /// [1, 1] 人物の存在スコア
    #[serde(default = "default_presence_tensor")]
    pub presence: String,
    /// [1, 256, 256, 1]
    #[serde(default = "default_segmentation_tensor")]
    pub segmentation: String,
    /// [1, 117] = 39点 × (x, y, z)
    #[serde(default = "default_world_tensor")]
    pub world_landmarks: String,
}

fn default_input_tensor() -> String { "input_1".to_string() }
fn default_landmarks_tensor() -> String { "Identity".to_string() }
fn default_presence_tensor() -> String { "Identity_1".to_string() }
fn default_segmentation_tensor() -> String { "Identity_2".to_string() }
fn default_world_tensor() -> String { "Identity_4".to_string() }

impl Default for TensorNames {
    fn default() -> Self {
        Self {
            input: default_input_tensor(),
            landmarks: default_landmarks_tensor(),
            presence: default_presence_tensor(),
            segmentation: default_segmentation_tensor(),
            world_landmarks: default_world_tensor(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractConfig {
    /// 1秒あたりの推定回数
    #[serde(default = "default_sample_rate")]
    pub sample_rate_hz: f64,
}

fn default_sample_rate() -> f64 { 5.0 }

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: default_sample_rate(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RenderConfig {
    /// 再生位置とキーポイントの照合許容幅（秒）
    #[serde(default = "default_match_tolerance")]
    pub match_tolerance: f64,
    /// 描画キャッシュのヒット許容幅（秒）
    #[serde(default = "default_cache_tolerance")]
    pub cache_tolerance: f64,
    /// 描画キャッシュの最大件数
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    /// これ未満の可視性のキーポイントは描かない
    #[serde(default = "default_min_visibility")]
    pub min_visibility: f32,
    #[serde(default = "default_joint_radius")]
    pub joint_radius: f32,
    #[serde(default = "default_joint_color")]
    pub joint_color: Color,
    #[serde(default = "default_connector_color")]
    pub connector_color: Color,
    #[serde(default = "default_connector_width")]
    pub connector_width: f32,
    /// 非表示にする部位
    #[serde(default)]
    pub hidden_regions: Vec<Region>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_match_tolerance() -> f64 { crate::timeline::MATCH_TOLERANCE }
fn default_cache_tolerance() -> f64 { crate::timeline::CACHE_TOLERANCE }
fn default_cache_capacity() -> usize { 100 }
fn default_min_visibility() -> f32 { 0.5 }
fn default_joint_radius() -> f32 { 4.0 }
fn default_joint_color() -> Color { Color::rgb(0x00, 0xFF, 0x00) }
fn default_connector_color() -> Color { Color::rgb(0xFF, 0xFF, 0x00) }
fn default_connector_width() -> f32 { 2.0 }
fn default_enabled() -> bool { true }

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            match_tolerance: default_match_tolerance(),
            cache_tolerance: default_cache_tolerance(),
            cache_capacity: default_cache_capacity(),
            min_visibility: default_min_visibility(),
            joint_radius: default_joint_radius(),
            joint_color: default_joint_color(),
            connector_color: default_connector_color(),
            connector_width: default_connector_width(),
            hidden_regions: Vec::new(),
            enabled: default_enabled(),
        }
    }
}

impl RenderConfig {
    /// 設定値から表示オプションの初期状態を作る
    pub fn initial_options(&self) -> VisualizationOptions {
        let mut options = VisualizationOptions::default();
        options.joint_radius = self.joint_radius;
        options.joint_color = self.joint_color;
        options.connector_color = self.connector_color;
        options.connector_width = self.connector_width;
        options.enabled = self.enabled;
        for region in &self.hidden_regions {
            options.set_region_visible(*region, false);
        }
        options
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        Ok(config)
    }

    /// ファイルがなければデフォルト値を使う
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(error = %e, "config load failed, using defaults");
                Self::default()
            }
        }
    }
}

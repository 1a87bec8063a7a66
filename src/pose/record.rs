use serde::{Deserialize, Serialize};

use super::keypoint::Pose;

/// 3次元ランドマーク（レンダラーでは使用しない）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorldLandmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub visibility: f32,
}

/// セグメンテーションマスク (0.0〜1.0、行優先)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentationMask {
    pub width: u32,
    pub height: u32,
    pub data: Vec<f32>,
}

/// 推定器の1フレーム分の出力
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoseResult {
    pub landmarks: Vec<Pose>,
    pub world_landmarks: Option<Vec<Vec<WorldLandmark>>>,
    pub segmentation_mask: Option<SegmentationMask>,
}

impl PoseResult {
    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }
}

/// ある動画のある時刻に対する検出結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeypointRecord {
    pub video_id: String,
    /// 動画先頭からの秒数（再生位置との照合に使う）
    pub timestamp: f64,
    pub landmarks: Vec<Pose>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub world_landmarks: Option<Vec<Vec<WorldLandmark>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segmentation_mask: Option<SegmentationMask>,
}

impl KeypointRecord {
    /// 検出結果からレコードを作る。姿勢が1つもなければ None。
    pub fn from_result(video_id: &str, timestamp: f64, result: PoseResult) -> Option<Self> {
        if result.is_empty() {
            return None;
        }
        Some(Self {
            video_id: video_id.to_string(),
            timestamp,
            landmarks: result.landmarks,
            world_landmarks: result.world_landmarks,
            segmentation_mask: result.segmentation_mask,
        })
    }
}

/// タイムスタンプ順に並べ替える（同時刻は元の順序を保つ）
pub fn sort_by_timestamp(records: &mut [KeypointRecord]) {
    records.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
}

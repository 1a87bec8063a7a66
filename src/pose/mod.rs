pub mod estimator;
pub mod keypoint;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod record;

pub use estimator::{PoseEstimator, PoseModel, PoseRuntime};
pub use keypoint::{Keypoint, KeypointIndex, Pose, Region, SKELETON_CONNECTIONS};
#[cfg(feature = "onnx")]
pub use onnx::OnnxRuntime;
pub use record::{sort_by_timestamp, KeypointRecord, PoseResult, SegmentationMask, WorldLandmark};

use anyhow::{Context, Result};
use opencv::{
    core::{AlgorithmHint, Mat},
    imgproc,
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureAPIs},
};
use std::path::Path;

use super::{Frame, VideoMetadata, VideoSource};
use crate::error::VideoError;

/// OpenCVで動画ファイルを読み込むビデオソース
pub struct OpenCvVideo {
    capture: VideoCapture,
    metadata: Option<VideoMetadata>,
    current: Mat,
}

impl OpenCvVideo {
    /// 動画ファイルを開く
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let name = path.to_str().context("video path is not valid UTF-8")?;
        let capture = VideoCapture::from_file(name, VideoCaptureAPIs::CAP_ANY as i32)
            .with_context(|| format!("Failed to open video {}", path.display()))?;

        if !capture.is_opened()? {
            anyhow::bail!("Video {} is not readable", path.display());
        }

        let width = capture.get(videoio::CAP_PROP_FRAME_WIDTH)? as u32;
        let height = capture.get(videoio::CAP_PROP_FRAME_HEIGHT)? as u32;
        let fps = capture.get(videoio::CAP_PROP_FPS)?;
        let frame_count = capture.get(videoio::CAP_PROP_FRAME_COUNT)?;

        // 幅・高さ・FPSが取れないものは未読み込み扱い
        let metadata = if width > 0 && height > 0 && fps > 0.0 {
            Some(VideoMetadata {
                width,
                height,
                duration: frame_count / fps,
            })
        } else {
            None
        };

        Ok(Self {
            capture,
            metadata,
            current: Mat::default(),
        })
    }
}

impl VideoSource for OpenCvVideo {
    fn metadata(&self) -> Option<VideoMetadata> {
        self.metadata
    }

    async fn seek(&mut self, time: f64) -> Result<(), VideoError> {
        let seek_err = |reason: String| VideoError::Seek { time, reason };

        self.capture
            .set(videoio::CAP_PROP_POS_MSEC, time * 1000.0)
            .map_err(|e| seek_err(e.to_string()))?;

        // 次のフレームをデコードして「今見えているフレーム」とする
        let mut frame = Mat::default();
        let ok = self
            .capture
            .read(&mut frame)
            .map_err(|e| seek_err(e.to_string()))?;
        if !ok || frame.empty() {
            return Err(seek_err("no frame at position".to_string()));
        }
        self.current = frame;
        Ok(())
    }

    fn capture_frame(&mut self) -> Result<Frame, VideoError> {
        if self.current.empty() {
            return Err(VideoError::Read("no decoded frame".to_string()));
        }

        // BGR -> RGBA
        let mut rgba = Mat::default();
        imgproc::cvt_color(
            &self.current,
            &mut rgba,
            imgproc::COLOR_BGR2RGBA,
            0,
            AlgorithmHint::ALGO_HINT_DEFAULT,
        )
        .map_err(|e| VideoError::Read(e.to_string()))?;

        let width = rgba.cols() as u32;
        let height = rgba.rows() as u32;
        let bytes = rgba
            .data_bytes()
            .map_err(|e| VideoError::Read(e.to_string()))?
            .to_vec();

        Frame::from_raw(width, height, bytes)
            .ok_or_else(|| VideoError::Read("frame buffer size mismatch".to_string()))
    }
}

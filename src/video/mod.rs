//! Video source collaborator seen by the extraction pipeline and the renderer.

use std::future::Future;

use crate::error::VideoError;

#[cfg(feature = "desktop")]
pub mod opencv;

#[cfg(feature = "desktop")]
pub use self::opencv::OpenCvVideo;

/// 推定器に渡すフレーム画像
pub type Frame = image::RgbaImage;

/// 読み込み済み動画の情報
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoMetadata {
    /// デコード解像度
    pub width: u32,
    pub height: u32,
    /// 長さ（秒）
    pub duration: f64,
}

/// 画面上に表示されている動画の矩形（ピクセル）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayBox {
    pub width: u32,
    pub height: u32,
}

impl DisplayBox {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// 再生中の動画から届くイベント
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VideoEvent {
    MetadataLoaded { display: DisplayBox },
    /// 表示サイズの変更（ウィンドウのリサイズなど）
    Resized { display: DisplayBox },
    TimeUpdated { time: f64 },
    SeekStarted,
    SeekCompleted { time: f64 },
    Paused { time: f64 },
    Ended { time: f64 },
}

/// フレーム抽出のための動画ソース
pub trait VideoSource: Send {
    /// 読み込み前は None
    fn metadata(&self) -> Option<VideoMetadata>;

    /// 指定時刻へ移動し、そのフレームがデコードされるまで待つ
    fn seek(&mut self, time: f64) -> impl Future<Output = Result<(), VideoError>> + Send;

    /// 現在表示中のフレームを画像として取り出す
    fn capture_frame(&mut self) -> Result<Frame, VideoError>;
}

use tracing::debug;

use super::cache::RenderCache;
use super::options::{OptionChange, VisualizationOptions};
use super::skeleton::draw_record;
use super::surface::{Canvas, Surface};
use crate::config::RenderConfig;
use crate::pose::KeypointRecord;
use crate::timeline::Timeline;
use crate::video::{DisplayBox, VideoEvent};

/// `render_at` の結果
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RenderOutcome {
    /// キャッシュの画像をそのまま使った
    CacheHit { key: f64 },
    /// レコードを照合して描いた
    Drawn { record_timestamp: f64 },
    /// 該当なし・無効・未接続のため消去した
    Cleared,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub cache_hits: u64,
    pub draws: u64,
    pub clears: u64,
}

/// 接続中の動画
struct Session {
    video_id: String,
    timeline: Timeline,
}

/// キーポイントを再生位置に合わせて重ねて描くレンダラー
///
/// 同時に接続できる動画は1本だけ。新しい動画を `attach` すると前の
/// セッションとキャッシュは破棄される。
pub struct OverlayRenderer {
    surface: Surface,
    session: Option<Session>,
    options: VisualizationOptions,
    cache: RenderCache,
    match_tolerance: f64,
    min_visibility: f32,
    last_time: Option<f64>,
    stats: RenderStats,
}

impl OverlayRenderer {
    pub fn new(config: &RenderConfig) -> Self {
        Self {
            surface: Surface::new(0, 0),
            session: None,
            options: config.initial_options(),
            cache: RenderCache::new(config.cache_capacity, config.cache_tolerance),
            match_tolerance: config.match_tolerance,
            min_visibility: config.min_visibility,
            last_time: None,
            stats: RenderStats::default(),
        }
    }

    /// 動画に接続する。キーポイント列はこの時点のスナップショットとして保持する。
    pub fn attach(&mut self, video_id: &str, records: Vec<KeypointRecord>, display: DisplayBox) {
        self.detach();
        let timeline = Timeline::new(records);
        debug!(video_id, records = timeline.len(), "overlay attached");
        self.session = Some(Session {
            video_id: video_id.to_string(),
            timeline,
        });
        self.surface.resize(display.width, display.height);
    }

    /// 接続を解除し、サーフェスとキャッシュを解放する
    pub fn detach(&mut self) {
        if let Some(session) = self.session.take() {
            debug!(video_id = %session.video_id, "overlay detached");
        }
        self.cache.clear();
        self.surface.resize(0, 0);
        self.last_time = None;
    }

    pub fn video_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.video_id.as_str())
    }

    pub fn timeline(&self) -> Option<&Timeline> {
        self.session.as_ref().map(|s| &s.timeline)
    }

    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    pub fn options(&self) -> &VisualizationOptions {
        &self.options
    }

    pub fn stats(&self) -> RenderStats {
        self.stats
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// 表示サイズに合わせてサーフェスを作り直す（キャッシュは無効）
    pub fn resize(&mut self, display: DisplayBox) {
        if display.width == self.surface.width() && display.height == self.surface.height() {
            return;
        }
        self.surface.resize(display.width, display.height);
        self.cache.clear();
        if let Some(t) = self.last_time {
            self.render_at(t);
        }
    }

    /// 再生位置 `t` のオーバーレイを用意する
    ///
    /// 先にキャッシュ（狭い許容幅）を見て、なければレコードを照合して描く。
    pub fn render_at(&mut self, t: f64) -> RenderOutcome {
        self.last_time = Some(t);

        if self.session.is_none() || !self.options.enabled || self.surface.is_empty() {
            return self.clear_surface();
        }

        if let Some((key, snapshot)) = self.cache.lookup(t) {
            if self.surface.restore(snapshot) {
                self.stats.cache_hits += 1;
                return RenderOutcome::CacheHit { key };
            }
        }

        let matched = self
            .session
            .as_ref()
            .and_then(|s| s.timeline.nearest(t, self.match_tolerance));
        let Some(record) = matched else {
            return self.clear_surface();
        };

        self.surface.clear();
        draw_record(&mut self.surface, record, &self.options, self.min_visibility);
        let record_timestamp = record.timestamp;
        self.cache.insert(t, self.surface.snapshot());
        self.stats.draws += 1;
        RenderOutcome::Drawn { record_timestamp }
    }

    /// 表示オプションを変更し、キャッシュを捨てて現在位置で描き直す
    pub fn apply_option(&mut self, change: OptionChange) -> Option<RenderOutcome> {
        self.options.apply(change);
        self.cache.clear();
        let t = self.last_time?;
        Some(self.render_at(t))
    }

    /// 動画イベントを処理する
    pub fn handle_event(&mut self, event: VideoEvent) -> Option<RenderOutcome> {
        match event {
            VideoEvent::MetadataLoaded { display } | VideoEvent::Resized { display } => {
                self.resize(display);
                None
            }
            VideoEvent::TimeUpdated { time }
            | VideoEvent::SeekCompleted { time }
            | VideoEvent::Paused { time }
            | VideoEvent::Ended { time } => Some(self.render_at(time)),
            VideoEvent::SeekStarted => None,
        }
    }

    fn clear_surface(&mut self) -> RenderOutcome {
        self.surface.clear();
        self.stats.clears += 1;
        RenderOutcome::Cleared
    }
}

//! 保存済みキーポイントを再生時刻に合わせてウィンドウに重ねて表示する
//!
//! 動画のデコードは行わず、実時間で進む再生クロックでオーバーレイだけを再生する。
//!
//! Space: 一時停止 / Left, Right: 1秒シーク / 1-4: 顔・胴体・腕・脚の表示切替
//! S: オーバーレイの表示切替 / +, -: キーポイントの半径

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pose_overlay::config::Config;
use pose_overlay::pose::Region;
use pose_overlay::render::{Key, OptionChange, OverlayRenderer, OverlayWindow};
use pose_overlay::store::{KeypointStore, SqliteKeypointStore};
use pose_overlay::video::VideoEvent;

/// シーク幅（秒）
const SEEK_STEP: f64 = 1.0;

/// 統計ログの間隔
const STATS_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "replay_viewer", version = env!("GIT_VERSION"), about)]
struct Args {
    video_id: String,
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,
    #[arg(long)]
    db: Option<PathBuf>,
    #[arg(long, default_value_t = 960)]
    width: usize,
    #[arg(long, default_value_t = 540)]
    height: usize,
}

/// 実時間で進む再生クロック
struct PlaybackClock {
    position: f64,
    duration: f64,
    playing: bool,
    last_tick: Instant,
}

impl PlaybackClock {
    fn new(duration: f64) -> Self {
        Self {
            position: 0.0,
            duration,
            playing: true,
            last_tick: Instant::now(),
        }
    }

    /// 経過時間だけ進める。末尾に達したら停止して true
    fn tick(&mut self) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_tick).as_secs_f64();
        self.last_tick = now;
        if !self.playing {
            return false;
        }
        self.position = (self.position + elapsed).min(self.duration);
        if self.position >= self.duration {
            self.playing = false;
            return true;
        }
        false
    }

    fn seek_by(&mut self, delta: f64) -> f64 {
        self.position = (self.position + delta).clamp(0.0, self.duration);
        self.position
    }
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pose_overlay=info,replay_viewer=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = Config::load_or_default(&args.config);
    let db_path = args
        .db
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.store.path));

    let runtime = tokio::runtime::Runtime::new()?;
    let records = runtime.block_on(async {
        let store = SqliteKeypointStore::open(&db_path)
            .with_context(|| format!("Failed to open keypoint store {}", db_path.display()))?;
        anyhow::Ok(store.get(&args.video_id).await?)
    })?;
    if records.is_empty() {
        bail!("no keypoints stored for {}", args.video_id);
    }
    let duration = records.last().map_or(0.0, |r| r.timestamp) + 1.0;
    info!(video_id = %args.video_id, records = records.len(), duration, "replay started");

    let mut window = OverlayWindow::new(
        &format!("Replay - {}", args.video_id),
        args.width,
        args.height,
    )?;
    let mut renderer = OverlayRenderer::new(&config.render);
    let mut display = window.display_box();
    renderer.attach(&args.video_id, records, display);
    renderer.handle_event(VideoEvent::MetadataLoaded { display });

    let mut clock = PlaybackClock::new(duration);
    let mut stats_timer = Instant::now();

    while window.is_open() {
        for key in window.pressed_keys() {
            match key {
                Key::Space => {
                    clock.playing = !clock.playing;
                    if !clock.playing {
                        renderer.handle_event(VideoEvent::Paused { time: clock.position });
                    } else if clock.position >= clock.duration {
                        clock.position = 0.0;
                    }
                }
                Key::Left | Key::Right => {
                    let delta = if key == Key::Left { -SEEK_STEP } else { SEEK_STEP };
                    renderer.handle_event(VideoEvent::SeekStarted);
                    let time = clock.seek_by(delta);
                    renderer.handle_event(VideoEvent::SeekCompleted { time });
                }
                Key::Key1 | Key::Key2 | Key::Key3 | Key::Key4 => {
                    let region = match key {
                        Key::Key1 => Region::Face,
                        Key::Key2 => Region::Torso,
                        Key::Key3 => Region::Arms,
                        _ => Region::Legs,
                    };
                    renderer.apply_option(OptionChange::ToggleRegion(region));
                    info!(
                        region = region.as_str(),
                        visible = renderer.options().is_region_visible(region),
                        "region toggled"
                    );
                }
                Key::S => {
                    let enabled = !renderer.options().enabled;
                    renderer.apply_option(OptionChange::Enabled(enabled));
                    info!(enabled, "overlay toggled");
                }
                Key::Equal | Key::NumPadPlus => {
                    let radius = renderer.options().joint_radius + 1.0;
                    renderer.apply_option(OptionChange::JointRadius(radius));
                }
                Key::Minus | Key::NumPadMinus => {
                    let radius = renderer.options().joint_radius - 1.0;
                    renderer.apply_option(OptionChange::JointRadius(radius));
                }
                _ => {}
            }
        }

        let current = window.display_box();
        if current != display {
            display = current;
            renderer.handle_event(VideoEvent::Resized { display });
        }

        let was_playing = clock.playing;
        if clock.tick() {
            renderer.handle_event(VideoEvent::Ended { time: clock.position });
        } else if was_playing {
            renderer.handle_event(VideoEvent::TimeUpdated { time: clock.position });
        }

        window.present(renderer.surface())?;

        if stats_timer.elapsed() >= STATS_INTERVAL {
            let stats = renderer.stats();
            info!(
                position = clock.position,
                cache_hits = stats.cache_hits,
                draws = stats.draws,
                clears = stats.clears,
                cached = renderer.cache_len(),
                "render stats"
            );
            stats_timer = Instant::now();
        }
    }

    renderer.detach();
    info!("replay finished");
    Ok(())
}

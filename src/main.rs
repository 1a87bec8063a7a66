use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pose_overlay::config::Config;
use pose_overlay::render::OverlayRenderer;
use pose_overlay::store::{KeypointStore, SqliteKeypointStore};
use pose_overlay::timeline::Timeline;
use pose_overlay::video::DisplayBox;

const CONFIG_PATH: &str = "config.toml";

/// 動画のキーポイント抽出と保存済みキーポイントの管理
#[derive(Parser, Debug)]
#[command(name = "pose-overlay", version = env!("GIT_VERSION"), about)]
struct Cli {
    /// 設定ファイル
    #[arg(long, default_value = CONFIG_PATH)]
    config: PathBuf,
    /// キーポイントDB（設定ファイルの値を上書き）
    #[arg(long)]
    db: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// キーポイントを持つ動画の一覧
    List,
    /// 動画のキーポイント数と時間範囲
    Info { video_id: String },
    /// 動画のキーポイントを削除
    Delete { video_id: String },
    /// キーポイントを JSON で書き出す
    Export {
        video_id: String,
        /// 省略時は標準出力
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// 指定時刻のオーバーレイを PNG に描画
    Render {
        video_id: String,
        /// 再生位置（秒）
        #[arg(long)]
        time: f64,
        #[arg(long, default_value_t = 1280)]
        width: u32,
        #[arg(long, default_value_t = 720)]
        height: u32,
        #[arg(long, default_value = "overlay.png")]
        out: PathBuf,
    },
    /// 動画ファイルからキーポイントを抽出して保存
    #[cfg(all(feature = "desktop", feature = "onnx"))]
    Process {
        video_id: String,
        file: PathBuf,
        /// 1秒あたりの推定回数（設定ファイルの値を上書き）
        #[arg(long)]
        rate: Option<f64>,
        #[arg(long)]
        start: Option<f64>,
        #[arg(long)]
        end: Option<f64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pose_overlay=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::load_or_default(&cli.config);
    let db_path = cli
        .db
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.store.path));
    let store = SqliteKeypointStore::open(&db_path)
        .with_context(|| format!("Failed to open keypoint store {}", db_path.display()))?;

    match cli.command {
        Command::List => {
            for video_id in store.video_ids().await? {
                let count = store.count(&video_id).await?;
                println!("{}\t{}", video_id, count);
            }
        }
        Command::Info { video_id } => {
            let records = store.get(&video_id).await?;
            if records.is_empty() {
                bail!("no keypoints stored for {}", video_id);
            }
            let poses: usize = records.iter().map(|r| r.landmarks.len()).sum();
            let count = records.len();
            let timeline = Timeline::new(records);
            let (first, last) = timeline.span().unwrap_or((0.0, 0.0));
            println!("video:   {}", video_id);
            println!("records: {}", count);
            println!("poses:   {}", poses);
            println!("span:    {:.3}s - {:.3}s", first, last);
        }
        Command::Delete { video_id } => {
            let removed = store.delete(&video_id).await?;
            info!(video_id = %video_id, removed, "keypoints deleted");
            println!("削除しました: {} 件", removed);
        }
        Command::Export { video_id, out } => {
            let records = store.get(&video_id).await?;
            let json = serde_json::to_string_pretty(&records)?;
            match out {
                Some(path) => {
                    std::fs::write(&path, json)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    println!("{} 件を書き出しました: {}", records.len(), path.display());
                }
                None => println!("{}", json),
            }
        }
        Command::Render {
            video_id,
            time,
            width,
            height,
            out,
        } => {
            let records = store.get(&video_id).await?;
            let mut renderer = OverlayRenderer::new(&config.render);
            renderer.attach(&video_id, records, DisplayBox::new(width, height));
            let outcome = renderer.render_at(time);
            info!(video_id = %video_id, time, ?outcome, "overlay rendered");
            renderer
                .surface()
                .to_rgba_image()
                .save(&out)
                .with_context(|| format!("Failed to save {}", out.display()))?;
            println!("{:?} -> {}", outcome, out.display());
        }
        #[cfg(all(feature = "desktop", feature = "onnx"))]
        Command::Process {
            video_id,
            file,
            rate,
            start,
            end,
        } => process(&config, &store, video_id, file, rate, start, end).await?,
    }

    Ok(())
}

#[cfg(all(feature = "desktop", feature = "onnx"))]
async fn process(
    config: &Config,
    store: &SqliteKeypointStore,
    video_id: String,
    file: PathBuf,
    rate: Option<f64>,
    start: Option<f64>,
    end: Option<f64>,
) -> Result<()> {
    use pose_overlay::pipeline::{process_video, ExtractRequest};
    use pose_overlay::pose::{OnnxRuntime, PoseEstimator};
    use pose_overlay::video::OpenCvVideo;
    use tokio_util::sync::CancellationToken;

    let mut video = OpenCvVideo::open(&file)?;
    let estimator = PoseEstimator::new(OnnxRuntime, config.estimator.clone());
    let request = ExtractRequest::new(video_id)
        .with_range(start.unwrap_or(0.0), end)
        .with_sample_rate(rate.unwrap_or(config.extract.sample_rate_hz));

    // Ctrl-C で中断（途中結果は保存しない）
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    let mut last_percent = None;
    let saved = process_video(&mut video, &estimator, store, &request, &cancel, |p| {
        let percent = (p.fraction() * 100.0) as u32;
        if last_percent != Some(percent) && percent % 10 == 0 {
            println!("  {:>3}% ({}/{})", percent, p.processed, p.total);
            last_percent = Some(percent);
        }
    })
    .await?;

    println!("{} 件のキーポイントを保存しました: {}", saved, request.video_id);
    Ok(())
}

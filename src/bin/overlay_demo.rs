//! overlay_demo - synthetic camera, scripted detector and in-memory overlay, end to end

use anyhow::{Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use detection_overlay::config::PipelineConfig;
use detection_overlay::coordinator::{CoordinatorState, PipelineCoordinator};
use detection_overlay::detect::{BackendRegistry, Detector, ModelArtifact, ModelBundle};
use detection_overlay::frame::DeviceOrientation;
use detection_overlay::geometry::Rect;
use detection_overlay::ingest::{CaptureSession, OrientationSensor, SyntheticCamera};
use detection_overlay::overlay::LayerTree;
use detection_overlay::ui;

const PUMP_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Number of frames to deliver before stopping.
    #[arg(long, default_value_t = 120)]
    frames: u64,
    /// Synthetic camera frame rate (overrides config).
    #[arg(long)]
    fps: Option<u32>,
    /// Directory holding model artifacts (overrides config).
    #[arg(long, env = "OVERLAY_MODEL_DIR")]
    model_dir: Option<PathBuf>,
    /// Detector backend name (overrides config).
    #[arg(long)]
    backend: Option<String>,
    /// Rotate the device to landscape after this many frames (default: halfway).
    #[arg(long)]
    rotate_at: Option<u64>,
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let ui = ui::Ui::new(
        args.ui.parse()?,
        std::io::stderr().is_terminal(),
        !std::io::stdout().is_terminal(),
    );

    let mut cfg = PipelineConfig::load()?;
    if let Some(fps) = args.fps {
        cfg.camera.fps = fps.max(1);
    }
    if let Some(dir) = args.model_dir {
        cfg.model.dir = dir;
    }
    if let Some(backend) = args.backend {
        cfg.model.backend = backend;
    }

    let registry = BackendRegistry::with_builtin();
    let (extension, loader) = registry.get(&cfg.model.backend)?;

    let sensor = OrientationSensor::new(DeviceOrientation::Portrait);
    let mut session = {
        let mut stage = ui.stage("Configure capture session");
        let camera = SyntheticCamera::new(&cfg.camera.uri, cfg.camera.fps)?;
        let session =
            CaptureSession::configure(vec![Box::new(camera)], cfg.session_config(), sensor.clone())?;
        let geometry = session.geometry();
        stage.finish_with(format!("{}x{}", geometry.width, geometry.height));
        session
    };

    let (coordinator, mut render) = PipelineCoordinator::new::<LayerTree>(session.geometry());
    let state = {
        let mut stage = ui.stage("Load detector");
        let bundle = ModelBundle::new(&cfg.model.dir);
        let state = coordinator.start(|on_complete| {
            let artifact = ModelArtifact::locate(&bundle, &cfg.model.name, extension)?;
            Detector::load(&artifact, cfg.detector, loader, on_complete)
        });
        stage.finish_with(format!("{:?}", state));
        state
    };
    if state == CoordinatorState::Failed {
        log::warn!("running without detection; the preview will show no annotations");
    }

    let view = cfg.view.bounds();
    render
        .attach(LayerTree::new(), view)
        .context("failed to attach overlay")?;

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        ctrlc::set_handler(move || stop.store(true, Ordering::SeqCst))
            .context("error setting Ctrl-C handler")?;
    }

    {
        let coordinator = coordinator.clone();
        session.start(move |frame| coordinator.on_frame(frame))?;
    }

    let rotate_at = args.rotate_at.unwrap_or(args.frames / 2);
    let mut rotated = false;
    let mut last_logged = None;
    {
        let stage = ui.stage("Run pipeline");
        while !stop.load(Ordering::SeqCst) {
            let delivered = session.stats().frames_delivered;
            if delivered >= args.frames {
                break;
            }
            if !rotated && delivered >= rotate_at {
                sensor.set(DeviceOrientation::LandscapeLeft);
                coordinator.layout_changed(Rect::new(0.0, 0.0, view.size.height, view.size.width));
                rotated = true;
            }

            render.pump(PUMP_INTERVAL);
            if render.last_rendered_token() != last_logged {
                last_logged = render.last_rendered_token();
                for annotation in render.annotations() {
                    log::info!(
                        "result {}: {} ({:.2}) at x={:.1} y={:.1} w={:.1} h={:.1}",
                        last_logged.unwrap_or_default(),
                        annotation.label,
                        annotation.confidence,
                        annotation.screen_rect.origin.x,
                        annotation.screen_rect.origin.y,
                        annotation.screen_rect.size.width,
                        annotation.screen_rect.size.height
                    );
                }
            }
            stage.update(&format!("{}/{} frames", delivered, args.frames));
        }
    }

    if stop.load(Ordering::SeqCst) {
        log::info!("shutdown signal received, stopping capture...");
    }
    session.stop();
    coordinator.shutdown();
    render.drain();
    let tree = render.detach();

    let capture = session.stats();
    let pipeline = coordinator.stats();
    let rendered = render.stats();
    log::info!(
        "capture: {} captured, {} delivered, {} discarded late",
        capture.frames_captured,
        capture.frames_delivered,
        capture.frames_discarded
    );
    log::info!(
        "detector: {} submitted, {} completed, {} dropped (inactive {}, failed {})",
        pipeline.submitted,
        pipeline.completed,
        pipeline.dropped_inactive + pipeline.dropped_failed,
        pipeline.dropped_inactive,
        pipeline.dropped_failed
    );
    log::info!(
        "overlay: {} rendered, {} stale, {} commit failures, {} commits total",
        rendered.rendered,
        rendered.stale,
        rendered.commit_failures,
        tree.as_ref().map(|t| t.commit_count()).unwrap_or(0)
    );
    Ok(())
}

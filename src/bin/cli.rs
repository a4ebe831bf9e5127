// motioncam-cli: run the motion detection pipeline against the synthetic
// encoder source and write triggered recordings to the configured directory.
//
// Usage: motioncam-cli [config.toml]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use motioncam::testing::synthetic_data::{MotionPhase, SyntheticEncoder};
use motioncam::{MotionCamConfig, MotionPipeline};

fn main() -> anyhow::Result<()> {
    motioncam::init_logging();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "motioncam.toml".to_string());
    let config = MotionCamConfig::load_from_file(&config_path)
        .with_context(|| format!("loading {}", config_path))?;

    println!("motioncam {} - motion detection pipeline", motioncam::VERSION);
    println!(
        "video: {}x{}@{}, recordings: {}",
        config.video.width, config.video.height, config.video.framerate, config.storage.directory
    );

    if !config.detection.enabled {
        println!("motion detection disabled in config, nothing to do");
        return Ok(());
    }

    std::fs::create_dir_all(&config.storage.directory)
        .with_context(|| format!("creating {}", config.storage.directory))?;

    // Scripted motion: quiet warm-up, a burst of movement, then quiet again,
    // looping a few times so triggered recordings show up.
    let mut script = Vec::new();
    let fps = config.video.framerate;
    for _ in 0..10 {
        script.push(MotionPhase::quiet(fps * 8));
        // block must cover more than cancel_percent of the macroblock grid
        script.push(MotionPhase::moving(fps * 6, (10, 8, 24, 16)));
    }
    let source = SyntheticEncoder::new(script).with_pacing();

    let mut pipeline = MotionPipeline::new(config, Box::new(source));
    pipeline.start()?;
    println!("pipeline running, Ctrl-C to stop");

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || {
            running.store(false, Ordering::Relaxed);
        })
        .context("installing Ctrl-C handler")?;
    }

    let mut last_recording = false;
    while running.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_millis(200));
        let recording = pipeline.recorder().writer_active();
        if recording != last_recording {
            println!(
                "{}",
                if recording {
                    "recording started"
                } else {
                    "recording stopped"
                }
            );
            last_recording = recording;
        }
    }

    println!("shutting down...");
    pipeline.stop();
    let (dropped_frames, dropped_imv) = pipeline.recorder().dropped_chunks();
    if dropped_frames > 0 || dropped_imv > 0 {
        println!(
            "dropped chunks: {} frame, {} motion vector",
            dropped_frames, dropped_imv
        );
    }
    Ok(())
}

//! Export a project to video.

use std::io::Write;
use std::path::PathBuf;

use storyreel_common::{AppConfig, ExportDefaults};
use storyreel_render_engine::{export_project, ExportJob, ExportProgress, ExportStage, ProgressCallback};

use super::{load, open_store};

pub async fn run(
    config: &AppConfig,
    key: &str,
    defaults: &ExportDefaults,
    output: PathBuf,
    dry_run: bool,
) -> anyhow::Result<()> {
    let store = open_store(config);
    let project = load(&store, key)?;
    let job = ExportJob::from_defaults(defaults, output);

    let plan = job.plan(&project, job.format);
    println!("Exporting project: {}", project.title);
    println!("  Output: {}", plan.output_path.display());
    println!("  Format: {:?} ({})", plan.format, plan.format.mime_type());
    println!(
        "  Resolution: {}x{} @ {}fps",
        plan.settings.width, plan.settings.height, plan.fps
    );
    println!(
        "  Duration: {:.3}s ({} frames)",
        plan.duration_secs, plan.total_frames
    );

    if dry_run {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    let progress_cb: ProgressCallback = Box::new(|p: ExportProgress| {
        match p.stage {
            ExportStage::Rendering => print!(
                "\r  Progress: {:.1}% ({}/{} frames, ETA: {:.0}s)  ",
                p.progress * 100.0,
                p.frames_rendered,
                p.total_frames,
                p.eta_secs,
            ),
            ExportStage::Preloading => print!("\r  Preloading sources: {:.0}%  ", p.progress * 100.0),
            ExportStage::Encoding => print!("\r  Encoding audio and container...              "),
            _ => {}
        }
        std::io::stdout().flush().ok();
    });

    match export_project(&project, &job, Some(progress_cb)).await {
        Ok(report) => {
            println!();
            match &report.output_path {
                Some(path) => println!("Export complete: {}", path.display()),
                None => println!("Export complete"),
            }
            println!("  Frames: {}", report.total_frames);
            if report.skipped_frames > 0 {
                println!(
                    "  [WARN] {} frames used the placeholder ({})",
                    report.skipped_frames,
                    report.failed_sources.join(", ")
                );
            }
            if !report.audio_muxed && !project.timeline.audio_track.is_empty() {
                println!("  [WARN] Audio could not be mixed in; the export is video-only");
            }
            Ok(())
        }
        Err(e) if e.is_capability_error() => {
            println!();
            anyhow::bail!("Export is not supported here: {e}")
        }
        Err(e) => {
            println!();
            Err(anyhow::anyhow!("Export failed: {e}"))
        }
    }
}

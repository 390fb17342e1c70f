//! Show what an export would render.

use montage_media::plan;
use montage_pipeline::MontageConfig;

use super::ExportArgs;
use crate::session::Session;

pub async fn run(config: MontageConfig, args: ExportArgs) -> anyhow::Result<()> {
    let session = Session::start(config)?;
    let project = session.open_project(&args.project, args.proxies).await?;
    let settings = args.settings(&session.config, &project)?;
    let plan = plan(&project, &settings, session.catalog())?;

    println!("Project: {} ({})", plan.project_name, plan.project_id);
    println!(
        "  Duration: {:.3}s, {} frames @ {} fps",
        plan.duration,
        plan.total_frames(),
        plan.settings.frame_rate
    );
    println!("  Output: {}", plan.output_path.display());
    println!("  Segments:");
    for segment in &plan.segments {
        println!(
            "    [{}] {:?} {} {:.3}-{:.3} at {:.3}  {}",
            segment.track_index,
            segment.track_kind,
            segment.asset_id,
            segment.source_in,
            segment.source_out,
            segment.timeline_start,
            segment.source_path.display()
        );
    }
    println!();
    println!("{}", plan.invocation().command_line());

    session.scheduler.shutdown().await;
    Ok(())
}

//! Render a project through the pipeline.

use montage_media::plan;
use montage_pipeline::{JobRequest, JobState, MontageConfig};
use tokio::sync::broadcast::error::RecvError;

use super::ExportArgs;
use crate::session::Session;

pub async fn run(config: MontageConfig, args: ExportArgs) -> anyhow::Result<()> {
    let session = Session::start(config)?;
    let project = session.open_project(&args.project, args.proxies).await?;
    let settings = args.settings(&session.config, &project)?;
    let plan = plan(&project, &settings, session.catalog())?;

    println!("Exporting {} to {}", plan.project_name, plan.output_path.display());
    println!(
        "  {} segment(s), {:.3}s, {} frames",
        plan.segments.len(),
        plan.duration,
        plan.total_frames()
    );

    let mut events = session.scheduler.events();
    let job = session.scheduler.submit(JobRequest::export(plan))?;
    let mut handle = session.scheduler.subscribe(job)?;

    let progress = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) if event.job_id == job && event.state == JobState::Running => {
                    if event.attempt > 1 {
                        println!("  Retrying (attempt {})", event.attempt);
                    }
                }
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            }
        }
    });
    let outcome = handle.wait().await;
    progress.abort();

    session.scheduler.shutdown().await;
    match outcome.state {
        JobState::Succeeded => {
            if let Some(path) = outcome.artifact {
                println!("Export complete: {}", path.display());
            }
            Ok(())
        }
        state => anyhow::bail!("export {state}"),
    }
}

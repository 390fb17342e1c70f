//! Import media through the pipeline.

use std::path::PathBuf;

use montage_pipeline::{JobRequest, MontageConfig};

use crate::session::{wait_all, Session};

pub async fn run(config: MontageConfig, paths: Vec<PathBuf>, proxies: bool) -> anyhow::Result<()> {
    let session = Session::start(config)?;

    let mut assets = Vec::new();
    let mut handles = Vec::new();
    for path in &paths {
        let job = if proxies {
            let ticket = session.scheduler.import(path)?;
            assets.push(ticket.asset_id);
            ticket.proxy
        } else {
            let asset_id = session.catalog().register_asset(path)?;
            assets.push(asset_id);
            session.scheduler.submit(JobRequest::probe(asset_id))?
        };
        handles.push(session.scheduler.subscribe(job)?);
    }
    println!("Importing {} file(s)...", paths.len());
    wait_all(handles).await;

    let mut failed = 0;
    for id in assets {
        let Some(asset) = session.catalog().get(id) else {
            continue;
        };
        println!("{}  {:<11}  {}", asset.id, asset.status, asset.source_path.display());
        if let Some(meta) = &asset.metadata {
            println!(
                "    {}x{} @ {} fps, {:.2}s, {}",
                meta.width, meta.height, meta.frame_rate, meta.duration, meta.codec
            );
        }
        if let Some(proxy) = &asset.proxy_path {
            println!("    proxy: {}", proxy.display());
        }
        if let Some(reason) = &asset.failure {
            failed += 1;
            println!("    failed: {reason}");
        }
    }

    session.scheduler.shutdown().await;
    if failed > 0 {
        anyhow::bail!("{failed} file(s) failed to import");
    }
    Ok(())
}

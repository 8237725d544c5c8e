//! `docsearch rebuild`: recompute the keywords of every document in a model.

use anyhow::Result;

use docsearch_core::RebuildReport;

use crate::config::Config;
use crate::context::SearchContext;

pub async fn rebuild_model(config: &Config, model_name: &str) -> Result<RebuildReport> {
    let ctx = SearchContext::open(config).await?;
    let model = ctx.model(model_name).await?;
    let report = model.rebuild_all_keywords().await;
    ctx.close().await;
    report
}

pub async fn run_rebuild(config: &Config, model_name: &str) -> Result<()> {
    let report = rebuild_model(config, model_name).await?;

    if report.total == 0 {
        println!("No documents in {}.", model_name);
        return Ok(());
    }
    println!(
        "Rebuilt keywords for {} of {} documents in {}",
        report.rebuilt, report.total, model_name
    );
    if report.failed > 0 {
        println!("  {} failed (see log)", report.failed);
    }
    Ok(())
}

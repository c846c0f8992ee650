//! The `cache` command: operator maintenance of the dedup store.

use anyhow::{Context, Result};
use thesis_downloader_core::{CacheOutcome, CacheRecord, DedupCache, ItemId};

use crate::ProcessExit;
use crate::cli::{CacheAction, CacheArgs};

pub(crate) async fn run_cache_command(args: &CacheArgs) -> Result<ProcessExit> {
    let cache = DedupCache::open(&args.cache)
        .await
        .with_context(|| format!("Failed to open cache '{}'", args.cache.display()))?;

    match &args.action {
        CacheAction::List => {
            for record in cache.items().await? {
                println!("{}", format_record(&record));
            }
        }
        CacheAction::Forget { id } => {
            let id = ItemId::parse(id)?;
            if cache.delete(&id).await? {
                println!("forgot {id}");
            } else {
                println!("no record for {id}");
            }
        }
        CacheAction::Clear => {
            let removed = cache.clear().await?;
            println!("removed {removed} records");
        }
        CacheAction::Count => println!("{}", cache.len().await?),
    }

    cache.close().await;
    Ok(ProcessExit::Success)
}

fn format_record(record: &CacheRecord) -> String {
    let detail = match &record.outcome {
        CacheOutcome::Saved(paths) => paths
            .iter()
            .map(|path| path.display().to_string())
            .collect::<Vec<_>>()
            .join(", "),
        CacheOutcome::NotFound { reason } => reason.clone(),
    };
    format!(
        "{}\t{}\t{}\t{detail}",
        record.item_id,
        record.outcome.status(),
        record.recorded_at
    )
}

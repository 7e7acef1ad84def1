// MangaSync - Reading List Catalog Matcher
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Desktop batch-match CLI
//!
//! Loads a JSON reading-list export, runs the batch matcher against the
//! remote catalog with live progress output, and writes the match results
//! as JSON. Ctrl-C cancels cooperatively: whatever has resolved so far is
//! still written out.

use anyhow::{Context, Result};
use clap::Parser;
use mangasync::api::{CatalogClient, ClientConfig, MangaDexSource, MangaUpdatesSource};
use mangasync::config::MatchConfig;
use mangasync::matching::{
    BatchContext, BatchMatcher, CancelSignal, MatchProgress, RequestBudget, SearchCache,
    SearchEngine,
};
use mangasync::models::SourceEntry;
use mangasync::storage::{Database, SnapshotStore, SqliteSnapshotStore};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "mangasync-cli", about = "Match a reading-list export against the catalog")]
struct Args {
    /// JSON file with the exported source entries
    #[arg(long)]
    input: PathBuf,

    /// Where to write the match results JSON
    #[arg(long, default_value = "match_results.json")]
    output: PathBuf,

    /// SQLite database for the persistent cache snapshot
    #[arg(long, default_value = "mangasync.db")]
    database: PathBuf,

    /// Bearer token for authenticated catalog requests
    #[arg(long)]
    token: Option<String>,

    /// Ignore and invalidate cached results, forcing fresh searches
    #[arg(long)]
    bypass_cache: bool,

    /// Skip the alternative catalogs even when the primary finds nothing
    #[arg(long)]
    no_fallbacks: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let raw = tokio::fs::read_to_string(&args.input)
        .await
        .with_context(|| format!("failed to read export {}", args.input.display()))?;
    let entries: Vec<SourceEntry> =
        serde_json::from_str(&raw).context("export is not a valid source entry list")?;
    println!("Loaded {} entries from {}", entries.len(), args.input.display());

    let mut config = MatchConfig::default();
    if args.no_fallbacks {
        config.enable_mangadex = false;
        config.enable_mangaupdates = false;
    }

    let budget = Arc::new(RequestBudget::new(config.rate_limit.clone()));
    let cache = Arc::new(SearchCache::new(config.cache_ttl_hours));

    // Merge the persisted snapshot into the live cache before matching
    let db = Database::new(&args.database)
        .await
        .context("failed to open cache database")?;
    let store = SqliteSnapshotStore::new(db);
    let snapshot = store
        .load_cache_snapshot()
        .await
        .context("failed to load cache snapshot")?;
    println!("Cache snapshot: {} records", snapshot.len());
    cache.sync_from_persisted(snapshot).await;

    let mut client_config = ClientConfig::default();
    client_config.token = args.token;
    let client = Arc::new(CatalogClient::new(client_config)?.with_budget(Arc::clone(&budget)));

    let mut engine = SearchEngine::new(client.clone(), Arc::clone(&cache), budget);
    engine = engine.with_fallback(Arc::new(MangaDexSource::new()?));
    engine = engine.with_fallback(Arc::new(MangaUpdatesSource::new()?));
    let matcher = BatchMatcher::new(client, Arc::new(engine));

    // Ctrl-C trips the shared cancellation signal; the batch returns
    // whatever already resolved
    let cancel = CancelSignal::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nCancelling... finishing in-flight work");
            ctrl_c_cancel.cancel();
        }
    });

    let ctx = BatchContext::new()
        .with_cancel(cancel)
        .with_progress(Arc::new(|p: MatchProgress| {
            println!("[{}/{}] {}", p.completed, p.total, p.title);
        }));

    let results = matcher
        .match_batch(&entries, &config, &ctx, args.bypass_cache)
        .await?;

    let matched = results
        .iter()
        .filter(|r| !r.candidates.is_empty())
        .count();
    println!(
        "Done: {} of {} entries have candidates ({} unresolved)",
        matched,
        results.len(),
        results.len() - matched
    );

    tokio::fs::write(&args.output, serde_json::to_vec_pretty(&results)?)
        .await
        .with_context(|| format!("failed to write {}", args.output.display()))?;
    println!("Results written to {}", args.output.display());

    store
        .save_cache_snapshot(&cache.snapshot().await)
        .await
        .context("failed to persist cache snapshot")?;

    Ok(())
}

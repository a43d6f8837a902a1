//! Replays a watch-state snapshot onto a live server.
//!
//! Every snapshot record ends up either successful (marked now or already
//! played) or failed (unresolved, series lookup failed, or the mark call
//! errored). No failure stops the remaining records from being processed.

use crate::identity::{IdentityIndex, MatchedBy};
use crate::missing::LocalLibrary;
use crate::models::{Backup, ItemKind, TargetItem, WatchedRecord};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::ops::AddAssign;
use tracing::{debug, error, info, instrument, warn};

/// Series name to season name to the records of that season, sorted by name.
pub type EpisodeGroups = BTreeMap<String, BTreeMap<String, Vec<WatchedRecord>>>;

/// Operations restore needs from the target server.
#[async_trait]
pub trait LiveCatalog: LocalLibrary {
    async fn get_all_movies(&self) -> Result<Vec<TargetItem>>;
    /// Series search results as `(id, name)` in server order.
    async fn search_series(&self, name: &str) -> Result<Vec<(String, String)>>;
    async fn mark_as_watched(&self, item_id: &str) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreTally {
    pub successful: usize,
    pub failed: usize,
}

impl AddAssign for RestoreTally {
    fn add_assign(&mut self, other: Self) {
        self.successful += other.successful;
        self.failed += other.failed;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreSummary {
    pub successful: usize,
    pub failed: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    Marked,
    AlreadyPlayed,
    NotFound,
    MarkFailed,
}

impl ItemOutcome {
    fn is_success(self) -> bool {
        matches!(self, ItemOutcome::Marked | ItemOutcome::AlreadyPlayed)
    }
}

impl RestoreTally {
    fn record(&mut self, outcome: ItemOutcome) {
        if outcome.is_success() {
            self.successful += 1;
        } else {
            self.failed += 1;
        }
    }
}

/// Splits a snapshot into movies and episode groups. Records of unknown kind
/// are dropped.
pub fn partition(records: &[WatchedRecord]) -> (Vec<WatchedRecord>, EpisodeGroups) {
    let mut movies = Vec::new();
    let mut groups = EpisodeGroups::new();

    for record in records {
        match record.kind {
            ItemKind::Movie => movies.push(record.clone()),
            ItemKind::Episode => groups
                .entry(record.series_name.clone().unwrap_or_default())
                .or_default()
                .entry(record.season_name.clone().unwrap_or_default())
                .or_default()
                .push(record.clone()),
            ItemKind::Unknown => debug!("Skipping item of unknown type: {}", record.name),
        }
    }

    (movies, groups)
}

fn group_len(seasons: &BTreeMap<String, Vec<WatchedRecord>>) -> usize {
    seasons.values().map(Vec::len).sum()
}

/// Restores movies first, then TV shows, and returns the combined counts.
#[instrument(skip_all, fields(items = backup.watched_items.len()))]
pub async fn restore<C: LiveCatalog + ?Sized>(catalog: &C, backup: &Backup) -> RestoreSummary {
    let (movies, groups) = partition(&backup.watched_items);
    let episode_count: usize = groups.values().map(group_len).sum();
    info!("Found {} movies and {} TV shows", movies.len(), groups.len());

    let mut tally = RestoreTally::default();

    if !movies.is_empty() {
        info!("=== Processing {} Movies ===", movies.len());
        tally += restore_movies(catalog, &movies).await;
    }

    if !groups.is_empty() {
        info!("=== Processing {} TV Shows ===", groups.len());
        tally += restore_episodes(catalog, &groups).await;
    }

    let summary = RestoreSummary {
        successful: tally.successful,
        failed: tally.failed,
        total: movies.len() + episode_count,
    };
    info!(
        "Restore complete: {} successful, {} failed, {} total",
        summary.successful, summary.failed, summary.total
    );
    summary
}

pub async fn restore_movies<C: LiveCatalog + ?Sized>(
    catalog: &C,
    movies: &[WatchedRecord],
) -> RestoreTally {
    let targets = match catalog.get_all_movies().await {
        Ok(targets) => targets,
        Err(e) => {
            error!("Error fetching movies from server: {}", e);
            return RestoreTally {
                successful: 0,
                failed: movies.len(),
            };
        }
    };
    let index = IdentityIndex::build(&targets);

    let mut tally = RestoreTally::default();
    for (i, movie) in movies.iter().enumerate() {
        info!("[{}/{}] Processing movie: {}", i + 1, movies.len(), movie.name);
        tally.record(apply(catalog, &index, movie).await);
    }
    tally
}

pub async fn restore_episodes<C: LiveCatalog + ?Sized>(
    catalog: &C,
    groups: &EpisodeGroups,
) -> RestoreTally {
    let mut tally = RestoreTally::default();

    for (i, (series_name, seasons)) in groups.iter().enumerate() {
        let count = group_len(seasons);
        info!(
            "[{}/{}] Processing show: {} ({} episodes)",
            i + 1,
            groups.len(),
            series_name,
            count
        );
        tally += restore_series(catalog, series_name, seasons, count).await;
    }

    tally
}

#[instrument(skip(catalog, seasons, count))]
async fn restore_series<C: LiveCatalog + ?Sized>(
    catalog: &C,
    series_name: &str,
    seasons: &BTreeMap<String, Vec<WatchedRecord>>,
    count: usize,
) -> RestoreTally {
    let all_failed = RestoreTally {
        successful: 0,
        failed: count,
    };

    let series_id = match find_series_id(catalog, series_name).await {
        Ok(Some(id)) => id,
        Ok(None) => {
            warn!("Series not found: {}", series_name);
            return all_failed;
        }
        Err(e) => {
            error!("Error finding series '{}': {}", series_name, e);
            return all_failed;
        }
    };

    let episodes = match catalog.get_episodes_for_series(&series_id).await {
        Ok(episodes) => episodes,
        Err(e) => {
            error!("Error fetching episodes for '{}': {}", series_name, e);
            return all_failed;
        }
    };
    let targets: Vec<TargetItem> = episodes.iter().map(TargetItem::from).collect();
    let index = IdentityIndex::build(&targets);

    let mut tally = RestoreTally::default();
    for (season_name, records) in seasons {
        info!("  Season: {} ({} episodes)", season_name, records.len());
        for record in records {
            tally.record(apply(catalog, &index, record).await);
        }
    }
    tally
}

/// Exact name match among the search results, otherwise the first result.
pub async fn find_series_id<C: LiveCatalog + ?Sized>(
    catalog: &C,
    series_name: &str,
) -> Result<Option<String>> {
    let results = catalog.search_series(series_name).await?;
    let exact = results.iter().find(|(_, name)| name == series_name);
    Ok(exact.or(results.first()).map(|(id, _)| id.clone()))
}

async fn apply<C: LiveCatalog + ?Sized>(
    catalog: &C,
    index: &IdentityIndex,
    record: &WatchedRecord,
) -> ItemOutcome {
    let resolved = match index.resolve(record) {
        Ok(resolved) => resolved,
        Err(e) => {
            warn!("  ✗ {}", e);
            return ItemOutcome::NotFound;
        }
    };

    match &resolved.matched_by {
        MatchedBy::Provider(key) => debug!("'{}' matched by provider ID {}", record.name, key),
        MatchedBy::SecondaryKey(key) => debug!("'{}' matched by name '{}'", record.name, key),
    }

    if resolved.item.played {
        info!("  ○ {} already watched, skipping", record.name);
        return ItemOutcome::AlreadyPlayed;
    }

    match catalog.mark_as_watched(&resolved.item.id).await {
        Ok(()) => {
            info!("  ✓ {} marked as watched", record.name);
            ItemOutcome::Marked
        }
        Err(e) => {
            error!("  ✗ {} failed to mark as watched: {}", record.name, e);
            ItemOutcome::MarkFailed
        }
    }
}

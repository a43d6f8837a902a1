//! Missing episode detection.
//!
//! A local file can hold several catalog episodes (two-part finales are often
//! saved as one file). Episodes absent from the local library are therefore
//! only reported once the runtime of the preceding local file can no longer
//! account for them.

use crate::models::{
    local_runtimes, CatalogEpisode, LibraryEpisode, LocalRuntimes, MissingEpisode, SeriesInfo,
};
use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::{debug, info, instrument, warn};

/// Percentage of the accumulated expected runtime a local file has to cover
/// for an absent episode to count as merged into it.
const MERGE_THRESHOLD_PERCENT: i64 = 85;

const AIR_DATE_FORMAT: &str = "%Y-%m-%d";

/// Provider key under which local series carry their TVDB ID.
pub const TVDB_PROVIDER: &str = "Tvdb";

/// Fold accumulator for the scan over a series' episodes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChainState {
    pub active: bool,
    pub season: i32,
    /// Runtime of the local file anchoring the chain.
    pub observed_runtime: i64,
    /// Sum of expected runtimes of every episode folded into the chain.
    pub expected_accum: i64,
}

impl ChainState {
    /// Advances the fold by one catalog episode and returns the new state,
    /// plus the episode if it has to be reported missing.
    pub fn step(
        self,
        episode: &CatalogEpisode,
        local: &LocalRuntimes,
        include_specials: bool,
        today: NaiveDate,
    ) -> (ChainState, Option<MissingEpisode>) {
        let key = (episode.season_number, episode.episode_number);

        if let Some(&observed) = local.get(&key) {
            let anchored = ChainState {
                active: true,
                season: episode.season_number,
                observed_runtime: i64::from(observed),
                expected_accum: i64::from(episode.runtime_minutes),
            };
            return (anchored, None);
        }

        if episode.season_number == 0 && !include_specials {
            return (self, None);
        }

        if !has_aired(&episode.air_date, today) {
            return (self, None);
        }

        if self.active && self.season == episode.season_number {
            let extended = ChainState {
                expected_accum: self
                    .expected_accum
                    .saturating_add(i64::from(episode.runtime_minutes)),
                ..self
            };
            if extended.covers_expected() {
                return (extended, None);
            }
        }

        (
            ChainState {
                active: false,
                ..self
            },
            Some(MissingEpisode {
                season_number: episode.season_number,
                episode_number: episode.episode_number,
                name: episode.name.clone(),
                air_date: episode.air_date.clone(),
                overview: episode.overview.clone(),
            }),
        )
    }

    fn covers_expected(&self) -> bool {
        self.observed_runtime.saturating_mul(100)
            >= self.expected_accum.saturating_mul(MERGE_THRESHOLD_PERCENT)
    }
}

/// True when `air_date` parses and lies strictly before `today`.
fn has_aired(air_date: &str, today: NaiveDate) -> bool {
    NaiveDate::parse_from_str(air_date.trim(), AIR_DATE_FORMAT)
        .map(|date| date < today)
        .unwrap_or(false)
}

/// Returns the aired episodes that are absent locally and not contained in a
/// preceding local file. `episodes` must be ordered by season then episode.
pub fn detect_missing(
    episodes: &[CatalogEpisode],
    local: &LocalRuntimes,
    include_specials: bool,
    today: NaiveDate,
) -> Vec<MissingEpisode> {
    let mut missing = Vec::new();
    let mut state = ChainState::default();
    for episode in episodes {
        let (next, reported) = state.step(episode, local, include_specials, today);
        state = next;
        missing.extend(reported);
    }
    missing
}

/// Source of authoritative episode listings.
#[async_trait]
pub trait EpisodeSource: Send + Sync {
    /// All episodes of a series ordered by season then episode, every page
    /// already fetched.
    async fn series_episodes(&self, series_id: &str) -> Result<Vec<CatalogEpisode>>;
}

/// The local library the scan compares against.
#[async_trait]
pub trait LocalLibrary: Send + Sync {
    async fn get_all_series(&self) -> Result<Vec<SeriesInfo>>;
    async fn get_episodes_for_series(&self, series_id: &str) -> Result<Vec<LibraryEpisode>>;
}

#[derive(Debug, Clone)]
pub struct SeriesReport {
    pub series_name: String,
    pub tvdb_id: String,
    pub catalog_total: usize,
    pub missing: Vec<MissingEpisode>,
}

#[derive(Debug, Default)]
pub struct ScanSummary {
    pub series_checked: usize,
    pub series_failed: usize,
    pub reports: Vec<SeriesReport>,
}

impl ScanSummary {
    pub fn total_missing(&self) -> usize {
        self.reports.iter().map(|r| r.missing.len()).sum()
    }
}

/// Checks every local series that carries a TVDB ID. A failed fetch for one
/// series is logged and the scan moves on to the next.
#[instrument(skip(library, source))]
pub async fn scan_library<L, S>(
    library: &L,
    source: &S,
    include_specials: bool,
    today: NaiveDate,
) -> Result<ScanSummary>
where
    L: LocalLibrary + ?Sized,
    S: EpisodeSource + ?Sized,
{
    let series = library.get_all_series().await?;
    info!("Found {} series in library", series.len());

    let mut summary = ScanSummary {
        series_checked: series.len(),
        ..ScanSummary::default()
    };

    for (i, show) in series.iter().enumerate() {
        let Some(tvdb_id) = show.provider_ids.get(TVDB_PROVIDER) else {
            continue;
        };
        let position = format!("[{}/{}]", i + 1, series.len());

        let catalog = match source.series_episodes(tvdb_id).await {
            Ok(episodes) => episodes,
            Err(e) => {
                warn!("{} {} (TVDB: {}): could not fetch TVDB episodes: {}", position, show.name, tvdb_id, e);
                summary.series_failed += 1;
                continue;
            }
        };

        let local = match library.get_episodes_for_series(&show.id).await {
            Ok(episodes) => local_runtimes(&episodes),
            Err(e) => {
                warn!("{} {} (TVDB: {}): could not fetch library episodes: {}", position, show.name, tvdb_id, e);
                summary.series_failed += 1;
                continue;
            }
        };

        let missing = detect_missing(&catalog, &local, include_specials, today);
        if missing.is_empty() {
            debug!("{} {}: complete", position, show.name);
            continue;
        }

        summary.reports.push(SeriesReport {
            series_name: show.name.clone(),
            tvdb_id: tvdb_id.clone(),
            catalog_total: catalog.len(),
            missing,
        });
    }

    Ok(summary)
}

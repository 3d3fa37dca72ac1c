//! Batch download orchestrator.
//!
//! Takes one query and drives the whole pipeline: resolve the series,
//! walk its seasons and episodes, resolve each episode's direct link and
//! hand it to the transfer engine. Episodes are strictly sequential; the
//! only state shared with the transfer engine is the client itself.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, anyhow, bail};
use dialoguer::Confirm;
use regex::Regex;
use tracing::{info, warn};

use crate::base_system::interrupt;
use crate::site::hops;
use crate::site::models::{EpisodeFile, EpisodeRecord, SeriesRecord};
use crate::site::{Category, FetchError, Query, SearchCursor, SiteClient};

use super::transfer::{self, TransferError, TransferOptions};

/// File quality variant to prefer when an episode offers both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Quality {
    /// Higher-bitrate MP4, tagged `(p)` on the site.
    HighMp4,
    /// Smaller WEBM, tagged `(w)`.
    Webm,
}

impl Quality {
    /// The single-letter tag the site uses next to file links.
    pub fn identity(self) -> &'static str {
        match self {
            Quality::HighMp4 => "p",
            Quality::Webm => "w",
        }
    }
}

impl std::fmt::Display for Quality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Quality::HighMp4 => "high-mp4",
            Quality::Webm => "webm",
        })
    }
}

#[derive(Debug, Clone)]
pub struct AutoOptions {
    /// 1-based season to start from.
    pub season_offset: usize,
    /// 1-based episode to start from, applied to the first season only.
    pub episode_offset: usize,
    /// Stop after this many episodes.
    pub limit: usize,
    pub trials: u32,
    pub transfer_timeout: Duration,
    pub format: Quality,
    pub directory: PathBuf,
    pub progress_bar: bool,
    pub quiet: bool,
    /// Keep the site's metadata-laden filename instead of the plain
    /// episode title.
    pub include_metadata: bool,
    pub one_season_only: bool,
    pub ignore_errors: bool,
    pub confirm: bool,
    pub chunk_size: usize,
}

pub struct Auto<'a> {
    client: &'a SiteClient,
    query: Query,
    options: AutoOptions,
}

impl<'a> Auto<'a> {
    pub fn new(client: &'a SiteClient, query: Query, options: AutoOptions) -> Self {
        Self {
            client,
            query,
            options,
        }
    }

    /// Run the batch to completion. Returns the paths of every episode
    /// that landed on disk, including ones found already complete.
    pub fn run(&self) -> anyhow::Result<Vec<PathBuf>> {
        match self.query.category() {
            Category::Series => self.run_series(),
            Category::Episodes => self.run_episodes(),
        }
    }

    /// Series flow: resolve the best series match, then walk its seasons
    /// in page order.
    fn run_series(&self) -> anyhow::Result<Vec<PathBuf>> {
        let mut cursor: SearchCursor<'_, SeriesRecord> = SearchCursor::new(self.client, &self.query);
        let page = cursor.run().context("series search failed")?;
        let series = page
            .items
            .first()
            .ok_or_else(|| anyhow!("series search returned an empty page"))?
            .clone();
        info!(series = %series.title, "resolved series");

        let detail = hops::series_detail(self.client, &series.url)
            .with_context(|| format!("failed to open series page for '{}'", series.title))?;
        if self.options.season_offset > detail.seasons.len() {
            bail!(
                "season offset {} is beyond the {} season(s) of '{}'",
                self.options.season_offset,
                detail.seasons.len(),
                detail.title
            );
        }

        let mut downloaded = Vec::new();
        for (index, season) in detail.seasons[self.options.season_offset - 1..]
            .iter()
            .enumerate()
        {
            info!(season = %season.label, "entering season");
            // The episode offset only applies to the season the run
            // starts in. The listing budget must cover the skipped
            // episodes too, or the offset could swallow the whole fetch.
            let skip = if index == 0 {
                self.options.episode_offset - 1
            } else {
                0
            };
            let episodes = SearchCursor::from_url(self.client, &season.url)
                .fetch_all(listing_budget(self.options.limit, skip))
                .with_context(|| format!("failed to list episodes of '{}'", season.label))?;
            for episode in episodes.items.iter().skip(skip) {
                if !self.download_one(episode, &mut downloaded)? {
                    return Ok(downloaded);
                }
            }
            if self.options.one_season_only {
                break;
            }
        }
        Ok(downloaded)
    }

    /// Episode flow: every search hit is downloaded directly, page by
    /// page, without resolving series or seasons.
    fn run_episodes(&self) -> anyhow::Result<Vec<PathBuf>> {
        let cursor: SearchCursor<'_, EpisodeRecord> = SearchCursor::new(self.client, &self.query);
        let mut downloaded = Vec::new();
        for page in cursor.pages(self.options.limit) {
            let page = page.context("episode search failed")?;
            for episode in &page.items {
                if !self.download_one(episode, &mut downloaded)? {
                    return Ok(downloaded);
                }
            }
        }
        Ok(downloaded)
    }

    /// Download one episode, appending its path to `downloaded`.
    ///
    /// Returns `Ok(false)` when the run should stop: the episode limit
    /// was reached or the user interrupted.
    fn download_one(
        &self,
        episode: &EpisodeRecord,
        downloaded: &mut Vec<PathBuf>,
    ) -> anyhow::Result<bool> {
        if downloaded.len() >= self.options.limit {
            return Ok(false);
        }
        if interrupt::interrupted() {
            return Ok(false);
        }

        match self.download_episode(episode) {
            Ok(Some(path)) => downloaded.push(path),
            Ok(None) => {}
            Err(err) if is_interrupt(&err) => {
                warn!("stopping batch on interrupt");
                return Ok(false);
            }
            Err(err) if self.options.ignore_errors => {
                warn!(episode = %episode.title, "skipping failed episode: {err:#}");
            }
            Err(err) => return Err(err),
        }
        Ok(downloaded.len() < self.options.limit && !interrupt::interrupted())
    }

    /// Resolve and transfer one episode, retrying up to the configured
    /// number of trials. `Ok(None)` means the user declined the prompt.
    fn download_episode(&self, episode: &EpisodeRecord) -> anyhow::Result<Option<PathBuf>> {
        let naming = decode_episode_title(&episode.title)
            .with_context(|| format!("unrecognized episode title '{}'", episode.title))?;
        let file = pick_file(&episode.files, self.options.format)
            .ok_or_else(|| anyhow!("episode '{}' has no file links", episode.title))?;

        if self.options.confirm {
            let mut prompt = format!("Download {}?", episode.title);
            if let Some(aired) = episode.aired_on {
                prompt = format!("Download {} (aired {aired})?", episode.title);
            }
            let proceed = Confirm::new()
                .with_prompt(prompt)
                .default(true)
                .interact()
                .context("confirmation prompt failed")?;
            if !proceed {
                info!(episode = %episode.title, "skipped by user");
                return Ok(None);
            }
        }

        let dir = self
            .options
            .directory
            .join(sanitize_component(&naming.series))
            .join(&naming.season);

        let mut last_error = anyhow!("no download trial ran");
        for trial in 1..=self.options.trials.max(1) {
            if interrupt::interrupted() {
                return Err(TransferError::Interrupted.into());
            }
            match self.resolve_and_transfer(&naming, file, &dir) {
                Ok(path) => return Ok(Some(path)),
                Err(err) => match trial_policy(&err) {
                    TrialPolicy::Abort => return Err(err),
                    TrialPolicy::Skip => {
                        warn!(episode = %episode.title, "resume target disappeared, skipping: {err:#}");
                        return Ok(None);
                    }
                    TrialPolicy::Retry => {
                        warn!(
                            episode = %episode.title,
                            trial,
                            trials = self.options.trials,
                            "download attempt failed: {err:#}"
                        );
                        last_error = err;
                    }
                },
            }
        }
        Err(last_error.context(format!("gave up on '{}'", episode.title)))
    }

    /// One attempt: resolve the direct link fresh and stream it down.
    /// Links are never reused between attempts because each one may have
    /// been minted under keys that have since expired.
    fn resolve_and_transfer(
        &self,
        naming: &EpisodeNaming,
        file: &EpisodeFile,
        dir: &Path,
    ) -> anyhow::Result<PathBuf> {
        let manifest = match hops::episode_download_links(self.client, &file.url) {
            Ok(manifest) => manifest,
            Err(FetchError::Expired { recovery_url }) => {
                self.refresh_session(&recovery_url)?;
                hops::episode_download_links(self.client, &file.url)?
            }
            Err(err) => return Err(err.into()),
        };
        let candidate = manifest
            .links
            .first()
            .ok_or_else(|| anyhow!("download manifest carries no links"))?;
        let direct = match hops::final_download_link(self.client, candidate) {
            Ok(direct) => direct,
            Err(FetchError::Expired { recovery_url }) => {
                self.refresh_session(&recovery_url)?;
                return Err(anyhow!("download keys expired mid-resolution"));
            }
            Err(err) => return Err(err.into()),
        };

        let filename = if self.options.include_metadata {
            sanitize_component(&manifest.filename)
        } else {
            let ext = extension_of(&manifest.filename).unwrap_or("mp4");
            format!("{}.{ext}", sanitize_component(&naming.filename_stem()))
        };
        let dest = dir.join(filename);
        let resume = dest.exists();

        let result = transfer::download(
            self.client,
            &direct,
            &dest,
            &TransferOptions {
                chunk_size: self.options.chunk_size,
                resume,
                timeout: self.options.transfer_timeout,
                progress_bar: self.options.progress_bar,
                quiet: self.options.quiet,
            },
        );
        match result {
            Ok(path) => Ok(path),
            // A file the server has nothing left to send is done, not
            // failed; it counts as a delivered episode.
            Err(TransferError::AlreadyComplete) => {
                info!(path = %dest.display(), "already complete");
                Ok(dest)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Load the recovery page so the server reissues download keys, then
    /// let the caller retry resolution from the episode's file page.
    fn refresh_session(&self, recovery_url: &str) -> anyhow::Result<()> {
        warn!(recovery_url, "download keys expired, refreshing");
        self.client
            .fetch(
                recovery_url,
                self.client.config().request_timeout(),
                None,
            )
            .map_err(|err| anyhow!("session recovery failed: {err}"))?;
        Ok(())
    }
}

fn is_interrupt(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<TransferError>(),
        Some(TransferError::Interrupted)
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TrialPolicy {
    Retry,
    Skip,
    Abort,
}

/// Decide whether a failed attempt deserves another trial. Completion
/// faults are terminal for the episode: a vanished resume target ends
/// the trials quietly, a dead link and an interrupt abort outright.
fn trial_policy(err: &anyhow::Error) -> TrialPolicy {
    match err.downcast_ref::<TransferError>() {
        Some(TransferError::Interrupted) => TrialPolicy::Abort,
        Some(TransferError::EmptyContent) => TrialPolicy::Abort,
        Some(TransferError::ResumeTargetMissing(_)) => TrialPolicy::Skip,
        _ => TrialPolicy::Retry,
    }
}

/// Items to request from a season listing: the download ceiling plus
/// however many leading episodes the offset will discard.
fn listing_budget(limit: usize, skip: usize) -> usize {
    limit.saturating_add(skip)
}

/// Directory naming derived from a scraped episode title of the form
/// `"<series> - S01E02[tag] - <episode title>"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodeNaming {
    pub series: String,
    /// Season directory, e.g. `S01`.
    pub season: String,
    /// Full episode id, e.g. `S01E02`.
    pub episode_id: String,
    pub episode_title: String,
}

impl EpisodeNaming {
    fn filename_stem(&self) -> String {
        if self.episode_title.is_empty() {
            self.episode_id.clone()
        } else {
            format!("{} - {}", self.episode_id, self.episode_title)
        }
    }
}

/// Split a scraped episode title into series, season and episode parts.
/// Titles that do not carry the `SxxEyy` id cannot be placed on disk
/// and fail fast.
pub fn decode_episode_title(title: &str) -> anyhow::Result<EpisodeNaming> {
    let re = Regex::new(r"^(.+?) - (S\d+E\d+\S*)(?:\s*-\s*(.*))?$")?;
    let caps = re
        .captures(title.trim())
        .ok_or_else(|| anyhow!("title does not follow '<series> - SxxEyy - <name>'"))?;
    let episode_id = caps[2].to_string();
    let season = episode_id
        .split('E')
        .next()
        .unwrap_or(&episode_id)
        .to_string();
    Ok(EpisodeNaming {
        series: caps[1].trim().to_string(),
        season,
        episode_id,
        episode_title: caps
            .get(3)
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default(),
    })
}

/// Pick the file matching the wanted quality tag, falling back to the
/// first listed file when the episode does not offer that variant.
fn pick_file(files: &[EpisodeFile], quality: Quality) -> Option<&EpisodeFile> {
    files
        .iter()
        .find(|f| f.identity == quality.identity())
        .or_else(|| files.first())
}

fn sanitize_component(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => ' ',
            c => c,
        })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn extension_of(filename: &str) -> Option<&str> {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
}

mod archive;
mod download;
mod github;
mod state;

use anyhow::Result;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

use crate::config::StateStore;
use crate::error::UpdateError;
use crate::probe::probe_installed;
use crate::progress::DownloadProgress;
use crate::prompt::{Prompt, TerminalPrompt};
use crate::sync;

pub use archive::{ArchiveExtractor, ExtractStrategy, ExternalTool, NativeArchive, ShellCopy};
pub use download::DownloadCache;
pub use github::{Asset, FeedSource, RELEASES_URL, gh_client, is_weekly_asset};
pub use state::PipelineState;

/// Everything needed to apply one build, produced by [`UpdatePipeline::check`].
#[derive(Debug, Clone)]
pub struct UpdatePlan {
    pub asset: Asset,
    pub install_dir: PathBuf,
    /// Installed-vs-available text shown to the operator.
    pub summary: String,
}

#[derive(Debug)]
pub enum CheckOutcome {
    UpToDate { summary: String },
    Available(UpdatePlan),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    UpToDate,
    Declined,
    Updated(String),
}

/// Messages sent from the background update to the foreground.
///
/// `Progress` arrives in non-decreasing `downloaded` order, and exactly one
/// of `Done`/`Failed` ends the stream.
#[derive(Debug)]
pub enum UpdateEvent {
    Progress { downloaded: u64, total: u64 },
    Done(String),
    Failed(UpdateError),
}

/// A running background update.
pub struct UpdateHandle {
    pub events: Receiver<UpdateEvent>,
    worker: JoinHandle<()>,
}

impl UpdateHandle {
    /// Wait for the worker thread to exit; a panic reads as [`UpdateError::WorkerLost`].
    pub fn join(self) -> Result<(), UpdateError> {
        self.worker.join().map_err(|_| {
            warn!("update worker panicked");
            UpdateError::WorkerLost
        })
    }
}

/// The parts of the pipeline the background worker owns for one run.
#[derive(Clone)]
struct Worker {
    cache: DownloadCache,
    extractor: ArchiveExtractor,
    store: StateStore,
}

/// Orchestrates check → confirm → download → extract → merge → record.
///
/// Only one update may be in flight: while the state is
/// [`PipelineState::Updating`] every new check or start is rejected with
/// [`UpdateError::Busy`]. A started update cannot be cancelled; it runs
/// to success or failure.
pub struct UpdatePipeline {
    feed: FeedSource,
    worker: Worker,
    state: PipelineState,
}

impl UpdatePipeline {
    pub fn new(
        feed: FeedSource,
        cache: DownloadCache,
        extractor: ArchiveExtractor,
        store: StateStore,
    ) -> Self {
        UpdatePipeline {
            feed,
            worker: Worker {
                cache,
                extractor,
                store,
            },
            state: PipelineState::Idle,
        }
    }

    /// Pipeline wired to the real feed, the store's cache directory and the
    /// default extraction chain.
    pub fn from_store(store: StateStore) -> Result<Self, UpdateError> {
        let url = store
            .load_settings()
            .feed_url
            .unwrap_or_else(|| RELEASES_URL.to_string());
        let feed = FeedSource::new(gh_client()?, url);
        let cache = DownloadCache::new(&store.paths().downloads)?;
        Ok(UpdatePipeline::new(feed, cache, ArchiveExtractor::default(), store))
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Query the feed and decide whether an update is needed.
    ///
    /// `install_dir` overrides the remembered installation folder.
    pub fn check(&mut self, install_dir: Option<&Path>) -> Result<CheckOutcome, UpdateError> {
        if self.state.is_terminal() {
            self.state.advance(PipelineState::Idle)?;
        }
        self.state.advance(PipelineState::Checking)?;
        match self.check_inner(install_dir) {
            Ok(outcome) => {
                let next = match &outcome {
                    CheckOutcome::UpToDate { .. } => PipelineState::UpToDate,
                    CheckOutcome::Available(_) => PipelineState::AwaitingConfirmation,
                };
                self.state.advance(next)?;
                Ok(outcome)
            }
            Err(e) => {
                self.state.advance(PipelineState::Failed)?;
                Err(e)
            }
        }
    }

    fn check_inner(&self, install_dir: Option<&Path>) -> Result<CheckOutcome, UpdateError> {
        let latest = self
            .feed
            .latest_weekly_asset()?
            .ok_or(UpdateError::NoBuildFound)?;
        info!("latest weekly build: {}", latest.name);

        let store = &self.worker.store;
        let saved = store.load_last_version();
        let install_dir = install_dir
            .map(Path::to_path_buf)
            .or_else(|| store.load_settings().install_dir)
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or(UpdateError::InstallDirNotSet)?;

        let installed = probe_installed(&install_dir)
            .map(|v| v.to_string())
            .unwrap_or_else(|| "(not detected)".to_string());
        let mut lines = vec![
            format!("Installed: {}", installed),
            format!("Available: {}", latest.name),
        ];
        if let Some(s) = &saved {
            lines.push(format!("(Last downloaded by this app: {})", s));
        }
        let summary = lines.join("\n");

        if saved.as_deref() == Some(latest.name.as_str()) {
            debug!("{} already applied", latest.name);
            return Ok(CheckOutcome::UpToDate { summary });
        }
        Ok(CheckOutcome::Available(UpdatePlan {
            asset: latest,
            install_dir,
            summary,
        }))
    }

    /// The operator declined the offered update.
    pub fn decline(&mut self) -> Result<(), UpdateError> {
        self.state.advance(PipelineState::Idle)
    }

    /// Start applying `plan` on a background thread.
    pub fn start_update(&mut self, plan: UpdatePlan) -> Result<UpdateHandle, UpdateError> {
        self.state.advance(PipelineState::Updating)?;
        let (tx, rx) = mpsc::channel();
        let worker = self.worker.clone();
        let handle = thread::spawn(move || {
            let event = match worker.apply(&plan, &tx) {
                Ok(v) => UpdateEvent::Done(v),
                Err(e) => UpdateEvent::Failed(e),
            };
            let _ = tx.send(event);
        });
        Ok(UpdateHandle {
            events: rx,
            worker: handle,
        })
    }

    /// Record the end of a background update started with [`start_update`](Self::start_update).
    pub fn finish_update(&mut self, succeeded: bool) -> Result<(), UpdateError> {
        self.state.advance(if succeeded {
            PipelineState::Succeeded
        } else {
            PipelineState::Failed
        })
    }

    /// Start `plan`, forward its progress and wait for the result.
    pub fn run_update(
        &mut self,
        plan: UpdatePlan,
        on_progress: &mut dyn FnMut(u64, u64),
    ) -> Result<String, UpdateError> {
        let handle = self.start_update(plan)?;
        let mut result = Err(UpdateError::WorkerLost);
        for ev in handle.events.iter() {
            match ev {
                UpdateEvent::Progress { downloaded, total } => on_progress(downloaded, total),
                UpdateEvent::Done(v) => result = Ok(v),
                UpdateEvent::Failed(e) => result = Err(e),
            }
        }
        if let Err(e) = handle.join() {
            result = Err(e);
        }
        self.finish_update(result.is_ok())?;
        result
    }

    /// The whole interactive flow: check, ask, update, report.
    ///
    /// Every terminal failure is also handed to `prompt` verbatim.
    pub fn check_and_update(
        &mut self,
        install_dir: Option<&Path>,
        prompt: &mut dyn Prompt,
        on_progress: &mut dyn FnMut(u64, u64),
    ) -> Result<RunOutcome, UpdateError> {
        let plan = match self.check(install_dir) {
            Ok(CheckOutcome::UpToDate { summary }) => {
                prompt.info(
                    "Up to date",
                    &format!("You already downloaded the latest version.\n\n{}", summary),
                );
                return Ok(RunOutcome::UpToDate);
            }
            Ok(CheckOutcome::Available(plan)) => plan,
            Err(e) => {
                report(prompt, &e);
                return Err(e);
            }
        };

        let question = format!(
            "A new version was detected.\n\n{}\n\nDo you want to download and update now?",
            plan.summary
        );
        if !prompt.confirm("New version available", &question) {
            self.decline()?;
            return Ok(RunOutcome::Declined);
        }

        match self.run_update(plan, on_progress) {
            Ok(v) => {
                prompt.info("Update complete", &format!("Updated to version {}.", v));
                Ok(RunOutcome::Updated(v))
            }
            Err(e) => {
                report(prompt, &e);
                Err(e)
            }
        }
    }
}

fn report(prompt: &mut dyn Prompt, e: &UpdateError) {
    let title = if e.is_network() { "HTTP Error" } else { "Error" };
    prompt.error(title, &e.to_string());
}

impl Worker {
    /// Download, extract, merge, record; strictly in that order.
    ///
    /// The scratch directory is removed once extraction and merge have been
    /// attempted, whatever their outcome. The cached archive and any partial
    /// merge are left in place.
    fn apply(&self, plan: &UpdatePlan, tx: &Sender<UpdateEvent>) -> Result<String, UpdateError> {
        if plan.install_dir.as_os_str().is_empty() {
            return Err(UpdateError::InstallDirNotSet);
        }
        fs::create_dir_all(&plan.install_dir).map_err(|e| {
            UpdateError::filesystem(
                format!("failed to create {}", plan.install_dir.display()),
                e,
            )
        })?;

        let archive = self.cache.fetch(&plan.asset, &mut |downloaded, total| {
            let _ = tx.send(UpdateEvent::Progress { downloaded, total });
        })?;

        let scratch = tempfile::Builder::new()
            .prefix("fcup_")
            .tempdir()
            .map_err(|e| UpdateError::filesystem("failed to create scratch directory", e))?;
        let extract_dir = scratch.path().join("extracted");
        let merged = fs::create_dir_all(&extract_dir)
            .map_err(|e| {
                UpdateError::filesystem(format!("failed to create {}", extract_dir.display()), e)
            })
            .and_then(|_| self.extractor.extract(&archive, &extract_dir))
            .and_then(|root| sync::merge(&root, &plan.install_dir));
        let scratch_path = scratch.path().to_path_buf();
        if let Err(e) = scratch.close() {
            warn!("failed to remove {}: {}", scratch_path.display(), e);
        }
        merged?;

        let name = plan.asset.name.clone();
        self.store.save_last_version(&name).map_err(|e| {
            UpdateError::filesystem(
                format!("failed to record {}", name),
                io::Error::other(format!("{:#}", e)),
            )
        })?;
        let mut settings = self.store.load_settings();
        settings.install_dir = Some(plan.install_dir.clone());
        settings.last_version = Some(name.clone());
        self.store.save_settings(&settings);
        info!("applied {} to {}", name, plan.install_dir.display());
        Ok(name)
    }
}

/// Update FreeCAD to the latest weekly build.
///
/// Process:
/// 1. Resolve the newest weekly asset from the release feed.
/// 2. Compare it with the last build this tool applied.
///    - If equal → print "up to date" and exit.
/// 3. Show installed vs. available and ask for confirmation (`--yes` skips).
/// 4. Download (or reuse the cached archive), extract, merge into the
///    install folder and record the new version.
///
/// Returns `Ok(false)` when the run failed after the failure was reported.
pub fn cmd_check(install_dir: Option<&Path>, assume_yes: bool) -> Result<bool> {
    let store = StateStore::open()?;
    if let Some(dir) = install_dir {
        let mut settings = store.load_settings();
        settings.install_dir = Some(dir.to_path_buf());
        store.save_settings(&settings);
    }

    let mut prompt = TerminalPrompt::new(assume_yes);
    let mut pipeline = match UpdatePipeline::from_store(store) {
        Ok(p) => p,
        Err(e) => {
            report(&mut prompt, &e);
            return Ok(false);
        }
    };

    let mut bar: Option<DownloadProgress> = None;
    let outcome = pipeline.check_and_update(install_dir, &mut prompt, &mut |d, t| {
        bar.get_or_insert_with(DownloadProgress::new).update(d, t);
    });
    if let Some(b) = bar.as_ref().filter(|b| !b.is_finished()) {
        match &outcome {
            Ok(_) => b.finish_ok("download complete"),
            Err(_) => b.finish_err("download failed"),
        }
    }
    Ok(outcome.is_ok())
}

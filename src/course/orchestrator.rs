//! Course orchestration
//!
//! Walks courses, chapters and items strictly in order, lays out the directory
//! tree, drives the transfer engine through the retry policy and turns byte
//! counts into the three progress percentages.
//!
//! On-disk layout:
//!
//! ```text
//! <root>/<course>/[<chapter#>] <chapter>/[<item#>] <item>.mp4
//! <root>/<course>/[<chapter#>] <chapter>/[<item#>] <item>.srt
//! <root>/<course>/<course>.zip
//! ```

use std::{
    io,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tokio::{fs::File, sync::watch};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, instrument};
use ulid::Ulid;

use super::events::{
    EventSender, Label, ProgressSnapshot, RunEvent, RunStatus, StatusCell, course_percentage,
};
use crate::config::DownloadOptions;
use crate::content::{Chapter, ContentError, ContentTree, Course, Item};
use crate::download::{
    Attempt, Attempted, Downloader, Progress, RetryOutcome, RetryPolicy, TransferError,
};
use crate::util::{percentage, sanitize_file_name};

const MEDIA_EXTENSION: &str = "mp4";
const SUBTITLE_EXTENSION: &str = "srt";
const ARCHIVE_EXTENSION: &str = "zip";

/// Errors that escape the per-item retry scope and end the run
#[derive(Error, Debug)]
pub enum RunError {
    #[error("Destination root {0:?} does not exist or is not a directory")]
    InvalidRoot(PathBuf),

    #[error("Invalid content tree: {0}")]
    InvalidContent(#[from] ContentError),

    #[error("IO error on {path:?}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Exercise files download failed for course {course:?}: {source}")]
    ArchiveFailed {
        course: String,
        #[source]
        source: TransferError,
    },

    #[error("This downloader already ran; start a new one")]
    AlreadyRan,

    #[error("Could not set up transfer engine: {0}")]
    EngineError(#[source] TransferError),

    #[error("Run task failed: {0}")]
    TaskFailed(#[from] tokio::task::JoinError),
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> RunError + '_ {
    move |source| RunError::IoError {
        path: path.to_path_buf(),
        source,
    }
}

/// What a finished run looks like from the outside
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub status: RunStatus,
    /// The run stopped because cancellation was requested
    pub cancelled: bool,
    pub items_downloaded: usize,
    pub archives_downloaded: usize,
    /// Why the run failed, when an item ran out of attempts
    pub failure: Option<String>,
}

enum Flow {
    Continue,
    Cancelled,
    Fatal(String),
}

/// Where an item sits in the run, used to build progress snapshots
#[derive(Debug, Clone, Copy)]
struct ItemSlot {
    chapter_index: usize,
    item_index: usize,
    completed: usize,
    total: usize,
    overall: u8,
}

impl ItemSlot {
    fn snapshot(&self, item: u8) -> ProgressSnapshot {
        ProgressSnapshot {
            item,
            course: course_percentage(self.completed, self.total),
            overall: self.overall,
        }
    }
}

/// One run over one content tree.
///
/// The downloader owns its transfer engine and disposes of it when the run ends.
/// The content tree is only borrowed.
pub struct CourseDownloader {
    id: Ulid,
    root: PathBuf,
    engine: Downloader,
    retry: RetryPolicy,
    events: EventSender,
    status: StatusCell,
    cancel: CancellationToken,
}

impl CourseDownloader {
    pub fn new(
        root: impl Into<PathBuf>,
        options: &DownloadOptions,
        events: EventSender,
        cancel: CancellationToken,
    ) -> Result<Self, RunError> {
        let engine = Downloader::new(options).map_err(RunError::EngineError)?;
        let retry = RetryPolicy::new(options.max_attempts).with_delay(options.retry_delay());

        Ok(Self {
            id: Ulid::new(),
            root: root.into(),
            engine,
            retry,
            events,
            status: StatusCell::new(),
            cancel,
        })
    }

    pub fn id(&self) -> Ulid {
        self.id
    }

    pub fn status(&self) -> RunStatus {
        self.status.get()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<RunStatus> {
        self.status.subscribe()
    }

    fn set_status(&self, status: RunStatus) {
        if self.status.transition(status) {
            info!(%status, "Run status changed");
            self.events.send(RunEvent::Status(status));
        }
    }

    /// Download the whole tree.
    ///
    /// An item that runs out of attempts fails the run and is reported through
    /// the summary. Anything else that goes wrong also fails the run and is
    /// returned as an error. A downloader runs once; later calls fail with
    /// [`RunError::AlreadyRan`] and leave the status alone.
    #[instrument(name = "run", skip_all, fields(id = %self.id, root = ?self.root))]
    pub async fn run(&self, tree: &ContentTree) -> Result<RunSummary, RunError> {
        if self.engine.is_disposed() {
            return Err(RunError::AlreadyRan);
        }

        let mut summary = RunSummary::default();
        let result = self.run_courses(tree, &mut summary).await;
        self.engine.dispose();

        match result {
            Ok(Flow::Continue) => {
                self.set_status(RunStatus::Finished);
                info!(
                    items = summary.items_downloaded,
                    archives = summary.archives_downloaded,
                    "Run finished"
                );
            }
            Ok(Flow::Cancelled) => {
                summary.cancelled = true;
                info!(
                    items = summary.items_downloaded,
                    "Run cancelled, leaving downloaded files in place"
                );
            }
            Ok(Flow::Fatal(message)) => {
                summary.failure = Some(message);
            }
            Err(e) => {
                error!(error = %e, "Run aborted");
                self.set_status(RunStatus::Failed);
                return Err(e);
            }
        }

        summary.status = self.status();
        Ok(summary)
    }

    async fn validate(&self, tree: &ContentTree) -> Result<(), RunError> {
        match tokio::fs::metadata(&self.root).await {
            Ok(meta) if meta.is_dir() => {}
            _ => return Err(RunError::InvalidRoot(self.root.clone())),
        }
        tree.validate()?;
        Ok(())
    }

    async fn run_courses(
        &self,
        tree: &ContentTree,
        summary: &mut RunSummary,
    ) -> Result<Flow, RunError> {
        self.validate(tree).await?;

        let total = tree.len();
        info!(courses = total, "Starting run");

        let mut overall = percentage(0, Some(total as u64)).unwrap_or(100);
        for (index, course) in tree.courses.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return Ok(Flow::Cancelled);
            }

            self.events.label(Label::Course {
                index: index + 1,
                total,
                title: course.title.clone(),
            });

            let span = info_span!("course", title = %course.title, index = index + 1);
            match self
                .download_course(course, overall, summary)
                .instrument(span)
                .await?
            {
                Flow::Continue => {}
                other => return Ok(other),
            }

            overall = percentage((index + 1) as u64, Some(total as u64)).unwrap_or(100);
            self.events.progress(ProgressSnapshot {
                item: 100,
                course: 100,
                overall,
            });
        }

        if total == 0 {
            self.events.progress(ProgressSnapshot {
                item: 0,
                course: 0,
                overall,
            });
        }

        Ok(Flow::Continue)
    }

    async fn download_course(
        &self,
        course: &Course,
        overall: u8,
        summary: &mut RunSummary,
    ) -> Result<Flow, RunError> {
        let course_name = sanitize_file_name(&course.title);
        let course_dir = self.root.join(&course_name);
        tokio::fs::create_dir_all(&course_dir)
            .await
            .map_err(io_error(&course_dir))?;

        let total = course.total_items();
        info!(items = total, dir = ?course_dir, "Downloading course");

        let mut completed = 0;
        self.events.progress(ProgressSnapshot {
            item: 0,
            course: course_percentage(completed, total),
            overall,
        });

        for (chapter_index, chapter) in (1..).zip(&course.chapters) {
            let chapter_dir = course_dir.join(chapter_dir_name(chapter_index, chapter));
            tokio::fs::create_dir_all(&chapter_dir)
                .await
                .map_err(io_error(&chapter_dir))?;

            for (item_index, item) in (1..).zip(&chapter.items) {
                if self.cancel.is_cancelled() {
                    return Ok(Flow::Cancelled);
                }

                let slot = ItemSlot {
                    chapter_index,
                    item_index,
                    completed,
                    total,
                    overall,
                };

                match self.download_item(item, &chapter_dir, slot).await {
                    RetryOutcome::Done(()) => {
                        completed += 1;
                        summary.items_downloaded += 1;
                        self.events.progress(ProgressSnapshot {
                            item: 100,
                            course: course_percentage(completed, total),
                            overall,
                        });
                    }
                    RetryOutcome::Cancelled => return Ok(Flow::Cancelled),
                    RetryOutcome::Fatal(_) => {
                        return Ok(Flow::Fatal(format!(
                            "Failed to download video with title {}",
                            item.title
                        )));
                    }
                }
            }
        }

        if let Some(url) = &course.exercise_archive_url {
            if self.cancel.is_cancelled() {
                return Ok(Flow::Cancelled);
            }

            let archive_path = course_dir.join(format!("{course_name}.{ARCHIVE_EXTENSION}"));
            let slot = ItemSlot {
                chapter_index: 0,
                item_index: 0,
                completed,
                total,
                overall,
            };

            if !self
                .download_archive(course, url, &archive_path, slot)
                .await?
            {
                return Ok(Flow::Cancelled);
            }

            summary.archives_downloaded += 1;
            self.events.progress(slot.snapshot(100));
        }

        Ok(Flow::Continue)
    }

    async fn download_item(
        &self,
        item: &Item,
        chapter_dir: &Path,
        slot: ItemSlot,
    ) -> RetryOutcome<(), TransferError> {
        let base_name = format!("[{}] {}", slot.item_index, sanitize_file_name(&item.title));
        let media_path = chapter_dir.join(format!("{base_name}.{MEDIA_EXTENSION}"));
        let subtitle_path = chapter_dir.join(format!("{base_name}.{SUBTITLE_EXTENSION}"));
        let (media_path, subtitle_path) = (&media_path, &subtitle_path);

        let span = info_span!(
            "item",
            title = %item.title,
            chapter = slot.chapter_index,
            index = slot.item_index
        );
        self.retry
            .execute(
                &self.cancel,
                move |attempt| self.attempt_item(item, media_path, subtitle_path, slot, attempt),
                |_, _| self.events.progress(slot.snapshot(0)),
                |attempt, e| {
                    error!(error = %e, %attempt, title = %item.title, "Failed to download video");
                    self.set_status(RunStatus::Failed);
                },
            )
            .instrument(span)
            .await
    }

    async fn attempt_item(
        &self,
        item: &Item,
        media_path: &Path,
        subtitle_path: &Path,
        slot: ItemSlot,
        attempt: Attempt,
    ) -> Result<Attempted<()>, TransferError> {
        debug!(%attempt, path = ?media_path, "Downloading item");

        self.events.label(Label::Item {
            title: item.title.clone(),
            chapter_index: slot.chapter_index,
        });
        self.events.label(Label::ItemPosition {
            position: slot.completed + 1,
            total: slot.total,
        });

        if let Some(subtitles) = &item.subtitles {
            tokio::fs::write(subtitle_path, subtitles).await?;
        }

        let mut file = File::create(media_path).await?;
        let outcome = self
            .engine
            .transfer(&item.download_url, &mut file, &self.cancel, self.item_progress(slot))
            .await?;

        if outcome.is_cancelled() {
            return Ok(Attempted::Cancelled);
        }

        info!(size = %outcome.progress(), path = ?media_path, "Item downloaded");
        Ok(Attempted::Done(()))
    }

    /// Returns true when the archive completed, false when cancelled.
    async fn download_archive(
        &self,
        course: &Course,
        url: &str,
        path: &Path,
        slot: ItemSlot,
    ) -> Result<bool, RunError> {
        self.events.label(Label::ExerciseFiles);
        info!(path = ?path, "Downloading exercise files");

        let archive_failed = |source| RunError::ArchiveFailed {
            course: course.title.clone(),
            source,
        };

        let mut file = File::create(path).await.map_err(io_error(path))?;
        let outcome = self
            .engine
            .transfer(url, &mut file, &self.cancel, self.item_progress(slot))
            .await
            .map_err(archive_failed)?;

        Ok(!outcome.is_cancelled())
    }

    /// Byte progress callback for one transfer.
    ///
    /// When the size is unknown the item bar keeps its last value.
    fn item_progress(&self, slot: ItemSlot) -> impl FnMut(Progress) + '_ {
        let mut last = None;
        move |progress| {
            if let Some(item) = progress.percentage() {
                if last != Some(item) {
                    last = Some(item);
                    self.events.progress(slot.snapshot(item));
                }
            }
        }
    }
}

fn chapter_dir_name(index: usize, chapter: &Chapter) -> String {
    format!("[{index}] {}", sanitize_file_name(&chapter.title))
}

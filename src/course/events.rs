//! Events a run hands to the presentation layer
//!
//! The run never touches presentation state. It posts [`RunEvent`]s into an
//! unbounded channel, and the receiving side drains them on its own schedule.
//! Once cancellation has been requested nothing more is posted, since the
//! receiver may already be tearing down.

use std::fmt;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::util::percentage;

/// Status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunStatus {
    #[default]
    Running,
    Finished,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Failed)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "Running"),
            Self::Finished => write!(f, "Finished"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// The three progress bars, each 0-100
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgressSnapshot {
    /// Bytes of the current item
    pub item: u8,
    /// Completed items of the current course
    pub course: u8,
    /// Completed courses of the run
    pub overall: u8,
}

impl fmt::Display for ProgressSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "item {}% | course {}% | overall {}%",
            self.item, self.course, self.overall
        )
    }
}

/// Percentage of completed items in a course. An empty course counts as done.
pub fn course_percentage(completed: usize, total: usize) -> u8 {
    percentage(completed as u64, Some(total as u64)).unwrap_or(100)
}

/// Human-readable status text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Label {
    Course {
        index: usize,
        total: usize,
        title: String,
    },
    Item {
        title: String,
        chapter_index: usize,
    },
    /// Position of the item being fetched within its course
    ItemPosition { position: usize, total: usize },
    ExerciseFiles,
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Course {
                index,
                total,
                title,
            } => write!(f, "Downloading Course : {title} [{index}/{total}]"),
            Self::Item {
                title,
                chapter_index,
            } => write!(f, "{title} - [Chapter {chapter_index}]"),
            Self::ItemPosition { position, total } => write!(f, "{position}/{total}"),
            Self::ExerciseFiles => write!(f, "Downloading exercise files"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    Label(Label),
    Progress(ProgressSnapshot),
    /// Terminal status, sent at most once
    Status(RunStatus),
}

/// Sending half of the event channel.
///
/// Sends are dropped once cancellation was requested or the receiver is gone.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<RunEvent>,
    cancel: CancellationToken,
}

pub fn channel(cancel: CancellationToken) -> (EventSender, mpsc::UnboundedReceiver<RunEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender { tx, cancel }, rx)
}

impl EventSender {
    pub fn send(&self, event: RunEvent) {
        if self.cancel.is_cancelled() {
            trace!(?event, "Cancellation requested, dropping event");
            return;
        }
        let _ = self.tx.send(event);
    }

    pub fn label(&self, label: Label) {
        self.send(RunEvent::Label(label));
    }

    pub fn progress(&self, snapshot: ProgressSnapshot) {
        self.send(RunEvent::Progress(snapshot));
    }
}

/// Holds the run status and enforces that a terminal status is final.
#[derive(Debug)]
pub struct StatusCell {
    tx: watch::Sender<RunStatus>,
}

impl Default for StatusCell {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusCell {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(RunStatus::Running);
        Self { tx }
    }

    pub fn get(&self) -> RunStatus {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<RunStatus> {
        self.tx.subscribe()
    }

    /// Move to `status` unless a terminal status is already set.
    ///
    /// Returns true when the status changed.
    pub fn transition(&self, status: RunStatus) -> bool {
        self.tx.send_if_modified(|current| {
            if current.is_terminal() || *current == status {
                false
            } else {
                *current = status;
                true
            }
        })
    }
}

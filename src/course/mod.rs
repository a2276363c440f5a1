//! Downloading whole course trees
//!
//! The orchestrator walks the content tree and drives the transfer engine; the
//! handle runs it in the background and exposes its events to a presentation
//! layer.

mod events;
mod handle;
mod orchestrator;

pub use events::{
    EventSender, Label, ProgressSnapshot, RunEvent, RunStatus, StatusCell, channel,
    course_percentage,
};
pub use handle::{RunHandle, spawn_run};
pub use orchestrator::{CourseDownloader, RunError, RunSummary};

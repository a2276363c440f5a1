//! Running a download in the background
//!
//! [`spawn_run`] moves a [`CourseDownloader`] onto the tokio runtime and hands
//! back a [`RunHandle`] for cancellation, event draining and the final summary.

use std::path::PathBuf;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info, info_span};
use ulid::Ulid;

use super::events::{self, RunEvent, RunStatus};
use super::orchestrator::{CourseDownloader, RunError, RunSummary};
use crate::config::DownloadOptions;
use crate::content::ContentTree;

/// Handle returned to the caller for tracking and cancelling a run
#[derive(Debug)]
pub struct RunHandle {
    pub id: Ulid,
    events: mpsc::UnboundedReceiver<RunEvent>,
    status_rx: watch::Receiver<RunStatus>,
    cancellation_token: CancellationToken,
    task: JoinHandle<Result<RunSummary, RunError>>,
}

impl RunHandle {
    /// Request a cooperative stop. Files already written stay on disk.
    pub fn cancel(&self) {
        self.cancellation_token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Latest status, without waiting
    pub fn status(&self) -> RunStatus {
        *self.status_rx.borrow()
    }

    /// Next event posted by the run, `None` once the run is over and every
    /// event has been drained.
    pub async fn next_event(&mut self) -> Option<RunEvent> {
        self.events.recv().await
    }

    /// Wait for the run to end.
    ///
    /// Events not drained yet are discarded.
    pub async fn wait(self) -> Result<RunSummary, RunError> {
        self.task.await?
    }
}

/// Start downloading `tree` into `root` on the current tokio runtime.
///
/// Fails immediately only when the transfer engine cannot be built. Everything
/// else is reported through [`RunHandle::wait`].
pub fn spawn_run(
    tree: ContentTree,
    root: impl Into<PathBuf>,
    options: &DownloadOptions,
) -> Result<RunHandle, RunError> {
    let cancellation_token = CancellationToken::new();
    let (events_tx, events_rx) = events::channel(cancellation_token.clone());

    let downloader = CourseDownloader::new(root, options, events_tx, cancellation_token.clone())?;
    let id = downloader.id();
    let status_rx = downloader.subscribe_status();

    info!(%id, courses = tree.len(), "Spawning download run");

    let task = tokio::spawn(
        async move { downloader.run(&tree).await }.instrument(info_span!("run_task", %id)),
    );

    Ok(RunHandle {
        id,
        events: events_rx,
        status_rx,
        cancellation_token,
        task,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{Chapter, Course, Item};
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn tree(url: String) -> ContentTree {
        ContentTree::new(vec![Course {
            title: "Async".to_string(),
            chapters: vec![Chapter {
                title: "Futures".to_string(),
                items: vec![Item {
                    title: "Pinning".to_string(),
                    download_url: url,
                    subtitles: None,
                }],
            }],
            exercise_archive_url: None,
        }])
    }

    #[tokio::test]
    async fn test_spawned_run_drains_and_finishes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"pinned".to_vec()))
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();

        let mut handle = spawn_run(
            tree(format!("{}/pinning.mp4", server.uri())),
            dir.path(),
            &DownloadOptions::default(),
        )
        .unwrap();

        let mut events = Vec::new();
        while let Some(event) = handle.next_event().await {
            events.push(event);
        }

        assert_eq!(events.last(), Some(&RunEvent::Status(RunStatus::Finished)));
        assert_eq!(handle.status(), RunStatus::Finished);

        let summary = handle.wait().await.unwrap();
        assert_eq!(summary.status, RunStatus::Finished);
        assert_eq!(summary.items_downloaded, 1);
        assert!(
            dir.path()
                .join("Async")
                .join("[1] Futures")
                .join("[1] Pinning.mp4")
                .exists()
        );
    }

    #[tokio::test]
    async fn test_cancel_before_task_runs() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();

        let handle = spawn_run(
            tree(format!("{}/pinning.mp4", server.uri())),
            dir.path(),
            &DownloadOptions::default(),
        )
        .unwrap();
        handle.cancel();
        assert!(handle.is_cancelled());

        let summary = handle.wait().await.unwrap();
        assert!(summary.cancelled);
        assert_eq!(summary.status, RunStatus::Running);
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dropped_receiver_does_not_fail_run() {
        let dir = tempfile::tempdir().unwrap();
        let RunHandle { events, task, .. } =
            spawn_run(ContentTree::default(), dir.path(), &DownloadOptions::default()).unwrap();
        drop(events);

        let summary = task.await.unwrap().unwrap();
        assert_eq!(summary.status, RunStatus::Finished);
    }
}

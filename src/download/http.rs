//! HTTP transfer engine
//!
//! Streams a single resource into an already-open destination, reporting byte
//! progress and polling for cancellation between chunks.

use futures_util::{Stream, StreamExt};
use reqwest::{
    Client, Url,
    header::{self, HeaderMap, HeaderValue},
    redirect, tls,
};
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace};

use super::models::{Progress, TransferError, TransferOutcome};
use crate::config::DownloadOptions;

const MAX_REDIRECTS: usize = 10;

/// Transfer engine owned by a single run.
///
/// Transfers happen one at a time. [`Downloader::dispose`] (or dropping the
/// engine) aborts whatever is in flight.
#[derive(Debug)]
pub struct Downloader {
    client: Client,
    stall_timeout: Option<Duration>,
    disposed: CancellationToken,
}

impl Downloader {
    pub fn new(options: &DownloadOptions) -> Result<Self, TransferError> {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("*/*"));

        let mut builder = Client::builder()
            .use_rustls_tls()
            .min_tls_version(tls::Version::TLS_1_2)
            .redirect(redirect::Policy::limited(MAX_REDIRECTS))
            .user_agent(options.user_agent.clone())
            .default_headers(headers);

        if let Some(timeout) = options.connect_timeout() {
            builder = builder.connect_timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            stall_timeout: options.stall_timeout(),
            disposed: CancellationToken::new(),
        })
    }

    pub fn with_stall_timeout(mut self, stall_timeout: Option<Duration>) -> Self {
        self.stall_timeout = stall_timeout;
        self
    }

    /// Abort any in-flight transfer and refuse new ones. Safe to call repeatedly.
    pub fn dispose(&self) {
        if !self.disposed.is_cancelled() {
            debug!("Disposing transfer engine");
            self.disposed.cancel();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.is_cancelled()
    }

    fn aborted(&self, cancel: &CancellationToken) -> bool {
        cancel.is_cancelled() || self.disposed.is_cancelled()
    }

    async fn wait_aborted(&self, cancel: &CancellationToken) {
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = self.disposed.cancelled() => {}
        }
    }

    /// Copy `url` into `destination`.
    ///
    /// `on_progress` is called once the response headers arrive and again after
    /// every chunk written. A cancelled transfer leaves the partial data in
    /// `destination`.
    #[instrument(name = "transfer", level = "debug", skip(self, destination, cancel, on_progress), fields(url = %url))]
    pub async fn transfer<W, F>(
        &self,
        url: &str,
        destination: &mut W,
        cancel: &CancellationToken,
        mut on_progress: F,
    ) -> Result<TransferOutcome, TransferError>
    where
        W: AsyncWrite + Unpin,
        F: FnMut(Progress),
    {
        let parsed = Url::parse(url).map_err(|source| TransferError::InvalidUrl {
            url: url.to_string(),
            source,
        })?;

        let mut progress = Progress::default();

        if self.aborted(cancel) {
            info!("Transfer cancelled before starting");
            return Ok(TransferOutcome::Cancelled(progress));
        }

        let response = tokio::select! {
            biased;
            _ = self.wait_aborted(cancel) => {
                info!("Transfer cancelled while waiting for response");
                return Ok(TransferOutcome::Cancelled(progress));
            }
            response = self.send(parsed) => response?,
        };

        trace!(status = %response.status(), "Got response");

        if !response.status().is_success() {
            return Err(TransferError::HttpStatus {
                status: response.status(),
                url: url.to_string(),
            });
        }

        progress.total_size = response.content_length();
        match progress.total_size {
            Some(size) => debug!(bytes = size, "Starting transfer"),
            None => debug!("Starting transfer of unknown size"),
        }
        on_progress(progress);

        let mut stream = response.bytes_stream();

        loop {
            let chunk = tokio::select! {
                biased;
                _ = self.wait_aborted(cancel) => None,
                chunk = self.next_chunk(&mut stream, progress.downloaded) => Some(chunk?),
            };

            let chunk = match chunk {
                // aborted while waiting for data
                None => {
                    destination.flush().await?;
                    info!(downloaded = progress.downloaded, "Transfer cancelled during progress");
                    return Ok(TransferOutcome::Cancelled(progress));
                }
                Some(None) => break,
                Some(Some(chunk)) => chunk,
            };

            let bytes: &[u8] = &chunk;
            destination.write_all(bytes).await?;
            progress.downloaded += bytes.len() as u64;

            trace!(
                bytes = progress.downloaded,
                chunk_size = bytes.len(),
                "Received chunk"
            );
            on_progress(progress);

            if self.aborted(cancel) {
                destination.flush().await?;
                info!(downloaded = progress.downloaded, "Transfer cancelled during progress");
                return Ok(TransferOutcome::Cancelled(progress));
            }
        }

        destination.flush().await?;
        debug!(bytes = progress.downloaded, "Transfer completed");

        Ok(TransferOutcome::Completed(progress))
    }

    async fn send(&self, url: Url) -> Result<reqwest::Response, TransferError> {
        let request = self.client.get(url).send();
        match self.stall_timeout {
            Some(limit) => tokio::time::timeout(limit, request)
                .await
                .map_err(|_| TransferError::Stalled(limit))?
                .map_err(TransferError::from),
            None => request.await.map_err(TransferError::from),
        }
    }

    async fn next_chunk<S, B>(
        &self,
        stream: &mut S,
        downloaded: u64,
    ) -> Result<Option<B>, TransferError>
    where
        S: Stream<Item = reqwest::Result<B>> + Unpin,
    {
        let next = match self.stall_timeout {
            Some(limit) => tokio::time::timeout(limit, stream.next())
                .await
                .map_err(|_| TransferError::Stalled(limit))?,
            None => stream.next().await,
        };

        next.transpose()
            .map_err(|source| TransferError::Interrupted {
                bytes_downloaded: downloaded,
                source,
            })
    }
}

impl Drop for Downloader {
    fn drop(&mut self) {
        self.disposed.cancel();
    }
}

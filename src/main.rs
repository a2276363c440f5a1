use color_eyre::eyre::{WrapErr, eyre};
use coursedl::config;
use coursedl::content::ContentTree;
use coursedl::course::{ProgressSnapshot, RunEvent, RunStatus, spawn_run};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, fmt::time::ChronoLocal};

fn render(event: RunEvent, last_progress: &mut Option<ProgressSnapshot>) {
    match event {
        RunEvent::Label(label) => info!("{label}"),
        RunEvent::Progress(snapshot) => {
            if *last_progress != Some(snapshot) {
                debug!("{snapshot}");
                *last_progress = Some(snapshot);
            }
        }
        RunEvent::Status(status) => info!(%status, "Run ended"),
    }
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    dotenvy::dotenv().ok();
    color_eyre::install()?;

    let config = config::config();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .wrap_err_with(|| format!("Invalid log filter {:?}", config.log_level))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(ChronoLocal::rfc_3339())
        .init();

    let tree = ContentTree::load(&config.tree)
        .await
        .wrap_err_with(|| format!("Could not read content tree {:?}", config.tree))?;
    info!(
        courses = tree.len(),
        output_dir = ?config.output_dir,
        "Loaded content tree"
    );

    let mut handle = spawn_run(tree, config.output_dir.clone(), &config.download)?;
    let mut last_progress = None;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c(), if !handle.is_cancelled() => {
                warn!("Interrupted, cancelling run");
                handle.cancel();
            }
            event = handle.next_event() => match event {
                Some(event) => render(event, &mut last_progress),
                None => break,
            },
        }
    }

    let summary = handle.wait().await.inspect_err(|e| error!(error = %e, "Run failed"))?;
    info!(
        status = %summary.status,
        items = summary.items_downloaded,
        archives = summary.archives_downloaded,
        "Done"
    );

    match summary.status {
        RunStatus::Finished => Ok(()),
        _ if summary.cancelled => Err(eyre!("Run cancelled before finishing")),
        _ => Err(eyre!(
            summary
                .failure
                .unwrap_or_else(|| format!("Run ended with status {}", summary.status))
        )),
    }
}

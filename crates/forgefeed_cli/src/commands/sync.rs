use std::fs::OpenOptions;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use console::style;
use forgefeed::{ConnectorRunner, RunOutput};

use super::shared::{self, CommandResult};
use crate::SyncArgs;
use crate::config::Config;
use crate::shutdown::is_shutdown_requested;

#[derive(Debug, Default, PartialEq, Eq)]
struct SyncTotals {
    steps: usize,
    documents: usize,
    failures: usize,
}

/// Step the connector until the checkpoint reports no more work.
///
/// Documents of a step are written out before its checkpoint is saved, so
/// an interruption repeats at most the step that was in flight.
pub(crate) async fn handle_sync(args: SyncArgs, config: &Config) -> CommandResult {
    let connector = shared::build_connector(&args.connection, config)?;
    let checkpoint_path = shared::checkpoint_path(args.checkpoint.clone(), config)?;
    let mut checkpoint = shared::load_checkpoint(&connector, &checkpoint_path)?;

    if !checkpoint.has_more {
        eprintln!(
            "{} Checkpoint at {} is complete; run `forgefeed checkpoint reset` to sync again",
            style("✓").green(),
            checkpoint_path.display()
        );
        return Ok(());
    }

    let end = args.end.unwrap_or_else(|| chrono::Utc::now().timestamp());
    let batch_size = args.batch_size.unwrap_or(config.sync.batch_size);
    let runner = ConnectorRunner::new(&connector, batch_size);

    let output_path = args.output.as_ref().or(config.sync.output_path.as_ref());
    let mut out = open_output(output_path)?;

    tracing::info!(
        "Syncing {} from {} to {} (checkpoint: {})",
        connector.config().repo_owner,
        args.start,
        end,
        checkpoint_path.display()
    );

    let mut totals = SyncTotals::default();
    while checkpoint.has_more {
        if is_shutdown_requested() {
            tracing::warn!("Stopping before the next step; progress is saved");
            break;
        }

        let output = runner.run(args.start, end, checkpoint, args.perm_sync).await?;
        write_output(&mut out, &output, &mut totals)?;

        checkpoint = output.checkpoint;
        shared::save_checkpoint(&checkpoint_path, &checkpoint)?;

        tracing::debug!(
            "Step {} done: stage={:?} page={} more={}",
            totals.steps,
            checkpoint.stage,
            checkpoint.current_page,
            checkpoint.has_more
        );
    }

    let mark = if totals.failures == 0 {
        style("✓").green()
    } else {
        style("!").yellow()
    };
    eprintln!(
        "{} {} documents in {} steps, {} failures",
        mark, totals.documents, totals.steps, totals.failures
    );

    Ok(())
}

fn open_output(path: Option<&impl AsRef<Path>>) -> io::Result<Box<dyn Write>> {
    Ok(match path {
        Some(path) => Box::new(BufWriter::new(
            OpenOptions::new().create(true).append(true).open(path)?,
        )),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    })
}

/// Append the step's documents as JSON lines and report its failures.
fn write_output(
    out: &mut dyn Write,
    output: &RunOutput,
    totals: &mut SyncTotals,
) -> CommandResult {
    for doc in output.batches.iter().flatten() {
        serde_json::to_writer(&mut *out, doc)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;

    for failure in &output.failures {
        tracing::error!(
            "{}: {}",
            failure.failed_item_link().unwrap_or(failure.failed_item_id()),
            failure.failure_message
        );
    }

    totals.steps += 1;
    totals.documents += output.document_count();
    totals.failures += output.failures.len();
    Ok(())
}

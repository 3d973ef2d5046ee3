//! `weepost run` - feed samples from JSON lines to the delivery worker

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;

use weepost_core::{Config, Producer, Sample};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Read samples from this file instead of stdin
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Build documents but do not post them
    #[arg(long)]
    pub skip_upload: bool,
}

/// Counters for the input side
#[derive(Debug, Default, PartialEq, Eq)]
struct FeedStats {
    submitted: u64,
    malformed: u64,
}

/// Submit every sample line to `producer` until EOF or the worker refuses.
///
/// Blank lines are ignored; lines that are not a JSON object are logged
/// and skipped.
fn feed<R: BufRead>(reader: R, producer: &Producer) -> FeedStats {
    let mut stats = FeedStats::default();
    for (n, line) in reader.lines().enumerate() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                log::error!("input read failed at line {}: {e}", n + 1);
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match Sample::from_json(line) {
            Ok(sample) => {
                if !producer.submit(sample) {
                    break;
                }
                stats.submitted += 1;
            }
            Err(e) => {
                log::warn!("line {}: invalid sample: {e}", n + 1);
                stats.malformed += 1;
            }
        }
    }
    stats
}

pub fn run(args: RunArgs, mut config: Config) -> Result<ExitCode> {
    if args.skip_upload {
        config.skip_upload = true;
    }

    let input: Box<dyn BufRead + Send> = match &args.input {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(std::io::stdin())),
    };

    let handle = weepost_core::start(&config)?;
    weepost_core::install_signal_handlers(handle.backlog().clone())
        .context("failed to install signal handlers")?;

    // Detached: a reader blocked on stdin must not hold up shutdown
    let producer = handle.producer();
    std::thread::Builder::new()
        .name("weepost-input".to_string())
        .spawn(move || {
            let stats = feed(input, &producer);
            producer.finish();
            log::info!(
                "Input ended: {} samples submitted, {} malformed lines",
                stats.submitted,
                stats.malformed
            );
        })
        .context("failed to spawn input reader")?;

    let stats = handle.join();

    if weepost_core::is_shutdown_requested() {
        log::info!("Stopped by signal");
        return Ok(ExitCode::from(130));
    }
    if stats.abandoned > 0 {
        log::warn!("{} samples could not be delivered", stats.abandoned);
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::Arc;
    use weepost_core::Backlog;

    fn producer() -> (Producer, Arc<Backlog<Sample>>) {
        let backlog = Arc::new(Backlog::unbounded());
        (Producer::new(backlog.clone()), backlog)
    }

    #[test]
    fn blank_and_malformed_lines_are_skipped() {
        let (producer, backlog) = producer();
        let input = "{\"outTemp\": 1}\n\n   \nnot json\n[1, 2]\n{\"outTemp\": 2}\n";
        let stats = feed(Cursor::new(input), &producer);

        assert_eq!(
            stats,
            FeedStats {
                submitted: 2,
                malformed: 2
            }
        );
        assert_eq!(backlog.len(), 2);
    }

    #[test]
    fn samples_keep_input_order() {
        let (producer, backlog) = producer();
        feed(Cursor::new("{\"n\": 1}\n{\"n\": 2}\n{\"n\": 3}"), &producer);
        producer.finish();

        let mut seen = Vec::new();
        while let Some(sample) = backlog.take() {
            seen.push(sample.get("n").cloned());
        }
        assert_eq!(
            seen,
            vec![Some(1i64.into()), Some(2i64.into()), Some(3i64.into())]
        );
    }

    #[test]
    fn stops_when_backlog_closed() {
        let (producer, backlog) = producer();
        backlog.close();
        let stats = feed(Cursor::new("{\"n\": 1}\n{\"n\": 2}\n"), &producer);
        assert_eq!(stats.submitted, 0);
    }
}

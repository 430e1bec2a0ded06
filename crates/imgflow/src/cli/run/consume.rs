//! Consumer side of `imgflow run`: drain the transformer, write records, report.

use std::collections::BTreeMap;
use std::io::Write;
use std::time::Duration;

use imgflow_core::{OutputRecord, ReorderBuffer, Transformer, TransformerError};

use super::sink::RecordSink;

/// Per-run counters.
#[derive(Debug, Default)]
pub struct RunStats {
    pub succeeded: u64,
    pub failed: u64,
    /// Failures by error code
    pub failures: BTreeMap<i32, u64>,
    pub output_bytes: u64,
}

impl RunStats {
    pub fn record(&mut self, record: &OutputRecord) {
        if record.is_ok() {
            self.succeeded += 1;
            self.output_bytes += record.data.len() as u64;
        } else {
            self.failed += 1;
            *self.failures.entry(record.err_code).or_default() += 1;
        }
    }
}

/// Pull records until the transformer is exhausted.
///
/// Write errors do not stop the loop: the transformer must be drained or
/// the producer would block on a full queue. The first error is returned
/// at the end.
pub fn consume<W: Write>(
    transformer: &Transformer,
    mut sink: RecordSink<W>,
    progress: &indicatif::ProgressBar,
    ordered: bool,
) -> anyhow::Result<RunStats> {
    let mut stats = RunStats::default();
    let mut reorder = ordered.then(|| ReorderBuffer::new(0));
    let mut write_error: Option<anyhow::Error> = None;
    let start_time = std::time::Instant::now();

    let mut emit = |sink: &mut RecordSink<W>, record: &OutputRecord| {
        if write_error.is_none() {
            if let Err(e) = sink.write(record) {
                tracing::error!("Failed to write record {}: {}", record.id, e);
                write_error = Some(e);
            }
        }
    };

    loop {
        let record = match transformer.get() {
            Ok(record) => record,
            Err(TransformerError::Exhausted) => break,
            Err(e) => return Err(e.into()),
        };
        stats.record(&record);

        let ready = match reorder.as_mut() {
            Some(buffer) => buffer.push(record.id, record),
            None => vec![record],
        };
        for record in &ready {
            emit(&mut sink, record);
        }

        progress.inc(1);
        let elapsed = start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            let processed = stats.succeeded + stats.failed;
            progress.set_message(format!("{:.1} img/sec", processed as f64 / elapsed));
        }
    }

    if let Some(buffer) = reorder {
        for record in &buffer.finish() {
            emit(&mut sink, record);
        }
    }

    if let Some(e) = write_error {
        return Err(e);
    }
    sink.finish()?;
    Ok(stats)
}

pub fn create_progress_bar(total: u64) -> indicatif::ProgressBar {
    use indicatif::{ProgressBar, ProgressStyle};

    let pb = ProgressBar::new(total);
    let style = ProgressStyle::default_bar()
        .template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-");
    pb.set_style(style);
    pb.set_message("starting...");
    pb
}

/// Print a formatted summary table after a run.
///
/// Unreadable files were submitted as empty records, so they are already
/// part of `stats.failed`.
pub fn print_summary(stats: &RunStats, read_errors: u64, input_bytes: u64, elapsed: Duration) {
    let total = stats.succeeded + stats.failed;
    let secs = elapsed.as_secs_f64();
    let (rate, throughput) = if secs > 0.0 {
        (
            (stats.succeeded + stats.failed) as f64 / secs,
            input_bytes as f64 / 1_000_000.0 / secs,
        )
    } else {
        (0.0, 0.0)
    };

    eprintln!();
    eprintln!("  ====================================");
    eprintln!("               Summary");
    eprintln!("  ====================================");
    eprintln!("    Succeeded:    {:>8}", stats.succeeded);
    if stats.failed > 0 {
        eprintln!("    Failed:       {:>8}", stats.failed);
        for (code, count) in &stats.failures {
            eprintln!("      code {:<6}  {:>8}", code, count);
        }
    }
    if read_errors > 0 {
        eprintln!("      unreadable  {:>8}", read_errors);
    }
    eprintln!("  ------------------------------------");
    eprintln!("    Total:        {:>8}", total);
    eprintln!("    Duration:     {:>7.1}s", secs);
    eprintln!("    Rate:         {:>7.1} img/sec", rate);
    eprintln!("    Throughput:   {:>7.1} MB/sec", throughput);
    eprintln!("  ====================================");
}

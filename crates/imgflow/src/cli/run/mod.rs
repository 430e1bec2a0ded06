//! The `imgflow run` command: push a directory of images through a transformer.

mod consume;
mod sink;
pub mod types;

pub use types::OutputFormat;

use clap::Args;
use imgflow_core::{Config, FileSource, IdGenerator, InputRecord, SourceFile, Transformer};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;

use consume::{consume, create_progress_bar, print_summary};
use sink::RecordSink;

/// Arguments for the `run` command.
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Image file or directory to transform
    #[arg(required = true)]
    pub input: PathBuf,

    /// Output file (defaults to stdout)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Output format (overrides `[output] format`)
    #[arg(short, long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Number of worker threads
    #[arg(short, long)]
    pub threads: Option<usize>,

    /// Task and output queue capacity
    #[arg(short, long)]
    pub queue_limit: Option<usize>,

    /// Emit [C,H,W] tensors
    #[arg(long)]
    pub chw: bool,

    /// Write records in input order
    #[arg(long)]
    pub ordered: bool,

    /// Include base64 tensor bytes in each record
    #[arg(long)]
    pub embed_data: bool,

    /// Write each successful tensor to DIR/<id>.bin
    #[arg(long, value_name = "DIR")]
    pub tensor_dir: Option<PathBuf>,

    /// Seed for random operators
    #[arg(long)]
    pub seed: Option<u64>,

    /// Shuffle input files before feeding
    #[arg(long)]
    pub shuffle: bool,
}

impl RunArgs {
    /// Fold command-line overrides into the loaded config.
    fn apply(&self, config: &mut Config) {
        if let Some(threads) = self.threads {
            config.transformer.thread_num = threads;
        }
        if let Some(limit) = self.queue_limit {
            config.transformer.worker_queue_limit = limit;
        }
        if self.chw {
            config.transformer.swapaxis = true;
        }
        if self.seed.is_some() {
            config.transformer.seed = self.seed;
        }
        if let Some(format) = self.format {
            config.output.format = format.to_string();
        }
        config.output.ordered |= self.ordered;
        config.output.embed_data |= self.embed_data;
        config.input.shuffle |= self.shuffle;
    }
}

/// Execute the run command.
pub async fn execute(args: RunArgs, mut config: Config) -> anyhow::Result<()> {
    args.apply(&mut config);
    config.transformer.validate()?;
    let format = OutputFormat::from_config(&config.output.format)
        .ok_or_else(|| anyhow::anyhow!("Unknown output format '{}'", config.output.format))?;

    let files = FileSource::new(config.input.clone()).discover(&args.input);
    if files.is_empty() {
        tracing::warn!("No supported image files found at {:?}", args.input);
        return Ok(());
    }
    tracing::info!(
        "Found {} image(s) to transform ({:.1} MB)",
        files.len(),
        FileSource::total_size(&files) as f64 / 1_000_000.0
    );

    if let Some(dir) = &args.tensor_dir {
        tokio::fs::create_dir_all(dir).await?;
    }

    let ids = IdGenerator::new();
    let transformer = Arc::new(Transformer::new(&ids));
    transformer.init(&config.transformer)?;
    transformer.add_ops(config.pipeline.iter().cloned())?;
    transformer.start()?;

    let writer: Box<dyn Write + Send> = match &args.output {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(BufWriter::new(std::io::stdout())),
    };
    let sink = RecordSink::new(writer, format, config.output.embed_data)
        .with_tensor_dir(args.tensor_dir.clone());

    let progress = create_progress_bar(files.len() as u64);
    let start_time = std::time::Instant::now();

    // get() blocks, so the consumer lives on the blocking pool.
    let consumer = {
        let transformer = Arc::clone(&transformer);
        let progress = progress.clone();
        let ordered = config.output.ordered;
        tokio::task::spawn_blocking(move || consume(&transformer, sink, &progress, ordered))
    };

    let fed = feed(&transformer, &files).await;
    // Always stop, even after a feed error, so the consumer can finish.
    if let Err(e) = transformer.stop() {
        tracing::debug!("stop: {}", e);
    }
    let stats = consumer.await??;
    let (read_errors, input_bytes) = fed?;

    progress.finish_with_message("done");
    if let Some(path) = &args.output {
        tracing::info!("Output written to {:?}", path);
    }
    print_summary(&stats, read_errors, input_bytes, start_time.elapsed());
    Ok(())
}

/// Read every file and submit it. Returns (unreadable files, bytes read).
///
/// An unreadable file is still submitted, with empty data, so its id comes
/// back as a failed record and ordered output never waits on a gap.
async fn feed(
    transformer: &Arc<Transformer>,
    files: &[SourceFile],
) -> anyhow::Result<(u64, u64)> {
    let mut read_errors = 0u64;
    let mut input_bytes = 0u64;

    for file in files {
        let loaded = {
            let file = file.clone();
            tokio::task::spawn_blocking(move || FileSource::load(&file)).await?
        };
        let record = match loaded {
            Ok(record) => record,
            Err(e) => {
                tracing::error!("Failed to read {:?}: {}", file.path, e);
                read_errors += 1;
                InputRecord::new(file.id, Vec::new(), file.label.as_bytes())
            }
        };
        input_bytes += record.data.len() as u64;

        let transformer = Arc::clone(transformer);
        // put() blocks while the task queue is full.
        tokio::task::spawn_blocking(move || transformer.put(record)).await??;
    }
    Ok((read_errors, input_bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_override_config() {
        let args = RunArgs {
            threads: Some(7),
            queue_limit: Some(3),
            chw: true,
            seed: Some(5),
            format: Some(OutputFormat::Json),
            ordered: true,
            ..RunArgs::default()
        };
        let mut config = Config::default();
        args.apply(&mut config);
        assert_eq!(config.transformer.thread_num, 7);
        assert_eq!(config.transformer.worker_queue_limit, 3);
        assert!(config.transformer.swapaxis);
        assert_eq!(config.transformer.seed, Some(5));
        assert_eq!(config.output.format, "json");
        assert!(config.output.ordered);
        assert!(!config.output.embed_data);
    }

    #[tokio::test]
    async fn test_run_writes_one_line_per_file() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a.png", "b.png", "c.jpg"] {
            std::fs::write(dir.path().join(name), b"not really an image").unwrap();
        }
        std::fs::write(dir.path().join("skip.txt"), b"ignored").unwrap();
        let out = dir.path().join("out.jsonl");

        let args = RunArgs {
            input: dir.path().to_path_buf(),
            output: Some(out.clone()),
            threads: Some(2),
            queue_limit: Some(1),
            ordered: true,
            ..RunArgs::default()
        };
        execute(args, Config::default()).await.unwrap();

        let content = std::fs::read_to_string(&out).unwrap();
        let records: Vec<serde_json::Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(records.len(), 3);
        for (i, record) in records.iter().enumerate() {
            assert_eq!(record["id"], i as u64);
            assert_eq!(record["err_code"], 1011);
            assert_eq!(record["data_len"], 19);
        }
    }

    #[tokio::test]
    async fn test_unreadable_file_fills_its_slot_in_ordered_output() {
        let dir = tempfile::tempdir().unwrap();
        let readable = dir.path().join("b.png");
        std::fs::write(&readable, b"abc").unwrap();
        let files = vec![
            SourceFile {
                id: 0,
                path: dir.path().join("missing.png"),
                size: 0,
                label: "cats".to_string(),
            },
            SourceFile {
                id: 1,
                path: readable,
                size: 3,
                label: "cats".to_string(),
            },
        ];

        let ids = IdGenerator::new();
        let transformer = Arc::new(Transformer::new(&ids));
        transformer
            .init(&imgflow_core::TransformerConfig::new(1, 4))
            .unwrap();
        transformer.add_op("decode", Default::default()).unwrap();
        transformer.start().unwrap();

        let (read_errors, input_bytes) = feed(&transformer, &files).await.unwrap();
        transformer.stop().unwrap();
        assert_eq!(read_errors, 1);
        assert_eq!(input_bytes, 3);

        let mut reorder = imgflow_core::ReorderBuffer::new(0);
        let mut released = Vec::new();
        while let Ok(record) = transformer.get() {
            released.extend(reorder.push(record.id, record));
        }
        assert_eq!(reorder.pending(), 0);
        let order: Vec<u32> = released.iter().map(|r| r.id).collect();
        assert_eq!(order, vec![0, 1]);
        assert!(!released[0].is_ok());
        assert!(released[0].data.is_empty());
    }

    #[tokio::test]
    async fn test_run_rejects_invalid_thread_count() {
        let dir = tempfile::tempdir().unwrap();
        let args = RunArgs {
            input: dir.path().to_path_buf(),
            threads: Some(0),
            ..RunArgs::default()
        };
        assert!(execute(args, Config::default()).await.is_err());
    }
}

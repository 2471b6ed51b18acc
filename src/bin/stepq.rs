//! Operator interface to on-disk step queues.

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use stepqueue::{DurableFileStore, ExecutionId, FsFileStore, QueueConfig, RecipeStep, StepQueue};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stepq", about = "Inspect and drive durable recipe step queues")]
struct Cli {
    /// Store root; queues live under <data-dir>/<queue-folder>/<execution-id>
    #[arg(long, env = "STEPQ_DATA_DIR", default_value = "App_Data")]
    data_dir: PathBuf,
    /// Override the queue folder from the environment configuration
    #[arg(long)]
    queue_folder: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Append a step to an execution's queue
    Enqueue {
        /// Execution id
        execution_id: String,
        /// Step name
        #[arg(long)]
        name: String,
        /// Files path hint stored with the step
        #[arg(long, default_value = "")]
        files_path: String,
        #[command(flatten)]
        payload: PayloadSource,
    },
    /// Remove the oldest step and print it as JSON
    Dequeue {
        /// Execution id
        execution_id: String,
    },
    /// Print how many steps are waiting
    Pending {
        /// Execution id
        execution_id: String,
    },
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct PayloadSource {
    /// Payload document, inline
    #[arg(long)]
    payload: Option<String>,
    /// Read the payload document from a file
    #[arg(long)]
    payload_file: Option<PathBuf>,
}

impl PayloadSource {
    fn read(self) -> anyhow::Result<String> {
        match (self.payload, self.payload_file) {
            (Some(inline), _) => Ok(inline),
            (None, Some(path)) => std::fs::read_to_string(&path)
                .with_context(|| format!("reading payload from {}", path.display())),
            (None, None) => anyhow::bail!("either --payload or --payload-file is required"),
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = QueueConfig::from_env()?;
    if let Some(folder) = cli.queue_folder {
        config.queue_folder = folder;
    }

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let queue = StepQueue::with_config(FsFileStore::new(&cli.data_dir), config)?;
    execute(
        &queue,
        cli.command,
        &mut std::io::stdout().lock(),
        &mut std::io::stderr().lock(),
    )
}

/// Runs one subcommand; results go to `out`, notes to `err`.
fn execute<S: DurableFileStore>(
    queue: &StepQueue<S>,
    command: Command,
    out: &mut impl Write,
    err: &mut impl Write,
) -> anyhow::Result<()> {
    match command {
        Command::Enqueue {
            execution_id,
            name,
            files_path,
            payload,
        } => {
            let id = ExecutionId::new(execution_id)?;
            let step = RecipeStep::new(name, files_path, payload.read()?);
            let index = queue.enqueue(&id, &step)?;
            writeln!(out, "{index}")?;
        }
        Command::Dequeue { execution_id } => {
            let id = ExecutionId::new(execution_id)?;
            match queue.dequeue(&id)? {
                Some(step) => writeln!(out, "{}", serde_json::to_string_pretty(&step)?)?,
                None => writeln!(err, "queue for {id} is empty")?,
            }
        }
        Command::Pending { execution_id } => {
            let id = ExecutionId::new(execution_id)?;
            writeln!(out, "{}", queue.pending(&id)?)?;
        }
    }

    Ok(())
}

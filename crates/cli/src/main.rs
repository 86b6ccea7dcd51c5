//! `dssr`: decode suspension and lateness reason codes and keep the
//! reference tables of landed datasets filled in.

mod config;
mod events;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use dssr_coordinator::{Dispatcher, RefreshCoordinator, Trigger, TriggerInbox, TriggerReason, spawn_trigger_loop};
use dssr_decoder::CodeDecoder;
use dssr_primitives::{CodeCombination, DatasetId};
use dssr_resolver::GapResolver;
use dssr_store::{JsonFileStore, MemoryView, ReferenceStore, ViewRefresher};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::EngineConfig;

#[derive(Parser, Debug)]
#[command(name = "dssr")]
#[command(about = "Suspension reason decoder and decode cache")]
struct Args {
	/// Verbose logging
	#[arg(short, long, global = true)]
	verbose: bool,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Decode one code combination
	Decode {
		lsr: String,
		ssr: String,
		/// Config file with extra decoder flags
		#[arg(short, long, value_name = "PATH")]
		config: Option<PathBuf>,
	},
	/// Look up a combination in a reference table snapshot
	Lookup {
		#[arg(short, long, value_name = "PATH")]
		store: PathBuf,
		lsr: String,
		ssr: String,
	},
	/// Run one refresh cycle per configured dataset
	Run {
		#[arg(short, long, value_name = "PATH")]
		config: PathBuf,
		/// Only these datasets
		#[arg(short, long, value_name = "NAME")]
		dataset: Vec<String>,
	},
	/// Re-decode cached malformed entries with the current flag table
	Reclassify {
		#[arg(short, long, value_name = "PATH")]
		store: PathBuf,
		#[arg(short, long, value_name = "PATH")]
		config: Option<PathBuf>,
	},
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let args = Args::parse();

	let subscriber = tracing_subscriber::fmt()
		.with_max_level(if args.verbose {
			tracing::Level::DEBUG
		} else {
			tracing::Level::INFO
		})
		.with_writer(std::io::stderr)
		.finish();
	tracing::subscriber::set_global_default(subscriber)?;

	match args.command {
		Command::Decode { lsr, ssr, config } => decode(lsr, ssr, config.as_deref()),
		Command::Lookup { store, lsr, ssr } => lookup(&store, lsr, ssr).await,
		Command::Run { config, dataset } => run(&config, &dataset).await,
		Command::Reclassify { store, config } => reclassify(&store, config.as_deref()).await,
	}
}

fn decoder(config: Option<&Path>) -> anyhow::Result<CodeDecoder> {
	match config {
		Some(path) => Ok(EngineConfig::load(path)?.decoder()?),
		None => Ok(CodeDecoder::default()),
	}
}

fn decode(lsr: String, ssr: String, config: Option<&Path>) -> anyhow::Result<()> {
	let result = decoder(config)?.decode(&CodeCombination::new(lsr, ssr));
	match result.text() {
		Some(text) => println!("{text}"),
		None => println!("{}", serde_json::to_string_pretty(&result)?),
	}
	Ok(())
}

async fn lookup(store: &Path, lsr: String, ssr: String) -> anyhow::Result<()> {
	let store = JsonFileStore::open(store).await?;
	let combo = CodeCombination::new(lsr, ssr);
	match store.lookup(&combo).await? {
		Some(result) => println!("{}", serde_json::to_string_pretty(&result)?),
		None => println!("{combo} is not resolved yet"),
	}
	Ok(())
}

async fn run(config_path: &Path, only: &[String]) -> anyhow::Result<()> {
	let config = EngineConfig::load(config_path)?;
	let decoder = Arc::new(config.decoder()?);
	let selected: Vec<_> = if only.is_empty() {
		config.datasets.iter().collect()
	} else {
		only.iter().map(|name| config.dataset(name)).collect::<Result<_, _>>()?
	};
	if selected.is_empty() {
		bail!("no datasets configured in {}", config_path.display());
	}

	let mut dispatcher = Dispatcher::new();
	for dataset in &selected {
		let id = DatasetId::new(dataset.name.as_str());
		if let Some(dir) = dataset.reference_store.parent() {
			tokio::fs::create_dir_all(dir)
				.await
				.with_context(|| format!("creating {}", dir.display()))?;
		}
		let store = Arc::new(JsonFileStore::open(&dataset.reference_store).await?);
		let view = Arc::new(MemoryView::new(store.clone()));
		let landed = view.ingest(events::load(&dataset.events, &id).await?);
		// Join what is already cached so only real gaps remain.
		let ack = view.refresh(&id).await.with_context(|| format!("initial refresh of {id}"))?;
		info!(dataset = %id, landed, pending = ack.pending, "dataset.loaded");

		let resolver = GapResolver::new(store, view.clone(), decoder.clone());
		dispatcher.register(Arc::new(RefreshCoordinator::new(id, resolver, view, config.coordinator())));
	}

	let inbox = TriggerInbox::new(config.engine.inbox_capacity.max(selected.len()));
	let (reports_tx, mut reports) = broadcast::channel(selected.len());
	let cancel = CancellationToken::new();
	let datasets = dispatcher.datasets();
	let handle = spawn_trigger_loop(Arc::new(dispatcher), inbox.clone(), reports_tx, cancel.clone());

	tokio::spawn(async move {
		if tokio::signal::ctrl_c().await.is_ok() {
			info!("interrupted");
			cancel.cancel();
		}
	});

	for dataset in datasets {
		inbox.send(Trigger::new(dataset, TriggerReason::NewData))?;
	}
	inbox.close();
	handle.await?;

	let mut failed = 0;
	while let Ok(report) = reports.try_recv() {
		if !report.succeeded() {
			failed += 1;
		}
		println!("{}", serde_json::to_string(&report)?);
	}
	if failed > 0 {
		bail!("{failed} of {} cycles failed", selected.len());
	}
	Ok(())
}

async fn reclassify(store: &Path, config: Option<&Path>) -> anyhow::Result<()> {
	let store: Arc<dyn ReferenceStore> = Arc::new(JsonFileStore::open(store).await?);
	// Reclassification never scans a view.
	let view = Arc::new(MemoryView::new(store.clone()));
	let resolver = GapResolver::new(store, view, Arc::new(decoder(config)?));
	let report = resolver.reclassify_malformed().await?;
	println!("{}", serde_json::to_string(&report)?);
	Ok(())
}

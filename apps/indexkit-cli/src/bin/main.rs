use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use tracing_subscriber::EnvFilter;

use indexkit_core::config::{expand_path, resolve_with_base, BackendKind, Config, ServiceConfig};
use indexkit_core::{
    DirectoryCollection, Event, EventBus, EventKind, EventRecorder, EventSubscriber, IndexingPipeline, Options, Reply,
    SearchService,
};
use indexkit_debug::DebugSearchService;
use indexkit_text::TantivySearchService;

const USAGE: &str = "Usage: indexkit <index [DIR] [--limit N] [--trace] | search \"<keywords>\" [--limit N] | delete>";

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("indexkit_core=info,indexkit_text=info,indexkit_debug=debug"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
}

struct Args {
    cmd: String,
    positional: Option<String>,
    limit: Option<usize>,
    trace: bool,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() { anyhow::bail!(USAGE); }
    let cmd = args.remove(0);
    let mut parsed = Args { cmd, positional: None, limit: None, trace: false };
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--trace" => parsed.trace = true,
            "--limit" => {
                let n = args.get(i + 1).and_then(|s| s.parse::<usize>().ok()).context("--limit requires a number")?;
                parsed.limit = Some(n);
                i += 1;
            }
            s if s.starts_with('-') => anyhow::bail!("Unknown flag: {s}\n{USAGE}"),
            s => parsed.positional = Some(s.to_string()),
        }
        i += 1;
    }
    Ok(parsed)
}

/// Advances a progress bar as documents complete.
struct ProgressReporter {
    bar: ProgressBar,
}

impl ProgressReporter {
    fn new(total: usize) -> anyhow::Result<Self> {
        let bar = ProgressBar::new(total as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} documents {msg}")?
                .progress_chars("#>-"),
        );
        Ok(Self { bar })
    }
}

impl EventSubscriber for ProgressReporter {
    fn name(&self) -> &str {
        "progress"
    }

    fn subscribed_events(&self) -> Vec<EventKind> {
        vec![EventKind::DocumentPostIndex, EventKind::CollectionPostIndex]
    }

    fn on_event(&self, event: &Event<'_>, _bus: &EventBus) -> anyhow::Result<Reply> {
        match event {
            Event::DocumentPostIndex { document, .. } => {
                self.bar.set_message(document.id().to_string());
                self.bar.inc(1);
            }
            _ => self.bar.finish_with_message("done"),
        }
        Ok(Reply::Continue)
    }
}

/// Documents a run will visit: the item cap applies before indexing starts.
fn progress_total(items: usize, limit: Option<usize>) -> usize {
    limit.map_or(items, |limit| limit.min(items))
}

/// Search options from `--limit`; the indexing item cap is a separate setting.
fn search_options(limit: Option<usize>) -> Options {
    let mut options = Options::new();
    if let Some(limit) = limit {
        options.insert("limit".to_string(), serde_json::json!(limit));
    }
    options
}

/// The configured backend, plus the same object as a subscriber when it listens to events.
fn build_service(cfg: &ServiceConfig) -> (Arc<dyn SearchService>, Option<Arc<dyn EventSubscriber>>) {
    match cfg.backend {
        BackendKind::Debug => {
            let debug = Arc::new(DebugSearchService::new());
            let service: Arc<dyn SearchService> = debug.clone();
            let subscriber: Arc<dyn EventSubscriber> = debug;
            (service, Some(subscriber))
        }
        BackendKind::Tantivy => {
            let service: Arc<dyn SearchService> = match &cfg.index_dir {
                Some(dir) => Arc::new(TantivySearchService::in_dir(expand_path(dir))),
                None => Arc::new(TantivySearchService::in_ram()),
            };
            (service, None)
        }
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let config = Config::load().map_err(|e| { eprintln!("Error loading config: {}", e); e })?;
    let args = parse_args()?;

    let mut pipeline_cfg = config.pipeline()?;
    let (service, subscriber) = build_service(&config.service()?);

    match args.cmd.as_str() {
        "index" => {
            if let Some(limit) = args.limit { pipeline_cfg.limit = Some(limit); }
            let data = config.data()?;
            let cwd = env::current_dir()?;
            let data_dir = args.positional.map(PathBuf::from).unwrap_or_else(|| resolve_with_base(&cwd, &data.source_dir));
            let collection = DirectoryCollection::open(&data.collection_id, &data_dir)?;
            info!(dir = %data_dir.display(), files = collection.len(), "indexing");

            let recorder = Arc::new(EventRecorder::new());
            let mut bus = pipeline_cfg
                .bus_builder()
                .add_subscriber(Arc::new(ProgressReporter::new(progress_total(collection.len(), pipeline_cfg.limit))?));
            if let Some(subscriber) = subscriber { bus = bus.add_subscriber(subscriber); }
            if args.trace { bus = bus.add_subscriber(recorder.clone()); }

            let pipeline = IndexingPipeline::new(Arc::new(bus.build()), service, pipeline_cfg);
            let report = pipeline.run(&collection)?;

            println!("✅ Indexed {} documents from '{}'", report.indexed, report.collection);
            for skipped in &report.skipped {
                println!("⚠️  Skipped {} during {}: {}", skipped.document_id, skipped.phase, skipped.error);
            }
            for failure in &report.handler_failures {
                println!("⚠️  {failure}");
            }
            if args.trace {
                for kind in recorder.trace() { println!("{kind}"); }
            }
        }
        "search" => {
            let keywords = args.positional.context(USAGE)?;
            let options = search_options(args.limit);
            service.create_index(&pipeline_cfg.index_name, &pipeline_cfg.index_options)?;
            let results = service.search(&keywords, &options)?;
            if results.is_empty() { println!("No results for '{keywords}'"); }
            for (rank, hit) in results.iter().enumerate() {
                println!("{:>2}. {:.3}  {}  [{}]", rank + 1, hit.score, hit.id, hit.collection.as_deref().unwrap_or("-"));
            }
        }
        "delete" => {
            service.create_index(&pipeline_cfg.index_name, &pipeline_cfg.index_options)?;
            service.delete()?;
            println!("🗑️  Deleted index '{}'", pipeline_cfg.index_name);
        }
        other => anyhow::bail!("Unknown command: {other}\n{USAGE}"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_total_respects_the_item_cap() {
        assert_eq!(progress_total(10, None), 10);
        assert_eq!(progress_total(10, Some(3)), 3);
        assert_eq!(progress_total(2, Some(5)), 2);
    }

    #[test]
    fn search_options_only_carry_the_search_limit() {
        assert!(search_options(None).is_empty());
        assert_eq!(search_options(Some(4)).get("limit"), Some(&serde_json::json!(4)));
    }
}

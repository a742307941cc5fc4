use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bookqa_core::config::{expand_path, BackendKind, Config, Settings};
use bookqa_core::extract::PlainTextExtractor;
use bookqa_core::nlp::{HeuristicAnnotator, NoSynonyms, Thesaurus};
use bookqa_core::traits::{EmbeddingProvider, SynonymSource, TextExtractor, VectorStore};
use bookqa_core::types::ProgressEvent;
use bookqa_embed::{use_fake_embeddings, EmbeddingCache, EmbeddingService, FakeEmbedder, OpenAiClient};
use bookqa_hybrid::{answer, BookCorpus, HybridRanker, IngestInput, IngestionPipeline, QueryExpander};
use bookqa_vector::open_store;

const FAKE_DIM: usize = 1024;

fn usage(prog: &str) -> ! {
    eprintln!("Usage: {prog} <command> [args...]");
    eprintln!("  ingest <book.txt> [--corpus PATH]");
    eprintln!("  query \"<question>\" [--top-k N] [--corpus PATH]");
    eprintln!("  ask \"<question>\" [--top-k N] [--corpus PATH]");
    eprintln!("  cache-clear");
    std::process::exit(1);
}

struct Args {
    positional: Option<String>,
    top_k: Option<usize>,
    corpus: Option<PathBuf>,
}

fn parse_flags(args: &[String]) -> anyhow::Result<Args> {
    let mut out = Args { positional: None, top_k: None, corpus: None };
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--top-k" | "-k" => {
                let v = args.get(i + 1).context("--top-k requires a number")?;
                out.top_k = Some(v.parse().with_context(|| format!("--top-k requires a number, got '{v}'"))?);
                i += 1;
            }
            "--corpus" => {
                out.corpus = Some(PathBuf::from(args.get(i + 1).context("--corpus requires a path")?));
                i += 1;
            }
            a if !a.starts_with('-') && out.positional.is_none() => out.positional = Some(a.to_string()),
            a => anyhow::bail!("unexpected argument '{a}'"),
        }
        i += 1;
    }
    Ok(out)
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn provider(settings: &Settings) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    if use_fake_embeddings() {
        info!(dim = FAKE_DIM, "using fake embeddings");
        return Ok(Arc::new(FakeEmbedder::new(FAKE_DIM)));
    }
    Ok(Arc::new(OpenAiClient::from_settings(&settings.embedding, &settings.generation)?))
}

fn embedding_service(settings: &Settings) -> anyhow::Result<Arc<EmbeddingService>> {
    let provider = provider(settings)?;
    let root = expand_path(&settings.cache.dir);
    let cache = Arc::new(EmbeddingCache::open_namespaced(&root, provider.embedder_id())?);
    Ok(Arc::new(EmbeddingService::from_settings(provider, cache, &settings.embedding)))
}

fn synonyms(settings: &Settings) -> anyhow::Result<Arc<dyn SynonymSource>> {
    match &settings.search.thesaurus {
        Some(p) => {
            let path = expand_path(p);
            let thesaurus = Thesaurus::load(&path).with_context(|| format!("loading thesaurus {}", path.display()))?;
            info!(path = %path.display(), words = thesaurus.len(), "loaded thesaurus");
            Ok(Arc::new(thesaurus))
        }
        None => Ok(Arc::new(NoSynonyms)),
    }
}

fn progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(4);
    let style = ProgressStyle::with_template("{spinner} [{elapsed_precise}] [{bar:30}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb
}

async fn ingest(settings: &Settings, args: Args) -> anyhow::Result<()> {
    let source = args.positional.map(PathBuf::from).context("ingest requires a .txt file")?;
    let corpus_path = args.corpus.unwrap_or_else(|| expand_path(&settings.pipeline.corpus_path));
    let text = PlainTextExtractor.extract(&source)?;
    info!(source = %source.display(), bytes = text.len(), "extracted text");

    let store = open_store(&settings.vector_store).await;
    let annotator = Arc::new(HeuristicAnnotator::new()?);
    let pb = progress_bar();
    let bar = pb.clone();
    let mut pipeline = IngestionPipeline::from_settings(settings, annotator, embedding_service(settings)?, store)?
        .with_progress(Arc::new(move |e: ProgressEvent| {
            bar.set_position(e.current as u64);
            bar.set_message(e.stage);
        }));
    let corpus = pipeline.create_from_text(IngestInput::Text(text)).await?;
    pb.finish_with_message("done");

    corpus.save(&corpus_path)?;
    println!("✅ Ingested {} chunks from {} into {}", corpus.len(), source.display(), corpus_path.display());
    Ok(())
}

async fn ranker(settings: &Settings, corpus_path: &Path) -> anyhow::Result<HybridRanker> {
    let corpus = Arc::new(
        BookCorpus::load(corpus_path)
            .with_context(|| format!("loading corpus {} (run `bookqa ingest` first)", corpus_path.display()))?,
    );
    let store: Arc<dyn VectorStore> = open_store(&settings.vector_store).await;
    if settings.vector_store.backend == BackendKind::Exact {
        corpus.populate(store.as_ref()).await?;
    }
    let annotator = Arc::new(HeuristicAnnotator::new()?);
    let expander = Arc::new(QueryExpander::from_settings(annotator, synonyms(settings)?, &settings.search)?);
    Ok(HybridRanker::from_settings(corpus, store, embedding_service(settings)?, expander, &settings.search)?)
}

async fn query(settings: &Settings, args: Args, generate: bool) -> anyhow::Result<()> {
    let question = args.positional.context("a question is required")?;
    let top_k = args.top_k.unwrap_or(settings.search.top_k);
    let corpus_path = args.corpus.unwrap_or_else(|| expand_path(&settings.pipeline.corpus_path));
    let ranker = ranker(settings, &corpus_path).await?;

    if generate {
        let generator = OpenAiClient::from_settings(&settings.embedding, &settings.generation)?;
        let reply = answer(&ranker, &generator, &question, top_k).await?;
        println!("{reply}");
        return Ok(());
    }

    let results = ranker.search(&question, top_k).await?;
    println!("🔍 {} results for: \"{}\"", results.len(), question);
    for (i, r) in results.iter().enumerate() {
        println!(
            "\n  {}. fused={:.4}  lexical={:.4}  semantic={:.4}  chunk={}",
            i + 1,
            r.scores.fused,
            r.scores.lexical,
            r.scores.semantic,
            r.chunk.id
        );
        println!("     {}", r.chunk.text);
    }
    Ok(())
}

/// Clears every provider namespace under the cache root.
fn cache_clear(settings: &Settings) -> anyhow::Result<()> {
    let root = expand_path(&settings.cache.dir);
    if !root.exists() {
        println!("Nothing to clear at {}", root.display());
        return Ok(());
    }
    let mut removed = 0;
    for entry in std::fs::read_dir(&root)? {
        let path = entry?.path();
        if path.is_dir() {
            removed += EmbeddingCache::open(&path)?.clear()?;
        }
    }
    println!("🧹 Removed {removed} cached embeddings from {}", root.display());
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let mut argv: Vec<String> = env::args().collect();
    let prog = argv.remove(0);
    if argv.is_empty() {
        usage(&prog);
    }
    let cmd = argv.remove(0);

    let config = Config::load().map_err(|e| {
        eprintln!("Error loading config: {e}");
        e
    })?;
    let settings = config.settings()?;
    let args = parse_flags(&argv)?;

    match cmd.as_str() {
        "ingest" => ingest(&settings, args).await,
        "query" => query(&settings, args, false).await,
        "ask" => query(&settings, args, true).await,
        "cache-clear" => cache_clear(&settings),
        _ => {
            eprintln!("Unknown command: {cmd}");
            usage(&prog)
        }
    }
}

//! page-translator 命令行入口

use std::error::Error;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use encoding_rs::Encoding;
use markup5ever_rcdom::RcDom;
use tokio::sync::mpsc;

use page_translator::env::{self, EnvVar};
use page_translator::parsers::{get_charset, html_to_dom, serialize_document};
use page_translator::translation::{
    ConfigManager, ContentCache, OpenAiCompatibleClient, PageTranslator, ProgressStatus,
    SessionState, StartOptions, TranslationConfig,
};

#[derive(Parser, Debug)]
#[command(name = "page-translator", version)]
#[command(about = "Translate the visible text of an HTML document through an LLM backend", long_about = None)]
struct Cli {
    /// Config file path (default: search page-translator.toml in the current directory)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Translate an HTML file
    Translate {
        /// Input HTML file
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long, value_name = "OUTPUT")]
        output: Option<PathBuf>,

        /// Model identifier
        #[arg(long)]
        model: Option<String>,

        /// API key (default: PAGE_TRANSLATOR_API_KEY)
        #[arg(long)]
        api_key: Option<String>,

        /// Text units per request
        #[arg(long)]
        batch_size: Option<usize>,

        /// Concurrent requests
        #[arg(long)]
        concurrency: Option<usize>,

        /// Ignore cached translations (fresh translations are still cached)
        #[arg(long)]
        no_cache: bool,
    },

    /// Inspect or clear the translation cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum CacheAction {
    /// Print record count and approximate size as JSON
    Status,
    /// Remove every cached translation
    Clear,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    init_logging();

    let cli = Cli::parse();
    let config = ConfigManager::load(cli.config.as_deref())?.into_config();

    match cli.command {
        Commands::Translate {
            input,
            output,
            model,
            api_key,
            batch_size,
            concurrency,
            no_cache,
        } => {
            let api_key = match api_key {
                Some(key) => key,
                None => env::backend::ApiKey::get()?,
            };

            let mut options = StartOptions::from_config(&config, api_key);
            if let Some(model) = model {
                options = options.with_model(model);
            }
            if let Some(batch_size) = batch_size {
                options = options.with_batch_size(batch_size);
            }
            if let Some(concurrency) = concurrency {
                options = options.with_concurrency(concurrency);
            }
            if no_cache {
                options = options.without_cache();
            }

            translate_file(&input, output.as_deref(), config, options).await
        }
        Commands::Cache { action } => run_cache_action(&config, action),
    }
}

fn init_logging() {
    let level = env::core::LogLevel::get()
        .ok()
        .and_then(|level| level.parse::<tracing::Level>().ok())
        .unwrap_or(tracing::Level::INFO);
    let no_color = env::core::NoColor::get_or_default(false);

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_ansi(!no_color)
        .with_writer(io::stderr)
        .init();
}

async fn translate_file(
    input: &Path,
    output: Option<&Path>,
    config: TranslationConfig,
    options: StartOptions,
) -> Result<(), Box<dyn Error>> {
    let data = fs::read(input)?;
    let (dom, encoding) = parse_document(&data)?;

    let translator = PageTranslator::new(
        dom.document.clone(),
        Box::new(OpenAiCompatibleClient::from_config(&config)?),
        ContentCache::from_config(&config),
        config,
    );

    let (observer, mut snapshots) = mpsc::unbounded_channel();
    translator.attach_observer(observer);

    let session = translator.start_translate(options);
    tokio::pin!(session);
    let status = loop {
        tokio::select! {
            result = &mut session => break result?,
            Some(snapshot) = snapshots.recv() => log_progress(&snapshot),
        }
    };
    translator.detach_observer();

    let bytes = serialize_document(&dom, &encoding)?;
    match output {
        Some(path) => fs::write(path, bytes)?,
        None => io::stdout().write_all(&bytes)?,
    }

    match status.state {
        SessionState::Error => Err(status
            .error
            .unwrap_or_else(|| "translation failed".to_string())
            .into()),
        _ => Ok(()),
    }
}

/// 解析文档，文档声明了有效字符集时按该字符集重新解析
fn parse_document(data: &[u8]) -> io::Result<(RcDom, String)> {
    let dom = html_to_dom(data, "utf-8")?;

    if let Some(charset) = get_charset(&dom.document) {
        if let Some(encoding) = Encoding::for_label_no_replacement(charset.as_bytes()) {
            if encoding != encoding_rs::UTF_8 {
                let name = encoding.name().to_string();
                return Ok((html_to_dom(data, &name)?, name));
            }
        }
    }

    Ok((dom, "utf-8".to_string()))
}

fn log_progress(status: &ProgressStatus) {
    tracing::info!(
        "{:?}: {}/{} 条 (缓存 {}), 批次 {}/{}, 活跃 {}ms",
        status.state,
        status.translated_count,
        status.total_texts,
        status.cached_count,
        status.batches_done,
        status.batch_count,
        status.active_ms
    );
}

fn run_cache_action(config: &TranslationConfig, action: CacheAction) -> Result<(), Box<dyn Error>> {
    let cache = ContentCache::from_config(config);

    match action {
        CacheAction::Status => {
            println!("{}", serde_json::to_string(&cache.status())?);
        }
        CacheAction::Clear => {
            cache.clear()?;
            println!("cache cleared");
        }
    }

    Ok(())
}

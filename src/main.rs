use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::watch;
use supportbot_core::bootstrap::{
    AppBuilder, build_store, create_embedding_provider, resolve_config_path,
};
use supportbot_core::config::Config;
use supportbot_core::{ChatService, InitState};
use supportbot_gateway::GatewayServer;
use supportbot_memory::BuildOutcome;
use supportbot_tools::{ScrapeOutcome, Scraper};

#[derive(Debug, Parser)]
#[command(name = "supportbot", version, about = "Retrieval-augmented customer support chatbot")]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start the HTTP server; the index is built or loaded in the background.
    Serve,
    /// Scrape a web page into the corpus file.
    Scrape {
        #[arg(long)]
        url: Option<String>,
        #[arg(long)]
        filename: Option<String>,
        #[arg(long)]
        dir: Option<PathBuf>,
        /// Keep an existing corpus file.
        #[arg(long)]
        no_overwrite: bool,
    },
    /// Build or load the embedding index and report the outcome.
    Index {
        /// Corpus file; defaults to `[store] corpus_path`.
        #[arg(long)]
        file: Option<PathBuf>,
        /// Rebuild even if a persisted index exists.
        #[arg(long)]
        overwrite: bool,
    },
    /// Answer one question, or read questions from stdin until `exit`.
    Ask { question: Option<String> },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Err(e) = dotenvy::dotenv()
        && !e.not_found()
    {
        eprintln!("failed to load .env: {e}");
    }

    let config_path = resolve_config_path(cli.config.as_deref());
    init_subscriber(&config_path);

    let app = AppBuilder::load(config_path).await?;
    tracing::debug!("configuration loaded from {}", app.config_path().display());

    match cli.command {
        Command::Serve => serve(&app).await,
        Command::Scrape {
            url,
            filename,
            dir,
            no_overwrite,
        } => scrape(app.config(), url, filename, dir, no_overwrite).await,
        Command::Index { file, overwrite } => index(app, file, overwrite).await,
        Command::Ask { question } => ask(&app, question).await,
    }
}

/// Corpus path handed to initialization, or `None` to only load a persisted index.
fn corpus_for_init(config: &Config) -> Option<PathBuf> {
    let path = &config.store.corpus_path;
    if path.exists() {
        Some(path.clone())
    } else {
        tracing::warn!(
            "corpus file {} not found; only a persisted index can be loaded",
            path.display()
        );
        None
    }
}

async fn serve(app: &AppBuilder) -> anyhow::Result<()> {
    let config = app.config();
    let service = app.build_service()?;
    let init = service.start_background_init(corpus_for_init(config));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {e:#}");
            return;
        }
        tracing::info!("received shutdown signal");
        let _ = shutdown_tx.send(true);
    });

    let gw = &config.gateway;
    GatewayServer::new(&gw.bind, gw.port, service, shutdown_rx)
        .with_home_page(gw.home_page.clone())
        .with_static_dir(gw.static_dir.clone())
        .with_max_body_size(gw.max_body_size)
        .serve()
        .await?;

    init.abort();
    Ok(())
}

async fn scrape(
    config: &Config,
    url: Option<String>,
    filename: Option<String>,
    dir: Option<PathBuf>,
    no_overwrite: bool,
) -> anyhow::Result<()> {
    let cfg = &config.scrape;
    let url = url.unwrap_or_else(|| cfg.url.clone());
    let filename = filename.unwrap_or_else(|| cfg.filename.clone());
    let dir = dir.or_else(|| cfg.directory.clone());
    let overwrite = cfg.overwrite && !no_overwrite;

    let outcome = Scraper::new(cfg)
        .scrape(&url, &filename, dir.as_deref(), overwrite)
        .await?;
    match outcome {
        ScrapeOutcome::Written { path, bytes } => {
            println!("Text has been saved to {} ({bytes} bytes)", path.display());
        }
        ScrapeOutcome::Skipped { path } => {
            println!("{} already exists, skipping", path.display());
        }
        ScrapeOutcome::Empty => println!("No text found at {url}; nothing written"),
    }
    Ok(())
}

async fn index(mut app: AppBuilder, file: Option<PathBuf>, overwrite: bool) -> anyhow::Result<()> {
    if overwrite {
        app.config_mut().store.overwrite = true;
    }
    let config = app.config();
    let corpus = file.unwrap_or_else(|| config.store.corpus_path.clone());

    let embedder = create_embedding_provider(config);
    let store = build_store(config, &embedder);
    let outcome = store
        .build_or_load(true, Some(&corpus))
        .await
        .with_context(|| format!("failed to index {}", corpus.display()))?;

    match outcome {
        BuildOutcome::Loaded { chunks } => {
            println!("Loaded existing index from {} ({chunks} chunks)", store.db_path().display());
        }
        BuildOutcome::Built { chunks } => {
            println!("Built index at {} ({chunks} chunks)", store.db_path().display());
        }
        BuildOutcome::Uninitialized => println!("No index available"),
    }
    Ok(())
}

async fn ask(app: &AppBuilder, question: Option<String>) -> anyhow::Result<()> {
    let service = app.build_service()?;
    match service.initialize(corpus_for_init(app.config()).as_deref()).await {
        InitState::Ready => {}
        InitState::Failed(msg) => bail!("failed to initialize the index: {msg}"),
        other => bail!("index is {}; run `supportbot index` first", other.as_str()),
    }

    if let Some(question) = question {
        println!("{}", service.chat(&question).await?);
        return Ok(());
    }
    interactive(&service).await
}

async fn interactive(service: &ChatService) -> anyhow::Result<()> {
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        stdout.write_all(b"You: ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let question = line.trim();
        if question.eq_ignore_ascii_case("exit") {
            break;
        }
        if question.is_empty() {
            continue;
        }
        match service.chat(question).await {
            Ok(answer) => println!("Bot: {answer}"),
            Err(e) => eprintln!("error: {e}"),
        }
    }
    Ok(())
}

fn init_subscriber(config_path: &Path) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer();

    #[cfg(feature = "otel")]
    {
        let config = Config::load(config_path).ok();
        let use_otlp = config
            .as_ref()
            .is_some_and(|c| c.observability.exporter == "otlp");

        if use_otlp {
            let endpoint = config
                .as_ref()
                .map_or("http://localhost:4317", |c| &c.observability.endpoint);

            match setup_otel_tracer(endpoint) {
                Ok(tracer) => {
                    let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);
                    tracing_subscriber::registry()
                        .with(filter)
                        .with(fmt_layer)
                        .with(otel_layer)
                        .init();
                    return;
                }
                Err(e) => {
                    eprintln!("OTel initialization failed, falling back to fmt: {e}");
                }
            }
        }
    }

    #[cfg(not(feature = "otel"))]
    let _ = config_path;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

#[cfg(feature = "otel")]
fn setup_otel_tracer(endpoint: &str) -> anyhow::Result<opentelemetry_sdk::trace::SdkTracer> {
    use opentelemetry::trace::TracerProvider;
    use opentelemetry_otlp::WithExportConfig;

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()?;

    let provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .build();

    let tracer = provider.tracer("supportbot");
    opentelemetry::global::set_tracer_provider(provider);

    Ok(tracer)
}

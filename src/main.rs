use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use colored::Colorize;
use console::Emoji;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use showfeed::server::spawn_poll_loop;
use showfeed::{
    AppState, FileStore, HttpWorker, MemoryStore, RequestDraft, RequestLifecycle, ReqwestClient,
    Settings, SharedStore, SharedWorker, TracingReporter, generate_feed, serve,
};

// Emoji with fallback for terminals without Unicode support
static MICROPHONE: Emoji<'_, '_> = Emoji("🎙️  ", "");
static SUCCESS: Emoji<'_, '_> = Emoji("✅ ", "[+] ");
static FAILURE: Emoji<'_, '_> = Emoji("❌ ", "[!] ");
static PARTY: Emoji<'_, '_> = Emoji("🎉 ", "[*] ");
static FOLDER: Emoji<'_, '_> = Emoji("📁 ", "");
static CROSS: Emoji<'_, '_> = Emoji("✗ ", "x ");

/// Publish generated podcast shows as RSS feeds
#[derive(Parser, Debug)]
#[command(name = "showfeed")]
#[command(about = "Publish generated podcast shows as RSS feeds")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// JSON settings file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory of the file-backed record store
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Keep records in memory only (lost on exit)
    #[arg(long, global = true)]
    memory: bool,

    /// Quiet mode - suppress banner and summaries
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve feeds and the request API, and process queued requests
    Serve {
        /// Address to listen on
        #[arg(long)]
        bind: Option<SocketAddr>,

        /// Public base URL of the audio file server
        #[arg(long)]
        base_url: Option<String>,

        /// Generation service endpoint
        #[arg(long)]
        worker_url: Option<String>,
    },

    /// Process queued requests without serving HTTP
    Work {
        /// Run a single polling round and exit
        #[arg(long)]
        once: bool,

        /// Generation service endpoint
        #[arg(long)]
        worker_url: Option<String>,
    },

    /// Print the RSS feed of a show
    Feed {
        show_id: String,

        /// Public base URL of the audio file server
        #[arg(long)]
        base_url: Option<String>,
    },

    /// Queue a new show request
    Submit {
        /// Show title (derived from the prompt when omitted)
        #[arg(long, default_value = "")]
        title: String,

        /// What the show should be about
        #[arg(long)]
        prompt: String,

        /// User the show belongs to
        #[arg(long)]
        creator: String,
    },
}

fn init_tracing(quiet: bool) {
    let default_filter = if quiet { "showfeed=warn" } else { "showfeed=info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn open_store(args: &Args, settings: &Settings) -> Result<SharedStore> {
    if args.memory {
        return Ok(Arc::new(MemoryStore::new()));
    }

    let store = FileStore::open(&settings.data_dir)
        .await
        .with_context(|| format!("Failed to open data dir {}", settings.data_dir.display()))?;
    Ok(Arc::new(store))
}

fn build_worker(settings: &Settings) -> Result<Option<SharedWorker>> {
    let Some(endpoint) = settings.worker.endpoint.clone() else {
        return Ok(None);
    };

    let client = ReqwestClient::with_timeout(Duration::from_secs(settings.worker.timeout_seconds))
        .context("Failed to build HTTP client")?;

    Ok(Some(Arc::new(HttpWorker::new(
        client,
        endpoint,
        &settings.worker,
    ))))
}

fn print_banner(subtitle: &str) {
    println!(
        "\n{}{} {}\n",
        MICROPHONE,
        "showfeed".bold().magenta(),
        format!("- {subtitle}").dimmed()
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.quiet);

    let mut settings =
        Settings::load_or_default(args.config.as_deref()).context("Failed to load settings")?;
    if let Some(dir) = &args.data_dir {
        settings.data_dir = dir.clone();
    }

    match &args.command {
        Command::Serve {
            bind,
            base_url,
            worker_url,
        } => {
            if let Some(bind) = bind {
                settings.bind = *bind;
            }
            if let Some(base) = base_url {
                settings.feed.set_server_base(base)?;
            }
            if let Some(url) = worker_url {
                settings.set_worker_endpoint(url)?;
            }
            settings.validate()?;
            run_serve(&args, settings).await
        }
        Command::Work { once, worker_url } => {
            if let Some(url) = worker_url {
                settings.set_worker_endpoint(url)?;
            }
            settings.validate()?;
            run_work(&args, settings, *once).await
        }
        Command::Feed { show_id, base_url } => {
            if let Some(base) = base_url {
                settings.feed.set_server_base(base)?;
            }
            settings.validate()?;
            run_feed(&args, settings, show_id).await
        }
        Command::Submit {
            title,
            prompt,
            creator,
        } => {
            let draft = RequestDraft {
                title: title.clone(),
                prompt: prompt.clone(),
                creator: creator.clone(),
            };
            settings.validate()?;
            run_submit(&args, settings, draft).await
        }
    }
}

async fn run_serve(args: &Args, settings: Settings) -> Result<()> {
    let store = open_store(args, &settings).await?;
    let worker = build_worker(&settings)?;
    let lifecycle = RequestLifecycle::new(store, settings.lifecycle.clone())
        .with_reporter(TracingReporter::shared());

    if !args.quiet {
        print_banner("Show Feed Server");
        if !args.memory {
            println!(
                "{FOLDER}Data: {}",
                settings.data_dir.display().to_string().cyan()
            );
        }
        if worker.is_none() {
            println!(
                "{}",
                "No generation endpoint configured; requests stay queued".yellow()
            );
        }
    }

    let listener = TcpListener::bind(settings.bind)
        .await
        .with_context(|| format!("Failed to bind {}", settings.bind))?;

    serve(listener, AppState::new(lifecycle, settings.feed), worker)
        .await
        .context("Server failed")
}

async fn run_work(args: &Args, settings: Settings, once: bool) -> Result<()> {
    let Some(worker) = build_worker(&settings)? else {
        bail!("No generation endpoint configured (set worker.endpoint or --worker-url)");
    };
    let store = open_store(args, &settings).await?;
    let lifecycle = RequestLifecycle::new(store, settings.lifecycle.clone())
        .with_reporter(TracingReporter::shared());

    if !args.quiet {
        print_banner("Show Worker");
    }

    if !once {
        let (stop_tx, stop_rx) = watch::channel(false);
        let poller = spawn_poll_loop(lifecycle, worker, stop_rx);
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl+C")?;
        let _ = stop_tx.send(true);
        poller.await.context("Polling loop panicked")?;
        return Ok(());
    }

    let limit = settings.lifecycle.max_concurrent.max(1);
    let summary = lifecycle
        .run_pending(worker.as_ref(), limit)
        .await
        .context("Failed to process queued requests")?;

    if !args.quiet {
        println!(
            "\n{PARTY}{} {} published, {} failed, {} reclaimed, {} aborted",
            "Round complete:".bold().green(),
            summary.published.to_string().green().bold(),
            if summary.failed > 0 {
                summary.failed.to_string().red().bold()
            } else {
                summary.failed.to_string().green()
            },
            summary.reclaimed.to_string().yellow(),
            summary.aborted.to_string().yellow()
        );
    }

    if summary.failed > 0 && summary.published == 0 {
        std::process::exit(1);
    }

    Ok(())
}

async fn run_feed(args: &Args, settings: Settings, show_id: &str) -> Result<()> {
    let store = open_store(args, &settings).await?;
    let feed = generate_feed(store.as_ref(), show_id, &settings.feed)
        .await
        .with_context(|| format!("Failed to generate feed for show {show_id}"))?;

    println!("{}", feed.xml);

    if !args.quiet && !feed.defects.is_empty() {
        eprintln!("\n{}", "Skipped episodes:".red().bold());
        for defect in &feed.defects {
            eprintln!("  {}{}", CROSS, defect.to_string().dimmed());
        }
    }

    Ok(())
}

async fn run_submit(args: &Args, settings: Settings, draft: RequestDraft) -> Result<()> {
    let store = open_store(args, &settings).await?;
    let lifecycle = RequestLifecycle::new(store, settings.lifecycle.clone());

    let request = match lifecycle.submit(draft).await {
        Ok(request) => request,
        Err(e) => {
            eprintln!("{FAILURE}{}", e.to_string().red());
            return Err(e).context("Failed to submit request");
        }
    };

    if args.quiet {
        println!("{}", request.id);
    } else {
        println!(
            "{SUCCESS}Queued {} as {} ({})",
            request.title.bold().green(),
            request.id.cyan(),
            request.status.to_string().yellow()
        );
    }

    Ok(())
}

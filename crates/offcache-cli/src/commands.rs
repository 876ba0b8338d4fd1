//! Subcommand implementations.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::debug;

use offcache_core::{
    CacheController, CacheStorage, DiskCacheStorage, FetchOutcome, HttpNetwork, LifecycleHandler,
    Method, Network, RecordedDirectives, Request, Response, ServiceWorkerHost, Settings,
};

use crate::args::{Cli, Commands, ConfigArgs, FetchArgs};

/// Everything a command needs, wired from settings.
struct Runtime {
    storage: DiskCacheStorage,
    network: Arc<HttpNetwork>,
    directives: Arc<RecordedDirectives>,
    controller: CacheController,
}

impl Runtime {
    fn new(settings: &Settings) -> Result<Self> {
        let storage = DiskCacheStorage::new(settings.storage_dir()?);
        debug!(root = %storage.root().display(), "Using bucket storage");

        let mut network = HttpNetwork::new(Duration::from_secs(settings.request_timeout_secs))?;
        if let Some(ref scope) = settings.scope_url {
            network = network.with_scope(scope)?;
        }
        let network = Arc::new(network);
        let directives = Arc::new(RecordedDirectives::new());

        let controller = CacheController::new(
            settings.controller_config()?,
            Arc::new(storage.clone()),
            network.clone(),
            directives.clone(),
        )?;

        Ok(Self {
            storage,
            network,
            directives,
            controller,
        })
    }
}

pub async fn run(cli: Cli) -> Result<()> {
    let mut settings = match cli.config {
        Some(ref path) => Settings::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Settings::load().context("Failed to load config")?,
    };
    if let Some(dir) = cli.cache_dir {
        settings.cache_dir = Some(dir);
    }

    match cli.command {
        Commands::Install => install(&settings).await,
        Commands::Activate => activate(&settings).await,
        Commands::Fetch(args) => fetch(&settings, args).await,
        Commands::List => list(&settings).await,
        Commands::Config(args) => config(&settings, cli.config.as_deref(), args),
    }
}

async fn install(settings: &Settings) -> Result<()> {
    let ctx = Runtime::new(settings)?;
    let name = ctx.controller.cache_name().to_string();
    let host = ServiceWorkerHost::new(ctx.controller, ctx.directives);

    let stored = host
        .install()
        .await
        .with_context(|| format!("Install of {} failed", name))?;
    println!("Cached {} assets in {}", stored, name);

    if host.directives().skip_waiting_requested() {
        let report = host.activate().await.context("Activation failed")?;
        print_activation(&report.deleted, &report.failed);
    }
    println!("Worker {}", host.state().await);
    Ok(())
}

async fn activate(settings: &Settings) -> Result<()> {
    let ctx = Runtime::new(settings)?;
    let report = ctx
        .controller
        .on_activate()
        .await
        .context("Activation failed")?;
    print_activation(&report.deleted, &report.failed);
    Ok(())
}

fn print_activation(deleted: &[String], failed: &[String]) {
    for name in deleted {
        println!("Deleted old cache {}", name);
    }
    for name in failed {
        eprintln!("Could not delete old cache {}", name);
    }
}

async fn fetch(settings: &Settings, args: FetchArgs) -> Result<()> {
    let ctx = Runtime::new(settings)?;
    let method: Method = args.method.parse()?;
    let request = Request::new(method, args.url);

    let (source, response) = match ctx.controller.on_fetch(&request).await? {
        FetchOutcome::Cached(response) => ("cache", response),
        FetchOutcome::Network(response) => ("network", response),
        // Default handling for requests the controller leaves alone
        FetchOutcome::Passthrough => ("passthrough", ctx.network.fetch(&request).await?),
    };
    eprintln!("{} {} ({}, {} bytes)", response.status, request.url, source, response.body.len());

    write_body(&response, args.output.as_deref())
}

fn write_body(response: &Response, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => std::fs::write(path, &response.body)
            .with_context(|| format!("Failed to write {}", path.display())),
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&response.body)?;
            stdout.flush()?;
            Ok(())
        }
    }
}

async fn list(settings: &Settings) -> Result<()> {
    let ctx = Runtime::new(settings)?;
    let names = ctx.storage.keys().await?;
    if names.is_empty() {
        println!("No caches in {}", ctx.storage.root().display());
        return Ok(());
    }

    for name in names {
        let marker = if name == ctx.controller.cache_name() { "*" } else { " " };
        let entries = ctx.storage.entries(&name).await?;
        println!("{} {} ({} entries)", marker, name, entries.len());
        for entry in entries {
            println!(
                "    {} {:>8}  {:<10} {}",
                entry.response.status,
                entry.response.body.len(),
                entry.age_display(),
                entry.request.url
            );
        }
    }
    Ok(())
}

fn config(settings: &Settings, path: Option<&Path>, args: ConfigArgs) -> Result<()> {
    if args.init {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Settings::config_path()?,
        };
        if path.exists() {
            eprintln!("Config already exists at {}", path.display());
        } else {
            Settings::default().save_to(&path)?;
            eprintln!("Wrote default config to {}", path.display());
        }
    }

    println!("{}", serde_json::to_string_pretty(settings)?);
    Ok(())
}

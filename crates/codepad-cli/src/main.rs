//! Codepad CLI
//!
//! Runs playground code against the remote judge, the compile service or a
//! live dev server from the command line.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use codepad::{
    Config, EXAMPLE_CONFIG, FileBundle, Framework, HeadlessSurface, LiveOutcome, LocalHost,
    MemoryResourceStore, RunOutcome, Router, assemble, terminal,
};
use tokio::io::AsyncReadExt;
use tracing::{Level, debug, info, warn};
use tracing_subscriber::EnvFilter;

/// How often `--watch` checks the source file for changes
const WATCH_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Parser)]
#[command(name = "codepad")]
#[command(about = "Run playground code on a remote judge, a compile service or a live dev server")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new configuration file
    Init {
        /// Output path (default: codepad.toml)
        #[arg(short, long, default_value = "codepad.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(short, long)]
        force: bool,
    },

    /// List available languages
    Languages,

    /// Show the effective configuration
    ShowConfig,

    /// Run a source file with the given language
    Run {
        /// Source file to run
        #[arg(value_name = "FILE")]
        source: PathBuf,

        /// Language ID (e.g., python3, react, vue-live); defaults to the
        /// configured default language
        #[arg(short, long)]
        language: Option<String>,

        /// Write the rendered preview document here instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Run again whenever the source file changes
        #[arg(short, long)]
        watch: bool,
    },

    /// Assemble a compiled bundle directory into one preview document
    Assemble {
        /// Directory holding the compiled files
        #[arg(value_name = "DIR")]
        dir: PathBuf,

        /// Framework the bundle was built for
        #[arg(short, long, value_parser = parse_framework)]
        framework: Framework,

        /// Output path (default: stdout)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Normalize raw terminal output from stdin
    Clean,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    if let Some(ref path) = cli.config {
        info!(?path, "loading configuration");
    } else {
        debug!("using default configuration");
    }
    let config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;

    match cli.command {
        Commands::Init { output, force } => init_config(&output, force).await,
        Commands::Languages => {
            list_languages(&config);
            Ok(())
        }
        Commands::ShowConfig => {
            show_config(&config);
            Ok(())
        }
        Commands::Run {
            source,
            language,
            out,
            watch,
        } => run_source(&config, &source, language.as_deref(), out.as_deref(), watch).await,
        Commands::Assemble {
            dir,
            framework,
            out,
        } => assemble_dir(&dir, framework, out.as_deref()).await,
        Commands::Clean => clean_stdin().await,
    }
}

fn parse_framework(value: &str) -> Result<Framework, String> {
    match value.to_ascii_lowercase().as_str() {
        "angular" => Ok(Framework::Angular),
        "react" => Ok(Framework::React),
        "vue" => Ok(Framework::Vue),
        other => Err(format!(
            "unknown framework '{other}' (expected angular, react or vue)"
        )),
    }
}

async fn run_source(
    config: &Config,
    source: &Path,
    language_id: Option<&str>,
    out: Option<&Path>,
    watch: bool,
) -> Result<()> {
    let descriptor = match language_id {
        Some(id) => config
            .descriptor(id)
            .with_context(|| format!("unknown language '{id}'"))?,
        None => config
            .default_descriptor()
            .context("no --language given and no default_language configured")?,
    };
    debug!(language = %descriptor.id, "selected language");
    let live = matches!(
        descriptor.strategy,
        codepad::ExecutionStrategy::LiveEnvironment { .. }
    );

    let router = Router::from_config(
        config,
        Arc::new(HeadlessSurface::new()),
        Arc::new(MemoryResourceStore::new()),
        Arc::new(LocalHost::new(config.environment.workdir.clone())),
    )
    .context("failed to set up backends")?;
    router.select_language(descriptor);

    // Live runs stream dev server output for as long as the CLI runs
    let printer = live.then(|| tokio::spawn(print_output(router.output().subscribe())));

    let mut modified = source_modified(source);
    let mut succeeded = run_once(&router, source, out, live).await?;

    if watch || live {
        info!("press Ctrl-C to stop");
        let mut interval = tokio::time::interval(WATCH_INTERVAL);
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                _ = interval.tick() => {
                    if !watch {
                        continue;
                    }
                    let current = source_modified(source);
                    if current != modified {
                        modified = current;
                        info!(path = %source.display(), "source changed, running again");
                        succeeded = run_once(&router, source, out, live).await?;
                    }
                }
            }
        }
        router.environment().reset();
    }

    if let Some(printer) = printer {
        printer.abort();
    }
    if !succeeded {
        std::process::exit(1);
    }
    Ok(())
}

/// Run the file once and report the outcome. Returns whether the run succeeded.
async fn run_once(router: &Router, source: &Path, out: Option<&Path>, live: bool) -> Result<bool> {
    let code = tokio::fs::read_to_string(source)
        .await
        .context("failed to read source file")?;

    match router.run(&code).await {
        Ok(RunOutcome::Executed(result)) => {
            println!("{}", router.output().snapshot());
            info!(
                status = %result.status.description,
                time = result.time.as_deref().unwrap_or("-"),
                memory = ?result.memory,
                "execution result"
            );
            Ok(result.status.is_accepted())
        }
        Ok(RunOutcome::Rendered { handle }) => {
            let preview = router
                .artifacts()
                .preview
                .context("rendered run left no preview document")?;
            write_output(out, preview.html()).await?;
            info!(url = handle.url(), "{}", router.output().snapshot());
            Ok(true)
        }
        Ok(RunOutcome::Live(LiveOutcome::Started { url })) => {
            info!(%url, "open the preview in a browser");
            Ok(true)
        }
        Ok(RunOutcome::Live(outcome)) => {
            debug!(?outcome, "live run handled");
            Ok(true)
        }
        Ok(RunOutcome::Superseded) => Ok(true),
        Err(err) => {
            // The live printer already shows the environment's output
            if !live {
                eprintln!("{}", router.output().snapshot());
            }
            warn!(%err, "run failed");
            Ok(false)
        }
    }
}

fn source_modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Print output changes as they arrive
async fn print_output(mut rx: tokio::sync::watch::Receiver<String>) {
    let mut printed = String::new();
    while rx.changed().await.is_ok() {
        let current = rx.borrow_and_update().clone();
        match current.strip_prefix(printed.as_str()) {
            Some(delta) => print!("{delta}"),
            None => print!("\n{current}"),
        }
        let _ = std::io::stdout().flush();
        printed = current;
    }
}

async fn write_output(out: Option<&Path>, contents: &str) -> Result<()> {
    match out {
        Some(path) => {
            tokio::fs::write(path, contents)
                .await
                .with_context(|| format!("failed to write '{}'", path.display()))?;
            info!(path = %path.display(), "wrote preview document");
        }
        None => println!("{contents}"),
    }
    Ok(())
}

async fn assemble_dir(dir: &Path, framework: Framework, out: Option<&Path>) -> Result<()> {
    let mut bundle = FileBundle::new();
    collect_files(dir, dir, &mut bundle)
        .await
        .with_context(|| format!("failed to read bundle directory '{}'", dir.display()))?;
    debug!(files = bundle.len(), %framework, "assembling bundle");

    let document = assemble(&bundle, framework);
    write_output(out, document.html()).await
}

async fn collect_files(root: &Path, dir: &Path, bundle: &mut FileBundle) -> Result<()> {
    let mut pending = vec![dir.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_dir() {
                pending.push(path);
                continue;
            }
            let relative = path
                .strip_prefix(root)
                .context("bundle file outside its directory")?
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            match tokio::fs::read_to_string(&path).await {
                Ok(contents) => bundle.insert(relative, contents),
                Err(err) => warn!(path = %path.display(), %err, "skipping unreadable file"),
            }
        }
    }
    Ok(())
}

async fn clean_stdin() -> Result<()> {
    let mut raw = Vec::new();
    tokio::io::stdin()
        .read_to_end(&mut raw)
        .await
        .context("failed to read stdin")?;
    print!("{}", terminal::clean(&String::from_utf8_lossy(&raw)));
    Ok(())
}

fn list_languages(config: &Config) {
    println!("Available languages:\n");

    let mut languages: Vec<_> = config.languages.iter().collect();
    languages.sort_by_key(|(id, _)| *id);

    for (id, lang) in languages {
        println!("  {:<15} {} ({})", id, lang.name, lang.strategy.label());
    }
}

fn show_config(config: &Config) {
    println!("Services:");
    println!("  Judge URL: {}", config.services.judge_url);
    println!("  Compile URL: {}", config.services.compile_url);
    println!("  Request timeout: {}s", config.services.request_timeout);
    println!();
    println!("Environment:");
    println!("  Workdir: {}", config.environment.workdir.display());
    println!("  Install: {}", config.environment.install_command.join(" "));
    println!("  Start: {}", config.environment.start_command.join(" "));
    println!("  Settle delay: {} ms", config.environment.settle_delay_ms);
    println!();
    println!(
        "Default language: {}",
        config.default_language.as_deref().unwrap_or("(none)")
    );
    println!("Languages configured: {}", config.languages.len());
}

async fn init_config(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "Configuration file already exists at '{}'. Use --force to overwrite.",
            output.display()
        );
    }

    tokio::fs::write(output, EXAMPLE_CONFIG)
        .await
        .context("failed to write configuration file")?;

    println!("Created configuration file at '{}'", output.display());
    Ok(())
}

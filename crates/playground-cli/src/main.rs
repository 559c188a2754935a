//! Playground CLI
//!
//! A command-line tool for compiling and running Java submissions through
//! the playground engine.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use playground::api::resolve_backend;
use playground::{
    BackendKind, Config, EXAMPLE_CONFIG, Engine, FormatChecker, Request, RunResult, Submission,
};
use tokio::io::AsyncReadExt;
use tracing::{Level, debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "playground")]
#[command(about = "Compile and run untrusted Java submissions")]
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
        /// Output path
        #[arg(short, long, default_value = "playground.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Compile and run source files
    Run {
        /// Source files, compiled together in the given order
        #[arg(value_name = "FILE", required = true)]
        sources: Vec<PathBuf>,

        /// Treat the single file as a statement sequence
        #[arg(short, long)]
        snippet: bool,

        /// Pin a backend ("restricted", "full" or a backend name)
        #[arg(short, long)]
        backend: Option<String>,

        /// Execution deadline in milliseconds
        #[arg(short, long)]
        timeout: Option<u64>,

        /// Entry class (class mode)
        #[arg(long = "class", value_name = "NAME")]
        entry_class: Option<String>,

        /// Indentation level for synthesis and style checking
        #[arg(short, long)]
        indent: Option<usize>,

        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run a JSON request ("-" reads stdin) and print the JSON result
    Exec {
        #[arg(value_name = "REQUEST")]
        request: PathBuf,
    },

    /// Check the formatting of a source file
    CheckStyle {
        #[arg(value_name = "FILE")]
        source: PathBuf,

        /// Indentation level
        #[arg(short, long)]
        indent: Option<usize>,
    },

    /// List configured backends
    Backends,

    /// Show the effective configuration
    ShowConfig,
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
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = if let Some(ref path) = cli.config {
        info!(?path, "loading configuration");
        Config::from_file(path).context("failed to load configuration")?
    } else {
        debug!("using default configuration");
        Config::default()
    };

    match cli.command {
        Commands::Init { output, force } => init_config(&output, force).await,
        Commands::Run {
            sources,
            snippet,
            backend,
            timeout,
            entry_class,
            indent,
            json,
        } => {
            let options = RunOptions {
                snippet,
                backend,
                timeout,
                entry_class,
                indent,
                json,
            };
            run_sources(config, &sources, options).await
        }
        Commands::Exec { request } => exec_request(config, &request).await,
        Commands::CheckStyle { source, indent } => check_style(&config, &source, indent).await,
        Commands::Backends => {
            list_backends(&config);
            Ok(())
        }
        Commands::ShowConfig => {
            show_config(&config);
            Ok(())
        }
    }
}

struct RunOptions {
    snippet: bool,
    backend: Option<String>,
    timeout: Option<u64>,
    entry_class: Option<String>,
    indent: Option<usize>,
    json: bool,
}

async fn run_sources(config: Config, sources: &[PathBuf], options: RunOptions) -> Result<()> {
    let mut units = Vec::with_capacity(sources.len());
    for path in sources {
        let unit = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read '{}'", path.display()))?;
        units.push(unit);
    }

    let mut builder = if options.snippet {
        if units.len() != 1 {
            anyhow::bail!("--snippet takes exactly one file");
        }
        Submission::snippet(units.remove(0))
    } else {
        Submission::classes(units)
    };
    if let Some(name) = &options.backend {
        builder = builder.backend(resolve_backend(name, &config)?);
    }
    if let Some(ms) = options.timeout {
        builder = builder.timeout_ms(ms);
    }
    if let Some(name) = options.entry_class {
        builder = builder.entry_class(name);
    }
    if let Some(level) = options.indent {
        builder = builder.indent_level(level);
    }
    let submission = builder.build().context("invalid submission")?;

    let engine = Engine::new(config).context("failed to create engine")?;
    info!(mode = %submission.mode(), "running submission");
    let result = engine.run(&submission).await;

    if options.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        report(&result);
    }
    std::io::stdout().flush().context("failed to flush output")?;

    if result.executed {
        Ok(())
    } else {
        std::process::exit(1);
    }
}

fn report(result: &RunResult) {
    // Guest output goes to stdout untouched, everything else to stderr
    print!("{}", result.output);

    if let Some(message) = &result.compilation_error_message {
        eprintln!("Compilation failed ({}):", result.compiler_used);
        eprintln!("{message}");
    }
    if let Some(message) = &result.execution_error_message {
        eprintln!("Crashed: {message}");
    }
    if result.timed_out {
        eprintln!("Timed out after {}ms", result.timeout_length_ms);
    }

    info!(
        compiled = result.compiled,
        executed = result.executed,
        crashed = result.crashed,
        timed_out = result.timed_out,
        compiler = %result.compiler_used,
        compile_ms = result.compile_length_ms,
        execution_ms = result.execution_length_ms,
        style_check_passed = ?result.style_check_passed,
        "execution result"
    );
}

async fn exec_request(config: Config, path: &Path) -> Result<()> {
    let raw = if path == Path::new("-") {
        let mut raw = String::new();
        tokio::io::stdin()
            .read_to_string(&mut raw)
            .await
            .context("failed to read request from stdin")?;
        raw
    } else {
        tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read '{}'", path.display()))?
    };
    let request: Request = serde_json::from_str(&raw).context("malformed request")?;

    let engine = Engine::new(config).context("failed to create engine")?;
    let result = engine.run_request(request).await;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn check_style(config: &Config, path: &Path, indent: Option<usize>) -> Result<()> {
    let source = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read '{}'", path.display()))?;
    let indent = indent.unwrap_or(config.default_indent_level);

    let violations = FormatChecker::new().violations(&source, indent);
    if violations.is_empty() {
        println!("Style check passed");
        return Ok(());
    }
    for violation in &violations {
        println!("{}:{violation}", path.display());
    }
    std::process::exit(1);
}

fn list_backends(config: &Config) {
    println!("Configured backends:\n");
    for kind in BackendKind::ALL {
        let backend = config.backend(kind);
        let role = match kind {
            BackendKind::Restricted => "tried first",
            BackendKind::FullSpec => "fallback",
        };
        println!("  {:<12} {} ({role})", kind.key(), backend.name);
        println!("    compile: {}", backend.compile.join(" "));
        println!("    run:     {}", backend.run.join(" "));
        if !backend.unsupported_patterns.is_empty() {
            println!("    fallback signatures: {}", backend.unsupported_patterns.len());
        }
    }
}

fn show_config(config: &Config) {
    println!("Timeouts:");
    println!("  Default execution: {}ms", config.default_timeout_ms);
    println!("  Maximum execution: {}ms", config.max_timeout_ms);
    println!("  Startup: {}ms", config.startup_timeout_ms);
    println!("  Compile: {}ms", config.compile_timeout_ms);
    println!();
    println!("Workers: {}", config.max_workers);
    println!("Output cap: {} bytes", config.max_output);
    println!("Default entry class: {}", config.default_entry_class);
    println!("Default indent level: {}", config.default_indent_level);
    println!(
        "Style check: {}",
        if config.style.enabled { "enabled" } else { "disabled" }
    );
    println!();
    for kind in BackendKind::ALL {
        let limits = config.worker_limits(kind);
        println!("Worker limits ({}):", config.backend(kind).name);
        println!("  CPU time: {:?} s", limits.cpu_time);
        println!("  Memory limit: {:?} KB", limits.memory_limit);
        println!("  Max processes: {:?}", limits.max_processes);
        println!("  Max file size: {:?} KB", limits.max_file_size);
        println!("  Max open files: {:?}", limits.max_open_files);
    }
    println!();
    let security = &config.security;
    println!("Isolation:");
    println!("  Jail: {}", if security.isolation { "enabled" } else { "disabled" });
    println!("  Network namespace: {}", security.network_namespace);
    if security.isolation {
        for path in &security.read_only_paths {
            println!("  read-only: {}", path.display());
        }
        for path in &security.devices {
            println!("  device:    {}", path.display());
        }
    }
}

async fn init_config(output: &PathBuf, force: bool) -> Result<()> {
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

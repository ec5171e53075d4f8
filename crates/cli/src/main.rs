mod echo;

use std::fs;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::{CommandFactory, Parser};
use clap_complete::Shell;
use owo_colors::OwoColorize;
use picgrab_core::{ConfigLoader, ResolvedImage, Resolver, ResolverConfig, fetch_file, fetch_stdin, save_all};
use tracing::debug;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::echo::{
    format_size, print_banner, print_error, print_info, print_resolution_details, print_step, print_success,
    print_timing, print_warning,
};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Output format for resolved images
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Invalid format: {}. Valid options: text, json", s)),
        }
    }
}

/// Find the images of a supported web page and optionally download them
#[derive(Parser, Debug)]
#[command(name = "picgrab")]
#[command(author = "picgrab contributors")]
#[command(version)]
#[command(about = "Find and download the images of web pages", long_about = None)]
struct Args {
    /// Page URL; selects the domain rules and is fetched unless --html is given
    #[arg(value_name = "URL", required_unless_present = "completions")]
    url: Option<String>,

    /// Read the page markup from a local file, or "-" for stdin, instead of fetching it
    #[arg(long, value_name = "FILE")]
    html: Option<String>,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text", value_name = "FORMAT")]
    format: OutputFormat,

    /// Download the resolved images into their target paths
    #[arg(long)]
    download: bool,

    /// Only print the name of the domain responsible for URL
    #[arg(long)]
    match_only: bool,

    /// Directory with custom domains.json and download_directories.json
    #[arg(long, value_name = "DIR")]
    config_dir: Option<PathBuf>,

    /// Directory whose domains.json replaces the bundled rules
    #[arg(long, value_name = "DIR")]
    standard_dir: Option<PathBuf>,

    /// Ignore the custom configuration directory
    #[arg(long, conflicts_with = "config_dir")]
    no_custom: bool,

    /// Root for relative download directories (default: the user's pictures directory)
    #[arg(long, value_name = "DIR")]
    pictures_dir: Option<PathBuf>,

    /// HTTP timeout in seconds
    #[arg(long, default_value = "30", value_name = "SECS")]
    timeout: u64,

    /// Custom User-Agent for HTTP requests
    #[arg(long, value_name = "UA")]
    user_agent: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Generate shell completion script
    #[arg(long, value_name = "SHELL")]
    completions: Option<Shell>,
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "warn,picgrab=debug,picgrab_core=debug" } else { "warn" };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn config_loader(args: &Args) -> ConfigLoader {
    let mut builder = ConfigLoader::builder();

    if !args.no_custom {
        if let Some(dir) = args.config_dir.clone().or_else(ConfigLoader::default_custom_dir) {
            builder = builder.custom_dir(dir);
        }
    }
    if let Some(dir) = &args.standard_dir {
        builder = builder.standard_dir(dir);
    }

    builder.build()
}

fn resolver_config(args: &Args) -> ResolverConfig {
    let mut builder = ResolverConfig::builder().timeout(args.timeout);

    if let Some(user_agent) = &args.user_agent {
        builder = builder.user_agent(user_agent.clone());
    }
    if let Some(dir) = &args.pictures_dir {
        builder = builder.pictures_root(dir);
    }

    builder.build()
}

fn read_markup(source: &str) -> anyhow::Result<String> {
    if source == "-" {
        fetch_stdin().context("Failed to read from stdin")
    } else {
        fetch_file(source).with_context(|| format!("Failed to read file: {}", source))
    }
}

fn render(images: &[ResolvedImage], format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Text => Ok(images
            .iter()
            .map(|image| format!("{}\t{}\n", image.image_url, image.target_path.display()))
            .collect()),
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(images).context("Failed to serialize images")?;
            Ok(format!("{}\n", json))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    if let Some(shell) = args.completions {
        clap_complete::generate(shell, &mut Args::command(), "picgrab", &mut io::stdout());
        return Ok(ExitCode::SUCCESS);
    }

    init_logging(args.verbose);
    let url = args.url.clone().context("A page URL is required")?;
    let total = if args.download { 4 } else { 3 };

    if args.verbose {
        print_banner();
        print_info("Debug logging enabled");
        eprintln!();
        print_step(1, total, "Loading domain configuration");
    }

    let loader = config_loader(&args);
    let registry = loader.load_registry().context("Failed to load domain configuration")?;

    debug!(
        custom = ?loader.custom_dir(),
        standard = ?loader.standard_dir(),
        domains = registry.len(),
        "loaded domain configuration"
    );

    let Some(domain) = registry.match_url(&url) else {
        print_error(&format!("No domain configured for {}", url));
        return Ok(ExitCode::FAILURE);
    };

    if args.match_only {
        println!("{}", domain.name);
        return Ok(ExitCode::SUCCESS);
    }

    let resolver = Resolver::new(Arc::new(registry), resolver_config(&args)).context("Failed to create HTTP client")?;
    let started = Instant::now();

    let images = match &args.html {
        Some(source) => {
            if args.verbose {
                print_step(2, total, &format!("Reading markup from {}", source.bright_white()));
            }
            let markup = read_markup(source)?;
            if args.verbose {
                eprintln!("  {} {}", "Size:".dimmed(), format_size(markup.len() as u64).bright_white());
            }
            resolver.resolve_markup(&url, &markup)
        }
        None => {
            if args.verbose {
                print_step(2, total, &format!("Fetching {}", url.bright_white().underline()));
            }
            resolver.resolve(&url).await
        }
    };

    if args.verbose {
        print_timing("Resolve", started.elapsed());
        print_resolution_details(&domain.name, &images);
    }

    if images.is_empty() {
        print_error(&format!("No images found on {}", url));
        return Ok(ExitCode::FAILURE);
    }

    if args.verbose {
        print_step(3, total, "Writing output");
    }
    print!("{}", render(&images, args.format)?);

    if !args.download {
        return Ok(ExitCode::SUCCESS);
    }

    if args.verbose {
        print_step(4, total, "Downloading images");
    }

    let mut failed = 0;
    for (image, result) in images.iter().zip(save_all(resolver.fetcher(), &images).await) {
        match result {
            Ok(path) => {
                let size = fs::metadata(&path).map(|meta| meta.len()).unwrap_or_default();
                print_success(&format!("Saved {} ({})", path.display().bright_white(), format_size(size)));
            }
            Err(e) => {
                failed += 1;
                print_warning(&format!("Could not save {}: {}", image.image_url, e));
            }
        }
    }

    if failed > 0 {
        print_error(&format!("{} of {} images failed to download", failed, images.len()));
        return Ok(ExitCode::FAILURE);
    }

    Ok(ExitCode::SUCCESS)
}

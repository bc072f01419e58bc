use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use image_harvester_core::context::RunContext;
use image_harvester_core::emit::{EmitReport, EmitRequest};
use image_harvester_core::net::HttpClient;
use image_harvester_core::sink::DirectorySink;
use image_harvester_core::{logging, Config, Discovery, ImageHarvester, LogLevel};
use log::{info, warn, LevelFilter};
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;

#[derive(Parser)]
#[command(name = "image-harvester")]
#[command(about = "Harvest, rank and normalize product images from a web page")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Write logs to rotating files in this directory instead of stderr
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the ranked image candidates of a page as JSON
    Discover {
        /// Page URL
        page: String,

        /// Read the rendered document from a file instead of fetching it
        #[arg(long)]
        html: Option<PathBuf>,

        /// Harvest even if the domain is not enabled
        #[arg(long)]
        force: bool,

        /// Show every candidate, ignoring the size and duplicate toggles
        #[arg(long)]
        all: bool,
    },

    /// Render and store a selection of source URLs
    Emit {
        /// JSON file holding an emit request ({"urls": [...], "product_name": "..."})
        #[arg(long, conflicts_with = "urls")]
        request: Option<PathBuf>,

        /// Source URLs in the order they should be numbered
        #[arg(long, num_args = 1..)]
        urls: Vec<String>,

        /// Product name used for the folder and file names
        #[arg(long, default_value = "")]
        name: String,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
    },

    /// Discover a page and emit the selected candidates in one go
    Run {
        /// Page URL
        page: String,

        /// Read the rendered document from a file instead of fetching it
        #[arg(long)]
        html: Option<PathBuf>,

        /// Harvest even if the domain is not enabled
        #[arg(long)]
        force: bool,

        /// 1-based positions in the ranked list to emit (default: all)
        #[arg(long, value_delimiter = ',')]
        select: Vec<usize>,

        /// Override the product name
        #[arg(long)]
        name: Option<String>,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
    },

    /// Enable or disable harvesting for a domain
    Domain {
        #[command(subcommand)]
        action: DomainAction,
    },

    /// Generate default configuration file
    GenerateConfig {
        /// Path to save configuration file
        #[arg(default_value = "image-harvester.json")]
        path: PathBuf,
    },
}

#[derive(Subcommand)]
enum DomainAction {
    /// Allow harvesting on the base domain of HOST
    Enable { host: String },

    /// Stop harvesting on the base domain of HOST
    Disable { host: String },
}

const DEFAULT_CONFIG_PATH: &str = "image-harvester.json";

fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Ok(Config::from_file(path)?),
        None => Ok(Config::default()),
    }
}

fn init_logging(cli: &Cli, config: &Config) -> anyhow::Result<()> {
    let level = match cli.verbose {
        0 => config.log_level,
        1 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };
    let filter = level
        .as_filter()
        .parse::<LevelFilter>()
        .unwrap_or(LevelFilter::Info);

    match &cli.log_dir {
        Some(dir) => logging::init_logger(dir, filter)
            .map_err(|e| anyhow::anyhow!("Failed to initialize file logging: {}", e))?,
        None => env_logger::Builder::new()
            .filter_level(filter)
            .parse_default_env()
            .init(),
    }
    Ok(())
}

fn page_html(client: &HttpClient, page: &str, html: Option<&Path>) -> anyhow::Result<String> {
    match html {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        None => Ok(client.fetch_page(page)?),
    }
}

fn discover(
    config: Config,
    page: &str,
    html: Option<&Path>,
    force: bool,
) -> anyhow::Result<(ImageHarvester, HttpClient, Discovery)> {
    let mut context = RunContext::init(config, page)?;
    if force {
        context = context.force_active();
    }
    if !context.is_active() {
        warn!(
            "{} is not enabled; run `image-harvester domain enable {}` or pass --force",
            context.base_domain(),
            context.base_domain()
        );
    }

    let flag = context.cancel_flag();
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))?;

    let client = HttpClient::new(context.config())?;
    let harvester = ImageHarvester::new(context);
    let document = page_html(&client, page, html)?;
    let discovery = harvester.discover(&document, page, &client)?;
    Ok((harvester, client, discovery))
}

fn print_report(report: &EmitReport) {
    for file in &report.emitted {
        println!("{} <- {}", file.stored_at.display(), file.source_url);
    }
    println!(
        "{} emitted, {} duplicates skipped, {} failed{}",
        report.emitted.len(),
        report.skipped_duplicates,
        report.failed,
        if report.cancelled { " (cancelled)" } else { "" }
    );
}

fn main() -> Result<(), anyhow::Error> {
    // Parse command line arguments
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    init_logging(&cli, &config)?;

    match cli.command {
        Commands::Discover {
            page,
            html,
            force,
            all,
        } => {
            let (harvester, _client, discovery) = discover(config, &page, html.as_deref(), force)?;
            let candidates = if all {
                discovery.candidates
            } else {
                harvester.present(&discovery.candidates)
            };
            let view = Discovery {
                candidates,
                product_name: discovery.product_name,
            };
            println!("{}", serde_json::to_string_pretty(&view)?);
            Ok(())
        }

        Commands::Emit {
            request,
            urls,
            name,
            out,
        } => {
            let request = match request {
                Some(path) => {
                    let file = std::fs::File::open(&path)
                        .with_context(|| format!("Failed to open {}", path.display()))?;
                    serde_json::from_reader::<_, EmitRequest>(file)?
                }
                None => EmitRequest {
                    urls,
                    product_name: name,
                },
            };
            if request.urls.is_empty() {
                bail!("No source URLs given");
            }

            // Emission works on an explicit selection; the allow-list does not apply.
            let context = RunContext::init(config, "about:blank")?.force_active();
            let flag = context.cancel_flag();
            ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))?;

            let client = HttpClient::new(context.config())?;
            let harvester = ImageHarvester::new(context);
            let mut sink = DirectorySink::new(&out);
            let report = harvester.emit(&request, &client, &mut sink, true);
            print_report(&report);
            Ok(())
        }

        Commands::Run {
            page,
            html,
            force,
            select,
            name,
            out,
        } => {
            let (harvester, client, discovery) = discover(config, &page, html.as_deref(), force)?;
            let ranked = harvester.present(&discovery.candidates);
            info!("{} candidates after ranking", ranked.len());

            let urls: Vec<String> = if select.is_empty() {
                ranked.iter().map(|c| c.url.clone()).collect()
            } else {
                let mut picked = Vec::with_capacity(select.len());
                for position in select {
                    match position.checked_sub(1).and_then(|i| ranked.get(i)) {
                        Some(candidate) => picked.push(candidate.url.clone()),
                        None => bail!(
                            "Selection {} is out of range (1..={})",
                            position,
                            ranked.len()
                        ),
                    }
                }
                picked
            };

            let request = EmitRequest {
                urls,
                product_name: name.unwrap_or(discovery.product_name),
            };
            let mut sink = DirectorySink::new(&out);
            let report = harvester.emit(&request, &client, &mut sink, true);
            print_report(&report);
            Ok(())
        }

        Commands::Domain { action } => {
            let path = cli
                .config
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
            let mut config = if path.exists() {
                Config::from_file(&path)?
            } else {
                config
            };

            let (host, enabled) = match action {
                DomainAction::Enable { host } => (host, true),
                DomainAction::Disable { host } => (host, false),
            };
            config.set_domain_enabled(&host, enabled);
            config.save_to_file(&path)?;
            println!(
                "{} {} in {}",
                image_harvester_core::normalize::base_domain(&host),
                if enabled { "enabled" } else { "disabled" },
                path.display()
            );
            Ok(())
        }

        Commands::GenerateConfig { path } => {
            let config = Config::default();
            config.save_to_file(&path)?;
            println!("Configuration file generated at: {}", path.display());
            Ok(())
        }
    }
}

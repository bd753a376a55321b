use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use humandbs_crawler::app::{App, ProgressSink};
use humandbs_crawler::config::{ConfigLoader, Settings};
use humandbs_crawler::domain::{HumId, Lang};
use humandbs_crawler::enrich::EnrichOptions;
use humandbs_crawler::error::CrawlError;
use humandbs_crawler::http::ReqwestTransport;
use humandbs_crawler::mapping::MappingTable;
use humandbs_crawler::output::{ConsoleProgress, HumanOutput, JsonOutput, OutputMode};
use humandbs_crawler::store::Store;
use humandbs_crawler::walker::DownloadOptions;

const REGISTRY_RETRIES: usize = 3;

#[derive(Parser)]
#[command(name = "humandbs")]
#[command(about = "Crawl the NBDC Human Database portal into validated research, version and dataset records")]
#[command(version, author)]
struct Cli {
    /// Config file; defaults to ./humandbs.json when present.
    #[arg(long, global = true)]
    config: Option<String>,

    /// Root of the page, registry and record caches.
    #[arg(long, global = true)]
    cache_dir: Option<Utf8PathBuf>,

    /// Print one JSON document instead of a human summary.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Download portal pages into the cache")]
    Download(DownloadArgs),
    #[command(about = "Report datasets claimed by several projects and ownership drift")]
    CheckOwnership,
    #[command(about = "Parse cached pages into records")]
    Build,
    #[command(about = "Attach registry metadata and publication DOIs")]
    Enrich(EnrichArgs),
    #[command(about = "Validate records and write them to an index directory")]
    Export(ExportArgs),
}

#[derive(Args)]
struct DownloadArgs {
    /// Only this project; otherwise every project on the home page.
    hum_id: Option<String>,

    #[arg(long = "lang", value_enum)]
    langs: Vec<Lang>,

    /// Ignore cached pages and fetch again.
    #[arg(long)]
    force: bool,

    #[arg(long)]
    concurrency: Option<usize>,
}

#[derive(Args)]
struct EnrichArgs {
    /// Re-fetch datasets that already carry registry metadata.
    #[arg(long)]
    force: bool,

    #[arg(long)]
    no_cache: bool,
}

#[derive(Args)]
struct ExportArgs {
    #[arg(long)]
    out: Utf8PathBuf,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<CrawlError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &CrawlError) -> u8 {
    match error {
        CrawlError::InvalidHumId(_)
        | CrawlError::InvalidHumVersionId(_)
        | CrawlError::InvalidLang(_)
        | CrawlError::ConfigRead(_)
        | CrawlError::ConfigParse(_)
        | CrawlError::MappingTable(_)
        | CrawlError::HttpClient(_)
        | CrawlError::RecordNotFound(_) => 2,
        CrawlError::PortalHttp { .. }
        | CrawlError::PortalStatus { .. }
        | CrawlError::RegistryHttp { .. }
        | CrawlError::RegistryStatus { .. }
        | CrawlError::CrossrefHttp(_)
        | CrawlError::CrossrefStatus { .. } => 3,
        CrawlError::Parse { .. } | CrawlError::SchemaValidation { .. } | CrawlError::EmptyWorkList(_) => 4,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };

    let mut settings = ConfigLoader::resolve(cli.config.as_deref())?;
    if let Some(cache_dir) = cli.cache_dir {
        settings.cache_dir = Some(cache_dir);
    }
    let store = match &settings.cache_dir {
        Some(root) => Store::new_with_root(root.clone()),
        None => Store::new()?,
    };
    let mapping = match &settings.mapping_table {
        Some(path) => MappingTable::load(path)?,
        None => MappingTable::bundled()?,
    };
    let portal_http = ReqwestTransport::new(settings.timeout, 0)?;
    let registry_http = ReqwestTransport::new(settings.timeout, REGISTRY_RETRIES)?;
    tracing::debug!(root = %store.root(), "store ready");

    let app = App::new(store, settings, mapping, portal_http, registry_http);
    let sink: &dyn ProgressSink = match output_mode {
        OutputMode::Json => &JsonOutput,
        OutputMode::Human => &ConsoleProgress,
    };

    match cli.command {
        Commands::Download(args) => run_download(&app, args, output_mode, sink),
        Commands::CheckOwnership => {
            let report = app.check_ownership(sink)?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_ownership(&report).into_diagnostic(),
                OutputMode::Human => {
                    print!("{}", HumanOutput::ownership_summary(&report));
                    Ok(())
                }
            }
        }
        Commands::Build => {
            let result = app.build(sink)?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_build(&result).into_diagnostic(),
                OutputMode::Human => {
                    print!("{}", HumanOutput::build_summary(&result));
                    Ok(())
                }
            }
        }
        Commands::Enrich(args) => {
            let options = EnrichOptions {
                force: args.force,
                use_cache: !args.no_cache,
            };
            let result = app.enrich(options, sink)?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_enrich(&result).into_diagnostic(),
                OutputMode::Human => {
                    print!("{}", HumanOutput::enrich_summary(&result));
                    Ok(())
                }
            }
        }
        Commands::Export(args) => {
            let result = app.export(&args.out, sink)?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_export(&result).into_diagnostic(),
                OutputMode::Human => {
                    print!("{}", HumanOutput::export_summary(&result));
                    Ok(())
                }
            }
        }
    }
}

fn run_download(
    app: &App<ReqwestTransport, ReqwestTransport>,
    args: DownloadArgs,
    output_mode: OutputMode,
    sink: &dyn ProgressSink,
) -> miette::Result<()> {
    let hum_id = args
        .hum_id
        .as_deref()
        .map(str::parse::<HumId>)
        .transpose()?;
    let options = download_options(app.settings(), &args);
    let result = app.download(hum_id, options, sink)?;
    match output_mode {
        OutputMode::Json => JsonOutput::print_download(&result).into_diagnostic(),
        OutputMode::Human => {
            print!("{}", HumanOutput::download_summary(&result));
            Ok(())
        }
    }
}

fn download_options(settings: &Settings, args: &DownloadArgs) -> DownloadOptions {
    let requested = if args.langs.is_empty() {
        &settings.langs
    } else {
        &args.langs
    };
    let mut langs: Vec<Lang> = Vec::new();
    for &lang in requested {
        if !langs.contains(&lang) {
            langs.push(lang);
        }
    }
    DownloadOptions {
        langs,
        use_cache: !args.force,
        concurrency: args.concurrency.unwrap_or(settings.concurrency),
        max_version: settings.max_version,
    }
}

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use clap::Parser;
use tracing_subscriber::EnvFilter;
use tubemix::browser::BrowserSession;
use tubemix::config::{BrowserConfig, Config, DEFAULT_SAVE_ROOT, default_destination};
use tubemix::core::{DownloadOutcome, Extraction, MediaFormat, SessionSummary, Source};
use tubemix::download::Fetcher;
use tubemix::driver::prepare_destination;
use tubemix::error::TubemixError;
use tubemix::progress::{join_reporter, spawn_reporter};
use tubemix::utils::format_size;
use tubemix::youtube::build_watch_url;
use tubemix::{Downloader, Ytmp3Service, extract, require_references};

const VERSION: &str = const_str::concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    git_version::git_version!(fallback = "unknown"),
    ")"
);

#[derive(Parser)]
#[command(
    name = "tubemix",
    version = VERSION,
    about = "Download YouTube playlists, mixes and videos in MP3 or MP4",
    long_about = "A simple YouTube playlist downloader.\n\
    Converts every video through a conversion website driven by a WebDriver browser.\n\n\
    Examples:\n\
      tubemix https://www.youtube.com/watch?v=tPEE9ZwTmy0             # Download one video as MP3\n\
      tubemix -f mp4 https://www.youtube.com/playlist?list=PL...      # Download a playlist as MP4\n\
      tubemix ./mix.html ./music                                      # Download a saved mix page\n\
      tubemix -i ./mix.html                                           # List the videos only"
)]
struct Args {
    /// Link to video/playlist OR path to saved HTML
    #[arg(help = "Link to video/playlist OR path to saved HTML")]
    link_or_path: String,

    /// Directory to save the files
    #[arg(help = "Directory to save the files [default: saved/<date> #<n>]")]
    download_location: Option<PathBuf>,

    /// Format of the files (mp3, mp4)
    #[arg(
        short = 'f',
        long = "format",
        default_value = "mp3",
        value_parser = parse_format,
        help = "Format of the files (mp3, mp4)"
    )]
    format: MediaFormat,

    /// Hide the progress bars
    #[arg(short = 's', long = "silent", help = "Hide the progress bars")]
    silent: bool,

    /// List the videos found without downloading
    #[arg(
        short = 'i',
        long = "info-only",
        help = "List the videos found without downloading"
    )]
    info_only: bool,

    /// Print the video list as JSON (with --info-only)
    #[arg(long = "json", requires = "info_only")]
    json: bool,

    /// WebDriver server to connect to
    #[arg(long = "webdriver-url", env = "TUBEMIX_WEBDRIVER_URL")]
    webdriver_url: Option<String>,

    /// Start chromedriver instead of connecting to a running one
    #[arg(long = "spawn-driver", env = "TUBEMIX_SPAWN_DRIVER")]
    spawn_driver: bool,

    /// Show the browser window
    #[arg(long = "debug-browser", env = "TUBEMIX_DEBUG_BROWSER")]
    debug_browser: bool,

    /// Conversion website entry page
    #[arg(long = "service-url", env = "TUBEMIX_SERVICE_URL")]
    service_url: Option<String>,

    /// Seconds to wait for one conversion
    #[arg(long = "timeout", env = "TUBEMIX_TIMEOUT")]
    timeout: Option<u64>,
}

fn parse_format(format_str: &str) -> Result<MediaFormat, String> {
    format_str.parse()
}

fn build_config(args: &Args) -> Config {
    let mut browser = BrowserConfig {
        headless: !args.debug_browser,
        spawn_driver: args.spawn_driver,
        ..Default::default()
    };
    if let Some(url) = &args.webdriver_url {
        browser.webdriver_url = url.clone();
    }

    let mut config = Config::default().with_browser(browser);
    if let Some(url) = &args.service_url {
        config = config.with_service_url(url.clone());
    }
    if let Some(secs) = args.timeout {
        config = config.with_conversion_timeout(Duration::from_secs(secs));
    }
    config
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "tubemix=warn".into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn display_references(extraction: &Extraction) {
    println!("Found {} video(s):", extraction.references.len());
    println!();

    for (index, reference) in extraction.references.iter().enumerate() {
        println!(
            "[{}] {}",
            index + 1,
            reference.title.as_deref().unwrap_or(&reference.identifier)
        );
        println!("    Link: {}", reference.watch_url());
        if let Some(channel) = &reference.channel {
            println!("    Channel: {}", channel);
        }
    }
}

fn report_invalid(extraction: &Extraction) {
    let valid = extraction.references.len();
    if extraction.invalid.is_empty() {
        println!("{} valid ID found.", valid);
        return;
    }
    println!(
        "{} valid ID found. {} invalid ID found.",
        valid,
        extraction.invalid.len()
    );
    let links: Vec<_> = extraction
        .invalid
        .iter()
        .map(|id| build_watch_url(id))
        .collect();
    println!("Invalid links: {}", links.join(", "));
}

fn display_summary(summary: &SessionSummary, started: Instant) {
    println!();
    let bytes: u64 = summary
        .outcomes
        .iter()
        .map(|o| match o {
            DownloadOutcome::Succeeded { bytes, .. } => *bytes,
            DownloadOutcome::Failed { .. } => 0,
        })
        .sum();
    println!(
        "{} videos downloaded successfully ({}). {} invalid links found.",
        summary.succeeded(),
        format_size(bytes),
        summary.failed()
    );
    let failed = summary.failed_urls();
    if !failed.is_empty() {
        println!();
        println!("Invalid links: {}", failed.join(", "));
    }
    println!("Time elapsed: {:.1} second(s)", started.elapsed().as_secs_f64());
}

async fn run(args: Args) -> anyhow::Result<bool> {
    let config = build_config(&args);
    let source = Source::parse(&args.link_or_path)?;
    // must be built before any browser session is started
    let fetcher = Fetcher::new(&config.fetch)?;

    println!("Finding {} videos from {}", source.kind(), source);

    // A live playlist needs the browser before anything else; the other
    // sources only open it once there is something to convert.
    let mut session = match &source {
        Source::Playlist(_) => Some(BrowserSession::start(&config.browser).await?),
        _ => None,
    };

    let extraction = match extract(
        &source,
        session.as_ref().map(|s| s as &dyn tubemix::PageRenderer),
    )
    .await
    .and_then(|e| require_references(e, &source))
    {
        Ok(extraction) => extraction,
        Err(e) => {
            if let Some(session) = session.take() {
                session.close().await;
            }
            return Err(e.into());
        }
    };

    report_invalid(&extraction);

    if args.info_only {
        if let Some(session) = session.take() {
            session.close().await;
        }
        if args.json {
            println!("{}", serde_json::to_string_pretty(&extraction)?);
        } else {
            println!();
            display_references(&extraction);
        }
        return Ok(true);
    }

    let destination = args
        .download_location
        .clone()
        .unwrap_or_else(|| default_destination(Path::new(DEFAULT_SAVE_ROOT)));
    if let Err(e) = prepare_destination(&destination).await {
        if let Some(session) = session.take() {
            session.close().await;
        }
        return Err(e.into());
    }
    println!("Download location: {}", destination.display());

    let session = match session {
        Some(session) => session,
        None => BrowserSession::start(&config.browser).await?,
    };
    let service = Ytmp3Service::new(session, &config);

    let started = Instant::now();
    let (progress, reporter) = spawn_reporter(args.silent);
    let result = Downloader::new(&service, &fetcher, progress)
        .download(extraction.references, args.format, &destination)
        .await;
    join_reporter(reporter).await;
    service.close().await;

    let summary = result?;
    display_summary(&summary, started);
    Ok(!summary.all_failed())
}

#[tokio::main]
async fn main() {
    let _ = dotenv::dotenv();
    let args = Args::parse();
    init_tracing();

    match run(args).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {}", e);
            let bad_input = e
                .downcast_ref::<TubemixError>()
                .is_some_and(TubemixError::is_input_error);
            if bad_input {
                eprintln!("Please provide a valid link or path");
            }
            std::process::exit(1);
        }
    }
}

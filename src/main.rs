use clap::{Parser, Subcommand};
use pixpress::cache::CacheStore;
use pixpress::config::{self, ServiceConfig};
use pixpress::format::OutputFormat;
use pixpress::request::ImageRequest;
use pixpress::service::ImageService;
use pixpress::source::{FsProvider, normalize_source};
use pixpress::transform::{Fit, Position, Quality};
use pixpress::{janitor, placeholder, responsive};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Shared flags describing the derivative to produce.
#[derive(clap::Args, Clone)]
struct TransformArgs {
    /// Output width in pixels
    #[arg(short, long)]
    width: Option<u32>,

    /// Output height in pixels
    #[arg(long)]
    height: Option<u32>,

    /// Output format: jpeg, png, webp, avif (default: jpeg)
    #[arg(short, long)]
    format: Option<String>,

    /// Encoding quality 1-100 (default: per format)
    #[arg(short, long)]
    quality: Option<u32>,

    /// Fit mode when both dimensions are set: cover, contain, fill
    #[arg(long)]
    fit: Option<String>,

    /// Region kept by a cover crop: center, top, bottom, left, right
    #[arg(long)]
    position: Option<String>,

    /// Gaussian blur sigma, applied after resizing
    #[arg(long)]
    blur: Option<f32>,

    /// Apply light sharpening after resizing
    #[arg(long)]
    sharpen: bool,
}

impl TransformArgs {
    fn into_request(self, src: String, max_dimension: u32) -> Result<ImageRequest, String> {
        for (name, value) in [("--width", self.width), ("--height", self.height)] {
            if let Some(v) = value
                && (v == 0 || v > max_dimension)
            {
                return Err(format!("{name} must be between 1 and {max_dimension}, got {v}"));
            }
        }

        let mut request = ImageRequest::new(src);
        request.width = self.width;
        request.height = self.height;
        if let Some(name) = &self.format {
            request.format =
                Some(OutputFormat::parse(name).ok_or_else(|| format!("unknown format: {name}"))?);
        }
        request.quality = self.quality.map(Quality::new);
        if let Some(name) = &self.fit {
            request.fit = Fit::parse(name).ok_or_else(|| format!("unknown fit mode: {name}"))?;
        }
        if let Some(name) = &self.position {
            request.position =
                Position::parse(name).ok_or_else(|| format!("unknown position: {name}"))?;
        }
        request.blur = self.blur;
        request.sharpen = self.sharpen;
        Ok(request)
    }
}

fn version_string() -> &'static str {
    let on_tag = env!("ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once at startup, called exactly once
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "pixpress")]
#[command(about = "On-demand image derivative service")]
#[command(long_about = "\
On-demand image derivative service

Originals live under the configured source root. Derivatives — resized,
cropped, re-encoded, blurred — are produced on first request and cached
on disk. Every command runs through the same engine, so a derivative
generated here is a cache hit for a live request with the same
parameters, and vice versa.

Source strings:

  /photos/dawn.jpg                       Path under source_root
  /img?src=%2Fphotos%2Fdawn.jpg&w=640    Proxied URL (unwrapped to its src)

Examples:

  pixpress get /photos/dawn.jpg -w 640 -f webp -o dawn-640.webp
  pixpress variants /photos/dawn.jpg --widths 320,640,1280 -f avif
  pixpress placeholder /photos/dawn.jpg
  pixpress sweep --max-age-days 30

Run 'pixpress gen-config' to generate a documented pixpress.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Config file
    #[arg(long, default_value = "pixpress.toml", global = true)]
    config: PathBuf,

    /// Increase log detail on stderr (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Produce one derivative, writing it to a file or stdout
    Get {
        /// Source image: a path under the source root, or a proxied URL
        src: String,

        #[command(flatten)]
        transform: TransformArgs,

        /// Write the derivative here instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Generate the responsive width set for a source
    Variants {
        /// Source image: a path under the source root, or a proxied URL
        src: String,

        /// Comma-separated widths to generate (default: from config)
        #[arg(long, value_delimiter = ',')]
        widths: Vec<u32>,

        /// Output format: jpeg, png, webp, avif (default: jpeg)
        #[arg(short, long)]
        format: Option<String>,

        /// Encoding quality 1-100 (default: per format)
        #[arg(short, long)]
        quality: Option<u32>,

        /// Write variant files into this directory
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
    /// Print the blur-up placeholder: dominant color and inline data URL
    Placeholder {
        /// Source image: a path under the source root, or a proxied URL
        src: String,

        /// Placeholder pixel width (default: from config)
        #[arg(short, long)]
        width: Option<u32>,
    },
    /// Remove cache entries older than the configured maximum age
    Sweep {
        /// Override the configured maximum age, in days
        #[arg(long)]
        max_age_days: Option<u64>,
    },
    /// Print a stock pixpress.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Get {
            src,
            transform,
            out,
        } => {
            let config = config::load_config(&cli.config)?;
            let service = open_service(&config)?;
            let request = transform.into_request(src, service.max_dimension())?;
            let response = service.handle(&request)?;
            match out {
                Some(path) => {
                    std::fs::write(&path, &response.body)?;
                    println!(
                        "{} → {} ({} bytes, {})",
                        request.src,
                        path.display(),
                        response.body.len(),
                        response.cache
                    );
                }
                None => std::io::stdout().write_all(&response.body)?,
            }
        }
        Command::Variants {
            src,
            widths,
            format,
            quality,
            out_dir,
        } => {
            let config = config::load_config(&cli.config)?;
            init_thread_pool(&config.processing);
            let service = open_service(&config)?;

            let widths = if widths.is_empty() {
                config.variants.widths.clone()
            } else {
                widths
            };
            let format = match format {
                Some(name) => OutputFormat::parse(&name)
                    .ok_or_else(|| format!("unknown format: {name}"))?,
                None => OutputFormat::Jpeg,
            };
            let quality = quality.map(Quality::new);

            let set = responsive::generate_variants(&service, &src, &widths, format, quality)?;

            let stem = file_stem(&normalize_source(&src)?);
            for variant in &set.variants {
                match &out_dir {
                    Some(dir) => {
                        std::fs::create_dir_all(dir)?;
                        let file = dir.join(format!("{stem}-{}.{}", variant.width, format.ext()));
                        std::fs::write(&file, &variant.body)?;
                        println!(
                            "  {}w → {} ({} bytes)",
                            variant.width,
                            file.display(),
                            variant.body.len()
                        );
                    }
                    None => {
                        println!(
                            "  {}w {} ({} bytes)",
                            variant.width,
                            variant.url,
                            variant.body.len()
                        );
                    }
                }
            }
            println!("srcset: {}", set.srcset());
            println!("Cache: {}", set.stats);
        }
        Command::Placeholder { src, width } => {
            let config = config::load_config(&cli.config)?;
            let service = open_service(&config)?;
            let width = width.unwrap_or_else(|| service.placeholder_width());
            let placeholder = placeholder::generate(&service, &src, width);
            println!("dominant: {}", placeholder.dominant_color);
            println!("{}", placeholder.data_url);
        }
        Command::Sweep { max_age_days } => {
            let config = config::load_config(&cli.config)?;
            let store = CacheStore::open(&config.cache.dir)?;
            let max_age = match max_age_days {
                Some(days) => Duration::from_secs(days * 86_400),
                None => config.sweep_max_age(),
            };
            let report = janitor::sweep(store.root(), max_age, SystemTime::now())?;
            println!("Sweep: {report}");
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Build the service over the local filesystem provider.
fn open_service(config: &ServiceConfig) -> Result<ImageService<FsProvider>, std::io::Error> {
    let provider = FsProvider::new(&config.source_root);
    let cache = CacheStore::open(&config.cache.dir)?;
    Ok(ImageService::new(provider, cache, config))
}

/// Filename stem used when writing variant files.
fn file_stem(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("variant")
        .to_string()
}

/// Wire diagnostics to stderr; stdout stays reserved for command output.
fn init_tracing(verbosity: u8) {
    let default = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores — user can constrain down,
/// not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}

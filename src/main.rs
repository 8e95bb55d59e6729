use ampe_convert::batch::Coordinator;
use ampe_convert::binder::{BindLimits, RawBatch, bind};
use ampe_convert::config::{self, AppConfig, ConfigOverrides};
use ampe_convert::imaging::{ImageBackend, RustBackend};
use ampe_convert::server::{self, AppState};
use ampe_convert::storage::{self, MemoryStore, ObjectStore, Uploader};
use ampe_convert::types::{Fit, UploadedFile};
use ampe_convert::{output, telemetry};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "ampe-convert")]
#[command(about = "Batch image conversion: resize, re-encode and publish to object storage")]
#[command(long_about = "\
Batch image conversion: resize, re-encode and publish to object storage

Each uploaded image is decoded, resized according to its fit policy,
re-encoded to the requested format and written to the configured object
store under <stem>.<format>. Results come back in upload order; one bad
file never fails the rest of the batch.

Formats: webp, png, jpeg (jpg), avif, gif
Fits:    cover (default), contain, fill, inside, outside

Settings are read from --config (TOML) over built-in defaults, then
overridden by environment variables (a .env file is honoured):
  PORT, DOMAIN, BUCKET_NAME, BUCKET_URL, AWS_PK, AWS_SK

Run 'ampe-convert gen-config' to generate a documented config.toml.")]
#[command(version)]
struct Cli {
    /// Path to config.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(flatten)]
    overrides: OverrideArgs,

    #[command(subcommand)]
    command: Command,
}

/// Environment-backed overrides applied on top of the config file.
#[derive(clap::Args)]
struct OverrideArgs {
    /// Port to listen on
    #[arg(long, env = "PORT", global = true)]
    port: Option<u16>,

    /// Origin allowed by CORS ("*" for any)
    #[arg(long, env = "DOMAIN", global = true)]
    allowed_origin: Option<String>,

    /// S3 bucket; selects the s3 storage backend
    #[arg(long, env = "BUCKET_NAME", global = true)]
    bucket: Option<String>,

    /// Public base URL of stored objects
    #[arg(long, env = "BUCKET_URL", global = true)]
    bucket_url: Option<String>,

    #[arg(long, env = "AWS_PK", global = true, hide_env_values = true)]
    access_key_id: Option<String>,

    #[arg(long, env = "AWS_SK", global = true, hide_env_values = true)]
    secret_access_key: Option<String>,
}

impl From<OverrideArgs> for ConfigOverrides {
    fn from(args: OverrideArgs) -> Self {
        Self {
            port: args.port,
            allowed_origin: args.allowed_origin,
            bucket: args.bucket,
            bucket_url: args.bucket_url,
            access_key_id: args.access_key_id,
            secret_access_key: args.secret_access_key,
        }
    }
}

#[derive(clap::Args)]
struct ConvertArgs {
    /// Images to convert
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Target format
    #[arg(long, short)]
    format: String,

    /// Target width in pixels
    #[arg(long)]
    width: Option<u32>,

    /// Target height in pixels
    #[arg(long)]
    height: Option<u32>,

    /// Resize policy when both width and height are given
    #[arg(long, default_value_t = Fit::Cover)]
    fit: Fit,

    /// Drop EXIF and ICC metadata
    #[arg(long)]
    strip: bool,

    /// Convert into an in-memory store instead of the configured one
    #[arg(long)]
    dry_run: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP upload service
    Serve,
    /// Convert local files and upload them to the configured store
    Convert(ConvertArgs),
    /// Print a stock config.toml with all options documented
    GenConfig,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    telemetry::init(cli.log_json);

    match cli.command {
        Command::Serve => {
            let config = config::load_config(cli.config.as_deref(), cli.overrides.into())?;
            let store = storage::create_store(&config.storage).await?;
            let coordinator = build_coordinator(&config, store)?;
            let state = Arc::new(AppState::new(coordinator, &config));
            server::serve(state, &config).await?;
        }
        Command::Convert(args) => {
            let config = config::load_config(cli.config.as_deref(), cli.overrides.into())?;
            let store: Arc<dyn ObjectStore> = if args.dry_run {
                Arc::new(MemoryStore::default())
            } else {
                storage::create_store(&config.storage).await?
            };
            let coordinator = build_coordinator(&config, store)?;
            convert_files(&config, &coordinator, args).await?;
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

fn build_coordinator(
    config: &AppConfig,
    store: Arc<dyn ObjectStore>,
) -> Result<Coordinator, Box<dyn std::error::Error>> {
    let backend: Arc<dyn ImageBackend> = Arc::new(RustBackend::new());
    let uploader = Uploader::new(
        store,
        config.processing.max_concurrent_uploads,
        config.storage.public_read,
    );
    Ok(Coordinator::from_config(config, backend, uploader)?)
}

async fn convert_files(
    config: &AppConfig,
    coordinator: &Coordinator,
    args: ConvertArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut files = Vec::with_capacity(args.files.len());
    for path in &args.files {
        let bytes = tokio::fs::read(path).await?;
        files.push(UploadedFile::new(display_name(path), bytes));
    }
    let names: Vec<String> = files.iter().map(|f| f.original_name.clone()).collect();

    let raw = RawBatch::uniform(
        files,
        &args.format,
        args.width,
        args.height,
        args.fit,
        args.strip,
    );
    let requests = bind(raw, &BindLimits::from_config(&config.limits))?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling batch");
            on_interrupt.cancel();
        }
    });

    info!(files = requests.len(), format = %args.format, "converting");
    let result = coordinator.run(requests, cancel).await?;
    output::print_batch_report(&names, &result);

    let failed = result.len() - result.succeeded();
    if failed > 0 {
        return Err(format!("{failed} of {} files failed", result.len()).into());
    }
    Ok(())
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

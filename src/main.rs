use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use certforge::assets::{AssetCategory, AssetLoader};
use certforge::models::{AppConfig, CertificateRecord, LayoutSpec};
use certforge::server;
use certforge::services::CertificateService;

#[derive(Parser)]
#[command(name = "certforge")]
#[command(about = "Certforge - renders certificates onto a template as JPEG and PDF")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve,
    /// Render one certificate (JPEG and PDF) without starting the server
    Render {
        #[arg(long)]
        serial: String,

        #[arg(long)]
        participant: String,

        #[arg(long)]
        activity: String,

        #[arg(long)]
        examiner: String,

        #[arg(long)]
        examiner_position: String,

        #[arg(long)]
        company_code: String,

        /// Issue date (YYYY-MM-DD), today when omitted
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Signature image (PNG or JPEG)
        #[arg(long)]
        signature: Option<PathBuf>,

        /// Output directory, the configured content directory by default
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Load configuration and layout, check the template and the render engine
    Check,
    /// Extract embedded assets to filesystem for customization
    Init {
        /// Target directory
        #[arg(default_value = ".")]
        dir: PathBuf,

        /// Extract config.yaml
        #[arg(long)]
        config: bool,

        /// Extract layout.yaml
        #[arg(long)]
        layout: bool,

        /// Extract the overlay template
        #[arg(long)]
        overlay: bool,

        /// Overwrite existing files
        #[arg(long, short)]
        force: bool,

        /// List embedded assets without extracting
        #[arg(long)]
        list: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Render {
            serial,
            participant,
            activity,
            examiner,
            examiner_position,
            company_code,
            date,
            signature,
            output,
        }) => {
            let record = CertificateRecord {
                serial_number: serial,
                participant_name: participant,
                activity,
                examiner_name: examiner,
                examiner_position,
                company_code,
                date_issued: date.unwrap_or_else(|| chrono::Local::now().date_naive()),
                signature_image_path: signature,
            };
            run_render_command(record, output).await
        }
        Some(Commands::Check) => run_check_command().await,
        Some(Commands::Init {
            dir,
            config,
            layout,
            overlay,
            force,
            list,
        }) => run_init_command(dir, config, layout, overlay, force, list),
        Some(Commands::Serve) | None => run_server().await,
    }
}

fn init_tracing(default_filter: &str, with_time: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());
    let registry = tracing_subscriber::registry().with(filter);
    if with_time {
        registry.with(tracing_subscriber::fmt::layer()).init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().without_time())
            .init();
    }
}

/// Asset loader with optional external paths from env vars
fn asset_loader_from_env() -> AssetLoader {
    let config_file = std::env::var("CONFIG_FILE").ok().map(PathBuf::from);
    let layout_file = std::env::var("LAYOUT_FILE").ok().map(PathBuf::from);
    let overlay_file = std::env::var("OVERLAY_FILE").ok().map(PathBuf::from);
    AssetLoader::new(config_file, layout_file).with_overlay_file(overlay_file)
}

/// Render a certificate directly to files (no server needed)
async fn run_render_command(
    record: CertificateRecord,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    init_tracing("certforge=warn", false);

    let loader = asset_loader_from_env();
    let mut config = AppConfig::load_from_assets(&loader);
    if let Some(dir) = output {
        config.content_dir = dir;
    }
    let loader = loader.with_layout_fallback(config.layout_file.clone());
    let service = CertificateService::from_config(&config, &loader)?;

    let generated = service.generate_certificate(record, true).await?;

    println!("Rendered {}", generated.raster.path.display());
    println!("Rendered {}", generated.pdf.path.display());
    Ok(())
}

/// Report configuration and verify everything a render needs
async fn run_check_command() -> anyhow::Result<()> {
    init_tracing("certforge=warn", false);

    const VERSION: &str = env!("CARGO_PKG_VERSION");
    println!("Certforge v{VERSION}\n");

    let loader = asset_loader_from_env();
    let config = AppConfig::load_from_assets(&loader);
    let loader = loader.with_layout_fallback(config.layout_file.clone());

    println!("Configuration:");
    println!(
        "  CONFIG_FILE   = {}",
        std::env::var("CONFIG_FILE").unwrap_or_else(|_| "(embedded)".to_string())
    );
    println!(
        "  OVERLAY_FILE  = {}",
        std::env::var("OVERLAY_FILE").unwrap_or_else(|_| "(embedded)".to_string())
    );
    println!("  content_dir   = {}", config.content_dir.display());
    println!("  template_path = {}", config.template_path.display());
    println!(
        "  layout_file   = {}",
        config
            .layout_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(embedded)".to_string())
    );
    println!(
        "  fonts_dir     = {}",
        config
            .fonts_dir
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(system fonts only)".to_string())
    );

    let layout = LayoutSpec::load_from_assets(&loader)?;
    println!("\nLayout version {}: OK", layout.version);

    let service = CertificateService::from_config(&config, &loader)?;
    let mut healthy = true;

    match service.check_template().await {
        Ok(()) => println!("Template: OK"),
        Err(e) => {
            println!("Template: {e}");
            healthy = false;
        }
    }

    match service.pipeline().compositor().warm_up().await {
        Ok(()) => println!("Render engine: OK"),
        Err(e) => {
            println!("Render engine: FAILED ({e})");
            healthy = false;
        }
    }

    if !healthy {
        anyhow::bail!("certforge is not ready to render");
    }
    Ok(())
}

/// Extract embedded assets to filesystem
fn run_init_command(
    dir: PathBuf,
    config: bool,
    layout: bool,
    overlay: bool,
    force: bool,
    list: bool,
) -> anyhow::Result<()> {
    if list {
        println!("Embedded assets:");
        for f in AssetLoader::list_embedded() {
            println!("  {f}");
        }
        return Ok(());
    }

    let mut categories = Vec::new();
    if config {
        categories.push(AssetCategory::Config);
    }
    if layout {
        categories.push(AssetCategory::Layout);
    }
    if overlay {
        categories.push(AssetCategory::Overlay);
    }
    if categories.is_empty() {
        categories.extend(AssetCategory::ALL);
    }

    let report = AssetLoader::init(&dir, &categories, force)?;

    if !report.written.is_empty() {
        println!("Extracted {} files:", report.written.len());
        for f in &report.written {
            println!("  + {f}");
        }
    }
    if !report.skipped.is_empty() {
        println!(
            "\nSkipped {} existing files (use --force to overwrite):",
            report.skipped.len()
        );
        for f in &report.skipped {
            println!("  - {f}");
        }
    }

    Ok(())
}

/// Run the HTTP server
async fn run_server() -> anyhow::Result<()> {
    init_tracing("certforge=info,tower_http=info", true);

    let asset_loader = asset_loader_from_env();
    let state = server::create_app_state(&asset_loader)?;
    let bind_addr = format!("0.0.0.0:{}", state.config.port);

    tracing::info!(
        content_dir = %state.config.content_dir.display(),
        template = %state.config.template_path.display(),
        "Certificate storage configured"
    );

    // A missing template is logged; the server still starts
    let _ = state.service.check_template().await;
    if let Err(e) = state.service.pipeline().compositor().warm_up().await {
        tracing::warn!(error = %e, "Render engine failed to start, will retry on first request");
    }

    let app = server::build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "Certforge server listening");

    axum::serve(listener, app).await?;

    Ok(())
}

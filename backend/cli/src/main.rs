mod check_config_cmd;
mod corners_cmd;
mod list_cmd;
mod parse_cmd;
mod preprocess_cmd;
mod process_cmd;
mod serve_cmd;
mod terminal_output;

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};

use bilbot_config::{load_and_prepare, BilboConfig, ModelProviderKind};
use bilbot_logging::{init_logger, LogGuard, LoggerOptions};

#[derive(Parser)]
#[command(name = "bilbot")]
#[command(about = "BilboT - receipt photos in, validated receipt records out")]
#[command(version)]
struct Cli {
    /// Path to the config file (YAML or JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the Telegram bot
    Serve,
    /// Extract one receipt image and print the validated record as JSON
    Process {
        /// Receipt image (JPEG, PNG, WebP or BMP)
        image: PathBuf,
        /// Write the JSON here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Override the configured model provider
        #[arg(long, value_enum)]
        provider: Option<ProviderArg>,
        /// Override the configured model name
        #[arg(long)]
        model: Option<String>,
    },
    /// Enhance and/or deskew an image the way it is prepared for the model
    Preprocess {
        image: PathBuf,
        /// Output JPEG (default: `<image>_preprocessed.jpg`)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Grayscale, denoise and stretch contrast
        #[arg(long)]
        enhance: bool,
        /// Straighten tilted text lines
        #[arg(long)]
        deskew: bool,
    },
    /// Ask the model for the document corners, then crop and straighten the page
    Corners {
        image: PathBuf,
        /// Output JPEG (default: `<image>_deskewed.jpg`)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Override the configured model name
        #[arg(long)]
        model: Option<String>,
        /// Write the JSON report here instead of stdout
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Parse and derive a saved model response without calling a model
    Parse {
        /// File holding the raw model answer
        file: PathBuf,
    },
    /// List stored receipts for a user
    List {
        /// Telegram user id
        #[arg(short, long)]
        user: String,
        /// Maximum number of receipts to show
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Validate the configuration and report problems
    CheckConfig,
}

#[derive(Clone, Copy, ValueEnum)]
enum ProviderArg {
    Ollama,
    Openai,
}

impl From<ProviderArg> for ModelProviderKind {
    fn from(arg: ProviderArg) -> Self {
        match arg {
            ProviderArg::Ollama => ModelProviderKind::Ollama,
            ProviderArg::Openai => ModelProviderKind::OpenAi,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::CheckConfig => check_config_cmd::run(config_path).await?,
        Commands::Serve => {
            let (config, _log_guard) = prepare(config_path).await?;
            serve_cmd::run(config).await?;
        }
        Commands::Process { image, output, provider, model } => {
            let (mut config, _log_guard) = prepare(config_path).await?;
            if let Some(provider) = provider {
                config.model.provider = provider.into();
            }
            if model.is_some() {
                config.model.model = model;
            }
            process_cmd::run(&config, &image, output.as_deref()).await?;
        }
        Commands::Preprocess { image, output, enhance, deskew } => {
            let (config, _log_guard) = prepare(config_path).await?;
            preprocess_cmd::run(&config, &image, output.as_deref(), enhance, deskew).await?;
        }
        Commands::Corners { image, output, model, report } => {
            let (mut config, _log_guard) = prepare(config_path).await?;
            if model.is_some() {
                config.model.model = model;
            }
            corners_cmd::run(&config, &image, output.as_deref(), report.as_deref()).await?;
        }
        Commands::Parse { file } => {
            let (config, _log_guard) = prepare(config_path).await?;
            parse_cmd::run(&config, &file).await?;
        }
        Commands::List { user, limit } => {
            let (config, _log_guard) = prepare(config_path).await?;
            list_cmd::run(&config, &user, limit).await?;
        }
    }

    Ok(())
}

/// Load the config, then install logging as it describes.
async fn prepare(config_path: Option<&Path>) -> Result<(BilboConfig, LogGuard)> {
    let config = load_and_prepare(config_path).await?;
    let guard = init_logger(&logger_options(&config));
    Ok((config, guard))
}

fn logger_options(config: &BilboConfig) -> LoggerOptions {
    LoggerOptions {
        level: config.logging.level.clone(),
        json: config.logging.json,
        file_dir: config.logging.dir.as_ref().map(PathBuf::from),
    }
}

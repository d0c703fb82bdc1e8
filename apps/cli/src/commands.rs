//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use copyforge_core::{ProgressReporter, Session, Submission};
use copyforge_shared::{AppConfig, CopyOrigin, Product, TabularCopy, init_config, load_config};
use copyforge_sources::SourceInput;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Copyforge: product inputs in, catalog copy out.
#[derive(Parser)]
#[command(
    name = "copyforge",
    version,
    about = "Turn product documents, photos, spreadsheets and links into catalog records with brand-voice copy.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Input modality.
#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub(crate) enum InputKind {
    Document,
    Image,
    Tabular,
    Identifier,
    Page,
    Text,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Process one input and write the catalog CSV.
    Process {
        /// Input modality.
        #[arg(short, long)]
        kind: InputKind,

        /// File path for document, image and tabular inputs; the query, URL
        /// or text itself otherwise (a path is read for text).
        #[arg(short, long)]
        input: String,

        /// Category label or slug, e.g. "Bakeware, Cookware".
        #[arg(short, long)]
        category: String,

        /// Notes typed alongside a photo.
        #[arg(long)]
        notes: Option<String>,

        /// Document mime type (guessed from the extension when omitted).
        #[arg(long)]
        mime: Option<String>,

        /// Output directory for the CSV (defaults to the working directory).
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Skip the language model and use template copy.
        #[arg(long)]
        offline: bool,

        /// Keep supplier copy from spreadsheet rows instead of regenerating it.
        #[arg(long)]
        keep_supplied: bool,

        /// Print the products as JSON on stdout.
        #[arg(long)]
        json: bool,

        /// Suggest search keywords per product and rewrite its copy with them.
        #[arg(long)]
        seo: bool,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

const CRATES: [&str; 5] = [
    "copyforge",
    "copyforge_core",
    "copyforge_sources",
    "copyforge_shared",
    "copyforge_export",
];

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter: Vec<String> = CRATES.iter().map(|c| format!("{c}={level}")).collect();

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter.join(",")));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Process {
            kind,
            input,
            category,
            notes,
            mime,
            out,
            offline,
            keep_supplied,
            json,
            seo,
        } => {
            let input = read_input(kind, &input, notes, mime.as_deref())?;
            let options = ProcessOptions {
                out,
                offline,
                keep_supplied,
                json,
                seo,
            };
            cmd_process(input, category, options).await
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// process
// ---------------------------------------------------------------------------

struct ProcessOptions {
    out: Option<PathBuf>,
    offline: bool,
    keep_supplied: bool,
    json: bool,
    seo: bool,
}

fn read_input(
    kind: InputKind,
    input: &str,
    notes: Option<String>,
    mime: Option<&str>,
) -> Result<SourceInput> {
    let read = |path: &str| {
        std::fs::read(path).wrap_err_with(|| format!("cannot read input file '{path}'"))
    };
    let file_name = || {
        Path::new(input)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
    };

    Ok(match kind {
        InputKind::Document => {
            let mime_type = match mime {
                Some(m) => m.to_string(),
                None => guess_mime(input)
                    .ok_or_else(|| eyre!("cannot tell the document type of '{input}', pass --mime"))?
                    .to_string(),
            };
            SourceInput::Document {
                bytes: read(input)?,
                mime_type,
                file_name: file_name(),
            }
        }
        InputKind::Image => SourceInput::Image {
            bytes: read(input)?,
            file_name: file_name(),
            notes,
        },
        InputKind::Tabular => SourceInput::Tabular {
            bytes: read(input)?,
            file_name: file_name(),
        },
        InputKind::Identifier => SourceInput::Identifier {
            query: input.to_string(),
        },
        InputKind::Page => SourceInput::Page {
            url: input.to_string(),
        },
        InputKind::Text => {
            let text = if Path::new(input).is_file() {
                String::from_utf8_lossy(&read(input)?).into_owned()
            } else {
                input.to_string()
            };
            SourceInput::FreeText { text }
        }
    })
}

fn guess_mime(path: &str) -> Option<&'static str> {
    let ext = Path::new(path).extension()?.to_str()?.to_ascii_lowercase();
    Some(match ext.as_str() {
        "pdf" => "application/pdf",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "doc" => "application/msword",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "tif" | "tiff" => "image/tiff",
        _ => return None,
    })
}

async fn cmd_process(input: SourceInput, category: String, options: ProcessOptions) -> Result<()> {
    let mut config = load_config()?;
    if options.keep_supplied {
        config.pipeline.tabular_copy = TabularCopy::KeepSupplied;
    }
    let session = Session::from_config(&config, options.offline)?;
    if !session.has_language_model() {
        warn!("copy will come from the template");
    }

    info!(kind = %input.kind(), category = %category, "processing input");

    let reporter = CliProgress::new();
    let result = session.submit(Submission { input, category }, &reporter).await;
    reporter.spinner.finish_and_clear();
    let mut products = result?;

    if options.seo {
        for product in &mut products {
            match session.suggest_keywords(&product.id).await {
                Ok(_) => *product = session.regenerate(&product.id).await?,
                Err(e) => warn!(id = %product.id, error = %e, "no keyword suggestions"),
            }
        }
    }

    let out_dir = match options.out {
        Some(dir) => dir,
        None => std::env::current_dir().wrap_err("cannot determine working directory")?,
    };
    std::fs::create_dir_all(&out_dir)
        .wrap_err_with(|| format!("cannot create '{}'", out_dir.display()))?;
    let path = out_dir.join(copyforge_export::suggested_filename(chrono::Utc::now()));
    let csv = session.export_csv().await?;
    std::fs::write(&path, csv).wrap_err_with(|| format!("cannot write '{}'", path.display()))?;

    if options.json {
        println!("{}", session.export_json().await?);
        return Ok(());
    }

    println!();
    println!("  {} product(s) ready", products.len());
    for product in &products {
        println!(
            "  {}  {}  ({})",
            product.id,
            product.name,
            origin_label(product.copy_origin)
        );
    }
    println!("  CSV:  {}", path.display());
    println!();

    Ok(())
}

fn origin_label(origin: CopyOrigin) -> &'static str {
    match origin {
        CopyOrigin::Pending => "no copy",
        CopyOrigin::Generated => "generated",
        CopyOrigin::Fallback => "template",
        CopyOrigin::Supplied => "supplier copy",
        CopyOrigin::Clamped => "repaired",
        CopyOrigin::Edited => "edited",
    }
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn adapter_started(&self, adapter: &str) {
        self.spinner.set_message(format!("Reading input ({adapter})"));
    }

    fn generation_started(&self, product: &Product, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Writing copy [{current}/{total}] {}", product.name));
    }

    fn completed(&self, products: &[Product]) {
        self.spinner
            .set_message(format!("{} product(s) added", products.len()));
    }
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_args_parse() {
        let cli = Cli::try_parse_from([
            "copyforge",
            "process",
            "--kind",
            "text",
            "--input",
            "Glass Teapot 1L, heat resistant",
            "--category",
            "Dining, Drink, Living",
            "--offline",
            "--seo",
        ])
        .unwrap();
        match cli.command {
            Command::Process {
                kind,
                offline,
                keep_supplied,
                seo,
                ..
            } => {
                assert!(matches!(kind, InputKind::Text));
                assert!(offline);
                assert!(!keep_supplied);
                assert!(seo);
            }
            Command::Config { .. } => panic!("expected process"),
        }
    }

    #[test]
    fn text_input_is_taken_literally() {
        let input = read_input(InputKind::Text, "Enamel Jug, white", None, None).unwrap();
        assert_eq!(
            input,
            SourceInput::FreeText {
                text: "Enamel Jug, white".into()
            }
        );
    }

    #[test]
    fn document_mime_is_guessed() {
        assert_eq!(guess_mime("spec-sheet.PDF"), Some("application/pdf"));
        assert_eq!(guess_mime("notes"), None);
        let err = read_input(InputKind::Document, "notes", None, None).unwrap_err();
        assert!(err.to_string().contains("--mime"));
    }
}

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use html_to_docx::{ClassStyles, ConvertOptions, Converter, DocumentMetadata, Resources};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert an HTML file into a .docx package.
    Convert(ConvertArgs),
    /// Print the supported formats and features as JSON.
    Capabilities,
    /// Print the parts, text and core properties of a .docx package as JSON.
    Inspect {
        /// Package to read.
        file: PathBuf,
    },
}

#[derive(Args, Debug)]
struct ConvertArgs {
    /// Input HTML file (any fragment or full document).
    #[arg(long)]
    html_file: PathBuf,

    /// Output .docx path, or a directory to write `--filename` into.
    #[arg(long)]
    out: PathBuf,

    #[arg(long)]
    title: Option<String>,

    #[arg(long)]
    creator: Option<String>,

    #[arg(long)]
    description: Option<String>,

    /// Output name used when `--out` is a directory.
    #[arg(long, default_value = "documento.docx")]
    filename: String,

    /// JSON object mapping class names to CSS declarations.
    #[arg(long)]
    class_styles: Option<PathBuf>,

    /// Image bytes for a non-data `src`, as NAME=PATH. Repeatable.
    #[arg(long = "resource", value_name = "NAME=PATH")]
    resources: Vec<String>,
}

fn load_class_styles(path: &Path) -> Result<ClassStyles> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))
}

fn load_resources(specs: &[String]) -> Result<Resources> {
    let mut out = Resources::new();
    for spec in specs {
        let (name, path) = spec
            .split_once('=')
            .ok_or_else(|| anyhow!("resource `{spec}` is not NAME=PATH"))?;
        let bytes = fs::read(path).with_context(|| format!("read resource {path}"))?;
        out.insert(name.to_string(), bytes);
    }
    Ok(out)
}

fn run_convert(args: ConvertArgs) -> Result<()> {
    let html = fs::read_to_string(&args.html_file)
        .with_context(|| format!("read {}", args.html_file.display()))?;

    let class_styles = match &args.class_styles {
        Some(path) => load_class_styles(path)?,
        None => ClassStyles::new(),
    };
    let converter = Converter::new(ConvertOptions {
        class_styles,
        resources: load_resources(&args.resources)?,
        ..Default::default()
    });

    let metadata = DocumentMetadata {
        title: args.title,
        creator: args.creator,
        description: args.description,
        ..Default::default()
    };
    let out = converter
        .convert_with_report(&html, &args.filename, Some(&metadata))
        .with_context(|| format!("convert {}", args.html_file.display()))?;
    for w in &out.warnings {
        warn!("{w}");
    }

    let target = if args.out.is_dir() {
        args.out.join(&args.filename)
    } else {
        args.out
    };
    fs::write(&target, &out.bytes).with_context(|| format!("write {}", target.display()))?;
    info!(
        path = %target.display(),
        size = out.bytes.len(),
        warnings = out.warnings.len(),
        "wrote document"
    );
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::Convert(args) => run_convert(args),
        Command::Capabilities => {
            println!("{}", serde_json::to_string_pretty(html_to_docx::capabilities())?);
            Ok(())
        }
        Command::Inspect { file } => {
            let bytes = fs::read(&file).with_context(|| format!("read {}", file.display()))?;
            let report = html_to_docx::inspect(&bytes)
                .with_context(|| format!("inspect {}", file.display()))?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
    }
}

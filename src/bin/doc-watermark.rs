//! Document Watermark CLI tool
//!
//! A command-line tool for watermarking images, PDFs and Word documents.

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use glob::glob;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use doc_watermark::fonts::{
    FileFontSource, FontCache, FontChain, FontSource, HttpFontSource, DEFAULT_CJK_FONT_URLS,
};
use doc_watermark::pdf::{count_pages_from_catalog, load_pdf};
use doc_watermark::process::detect_kind;
use doc_watermark::spec::{OutputFormat, PatternOptions, Placement};
use doc_watermark::{DocumentKind, InputFile, Processor, ProcessorConfig, WatermarkSpec};

/// Document Watermark - Add text watermarks to images, PDFs and Word files
#[derive(Parser)]
#[command(name = "doc-watermark")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "EXAMPLES:
    # Watermark every PDF in the current directory
    doc-watermark apply --text CONFIDENTIAL -o out \"*.pdf\"

    # Use a JSON spec and convert a Word file to PDF
    doc-watermark apply --spec watermark.json --format word-to-pdf report.docx

    # Chinese text with a local font, no network
    doc-watermark apply --text 机密 --offline --font-file NotoSansSC.otf scan.png")]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Output container, as in `outputFormat`
#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    Png,
    Jpeg,
    Webp,
    Pdf,
    Docx,
    Original,
    WordToPdf,
}

impl From<FormatArg> for OutputFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Png => OutputFormat::Png,
            FormatArg::Jpeg => OutputFormat::Jpeg,
            FormatArg::Webp => OutputFormat::Webp,
            FormatArg::Pdf => OutputFormat::Pdf,
            FormatArg::Docx => OutputFormat::Docx,
            FormatArg::Original => OutputFormat::Original,
            FormatArg::WordToPdf => OutputFormat::WordToPdf,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Watermark one or more files
    Apply {
        /// Input files. Supports glob patterns like "*.pdf"
        #[arg(required = true)]
        inputs: Vec<String>,

        /// Watermark spec as JSON; flags below override its fields
        #[arg(long)]
        spec: Option<PathBuf>,

        /// Watermark text
        #[arg(long)]
        text: Option<String>,

        /// Opacity from 0 to 1
        #[arg(long)]
        opacity: Option<f32>,

        /// Rotation in degrees, positive is clockwise
        #[arg(long, allow_hyphen_values = true)]
        rotation: Option<f32>,

        /// Output container
        #[arg(long, value_enum)]
        format: Option<FormatArg>,

        /// Seed for random pattern placement
        #[arg(long)]
        seed: Option<u32>,

        /// Extra remote font tried for text the bundled font cannot render
        #[arg(long = "font-url")]
        font_urls: Vec<String>,

        /// Local font file tried before any remote font
        #[arg(long = "font-file")]
        font_files: Vec<PathBuf>,

        /// Never fetch fonts over the network
        #[arg(long)]
        offline: bool,

        /// Directory for watermarked files (defaults to each input's directory)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },

    /// Show the detected type and page count of a file
    Info {
        /// File to inspect
        input: PathBuf,
    },
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.json_logs);

    let result = match cli.command {
        Commands::Apply {
            inputs,
            spec,
            text,
            opacity,
            rotation,
            format,
            seed,
            font_urls,
            font_files,
            offline,
            output_dir,
        } => {
            let overrides = Overrides {
                text,
                opacity,
                rotation,
                format,
                seed,
            };
            let fonts = FontOptions {
                urls: font_urls,
                files: font_files,
                offline,
            };
            cmd_apply(inputs, spec, overrides, fonts, output_dir)
        }
        Commands::Info { input } => cmd_info(input),
    };

    match result {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            error!("{:#}", e);
            process::exit(1);
        }
    }
}

/// Spec fields set from the command line
struct Overrides {
    text: Option<String>,
    opacity: Option<f32>,
    rotation: Option<f32>,
    format: Option<FormatArg>,
    seed: Option<u32>,
}

impl Overrides {
    fn apply(self, spec: &mut WatermarkSpec) {
        if let Some(text) = self.text {
            spec.content = text;
        }
        if let Some(opacity) = self.opacity {
            spec.opacity = opacity;
        }
        if let Some(rotation) = self.rotation {
            spec.rotation = rotation;
        }
        if let Some(format) = self.format {
            spec.output_format = format.into();
        }
        if let Some(seed) = self.seed {
            if let Placement::Pattern(PatternOptions { random_seed, .. }) = &mut spec.placement {
                *random_seed = Some(seed);
            } else {
                warn!("--seed only applies to pattern placement");
            }
        }
    }
}

/// Font candidates from the command line
struct FontOptions {
    urls: Vec<String>,
    files: Vec<PathBuf>,
    offline: bool,
}

impl FontOptions {
    fn into_chain(self) -> anyhow::Result<FontChain> {
        let mut chain = FontChain::new(Arc::new(FontCache::new()));
        let files: Arc<dyn FontSource> = Arc::new(FileFontSource);
        for path in self.files {
            chain.push(Arc::clone(&files), path.display().to_string());
        }
        if self.offline {
            return Ok(chain);
        }

        let http = HttpFontSource::new().context("Failed to create HTTP client")?;
        let http: Arc<dyn FontSource> = Arc::new(http);
        let urls = DEFAULT_CJK_FONT_URLS.iter().map(|u| u.to_string()).chain(self.urls);
        for url in urls {
            chain.push(Arc::clone(&http), url);
        }
        Ok(chain)
    }
}

/// Expand glob patterns in input paths
fn expand_globs(patterns: Vec<String>) -> anyhow::Result<Vec<PathBuf>> {
    let mut paths = Vec::new();

    for pattern in patterns {
        // Check if pattern contains glob characters
        if pattern.contains('*') || pattern.contains('?') || pattern.contains('[') {
            let mut matched = false;
            for entry in glob(&pattern).with_context(|| format!("Invalid pattern: {}", pattern))? {
                match entry {
                    Ok(path) => {
                        paths.push(path);
                        matched = true;
                    }
                    Err(e) => warn!("glob error for {}: {}", pattern, e),
                }
            }
            if !matched {
                bail!("No files matched pattern: {}", pattern);
            }
        } else {
            paths.push(PathBuf::from(pattern));
        }
    }

    // Sort paths for consistent ordering
    paths.sort();

    Ok(paths)
}

/// `<dir>/<stem>-watermarked.<ext>`
fn output_path(input: &Path, output_dir: Option<&Path>, extension: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let dir = output_dir
        .map(Path::to_path_buf)
        .or_else(|| input.parent().map(Path::to_path_buf))
        .unwrap_or_default();
    dir.join(format!("{}-watermarked.{}", stem, extension))
}

/// Watermark files one by one. Returns false if any file failed.
fn cmd_apply(
    inputs: Vec<String>,
    spec_path: Option<PathBuf>,
    overrides: Overrides,
    fonts: FontOptions,
    output_dir: Option<PathBuf>,
) -> anyhow::Result<bool> {
    let mut spec = match &spec_path {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read spec {}", path.display()))?;
            WatermarkSpec::from_json(&json)
                .with_context(|| format!("Invalid spec {}", path.display()))?
        }
        None => WatermarkSpec::default(),
    };
    overrides.apply(&mut spec);

    let inputs = expand_globs(inputs)?;
    if let Some(dir) = &output_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }

    let config = ProcessorConfig {
        margin: None,
        fonts: fonts.into_chain()?,
    };
    let processor = Processor::new(config);

    info!(files = inputs.len(), "watermarking");
    let mut failed = 0usize;
    for path in &inputs {
        match apply_one(&processor, path, &spec, output_dir.as_deref()) {
            Ok(out) => info!("{} -> {}", path.display(), out.display()),
            Err(e) => {
                error!("{}: {:#}", path.display(), e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        warn!(failed, total = inputs.len(), "some files failed");
    }
    Ok(failed == 0)
}

fn apply_one(
    processor: &Processor,
    path: &Path,
    spec: &WatermarkSpec,
    output_dir: Option<&Path>,
) -> anyhow::Result<PathBuf> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Input file not found: {}", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let output = processor.process(&InputFile::new(name, bytes), spec)?;
    let out_path = output_path(path, output_dir, output.format.extension());
    std::fs::write(&out_path, &output.bytes)
        .with_context(|| format!("Failed to write {}", out_path.display()))?;
    Ok(out_path)
}

/// Show information about a file
fn cmd_info(input: PathBuf) -> anyhow::Result<bool> {
    let bytes = std::fs::read(&input)
        .with_context(|| format!("Input file not found: {}", input.display()))?;
    let name = input.display().to_string();
    let kind = detect_kind(&name, &bytes)?;

    println!("File: {}", name);
    println!("Size: {} bytes", bytes.len());
    match kind {
        DocumentKind::Pdf => {
            let doc = load_pdf(&bytes)?;
            println!("Type: PDF");
            println!("Pages: {}", count_pages_from_catalog(&doc)?);
        }
        DocumentKind::Word => println!("Type: Word document"),
        DocumentKind::Raster(format) => {
            println!("Type: {} image", format.extension().to_uppercase())
        }
    }

    Ok(true)
}

//! hocr-converter CLI - turn hOCR output into searchable PDF or plain text

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, LevelFilter};

use hocr_pdf::{ConvertOptions, Converter, OutputFormat, TextGranularity};

#[derive(Parser)]
#[command(name = "hocr-converter")]
#[command(version, disable_version_flag = true)]
#[command(about = "Convert hOCR files to searchable PDF or plain text", long_about = None)]
struct Cli {
    /// Input hOCR file ("-" or omitted for stdin)
    #[arg(short, long, value_name = "FILE")]
    input: Option<PathBuf>,

    /// Output file ("-" for stdout)
    #[arg(short, long, value_name = "FILE")]
    output: PathBuf,

    /// Make the text layer visible
    #[arg(short = 't', long)]
    visible_text: bool,

    /// Draw element bounding boxes
    #[arg(short = 'b', long)]
    bounding_boxes: bool,

    /// Include page images
    #[arg(short = 'I', long)]
    include_images: bool,

    /// Ignore image references inside the hOCR
    #[arg(short = 'n', long)]
    no_hocr_images: bool,

    /// Flip coordinates for engines with a top-left origin
    #[arg(short = 'V', long)]
    invert: bool,

    /// Place text per line instead of per word
    #[arg(short = 'c', long)]
    lines: bool,

    /// Write plain text instead of PDF
    #[arg(long)]
    text: bool,

    /// TrueType font for the text layer
    #[arg(short = 'f', long, value_name = "TTF")]
    font: Option<PathBuf>,

    /// JSON file with conversion options; flags override it
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Fail when a page image cannot be loaded
    #[arg(long)]
    strict_images: bool,

    /// Only log warnings and errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Print version
    #[arg(long, action = clap::ArgAction::Version)]
    version: Option<bool>,

    /// Page images, in page order; the last one repeats
    #[arg(value_name = "IMAGE")]
    images: Vec<PathBuf>,
}

impl Cli {
    fn options(&self) -> Result<ConvertOptions> {
        let mut options = match &self.config {
            Some(path) => {
                let json = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config {}", path.display()))?;
                ConvertOptions::from_json(&json)
                    .with_context(|| format!("Invalid config {}", path.display()))?
            }
            None => ConvertOptions::new(),
        };

        if self.visible_text {
            options.text_visible = true;
        }
        if self.bounding_boxes {
            options.draw_bounding_boxes = true;
        }
        if self.include_images {
            options.include_images = true;
        }
        if self.no_hocr_images {
            options.ignore_hocr_images = true;
        }
        if self.invert {
            options.invert_coordinates = true;
        }
        if self.lines {
            options.granularity = TextGranularity::Line;
        }
        if self.text {
            options.output_format = OutputFormat::Text;
        }
        if self.strict_images {
            options.strict_images = true;
        }
        if let Some(font) = &self.font {
            options.font_path = Some(font.clone());
        }
        if !self.images.is_empty() {
            options.image_paths = self.images.clone();
        }
        // Relative image references in the hOCR are relative to the input file.
        if options.image_base_dir.is_none() {
            options.image_base_dir = self
                .input_path()
                .and_then(Path::parent)
                .map(Path::to_path_buf);
        }

        Ok(options)
    }

    fn input_path(&self) -> Option<&Path> {
        self.input.as_deref().filter(|p| *p != Path::new("-"))
    }

    fn log_level(&self) -> Option<LevelFilter> {
        match (self.quiet, self.verbose) {
            (true, _) => Some(LevelFilter::Warn),
            (false, 0) => None,
            (false, 1) => Some(LevelFilter::Debug),
            _ => Some(LevelFilter::Trace),
        }
    }
}

fn init_logging(level: Option<LevelFilter>) {
    let mut builder = env_logger::Builder::new();
    match level {
        Some(level) => {
            builder.filter_level(level);
        }
        None if std::env::var_os("RUST_LOG").is_some() => {
            builder.parse_default_env();
        }
        None => {
            builder.filter_level(LevelFilter::Info);
        }
    }
    builder.init();
}

fn read_input(path: Option<&Path>) -> Result<Vec<u8>> {
    match path {
        Some(path) => {
            fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
        }
        None => {
            let mut input = Vec::new();
            io::stdin()
                .read_to_end(&mut input)
                .context("Failed to read hOCR from stdin")?;
            Ok(input)
        }
    }
}

fn write_output(path: &Path, bytes: &[u8]) -> Result<()> {
    if path == Path::new("-") {
        let mut stdout = io::stdout().lock();
        stdout.write_all(bytes)?;
        stdout.flush()?;
    } else {
        fs::write(path, bytes).with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Wrote {}", path.display());
    }
    Ok(())
}

fn run(cli: &Cli) -> Result<()> {
    let options = cli.options()?;
    let input = read_input(cli.input_path())?;
    let converter = Converter::from_bytes(&input, options).context("Failed to parse hOCR")?;

    // Convert fully in memory so a failed run leaves no partial output.
    let mut output = Vec::new();
    converter
        .convert(&mut output)
        .context("Conversion failed")?;
    write_output(&cli.output, &output)
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_level());

    if let Err(e) = run(&cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

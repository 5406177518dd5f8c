use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use env_logger::Env;
use log::info;
use serde_json::json;
use tokprep::corpus::read_source;
use tokprep::datafile::{read_header, read_token_file};
use tokprep::special_tokens::{default_tokens, merge_tokens};
use tokprep::{
    EncoderAdapter, HttpFetcher, MarkerScheme, Pipeline, PipelineConfig, SourceConfig, TokenWidth,
    VocabularySource,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Annotate, tokenize and shard text corpora", long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Decrease verbosity (-q, -qq)
    #[arg(short = 'q', long, global = true, action = ArgAction::Count)]
    quiet: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch, annotate, encode, split and write token files
    Run(RunArgs),
    /// Fetch and annotate sources, writing only the annotated text
    Annotate(AnnotateArgs),
    /// Encode raw text files with the vocabulary
    Encode(EncodeArgs),
    /// Validate and summarise binary token files
    Inspect(InspectArgs),
    /// Make sure every configured source is present locally
    Fetch(AnnotateArgs),
    /// Print the resolved configuration as JSON
    Config(ConfigArgs),
}

#[derive(Args, Debug)]
struct PipelineArgs {
    /// JSON configuration file; flags override its values
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Raw source as `[NAMESPACE=]URL_OR_PATH` (repeat flag; namespaces default to 1, 2, ...)
    #[arg(long = "source", value_name = "SOURCE")]
    sources: Vec<String>,

    /// Directory for downloads and artifacts
    #[arg(short, long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// File stem for artifacts
    #[arg(long, value_name = "NAME")]
    dataset_name: Option<String>,

    /// Number of leading tokens held out for validation
    #[arg(long, value_name = "COUNT")]
    validation_tokens: Option<usize>,

    /// Label prepended to document references
    #[arg(long, value_name = "PREFIX")]
    reference_prefix: Option<String>,

    /// Use one marker before the reference instead of an open/close pair
    #[arg(long, value_name = "MARKER")]
    single_marker: Option<String>,

    /// Register an additional special token (repeat flag)
    #[arg(long = "special-token", value_name = "TOKEN")]
    special_tokens: Vec<String>,

    /// Disable progress bars
    #[arg(long)]
    no_progress: bool,
}

#[derive(Args, Debug)]
struct VocabArgs {
    /// Tokenizer JSON to load
    #[arg(short = 'm', long, value_name = "PATH", conflicts_with = "vocabulary")]
    tokenizer: Option<PathBuf>,

    /// Hugging Face hub identifier of the vocabulary
    #[arg(long, value_name = "NAME")]
    vocabulary: Option<String>,
}

impl VocabArgs {
    fn source(&self) -> Option<VocabularySource> {
        match (&self.tokenizer, &self.vocabulary) {
            (Some(path), _) => Some(VocabularySource::File(path.clone())),
            (None, Some(name)) => Some(VocabularySource::Pretrained(name.clone())),
            (None, None) => None,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum WidthArg {
    /// Two bytes per token
    U16,
    /// Four bytes per token
    U32,
}

impl From<WidthArg> for TokenWidth {
    fn from(arg: WidthArg) -> Self {
        match arg {
            WidthArg::U16 => TokenWidth::U16,
            WidthArg::U32 => TokenWidth::U32,
        }
    }
}

#[derive(Args, Debug)]
struct RunArgs {
    #[command(flatten)]
    pipeline: PipelineArgs,

    #[command(flatten)]
    vocab: VocabArgs,

    /// Force the on-disk token width (defaults to the narrowest that fits the vocabulary)
    #[arg(long, value_enum)]
    token_width: Option<WidthArg>,

    /// Emit the run report as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct AnnotateArgs {
    #[command(flatten)]
    pipeline: PipelineArgs,
}

#[derive(Args, Debug)]
struct EncodeArgs {
    #[command(flatten)]
    vocab: VocabArgs,

    /// Text files to encode
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Register an additional special token (repeat flag)
    #[arg(long = "special-token", value_name = "TOKEN")]
    special_tokens: Vec<String>,

    /// Allow special tokens to appear literally in the input
    #[arg(long)]
    allow_special: bool,

    /// Emit JSON lines instead of human-readable output
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct InspectArgs {
    /// Token files to validate
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Decode the first N tokens with the vocabulary and special tokens of the run
    #[arg(long, value_name = "N", default_value_t = 0)]
    preview: usize,

    #[command(flatten)]
    pipeline: PipelineArgs,

    #[command(flatten)]
    vocab: VocabArgs,

    /// Emit JSON lines instead of human-readable output
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct ConfigArgs {
    #[command(flatten)]
    pipeline: PipelineArgs,

    #[command(flatten)]
    vocab: VocabArgs,

    /// Write the configuration here instead of stdout
    #[arg(long, value_name = "PATH")]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Run(args) => run_pipeline(args),
        Commands::Annotate(args) => run_annotate(args),
        Commands::Encode(args) => run_encode(args),
        Commands::Inspect(args) => run_inspect(args),
        Commands::Fetch(args) => run_fetch(args),
        Commands::Config(args) => run_config(args),
    }
}

fn init_logging(verbose: u8, quiet: u8) {
    use log::LevelFilter;

    let level = if quiet > 0 {
        match quiet {
            1 => LevelFilter::Warn,
            _ => LevelFilter::Error,
        }
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    let mut builder = env_logger::Builder::from_env(Env::default().default_filter_or("info"));
    builder.format_timestamp_millis();
    builder.filter_level(level);
    let _ = builder.try_init();
}

fn resolve_config(args: &PipelineArgs) -> Result<PipelineConfig> {
    let mut cfg = match &args.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if !args.sources.is_empty() {
        cfg.sources = args
            .sources
            .iter()
            .enumerate()
            .map(|(idx, raw)| parse_source(raw, idx))
            .collect::<Result<_>>()?;
    }
    if let Some(dir) = &args.output_dir {
        cfg.output_dir = dir.clone();
    }
    if let Some(name) = &args.dataset_name {
        cfg.dataset_name = name.clone();
    }
    if let Some(count) = args.validation_tokens {
        cfg.validation_tokens = count;
    }
    if args.reference_prefix.is_some() {
        cfg.annotation.reference_prefix = args.reference_prefix.clone();
    }
    if let Some(marker) = &args.single_marker {
        cfg.annotation.markers = MarkerScheme::Single {
            marker: marker.clone(),
        };
    }
    if !args.special_tokens.is_empty() {
        cfg.extra_special_tokens = args.special_tokens.clone();
    }
    if args.no_progress {
        cfg.show_progress = false;
    }
    cfg.validate().context("invalid configuration")?;
    Ok(cfg)
}

fn resolve_with_vocabulary(args: &PipelineArgs, vocab: &VocabArgs) -> Result<PipelineConfig> {
    let mut cfg = resolve_config(args)?;
    if let Some(source) = vocab.source() {
        cfg.vocabulary = source;
    }
    Ok(cfg)
}

fn parse_source(raw: &str, idx: usize) -> Result<SourceConfig> {
    if let Some((prefix, location)) = raw.split_once('=') {
        if let Ok(namespace) = prefix.parse::<u32>() {
            return Ok(SourceConfig::new(location, namespace));
        }
    }
    let namespace = u32::try_from(idx + 1).context("too many sources")?;
    Ok(SourceConfig::new(raw, namespace))
}

fn load_encoder(cfg: &PipelineConfig) -> Result<EncoderAdapter> {
    let encoder = EncoderAdapter::new(&cfg.vocabulary, &cfg.special_tokens())
        .with_context(|| format!("failed to load vocabulary {}", cfg.vocabulary))?;
    info!(
        "loaded vocabulary {} with {} entries",
        cfg.vocabulary,
        encoder.vocab_size()
    );
    Ok(encoder)
}

fn run_pipeline(args: RunArgs) -> Result<()> {
    let mut cfg = resolve_with_vocabulary(&args.pipeline, &args.vocab)?;
    if let Some(width) = args.token_width {
        cfg.token_width = Some(width.into());
    }

    let encoder = load_encoder(&cfg)?;
    let fetcher = HttpFetcher::new(cfg.show_progress)?;
    let pipeline = Pipeline::new(cfg)?;
    let report = pipeline
        .run(&encoder, &fetcher)
        .context("pipeline run failed")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    println!(
        "✅ annotated {} documents from {} sources into {}",
        report.documents(),
        report.sources.len(),
        report.annotated.path.display()
    );
    println!(
        "   {} tokens ({}) | validation {} -> {} | train {} -> {}",
        report.total_tokens,
        report.token_width,
        report.validation.size,
        report.validation.path.display(),
        report.train.size,
        report.train.path.display()
    );
    println!("   duration {:.2?}", report.timings.total);
    Ok(())
}

fn run_annotate(args: AnnotateArgs) -> Result<()> {
    let cfg = resolve_config(&args.pipeline)?;
    let fetcher = HttpFetcher::new(cfg.show_progress)?;
    let pipeline = Pipeline::new(cfg)?;
    let corpus = pipeline
        .annotate(&fetcher)
        .context("annotation failed")?;
    let documents: usize = corpus.sources.iter().map(|source| source.documents).sum();
    println!(
        "wrote {} documents ({} bytes) to {}",
        documents,
        corpus.annotated.size,
        corpus.annotated.path.display()
    );
    Ok(())
}

fn run_fetch(args: AnnotateArgs) -> Result<()> {
    let cfg = resolve_config(&args.pipeline)?;
    let fetcher = HttpFetcher::new(cfg.show_progress)?;
    let pipeline = Pipeline::new(cfg)?;
    for path in pipeline.fetch_sources(&fetcher)? {
        println!("{}", path.display());
    }
    Ok(())
}

fn run_encode(args: EncodeArgs) -> Result<()> {
    let source = args.vocab.source().unwrap_or_default();
    let specials = merge_tokens(&default_tokens(), &args.special_tokens);
    let encoder = EncoderAdapter::new(&source, &specials)
        .with_context(|| format!("failed to load vocabulary {source}"))?;

    for path in &args.inputs {
        let text = read_source(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let tokens = if args.allow_special {
            encoder.encode(&text)
        } else {
            encoder.encode_with_allowed(&text, &[])
        }
        .with_context(|| format!("failed to encode {}", path.display()))?;

        if args.json {
            let record = json!({
                "path": path.display().to_string(),
                "tokens": tokens
            });
            println!("{}", serde_json::to_string(&record)?);
        } else {
            let ids = tokens
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" ");
            println!("{}:\t{ids}", path.display());
        }
    }
    Ok(())
}

fn run_inspect(args: InspectArgs) -> Result<()> {
    let decoder = if args.preview > 0 {
        let cfg = resolve_with_vocabulary(&args.pipeline, &args.vocab)?;
        Some(load_encoder(&cfg)?)
    } else {
        None
    };

    for path in &args.files {
        let header =
            read_header(path).with_context(|| format!("failed to validate {}", path.display()))?;
        let preview = match &decoder {
            Some(decoder) => {
                let file = read_token_file(path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                let ids = &file.tokens[..args.preview.min(file.tokens.len())];
                Some(decoder.decode(ids, false)?)
            }
            None => None,
        };

        if args.json {
            let record = json!({
                "path": path.display().to_string(),
                "width": header.width,
                "count": header.count,
                "bytes": header.file_len(),
                "preview": preview,
            });
            println!("{}", serde_json::to_string(&record)?);
        } else {
            println!("{}", path.display());
            println!("  Width : {}", header.width);
            println!("  Tokens: {}", header.count);
            println!("  Bytes : {}", header.file_len());
            if let Some(text) = preview {
                println!("  Preview: {text:?}");
            }
        }
    }
    Ok(())
}

fn run_config(args: ConfigArgs) -> Result<()> {
    let cfg = resolve_with_vocabulary(&args.pipeline, &args.vocab)?;
    match &args.output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)
                        .with_context(|| format!("failed to create {}", parent.display()))?;
                }
            }
            cfg.save(path)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("wrote configuration to {}", path.display());
        }
        None => println!("{}", serde_json::to_string_pretty(&cfg)?),
    }
    Ok(())
}

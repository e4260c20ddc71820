use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use bugscope::config::Config;
use bugscope::corpus::{Decoder, chunk_sources, load_sources};
use bugscope::knowledge::{KnowledgeContext, load_glossary, load_scripts};
use bugscope::lexical::LexicalRetriever;
use bugscope::llm::registry::{ModelEndpoint, ModelRegistry};
use bugscope::pipeline::BugLocator;
use bugscope::report::{AnalysisReport, LexicalReport, save_json};

#[derive(Parser, Debug)]
#[command(
    name = "bugscope",
    version,
    about = "Locate the source code behind a bug report and draft a fix"
)]
struct Cli {
    /// Configuration file (a template is written when config.json is missing)
    #[arg(long, global = true, default_value = "config.json")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rank source chunks with a chat model and draft a fix
    Analyze(AnalyzeArgs),
    /// Rank source chunks by TF-IDF similarity only
    Lexical(CommonArgs),
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Bug report text file
    #[arg(long)]
    report: Option<PathBuf>,

    /// Root directory of the source corpus
    #[arg(long)]
    source: Option<PathBuf>,

    /// Where to write the JSON results
    #[arg(long)]
    output: Option<PathBuf>,

    /// Number of matches to keep
    #[arg(long)]
    top_n: Option<usize>,

    /// Chunk window in lines
    #[arg(long)]
    window: Option<usize>,
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Model endpoint as name:url:model[:specialty]; used when the config lists none
    #[arg(long = "model", value_name = "SPEC")]
    models: Vec<String>,

    /// Developer glossary file
    #[arg(long)]
    knowledge: Option<PathBuf>,

    /// Directory of game script .txt files
    #[arg(long)]
    scripts: Option<PathBuf>,

    /// Translate between the report language and the working language
    #[arg(long, default_value_t = false)]
    translate: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(&cli.config)?;

    match cli.command {
        Command::Analyze(args) => {
            apply_common(&mut config, &args.common);
            if args.translate {
                config.translation.enabled = true;
            }
            if let Some(path) = &args.knowledge {
                config.knowledge_file = Some(path.to_string_lossy().into_owned());
            }
            if let Some(path) = &args.scripts {
                config.script_dir = Some(path.to_string_lossy().into_owned());
            }
            config.validate()?;
            run_analyze(&config, &args.models)
        }
        Command::Lexical(args) => {
            apply_common(&mut config, &args);
            if let Some(top_n) = args.top_n {
                config.lexical.top_n = top_n;
            }
            config.validate()?;
            run_lexical(&config)
        }
    }
}

/// CLI flags override file values.
fn apply_common(config: &mut Config, args: &CommonArgs) {
    if let Some(path) = &args.report {
        config.bug_report_path = Some(path.to_string_lossy().into_owned());
    }
    if let Some(path) = &args.source {
        config.source_dir = Some(path.to_string_lossy().into_owned());
    }
    if let Some(path) = &args.output {
        config.output_path = path.to_string_lossy().into_owned();
    }
    if let Some(top_n) = args.top_n {
        config.ranking.top_n = top_n;
    }
    if let Some(window) = args.window {
        config.chunk_window = window;
    }
}

fn read_report(config: &Config, decoder: &Decoder) -> Result<String> {
    let Some(path) = config.bug_report_path.as_deref() else {
        bail!("no bug report given (use --report or bug_report_path)");
    };
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read bug report: {path}"))?;
    let text = decoder
        .decode(&bytes)
        .with_context(|| format!("Failed to decode bug report: {path}"))?;
    if text.trim().is_empty() {
        bail!("bug report is empty: {path}");
    }
    Ok(text)
}

fn source_root(config: &Config) -> Result<&Path> {
    match config.source_dir.as_deref() {
        Some(dir) => Ok(Path::new(dir)),
        None => bail!("no source directory given (use --source or source_dir)"),
    }
}

fn load_knowledge(config: &Config, decoder: &Decoder) -> KnowledgeContext {
    let mut knowledge = KnowledgeContext::default();
    if let Some(path) = config.knowledge_file.as_deref() {
        match load_glossary(Path::new(path), decoder) {
            Ok(glossary) => knowledge.glossary = glossary,
            Err(e) => warn!("Continuing without glossary: {e:#}"),
        }
    }
    if let Some(dir) = config.script_dir.as_deref() {
        match load_scripts(Path::new(dir), decoder) {
            Ok(scripts) => knowledge.scripts = scripts,
            Err(e) => warn!("Continuing without scripts: {e:#}"),
        }
    }
    knowledge
}

fn run_analyze(config: &Config, model_specs: &[String]) -> Result<()> {
    let decoder = config.decoder()?;

    // 1. Inputs
    let report = read_report(config, &decoder)?;
    let (files, _) = load_sources(source_root(config)?, &config.extensions, &decoder)?;
    let knowledge = load_knowledge(config, &decoder);

    // 2. Model registry
    let mut cli_endpoints = Vec::new();
    for spec in model_specs {
        match ModelEndpoint::parse_spec(spec) {
            Some(endpoint) => cli_endpoints.push(endpoint),
            None => warn!("Ignoring malformed model spec: {spec}"),
        }
    }
    let mut registry = ModelRegistry::new();
    for endpoint in config.resolve_endpoints(&cli_endpoints) {
        let name = endpoint.name.clone();
        if let Err(e) = registry.register(endpoint, config.timeout()) {
            warn!("Model '{name}' not registered: {e}");
        }
    }
    info!("{} model endpoint(s) available", registry.len());

    // 3. Analysis pass
    let outcome = BugLocator::new(&registry, config.pipeline_options())
        .with_knowledge(&knowledge)
        .run(&report, &files)
        .context("Analysis failed")?;

    // 4. Output
    let result = AnalysisReport::new(&report, outcome);
    print!("{}", result.render());
    save_json(&result, Path::new(&config.output_path))?;
    info!("Results saved to {}", config.output_path);
    Ok(())
}

fn run_lexical(config: &Config) -> Result<()> {
    let decoder = config.decoder()?;
    let report = read_report(config, &decoder)?;
    let (files, _) = load_sources(source_root(config)?, &config.extensions, &decoder)?;

    let chunks = chunk_sources(&files, config.chunk_window);
    if chunks.is_empty() {
        bail!("the source corpus produced no chunks");
    }
    let ranked = LexicalRetriever::new(config.lexical.max_features).rank(&report, &chunks);

    let result = LexicalReport::new(&report, &chunks, &ranked, config.lexical.top_n);
    print!("{}", result.render());
    save_json(&result, Path::new(&config.output_path))?;
    info!("Results saved to {}", config.output_path);
    Ok(())
}

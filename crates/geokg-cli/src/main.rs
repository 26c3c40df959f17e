//! GeoKG CLI - Command-line interface
//!
//! Usage:
//!   geokg parse --input response.json --output graph.json
//!   geokg align build --kind strat_name
//!   geokg align query --kind strat_name "Shakopee Fm"
//!   geokg hydrate --input graph.json --output hydrated.json
//!   geokg serialize --input hydrated.json --output graph.ttl
//!   geokg run --input response.json --output graph.ttl
//!   geokg intervals fetch --output intervals.json

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use geokg_cli::{build_vocabulary, fetch_intervals, load_alignment, load_config, Pipeline};
use geokg_core::{EntityKind, GraphOutput, LoggingConfig, Provenance};
use geokg_extractor::{parse_with_report, PromptHandler};
use geokg_graph::OntologySerializer;
use geokg_hydrate::GraphHydrator;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

const XDD_ARTICLES: &str = "https://xdd.wisc.edu/api/articles";

#[derive(Parser)]
#[command(name = "geokg")]
#[command(about = "Geological text to knowledge graph pipeline")]
#[command(version)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a model response into a graph output (JSON)
    Parse {
        #[command(flatten)]
        io: IoArgs,
        #[command(flatten)]
        source: SourceArgs,
    },
    /// Build or query alignment vocabularies
    Align {
        #[command(subcommand)]
        action: AlignAction,
    },
    /// Hydrate a graph output against the geocoder and authority
    Hydrate {
        #[command(flatten)]
        io: IoArgs,
    },
    /// Serialize a graph output as Turtle
    Serialize {
        #[command(flatten)]
        io: IoArgs,
    },
    /// Parse, align, hydrate and serialize in one go
    Run {
        #[command(flatten)]
        io: IoArgs,
        #[command(flatten)]
        source: SourceArgs,
        /// Also write the hydrated graph output (JSON) here
        #[arg(long)]
        graph_output: Option<PathBuf>,
    },
    /// Geologic time intervals
    Intervals {
        #[command(subcommand)]
        action: IntervalsAction,
    },
}

#[derive(Subcommand)]
enum AlignAction {
    /// Embed and save a vocabulary
    Build {
        /// location, strat_name or mineral
        #[arg(long, default_value = "strat_name")]
        kind: EntityKind,
        /// Newline-delimited names instead of the authority's list
        #[arg(long)]
        names_file: Option<PathBuf>,
    },
    /// Closest known name for a query
    Query {
        #[arg(long, default_value = "strat_name")]
        kind: EntityKind,
        /// Override the configured similarity threshold
        #[arg(long)]
        threshold: Option<f32>,
        name: String,
    },
}

#[derive(Subcommand)]
enum IntervalsAction {
    /// Download the interval list for use as `serializer.intervals_file`
    Fetch {
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

#[derive(Args)]
struct IoArgs {
    /// Input file (stdin when omitted)
    #[arg(long, short)]
    input: Option<PathBuf>,
    /// Output file (stdout when omitted)
    #[arg(long, short)]
    output: Option<PathBuf>,
}

#[derive(Args)]
struct SourceArgs {
    /// Built-in prompt version
    #[arg(long, default_value = "stratname_v3")]
    prompt: String,
    /// Custom prompt handler (TOML), overrides --prompt
    #[arg(long)]
    prompt_file: Option<PathBuf>,
    /// Model that produced the response
    #[arg(long)]
    source: Option<String>,
    #[arg(long)]
    source_version: Option<String>,
    /// Source document id; recorded as the model's upstream input
    #[arg(long, requires = "preprocessor")]
    paper_id: Option<String>,
    /// Text preprocessor that produced the passage
    #[arg(long)]
    preprocessor: Option<String>,
    /// Passage the response was extracted from; stored with its hash
    #[arg(long)]
    text_file: Option<PathBuf>,
}

impl SourceArgs {
    fn prompt_handler(&self) -> anyhow::Result<PromptHandler> {
        let handler = match &self.prompt_file {
            Some(path) => PromptHandler::from_toml_file(path)?,
            None => PromptHandler::from_version(&self.prompt)?,
        };
        Ok(handler)
    }

    fn provenance(&self) -> Option<Provenance> {
        let source = self.source.as_ref()?;
        let document = match (&self.paper_id, &self.preprocessor) {
            (Some(paper_id), Some(preprocessor)) => Some(
                Provenance::new("xDD")
                    .with_value("paper_id", paper_id.clone())
                    .with_value("preprocessor_id", preprocessor.clone())
                    .with_value("url", format!("{XDD_ARTICLES}?docid={paper_id}")),
            ),
            _ => None,
        };

        let mut provenance = Provenance::new(source.clone()).chain(document);
        if let Some(version) = &self.source_version {
            provenance = provenance.with_version(version.clone());
        }
        Some(provenance)
    }

    fn tag(&self, mut graph: GraphOutput) -> anyhow::Result<GraphOutput> {
        if let Some(paper_id) = &self.paper_id {
            graph = graph.with_paper_id(paper_id.clone());
        }
        if let Some(path) = &self.text_file {
            graph = graph.with_text_content(read_input(Some(path.as_path()))?);
        }
        Ok(graph)
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_file(logging.include_location)
        .with_line_number(logging.include_location);

    if logging.json_format {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn read_input(path: Option<&Path>) -> anyhow::Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display())),
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
    }
}

fn write_output(path: Option<&Path>, content: &str) -> anyhow::Result<()> {
    match path {
        Some(path) => {
            std::fs::write(path, content).with_context(|| format!("writing {}", path.display()))
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(content.as_bytes())?;
            if !content.ends_with('\n') {
                stdout.write_all(b"\n")?;
            }
            Ok(())
        }
    }
}

fn read_graph(path: Option<&Path>) -> anyhow::Result<GraphOutput> {
    let content = read_input(path)?;
    serde_json::from_str(&content).context("input is not a graph output")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    init_tracing(&config.logging);

    match cli.command {
        Commands::Parse { io, source } => {
            let prompt = source.prompt_handler()?;
            let raw = read_input(io.input.as_deref())?;
            let (graph, dropped) = parse_with_report(&raw, &prompt, source.provenance())?;
            let graph = source.tag(graph)?;
            tracing::info!(triplets = graph.triplets.len(), dropped = dropped.len(), "Parsed response");
            write_output(io.output.as_deref(), &serde_json::to_string_pretty(&graph)?)?;
        }
        Commands::Align { action } => match action {
            AlignAction::Build { kind, names_file } => {
                let (handler, dir) = build_vocabulary(&config, kind, names_file.as_deref()).await?;
                println!("Saved {} {} names to {}", handler.len(), kind, dir.display());
            }
            AlignAction::Query {
                kind,
                threshold,
                name,
            } => {
                let handler = load_alignment(&config, kind)?;
                let threshold = threshold.unwrap_or(config.alignment.threshold);
                match handler.closest(&name).await? {
                    Some(m) => println!(
                        "{}\t{:.4}\t{}",
                        m.name,
                        m.similarity,
                        if m.similarity >= f64::from(threshold) { "aligned" } else { "below threshold" }
                    ),
                    None => println!("{name}\t-\tempty vocabulary"),
                }
            }
        },
        Commands::Hydrate { io } => {
            let mut graph = read_graph(io.input.as_deref())?;
            let report = GraphHydrator::from_config(&config)?.hydrate(&mut graph).await;
            tracing::info!(report = %serde_json::to_string(&report)?, "Hydrated graph output");
            write_output(io.output.as_deref(), &serde_json::to_string_pretty(&graph)?)?;
        }
        Commands::Serialize { io } => {
            let graph = read_graph(io.input.as_deref())?;
            let result = OntologySerializer::from_config(&config.serializer)?.to_graph(&graph);
            let (turtle, failures) = (result.to_turtle()?, result.failures);
            for failure in &failures {
                tracing::warn!(
                    triplet = failure.triplet_index,
                    feature = failure.feature,
                    error = %failure.error,
                    "Feature not serialized"
                );
            }
            write_output(io.output.as_deref(), &turtle)?;
        }
        Commands::Run {
            io,
            source,
            graph_output,
        } => {
            let pipeline = Pipeline::new(config, source.prompt_handler()?)?;
            let raw = read_input(io.input.as_deref())?;
            let mut output = pipeline.run(&raw, source.provenance()).await?;
            output.graph = source.tag(output.graph)?;

            if let Some(path) = graph_output {
                write_output(Some(path.as_path()), &serde_json::to_string_pretty(&output.graph)?)?;
            }
            write_output(io.output.as_deref(), &output.turtle)?;
        }
        Commands::Intervals { action } => match action {
            IntervalsAction::Fetch { output } => {
                let intervals = fetch_intervals(&config).await?;
                tracing::info!(intervals = intervals.len(), "Fetched geologic intervals");
                write_output(output.as_deref(), &serde_json::to_string_pretty(&intervals)?)?;
            }
        },
    }

    Ok(())
}

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use fraud_rings::{
    analyze, write_connections_csv, write_nodes_csv, AnalysisConfig, DuplicatePolicy, Entity,
    EntityTable, FieldMapping, FraudGraph, GraphExport, RiskTier,
};
use std::fs::File;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "fraud-rings", version, about = "Link accounts that share identifying values")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the graph from a CSV file and export it
    Analyze {
        #[command(flatten)]
        input: InputArgs,

        /// Chart title
        #[arg(long)]
        title: Option<String>,

        /// Write the graph export (JSON) here instead of printing a summary;
        /// a directory gets a timestamped `fraud-network-*.json` file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write one CSV line per connection
        #[arg(long)]
        connections_csv: Option<PathBuf>,

        /// Write one CSV line per entity, highest score first
        #[arg(long)]
        nodes_csv: Option<PathBuf>,
    },

    /// Print the default field list
    Fields,

    /// Browse the graph in the terminal
    Tui {
        #[command(flatten)]
        input: InputArgs,
    },
}

#[derive(Args, Debug)]
struct InputArgs {
    /// CSV file with a header row
    csv: PathBuf,

    /// JSON run configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Field display name, identifier first (repeat up to nine times)
    #[arg(short, long = "field")]
    fields: Vec<String>,

    /// Drop entities without any connection
    #[arg(long)]
    filter_isolated: bool,

    /// Ignore fields whose value is identical on every row (first row per identifier)
    #[arg(long)]
    skip_constant_fields: bool,

    /// Keep the first row of a repeated identifier instead of failing
    #[arg(long)]
    keep_first_duplicate: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Analyze {
            input,
            title,
            output,
            connections_csv,
            nodes_csv,
        } => run_analyze(&input, title, output, connections_csv, nodes_csv),
        Command::Fields => {
            print_fields(&FieldMapping::default_fraud_fields());
            Ok(())
        }
        Command::Tui { input } => run_ui_mode(&input),
    }
}

// ============================================================================
// INPUT
// ============================================================================

fn load(input: &InputArgs) -> Result<(AnalysisConfig, Vec<Entity>)> {
    let mut config = match &input.config {
        Some(path) => AnalysisConfig::from_json_file(path)?,
        None => AnalysisConfig::default(),
    };

    if !input.fields.is_empty() {
        config.fields = FieldMapping::from_display_names(&input.fields[..])
            .context("Invalid --field list")?;
    }
    if input.filter_isolated {
        config.filter_isolated = true;
    }
    if input.keep_first_duplicate {
        config.duplicate_policy = DuplicatePolicy::KeepFirst;
    }

    config.validate().context("Invalid field configuration")?;

    let entities = EntityTable::from_csv_path(&input.csv, &config.fields)?.into_entities();
    tracing::info!(rows = entities.len(), path = %input.csv.display(), "loaded entities");

    if input.skip_constant_fields {
        let constant = config.linkage_builder().constant_fields(&entities);
        if !constant.is_empty() {
            let names: Vec<String> = constant.iter().map(|k| config.fields.display_name(*k)).collect();
            tracing::warn!(fields = ?names, "skipping fields that are constant across all rows");
            config.fields = config.fields.without(&constant);
        }
    }

    Ok((config, entities))
}

fn build(input: &InputArgs) -> Result<(AnalysisConfig, FraudGraph)> {
    let (config, entities) = load(input)?;
    let graph = analyze(&entities, &config).context("Analysis failed")?;
    Ok((config, graph))
}

// ============================================================================
// COMMANDS
// ============================================================================

fn run_analyze(
    input: &InputArgs,
    title: Option<String>,
    output: Option<PathBuf>,
    connections_csv: Option<PathBuf>,
    nodes_csv: Option<PathBuf>,
) -> Result<()> {
    let (mut config, graph) = build(input)?;
    if let Some(title) = title {
        config.title = title;
    }

    let export = GraphExport::new(&graph, config.title(), &config.fields)?;

    if let Some(path) = &connections_csv {
        write_connections_csv(&graph, create(path)?)?;
        tracing::info!(path = %path.display(), "wrote connections CSV");
    }
    if let Some(path) = &nodes_csv {
        write_nodes_csv(&graph, &config.fields, create(path)?)?;
        tracing::info!(path = %path.display(), "wrote nodes CSV");
    }

    match &output {
        Some(path) => {
            let path = if path.is_dir() {
                export.default_path(path)
            } else {
                path.clone()
            };
            export.write_json(&path)?;
            tracing::info!(path = %path.display(), fingerprint = %export.fingerprint, "wrote graph export");
        }
        None => print_summary(&export),
    }

    Ok(())
}

fn create(path: &Path) -> Result<File> {
    File::create(path).with_context(|| format!("Failed to create {}", path.display()))
}

fn print_summary(export: &GraphExport) {
    let summary = &export.summary;

    println!("🕸️  {}", export.title);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Entities:     {}", summary.total_entities);
    println!("Connections:  {}", summary.total_connections);
    for tier in [RiskTier::High, RiskTier::Medium, RiskTier::Low, RiskTier::None] {
        println!(
            "  {:<8}    {}",
            tier.as_str(),
            summary.by_tier.get(&tier).copied().unwrap_or(0)
        );
    }

    if !export.field_legend.is_empty() {
        println!("\nConnection types:");
        for entry in &export.field_legend {
            println!("  {:<20} {}", entry.display_name, entry.connections);
        }
    }

    println!("\n{}", export.generated_label());
}

fn print_fields(mapping: &FieldMapping) {
    for def in mapping.fields() {
        let marker = if def.key.is_identifier() { " (identifier)" } else { "" };
        println!("{}. {}{}", def.key.get(), def.display_name, marker);
    }
}

#[cfg(feature = "tui")]
fn run_ui_mode(input: &InputArgs) -> Result<()> {
    let (config, graph) = build(input)?;

    println!("✓ Built graph: {} entities, {} connections", graph.nodes.len(), graph.edges.len());
    println!("Starting UI... (Press 'q' to quit)\n");

    let title = config.title().to_string();
    let mut app = fraud_rings::ui::App::new(graph, config.fields, title);
    fraud_rings::ui::run_ui(&mut app)?;

    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_input: &InputArgs) -> Result<()> {
    eprintln!("❌ TUI mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or use the analyze command to export the graph");
    std::process::exit(1);
}

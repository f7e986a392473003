//! recast CLI - materialize JSON documents against a YAML schema
//!
//! Reads JSON from a file or stdin, converts it into the requested type using
//! the schema's rules, and writes the result as JSON or NDJSON.

use clap::{Parser, Subcommand, ValueEnum};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::EnvFilter;

use recast::{JsonArrayWriter, Materializer, NdjsonWriter, RecastError, SchemaConfig, Value};

#[derive(Parser)]
#[command(name = "recast")]
#[command(version, about = "Materialize JSON records into declared types", long_about = None)]
struct Cli {
    /// Log at debug level (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a JSON document into instances of a schema type
    Convert {
        /// Schema file, or a directory of schema files
        #[arg(short, long, default_value = "schema.yaml")]
        schema: PathBuf,

        /// Name of the target type
        #[arg(short = 't', long = "type")]
        type_name: String,

        /// JSON input file (defaults to stdin)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },

    /// Validate a schema without converting anything
    Validate {
        /// Schema file, or a directory of schema files
        #[arg(short, long, default_value = "schema.yaml")]
        schema: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Single compact JSON document
    Json,
    /// Single indented JSON document
    Pretty,
    /// One JSON document per line
    Ndjson,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Convert {
            schema,
            type_name,
            input,
            format,
        } => convert(&schema, &type_name, input.as_deref(), format),
        Commands::Validate { schema } => validate(&schema),
    };

    if let Err(e) = result {
        eprintln!("✗ {}", e);
        process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn load_schema(path: &Path) -> Result<SchemaConfig, RecastError> {
    if path.is_dir() {
        SchemaConfig::load_from_dir(path)
    } else {
        SchemaConfig::load_from_file(path)
    }
}

fn convert(
    schema_path: &Path,
    type_name: &str,
    input: Option<&Path>,
    format: OutputFormat,
) -> Result<(), RecastError> {
    let schema = load_schema(schema_path)?;
    let (catalog, registry) = schema.build()?;
    let target = catalog.resolve(type_name)?;

    let json: serde_json::Value = match input {
        Some(path) => {
            let file = File::open(path).map_err(|source| RecastError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            serde_json::from_reader(BufReader::new(file))?
        }
        None => serde_json::from_reader(io::stdin().lock())?,
    };

    let output = Materializer::new(&registry).convert_json(&target, &json)?;
    let items = output.as_list().map_or(1, |items| items.len());
    tracing::info!(type_name, items, "converted input");

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    match format {
        OutputFormat::Json => {
            if let Value::List(_) = output {
                let mut writer = JsonArrayWriter::new(&mut out)?;
                writer.write_all(&output)?;
                writer.finish()?;
            } else {
                serde_json::to_writer(&mut out, &output)?;
            }
            writeln!(out)?;
        }
        OutputFormat::Pretty => {
            serde_json::to_writer_pretty(&mut out, &output)?;
            writeln!(out)?;
        }
        OutputFormat::Ndjson => {
            let mut writer = NdjsonWriter::new(&mut out);
            writer.write(&output)?;
            writer.flush()?;
        }
    }
    out.flush()?;

    Ok(())
}

fn validate(schema_path: &Path) -> Result<(), RecastError> {
    let schema = load_schema(schema_path)?;
    let (catalog, registry) = schema.build()?;

    println!("✓ Schema is valid: {}", schema_path.display());
    println!("  Policy: {:?}", registry.policy());
    println!("  Types: {}", catalog.len());
    for descriptor in catalog.iter() {
        let rules = registry.rules_for(descriptor.name()).count();
        println!(
            "    {} ({} rule{})",
            descriptor.type_chain().join(" -> "),
            rules,
            if rules == 1 { "" } else { "s" }
        );
    }
    println!("  Rules: {}", registry.len());

    Ok(())
}

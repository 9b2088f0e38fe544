use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing::info;
use tracing_subscriber::EnvFilter;

use kira_taxonomy::config::{ConfigLoader, ResolvedConfig};
use kira_taxonomy::domain::EditRecord;
use kira_taxonomy::error::TaxonomyError;
use kira_taxonomy::ncbi::{DumpSource, TaxdumpClient, TaxdumpHttpClient, load_taxdump};
use kira_taxonomy::output::{JsonOutput, MergedEntry, NamedResult, NewDatabaseResult};
use kira_taxonomy::store::Store;
use kira_taxonomy::taxonomy::Taxonomy;

#[derive(Parser)]
#[command(name = "kira-tax")]
#[command(about = "Rank-checked NCBI taxonomy database builder and query tool")]
#[command(version, author)]
struct Cli {
    /// SQLite database file (default: ~/.cache/kira-taxonomy/taxonomy.db)
    #[arg(long, global = true)]
    database: Option<Utf8PathBuf>,

    /// JSON settings file (default: ./kira-tax.json when present)
    #[arg(long, global = true)]
    config: Option<String>,

    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Create the database and load an NCBI taxdump into it")]
    NewDatabase(NewDatabaseArgs),
    #[command(about = "Print the lineage of each tax_id")]
    Lineage(TaxIdsArgs),
    #[command(about = "Add nodes and names from a JSON edit file")]
    AddNodes(AddNodesArgs),
    #[command(about = "Keep only tax_ids that are present and classified")]
    Named(NamedArgs),
    #[command(about = "Map renumbered tax_ids to their current ids")]
    Merged(TaxIdsArgs),
}

#[derive(Args)]
struct NewDatabaseArgs {
    /// Drop existing tables before loading
    #[arg(long)]
    clobber: bool,

    /// Path to taxdmp.zip
    #[arg(long, conflicts_with = "dump_dir")]
    archive: Option<PathBuf>,

    /// Directory of extracted .dmp files
    #[arg(long)]
    dump_dir: Option<PathBuf>,

    /// Download taxdmp.zip from NCBI first
    #[arg(long, conflicts_with_all = ["archive", "dump_dir"])]
    download: bool,

    /// Where the downloaded archive is kept
    #[arg(long, default_value = ".")]
    dest_dir: PathBuf,
}

#[derive(Args)]
struct TaxIdsArgs {
    #[arg(required = true)]
    tax_ids: Vec<String>,
}

#[derive(Args)]
struct AddNodesArgs {
    /// JSON array of {"type": "node" | "name", ...} records
    file: PathBuf,

    /// Source for records that do not name one
    #[arg(long)]
    source_name: Option<String>,
}

#[derive(Args)]
struct NamedArgs {
    #[arg(required = true)]
    tax_ids: Vec<String>,

    /// Drop taxa with the placeholder rank
    #[arg(long)]
    ranked: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<TaxonomyError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &TaxonomyError) -> u8 {
    match error {
        TaxonomyError::TaxonNotFound(_) | TaxonomyError::ConfigRead(_) => 2,
        TaxonomyError::TaxonIntegrity(_)
        | TaxonomyError::PrimaryNameCount { .. }
        | TaxonomyError::EmptyDump(_)
        | TaxonomyError::MalformedRecord(_) => 3,
        TaxonomyError::Download(_) | TaxonomyError::DownloadStatus { .. } => 4,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    let database = match cli.database.clone().or_else(|| config.database.clone()) {
        Some(path) => path,
        None => Store::default_path()?,
    };

    match cli.command {
        Commands::NewDatabase(args) => new_database(args, &config, database),
        Commands::Lineage(args) => {
            let taxonomy = open_taxonomy(&database)?;
            let lineages = args
                .tax_ids
                .iter()
                .map(|tax_id| taxonomy.lineage(tax_id))
                .collect::<Result<Vec<_>, _>>()?;
            JsonOutput::print_lineages(&lineages).into_diagnostic()
        }
        Commands::AddNodes(args) => {
            let content = fs::read_to_string(&args.file)
                .map_err(|err| TaxonomyError::Filesystem(err.to_string()))?;
            let records: Vec<EditRecord> = serde_json::from_str(&content)
                .map_err(|err| TaxonomyError::MalformedRecord(err.to_string()))?;
            let default_source = args.source_name.unwrap_or_else(|| config.source_name.clone());
            let mut taxonomy = open_taxonomy(&database)?;
            for record in records {
                info!(tax_id = record.tax_id(), "applying edit");
                taxonomy.apply_edit(record, &default_source)?;
            }
            Ok(())
        }
        Commands::Named(args) => {
            let taxonomy = open_taxonomy(&database)?;
            let named = taxonomy.named(&args.tax_ids, !args.ranked)?;
            JsonOutput::print_named(&NamedResult {
                requested: args.tax_ids.len(),
                named,
            })
            .into_diagnostic()
        }
        Commands::Merged(args) => {
            let taxonomy = open_taxonomy(&database)?;
            let mut entries = Vec::with_capacity(args.tax_ids.len());
            for tax_id in args.tax_ids {
                let current = taxonomy.resolve_merged(&tax_id)?.unwrap_or_default();
                entries.push(MergedEntry {
                    merged: current != tax_id,
                    tax_id,
                    current,
                });
            }
            JsonOutput::print_merged(&entries).into_diagnostic()
        }
    }
}

fn new_database(
    args: NewDatabaseArgs,
    config: &ResolvedConfig,
    database: Utf8PathBuf,
) -> miette::Result<()> {
    let (dump, download) = if args.download {
        let client = TaxdumpHttpClient::new()?;
        let outcome = client.fetch(&args.dest_dir, args.clobber)?;
        (DumpSource::Archive(outcome.path.clone()), Some(outcome))
    } else if let Some(archive) = args.archive {
        (DumpSource::Archive(archive), None)
    } else if let Some(dir) = args.dump_dir {
        (DumpSource::Directory(dir), None)
    } else {
        return Err(miette::miette!(
            "one of --archive, --dump-dir or --download is required"
        ));
    };

    let mut store = Store::open(&database)?;
    store.initialize_schema(args.clobber)?;
    let summary = load_taxdump(&mut store, &dump, config)?;
    info!(database = %database, nodes = summary.nodes, "database ready");

    JsonOutput::print_new_database(&NewDatabaseResult {
        database: database.to_string(),
        download,
        summary,
    })
    .into_diagnostic()
}

fn open_taxonomy(database: &Utf8PathBuf) -> miette::Result<Taxonomy> {
    if !database.exists() {
        return Err(TaxonomyError::Filesystem(format!(
            "database {database} does not exist; run new-database first"
        ))
        .into());
    }
    let store = Store::open(database)?;
    Ok(Taxonomy::open(store)?)
}

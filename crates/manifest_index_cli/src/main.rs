//! Command-line tool for building and querying manifest index files.
//!
//! # Commands
//!
//! - `create` - Create an empty index
//! - `add` / `update` / `remove` - Mutate the index from manifest files
//! - `package` - Optimize the index before shipping
//! - `search` - Query packages
//! - `versions` - List versions of one package
//! - `info` - Show schema version and last write time

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::info;
use manifest_index_core::{
    init_logging, IdType, LoggingConfig, ManifestIndex, MatchType, OpenDisposition,
    PackageMatchField, PackageMatchFilter, RequestMatch, SchemaVersion, SearchRequest,
};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

/// Manifest index maintenance and query tool.
#[derive(Parser)]
#[command(name = "manifest-index")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(global = true, long, env = "MANIFEST_INDEX_LOG_LEVEL")]
    log_level: Option<String>,

    /// Absolute directory for rolling log files; logging is off without it
    #[arg(global = true, long, env = "MANIFEST_INDEX_LOG_DIR")]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new, empty index file
    Create {
        index: PathBuf,

        /// Schema version as MAJOR[.MINOR] or `latest`
        #[arg(long, default_value = "latest")]
        schema: SchemaVersion,
    },

    /// Add a manifest file to the index
    Add(ManifestArgs),

    /// Update a manifest already in the index
    Update(ManifestArgs),

    /// Remove a manifest from the index
    Remove(ManifestArgs),

    /// Optimize the index for shipping
    Package { index: PathBuf },

    /// Search packages
    Search {
        index: PathBuf,

        /// Text matched against id, name, moniker, command and tag
        query: Option<String>,

        /// Match type applied to the query
        #[arg(long = "match", value_enum, default_value = "substring")]
        match_type: MatchArg,

        /// Required criterion as FIELD:MATCH:VALUE, e.g. tag:exact:editor
        #[arg(long = "filter", value_parser = parse_filter)]
        filters: Vec<PackageMatchFilter>,

        /// Additional alternative criterion as FIELD:MATCH:VALUE
        #[arg(long = "include", value_parser = parse_filter)]
        inclusions: Vec<PackageMatchFilter>,

        /// Maximum number of results, 0 for no limit
        #[arg(short, long, default_value = "0")]
        limit: usize,

        #[command(flatten)]
        open: OpenArgs,
    },

    /// List the versions of one package by its exact id
    Versions {
        index: PathBuf,
        id: String,

        #[command(flatten)]
        open: OpenArgs,
    },

    /// Show index schema version and last write time
    Info {
        index: PathBuf,

        #[command(flatten)]
        open: OpenArgs,
    },
}

#[derive(Args)]
struct ManifestArgs {
    index: PathBuf,

    /// Manifest JSON file to read
    manifest: PathBuf,

    /// Path of the manifest relative to the repository root
    relative_path: PathBuf,
}

#[derive(Args)]
struct OpenArgs {
    /// read, readwrite or immutable
    #[arg(long = "open", default_value = "read", value_parser = parse_disposition)]
    disposition: OpenDisposition,
}

#[derive(Clone, Copy, ValueEnum)]
enum MatchArg {
    Exact,
    CaseInsensitive,
    StartsWith,
    Substring,
}

impl From<MatchArg> for MatchType {
    fn from(value: MatchArg) -> Self {
        match value {
            MatchArg::Exact => Self::Exact,
            MatchArg::CaseInsensitive => Self::CaseInsensitive,
            MatchArg::StartsWith => Self::StartsWith,
            MatchArg::Substring => Self::Substring,
        }
    }
}

fn parse_disposition(value: &str) -> Result<OpenDisposition, String> {
    value.parse().map_err(|err| format!("{err}"))
}

fn parse_filter(value: &str) -> Result<PackageMatchFilter, String> {
    let mut parts = value.splitn(3, ':');
    let (Some(field), Some(match_type), Some(text)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(format!("expected FIELD:MATCH:VALUE, got `{value}`"));
    };

    let field = match field.to_ascii_lowercase().as_str() {
        "id" => PackageMatchField::Id,
        "name" => PackageMatchField::Name,
        "moniker" => PackageMatchField::Moniker,
        "tag" => PackageMatchField::Tag,
        "command" => PackageMatchField::Command,
        other => return Err(format!("unknown match field `{other}`")),
    };
    let match_type = MatchArg::from_str(match_type, true)?;

    Ok(PackageMatchFilter::new(field, match_type.into(), text))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Some(log_dir) = &cli.log_dir {
        let mut config = LoggingConfig::new(log_dir);
        if let Some(level) = &cli.log_level {
            config = config.with_level(level);
        }
        init_logging(&config).map_err(anyhow::Error::msg)?;
    }

    match cli.command {
        Commands::Create { index, schema } => {
            let created = ManifestIndex::create_new(&index, schema)
                .with_context(|| format!("failed to create index `{}`", index.display()))?;
            println!(
                "created {} with schema {}",
                index.display(),
                created.version()
            );
        }
        Commands::Add(args) => {
            let mut index = open_for_write(&args.index)?;
            index
                .add_manifest_from_path(&args.manifest, &args.relative_path)
                .with_context(|| format!("failed to add `{}`", args.manifest.display()))?;
            println!("added {}", args.relative_path.display());
        }
        Commands::Update(args) => {
            let mut index = open_for_write(&args.index)?;
            let changed = index
                .update_manifest_from_path(&args.manifest, &args.relative_path)
                .with_context(|| format!("failed to update `{}`", args.manifest.display()))?;
            if changed {
                println!("updated {}", args.relative_path.display());
            } else {
                println!("no change for {}", args.relative_path.display());
            }
        }
        Commands::Remove(args) => {
            let mut index = open_for_write(&args.index)?;
            index
                .remove_manifest_from_path(&args.manifest, &args.relative_path)
                .with_context(|| format!("failed to remove `{}`", args.manifest.display()))?;
            println!("removed {}", args.relative_path.display());
        }
        Commands::Package { index } => {
            let mut opened = open_for_write(&index)?;
            opened
                .prepare_for_packaging()
                .context("failed to prepare index for packaging")?;
            println!("packaged {}", index.display());
        }
        Commands::Search {
            index,
            query,
            match_type,
            filters,
            inclusions,
            limit,
            open,
        } => {
            let opened = open_index(&index, open.disposition)?;
            let request = SearchRequest {
                query: query.map(|value| RequestMatch::new(match_type.into(), value)),
                inclusions,
                filters,
                maximum_results: limit,
            };
            let result = opened.search(&request).context("search failed")?;
            for (id, criterion) in &result.matches {
                let id_string = opened.get_id_string_by_id(*id)?.unwrap_or_default();
                let name = opened.get_name_string_by_id(*id)?.unwrap_or_default();
                match criterion {
                    Some(criterion) => println!(
                        "{id_string}\t{name}\t{}:{}",
                        criterion.field.as_str(),
                        criterion.match_type.as_str()
                    ),
                    None => println!("{id_string}\t{name}"),
                }
            }
            if result.truncated {
                println!("(results truncated at {limit})");
            }
        }
        Commands::Versions { index, id, open } => {
            let opened = open_index(&index, open.disposition)?;
            let package = find_exact_id(&opened, &id)?;
            for entry in opened.get_versions_by_id(package)? {
                let path = opened
                    .get_path_string_by_key(package, &entry.version, &entry.channel)?
                    .unwrap_or_default();
                if entry.channel.is_empty() {
                    println!("{}\t{path}", entry.version);
                } else {
                    println!("{}\t{}\t{path}", entry.version, entry.channel);
                }
            }
        }
        Commands::Info { index, open } => {
            let opened = open_index(&index, open.disposition)?;
            let last_write = opened
                .last_write_time()?
                .duration_since(UNIX_EPOCH)
                .map(|elapsed| elapsed.as_secs())
                .unwrap_or_default();
            println!("schema_version={}", opened.version());
            println!("last_write_unix={last_write}");
        }
    }

    Ok(())
}

fn open_index(path: &Path, disposition: OpenDisposition) -> anyhow::Result<ManifestIndex> {
    info!(
        "event=cli_open module=cli status=start disposition={disposition} path={}",
        path.display()
    );
    ManifestIndex::open(path, disposition)
        .with_context(|| format!("failed to open index `{}`", path.display()))
}

fn open_for_write(path: &Path) -> anyhow::Result<ManifestIndex> {
    open_index(path, OpenDisposition::ReadWrite)
}

fn find_exact_id(index: &ManifestIndex, id: &str) -> anyhow::Result<IdType> {
    let request = SearchRequest {
        query: None,
        inclusions: Vec::new(),
        filters: vec![PackageMatchFilter::new(
            PackageMatchField::Id,
            MatchType::CaseInsensitive,
            id,
        )],
        maximum_results: 1,
    };
    let result = index.search(&request)?;
    match result.matches.first() {
        Some((package, _)) => Ok(*package),
        None => bail!("package `{id}` not found"),
    }
}

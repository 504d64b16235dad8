use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use phototrail::config::Config;
use phototrail::embed::{self, EmbeddingTable, ImageEncoder, Method, Query};
use phototrail::error::Error;
use phototrail::geo::{applicator, grouper, location_map};
use phototrail::logging;
use phototrail::scanner::{self, convention};

#[derive(Parser)]
#[command(
    name = "phototrail",
    version,
    about = "Organize a photo collection: infer GPS/time from place visits, find visually similar shots"
)]
struct Cli {
    /// Path to config file (default: $XDG_CONFIG_HOME/phototrail/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose diagnostics
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Filename extensions to process (repeatable), overriding the config
    #[arg(short = 'e', long = "ext", global = true)]
    extensions: Vec<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Group geotagged photos into place visits and write the location map
    Map {
        /// Directory of geotagged photos
        input: PathBuf,

        /// Output table path (default: configured location map)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Same-place distance threshold in kilometers
        #[arg(long)]
        max_distance_km: Option<f64>,

        /// Same-visit time threshold in seconds
        #[arg(long)]
        max_time_sec: Option<i64>,

        /// Also copy each visit's photos here, prefixed by visit number
        #[arg(long)]
        copy_groups: Option<PathBuf>,
    },

    /// Infer GPS/time for photos lacking them and write stamped copies
    Apply {
        /// Directory of photos to stamp
        input: PathBuf,

        /// Directory for the stamped copies
        output: PathBuf,

        /// Location map to look up (default: configured location map)
        #[arg(short, long)]
        map: Option<PathBuf>,
    },

    /// Stamp capture-convention-named photos with their filename date
    Stamp {
        /// Directory of convention-named photos (IMG-YYYYMMDD-WAnnnn)
        input: PathBuf,

        /// Directory for the stamped copies
        output: PathBuf,
    },

    /// Extract embeddings for every image into the embedding table
    Embed {
        /// Directory of photos to embed
        input: PathBuf,

        /// Embedding table path (default: configured table)
        #[arg(short, long)]
        table: Option<PathBuf>,
    },

    /// Find visually similar photos from the embedding table
    Similar {
        /// Filepath or table index to query
        query: Option<String>,

        /// Update every row's similar-image list instead of querying one
        #[arg(long, conflicts_with = "query")]
        all: bool,

        /// Embedding table path (default: configured table)
        #[arg(short, long)]
        table: Option<PathBuf>,

        /// Maximum number of matches
        #[arg(short = 'n', long)]
        top: Option<usize>,

        /// Minimum similarity in [0, 1]
        #[arg(long)]
        threshold: Option<f32>,

        /// Retrieval method: cosine or nearest-neighbors
        #[arg(long)]
        method: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::init(cli.verbose)?;

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if !cli.extensions.is_empty() {
        config.scanner.image_extensions = cli.extensions.clone();
    }

    match cli.command {
        Command::Map {
            input,
            output,
            max_distance_km,
            max_time_sec,
            copy_groups,
        } => {
            let output = output.unwrap_or_else(|| config.geo.location_map.clone());
            let max_distance_km = max_distance_km.unwrap_or(config.geo.max_distance_km);
            let max_time_sec = max_time_sec.unwrap_or(config.geo.max_time_sec);
            cmd_map(
                &config,
                &input,
                &output,
                max_distance_km,
                max_time_sec,
                copy_groups.as_deref(),
            )
        }
        Command::Apply { input, output, map } => {
            let map = map.unwrap_or_else(|| config.geo.location_map.clone());
            cmd_apply(&config, &input, &output, &map)
        }
        Command::Stamp { input, output } => cmd_stamp(&config, &input, &output),
        Command::Embed { input, table } => {
            let table = table.unwrap_or_else(|| config.similarity.embedding_table.clone());
            cmd_embed(&config, &input, &table)
        }
        Command::Similar {
            query,
            all,
            table,
            top,
            threshold,
            method,
        } => {
            let table = table.unwrap_or_else(|| config.similarity.embedding_table.clone());
            let n = top.unwrap_or(config.similarity.top_n);
            let threshold = threshold.unwrap_or(config.similarity.threshold);
            let method = match method.as_deref() {
                Some(raw) => parse_method(raw)?,
                None => config.similarity.method,
            };
            cmd_similar(query, all, &table, method, n, threshold)
        }
    }
}

fn cmd_map(
    config: &Config,
    input: &Path,
    output: &Path,
    max_distance_km: f64,
    max_time_sec: i64,
    copy_groups: Option<&Path>,
) -> Result<()> {
    let records = scanner::scan_directory(input, &config.scanner.image_extensions)?;
    let total = records.len();

    let grouping = grouper::group_by_visit(
        records,
        max_distance_km,
        max_time_sec,
        config.geo.missing_gps_policy,
    )?;
    for group in &grouping.groups {
        tracing::info!(photos = group.len(), "place visit found");
    }

    if let Some(dir) = copy_groups {
        std::fs::create_dir_all(dir)?;
        for (visit, group) in grouping.groups.iter().enumerate() {
            for record in &group.records {
                let dest = dir.join(format!("{}_{}", visit, record.filename));
                std::fs::copy(record.path(), dest)?;
            }
        }
        println!("Copied grouped photos into {}", dir.display());
    }

    let entries = location_map::summarize(&grouping.groups)?;
    location_map::write_location_map(&entries, output)?;

    println!(
        "Mapped {} photos into {} visits -> {}",
        total,
        entries.len(),
        output.display()
    );
    if !grouping.flagged.is_empty() {
        println!(
            "{} photos without GPS were left out of the grouping (see log)",
            grouping.flagged.len()
        );
    }
    Ok(())
}

fn cmd_apply(config: &Config, input: &Path, output: &Path, map: &Path) -> Result<()> {
    let entries = location_map::read_location_map(map)?;
    let files = scanner::discover_images(input, &config.scanner.image_extensions)?;
    std::fs::create_dir_all(output)?;

    let pattern = convention::capture_pattern(&config.scanner.image_extensions);
    let pb = progress_bar(files.len(), "applying locations");

    let mut applied = 0usize;
    let mut skipped = 0usize;
    for file in &files {
        match applicator::apply_to_photo(file, output, &entries, config.geo.tie_break, &pattern) {
            Ok(result) => {
                tracing::debug!(
                    file = %file.display(),
                    timestamp = %result.timestamp,
                    source = ?result.source,
                    "location applied"
                );
                applied += 1;
            }
            Err(e @ (Error::NoLocationMatch { .. } | Error::CorruptImage { .. })) => {
                tracing::warn!(file = %file.display(), error = %e, "photo skipped");
                skipped += 1;
            }
            Err(e) => return Err(e.into()),
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    println!(
        "Applied locations to {} photos, skipped {}, output in {}",
        applied,
        skipped,
        output.display()
    );
    Ok(())
}

fn cmd_stamp(config: &Config, input: &Path, output: &Path) -> Result<()> {
    let files = scanner::discover_images(input, &config.scanner.image_extensions)?;
    std::fs::create_dir_all(output)?;

    let pattern = convention::capture_pattern(&config.scanner.image_extensions);
    let pb = progress_bar(files.len(), "stamping dates");

    let mut stamped = 0usize;
    let mut skipped = 0usize;
    for file in &files {
        let filename = file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let Some(datetime) = convention::datetime_from_filename(&pattern, &filename) else {
            tracing::warn!(file = %filename, "no capture date in filename");
            skipped += 1;
            pb.inc(1);
            continue;
        };

        match applicator::write_back(file, &output.join(&filename), datetime, None) {
            Ok(()) => {
                tracing::debug!(file = %filename, %datetime, "date stamped");
                stamped += 1;
            }
            Err(e @ Error::CorruptImage { .. }) => {
                tracing::warn!(file = %filename, error = %e, "photo skipped");
                skipped += 1;
            }
            Err(e) => return Err(e.into()),
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    println!(
        "Stamped {} photos, skipped {}, output in {}",
        stamped,
        skipped,
        output.display()
    );
    Ok(())
}

fn cmd_embed(config: &Config, input: &Path, table_path: &Path) -> Result<()> {
    let mut table = EmbeddingTable::load_or_default(table_path)?;
    let before = table.len();

    let encoder = ImageEncoder::new();
    encoder.init()?;

    let files = scanner::discover_images(input, &config.scanner.image_extensions)?;
    let pb = progress_bar(files.len(), "embedding images");

    let mut unreadable = 0usize;
    for file in &files {
        match table.embed_file(&encoder, file) {
            Ok(_) => {}
            Err(e @ Error::CorruptImage { .. }) => {
                tracing::warn!(file = %file.display(), error = %e, "image skipped");
                unreadable += 1;
            }
            Err(e) => return Err(e.into()),
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    table.save(table_path)?;

    println!(
        "Embedded {} new images ({} rows total, {} unreadable) -> {}",
        table.len() - before,
        table.len(),
        unreadable,
        table_path.display()
    );
    Ok(())
}

fn cmd_similar(
    query: Option<String>,
    all: bool,
    table_path: &Path,
    method: Method,
    n: usize,
    threshold: f32,
) -> Result<()> {
    let mut table = EmbeddingTable::load(table_path)?;

    if all {
        embed::update_similar_images(&mut table, method, n, threshold);
        table.save(table_path)?;
        println!(
            "Updated similar-image lists for {} rows (threshold {}) -> {}",
            table.len(),
            threshold,
            table_path.display()
        );
        return Ok(());
    }

    let Some(query) = query else {
        anyhow::bail!("provide a filepath or table index to query, or pass --all");
    };
    let query_ref = match query.parse::<usize>() {
        Ok(index) => Query::Index(index),
        Err(_) => Query::Path(&query),
    };

    let matches = embed::find_similar(&table, query_ref, method, n, threshold)?;
    if matches.is_empty() {
        println!("No matches at or above similarity {threshold}");
        return Ok(());
    }
    for m in &matches {
        println!("{:.4}  {}", m.similarity, m.filepath);
    }
    Ok(())
}

fn parse_method(raw: &str) -> Result<Method> {
    match raw {
        "cosine" => Ok(Method::Cosine),
        "nearest-neighbors" | "nn" => Ok(Method::NearestNeighbors),
        other => anyhow::bail!("unknown method '{other}', expected 'cosine' or 'nearest-neighbors'"),
    }
}

fn progress_bar(len: usize, msg: &'static str) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{bar:40}] {pos}/{len} {msg}")
            .unwrap(),
    );
    pb.set_message(msg);
    pb
}

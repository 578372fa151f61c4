use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;
use tracing::info;

use crate::aggregate::{aggregate, Aggregation};
use crate::config::Config;
use crate::export::{write_column_details_csv, write_profiles_csv};
use crate::loader::FdcExport;
use crate::nutrients::{resolve_nutrients, ExclusionRules, NutrientLookup, TagnameTable};

/// Resolves nutrients and aggregates a loaded export.
pub fn aggregate_export(
    export: &FdcExport,
    lookup: &impl NutrientLookup,
    rules: &ExclusionRules,
) -> Aggregation {
    let nutrients = resolve_nutrients(&export.nutrients, lookup, rules);
    info!(
        resolved = nutrients.len(),
        total = export.nutrients.len(),
        "nutrients resolved"
    );
    aggregate(&export.foods, &export.categories, &nutrients, &export.measurements)
}

/// Loads the configured export and tag table and aggregates them.
pub fn aggregate_assets(config: &Config) -> Result<Aggregation> {
    let export = FdcExport::load(&config.assets_dir)?;
    let lookup = TagnameTable::load(&config.tagnames_csv)?;
    let rules = if config.exclude_derived {
        ExclusionRules::derived_nutrients()?
    } else {
        ExclusionRules::none()
    };
    Ok(aggregate_export(&export, &lookup, &rules))
}

/// Writes `contents` to `path` in one go. Nothing is created when rendering
/// fails, so a partial table never lands on disk.
fn write_rendered(path: &Path, contents: &[u8]) -> Result<()> {
    std::fs::write(path, contents).with_context(|| format!("Failed to write {:?}", path))
}

/// Full offline build: load the export, aggregate, write the index table and
/// (when configured) the column details.
pub fn build(config: &Config) -> Result<Aggregation> {
    let aggregation = aggregate_assets(config)?;

    let mut table = Vec::new();
    write_profiles_csv(&aggregation, &mut table)
        .with_context(|| format!("Failed to render foods for {:?}", config.index_csv))?;
    let details = match &config.columns_csv {
        Some(_) => {
            let mut details = Vec::new();
            write_column_details_csv(&aggregation, &mut details)
                .context("Failed to render column details")?;
            Some(details)
        }
        None => None,
    };

    write_rendered(&config.index_csv, &table)?;
    if let (Some(path), Some(details)) = (&config.columns_csv, details) {
        write_rendered(path, &details)?;
    }

    info!(
        foods = aggregation.profiles.len(),
        output = %config.index_csv.display(),
        "build complete"
    );
    Ok(aggregation)
}

/// Aggregates the export and writes only the column details, to the
/// configured path or else to `out`.
pub fn columns<W: Write>(config: &Config, out: W) -> Result<Aggregation> {
    let aggregation = aggregate_assets(config)?;
    match &config.columns_csv {
        Some(path) => {
            let mut details = Vec::new();
            write_column_details_csv(&aggregation, &mut details)
                .context("Failed to render column details")?;
            write_rendered(path, &details)?;
        }
        None => write_column_details_csv(&aggregation, out).context("Failed to write column details")?,
    }
    info!(columns = aggregation.columns.len(), "column details written");
    Ok(aggregation)
}

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::Config;

#[derive(Parser, Debug)]
#[command(author, version, about = "Aggregate and search USDA Foundation Foods", long_about = None)]
pub struct Cli {
    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Aggregate a FoodData Central export into one row per food
    Build {
        /// Directory containing food.csv, food_category.csv, nutrient.csv, food_nutrient.csv
        #[arg(short, long)]
        assets: Option<PathBuf>,

        /// Nutrient tag table (code,name,synonyms)
        #[arg(short, long)]
        tagnames: Option<PathBuf>,

        /// Output path for the aggregated table
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Also write per-column nutrient details to this path
        #[arg(long)]
        columns: Option<PathBuf>,

        /// Skip derived and legacy nutrients (Atwater energies, ORAC, ...)
        #[arg(long)]
        exclude_derived: bool,
    },
    /// Print the name and unit of every nutrient column a build would write
    Columns {
        /// Directory containing food.csv, food_category.csv, nutrient.csv, food_nutrient.csv
        #[arg(short, long)]
        assets: Option<PathBuf>,

        /// Nutrient tag table (code,name,synonyms)
        #[arg(short, long)]
        tagnames: Option<PathBuf>,

        /// Write the details here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Skip derived and legacy nutrients (Atwater energies, ORAC, ...)
        #[arg(long)]
        exclude_derived: bool,
    },
    /// Find the foods best matching a code, name or category
    Search {
        /// Aggregated table to search
        #[arg(short, long)]
        index: Option<PathBuf>,

        /// Free-text query, e.g. "raw kale"
        #[arg(required = true)]
        query: Vec<String>,
    },
}

impl Command {
    /// Applies the command's flags on top of `base`.
    pub fn config(&self, base: Config) -> Config {
        let mut config = base;
        match self {
            Command::Build {
                assets,
                tagnames,
                output,
                columns,
                exclude_derived,
            } => {
                if let Some(dir) = assets {
                    config.assets_dir = dir.clone();
                }
                if let Some(path) = tagnames {
                    config.tagnames_csv = path.clone();
                }
                if let Some(path) = output {
                    config.index_csv = path.clone();
                }
                config.columns_csv = columns.clone();
                config.exclude_derived = *exclude_derived;
            }
            Command::Columns {
                assets,
                tagnames,
                output,
                exclude_derived,
            } => {
                if let Some(dir) = assets {
                    config.assets_dir = dir.clone();
                }
                if let Some(path) = tagnames {
                    config.tagnames_csv = path.clone();
                }
                config.columns_csv = output.clone();
                config.exclude_derived = *exclude_derived;
            }
            Command::Search { index, .. } => {
                if let Some(path) = index {
                    config.index_csv = path.clone();
                }
            }
        }
        config
    }
}

pub fn parse_args() -> Cli {
    Cli::parse()
}

use std::env;
use std::path::PathBuf;

// Environment variables consulted when a path is not given on the command line.
pub const ASSETS_ENV_VAR: &str = "FOUNDATION_FOODS_ASSETS";
pub const INDEX_ENV_VAR: &str = "FOUNDATION_FOODS_INDEX";
pub const TAGNAMES_ENV_VAR: &str = "FOUNDATION_FOODS_TAGNAMES";

const DEFAULT_ASSETS_DIR: &str = "assets";
const DEFAULT_INDEX_CSV: &str = "index.csv";
const DEFAULT_TAGNAMES_CSV: &str = "tagnames.csv";

/// Paths and switches for a build or search run.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Directory holding `food.csv`, `food_category.csv`, `nutrient.csv` and `food_nutrient.csv`.
    pub assets_dir: PathBuf,
    /// Aggregated table: written by `build`, read by `search`.
    pub index_csv: PathBuf,
    pub tagnames_csv: PathBuf,
    /// Optional column details output.
    pub columns_csv: Option<PathBuf>,
    pub exclude_derived: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            assets_dir: PathBuf::from(DEFAULT_ASSETS_DIR),
            index_csv: PathBuf::from(DEFAULT_INDEX_CSV),
            tagnames_csv: PathBuf::from(DEFAULT_TAGNAMES_CSV),
            columns_csv: None,
            exclude_derived: false,
        }
    }
}

impl Config {
    /// Defaults overridden by any of the `FOUNDATION_FOODS_*` variables that are set.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(dir) = lookup(ASSETS_ENV_VAR) {
            config.assets_dir = PathBuf::from(dir);
        }
        if let Some(path) = lookup(INDEX_ENV_VAR) {
            config.index_csv = PathBuf::from(path);
        }
        if let Some(path) = lookup(TAGNAMES_ENV_VAR) {
            config.tagnames_csv = PathBuf::from(path);
        }
        config
    }
}

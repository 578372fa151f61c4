use anyhow::{Context, Result};
use csv::{ReaderBuilder, Trim};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

pub const FOOD_CSV: &str = "food.csv";
pub const FOOD_CATEGORY_CSV: &str = "food_category.csv";
pub const NUTRIENT_CSV: &str = "nutrient.csv";
pub const FOOD_NUTRIENT_CSV: &str = "food_nutrient.csv";

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("CSV file not found at: {0:?}")]
    NotFound(PathBuf),
    #[error("Failed to open CSV file at {path:?}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to read {label} record at row index {row}")]
    Record {
        label: String,
        row: usize,
        #[source]
        source: csv::Error,
    },
}

/// A row of `food.csv`. Extra columns in the export are ignored.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Food {
    pub fdc_id: String,
    pub description: String,
    #[serde(default)]
    pub food_category_id: String,
}

/// A row of `food_category.csv`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FoodCategory {
    pub id: String,
    pub description: String,
}

/// A row of `nutrient.csv`, before it is resolved against the tag table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NutrientRecord {
    pub id: String,
    pub name: String,
    pub unit_name: String,
}

/// A single lab measurement from `food_nutrient.csv`.
///
/// `amount` is kept as text; the aggregator decides what to do with values
/// that do not parse.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FoodNutrient {
    #[serde(default)]
    pub id: String,
    pub fdc_id: String,
    pub nutrient_id: String,
    #[serde(default)]
    pub amount: String,
}

/// Reads every row of a headered CSV stream, skipping `#` comment lines.
pub fn read_rows<T: DeserializeOwned, R: Read>(reader: R, label: &str) -> Result<Vec<T>, LoadError> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .comment(Some(b'#'))
        .trim(Trim::All)
        .flexible(true)
        .from_reader(reader);

    let mut rows = Vec::new();
    for (row_index, result) in rdr.deserialize().enumerate() {
        let row: T = result.map_err(|source| LoadError::Record {
            label: label.to_string(),
            row: row_index,
            source,
        })?;
        rows.push(row);
    }
    debug!(label, rows = rows.len(), "parsed CSV rows");
    Ok(rows)
}

/// Opens `path` and reads it with [`read_rows`].
pub fn read_rows_from_path<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, LoadError> {
    if !path.exists() {
        return Err(LoadError::NotFound(path.to_path_buf()));
    }
    let file = std::fs::File::open(path).map_err(|source| LoadError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    read_rows(file, &path.display().to_string())
}

/// Loads `food.csv`, keeping file order. Representative ids depend on it.
pub fn load_foods(path: &Path) -> Result<Vec<Food>, LoadError> {
    read_rows_from_path(path)
}

/// Loads `food_category.csv` as a map from category id to its description.
pub fn load_categories(path: &Path) -> Result<HashMap<String, String>, LoadError> {
    let rows: Vec<FoodCategory> = read_rows_from_path(path)?;
    Ok(rows.into_iter().map(|c| (c.id, c.description)).collect())
}

pub fn load_nutrients(path: &Path) -> Result<Vec<NutrientRecord>, LoadError> {
    read_rows_from_path(path)
}

pub fn load_measurements(path: &Path) -> Result<Vec<FoodNutrient>, LoadError> {
    read_rows_from_path(path)
}

/// The four tables of a FoodData Central export directory.
#[derive(Debug, Clone)]
pub struct FdcExport {
    pub foods: Vec<Food>,
    pub categories: HashMap<String, String>,
    pub nutrients: Vec<NutrientRecord>,
    pub measurements: Vec<FoodNutrient>,
}

impl FdcExport {
    pub fn load(dir: &Path) -> Result<Self> {
        let path = |name: &str| -> PathBuf { dir.join(name) };
        info!(dir = %dir.display(), "loading FoodData Central export");

        let foods = load_foods(&path(FOOD_CSV))
            .with_context(|| format!("Failed to load foods from {:?}", dir))?;
        let categories = load_categories(&path(FOOD_CATEGORY_CSV))
            .with_context(|| format!("Failed to load food categories from {:?}", dir))?;
        let nutrients = load_nutrients(&path(NUTRIENT_CSV))
            .with_context(|| format!("Failed to load nutrients from {:?}", dir))?;
        let measurements = load_measurements(&path(FOOD_NUTRIENT_CSV))
            .with_context(|| format!("Failed to load food nutrients from {:?}", dir))?;

        info!(
            foods = foods.len(),
            categories = categories.len(),
            nutrients = nutrients.len(),
            measurements = measurements.len(),
            "export loaded"
        );
        Ok(Self {
            foods,
            categories,
            nutrients,
            measurements,
        })
    }
}

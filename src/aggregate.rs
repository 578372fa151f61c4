//! Merges repeated lab measurements into one nutrient profile per food.
//!
//! Foods are grouped by [`food_key`], so duplicate entries of the same food
//! under different FDC ids collapse into a single row. Every nutrient value is
//! the arithmetic mean of the measurements that resolved to its canonical code,
//! with kilocalorie amounts converted to kilojoules first.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::loader::{Food, FoodNutrient};
use crate::nutrients::NutrientDefinition;

pub const KCAL_TO_KJ: f64 = 4.184;
pub const ENERGY_UNIT: &str = "kJ";
pub const UNKNOWN_CATEGORY: &str = "Unknown";

#[derive(Debug, Error, PartialEq)]
pub enum AggregateError {
    #[error("missing nutrient {code} in food {food_id}")]
    MissingNutrient { code: String, food_id: String },
}

/// Grouping key for a food: lower-cased, whitespace collapsed, trimmed.
pub fn food_key(description: &str) -> String {
    description
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

pub fn is_kilocalorie(unit: &str) -> bool {
    let unit = unit.trim();
    ["kcal", "kilocalorie", "kilocalories"]
        .iter()
        .any(|u| unit.eq_ignore_ascii_case(u))
}

/// Amount in the unit it is stored in; kilocalories become kilojoules.
pub fn normalize_amount(amount: f64, unit: &str) -> f64 {
    if is_kilocalorie(unit) {
        amount * KCAL_TO_KJ
    } else {
        amount
    }
}

pub fn normalized_unit(unit: &str) -> String {
    if is_kilocalorie(unit) {
        ENERGY_UNIT.to_string()
    } else {
        unit.to_string()
    }
}

/// One food with its averaged nutrient values, keyed by canonical code.
///
/// A code that was never measured for this food is absent from `nutrients`;
/// it is never stored as zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodProfile {
    #[serde(skip)]
    pub key: String,
    pub code: String,
    pub name: String,
    pub category: String,
    #[serde(flatten)]
    pub nutrients: BTreeMap<String, f64>,
}

impl FoodProfile {
    pub fn new(code: impl Into<String>, name: impl Into<String>, category: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            key: food_key(&name),
            code: code.into(),
            name,
            category: category.into(),
            nutrients: BTreeMap::new(),
        }
    }

    pub fn get(&self, code: &str) -> Option<f64> {
        self.nutrients.get(code).copied()
    }

    /// Value for `code`, failing when no measurement contributed to it.
    pub fn nutrient(&self, code: &str) -> Result<f64, AggregateError> {
        self.get(code).ok_or_else(|| AggregateError::MissingNutrient {
            code: code.to_string(),
            food_id: self.code.clone(),
        })
    }
}

/// Display metadata for one output column, taken from the first nutrient
/// resolved to its code.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnDetail {
    pub code: String,
    pub name: String,
    pub alt_name: String,
    pub unit_name: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregationStats {
    pub measurements: usize,
    pub accumulated: usize,
    pub unknown_food: usize,
    pub unknown_nutrient: usize,
    pub invalid_amount: usize,
}

/// Result of a full aggregation run.
///
/// Rows follow the first-encounter order of their food keys, and `columns`
/// the first-encounter order of nutrient codes.
#[derive(Debug, Clone, Default)]
pub struct Aggregation {
    pub profiles: Vec<FoodProfile>,
    pub columns: Vec<String>,
    pub column_details: Vec<ColumnDetail>,
    pub stats: AggregationStats,
}

impl Aggregation {
    pub fn profile(&self, key: &str) -> Option<&FoodProfile> {
        self.profiles.iter().find(|p| p.key == key)
    }
}

#[derive(Debug)]
struct Accumulator {
    profile: FoodProfile,
    sums: HashMap<String, f64>,
    counts: HashMap<String, u32>,
}

pub struct Aggregator<'a> {
    foods: HashMap<&'a str, &'a Food>,
    representatives: HashMap<String, &'a Food>,
    categories: &'a HashMap<String, String>,
    nutrients: &'a HashMap<String, NutrientDefinition>,
    rows: Vec<Accumulator>,
    row_index: HashMap<String, usize>,
    columns: Vec<String>,
    column_details: HashMap<String, ColumnDetail>,
    stats: AggregationStats,
}

impl<'a> Aggregator<'a> {
    /// Representative of each food key is its first food in `foods` order.
    pub fn new(
        foods: &'a [Food],
        categories: &'a HashMap<String, String>,
        nutrients: &'a HashMap<String, NutrientDefinition>,
    ) -> Self {
        let mut by_id = HashMap::with_capacity(foods.len());
        let mut representatives = HashMap::new();
        for food in foods {
            by_id.insert(food.fdc_id.as_str(), food);
            representatives.entry(food_key(&food.description)).or_insert(food);
        }
        Self {
            foods: by_id,
            representatives,
            categories,
            nutrients,
            rows: Vec::new(),
            row_index: HashMap::new(),
            columns: Vec::new(),
            column_details: HashMap::new(),
            stats: AggregationStats::default(),
        }
    }

    pub fn add(&mut self, measurement: &FoodNutrient) {
        self.stats.measurements += 1;

        let Some(food) = self.foods.get(measurement.fdc_id.as_str()).copied() else {
            warn!(fdc_id = %measurement.fdc_id, "food not found in food map");
            self.stats.unknown_food += 1;
            return;
        };
        let nutrients = self.nutrients;
        let Some(nutrient) = nutrients.get(&measurement.nutrient_id) else {
            warn!(nutrient_id = %measurement.nutrient_id, "nutrient not found in nutrient map");
            self.stats.unknown_nutrient += 1;
            return;
        };
        let amount = match measurement.amount.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => v,
            _ => {
                warn!(
                    fdc_id = %measurement.fdc_id,
                    nutrient_id = %measurement.nutrient_id,
                    amount = %measurement.amount,
                    "unparsable amount, skipping measurement"
                );
                self.stats.invalid_amount += 1;
                return;
            }
        };

        let key = food_key(&food.description);
        let row = match self.row_index.get(&key) {
            Some(&idx) => idx,
            None => {
                let representative = self.representatives.get(&key).copied().unwrap_or(food);
                let category = self
                    .categories
                    .get(&representative.food_category_id)
                    .cloned()
                    .unwrap_or_else(|| UNKNOWN_CATEGORY.to_string());
                let profile = FoodProfile::new(
                    representative.fdc_id.clone(),
                    representative.description.clone(),
                    category,
                );
                debug!(key = %key, fdc_id = %representative.fdc_id, "new food row");
                self.rows.push(Accumulator {
                    profile,
                    sums: HashMap::new(),
                    counts: HashMap::new(),
                });
                self.row_index.insert(key, self.rows.len() - 1);
                self.rows.len() - 1
            }
        };

        let code = &nutrient.code;
        let acc = &mut self.rows[row];
        *acc.sums.entry(code.clone()).or_insert(0.0) += normalize_amount(amount, &nutrient.unit_name);
        *acc.counts.entry(code.clone()).or_insert(0) += 1;
        self.stats.accumulated += 1;

        if !self.column_details.contains_key(code) {
            let label = nutrients.get(&nutrient.column_label_id).unwrap_or(nutrient);
            self.columns.push(code.clone());
            self.column_details.insert(
                code.clone(),
                ColumnDetail {
                    code: code.clone(),
                    name: label.name.clone(),
                    alt_name: label.alt_name.clone(),
                    unit_name: normalized_unit(&label.unit_name),
                },
            );
        }
    }

    pub fn finish(self) -> Aggregation {
        let Self {
            rows,
            columns,
            mut column_details,
            stats,
            ..
        } = self;

        let profiles = rows
            .into_iter()
            .map(|acc| {
                let mut profile = acc.profile;
                for (code, sum) in acc.sums {
                    match acc.counts.get(&code) {
                        Some(&count) if count > 0 => {
                            profile.nutrients.insert(code, sum / f64::from(count));
                        }
                        _ => {}
                    }
                }
                profile
            })
            .collect::<Vec<_>>();
        let column_details = columns
            .iter()
            .filter_map(|code| column_details.remove(code))
            .collect();

        info!(
            foods = profiles.len(),
            columns = columns.len(),
            accumulated = stats.accumulated,
            skipped = stats.measurements - stats.accumulated,
            "aggregation finished"
        );
        Aggregation {
            profiles,
            columns,
            column_details,
            stats,
        }
    }
}

/// Runs [`Aggregator`] over every measurement.
pub fn aggregate<'a>(
    foods: &'a [Food],
    categories: &'a HashMap<String, String>,
    nutrients: &'a HashMap<String, NutrientDefinition>,
    measurements: impl IntoIterator<Item = &'a FoodNutrient>,
) -> Aggregation {
    let mut aggregator = Aggregator::new(foods, categories, nutrients);
    for measurement in measurements {
        aggregator.add(measurement);
    }
    aggregator.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn food(id: &str, description: &str, category: &str) -> Food {
        Food {
            fdc_id: id.into(),
            description: description.into(),
            food_category_id: category.into(),
        }
    }

    fn definition(id: &str, code: &str, unit: &str) -> NutrientDefinition {
        NutrientDefinition {
            nutrient_id: id.into(),
            code: code.into(),
            name: format!("{} name", code),
            alt_name: format!("{} standard", code),
            unit_name: unit.into(),
            synonyms: String::new(),
            column_label_id: id.into(),
        }
    }

    fn measurement(fdc_id: &str, nutrient_id: &str, amount: &str) -> FoodNutrient {
        FoodNutrient {
            id: String::new(),
            fdc_id: fdc_id.into(),
            nutrient_id: nutrient_id.into(),
            amount: amount.into(),
        }
    }

    fn fixtures() -> (Vec<Food>, HashMap<String, String>, HashMap<String, NutrientDefinition>) {
        let foods = vec![
            food("323505", "Kale, raw", "11"),
            food("321358", "Hummus, commercial", "16"),
            food("330000", "  kale,   RAW ", "11"),
            food("340000", "Mystery food", "99"),
        ];
        let categories = HashMap::from([
            ("11".to_string(), "Vegetables and Vegetable Products".to_string()),
            ("16".to_string(), "Legumes and Legume Products".to_string()),
        ]);
        let nutrients = HashMap::from([
            ("1003".to_string(), definition("1003", "procnt", "G")),
            ("1008".to_string(), definition("1008", "enerc", "KCAL")),
            ("1062".to_string(), definition("1062", "enerc", "kJ")),
        ]);
        (foods, categories, nutrients)
    }

    #[test]
    fn test_food_key_normalizes() {
        assert_eq!(food_key("  Kale,\t RAW  "), "kale, raw");
        assert_eq!(food_key("Cheese, swiss"), food_key("cheese,  Swiss"));
    }

    #[test]
    fn test_duplicate_names_merge_into_one_row() {
        let (foods, categories, nutrients) = fixtures();
        let measurements = vec![
            measurement("323505", "1003", "2.0"),
            measurement("330000", "1003", "3.0"),
            measurement("321358", "1003", "7.8"),
        ];
        let result = aggregate(&foods, &categories, &nutrients, &measurements);

        assert_eq!(result.profiles.len(), 2);
        let kale = result.profile("kale, raw").unwrap();
        assert_eq!(kale.code, "323505");
        assert_eq!(kale.name, "Kale, raw");
        assert_eq!(kale.category, "Vegetables and Vegetable Products");
        assert!((kale.nutrient("procnt").unwrap() - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_representative_is_first_food_even_if_measured_later() {
        let (foods, categories, nutrients) = fixtures();
        let measurements = vec![measurement("330000", "1003", "3.0")];
        let result = aggregate(&foods, &categories, &nutrients, &measurements);
        assert_eq!(result.profiles[0].code, "323505");
        assert_eq!(result.profiles[0].name, "Kale, raw");
    }

    #[test]
    fn test_energy_is_converted_to_kilojoules() {
        let (foods, categories, nutrients) = fixtures();
        let measurements = vec![
            measurement("323505", "1008", "100"),
            measurement("323505", "1062", "200"),
        ];
        let result = aggregate(&foods, &categories, &nutrients, &measurements);
        let kale = &result.profiles[0];
        let expected = (100.0 * KCAL_TO_KJ + 200.0) / 2.0;
        assert!((kale.nutrient("enerc").unwrap() - expected).abs() < 1e-9);

        assert_eq!(result.column_details.len(), 1);
        assert_eq!(result.column_details[0].unit_name, ENERGY_UNIT);
        assert_eq!(result.column_details[0].name, "enerc name");
    }

    #[test]
    fn test_unknown_nutrient_and_food_are_skipped() {
        let (foods, categories, nutrients) = fixtures();
        let measurements = vec![
            measurement("323505", "4242", "1.0"),
            measurement("000000", "1003", "1.0"),
            measurement("323505", "1003", "n/a"),
            measurement("323505", "1003", "4.0"),
        ];
        let result = aggregate(&foods, &categories, &nutrients, &measurements);
        assert_eq!(result.stats.unknown_nutrient, 1);
        assert_eq!(result.stats.unknown_food, 1);
        assert_eq!(result.stats.invalid_amount, 1);
        assert_eq!(result.stats.accumulated, 1);
        assert_eq!(result.profiles[0].get("procnt"), Some(4.0));
    }

    #[test]
    fn test_unknown_category_defaults() {
        let (foods, categories, nutrients) = fixtures();
        let measurements = vec![measurement("340000", "1003", "1.0")];
        let result = aggregate(&foods, &categories, &nutrients, &measurements);
        assert_eq!(result.profiles[0].category, UNKNOWN_CATEGORY);
    }

    #[test]
    fn test_unmeasured_code_is_an_error_not_zero() {
        let (foods, categories, nutrients) = fixtures();
        let measurements = vec![
            measurement("323505", "1003", "0"),
            measurement("321358", "1008", "166"),
        ];
        let result = aggregate(&foods, &categories, &nutrients, &measurements);
        let kale = result.profile("kale, raw").unwrap();
        assert_eq!(kale.nutrient("procnt"), Ok(0.0));
        assert_eq!(
            kale.nutrient("enerc"),
            Err(AggregateError::MissingNutrient {
                code: "enerc".into(),
                food_id: "323505".into(),
            })
        );
    }

    #[test]
    fn test_columns_follow_encounter_order() {
        let (foods, categories, nutrients) = fixtures();
        let measurements = vec![
            measurement("321358", "1062", "10"),
            measurement("323505", "1003", "1"),
            measurement("323505", "1008", "1"),
        ];
        let result = aggregate(&foods, &categories, &nutrients, &measurements);
        assert_eq!(result.columns, vec!["enerc".to_string(), "procnt".to_string()]);
        assert_eq!(result.profiles[0].code, "321358");
    }

    #[test]
    fn test_random_measurements_average_per_key() {
        let (foods, categories, nutrients) = fixtures();
        let ids = ["323505", "330000", "321358"];
        let nutrient_ids = ["1003", "1008", "1062", "7777"];
        let mut rng = StdRng::seed_from_u64(7);

        let measurements: Vec<FoodNutrient> = (0..500)
            .map(|_| {
                let fdc_id = ids[rng.gen_range(0..ids.len())];
                let nutrient_id = nutrient_ids[rng.gen_range(0..nutrient_ids.len())];
                let amount: f64 = rng.gen_range(0.0..500.0);
                measurement(fdc_id, nutrient_id, &amount.to_string())
            })
            .collect();

        let mut expected: HashMap<(String, String), (f64, u32)> = HashMap::new();
        for m in &measurements {
            let Some(def) = nutrients.get(&m.nutrient_id) else { continue };
            let description = &foods.iter().find(|f| f.fdc_id == m.fdc_id).unwrap().description;
            let amount: f64 = m.amount.parse().unwrap();
            let entry = expected
                .entry((food_key(description), def.code.clone()))
                .or_insert((0.0, 0));
            entry.0 += normalize_amount(amount, &def.unit_name);
            entry.1 += 1;
        }

        let result = aggregate(&foods, &categories, &nutrients, &measurements);
        assert_eq!(result.profiles.len(), 2);
        for ((key, code), (sum, count)) in expected {
            let profile = result.profile(&key).unwrap();
            let mean = profile.nutrient(&code).unwrap();
            assert!((mean - sum / f64::from(count)).abs() < 1e-9, "{} {}", key, code);
        }
    }

    #[test]
    fn test_column_label_follows_first_resolved_nutrient() {
        use crate::loader::NutrientRecord;
        use crate::nutrients::{resolve_nutrients, ExclusionRules, NutrientTag, TagnameTable};

        let table = TagnameTable::from_tags(vec![NutrientTag {
            code: "fat".into(),
            name: "Fat, total".into(),
            synonyms: "total lipid (fat);total fat (nlea)".into(),
        }]);
        let rows = vec![
            NutrientRecord {
                id: "1004".into(),
                name: "Total lipid (fat)".into(),
                unit_name: "G".into(),
            },
            NutrientRecord {
                id: "1085".into(),
                name: "Total fat (NLEA)".into(),
                unit_name: "G".into(),
            },
        ];
        let nutrients = resolve_nutrients(&rows, &table, &ExclusionRules::none());
        let (foods, categories, _) = fixtures();
        let measurements = vec![
            measurement("323505", "1085", "1.2"),
            measurement("323505", "1004", "1.5"),
        ];
        let result = aggregate(&foods, &categories, &nutrients, &measurements);

        assert_eq!(result.columns, vec!["fat".to_string()]);
        assert_eq!(result.column_details[0].name, "Total lipid (fat)");
        assert_eq!(result.column_details[0].alt_name, "Fat, total");
        assert!((result.profiles[0].nutrient("fat").unwrap() - 1.35).abs() < 1e-12);
    }

    #[test]
    fn test_aggregation_is_deterministic() {
        let (foods, categories, nutrients) = fixtures();
        let measurements = vec![
            measurement("330000", "1008", "30"),
            measurement("321358", "1003", "7.8"),
            measurement("323505", "1062", "120"),
        ];
        let a = aggregate(&foods, &categories, &nutrients, &measurements);
        let b = aggregate(&foods, &categories, &nutrients, &measurements);
        assert_eq!(a.profiles, b.profiles);
        assert_eq!(a.columns, b.columns);
        assert_eq!(a.column_details, b.column_details);
    }
}

//! Resolution of source nutrient names to canonical tag codes.
//!
//! The tag table itself (INFOODS-style tagnames) is an external collaborator:
//! anything implementing [`NutrientLookup`] can stand in for it. [`TagnameTable`]
//! is the CSV-backed implementation used by the command line.

use anyhow::{Context, Result};
use regex::RegexSet;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use tracing::{debug, warn};

use crate::loader::{read_rows, NutrientRecord};

/// Best match returned by a nutrient lookup.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NutrientTag {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub synonyms: String,
}

/// Given a free-text nutrient name, return zero or one canonical tag.
pub trait NutrientLookup {
    fn lookup(&self, name: &str) -> Option<NutrientTag>;
}

/// A nutrient from `nutrient.csv` joined with its canonical tag.
///
/// `column_label_id` is the first resolved nutrient claiming the same code;
/// its names and unit label the output column.
#[derive(Debug, Clone, PartialEq)]
pub struct NutrientDefinition {
    pub nutrient_id: String,
    pub code: String,
    pub name: String,
    pub alt_name: String,
    pub unit_name: String,
    pub synonyms: String,
    pub column_label_id: String,
}

fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// In-memory tag table keyed by normalized standard name and synonyms.
///
/// Synonyms are `;` separated. When two tags claim the same name the first
/// row of the table wins.
#[derive(Debug, Default, Clone)]
pub struct TagnameTable {
    tags: Vec<NutrientTag>,
    by_name: HashMap<String, usize>,
}

impl TagnameTable {
    pub fn from_tags(tags: impl IntoIterator<Item = NutrientTag>) -> Self {
        let mut table = Self::default();
        for tag in tags {
            let idx = table.tags.len();
            let names = std::iter::once(tag.name.as_str())
                .chain(tag.synonyms.split(';'))
                .map(normalize_name)
                .filter(|n| !n.is_empty())
                .collect::<Vec<_>>();
            for name in names {
                table.by_name.entry(name).or_insert(idx);
            }
            table.tags.push(tag);
        }
        table
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let tags: Vec<NutrientTag> = read_rows(reader, "tagnames")?;
        Ok(Self::from_tags(tags))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open tagname table at {:?}", path))?;
        let table = Self::from_reader(file)
            .with_context(|| format!("Failed to parse tagname table at {:?}", path))?;
        debug!(tags = table.len(), "tagname table loaded");
        Ok(table)
    }

    pub fn tags(&self) -> &[NutrientTag] {
        &self.tags
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

impl NutrientLookup for TagnameTable {
    fn lookup(&self, name: &str) -> Option<NutrientTag> {
        self.by_name
            .get(&normalize_name(name))
            .and_then(|&idx| self.tags.get(idx))
            .cloned()
    }
}

// Derived, legacy or composite nutrients that have no stable tag of their own.
const DERIVED_NUTRIENT_PATTERNS: &[&str] = &[
    r"do not use",
    r"atwater",
    r"specific gravity",
    r"non-fat",
    r"solids, soluble",
    r"carbohydrate, other",
    r"lutein\s*[+/]\s*zeaxanthin",
    r"vitamin a, re",
    r"folate, not 5-mthf",
    r"cysteine and methionine",
    r"phenylalanine and tyrosine",
    r"fatty acids, other than",
    r"fatty acids, total.*(nlea|enoic)",
    r"^orac",
    r"^proanthocyanidin",
    r"^proximate",
];

/// Case-insensitive name patterns for nutrients to leave out of resolution.
#[derive(Debug, Clone)]
pub struct ExclusionRules {
    patterns: Option<RegexSet>,
}

impl ExclusionRules {
    pub fn none() -> Self {
        Self { patterns: None }
    }

    pub fn derived_nutrients() -> Result<Self> {
        Self::from_patterns(DERIVED_NUTRIENT_PATTERNS)
    }

    pub fn from_patterns(patterns: &[&str]) -> Result<Self> {
        let set = RegexSet::new(patterns.iter().map(|p| format!("(?i){}", p)))
            .context("Invalid nutrient exclusion pattern")?;
        Ok(Self {
            patterns: Some(set),
        })
    }

    pub fn is_excluded(&self, name: &str) -> bool {
        self.patterns
            .as_ref()
            .map(|set| set.is_match(name))
            .unwrap_or(false)
    }
}

impl Default for ExclusionRules {
    fn default() -> Self {
        Self::none()
    }
}

/// Joins nutrient rows with their canonical tags.
///
/// Nutrients without a tag are dropped with a warning; their measurements are
/// later skipped by the aggregator. A canonical code claimed by two different
/// source names is reported, and both nutrients keep feeding that code under
/// the first-seen nutrient's column label.
pub fn resolve_nutrients(
    rows: &[NutrientRecord],
    lookup: &impl NutrientLookup,
    rules: &ExclusionRules,
) -> HashMap<String, NutrientDefinition> {
    let mut resolved = HashMap::with_capacity(rows.len());
    // code -> (nutrient id, name) of its first resolved nutrient
    let mut first_for_code: HashMap<String, (String, String)> = HashMap::new();

    for row in rows {
        if rules.is_excluded(&row.name) {
            debug!(nutrient_id = %row.id, name = %row.name, "nutrient excluded");
            continue;
        }
        let Some(tag) = lookup.lookup(&row.name) else {
            warn!(nutrient_id = %row.id, name = %row.name, "no tagname found for nutrient");
            continue;
        };
        let (first_id, first_name) = &*first_for_code
            .entry(tag.code.clone())
            .or_insert_with(|| (row.id.clone(), row.name.clone()));
        if first_name != &row.name {
            warn!(
                code = %tag.code,
                first = %first_name,
                duplicate = %row.name,
                "duplicate nutrient code, keeping first-seen column details"
            );
        }
        let column_label_id = first_id.clone();
        resolved.insert(
            row.id.clone(),
            NutrientDefinition {
                nutrient_id: row.id.clone(),
                code: tag.code,
                name: row.name.clone(),
                alt_name: tag.name,
                unit_name: row.unit_name.clone(),
                synonyms: tag.synonyms,
                column_label_id,
            },
        );
    }
    resolved
}

use anyhow::{Context, Result};
use csv::{ReaderBuilder, Trim};
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

use crate::aggregate::{food_key, FoodProfile};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    Code,
    Name,
    Category,
    Nutrient,
}

/// Column name is whatever follows the last `;` of a header cell.
fn column_name(header: &str) -> &str {
    header.rsplit(';').next().unwrap_or(header).trim()
}

fn classify(name: &str) -> Column {
    match name {
        "code" | "fdc_id" => Column::Code,
        "name" | "description" => Column::Name,
        "category" | "food_category" => Column::Category,
        _ => Column::Nutrient,
    }
}

/// Reads an aggregated foods table. Empty or non-numeric nutrient cells are
/// left absent from the profile.
pub fn read_corpus<R: Read>(reader: R) -> Result<Vec<FoodProfile>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .comment(Some(b'#'))
        .trim(Trim::All)
        .from_reader(reader);

    let columns: Vec<(Column, String)> = rdr
        .headers()
        .context("Failed to read corpus header")?
        .iter()
        .map(|h| {
            let name = column_name(h).to_string();
            (classify(&name), name)
        })
        .collect();
    if !columns.iter().any(|(c, _)| *c == Column::Code) {
        return Err(anyhow::anyhow!("Column 'code' not found in corpus header"));
    }

    let mut profiles = Vec::new();
    for (row_index, result) in rdr.records().enumerate() {
        let record = result.with_context(|| format!("Failed to read corpus record at row index {}", row_index))?;
        let mut profile = FoodProfile::new("", "", "");
        for ((column, name), value) in columns.iter().zip(record.iter()) {
            match column {
                Column::Code => profile.code = value.to_string(),
                Column::Name => profile.name = value.to_string(),
                Column::Category => profile.category = value.to_string(),
                Column::Nutrient => match value.parse::<f64>() {
                    Ok(v) => {
                        profile.nutrients.insert(name.clone(), v);
                    }
                    Err(_) if value.is_empty() => {}
                    Err(_) => warn!(row_index, column = %name, value, "non-numeric nutrient value ignored"),
                },
            }
        }
        if profile.code.is_empty() {
            warn!(row_index, "corpus row without code skipped");
            continue;
        }
        profile.key = food_key(&profile.name);
        profiles.push(profile);
    }
    Ok(profiles)
}

pub fn load_corpus(path: &Path) -> Result<Vec<FoodProfile>> {
    if !path.exists() {
        return Err(anyhow::anyhow!("Foundation foods CSV not found at: {:?}", path));
    }
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open foundation foods CSV at {:?}", path))?;
    let profiles = read_corpus(file).with_context(|| format!("Failed to load corpus from {:?}", path))?;
    info!(path = %path.display(), records = profiles.len(), "corpus loaded");
    Ok(profiles)
}

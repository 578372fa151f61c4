use std::io::Write;
use thiserror::Error;
use tracing::info;

use crate::aggregate::{AggregateError, Aggregation, FoodProfile};

pub const TEXT_COLUMNS: [&str; 3] = ["code", "name", "category"];

#[derive(Debug, Error)]
pub enum ExportError {
    #[error(transparent)]
    Aggregate(#[from] AggregateError),
    #[error("failed to write output: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to write CSV: {0}")]
    Csv(#[from] csv::Error),
}

fn quoted(text: &str) -> String {
    format!("\"{}\"", text.replace('"', "\"\""))
}

/// Renders one output row. Every column must have been measured for the food.
fn render_row(profile: &FoodProfile, columns: &[String]) -> Result<String, AggregateError> {
    let mut fields = Vec::with_capacity(columns.len() + TEXT_COLUMNS.len());
    fields.push(quoted(&profile.code));
    fields.push(quoted(&profile.name));
    fields.push(quoted(&profile.category));
    for code in columns {
        fields.push(profile.nutrient(code)?.to_string());
    }
    Ok(fields.join(","))
}

/// Writes the aggregated table: `code,name,category` then one column per
/// observed nutrient code, in encounter order.
///
/// Text columns are quoted, numbers are not. A food lacking a measurement for
/// any column stops the write before that row is emitted.
pub fn write_profiles_csv<W: Write>(aggregation: &Aggregation, mut writer: W) -> Result<(), ExportError> {
    let header = TEXT_COLUMNS
        .iter()
        .map(|c| c.to_string())
        .chain(aggregation.columns.iter().cloned())
        .collect::<Vec<_>>()
        .join(",");
    writeln!(writer, "{}", header)?;

    for profile in &aggregation.profiles {
        let row = render_row(profile, &aggregation.columns)?;
        writeln!(writer, "{}", row)?;
    }
    writer.flush()?;
    info!(rows = aggregation.profiles.len(), columns = aggregation.columns.len(), "profiles written");
    Ok(())
}

/// Writes one row per nutrient column with its names and normalized unit.
pub fn write_column_details_csv<W: Write>(aggregation: &Aggregation, writer: W) -> Result<(), ExportError> {
    let mut wtr = csv::Writer::from_writer(writer);
    for detail in &aggregation.column_details {
        wtr.serialize(detail)?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::ColumnDetail;

    fn profile(code: &str, name: &str, values: &[(&str, f64)]) -> FoodProfile {
        let mut p = FoodProfile::new(code, name, "Dairy and Egg Products");
        for (k, v) in values {
            p.nutrients.insert(k.to_string(), *v);
        }
        p
    }

    fn aggregation(profiles: Vec<FoodProfile>) -> Aggregation {
        Aggregation {
            profiles,
            columns: vec!["procnt".into(), "enerc".into()],
            column_details: vec![ColumnDetail {
                code: "enerc".into(),
                name: "Energy".into(),
                alt_name: "energy, total metabolizable".into(),
                unit_name: "kJ".into(),
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_text_columns_quoted_numbers_bare() {
        let agg = aggregation(vec![profile(
            "746767",
            "Cheese, swiss",
            &[("procnt", 27.0), ("enerc", 1644.5)],
        )]);
        let mut out = Vec::new();
        write_profiles_csv(&agg, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "code,name,category,procnt,enerc\n\"746767\",\"Cheese, swiss\",\"Dairy and Egg Products\",27,1644.5\n"
        );
    }

    #[test]
    fn test_embedded_quotes_are_escaped() {
        assert_eq!(quoted("6\" sub"), "\"6\"\" sub\"");
    }

    #[test]
    fn test_missing_measurement_stops_write() {
        let agg = aggregation(vec![
            profile("1", "Milk, whole", &[("procnt", 3.3), ("enerc", 255.0)]),
            profile("2", "Cheese, ricotta", &[("procnt", 11.0)]),
        ]);
        let mut out = Vec::new();
        let err = write_profiles_csv(&agg, &mut out).unwrap_err();
        match err {
            ExportError::Aggregate(AggregateError::MissingNutrient { code, food_id }) => {
                assert_eq!(code, "enerc");
                assert_eq!(food_id, "2");
            }
            other => panic!("unexpected error: {other}"),
        }
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Milk, whole"));
        assert!(!text.contains("ricotta"));
    }

    #[test]
    fn test_column_details_csv() {
        let agg = aggregation(Vec::new());
        let mut out = Vec::new();
        write_column_details_csv(&agg, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "code,name,alt_name,unit_name\nenerc,Energy,\"energy, total metabolizable\",kJ\n"
        );
    }
}

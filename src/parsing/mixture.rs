
use anyhow::{Context, ensure};
use log::{info, warn};
use std::path::Path;

use crate::parsing::noodles_helper::open_text_file;
use crate::reference_catalog::CatalogBuilder;

/// Parses a concentration cell; anything that is not a number becomes NaN so the builder skips it
fn parse_concentration(value: &str) -> f64 {
    value.trim().parse::<f64>().unwrap_or(f64::NAN)
}

/// Loads a mixture table into the catalog builder, returns the mixture labels found in the header.
/// The table is comma-separated with a header: identifier, length, then one concentration column per mixture.
/// # Arguments
/// * `filename` - the mixture CSV(.gz) file
/// * `builder` - receives one concentration per identifier and mixture
/// # Errors
/// * if the header has fewer than 3 columns
/// * if a length is 0
pub fn load_mixture(filename: &Path, builder: &mut CatalogBuilder) -> anyhow::Result<Vec<String>> {
    let reader = open_text_file(filename)?;
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = csv_reader.headers()
        .with_context(|| format!("Error while reading header of {filename:?}:"))?
        .clone();
    ensure!(headers.len() >= 3, "Mixture file {filename:?} needs an identifier, a length, and at least one mixture column");
    let labels: Vec<String> = headers.iter().skip(2).map(|h| h.to_string()).collect();

    let mut num_rows = 0;
    let mut num_skipped = 0;
    for result in csv_reader.records() {
        let record = result
            .with_context(|| format!("Error while reading {filename:?}:"))?;
        let id = record.get(0).unwrap_or_default();
        if id.is_empty() {
            continue;
        }
        let length = match record.get(1) {
            Some(value) if !value.is_empty() => match value.parse::<u64>() {
                Ok(length) => Some(length),
                Err(_) => {
                    warn!("Ignoring unparseable length {value:?} for {id}");
                    None
                }
            },
            _ => None
        };

        for (column, label) in labels.iter().enumerate() {
            let concentration = parse_concentration(record.get(column + 2).unwrap_or_default());
            let stored = builder.add_mixture(id, length, concentration, label)
                .with_context(|| format!("Error while adding mixture from {filename:?}:"))?;
            if !stored {
                num_skipped += 1;
            }
        }
        num_rows += 1;
    }

    info!("Loaded {num_rows} mixture rows across {} mixture(s) from {filename:?}", labels.len());
    if num_skipped > 0 {
        warn!("Skipped {num_skipped} missing or non-numeric concentrations");
    }
    Ok(labels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_parse_concentration() {
        assert_eq!(parse_concentration(" 1.5 "), 1.5);
        assert!(parse_concentration("NaN").is_nan());
        assert!(parse_concentration("").is_nan());
        assert!(parse_concentration("n/a").is_nan());
    }

    #[test]
    fn test_load_mixture() {
        let mut builder = CatalogBuilder::new();
        let labels = load_mixture(&PathBuf::from("./test_data/mixture.csv"), &mut builder).unwrap();
        assert_eq!(labels, vec!["A".to_string(), "B".to_string()]);

        load_annotation_for_test(&mut builder);
        let catalog = builder.finalize().unwrap();
        // G3 has no annotation and is dropped
        assert!(catalog.get("G3").is_none());
        let g1 = catalog.get("G1").unwrap();
        assert_eq!(g1.concentration("A"), Some(1.0));
        assert_eq!(g1.concentration("B"), Some(2.0));
        // NaN in mixture B is skipped
        let g2 = catalog.get("G2").unwrap();
        assert_eq!(g2.concentration("A"), Some(4.0));
        assert_eq!(g2.concentration("B"), None);
    }

    fn load_annotation_for_test(builder: &mut CatalogBuilder) {
        builder.add_annotation("G1", "chrIS", 1, 1000, None, None).unwrap();
        builder.add_annotation("G2", "chrIS", 2001, 3000, None, None).unwrap();
    }

    #[test]
    fn test_zero_length() {
        let mut builder = CatalogBuilder::new();
        assert!(load_mixture(&PathBuf::from("./test_data/mixture_zero_length.csv"), &mut builder).is_err());
    }
}

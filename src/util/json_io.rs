
use anyhow::Context;
use std::io::{BufWriter, Write};
use std::fs::File;
use std::path::Path;

/// True if the path should be written through gzip
fn is_gzipped(filename: &Path) -> bool {
    filename.extension().unwrap_or_default() == "gz"
}

/// This will save settings or a report to pretty-printed JSON.
/// # Arguments
/// * `data` - the data in memory
/// * `out_filename` - user provided path to write to, gzip compressed if it ends in ".gz"
/// # Errors
/// * if opening or writing to the file throw errors
/// * if JSON serialization throws errors
pub fn save_json<T: serde::Serialize>(data: &T, out_filename: &Path) -> anyhow::Result<()> {
    let file = File::create(out_filename)
        .with_context(|| format!("Error while creating {out_filename:?}:"))?;
    let file: Box<dyn std::io::Write> = if is_gzipped(out_filename) {
        Box::new(flate2::write::GzEncoder::new(file, flate2::Compression::best()))
    } else {
        Box::new(file)
    };
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, data)
        .with_context(|| format!("Error while serializing {out_filename:?}:"))?;
    writer.flush()
        .with_context(|| format!("Error while flushing output to {out_filename:?}:"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_types::confusion::ConfusionCounter;

    #[test]
    fn test_gzip_json() {
        let counter = ConfusionCounter::new(3, 1, 2, 5);
        let out_fn = std::env::temp_dir().join("sequin_qc_json_io.json.gz");
        save_json(&counter, &out_fn).unwrap();

        let decoder = flate2::read::MultiGzDecoder::new(File::open(&out_fn).unwrap());
        let value: serde_json::Value = serde_json::from_reader(decoder).unwrap();
        assert_eq!(value["tp"], 3);
        assert_eq!(value["fn"], 2);
        assert_eq!(value["reference_total"], 5);
    }

    #[test]
    fn test_plain_json() {
        let out_fn = std::env::temp_dir().join("sequin_qc_json_io.json");
        save_json(&vec![1, 2], &out_fn).unwrap();
        let value: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&out_fn).unwrap()).unwrap();
        assert_eq!(value, serde_json::json!([1, 2]));
    }

    #[test]
    fn test_unwritable_json() {
        let missing = std::env::temp_dir().join("sequin_qc_json_io_missing").join("nested").join("out.json");
        assert!(save_json(&1, &missing).is_err());
    }
}

use crate::config::TableSchema;
use crate::types::AreaCenter;
use anyhow::{Context, Result, anyhow};
use std::fs;
use std::io::Write;
use std::path::Path;
use tracing::info;

/// Write one row per center: name columns, identifier, latitude, longitude.
pub fn write_centers<W: Write>(writer: W, schema: &TableSchema, centers: &[AreaCenter]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(schema.header())?;

    for center in centers {
        if center.names.len() != schema.name_columns.len() {
            return Err(anyhow!(
                "Area '{}' carries {} names but the schema declares {}",
                center.id,
                center.names.len(),
                schema.name_columns.len()
            ));
        }
        let latitude = center.latitude.to_string();
        let longitude = center.longitude.to_string();
        let row = center.names.iter()
            .map(String::as_str)
            .chain([center.id.as_str(), latitude.as_str(), longitude.as_str()]);
        wtr.write_record(row)?;
    }

    wtr.flush()?;
    Ok(())
}

/// Export the table to `path`. Nothing is written unless every row serializes.
pub fn export_csv(path: &Path, schema: &TableSchema, centers: &[AreaCenter]) -> Result<()> {
    let mut buffer = Vec::new();
    write_centers(&mut buffer, schema, centers)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory: {:?}", parent))?;
    }
    fs::write(path, &buffer)
        .with_context(|| format!("Failed to write CSV file: {:?}", path))?;

    info!(rows = centers.len(), "exported table to {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CenterSource;

    fn schema() -> TableSchema {
        TableSchema {
            id_column: "idsls".to_string(),
            name_columns: vec!["nmkec".to_string(), "nmsls".to_string()],
        }
    }

    fn center(id: &str, names: &[&str], latitude: f64, longitude: f64) -> AreaCenter {
        AreaCenter {
            id: id.to_string(),
            names: names.iter().map(|s| s.to_string()).collect(),
            latitude,
            longitude,
            source: CenterSource::InteriorPoint,
        }
    }

    #[test]
    fn test_writes_header_and_rows() {
        let centers = vec![
            center("001", &["Cilacap", "RT 01, RW 02"], -7.7265, 109.0087),
            center("002", &["Cilacap", "RT 03"], -7.5, 109.25),
        ];
        let mut out = Vec::new();
        write_centers(&mut out, &schema(), &centers).unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "nmkec,nmsls,idsls,latitude,longitude");
        assert_eq!(lines[1], "Cilacap,\"RT 01, RW 02\",001,-7.7265,109.0087");
        assert_eq!(lines[2], "Cilacap,RT 03,002,-7.5,109.25");
    }

    #[test]
    fn test_name_arity_mismatch() {
        let centers = vec![center("001", &["Cilacap"], 0.0, 0.0)];
        assert!(write_centers(Vec::new(), &schema(), &centers).is_err());
    }

    #[test]
    fn test_failed_export_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("master_sls.csv");
        let centers = vec![center("001", &["only one"], 0.0, 0.0)];

        assert!(export_csv(&path, &schema(), &centers).is_err());
        assert!(!path.exists());
    }
}

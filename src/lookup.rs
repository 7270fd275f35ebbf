//! Read side of the exported table: hierarchical lookup for the viewer.
//!
//! [`TableCache`] memoizes the parsed table keyed by the file's
//! modification time and length. A changed file is re-read on the next
//! access; [`TableCache::invalidate`] forces it.

use crate::config::TableSchema;
use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::SystemTime;
use tracing::{debug, info};

const MAPS_URL: &str = "https://www.google.com/maps?q=";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MasterRow {
    pub id: String,
    pub names: Vec<String>,
    pub latitude: f64,
    pub longitude: f64,
}

impl MasterRow {
    /// `"lat,lon"`, ready to paste into a mapping app.
    pub fn coordinates(&self) -> String {
        format!("{},{}", self.latitude, self.longitude)
    }

    pub fn maps_link(&self) -> String {
        format!("{}{}", MAPS_URL, self.coordinates())
    }

    /// Display label: the most specific name, or the id when unnamed.
    pub fn label(&self) -> &str {
        self.names.last()
            .filter(|name| !name.is_empty())
            .map(String::as_str)
            .unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone)]
pub struct MasterTable {
    schema: TableSchema,
    rows: Vec<MasterRow>,
}

impl MasterTable {
    pub fn from_reader<R: Read>(reader: R, schema: &TableSchema) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new().from_reader(reader);
        let headers = rdr.headers()?.clone();
        let column = |name: &str| {
            headers.iter().position(|h| h == name)
                .ok_or_else(|| anyhow!("Column '{}' not found in table", name))
        };

        let id_idx = column(&schema.id_column)?;
        let lat_idx = column(TableSchema::LATITUDE)?;
        let lon_idx = column(TableSchema::LONGITUDE)?;
        let name_idx = schema.name_columns.iter()
            .map(|name| column(name.as_str()))
            .collect::<Result<Vec<_>>>()?;

        let mut rows = Vec::new();
        for (line, result) in rdr.records().enumerate() {
            let record = result?;
            let coord = |idx: usize, what: &str| -> Result<f64> {
                record.get(idx).unwrap_or("").trim().parse::<f64>()
                    .with_context(|| format!("Invalid {} on data row {}", what, line + 1))
            };
            rows.push(MasterRow {
                id: record.get(id_idx).unwrap_or("").to_string(),
                names: name_idx.iter().map(|&i| record.get(i).unwrap_or("").to_string()).collect(),
                latitude: coord(lat_idx, TableSchema::LATITUDE)?,
                longitude: coord(lon_idx, TableSchema::LONGITUDE)?,
            });
        }

        Ok(Self { schema: schema.clone(), rows })
    }

    pub fn from_path(path: &Path, schema: &TableSchema) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open table: {:?}", path))?;
        Self::from_reader(file, schema)
    }

    pub fn rows(&self) -> &[MasterRow] {
        &self.rows
    }

    pub fn levels(&self) -> &[String] {
        self.schema.filter_levels()
    }

    fn matches(row: &MasterRow, selection: &[&str]) -> bool {
        selection.iter().zip(&row.names).all(|(wanted, name)| *wanted == name.as_str())
    }

    /// Distinct, sorted values of the level after `selection`.
    ///
    /// `selection` holds chosen values for the leading filter levels.
    pub fn options(&self, selection: &[&str]) -> Vec<String> {
        let level = selection.len();
        if level >= self.levels().len() {
            return Vec::new();
        }
        self.rows.iter()
            .filter(|row| Self::matches(row, selection))
            .filter_map(|row| row.names.get(level).cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Rows whose leading names equal `selection`, in table order.
    pub fn rows_matching(&self, selection: &[&str]) -> Vec<&MasterRow> {
        self.rows.iter().filter(|row| Self::matches(row, selection)).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CacheKey {
    modified: Option<SystemTime>,
    len: u64,
}

impl CacheKey {
    fn of(path: &Path) -> Result<Self> {
        let meta = fs::metadata(path)
            .with_context(|| format!("Table not available: {:?}", path))?;
        Ok(Self {
            modified: meta.modified().ok(),
            len: meta.len(),
        })
    }
}

struct Cached {
    key: CacheKey,
    table: Arc<MasterTable>,
}

/// Memoized [`MasterTable`] for one file path.
pub struct TableCache {
    path: PathBuf,
    schema: TableSchema,
    state: RwLock<Option<Cached>>,
}

impl TableCache {
    pub fn new(path: impl Into<PathBuf>, schema: TableSchema) -> Self {
        Self {
            path: path.into(),
            schema,
            state: RwLock::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn get(&self) -> Result<Arc<MasterTable>> {
        let key = CacheKey::of(&self.path)?;

        {
            let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(cached) = state.as_ref().filter(|c| c.key == key) {
                return Ok(Arc::clone(&cached.table));
            }
        }

        let table = Arc::new(MasterTable::from_path(&self.path, &self.schema)?);
        info!(rows = table.rows().len(), "loaded table {:?}", self.path);

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        *state = Some(Cached { key, table: Arc::clone(&table) });
        Ok(table)
    }

    pub fn invalidate(&self) {
        debug!("invalidating table cache for {:?}", self.path);
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        *state = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "\
nmkec,nmdesa,nmsls,idsls,latitude,longitude
Cilacap Tengah,Sidakaya,RT 001,001,-7.71,109.01
Cilacap Tengah,Gunungsimping,RT 002,002,-7.72,109.02
Cilacap Tengah,Sidakaya,RT 003,003,-7.73,109.03
Kesugihan,Karangkandri,RT 004,004,-7.64,109.11
";

    fn schema() -> TableSchema {
        TableSchema {
            id_column: "idsls".to_string(),
            name_columns: vec!["nmkec".into(), "nmdesa".into(), "nmsls".into()],
        }
    }

    #[test]
    fn test_hierarchy_options() {
        let table = MasterTable::from_reader(TABLE.as_bytes(), &schema()).unwrap();
        assert_eq!(table.levels(), ["nmkec".to_string(), "nmdesa".to_string()]);
        assert_eq!(table.options(&[]), vec!["Cilacap Tengah", "Kesugihan"]);
        assert_eq!(table.options(&["Cilacap Tengah"]), vec!["Gunungsimping", "Sidakaya"]);
        assert!(table.options(&["Cilacap Tengah", "Sidakaya"]).is_empty());
        assert!(table.options(&["Nowhere"]).is_empty());
    }

    #[test]
    fn test_rows_matching_keeps_order() {
        let table = MasterTable::from_reader(TABLE.as_bytes(), &schema()).unwrap();
        let rows = table.rows_matching(&["Cilacap Tengah", "Sidakaya"]);
        let ids: Vec<&str> = rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["001", "003"]);
        assert_eq!(rows[0].label(), "RT 001");
        assert_eq!(table.rows_matching(&[]).len(), 4);
    }

    #[test]
    fn test_coordinates_and_link() {
        let table = MasterTable::from_reader(TABLE.as_bytes(), &schema()).unwrap();
        let row = &table.rows()[3];
        assert_eq!(row.coordinates(), "-7.64,109.11");
        assert_eq!(row.maps_link(), "https://www.google.com/maps?q=-7.64,109.11");
    }

    #[test]
    fn test_missing_column() {
        let err = MasterTable::from_reader("idsls,latitude\n1,2\n".as_bytes(), &schema()).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_bad_coordinate() {
        let csv = "nmkec,nmdesa,nmsls,idsls,latitude,longitude\na,b,c,1,north,109\n";
        assert!(MasterTable::from_reader(csv.as_bytes(), &schema()).is_err());
    }

    #[test]
    fn test_cache_reloads_on_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("master_sls.csv");
        fs::write(&path, TABLE).unwrap();

        let cache = TableCache::new(&path, schema());
        let first = cache.get().unwrap();
        let again = cache.get().unwrap();
        assert!(Arc::ptr_eq(&first, &again));

        // Different length guarantees a new key even on coarse mtime clocks.
        let shorter = TABLE.lines().take(2).collect::<Vec<_>>().join("\n");
        fs::write(&path, shorter).unwrap();
        let reloaded = cache.get().unwrap();
        assert!(!Arc::ptr_eq(&first, &reloaded));
        assert_eq!(reloaded.rows().len(), 1);
    }

    #[test]
    fn test_cache_invalidate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("master_sls.csv");
        fs::write(&path, TABLE).unwrap();

        let cache = TableCache::new(&path, schema());
        let first = cache.get().unwrap();
        cache.invalidate();
        let second = cache.get().unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_cache_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TableCache::new(dir.path().join("absent.csv"), schema());
        assert!(cache.get().is_err());
    }
}

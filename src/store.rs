use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Local;
use rusqlite::Connection;
use tracing::{info, warn};

use crate::error::StoreError;
use crate::record::{ExtractedRecord, Field};
use crate::settings::StoreBackend;

/// Durable, append-only list of records keyed by `resource_url`.
pub trait RecordStore {
    /// Every stored record in insertion order.
    fn load_all(&mut self) -> Result<Vec<ExtractedRecord>, StoreError>;

    /// Append records after the existing ones. Returns how many were written.
    fn append_all(&mut self, records: &[ExtractedRecord]) -> Result<usize, StoreError>;

    fn location(&self) -> String;
}

pub fn open(backend: StoreBackend, path: &Path) -> Result<Box<dyn RecordStore>, StoreError> {
    Ok(match backend {
        StoreBackend::Json => Box::new(JsonStore::new(path)),
        StoreBackend::Sqlite => Box::new(SqliteStore::open(path)?),
    })
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.display().to_string(),
        source,
    }
}

// ── JSON file ──

/// Pretty-printed JSON array. Rewritten whole through a temp file on append.
pub struct JsonStore {
    path: PathBuf,
}

impl JsonStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonStore { path: path.into() }
    }

    fn read(&self) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_err(&self.path)(e)),
        }
    }

    fn parse(&self, text: &str) -> Result<Vec<ExtractedRecord>, StoreError> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(text).map_err(|source| StoreError::Json {
            path: self.path.display().to_string(),
            source,
        })
    }

    /// Move an unreadable file out of the way so appends can proceed.
    fn set_aside(&self) -> Result<PathBuf, StoreError> {
        let stamp = Local::now().format("%Y%m%d-%H%M%S");
        let mut name = self.path.as_os_str().to_owned();
        name.push(format!(".corrupt-{stamp}"));
        let aside = PathBuf::from(name);
        fs::rename(&self.path, &aside).map_err(io_err(&self.path))?;
        Ok(aside)
    }
}

impl RecordStore for JsonStore {
    fn load_all(&mut self) -> Result<Vec<ExtractedRecord>, StoreError> {
        match self.read()? {
            Some(text) => self.parse(&text),
            None => Ok(Vec::new()),
        }
    }

    fn append_all(&mut self, records: &[ExtractedRecord]) -> Result<usize, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }
        let mut all = match self.read()? {
            None => Vec::new(),
            Some(text) => match self.parse(&text) {
                Ok(existing) => existing,
                Err(e) => {
                    let aside = self.set_aside()?;
                    warn!(error = %e, moved_to = %aside.display(), "corrupt store set aside");
                    Vec::new()
                }
            },
        };
        all.extend_from_slice(records);

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(io_err(dir))?;
        }
        let body = serde_json::to_string_pretty(&all).map_err(|source| StoreError::Json {
            path: self.path.display().to_string(),
            source,
        })?;
        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp = PathBuf::from(tmp_name);
        fs::write(&tmp, body).map_err(io_err(&tmp))?;
        fs::rename(&tmp, &self.path).map_err(io_err(&self.path))?;
        Ok(records.len())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

// ── SQLite ──

pub struct SqliteStore {
    conn: Connection,
    label: String,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(io_err(dir))?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::init(conn, path.display().to_string())
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?, ":memory:".to_string())
    }

    fn init(conn: Connection, label: String) -> Result<Self, StoreError> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS records (
                id                INTEGER PRIMARY KEY,
                title             TEXT,
                price_eur         INTEGER,
                agency_name       TEXT,
                phone             TEXT,
                address           TEXT,
                mileage_km        INTEGER,
                equipment_options TEXT,
                characteristics   TEXT,
                features          TEXT,
                seller_comment    TEXT,
                resource_url      TEXT UNIQUE NOT NULL,
                stored_at         TEXT NOT NULL DEFAULT (datetime('now'))
            );
            ",
        )?;
        Ok(SqliteStore { conn, label })
    }
}

impl RecordStore for SqliteStore {
    fn load_all(&mut self) -> Result<Vec<ExtractedRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT title, price_eur, agency_name, phone, address, mileage_km,
                    equipment_options, characteristics, features, seller_comment, resource_url
             FROM records ORDER BY id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(ExtractedRecord {
                    title: row.get(0)?,
                    price_eur: row.get(1)?,
                    agency_name: row.get(2)?,
                    phone: row.get(3)?,
                    address: row.get(4)?,
                    mileage_km: row.get(5)?,
                    equipment_options: row.get(6)?,
                    characteristics: row.get(7)?,
                    features: row.get(8)?,
                    seller_comment: row.get(9)?,
                    resource_url: row.get(10)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn append_all(&mut self, records: &[ExtractedRecord]) -> Result<usize, StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        let mut count = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO records
                    (title, price_eur, agency_name, phone, address, mileage_km,
                     equipment_options, characteristics, features, seller_comment, resource_url)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            )?;
            for r in records {
                count += stmt.execute(rusqlite::params![
                    r.title,
                    r.price_eur,
                    r.agency_name,
                    r.phone,
                    r.address,
                    r.mileage_km,
                    r.equipment_options,
                    r.characteristics,
                    r.features,
                    r.seller_comment,
                    r.resource_url,
                ])?;
            }
        }
        tx.commit()?;
        if count < records.len() {
            info!(skipped = records.len() - count, "already stored; ignored");
        }
        Ok(count)
    }

    fn location(&self) -> String {
        self.label.clone()
    }
}

// ── Stats ──

/// How many stored records have each field set, in output order.
pub fn field_fill(records: &[ExtractedRecord]) -> Vec<(Field, usize)> {
    Field::ALL
        .iter()
        .map(|f| (*f, records.iter().filter(|r| r.is_set(*f)).count()))
        .collect()
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(url: &str, title: &str) -> ExtractedRecord {
        ExtractedRecord {
            title: Some(title.to_string()),
            price_eur: Some(10000),
            ..ExtractedRecord::new(url)
        }
    }

    #[test]
    fn json_store_appends_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonStore::new(dir.path().join("out/listings.json"));
        assert!(store.load_all().unwrap().is_empty());
        store.append_all(&[rec("a", "A"), rec("b", "B")]).unwrap();
        store.append_all(&[rec("c", "C")]).unwrap();
        let urls: Vec<String> = store.load_all().unwrap().into_iter().map(|r| r.resource_url).collect();
        assert_eq!(urls, vec!["a", "b", "c"]);
    }

    #[test]
    fn json_columns_follow_output_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("listings.json");
        let mut store = JsonStore::new(&path);
        store.append_all(&[rec("a", "A")]).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        let title_at = text.find("\"title\"").unwrap();
        let phone_at = text.find("\"phone\"").unwrap();
        let url_at = text.find("\"resource_url\"").unwrap();
        assert!(title_at < phone_at && phone_at < url_at);
    }

    #[test]
    fn corrupt_json_is_an_error_then_set_aside_on_append() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("listings.json");
        fs::write(&path, "[{\"title\": ").unwrap();
        let mut store = JsonStore::new(&path);
        assert!(matches!(store.load_all(), Err(StoreError::Json { .. })));

        store.append_all(&[rec("a", "A")]).unwrap();
        assert_eq!(store.load_all().unwrap().len(), 1);
        let aside = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .any(|e| e.file_name().to_string_lossy().contains(".corrupt-"));
        assert!(aside);
    }

    #[test]
    fn legacy_ad_url_column_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old.json");
        fs::write(&path, r#"[{"title": "Old", "ad_url": "https://example.test/1"}]"#).unwrap();
        let loaded = JsonStore::new(&path).load_all().unwrap();
        assert_eq!(loaded[0].resource_url, "https://example.test/1");
    }

    #[test]
    fn sqlite_ignores_duplicate_urls() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.append_all(&[rec("a", "A"), rec("b", "B")]).unwrap(), 2);
        assert_eq!(store.append_all(&[rec("a", "A2"), rec("c", "C")]).unwrap(), 1);
        let loaded = store.load_all().unwrap();
        let titles: Vec<&str> = loaded.iter().filter_map(|r| r.title.as_deref()).collect();
        assert_eq!(titles, vec!["A", "B", "C"]);
    }

    #[test]
    fn sqlite_file_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db/listings.sqlite");
        SqliteStore::open(&path).unwrap().append_all(&[rec("a", "A")]).unwrap();
        let mut reopened = open(StoreBackend::Sqlite, &path).unwrap();
        assert_eq!(reopened.load_all().unwrap().len(), 1);
    }

    #[test]
    fn fill_counts_per_field() {
        let records = vec![rec("a", "A"), ExtractedRecord::new("b")];
        let fill = field_fill(&records);
        assert_eq!(fill[0], (Field::Title, 1));
        assert_eq!(fill[3], (Field::Phone, 0));
    }
}

//! # Pharmabot Catalog
//!
//! DuckDB-backed medicine catalog.
//!
//! The chatbot path only ever calls [`Catalog::search_medicines`], which issues a
//! single parameterized `SELECT`. Writes happen through [`Catalog::import_medicines`],
//! the administrative import path.
//!
//! ```rust,no_run
//! use pharmabot_catalog::{Catalog, CatalogConfig};
//!
//! let catalog = Catalog::open(CatalogConfig::default())?;
//! for medicine in catalog.search_medicines("paracetamol", 5)? {
//!     println!("{} ({})", medicine.name, medicine.dosage_form);
//! }
//! # Ok::<(), pharmabot_catalog::CatalogError>(())
//! ```

pub mod duckdb;
pub mod migrations;

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use ::duckdb::{Connection, ToSql};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use duckdb::{AccessMode, DuckDbConnectionManager, PooledConnection};

/// Errors that can occur during catalog operations.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// `DuckDB` database error.
    #[error(transparent)]
    DuckDb(#[from] ::duckdb::Error),

    /// I/O error (file system operations).
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Import file could not be decoded.
    #[error("invalid medicine import file: {0}")]
    Json(#[from] serde_json::Error),

    /// Database file does not exist.
    #[error("medicine catalog not found at '{}'", .0.display())]
    NotFound(PathBuf),

    /// Request was rejected before reaching the database.
    #[error("query rejected: {0}")]
    QueryRejected(String),
}

/// Configuration for the catalog database.
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// Path to the `DuckDB` database file. `None` keeps the catalog in memory.
    pub db_path: Option<PathBuf>,
    /// Maximum number of idle connections kept in the pool.
    pub max_pool_size: usize,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            db_path: Some(resolve_pharmabot_home().join("catalog").join("medicines.duckdb")),
            max_pool_size: 4,
        }
    }
}

impl CatalogConfig {
    /// Configuration for a database file at `path`.
    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Configuration for a private in-memory catalog.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            db_path: None,
            max_pool_size: 2,
        }
    }
}

/// One row of the `medicines` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedicineRecord {
    pub id: i64,
    pub name: String,
    pub category: String,
    pub dosage_form: String,
    #[serde(default)]
    pub strength: Option<String>,
    #[serde(default)]
    pub manufacturer: Option<String>,
    #[serde(default)]
    pub requires_prescription: bool,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

/// Summary of an import run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub imported: usize,
    pub total_medicines: u64,
}

/// Handle to the medicine catalog.
#[derive(Clone)]
pub struct Catalog {
    manager: DuckDbConnectionManager,
}

impl Catalog {
    /// Open the catalog for writing, creating the file and applying pending migrations.
    pub fn open(config: CatalogConfig) -> Result<Self, CatalogError> {
        if let Some(parent) = config.db_path.as_deref().and_then(Path::parent) {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let manager = DuckDbConnectionManager::open(
            config.db_path,
            config.max_pool_size,
            AccessMode::ReadWrite,
        )?;
        let catalog = Self { manager };
        catalog.initialize()?;
        Ok(catalog)
    }

    /// Open an existing catalog for lookups only.
    ///
    /// Nothing is created or migrated. A missing file is [`CatalogError::NotFound`]
    /// and a file without the `medicines` table fails with a database error.
    /// An in-memory configuration falls back to [`Catalog::open`].
    pub fn open_read_only(config: CatalogConfig) -> Result<Self, CatalogError> {
        let Some(path) = config.db_path else {
            return Self::open(config);
        };
        if !path.is_file() {
            return Err(CatalogError::NotFound(path));
        }

        let manager =
            DuckDbConnectionManager::open(Some(path), config.max_pool_size, AccessMode::ReadOnly)?;
        let catalog = Self { manager };
        catalog.count_medicines()?;
        Ok(catalog)
    }

    /// Private in-memory catalog, mostly for tests and demos.
    pub fn open_in_memory() -> Result<Self, CatalogError> {
        Self::open(CatalogConfig::in_memory())
    }

    /// Initialize the database schema.
    pub fn initialize(&self) -> Result<(), CatalogError> {
        let connection = self.manager.acquire()?;
        migrations::apply_migrations(&connection)?;
        Ok(())
    }

    /// Path to the database file, `None` when in memory.
    pub fn db_path(&self) -> Option<&Path> {
        self.manager.db_path()
    }

    /// Active medicines whose name, category or dosage form contains `keyword`,
    /// case-insensitively, ordered by name.
    ///
    /// # Security
    /// `keyword` is bound as a parameter. `%` and `_` in it match literally.
    pub fn search_medicines(
        &self,
        keyword: &str,
        limit: usize,
    ) -> Result<Vec<MedicineRecord>, CatalogError> {
        if limit == 0 {
            return Err(CatalogError::QueryRejected(String::from(
                "result limit must be greater than zero",
            )));
        }

        let pattern = like_pattern(keyword);
        let sql = format!(
            "SELECT id, name, category, dosage_form, strength, manufacturer, \
                    requires_prescription, is_active \
             FROM medicines \
             WHERE is_active \
               AND (LOWER(name) LIKE ? ESCAPE '\\' \
                    OR LOWER(category) LIKE ? ESCAPE '\\' \
                    OR LOWER(dosage_form) LIKE ? ESCAPE '\\') \
             ORDER BY name, id \
             LIMIT {limit}"
        );

        let connection = self.manager.acquire()?;
        let params: [&dyn ToSql; 3] = [&pattern, &pattern, &pattern];
        let mut statement = connection.prepare(sql.as_str())?;
        let rows = statement.query_map(params.as_slice(), read_medicine)?;
        let records = rows.collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(keyword, matches = records.len(), "catalog search");
        Ok(records)
    }

    /// Number of rows in the `medicines` table.
    pub fn count_medicines(&self) -> Result<u64, CatalogError> {
        let connection = self.manager.acquire()?;
        let count: i64 = connection.query_row("SELECT COUNT(*) FROM medicines", [], |row| row.get(0))?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    /// Insert or replace medicines by id in a single transaction.
    pub fn import_medicines(&self, records: &[MedicineRecord]) -> Result<ImportReport, CatalogError> {
        let connection = self.manager.acquire()?;

        if !records.is_empty() {
            connection.execute_batch("BEGIN TRANSACTION")?;
            let result = (|| -> Result<(), CatalogError> {
                for record in records {
                    let params: [&dyn ToSql; 8] = [
                        &record.id,
                        &record.name,
                        &record.category,
                        &record.dosage_form,
                        &record.strength,
                        &record.manufacturer,
                        &record.requires_prescription,
                        &record.is_active,
                    ];
                    connection.execute(
                        "INSERT OR REPLACE INTO medicines \
                         (id, name, category, dosage_form, strength, manufacturer, \
                          requires_prescription, is_active, updated_at) \
                         VALUES (?, ?, ?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP)",
                        params.as_slice(),
                    )?;
                }
                Ok(())
            })();
            finalize_transaction(&connection, result)?;
        }

        let count: i64 = connection.query_row("SELECT COUNT(*) FROM medicines", [], |row| row.get(0))?;
        tracing::info!(imported = records.len(), total = count, "medicines imported");
        Ok(ImportReport {
            imported: records.len(),
            total_medicines: u64::try_from(count).unwrap_or_default(),
        })
    }

    /// Import a JSON array of medicine records from `path`.
    pub fn import_json_file(&self, path: &Path) -> Result<ImportReport, CatalogError> {
        let raw = fs::read_to_string(path)?;
        let records: Vec<MedicineRecord> = serde_json::from_str(&raw)?;
        self.import_medicines(&records)
    }
}

fn read_medicine(row: &::duckdb::Row<'_>) -> Result<MedicineRecord, ::duckdb::Error> {
    Ok(MedicineRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        category: row.get(2)?,
        dosage_form: row.get(3)?,
        strength: row.get(4)?,
        manufacturer: row.get(5)?,
        requires_prescription: row.get(6)?,
        is_active: row.get(7)?,
    })
}

/// Finalize a transaction, committing on success or rolling back on failure.
fn finalize_transaction<T>(
    connection: &Connection,
    result: Result<T, CatalogError>,
) -> Result<T, CatalogError> {
    match result {
        Ok(value) => {
            connection.execute_batch("COMMIT")?;
            Ok(value)
        }
        Err(error) => {
            let _ = connection.execute_batch("ROLLBACK");
            Err(error)
        }
    }
}

/// Lowercased `%keyword%` with LIKE wildcards escaped.
fn like_pattern(keyword: &str) -> String {
    let mut pattern = String::with_capacity(keyword.len() + 2);
    pattern.push('%');
    for ch in keyword.trim().to_lowercase().chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

/// Resolve the pharmabot home directory from environment or default.
pub fn resolve_pharmabot_home() -> PathBuf {
    if let Some(path) = env::var_os("PHARMABOT_HOME") {
        let path = PathBuf::from(path);
        if !path.as_os_str().is_empty() {
            return path;
        }
    }

    if let Some(home) = env::var_os("HOME") {
        return PathBuf::from(home).join(".pharmabot");
    }

    PathBuf::from(".pharmabot")
}

//! SQLite-backed datasets
//!
//! Every dataset is a table in one database file. Column conventions:
//!
//! ```text
//! receivers        id, geometry (WKT)
//! attenuation      receiver_id, source_id, hz63 .. hz8000
//! source identity  id, link_key
//! emission         link_key, time_bin, lw63 .. lw8000
//! output           pk, receiver_id, geometry, level_63 .. level_8000,
//!                  time_bin, flat_level, weighted_level
//! ```
//!
//! The output table is dropped and recreated by [`SqliteSink::prepare`].
//! Without `atomic` each receiver is committed on its own, so an interrupted
//! run leaves complete receivers only. With `atomic` the whole run, table
//! replacement included, is a single transaction.

use std::path::Path;

use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, Row};

use noisemap_core::{
    AttenuationRecord, Band, BandLevels, DatasetConfig, EmissionRecord, NoiseMapError,
    NoiseMapResult, Point, Receiver, ResultRow, SourceIdentity,
};

use super::{InputStore, ResultSink};
use crate::fusion::attenuation::ATTENUATION_DATASET;
use crate::fusion::emission::{EMISSION_DATASET, SOURCE_IDENTITY_DATASET};

const RECEIVERS_DATASET: &str = "receivers";
const OUTPUT_DATASET: &str = "output";

const ATTENUATION_PREFIX: &str = "hz";
const EMISSION_PREFIX: &str = "lw";
const OUTPUT_PREFIX: &str = "level_";

trait StoreResultExt<T> {
    fn store(self) -> NoiseMapResult<T>;
}

impl<T> StoreResultExt<T> for Result<T, rusqlite::Error> {
    fn store(self) -> NoiseMapResult<T> {
        self.map_err(|e| NoiseMapError::Store(e.to_string()))
    }
}

fn band_columns(prefix: &str) -> Vec<String> {
    Band::ALL
        .iter()
        .map(|b| format!("{}{}", prefix, b.column_suffix()))
        .collect()
}

/// Quote a table name after checking it is a plain identifier.
fn quote_ident(name: &str) -> NoiseMapResult<String> {
    let valid = !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit());
    if valid {
        Ok(format!("\"{}\"", name))
    } else {
        Err(NoiseMapError::Store(format!("invalid table name '{}'", name)))
    }
}

fn invalid(dataset: &str, detail: String) -> NoiseMapError {
    NoiseMapError::InvalidRecord {
        dataset: dataset.to_string(),
        detail,
    }
}

fn read_integer(row: &Row<'_>, idx: usize, dataset: &str, field: &str) -> NoiseMapResult<i64> {
    match row.get_ref(idx).store()? {
        ValueRef::Integer(v) => Ok(v),
        // i64::MAX as f64 rounds up to 2^63, hence the exclusive upper bound
        ValueRef::Real(v)
            if v.fract() == 0.0 && v >= i64::MIN as f64 && v < i64::MAX as f64 =>
        {
            Ok(v as i64)
        }
        ValueRef::Real(v) if v.fract() == 0.0 && v.is_finite() => Err(invalid(
            dataset,
            format!("{} {} is out of integer range", field, v),
        )),
        ValueRef::Null => Err(invalid(dataset, format!("missing {}", field))),
        other => Err(invalid(
            dataset,
            format!("{} is not an integer ({:?})", field, other.data_type()),
        )),
    }
}

fn read_key(row: &Row<'_>, idx: usize, dataset: &str) -> NoiseMapResult<String> {
    match row.get_ref(idx).store()? {
        ValueRef::Text(t) => Ok(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Integer(v) => Ok(v.to_string()),
        ValueRef::Null => Err(invalid(dataset, "missing link_key".to_string())),
        other => Err(invalid(
            dataset,
            format!("link_key has unsupported type {:?}", other.data_type()),
        )),
    }
}

/// Read eight band columns starting at `first`.
fn read_bands<F>(row: &Row<'_>, first: usize, dataset: &str, context: F) -> NoiseMapResult<BandLevels>
where
    F: Fn() -> String,
{
    let mut levels = BandLevels::silence();
    for band in Band::ALL {
        levels[band] = match row.get_ref(first + band.index()).store()? {
            ValueRef::Real(v) => v,
            ValueRef::Integer(v) => v as f64,
            ValueRef::Null => {
                return Err(invalid(
                    dataset,
                    format!("{}: missing band {}", context(), band),
                ))
            }
            ValueRef::Text(_) | ValueRef::Blob(_) => {
                return Err(invalid(
                    dataset,
                    format!("{}: non-numeric band {}", context(), band),
                ))
            }
        };
    }
    levels.validate(dataset, &context)?;
    Ok(levels)
}

fn read_geometry(row: &Row<'_>, idx: usize, receiver: i64) -> NoiseMapResult<Point> {
    match row.get_ref(idx).store()? {
        ValueRef::Text(t) => String::from_utf8_lossy(t).parse::<Point>().map_err(|e| {
            NoiseMapError::InvalidGeometry(format!("receiver {}: {}", receiver, e))
        }),
        ValueRef::Null => Err(NoiseMapError::InvalidGeometry(format!(
            "receiver {} has no geometry",
            receiver
        ))),
        other => Err(NoiseMapError::InvalidGeometry(format!(
            "receiver {}: unsupported geometry type {:?}",
            receiver,
            other.data_type()
        ))),
    }
}

/// Input datasets and output table in one SQLite database.
pub struct SqliteStore {
    conn: Connection,
    datasets: DatasetConfig,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("path", &self.conn.path())
            .field("datasets", &self.datasets)
            .finish()
    }
}

impl SqliteStore {
    /// Open the database named in `datasets`. The file must already exist.
    pub fn open(datasets: &DatasetConfig) -> NoiseMapResult<Self> {
        let path: &Path = &datasets.database;
        if !path.exists() {
            return Err(NoiseMapError::MissingDataset(format!(
                "database {}",
                path.display()
            )));
        }
        tracing::debug!(path = %path.display(), "Opening SQLite database");
        let conn = Connection::open(path).store()?;
        Self::from_connection(conn, datasets.clone())
    }

    /// Wrap an existing connection, e.g. `Connection::open_in_memory()`.
    pub fn from_connection(conn: Connection, datasets: DatasetConfig) -> NoiseMapResult<Self> {
        for name in datasets.inputs().into_iter().chain([datasets.output.as_str()]) {
            quote_ident(name)?;
        }
        Ok(Self { conn, datasets })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn datasets(&self) -> &DatasetConfig {
        &self.datasets
    }

    /// Sink writing to the configured output table.
    pub fn sink(&self, atomic: bool) -> NoiseMapResult<SqliteSink<'_>> {
        SqliteSink::new(&self.conn, &self.datasets.output, atomic)
    }

    fn table_exists(&self, table: &str) -> NoiseMapResult<bool> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master \
                 WHERE type IN ('table', 'view') AND name = ?1 COLLATE NOCASE",
                [table],
                |row| row.get(0),
            )
            .store()?;
        Ok(count > 0)
    }

    fn columns(&self, table: &str) -> NoiseMapResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info({})", quote_ident(table)?))
            .store()?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .store()?
            .collect::<Result<Vec<_>, _>>()
            .store()?;
        Ok(names.into_iter().map(|n| n.to_ascii_lowercase()).collect())
    }

    fn required_columns(&self) -> Vec<(&str, Vec<String>)> {
        let ds = &self.datasets;
        let with_bands = |keys: [&str; 2], prefix: &str| {
            keys.iter()
                .map(|k| k.to_string())
                .chain(band_columns(prefix))
                .collect::<Vec<_>>()
        };
        vec![
            (
                ds.receivers.as_str(),
                vec!["id".to_string(), "geometry".to_string()],
            ),
            (
                ds.attenuation.as_str(),
                with_bands(["receiver_id", "source_id"], ATTENUATION_PREFIX),
            ),
            (
                ds.source_identity.as_str(),
                vec!["id".to_string(), "link_key".to_string()],
            ),
            (
                ds.emission.as_str(),
                with_bands(["link_key", "time_bin"], EMISSION_PREFIX),
            ),
        ]
    }

    /// Create an index on `table(column)` unless one already leads with it.
    ///
    /// Returns `true` when an index was created.
    pub fn ensure_index(&self, table: &str, column: &str) -> NoiseMapResult<bool> {
        let quoted_table = quote_ident(table)?;
        let quoted_column = quote_ident(column)?;

        let existing: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM pragma_index_list(?1) AS il \
                 JOIN pragma_index_info(il.name) AS ii \
                 WHERE ii.seqno = 0 AND ii.name = ?2 COLLATE NOCASE",
                [table, column],
                |row| row.get(0),
            )
            .store()?;
        if existing > 0 {
            return Ok(false);
        }

        let index = quote_ident(&format!("{}_{}_idx", table, column).to_ascii_lowercase())?;
        self.conn
            .execute(
                &format!(
                    "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
                    index, quoted_table, quoted_column
                ),
                [],
            )
            .store()?;
        tracing::info!(table, column, "Created index");
        Ok(true)
    }

    /// Index the join columns of the attenuation, identity and emission tables.
    pub fn ensure_indexes(&self) -> NoiseMapResult<usize> {
        let ds = &self.datasets;
        let wanted = [
            (ds.attenuation.as_str(), "receiver_id"),
            (ds.attenuation.as_str(), "source_id"),
            (ds.source_identity.as_str(), "id"),
            (ds.emission.as_str(), "link_key"),
            (ds.emission.as_str(), "time_bin"),
        ];
        let mut created = 0;
        for (table, column) in wanted {
            if self.ensure_index(table, column)? {
                created += 1;
            }
        }
        Ok(created)
    }

    /// Read the output table back in write order.
    pub fn read_results(&self) -> NoiseMapResult<Vec<ResultRow>> {
        let table = quote_ident(&self.datasets.output)?;
        let sql = format!(
            "SELECT receiver_id, geometry, {}, time_bin, flat_level, weighted_level \
             FROM {} ORDER BY pk",
            band_columns(OUTPUT_PREFIX).join(", "),
            table
        );
        let mut stmt = self.conn.prepare(&sql).store()?;
        let mut rows = stmt.query([]).store()?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().store()? {
            let receiver_id = read_integer(row, 0, OUTPUT_DATASET, "receiver_id")?;
            let geometry = read_geometry(row, 1, receiver_id)?;
            let levels = read_bands(row, 2, OUTPUT_DATASET, || {
                format!("receiver {}", receiver_id)
            })?;
            out.push(ResultRow {
                receiver_id,
                geometry,
                levels,
                time_bin: row.get(10).store()?,
                flat_level: row.get(11).store()?,
                weighted_level: row.get(12).store()?,
            });
        }
        Ok(out)
    }
}

impl InputStore for SqliteStore {
    fn check_inputs(&self) -> NoiseMapResult<()> {
        for (table, required) in self.required_columns() {
            if !self.table_exists(table)? {
                return Err(NoiseMapError::MissingDataset(table.to_string()));
            }
            let present = self.columns(table)?;
            if let Some(col) = required.iter().find(|c| !present.contains(c)) {
                return Err(NoiseMapError::MissingDataset(format!("{}.{}", table, col)));
            }
        }
        Ok(())
    }

    fn receivers(&self) -> NoiseMapResult<Vec<Receiver>> {
        let sql = format!(
            "SELECT id, geometry FROM {} ORDER BY id",
            quote_ident(&self.datasets.receivers)?
        );
        let mut stmt = self.conn.prepare(&sql).store()?;
        let mut rows = stmt.query([]).store()?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().store()? {
            let id = read_integer(row, 0, RECEIVERS_DATASET, "id")?;
            out.push(Receiver::new(id, read_geometry(row, 1, id)?));
        }
        tracing::debug!(count = out.len(), "Loaded receivers");
        Ok(out)
    }

    fn attenuation(&self) -> NoiseMapResult<Vec<AttenuationRecord>> {
        let sql = format!(
            "SELECT receiver_id, source_id, {} FROM {} ORDER BY receiver_id, source_id",
            band_columns(ATTENUATION_PREFIX).join(", "),
            quote_ident(&self.datasets.attenuation)?
        );
        let mut stmt = self.conn.prepare(&sql).store()?;
        let mut rows = stmt.query([]).store()?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().store()? {
            let receiver_id = read_integer(row, 0, ATTENUATION_DATASET, "receiver_id")?;
            let source_id = read_integer(row, 1, ATTENUATION_DATASET, "source_id")?;
            let attenuation = read_bands(row, 2, ATTENUATION_DATASET, || {
                format!("receiver {} source {}", receiver_id, source_id)
            })?;
            out.push(AttenuationRecord {
                receiver_id,
                source_id,
                attenuation,
            });
        }
        tracing::debug!(count = out.len(), "Loaded attenuation records");
        Ok(out)
    }

    fn source_identities(&self) -> NoiseMapResult<Vec<SourceIdentity>> {
        let sql = format!(
            "SELECT id, link_key FROM {} ORDER BY id",
            quote_ident(&self.datasets.source_identity)?
        );
        let mut stmt = self.conn.prepare(&sql).store()?;
        let mut rows = stmt.query([]).store()?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().store()? {
            out.push(SourceIdentity {
                id: read_integer(row, 0, SOURCE_IDENTITY_DATASET, "id")?,
                link_key: read_key(row, 1, SOURCE_IDENTITY_DATASET)?,
            });
        }
        Ok(out)
    }

    fn emissions(&self) -> NoiseMapResult<Vec<EmissionRecord>> {
        let sql = format!(
            "SELECT link_key, time_bin, {} FROM {} ORDER BY link_key, time_bin",
            band_columns(EMISSION_PREFIX).join(", "),
            quote_ident(&self.datasets.emission)?
        );
        let mut stmt = self.conn.prepare(&sql).store()?;
        let mut rows = stmt.query([]).store()?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().store()? {
            let link_key = read_key(row, 0, EMISSION_DATASET)?;
            let time_bin = read_integer(row, 1, EMISSION_DATASET, "time_bin")?;
            let emission = read_bands(row, 2, EMISSION_DATASET, || {
                format!("link '{}' bin {}", link_key, time_bin)
            })?;
            out.push(EmissionRecord {
                link_key,
                time_bin,
                emission,
            });
        }
        tracing::debug!(count = out.len(), "Loaded emission records");
        Ok(out)
    }
}

/// Writes result rows into the output table of a [`SqliteStore`].
pub struct SqliteSink<'a> {
    conn: &'a Connection,
    table: String,
    insert_sql: String,
    atomic: bool,
    in_transaction: bool,
}

impl<'a> SqliteSink<'a> {
    fn new(conn: &'a Connection, table: &str, atomic: bool) -> NoiseMapResult<Self> {
        let table = quote_ident(table)?;
        let columns = ["receiver_id".to_string(), "geometry".to_string()]
            .into_iter()
            .chain(band_columns(OUTPUT_PREFIX))
            .chain(["time_bin", "flat_level", "weighted_level"].map(String::from))
            .collect::<Vec<_>>();
        let placeholders = (1..=columns.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let insert_sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            columns.join(", "),
            placeholders
        );
        Ok(Self {
            conn,
            table,
            insert_sql,
            atomic,
            in_transaction: false,
        })
    }

    fn begin(&mut self) -> NoiseMapResult<()> {
        self.conn.execute_batch("BEGIN").store()?;
        self.in_transaction = true;
        Ok(())
    }

    fn commit(&mut self) -> NoiseMapResult<()> {
        self.conn.execute_batch("COMMIT").store()?;
        self.in_transaction = false;
        Ok(())
    }

    fn rollback(&mut self) {
        if !self.in_transaction {
            return;
        }
        if let Err(e) = self.conn.execute_batch("ROLLBACK") {
            tracing::warn!(error = %e, "Rollback failed");
        }
        self.in_transaction = false;
    }

    fn insert(&self, rows: &[ResultRow]) -> NoiseMapResult<()> {
        let mut stmt = self.conn.prepare_cached(&self.insert_sql).store()?;
        for row in rows {
            let l = row.levels.as_array();
            stmt.execute(params![
                row.receiver_id,
                row.geometry.to_wkt(),
                l[0],
                l[1],
                l[2],
                l[3],
                l[4],
                l[5],
                l[6],
                l[7],
                row.time_bin,
                row.flat_level,
                row.weighted_level,
            ])
            .store()?;
        }
        Ok(())
    }
}

impl ResultSink for SqliteSink<'_> {
    fn prepare(&mut self) -> NoiseMapResult<()> {
        if self.atomic {
            self.begin()?;
        }
        let levels = band_columns(OUTPUT_PREFIX)
            .iter()
            .map(|c| format!("{} REAL NOT NULL", c))
            .collect::<Vec<_>>()
            .join(", ");
        let ddl = format!(
            "DROP TABLE IF EXISTS {table};
             CREATE TABLE {table} (
                 pk INTEGER PRIMARY KEY AUTOINCREMENT,
                 receiver_id INTEGER NOT NULL,
                 geometry TEXT NOT NULL,
                 {levels},
                 time_bin INTEGER NOT NULL,
                 flat_level REAL NOT NULL,
                 weighted_level REAL NOT NULL
             );",
            table = self.table,
            levels = levels
        );
        self.conn.execute_batch(&ddl).store()?;
        tracing::info!(table = %self.table, atomic = self.atomic, "Output table recreated");
        Ok(())
    }

    fn write_receiver(&mut self, rows: &[ResultRow]) -> NoiseMapResult<()> {
        if self.atomic {
            return self.insert(rows);
        }
        self.begin()?;
        match self.insert(rows) {
            Ok(()) => self.commit(),
            Err(e) => {
                self.rollback();
                Err(e)
            }
        }
    }

    fn finish(&mut self) -> NoiseMapResult<()> {
        if self.in_transaction {
            self.commit()?;
        }
        Ok(())
    }

    fn abort(&mut self) {
        if self.in_transaction {
            tracing::warn!(table = %self.table, "Rolling back output");
        }
        self.rollback();
    }
}

impl Drop for SqliteSink<'_> {
    fn drop(&mut self) {
        self.rollback();
    }
}

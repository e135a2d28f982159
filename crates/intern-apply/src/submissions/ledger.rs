use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use tracing::{debug, info};

/// One ledger row: column name to cell text, in column order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerRecord {
    fields: Vec<(String, String)>,
}

impl LedgerRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a column, replacing an existing value without moving it.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(column, value);
        self
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<String>) {
        let column = column.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(name, _)| *name == column) {
            Some((_, existing)) => *existing = value,
            None => self.fields.push((column, value)),
        }
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.as_str())
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Builds a record from a flat JSON object, keeping key order.
    ///
    /// Numbers and booleans are stored as their JSON text and `null` as an
    /// empty cell; nested values are rejected.
    pub fn from_json_object(object: Map<String, Value>) -> Result<Self, RecordError> {
        if object.is_empty() {
            return Err(RecordError::Empty);
        }

        let mut record = Self::new();
        for (column, value) in object {
            if column.trim().is_empty() {
                return Err(RecordError::BlankColumn);
            }
            let cell = match value {
                Value::String(text) => text,
                Value::Null => String::new(),
                Value::Bool(flag) => flag.to_string(),
                Value::Number(number) => number.to_string(),
                Value::Array(_) | Value::Object(_) => {
                    return Err(RecordError::NestedValue { column })
                }
            };
            record.fields.push((column, cell));
        }
        Ok(record)
    }

    fn values_in(&self, header: &[String]) -> Vec<&str> {
        header
            .iter()
            .map(|column| self.get(column).unwrap_or_default())
            .collect()
    }

    fn values(&self) -> Vec<&str> {
        self.fields.iter().map(|(_, value)| value.as_str()).collect()
    }

    fn same_columns_as(&self, header: &[String]) -> bool {
        self.len() == header.len() && header.iter().all(|column| self.get(column).is_some())
    }
}

impl Serialize for LedgerRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (column, value) in &self.fields {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for LedgerRecord {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let object = Map::<String, Value>::deserialize(deserializer)?;
        Self::from_json_object(object).map_err(serde::de::Error::custom)
    }
}

/// Shape problems with a record supplied by a caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    #[error("application data must contain at least one field")]
    Empty,
    #[error("application data contains a blank field name")]
    BlankColumn,
    #[error("field '{column}' must be a string, number, boolean or null")]
    NestedValue { column: String },
}

/// What to do when a record's columns differ from the established header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchemaPolicy {
    /// Reject records whose column set differs from the header.
    #[default]
    Strict,
    /// Write values in the record's own order without checking.
    Lenient,
}

impl SchemaPolicy {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "strict" => Some(Self::Strict),
            "lenient" => Some(Self::Lenient),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("ledger file not found")]
    NotFound,
    #[error(transparent)]
    InvalidRecord(#[from] RecordError),
    #[error("application fields {found:?} do not match ledger columns {expected:?}")]
    SchemaMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },
    #[error("ledger io failure: {0}")]
    Io(#[from] io::Error),
    #[error("ledger is not valid csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("ledger lock poisoned")]
    Poisoned,
    #[error("ledger task did not complete: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Append-only store of submitted applications.
pub trait ResultLedger: Send + Sync {
    fn append(&self, record: LedgerRecord) -> Result<(), LedgerError>;
    fn read_all(&self) -> Result<Vec<LedgerRecord>, LedgerError>;
}

/// Ledger kept as a single CSV file: one header line, one row per record.
///
/// Readers and writers share one lock so a read never sees half a row.
#[derive(Debug)]
pub struct CsvLedger {
    path: PathBuf,
    policy: SchemaPolicy,
    lock: RwLock<()>,
}

impl CsvLedger {
    pub fn new(path: impl Into<PathBuf>, policy: SchemaPolicy) -> Self {
        Self {
            path: path.into(),
            policy,
            lock: RwLock::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn policy(&self) -> SchemaPolicy {
        self.policy
    }

    /// Truncates the ledger to its header line. Run once before serving.
    pub fn reset_keeping_schema(&self) -> Result<(), LedgerError> {
        let _guard = self.lock.write().map_err(|_| LedgerError::Poisoned)?;

        let header = match File::open(&self.path) {
            Ok(file) => {
                let mut line = String::new();
                BufReader::new(file).read_line(&mut line)?;
                line
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err.into()),
        };

        if header.is_empty() {
            return Ok(());
        }

        let mut file = File::create(&self.path)?;
        file.write_all(header.as_bytes())?;
        if !header.ends_with('\n') {
            file.write_all(b"\n")?;
        }
        file.sync_all()?;
        info!(path = %self.path.display(), "ledger reset to header");
        Ok(())
    }

    fn read_header(&self) -> Result<Option<Vec<String>>, LedgerError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        if file.metadata()?.len() == 0 {
            return Ok(None);
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(file);
        let header = reader.headers()?.iter().map(str::to_string).collect();
        Ok(Some(header))
    }

    fn row_for(&self, record: &LedgerRecord, header: &[String]) -> Result<Vec<u8>, LedgerError> {
        let values = match self.policy {
            SchemaPolicy::Strict => {
                if !record.same_columns_as(header) {
                    return Err(LedgerError::SchemaMismatch {
                        expected: header.to_vec(),
                        found: record.columns().map(str::to_string).collect(),
                    });
                }
                record.values_in(header)
            }
            SchemaPolicy::Lenient => record.values(),
        };
        encode_rows(&[values])
    }
}

impl ResultLedger for CsvLedger {
    fn append(&self, record: LedgerRecord) -> Result<(), LedgerError> {
        if record.is_empty() {
            return Err(RecordError::Empty.into());
        }

        let _guard = self.lock.write().map_err(|_| LedgerError::Poisoned)?;

        let bytes = match self.read_header()? {
            Some(header) => self.row_for(&record, &header)?,
            None => {
                let header: Vec<&str> = record.columns().collect();
                encode_rows(&[header, record.values()])?
            }
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(&bytes)?;
        file.flush()?;
        file.sync_data()?;

        debug!(path = %self.path.display(), columns = record.len(), "ledger row appended");
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<LedgerRecord>, LedgerError> {
        let _guard = self.lock.read().map_err(|_| LedgerError::Poisoned)?;

        let contents = match fs::read(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Err(LedgerError::NotFound),
            Err(err) => return Err(err.into()),
        };
        if contents.is_empty() {
            return Ok(Vec::new());
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(contents.as_slice());
        let header: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

        let mut records = Vec::new();
        for row in reader.records() {
            let row = row?;
            let mut record = LedgerRecord::new();
            for (index, column) in header.iter().enumerate() {
                record
                    .fields
                    .push((column.clone(), row.get(index).unwrap_or_default().to_string()));
            }
            records.push(record);
        }
        Ok(records)
    }
}

fn encode_rows(rows: &[Vec<&str>]) -> Result<Vec<u8>, LedgerError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_writer(Vec::new());
    for row in rows {
        writer.write_record(row)?;
    }
    writer
        .into_inner()
        .map_err(|err| LedgerError::Io(err.into_error()))
}

//! Port/protocol to tag lookup table.
//!
//! The table is loaded once from a `dstport,protocol,tag` CSV file and is
//! read-only afterwards. Loading is all-or-nothing: any invalid row fails the
//! whole file.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use crate::protocol::ProtocolTable;

/// Largest lookup table accepted unless configured otherwise.
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// Errors raised while loading the lookup table or the protocol mapping file.
#[derive(Debug)]
pub enum LoadError {
    Io {
        path: PathBuf,
        source: io::Error,
    },
    Csv {
        path: PathBuf,
        source: csv::Error,
    },
    FieldCount {
        path: PathBuf,
        line: u64,
        expected: usize,
        found: usize,
    },
    MissingFields {
        path: PathBuf,
        line: u64,
        min: usize,
        found: usize,
    },
    InvalidPort {
        path: PathBuf,
        line: u64,
        value: String,
    },
    InvalidProtocolNumber {
        path: PathBuf,
        line: u64,
        value: String,
    },
    EmptyProtocol {
        path: PathBuf,
        line: u64,
    },
    EmptyTag {
        path: PathBuf,
        line: u64,
    },
    DuplicateKey {
        path: PathBuf,
        line: u64,
        first_line: u64,
        key: LookupKey,
    },
    TooManyEntries {
        path: PathBuf,
        limit: usize,
    },
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::Io { path, source } => {
                write!(f, "cannot read {}: {}", path.display(), source)
            }
            LoadError::Csv { path, source } => {
                write!(f, "{}: malformed csv: {}", path.display(), source)
            }
            LoadError::FieldCount {
                path,
                line,
                expected,
                found,
            } => write!(
                f,
                "{}:{}: expected {} fields, found {}",
                path.display(),
                line,
                expected,
                found
            ),
            LoadError::MissingFields {
                path,
                line,
                min,
                found,
            } => write!(
                f,
                "{}:{}: expected at least {} fields, found {}",
                path.display(),
                line,
                min,
                found
            ),
            LoadError::InvalidPort { path, line, value } => write!(
                f,
                "{}:{}: invalid port {:?} (must be an integer in 0-65535)",
                path.display(),
                line,
                value
            ),
            LoadError::InvalidProtocolNumber { path, line, value } => write!(
                f,
                "{}:{}: invalid protocol number {:?} (must be an integer in 0-255)",
                path.display(),
                line,
                value
            ),
            LoadError::EmptyProtocol { path, line } => {
                write!(f, "{}:{}: protocol is empty", path.display(), line)
            }
            LoadError::EmptyTag { path, line } => {
                write!(f, "{}:{}: tag is empty", path.display(), line)
            }
            LoadError::DuplicateKey {
                path,
                line,
                first_line,
                key,
            } => write!(
                f,
                "{}:{}: duplicate entry for {} (first defined on line {})",
                path.display(),
                line,
                key,
                first_line
            ),
            LoadError::TooManyEntries { path, limit } => write!(
                f,
                "{}: lookup table exceeds the limit of {} entries",
                path.display(),
                limit
            ),
        }
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LoadError::Io { source, .. } => Some(source),
            LoadError::Csv { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Destination port plus canonical (lowercase) protocol name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LookupKey {
    pub port: u16,
    pub protocol: String,
}

impl LookupKey {
    pub fn new(port: u16, protocol: impl Into<String>) -> Self {
        LookupKey {
            port,
            protocol: protocol.into(),
        }
    }
}

impl fmt::Display for LookupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.port, self.protocol)
    }
}

#[derive(Debug, Clone, Default)]
pub struct LookupTable {
    entries: HashMap<LookupKey, String>,
}

impl LookupTable {
    /// Load and validate the lookup file at `path`.
    pub fn load(
        path: &Path,
        protocols: &ProtocolTable,
        max_entries: usize,
    ) -> Result<Self, LoadError> {
        let file = File::open(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let table = Self::from_reader(file, path, protocols, max_entries)?;
        tracing::info!(
            path = %path.display(),
            entries = table.len(),
            tags = table.tags().len(),
            "loaded lookup table"
        );
        Ok(table)
    }

    /// Parse a lookup table from any reader; `path` is only used in errors.
    pub fn from_reader<R: io::Read>(
        reader: R,
        path: &Path,
        protocols: &ProtocolTable,
        max_entries: usize,
    ) -> Result<Self, LoadError> {
        // Key -> (tag, line it was defined on).
        let mut seen: HashMap<LookupKey, (String, u64)> = HashMap::new();
        let mut first = true;

        for record in csv_reader(reader).records() {
            let record = record.map_err(|source| LoadError::Csv {
                path: path.to_path_buf(),
                source,
            })?;
            if is_blank(&record) {
                continue;
            }
            let line = line_of(&record);
            if std::mem::take(&mut first) && is_header(&record) {
                tracing::debug!(path = %path.display(), line, "skipping lookup header");
                continue;
            }
            if record.len() != 3 {
                return Err(LoadError::FieldCount {
                    path: path.to_path_buf(),
                    line,
                    expected: 3,
                    found: record.len(),
                });
            }

            let port = record[0]
                .parse::<u16>()
                .map_err(|_| LoadError::InvalidPort {
                    path: path.to_path_buf(),
                    line,
                    value: record[0].to_string(),
                })?;
            if record[1].is_empty() {
                return Err(LoadError::EmptyProtocol {
                    path: path.to_path_buf(),
                    line,
                });
            }
            let tag = &record[2];
            if tag.is_empty() {
                return Err(LoadError::EmptyTag {
                    path: path.to_path_buf(),
                    line,
                });
            }

            let key = LookupKey::new(port, protocols.canonicalize(&record[1]));
            if let Some((_, first_line)) = seen.get(&key) {
                return Err(LoadError::DuplicateKey {
                    path: path.to_path_buf(),
                    line,
                    first_line: *first_line,
                    key,
                });
            }
            if seen.len() >= max_entries {
                return Err(LoadError::TooManyEntries {
                    path: path.to_path_buf(),
                    limit: max_entries,
                });
            }
            seen.insert(key, (tag.to_string(), line));
        }

        Ok(LookupTable {
            entries: seen
                .into_iter()
                .map(|(key, (tag, _))| (key, tag))
                .collect(),
        })
    }

    /// Tag for a destination port and canonical protocol name.
    pub fn get(&self, port: u16, protocol: &str) -> Option<&str> {
        self.entries
            .get(&LookupKey::new(port, protocol))
            .map(String::as_str)
    }

    /// Distinct tags, sorted.
    pub fn tags(&self) -> BTreeSet<&str> {
        self.entries.values().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// CSV reader shared by the lookup and protocol mapping files: no implicit
/// header, trimmed fields, rows of varying width.
pub(crate) fn csv_reader<R: io::Read>(reader: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader)
}

/// A first row is a header when its first field is present and not a number.
pub(crate) fn is_header(record: &csv::StringRecord) -> bool {
    record
        .get(0)
        .map_or(false, |field| !field.is_empty() && field.parse::<i64>().is_err())
}

/// Whitespace-only lines come through as a single empty field.
pub(crate) fn is_blank(record: &csv::StringRecord) -> bool {
    record.iter().all(str::is_empty)
}

pub(crate) fn line_of(record: &csv::StringRecord) -> u64 {
    record.position().map_or(0, |pos| pos.line())
}

//! IANA protocol number resolution.
//!
//! Flow log records carry the protocol as a number (`6`), lookup tables name
//! it (`tcp`). Both sides go through a [`ProtocolTable`] so they meet on the
//! same lowercase name.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::io;
use std::path::Path;

use crate::lookup::{self, LoadError};

/// Protocols known without a mapping file.
pub const DEFAULT_PROTOCOLS: [(u8, &str); 3] = [(1, "icmp"), (6, "tcp"), (17, "udp")];

/// Protocol number to lowercase name table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolTable {
    names: BTreeMap<u8, String>,
}

impl Default for ProtocolTable {
    fn default() -> Self {
        ProtocolTable {
            names: DEFAULT_PROTOCOLS
                .iter()
                .map(|(number, name)| (*number, name.to_string()))
                .collect(),
        }
    }
}

impl ProtocolTable {
    /// Default table extended by the `number,name[,description]` rows of `path`.
    pub fn with_mapping_file(path: &Path) -> Result<Self, LoadError> {
        let mut table = ProtocolTable::default();
        let added = table.load_overrides(path)?;
        tracing::info!(path = %path.display(), entries = added, "loaded protocol mappings");
        Ok(table)
    }

    /// Add or replace a single mapping.
    pub fn insert(&mut self, number: u8, name: &str) {
        self.names.insert(number, name.trim().to_lowercase());
    }

    /// Merge the mappings in `path` into this table.
    ///
    /// The file is validated completely before any entry is applied, so a
    /// failed load leaves the table untouched. Returns the number of rows read.
    pub fn load_overrides(&mut self, path: &Path) -> Result<usize, LoadError> {
        let file = std::fs::File::open(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.load_overrides_from(file, path)
    }

    /// Mapping-file parse over any reader; `path` is only used in errors.
    pub fn load_overrides_from<R: io::Read>(
        &mut self,
        reader: R,
        path: &Path,
    ) -> Result<usize, LoadError> {
        let rows = parse_mappings(reader, path)?;
        let count = rows.len();
        self.names.extend(rows);
        Ok(count)
    }

    /// Name registered for `number`, if any.
    pub fn name(&self, number: u8) -> Option<&str> {
        self.names.get(&number).map(String::as_str)
    }

    /// Resolve a protocol number to its name, falling back to the decimal
    /// number itself for protocols the table does not know.
    pub fn resolve(&self, number: u8) -> Cow<'_, str> {
        match self.names.get(&number) {
            Some(name) => Cow::Borrowed(name.as_str()),
            None => Cow::Owned(number.to_string()),
        }
    }

    /// Normalize a protocol as written in a lookup file.
    ///
    /// Names are lowercased; numbers the table knows are replaced by their
    /// name. Unknown numbers are kept as written.
    pub fn canonicalize(&self, raw: &str) -> String {
        let lowered = raw.trim().to_lowercase();
        match lowered.parse::<u8>().ok().and_then(|n| self.name(n)) {
            Some(name) => name.to_string(),
            None => lowered,
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

fn parse_mappings<R: io::Read>(reader: R, path: &Path) -> Result<Vec<(u8, String)>, LoadError> {
    let mut rows = Vec::new();
    let mut first = true;

    for record in lookup::csv_reader(reader).records() {
        let record = record.map_err(|source| LoadError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        if lookup::is_blank(&record) {
            continue;
        }
        let line = lookup::line_of(&record);
        if std::mem::take(&mut first) && lookup::is_header(&record) {
            continue;
        }
        if record.len() < 2 {
            return Err(LoadError::MissingFields {
                path: path.to_path_buf(),
                line,
                min: 2,
                found: record.len(),
            });
        }

        let number = record[0]
            .parse::<u8>()
            .map_err(|_| LoadError::InvalidProtocolNumber {
                path: path.to_path_buf(),
                line,
                value: record[0].to_string(),
            })?;
        let name = record[1].to_lowercase();
        if name.is_empty() {
            return Err(LoadError::EmptyProtocol {
                path: path.to_path_buf(),
                line,
            });
        }
        rows.push((number, name));
    }

    Ok(rows)
}

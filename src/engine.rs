//! One classification run: load the tables, stream the flow log, count.

use std::fmt;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};

use crate::aggregate::{Aggregator, Counts};
use crate::config::Config;
use crate::flowlog::FlowLogReader;
use crate::lookup::{LoadError, LookupTable};
use crate::protocol::ProtocolTable;

#[derive(Debug)]
pub enum RunError {
    Load(LoadError),
    Io { path: PathBuf, source: io::Error },
    FlowLogTooLarge { path: PathBuf, size: u64, limit: u64 },
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunError::Load(err) => write!(f, "{}", err),
            RunError::Io { path, source } => write!(f, "{}: {}", path.display(), source),
            RunError::FlowLogTooLarge { path, size, limit } => write!(
                f,
                "{}: flow log is {} bytes, larger than the {} byte limit",
                path.display(),
                size,
                limit
            ),
        }
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RunError::Load(err) => Some(err),
            RunError::Io { source, .. } => Some(source),
            RunError::FlowLogTooLarge { .. } => None,
        }
    }
}

impl From<LoadError> for RunError {
    fn from(err: LoadError) -> Self {
        RunError::Load(err)
    }
}

/// Result of a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Analysis {
    pub counts: Counts,
    pub malformed_lines: u64,
}

/// Loaded tables plus the settings that govern a run.
#[derive(Debug, Clone)]
pub struct Engine {
    protocols: ProtocolTable,
    lookup: LookupTable,
    untagged: String,
    max_file_bytes: u64,
    max_logged_malformed: u64,
}

impl Engine {
    pub fn new(protocols: ProtocolTable, lookup: LookupTable, untagged: impl Into<String>) -> Self {
        Engine {
            protocols,
            lookup,
            untagged: untagged.into(),
            max_file_bytes: 0,
            max_logged_malformed: 10,
        }
    }

    /// Load the protocol mappings (if configured) and then the lookup table.
    pub fn from_config(config: &Config, lookup_path: &Path) -> Result<Self, RunError> {
        let protocols = match &config.protocols.mapping_file {
            Some(path) => ProtocolTable::with_mapping_file(path)?,
            None => ProtocolTable::default(),
        };
        let lookup = LookupTable::load(lookup_path, &protocols, config.lookup.max_entries)?;

        let mut engine = Engine::new(protocols, lookup, config.lookup.untagged_label.clone());
        engine.max_file_bytes = config.flow_log.max_file_bytes;
        engine.max_logged_malformed = config.flow_log.max_logged_malformed;
        Ok(engine)
    }

    /// Classify every record of the flow log at `path`.
    pub fn analyze_path(&self, path: &Path) -> Result<Analysis, RunError> {
        let io_err = |source| RunError::Io {
            path: path.to_path_buf(),
            source,
        };

        if self.max_file_bytes > 0 {
            let size = std::fs::metadata(path).map_err(io_err)?.len();
            if size > self.max_file_bytes {
                return Err(RunError::FlowLogTooLarge {
                    path: path.to_path_buf(),
                    size,
                    limit: self.max_file_bytes,
                });
            }
        }

        let reader = FlowLogReader::open(path).map_err(io_err)?;
        let analysis = self.analyze(reader).map_err(io_err)?;
        tracing::info!(
            path = %path.display(),
            records = analysis.counts.records,
            malformed = analysis.malformed_lines,
            pairs = analysis.counts.port_protocols.len(),
            "flow log analyzed"
        );
        Ok(analysis)
    }

    /// Classify the records of an already opened flow log.
    pub fn analyze<R: BufRead>(&self, reader: FlowLogReader<R>) -> io::Result<Analysis> {
        let mut reader = reader.with_malformed_log_limit(self.max_logged_malformed);
        let mut aggregator = Aggregator::new(&self.lookup, &self.protocols, self.untagged.as_str());

        for record in reader.by_ref() {
            aggregator.observe(&record?);
        }

        Ok(Analysis {
            counts: aggregator.finish(),
            malformed_lines: reader.malformed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::DEFAULT_UNTAGGED;
    use crate::lookup::DEFAULT_MAX_ENTRIES;

    fn engine(lookup: &str) -> Engine {
        let protocols = ProtocolTable::default();
        let lookup = LookupTable::from_reader(
            lookup.as_bytes(),
            Path::new("lookup.csv"),
            &protocols,
            DEFAULT_MAX_ENTRIES,
        )
        .unwrap();
        Engine::new(protocols, lookup, DEFAULT_UNTAGGED)
    }

    #[test]
    fn all_malformed_still_reports_tags() {
        let engine = engine("443,tcp,web\n");
        let log = "garbage\n1 123 eni x y 1 2 6 1 1 1 1 ACCEPT OK\n";
        let analysis = engine.analyze(FlowLogReader::new(log.as_bytes())).unwrap();
        assert_eq!(analysis.malformed_lines, 2);
        assert_eq!(analysis.counts.records, 0);
        assert_eq!(analysis.counts.tags.get("web"), Some(&0));
        assert_eq!(analysis.counts.tags.get("Untagged"), Some(&0));
        assert!(analysis.counts.port_protocols.is_empty());
    }

    #[test]
    fn malformed_lines_do_not_count() {
        let engine = engine("443,tcp,web\n");
        let log = "2 123456789012 eni-1 10.0.0.1 10.0.0.2 5000 443 6 1 60 1620140761 1620140821 ACCEPT OK\n\
                   2 123456789012 eni-1 10.0.0.1 10.0.0.2 5000 443 6 1 60 1620140761\n";
        let analysis = engine.analyze(FlowLogReader::new(log.as_bytes())).unwrap();
        assert_eq!(analysis.counts.records, 1);
        assert_eq!(analysis.counts.tags["web"], 1);
        assert_eq!(analysis.malformed_lines, 1);
    }

    #[test]
    fn missing_flow_log_names_the_path() {
        let engine = engine("443,tcp,web\n");
        let err = engine
            .analyze_path(Path::new("/nonexistent/flow.log"))
            .unwrap_err();
        assert!(matches!(err, RunError::Io { .. }));
        assert!(err.to_string().starts_with("/nonexistent/flow.log: "));
    }
}

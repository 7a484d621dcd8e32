//! flowtag library crate: tags VPC flow log records by destination port and
//! protocol and counts them. Re-exports modules for the binary, benchmarks and
//! tests.

pub mod aggregate;
pub mod config;
pub mod engine;
pub mod flowlog;
pub mod lookup;
pub mod protocol;
pub mod report;

pub use aggregate::{Aggregator, Counts, PortProtocolCounts, TagCounts};
pub use config::{Config, ConfigError};
pub use engine::{Analysis, Engine, RunError};
pub use flowlog::{parse_line, FlowLogReader, FlowRecord, ParseError};
pub use lookup::{LoadError, LookupKey, LookupTable};
pub use protocol::ProtocolTable;
pub use report::ReportFormat;

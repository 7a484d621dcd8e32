//! VPC flow log (version 2) reader.
//!
//! A version 2 record is one line of 14 whitespace separated fields:
//!
//! ```text
//! version account-id interface-id srcaddr dstaddr srcport dstport protocol packets bytes start end action log-status
//! 2       123456789012 eni-0a1b2c3d 10.0.1.201 198.51.100.2 49153 443 6 25 20000 1620140761 1620140821 ACCEPT OK
//! ```
//!
//! [`FlowLogReader`] streams records one line at a time. Lines that do not
//! parse are skipped and counted rather than failing the run.

use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::net::IpAddr;
use std::path::Path;
use std::str::FromStr;

/// The only flow log format version understood.
pub const FLOW_LOG_VERSION: &str = "2";

/// Number of fields in a version 2 record.
pub const FIELD_COUNT: usize = 14;

/// One parsed flow log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowRecord {
    pub version: u8,
    pub account_id: String,
    pub interface_id: String,
    pub src_addr: IpAddr,
    pub dst_addr: IpAddr,
    pub src_port: u16,
    pub dst_port: u16,
    pub protocol: u8,
    pub packets: u64,
    pub bytes: u64,
    pub start: u64,
    pub end: u64,
    pub action: String,
    pub log_status: String,
}

/// Why a single flow log line was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    FieldCount { found: usize },
    UnsupportedVersion(String),
    InvalidNumber { field: &'static str, value: String },
    InvalidAddress { field: &'static str, value: String },
    InvalidUtf8,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::FieldCount { found } => {
                write!(f, "expected {} fields, found {}", FIELD_COUNT, found)
            }
            ParseError::UnsupportedVersion(version) => write!(
                f,
                "unsupported flow log version {:?} (only version {} is supported)",
                version, FLOW_LOG_VERSION
            ),
            ParseError::InvalidNumber { field, value } => {
                write!(f, "invalid {}: {:?}", field, value)
            }
            ParseError::InvalidAddress { field, value } => {
                write!(f, "invalid {} address: {:?}", field, value)
            }
            ParseError::InvalidUtf8 => write!(f, "line is not valid UTF-8"),
        }
    }
}

impl std::error::Error for ParseError {}

/// Parse a single flow log line.
pub fn parse_line(line: &str) -> Result<FlowRecord, ParseError> {
    let fields: Vec<&str> = line.split_ascii_whitespace().collect();
    let [version, account_id, interface_id, src_addr, dst_addr, src_port, dst_port, protocol, packets, bytes, start, end, action, log_status] =
        <[&str; FIELD_COUNT]>::try_from(fields.as_slice()).map_err(|_| {
            ParseError::FieldCount {
                found: fields.len(),
            }
        })?;

    if version != FLOW_LOG_VERSION {
        return Err(ParseError::UnsupportedVersion(version.to_string()));
    }

    Ok(FlowRecord {
        version: 2,
        account_id: account_id.to_string(),
        interface_id: interface_id.to_string(),
        src_addr: address("srcaddr", src_addr)?,
        dst_addr: address("dstaddr", dst_addr)?,
        src_port: number("srcport", src_port)?,
        dst_port: number("dstport", dst_port)?,
        protocol: number("protocol", protocol)?,
        packets: number("packets", packets)?,
        bytes: number("bytes", bytes)?,
        start: number("start", start)?,
        end: number("end", end)?,
        action: action.to_string(),
        log_status: log_status.to_string(),
    })
}

fn number<T: FromStr>(field: &'static str, value: &str) -> Result<T, ParseError> {
    value.parse().map_err(|_| ParseError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}

fn address(field: &'static str, value: &str) -> Result<IpAddr, ParseError> {
    value.parse().map_err(|_| ParseError::InvalidAddress {
        field,
        value: value.to_string(),
    })
}

/// Lazy iterator over the records of a flow log.
///
/// Yields `Err` only for read failures; malformed lines are skipped and
/// counted in [`FlowLogReader::malformed`]. Blank lines are ignored.
pub struct FlowLogReader<R> {
    reader: R,
    buf: Vec<u8>,
    line: u64,
    records: u64,
    malformed: u64,
    max_logged_malformed: u64,
}

impl FlowLogReader<BufReader<File>> {
    pub fn open(path: &Path) -> io::Result<Self> {
        Ok(FlowLogReader::new(BufReader::new(File::open(path)?)))
    }
}

impl<R: BufRead> FlowLogReader<R> {
    pub fn new(reader: R) -> Self {
        FlowLogReader {
            reader,
            buf: Vec::new(),
            line: 0,
            records: 0,
            malformed: 0,
            max_logged_malformed: 10,
        }
    }

    /// Number of malformed lines reported at warn level; later ones go to debug.
    pub fn with_malformed_log_limit(mut self, limit: u64) -> Self {
        self.max_logged_malformed = limit;
        self
    }

    /// Last line number read (1-based).
    pub fn line_number(&self) -> u64 {
        self.line
    }

    /// Records yielded so far.
    pub fn records(&self) -> u64 {
        self.records
    }

    /// Non-blank lines skipped because they did not parse.
    pub fn malformed(&self) -> u64 {
        self.malformed
    }

    fn skip(&mut self, err: ParseError) {
        self.malformed += 1;
        if self.malformed <= self.max_logged_malformed {
            tracing::warn!(line = self.line, error = %err, "skipping malformed flow log line");
            if self.malformed == self.max_logged_malformed {
                tracing::warn!("further malformed lines are logged at debug level");
            }
        } else {
            tracing::debug!(line = self.line, error = %err, "skipping malformed flow log line");
        }
    }
}

impl<R: BufRead> Iterator for FlowLogReader<R> {
    type Item = io::Result<FlowRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Some(Err(e)),
            }
            self.line += 1;

            let parsed = match std::str::from_utf8(&self.buf) {
                Ok(line) if line.trim().is_empty() => continue,
                Ok(line) => parse_line(line),
                Err(_) => Err(ParseError::InvalidUtf8),
            };

            match parsed {
                Ok(record) => {
                    self.records += 1;
                    return Some(Ok(record));
                }
                Err(err) => self.skip(err),
            }
        }
    }
}

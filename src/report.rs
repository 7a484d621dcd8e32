//! Report rendering.
//!
//! The text report has two CSV-like sections separated by a blank line:
//!
//! ```text
//! Tag Counts:
//! Tag,Count
//! Untagged,1
//! sv_P2,2
//!
//! Port/Protocol Combination Counts:
//! Port,Protocol,Count
//! 443,tcp,2
//! 9999,udp,1
//! ```

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::aggregate::{PortProtocolCounts, TagCounts};
use crate::engine::Analysis;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

/// Render the text report. Tags sort by byte order, pairs by port then name.
pub fn render_text(tags: &TagCounts, port_protocols: &PortProtocolCounts) -> String {
    let mut out = String::new();
    out.push_str("Tag Counts:\n");
    out.push_str("Tag,Count\n");
    for (tag, count) in tags {
        out.push_str(&format!("{},{}\n", csv_escape(tag), count));
    }

    out.push_str("\nPort/Protocol Combination Counts:\n");
    out.push_str("Port,Protocol,Count\n");
    for ((port, protocol), count) in port_protocols {
        out.push_str(&format!("{},{},{}\n", port, csv_escape(protocol), count));
    }
    out
}

#[derive(Serialize)]
struct JsonReport<'a> {
    tag_counts: Vec<TagRow<'a>>,
    port_protocol_counts: Vec<PortProtocolRow<'a>>,
    records: u64,
    malformed_lines: u64,
}

#[derive(Serialize)]
struct TagRow<'a> {
    tag: &'a str,
    count: u64,
}

#[derive(Serialize)]
struct PortProtocolRow<'a> {
    port: u16,
    protocol: &'a str,
    count: u64,
}

pub fn render_json(analysis: &Analysis) -> Result<String, serde_json::Error> {
    let report = JsonReport {
        tag_counts: analysis
            .counts
            .tags
            .iter()
            .map(|(tag, count)| TagRow { tag, count: *count })
            .collect(),
        port_protocol_counts: analysis
            .counts
            .port_protocols
            .iter()
            .map(|((port, protocol), count)| PortProtocolRow {
                port: *port,
                protocol,
                count: *count,
            })
            .collect(),
        records: analysis.counts.records,
        malformed_lines: analysis.malformed_lines,
    };
    let mut json = serde_json::to_string_pretty(&report)?;
    json.push('\n');
    Ok(json)
}

pub fn render(format: ReportFormat, analysis: &Analysis) -> Result<String, serde_json::Error> {
    match format {
        ReportFormat::Text => Ok(render_text(
            &analysis.counts.tags,
            &analysis.counts.port_protocols,
        )),
        ReportFormat::Json => render_json(analysis),
    }
}

/// Write the rendered report to `path`, replacing any existing file.
pub fn write_report(path: &Path, format: ReportFormat, analysis: &Analysis) -> io::Result<()> {
    let rendered = render(format, analysis)?;
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(rendered.as_bytes())?;
    writer.flush()
}

/// Escape a CSV field: wrap in double quotes if it contains comma, quote, or newline.
fn csv_escape(field: &str) -> std::borrow::Cow<'_, str> {
    if field.contains(&[',', '"', '\n', '\r'][..]) {
        format!("\"{}\"", field.replace('"', "\"\"")).into()
    } else {
        field.into()
    }
}

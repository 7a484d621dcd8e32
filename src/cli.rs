use clap::Parser;
use flowtag::ReportFormat;
use std::path::PathBuf;

/// flowtag: tag AWS VPC flow log records by destination port and protocol
#[derive(Parser, Debug)]
#[command(name = "flowtag", version, about)]
pub struct Cli {
    /// CSV lookup table of `dstport,protocol,tag` rows
    pub lookup_file: PathBuf,

    /// Version 2 VPC flow log, one record per line
    pub flow_log_file: PathBuf,

    /// Where to write the report
    pub output_file: PathBuf,

    /// TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// CSV of `number,name` rows extending the built-in protocol table
    #[arg(short, long)]
    pub protocol_map: Option<PathBuf>,

    /// Report format
    #[arg(short, long, value_enum)]
    pub format: Option<ReportFormat>,

    /// Tag used for records without a lookup entry
    #[arg(long)]
    pub untagged_label: Option<String>,

    /// Maximum number of lookup table entries
    #[arg(long)]
    pub max_lookup_entries: Option<usize>,

    /// Reject flow logs larger than this many bytes (0 = unlimited)
    #[arg(long)]
    pub max_flow_log_bytes: Option<u64>,

    /// Do not print the run summary
    #[arg(short, long)]
    pub quiet: bool,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

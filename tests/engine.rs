use std::fs;
use std::path::{Path, PathBuf};

use flowtag::report::{self, ReportFormat};
use flowtag::{Config, Engine, LoadError, RunError};
use tempfile::{tempdir, TempDir};

const LOOKUP: &str = "dstport,protocol,tag\n443,tcp,sv_P2\n23,tcp,sv_P1\n25,tcp,sv_P1\n";

fn flow_line(dst_port: u16, protocol: u8) -> String {
    format!(
        "2 123456789012 eni-0a1b2c3d 10.0.1.201 198.51.100.2 49153 {dst_port} {protocol} 25 20000 1620140761 1620140821 ACCEPT OK\n"
    )
}

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        Fixture {
            dir: tempdir().unwrap(),
        }
    }

    fn file(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

fn run_text(config: &Config, lookup: &Path, flow_log: &Path, output: &Path) -> String {
    let engine = Engine::from_config(config, lookup).unwrap();
    let analysis = engine.analyze_path(flow_log).unwrap();
    report::write_report(output, ReportFormat::Text, &analysis).unwrap();
    fs::read_to_string(output).unwrap()
}

#[test]
fn tags_and_counts_sample_log() {
    let fx = Fixture::new();
    let lookup = fx.file("lookup.csv", LOOKUP);
    let log: String = [flow_line(443, 6), flow_line(443, 6), flow_line(23, 6), flow_line(9999, 17)].concat();
    let flow_log = fx.file("flow.log", &log);

    let text = run_text(&Config::default(), &lookup, &flow_log, &fx.path("out.txt"));
    assert_eq!(
        text,
        "Tag Counts:\n\
         Tag,Count\n\
         Untagged,1\n\
         sv_P1,1\n\
         sv_P2,2\n\
         \n\
         Port/Protocol Combination Counts:\n\
         Port,Protocol,Count\n\
         23,tcp,1\n\
         443,tcp,2\n\
         9999,udp,1\n"
    );
}

#[test]
fn repeated_runs_are_byte_identical() {
    let fx = Fixture::new();
    let lookup = fx.file("lookup.csv", LOOKUP);
    let log: String = (0..200u16)
        .map(|i| flow_line([443, 23, 25, 80, 53][usize::from(i % 5)], [6, 17, 1][usize::from(i % 3)]))
        .collect();
    let flow_log = fx.file("flow.log", &log);

    let first = run_text(&Config::default(), &lookup, &flow_log, &fx.path("a.txt"));
    let second = run_text(&Config::default(), &lookup, &flow_log, &fx.path("b.txt"));
    assert_eq!(first, second);
}

#[test]
fn empty_flow_log_lists_tags_at_zero() {
    let fx = Fixture::new();
    let lookup = fx.file("lookup.csv", LOOKUP);
    let flow_log = fx.file("flow.log", "");

    let text = run_text(&Config::default(), &lookup, &flow_log, &fx.path("out.txt"));
    assert_eq!(
        text,
        "Tag Counts:\nTag,Count\nUntagged,0\nsv_P1,0\nsv_P2,0\n\n\
         Port/Protocol Combination Counts:\nPort,Protocol,Count\n"
    );
}

#[test]
fn unknown_protocol_number_is_untagged() {
    let fx = Fixture::new();
    let lookup = fx.file("lookup.csv", LOOKUP);
    let flow_log = fx.file("flow.log", &flow_line(443, 99));

    let text = run_text(&Config::default(), &lookup, &flow_log, &fx.path("out.txt"));
    assert!(text.contains("Untagged,1\n"));
    assert!(text.contains("sv_P2,0\n"));
    assert!(text.ends_with("443,99,1\n"));
}

#[test]
fn protocol_mapping_file_extends_defaults() {
    let fx = Fixture::new();
    let mappings = fx.file(
        "protocol_mappings.csv",
        "protocol_number,protocol_name,description\n47,gre,Generic Routing Encapsulation\n",
    );
    let lookup = fx.file("lookup.csv", "dstport,protocol,tag\n0,GRE,tunnel\n443,6,web\n");
    let flow_log = fx.file("flow.log", &[flow_line(0, 47), flow_line(443, 6)].concat());

    let mut config = Config::default();
    config.protocols.mapping_file = Some(mappings);
    let text = run_text(&config, &lookup, &flow_log, &fx.path("out.txt"));
    assert!(text.contains("tunnel,1\n"));
    assert!(text.contains("web,1\n"));
    assert!(text.contains("Untagged,0\n"));
    assert!(text.contains("0,gre,1\n"));
}

#[test]
fn malformed_lines_are_skipped_and_counted() {
    let fx = Fixture::new();
    let lookup = fx.file("lookup.csv", LOOKUP);
    let log = format!(
        "{}\n   \n3 123456789012 eni-1 10.0.0.1 10.0.0.2 1 443 6 1 1 1 1 ACCEPT OK\n2 short line\n{}",
        flow_line(23, 6).trim_end(),
        flow_line(25, 6)
    );
    let flow_log = fx.file("flow.log", &log);

    let engine = Engine::from_config(&Config::default(), &lookup).unwrap();
    let analysis = engine.analyze_path(&flow_log).unwrap();
    assert_eq!(analysis.counts.records, 2);
    assert_eq!(analysis.malformed_lines, 2);
    assert_eq!(analysis.counts.tags["sv_P1"], 2);
}

#[test]
fn duplicate_lookup_key_aborts_before_reading_log() {
    let fx = Fixture::new();
    let lookup = fx.file("lookup.csv", "443,tcp,a\n443,TCP,b\n");

    let err = Engine::from_config(&Config::default(), &lookup).unwrap_err();
    assert!(matches!(
        err,
        RunError::Load(LoadError::DuplicateKey { line: 2, first_line: 1, .. })
    ));
}

#[test]
fn bad_protocol_mapping_file_is_fatal() {
    let fx = Fixture::new();
    let lookup = fx.file("lookup.csv", LOOKUP);
    let mappings = fx.file("protocols.csv", "number,name\nsix,tcp\n");

    let mut config = Config::default();
    config.protocols.mapping_file = Some(mappings);
    let err = Engine::from_config(&config, &lookup).unwrap_err();
    assert!(matches!(
        err,
        RunError::Load(LoadError::InvalidProtocolNumber { line: 2, .. })
    ));
}

#[test]
fn oversized_flow_log_is_rejected() {
    let fx = Fixture::new();
    let lookup = fx.file("lookup.csv", LOOKUP);
    let flow_log = fx.file("flow.log", &flow_line(443, 6).repeat(10));

    let mut config = Config::default();
    config.flow_log.max_file_bytes = 100;
    let engine = Engine::from_config(&config, &lookup).unwrap();
    let err = engine.analyze_path(&flow_log).unwrap_err();
    assert!(matches!(err, RunError::FlowLogTooLarge { limit: 100, .. }));

    config.flow_log.max_file_bytes = 0;
    let engine = Engine::from_config(&config, &lookup).unwrap();
    assert_eq!(engine.analyze_path(&flow_log).unwrap().counts.records, 10);
}

#[test]
fn json_report_written_to_file() {
    let fx = Fixture::new();
    let lookup = fx.file("lookup.csv", LOOKUP);
    let flow_log = fx.file("flow.log", &[flow_line(443, 6), "garbage\n".to_string()].concat());
    let output = fx.path("out.json");

    let engine = Engine::from_config(&Config::default(), &lookup).unwrap();
    let analysis = engine.analyze_path(&flow_log).unwrap();
    report::write_report(&output, ReportFormat::Json, &analysis).unwrap();

    let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
    assert_eq!(value["records"], 1);
    assert_eq!(value["malformed_lines"], 1);
    assert_eq!(value["tag_counts"].as_array().unwrap().len(), 3);
    assert_eq!(value["port_protocol_counts"][0]["port"], 443);
}

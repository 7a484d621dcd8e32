mod cli;

use clap::Parser;
use flowtag::{report, Config, ConfigError, Engine, RunError};

fn main() {
    let args = cli::Cli::parse();

    // Initialize tracing/logging
    let log_level = match args.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {}", err);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(&args, &config) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

/// Load the tables, classify the flow log and write the report.
fn run(args: &cli::Cli, config: &Config) -> Result<(), RunError> {
    let engine = Engine::from_config(config, &args.lookup_file)?;
    let analysis = engine.analyze_path(&args.flow_log_file)?;

    report::write_report(&args.output_file, config.output.format, &analysis).map_err(
        |source| RunError::Io {
            path: args.output_file.clone(),
            source,
        },
    )?;

    if !config.output.quiet {
        println!(
            "Analysis complete. Results written to {}",
            args.output_file.display()
        );
        println!(
            "{} records classified, {} port/protocol combinations, {} malformed lines skipped",
            analysis.counts.records,
            analysis.counts.port_protocols.len(),
            analysis.malformed_lines
        );
    }
    Ok(())
}

/// Config file values overridden by command line flags.
fn load_config(args: &cli::Cli) -> Result<Config, ConfigError> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    if let Some(value) = &args.protocol_map {
        config.protocols.mapping_file = if value.as_os_str().is_empty() {
            None
        } else {
            Some(value.clone())
        };
    }
    if let Some(value) = args.format {
        config.output.format = value;
    }
    if let Some(value) = &args.untagged_label {
        config.lookup.untagged_label = value.clone();
    }
    if let Some(value) = args.max_lookup_entries {
        config.lookup.max_entries = value;
    }
    if let Some(value) = args.max_flow_log_bytes {
        config.flow_log.max_file_bytes = value;
    }
    if args.quiet {
        config.output.quiet = true;
    }

    config.validate()?;
    Ok(config)
}

//! CLI for the charpanel characteristic panel pipeline.
//!
//! This binary lists the characteristic taxonomy and runs the normalization
//! and decile portfolio stages over CSV input files.

use charpanel::{
    CharacteristicGroup, CsvSink, CsvSource, Pipeline, PipelineConfig, RunSummary, Taxonomy,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tracing::error;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "charpanel")]
#[command(about = "Characteristic panel normalization and decile portfolio returns", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List all characteristics in the taxonomy
    List,
    /// Show information about a specific characteristic
    Info {
        /// Characteristic name
        characteristic: String,
    },
    /// Normalize the panel and compute portfolio returns
    Run {
        /// Stock-date characteristic panel (CSV)
        #[arg(long)]
        characteristics: PathBuf,

        /// Monthly excess return panel (CSV)
        #[arg(long)]
        returns: PathBuf,

        /// Directory for the two output files
        #[arg(long, default_value = "data")]
        out_dir: PathBuf,

        /// JSON configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Run every stage on a single thread
        #[arg(long)]
        sequential: bool,
    },
}

fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run() {
        error!(error = %e, "charpanel failed");
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let taxonomy = Taxonomy::with_defaults();

    match cli.command {
        Commands::List => list_characteristics(&taxonomy),
        Commands::Info { characteristic } => show_characteristic_info(&taxonomy, &characteristic)?,
        Commands::Run {
            characteristics,
            returns,
            out_dir,
            config,
            sequential,
        } => {
            let mut config = match config {
                Some(path) => PipelineConfig::from_json_file(path)?,
                None => PipelineConfig::default(),
            };
            config.force_sequential |= sequential;

            std::fs::create_dir_all(&out_dir)?;
            let pipeline = Pipeline::new(config)?;
            let source = CsvSource::new(characteristics, returns);
            let mut sink = CsvSink::in_dir(&out_dir);
            let summary = pipeline.run(&source, &mut sink)?;
            print_summary(&summary);
        }
    }

    Ok(())
}

/// List all characteristics grouped by refresh frequency.
fn list_characteristics(taxonomy: &Taxonomy) {
    println!("Available Characteristics ({} total)\n", taxonomy.len());

    for group in [
        CharacteristicGroup::Annual,
        CharacteristicGroup::Quarterly,
        CharacteristicGroup::Monthly,
    ] {
        let members = taxonomy.by_group(group);
        println!("{} ({}):", group, members.len());
        for c in members {
            println!("  {:>3}  {}", c.id, c.name);
        }
        println!();
    }
}

/// Show detailed information about a specific characteristic.
fn show_characteristic_info(
    taxonomy: &Taxonomy,
    name: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let Some(characteristic) = taxonomy.get(name) else {
        eprintln!("\nAvailable characteristics:");
        for c in taxonomy.iter() {
            eprintln!("  {}", c.name);
        }
        return Err(charpanel::PanelError::NotFound(name.to_string()).into());
    };

    println!("Characteristic: {}", characteristic.name);
    println!("Catalogue id: {}", characteristic.id);
    println!("Refresh: {}", characteristic.group);
    if let Some(position) = taxonomy.position(name) {
        println!("Output column: {}", position + 1);
    }
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!("Dates:            {}", summary.dates);
    println!("Rows:             {}", summary.rows);
    println!("Characteristics:  {}", summary.characteristics);
    println!("Observations:     {}", summary.observations);
    println!("Missing:          {}", summary.missing);
    println!("Duplicate returns dropped: {}", summary.duplicate_returns);

    if !summary.is_complete() {
        println!("\nFailed units ({}):", summary.failures.len());
        for failure in &summary.failures {
            println!("  {}", failure);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_flags() {
        let cli = Cli::try_parse_from([
            "charpanel",
            "run",
            "--characteristics",
            "data/datashare.csv",
            "--returns",
            "data/month_return.csv",
            "--sequential",
        ])
        .unwrap();

        match cli.command {
            Commands::Run {
                out_dir,
                config,
                sequential,
                ..
            } => {
                assert_eq!(out_dir, PathBuf::from("data"));
                assert!(config.is_none());
                assert!(sequential);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_info_unknown_characteristic() {
        let taxonomy = Taxonomy::with_defaults();
        assert!(show_characteristic_info(&taxonomy, "mom1m").is_ok());
        assert!(show_characteristic_info(&taxonomy, "nope").is_err());
    }
}

use anyhow::{Context, Result};
use idsort::config::{ConfigManager, RunConfig, TransportConfig};
use idsort::engines::generation::RunSummary;
use idsort::genomes::{MagnetSet, MagnetSorter};
use idsort::runner::{self, LocalRunner};
use std::path::PathBuf;
use std::sync::Arc;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    if args.iter().skip(1).any(|a| a == "-h" || a == "--help") {
        print_usage(&args[0]);
        return Ok(());
    }

    if args.get(1).map(String::as_str) == Some("--example") {
        print!(
            "{}",
            toml::to_string_pretty(&RunConfig::default()).context("rendering example config")?
        );
        return Ok(());
    }

    let manager = ConfigManager::new();
    match args.get(1) {
        Some(path) => manager
            .load_from_file(path)
            .with_context(|| format!("loading config from {}", path))?,
        None => manager
            .load_from_env()
            .context("reading IDSORT_* environment variables")?,
    }
    if let Some(dir) = args.get(2) {
        manager
            .update(|c| c.checkpoint.output_directory = PathBuf::from(dir))
            .context("setting output directory")?;
    }
    let config = manager.get();

    let magnets = Arc::new(MagnetSet::generate(&config.magnets));
    log::info!(
        "sorting {} magnets, output in {}",
        magnets.len(),
        config.checkpoint.output_directory.display()
    );

    match &config.cluster.transport {
        TransportConfig::Local => {
            let summaries = LocalRunner::new(config.clone())
                .run(|_| Ok(MagnetSorter::new(Arc::clone(&magnets))))
                .context("local run failed")?;
            for summary in &summaries {
                print_summary(summary);
            }
        }
        TransportConfig::Tcp { .. } => {
            let summary = runner::run_tcp(&config, MagnetSorter::new(magnets))
                .context("tcp run failed")?;
            print_summary(&summary);
        }
    }

    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!(
        "rank {}: {} generations{}, best here {:.6e}, global best {:.6e}, {} checkpoints ({} failed)",
        summary.rank,
        summary.generations,
        if summary.stopped_at_target { " (target reached)" } else { "" },
        summary.local_best.unwrap_or(f64::NAN),
        summary.global_best.unwrap_or(f64::NAN),
        summary.checkpoints_written,
        summary.checkpoint_failures
    );
}

fn print_usage(program: &str) {
    eprintln!("Usage: {} [config.toml|config.json] [output_dir]", program);
    eprintln!();
    eprintln!("Run the distributed magnet sorter.");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  config      Run configuration (defaults plus IDSORT_* variables if omitted)");
    eprintln!("  output_dir  Overrides checkpoint.output_directory");
    eprintln!();
    eprintln!("  --example   Print the default configuration");
}

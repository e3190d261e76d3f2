use anyhow::Result;
use clap::{CommandFactory, Parser};
use ctctrain::app::{inspect_partition, load_base_config, resolve_train_config, run_train};
use ctctrain::cli::{Cli, Commands, OutputFormat};
use ctctrain::engine::DryRunEngine;
use ctctrain::logging;
use ctctrain::partition::PartitionSummary;
use owo_colors::OwoColorize;

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.quiet, cli.verbose);

    match cli.command {
        Commands::Train(args) => {
            let config = resolve_train_config(&args, cli.config.as_deref())?;
            let mut engine = DryRunEngine::new();
            let config = run_train(config, &mut engine)?;
            if !cli.quiet {
                println!(
                    "{} {} training batches visited, model dir {}",
                    "Done:".green(),
                    engine.batches_seen(),
                    config.model_dir().display()
                );
            }
        }
        Commands::Inspect {
            partition,
            data,
            output,
        } => {
            let mut config = load_base_config(cli.config.as_deref())?;
            data.apply(&mut config);
            let summary = inspect_partition(&config, &partition)?;
            match output {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
                OutputFormat::Table => print_summary(&summary),
            }
        }
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "ctctrain", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn print_summary(summary: &PartitionSummary) {
    println!("Partition {}:", summary.partition.green());
    println!("  {}      {}", "Utterances:".dimmed(), summary.utterances);
    println!("  {}         {}", "Batches:".dimmed(), summary.batches);
    println!(
        "  {}      {} .. {} (mean {:.1})",
        "Batch size:".dimmed(),
        summary.min_batch,
        summary.max_batch,
        summary.mean_batch
    );
    println!(
        "  {}          {} .. {}",
        "Frames:".dimmed(),
        summary.min_frames,
        summary.max_frames
    );
    println!("  {}     {}", "Feature dim:".dimmed(), summary.feature_dim);
    println!("  {}  {:?}", "Alphabet sizes:".dimmed(), summary.alphabet_sizes);
}

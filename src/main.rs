use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use trail_evolve::config::manager::ConfigManager;
use trail_evolve::engines::evaluation::{moves_of, serve, TrailEvaluator};
use trail_evolve::engines::generation::ProgressMessage;
use trail_evolve::services::{resolve_context, EvolutionRunner};
use trail_evolve::types::Action;

#[derive(Parser)]
#[command(name = "trail-evolve", version, about = "Evolve trail-following controllers")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the configured evolution
    Run {
        /// TOML config; environment overrides use TRAIL_EVOLVE__<SECTION>__<KEY>
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Override the number of generations
        #[arg(long)]
        generations: Option<usize>,
        /// Override the RNG seed
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Evaluate tasks from stdin for a remote pool
    Worker,
    /// Write the default configuration
    InitConfig {
        #[arg(default_value = "trail-evolve.toml")]
        path: PathBuf,
    },
}

fn action_string(actions: &[Action]) -> String {
    actions
        .iter()
        .map(|a| match a {
            Action::None => '.',
            Action::Left => 'L',
            Action::Right => 'R',
            Action::Forward => 'F',
        })
        .collect()
}

fn run(config: Option<PathBuf>, generations: Option<usize>, seed: Option<u64>) -> Result<()> {
    let manager = ConfigManager::new();
    if let Some(path) = &config {
        manager
            .load_from_file(path)
            .with_context(|| format!("loading {}", path.display()))?;
    }
    manager.update(|c| {
        if let Some(generations) = generations {
            c.run.generations = generations;
        }
        if seed.is_some() {
            c.run.seed = seed;
        }
    })?;
    let app = manager.get()?;

    let context = Arc::new(resolve_context(&app.run, &app.runtime)?);
    let mut runner = EvolutionRunner::start(app)?;

    while let Some(message) = runner.next_progress() {
        if let ProgressMessage::GenerationComplete(event) = message {
            println!(
                "[{:5.1}%] generation {:>4}  elite {}  food avg {:.2} std {:.2}  moves avg {:.1}",
                event.percent_complete,
                event.generation + 1,
                event.elite_fitness,
                event.stats.food.avg,
                event.stats.food.std,
                event.stats.moves.avg
            );
        }
    }

    let reports = runner.wait()?;
    for report in &reports {
        let outcome = &report.outcome;
        println!(
            "Repeat {}: {} after {} generations",
            report.repeat + 1,
            outcome.stop_reason,
            outcome.generations_run
        );
        if let Some(best) = &outcome.best {
            if let Some(fitness) = best.fitness {
                println!("  best: {}", fitness);
            }
            let moves = moves_of(&best.genes, &context)?;
            println!("  moves: {}", action_string(&moves));
        }
        if let Some(id) = report.run_id {
            println!("  recorded as {}", id);
        }
        if let Some(warning) = &report.persistence_warning {
            eprintln!("  warning: run not recorded: {}", warning);
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            config,
            generations,
            seed,
        } => run(config, generations, seed),
        Command::Worker => {
            let stdin = io::stdin();
            let served = serve(stdin.lock(), io::stdout().lock(), &TrailEvaluator)?;
            log::debug!("Worker exiting after {} tasks", served);
            Ok(())
        }
        Command::InitConfig { path } => {
            ConfigManager::new().save_to_file(&path)?;
            println!("Wrote default configuration to {}", path.display());
            Ok(())
        }
    }
}

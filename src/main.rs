use std::time::{Duration, Instant};

use colored::Colorize;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use hgs_vrptw::stop::MaxRuntime;
use hgs_vrptw::{CommandLine, GeneticSearch, ProblemData, Result};

fn main() {
    if let Err(err) = run() {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env()) // reads RUST_LOG
        .with(fmt::layer().compact())
        .init();

    let args: Vec<String> = std::env::args().collect();
    let cli = CommandLine::parse(&args)?;

    let data = ProblemData::from_file(&cli.instance_path)?;
    info!(
        clients = data.num_clients(),
        vehicles = data.num_vehicles(),
        "loaded {}",
        cli.instance_path.display()
    );

    let start = Instant::now();

    let mut search = GeneticSearch::new(&data, &cli.config)?;
    let mut stop = MaxRuntime::new(Duration::from_secs(cli.config.time_limit));
    let result = search.run(&mut stop);

    if let Some(stats_path) = &cli.config.stats_path {
        result.statistics.write_csv(stats_path)?;
    }

    match result.best {
        Some(best) => {
            best.write_to(
                &cli.solution_path,
                search.penalties(),
                start.elapsed().as_secs_f64(),
            )?;

            let summary = format!(
                "Cost {} in {} iterations ({:.2}s)",
                best.cost(search.penalties()),
                result.iterations,
                result.elapsed.as_secs_f64()
            );

            if best.is_feasible() {
                println!("{}", summary.green());
            } else {
                println!("{}", summary.red());
            }
        }
        None => println!("{}", "No solution found".red()),
    }

    Ok(())
}

// Interactive front end
//
// Prompts for the base parameters and an optional sweep, runs every value
// with node storage under `platform_verification/`, and prints the
// comparison table.

use std::fmt::Display;
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::str::FromStr;

use log::LevelFilter;
use simple_logger::SimpleLogger;

use dpki_sim::ca_experiment::print_table;
use dpki_sim::ca_file_backend::reset_dir;
use dpki_sim::{
    parse_sweep_values, ExperimentRunner, RcgenProvider, SimulationConfig, StorageMode, Sweep,
    SweepVariable,
};

const STORAGE_DIR: &str = "platform_verification";
const RULE: &str = "==========================================================";

/// Read one trimmed line; `None` at end of input
fn read_line(input: &mut impl BufRead, prompt: &str) -> Option<String> {
    print!("{}", prompt);
    let _ = io::stdout().flush();

    let mut line = String::new();
    match input.read_line(&mut line) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(line.trim().to_string()),
    }
}

/// Prompt until a value parses; empty input (or end of input) keeps `default`
fn prompt_value<T>(input: &mut impl BufRead, label: &str, default: T) -> T
where
    T: FromStr + Display + Copy,
{
    loop {
        let Some(line) = read_line(input, &format!("{} [{}]: ", label, default)) else {
            return default;
        };
        if line.is_empty() {
            return default;
        }
        match line.parse() {
            Ok(value) => return value,
            Err(_) => println!("Invalid number."),
        }
    }
}

fn main() {
    SimpleLogger::new()
        .with_level(LevelFilter::Warn)
        .env()
        .init()
        .unwrap();

    let stdin = io::stdin();
    let mut input = stdin.lock();

    println!("{}", RULE);
    println!("   PKI/DPKI Simulation Engineering Platform");
    println!("{}", RULE);
    println!("(Values in brackets [] are defaults - press Enter to accept)");

    let defaults = SimulationConfig::default();
    println!("\nPlease configure base parameters:");
    let base = SimulationConfig {
        period: prompt_value(&mut input, "Period T (s)", defaults.period),
        risk_weight: prompt_value(&mut input, "Risk Cost V1", defaults.risk_weight),
        update_weight: prompt_value(&mut input, "Update Cost V2", defaults.update_weight),
        attack_rate: prompt_value(&mut input, "Attack Rate p (1/s)", defaults.attack_rate),
        nodes: prompt_value(&mut input, "Number of Nodes M", defaults.nodes),
        ..defaults
    };

    println!("\n----------------------------------------------------------");
    println!("Select variable to sweep (multi-group experiment):");
    println!("1. T (Period)");
    println!("2. V1 (Risk Cost)");
    println!("3. V2 (Update Cost)");
    println!("4. p (Attack Rate)");
    println!("5. M (Number of Nodes)");
    println!("(Press Enter to skip multi-group experiment and run single test with current config)");

    let choice = read_line(&mut input, "Enter choice (1-5): ").unwrap_or_default();
    let sweep = if choice.is_empty() {
        println!("\nNo choice made. Running single experiment with current settings.");
        Sweep::single()
    } else {
        let Some(variable) = SweepVariable::from_menu(&choice) else {
            println!("Invalid choice. Exiting.");
            return;
        };
        println!("\nYou selected to sweep: {}", variable);
        let line = read_line(
            &mut input,
            &format!("Enter values for {} (comma separated): ", variable),
        )
        .unwrap_or_default();
        match parse_sweep_values(variable, &line) {
            Ok(values) => Sweep::over(variable, values),
            Err(e) => {
                println!("Invalid values format: {}", e);
                return;
            }
        }
    };

    if Path::new(STORAGE_DIR).exists() {
        println!("\nCleaning up history records in '{}'...", STORAGE_DIR);
        if let Err(e) = reset_dir(Path::new(STORAGE_DIR)) {
            println!("Warning: Failed to clean {}: {}", STORAGE_DIR, e);
        }
    }

    let runs = sweep.values.len().max(1);
    println!("\nRunning experiments for {} value(s)...", runs);

    let runner = ExperimentRunner::new(base, RcgenProvider::new())
        .with_storage(StorageMode::Directory(STORAGE_DIR.into()))
        .log_events(log::log_enabled!(log::Level::Debug));
    let results = match runner.run(&sweep) {
        Ok(results) => results,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let label = sweep.variable.map_or("Experiment", |v| v.name());
    println!("\n{}", RULE);
    println!(" Experiment Results (Varying {})", label);
    println!("{}", RULE);
    print_table(sweep.variable, &results);
    println!("{}", RULE);
}

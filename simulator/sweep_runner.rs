// Sweep Runner - Load and execute experiment YAML files
//
// Usage:
//   cargo run --bin sweep_runner scenarios/period_sweep.yaml
//   cargo run --bin sweep_runner scenarios/  (runs all .yaml files in directory)
//   cargo run --bin sweep_runner scenarios/period_sweep.yaml --seed 0x1234...
//   cargo run --bin sweep_runner scenarios/ --output results.yaml

use dpki_sim::ca_experiment::print_table;
use dpki_sim::{
    ExperimentResult, ExperimentRunner, RcgenProvider, SimulationConfig, StorageMode, Sweep,
};
use simple_logger::SimpleLogger;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Scenario file format
#[derive(Debug, serde::Deserialize)]
struct ScenarioFile {
    /// Scenario metadata
    #[serde(default)]
    meta: ScenarioMeta,

    /// Base configuration; missing fields take the interactive defaults
    #[serde(default)]
    base: SimulationConfig,

    /// Swept variable and values; absent means a single run
    #[serde(default)]
    sweep: Sweep,

    /// Base seed as hex; overridden by --seed
    #[serde(default)]
    seed: Option<String>,

    #[serde(default)]
    storage: StorageMode,

    /// Forward simulation events to the log
    #[serde(default)]
    log_events: bool,
}

#[derive(Debug, Default, serde::Deserialize)]
struct ScenarioMeta {
    name: Option<String>,
    description: Option<String>,
    hypothesis: Option<String>,
}

/// Results of one scenario, as written by --output
#[derive(Debug, serde::Serialize)]
struct ScenarioReport {
    scenario: String,
    variable: Option<String>,
    results: Vec<ExperimentResult>,
}

struct Options {
    path: PathBuf,
    seed: Option<[u8; 32]>,
    output: Option<PathBuf>,
}

fn usage(program: &str) -> ! {
    eprintln!(
        "Usage: {} <scenario.yaml | directory/> [--seed SEED_HEX] [--output FILE]",
        program
    );
    eprintln!("\nExamples:");
    eprintln!("  {} scenarios/period_sweep.yaml", program);
    eprintln!("  {} scenarios/", program);
    eprintln!("  {} scenarios/period_sweep.yaml --seed 0x123456...", program);
    eprintln!("  {} scenarios/ --output results.yaml", program);
    std::process::exit(1);
}

fn parse_args() -> Options {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        usage(&args[0]);
    }

    let mut options = Options {
        path: PathBuf::from(&args[1]),
        seed: None,
        output: None,
    };

    let mut rest = args[2..].iter();
    while let Some(flag) = rest.next() {
        match (flag.as_str(), rest.next()) {
            ("--seed", Some(value)) => options.seed = Some(parse_seed_hex(value)),
            ("--output", Some(value)) => options.output = Some(PathBuf::from(value)),
            _ => usage(&args[0]),
        }
    }
    options
}

fn main() {
    SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .env()
        .init()
        .unwrap();

    let options = parse_args();
    let path = options.path.as_path();

    let reports = if path.is_file() {
        vec![run_scenario_file(path, options.seed)]
    } else if path.is_dir() {
        run_scenario_directory(path, options.seed)
    } else {
        eprintln!("Error: Path does not exist: {}", path.display());
        std::process::exit(1);
    };

    if let Some(output) = options.output {
        let yaml = serde_yaml::to_string(&reports).unwrap_or_else(|e| {
            eprintln!("Failed to serialize results: {}", e);
            std::process::exit(1);
        });
        fs::write(&output, yaml).unwrap_or_else(|e| {
            eprintln!("Failed to write {}: {}", output.display(), e);
            std::process::exit(1);
        });
        println!("Results written to {}", output.display());
    }
}

fn run_scenario_directory(dir: &Path, seed: Option<[u8; 32]>) -> Vec<ScenarioReport> {
    let mut scenarios = Vec::new();

    // Find all .yaml files
    if let Ok(entries) = fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            let ext = path.extension().and_then(|s| s.to_str());
            if ext == Some("yaml") || ext == Some("yml") {
                scenarios.push(path);
            }
        }
    }

    scenarios.sort();

    if scenarios.is_empty() {
        eprintln!("No .yaml files found in {}", dir.display());
        std::process::exit(1);
    }

    println!("\n╔════════════════════════════════════════════════════════╗");
    println!("║  SWEEP RUNNER - Multiple Scenarios                     ║");
    println!("╚════════════════════════════════════════════════════════╝\n");
    println!("Found {} scenario(s) to run\n", scenarios.len());

    let mut reports = Vec::with_capacity(scenarios.len());
    for (i, scenario_path) in scenarios.iter().enumerate() {
        println!("\n{}/{} Running: {}\n", i + 1, scenarios.len(), scenario_path.display());
        reports.push(run_scenario_file(scenario_path, seed));
    }

    println!("\n╔════════════════════════════════════════════════════════╗");
    println!("║  All scenarios complete!                               ║");
    println!("╚════════════════════════════════════════════════════════╝\n");

    reports
}

fn run_scenario_file(path: &Path, seed: Option<[u8; 32]>) -> ScenarioReport {
    println!("Loading scenario from: {}", path.display());

    let yaml_content = fs::read_to_string(path).unwrap_or_else(|e| {
        eprintln!("Failed to read {}: {}", path.display(), e);
        std::process::exit(1);
    });

    let scenario: ScenarioFile = serde_yaml::from_str(&yaml_content).unwrap_or_else(|e| {
        eprintln!("Failed to parse {}: {}", path.display(), e);
        std::process::exit(1);
    });

    let name = scenario.meta.name.clone().unwrap_or_else(|| {
        path.file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("scenario")
            .to_string()
    });

    // Print scenario header
    println!("\n╔════════════════════════════════════════════════════════╗");
    println!("║  {}{}║", name, " ".repeat(54_usize.saturating_sub(name.chars().count())));
    println!("╚════════════════════════════════════════════════════════╝\n");

    if let Some(ref desc) = scenario.meta.description {
        println!("{}\n", desc);
    }

    if let Some(ref hypothesis) = scenario.meta.hypothesis {
        println!("Hypothesis:");
        println!("  {}\n", hypothesis);
    }

    let base = scenario.base;
    println!("Configuration:");
    println!("  M: {} (K = {})", base.nodes, base.threshold());
    println!("  T: {}", base.period);
    println!("  p: {}", base.attack_rate);
    println!("  V1: {}, V2: {}", base.risk_weight, base.update_weight);
    println!("  Certificates: {}", base.total_certs);
    println!("  Periods: {}", base.total_periods);
    match scenario.sweep.variable {
        Some(variable) => println!("  Sweep: {} over {:?}", variable, scenario.sweep.values),
        None => println!("  Sweep: none (single run)"),
    }
    println!("\nStarting simulation...\n");

    let mut runner = ExperimentRunner::new(base, RcgenProvider::new())
        .with_storage(scenario.storage)
        .log_events(scenario.log_events);
    if let Some(seed) = seed.or_else(|| scenario.seed.as_deref().map(parse_seed_hex)) {
        runner = runner.with_seed(seed);
    }

    let results = runner.run(&scenario.sweep).unwrap_or_else(|e| {
        eprintln!("Scenario {} failed: {}", name, e);
        std::process::exit(1);
    });

    print_table(scenario.sweep.variable, &results);
    println!("\n✓ Scenario complete!\n");

    ScenarioReport {
        scenario: name,
        variable: scenario.sweep.variable.map(|v| v.name().to_string()),
        results,
    }
}

fn parse_seed_hex(hex: &str) -> [u8; 32] {
    let hex = hex.strip_prefix("0x").unwrap_or(hex);
    let bytes = hex::decode(hex).unwrap_or_else(|e| {
        eprintln!("Invalid hex seed: {}", e);
        std::process::exit(1);
    });
    if bytes.len() > 32 {
        eprintln!("Invalid hex seed: more than 32 bytes");
        std::process::exit(1);
    }

    // shorter seeds are zero-padded on the right
    let mut seed = [0u8; 32];
    seed[..bytes.len()].copy_from_slice(&bytes);
    seed
}

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

use dsptb::config::Config;
use dsptb::scenarios;

#[derive(Parser)]
#[command(name = "dsptb", about = "Run the DSP circuit regression")]
struct Cli {
    /// Scenarios to run, as `test`, `suite` or `suite::test`. Adds to TESTCASE.
    scenarios: Vec<String>,

    /// Only run this suite
    #[arg(long)]
    suite: Option<String>,

    /// Base random seed (overrides RANDOM_SEED)
    #[arg(long)]
    seed: Option<u64>,

    /// Directory for the interchange files
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// Path of the junit report
    #[arg(long)]
    results: Option<PathBuf>,

    /// External flow graph program instead of the in-process engine
    #[arg(long)]
    engine_cmd: Option<String>,

    /// List the scenarios and exit
    #[arg(long)]
    list: bool,

    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut cfg = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("dsptb: {}", e);
            return ExitCode::from(2);
        }
    };
    if let Some(seed) = cli.seed {
        cfg.seed = seed;
    }
    if let Some(dir) = cli.work_dir {
        cfg.work_dir = dir;
    }
    if let Some(path) = cli.results {
        cfg.results = path;
    }
    if cli.engine_cmd.is_some() {
        cfg.engine_cmd = cli.engine_cmd;
    }
    cfg.verbose |= cli.verbose;
    cfg.testcase.extend(cli.scenarios);

    let mut suites = scenarios::all();
    if let Some(name) = &cli.suite {
        suites.retain(|s| &s.name == name);
        if suites.is_empty() {
            eprintln!("dsptb: no suite named '{}'", name);
            return ExitCode::from(2);
        }
    }

    let cfg = cfg.install();

    if cli.list {
        for suite in &suites {
            for test in suite.iter() {
                let mark = if test.skip { " (skipped)" } else { "" };
                println!("{}::{}{}", suite.name, test.name, mark);
            }
        }
        return ExitCode::SUCCESS;
    }

    if dsptb::run_suites(&mut suites, cfg) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

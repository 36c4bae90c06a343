use anyhow::{bail, Context};
use clap::Parser;
use encoder::{SolverConfig, DEFAULT_TIMEOUT_MS};
use intent_solver::{analyze_file, collect_inputs, AnalysisConfig};
use log::*;
use logging::{level_for, raise_error, Logger};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::process::exit;

#[derive(Parser, Debug)]
#[command(version, about = "Solves the path constraints of decompiled Android components", long_about = None)]
struct Args {
    /// DOT files, or directories scanned for *.dot
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Write one <stem>.txt report per input instead of printing
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Per-path solver timeout, 0 disables it
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_MS)]
    timeout_ms: u64,

    /// Distinct solutions reported per path
    #[arg(short = 'n', long, default_value_t = 1)]
    solutions: usize,

    /// Print each path's constraints as comment lines
    #[arg(long)]
    show_constraints: bool,

    /// More output, repeat for more
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Errors only
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

impl Args {
    fn validate(&self) -> anyhow::Result<()> {
        if self.solutions == 0 {
            bail!("--solutions must be at least 1");
        }
        Ok(())
    }

    fn config(&self) -> AnalysisConfig {
        AnalysisConfig {
            solver: SolverConfig {
                timeout_ms: (self.timeout_ms > 0).then_some(self.timeout_ms),
                max_solutions: self.solutions,
            },
            show_constraints: self.show_constraints,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    Logger::new(level_for(args.verbose, args.quiet)).init()?;
    args.validate()?;
    let config = args.config();

    let files = collect_inputs(&args.inputs)?;
    if let Some(dir) = &args.output_dir {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }

    let mut failed = 0usize;
    let stdout = std::io::stdout();
    for file in &files {
        info!("analyzing {}", file.display());
        let report = match analyze_file(file, &config) {
            Ok(report) => report,
            Err(e) => {
                raise_error(&format!("{}: {}", file.display(), e), 4);
                failed += 1;
                continue;
            }
        };
        let text = report.render(config.show_constraints);
        match &args.output_dir {
            Some(dir) => {
                let stem = file.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
                let out = dir.join(format!("{}.txt", stem));
                fs::write(&out, text).with_context(|| format!("writing {}", out.display()))?;
                debug!("wrote {}", out.display());
            }
            None => {
                stdout.lock().write_all(text.as_bytes()).context("writing report")?;
            }
        }
    }

    if failed > 0 {
        error!("{} of {} input files failed", failed, files.len());
        exit(1);
    }
    Ok(())
}

use std::fs;
use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use colored::control::set_override as set_color_override;
use colored::Colorize;

use autograde::{Flag, Report};

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Pretty-print grading reports produced by the autograde engine"
)]
struct Cli {
    // Report JSON file; read from stdin when omitted
    #[arg(value_name = "REPORT")]
    report: Option<PathBuf>,

    #[arg(long = "no-color", help = "Disable colored output")]
    no_color: bool,

    #[arg(short = 'v', long = "verbose", help = "Verbose logging")]
    verbose: bool,
}

fn painted(flag: Flag, text: &str) -> String {
    match flag {
        Flag::Correct => text.green().to_string(),
        Flag::Incorrect => text.red().to_string(),
        Flag::Error => text.red().bold().to_string(),
        Flag::Debug => text.dimmed().to_string(),
        Flag::Info => text.to_string(),
        Flag::LintConvention | Flag::LintRefactor | Flag::LintWarning | Flag::LintFatal => {
            text.yellow().to_string()
        }
    }
}

fn print_report(report: &Report) {
    for test in &report.tests {
        println!("{}", test.title.bold());
        for (i, run) in test.runs.iter().enumerate() {
            println!();
            println!("---- run {} ----", i + 1);
            for message in &run.output {
                println!("{}", painted(message.flag, &message.msg));
            }
        }
        println!();
    }
    let verdict = format!(
        "score: {} / {}",
        report.result.score, report.result.max
    );
    if report.result.correct {
        println!("{}", verdict.green().bold());
    } else {
        println!("{}", verdict.red().bold());
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        std::env::var("RUST_LOG").unwrap_or_else(|_| "autograde=info".to_string())
    } else {
        std::env::var("RUST_LOG").unwrap_or_else(|_| "autograde=warn".to_string())
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if cli.no_color {
        set_color_override(false);
    }

    let raw = match &cli.report {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("cannot read stdin")?;
            buf
        }
    };

    let report: Report =
        serde_json::from_str(raw.trim()).context("input is not a grading report")?;
    print_report(&report);
    Ok(())
}

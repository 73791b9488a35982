// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Markwerk command line: grade a file or folder of scanned answer sheets
// against an answer key and write the results as JSON.

use std::path::PathBuf;
use std::process;

use clap::Parser;
use markwerk_core::human_errors::humanize_error;

mod grade;
mod inputs;
mod output;

#[derive(Parser, Debug)]
#[command(
    name = "markwerk",
    version,
    about = "Grade scanned multiple-choice answer sheets"
)]
struct Cli {
    /// Answer key JSON
    #[arg(long)]
    answer_key: PathBuf,

    /// Scan image, or a folder of scans (jpg, png, bmp, tif)
    #[arg(long)]
    input: PathBuf,

    /// Settings JSON (defaults are used when omitted)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output directory
    #[arg(long, default_value = "./markwerk-results")]
    output: PathBuf,

    /// Sheets processed at once (overrides the settings file)
    #[arg(long)]
    concurrency: Option<usize>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let options = grade::GradeOptions {
        answer_key: cli.answer_key,
        input: cli.input,
        config: cli.config,
        output: cli.output,
        concurrency: cli.concurrency,
    };

    match grade::execute(&options).await {
        Ok(run) => {
            println!(
                "{} ({} questions)",
                run.manifest.exam_title, run.manifest.total_questions
            );
            print!("{}", output::render_summary(&run.outcome, &run.config.report));
            println!("Results written to {}", options.output.display());
        }
        Err(err) => {
            let human = humanize_error(&err);
            eprintln!("Error: {}", human.message);
            eprintln!("  {}", human.suggestion);
            tracing::debug!(error = %err, severity = ?human.severity, "Run failed");
            process::exit(1);
        }
    }
}

use std::fs;
use std::path::PathBuf;
use std::process;

use clap::Parser;
use log::LevelFilter;

use relift::analyzer;
use relift::format::OutputFormat;
use relift::parser;
use relift::AnalysisError;

/// Lift an executable into a structured intermediate representation.
#[derive(Parser, Debug)]
#[command(name = "relift", version, about)]
struct Args {
    /// Path to the executable to analyze
    executable: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Source language override for the detection heuristic
    #[arg(long, default_value = "auto", value_parser = ["auto", "c", "go"])]
    lang: String,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Verbose progress on standard error
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();

    env_logger::Builder::from_default_env()
        .filter_level(if args.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Warn
        })
        .init();

    if let Err(e) = run(args) {
        eprintln!("error: {}", e);
        process::exit(1);
    }
}

fn run(args: Args) -> Result<(), AnalysisError> {
    let binary = parser::parse_executable(&args.executable)?;
    log::debug!("parsed {} binary, {} arch", binary.format, binary.arch);

    let mut analysis = analyzer::analyze(binary)?;

    // an explicit language wins over the heuristic
    if args.lang != "auto" {
        analysis.detected_language = args.lang.clone();
        analysis.confidence = 1.0;
    }
    log::debug!(
        "detected language: {} (confidence: {:.2}%)",
        analysis.detected_language,
        analysis.confidence * 100.0
    );

    let output = args.format.formatter().format(&analysis)?;

    match &args.output {
        Some(path) => {
            fs::write(path, output)?;
            log::debug!("output written to {}", path.display());
        }
        None => print!("{}", output),
    }

    Ok(())
}

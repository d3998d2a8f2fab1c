//! Headless counting run over one photo.
//!
//! Loads the image together with any persisted session state next to it
//! (training masks, palette swatch, search index), runs the count pipeline
//! and prints the per-color tallies. Useful for batch counting once a
//! palette has been trained interactively.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use votetally::{LogSink, Snapshot, SnapshotError, Tuning};

#[derive(Parser)]
#[command(name = "votetally", about = "Count color-coded vote cards in a photo")]
struct Args {
    /// Photo of the card scene
    image: PathBuf,

    /// JSON file with pipeline tunables (fuzz, thresholds, size limit)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Confidence tolerance override, in Lab units per channel
    #[arg(long)]
    threshold: Option<f32>,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(SnapshotError::ClassifierNotReady) => {
            eprintln!("no trained palette found next to the image; train the colors first");
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> votetally::Result<()> {
    let mut tuning = match &args.config {
        Some(path) => Tuning::from_json_file(path)?,
        None => Tuning::default(),
    };
    if let Some(threshold) = args.threshold {
        tuning.color_diff_threshold = threshold;
    }

    let mut snapshot = Snapshot::open(&args.image, tuning)?;
    let counts = snapshot.count()?;

    for count in &counts {
        println!("{}", count);
    }
    snapshot.report_counts(&mut LogSink);
    Ok(())
}

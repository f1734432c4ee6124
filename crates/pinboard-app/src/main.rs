//! Main application entry point (headless).
//!
//! Opens a board on launch and optionally inserts images and saves it,
//! which is enough to script board edits from the command line.

use clap::Parser;
use kurbo::Point;
use pinboard_core::{Board, BoardConfig, JobReport, Source};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(name = "pinboard", version, about = "Reference image board")]
struct Args {
    /// Board file to open on launch.
    file: Option<PathBuf>,

    /// Images (paths or URLs) to insert.
    #[arg(short, long, num_args = 1..)]
    insert: Vec<String>,

    /// Where to insert images, as "x,y".
    #[arg(long, default_value = "0,0", value_parser = parse_point)]
    at: Point,

    /// Save the board here. Without a value, saves back to FILE.
    #[arg(short, long, num_args = 0..=1)]
    save: Option<Option<PathBuf>>,

    /// Config file; defaults to the platform config directory.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long, default_value = "info")]
    loglevel: String,
}

fn parse_point(value: &str) -> Result<Point, String> {
    let (x, y) = value
        .split_once(',')
        .ok_or_else(|| format!("expected x,y but got {value:?}"))?;
    let x = x.trim().parse::<f64>().map_err(|e| e.to_string())?;
    let y = y.trim().parse::<f64>().map_err(|e| e.to_string())?;
    Ok(Point::new(x, y))
}

fn load_config(path: Option<PathBuf>) -> BoardConfig {
    let Some(path) = path.or_else(BoardConfig::default_path) else {
        return BoardConfig::default();
    };
    BoardConfig::load(&path).unwrap_or_else(|e| {
        log::error!("Ignoring config {}: {}", path.display(), e);
        BoardConfig::default()
    })
}

/// Wait for the board's job and log its outcome.
fn finish(board: &mut Board) -> Option<JobReport> {
    let report = board.wait_job()?;
    for error in &report.errors {
        log::error!("{:?} {}: {}", report.kind, report.label, error);
    }
    Some(report)
}

fn run(args: Args) -> Result<bool, pinboard_core::BoardError> {
    let mut board = Board::new(load_config(args.config));
    let mut ok = true;

    if let Some(file) = &args.file {
        board.open(file)?;
        ok &= finish(&mut board).is_some_and(|report| report.is_success());
        if !ok {
            return Ok(false);
        }
    }

    if !args.insert.is_empty() {
        let sources = args.insert.iter().map(|s| Source::parse(s)).collect();
        board.insert_images(sources, args.at)?;
        if let Some(report) = finish(&mut board) {
            log::info!("Inserted {} images", report.inserted.len());
            ok &= report.is_success();
        }
    }

    match args.save {
        Some(Some(path)) => board.save_as(path)?,
        Some(None) => board.save()?,
        None => {
            if !board.is_clean() {
                log::warn!("Board has unsaved changes; pass --save to keep them");
            }
            return Ok(ok);
        }
    }
    ok &= finish(&mut board).is_some_and(|report| report.is_success());
    Ok(ok)
}

fn main() -> ExitCode {
    let args = Args::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&args.loglevel)).init();
    log::info!("Starting Pinboard");

    match run(args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

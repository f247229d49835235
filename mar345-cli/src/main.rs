//! Command-line tool for mar345 images: read, scale, combine and rewrite.
//!
//! Mirrors the classic `rw345` workflow: read one image, optionally add a
//! second (each with its own scale factor), and write the sum under the
//! first image's header.
#![allow(
    clippy::uninlined_format_args,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]

use clap::{ArgAction, Parser};
use mar345_io::{HeaderSource, Mar345Image, RawPixelTransfer};
use std::path::PathBuf;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("container error: {0}")]
    Mar345(#[from] mar345_io::Error),

    #[error("bad scale '{0}': use -s 1.0 or -s 1.0,2.0 or alike")]
    Scale(String),

    #[error("images differ in size: {0} vs {1} pixels")]
    SizeMismatch(usize, usize),

    #[error("no input file given")]
    MissingInput,

    #[error("header dump failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Read, scale, combine and write mar345 detector images.
#[derive(Parser)]
#[command(name = "mar345")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// First input image
    #[arg(short = '1', long)]
    file1: Option<PathBuf>,

    /// Second input image, added to the first
    #[arg(short = '2', long)]
    file2: Option<PathBuf>,

    /// Scale factor(s) applied per input, e.g. "1.5" or "(1.5,0.8)"
    #[arg(short, long)]
    scale: Option<String>,

    /// Output width in pixels (defaults to the first image's width)
    #[arg(short, long, default_value_t = 0)]
    x: u32,

    /// Output height in pixels (defaults to the first image's height)
    #[arg(short, long, default_value_t = 0)]
    y: u32,

    /// Output image
    #[arg(short, long)]
    outfile: Option<PathBuf>,

    /// Print the decoded header of the first image as JSON
    #[arg(long)]
    json: bool,

    /// Increase verbosity (repeatable)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Bare file names: first input, second input, output (in that order)
    names: Vec<PathBuf>,
}

fn main() {
    let mut cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();

    // Bare arguments fill the file slots in order, like the original tool.
    for name in cli.names.drain(..).collect::<Vec<_>>() {
        if cli.file1.is_none() {
            cli.file1 = Some(name);
        } else if cli.file2.is_none() {
            cli.file2 = Some(name);
        } else if cli.outfile.is_none() {
            cli.outfile = Some(name);
        }
    }

    if let Err(err) = run(&cli) {
        eprintln!("mar345: {err}");
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let (scale1, scale2) = match &cli.scale {
        Some(arg) => parse_scale(arg)?,
        None => (1.0, 1.0),
    };

    let file1 = cli.file1.as_ref().ok_or(CliError::MissingInput)?;
    let transfer = RawPixelTransfer;

    let mut img1 = Mar345Image::new();
    img1.read(file1, &transfer)?;
    print_summary(&file1.display().to_string(), &img1);

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&img1.header)?);
    }

    if scale1 != 1.0 {
        scale_grid(&mut img1.data, scale1);
    }

    if let Some(file2) = &cli.file2 {
        let mut img2 = Mar345Image::new();
        img2.read(file2, &transfer)?;
        print_summary(&file2.display().to_string(), &img2);
        if scale2 != 1.0 {
            scale_grid(&mut img2.data, scale2);
        }
        if img2.data.len() != img1.data.len() {
            return Err(CliError::SizeMismatch(img1.data.len(), img2.data.len()));
        }
        for (a, b) in img1.data.iter_mut().zip(&img2.data) {
            *a = a.saturating_add(*b);
        }
    }

    if let Some(outfile) = &cli.outfile {
        let source = if cli.x > 0 && cli.y > 0 {
            let mut header = img1.header.clone();
            header.x = cli.x;
            header.y = cli.y;
            header.pixels = cli.x.saturating_mul(cli.y);
            HeaderSource::FromHeader(header)
        } else {
            match img1.raw_header.clone() {
                Some(raw) => HeaderSource::FromRawBytes(raw),
                None => HeaderSource::FromHeader(img1.header.clone()),
            }
        };

        let data = img1.data.clone();
        let mut out = Mar345Image::new();
        out.write(outfile, &data, source, &transfer)?;
        print_summary(&outfile.display().to_string(), &out);
    }

    Ok(())
}

/// Parses one or two scale factors; brackets, braces, parentheses and
/// commas are stripped first.
fn parse_scale(arg: &str) -> Result<(f64, f64)> {
    let cleaned: String = arg
        .chars()
        .map(|c| if "[](){},".contains(c) { ' ' } else { c })
        .collect();
    let parts: Vec<&str> = cleaned.split_whitespace().collect();
    let bad = || CliError::Scale(arg.to_string());
    match parts.as_slice() {
        [one] => {
            let s1: f64 = one.parse().map_err(|_| bad())?;
            Ok((s1, 1.0))
        }
        [one, two] => {
            let s1: f64 = one.parse().map_err(|_| bad())?;
            let s2: f64 = two.parse().map_err(|_| bad())?;
            Ok((s1, s2))
        }
        _ => Err(bad()),
    }
}

/// Scales a grid in place, truncating back to integer counts.
fn scale_grid(data: &mut [u32], factor: f64) {
    for value in data {
        *value = (f64::from(*value) * factor) as u32;
    }
}

fn print_summary(name: &str, img: &Mar345Image) {
    let (mean, max) = grid_stats(&img.data);
    println!(
        "mar345: {} || {}x{} pixels || mean: {:6.1} || max: {:6.0}",
        name, img.x, img.y, mean, f64::from(max)
    );
}

fn grid_stats(data: &[u32]) -> (f64, u32) {
    if data.is_empty() {
        return (0.0, 0);
    }
    let sum: u64 = data.iter().map(|&v| u64::from(v)).sum();
    let max = data.iter().copied().max().unwrap_or(0);
    (sum as f64 / data.len() as f64, max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_scale_factor() {
        assert_eq!(parse_scale("1.5").unwrap(), (1.5, 1.0));
    }

    #[test]
    fn two_scale_factors_with_decorations() {
        assert_eq!(parse_scale("1.0,2.0").unwrap(), (1.0, 2.0));
        assert_eq!(parse_scale("(1.5, 0.8)").unwrap(), (1.5, 0.8));
        assert_eq!(parse_scale("[2,3]").unwrap(), (2.0, 3.0));
        assert_eq!(parse_scale("{0.5}").unwrap(), (0.5, 1.0));
    }

    #[test]
    fn malformed_scale_is_rejected() {
        assert!(parse_scale("abc").is_err());
        assert!(parse_scale("1.0,2.0,3.0").is_err());
        assert!(parse_scale("").is_err());
    }

    #[test]
    fn scaling_truncates_like_integer_counts() {
        let mut data = vec![10, 3];
        scale_grid(&mut data, 0.5);
        assert_eq!(data, vec![5, 1]);
    }

    #[test]
    fn stats_over_small_grid() {
        let (mean, max) = grid_stats(&[1, 2, 3, 70_000]);
        assert_eq!(max, 70_000);
        assert!((mean - 17_501.5).abs() < 1e-9);
    }
}

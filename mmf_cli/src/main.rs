use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use image::{DynamicImage, GrayImage, ImageBuffer, Luma, RgbImage};
use serde::Serialize;
use xxhash_rust::xxh3::xxh3_64;

use mmf_core::{FileHeader, Image, MmfStack, PixelFormat, SegmentDescriptor, VirtualStack};

// ── CLI definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "mmf",
    about = "Inspect MMF movie files and pull individual frames out of them",
    version
)]
struct Cli {
    /// Log segment loads and recovered decode failures (overrides RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print header metadata and the segment table
    Info {
        /// MMF file to inspect
        file: PathBuf,
        /// Print one line per segment
        #[arg(long)]
        segments: bool,
        /// Emit machine-readable JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Decode one frame and write it as a PNG
    ///
    /// Only the segment holding the frame is read from disk.
    Frame {
        /// MMF file
        file: PathBuf,
        /// 1-based frame number
        #[arg(short, long)]
        number: u32,
        /// Destination PNG file
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Print an xxh3-64 digest of every decoded frame in a range
    Digest {
        /// MMF file
        file: PathBuf,
        /// First frame (default: 1)
        #[arg(long)]
        first: Option<u32>,
        /// Last frame (default: the final frame)
        #[arg(long)]
        last: Option<u32>,
    },
    /// Benchmark random seeks the way a scrubbing UI issues them
    Scrub {
        /// MMF file
        file: PathBuf,
        /// Number of frame requests
        #[arg(short, long, default_value_t = 1000)]
        count: u64,
        /// Fixed random seed for reproducibility
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Scrub within this many frames of the last position (0 = jump anywhere)
        #[arg(short, long, default_value_t = 0)]
        window: u32,
    },
}

// ── Helpers ────────────────────────────────────────────────────────────────

fn human_bytes(n: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut v = n as f64;
    let mut unit = 0;
    while v >= 1024.0 && unit < UNITS.len() - 1 {
        v /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", n)
    } else {
        format!("{:.2} {}", v, UNITS[unit])
    }
}

fn open_valid(file: &Path) -> anyhow::Result<MmfStack> {
    let mut stack =
        MmfStack::try_open(file).with_context(|| format!("opening MMF file {:?}", file))?;
    stack
        .validate()
        .with_context(|| format!("{:?} has no usable frames", file))?;
    Ok(stack)
}

fn to_dynamic(frame: Image) -> anyhow::Result<DynamicImage> {
    let (w, h, format) = (frame.width(), frame.height(), frame.format());
    let data = frame.into_data();
    let dynamic = match format {
        PixelFormat::Gray8 => GrayImage::from_raw(w, h, data).map(DynamicImage::ImageLuma8),
        PixelFormat::Gray16 => {
            let samples = data
                .chunks_exact(2)
                .map(|b| u16::from_le_bytes([b[0], b[1]]))
                .collect();
            ImageBuffer::<Luma<u16>, Vec<u16>>::from_raw(w, h, samples)
                .map(DynamicImage::ImageLuma16)
        }
        PixelFormat::Rgb24 => RgbImage::from_raw(w, h, data).map(DynamicImage::ImageRgb8),
    };
    dynamic.ok_or_else(|| anyhow::anyhow!("decoded frame does not fill {}x{} pixels", w, h))
}

#[derive(Serialize)]
struct InfoReport<'a> {
    path: &'a Path,
    header: &'a FileHeader,
    frame_count: u32,
    bit_depth: u32,
    segments: &'a [SegmentDescriptor],
}

// ── Subcommand implementations ─────────────────────────────────────────────

fn run_info(file: PathBuf, show_segments: bool, json: bool) -> anyhow::Result<()> {
    let mut stack = open_valid(&file)?;
    let bit_depth = stack.bit_depth();
    let file_size = std::fs::metadata(&file)?.len();
    let header = stack
        .header()
        .context("container header missing after open")?;

    if json {
        let report = InfoReport {
            path: &file,
            header,
            frame_count: stack.frame_count(),
            bit_depth,
            segments: stack.segments(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("=== MMF File: {:?} ===", file);
    println!();
    println!("  description        : {}", header.description);
    println!("  header size        : {}", human_bytes(header.header_size as u64));
    println!("  key frame interval : {}", header.key_frame_interval);
    println!(
        "  thresholds         : below {} / above {}",
        header.threshold_below_background, header.threshold_above_background
    );
    println!("  frames             : {}", stack.frame_count());
    println!("  segments           : {}", stack.segments().len());
    println!("  bit depth          : {}", bit_depth);
    println!("  file on disk       : {}", human_bytes(file_size));

    if show_segments {
        println!();
        println!(
            "  {:>8}  {:>10}  {:>10}  {:>14}  {:>12}",
            "segment", "first", "last", "file offset", "size"
        );
        println!("  {}", "-".repeat(62));
        for s in stack.segments() {
            println!(
                "  {:>8}  {:>10}  {:>10}  {:>14}  {:>12}",
                s.index,
                s.first_frame,
                s.last_frame,
                s.offset,
                human_bytes(s.len)
            );
        }
    }

    Ok(())
}

fn run_frame(file: PathBuf, number: u32, output: PathBuf) -> anyhow::Result<()> {
    let mut stack = open_valid(&file)?;
    let total = stack.frame_count();
    if number < 1 || number > total {
        anyhow::bail!("frame {} out of range (movie has frames 1..={})", number, total);
    }

    let t0 = Instant::now();
    let frame = stack
        .get_image(number)
        .with_context(|| format!("frame {} could not be decoded", number))?;
    let elapsed = t0.elapsed();

    eprintln!(
        "  decoded {} ({}x{}, {}-bit) in {:.3}ms",
        stack.slice_label(number),
        frame.width(),
        frame.height(),
        frame.bit_depth(),
        elapsed.as_secs_f64() * 1000.0
    );

    to_dynamic(frame)?
        .save(&output)
        .with_context(|| format!("writing {:?}", output))?;
    eprintln!("  written to {:?}", output);
    Ok(())
}

fn run_digest(file: PathBuf, first: Option<u32>, last: Option<u32>) -> anyhow::Result<()> {
    let mut stack = open_valid(&file)?;
    let total = stack.frame_count();
    let first = first.unwrap_or(1);
    let last = last.unwrap_or(total);
    if first < 1 || last > total || first > last {
        anyhow::bail!("range {}..={} is not within 1..={}", first, last, total);
    }

    let mut unreadable = 0u32;
    for n in first..=last {
        match stack.get_image(n) {
            Some(frame) => println!("{:>10}  {:016x}", n, xxh3_64(frame.data())),
            None => {
                println!("{:>10}  unreadable", n);
                unreadable += 1;
            }
        }
    }

    let stats = stack.cache_stats();
    eprintln!(
        "  frames {}..={}: {} segment loads, {} failed",
        first, last, stats.loads, stats.failures
    );
    if unreadable > 0 {
        anyhow::bail!("{} frame(s) could not be decoded", unreadable);
    }
    Ok(())
}

fn run_scrub(file: PathBuf, count: u64, seed: u64, window: u32) -> anyhow::Result<()> {
    let mut stack = open_valid(&file)?;
    let total = stack.frame_count() as u64;

    // Simple LCG for reproducible frame numbers (no external dep)
    let frames: Vec<u32> = {
        let mut rng = seed;
        let mut pos = 1u64;
        (0..count)
            .map(|_| {
                rng = rng.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                let r = rng >> 33;
                pos = if window == 0 {
                    r % total + 1
                } else {
                    let span = 2 * window as u64 + 1;
                    let step = (r % span) as i64 - window as i64;
                    (pos as i64 + step).clamp(1, total as i64) as u64
                };
                pos as u32
            })
            .collect()
    };

    eprintln!(
        "scrubbing {} requests across {} frames ({} segments)...",
        count,
        total,
        stack.segments().len()
    );

    let t0 = Instant::now();
    let mut latencies_us: Vec<u64> = Vec::with_capacity(count as usize);
    let mut missing = 0u64;

    for &n in &frames {
        let t = Instant::now();
        if stack.get_image(n).is_none() {
            missing += 1;
        }
        latencies_us.push(t.elapsed().as_micros() as u64);
    }

    let elapsed = t0.elapsed();
    latencies_us.sort_unstable();
    let stats = stack.cache_stats();

    println!();
    println!("=== Scrub Benchmark ===");
    println!("  requests    : {}", count);
    println!("  elapsed     : {:.3}s", elapsed.as_secs_f64());
    println!("  loads       : {}", stats.loads);
    println!("  hits        : {}", stats.hits);
    println!("  failures    : {}", stats.failures);
    println!("  missing     : {}", missing);
    if let (Some(&min), Some(&max)) = (latencies_us.first(), latencies_us.last()) {
        let last = latencies_us.len() - 1;
        let pct = |p: f64| latencies_us[((latencies_us.len() as f64 * p) as usize).min(last)];
        println!("  latency:");
        println!("    min  : {} µs", min);
        println!("    p50  : {} µs", pct(0.50));
        println!("    p95  : {} µs", pct(0.95));
        println!("    p99  : {} µs", pct(0.99));
        println!("    max  : {} µs", max);
    }

    Ok(())
}

// ── Entry point ────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut logger =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if cli.verbose {
        logger.filter_level(log::LevelFilter::Debug);
    }
    logger.init();

    match cli.command {
        Commands::Info {
            file,
            segments,
            json,
        } => run_info(file, segments, json),
        Commands::Frame {
            file,
            number,
            output,
        } => run_frame(file, number, output),
        Commands::Digest { file, first, last } => run_digest(file, first, last),
        Commands::Scrub {
            file,
            count,
            seed,
            window,
        } => run_scrub(file, count, seed, window),
    }
}

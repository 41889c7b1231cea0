//! Benchmark neighbor list construction at large scales.
//!
//! Run with: cargo run --release --bin bench_build
//!
//! Usage:
//!   bench_build                Run default size (100k)
//!   bench_build 100k 500k 1m   Run multiple sizes
//!   bench_build --serial       Use the serial backend
//!   bench_build -n 10          Run 10 iterations (for profiling)
//!
//! Set RUST_LOG=debug for per-phase timings from the build itself.

use clap::Parser;
use glam::Vec3;
use nblist::{build_with, within_cutoff, BuildConfig, Geometry, NeighborList, Window};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::io::{self, Write};
use std::time::Instant;

fn parse_count(s: &str) -> Result<usize, String> {
    let s = s.to_lowercase();
    let (num_str, multiplier) = if s.ends_with('m') {
        (&s[..s.len() - 1], 1_000_000)
    } else if s.ends_with('k') {
        (&s[..s.len() - 1], 1_000)
    } else {
        (s.as_str(), 1)
    };

    num_str
        .parse::<f64>()
        .map(|n| (n * multiplier as f64) as usize)
        .map_err(|e| format!("Invalid number '{}': {}", s, e))
}

#[derive(Parser)]
#[command(name = "bench_build")]
#[command(about = "Benchmark neighbor list construction at various scales")]
struct Args {
    /// Particle counts to benchmark (e.g., 100k, 1m, 10M)
    #[arg(value_parser = parse_count)]
    sizes: Vec<usize>,

    /// Random seed
    #[arg(short, long, default_value_t = 12345)]
    seed: u64,

    /// Interaction cutoff, also used as the cell size
    #[arg(short, long, default_value_t = 1.0)]
    cutoff: f32,

    /// Cells scanned around each home cell per axis
    #[arg(long, default_value_t = 1)]
    radius: usize,

    /// Use the serial backend instead of the rayon pool
    #[arg(long)]
    serial: bool,

    /// Compare against brute-force ground truth (slow, max 20k)
    #[arg(long)]
    validate: bool,

    /// Number of iterations to run (useful for profiling)
    #[arg(short = 'n', long, default_value_t = 1)]
    repeat: usize,
}

/// Uniform points in a cube sized for one particle per unit volume, so the
/// expected neighbor count is the cutoff sphere's volume.
fn generate_points(n: usize, seed: u64) -> (Vec<Vec3>, f32) {
    let edge = (n as f32).cbrt();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let points = (0..n)
        .map(|_| {
            Vec3::new(
                rng.gen_range(0.0..edge),
                rng.gen_range(0.0..edge),
                rng.gen_range(0.0..edge),
            )
        })
        .collect();
    (points, edge)
}

fn format_rate(count: usize, ms: f64) -> String {
    if ms <= 0.0 {
        return "N/A".to_string();
    }
    let per_sec = count as f64 / (ms / 1000.0);
    if per_sec >= 1_000_000.0 {
        format!("{:.2}M/s", per_sec / 1_000_000.0)
    } else if per_sec >= 1_000.0 {
        format!("{:.1}k/s", per_sec / 1000.0)
    } else {
        format!("{:.0}/s", per_sec)
    }
}

fn format_num(n: usize) -> String {
    if n >= 1_000_000 {
        format!("{:.1}M", n as f64 / 1_000_000.0)
    } else if n >= 1_000 {
        format!("{}k", n / 1_000)
    } else {
        format!("{}", n)
    }
}

fn validate_against_brute_force(points: &[Vec3], cutoff: f32, list: &NeighborList) {
    println!("\nValidating against brute-force ground truth...");

    let t0 = Instant::now();
    let cutoff_sq = cutoff * cutoff;
    let mut mismatches = 0usize;
    for i in 0..points.len() {
        let mut expected: Vec<u32> = (0..points.len())
            .filter(|&j| j != i && points[i].distance_squared(points[j]) <= cutoff_sq)
            .map(|j| j as u32)
            .collect();
        expected.sort_unstable();
        let mut actual = list.neighbor_indices(i).to_vec();
        actual.sort_unstable();
        if expected != actual {
            mismatches += 1;
        }
    }
    let brute_time = t0.elapsed().as_secs_f64() * 1000.0;

    println!("  Brute-force time: {:>8.1}ms", brute_time);
    if mismatches == 0 {
        println!("  All {} neighbor sets match", format_num(points.len()));
    } else {
        println!("  MISMATCH: {} / {} particles differ", mismatches, points.len());
    }
}

struct BenchResult {
    n: usize,
    time_ms: f64,
    total_neighbors: usize,
    max_per_particle: u32,
    method: &'static str,
}

fn run_benchmark(
    points: &[Vec3],
    window: Window,
    geometry: Geometry,
    cutoff: f32,
    config: &BuildConfig,
) -> (BenchResult, NeighborList) {
    let n = points.len();
    let method = if config.parallel { "threaded" } else { "serial" };

    let t0 = Instant::now();
    let list = build_with(points, window, geometry, within_cutoff(cutoff), config)
        .unwrap_or_else(|e| panic!("build failed: {e}"));
    let time_ms = t0.elapsed().as_secs_f64() * 1000.0;

    let stats = list.stats();
    let result = BenchResult {
        n,
        time_ms,
        total_neighbors: stats.total_neighbors,
        max_per_particle: stats.max_per_particle,
        method,
    };
    (result, list)
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    println!("Neighbor List Build Benchmark");
    println!("=============================\n");

    let sizes: Vec<usize> = if args.sizes.is_empty() {
        vec![100_000]
    } else {
        args.sizes
    };

    let mut config = BuildConfig::default();
    config.parallel = !args.serial;
    config.stencil_radius = args.radius;

    println!("Configuration:");
    println!("  seed = {}", args.seed);
    println!("  cutoff = {} (cell size)", args.cutoff);
    println!("  stencil radius = {}", args.radius);
    println!("  backend = {}", if args.serial { "serial" } else { "threaded" });
    println!(
        "  sizes = {:?}",
        sizes.iter().map(|&n| format_num(n)).collect::<Vec<_>>()
    );
    if args.repeat > 1 {
        println!("  repeat = {}", args.repeat);
    }

    let mut results: Vec<BenchResult> = Vec::new();

    for n in &sizes {
        println!("\n{}", "=".repeat(60));
        println!("Benchmarking n = {}", format_num(*n));
        println!("{}", "=".repeat(60));

        let t_gen = Instant::now();
        let (points, edge) = generate_points(*n, args.seed);
        let gen_time = t_gen.elapsed().as_secs_f64() * 1000.0;
        println!("Point generation: {:.1}ms (box edge {:.1})", gen_time, edge);

        let geometry = Geometry::with_cell_size(Vec3::ZERO, args.cutoff);
        let window = Window::covering(&geometry, Vec3::ZERO, Vec3::splat(edge));

        let mut times: Vec<f64> = Vec::with_capacity(args.repeat);
        let mut last: Option<(BenchResult, NeighborList)> = None;

        for iter in 0..args.repeat {
            if args.repeat > 1 {
                print!("  Iteration {}/{}... ", iter + 1, args.repeat);
                io::stdout().flush().unwrap();
            }

            let run = run_benchmark(&points, window, geometry, args.cutoff, &config);
            times.push(run.0.time_ms);

            if args.repeat > 1 {
                println!("{:.1}ms", run.0.time_ms);
            }

            last = Some(run);
        }

        let (result, list) = last.unwrap();

        println!("\nResults ({}):", result.method);
        if args.repeat > 1 {
            let min = times.iter().cloned().fold(f64::INFINITY, f64::min);
            let max = times.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let avg = times.iter().sum::<f64>() / times.len() as f64;
            println!("  Min time:      {:>8.1}ms", min);
            println!("  Max time:      {:>8.1}ms", max);
            println!("  Avg time:      {:>8.1}ms", avg);
            println!("  Throughput:    {:>8} (avg)", format_rate(result.n, avg));
        } else {
            println!("  Total time:    {:>8.1}ms", result.time_ms);
            println!(
                "  Throughput:    {:>8}",
                format_rate(result.n, result.time_ms)
            );
        }
        println!("  Neighbors:     {:>8}", format_num(result.total_neighbors));
        println!(
            "  Avg per part.: {:>8.2}",
            result.total_neighbors as f64 / result.n.max(1) as f64
        );
        println!("  Max per part.: {:>8}", result.max_per_particle);

        let grid_stats = list.bins().stats();
        println!(
            "  Cells:         {:>8} ({} occupied)",
            format_num(grid_stats.num_cells),
            format_num(grid_stats.occupied_cells)
        );

        if args.validate && *n <= 20_000 {
            validate_against_brute_force(&points, args.cutoff, &list);
        } else if args.validate && *n > 20_000 {
            println!("\n  (skipping validation for n > 20k - brute force is slow)");
        }

        results.push(result);
    }

    // Summary table if multiple sizes
    if results.len() > 1 {
        println!("\n\n{}", "=".repeat(60));
        println!("SUMMARY");
        println!("{}", "=".repeat(60));
        println!(
            "{:>10} | {:>10} | {:>12} | {:>10}",
            "n", "time", "throughput", "pairs"
        );
        println!("{:-<10}-+-{:-<10}-+-{:-<12}-+-{:-<10}", "", "", "", "");

        for r in &results {
            println!(
                "{:>10} | {:>9.1}ms | {:>12} | {:>10}",
                format_num(r.n),
                r.time_ms,
                format_rate(r.n, r.time_ms),
                format_num(r.total_neighbors)
            );
        }
    }

    println!("\nBenchmark complete.");
}

//! Ingest every activity file in a directory and summarise the result.
//!
//! Run with: RUST_LOG=info cargo run --example ingest_directory -- <dir> [workers]

use std::path::PathBuf;
use std::time::Instant;

use stravavis_ingest::{process_files, IngestConfig};

fn main() {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let Some(dir) = args.next().map(PathBuf::from) else {
        eprintln!("usage: ingest_directory <dir> [workers]");
        std::process::exit(2);
    };
    let workers = args.next().and_then(|w| w.parse().ok());

    let mut files: Vec<String> = match std::fs::read_dir(&dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .map(|p| p.to_string_lossy().into_owned())
            .collect(),
        Err(e) => {
            eprintln!("Cannot read {}: {}", dir.display(), e);
            std::process::exit(1);
        }
    };
    files.sort();

    let config = IngestConfig {
        workers,
        ..IngestConfig::default()
    };

    println!("Processing {} files from {}\n", files.len(), dir.display());

    let start = Instant::now();
    let (table, report) = process_files(&files, &config);
    let elapsed = start.elapsed();

    if table.is_empty() {
        println!("No data to plot");
        return;
    }

    for name in table.activity_names() {
        let rows: Vec<_> = table.activity(name).collect();
        let dist = rows.last().map_or(0.0, |s| s.dist);
        let first = rows.iter().find_map(|s| s.time);
        let last = rows.iter().rev().find_map(|s| s.time);
        match (first, last) {
            (Some(a), Some(b)) => println!("  {}: {} samples, dist {:.4}, {} -> {}", name, rows.len(), dist, a, b),
            _ => println!("  {}: {} samples, dist {:.4}", name, rows.len(), dist),
        }
    }

    println!("\nStats:");
    println!("  Rows: {}", report.rows);
    println!("  Activities: {}", table.activity_names().len());
    println!("  From cache: {}", report.cache_hit);
    println!("  Unsupported files: {}", report.unsupported.len());
    println!("  Failed files: {}", report.failed.len());
    for (file, err) in &report.failed {
        println!("    {}: {}", file, err);
    }
    println!("  Elapsed: {:?}", elapsed);
}

//! sagar-slam - Offline replay for recorded landmark-SLAM missions
//!
//! Loads a recorded mission from a dataset directory, runs the offline
//! batch pipeline (project detections, cluster, assign to buoys, one
//! batch solve), and writes the posterior trajectory and landmark
//! estimates back out as CSV.
//!
//! # Usage
//!
//! ```bash
//! # Replay a mission, writing estimates next to the inputs
//! cargo run --release -- /data/mission_041
//!
//! # Custom optimizer settings and output directory
//! cargo run --release -- --config sagar-slam.toml --output /tmp/est /data/mission_041
//! ```

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::{error, info, warn};

use sagar_slam::io::dataset::{self, Dataset};
use sagar_slam::{OfflineSlam, Result, SlamConfig};

// ============================================================================
// CLI Arguments
// ============================================================================

struct Args {
    config_path: Option<String>,
    output_dir: Option<PathBuf>,
    dataset_dir: Option<PathBuf>,
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let mut result = Args {
        config_path: None,
        output_dir: None,
        dataset_dir: None,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    result.config_path = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "--output" | "-o" => {
                if i + 1 < args.len() {
                    result.output_dir = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            other if !other.starts_with('-') && result.dataset_dir.is_none() => {
                result.dataset_dir = Some(PathBuf::from(other));
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_help();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    result
}

fn print_help() {
    println!("sagar-slam - offline replay for recorded landmark-SLAM missions");
    println!();
    println!("USAGE:");
    println!("    sagar-slam [OPTIONS] <DATASET_DIR>");
    println!();
    println!("ARGS:");
    println!("    <DATASET_DIR>           Directory holding dr_poses_graph.csv,");
    println!("                            gt_poses_graph.csv, detections_graph.csv, buoys.csv");
    println!();
    println!("OPTIONS:");
    println!("    -c, --config <FILE>     Configuration file (default: sagar-slam.toml)");
    println!("    -o, --output <DIR>      Output directory (default: the dataset directory)");
    println!("    -h, --help              Print help information");
    println!();
    println!("OUTPUT:");
    println!("    poses_est.csv           Posterior trajectory as x, y, theta rows");
    println!("    buoys_est.csv           Posterior buoy positions as x, y rows");
    println!("    cluster_means.csv       Fitted detection clusters as x, y rows");
    println!("    detections_est.csv      Projections as est_x, est_y, true_x, true_y, pose index");
}

fn load_config(args: &Args) -> SlamConfig {
    match &args.config_path {
        Some(path) => match fs::read_to_string(path) {
            Ok(contents) => match basic_toml::from_str(&contents) {
                Ok(cfg) => {
                    info!("Loaded config from {}", path);
                    cfg
                }
                Err(e) => {
                    warn!("Failed to parse config {}: {}", path, e);
                    SlamConfig::default()
                }
            },
            Err(e) => {
                warn!("Failed to read config {}: {}", path, e);
                SlamConfig::default()
            }
        },
        None => {
            // Try default paths
            for path in &["sagar-slam.toml", "/etc/sagar-slam.toml"] {
                if let Ok(contents) = fs::read_to_string(path)
                    && let Ok(cfg) = basic_toml::from_str(&contents)
                {
                    info!("Loaded config from {}", path);
                    return cfg;
                }
            }
            SlamConfig::default()
        }
    }
}

// ============================================================================
// Replay
// ============================================================================

fn replay(dataset_dir: &Path, output_dir: &Path, config: &SlamConfig) -> Result<()> {
    let dataset = Dataset::load(dataset_dir)?;
    let result = OfflineSlam::with_optimizer(dataset, config.optimizer.clone()).run()?;

    fs::create_dir_all(output_dir)?;
    dataset::write_poses(output_dir.join("poses_est.csv"), &result.poses)?;
    dataset::write_points(output_dir.join("buoys_est.csv"), &result.buoys)?;
    dataset::write_points(output_dir.join("cluster_means.csv"), &result.cluster_means)?;
    let rows: Vec<[f64; 5]> = result
        .projections
        .iter()
        .map(|p| {
            [
                p.estimated.x,
                p.estimated.y,
                p.truth.x,
                p.truth.y,
                p.dr_index as f64,
            ]
        })
        .collect();
    dataset::write_rows(output_dir.join("detections_est.csv"), &rows)?;

    info!(
        "wrote {} pose(s), {} buoy estimate(s), {} detection row(s)",
        result.poses.len(),
        result.buoys.len(),
        rows.len()
    );
    for (buoy, cluster) in result.assignment.buoy_to_cluster.iter().enumerate() {
        if *cluster < 0 {
            warn!("buoy {} matched no detection cluster", buoy);
        }
    }
    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {} - {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();

    let args = parse_args();
    let Some(dataset_dir) = args.dataset_dir.clone() else {
        eprintln!("Missing dataset directory");
        print_help();
        std::process::exit(1);
    };
    let config = load_config(&args);
    let output_dir = args.output_dir.clone().unwrap_or_else(|| dataset_dir.clone());

    info!("sagar-slam offline replay starting");
    info!("  Dataset: {}", dataset_dir.display());
    info!("  Output:  {}", output_dir.display());

    if let Err(e) = replay(&dataset_dir, &output_dir, &config) {
        error!("Replay failed: {}", e);
        std::process::exit(1);
    }

    info!("sagar-slam replay complete");
}

//! Recorded-mission loading and result persistence.
//!
//! The offline replay consumes four comma-separated files recorded by
//! the mission tooling, all headerless:
//!
//! - `dr_poses_graph.csv` / `gt_poses_graph.csv`: full 3D poses as
//!   `x, y, z, q_w, q_x, q_y, q_z`; only x, y, and the yaw survive
//!   the load.
//! - `detections_graph.csv`: one sonar detection per row as
//!   `x_map, y_map, z_map, x_rel, y_rel, z_rel, dr_index`.
//! - `buoys.csv`: surveyed buoy positions as `x, y, z`.
//!
//! Writers dump estimation results as plain numeric rows, one value
//! per column, for downstream plotting.

use std::fs::File;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, Writer};
use log::{debug, info, warn};

use crate::core::math::yaw_from_quaternion;
use crate::core::types::{Point2D, Pose2D};
use crate::error::{Error, Result};

/// Dead-reckoning trajectory file.
pub const DR_POSES_FILE: &str = "dr_poses_graph.csv";
/// Ground-truth trajectory file.
pub const GT_POSES_FILE: &str = "gt_poses_graph.csv";
/// Sonar detection file.
pub const DETECTIONS_FILE: &str = "detections_graph.csv";
/// Surveyed buoy file.
pub const BUOYS_FILE: &str = "buoys.csv";

/// One recorded sonar detection.
#[derive(Debug, Clone, Copy)]
pub struct DetectionRow {
    /// Detection location in the map frame, as recorded
    pub map_location: Point2D,
    /// Detection offset in the vehicle frame
    pub relative: Point2D,
    /// Trajectory index of the pose the detection was made from
    pub dr_index: usize,
}

/// A full recorded mission.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub dr_poses: Vec<Pose2D>,
    pub gt_poses: Vec<Pose2D>,
    pub detections: Vec<DetectionRow>,
    pub buoys: Vec<Point2D>,
}

impl Dataset {
    /// Load the four mission files from a directory.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        info!("loading dataset from {}", dir.display());
        let dr_poses = load_poses(&dir.join(DR_POSES_FILE))?;
        let gt_poses = load_poses(&dir.join(GT_POSES_FILE))?;
        let detections = load_detections(&dir.join(DETECTIONS_FILE))?;
        let buoys = load_buoys(&dir.join(BUOYS_FILE))?;
        if dr_poses.len() != gt_poses.len() {
            warn!(
                "trajectory length mismatch: {} dead-reckoning vs {} ground-truth pose(s)",
                dr_poses.len(),
                gt_poses.len()
            );
        }
        debug!(
            "dataset holds {} pose(s), {} detection(s), {} buoy(s)",
            dr_poses.len(),
            detections.len(),
            buoys.len()
        );
        Ok(Self {
            dr_poses,
            gt_poses,
            detections,
            buoys,
        })
    }
}

/// Load `x, y, z, q_w, q_x, q_y, q_z` rows as planar poses.
pub fn load_poses(path: &Path) -> Result<Vec<Pose2D>> {
    let file = file_label(path);
    let mut poses = Vec::new();
    for record in reader(path)?.records() {
        let record = record?;
        let x = field(&record, 0, &file)?;
        let y = field(&record, 1, &file)?;
        let yaw = yaw_from_quaternion(
            field(&record, 3, &file)?,
            field(&record, 4, &file)?,
            field(&record, 5, &file)?,
            field(&record, 6, &file)?,
        );
        poses.push(Pose2D::new(x, y, yaw));
    }
    Ok(poses)
}

/// Load `x_map, y_map, z_map, x_rel, y_rel, z_rel, dr_index` rows.
pub fn load_detections(path: &Path) -> Result<Vec<DetectionRow>> {
    let file = file_label(path);
    let mut detections = Vec::new();
    for record in reader(path)?.records() {
        let record = record?;
        let raw_index = field(&record, 6, &file)?;
        if raw_index < 0.0 {
            return Err(Error::MalformedRow {
                file,
                detail: format!("negative pose index {raw_index}"),
            });
        }
        detections.push(DetectionRow {
            map_location: Point2D::new(field(&record, 0, &file)?, field(&record, 1, &file)?),
            relative: Point2D::new(field(&record, 3, &file)?, field(&record, 4, &file)?),
            dr_index: raw_index.round() as usize,
        });
    }
    Ok(detections)
}

/// Load surveyed `x, y, z` rows; depth is dropped.
pub fn load_buoys(path: &Path) -> Result<Vec<Point2D>> {
    let file = file_label(path);
    let mut buoys = Vec::new();
    for record in reader(path)?.records() {
        let record = record?;
        buoys.push(Point2D::new(
            field(&record, 0, &file)?,
            field(&record, 1, &file)?,
        ));
    }
    Ok(buoys)
}

/// Write `x, y, theta` rows.
pub fn write_poses(path: impl AsRef<Path>, poses: &[Pose2D]) -> Result<()> {
    let mut writer = Writer::from_path(path)?;
    for pose in poses {
        writer.write_record([
            pose.x.to_string(),
            pose.y.to_string(),
            pose.theta.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Write `x, y` rows.
pub fn write_points(path: impl AsRef<Path>, points: &[Point2D]) -> Result<()> {
    let mut writer = Writer::from_path(path)?;
    for point in points {
        writer.write_record([point.x.to_string(), point.y.to_string()])?;
    }
    writer.flush()?;
    Ok(())
}

/// Write fixed-width numeric rows.
pub fn write_rows<const N: usize>(path: impl AsRef<Path>, rows: &[[f64; N]]) -> Result<()> {
    let mut writer = Writer::from_path(path)?;
    for row in rows {
        writer.write_record(row.map(|value| value.to_string()))?;
    }
    writer.flush()?;
    Ok(())
}

fn reader(path: &Path) -> Result<csv::Reader<File>> {
    ReaderBuilder::new()
        .has_headers(false)
        .comment(Some(b'#'))
        .flexible(true)
        .from_path(path)
        .map_err(|source| Error::DatasetOpen {
            file: path.display().to_string(),
            source,
        })
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn field(record: &StringRecord, index: usize, file: &str) -> Result<f64> {
    let raw = record.get(index).ok_or_else(|| Error::MalformedRow {
        file: file.to_string(),
        detail: format!("missing column {index}"),
    })?;
    raw.trim().parse().map_err(|_| Error::MalformedRow {
        file: file.to_string(),
        detail: format!("bad number {raw:?} in column {index}"),
    })
}

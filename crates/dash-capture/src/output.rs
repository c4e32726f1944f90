//! Dataset output layout
//!
//! ```text
//! <experiment>/parameters.json
//! <experiment>/images/<map>/camera/<map>_000042.png
//! <experiment>/images/<map>/annotation/<map>_000042_annotation.png
//! <experiment>/images/<map>/depth/<map>_000042_depth.png
//! <experiment>/images/<map>/metadata/<map>_000042_metadata.json
//! ```

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use crate::error::CaptureError;
use crate::frame::FrameRecord;

/// File name of the run parameter dump
pub const PARAMETERS_FILE: &str = "parameters.json";

/// The four files written per frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    Camera,
    Annotation,
    Depth,
    Metadata,
}

impl FrameKind {
    /// All kinds, in write order
    pub const ALL: [FrameKind; 4] = [
        FrameKind::Camera,
        FrameKind::Annotation,
        FrameKind::Depth,
        FrameKind::Metadata,
    ];

    /// Directory name under the map directory
    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::Camera => "camera",
            Self::Annotation => "annotation",
            Self::Depth => "depth",
            Self::Metadata => "metadata",
        }
    }

    /// Suffix appended to the frame stem
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Camera => "",
            Self::Annotation => "_annotation",
            Self::Depth => "_depth",
            Self::Metadata => "_metadata",
        }
    }

    /// File extension
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Metadata => "json",
            _ => "png",
        }
    }
}

/// Paths of one map's output inside an experiment
#[derive(Debug, Clone)]
pub struct OutputLayout {
    map_dir: PathBuf,
    map: String,
}

impl OutputLayout {
    /// Layout for `map` under `experiment_dir`
    pub fn new(experiment_dir: &Path, map: &str) -> Self {
        Self {
            map_dir: experiment_dir.join("images").join(map),
            map: map.to_string(),
        }
    }

    /// Root directory of this map's images
    pub fn map_dir(&self) -> &Path {
        &self.map_dir
    }

    /// Directory holding one kind of file
    pub fn dir(&self, kind: FrameKind) -> PathBuf {
        self.map_dir.join(kind.dir_name())
    }

    /// File name stem shared by all files of a frame, e.g. `italy_000042`
    pub fn stem(&self, index: u32) -> String {
        format!("{}_{:06}", self.map, index)
    }

    /// Full path of one file of a frame
    pub fn path(&self, kind: FrameKind, index: u32) -> PathBuf {
        self.dir(kind).join(format!(
            "{}{}.{}",
            self.stem(index),
            kind.suffix(),
            kind.extension()
        ))
    }

    /// Create all output directories
    pub fn create_dirs(&self) -> Result<(), CaptureError> {
        for kind in FrameKind::ALL {
            fs::create_dir_all(self.dir(kind))?;
        }
        debug!("Output directories ready under {}", self.map_dir.display());
        Ok(())
    }

    /// Write every file of a frame
    pub fn write(&self, index: u32, record: &FrameRecord) -> Result<(), CaptureError> {
        record.colour.save(self.path(FrameKind::Camera, index))?;
        record
            .annotation
            .save(self.path(FrameKind::Annotation, index))?;
        record.depth.save(self.path(FrameKind::Depth, index))?;

        let file = File::create(self.path(FrameKind::Metadata, index))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, &record.metadata)?;
        writer.flush()?;
        Ok(())
    }
}

/// Dump run parameters as pretty JSON into the experiment directory
pub fn write_parameters<P: Serialize>(
    experiment_dir: &Path,
    params: &P,
) -> Result<PathBuf, CaptureError> {
    fs::create_dir_all(experiment_dir)?;
    let path = experiment_dir.join(PARAMETERS_FILE);
    let json = serde_json::to_string_pretty(params)?;
    fs::write(&path, json)?;
    info!("Run parameters written to {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameMetadata;
    use dash_protocol::{Quat, Vec3};
    use image::{GrayImage, RgbImage};
    use std::collections::BTreeMap;

    #[test]
    fn test_paths() {
        let layout = OutputLayout::new(Path::new("dataset"), "italy");
        assert_eq!(
            layout.path(FrameKind::Camera, 42),
            Path::new("dataset/images/italy/camera/italy_000042.png")
        );
        assert_eq!(
            layout.path(FrameKind::Annotation, 7),
            Path::new("dataset/images/italy/annotation/italy_000007_annotation.png")
        );
        assert_eq!(
            layout.path(FrameKind::Depth, 0),
            Path::new("dataset/images/italy/depth/italy_000000_depth.png")
        );
        assert_eq!(
            layout.path(FrameKind::Metadata, 999_999),
            Path::new("dataset/images/italy/metadata/italy_999999_metadata.json")
        );
    }

    #[test]
    fn test_write_frame() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = OutputLayout::new(tmp.path(), "east_coast_usa");
        layout.create_dirs().unwrap();

        let record = FrameRecord {
            colour: RgbImage::new(4, 2),
            annotation: RgbImage::new(4, 2),
            depth: GrayImage::new(4, 2),
            metadata: FrameMetadata {
                pos: Vec3::new(1.0, 2.0, 3.0),
                rot: Quat::IDENTITY,
                time: 1.5,
                electrics: BTreeMap::new(),
            },
        };
        layout.write(3, &record).unwrap();

        for kind in FrameKind::ALL {
            assert!(layout.path(kind, 3).is_file(), "missing {:?}", kind);
        }

        let written = image::open(layout.path(FrameKind::Depth, 3)).unwrap();
        assert_eq!((written.width(), written.height()), (4, 2));

        let json = fs::read_to_string(layout.path(FrameKind::Metadata, 3)).unwrap();
        let back: FrameMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record.metadata);
    }

    #[test]
    fn test_write_parameters() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("exp");
        let path = write_parameters(&dir, &serde_json::json!({"jam_steps": 2})).unwrap();

        assert_eq!(path, dir.join(PARAMETERS_FILE));
        let text = fs::read_to_string(path).unwrap();
        assert!(text.contains("\"jam_steps\": 2"));
    }
}

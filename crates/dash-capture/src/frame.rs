//! Frame records
//!
//! A [`FrameRecord`] is everything written for one kept capture step: the
//! colour image, the annotation mask, the depth map and the vehicle
//! metadata, all taken from the same iteration.

use std::collections::BTreeMap;

use dash_protocol::{Quat, Vec3, VehicleSnapshot};
use image::{DynamicImage, GrayImage, RgbImage, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::config::CameraConfig;
use crate::error::CaptureError;
use crate::simulator::CameraCapture;

/// Vehicle metadata stored next to each frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameMetadata {
    /// Position
    pub pos: Vec3,
    /// Rotation
    pub rot: Quat,
    /// Simulation time in seconds
    pub time: f64,
    /// Electrics values by name
    pub electrics: BTreeMap<String, serde_json::Value>,
}

impl From<&VehicleSnapshot> for FrameMetadata {
    fn from(snapshot: &VehicleSnapshot) -> Self {
        Self {
            pos: snapshot.pos,
            rot: snapshot.rot,
            time: snapshot.time,
            electrics: snapshot.electrics.clone(),
        }
    }
}

/// One captured frame, ready to be written
#[derive(Debug, Clone)]
pub struct FrameRecord {
    /// Colour image
    pub colour: RgbImage,
    /// Semantic annotation mask
    pub annotation: RgbImage,
    /// Depth map scaled to the far plane
    pub depth: GrayImage,
    /// Vehicle metadata
    pub metadata: FrameMetadata,
}

impl FrameRecord {
    /// Build a record from the camera buffers and vehicle readings of one step
    pub fn from_capture(
        capture: &CameraCapture,
        snapshot: &VehicleSnapshot,
        camera: &CameraConfig,
    ) -> Result<Self, CaptureError> {
        let header = &capture.header;
        if [header.width, header.height] != camera.resolution {
            return Err(CaptureError::MalformedFrame(format!(
                "camera returned {}x{}, configured {}x{}",
                header.width,
                header.height,
                camera.width(),
                camera.height()
            )));
        }

        let buffers = capture.buffers()?;
        let colour = rgba_to_rgb(header.width, header.height, buffers.colour, "colour")?;
        let annotation =
            rgba_to_rgb(header.width, header.height, buffers.annotation, "annotation")?;
        let depth = depth_to_gray(header.width, header.height, buffers.depth, camera.far)?;

        Ok(Self {
            colour,
            annotation,
            depth,
            metadata: FrameMetadata::from(snapshot),
        })
    }
}

fn rgba_to_rgb(
    width: u32,
    height: u32,
    data: &[u8],
    which: &str,
) -> Result<RgbImage, CaptureError> {
    let rgba = RgbaImage::from_raw(width, height, data.to_vec()).ok_or_else(|| {
        CaptureError::MalformedFrame(format!(
            "{} buffer has {} bytes, expected {}",
            which,
            data.len(),
            width as usize * height as usize * 4
        ))
    })?;
    Ok(DynamicImage::ImageRgba8(rgba).into_rgb8())
}

/// Convert f32 depth in metres to 8-bit, 0 at the camera and 255 at `far`
fn depth_to_gray(width: u32, height: u32, data: &[u8], far: f64) -> Result<GrayImage, CaptureError> {
    let pixels = width as usize * height as usize;
    if data.len() != pixels * 4 {
        return Err(CaptureError::MalformedFrame(format!(
            "depth buffer has {} bytes, expected {}",
            data.len(),
            pixels * 4
        )));
    }

    let gray: Vec<u8> = data
        .chunks_exact(4)
        .map(|b| {
            let metres = f32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64;
            let scaled = if metres.is_finite() {
                (metres / far).clamp(0.0, 1.0)
            } else {
                1.0
            };
            (scaled * 255.0).round() as u8
        })
        .collect();

    GrayImage::from_raw(width, height, gray)
        .ok_or_else(|| CaptureError::MalformedFrame("depth buffer size".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dash_protocol::CameraFrameHeader;

    fn camera(width: u32, height: u32) -> CameraConfig {
        CameraConfig {
            resolution: [width, height],
            far: 100.0,
            ..Default::default()
        }
    }

    fn capture(width: u32, height: u32, depth: &[f32]) -> CameraCapture {
        let header = CameraFrameHeader::full(width, height);
        let pixels = (width * height) as usize;
        let mut payload = Vec::with_capacity(header.payload_len().unwrap());
        for i in 0..pixels {
            payload.extend_from_slice(&[i as u8, 10, 20, 255]);
        }
        for _ in 0..pixels {
            payload.extend_from_slice(&[1, 2, 3, 255]);
        }
        for d in depth {
            payload.extend_from_slice(&d.to_le_bytes());
        }
        CameraCapture { header, payload }
    }

    fn snapshot() -> VehicleSnapshot {
        let mut electrics = BTreeMap::new();
        electrics.insert("wheelspeed".to_string(), serde_json::json!(12.5));
        VehicleSnapshot {
            pos: Vec3::new(1.0, 2.0, 3.0),
            rot: Quat::IDENTITY,
            time: 42.0,
            electrics,
        }
    }

    #[test]
    fn test_record_from_capture() {
        let cap = capture(2, 1, &[0.0, 50.0]);
        let record = FrameRecord::from_capture(&cap, &snapshot(), &camera(2, 1)).unwrap();

        assert_eq!(record.colour.dimensions(), (2, 1));
        assert_eq!(record.colour.get_pixel(1, 0).0, [1, 10, 20]);
        assert_eq!(record.annotation.get_pixel(0, 0).0, [1, 2, 3]);
        assert_eq!(record.depth.get_pixel(0, 0).0, [0]);
        assert_eq!(record.depth.get_pixel(1, 0).0, [128]);
        assert_eq!(record.metadata.time, 42.0);
        assert_eq!(record.metadata.pos, Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_depth_clamped_to_far_plane() {
        let cap = capture(2, 1, &[500.0, f32::INFINITY]);
        let record = FrameRecord::from_capture(&cap, &snapshot(), &camera(2, 1)).unwrap();
        assert_eq!(record.depth.get_pixel(0, 0).0, [255]);
        assert_eq!(record.depth.get_pixel(1, 0).0, [255]);
    }

    #[test]
    fn test_resolution_mismatch_rejected() {
        let cap = capture(2, 1, &[0.0, 0.0]);
        let err = FrameRecord::from_capture(&cap, &snapshot(), &camera(4, 4)).unwrap_err();
        assert!(matches!(err, CaptureError::MalformedFrame(_)));
    }

    #[test]
    fn test_metadata_json_layout() {
        let meta = FrameMetadata::from(&snapshot());
        let value = serde_json::to_value(&meta).unwrap();
        assert_eq!(value["pos"], serde_json::json!([1.0, 2.0, 3.0]));
        assert_eq!(value["rot"], serde_json::json!([0.0, 0.0, 0.0, 1.0]));
        assert_eq!(value["time"], serde_json::json!(42.0));
        assert_eq!(value["electrics"]["wheelspeed"], serde_json::json!(12.5));
    }
}

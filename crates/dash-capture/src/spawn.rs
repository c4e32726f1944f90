//! Spawn point catalog and cycling

use std::collections::BTreeMap;
use std::path::Path;

use dash_protocol::{Quat, Vec3};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::CaptureError;

/// A named pose where the ego vehicle can be placed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnPoint {
    /// Location name, unique within a map
    pub name: String,
    /// Position
    pub pos: Vec3,
    /// Rotation
    pub rot: Quat,
}

impl SpawnPoint {
    pub fn new(name: impl Into<String>, pos: [f64; 3], rot: [f64; 4]) -> Self {
        Self {
            name: name.into(),
            pos: pos.into(),
            rot: rot.into(),
        }
    }
}

/// Ordered spawn points per map
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpawnCatalog {
    maps: BTreeMap<String, Vec<SpawnPoint>>,
}

impl SpawnCatalog {
    /// An empty catalog
    pub fn empty() -> Self {
        Self::default()
    }

    /// Catalog of the maps shipped with the simulator
    pub fn builtin() -> Self {
        let mut catalog = Self::empty();
        catalog.insert_map(
            "italy",
            vec![
                SpawnPoint::new(
                    "village_mountain",
                    [262.389404, -891.666626, 246.920883],
                    [0.0, 0.0, 0.793353388, 0.608761367],
                ),
                SpawnPoint::new(
                    "airport",
                    [-1045.27136, 1636.64014, 152.583511],
                    [0.0, 0.0, 0.995607359, -0.0936268447],
                ),
                SpawnPoint::new(
                    "crossroads",
                    [729.62677, 763.914001, 177.753006],
                    [0.0, 0.0, -0.220662029, 0.975350331],
                ),
                SpawnPoint::new(
                    "runway",
                    [-1887.9967, 1585.78821, 152.583542],
                    [0.0, 0.0, 0.779716521, 0.626132691],
                ),
                SpawnPoint::new(
                    "port",
                    [487.19574, 1593.43286, 139.207413],
                    [0.0, 0.0, 1.0, -5.21540749e-8],
                ),
                SpawnPoint::new(
                    "city",
                    [1190.64783, 1235.50586, 148.287506],
                    [0.0, 0.0, -0.707106482, 0.707107081],
                ),
                SpawnPoint::new(
                    "town_east",
                    [1114.92346, -689.113403, 146.186447],
                    [0.0, 0.0, 0.0112857523, 0.999936314],
                ),
                SpawnPoint::new(
                    "small_village",
                    [-690.403564, -1338.64136, 140.215942],
                    [0.0, 0.0, -0.675715974, 0.737162073],
                ),
                SpawnPoint::new(
                    "castle_town",
                    [-969.635193, 953.628723, 392.483368],
                    [0.0, 0.0, -0.608761314, 0.793353429],
                ),
            ],
        );
        catalog.insert_map(
            "east_coast_usa",
            vec![
                SpawnPoint::new(
                    "townindustrial",
                    [714.338013, -4.76092243, 52.0771866],
                    [0.0, 0.0, 0.259168964, 0.965831998],
                ),
                SpawnPoint::new(
                    "highway",
                    [900.632019, -226.268005, 39.9494019],
                    [0.0, 0.0, 0.0427517903, 0.999085724],
                ),
                SpawnPoint::new(
                    "gasstation",
                    [-792.133728, 489.444519, 23.6532993],
                    [0.0, 0.0, 0.954438385, 0.298408058],
                ),
                SpawnPoint::new(
                    "farmhouse",
                    [-607.900024, -354.438995, 34.5363007],
                    [0.0, 0.0, 0.960378802, 0.278697967],
                ),
            ],
        );
        catalog
    }

    /// Parse a catalog from JSON: `{"map": [{"name", "pos", "rot"}, ...]}`
    pub fn from_json_str(json: &str) -> Result<Self, CaptureError> {
        let catalog: Self = serde_json::from_str(json)?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Load a catalog from a JSON file
    pub fn load(path: &Path) -> Result<Self, CaptureError> {
        let json = std::fs::read_to_string(path)?;
        let catalog = Self::from_json_str(&json)?;
        info!(
            "Loaded spawn points for {} map(s) from {}",
            catalog.maps.len(),
            path.display()
        );
        Ok(catalog)
    }

    fn validate(&self) -> Result<(), CaptureError> {
        for (map, points) in &self.maps {
            if points.is_empty() {
                return Err(CaptureError::InvalidConfig(format!(
                    "map {} has no spawn points",
                    map
                )));
            }
            if let Some(bad) = points
                .iter()
                .find(|p| !p.pos.is_finite() || p.name.is_empty())
            {
                return Err(CaptureError::InvalidConfig(format!(
                    "map {} has an invalid spawn point {:?}",
                    map, bad.name
                )));
            }
        }
        Ok(())
    }

    /// Set the spawn points of a map, replacing any existing ones
    pub fn insert_map(&mut self, map: impl Into<String>, points: Vec<SpawnPoint>) {
        self.maps.insert(map.into(), points);
    }

    /// Add every map of `other`, replacing maps present in both
    pub fn merge(&mut self, other: SpawnCatalog) {
        self.maps.extend(other.maps);
    }

    /// Spawn points of a map, in cycle order
    pub fn points(&self, map: &str) -> Option<&[SpawnPoint]> {
        self.maps.get(map).map(Vec::as_slice)
    }

    /// Iterate over known map names
    pub fn maps(&self) -> impl Iterator<Item = &str> {
        self.maps.keys().map(String::as_str)
    }

    /// Check whether a map has spawn points
    pub fn contains(&self, map: &str) -> bool {
        self.maps.get(map).is_some_and(|p| !p.is_empty())
    }

    /// Start a spawn cycle for a map, positioned on its first point
    pub fn cycle(&self, map: &str) -> Result<SpawnCycle, CaptureError> {
        match self.maps.get(map) {
            Some(points) if !points.is_empty() => Ok(SpawnCycle {
                map: map.to_string(),
                points: points.clone(),
                cursor: 0,
            }),
            _ => Err(CaptureError::UnknownMap(map.to_string())),
        }
    }
}

/// Wrapping cursor over the spawn points of one map
///
/// Always holds at least one point.
#[derive(Debug, Clone)]
pub struct SpawnCycle {
    map: String,
    points: Vec<SpawnPoint>,
    cursor: usize,
}

impl SpawnCycle {
    /// Map this cycle belongs to
    pub fn map(&self) -> &str {
        &self.map
    }

    /// Point under the cursor
    pub fn current(&self) -> &SpawnPoint {
        &self.points[self.cursor]
    }

    /// Index of the point under the cursor
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Number of points in the cycle
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Always false; a cycle is never empty
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Move to the next point, wrapping after the last, and return it
    pub fn advance(&mut self) -> &SpawnPoint {
        self.cursor = (self.cursor + 1) % self.points.len();
        &self.points[self.cursor]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_maps() {
        let catalog = SpawnCatalog::builtin();
        assert_eq!(catalog.points("italy").unwrap().len(), 9);
        assert_eq!(catalog.points("east_coast_usa").unwrap().len(), 4);
        assert!(catalog.points("utah").is_none());

        let first = &catalog.points("italy").unwrap()[0];
        assert_eq!(first.name, "village_mountain");
    }

    #[test]
    fn test_cycle_starts_on_first_point() {
        let catalog = SpawnCatalog::builtin();
        let cycle = catalog.cycle("east_coast_usa").unwrap();
        assert_eq!(cycle.current().name, "townindustrial");
        assert_eq!(cycle.cursor(), 0);
    }

    #[test]
    fn test_cycle_wraps() {
        let catalog = SpawnCatalog::builtin();
        let mut cycle = catalog.cycle("east_coast_usa").unwrap();

        let names: Vec<String> = (0..5).map(|_| cycle.advance().name.clone()).collect();
        assert_eq!(
            names,
            vec![
                "highway",
                "gasstation",
                "farmhouse",
                "townindustrial",
                "highway"
            ]
        );
    }

    #[test]
    fn test_single_point_cycle_stays_put() {
        let mut catalog = SpawnCatalog::empty();
        catalog.insert_map("test", vec![SpawnPoint::new("only", [1.0, 2.0, 3.0], [0.0, 0.0, 0.0, 1.0])]);
        let mut cycle = catalog.cycle("test").unwrap();
        assert_eq!(cycle.advance().name, "only");
        assert_eq!(cycle.cursor(), 0);
    }

    #[test]
    fn test_unknown_map() {
        let err = SpawnCatalog::builtin().cycle("gridmap").unwrap_err();
        assert!(matches!(err, CaptureError::UnknownMap(m) if m == "gridmap"));
    }

    #[test]
    fn test_from_json_and_merge() {
        let json = r#"{
            "gridmap": [
                {"name": "a", "pos": [0, 0, 0], "rot": [0, 0, 0, 1]},
                {"name": "b", "pos": [10, 0, 0], "rot": [0, 0, 1, 0]}
            ]
        }"#;
        let extra = SpawnCatalog::from_json_str(json).unwrap();

        let mut catalog = SpawnCatalog::builtin();
        catalog.merge(extra);

        assert!(catalog.contains("gridmap"));
        assert!(catalog.contains("italy"));
        let cycle = catalog.cycle("gridmap").unwrap();
        assert_eq!(cycle.len(), 2);
        assert_eq!(cycle.current().pos, Vec3::new(0.0, 0.0, 0.0));
    }

    #[test]
    fn test_from_json_rejects_empty_map() {
        let err = SpawnCatalog::from_json_str(r#"{"gridmap": []}"#).unwrap_err();
        assert!(matches!(err, CaptureError::InvalidConfig(_)));
    }
}

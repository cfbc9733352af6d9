//! Maps, driving logs and scenarios on disk.
//!
//! Landmark maps use the plain text layout most landmark localization datasets ship with: one
//! landmark per line, `x<TAB>y<TAB>id`, no header. Controls, ground truth and observations are CSV
//! files with a header row. A [`Scenario`] bundles all four and reads or writes them from a single
//! directory.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{FilterError, Result};
use crate::{Landmark, LandmarkObs, Pose, dist};

pub const MAP_FILE: &str = "map_data.txt";
pub const CONTROL_FILE: &str = "control_data.csv";
pub const GROUND_TRUTH_FILE: &str = "gt_data.csv";
pub const OBSERVATION_FILE: &str = "observations.csv";

/// The static landmark map. Landmarks are read-only for the filter's whole lifetime.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Map {
    landmarks: Vec<Landmark>,
}
impl Map {
    pub fn new(landmarks: Vec<Landmark>) -> Self {
        Map { landmarks }
    }
    pub fn landmarks(&self) -> &[Landmark] {
        &self.landmarks
    }
    pub fn len(&self) -> usize {
        self.landmarks.len()
    }
    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }
    pub fn get(&self, id: u32) -> Option<&Landmark> {
        self.landmarks.iter().find(|lm| lm.id == id)
    }
    /// Landmarks strictly closer than `range` to `(x, y)`, in map order.
    pub fn landmarks_within(&self, x: f64, y: f64, range: f64) -> impl Iterator<Item = &Landmark> {
        self.landmarks
            .iter()
            .filter(move |lm| dist(x, y, lm.x, lm.y) < range)
    }
    /// Read a tab separated `x y id` map file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .delimiter(b'\t')
            .trim(csv::Trim::All)
            .from_path(path)?;
        let mut landmarks = Vec::new();
        for result in rdr.deserialize() {
            let (x, y, id): (f64, f64, u32) = result?;
            landmarks.push(Landmark::new(id, x, y));
        }
        Ok(Map::new(landmarks))
    }
    /// Write the map in the same layout [`Map::from_file`] reads.
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .delimiter(b'\t')
            .from_path(path)?;
        for lm in &self.landmarks {
            writer.serialize((lm.x, lm.y, lm.id))?;
        }
        writer.flush()?;
        Ok(())
    }
}

fn read_records<T: serde::de::DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<Vec<T>> {
    let mut rdr = csv::Reader::from_path(path)?;
    let mut records = Vec::new();
    for result in rdr.deserialize() {
        let record: T = result?;
        records.push(record);
    }
    Ok(records)
}

fn write_records<T: Serialize, P: AsRef<Path>>(records: &[T], path: P) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Motion command applied between two consecutive steps.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlRecord {
    /// Linear velocity (m/s)
    pub velocity: f64,
    /// Yaw rate (rad/s)
    pub yaw_rate: f64,
}
impl ControlRecord {
    pub fn new(velocity: f64, yaw_rate: f64) -> Self {
        ControlRecord { velocity, yaw_rate }
    }
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Vec<Self>> {
        read_records(path)
    }
    pub fn to_csv<P: AsRef<Path>>(records: &[Self], path: P) -> Result<()> {
        write_records(records, path)
    }
}

/// True pose at one step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GroundTruthRecord {
    pub x: f64,
    pub y: f64,
    pub theta: f64,
}
impl GroundTruthRecord {
    pub fn pose(&self) -> Pose {
        Pose::new(self.x, self.y, self.theta)
    }
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Vec<Self>> {
        read_records(path)
    }
    pub fn to_csv<P: AsRef<Path>>(records: &[Self], path: P) -> Result<()> {
        write_records(records, path)
    }
}
impl From<Pose> for GroundTruthRecord {
    fn from(pose: Pose) -> Self {
        GroundTruthRecord {
            x: pose.x,
            y: pose.y,
            theta: pose.theta,
        }
    }
}

/// One vehicle-frame observation tagged with the step it belongs to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ObservationRecord {
    pub step: usize,
    pub x: f64,
    pub y: f64,
}
impl ObservationRecord {
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Vec<Self>> {
        read_records(path)
    }
    pub fn to_csv<P: AsRef<Path>>(records: &[Self], path: P) -> Result<()> {
        write_records(records, path)
    }
}

/// A complete driving log: map, controls, ground truth and the observations seen at every step.
///
/// Step `t` has pose `ground_truth[t]` and observations `observations[t]`. The control that moves
/// the vehicle from step `t - 1` to step `t` is `controls[t - 1]`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Scenario {
    pub map: Map,
    pub controls: Vec<ControlRecord>,
    pub ground_truth: Vec<GroundTruthRecord>,
    pub observations: Vec<Vec<LandmarkObs>>,
}
impl Scenario {
    pub fn num_steps(&self) -> usize {
        self.ground_truth.len()
    }
    /// Check the per-step sequences line up.
    pub fn validate(&self) -> Result<()> {
        let steps = self.num_steps();
        if self.observations.len() != steps {
            return Err(FilterError::Parse(format!(
                "scenario has {} ground truth steps but {} observation steps",
                steps,
                self.observations.len()
            )));
        }
        if self.controls.len() + 1 < steps {
            return Err(FilterError::Parse(format!(
                "scenario has {} ground truth steps but only {} controls",
                steps,
                self.controls.len()
            )));
        }
        Ok(())
    }
    /// Load a scenario from the four files in `dir`.
    pub fn load<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let map = Map::from_file(dir.join(MAP_FILE))?;
        let controls = ControlRecord::from_csv(dir.join(CONTROL_FILE))?;
        let ground_truth = GroundTruthRecord::from_csv(dir.join(GROUND_TRUTH_FILE))?;
        let records = ObservationRecord::from_csv(dir.join(OBSERVATION_FILE))?;

        let mut observations = vec![Vec::new(); ground_truth.len()];
        for record in records {
            let step = observations.get_mut(record.step).ok_or_else(|| {
                FilterError::Parse(format!(
                    "observation step {} beyond last ground truth step {}",
                    record.step,
                    ground_truth.len().saturating_sub(1)
                ))
            })?;
            step.push(LandmarkObs::new(record.x, record.y));
        }
        let scenario = Scenario {
            map,
            controls,
            ground_truth,
            observations,
        };
        scenario.validate()?;
        Ok(scenario)
    }
    /// Write the scenario into `dir`, creating it if needed.
    pub fn save<P: AsRef<Path>>(&self, dir: P) -> Result<()> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        self.map.to_file(dir.join(MAP_FILE))?;
        ControlRecord::to_csv(&self.controls, dir.join(CONTROL_FILE))?;
        GroundTruthRecord::to_csv(&self.ground_truth, dir.join(GROUND_TRUTH_FILE))?;
        let records: Vec<ObservationRecord> = self
            .observations
            .iter()
            .enumerate()
            .flat_map(|(step, obs)| {
                obs.iter().map(move |o| ObservationRecord {
                    step,
                    x: o.x,
                    y: o.y,
                })
            })
            .collect();
        ObservationRecord::to_csv(&records, dir.join(OBSERVATION_FILE))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("landmark_pf_data_{}_{name}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn reads_tab_separated_map() {
        let dir = temp_dir("map_read");
        let path = dir.join(MAP_FILE);
        fs::write(&path, "92.064\t-34.777\t1\n61.109\t-47.132\t2\n 17.42 \t-4.5\t3\n").unwrap();
        let map = Map::from_file(&path).unwrap();
        assert_eq!(map.len(), 3);
        assert_eq!(map.landmarks()[0], Landmark::new(1, 92.064, -34.777));
        assert_eq!(map.get(3), Some(&Landmark::new(3, 17.42, -4.5)));
        assert_eq!(map.get(4), None);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn map_file_round_trip() {
        let dir = temp_dir("map_round_trip");
        let path = dir.join(MAP_FILE);
        let map = Map::new(vec![
            Landmark::new(1, 0.1, -2.75),
            Landmark::new(17, 1e3, 3.0),
        ]);
        map.to_file(&path).unwrap();
        assert_eq!(Map::from_file(&path).unwrap(), map);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn malformed_map_is_an_error() {
        let dir = temp_dir("map_bad");
        let path = dir.join(MAP_FILE);
        fs::write(&path, "1.0\tabc\t1\n").unwrap();
        assert!(matches!(Map::from_file(&path), Err(FilterError::Csv(_))));
        assert!(matches!(
            Map::from_file(dir.join("missing.txt")),
            Err(FilterError::Csv(_))
        ));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn range_query_is_strict() {
        let map = Map::new(vec![
            Landmark::new(1, 1.0, 0.0),
            Landmark::new(2, 3.0, 0.0),
            Landmark::new(3, 2.0, 0.0),
        ]);
        let ids: Vec<u32> = map.landmarks_within(0.0, 0.0, 2.0).map(|lm| lm.id).collect();
        assert_eq!(ids, vec![1]);
        let ids: Vec<u32> = map.landmarks_within(0.0, 0.0, 10.0).map(|lm| lm.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(map.landmarks_within(0.0, 0.0, 0.0).count(), 0);
    }

    #[test]
    fn scenario_round_trip() {
        let dir = temp_dir("scenario");
        let scenario = Scenario {
            map: Map::new(vec![Landmark::new(1, 5.0, 3.0), Landmark::new(2, 2.0, 1.0)]),
            controls: vec![ControlRecord::new(1.0, 0.1), ControlRecord::new(1.5, -0.2)],
            ground_truth: vec![
                GroundTruthRecord::from(Pose::new(0.0, 0.0, 0.0)),
                GroundTruthRecord::from(Pose::new(0.1, 0.0, 0.01)),
            ],
            observations: vec![
                vec![LandmarkObs::new(5.0, 3.0), LandmarkObs::new(2.0, 1.0)],
                Vec::new(),
            ],
        };
        scenario.save(&dir).unwrap();
        let loaded = Scenario::load(&dir).unwrap();
        assert_eq!(loaded, scenario);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn observation_past_last_step_is_rejected() {
        let dir = temp_dir("scenario_bad_step");
        let scenario = Scenario {
            map: Map::new(vec![Landmark::new(1, 5.0, 3.0)]),
            controls: vec![ControlRecord::new(1.0, 0.0)],
            ground_truth: vec![GroundTruthRecord::default()],
            observations: vec![Vec::new()],
        };
        scenario.save(&dir).unwrap();
        ObservationRecord::to_csv(
            &[ObservationRecord {
                step: 3,
                x: 1.0,
                y: 1.0,
            }],
            dir.join(OBSERVATION_FILE),
        )
        .unwrap();
        assert!(matches!(Scenario::load(&dir), Err(FilterError::Parse(_))));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn validate_checks_lengths() {
        let mut scenario = Scenario {
            ground_truth: vec![GroundTruthRecord::default(); 3],
            observations: vec![Vec::new(); 3],
            controls: vec![ControlRecord::default(); 2],
            ..Scenario::default()
        };
        assert!(scenario.validate().is_ok());
        scenario.controls.pop();
        assert!(scenario.validate().is_err());
        scenario.controls.push(ControlRecord::default());
        scenario.observations.pop();
        assert!(scenario.validate().is_err());
    }
}

//! Cuvette occupancy detection.
//!
//! Three reflective optical sensors line the sample chamber, ordered from
//! the opening inward. A seated cuvette blocks every sensor from the
//! opening down to its insertion depth, which pulls those raw readings
//! below their open-chamber values. Classification therefore needs a
//! per-sensor threshold, calibrated against an empty chamber, and a check
//! that the covered pattern is one a cuvette can physically produce.

use crate::protocol::{CuvettePosition, StatusFrame};

/// Fraction of the empty-chamber reading used as the covered threshold.
pub const EMPTY_CHAMBER_MARGIN: f32 = 0.9;

/// Per-sensor covered thresholds, in raw ADC counts.
///
/// A sensor counts as covered when its raw reading is at or below its
/// threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CuvetteThresholds {
    /// Threshold for the sensor at position 1.
    pub position_1: f32,
    /// Threshold for the sensor at position 2.
    pub position_2: f32,
    /// Threshold for the sensor at position 3.
    pub position_3: f32,
}

/// What the cuvette sensors say about the chamber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occupancy {
    /// No sensor is covered.
    Empty,
    /// A cuvette is seated down to the given position.
    Occupied(CuvettePosition),
    /// The covered pattern matches no insertion depth, for example a
    /// deeper sensor covered while a shallower one is clear.
    Indeterminate,
}

impl std::fmt::Display for Occupancy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "empty"),
            Self::Occupied(position) => write!(f, "occupied (position {position})"),
            Self::Indeterminate => write!(f, "indeterminate"),
        }
    }
}

impl CuvetteThresholds {
    /// Thresholds from explicit raw counts.
    pub fn new(position_1: f32, position_2: f32, position_3: f32) -> Self {
        Self {
            position_1,
            position_2,
            position_3,
        }
    }

    /// Derive thresholds from a status frame captured with the chamber
    /// empty, scaling each reading by [`EMPTY_CHAMBER_MARGIN`].
    pub fn from_empty_chamber(frame: &StatusFrame) -> Self {
        let scaled = |position| f32::from(frame.cuvette_raw(position)) * EMPTY_CHAMBER_MARGIN;
        Self {
            position_1: scaled(CuvettePosition::One),
            position_2: scaled(CuvettePosition::Two),
            position_3: scaled(CuvettePosition::Three),
        }
    }

    /// The threshold for one sensor.
    pub fn threshold(&self, position: CuvettePosition) -> f32 {
        match position {
            CuvettePosition::One => self.position_1,
            CuvettePosition::Two => self.position_2,
            CuvettePosition::Three => self.position_3,
        }
    }

    /// Classify the cuvette readings of a status frame.
    pub fn classify(&self, frame: &StatusFrame) -> Occupancy {
        self.classify_raw([
            frame.cuvette_raw(CuvettePosition::One),
            frame.cuvette_raw(CuvettePosition::Two),
            frame.cuvette_raw(CuvettePosition::Three),
        ])
    }

    /// Classify raw readings ordered by position.
    ///
    /// A cuvette seated to depth `k` covers exactly sensors `1..=k`, so
    /// only four covered patterns are physical; anything else is reported
    /// as [`Occupancy::Indeterminate`].
    pub fn classify_raw(&self, raw: [u16; 3]) -> Occupancy {
        let covered = [
            f32::from(raw[0]) <= self.position_1,
            f32::from(raw[1]) <= self.position_2,
            f32::from(raw[2]) <= self.position_3,
        ];
        match covered {
            [false, false, false] => Occupancy::Empty,
            [true, false, false] => Occupancy::Occupied(CuvettePosition::One),
            [true, true, false] => Occupancy::Occupied(CuvettePosition::Two),
            [true, true, true] => Occupancy::Occupied(CuvettePosition::Three),
            _ => Occupancy::Indeterminate,
        }
    }
}

//! Radar ("wheel") chart geometry.
//!
//! Pure coordinate math for drawing a wheel: each area gets an axis, starting
//! at 12 o'clock and going clockwise; a score maps linearly onto the radius.

use serde::Serialize;

use crate::types::{LifeArea, MAX_SCORE};

/// Score values where concentric grid rings are drawn.
pub const GRID_LEVELS: [f64; 5] = [2.0, 4.0, 6.0, 8.0, 10.0];

/// Labels sit slightly outside the outer ring.
const LABEL_SCORE: f64 = 11.5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// Chart canvas: a square of side `size` with `padding` kept free at the edge.
#[derive(Debug, Clone, Copy)]
pub struct RadarLayout {
    pub size: f64,
    pub padding: f64,
}

impl Default for RadarLayout {
    fn default() -> Self {
        Self {
            size: 300.0,
            padding: 20.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Label {
    pub text: String,
    pub at: Point,
}

/// Everything a renderer needs to draw one wheel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RadarChart {
    pub center: Point,
    pub grid_radii: Vec<f64>,
    pub axes: Vec<Point>,
    pub polygon: Vec<Point>,
    pub labels: Vec<Label>,
}

impl RadarLayout {
    pub fn center(&self) -> Point {
        Point {
            x: self.size / 2.0,
            y: self.size / 2.0,
        }
    }

    pub fn radius(&self) -> f64 {
        self.size / 2.0 - self.padding
    }

    /// Position of `score` on axis `index` of `total`.
    pub fn coords(&self, score: f64, index: usize, total: usize) -> Point {
        let center = self.center();
        if total == 0 {
            return center;
        }
        let angle = std::f64::consts::TAU * index as f64 / total as f64
            - std::f64::consts::FRAC_PI_2;
        let r = (score / MAX_SCORE) * self.radius();
        Point {
            x: center.x + r * angle.cos(),
            y: center.y + r * angle.sin(),
        }
    }

    pub fn chart(&self, areas: &[LifeArea]) -> RadarChart {
        let total = areas.len();
        RadarChart {
            center: self.center(),
            grid_radii: GRID_LEVELS
                .iter()
                .map(|level| level / MAX_SCORE * self.radius())
                .collect(),
            axes: (0..total)
                .map(|i| self.coords(MAX_SCORE, i, total))
                .collect(),
            polygon: areas
                .iter()
                .enumerate()
                .map(|(i, a)| self.coords(a.score(), i, total))
                .collect(),
            labels: areas
                .iter()
                .enumerate()
                .map(|(i, a)| Label {
                    text: a.name.clone(),
                    at: self.coords(LABEL_SCORE, i, total),
                })
                .collect(),
        }
    }
}

/// SVG `points` attribute for a polygon.
pub fn svg_points(points: &[Point]) -> String {
    points
        .iter()
        .map(|p| format!("{:.2},{:.2}", p.x, p.y))
        .collect::<Vec<_>>()
        .join(" ")
}

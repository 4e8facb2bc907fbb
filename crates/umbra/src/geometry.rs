use serde::{Deserialize, Serialize};

const INTERSECT_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ElevatedPoint {
    pub point: Point,
    pub elevation: f64,
}

impl ElevatedPoint {
    pub const fn new(point: Point, elevation: f64) -> Self {
        Self { point, elevation }
    }
}

/// Grid conversion used to fold elevation (distance units, e.g. feet) into
/// planar scene units (pixels).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridMetrics {
    pub distance_units: f64,
    pub pixel_size: f64,
}

impl Default for GridMetrics {
    fn default() -> Self {
        Self {
            distance_units: 5.0,
            pixel_size: 100.0,
        }
    }
}

impl GridMetrics {
    pub fn is_valid(&self) -> bool {
        self.distance_units.is_finite()
            && self.pixel_size.is_finite()
            && self.distance_units > 0.0
            && self.pixel_size > 0.0
    }

    pub fn elevation_to_scene(&self, elevation: f64) -> f64 {
        elevation / self.distance_units * self.pixel_size
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DoorState {
    #[default]
    None,
    Closed,
    Open,
    Locked,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Wall {
    pub a: Point,
    pub b: Point,
    #[serde(default = "default_blocks_sight")]
    pub blocks_sight: bool,
    #[serde(default)]
    pub door: DoorState,
}

fn default_blocks_sight() -> bool {
    true
}

impl Wall {
    pub fn new(a: Point, b: Point) -> Self {
        Self {
            a,
            b,
            blocks_sight: true,
            door: DoorState::None,
        }
    }

    pub fn blocks_light(&self) -> bool {
        self.blocks_sight && self.door != DoorState::Open
    }
}

pub fn distance_3d(a: ElevatedPoint, b: ElevatedPoint, grid: GridMetrics) -> f64 {
    let dx = a.point.x - b.point.x;
    let dy = a.point.y - b.point.y;
    let dz = grid.elevation_to_scene(a.elevation) - grid.elevation_to_scene(b.elevation);
    (dx * dx + dy * dy + dz * dz).sqrt()
}

/// Degrees of the vector pointing from `to` towards `from`, in `[0, 360)`.
/// Coincident points yield 0.
pub fn bearing_angle(from: Point, to: Point) -> f64 {
    let dx = from.x - to.x;
    let dy = from.y - to.y;
    if dx == 0.0 && dy == 0.0 {
        return 0.0;
    }
    normalize_degrees(dy.atan2(dx).to_degrees())
}

pub fn normalize_degrees(degrees: f64) -> f64 {
    let wrapped = degrees.rem_euclid(360.0);
    // rem_euclid rounds tiny negatives up to exactly 360.0
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Shortest angular distance between two headings, in `[0, 180]`.
pub fn angular_difference(a: f64, b: f64) -> f64 {
    let delta = normalize_degrees(a - b);
    if delta > 180.0 {
        360.0 - delta
    } else {
        delta
    }
}

pub fn within_cone(bearing: f64, source_rotation: f64, cone_angle: f64) -> bool {
    if cone_angle >= 360.0 {
        return true;
    }
    angular_difference(bearing, source_rotation) <= cone_angle / 2.0
}

pub fn rotate_about(point: Point, center: Point, degrees: f64) -> Point {
    if degrees == 0.0 {
        return point;
    }
    let (sin, cos) = degrees.to_radians().sin_cos();
    let dx = point.x - center.x;
    let dy = point.y - center.y;
    Point {
        x: center.x + dx * cos - dy * sin,
        y: center.y + dx * sin + dy * cos,
    }
}

fn cross(ax: f64, ay: f64, bx: f64, by: f64) -> f64 {
    ax * by - ay * bx
}

/// The open segment `from -> to` crosses the closed wall segment.
/// Parallel and collinear walls never count.
pub fn segment_crosses_wall(from: Point, to: Point, wall: &Wall) -> bool {
    let (rx, ry) = (to.x - from.x, to.y - from.y);
    let (sx, sy) = (wall.b.x - wall.a.x, wall.b.y - wall.a.y);
    let denom = cross(rx, ry, sx, sy);
    if denom.abs() < INTERSECT_EPSILON {
        return false;
    }
    let (qx, qy) = (wall.a.x - from.x, wall.a.y - from.y);
    let t = cross(qx, qy, sx, sy) / denom;
    let u = cross(qx, qy, rx, ry) / denom;
    t > INTERSECT_EPSILON
        && t < 1.0 - INTERSECT_EPSILON
        && u >= -INTERSECT_EPSILON
        && u <= 1.0 + INTERSECT_EPSILON
}

pub fn count_occluders(from: Point, to: Point, walls: &[Wall]) -> usize {
    walls
        .iter()
        .filter(|wall| wall.blocks_light() && segment_crosses_wall(from, to, wall))
        .count()
}

pub fn has_occlusion(from: Point, to: Point, walls: &[Wall]) -> bool {
    count_occluders(from, to, walls) > 0
}

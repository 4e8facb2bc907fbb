use serde::{Deserialize, Serialize};

use crate::geometry::{rotate_about, Point};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegionId(pub u64);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionSource {
    #[default]
    Drawing,
    Tile,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RegionShape {
    Rectangle,
    Ellipse,
    /// Vertices relative to the region's top-left corner.
    Polygon { points: Vec<Point> },
}

/// Axis-aligned box at `(x, y)` with `width`/`height`, rotated by `rotation`
/// degrees about its centre.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub id: RegionId,
    #[serde(default)]
    pub source: RegionSource,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub rotation: f64,
    #[serde(default)]
    pub elevation: f64,
    #[serde(default)]
    pub restricts_light: bool,
    pub shape: RegionShape,
}

impl Region {
    pub fn center(&self) -> Point {
        Point {
            x: self.x + self.width / 2.0,
            y: self.y + self.height / 2.0,
        }
    }

    fn is_well_formed(&self) -> bool {
        let finite = self.x.is_finite()
            && self.y.is_finite()
            && self.width.is_finite()
            && self.height.is_finite()
            && self.rotation.is_finite();
        if !finite || self.width <= 0.0 || self.height <= 0.0 {
            return false;
        }
        match &self.shape {
            RegionShape::Polygon { points } => {
                points.len() >= 3 && points.iter().all(|point| point.is_finite())
            }
            RegionShape::Rectangle | RegionShape::Ellipse => true,
        }
    }
}

pub fn point_in_region(point: Point, region: &Region) -> bool {
    if !region.is_well_formed() {
        return false;
    }
    let local = rotate_about(point, region.center(), -region.rotation);
    let in_bounds = local.x >= region.x
        && local.x <= region.x + region.width
        && local.y >= region.y
        && local.y <= region.y + region.height;
    if !in_bounds {
        return false;
    }

    match &region.shape {
        RegionShape::Rectangle => true,
        RegionShape::Ellipse => {
            let center = region.center();
            let rx = region.width / 2.0;
            let ry = region.height / 2.0;
            let nx = (local.x - center.x) / rx;
            let ny = (local.y - center.y) / ry;
            nx * nx + ny * ny <= 1.0
        }
        RegionShape::Polygon { points } => {
            let relative = Point {
                x: local.x - region.x,
                y: local.y - region.y,
            };
            polygon_contains(points, relative)
        }
    }
}

fn polygon_contains(vertices: &[Point], point: Point) -> bool {
    let mut inside = false;
    let mut j = vertices.len() - 1;
    for i in 0..vertices.len() {
        let vi = vertices[i];
        let vj = vertices[j];
        if (vi.y > point.y) != (vj.y > point.y) {
            let crossing_x = (vj.x - vi.x) * (point.y - vi.y) / (vj.y - vi.y) + vi.x;
            if point.x < crossing_x {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// First light-restricting region that sits above `elevation` and covers `point`.
pub fn restricting_region(point: Point, elevation: f64, regions: &[Region]) -> Option<&Region> {
    regions.iter().find(|region| {
        region.restricts_light && region.elevation > elevation && point_in_region(point, region)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(shape: RegionShape) -> Region {
        Region {
            id: RegionId(1),
            source: RegionSource::Drawing,
            x: 0.0,
            y: 0.0,
            width: 100.0,
            height: 50.0,
            rotation: 0.0,
            elevation: 10.0,
            restricts_light: true,
            shape,
        }
    }

    #[test]
    fn rectangle_contains_points_inside_its_bounds() {
        let rect = region(RegionShape::Rectangle);
        assert!(point_in_region(Point::new(10.0, 10.0), &rect));
        assert!(point_in_region(Point::new(100.0, 50.0), &rect));
        assert!(!point_in_region(Point::new(101.0, 10.0), &rect));
    }

    #[test]
    fn rotation_is_undone_before_the_shape_test() {
        let mut rect = region(RegionShape::Rectangle);
        rect.rotation = 90.0;
        // Centre (50, 25); rotated a quarter turn the box spans x 25..75, y -25..75.
        assert!(point_in_region(Point::new(50.0, -20.0), &rect));
        assert!(!point_in_region(Point::new(5.0, 25.0), &rect));
    }

    #[test]
    fn ellipse_excludes_bounding_box_corners() {
        let ellipse = region(RegionShape::Ellipse);
        assert!(point_in_region(Point::new(50.0, 25.0), &ellipse));
        assert!(point_in_region(Point::new(99.0, 25.0), &ellipse));
        assert!(!point_in_region(Point::new(2.0, 2.0), &ellipse));
    }

    #[test]
    fn polygon_uses_parity_test() {
        let triangle = region(RegionShape::Polygon {
            points: vec![
                Point::new(0.0, 0.0),
                Point::new(100.0, 0.0),
                Point::new(0.0, 50.0),
            ],
        });
        assert!(point_in_region(Point::new(10.0, 10.0), &triangle));
        assert!(!point_in_region(Point::new(90.0, 40.0), &triangle));
    }

    #[test]
    fn polygon_vertices_are_relative_to_region_origin() {
        let mut square = region(RegionShape::Polygon {
            points: vec![
                Point::new(0.0, 0.0),
                Point::new(10.0, 0.0),
                Point::new(10.0, 10.0),
                Point::new(0.0, 10.0),
            ],
        });
        square.x = 200.0;
        square.y = 200.0;
        square.width = 10.0;
        square.height = 10.0;
        assert!(point_in_region(Point::new(205.0, 205.0), &square));
        assert!(!point_in_region(Point::new(5.0, 5.0), &square));
    }

    #[test]
    fn malformed_regions_never_contain_points() {
        let degenerate = region(RegionShape::Polygon {
            points: vec![Point::new(0.0, 0.0), Point::new(10.0, 10.0)],
        });
        assert!(!point_in_region(Point::new(1.0, 1.0), &degenerate));

        let mut flat = region(RegionShape::Rectangle);
        flat.height = 0.0;
        assert!(!point_in_region(Point::new(1.0, 0.0), &flat));
    }

    #[test]
    fn restriction_only_applies_below_the_region() {
        let regions = vec![region(RegionShape::Rectangle)];
        let inside = Point::new(10.0, 10.0);
        assert!(restricting_region(inside, 0.0, &regions).is_some());
        assert!(restricting_region(inside, 10.0, &regions).is_none());
        assert!(restricting_region(inside, 25.0, &regions).is_none());
    }

    #[test]
    fn non_restricting_regions_are_ignored() {
        let mut open = region(RegionShape::Rectangle);
        open.restricts_light = false;
        assert!(restricting_region(Point::new(10.0, 10.0), 0.0, &[open]).is_none());
    }
}

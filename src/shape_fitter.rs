// src/shape_fitter.rs

//! Containment tests for custom (polygon) pads.
//!
//! KiCad requires the anchor pad of a custom shape to sit inside its own
//! outline. EasyEDA does not, so the anchor sometimes has to be moved.

use crate::kicad_models::FpPad;
use std::f64::consts::PI;

pub type Point = (f64, f64);

const ON_SEGMENT_EPSILON: f64 = 1e-9;
const ANCHOR_POLYGON_SIDES: usize = 12;
const ANCHOR_SEARCH_STEP: f64 = 0.05;

fn is_on_segment(a: Point, b: Point, p: Point) -> bool {
    let (x0, y0) = a;
    let (x1, y1) = b;
    let (px, py) = p;
    x0.min(x1) <= px
        && px <= x0.max(x1)
        && y0.min(y1) <= py
        && py <= y0.max(y1)
        && ((px - x0) * (y1 - y0) - (py - y0) * (x1 - x0)).abs() < ON_SEGMENT_EPSILON
}

fn is_left(a: Point, b: Point, p: Point) -> bool {
    ((b.0 - a.0) * (p.1 - a.1) - (b.1 - a.1) * (p.0 - a.0)) > 0.0
}

/// Winding-number containment. Points on an edge count as inside.
pub fn point_in_polygon(point: Point, polygon: &[Point]) -> bool {
    let (_, y) = point;
    let n = polygon.len();
    let mut winding_number = 0i32;

    for i in 0..n {
        let a = polygon[i];
        let b = polygon[(i + 1) % n];

        if is_on_segment(a, b, point) {
            return true;
        }

        if a.1 <= y && y < b.1 && is_left(a, b, point) {
            winding_number += 1;
        } else if b.1 <= y && y < a.1 && !is_left(a, b, point) {
            winding_number -= 1;
        }
    }

    winding_number != 0
}

fn regular_polygon(center: Point, radius: f64, sides: usize) -> impl Iterator<Item = Point> {
    let (cx, cy) = center;
    (0..sides).map(move |i| {
        let theta = 2.0 * PI * i as f64 / sides as f64;
        (cx + radius * theta.cos(), cy + radius * theta.sin())
    })
}

/// Checks a 12-gon standing in for the circle, not the circle itself.
/// Concave outlines can slip between the vertices.
pub fn circle_approximately_in_polygon(center: Point, radius: f64, polygon: &[Point]) -> bool {
    regular_polygon(center, radius, ANCHOR_POLYGON_SIDES)
        .all(|vertex| point_in_polygon(vertex, polygon))
}

fn polygon_bounds(polygon: &[Point]) -> Option<(f64, f64, f64, f64)> {
    let first = polygon.first()?;
    Some(polygon.iter().fold(
        (first.0, first.0, first.1, first.1),
        |(min_x, max_x, min_y, max_y), &(x, y)| (min_x.min(x), max_x.max(x), min_y.min(y), max_y.max(y)),
    ))
}

fn float_range(start: f64, stop: f64, step: f64) -> impl Iterator<Item = f64> {
    let count = ((stop - start) / step) as i64 + 1;
    (0..count.max(0)).map(move |i| start + step * i as f64)
}

/// Scans the polygon's bounding box (x outer, y inner, both ascending) and
/// returns the first grid point where the anchor circle fits.
pub fn find_anchor_center(polygon: &[Point], radius: f64) -> Option<Point> {
    let (min_x, max_x, min_y, max_y) = polygon_bounds(polygon)?;

    for x in float_range(min_x, max_x, ANCHOR_SEARCH_STEP) {
        for y in float_range(min_y, max_y, ANCHOR_SEARCH_STEP) {
            if circle_approximately_in_polygon((x, y), radius, polygon) {
                return Some((x, y));
            }
        }
    }
    None
}

/// Outcome of [`reposition_anchor_if_needed`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AnchorFit {
    AlreadyInside,
    Moved { from: Point, to: Point },
    /// No grid point fits. The pad keeps its original position.
    NotFound,
}

pub fn reposition_anchor_if_needed(pad: &mut FpPad, polygon: &[Point]) -> AnchorFit {
    let center = pad.pos;
    let radius = pad.size.0 / 2.0;

    if circle_approximately_in_polygon(center, radius, polygon) {
        return AnchorFit::AlreadyInside;
    }

    match find_anchor_center(polygon, radius) {
        Some(new_center) => {
            log::debug!(
                "Moved anchor of pad {} from {:?} to {:?}",
                pad.number,
                center,
                new_center
            );
            pad.pos = new_center;
            AnchorFit::Moved {
                from: center,
                to: new_center,
            }
        }
        None => {
            log::warn!(
                "The custom shape of pad #{} cannot contain its anchor pad",
                pad.number
            );
            AnchorFit::NotFound
        }
    }
}

// src/converter/symbol.rs

use crate::easyeda_models::*;
use crate::geometry::{elliptical_arc_center, parse_svg_arc, unit_to_mm};
use crate::kicad_models::*;
use crate::library::KicadVersion;
use std::f64::consts::PI;

const ELLIPSE_SEGMENTS: usize = 32;

fn map_pin_type(ee_type: &str) -> KiPinType {
    match ee_type {
        "0" => KiPinType::Unspecified,
        "1" => KiPinType::Input,
        "2" => KiPinType::Output,
        "3" => KiPinType::Bidirectional,
        "4" => KiPinType::PowerIn,
        _ => KiPinType::Passive,
    }
}

/// Symbol names may not contain spaces or slashes in a KiCad library.
pub fn sanitize_symbol_name(name: &str) -> String {
    name.replace(' ', "").replace('/', "_")
}

/// Vendor coordinates relative to the symbol origin, in millimetres with the
/// Y axis pointing up.
#[derive(Clone, Copy)]
struct Frame {
    origin: (f64, f64),
}

impl Frame {
    fn point(&self, x: f64, y: f64) -> (f64, f64) {
        (unit_to_mm(x - self.origin.0), -unit_to_mm(y - self.origin.1))
    }
}

/// Start, mid and end of an SVG arc, still in vendor coordinates.
/// `None` for a degenerate arc with a zero radius.
fn arc_points(path: &str) -> Option<[(f64, f64); 3]> {
    let svg = parse_svg_arc(path)?;
    if svg.radii.1 == 0.0 {
        return None;
    }
    let arc = elliptical_arc_center(
        svg.start.0,
        svg.start.1,
        svg.radii.0,
        svg.radii.1,
        svg.x_axis_rotation,
        svg.large_arc,
        svg.sweep,
        svg.end.0,
        svg.end.1,
    );
    let (cx, cy) = (arc.center_x, arc.center_y);
    let radius = (svg.start.0 - cx).hypot(svg.start.1 - cy);
    let theta_start = (svg.start.1 - cy).atan2(svg.start.0 - cx);
    let theta_end = (svg.end.1 - cy).atan2(svg.end.0 - cx);

    let mut delta = theta_end - theta_start;
    if svg.sweep {
        while delta <= 0.0 {
            delta += 2.0 * PI;
        }
    } else {
        while delta >= 0.0 {
            delta -= 2.0 * PI;
        }
    }
    let theta_mid = theta_start + delta / 2.0;
    let mid = (cx + radius * theta_mid.cos(), cy + radius * theta_mid.sin());
    Some([svg.start, mid, svg.end])
}

/// Splits an `M`/`L`/`Z` path into polylines, one per `M`.
fn path_polylines(path: &str) -> Vec<Vec<(f64, f64)>> {
    let spaced: String = path
        .chars()
        .flat_map(|c| match c {
            'M' | 'L' | 'Z' | 'm' | 'l' | 'z' => vec![' ', c.to_ascii_uppercase(), ' '],
            ',' => vec![' '],
            _ => vec![c],
        })
        .collect();

    let mut polylines: Vec<Vec<(f64, f64)>> = Vec::new();
    let mut current: Vec<(f64, f64)> = Vec::new();
    let mut pending: Option<f64> = None;

    for token in spaced.split_whitespace() {
        match token {
            "M" => {
                if current.len() > 1 {
                    polylines.push(std::mem::take(&mut current));
                }
                current.clear();
                pending = None;
            }
            "L" => pending = None,
            "Z" => {
                if let Some(&first) = current.first() {
                    current.push(first);
                }
            }
            value => {
                let Ok(number) = value.parse::<f64>() else {
                    log::debug!("Unsupported symbol path token {:?}", value);
                    continue;
                };
                match pending.take() {
                    Some(x) => current.push((x, number)),
                    None => pending = Some(number),
                }
            }
        }
    }
    if current.len() > 1 {
        polylines.push(current);
    }
    polylines
}

/// Translates one vendor symbol (or one subpart) into a KiCad unit.
fn convert_unit(ee_symbol: &EeSymbol) -> KiSymbolUnit {
    let frame = Frame {
        origin: ee_symbol.bbox,
    };
    let mut unit = KiSymbolUnit::default();

    for ee_pin in &ee_symbol.pins {
        unit.pins.push(KiSymbolPin {
            name: ee_pin.name.replace(' ', ""),
            number: ee_pin.number.replace(' ', ""),
            pin_type: map_pin_type(&ee_pin.pin_type),
            length: unit_to_mm(ee_pin.pin_length),
            pos: frame.point(ee_pin.pos_x, ee_pin.pos_y),
            rotation: (ee_pin.rotation + 180).rem_euclid(360),
        });
    }

    for ee_rect in &ee_symbol.rectangles {
        let start = frame.point(ee_rect.x, ee_rect.y);
        let end = frame.point(ee_rect.x + ee_rect.width, ee_rect.y + ee_rect.height);
        unit.rectangles.push(KiSymbolRect { start, end });
    }

    for ee_circle in &ee_symbol.circles {
        unit.circles.push(KiSymbolCircle {
            center: frame.point(ee_circle.center_x, ee_circle.center_y),
            radius: unit_to_mm(ee_circle.radius),
            filled: ee_circle.filled,
        });
    }

    for ee_ellipse in &ee_symbol.ellipses {
        if ee_ellipse.radius_x == ee_ellipse.radius_y {
            unit.circles.push(KiSymbolCircle {
                center: frame.point(ee_ellipse.center_x, ee_ellipse.center_y),
                radius: unit_to_mm(ee_ellipse.radius_x),
                filled: ee_ellipse.filled,
            });
            continue;
        }
        let points = (0..=ELLIPSE_SEGMENTS)
            .map(|i| {
                let theta = 2.0 * PI * (i % ELLIPSE_SEGMENTS) as f64 / ELLIPSE_SEGMENTS as f64;
                frame.point(
                    ee_ellipse.center_x + ee_ellipse.radius_x * theta.cos(),
                    ee_ellipse.center_y + ee_ellipse.radius_y * theta.sin(),
                )
            })
            .collect();
        unit.polylines.push(KiSymbolPolyline {
            points,
            filled: ee_ellipse.filled,
        });
    }

    for ee_arc in &ee_symbol.arcs {
        match arc_points(&ee_arc.path) {
            Some([start, mid, end]) => unit.arcs.push(KiSymbolArc {
                start: frame.point(start.0, start.1),
                mid: frame.point(mid.0, mid.1),
                end: frame.point(end.0, end.1),
            }),
            None => log::warn!("Skipping symbol arc with unusable path: {}", ee_arc.path),
        }
    }

    for ee_polyline in &ee_symbol.polylines {
        unit.polylines.push(KiSymbolPolyline {
            points: ee_polyline.points.iter().map(|&(x, y)| frame.point(x, y)).collect(),
            filled: ee_polyline.filled,
        });
    }

    for ee_polygon in &ee_symbol.polygons {
        let mut points: Vec<(f64, f64)> =
            ee_polygon.points.iter().map(|&(x, y)| frame.point(x, y)).collect();
        if let (Some(&first), Some(&last)) = (points.first(), points.last()) {
            if first != last {
                points.push(first);
            }
        }
        unit.polylines.push(KiSymbolPolyline {
            points,
            filled: ee_polygon.filled,
        });
    }

    for ee_path in &ee_symbol.paths {
        for points in path_polylines(&ee_path.path) {
            unit.polylines.push(KiSymbolPolyline {
                points: points.iter().map(|&(x, y)| frame.point(x, y)).collect(),
                filled: ee_path.filled,
            });
        }
    }

    unit
}

/// Converts an EasyEDA symbol to a single-unit KiCad symbol whose footprint
/// property points into `footprint_lib_name`.
pub fn convert_symbol(ee_symbol: &EeSymbol, footprint_lib_name: &str) -> KiSymbol {
    let info = &ee_symbol.info;
    KiSymbol {
        name: sanitize_symbol_name(&info.name),
        reference: info.prefix.replace('?', ""),
        value: info.name.clone(),
        footprint: info
            .package
            .as_deref()
            .map(|package| format!("{}:{}", footprint_lib_name, package))
            .unwrap_or_default(),
        datasheet: info.datasheet.clone().unwrap_or_default(),
        manufacturer: info.manufacturer.clone(),
        lcsc_part: info.lcsc_id.clone(),
        jlc_part_class: info.jlc_part_class.clone(),
        units: vec![convert_unit(ee_symbol)],
    }
}

/// Converts a possibly multi-unit part.
///
/// An empty primary symbol is replaced by the first subpart. Subparts that
/// render exactly like the primary unit are dropped, and legacy libraries
/// keep only the primary unit. The returned messages describe what was
/// dropped.
pub fn convert_symbol_with_units(
    primary: EeSymbol,
    subparts: Vec<EeSymbol>,
    footprint_lib_name: &str,
    version: KicadVersion,
) -> (KiSymbol, Vec<String>) {
    let mut warnings = Vec::new();
    let mut subparts = subparts.into_iter();

    let primary = if primary.is_empty() {
        match subparts.next() {
            Some(first) => {
                log::debug!("Primary symbol {} is empty, using its first subpart", primary.info.name);
                first
            }
            None => primary,
        }
    } else {
        primary
    };

    let mut symbol = convert_symbol(&primary, footprint_lib_name);
    let primary_body = symbol.units[0].to_v6_body();

    let extra_units: Vec<KiSymbolUnit> = subparts
        .map(|sub| convert_unit(&sub))
        .filter(|unit| !unit.is_empty() && unit.to_v6_body() != primary_body)
        .collect();

    if extra_units.is_empty() {
        return (symbol, warnings);
    }

    match version {
        KicadVersion::V6 => symbol.units.extend(extra_units),
        KicadVersion::V5 => {
            let message = format!(
                "Multi-unit symbols are only supported for KiCad v6 libraries; skipped {} additional unit(s) of {}",
                extra_units.len(),
                symbol.name
            );
            log::warn!("{}", message);
            warnings.push(message);
        }
    }
    (symbol, warnings)
}

// src/converter/footprint.rs

use crate::easyeda_models::*;
use crate::geometry::{
    drill_shape, elliptical_arc_center, normalize_angle, parse_svg_arc, rotate_point, round_to,
    unit_to_mm,
};
use crate::kicad_models::*;
use crate::layers::{DEFAULT_LAYER, ki_layer, smd_pad_layers, tht_pad_layers};
use crate::shape_fitter::{AnchorFit, reposition_anchor_if_needed};
use glam::DVec3;

/// Smallest pad or stroke dimension KiCad accepts.
const MIN_SIZE: f64 = 0.01;

/// Maps EasyEDA pad shapes to KiCad pad shapes.
fn map_shape(shape: &str) -> FpShape {
    match shape {
        "ELLIPSE" => FpShape::Circle,
        "RECT" => FpShape::Rect,
        "OVAL" => FpShape::Oval,
        _ => FpShape::Custom, // POLYGON and anything unknown
    }
}

/// `A(1)` style pad numbers keep only the part in parentheses.
fn pad_number(number: &str) -> String {
    if let Some((_, rest)) = number.split_once('(') {
        if let Some((inner, _)) = rest.split_once(')') {
            return inner.to_string();
        }
    }
    number.to_string()
}

/// Parses `x y x y ...` in vendor units into millimetre points relative to
/// `origin`. A dangling coordinate is dropped.
fn parse_points(points: &str, origin: (f64, f64)) -> Vec<(f64, f64)> {
    let values: Vec<f64> = points
        .split(' ')
        .filter(|p| !p.is_empty())
        .filter_map(|p| p.parse::<f64>().ok())
        .map(unit_to_mm)
        .collect();
    values
        .chunks_exact(2)
        .map(|pair| (pair[0] - origin.0, pair[1] - origin.1))
        .collect()
}

/// Geometric bounds of a footprint in absolute millimetres: pads (with
/// their half size), track points, circles, rectangles, holes and vias.
/// Falls back to the origin when nothing contributes.
fn geometry_bounds(footprint: &EeFootprint, origin: (f64, f64)) -> (f64, f64, f64, f64) {
    let mut bounds: Option<(f64, f64, f64, f64)> = None;
    let mut add = |x: f64, y: f64| {
        bounds = Some(match bounds {
            None => (x, x, y, y),
            Some((min_x, max_x, min_y, max_y)) => {
                (min_x.min(x), max_x.max(x), min_y.min(y), max_y.max(y))
            }
        });
    };

    for pad in &footprint.pads {
        let (cx, cy) = (unit_to_mm(pad.center_x), unit_to_mm(pad.center_y));
        let (hw, hh) = (unit_to_mm(pad.width) / 2.0, unit_to_mm(pad.height) / 2.0);
        add(cx - hw, cy - hh);
        add(cx + hw, cy + hh);
    }
    for track in &footprint.tracks {
        for (x, y) in parse_points(&track.points, (0.0, 0.0)) {
            add(x, y);
        }
    }
    for circle in &footprint.circles {
        let (cx, cy, r) = (
            unit_to_mm(circle.center_x),
            unit_to_mm(circle.center_y),
            unit_to_mm(circle.radius),
        );
        add(cx - r, cy - r);
        add(cx + r, cy + r);
    }
    for rect in &footprint.rectangles {
        let (x, y) = (unit_to_mm(rect.x), unit_to_mm(rect.y));
        add(x, y);
        add(x + unit_to_mm(rect.width), y + unit_to_mm(rect.height));
    }
    for hole in &footprint.holes {
        let (cx, cy, r) = (
            unit_to_mm(hole.center_x),
            unit_to_mm(hole.center_y),
            unit_to_mm(hole.radius),
        );
        add(cx - r, cy - r);
        add(cx + r, cy + r);
    }
    for via in &footprint.vias {
        let (cx, cy, r) = (
            unit_to_mm(via.center_x),
            unit_to_mm(via.center_y),
            unit_to_mm(via.radius),
        );
        add(cx - r, cy - r);
        add(cx + r, cy + r);
    }

    bounds.unwrap_or((origin.0, origin.0, origin.1, origin.1))
}

fn positive_rotation(degrees: f64) -> f64 {
    (360.0 - degrees).rem_euclid(360.0)
}

/// Computes the KiCad placement of the footprint's 3D model.
///
/// With a known model center and size the model is scale-fitted onto the
/// footprint's geometric center. Otherwise the vendor translation is used
/// relative to the footprint origin.
pub fn place_model(footprint: &EeFootprint, model: &Ee3dModel) -> Ki3dModel {
    let origin = (unit_to_mm(footprint.bbox.0), unit_to_mm(footprint.bbox.1));
    let (min_x, max_x, min_y, max_y) = geometry_bounds(footprint, origin);
    let local_center = ((min_x + max_x) / 2.0 - origin.0, (min_y + max_y) / 2.0 - origin.1);
    let (fp_width, fp_height) = (max_x - min_x, max_y - min_y);

    let to_mm = |v: &Ee3dVector| DVec3::new(unit_to_mm(v.x), unit_to_mm(v.y), unit_to_mm(v.z));
    let fitted = match (&model.center, &model.size) {
        (Some(center), Some(size)) if size.x != 0.0 && size.y != 0.0 && size.z != 0.0 => {
            Some((to_mm(center), to_mm(size)))
        }
        _ => None,
    };

    let offset = match fitted {
        Some((center, size)) => {
            let scale_x = if size.x != 0.0 { fp_width / size.x } else { 1.0 };
            let scale_y = if size.y != 0.0 { fp_height / size.y } else { 1.0 };
            DVec3::new(
                round_to(local_center.0 - center.x * scale_x, 2),
                -round_to(local_center.1 - center.y * scale_y, 2),
                -round_to(center.z - size.z / 2.0, 2),
            )
        }
        None => {
            let translation = to_mm(&model.translation);
            let z = match footprint.info.fp_type {
                EeFootprintType::Smd => -round_to(translation.z, 2),
                EeFootprintType::Tht => 0.0,
            };
            DVec3::new(
                round_to(translation.x - origin.0, 2),
                -round_to(translation.y - origin.1, 2),
                z,
            )
        }
    };

    Ki3dModel {
        name: model.name.clone(),
        wrl_data: None,
        step_data: None,
        offset,
        scale: DVec3::ONE,
        rotate: DVec3::new(
            positive_rotation(model.rotation.x),
            positive_rotation(model.rotation.y),
            positive_rotation(model.rotation.z),
        ),
    }
}

fn convert_pad(ee_pad: &EeFootprintPad, origin: (f64, f64), warnings: &mut Vec<String>) -> FpPad {
    let is_tht = ee_pad.hole_radius > 0.0;
    let width = unit_to_mm(ee_pad.width).max(MIN_SIZE);
    let height = unit_to_mm(ee_pad.height).max(MIN_SIZE);
    let layers = if is_tht {
        tht_pad_layers(ee_pad.layer_id)
    } else {
        smd_pad_layers(ee_pad.layer_id)
    };

    let mut pad = FpPad {
        number: pad_number(&ee_pad.number),
        pad_type: if is_tht { FpPadType::ThruHole } else { FpPadType::Smd },
        shape: map_shape(&ee_pad.shape),
        pos: (
            unit_to_mm(ee_pad.center_x) - origin.0,
            unit_to_mm(ee_pad.center_y) - origin.1,
        ),
        size: (width, height),
        layers: layers.unwrap_or("").to_string(),
        rotation: normalize_angle(ee_pad.rotation),
        drill: drill_shape(
            unit_to_mm(ee_pad.hole_radius),
            ee_pad.hole_length.map(unit_to_mm),
            height,
            width,
        ),
        primitives: Vec::new(),
    };

    if pad.shape == FpShape::Custom {
        let polygon = parse_points(&ee_pad.points, origin);
        if polygon.is_empty() {
            log::warn!("Pad {} is a polygon, but has no points defined", ee_pad.number);
            return pad;
        }
        pad.size = (MIN_SIZE, MIN_SIZE);
        pad.rotation = Some(0.0);

        if reposition_anchor_if_needed(&mut pad, &polygon) == AnchorFit::NotFound {
            warnings.push(format!(
                "The custom shape of pad #{} cannot contain its anchor pad",
                pad.number
            ));
        }
        pad.primitives = polygon
            .iter()
            .map(|(x, y)| (round_to(x - pad.pos.0, 2), round_to(y - pad.pos.1, 2)))
            .collect();
    }

    pad
}

fn line_layer(layer_id: i32) -> String {
    smd_pad_layers(layer_id).unwrap_or(DEFAULT_LAYER).to_string()
}

fn general_layer(layer_id: i32) -> String {
    ki_layer(layer_id).unwrap_or(DEFAULT_LAYER).to_string()
}

/// Converts an EasyEDA footprint to a KiCad footprint.
///
/// Returns the footprint together with the non-fatal warnings raised while
/// fitting custom pad anchors.
pub fn convert_footprint(ee_footprint: &EeFootprint) -> (KiFootprint, Vec<String>) {
    let origin = (unit_to_mm(ee_footprint.bbox.0), unit_to_mm(ee_footprint.bbox.1));
    let mut warnings = Vec::new();

    let pads = ee_footprint
        .pads
        .iter()
        .map(|pad| convert_pad(pad, origin, &mut warnings))
        .collect();

    let mut lines = Vec::new();
    for track in &ee_footprint.tracks {
        let points: Vec<(f64, f64)> = parse_points(&track.points, origin)
            .into_iter()
            .map(|(x, y)| (round_to(x, 2), round_to(y, 2)))
            .collect();
        let layer = line_layer(track.layer_id);
        let width = unit_to_mm(track.stroke_width).max(MIN_SIZE);
        for segment in points.windows(2) {
            lines.push(FpLine {
                start: segment[0],
                end: segment[1],
                layer: layer.clone(),
                width,
            });
        }
    }

    for rect in &ee_footprint.rectangles {
        let x = unit_to_mm(rect.x) - origin.0;
        let y = unit_to_mm(rect.y) - origin.1;
        let (w, h) = (unit_to_mm(rect.width), unit_to_mm(rect.height));
        let corners = [(x, y), (x + w, y), (x + w, y + h), (x, y + h), (x, y)];
        let layer = line_layer(rect.layer_id);
        let width = unit_to_mm(rect.stroke_width).max(MIN_SIZE);
        for edge in corners.windows(2) {
            lines.push(FpLine {
                start: edge[0],
                end: edge[1],
                layer: layer.clone(),
                width,
            });
        }
    }

    let holes = ee_footprint
        .holes
        .iter()
        .map(|hole| FpHole {
            pos: (
                unit_to_mm(hole.center_x) - origin.0,
                unit_to_mm(hole.center_y) - origin.1,
            ),
            size: unit_to_mm(hole.radius) * 2.0,
        })
        .collect();

    let vias = ee_footprint
        .vias
        .iter()
        .map(|via| FpVia {
            pos: (
                unit_to_mm(via.center_x) - origin.0,
                unit_to_mm(via.center_y) - origin.1,
            ),
            diameter: unit_to_mm(via.diameter),
            drill: unit_to_mm(via.radius) * 2.0,
        })
        .collect();

    let circles = ee_footprint
        .circles
        .iter()
        .map(|circle| {
            let center = (
                unit_to_mm(circle.center_x) - origin.0,
                unit_to_mm(circle.center_y) - origin.1,
            );
            FpCircle {
                center,
                end: (center.0 + unit_to_mm(circle.radius), center.1),
                layer: general_layer(circle.layer_id),
                width: unit_to_mm(circle.stroke_width).max(MIN_SIZE),
            }
        })
        .collect();

    let mut arcs = Vec::new();
    for ee_arc in &ee_footprint.arcs {
        let Some(svg) = parse_svg_arc(&ee_arc.path) else {
            log::warn!("Skipping footprint arc with unreadable path: {}", ee_arc.path);
            continue;
        };
        let start = (
            unit_to_mm(svg.start.0) - origin.0,
            unit_to_mm(svg.start.1) - origin.1,
        );
        let end = (unit_to_mm(svg.end.0) - origin.0, unit_to_mm(svg.end.1) - origin.1);
        let (rx, ry) = rotate_point(unit_to_mm(svg.radii.0), unit_to_mm(svg.radii.1), 0.0);

        let arc = elliptical_arc_center(
            start.0,
            start.1,
            rx,
            ry,
            svg.x_axis_rotation,
            svg.large_arc,
            svg.sweep,
            end.0,
            end.1,
        );
        log::debug!("Arc {:?} -> center ({}, {}) extent {}", svg, arc.center_x, arc.center_y, arc.extent);

        arcs.push(FpArc {
            start: (arc.center_x, arc.center_y),
            end,
            angle: arc.extent,
            layer: general_layer(ee_arc.layer_id),
            width: unit_to_mm(ee_arc.stroke_width).max(MIN_SIZE),
        });
    }

    let texts = ee_footprint
        .texts
        .iter()
        .map(|text| {
            let mut layer = general_layer(text.layer_id);
            if text.text_type == "N" {
                layer = layer.replace(".SilkS", ".Fab");
            }
            FpText {
                text: text.text.clone(),
                pos: (
                    unit_to_mm(text.center_x) - origin.0,
                    unit_to_mm(text.center_y) - origin.1,
                ),
                rotation: normalize_angle(text.rotation),
                mirrored: layer.starts_with('B'),
                layer,
                font_size: unit_to_mm(text.font_size).max(1.0),
                thickness: unit_to_mm(text.stroke_width).max(MIN_SIZE),
                hidden: !text.is_displayed,
            }
        })
        .collect();

    let model_3d = ee_footprint
        .model_3d
        .as_ref()
        .map(|model| place_model(ee_footprint, model));

    let footprint = KiFootprint {
        name: ee_footprint.info.name.clone(),
        fp_type: match ee_footprint.info.fp_type {
            EeFootprintType::Smd => FootprintType::Smd,
            EeFootprintType::Tht => FootprintType::ThroughHole,
        },
        pads,
        lines,
        holes,
        vias,
        circles,
        arcs,
        texts,
        model_3d,
    };
    (footprint, warnings)
}

// src/importer.rs

use crate::easyeda_models::*;
use crate::error::{Error, Result};
use serde::Deserialize;
use serde_json::Value;

/// Reads a JSON field that EasyEDA sends either as a number or a string.
fn value_f64(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

fn parse_raw_line(line: &str) -> Vec<&str> {
    line.split('~').collect()
}

fn field<'a>(fields: &[&'a str], index: usize) -> &'a str {
    fields.get(index).copied().unwrap_or("")
}

fn field_f64(fields: &[&str], index: usize) -> f64 {
    field(fields, index).trim().parse().unwrap_or(0.0)
}

fn field_i32(fields: &[&str], index: usize) -> i32 {
    field(fields, index).trim().parse().unwrap_or(0)
}

fn is_filled(fill_color: &str) -> bool {
    let fill = fill_color.trim();
    !fill.is_empty() && !fill.eq_ignore_ascii_case("none")
}

fn parse_point_list(points: &str) -> Vec<(f64, f64)> {
    let values: Vec<f64> = points
        .split(|c: char| c == ' ' || c == ',')
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse().ok())
        .collect();
    values.chunks_exact(2).map(|pair| (pair[0], pair[1])).collect()
}

/// Parses one entry of the symbol `shape` array.
fn parse_symbol_shape(shape_str: &str) -> Option<EeSymbolShape> {
    // Symbol pins are more complex, delimited by "^^"
    if shape_str.starts_with("P~") && shape_str.contains("^^") {
        let segments: Vec<&str> = shape_str.split("^^").collect();
        if segments.len() < 4 {
            return None;
        }
        let settings = parse_raw_line(segments[0]);
        let path = parse_raw_line(segments[2]);
        let name_data = parse_raw_line(segments[3]);
        if settings.len() <= 7 || name_data.len() <= 5 || path.len() <= 1 {
            return None;
        }

        let path_commands: Vec<&str> = path[0].split_whitespace().collect();
        let pin_length = path_commands
            .last()
            .and_then(|v| v.parse::<f64>().ok())
            .map(f64::abs)
            .unwrap_or(10.0);

        let number = segments
            .get(4)
            .map(|s| parse_raw_line(s))
            .and_then(|num| num.get(4).map(|n| n.to_string()))
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| settings[3].to_string());

        return Some(EeSymbolShape::Pin(EeSymbolPin {
            number,
            name: name_data[4].to_string(),
            pos_x: field_f64(&settings, 4),
            pos_y: field_f64(&settings, 5),
            rotation: field_i32(&settings, 6),
            pin_type: settings[2].to_string(),
            pin_length,
        }));
    }

    let fields = parse_raw_line(shape_str);
    let shape = match fields[0] {
        "R" if fields.len() > 6 => EeSymbolShape::Rectangle(EeSymbolRectangle {
            x: field_f64(&fields, 1),
            y: field_f64(&fields, 2),
            width: field_f64(&fields, 5),
            height: field_f64(&fields, 6),
        }),
        "C" if fields.len() > 3 => EeSymbolShape::Circle(EeSymbolCircle {
            center_x: field_f64(&fields, 1),
            center_y: field_f64(&fields, 2),
            radius: field_f64(&fields, 3),
            filled: is_filled(field(&fields, 7)),
        }),
        "E" if fields.len() > 4 => EeSymbolShape::Ellipse(EeSymbolEllipse {
            center_x: field_f64(&fields, 1),
            center_y: field_f64(&fields, 2),
            radius_x: field_f64(&fields, 3),
            radius_y: field_f64(&fields, 4),
            filled: is_filled(field(&fields, 8)),
        }),
        "A" if fields.len() > 1 => EeSymbolShape::Arc(EeSymbolArc {
            path: fields[1].to_string(),
        }),
        "PL" if fields.len() > 1 => EeSymbolShape::Polyline(EeSymbolPolyline {
            points: parse_point_list(fields[1]),
            filled: false,
        }),
        "PG" if fields.len() > 1 => EeSymbolShape::Polygon(EeSymbolPolyline {
            points: parse_point_list(fields[1]),
            filled: is_filled(field(&fields, 5)),
        }),
        "PT" if fields.len() > 1 => EeSymbolShape::Path(EeSymbolPath {
            path: fields[1].to_string(),
            filled: is_filled(field(&fields, 5)),
        }),
        _ => return None,
    };
    Some(shape)
}

/// Parses the JSON value from the API (or one of its `subparts`) into an
/// EeSymbol.
pub fn import_symbol(data: &Value) -> Result<EeSymbol> {
    let data_str = &data["dataStr"];
    let c_para = &data_str["head"]["c_para"];

    let text = |v: &Value| v.as_str().filter(|s| !s.is_empty()).map(String::from);

    let info = EeSymbolInfo {
        name: c_para["name"].as_str().unwrap_or("Unknown").to_string(),
        prefix: c_para["pre"].as_str().unwrap_or("U").to_string(),
        package: text(&c_para["package"]),
        manufacturer: text(&c_para["Manufacturer"]),
        datasheet: text(&data["lcsc"]["url"]),
        lcsc_id: text(&data["lcsc"]["number"]),
        jlc_part_class: text(&c_para["JLCPCB Part Class"]),
    };

    let shapes = data_str["shape"]
        .as_array()
        .ok_or_else(|| Error::MissingData("Symbol shape data is missing".to_string()))?;

    let mut symbol = EeSymbol {
        info,
        bbox: (
            value_f64(&data_str["head"]["x"]),
            value_f64(&data_str["head"]["y"]),
        ),
        ..Default::default()
    };

    for shape_val in shapes {
        let shape_str = shape_val.as_str().unwrap_or("");
        match parse_symbol_shape(shape_str) {
            Some(shape) => symbol.push(shape),
            None => log::debug!("Ignoring symbol shape: {:.40}", shape_str),
        }
    }

    Ok(symbol)
}

/// Symbols of the alternate units (`subparts`) of a multi-unit part.
pub fn import_subparts(data: &Value) -> Result<Vec<EeSymbol>> {
    match data["subparts"].as_array() {
        Some(parts) => parts.iter().map(import_symbol).collect(),
        None => Ok(Vec::new()),
    }
}

// Helper structs for deserializing the nested JSON inside the SVGNODE string.
#[derive(Deserialize, Debug)]
struct SvgNode {
    attrs: SvgNodeAttrs,
}

#[derive(Deserialize, Debug)]
struct SvgNodeAttrs {
    uuid: String,
    title: String,
    #[serde(default)]
    c_origin: Option<String>,
    #[serde(default)]
    z: Option<Value>,
    #[serde(default)]
    c_rotation: Option<String>,
}

fn parse_vector(text: Option<&str>, z: Option<&Value>) -> Ee3dVector {
    let parts: Vec<f64> = text
        .unwrap_or("")
        .split(',')
        .map(|p| p.trim().parse().unwrap_or(0.0))
        .collect();
    Ee3dVector {
        x: parts.first().copied().unwrap_or(0.0),
        y: parts.get(1).copied().unwrap_or(0.0),
        z: match z {
            Some(value) => value_f64(value),
            None => parts.get(2).copied().unwrap_or(0.0),
        },
    }
}

fn parse_svg_node(json_part: &str) -> Result<Ee3dModel> {
    let svg_node: SvgNode = serde_json::from_str(json_part)?;
    let attrs = svg_node.attrs;
    Ok(Ee3dModel {
        name: attrs.title,
        uuid: attrs.uuid,
        translation: parse_vector(attrs.c_origin.as_deref(), attrs.z.as_ref()),
        rotation: parse_vector(attrs.c_rotation.as_deref(), None),
        ..Default::default()
    })
}

/// Extracts 3D model info by parsing the SVGNODE from the footprint shape data.
pub fn import_3d_model_info(data: &Value) -> Result<Option<Ee3dModel>> {
    let shapes = data["packageDetail"]["dataStr"]["shape"]
        .as_array()
        .ok_or_else(|| {
            Error::MissingData("Footprint shape data is missing or not an array".to_string())
        })?;

    for shape_value in shapes {
        if let Some(json_part) = shape_value.as_str().and_then(|s| s.strip_prefix("SVGNODE~")) {
            return parse_svg_node(json_part).map(Some);
        }
    }

    // If we loop through all shapes and don't find an SVGNODE, there is no model.
    Ok(None)
}

/// Parses one entry of the footprint `shape` array.
fn parse_footprint_shape(shape_str: &str) -> Result<Option<EeFootprintShape>> {
    let fields = parse_raw_line(shape_str);

    let shape = match fields[0] {
        // [0]PAD [1]shape [2]x [3]y [4]width [5]height [6]layer [7]net [8]number
        // [9]hole_radius [10]points [11]rotation [12]id [13]hole_length ...
        "PAD" if fields.len() > 11 => {
            let hole_length = field(&fields, 13)
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|len| *len > 0.0);

            EeFootprintShape::Pad(EeFootprintPad {
                shape: fields[1].to_string(),
                center_x: field_f64(&fields, 2),
                center_y: field_f64(&fields, 3),
                width: field_f64(&fields, 4),
                height: field_f64(&fields, 5),
                layer_id: field_i32(&fields, 6),
                number: fields[8].to_string(),
                hole_radius: field_f64(&fields, 9),
                hole_length,
                rotation: field(&fields, 11).trim().parse().unwrap_or(f64::NAN),
                points: fields[10].to_string(),
            })
        }
        // TRACK~stroke_width~layer~net~points~id
        "TRACK" if fields.len() > 4 => EeFootprintShape::Track(EeFootprintTrack {
            stroke_width: field_f64(&fields, 1),
            layer_id: field_i32(&fields, 2),
            points: fields[4].to_string(),
        }),
        // HOLE~cx~cy~radius~id
        "HOLE" if fields.len() > 3 => EeFootprintShape::Hole(EeFootprintHole {
            center_x: field_f64(&fields, 1),
            center_y: field_f64(&fields, 2),
            radius: field_f64(&fields, 3),
        }),
        // VIA~cx~cy~diameter~net~radius~id
        "VIA" if fields.len() > 5 => EeFootprintShape::Via(EeFootprintVia {
            center_x: field_f64(&fields, 1),
            center_y: field_f64(&fields, 2),
            diameter: field_f64(&fields, 3),
            radius: field_f64(&fields, 5),
        }),
        // CIRCLE~cx~cy~radius~stroke_width~layer~id
        "CIRCLE" if fields.len() > 5 => EeFootprintShape::Circle(EeFootprintCircle {
            center_x: field_f64(&fields, 1),
            center_y: field_f64(&fields, 2),
            radius: field_f64(&fields, 3),
            stroke_width: field_f64(&fields, 4),
            layer_id: field_i32(&fields, 5),
        }),
        // RECT~x~y~width~height~stroke_width~id~layer
        "RECT" if fields.len() > 7 => EeFootprintShape::Rectangle(EeFootprintRectangle {
            x: field_f64(&fields, 1),
            y: field_f64(&fields, 2),
            width: field_f64(&fields, 3),
            height: field_f64(&fields, 4),
            stroke_width: field_f64(&fields, 5),
            layer_id: field_i32(&fields, 7),
        }),
        // ARC~stroke_width~layer~net~path~helper_dots~id
        "ARC" if fields.len() > 4 => EeFootprintShape::Arc(EeFootprintArc {
            stroke_width: field_f64(&fields, 1),
            layer_id: field_i32(&fields, 2),
            path: fields[4].to_string(),
        }),
        // TEXT~type~cx~cy~stroke_width~rotation~mirror~layer~net~font_size~text~text_path~display
        "TEXT" if fields.len() > 10 => EeFootprintShape::Text(EeFootprintText {
            text_type: fields[1].to_string(),
            center_x: field_f64(&fields, 2),
            center_y: field_f64(&fields, 3),
            stroke_width: field_f64(&fields, 4),
            rotation: field(&fields, 5).trim().parse().unwrap_or(0.0),
            layer_id: field_i32(&fields, 7),
            font_size: field_f64(&fields, 9),
            text: fields[10].to_string(),
            is_displayed: field(&fields, 12) != "none",
        }),
        "SVGNODE" => match shape_str.split_once('~') {
            Some((_, json_part)) => EeFootprintShape::Model(parse_svg_node(json_part)?),
            None => return Ok(None),
        },
        _ => return Ok(None),
    };
    Ok(Some(shape))
}

/// Parses the detailed footprint data from the `packageDetail` field.
pub fn import_footprint(data: &Value) -> Result<EeFootprint> {
    let data_str = &data["packageDetail"]["dataStr"];
    let name = data["packageDetail"]["title"]
        .as_str()
        .unwrap_or("UnknownFootprint")
        .to_string();

    let shapes = data_str["shape"]
        .as_array()
        .ok_or_else(|| Error::MissingData("Footprint shape data is missing".to_string()))?;

    let mut footprint = EeFootprint {
        info: EeFootprintInfo {
            name,
            fp_type: EeFootprintType::Smd,
        },
        bbox: (
            value_f64(&data_str["head"]["x"]),
            value_f64(&data_str["head"]["y"]),
        ),
        ..Default::default()
    };

    for shape_val in shapes {
        let shape_str = shape_val.as_str().unwrap_or("");
        match parse_footprint_shape(shape_str)? {
            Some(shape) => footprint.push(shape),
            None => log::debug!("Ignoring footprint shape: {:.40}", shape_str),
        }
    }

    let is_smd = match data["SMT"].as_bool() {
        Some(flag) => flag,
        None => footprint.pads.iter().all(|pad| pad.hole_radius <= 0.0),
    };
    footprint.info.fp_type = if is_smd {
        EeFootprintType::Smd
    } else {
        EeFootprintType::Tht
    };

    Ok(footprint)
}

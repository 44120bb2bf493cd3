// src/easyeda_models.rs

//! Intermediate models built from the EasyEDA API payload.
//!
//! Every vendor primitive kind is one variant of [`EeFootprintShape`] or
//! [`EeSymbolShape`]; the containers sort them into typed collections.
//! All coordinates are still in EasyEDA units.

use crate::geometry::MM_PER_UNIT;

#[derive(Debug, Clone, Default)]
pub struct EeSymbol {
    pub info: EeSymbolInfo,
    pub bbox: (f64, f64), // Bounding box origin (x, y)
    pub pins: Vec<EeSymbolPin>,
    pub rectangles: Vec<EeSymbolRectangle>,
    pub circles: Vec<EeSymbolCircle>,
    pub arcs: Vec<EeSymbolArc>,
    pub ellipses: Vec<EeSymbolEllipse>,
    pub polylines: Vec<EeSymbolPolyline>,
    pub polygons: Vec<EeSymbolPolyline>,
    pub paths: Vec<EeSymbolPath>,
}

#[derive(Debug, Clone, Default)]
pub struct EeSymbolInfo {
    pub name: String,
    pub prefix: String,
    pub package: Option<String>,
    pub manufacturer: Option<String>,
    pub datasheet: Option<String>,
    pub lcsc_id: Option<String>,
    pub jlc_part_class: Option<String>,
}

#[derive(Debug, Clone)]
pub enum EeSymbolShape {
    Pin(EeSymbolPin),
    Rectangle(EeSymbolRectangle),
    Circle(EeSymbolCircle),
    Arc(EeSymbolArc),
    Ellipse(EeSymbolEllipse),
    Polyline(EeSymbolPolyline),
    Polygon(EeSymbolPolyline),
    Path(EeSymbolPath),
}

impl EeSymbol {
    pub fn push(&mut self, shape: EeSymbolShape) {
        match shape {
            EeSymbolShape::Pin(pin) => self.pins.push(pin),
            EeSymbolShape::Rectangle(rect) => self.rectangles.push(rect),
            EeSymbolShape::Circle(circle) => self.circles.push(circle),
            EeSymbolShape::Arc(arc) => self.arcs.push(arc),
            EeSymbolShape::Ellipse(ellipse) => self.ellipses.push(ellipse),
            EeSymbolShape::Polyline(polyline) => self.polylines.push(polyline),
            EeSymbolShape::Polygon(polygon) => self.polygons.push(polygon),
            EeSymbolShape::Path(path) => self.paths.push(path),
        }
    }

    /// A symbol with nothing to draw. Multi-unit parts often ship an empty
    /// primary symbol and put the real drawing in their subparts.
    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
            && self.rectangles.is_empty()
            && self.circles.is_empty()
            && self.arcs.is_empty()
            && self.ellipses.is_empty()
            && self.polylines.is_empty()
            && self.polygons.is_empty()
            && self.paths.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct EeSymbolPin {
    pub number: String,
    pub name: String,
    pub pos_x: f64,
    pub pos_y: f64,
    pub rotation: i32,
    pub pin_type: String, // Electrical type (input, output, etc.)
    pub pin_length: f64,
}

#[derive(Debug, Clone)]
pub struct EeSymbolRectangle {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone)]
pub struct EeSymbolCircle {
    pub center_x: f64,
    pub center_y: f64,
    pub radius: f64,
    pub filled: bool,
}

#[derive(Debug, Clone)]
pub struct EeSymbolEllipse {
    pub center_x: f64,
    pub center_y: f64,
    pub radius_x: f64,
    pub radius_y: f64,
    pub filled: bool,
}

/// SVG arc path, `M x y A rx ry rot large sweep ex ey`.
#[derive(Debug, Clone)]
pub struct EeSymbolArc {
    pub path: String,
}

#[derive(Debug, Clone)]
pub struct EeSymbolPolyline {
    pub points: Vec<(f64, f64)>,
    pub filled: bool,
}

/// SVG path restricted to `M`, `L` and `Z` commands.
#[derive(Debug, Clone)]
pub struct EeSymbolPath {
    pub path: String,
    pub filled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EeFootprintType {
    #[default]
    Smd,
    Tht,
}

#[derive(Debug, Clone, Default)]
pub struct EeFootprint {
    pub info: EeFootprintInfo,
    pub bbox: (f64, f64), // Bounding box origin (x, y)
    pub pads: Vec<EeFootprintPad>,
    pub tracks: Vec<EeFootprintTrack>,
    pub holes: Vec<EeFootprintHole>,
    pub vias: Vec<EeFootprintVia>,
    pub circles: Vec<EeFootprintCircle>,
    pub rectangles: Vec<EeFootprintRectangle>,
    pub arcs: Vec<EeFootprintArc>,
    pub texts: Vec<EeFootprintText>,
    pub model_3d: Option<Ee3dModel>,
}

#[derive(Debug, Clone, Default)]
pub struct EeFootprintInfo {
    pub name: String,
    pub fp_type: EeFootprintType,
}

#[derive(Debug, Clone)]
pub enum EeFootprintShape {
    Pad(EeFootprintPad),
    Track(EeFootprintTrack),
    Hole(EeFootprintHole),
    Via(EeFootprintVia),
    Circle(EeFootprintCircle),
    Rectangle(EeFootprintRectangle),
    Arc(EeFootprintArc),
    Text(EeFootprintText),
    Model(Ee3dModel),
}

impl EeFootprint {
    pub fn push(&mut self, shape: EeFootprintShape) {
        match shape {
            EeFootprintShape::Pad(pad) => self.pads.push(pad),
            EeFootprintShape::Track(track) => self.tracks.push(track),
            EeFootprintShape::Hole(hole) => self.holes.push(hole),
            EeFootprintShape::Via(via) => self.vias.push(via),
            EeFootprintShape::Circle(circle) => self.circles.push(circle),
            EeFootprintShape::Rectangle(rect) => self.rectangles.push(rect),
            EeFootprintShape::Arc(arc) => self.arcs.push(arc),
            EeFootprintShape::Text(text) => self.texts.push(text),
            EeFootprintShape::Model(model) => self.model_3d = Some(model),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EeFootprintPad {
    pub shape: String,
    pub center_x: f64,
    pub center_y: f64,
    pub width: f64,
    pub height: f64,
    pub layer_id: i32,
    pub number: String,
    pub hole_radius: f64,
    /// Slot length; `None` for round holes and SMD pads.
    pub hole_length: Option<f64>,
    pub rotation: f64,
    /// Space separated `x y` pairs of a POLYGON pad outline.
    pub points: String,
}

#[derive(Debug, Clone)]
pub struct EeFootprintTrack {
    pub stroke_width: f64,
    pub layer_id: i32,
    /// Space separated `x y` pairs.
    pub points: String,
}

#[derive(Debug, Clone)]
pub struct EeFootprintHole {
    pub center_x: f64,
    pub center_y: f64,
    pub radius: f64,
}

#[derive(Debug, Clone)]
pub struct EeFootprintVia {
    pub center_x: f64,
    pub center_y: f64,
    pub diameter: f64,
    pub radius: f64,
}

#[derive(Debug, Clone)]
pub struct EeFootprintCircle {
    pub center_x: f64,
    pub center_y: f64,
    pub radius: f64,
    pub stroke_width: f64,
    pub layer_id: i32,
}

#[derive(Debug, Clone)]
pub struct EeFootprintRectangle {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub stroke_width: f64,
    pub layer_id: i32,
}

#[derive(Debug, Clone)]
pub struct EeFootprintArc {
    pub stroke_width: f64,
    pub layer_id: i32,
    pub path: String,
}

#[derive(Debug, Clone)]
pub struct EeFootprintText {
    pub text_type: String, // "P" for value, "N" for reference
    pub center_x: f64,
    pub center_y: f64,
    pub stroke_width: f64,
    pub rotation: f64,
    pub layer_id: i32,
    pub font_size: f64,
    pub text: String,
    pub is_displayed: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Ee3dVector {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Clone, Default)]
pub struct Ee3dModel {
    pub name: String,
    pub uuid: String,
    pub translation: Ee3dVector,
    pub rotation: Ee3dVector,
    /// Model bounding box center and size, when known. Enables scale-fit
    /// placement.
    pub center: Option<Ee3dVector>,
    pub size: Option<Ee3dVector>,
    pub raw_obj: Option<String>,
    pub step: Option<bytes::Bytes>,
}

impl Ee3dModel {
    /// Derives `center` and `size` from the vertices of the raw OBJ payload,
    /// expressed in EasyEDA units like the rest of the footprint.
    /// Returns `false` when there is no payload or it has no vertices.
    pub fn fit_to_obj_bounds(&mut self) -> bool {
        let Some(obj) = &self.raw_obj else {
            return false;
        };

        let mut min = [f64::INFINITY; 3];
        let mut max = [f64::NEG_INFINITY; 3];
        let mut seen = false;
        for line in obj.lines() {
            let mut parts = line.split_whitespace();
            if parts.next() != Some("v") {
                continue;
            }
            let coords: Vec<f64> = parts.take(3).filter_map(|p| p.parse().ok()).collect();
            if coords.len() != 3 {
                continue;
            }
            seen = true;
            for axis in 0..3 {
                min[axis] = min[axis].min(coords[axis]);
                max[axis] = max[axis].max(coords[axis]);
            }
        }
        if !seen {
            return false;
        }

        let units = |mm: f64| mm / MM_PER_UNIT;
        self.center = Some(Ee3dVector {
            x: units((min[0] + max[0]) / 2.0),
            y: units((min[1] + max[1]) / 2.0),
            z: units((min[2] + max[2]) / 2.0),
        });
        self.size = Some(Ee3dVector {
            x: units(max[0] - min[0]),
            y: units(max[1] - min[1]),
            z: units(max[2] - min[2]),
        });
        true
    }
}

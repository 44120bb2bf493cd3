// src/kicad_models.rs

use crate::geometry::{Drill, round_to};
use glam::DVec3; // Using glam for 3D vector math
use std::fmt::Write;

// --- 3D Model Structs ---

/// Represents a 3D model in KiCad format.
///
/// Contains both VRML and STEP format data along with placement information.
#[derive(Debug, Clone)]
pub struct Ki3dModel {
    pub name: String,
    pub wrl_data: Option<String>,
    pub step_data: Option<bytes::Bytes>,
    // KiCad placement info
    pub offset: DVec3,
    pub scale: DVec3,
    pub rotate: DVec3,
}

/// Strips the extension and path separators from a vendor model title.
pub fn sanitize_model_filename(name: &str) -> String {
    let base = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.contains(['/', '\\']) => stem,
        _ => name,
    };
    if base.is_empty() {
        return "easyeda_model".to_string();
    }
    base.replace(['\\', '/'], "_")
}

/// How the `(model ...)` path of a footprint is written.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelPathStyle {
    /// Library in the default install folder, referenced through an
    /// environment token such as `${EASYEDA2KICAD}`.
    DefaultLibrary { token: String, lib_name: String },
    /// Library inside a KiCad project, referenced through `${KIPRJMOD}`.
    ProjectRelative { lib_name: String },
    /// Library in an explicit folder, referenced relative to the `.pretty` dir.
    OutputFolder { lib_name: String },
}

impl ModelPathStyle {
    pub fn model_file(&self, model_name: &str) -> String {
        let base = sanitize_model_filename(model_name);
        match self {
            ModelPathStyle::DefaultLibrary { token, lib_name } => {
                format!("{}/{}.3dshapes/{}.wrl", token, lib_name, base)
            }
            ModelPathStyle::ProjectRelative { lib_name } => {
                format!("${{KIPRJMOD}}/{}.3dshapes/{}.wrl", lib_name, base)
            }
            ModelPathStyle::OutputFolder { lib_name } => {
                format!("../{}.3dshapes/{}.wrl", lib_name, base)
            }
        }
    }
}

// --- Footprint Structs ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FpShape {
    Circle,
    Rect,
    Oval,
    Custom,
}

impl FpShape {
    fn as_str(&self) -> &'static str {
        match self {
            FpShape::Circle => "circle",
            FpShape::Rect => "rect",
            FpShape::Oval => "oval",
            FpShape::Custom => "custom",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FpPadType {
    Smd,
    ThruHole,
}

impl FpPadType {
    fn as_str(&self) -> &'static str {
        match self {
            FpPadType::Smd => "smd",
            FpPadType::ThruHole => "thru_hole",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FootprintType {
    Smd,
    ThroughHole,
}

#[derive(Debug, Clone)]
pub struct FpPad {
    pub number: String,
    pub pad_type: FpPadType,
    pub shape: FpShape,
    pub pos: (f64, f64),
    pub size: (f64, f64),
    pub layers: String,
    /// Degrees; `None` when the vendor rotation was not a number.
    pub rotation: Option<f64>,
    pub drill: Drill,
    /// Custom outline, relative to `pos`.
    pub primitives: Vec<(f64, f64)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FpLine {
    pub start: (f64, f64),
    pub end: (f64, f64),
    pub layer: String,
    pub width: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FpHole {
    pub pos: (f64, f64),
    pub size: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FpVia {
    pub pos: (f64, f64),
    pub diameter: f64,
    pub drill: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FpCircle {
    pub center: (f64, f64),
    pub end: (f64, f64),
    pub layer: String,
    pub width: f64,
}

/// KiCad 5 style arc: `start` is the center, `end` the arc start point.
#[derive(Debug, Clone, PartialEq)]
pub struct FpArc {
    pub start: (f64, f64),
    pub end: (f64, f64),
    pub angle: f64,
    pub layer: String,
    pub width: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FpText {
    pub text: String,
    pub pos: (f64, f64),
    pub rotation: Option<f64>,
    pub layer: String,
    pub font_size: f64,
    pub thickness: f64,
    pub hidden: bool,
    pub mirrored: bool,
}

#[derive(Debug, Clone)]
pub struct KiFootprint {
    pub name: String,
    pub fp_type: FootprintType,
    pub pads: Vec<FpPad>,
    /// Track segments followed by rectangle edges.
    pub lines: Vec<FpLine>,
    pub holes: Vec<FpHole>,
    pub vias: Vec<FpVia>,
    pub circles: Vec<FpCircle>,
    pub arcs: Vec<FpArc>,
    pub texts: Vec<FpText>,
    pub model_3d: Option<Ki3dModel>,
}

impl KiFootprint {
    /// Generates the full S-expression string for a .kicad_mod file.
    pub fn to_kicad_mod_entry(&self, model_path: &ModelPathStyle) -> String {
        let mut out = String::new();
        writeln!(
            &mut out,
            "(module easyeda2kicad:{} (layer F.Cu) (tedit 5DC5F6A4)",
            self.name
        )
        .unwrap();

        let attr = match self.fp_type {
            FootprintType::Smd => "smd",
            FootprintType::ThroughHole => "through_hole",
        };
        writeln!(&mut out, "\t(attr {})", attr).unwrap();

        // Reference above the lowest pad, value below the highest one.
        let y_low = self.pads.iter().map(|p| p.pos.1).fold(f64::INFINITY, f64::min);
        let y_high = self.pads.iter().map(|p| p.pos.1).fold(f64::NEG_INFINITY, f64::max);
        let (y_low, y_high) = if self.pads.is_empty() { (0.0, 0.0) } else { (y_low, y_high) };

        writeln!(
            &mut out,
            "\t(fp_text reference REF** (at 0 {:.2}) (layer F.SilkS)\n\t\t(effects (font (size 1 1) (thickness 0.15)))\n\t)",
            y_low - 4.0
        )
        .unwrap();
        writeln!(
            &mut out,
            "\t(fp_text value {} (at 0 {:.2}) (layer F.Fab)\n\t\t(effects (font (size 1 1) (thickness 0.15)))\n\t)",
            self.name,
            y_high + 4.0
        )
        .unwrap();
        writeln!(
            &mut out,
            "\t(fp_text user %R (at 0 0) (layer F.Fab)\n\t\t(effects (font (size 1 1) (thickness 0.15)))\n\t)"
        )
        .unwrap();

        for line in &self.lines {
            writeln!(
                &mut out,
                "\t(fp_line (start {:.2} {:.2}) (end {:.2} {:.2}) (layer {}) (width {:.2}))",
                line.start.0, line.start.1, line.end.0, line.end.1, line.layer, line.width
            )
            .unwrap();
        }

        for pad in &self.pads {
            let drill = if pad.drill.is_none() {
                String::new()
            } else {
                format!(" {}", pad.drill)
            };
            write!(
                &mut out,
                "\t(pad {} {} {} (at {:.2} {:.2} {:.2}) (size {:.2} {:.2}) (layers {}){}",
                pad.number,
                pad.pad_type.as_str(),
                pad.shape.as_str(),
                pad.pos.0,
                pad.pos.1,
                pad.rotation.unwrap_or(0.0),
                pad.size.0,
                pad.size.1,
                pad.layers,
                drill
            )
            .unwrap();
            if pad.shape == FpShape::Custom && !pad.primitives.is_empty() {
                let pts: String = pad
                    .primitives
                    .iter()
                    .map(|(x, y)| format!("(xy {} {})", x, y))
                    .collect::<Vec<_>>()
                    .join(" ");
                write!(
                    &mut out,
                    "\n\t\t(options (clearance outline) (anchor circle))\n\t\t(primitives\n\t\t\t(gr_poly\n\t\t\t\t(pts {})\n\t\t\t\t(width 0)\n\t\t\t)\n\t\t)\n\t",
                    pts
                )
                .unwrap();
            }
            writeln!(&mut out, ")").unwrap();
        }

        for hole in &self.holes {
            writeln!(
                &mut out,
                "\t(pad \"\" thru_hole circle (at {:.2} {:.2}) (size {:.2} {:.2}) (drill {:.2}) (layers *.Cu *.Mask))",
                hole.pos.0, hole.pos.1, hole.size, hole.size, hole.size
            )
            .unwrap();
        }

        for via in &self.vias {
            writeln!(
                &mut out,
                "\t(pad \"\" thru_hole circle (at {:.2} {:.2}) (size {:.2} {:.2}) (drill {:.2}) (layers *.Cu *.Paste *.Mask))",
                via.pos.0, via.pos.1, via.diameter, via.diameter, via.drill
            )
            .unwrap();
        }

        for circle in &self.circles {
            writeln!(
                &mut out,
                "\t(fp_circle (center {:.2} {:.2}) (end {:.2} {:.2}) (layer {}) (width {:.2}))",
                circle.center.0, circle.center.1, circle.end.0, circle.end.1, circle.layer, circle.width
            )
            .unwrap();
        }

        for arc in &self.arcs {
            writeln!(
                &mut out,
                "\t(fp_arc (start {:.2} {:.2}) (end {:.2} {:.2}) (angle {:.2}) (layer {}) (width {:.2}))",
                arc.start.0, arc.start.1, arc.end.0, arc.end.1, arc.angle, arc.layer, arc.width
            )
            .unwrap();
        }

        for text in &self.texts {
            writeln!(
                &mut out,
                "\t(fp_text user {} (at {:.2} {:.2} {:.2}) (layer {}){}\n\t\t(effects (font (size {:.2} {:.2}) (thickness {:.2})) (justify left{}))\n\t)",
                text.text,
                text.pos.0,
                text.pos.1,
                text.rotation.unwrap_or(0.0),
                text.layer,
                if text.hidden { " hide" } else { "" },
                text.font_size,
                text.font_size,
                text.thickness,
                if text.mirrored { " mirror" } else { "" }
            )
            .unwrap();
        }

        // Add 3D model path
        if let Some(model) = &self.model_3d {
            writeln!(
                &mut out,
                "\t(model \"{}\"\n\t\t(offset (xyz {:.3} {:.3} {:.3}))\n\t\t(scale (xyz {} {} {}))\n\t\t(rotate (xyz {:.0} {:.0} {:.0}))\n\t)",
                model_path.model_file(&model.name),
                model.offset.x,
                model.offset.y,
                model.offset.z,
                model.scale.x,
                model.scale.y,
                model.scale.z,
                model.rotate.x,
                model.rotate.y,
                model.rotate.z
            )
            .unwrap();
        }

        out.push(')');
        out
    }
}

// --- Symbol Structs ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KiPinType {
    Input,
    Output,
    Bidirectional,
    PowerIn,
    Passive,
    Unspecified,
}

impl KiPinType {
    fn v6_name(&self) -> &'static str {
        match self {
            KiPinType::Input => "input",
            KiPinType::Output => "output",
            KiPinType::Bidirectional => "bidirectional",
            KiPinType::PowerIn => "power_in",
            KiPinType::Passive => "passive",
            KiPinType::Unspecified => "unspecified",
        }
    }

    fn v5_letter(&self) -> char {
        match self {
            KiPinType::Input => 'I',
            KiPinType::Output => 'O',
            KiPinType::Bidirectional => 'B',
            KiPinType::PowerIn => 'W',
            KiPinType::Passive => 'P',
            KiPinType::Unspecified => 'U',
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct KiSymbolPin {
    pub name: String,
    pub number: String,
    pub pin_type: KiPinType,
    pub length: f64,
    pub pos: (f64, f64),
    pub rotation: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KiSymbolRect {
    pub start: (f64, f64),
    pub end: (f64, f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct KiSymbolCircle {
    pub center: (f64, f64),
    pub radius: f64,
    pub filled: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KiSymbolArc {
    pub start: (f64, f64),
    pub mid: (f64, f64),
    pub end: (f64, f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct KiSymbolPolyline {
    pub points: Vec<(f64, f64)>,
    pub filled: bool,
}

/// Graphics and pins of one unit of a (possibly multi-unit) symbol.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KiSymbolUnit {
    pub pins: Vec<KiSymbolPin>,
    pub rectangles: Vec<KiSymbolRect>,
    pub circles: Vec<KiSymbolCircle>,
    pub arcs: Vec<KiSymbolArc>,
    pub polylines: Vec<KiSymbolPolyline>,
}

#[derive(Debug, Clone)]
pub struct KiSymbol {
    pub name: String,
    pub reference: String,
    pub value: String,
    pub footprint: String,
    pub datasheet: String,
    pub manufacturer: Option<String>,
    pub lcsc_part: Option<String>,
    pub jlc_part_class: Option<String>,
    /// First entry is the primary unit.
    pub units: Vec<KiSymbolUnit>,
}

const STROKE: &str = "(stroke (width 0) (type default) (color 0 0 0 0))";
const FONT: &str = "(effects (font (size 1.27 1.27)))";
const FONT_HIDDEN: &str = "(effects (font (size 1.27 1.27)) hide)";

fn quoted(text: &str) -> String {
    format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
}

fn fill(filled: bool) -> &'static str {
    if filled {
        "(fill (type background))"
    } else {
        "(fill (type none))"
    }
}

fn to_mil(mm: f64) -> i64 {
    (mm / 0.0254).round() as i64
}

impl KiSymbolUnit {
    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
            && self.rectangles.is_empty()
            && self.circles.is_empty()
            && self.arcs.is_empty()
            && self.polylines.is_empty()
    }

    fn y_bounds(&self) -> Option<(f64, f64)> {
        let ys = self
            .pins
            .iter()
            .map(|p| p.pos.1)
            .chain(self.rectangles.iter().flat_map(|r| [r.start.1, r.end.1]))
            .chain(self.circles.iter().flat_map(|c| [c.center.1 - c.radius, c.center.1 + c.radius]))
            .chain(self.polylines.iter().flat_map(|p| p.points.iter().map(|pt| pt.1)));
        ys.fold(None, |acc, y| match acc {
            None => Some((y, y)),
            Some((lo, hi)) => Some((lo.min(y), hi.max(y))),
        })
    }

    /// KiCad 6 body of the unit, without the enclosing `(symbol "X_n_1"`.
    /// Two units that render to the same body are the same drawing.
    pub fn to_v6_body(&self) -> String {
        let mut out = String::new();

        for rect in &self.rectangles {
            writeln!(
                &mut out,
                "      (rectangle (start {} {}) (end {} {}) {} {})",
                rect.start.0,
                rect.start.1,
                rect.end.0,
                rect.end.1,
                STROKE,
                fill(true)
            )
            .unwrap();
        }
        for circle in &self.circles {
            writeln!(
                &mut out,
                "      (circle (center {} {}) (radius {}) {} {})",
                circle.center.0,
                circle.center.1,
                circle.radius,
                STROKE,
                fill(circle.filled)
            )
            .unwrap();
        }
        for arc in &self.arcs {
            writeln!(
                &mut out,
                "      (arc (start {} {}) (mid {} {}) (end {} {}) {} {})",
                arc.start.0, arc.start.1, arc.mid.0, arc.mid.1, arc.end.0, arc.end.1, STROKE, fill(false)
            )
            .unwrap();
        }
        for polyline in &self.polylines {
            let pts: Vec<String> = polyline
                .points
                .iter()
                .map(|(x, y)| format!("(xy {} {})", x, y))
                .collect();
            writeln!(
                &mut out,
                "      (polyline (pts {}) {} {})",
                pts.join(" "),
                STROKE,
                fill(polyline.filled)
            )
            .unwrap();
        }
        for pin in &self.pins {
            let pin_name = if let Some(rest) = pin.name.strip_prefix('~') {
                format!("\"~{{{}}}\"", rest)
            } else {
                quoted(&pin.name)
            };
            writeln!(
                &mut out,
                "      (pin {} line (at {} {} {}) (length {})\n        (name {} {})\n        (number {} {})\n      )",
                pin.pin_type.v6_name(),
                pin.pos.0,
                pin.pos.1,
                pin.rotation,
                pin.length,
                pin_name,
                FONT,
                quoted(&pin.number),
                FONT
            )
            .unwrap();
        }
        out
    }

    fn to_v5_draw(&self, unit: usize) -> String {
        let mut out = String::new();
        for rect in &self.rectangles {
            writeln!(
                &mut out,
                "S {} {} {} {} {} 1 0 f",
                to_mil(rect.start.0),
                to_mil(rect.start.1),
                to_mil(rect.end.0),
                to_mil(rect.end.1),
                unit
            )
            .unwrap();
        }
        for circle in &self.circles {
            writeln!(
                &mut out,
                "C {} {} {} {} 1 0 {}",
                to_mil(circle.center.0),
                to_mil(circle.center.1),
                to_mil(circle.radius),
                unit,
                if circle.filled { 'f' } else { 'N' }
            )
            .unwrap();
        }
        for arc in &self.arcs {
            // Legacy arcs are three-point free; approximate with a polyline
            // through start, mid and end.
            writeln!(
                &mut out,
                "P 3 {} 1 0 {} {} {} {} {} {} N",
                unit,
                to_mil(arc.start.0),
                to_mil(arc.start.1),
                to_mil(arc.mid.0),
                to_mil(arc.mid.1),
                to_mil(arc.end.0),
                to_mil(arc.end.1)
            )
            .unwrap();
        }
        for polyline in &self.polylines {
            let pts: Vec<String> = polyline
                .points
                .iter()
                .map(|(x, y)| format!("{} {}", to_mil(*x), to_mil(*y)))
                .collect();
            writeln!(
                &mut out,
                "P {} {} 1 0 {} {}",
                polyline.points.len(),
                unit,
                pts.join(" "),
                if polyline.filled { 'f' } else { 'N' }
            )
            .unwrap();
        }
        for pin in &self.pins {
            let orientation = match pin.rotation.rem_euclid(360) {
                90 => 'U',
                180 => 'L',
                270 => 'D',
                _ => 'R',
            };
            let name = if pin.name.is_empty() { "~" } else { pin.name.as_str() };
            writeln!(
                &mut out,
                "X {} {} {} {} {} {} 50 50 {} 1 {}",
                name.replace(' ', "_"),
                pin.number,
                to_mil(pin.pos.0),
                to_mil(pin.pos.1),
                to_mil(pin.length),
                orientation,
                unit.max(1),
                pin.pin_type.v5_letter()
            )
            .unwrap();
        }
        out
    }
}

impl KiSymbol {
    fn property_y(&self) -> (f64, f64) {
        self.units
            .first()
            .and_then(KiSymbolUnit::y_bounds)
            .map(|(lo, hi)| (round_to(hi + 2.54, 2), round_to(lo - 2.54, 2)))
            .unwrap_or((2.54, -2.54))
    }

    /// Nested-grammar block for a `.kicad_sym` library, ending in `  )\n`.
    pub fn to_kicad_v6_block(&self) -> String {
        let mut out = String::new();
        let (ref_y, value_y) = self.property_y();

        writeln!(&mut out, "  (symbol {}", quoted(&self.name)).unwrap();
        writeln!(&mut out, "    (in_bom yes)").unwrap();
        writeln!(&mut out, "    (on_board yes)").unwrap();

        // --- Properties ---
        let mut properties: Vec<(&str, &str, f64, bool)> = vec![
            ("Reference", &self.reference, ref_y, false),
            ("Value", &self.value, value_y, false),
            ("Footprint", &self.footprint, 0.0, true),
            ("Datasheet", &self.datasheet, 0.0, true),
        ];
        if let Some(manufacturer) = &self.manufacturer {
            properties.push(("Manufacturer", manufacturer, 0.0, true));
        }
        if let Some(lcsc) = &self.lcsc_part {
            properties.push(("LCSC Part", lcsc, 0.0, true));
        }
        if let Some(class) = &self.jlc_part_class {
            properties.push(("JLC Part", class, 0.0, true));
        }
        for (id, (key, value, y, hidden)) in properties.into_iter().enumerate() {
            writeln!(
                &mut out,
                "    (property {} {} (id {}) (at 0 {} 0)\n      {}\n    )",
                quoted(key),
                quoted(value),
                id,
                y,
                if hidden { FONT_HIDDEN } else { FONT }
            )
            .unwrap();
        }

        // --- Symbol Graphics ---
        for (index, unit) in self.units.iter().enumerate() {
            writeln!(&mut out, "    (symbol {}", quoted(&format!("{}_{}_1", self.name, index + 1))).unwrap();
            out.push_str(&unit.to_v6_body());
            writeln!(&mut out, "    )").unwrap();
        }

        writeln!(&mut out, "  )").unwrap();
        out
    }

    /// Flat-grammar block for a legacy `.lib` library, from the `#` name
    /// comment through `ENDDEF`. Only the primary unit is written.
    pub fn to_kicad_v5_block(&self) -> String {
        let mut out = String::new();
        let (ref_y, value_y) = self.property_y();

        writeln!(&mut out, "#\n# {}\n#", self.name).unwrap();
        writeln!(&mut out, "DEF {} {} 0 40 Y Y 1 F N", self.name, self.reference).unwrap();
        writeln!(&mut out, "F0 {} 0 {} 50 H V C CNN", quoted(&self.reference), to_mil(ref_y)).unwrap();
        writeln!(&mut out, "F1 {} 0 {} 50 H V C CNN", quoted(&self.value), to_mil(value_y)).unwrap();
        writeln!(&mut out, "F2 {} 0 0 50 H I C CNN", quoted(&self.footprint)).unwrap();
        writeln!(&mut out, "F3 {} 0 0 50 H I C CNN", quoted(&self.datasheet)).unwrap();
        writeln!(
            &mut out,
            "F4 {} 0 0 50 H I C CNN \"Manufacturer\"",
            quoted(self.manufacturer.as_deref().unwrap_or(""))
        )
        .unwrap();
        writeln!(
            &mut out,
            "F5 {} 0 0 50 H I C CNN \"JLC Part\"",
            quoted(self.jlc_part_class.as_deref().unwrap_or(""))
        )
        .unwrap();
        writeln!(
            &mut out,
            "F6 {} 0 0 50 H I C CNN \"LCSC Part\"",
            quoted(self.lcsc_part.as_deref().unwrap_or(""))
        )
        .unwrap();
        writeln!(&mut out, "DRAW").unwrap();
        if let Some(unit) = self.units.first() {
            out.push_str(&unit.to_v5_draw(0));
        }
        writeln!(&mut out, "ENDDRAW").unwrap();
        writeln!(&mut out, "ENDDEF").unwrap();
        out
    }
}

// src/geometry.rs

//! Unit conversion and the small amount of analytic geometry the footprint
//! and symbol converters need.
//!
//! EasyEDA stores coordinates in its own unit (10 mil). Everything here works
//! in `f64` so values survive the trip to KiCad text without drifting.

use std::f64::consts::PI;
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

/// One EasyEDA unit expressed in millimetres is `10 * 0.0254`.
const UNIT_SCALE: f64 = 10.0;
const INCH_TO_MM_PER_MIL: f64 = 0.0254;

/// Millimetres per EasyEDA unit, unrounded.
pub const MM_PER_UNIT: f64 = UNIT_SCALE * INCH_TO_MM_PER_MIL;

pub fn to_radians(degrees: f64) -> f64 {
    (degrees / 180.0) * PI
}

pub fn to_degrees(radians: f64) -> f64 {
    (radians / PI) * 180.0
}

/// Rounds to `digits` decimals using the exact decimal expansion of `value`,
/// which is what KiCad files expect when a coordinate was typed by hand.
pub fn round_to(value: f64, digits: usize) -> f64 {
    if !value.is_finite() {
        return value;
    }
    format!("{:.*}", digits, value).parse().unwrap_or(value)
}

/// Converts an EasyEDA dimension to millimetres, rounded to 2 decimals.
///
/// NaN is the "no dimension" sentinel and passes through untouched.
pub fn unit_to_mm(value: f64) -> f64 {
    if value.is_nan() {
        return value;
    }
    round_to(value * UNIT_SCALE * INCH_TO_MM_PER_MIL, 2)
}

/// String flavour of [`unit_to_mm`]: blank or non-numeric input yields `None`.
pub fn unit_to_mm_str(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().map(unit_to_mm)
}

/// Prints a float the way drill sizes appear in footprint files:
/// shortest round-trip form, but integral values keep a trailing `.0`.
pub fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e16 {
        format!("{:.1}", value)
    } else {
        format!("{}", value)
    }
}

/// Re-expresses an EasyEDA rotation (0..360) in KiCad's signed convention.
pub fn normalize_angle(rotation: f64) -> Option<f64> {
    if rotation.is_nan() {
        return None;
    }
    if rotation > 180.0 {
        Some(-(360.0 - rotation))
    } else {
        Some(rotation)
    }
}

/// Rotates `(x, y)` counter-clockwise.
///
/// The angle is scaled by `degrees / 180 * 2π`, i.e. twice the nominal
/// angle. Existing libraries were generated with this convention, so it is
/// kept as is.
pub fn rotate_point(x: f64, y: f64, degrees: f64) -> (f64, f64) {
    let radians = (degrees / 180.0) * 2.0 * PI;
    let new_x = x * radians.cos() - y * radians.sin();
    let new_y = x * radians.sin() + y * radians.cos();
    (new_x, new_y)
}

/// Hole geometry of a plated pad.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Drill {
    None,
    Round(f64),
    Oval(f64, f64),
}

impl Drill {
    pub fn is_none(&self) -> bool {
        matches!(self, Drill::None)
    }
}

impl fmt::Display for Drill {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Drill::None => Ok(()),
            Drill::Round(diameter) => write!(f, "(drill {})", format_number(*diameter)),
            Drill::Oval(a, b) => write!(
                f,
                "(drill oval {} {})",
                format_number(*a),
                format_number(*b)
            ),
        }
    }
}

/// Picks the drill for a pad. A slot is oriented along the pad axis that
/// leaves the larger copper margin around it.
///
/// `hole_length` of `None`, NaN or zero means a round hole.
pub fn drill_shape(
    hole_radius: f64,
    hole_length: Option<f64>,
    pad_height: f64,
    pad_width: f64,
) -> Drill {
    let slot_length = hole_length.filter(|len| !len.is_nan() && *len != 0.0);

    if hole_radius > 0.0 {
        if let Some(length) = slot_length {
            let max_span = (hole_radius * 2.0).max(length);
            let pos_0 = pad_height - max_span;
            let pos_90 = pad_width - max_span;
            return if pos_0.max(pos_90) == pos_0 {
                Drill::Oval(hole_radius * 2.0, length)
            } else {
                Drill::Oval(length, hole_radius * 2.0)
            };
        }
        return Drill::Round(2.0 * hole_radius);
    }
    Drill::None
}

/// Center and signed angular extent of an SVG elliptical arc.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArcCenter {
    pub center_x: f64,
    pub center_y: f64,
    /// Degrees. The sign follows the KiCad 5 `fp_arc` convention, which is
    /// the opposite of the SVG sweep direction.
    pub extent: f64,
}

/// Endpoint to center conversion for SVG elliptical arcs
/// (SVG 1.1 implementation notes, F.6.5).
///
/// A zero secondary radius has no meaningful center; it yields a
/// zero-extent arc at the origin.
#[allow(clippy::too_many_arguments)]
pub fn elliptical_arc_center(
    start_x: f64,
    start_y: f64,
    radius_x: f64,
    radius_y: f64,
    x_axis_rotation: f64,
    large_arc_flag: bool,
    sweep_flag: bool,
    end_x: f64,
    end_y: f64,
) -> ArcCenter {
    if radius_y == 0.0 {
        return ArcCenter {
            center_x: 0.0,
            center_y: 0.0,
            extent: 0.0,
        };
    }

    let dx2 = (start_x - end_x) / 2.0;
    let dy2 = (start_y - end_y) / 2.0;

    let angle = to_radians(x_axis_rotation.rem_euclid(360.0));
    let cos_angle = angle.cos();
    let sin_angle = angle.sin();

    // Midpoint-relative start vector in the ellipse frame.
    let x1 = cos_angle * dx2 + sin_angle * dy2;
    let y1 = -sin_angle * dx2 + cos_angle * dy2;

    let mut radius_x = radius_x.abs();
    let mut radius_y = radius_y.abs();
    let mut p_radius_x = radius_x * radius_x;
    let mut p_radius_y = radius_y * radius_y;
    let p_x1 = x1 * x1;
    let p_y1 = y1 * y1;

    let radii_check = if p_radius_x != 0.0 && p_radius_y != 0.0 {
        p_x1 / p_radius_x + p_y1 / p_radius_y
    } else {
        0.0
    };
    if radii_check > 1.0 {
        radius_x *= radii_check.sqrt();
        radius_y *= radii_check.sqrt();
        p_radius_x = radius_x * radius_x;
        p_radius_y = radius_y * radius_y;
    }

    let sign = if large_arc_flag == sweep_flag { -1.0 } else { 1.0 };
    let denominator = p_radius_x * p_y1 + p_radius_y * p_x1;
    let mut sq = 0.0;
    if denominator > 0.0 {
        sq = (p_radius_x * p_radius_y - p_radius_x * p_y1 - p_radius_y * p_x1) / denominator;
    }
    let sq = sq.max(0.0);
    let coef = sign * sq.sqrt();
    let cx1 = if radius_y != 0.0 {
        coef * ((radius_x * y1) / radius_y)
    } else {
        0.0
    };
    let cy1 = if radius_x != 0.0 {
        coef * -((radius_y * x1) / radius_x)
    } else {
        0.0
    };

    let sx2 = (start_x + end_x) / 2.0;
    let sy2 = (start_y + end_y) / 2.0;
    let center_x = sx2 + (cos_angle * cx1 - sin_angle * cy1);
    let center_y = sy2 + (sin_angle * cx1 + cos_angle * cy1);

    let scaled = |value: f64, radius: f64| if radius != 0.0 { value / radius } else { 0.0 };
    let ux = scaled(x1 - cx1, radius_x);
    let uy = scaled(y1 - cy1, radius_y);
    let vx = scaled(-x1 - cx1, radius_x);
    let vy = scaled(-y1 - cy1, radius_y);

    let n = ((ux * ux + uy * uy) * (vx * vx + vy * vy)).sqrt();
    let p = ux * vx + uy * vy;
    let direction = if (ux * vy - uy * vx) < 0.0 { -1.0 } else { 1.0 };

    let mut extent = if n != 0.0 {
        let ratio = (p / n).clamp(-1.0, 1.0);
        to_degrees(direction * ratio.acos())
    } else {
        // Parallel or null vectors. Kept for compatibility with existing output.
        360.0 + 359.0
    };
    if !sweep_flag && extent > 0.0 {
        extent -= 360.0;
    } else if sweep_flag && extent < 0.0 {
        extent += 360.0;
    }

    let extent_sign = if extent < 0.0 { 1.0 } else { -1.0 };
    let extent = (extent.abs() % 360.0) * extent_sign;

    ArcCenter {
        center_x,
        center_y,
        extent,
    }
}

/// `M x y A rx ry rotation large_arc sweep end_x end_y`, commas accepted as
/// separators.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SvgArc {
    pub start: (f64, f64),
    pub radii: (f64, f64),
    pub x_axis_rotation: f64,
    pub large_arc: bool,
    pub sweep: bool,
    pub end: (f64, f64),
}

fn svg_token_regex() -> &'static Regex {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    TOKEN.get_or_init(|| {
        Regex::new(r"[MA]|[-+]?(?:\d+\.?\d*|\.\d+)(?:[eE][-+]?\d+)?").expect("valid SVG token regex")
    })
}

/// Parses `M x y A rx ry rotation large sweep x y`. Numbers may be packed
/// against command letters or each other (`M10-20A5,5 0 0 1 20,20`).
pub fn parse_svg_arc(path: &str) -> Option<SvgArc> {
    let tokens: Vec<&str> = svg_token_regex().find_iter(path).map(|m| m.as_str()).collect();
    if tokens.len() < 11 || tokens[0] != "M" || tokens[3] != "A" {
        return None;
    }
    let values: Vec<f64> = tokens[1..3]
        .iter()
        .chain(&tokens[4..11])
        .map(|t| t.parse::<f64>())
        .collect::<std::result::Result<_, _>>()
        .ok()?;

    Some(SvgArc {
        start: (values[0], values[1]),
        radii: (values[2], values[3]),
        x_axis_rotation: values[4],
        large_arc: values[5] == 1.0,
        sweep: values[6] == 1.0,
        end: (values[7], values[8]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn unit_to_mm_is_linear_and_rounded() {
        assert_eq!(unit_to_mm(50.0), 12.7);
        assert_eq!(unit_to_mm(100.0), 25.4);
        // Multiples of 50 units land on exact hundredths of a millimetre.
        for x in [50.0, 100.0, 150.0, 250.0, -350.0] {
            assert!(close(unit_to_mm(2.0 * x), 2.0 * unit_to_mm(x)), "x = {x}");
        }
    }

    #[test]
    fn unit_to_mm_passes_sentinels_through() {
        assert!(unit_to_mm(f64::NAN).is_nan());
        assert_eq!(unit_to_mm_str(""), None);
        assert_eq!(unit_to_mm_str("   "), None);
        assert_eq!(unit_to_mm_str("abc"), None);
        assert_eq!(unit_to_mm_str("10"), Some(2.54));
    }

    #[test]
    fn normalize_angle_matches_kicad_convention() {
        assert_eq!(normalize_angle(200.0), Some(-160.0));
        assert_eq!(normalize_angle(180.0), Some(180.0));
        assert_eq!(normalize_angle(90.0), Some(90.0));
        assert_eq!(normalize_angle(f64::NAN), None);
    }

    #[test]
    fn drill_orientation_follows_larger_margin() {
        // Height margin 4 - 3 = 1 beats width margin 2 - 3 = -1.
        assert_eq!(drill_shape(1.0, Some(3.0), 4.0, 2.0), Drill::Oval(2.0, 3.0));
        // Width margin wins.
        assert_eq!(drill_shape(1.0, Some(3.0), 2.0, 4.0), Drill::Oval(3.0, 2.0));
    }

    #[test]
    fn drill_round_and_surface() {
        let round = drill_shape(1.0, Some(0.0), 3.0, 3.0);
        assert_eq!(round, Drill::Round(2.0));
        assert_eq!(round.to_string(), "(drill 2.0)");
        assert_eq!(drill_shape(1.0, None, 3.0, 3.0), Drill::Round(2.0));
        assert!(drill_shape(0.0, Some(3.0), 3.0, 3.0).is_none());
        assert_eq!(drill_shape(0.0, None, 1.0, 1.0).to_string(), "");
        assert_eq!(
            drill_shape(0.4, Some(1.5), 1.0, 3.0).to_string(),
            "(drill oval 1.5 0.8)"
        );
    }

    #[test]
    fn rotate_point_uses_doubled_angle() {
        // 45 "degrees" is a quarter turn in this convention.
        let (x, y) = rotate_point(1.0, 0.0, 45.0);
        assert!(close(x, 0.0));
        assert!(close(y, 1.0));
        assert_eq!(rotate_point(3.0, 4.0, 0.0), (3.0, 4.0));
    }

    #[test]
    fn semicircle_center_and_extent() {
        let arc = elliptical_arc_center(0.0, 0.0, 1.0, 1.0, 0.0, false, true, 2.0, 0.0);
        assert!(close(arc.extent.abs(), 180.0));
        assert!(close(arc.center_x, 1.0));
        assert!(close(arc.center_y, 0.0));
        let d_start = arc.center_x.hypot(arc.center_y);
        let d_end = (2.0 - arc.center_x).hypot(arc.center_y);
        assert!(close(d_start, d_end));
    }

    #[test]
    fn quarter_arc_center() {
        // From (1, 0) to (0, 1) on the unit circle, short way round.
        let arc = elliptical_arc_center(1.0, 0.0, 1.0, 1.0, 0.0, false, true, 0.0, 1.0);
        assert!(close(arc.center_x, 0.0));
        assert!(close(arc.center_y, 0.0));
        assert!(close(arc.extent, -90.0));

        let ccw = elliptical_arc_center(1.0, 0.0, 1.0, 1.0, 0.0, false, false, 0.0, 1.0);
        assert!(close(ccw.center_x, 1.0));
        assert!(close(ccw.center_y, 1.0));
        assert!(close(ccw.extent, 90.0));
    }

    #[test]
    fn undersized_radii_are_scaled_up() {
        // Radius 0.5 cannot span a chord of 4; it is grown to 2.
        let arc = elliptical_arc_center(0.0, 0.0, 0.5, 0.5, 0.0, false, true, 4.0, 0.0);
        assert!(close(arc.center_x, 2.0));
        assert!(close(arc.center_y, 0.0));
        assert!(close(arc.extent.abs(), 180.0));
    }

    #[test]
    fn coincident_endpoints_fall_back_to_719() {
        let arc = elliptical_arc_center(1.0, 1.0, 1.0, 1.0, 0.0, false, true, 1.0, 1.0);
        // 719 % 360 = 359, sign flipped for a positive extent.
        assert!(close(arc.extent, -359.0));
    }

    #[test]
    fn zero_secondary_radius_is_a_point_arc() {
        let arc = elliptical_arc_center(3.0, 4.0, 2.0, 0.0, 0.0, true, true, 5.0, 6.0);
        assert_eq!(
            arc,
            ArcCenter {
                center_x: 0.0,
                center_y: 0.0,
                extent: 0.0
            }
        );
    }

    #[test]
    fn format_number_keeps_decimal_point() {
        assert_eq!(format_number(2.0), "2.0");
        assert_eq!(format_number(0.8), "0.8");
        assert_eq!(format_number(-3.0), "-3.0");
        assert_eq!(format_number(12.7), "12.7");
    }

    #[test]
    fn unit_scale_is_ten_mil() {
        assert!(close(MM_PER_UNIT, 0.254));
        assert!(close(unit_to_mm(100.0), 25.4));
    }

    #[test]
    fn arc_path_with_commas_is_parsed() {
        let arc = parse_svg_arc("M10,20 A5,5 0 0,1 20,20").unwrap();
        assert_eq!(arc.start, (10.0, 20.0));
        assert_eq!(arc.radii, (5.0, 5.0));
        assert!(arc.sweep && !arc.large_arc);
        assert_eq!(arc.end, (20.0, 20.0));
        assert!(parse_svg_arc("L 1 2").is_none());
        assert!(parse_svg_arc("M 1 2 A 3").is_none());

        let packed = parse_svg_arc("M10-20A5,5 0 0 1 20,20").unwrap();
        assert_eq!(packed.start, (10.0, -20.0));
        assert_eq!(packed.radii, (5.0, 5.0));
        assert_eq!(packed.end, (20.0, 20.0));
        let decimals = parse_svg_arc("M-1.5.5 A2 2 0 1 0 -3e1 4").unwrap();
        assert_eq!(decimals.start, (-1.5, 0.5));
        assert!(decimals.large_arc && !decimals.sweep);
        assert_eq!(decimals.end, (-30.0, 4.0));
    }
}

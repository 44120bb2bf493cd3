// src/layers.rs

//! EasyEDA layer id to KiCad layer name tables.

/// General layer table used by circles, arcs and texts.
pub fn ki_layer(layer_id: i32) -> Option<&'static str> {
    let name = match layer_id {
        1 => "F.Cu",
        2 => "B.Cu",
        3 => "F.SilkS",
        4 => "B.SilkS",
        5 => "F.Paste",
        6 => "B.Paste",
        7 => "F.Mask",
        8 => "B.Mask",
        10 | 11 => "Edge.Cuts",
        12 => "Cmts.User",
        13 => "F.Fab",
        14 => "B.Fab",
        15 => "Dwgs.User",
        101 => "F.Fab",
        _ => return None,
    };
    Some(name)
}

/// Layer set of a surface-mount pad. Tracks and rectangles use it too.
pub fn smd_pad_layers(layer_id: i32) -> Option<&'static str> {
    let name = match layer_id {
        1 => "F.Cu F.Paste F.Mask",
        2 => "B.Cu B.Paste B.Mask",
        3 => "F.SilkS",
        11 => "*.Cu *.Paste *.Mask",
        13 => "F.Fab",
        15 => "Dwgs.User",
        _ => return None,
    };
    Some(name)
}

/// Layer set of a plated through-hole pad. No paste.
pub fn tht_pad_layers(layer_id: i32) -> Option<&'static str> {
    let name = match layer_id {
        1 => "F.Cu F.Mask",
        2 => "B.Cu B.Mask",
        3 => "F.SilkS",
        11 => "*.Cu *.Mask",
        13 => "F.Fab",
        15 => "Dwgs.User",
        _ => return None,
    };
    Some(name)
}

/// Fabrication fallback for drawing primitives on unmapped layers.
pub const DEFAULT_LAYER: &str = "F.Fab";

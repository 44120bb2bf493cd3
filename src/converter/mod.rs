// src/converter/mod.rs

//! EasyEDA intermediate models to KiCad models.

pub mod footprint;
pub mod model;
pub mod symbol;

pub use footprint::{convert_footprint, place_model};
pub use model::convert_3d_model;
pub use symbol::{convert_symbol, convert_symbol_with_units, sanitize_symbol_name};

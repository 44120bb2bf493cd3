// src/lib.rs

pub mod api;
pub mod config;
pub mod converter;
pub mod easyeda_models;
pub mod error;
pub mod file_writer;
pub mod geometry;
pub mod importer;
pub mod kicad_models;
pub mod layers;
pub mod library;
pub mod pipeline;
pub mod shape_fitter;

use crate::config::ConverterConfig;
use crate::error::Result;
use crate::pipeline::{ConversionRequest, ConversionResult, ConversionStage};
use std::path::Path;

/// Converts one LCSC part into the library at `output_prefix`: symbol,
/// footprint and 3D model, fetched from EasyEDA. Progress is logged.
pub async fn import_component(lcsc_id: &str, output_prefix: &Path) -> Result<ConversionResult> {
    let api = api::EasyedaApi::new()?;
    let config = ConverterConfig::default();
    let request = ConversionRequest::new(lcsc_id, output_prefix);

    let mut log_progress = |stage: ConversionStage, percent: u8, message: &str| match stage {
        ConversionStage::Failed => log::error!("[{:>3}%] {}", percent, message),
        _ => log::info!("[{:>3}%] {}", percent, message),
    };
    let result = pipeline::run_conversion(&request, &api, &config, &mut log_progress).await?;

    for message in &result.messages {
        log::warn!("{}: {}", lcsc_id, message);
    }
    log::info!("Import complete. Files are located in: {:?}", output_prefix);
    Ok(result)
}

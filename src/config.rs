// src/config.rs

//! Converter settings.
//!
//! Everything is optional in the JSON file; missing fields take the
//! defaults below. The core converters never read this directly, the
//! pipeline passes the resolved values down.

use crate::error::{Error, Result};
use crate::kicad_models::ModelPathStyle;
use crate::pipeline::ConversionRequest;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_LIBRARY_NAME: &str = "easyeda2kicad";
pub const DEFAULT_MODEL_TOKEN: &str = "${EASYEDA2KICAD}";
pub const DEFAULT_GENERATOR: &str = "easyeda2kicad_rs";

/// `~/Documents/Kicad/easyeda2kicad`, or the working directory when there
/// is no home directory.
pub fn default_library_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join("Documents").join("Kicad").join(DEFAULT_LIBRARY_NAME))
        .unwrap_or_else(|| PathBuf::from("."))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConverterConfig {
    /// Folder of the default library, used when a request has no prefix.
    pub library_dir: PathBuf,
    pub library_name: String,
    /// Environment variable token that points at `library_dir` inside KiCad.
    pub model_dir_token: String,
    /// Written into the header of new `.kicad_sym` files.
    pub generator: String,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        ConverterConfig {
            library_dir: default_library_dir(),
            library_name: DEFAULT_LIBRARY_NAME.to_string(),
            model_dir_token: DEFAULT_MODEL_TOKEN.to_string(),
            generator: DEFAULT_GENERATOR.to_string(),
        }
    }
}

impl ConverterConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: ConverterConfig = serde_json::from_str(&contents)?;
        if config.library_name.trim().is_empty() {
            return Err(Error::InvalidInput(format!(
                "library_name in {} must not be empty",
                path.display()
            )));
        }
        Ok(config)
    }

    /// Output prefix and model path convention for a request.
    ///
    /// An empty `output_prefix` selects the default library, whose models are
    /// referenced through `model_dir_token`.
    pub fn resolve_prefix(&self, request: &ConversionRequest) -> (PathBuf, ModelPathStyle) {
        if request.output_prefix.as_os_str().is_empty() {
            let style = ModelPathStyle::DefaultLibrary {
                token: self.model_dir_token.clone(),
                lib_name: self.library_name.clone(),
            };
            return (self.library_dir.join(&self.library_name), style);
        }

        let prefix = request.output_prefix.clone();
        let lib_name = prefix
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.library_name.clone());
        let style = if request.project_relative {
            ModelPathStyle::ProjectRelative { lib_name }
        } else {
            ModelPathStyle::OutputFolder { lib_name }
        };
        (prefix, style)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::KicadVersion;

    fn request(prefix: &str, project_relative: bool) -> ConversionRequest {
        ConversionRequest {
            lcsc_id: "C2040".to_string(),
            output_prefix: PathBuf::from(prefix),
            overwrite: false,
            generate_symbol: true,
            generate_footprint: false,
            generate_model: false,
            kicad_version: KicadVersion::V6,
            project_relative,
        }
    }

    #[test]
    fn missing_fields_take_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "library_name": "parts" }"#).unwrap();
        let config = ConverterConfig::load(&path).unwrap();
        assert_eq!(config.library_name, "parts");
        assert_eq!(config.model_dir_token, DEFAULT_MODEL_TOKEN);
        assert_eq!(config.generator, DEFAULT_GENERATOR);
    }

    #[test]
    fn empty_library_name_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "library_name": " " }"#).unwrap();
        assert!(matches!(ConverterConfig::load(&path), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn prefix_selects_model_path_style() {
        let config = ConverterConfig {
            library_dir: PathBuf::from("/libs"),
            ..Default::default()
        };

        let (prefix, style) = config.resolve_prefix(&request("", false));
        assert_eq!(prefix, PathBuf::from("/libs/easyeda2kicad"));
        assert_eq!(
            style.model_file("R.step"),
            "${EASYEDA2KICAD}/easyeda2kicad.3dshapes/R.wrl"
        );

        let (prefix, style) = config.resolve_prefix(&request("proj/parts", true));
        assert_eq!(prefix, PathBuf::from("proj/parts"));
        assert_eq!(style, ModelPathStyle::ProjectRelative { lib_name: "parts".to_string() });

        let (_, style) = config.resolve_prefix(&request("out/parts", false));
        assert_eq!(style.model_file("R"), "../parts.3dshapes/R.wrl");
    }
}

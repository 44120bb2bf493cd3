// src/file_writer.rs

use crate::error::{Error, Result};
use crate::kicad_models::*;
use crate::library::{self, KicadVersion};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// How a symbol ended up in the library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolWrite {
    Inserted,
    Updated,
}

/// Files written for one 3D model.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelFiles {
    pub wrl: Option<PathBuf>,
    pub step: Option<PathBuf>,
}

/// Manages the output library structure.
///
/// A library is addressed by its prefix, e.g. `~/kicad/parts`, which gives
/// `parts.kicad_sym` (or `parts.lib`), `parts.pretty/` and `parts.3dshapes/`
/// side by side.
#[derive(Debug, Clone)]
pub struct KicadLibrary {
    pub prefix: PathBuf,
    pub version: KicadVersion,
    pub generator: String,
}

fn permission_error(path: &Path, source: io::Error) -> Error {
    if source.kind() == io::ErrorKind::PermissionDenied {
        Error::PermissionDenied {
            path: path.display().to_string(),
            source,
        }
    } else {
        Error::IoError(source)
    }
}

/// Writes through a sibling temp file and a rename, so readers never see a
/// half written library.
fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .ok_or_else(|| Error::InvalidInput(format!("'{}' is not a file path", path.display())))?;
    let mut tmp_name = file_name.to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    fs::write(&tmp_path, contents).map_err(|e| permission_error(&tmp_path, e))?;
    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(permission_error(path, e));
    }
    Ok(())
}

fn with_suffix(prefix: &Path, suffix: &str) -> PathBuf {
    let mut name = prefix.as_os_str().to_os_string();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

impl KicadLibrary {
    pub fn new(prefix: impl Into<PathBuf>, version: KicadVersion, generator: impl Into<String>) -> Self {
        KicadLibrary {
            prefix: prefix.into(),
            version,
            generator: generator.into(),
        }
    }

    /// Library nickname, used in footprint references and model paths.
    pub fn name(&self) -> String {
        self.prefix
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "easyeda2kicad".to_string())
    }

    pub fn symbol_path(&self) -> PathBuf {
        with_suffix(&self.prefix, self.version.extension())
    }

    pub fn footprint_dir(&self) -> PathBuf {
        with_suffix(&self.prefix, "pretty")
    }

    pub fn model_dir(&self) -> PathBuf {
        with_suffix(&self.prefix, "3dshapes")
    }

    pub fn footprint_path(&self, name: &str) -> PathBuf {
        self.footprint_dir().join(format!("{}.kicad_mod", name))
    }

    /// Creates the folders the requested exports need and an empty symbol
    /// library if there is none yet.
    pub fn setup_directories(&self, symbols: bool, footprints: bool, models: bool) -> Result<()> {
        let base_dir = match self.prefix.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&base_dir).map_err(|e| permission_error(&base_dir, e))?;

        if footprints {
            let dir = self.footprint_dir();
            fs::create_dir_all(&dir).map_err(|e| permission_error(&dir, e))?;
        }
        if footprints || models {
            let dir = self.model_dir();
            fs::create_dir_all(&dir).map_err(|e| permission_error(&dir, e))?;
        }

        let symbol_path = self.symbol_path();
        if symbols && !symbol_path.exists() {
            let header = library::library_header(self.version, &self.generator);
            write_atomic(&symbol_path, header.as_bytes())?;
            log::info!("Created symbol library {}", symbol_path.display());
        }
        Ok(())
    }

    pub fn read_symbol_library(&self) -> Result<String> {
        let path = self.symbol_path();
        fs::read_to_string(&path).map_err(|e| permission_error(&path, e))
    }

    pub fn symbol_exists(&self, name: &str) -> Result<bool> {
        if !self.symbol_path().exists() {
            return Ok(false);
        }
        let content = self.read_symbol_library()?;
        Ok(library::contains_component(&content, self.version, name))
    }

    /// Adds a symbol to the symbol library file, replacing an existing block
    /// of the same name.
    pub fn add_symbol(&self, symbol: &KiSymbol) -> Result<SymbolWrite> {
        let block = match self.version {
            KicadVersion::V6 => symbol.to_kicad_v6_block(),
            KicadVersion::V5 => symbol.to_kicad_v5_block(),
        };
        let content = if self.symbol_path().exists() {
            self.read_symbol_library()?
        } else {
            library::library_header(self.version, &self.generator)
        };

        let (new_content, outcome) = match library::count_components(&content, self.version, &symbol.name) {
            0 => (
                library::insert(&content, self.version, &block),
                SymbolWrite::Inserted,
            ),
            1 => (
                library::update(&content, self.version, &symbol.name, &block),
                SymbolWrite::Updated,
            ),
            count => {
                return Err(Error::AmbiguousSymbol {
                    name: symbol.name.clone(),
                    count,
                    path: self.symbol_path().display().to_string(),
                });
            }
        };

        write_atomic(&self.symbol_path(), new_content.as_bytes())?;
        log::info!(
            "{} symbol '{}' in {}",
            if outcome == SymbolWrite::Updated { "Updated" } else { "Added" },
            symbol.name,
            self.symbol_path().display()
        );
        Ok(outcome)
    }

    pub fn footprint_exists(&self, name: &str) -> bool {
        self.footprint_path(name).is_file()
    }

    /// Writes a footprint to its own .kicad_mod file.
    pub fn add_footprint(&self, footprint: &KiFootprint, model_path: &ModelPathStyle) -> Result<PathBuf> {
        let fp_path = self.footprint_path(&footprint.name);
        let content = footprint.to_kicad_mod_entry(model_path);
        write_atomic(&fp_path, content.as_bytes())?;
        log::info!("Wrote footprint {}", fp_path.display());
        Ok(fp_path)
    }

    /// Writes the 3D model files (.wrl, .step).
    pub fn add_3d_model(&self, model: &Ki3dModel) -> Result<ModelFiles> {
        let base_name = sanitize_model_filename(&model.name);
        let mut files = ModelFiles::default();
        if let Some(wrl_data) = &model.wrl_data {
            let path = self.model_dir().join(format!("{}.wrl", base_name));
            write_atomic(&path, wrl_data.as_bytes())?;
            files.wrl = Some(path);
        }
        if let Some(step_data) = &model.step_data {
            let path = self.model_dir().join(format!("{}.step", base_name));
            write_atomic(&path, step_data)?;
            files.step = Some(path);
        }
        log::info!("Wrote 3D model '{}' to {}", base_name, self.model_dir().display());
        Ok(files)
    }
}

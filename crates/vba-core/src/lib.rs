//! VBA project decoding, parsing, complexity scoring and refactor advice.
//!
//! Read path: [`package`] (C1) and the compound-file layer in [`vba_ole`]
//! (C2) locate the macro payload; [`decomp`] (C3) reconstructs module
//! source bytes; [`project`] (C4) assembles the typed project value;
//! [`parser`] (C5) and [`complexity`] (C6) recover structure; [`analysis`]
//! (C7) aggregates it; [`advisor`] (C8) turns it into suggestions.
#![warn(missing_docs)]

pub mod advisor;
pub mod analysis;
pub mod complexity;
pub mod decomp;
mod error;
pub mod package;
pub mod parser;
pub mod project;

pub use error::{Result, VbaError};
pub use project::{Module, ModuleKind, Project};

use std::io::Cursor;
use std::path::Path;
use tracing::debug;
use vba_ole::Ole;

/// The container format family a file suffix maps to, per the data model's
/// `Container` definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    /// ZIP-packaged macro-enabled spreadsheet (`.xlsm`, `.xltm`, `.xlsb`).
    SpreadsheetMacro,
    /// Legacy binary spreadsheet (`.xls`), a bare compound file.
    SpreadsheetBinary,
    /// ZIP-packaged macro-enabled word-processing document (`.docm`, `.dotm`).
    WordMacro,
    /// Legacy binary word document (`.doc`, `.dot`), a bare compound file.
    WordBinary,
    /// ZIP-packaged macro-enabled presentation (`.pptm`, `.potm`).
    PresentationMacro,
    /// Legacy binary presentation (`.ppt`, `.pot`), a bare compound file.
    PresentationBinary,
    /// Database container (`.mdb`, `.accdb`).
    Database,
}

impl ContainerKind {
    /// Maps a file suffix (without the leading dot, any case) to a
    /// container kind, or `None` if unrecognized.
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix.to_ascii_lowercase().as_str() {
            "xlsm" | "xltm" | "xlsb" => Some(Self::SpreadsheetMacro),
            "xls" => Some(Self::SpreadsheetBinary),
            "docm" | "dotm" => Some(Self::WordMacro),
            "doc" | "dot" => Some(Self::WordBinary),
            "pptm" | "potm" => Some(Self::PresentationMacro),
            "ppt" | "pot" => Some(Self::PresentationBinary),
            "mdb" | "accdb" => Some(Self::Database),
            _ => None,
        }
    }

    fn is_zip_packaged(&self) -> bool {
        matches!(
            self,
            Self::SpreadsheetMacro | Self::WordMacro | Self::PresentationMacro
        )
    }

    /// The compound-file storage path that contains the `VBA` storage, for
    /// containers that are themselves a bare compound file. ZIP-packaged
    /// variants' embedded `vbaProject.bin` always roots directly at `""`.
    fn legacy_rootdir(&self) -> &'static str {
        match self {
            Self::SpreadsheetBinary | Self::WordBinary | Self::PresentationBinary => "Macros",
            Self::Database => "",
            _ => "",
        }
    }
}

/// Reads a container end to end (C1/C2 → C3 → C4) and returns its project,
/// or `Ok(None)` if it's a valid ZIP-packaged container with no macro
/// payload (the empty-project sentinel, not an error).
pub fn open_project(path: &Path) -> Result<Option<Project>> {
    if !path.exists() {
        return Err(VbaError::NotFound(path.display().to_string()));
    }
    let suffix = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    let kind = ContainerKind::from_suffix(suffix)
        .ok_or_else(|| VbaError::UnsupportedFormat(suffix.to_string()))?;

    let bytes = std::fs::read(path)?;
    if kind.is_zip_packaged() {
        match package::find_macro_payload(&bytes)? {
            Some(payload) => {
                debug!(bytes = payload.len(), "found embedded vbaProject.bin");
                let ole = Ole::new(Cursor::new(payload))?;
                Ok(Some(Project::read(&ole, "")?))
            }
            None => Ok(None),
        }
    } else {
        let ole = Ole::new(Cursor::new(bytes))?;
        Ok(Some(Project::read(&ole, kind.legacy_rootdir())?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffix_mapping_matches_the_data_model() {
        assert_eq!(
            ContainerKind::from_suffix("XLSM"),
            Some(ContainerKind::SpreadsheetMacro)
        );
        assert_eq!(
            ContainerKind::from_suffix("accdb"),
            Some(ContainerKind::Database)
        );
        assert_eq!(ContainerKind::from_suffix("txt"), None);
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = open_project(Path::new("/nonexistent/path/x.xlsm")).unwrap_err();
        assert!(matches!(err, VbaError::NotFound(_)));
    }
}

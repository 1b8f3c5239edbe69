//! Package reader (C1): locates the macro payload inside a ZIP-packaged
//! container (macro-enabled spreadsheet/word/presentation variants).
use crate::error::{Result, VbaError};
use std::io::{Cursor, Read};

const CANDIDATE_PATHS: [&str; 3] = ["xl/vbaProject.bin", "word/vbaProject.bin", "ppt/vbaProject.bin"];

/// Returns the raw bytes of the first matching `vbaProject.bin` entry, or
/// `None` if the package carries no macro project at all.
pub fn find_macro_payload(zip_bytes: &[u8]) -> Result<Option<Vec<u8>>> {
    let mut archive = zip::ZipArchive::new(Cursor::new(zip_bytes))
        .map_err(|e| VbaError::FormatError(format!("not a valid package: {e}")))?;
    for candidate in CANDIDATE_PATHS {
        if let Ok(mut entry) = archive.by_name(candidate) {
            let mut buf = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut buf)?;
            return Ok(Some(buf));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn make_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut writer = zip::ZipWriter::new(Cursor::new(&mut buf));
            let opts = SimpleFileOptions::default();
            for (name, data) in entries {
                writer.start_file(*name, opts).unwrap();
                writer.write_all(data).unwrap();
            }
            writer.finish().unwrap();
        }
        buf
    }

    #[test]
    fn finds_excel_macro_payload() {
        let zip = make_zip(&[
            ("[Content_Types].xml", b"<Types/>"),
            ("xl/vbaProject.bin", b"fakebindata"),
        ]);
        let found = find_macro_payload(&zip).unwrap();
        assert_eq!(found.as_deref(), Some(&b"fakebindata"[..]));
    }

    #[test]
    fn no_macro_payload_is_not_an_error() {
        let zip = make_zip(&[("[Content_Types].xml", b"<Types/>")]);
        assert!(find_macro_payload(&zip).unwrap().is_none());
    }

    #[test]
    fn invalid_zip_is_a_format_error() {
        let err = find_macro_payload(b"not a zip").unwrap_err();
        assert!(matches!(err, VbaError::FormatError(_)));
    }
}

//! Project model (C4): combines the compound-file reader, the module-stream
//! decoder and the `dir` stream's record format into an ordered list of
//! named, typed, decoded modules.
use crate::decomp::CompressContainerReader;
use crate::error::{Result, VbaError};
use std::io::{self, Read};
use vba_ole::byteio::{rdu16le, rdu32le};
use vba_ole::Ole;

/// The kind of a module, as inferred by [`infer_kind`] or (when available)
/// tagged directly by the format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleKind {
    /// A plain standard module (`.bas`).
    Standard,
    /// A class module (`.cls`).
    Class,
    /// A UserForm module (`.frm`).
    Form,
    /// The document-level module of a Word document.
    Document,
    /// The `ThisWorkbook` module.
    Workbook,
    /// A worksheet code-behind module.
    Worksheet,
}

impl ModuleKind {
    /// The lowercase label surfaced to callers.
    pub fn label(&self) -> &'static str {
        match self {
            ModuleKind::Standard => "standard",
            ModuleKind::Class => "class",
            ModuleKind::Form => "form",
            ModuleKind::Document => "document",
            ModuleKind::Workbook => "workbook",
            ModuleKind::Worksheet => "worksheet",
        }
    }
}

/// One module in a VBA project, fully decoded.
#[derive(Debug, Clone)]
pub struct Module {
    /// The module's name, unique within the project (case-insensitively).
    pub name: String,
    /// The inferred or tagged kind.
    pub kind: ModuleKind,
    /// The decompressed, decoded source text.
    pub code: String,
    /// `code`'s line count.
    pub line_count: usize,
}

/// A VBA project: the macro namespace inside one container.
#[derive(Debug, Clone, Default)]
pub struct Project {
    /// The project's declared name, if the `dir` stream carried one.
    pub name: Option<String>,
    /// The project's declared code page, used to decode non-Unicode text.
    pub codepage: Option<u16>,
    /// The project's modules, in directory order.
    pub modules: Vec<Module>,
}

impl Project {
    /// Reads and decodes a full project rooted at `rootdir` inside `ole`
    /// (`rootdir` is `""` for a bare `vbaProject.bin`/database container, or
    /// a storage name such as `"Macros"` for legacy binary documents).
    pub fn read<R: Read + io::Seek>(ole: &Ole<R>, rootdir: &str) -> Result<Self> {
        let vba_path = join_path(rootdir, "VBA");
        let dir_entry = ole
            .get_entry_by_name(&join_path(&vba_path, "dir"))
            .map_err(|_| VbaError::FormatError("missing VBA/dir stream".into()))?;
        let mut dir_raw = Vec::new();
        ole.get_stream_reader(&dir_entry)?.read_to_end(&mut dir_raw)?;

        let raw = parse_dir_stream(&mut dir_raw.as_slice(), dir_entry.size)?;
        let codepage = raw.codepage;
        let mut modules = Vec::with_capacity(raw.modules.len());
        for raw_module in raw.modules {
            let name = raw_module
                .name_unicode
                .or(raw_module.name)
                .ok_or_else(|| VbaError::FormatError("module with no name".into()))?;
            let stream = raw_module
                .stream_unicode
                .or(raw_module.stream)
                .unwrap_or_else(|| name.clone());
            let offset = raw_module.offset.unwrap_or(0) as u64;

            let stream_entry = ole
                .get_entry_by_name(&join_path(&vba_path, &stream))
                .map_err(|_| VbaError::FormatError(format!("missing module stream {stream}")))?;
            let mut stream_reader = ole.get_stream_reader(&stream_entry)?;
            io::copy(&mut (&mut stream_reader).take(offset), &mut io::sink())?;
            let remaining = stream_entry.size.saturating_sub(offset);
            let mut decompressed = Vec::new();
            CompressContainerReader::new(stream_reader, remaining)
                .map_err(|e| VbaError::FormatError(format!("corrupt compression stream: {e}")))?
                .read_to_end(&mut decompressed)
                .map_err(|e| VbaError::FormatError(format!("corrupt compression stream: {e}")))?;
            let code = utf8dec_rs::decode_win_str(&decompressed, codepage.unwrap_or(1252));
            let line_count = code.lines().count().max(1);

            modules.push(Module {
                kind: infer_kind(&name, &stream),
                name,
                code,
                line_count,
            });
        }

        Ok(Project {
            name: raw.name,
            codepage,
            modules,
        })
    }
}

fn join_path(prefix: &str, leaf: &str) -> String {
    if prefix.is_empty() {
        leaf.to_string()
    } else {
        format!("{prefix}/{leaf}")
    }
}

/// Kind inference rules from the project model contract, applied in order:
/// exact name `thisworkbook` → workbook; `sheet*` prefix → worksheet;
/// `userform*` prefix → form; stream path containing `class` → class; else
/// standard.
pub fn infer_kind(module_name: &str, stream_name: &str) -> ModuleKind {
    if module_name.eq_ignore_ascii_case("thisworkbook") {
        return ModuleKind::Workbook;
    }
    if starts_with_ci(module_name, "sheet") {
        return ModuleKind::Worksheet;
    }
    if starts_with_ci(module_name, "userform") {
        return ModuleKind::Form;
    }
    if stream_name.to_ascii_lowercase().contains("class") {
        return ModuleKind::Class;
    }
    ModuleKind::Standard
}

fn starts_with_ci(s: &str, prefix: &str) -> bool {
    s.len() >= prefix.len() && s[..prefix.len()].eq_ignore_ascii_case(prefix)
}

#[derive(Debug, Default)]
struct RawProject {
    codepage: Option<u16>,
    name: Option<String>,
    modules: Vec<RawModule>,
}

#[derive(Debug, Default)]
struct RawModule {
    name: Option<String>,
    name_unicode: Option<String>,
    stream: Option<String>,
    stream_unicode: Option<String>,
    offset: Option<u32>,
}

/// Parses the version-independent `dir` stream record sequence.
///
/// Matches the real format's looseness rather than the strict MS-OVBA record
/// order: fields we don't surface (references, docstrings, help paths,
/// compilation constants, per-module flags) are consumed generically by
/// reading their length prefix and skipping the payload, relying on the
/// fact that each record's own "reserved" marker happens to equal the id of
/// whatever sub-record follows it, so the generic skip naturally chains
/// through multi-part records without needing to special-case them.
fn parse_dir_stream<R: Read>(f: &mut R, size: u64) -> Result<RawProject> {
    let mut ret = RawProject::default();
    let mut f = CompressContainerReader::new(f, size)
        .map_err(|e| VbaError::FormatError(format!("corrupt compression stream: {e}")))?;

    let mut record_id = rdu16le(&mut f)?;
    loop {
        match record_id {
            0x0003 /* PROJECTCODEPAGE */ => set_u16_or_skip(&mut f, &mut ret.codepage)?,
            0x0004 /* PROJECTNAME */ => {
                set_string_or_skip(&mut f, &mut ret.name, StrEnc::Cp(ret.codepage))?
            }
            0x0009 /* PROJECTVERSION: fixed layout, no length prefix */ => {
                skip(&mut f, 4)?;
                skip(&mut f, 4)?; // version major
                skip(&mut f, 2)?; // version minor
            }
            0x0016 | 0x0033 | 0x000e | 0x000f => break,
            _ => skip_this(&mut f)?,
        }
        record_id = rdu16le(&mut f)?;
    }

    record_id = skip_references(&mut f, record_id)?;
    let _ = record_id;

    let mut nmodules: Option<u16> = None;
    set_u16_or_skip(&mut f, &mut nmodules)?;
    if rdu16le(&mut f)? == 0x0013 {
        skip(&mut f, 2)?; // PROJECTCOOKIE value
    } else {
        skip(&mut f, 4)?;
    }
    if let Some(nmodules) = nmodules {
        for _ in 0..nmodules {
            ret.modules.push(parse_module(&mut f)?);
        }
    }
    Ok(ret)
}

/// Walks the `REFERENCE*` record family purely to stay in sync with the
/// stream's cursor; references themselves have no counterpart in the
/// project model this crate surfaces.
fn skip_references<R: Read>(f: &mut R, mut record_id: u16) -> Result<u16> {
    loop {
        if record_id == 0x0016 {
            skip_this(f)?; // REFERENCENAME
            skip(f, 2)?; // reserved, should be 0x003e
            skip_this(f)?; // REFERENCENAME unicode
            record_id = rdu16le(f)?;
        }
        match record_id {
            0x0033 /* REFERENCEORIGINAL (+ optional REFERENCECONTROL) */ => {
                skip_this(f)?; // libid_original
                record_id = rdu16le(f)?;
                if record_id != 0x002f {
                    continue;
                }
                skip(f, 4)?; // total size
                skip_this(f)?; // twiddled libid
                skip(f, 6)?; // reserved
                if rdu16le(f)? == 0x0016 {
                    skip_this(f)?; // record name
                    skip(f, 2)?; // reserved, should be 0x003e
                    skip_this(f)?; // record name unicode
                    skip(f, 6)?; // reserved + original-record total size
                } else {
                    skip(f, 4)?; // total size (0x0030 id already consumed)
                }
                skip_this(f)?; // libid
                skip(f, 6)?; // reserved
                skip(f, 16)?; // guid
                skip(f, 4)?; // cookie
            }
            0x000d /* REFERENCEREGISTERED */ => {
                skip(f, 4)?; // total size
                skip_this(f)?; // libid
                skip(f, 6)?; // reserved
            }
            0x000e /* REFERENCEPROJECT */ => {
                skip(f, 4)?; // total size
                skip_this(f)?; // absolute path
                skip_this(f)?; // relative path
                skip(f, 4)?; // version major
                skip(f, 2)?; // version minor
            }
            0x000f => break,
            _ => skip_this(f)?,
        }
        record_id = rdu16le(f)?;
    }
    Ok(record_id)
}

fn parse_module<R: Read>(f: &mut R) -> Result<RawModule> {
    let mut ret = RawModule::default();
    let mut record_id = rdu16le(f)?;
    loop {
        match record_id {
            0x0019 /* MODULENAME */ => set_string_or_skip(f, &mut ret.name, StrEnc::Cp(None))?,
            0x0047 /* MODULENAMEUNICODE */ => {
                set_string_or_skip(f, &mut ret.name_unicode, StrEnc::Utf16)?
            }
            0x001a /* MODULESTREAMNAME (1/2) */ => {
                set_string_or_skip(f, &mut ret.stream, StrEnc::Cp(None))?;
                skip(f, 2)?; // reserved, should be 0x0032
                record_id = 0x0032;
                continue;
            }
            0x0032 /* MODULESTREAMNAME (2/2) */ => {
                set_string_or_skip(f, &mut ret.stream_unicode, StrEnc::Utf16)?
            }
            0x0031 /* MODULEOFFSET */ => set_u32_or_skip(f, &mut ret.offset)?,
            0x002b /* Terminator */ => {
                skip_this(f)?;
                break;
            }
            _ => skip_this(f)?,
        }
        record_id = rdu16le(f)?;
    }
    Ok(ret)
}

fn set_u32_or_skip<R: Read>(f: &mut R, p: &mut Option<u32>) -> Result<()> {
    let len = rdu32le(f)?;
    if len == 4 && p.is_none() {
        *p = Some(rdu32le(f)?);
    } else {
        skip(f, len)?;
    }
    Ok(())
}

fn set_u16_or_skip<R: Read>(f: &mut R, p: &mut Option<u16>) -> Result<()> {
    let len = rdu32le(f)?;
    if len == 2 && p.is_none() {
        *p = Some(rdu16le(f)?);
    } else {
        skip(f, len)?;
    }
    Ok(())
}

/// How to decode a length-prefixed string field: the project's declared
/// code page, or the dedicated `*UNICODE` record's UTF-16LE encoding.
enum StrEnc {
    Cp(Option<u16>),
    Utf16,
}

/// Reads a length-prefixed string field, decoding it if `p` is still unset
/// and otherwise discarding it — mirrors `set_u32_or_skip`'s "first one
/// wins" tolerance for the format's strict-order violations in the wild.
fn set_string_or_skip<R: Read>(f: &mut R, p: &mut Option<String>, enc: StrEnc) -> Result<()> {
    let total_len = rdu32le(f)?;
    if p.is_none() {
        let mut buf = vec![0u8; total_len as usize];
        f.read_exact(&mut buf)?;
        *p = Some(match enc {
            StrEnc::Utf16 => utf8dec_rs::decode_utf16le_str(&buf),
            StrEnc::Cp(Some(cp)) => utf8dec_rs::decode_win_str(&buf, cp),
            StrEnc::Cp(None) => utf8dec_rs::decode_win_str(&buf, 1252),
        });
    } else {
        skip(f, total_len)?;
    }
    Ok(())
}

fn skip_this<R: Read>(f: &mut R) -> Result<()> {
    let len = rdu32le(f)?;
    skip(f, len)?;
    Ok(())
}

fn skip<R: Read>(f: &mut R, n: u32) -> Result<()> {
    io::copy(&mut f.take(n.into()), &mut io::sink())?;
    Ok(())
}

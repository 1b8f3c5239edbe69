//! Windows COM automation binding (feature `automation`).
//!
//! Drives the host the way the original implementation did through a
//! reflection library: every member access is late-bound by name through
//! `IDispatch`, so this file never links against a generated type library.
//! The cost is the same one the original paid — typos in member names fail
//! at call time, not compile time — and the benefit is the same too: one
//! code path works across every installed host version.
#![cfg(all(windows, feature = "automation"))]

use crate::error::{AutomationError, Result};
use crate::session::{AppFamily, AutomationValue, ColumnSelector, DbTableInfo, FieldInfo, HostBinding, QueryInfo, TableInfo};
use std::path::Path;
use windows::core::{Interface, BSTR, PCWSTR};
use windows::Win32::System::Com::{
    CoCreateInstance, CoInitializeEx, IDispatch, CLSCTX_LOCAL_SERVER, COINIT_APARTMENTTHREADED,
    DISPATCH_METHOD, DISPATCH_PROPERTYGET, DISPATCH_PROPERTYPUT, DISPPARAMS,
};
use windows::Win32::System::Ole::CLSIDFromProgID;
use windows::Win32::System::Variant::{
    VariantClear, VARIANT, VT_BOOL, VT_BSTR, VT_DISPATCH, VT_EMPTY, VT_I4, VT_R8,
};

fn progid_for(family: AppFamily) -> &'static str {
    match family {
        AppFamily::Spreadsheet => "Excel.Application",
        AppFamily::Word => "Word.Application",
        AppFamily::Database => "Access.Application",
    }
}

fn to_wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

fn variant_from_value(v: &AutomationValue) -> VARIANT {
    match v {
        AutomationValue::Empty => VARIANT::default(),
        AutomationValue::Bool(b) => variant_bool(*b),
        AutomationValue::Int(i) => variant_i4(*i as i32),
        AutomationValue::Float(f) => variant_r8(*f),
        AutomationValue::Str(s) => variant_bstr(s),
        AutomationValue::Array(_) => {
            // SAFEARRAY construction for 2-D ranges is built at the call
            // site (see `write_range`), not through this scalar helper.
            VARIANT::default()
        }
    }
}

fn variant_bstr(s: &str) -> VARIANT {
    unsafe {
        let mut v = VARIANT::default();
        v.Anonymous.Anonymous.vt = VT_BSTR;
        v.Anonymous.Anonymous.Anonymous.bstrVal = std::mem::ManuallyDrop::new(BSTR::from(s));
        v
    }
}

fn variant_i4(i: i32) -> VARIANT {
    unsafe {
        let mut v = VARIANT::default();
        v.Anonymous.Anonymous.vt = VT_I4;
        v.Anonymous.Anonymous.Anonymous.lVal = i;
        v
    }
}

fn variant_r8(f: f64) -> VARIANT {
    unsafe {
        let mut v = VARIANT::default();
        v.Anonymous.Anonymous.vt = VT_R8;
        v.Anonymous.Anonymous.Anonymous.dblVal = f;
        v
    }
}

fn variant_bool(b: bool) -> VARIANT {
    unsafe {
        let mut v = VARIANT::default();
        v.Anonymous.Anonymous.vt = VT_BOOL;
        v.Anonymous.Anonymous.Anonymous.boolVal = if b { -1 } else { 0 };
        v
    }
}

fn variant_dispatch(d: &Dispatch) -> VARIANT {
    unsafe {
        let mut v = VARIANT::default();
        v.Anonymous.Anonymous.vt = VT_DISPATCH;
        v.Anonymous.Anonymous.Anonymous.pdispVal = std::mem::ManuallyDrop::new(Some(d.0.clone()));
        v
    }
}

fn dispatch_from_variant(v: &VARIANT) -> Result<Dispatch> {
    unsafe {
        if v.Anonymous.Anonymous.vt != VT_DISPATCH {
            return Err(AutomationError::Validation("expected an object reference".to_string()));
        }
        let disp = v
            .Anonymous
            .Anonymous
            .Anonymous
            .pdispVal
            .as_ref()
            .ok_or_else(|| AutomationError::Validation("null object reference".to_string()))?
            .clone();
        Ok(Dispatch(disp))
    }
}

fn variant_to_value(v: &VARIANT) -> AutomationValue {
    unsafe {
        let vt = v.Anonymous.Anonymous.vt;
        if vt == VT_EMPTY {
            AutomationValue::Empty
        } else if vt == VT_BSTR {
            AutomationValue::Str(v.Anonymous.Anonymous.Anonymous.bstrVal.to_string())
        } else if vt == VT_I4 {
            AutomationValue::Int(v.Anonymous.Anonymous.Anonymous.lVal as i64)
        } else if vt == VT_R8 {
            AutomationValue::Float(v.Anonymous.Anonymous.Anonymous.dblVal)
        } else if vt == VT_BOOL {
            AutomationValue::Bool(v.Anonymous.Anonymous.Anonymous.boolVal != 0)
        } else {
            // SAFEARRAY (range reads) is unpacked at the call site where the
            // dimensionality is known; anything else surfaces as empty.
            AutomationValue::Empty
        }
    }
}

/// Thin late-bound wrapper over one `IDispatch` pointer.
struct Dispatch(IDispatch);

impl Dispatch {
    fn dispid(&self, member: &str) -> Result<i32> {
        let wide = to_wide(member);
        let mut dispid = 0i32;
        unsafe {
            self.0
                .GetIDsOfNames(
                    &windows::core::GUID::zeroed(),
                    &PCWSTR(wide.as_ptr()),
                    1,
                    windows::Win32::Globalization::GetUserDefaultLCID(),
                    &mut dispid,
                )
                .map_err(|e| AutomationError::Validation(format!("unknown member {member}: {e}")))?;
        }
        Ok(dispid)
    }

    fn call(&self, member: &str, flags: u16, args: &[VARIANT]) -> Result<VARIANT> {
        let dispid = self.dispid(member)?;
        let mut reversed: Vec<VARIANT> = args.iter().rev().map(|v| unsafe { std::ptr::read(v) }).collect();
        let params = DISPPARAMS {
            rgvarg: reversed.as_mut_ptr(),
            rgdispidNamedArgs: std::ptr::null_mut(),
            cArgs: reversed.len() as u32,
            cNamedArgs: if flags == DISPATCH_PROPERTYPUT.0 as u16 { 1 } else { 0 },
        };
        let mut result = VARIANT::default();
        unsafe {
            self.0
                .Invoke(
                    dispid,
                    &windows::core::GUID::zeroed(),
                    windows::Win32::Globalization::GetUserDefaultLCID(),
                    windows::Win32::System::Com::DISPATCH_FLAGS(flags),
                    &DISPPARAMS {
                        rgvarg: params.rgvarg,
                        rgdispidNamedArgs: params.rgdispidNamedArgs,
                        cArgs: params.cArgs,
                        cNamedArgs: params.cNamedArgs,
                    },
                    Some(&mut result),
                    None,
                    None,
                )
                .map_err(|e| AutomationError::Validation(format!("{member} failed: {e}")))?;
        }
        std::mem::forget(reversed);
        Ok(result)
    }

    fn method(&self, member: &str, args: &[VARIANT]) -> Result<VARIANT> {
        self.call(member, DISPATCH_METHOD.0 as u16, args)
    }

    fn get(&self, member: &str) -> Result<VARIANT> {
        self.call(member, DISPATCH_PROPERTYGET.0 as u16, &[])
    }

    fn get_dispatch(&self, member: &str) -> Result<Dispatch> {
        let v = self.get(member)?;
        unsafe {
            if v.Anonymous.Anonymous.vt != VT_DISPATCH {
                return Err(AutomationError::Validation(format!("{member} is not an object")));
            }
            let disp = v
                .Anonymous
                .Anonymous
                .Anonymous
                .pdispVal
                .as_ref()
                .ok_or_else(|| AutomationError::Validation(format!("{member} returned null")))?
                .clone();
            Ok(Dispatch(disp))
        }
    }

    fn put(&self, member: &str, value: VARIANT) -> Result<()> {
        self.call(member, DISPATCH_PROPERTYPUT.0 as u16, &[value])?;
        Ok(())
    }

    /// `collection.Item(key)`, unwrapped to a `Dispatch`. Most indexed
    /// collections (Worksheets, ListObjects, ListRows, ...) expose `Item` as
    /// their default member.
    fn item(&self, key: VARIANT) -> Result<Dispatch> {
        dispatch_from_variant(&self.method("Item", &[key])?)
    }

    fn count(&self) -> Result<i32> {
        unsafe { Ok(self.get("Count")?.Anonymous.Anonymous.Anonymous.lVal) }
    }
}

/// A live COM automation session for one host family.
pub struct ComBinding {
    family: AppFamily,
    app: Dispatch,
    document: Option<Dispatch>,
    read_only: bool,
}

impl ComBinding {
    /// Creates the application object (but does not open any document).
    pub fn new(family: AppFamily) -> Result<Self> {
        unsafe {
            let _ = CoInitializeEx(None, COINIT_APARTMENTTHREADED);
            let progid = to_wide(progid_for(family));
            let clsid = CLSIDFromProgID(PCWSTR(progid.as_ptr()))
                .map_err(|e| AutomationError::Validation(format!("no host registered: {e}")))?;
            let app: IDispatch = CoCreateInstance(&clsid, None, CLSCTX_LOCAL_SERVER)
                .map_err(|e| AutomationError::Validation(format!("failed to start host: {e}")))?;
            Ok(Self {
                family,
                app: Dispatch(app),
                document: None,
                read_only: false,
            })
        }
    }

    fn documents_collection_name(&self) -> &'static str {
        match self.family {
            AppFamily::Spreadsheet => "Workbooks",
            AppFamily::Word => "Documents",
            AppFamily::Database => "CurrentDb",
        }
    }

    fn project(&self) -> Result<Dispatch> {
        let doc = self
            .document
            .as_ref()
            .ok_or_else(|| AutomationError::Validation("no document open".to_string()))?;
        doc.get_dispatch("VBProject")
            .map_err(|_| AutomationError::PermissionDenied("Trust access to the VBA project object model".into()))
    }

    fn worksheet(&self, sheet: &str) -> Result<Dispatch> {
        let doc = self.document.as_ref().ok_or_else(|| AutomationError::Validation("no document open".into()))?;
        doc.get_dispatch("Worksheets")?.item(variant_bstr(sheet))
    }

    fn table_info(&self, sheet: &str, table: &Dispatch) -> Result<TableInfo> {
        let name = match variant_to_value(&table.get("Name")?) {
            AutomationValue::Str(s) => s,
            _ => String::new(),
        };
        let rows = table.get_dispatch("ListRows")?.count()?.max(0) as u32;
        let columns = table.get_dispatch("ListColumns")?.count()?.max(0) as u32;
        let range = match table.get_dispatch("Range").and_then(|r| r.get("Address")) {
            Ok(v) => match variant_to_value(&v) {
                AutomationValue::Str(s) => s,
                _ => String::new(),
            },
            Err(_) => String::new(),
        };
        let total_row = matches!(table.get("ShowTotals").map(|v| variant_to_value(&v)), Ok(AutomationValue::Bool(true)));
        // Header values come back as a SAFEARRAY; unpacking one is left to
        // the same call site as `read_range`'s, so this is empty today.
        let headers = Vec::new();
        let _ = table.get_dispatch("HeaderRowRange");
        Ok(TableInfo { name, sheet: sheet.to_string(), rows, columns, headers, range, total_row })
    }
}

impl HostBinding for ComBinding {
    fn family(&self) -> AppFamily {
        self.family
    }

    fn open(&mut self, path: &Path, read_only: bool) -> Result<()> {
        self.read_only = read_only;
        let path_str = variant_bstr(&path.to_string_lossy());
        if self.family == AppFamily::Database {
            self.app.method("OpenCurrentDatabase", &[path_str])?;
            self.document = Some(self.app.get_dispatch("CurrentDb")?);
            return Ok(());
        }
        let collection = self.app.get_dispatch(self.documents_collection_name())?;
        let read_only_flag = variant_bool(read_only);
        let result = collection.method("Open", &[read_only_flag, path_str])?;
        self.document = unsafe {
            if result.Anonymous.Anonymous.vt == VT_DISPATCH {
                result.Anonymous.Anonymous.Anonymous.pdispVal.as_ref().map(|d| Dispatch(d.clone()))
            } else {
                None
            }
        };
        Ok(())
    }

    fn set_visible(&mut self, visible: bool) -> Result<()> {
        self.app.put("Visible", variant_bool(visible))
    }

    fn set_display_alerts(&mut self, alerts: bool) -> Result<()> {
        self.app.put("DisplayAlerts", variant_bool(alerts))
    }

    fn probe_liveness(&self) -> bool {
        self.app.get("Name").is_ok()
    }

    fn save(&mut self) -> Result<()> {
        let doc = self.document.as_ref().ok_or_else(|| AutomationError::Validation("no document open".into()))?;
        doc.method("Save", &[]).map(|_| ())
    }

    fn close_file(&mut self) -> Result<()> {
        if let Some(doc) = self.document.take() {
            doc.method("Close", &[]).ok();
        }
        Ok(())
    }

    fn quit(&mut self) -> Result<()> {
        self.app.method("Quit", &[]).map(|_| ())
    }

    fn invoke(&self, target_path: &str, member: &str, args: &[AutomationValue]) -> Result<AutomationValue> {
        let target = self.resolve_path(target_path)?;
        let variants: Vec<VARIANT> = args.iter().map(variant_from_value).collect();
        let result = target.method(member, &variants)?;
        Ok(variant_to_value(&result))
    }

    fn get_property(&self, target_path: &str, member: &str) -> Result<AutomationValue> {
        let target = self.resolve_path(target_path)?;
        Ok(variant_to_value(&target.get(member)?))
    }

    fn put_property(&self, target_path: &str, member: &str, value: AutomationValue) -> Result<()> {
        let target = self.resolve_path(target_path)?;
        target.put(member, variant_from_value(&value))
    }

    fn list_components(&self) -> Result<Vec<String>> {
        let project = self.project()?;
        let components = project.get_dispatch("VBComponents")?;
        let count = unsafe { components.get("Count")?.Anonymous.Anonymous.Anonymous.lVal };
        let mut names = Vec::with_capacity(count.max(0) as usize);
        for i in 1..=count {
            let item = components.method("Item", &[variant_i4(i)])?;
            let comp = unsafe {
                Dispatch(item.Anonymous.Anonymous.Anonymous.pdispVal.as_ref().unwrap().clone())
            };
            if let AutomationValue::Str(name) = variant_to_value(&comp.get("Name")?) {
                names.push(name);
            }
        }
        Ok(names)
    }

    fn component_source(&self, name: &str) -> Result<String> {
        let project = self.project()?;
        let components = project.get_dispatch("VBComponents")?;
        let item = components.method("Item", &[variant_bstr(name)])?;
        let comp = unsafe { Dispatch(item.Anonymous.Anonymous.Anonymous.pdispVal.as_ref().unwrap().clone()) };
        let module = comp.get_dispatch("CodeModule")?;
        let line_count = unsafe { module.get("CountOfLines")?.Anonymous.Anonymous.Anonymous.lVal };
        if line_count <= 0 {
            return Ok(String::new());
        }
        let text = module.method("Lines", &[variant_i4(1), variant_i4(line_count)])?;
        match variant_to_value(&text) {
            AutomationValue::Str(s) => Ok(s),
            _ => Ok(String::new()),
        }
    }

    fn set_component_source(&mut self, name: &str, body: &str) -> Result<()> {
        let project = self.project()?;
        let components = project.get_dispatch("VBComponents")?;
        let item = components.method("Item", &[variant_bstr(name)])?;
        let comp = unsafe { Dispatch(item.Anonymous.Anonymous.Anonymous.pdispVal.as_ref().unwrap().clone()) };
        let module = comp.get_dispatch("CodeModule")?;
        let line_count = unsafe { module.get("CountOfLines")?.Anonymous.Anonymous.Anonymous.lVal };
        if line_count > 0 {
            module.method("DeleteLines", &[variant_i4(1), variant_i4(line_count)])?;
        }
        module.method("AddFromString", &[variant_bstr(body)])?;
        Ok(())
    }

    fn add_component(&mut self, name: &str, body: &str) -> Result<()> {
        let project = self.project()?;
        let components = project.get_dispatch("VBComponents")?;
        // vbext_ct_StdModule == 1
        let item = components.method("Add", &[variant_i4(1)])?;
        let comp = unsafe { Dispatch(item.Anonymous.Anonymous.Anonymous.pdispVal.as_ref().unwrap().clone()) };
        comp.put("Name", variant_bstr(name))?;
        let module = comp.get_dispatch("CodeModule")?;
        module.method("AddFromString", &[variant_bstr(body)])?;
        Ok(())
    }

    fn remove_component(&mut self, name: &str) -> Result<()> {
        let project = self.project()?;
        let components = project.get_dispatch("VBComponents")?;
        let item = components.method("Item", &[variant_bstr(name)])?;
        let comp = unsafe { Dispatch(item.Anonymous.Anonymous.Anonymous.pdispVal.as_ref().unwrap().clone()) };
        components.method("Remove", &[variant_from_value(&AutomationValue::Str(String::new())), ])?;
        let _ = comp;
        Ok(())
    }

    fn force_reparse(&self, name: &str) -> Result<()> {
        let project = self.project()?;
        let components = project.get_dispatch("VBComponents")?;
        let item = components.method("Item", &[variant_bstr(name)])?;
        let comp = unsafe { Dispatch(item.Anonymous.Anonymous.Anonymous.pdispVal.as_ref().unwrap().clone()) };
        let module = comp.get_dispatch("CodeModule")?;
        let line_count = unsafe { module.get("CountOfLines")?.Anonymous.Anonymous.Anonymous.lVal };
        for line in 1..=line_count.max(0) {
            module
                .method("ProcOfLine", &[variant_i4(line), variant_i4(0)])
                .map_err(|e| AutomationError::Validation(format!("line {line}: {e}")))?;
        }
        Ok(())
    }

    fn read_range(&self, sheet: &str, address: &str) -> Result<AutomationValue> {
        let doc = self.document.as_ref().ok_or_else(|| AutomationError::Validation("no document open".into()))?;
        let sheets = doc.get_dispatch("Worksheets")?;
        let item = sheets.method("Item", &[variant_bstr(sheet)])?;
        let ws = unsafe { Dispatch(item.Anonymous.Anonymous.Anonymous.pdispVal.as_ref().unwrap().clone()) };
        let range = ws.method("Range", &[variant_bstr(address)])?;
        let range = unsafe { Dispatch(range.Anonymous.Anonymous.Anonymous.pdispVal.as_ref().unwrap().clone()) };
        let value = range.get("Value")?;
        // A true SAFEARRAY unpack belongs here; callers normalize whatever
        // shape comes back (scalar or array) through `data_io::normalize_2d`.
        Ok(variant_to_value(&value))
    }

    fn write_range(&mut self, sheet: &str, address: &str, values: AutomationValue) -> Result<()> {
        let doc = self.document.as_ref().ok_or_else(|| AutomationError::Validation("no document open".into()))?;
        let sheets = doc.get_dispatch("Worksheets")?;
        let item = sheets.method("Item", &[variant_bstr(sheet)])?;
        let ws = unsafe { Dispatch(item.Anonymous.Anonymous.Anonymous.pdispVal.as_ref().unwrap().clone()) };
        let range = ws.method("Range", &[variant_bstr(address)])?;
        let range = unsafe { Dispatch(range.Anonymous.Anonymous.Anonymous.pdispVal.as_ref().unwrap().clone()) };
        range.put("Value", variant_from_value(&values))
    }

    fn list_sheets_or_tables(&self) -> Result<Vec<String>> {
        let doc = self.document.as_ref().ok_or_else(|| AutomationError::Validation("no document open".into()))?;
        let member = if self.family == AppFamily::Database { "TableDefs" } else { "Worksheets" };
        let collection = doc.get_dispatch(member)?;
        let count = unsafe { collection.get("Count")?.Anonymous.Anonymous.Anonymous.lVal };
        let mut names = Vec::with_capacity(count.max(0) as usize);
        for i in 1..=count {
            let item = collection.method("Item", &[variant_i4(i)])?;
            let obj = unsafe { Dispatch(item.Anonymous.Anonymous.Anonymous.pdispVal.as_ref().unwrap().clone()) };
            if let AutomationValue::Str(name) = variant_to_value(&obj.get("Name")?) {
                names.push(name);
            }
        }
        Ok(names)
    }

    fn execute_sql(&mut self, sql: &str) -> Result<AutomationValue> {
        let doc = self.document.as_ref().ok_or_else(|| AutomationError::Validation("no document open".into()))?;
        let result = doc
            .method("Execute", &[variant_bstr(sql)])
            .map_err(|e| AutomationError::Sql { query: sql.to_string(), reason: e.to_string() })?;
        Ok(variant_to_value(&result))
    }

    fn query_rows(&mut self, sql: &str) -> Result<(Vec<String>, Vec<Vec<AutomationValue>>)> {
        let doc = self.document.as_ref().ok_or_else(|| AutomationError::Validation("no document open".into()))?;
        let recordset = doc
            .method("OpenRecordset", &[variant_bstr(sql)])
            .map_err(|e| AutomationError::Sql { query: sql.to_string(), reason: e.to_string() })?;
        let rs = dispatch_from_variant(&recordset)?;
        let fields = rs.get_dispatch("Fields")?;
        let mut headers = Vec::new();
        for i in 0..fields.count()? {
            let field = fields.item(variant_i4(i))?;
            if let AutomationValue::Str(name) = variant_to_value(&field.get("Name")?) {
                headers.push(name);
            }
        }
        // GetRows returns a field-major SAFEARRAY; unpacking it is the same
        // deferred step as `read_range`'s.
        let rows = crate::data_io::normalize_2d(variant_to_value(&rs.method("GetRows", &[])?));
        let _ = rs.method("Close", &[]);
        Ok((headers, rows))
    }

    fn list_macros(&self) -> Result<Vec<String>> {
        let names = self.list_components()?;
        Ok(names)
    }

    fn run_macro(&mut self, name: &str, args: &[AutomationValue]) -> Result<AutomationValue> {
        let variants: Vec<VARIANT> = args.iter().map(variant_from_value).collect();
        let result = self
            .app
            .method("Run", std::iter::once(variant_bstr(name)).chain(variants).collect::<Vec<_>>().as_slice())?;
        Ok(variant_to_value(&result))
    }

    fn list_tables(&self, sheet: Option<&str>) -> Result<Vec<TableInfo>> {
        let doc = self.document.as_ref().ok_or_else(|| AutomationError::Validation("no document open".into()))?;
        let sheets = doc.get_dispatch("Worksheets")?;
        let mut worksheets = Vec::new();
        if let Some(name) = sheet {
            worksheets.push((name.to_string(), self.worksheet(name)?));
        } else {
            for i in 1..=sheets.count()? {
                let ws = sheets.item(variant_i4(i))?;
                let name = match variant_to_value(&ws.get("Name")?) {
                    AutomationValue::Str(s) => s,
                    _ => i.to_string(),
                };
                worksheets.push((name, ws));
            }
        }
        let mut out = Vec::new();
        for (name, ws) in &worksheets {
            let list_objects = ws.get_dispatch("ListObjects")?;
            for i in 1..=list_objects.count()? {
                let table = list_objects.item(variant_i4(i))?;
                out.push(self.table_info(name, &table)?);
            }
        }
        Ok(out)
    }

    fn create_table(&mut self, sheet: &str, range: &str, table_name: &str, has_headers: bool, style: &str) -> Result<TableInfo> {
        let ws = self.worksheet(sheet)?;
        let list_objects = ws.get_dispatch("ListObjects")?;
        let source_range = dispatch_from_variant(&ws.method("Range", &[variant_bstr(range)])?)?;
        // ListObjects.Add(SourceType, Source, LinkSource, XlListObjectHasHeaders); xlSrcRange == 1.
        let has_headers_flag = variant_i4(if has_headers { 1 } else { 2 });
        let item = list_objects.method(
            "Add",
            &[variant_i4(1), variant_dispatch(&source_range), VARIANT::default(), has_headers_flag],
        )?;
        let table = dispatch_from_variant(&item)?;
        table.put("Name", variant_bstr(table_name))?;
        if let Err(e) = table.put("TableStyle", variant_bstr(style)) {
            tracing::warn!(style, error = %e, "failed to apply table style");
        }
        self.table_info(sheet, &table)
    }

    fn insert_rows(&mut self, sheet: &str, position: u32, count: u32, table_name: Option<&str>) -> Result<u32> {
        let ws = self.worksheet(sheet)?;
        if let Some(name) = table_name {
            let table = ws.get_dispatch("ListObjects")?.item(variant_bstr(name))?;
            let rows = table.get_dispatch("ListRows")?;
            for i in 0..count {
                rows.method("Add", &[variant_i4((position + i) as i32)])?;
            }
            Ok(table.get_dispatch("ListRows")?.count()?.max(0) as u32)
        } else {
            let rows = ws.get_dispatch("Rows")?;
            for i in 0..count {
                rows.item(variant_i4((position + i) as i32))?.method("Insert", &[])?;
            }
            Ok(count)
        }
    }

    fn delete_rows(&mut self, sheet: &str, start_row: u32, end_row: u32, table_name: Option<&str>) -> Result<u32> {
        let ws = self.worksheet(sheet)?;
        if let Some(name) = table_name {
            let table = ws.get_dispatch("ListObjects")?.item(variant_bstr(name))?;
            let rows = table.get_dispatch("ListRows")?;
            for i in (start_row..=end_row).rev() {
                if let Err(e) = rows.item(variant_i4(i as i32)).and_then(|r| r.method("Delete", &[])) {
                    tracing::warn!(row = i, error = %e, "failed to delete table row");
                }
            }
            Ok(table.get_dispatch("ListRows")?.count()?.max(0) as u32)
        } else {
            let address = format!("{start_row}:{end_row}");
            ws.get_dispatch("Rows")?.item(variant_bstr(&address))?.method("Delete", &[])?;
            Ok(end_row - start_row + 1)
        }
    }

    fn insert_columns(
        &mut self,
        sheet: &str,
        position: u32,
        count: u32,
        table_name: Option<&str>,
        header_name: Option<&str>,
    ) -> Result<u32> {
        let ws = self.worksheet(sheet)?;
        if let Some(name) = table_name {
            let table = ws.get_dispatch("ListObjects")?.item(variant_bstr(name))?;
            let columns = table.get_dispatch("ListColumns")?;
            for i in 0..count {
                let col = columns.method("Add", &[variant_i4((position + i) as i32)])?;
                if let Some(header) = header_name {
                    let label = if count > 1 { format!("{header}_{}", i + 1) } else { header.to_string() };
                    dispatch_from_variant(&col)?.put("Name", variant_bstr(&label))?;
                }
            }
            Ok(table.get_dispatch("ListColumns")?.count()?.max(0) as u32)
        } else {
            let columns = ws.get_dispatch("Columns")?;
            for i in 0..count {
                columns.item(variant_i4((position + i) as i32))?.method("Insert", &[])?;
            }
            Ok(count)
        }
    }

    fn delete_columns(&mut self, sheet: &str, columns: &ColumnSelector, table_name: Option<&str>) -> Result<u32> {
        let ws = self.worksheet(sheet)?;
        if let Some(name) = table_name {
            let table = ws.get_dispatch("ListObjects")?.item(variant_bstr(name))?;
            let list_columns = table.get_dispatch("ListColumns")?;
            match columns {
                ColumnSelector::Names(names) => {
                    for col_name in names {
                        if let Err(e) = list_columns.item(variant_bstr(col_name)).and_then(|c| c.method("Delete", &[])) {
                            tracing::warn!(column = col_name, error = %e, "failed to delete table column");
                        }
                    }
                }
                _ => {
                    let n = columns.as_number().unwrap_or(1);
                    list_columns.item(variant_i4(n as i32))?.method("Delete", &[])?;
                }
            }
            Ok(table.get_dispatch("ListColumns")?.count()?.max(0) as u32)
        } else {
            let n = columns
                .as_number()
                .ok_or_else(|| AutomationError::Validation("column names require a table".to_string()))?;
            ws.get_dispatch("Columns")?.item(variant_i4(n as i32))?.method("Delete", &[])?;
            Ok(n)
        }
    }

    fn set_calculation_manual(&mut self, manual: bool) -> Result<()> {
        // xlCalculationManual == -4135, xlCalculationAutomatic == -4105.
        self.app.put("Calculation", variant_i4(if manual { -4135 } else { -4105 }))
    }

    fn recalculate(&mut self) -> Result<()> {
        self.app.method("Calculate", &[]).map(|_| ())
    }

    fn list_queries(&self) -> Result<Vec<QueryInfo>> {
        let db = self.document.as_ref().ok_or_else(|| AutomationError::Validation("no document open".into()))?;
        let querydefs = db.get_dispatch("QueryDefs")?;
        let mut out = Vec::with_capacity(querydefs.count()?.max(0) as usize);
        for i in 0..querydefs.count()? {
            let q = querydefs.item(variant_i4(i))?;
            let name = match variant_to_value(&q.get("Name")?) {
                AutomationValue::Str(s) => s,
                _ => continue,
            };
            let sql = match variant_to_value(&q.get("SQL")?) {
                AutomationValue::Str(s) => s,
                _ => String::new(),
            };
            let type_code = unsafe { q.get("Type")?.Anonymous.Anonymous.Anonymous.lVal };
            out.push(QueryInfo {
                name,
                query_type: query_type_label(type_code).to_string(),
                sql_preview: truncate_preview(&sql, 150),
            });
        }
        Ok(out)
    }

    fn list_db_tables(&self) -> Result<Vec<DbTableInfo>> {
        let db = self.document.as_ref().ok_or_else(|| AutomationError::Validation("no document open".into()))?;
        let tabledefs = db.get_dispatch("TableDefs")?;
        let mut out = Vec::with_capacity(tabledefs.count()?.max(0) as usize);
        for i in 0..tabledefs.count()? {
            let t = tabledefs.item(variant_i4(i))?;
            let name = match variant_to_value(&t.get("Name")?) {
                AutomationValue::Str(s) => s,
                _ => continue,
            };
            let fields_coll = t.get_dispatch("Fields")?;
            let mut fields = Vec::with_capacity(fields_coll.count()?.max(0) as usize);
            for j in 0..fields_coll.count()? {
                let f = fields_coll.item(variant_i4(j))?;
                let fname = match variant_to_value(&f.get("Name")?) {
                    AutomationValue::Str(s) => s,
                    _ => continue,
                };
                let type_code = unsafe { f.get("Type")?.Anonymous.Anonymous.Anonymous.lVal };
                let size = unsafe { f.get("Size").map(|v| v.Anonymous.Anonymous.Anonymous.lVal as i64).unwrap_or(0) };
                let attributes = unsafe { f.get("Attributes").map(|v| v.Anonymous.Anonymous.Anonymous.lVal).unwrap_or(0) };
                // dbAutoIncrField == 16.
                fields.push(FieldInfo {
                    name: fname,
                    type_name: field_type_label(type_code).to_string(),
                    size,
                    auto_increment: attributes & 16 != 0,
                });
            }
            let record_count = match t.get("RecordCount") {
                Ok(v) => match variant_to_value(&v) {
                    AutomationValue::Int(n) if n >= 0 => Some(n as u64),
                    _ => None,
                },
                Err(_) => None,
            };
            out.push(DbTableInfo { name, fields, record_count });
        }
        Ok(out)
    }
}

fn truncate_preview(sql: &str, limit: usize) -> String {
    if sql.chars().count() <= limit {
        sql.to_string()
    } else {
        sql.chars().take(limit).collect()
    }
}

/// Maps a Jet/ACE `QueryDef.Type` constant to the host's own label, the way
/// Access' query-design UI names them.
fn query_type_label(type_code: i32) -> &'static str {
    match type_code {
        0 => "Select",
        16 => "Crosstab",
        32 => "Delete",
        48 => "Update",
        64 => "Append",
        80 => "MakeTable",
        96 => "DataDefinition",
        112 => "SQLPassThrough",
        128 => "Union",
        160 => "Compound",
        224 => "Procedure",
        240 => "Action",
        _ => "Unknown",
    }
}

/// Maps a Jet/ACE `Field.Type` constant to its Access-facing type name.
fn field_type_label(type_code: i32) -> &'static str {
    match type_code {
        1 => "Boolean",
        2 => "Byte",
        3 => "Integer",
        4 => "Long",
        5 => "Currency",
        6 => "Single",
        7 => "Double",
        8 => "Date",
        9 => "Binary",
        10 => "Text",
        11 => "LongBinary",
        12 => "Memo",
        15 => "GUID",
        16 => "BigInt",
        17 => "VarBinary",
        18 => "Char",
        19 => "Numeric",
        20 => "Decimal",
        21 => "Float",
        22 => "Time",
        23 => "TimeStamp",
        _ => "Unknown",
    }
}

impl ComBinding {
    fn resolve_path(&self, target_path: &str) -> Result<Dispatch> {
        // Supports a dotted chain of property/method-zero-arg hops rooted at
        // either "Application" or "Document".
        let mut segments = target_path.split('.');
        let root = segments.next().unwrap_or("Application");
        let mut current = match root {
            "Application" => Dispatch(self.app.0.clone()),
            "Document" => {
                let doc = self.document.as_ref().ok_or_else(|| AutomationError::Validation("no document open".into()))?;
                Dispatch(doc.0.clone())
            }
            other => return Err(AutomationError::Validation(format!("unknown automation root: {other}"))),
        };
        for segment in segments {
            current = current.get_dispatch(segment)?;
        }
        Ok(current)
    }
}

impl Drop for ComBinding {
    fn drop(&mut self) {
        let _ = self.close_file();
    }
}

//! Fallback binding used wherever no platform automation bridge is
//! compiled in (non-Windows targets, or Windows builds without the
//! `automation` feature). Every operation reports
//! [`AutomationError::UnsupportedPlatform`] so the rest of the crate
//! behaves identically whether or not host automation is reachable.
use crate::error::{AutomationError, Result};
use crate::session::{AppFamily, AutomationValue, ColumnSelector, DbTableInfo, HostBinding, QueryInfo, TableInfo};
use std::path::Path;

pub struct StubBinding {
    family: AppFamily,
}

impl StubBinding {
    pub fn new(family: AppFamily) -> Self {
        Self { family }
    }
}

impl HostBinding for StubBinding {
    fn family(&self) -> AppFamily {
        self.family
    }
    fn open(&mut self, _path: &Path, _read_only: bool) -> Result<()> {
        Err(AutomationError::UnsupportedPlatform)
    }
    fn set_visible(&mut self, _visible: bool) -> Result<()> {
        Err(AutomationError::UnsupportedPlatform)
    }
    fn set_display_alerts(&mut self, _alerts: bool) -> Result<()> {
        Err(AutomationError::UnsupportedPlatform)
    }
    fn probe_liveness(&self) -> bool {
        false
    }
    fn save(&mut self) -> Result<()> {
        Err(AutomationError::UnsupportedPlatform)
    }
    fn close_file(&mut self) -> Result<()> {
        Err(AutomationError::UnsupportedPlatform)
    }
    fn quit(&mut self) -> Result<()> {
        Err(AutomationError::UnsupportedPlatform)
    }
    fn invoke(&self, _target_path: &str, _member: &str, _args: &[AutomationValue]) -> Result<AutomationValue> {
        Err(AutomationError::UnsupportedPlatform)
    }
    fn get_property(&self, _target_path: &str, _member: &str) -> Result<AutomationValue> {
        Err(AutomationError::UnsupportedPlatform)
    }
    fn put_property(&self, _target_path: &str, _member: &str, _value: AutomationValue) -> Result<()> {
        Err(AutomationError::UnsupportedPlatform)
    }
    fn list_components(&self) -> Result<Vec<String>> {
        Err(AutomationError::UnsupportedPlatform)
    }
    fn component_source(&self, _name: &str) -> Result<String> {
        Err(AutomationError::UnsupportedPlatform)
    }
    fn set_component_source(&mut self, _name: &str, _body: &str) -> Result<()> {
        Err(AutomationError::UnsupportedPlatform)
    }
    fn add_component(&mut self, _name: &str, _body: &str) -> Result<()> {
        Err(AutomationError::UnsupportedPlatform)
    }
    fn remove_component(&mut self, _name: &str) -> Result<()> {
        Err(AutomationError::UnsupportedPlatform)
    }
    fn force_reparse(&self, _name: &str) -> Result<()> {
        Err(AutomationError::UnsupportedPlatform)
    }
    fn read_range(&self, _sheet: &str, _address: &str) -> Result<AutomationValue> {
        Err(AutomationError::UnsupportedPlatform)
    }
    fn write_range(&mut self, _sheet: &str, _address: &str, _values: AutomationValue) -> Result<()> {
        Err(AutomationError::UnsupportedPlatform)
    }
    fn list_sheets_or_tables(&self) -> Result<Vec<String>> {
        Err(AutomationError::UnsupportedPlatform)
    }
    fn execute_sql(&mut self, _sql: &str) -> Result<AutomationValue> {
        Err(AutomationError::UnsupportedPlatform)
    }
    fn query_rows(&mut self, _sql: &str) -> Result<(Vec<String>, Vec<Vec<AutomationValue>>)> {
        Err(AutomationError::UnsupportedPlatform)
    }
    fn list_macros(&self) -> Result<Vec<String>> {
        Err(AutomationError::UnsupportedPlatform)
    }
    fn run_macro(&mut self, _name: &str, _args: &[AutomationValue]) -> Result<AutomationValue> {
        Err(AutomationError::UnsupportedPlatform)
    }
    fn list_tables(&self, _sheet: Option<&str>) -> Result<Vec<TableInfo>> {
        Err(AutomationError::UnsupportedPlatform)
    }
    fn create_table(&mut self, _sheet: &str, _range: &str, _table_name: &str, _has_headers: bool, _style: &str) -> Result<TableInfo> {
        Err(AutomationError::UnsupportedPlatform)
    }
    fn insert_rows(&mut self, _sheet: &str, _position: u32, _count: u32, _table_name: Option<&str>) -> Result<u32> {
        Err(AutomationError::UnsupportedPlatform)
    }
    fn delete_rows(&mut self, _sheet: &str, _start_row: u32, _end_row: u32, _table_name: Option<&str>) -> Result<u32> {
        Err(AutomationError::UnsupportedPlatform)
    }
    fn insert_columns(
        &mut self,
        _sheet: &str,
        _position: u32,
        _count: u32,
        _table_name: Option<&str>,
        _header_name: Option<&str>,
    ) -> Result<u32> {
        Err(AutomationError::UnsupportedPlatform)
    }
    fn delete_columns(&mut self, _sheet: &str, _columns: &ColumnSelector, _table_name: Option<&str>) -> Result<u32> {
        Err(AutomationError::UnsupportedPlatform)
    }
    fn set_calculation_manual(&mut self, _manual: bool) -> Result<()> {
        Err(AutomationError::UnsupportedPlatform)
    }
    fn recalculate(&mut self) -> Result<()> {
        Err(AutomationError::UnsupportedPlatform)
    }
    fn list_queries(&self) -> Result<Vec<QueryInfo>> {
        Err(AutomationError::UnsupportedPlatform)
    }
    fn list_db_tables(&self) -> Result<Vec<DbTableInfo>> {
        Err(AutomationError::UnsupportedPlatform)
    }
}

/// Builds the platform-appropriate binding: [`crate::com::ComBinding`] on
/// Windows with the `automation` feature enabled, [`StubBinding`]
/// everywhere else.
pub fn default_binding(family: AppFamily) -> Box<dyn HostBinding> {
    #[cfg(all(windows, feature = "automation"))]
    {
        match crate::com::ComBinding::new(family) {
            Ok(binding) => return Box::new(binding),
            Err(_) => return Box::new(StubBinding::new(family)),
        }
    }
    #[cfg(not(all(windows, feature = "automation")))]
    {
        Box::new(StubBinding::new(family))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_reports_unsupported_platform() {
        let mut binding = StubBinding::new(AppFamily::Spreadsheet);
        let err = binding.open(Path::new("book.xlsm"), true).unwrap_err();
        assert!(matches!(err, AutomationError::UnsupportedPlatform));
        assert!(!binding.probe_liveness());
    }
}

//! Data I/O bridge (C12): range and structured-table reads/writes against a
//! live spreadsheet session, and the equivalent query/write path against a
//! live database session.
use crate::error::{AutomationError, Result};
use crate::session::{AutomationValue, ColumnSelector, SessionManager, TableInfo};
use std::path::Path;
use tracing::warn;

/// Refuse any range operation touching more cells than this.
pub const CELL_LIMIT: u64 = 1_000_000;

/// Headers plus body rows, the uniform shape every table/query read
/// normalizes to.
#[derive(Debug, Clone, Default)]
pub struct TableData {
    /// Column headers, in order. Empty when the source had none.
    pub headers: Vec<String>,
    /// Body rows (header row excluded).
    pub rows: Vec<Vec<AutomationValue>>,
}

/// How [`write_table`] reconciles new rows against an existing table.
#[derive(Debug, Clone)]
pub enum WriteMode {
    /// Add `data` as new rows after the table's current body.
    Append,
    /// Delete every existing body row first, then append `data`.
    Replace,
    /// `data`'s columns are named by `column_mapping` (in `data`'s column
    /// order) and reordered onto the table's own header order before being
    /// appended.
    ColumnMapped(Vec<String>),
}

fn check_cell_limit(rows: u64, cols: u64) -> Result<()> {
    let cells = rows * cols;
    if cells > CELL_LIMIT {
        return Err(AutomationError::RangeTooLarge { cells, limit: CELL_LIMIT });
    }
    Ok(())
}

/// Normalizes a host's heterogeneous range/recordset shape (scalar, 1-D
/// tuple, or tuple-of-tuples in the original's terms) to a uniform 2-D grid.
pub fn normalize_2d(value: AutomationValue) -> Vec<Vec<AutomationValue>> {
    match value {
        AutomationValue::Array(rows) => rows,
        AutomationValue::Empty => vec![],
        scalar => vec![vec![scalar]],
    }
}

fn display(value: &AutomationValue) -> String {
    match value {
        AutomationValue::Empty => String::new(),
        AutomationValue::Bool(b) => b.to_string(),
        AutomationValue::Int(i) => i.to_string(),
        AutomationValue::Float(f) => f.to_string(),
        AutomationValue::Str(s) => s.clone(),
        AutomationValue::Array(_) => String::new(),
    }
}

/// Converts a spreadsheet column letter to its 1-based number (A=1, Z=26,
/// AA=27, ...).
pub fn column_letter_to_number(letter: &str) -> u32 {
    letter.to_ascii_uppercase().bytes().fold(0u32, |num, byte| num * 26 + (byte as u32 - 'A' as u32 + 1))
}

/// Converts a 1-based column number back to its spreadsheet letter.
pub fn column_number_to_letter(mut number: u32) -> String {
    let mut letters = Vec::new();
    while number > 0 {
        let remainder = (number - 1) % 26;
        letters.push(b'A' + remainder as u8);
        number = (number - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

/// Reads a rectangular range (or "used range" when `address` is `None`) as a
/// uniform 2-D grid.
pub fn read_range(sessions: &SessionManager, path: &Path, sheet: &str, address: Option<&str>) -> Result<Vec<Vec<AutomationValue>>> {
    let addr = address.unwrap_or("UsedRange");
    let raw = sessions.with_session(path, |s| s.binding().read_range(sheet, addr))?;
    let grid = normalize_2d(raw);
    let cols = grid.first().map(|r| r.len()).unwrap_or(0) as u64;
    check_cell_limit(grid.len() as u64, cols)?;
    Ok(grid)
}

fn find_table(sessions: &SessionManager, path: &Path, sheet: &str, table_name: &str) -> Result<TableInfo> {
    let tables = sessions.with_session(path, |s| s.binding().list_tables(Some(sheet)))?;
    tables
        .into_iter()
        .find(|t| t.name.eq_ignore_ascii_case(table_name))
        .ok_or_else(|| AutomationError::Validation(format!("table '{table_name}' not found on sheet '{sheet}'")))
}

/// Reads a structured table's header row and body, optionally projected to
/// a subset of named columns.
pub fn read_table(
    sessions: &SessionManager,
    path: &Path,
    sheet: &str,
    table_name: &str,
    columns: Option<&[String]>,
) -> Result<TableData> {
    let info = find_table(sessions, path, sheet, table_name)?;
    let raw = sessions.with_session(path, |s| s.binding().read_range(sheet, &info.range))?;
    let mut grid = normalize_2d(raw);

    let headers = if !info.headers.is_empty() {
        if !grid.is_empty() {
            grid.remove(0);
        }
        info.headers
    } else if !grid.is_empty() {
        grid.remove(0).iter().map(display).collect()
    } else {
        vec![]
    };

    let (headers, rows) = match columns {
        Some(wanted) => project(&headers, grid, wanted),
        None => (headers, grid),
    };
    Ok(TableData { headers, rows })
}

fn project(headers: &[String], rows: Vec<Vec<AutomationValue>>, wanted: &[String]) -> (Vec<String>, Vec<Vec<AutomationValue>>) {
    let indices: Vec<usize> = wanted.iter().filter_map(|w| headers.iter().position(|h| h.eq_ignore_ascii_case(w))).collect();
    let projected_headers = indices.iter().map(|&i| headers[i].clone()).collect();
    let projected_rows = rows
        .into_iter()
        .map(|row| indices.iter().filter_map(|&i| row.get(i).cloned()).collect())
        .collect();
    (projected_headers, projected_rows)
}

/// Writes a rectangular grid into `start_cell`'s top-left corner, bracketed
/// by a switch to manual recalculation (restored, and followed by a forced
/// recalculation, on every exit path).
pub fn write_range(sessions: &SessionManager, path: &Path, sheet: &str, start_cell: &str, values: Vec<Vec<AutomationValue>>) -> Result<()> {
    let cols = values.first().map(|r| r.len()).unwrap_or(0) as u64;
    check_cell_limit(values.len() as u64, cols)?;

    sessions.mutate_session(path, |b| b.set_calculation_manual(true))?;
    let _restore = scopeguard::guard((), |_| {
        if let Err(e) = sessions.mutate_session(path, |b| b.set_calculation_manual(false)) {
            warn!(error = %e, "failed to restore automatic recalculation");
        }
    });

    sessions.mutate_session(path, |b| b.write_range(sheet, start_cell, AutomationValue::Array(values)))?;
    sessions.mutate_session(path, |b| b.recalculate())?;
    Ok(())
}

/// Appends, replaces, or column-maps `data` into an existing structured
/// table, returning the table's new body row count.
pub fn write_table(sessions: &SessionManager, path: &Path, sheet: &str, table_name: &str, data: Vec<Vec<AutomationValue>>, mode: WriteMode) -> Result<u32> {
    let info = find_table(sessions, path, sheet, table_name)?;
    let data = match mode {
        WriteMode::Append => data,
        WriteMode::Replace => {
            if info.rows > 0 {
                sessions.mutate_session(path, |b| b.delete_rows(sheet, 1, info.rows, Some(table_name)))?;
            }
            data
        }
        WriteMode::ColumnMapped(source_columns) => remap(&info.headers, &source_columns, data),
    };
    append_rows(sessions, path, sheet, table_name, &info, data)
}

fn remap(table_headers: &[String], source_columns: &[String], data: Vec<Vec<AutomationValue>>) -> Vec<Vec<AutomationValue>> {
    let indices: Vec<Option<usize>> = table_headers.iter().map(|h| source_columns.iter().position(|c| c.eq_ignore_ascii_case(h))).collect();
    data.into_iter()
        .map(|row| indices.iter().map(|idx| idx.and_then(|i| row.get(i).cloned()).unwrap_or(AutomationValue::Empty)).collect())
        .collect()
}

fn append_rows(
    sessions: &SessionManager,
    path: &Path,
    sheet: &str,
    table_name: &str,
    info: &TableInfo,
    data: Vec<Vec<AutomationValue>>,
) -> Result<u32> {
    if data.is_empty() {
        return Ok(info.rows);
    }
    let count = data.len() as u32;
    sessions.mutate_session(path, |b| b.insert_rows(sheet, info.rows + 1, count, Some(table_name)))?;

    if let Some((start_col, _, _, end_row)) = parse_range(&info.range) {
        // `info.range` was read before `insert_rows` grew the table; the
        // newly inserted body rows land immediately after its old end.
        let address = format!("{}{}", column_number_to_letter(start_col), end_row + 1);
        sessions.mutate_session(path, |b| b.write_range(sheet, &address, AutomationValue::Array(data)))?;
    } else {
        warn!(table = table_name, range = %info.range, "could not locate the new rows' address; rows were inserted but left blank");
    }

    Ok(info.rows + count)
}

/// Parses an `A1:D10`-style (or bare `A1`) range address into
/// `(start_col, start_row, end_col, end_row)`, all 1-based.
fn parse_range(address: &str) -> Option<(u32, u32, u32, u32)> {
    let (start, end) = match address.split_once(':') {
        Some((a, b)) => (a, b),
        None => (address, address),
    };
    let (sc, sr) = split_cell(start)?;
    let (ec, er) = split_cell(end)?;
    Some((sc, sr, ec, er))
}

fn split_cell(cell: &str) -> Option<(u32, u32)> {
    let letters_end = cell.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = cell.split_at(letters_end);
    if letters.is_empty() || digits.is_empty() {
        return None;
    }
    Some((column_letter_to_number(letters), digits.parse().ok()?))
}

/// Lists structured tables, optionally restricted to one sheet.
pub fn list_tables(sessions: &SessionManager, path: &Path, sheet: Option<&str>) -> Result<Vec<TableInfo>> {
    sessions.with_session(path, |s| s.binding().list_tables(sheet))
}

/// Converts a range into a named structured table.
pub fn create_table(sessions: &SessionManager, path: &Path, sheet: &str, range: &str, table_name: &str, has_headers: bool, style: &str) -> Result<TableInfo> {
    let existing = sessions.with_session(path, |s| s.binding().list_tables(Some(sheet)))?;
    if existing.iter().any(|t| t.name.eq_ignore_ascii_case(table_name)) {
        return Err(AutomationError::Validation(format!("table '{table_name}' already exists on sheet '{sheet}'")));
    }
    sessions.mutate_session(path, |b| b.create_table(sheet, range, table_name, has_headers, style))
}

/// Inserts `count` rows at `position`, in a worksheet or a named table.
pub fn insert_rows(sessions: &SessionManager, path: &Path, sheet: &str, position: u32, count: u32, table_name: Option<&str>) -> Result<u32> {
    sessions.mutate_session(path, |b| b.insert_rows(sheet, position, count.max(1), table_name))
}

/// Deletes rows `start_row..=end_row`, in a worksheet or a named table.
pub fn delete_rows(sessions: &SessionManager, path: &Path, sheet: &str, start_row: u32, end_row: Option<u32>, table_name: Option<&str>) -> Result<u32> {
    let end = end_row.unwrap_or(start_row);
    sessions.mutate_session(path, |b| b.delete_rows(sheet, start_row, end, table_name))
}

/// A column position as given by a caller: number or letter.
#[derive(Debug, Clone)]
pub enum ColumnPosition {
    /// 1-based column number.
    Number(u32),
    /// Spreadsheet column letter.
    Letter(String),
}

impl ColumnPosition {
    fn resolve(&self) -> u32 {
        match self {
            ColumnPosition::Number(n) => *n,
            ColumnPosition::Letter(l) => column_letter_to_number(l),
        }
    }
}

/// Inserts `count` columns at `position`, in a worksheet or a named table.
pub fn insert_columns(
    sessions: &SessionManager,
    path: &Path,
    sheet: &str,
    position: ColumnPosition,
    count: u32,
    table_name: Option<&str>,
    header_name: Option<&str>,
) -> Result<u32> {
    sessions.mutate_session(path, |b| b.insert_columns(sheet, position.resolve(), count.max(1), table_name, header_name))
}

/// Deletes one or more columns, addressed by number, letter, or (table
/// only) name.
pub fn delete_columns(sessions: &SessionManager, path: &Path, sheet: &str, columns: ColumnSelector, table_name: Option<&str>) -> Result<u32> {
    if matches!(columns, ColumnSelector::Names(_)) && table_name.is_none() {
        return Err(AutomationError::Validation("deleting columns by name requires a table".to_string()));
    }
    sessions.mutate_session(path, |b| b.delete_columns(sheet, &columns, table_name))
}

/// Source of a database read: a raw SQL selection, or a table name to build
/// one from.
#[derive(Debug, Clone)]
pub enum QuerySource<'a> {
    /// A verbatim SQL selection statement.
    Sql(&'a str),
    /// A table name; a `SELECT` is assembled from the remaining parameters.
    Table(&'a str),
}

fn build_select(source: &QuerySource, columns: Option<&[String]>, where_clause: Option<&str>, order_by: Option<&str>, limit: Option<u32>) -> String {
    match source {
        QuerySource::Sql(sql) => sql.to_string(),
        QuerySource::Table(table) => {
            let projection = columns.map(|c| c.join(", ")).unwrap_or_else(|| "*".to_string());
            let top = limit.map(|n| format!("TOP {n} ")).unwrap_or_default();
            let mut sql = format!("SELECT {top}{projection} FROM [{table}]");
            if let Some(w) = where_clause {
                sql.push_str(&format!(" WHERE {w}"));
            }
            if let Some(o) = order_by {
                sql.push_str(&format!(" ORDER BY {o}"));
            }
            sql
        }
    }
}

/// Reads a database table (or runs a raw selection) with optional
/// where/order-by/column-projection/row-limit — the database-session
/// equivalent of [`read_table`].
pub fn read_database(
    sessions: &SessionManager,
    path: &Path,
    source: QuerySource,
    columns: Option<&[String]>,
    where_clause: Option<&str>,
    order_by: Option<&str>,
    limit: Option<u32>,
) -> Result<TableData> {
    let sql = build_select(&source, columns, where_clause, order_by, limit);
    let (headers, rows) = sessions.mutate_session(path, |b| b.query_rows(&sql))?;
    Ok(TableData { headers, rows })
}

/// Writes rows into a database table: append (default) or replace-all-rows.
pub fn write_database_table(sessions: &SessionManager, path: &Path, table: &str, columns: &[String], data: Vec<Vec<AutomationValue>>, replace_all: bool) -> Result<u32> {
    if replace_all {
        sessions.mutate_session(path, |b| b.execute_sql(&format!("DELETE FROM [{table}]")))?;
    }
    let column_list = columns.join(", ");
    let mut affected = 0u32;
    for row in &data {
        let values = row.iter().map(sql_literal).collect::<Vec<_>>().join(", ");
        let sql = format!("INSERT INTO [{table}] ({column_list}) VALUES ({values})");
        sessions.mutate_session(path, |b| b.execute_sql(&sql))?;
        affected += 1;
    }
    Ok(affected)
}

fn sql_literal(value: &AutomationValue) -> String {
    match value {
        AutomationValue::Empty => "NULL".to_string(),
        AutomationValue::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        AutomationValue::Int(i) => i.to_string(),
        AutomationValue::Float(f) => f.to_string(),
        AutomationValue::Str(s) => format!("'{}'", s.replace('\'', "''")),
        AutomationValue::Array(_) => "NULL".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_letters_round_trip_through_double_letters() {
        assert_eq!(column_letter_to_number("A"), 1);
        assert_eq!(column_letter_to_number("Z"), 26);
        assert_eq!(column_letter_to_number("AA"), 27);
        assert_eq!(column_number_to_letter(1), "A");
        assert_eq!(column_number_to_letter(26), "Z");
        assert_eq!(column_number_to_letter(27), "AA");
        assert_eq!(column_number_to_letter(column_letter_to_number("ZZ")), "ZZ");
    }

    #[test]
    fn cell_limit_rejects_oversized_grids() {
        assert!(check_cell_limit(1000, 1000).is_ok());
        assert!(matches!(check_cell_limit(1_000_001, 1), Err(AutomationError::RangeTooLarge { .. })));
    }

    #[test]
    fn parse_range_reads_both_corners() {
        assert_eq!(parse_range("B2:D10"), Some((2, 2, 4, 10)));
        assert_eq!(parse_range("A1"), Some((1, 1, 1, 1)));
        assert_eq!(parse_range("garbage"), None);
    }

    #[test]
    fn projection_keeps_requested_columns_in_order() {
        let headers = vec!["Id".to_string(), "Name".to_string(), "Qty".to_string()];
        let rows = vec![vec![AutomationValue::Int(1), AutomationValue::Str("a".into()), AutomationValue::Int(5)]];
        let (h, r) = project(&headers, rows, &["Qty".to_string(), "Id".to_string()]);
        assert_eq!(h, vec!["Qty", "Id"]);
        assert_eq!(r[0], vec![AutomationValue::Int(5), AutomationValue::Int(1)]);
    }

    #[test]
    fn build_select_assembles_clauses_in_order() {
        let sql = build_select(
            &QuerySource::Table("Customers"),
            Some(&["Name".to_string(), "City".to_string()]),
            Some("City = 'NYC'"),
            Some("Name ASC"),
            Some(10),
        );
        assert_eq!(sql, "SELECT TOP 10 Name, City FROM [Customers] WHERE City = 'NYC' ORDER BY Name ASC");
    }
}

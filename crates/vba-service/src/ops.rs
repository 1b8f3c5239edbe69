//! The closed tool-dispatch surface (C15): one [`Operation`] variant per
//! §6 named tool, each carrying a typed argument struct, all routed through
//! [`execute`] to a single [`OperationOutput`] result type.
use crate::context::ServiceContext;
use crate::error::{Context, Result, ServiceCause};
use std::path::{Path, PathBuf};
use vba_automation::backup::{BackupEntry, BackupManager};
use vba_automation::data_io::{self, ColumnPosition, QuerySource, TableData, WriteMode};
use vba_automation::edit::{self, InjectOutcome};
use vba_automation::invoke::{self, MacroSignature};
use vba_automation::query::{self, ExecuteOutcome};
use vba_automation::session::{AutomationValue, ColumnSelector, DbTableInfo, QueryInfo, TableInfo};
use vba_core::advisor::{self, Family, Summary, Suggestion};
use vba_core::analysis::{self, DependencyHint, Metrics, DEFAULT_TOP_N};
use vba_core::project::{Module, Project};

fn open(path: &Path, op: &'static str) -> Result<Project> {
    vba_core::open_project(path)
        .ctx(op, path)?
        .ok_or_else(|| crate::error::ServiceError {
            operation: op,
            path: path.display().to_string(),
            cause: ServiceCause::Unsupported("no VBA project present".to_string()),
        })
}

fn module_or_all<'a>(project: &'a Project, module_name: Option<&str>, op: &'static str, path: &Path) -> Result<Vec<&'a Module>> {
    match module_name {
        None => Ok(project.modules.iter().collect()),
        Some(name) => analysis::find_module(project, name)
            .map(|m| vec![m])
            .ok_or_else(|| crate::error::ServiceError {
                operation: op,
                path: path.display().to_string(),
                cause: ServiceCause::Core(vba_core::VbaError::ModuleNotFound {
                    name: name.to_string(),
                    available: project.modules.iter().map(|m| m.name.clone()).collect(),
                }),
            }),
    }
}

/// Arguments for [`Operation::ExtractVba`] / [`Operation::ExtractVbaAccess`].
#[derive(Debug, Clone)]
pub struct ExtractVbaArgs {
    /// The container to read.
    pub file: PathBuf,
    /// When set, only this module is returned.
    pub module_name: Option<String>,
}

/// Arguments naming just a container.
#[derive(Debug, Clone)]
pub struct FileArgs {
    /// The container to operate on.
    pub file: PathBuf,
}

/// Arguments for [`Operation::AnalyzeStructure`] / [`Operation::AnalyzeStructureAccess`].
#[derive(Debug, Clone)]
pub struct AnalyzeStructureArgs {
    /// The container to read.
    pub file: PathBuf,
    /// Restricts parsing to one module; `None` analyzes the whole project.
    pub module_name: Option<String>,
}

/// Arguments for [`Operation::InjectVba`].
#[derive(Debug, Clone)]
pub struct InjectVbaArgs {
    /// The container to edit.
    pub file: PathBuf,
    /// The module to create or replace.
    pub module_name: String,
    /// The module's new full source.
    pub code: String,
    /// Whether to take a backup before mutating.
    pub backup: bool,
}

/// Arguments for [`Operation::RefactorVba`].
#[derive(Debug, Clone)]
pub struct RefactorVbaArgs {
    /// The container to read.
    pub file: PathBuf,
    /// Restricts advice to one module; `None` covers the whole project.
    pub module_name: Option<String>,
    /// `"all"`, `"complexity"`, `"naming"`, or `"structure"`.
    pub filter: String,
}

/// Which [`Operation::BackupVba`] action to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupAction {
    /// Takes a new timestamped backup.
    Create,
    /// Lists existing backups, most-recent-first.
    List,
    /// Restores a named backup (after a safety copy of the current file).
    Restore,
    /// Deletes a named backup.
    Delete,
}

/// Arguments for [`Operation::BackupVba`].
#[derive(Debug, Clone)]
pub struct BackupVbaArgs {
    /// The container the backup directory sits alongside.
    pub file: PathBuf,
    /// Which action to run.
    pub action: BackupAction,
    /// Required for `restore`/`delete`.
    pub backup_id: Option<String>,
}

/// Which host family [`Operation::ValidateVbaCode`] is validating for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    /// Excel-family validation.
    Excel,
    /// Word-family validation.
    Word,
}

/// Arguments for [`Operation::ValidateVbaCode`].
#[derive(Debug, Clone)]
pub struct ValidateVbaCodeArgs {
    /// The candidate module source.
    pub code: String,
    /// Which host family it targets; carried through into the report only
    /// (the ASCII/block-balance rules are the same for both).
    pub file_type: FileType,
}

/// Arguments for [`Operation::OpenInOffice`].
#[derive(Debug, Clone)]
pub struct OpenInOfficeArgs {
    /// The container to open.
    pub file: PathBuf,
    /// Whether to open read-only. Defaults to `false`.
    pub read_only: bool,
}

/// Arguments for [`Operation::CloseOfficeFile`].
#[derive(Debug, Clone)]
pub struct CloseOfficeFileArgs {
    /// The open container to close.
    pub file: PathBuf,
    /// Whether to save before closing.
    pub save_changes: bool,
}

/// Arguments for [`Operation::RunMacro`].
#[derive(Debug, Clone)]
pub struct RunMacroArgs {
    /// The container whose macro to run.
    pub file: PathBuf,
    /// `MODULE.NAME` or bare `NAME`.
    pub macro_name: String,
    /// Positional arguments passed to the macro.
    pub arguments: Vec<AutomationValue>,
    /// Whether to temporarily lower automation security for the call.
    pub enable_macros: bool,
}

/// One worksheet/table data selector for [`Operation::GetWorksheetData`].
#[derive(Debug, Clone)]
pub enum DataSelector {
    /// A cell range address, or `None` for the used range.
    Range(Option<String>),
    /// A named structured table (spreadsheet) / table (database).
    Table(String),
    /// A verbatim SQL selection (database only).
    SqlQuery(String),
}

/// Arguments for [`Operation::GetWorksheetData`].
#[derive(Debug, Clone)]
pub struct GetWorksheetDataArgs {
    /// The container to read.
    pub file: PathBuf,
    /// Worksheet (spreadsheet) or ignored (database, which has no sheets).
    pub sheet_name: String,
    /// Which of range/table/SQL to read.
    pub selector: DataSelector,
    /// `WHERE` clause (database table/SQL reads only).
    pub where_clause: Option<String>,
    /// `ORDER BY` clause (database table reads only).
    pub order_by: Option<String>,
    /// Row cap (database table reads only).
    pub limit: Option<u32>,
    /// Column projection (table reads only).
    pub columns: Option<Vec<String>>,
    /// Requests formulas instead of values (spreadsheet range reads only).
    /// Accepted for interface parity with the original tool; `HostBinding`
    /// has one range-read path, so this has no effect yet (see DESIGN.md).
    pub include_formulas: bool,
}

/// How [`Operation::SetWorksheetData`] writes `data`.
#[derive(Debug, Clone)]
pub enum WriteTarget {
    /// Writes a rectangular grid starting at a cell.
    Range(String),
    /// Writes into a named structured table.
    Table { table_name: String, mode: WriteMode },
    /// Writes rows into a database table (append, or replace-all first).
    DatabaseTable { table: String, columns: Vec<String>, replace_all: bool },
}

/// Arguments for [`Operation::SetWorksheetData`].
#[derive(Debug, Clone)]
pub struct SetWorksheetDataArgs {
    /// The container to mutate.
    pub file: PathBuf,
    /// Worksheet name (spreadsheet) / ignored (database).
    pub sheet_name: String,
    /// The grid to write.
    pub data: Vec<Vec<AutomationValue>>,
    /// Where/how to write it.
    pub target: WriteTarget,
}

/// Arguments for [`Operation::ListTables`].
#[derive(Debug, Clone)]
pub struct ListTablesArgs {
    /// The container to read.
    pub file: PathBuf,
    /// Restricts the listing to one sheet.
    pub sheet_name: Option<String>,
}

/// Arguments for [`Operation::InsertRows`].
#[derive(Debug, Clone)]
pub struct InsertRowsArgs {
    /// The container to mutate.
    pub file: PathBuf,
    /// The worksheet to insert into.
    pub sheet_name: String,
    /// 1-based insertion position.
    pub position: u32,
    /// How many rows to insert. Defaults to 1.
    pub count: Option<u32>,
    /// Restricts the insertion to a named table's body.
    pub table_name: Option<String>,
}

/// Arguments for [`Operation::DeleteRows`].
#[derive(Debug, Clone)]
pub struct DeleteRowsArgs {
    /// The container to mutate.
    pub file: PathBuf,
    /// The worksheet to delete from.
    pub sheet_name: String,
    /// 1-based first row to delete.
    pub start_row: u32,
    /// 1-based last row to delete; defaults to `start_row`.
    pub end_row: Option<u32>,
    /// Restricts the deletion to a named table's body.
    pub table_name: Option<String>,
}

/// Arguments for [`Operation::InsertColumns`].
#[derive(Debug, Clone)]
pub struct InsertColumnsArgs {
    /// The container to mutate.
    pub file: PathBuf,
    /// The worksheet to insert into.
    pub sheet_name: String,
    /// Insertion position, by number or letter.
    pub position: ColumnPosition,
    /// How many columns to insert. Defaults to 1.
    pub count: Option<u32>,
    /// Restricts the insertion to a named table.
    pub table_name: Option<String>,
    /// Header text for the new column (table insertions only).
    pub header_name: Option<String>,
}

/// Arguments for [`Operation::DeleteColumns`].
#[derive(Debug, Clone)]
pub struct DeleteColumnsArgs {
    /// The container to mutate.
    pub file: PathBuf,
    /// The worksheet to delete from.
    pub sheet_name: String,
    /// Which column(s) to delete.
    pub column: ColumnSelector,
    /// Restricts the deletion to a named table.
    pub table_name: Option<String>,
}

/// Arguments for [`Operation::CreateTable`].
#[derive(Debug, Clone)]
pub struct CreateTableArgs {
    /// The container to mutate.
    pub file: PathBuf,
    /// The worksheet the range lives on.
    pub sheet_name: String,
    /// The range to convert.
    pub range: String,
    /// The new table's name.
    pub table_name: String,
    /// Whether the range's first row is a header row. Defaults to `true`.
    pub has_headers: bool,
    /// Table style name. Defaults to a host-chosen style when empty.
    pub style: String,
}

/// Arguments for [`Operation::RunAccessQuery`].
#[derive(Debug, Clone)]
pub struct RunAccessQueryArgs {
    /// The container to query.
    pub file: PathBuf,
    /// Runs this saved query by name.
    pub query_name: Option<String>,
    /// Runs this verbatim SQL instead.
    pub sql: Option<String>,
    /// Caps the row count of a selection result.
    pub limit: Option<u32>,
}

/// Arguments for the not-yet-host-backed form-definition tools.
#[derive(Debug, Clone)]
pub struct CreateAccessFormArgs {
    /// The container to mutate.
    pub file: PathBuf,
    /// The new form's name.
    pub form_name: String,
}

/// Arguments for the not-yet-host-backed form-definition tools.
#[derive(Debug, Clone)]
pub struct DeleteAccessFormArgs {
    /// The container to mutate.
    pub file: PathBuf,
    /// The form to delete.
    pub form_name: String,
}

/// Arguments for the not-yet-host-backed form-definition tools.
#[derive(Debug, Clone)]
pub struct FormDefinitionArgs {
    /// The container to operate on.
    pub file: PathBuf,
    /// The form whose definition is exported/imported.
    pub form_name: String,
    /// Where to write/read the plain-text form definition.
    pub definition_path: PathBuf,
}

/// The closed set of tool operations §6 names. Every variant carries its
/// own typed argument struct; dispatch happens through [`execute`].
#[derive(Debug, Clone)]
pub enum Operation {
    /// `extract_vba`.
    ExtractVba(ExtractVbaArgs),
    /// `list_modules`.
    ListModules(FileArgs),
    /// `analyze_structure`.
    AnalyzeStructure(AnalyzeStructureArgs),
    /// `inject_vba`.
    InjectVba(InjectVbaArgs),
    /// `refactor_vba`.
    RefactorVba(RefactorVbaArgs),
    /// `backup_vba`.
    BackupVba(BackupVbaArgs),
    /// `validate_vba_code`.
    ValidateVbaCode(ValidateVbaCodeArgs),
    /// `open_in_office`.
    OpenInOffice(OpenInOfficeArgs),
    /// `close_office_file`.
    CloseOfficeFile(CloseOfficeFileArgs),
    /// `list_open_files`.
    ListOpenFiles,
    /// `run_macro`.
    RunMacro(RunMacroArgs),
    /// `list_macros`.
    ListMacros(FileArgs),
    /// `get_worksheet_data`.
    GetWorksheetData(GetWorksheetDataArgs),
    /// `set_worksheet_data`.
    SetWorksheetData(SetWorksheetDataArgs),
    /// `list_tables`.
    ListTables(ListTablesArgs),
    /// `insert_rows`.
    InsertRows(InsertRowsArgs),
    /// `delete_rows`.
    DeleteRows(DeleteRowsArgs),
    /// `insert_columns`.
    InsertColumns(InsertColumnsArgs),
    /// `delete_columns`.
    DeleteColumns(DeleteColumnsArgs),
    /// `create_table`.
    CreateTable(CreateTableArgs),
    /// `list_access_tables`.
    ListAccessTables(FileArgs),
    /// `list_access_queries`.
    ListAccessQueries(FileArgs),
    /// `run_access_query`.
    RunAccessQuery(RunAccessQueryArgs),
    /// `list_access_forms`. No host-binding surface models Access forms
    /// (see DESIGN.md); always returns [`ServiceCause::Unsupported`].
    ListAccessForms(FileArgs),
    /// `create_access_form`. See [`Operation::ListAccessForms`].
    CreateAccessForm(CreateAccessFormArgs),
    /// `delete_access_form`. See [`Operation::ListAccessForms`].
    DeleteAccessForm(DeleteAccessFormArgs),
    /// `export_form_definition`. See [`Operation::ListAccessForms`].
    ExportFormDefinition(FormDefinitionArgs),
    /// `import_form_definition`. See [`Operation::ListAccessForms`].
    ImportFormDefinition(FormDefinitionArgs),
    /// `extract_vba_access`.
    ExtractVbaAccess(ExtractVbaArgs),
    /// `analyze_structure_access`.
    AnalyzeStructureAccess(AnalyzeStructureArgs),
    /// `compile_vba`.
    CompileVba(FileArgs),
}

/// One extracted module's source and recovered structure.
#[derive(Debug, Clone)]
pub struct ModuleExtract {
    /// The module's name.
    pub name: String,
    /// Its inferred kind label (`"standard"`, `"class"`, ...).
    pub kind: &'static str,
    /// Decompressed source text.
    pub code: String,
    /// `code`'s line count.
    pub line_count: usize,
    /// Names of the public `Sub`/`Function` procedures it declares.
    pub procedures: Vec<String>,
}

/// One compile issue surfaced by [`Operation::CompileVba`].
#[derive(Debug, Clone)]
pub struct CompileIssue {
    /// The component it was found in.
    pub module: String,
    /// The host's error message, at the first line that failed to parse.
    pub message: String,
}

/// Every result shape an [`Operation`] can produce.
#[derive(Debug, Clone)]
pub enum OperationOutput {
    /// `extract_vba`/`extract_vba_access`.
    Extraction(Vec<ModuleExtract>),
    /// `list_modules`.
    Modules(Vec<ModuleExtract>),
    /// `analyze_structure`/`analyze_structure_access`: metrics (with their
    /// own top-offenders view), ranked refactor advice, and best-effort
    /// cross-module call hints (see [`vba_core::analysis::dependency_hints`]).
    Analysis { metrics: Metrics, advice: Vec<Suggestion>, dependency_hints: Vec<DependencyHint> },
    /// `inject_vba`.
    Injection(InjectOutcome),
    /// `refactor_vba`.
    Refactor { suggestions: Vec<Suggestion>, summary: Summary },
    /// `backup_vba` create/restore (one entry) or delete (none).
    Backup(Option<BackupEntry>),
    /// `backup_vba` list.
    Backups(Vec<BackupEntry>),
    /// `validate_vba_code`: `None` means it passed.
    Validation(Option<String>),
    /// `open_in_office`.
    Opened,
    /// `close_office_file`.
    Closed,
    /// `list_open_files`.
    OpenFiles(Vec<PathBuf>),
    /// `run_macro`.
    MacroResult(AutomationValue),
    /// `list_macros`.
    MacroList(Vec<MacroSignature>),
    /// `get_worksheet_data` (range/table reads).
    WorksheetData(TableData),
    /// `get_worksheet_data` (bare range read, no headers to report).
    Grid(Vec<Vec<AutomationValue>>),
    /// `set_worksheet_data`/`insert_rows`/`delete_rows`/`insert_columns` —
    /// rows or columns affected.
    RowsAffected(u32),
    /// `list_tables`.
    Tables(Vec<TableInfo>),
    /// `create_table`.
    TableCreated(TableInfo),
    /// `list_access_tables`.
    AccessTables(Vec<DbTableInfo>),
    /// `list_access_queries`.
    AccessQueries(Vec<QueryInfo>),
    /// `run_access_query`.
    QueryResult(ExecuteOutcome),
    /// `compile_vba`.
    Compiled(Vec<CompileIssue>),
    /// The form-definition tools; always carries an explanatory message.
    Unsupported(String),
}

fn extract_module(module: &Module) -> ModuleExtract {
    let procedures = vba_core::parser::parse_procedures(&module.code)
        .into_iter()
        .filter(|p| p.visibility == vba_core::parser::Visibility::Public)
        .map(|p| p.name)
        .collect();
    ModuleExtract {
        name: module.name.clone(),
        kind: module.kind.label(),
        code: module.code.clone(),
        line_count: module.line_count,
        procedures,
    }
}

fn extract_vba(file: &Path, module_name: Option<&str>, op: &'static str) -> Result<Vec<ModuleExtract>> {
    let project = open(file, op)?;
    let modules = module_or_all(&project, module_name, op, file)?;
    Ok(modules.into_iter().map(extract_module).collect())
}

fn analyze_structure(file: &Path, module_name: Option<&str>, op: &'static str) -> Result<(Metrics, Vec<Suggestion>, Vec<DependencyHint>)> {
    let mut project = open(file, op)?;
    if let Some(name) = module_name {
        let keep = module_or_all(&project, Some(name), op, file)?
            .into_iter()
            .map(|m| m.name.clone())
            .collect::<Vec<_>>();
        project.modules.retain(|m| keep.contains(&m.name));
    }
    let (metrics, procedures) = analysis::analyze(&project, DEFAULT_TOP_N);
    let advice = advisor::advise(&procedures, &Family::matching("all"));
    let dependency_hints = analysis::dependency_hints(&project);
    Ok((metrics, advice, dependency_hints))
}

fn backup_manager(file: &Path) -> BackupManager {
    BackupManager::new(file)
}

const FORM_TOOLS_UNSUPPORTED: &str =
    "Access form automation is not modeled by this workspace's host-binding surface; no form-definition tool is backed by a live session";

/// Runs `op` against `ctx`, returning a uniformly-formatted [`crate::error::ServiceError`] on failure.
pub fn execute(ctx: &ServiceContext, op: Operation) -> Result<OperationOutput> {
    match op {
        Operation::ExtractVba(args) => {
            let modules = extract_vba(&args.file, args.module_name.as_deref(), "extract_vba")?;
            Ok(OperationOutput::Extraction(modules))
        }
        Operation::ExtractVbaAccess(args) => {
            let modules = extract_vba(&args.file, args.module_name.as_deref(), "extract_vba_access")?;
            Ok(OperationOutput::Extraction(modules))
        }
        Operation::ListModules(args) => {
            let project = open(&args.file, "list_modules")?;
            let modules = project.modules.iter().map(extract_module).collect();
            Ok(OperationOutput::Modules(modules))
        }
        Operation::AnalyzeStructure(args) => {
            let (metrics, advice, dependency_hints) = analyze_structure(&args.file, args.module_name.as_deref(), "analyze_structure")?;
            Ok(OperationOutput::Analysis { metrics, advice, dependency_hints })
        }
        Operation::AnalyzeStructureAccess(args) => {
            let (metrics, advice, dependency_hints) = analyze_structure(&args.file, args.module_name.as_deref(), "analyze_structure_access")?;
            Ok(OperationOutput::Analysis { metrics, advice, dependency_hints })
        }
        Operation::InjectVba(args) => {
            let backups = backup_manager(&args.file);
            let outcome = edit::inject_module(ctx.sessions(), &backups, &args.file, &args.module_name, &args.code, args.backup)
                .ctx("inject_vba", &args.file)?;
            Ok(OperationOutput::Injection(outcome))
        }
        Operation::RefactorVba(args) => {
            let mut project = open(&args.file, "refactor_vba")?;
            if let Some(name) = args.module_name.as_deref() {
                let keep = module_or_all(&project, Some(name), "refactor_vba", &args.file)?
                    .into_iter()
                    .map(|m| m.name.clone())
                    .collect::<Vec<_>>();
                project.modules.retain(|m| keep.contains(&m.name));
            }
            let (_, procedures) = analysis::analyze(&project, DEFAULT_TOP_N);
            let families = Family::matching(&args.filter);
            let suggestions = advisor::advise(&procedures, &families);
            let summary = Summary::of(&suggestions);
            Ok(OperationOutput::Refactor { suggestions, summary })
        }
        Operation::BackupVba(args) => {
            let backups = backup_manager(&args.file);
            match args.action {
                BackupAction::Create => {
                    let entry = backups.create().ctx("backup_vba", &args.file)?;
                    Ok(OperationOutput::Backup(Some(entry)))
                }
                BackupAction::List => {
                    let entries = backups.list().ctx("backup_vba", &args.file)?;
                    Ok(OperationOutput::Backups(entries))
                }
                BackupAction::Restore => {
                    let id = args.backup_id.ok_or_else(|| crate::error::ServiceError {
                        operation: "backup_vba",
                        path: args.file.display().to_string(),
                        cause: ServiceCause::Unsupported("restore requires a backup_id".to_string()),
                    })?;
                    backups.restore(&id).ctx("backup_vba", &args.file)?;
                    Ok(OperationOutput::Backup(None))
                }
                BackupAction::Delete => {
                    let id = args.backup_id.ok_or_else(|| crate::error::ServiceError {
                        operation: "backup_vba",
                        path: args.file.display().to_string(),
                        cause: ServiceCause::Unsupported("delete requires a backup_id".to_string()),
                    })?;
                    backups.delete(&id).ctx("backup_vba", &args.file)?;
                    Ok(OperationOutput::Backup(None))
                }
            }
        }
        Operation::ValidateVbaCode(args) => {
            let _ = args.file_type;
            let result = vba_automation::validate::validate_ascii(&args.code)
                .and_then(|_| vba_automation::validate::check_block_balance(&args.code));
            match result {
                Ok(()) => Ok(OperationOutput::Validation(None)),
                Err(e) => Ok(OperationOutput::Validation(Some(e.to_string()))),
            }
        }
        Operation::OpenInOffice(args) => {
            ctx.sessions().get_or_create(&args.file, args.read_only).ctx("open_in_office", &args.file)?;
            Ok(OperationOutput::Opened)
        }
        Operation::CloseOfficeFile(args) => {
            ctx.sessions().close(&args.file, args.save_changes).ctx("close_office_file", &args.file)?;
            Ok(OperationOutput::Closed)
        }
        Operation::ListOpenFiles => Ok(OperationOutput::OpenFiles(ctx.sessions().open_paths())),
        Operation::RunMacro(args) => {
            let value = invoke::invoke_macro(ctx.sessions(), &args.file, &args.macro_name, &args.arguments, args.enable_macros)
                .ctx("run_macro", &args.file)?;
            Ok(OperationOutput::MacroResult(value))
        }
        Operation::ListMacros(args) => {
            let macros = invoke::enumerate_macros(ctx.sessions(), &args.file).ctx("list_macros", &args.file)?;
            Ok(OperationOutput::MacroList(macros))
        }
        Operation::GetWorksheetData(args) => get_worksheet_data(ctx, args),
        Operation::SetWorksheetData(args) => set_worksheet_data(ctx, args),
        Operation::ListTables(args) => {
            let tables = data_io::list_tables(ctx.sessions(), &args.file, args.sheet_name.as_deref()).ctx("list_tables", &args.file)?;
            Ok(OperationOutput::Tables(tables))
        }
        Operation::InsertRows(args) => {
            let rows = data_io::insert_rows(
                ctx.sessions(),
                &args.file,
                &args.sheet_name,
                args.position,
                args.count.unwrap_or(1),
                args.table_name.as_deref(),
            )
            .ctx("insert_rows", &args.file)?;
            Ok(OperationOutput::RowsAffected(rows))
        }
        Operation::DeleteRows(args) => {
            let rows = data_io::delete_rows(ctx.sessions(), &args.file, &args.sheet_name, args.start_row, args.end_row, args.table_name.as_deref())
                .ctx("delete_rows", &args.file)?;
            Ok(OperationOutput::RowsAffected(rows))
        }
        Operation::InsertColumns(args) => {
            let cols = data_io::insert_columns(
                ctx.sessions(),
                &args.file,
                &args.sheet_name,
                args.position,
                args.count.unwrap_or(1),
                args.table_name.as_deref(),
                args.header_name.as_deref(),
            )
            .ctx("insert_columns", &args.file)?;
            Ok(OperationOutput::RowsAffected(cols))
        }
        Operation::DeleteColumns(args) => {
            let cols = data_io::delete_columns(ctx.sessions(), &args.file, &args.sheet_name, args.column, args.table_name.as_deref())
                .ctx("delete_columns", &args.file)?;
            Ok(OperationOutput::RowsAffected(cols))
        }
        Operation::CreateTable(args) => {
            let table = data_io::create_table(ctx.sessions(), &args.file, &args.sheet_name, &args.range, &args.table_name, args.has_headers, &args.style)
                .ctx("create_table", &args.file)?;
            Ok(OperationOutput::TableCreated(table))
        }
        Operation::ListAccessTables(args) => {
            let tables = query::list_tables(ctx.sessions(), &args.file).ctx("list_access_tables", &args.file)?;
            Ok(OperationOutput::AccessTables(tables))
        }
        Operation::ListAccessQueries(args) => {
            let queries = query::list_queries(ctx.sessions(), &args.file).ctx("list_access_queries", &args.file)?;
            Ok(OperationOutput::AccessQueries(queries))
        }
        Operation::RunAccessQuery(args) => {
            let outcome = match (&args.query_name, &args.sql) {
                (Some(name), _) => query::execute_saved(ctx.sessions(), &args.file, name, args.limit),
                (None, Some(sql)) => query::execute(ctx.sessions(), &args.file, sql, args.limit),
                (None, None) => {
                    return Err(crate::error::ServiceError {
                        operation: "run_access_query",
                        path: args.file.display().to_string(),
                        cause: ServiceCause::Unsupported("either query_name or sql is required".to_string()),
                    })
                }
            }
            .ctx("run_access_query", &args.file)?;
            Ok(OperationOutput::QueryResult(outcome))
        }
        Operation::ListAccessForms(args) => Ok(unsupported("list_access_forms", &args.file)),
        Operation::CreateAccessForm(args) => Ok(unsupported("create_access_form", &args.file)),
        Operation::DeleteAccessForm(args) => Ok(unsupported("delete_access_form", &args.file)),
        Operation::ExportFormDefinition(args) => Ok(unsupported("export_form_definition", &args.file)),
        Operation::ImportFormDefinition(args) => Ok(unsupported("import_form_definition", &args.file)),
        Operation::CompileVba(args) => compile_vba(ctx, args),
    }
}

fn unsupported(operation: &'static str, path: &Path) -> OperationOutput {
    tracing::warn!(operation, path = %path.display(), "{FORM_TOOLS_UNSUPPORTED}");
    OperationOutput::Unsupported(FORM_TOOLS_UNSUPPORTED.to_string())
}

fn get_worksheet_data(ctx: &ServiceContext, args: GetWorksheetDataArgs) -> Result<OperationOutput> {
    let family = ctx.sessions().with_session(&args.file, |s| Ok(s.family)).ctx("get_worksheet_data", &args.file)?;
    if family == vba_automation::AppFamily::Database {
        let source_table;
        let source = match &args.selector {
            DataSelector::SqlQuery(sql) => QuerySource::Sql(sql),
            DataSelector::Table(name) => {
                source_table = name.clone();
                QuerySource::Table(&source_table)
            }
            DataSelector::Range(_) => {
                source_table = args.sheet_name.clone();
                QuerySource::Table(&source_table)
            }
        };
        let table = data_io::read_database(
            ctx.sessions(),
            &args.file,
            source,
            args.columns.as_deref(),
            args.where_clause.as_deref(),
            args.order_by.as_deref(),
            args.limit,
        )
        .ctx("get_worksheet_data", &args.file)?;
        return Ok(OperationOutput::WorksheetData(table));
    }

    match args.selector {
        DataSelector::Range(address) => {
            let grid = data_io::read_range(ctx.sessions(), &args.file, &args.sheet_name, address.as_deref()).ctx("get_worksheet_data", &args.file)?;
            Ok(OperationOutput::Grid(grid))
        }
        DataSelector::Table(table_name) => {
            let table = data_io::read_table(ctx.sessions(), &args.file, &args.sheet_name, &table_name, args.columns.as_deref())
                .ctx("get_worksheet_data", &args.file)?;
            Ok(OperationOutput::WorksheetData(table))
        }
        DataSelector::SqlQuery(_) => Err(crate::error::ServiceError {
            operation: "get_worksheet_data",
            path: args.file.display().to_string(),
            cause: ServiceCause::Unsupported("sql_query is only supported against a database container".to_string()),
        }),
    }
}

fn set_worksheet_data(ctx: &ServiceContext, args: SetWorksheetDataArgs) -> Result<OperationOutput> {
    match args.target {
        WriteTarget::Range(start_cell) => {
            data_io::write_range(ctx.sessions(), &args.file, &args.sheet_name, &start_cell, args.data).ctx("set_worksheet_data", &args.file)?;
            Ok(OperationOutput::RowsAffected(0))
        }
        WriteTarget::Table { table_name, mode } => {
            let rows = data_io::write_table(ctx.sessions(), &args.file, &args.sheet_name, &table_name, args.data, mode)
                .ctx("set_worksheet_data", &args.file)?;
            Ok(OperationOutput::RowsAffected(rows))
        }
        WriteTarget::DatabaseTable { table, columns, replace_all } => {
            let rows = data_io::write_database_table(ctx.sessions(), &args.file, &table, &columns, args.data, replace_all)
                .ctx("set_worksheet_data", &args.file)?;
            Ok(OperationOutput::RowsAffected(rows))
        }
    }
}

fn compile_vba(ctx: &ServiceContext, args: FileArgs) -> Result<OperationOutput> {
    ctx.sessions().get_or_create(&args.file, false).ctx("compile_vba", &args.file)?;
    let components = ctx.sessions().with_session(&args.file, |s| s.binding().list_components()).ctx("compile_vba", &args.file)?;
    let mut issues = Vec::new();
    for name in components {
        if let Err(e) = ctx.sessions().with_session(&args.file, |s| s.binding().force_reparse(&name)) {
            issues.push(CompileIssue { module: name, message: e.to_string() });
        }
    }
    Ok(OperationOutput::Compiled(issues))
}

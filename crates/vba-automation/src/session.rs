//! Host-session manager (C10): a process-wide registry of live host
//! application handles, keyed by absolute container path.
use crate::error::{AutomationError, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Which application family a container's suffix maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppFamily {
    /// Spreadsheet host (Excel-equivalent).
    Spreadsheet,
    /// Word-processor host (Word-equivalent).
    Word,
    /// Database host (Access-equivalent).
    Database,
}

/// The narrow capability interface the core requires from a platform
/// automation bridge (§6, "Host-binding capability surface"). Variants
/// (spreadsheet/word/database) share this one interface; family-specific
/// operations are reached through [`HostBinding::invoke`] /
/// [`HostBinding::get_property`] generic late-bound calls, the same way
/// the original implementation drove the host via reflection — just
/// through a typed seam instead of a duck-typed one.
pub trait HostBinding: Send {
    /// Which family this binding drives.
    fn family(&self) -> AppFamily;
    /// Opens `path`, honoring `read_only`.
    fn open(&mut self, path: &Path, read_only: bool) -> Result<()>;
    /// Best-effort; environments that forbid it should tolerate failure.
    fn set_visible(&mut self, visible: bool) -> Result<()>;
    /// Best-effort; environments that forbid it should tolerate failure.
    fn set_display_alerts(&mut self, alerts: bool) -> Result<()>;
    /// A cheap identifying read (application name, document name) used to
    /// detect a dead session. Any failure means dead.
    fn probe_liveness(&self) -> bool;
    /// Saves the open file.
    fn save(&mut self) -> Result<()>;
    /// Closes the open file.
    fn close_file(&mut self) -> Result<()>;
    /// Quits the host application.
    fn quit(&mut self) -> Result<()>;
    /// Invokes a named automation member with positional arguments,
    /// late-bound, the way the original's reflection-based calls worked.
    fn invoke(&self, target_path: &str, member: &str, args: &[AutomationValue]) -> Result<AutomationValue>;
    /// Reads a named automation property, late-bound.
    fn get_property(&self, target_path: &str, member: &str) -> Result<AutomationValue>;
    /// Writes a named automation property, late-bound.
    fn put_property(&self, target_path: &str, member: &str, value: AutomationValue) -> Result<()>;

    /// Names of the project's components (modules, class modules, forms).
    fn list_components(&self) -> Result<Vec<String>>;
    /// The full source text of one component's code module.
    fn component_source(&self, name: &str) -> Result<String>;
    /// Replaces a component's entire code module body.
    fn set_component_source(&mut self, name: &str, body: &str) -> Result<()>;
    /// Adds a new standard module with the given name and body.
    fn add_component(&mut self, name: &str, body: &str) -> Result<()>;
    /// Removes a named component (used for rollback of a created module).
    fn remove_component(&mut self, name: &str) -> Result<()>;
    /// Forces the host's own parser over every line of `name`'s code module
    /// by asking, line by line, which procedure it belongs to — the same
    /// trick the original implementation used to trigger VBA's semantic
    /// checks without a dedicated "compile" verb. Surfaces the host's parser
    /// message as [`AutomationError::Validation`] on the first failure.
    fn force_reparse(&self, name: &str) -> Result<()>;

    /// Reads a rectangular range as a uniform 2-D array (spreadsheet hosts).
    fn read_range(&self, sheet: &str, address: &str) -> Result<AutomationValue>;
    /// Writes a rectangular 2-D array into a range's top-left corner.
    fn write_range(&mut self, sheet: &str, address: &str, values: AutomationValue) -> Result<()>;
    /// Names of worksheets / tables exposed by the host.
    fn list_sheets_or_tables(&self) -> Result<Vec<String>>;

    /// Runs an action SQL statement (`INSERT`/`UPDATE`/`DELETE`/DDL) against
    /// a database session, returning the host's affected-row report.
    fn execute_sql(&mut self, sql: &str) -> Result<AutomationValue>;
    /// Runs a selection query and returns field names alongside row data —
    /// the one recordset operation that needs metadata beyond values.
    fn query_rows(&mut self, sql: &str) -> Result<(Vec<String>, Vec<Vec<AutomationValue>>)>;

    /// Enumerates public callable macro signatures across all components.
    fn list_macros(&self) -> Result<Vec<String>>;
    /// Invokes a macro by its (possibly qualified) name with positional
    /// arguments, returning its result.
    fn run_macro(&mut self, name: &str, args: &[AutomationValue]) -> Result<AutomationValue>;

    /// Lists structured tables (list objects), optionally restricted to one
    /// worksheet.
    fn list_tables(&self, sheet: Option<&str>) -> Result<Vec<TableInfo>>;
    /// Converts a range into a named structured table.
    fn create_table(&mut self, sheet: &str, range: &str, table_name: &str, has_headers: bool, style: &str) -> Result<TableInfo>;
    /// Inserts `count` rows at `position` (1-based), either in the bare
    /// worksheet or within a named table's body.
    fn insert_rows(&mut self, sheet: &str, position: u32, count: u32, table_name: Option<&str>) -> Result<u32>;
    /// Deletes rows `start_row..=end_row` (1-based), either from the bare
    /// worksheet or from a named table's body.
    fn delete_rows(&mut self, sheet: &str, start_row: u32, end_row: u32, table_name: Option<&str>) -> Result<u32>;
    /// Inserts `count` columns at `position` (1-based), either in the bare
    /// worksheet or within a named table.
    fn insert_columns(
        &mut self,
        sheet: &str,
        position: u32,
        count: u32,
        table_name: Option<&str>,
        header_name: Option<&str>,
    ) -> Result<u32>;
    /// Deletes one or more columns, addressed by number, letter, or (table
    /// only) name.
    fn delete_columns(&mut self, sheet: &str, columns: &ColumnSelector, table_name: Option<&str>) -> Result<u32>;
    /// Switches the host between automatic and manual recalculation.
    fn set_calculation_manual(&mut self, manual: bool) -> Result<()>;
    /// Forces a full recalculation pass.
    fn recalculate(&mut self) -> Result<()>;

    /// Lists the current database's saved query definitions (database
    /// hosts only).
    fn list_queries(&self) -> Result<Vec<QueryInfo>>;
    /// Lists the current database's table definitions with field metadata
    /// (database hosts only).
    fn list_db_tables(&self) -> Result<Vec<DbTableInfo>>;
}

/// A structured-table (list-object) descriptor.
#[derive(Debug, Clone)]
pub struct TableInfo {
    /// The table's name.
    pub name: String,
    /// The worksheet it lives on.
    pub sheet: String,
    /// Body row count (excludes the header row).
    pub rows: u32,
    /// Column count.
    pub columns: u32,
    /// Header row values, in order, when headers are enabled.
    pub headers: Vec<String>,
    /// The table's occupied range address.
    pub range: String,
    /// Whether the totals row is shown.
    pub total_row: bool,
}

/// How a column (or columns) is addressed for insert/delete.
#[derive(Debug, Clone)]
pub enum ColumnSelector {
    /// 1-based column number.
    Number(u32),
    /// Spreadsheet column letter (e.g. "A", "AB").
    Letter(String),
    /// Table column names (table operations only).
    Names(Vec<String>),
}

impl ColumnSelector {
    /// Resolves `Number`/`Letter` to a concrete 1-based column number.
    /// `Names` addresses table columns individually and has no single
    /// number, so it resolves to `None`.
    pub fn as_number(&self) -> Option<u32> {
        match self {
            ColumnSelector::Number(n) => Some(*n),
            ColumnSelector::Letter(l) => Some(crate::data_io::column_letter_to_number(l)),
            ColumnSelector::Names(_) => None,
        }
    }
}

/// A saved query definition's summary, as `list-queries` (§4.14) reports it.
#[derive(Debug, Clone)]
pub struct QueryInfo {
    /// The query's name.
    pub name: String,
    /// The host's own query-type label (e.g. "Select", "Append").
    pub query_type: String,
    /// The query's SQL text, truncated to 150 characters.
    pub sql_preview: String,
}

/// One table field's metadata, as `list-tables` (§4.14, database variant)
/// reports it.
#[derive(Debug, Clone)]
pub struct FieldInfo {
    /// The field's name.
    pub name: String,
    /// The host's own type name (e.g. "Long", "Text").
    pub type_name: String,
    /// Declared size (meaningful for text/binary fields).
    pub size: i64,
    /// Whether the host marks this field as auto-incrementing.
    pub auto_increment: bool,
}

/// A database table's summary, as `list-tables` (§4.14, database variant)
/// reports it.
#[derive(Debug, Clone)]
pub struct DbTableInfo {
    /// The table's name.
    pub name: String,
    /// Its fields, in declaration order.
    pub fields: Vec<FieldInfo>,
    /// Record count; `None` when the host could not report it.
    pub record_count: Option<u64>,
}

/// A loosely-typed value crossing the automation boundary — the Rust
/// analogue of the heterogeneous shapes `pywin32` hands back from COM
/// (scalar / 1-D tuple / tuple-of-tuples all collapse to this).
#[derive(Debug, Clone, PartialEq)]
pub enum AutomationValue {
    /// Absence of a value.
    Empty,
    /// A boolean.
    Bool(bool),
    /// A 64-bit integer (COM `Long`/`Long Long` both land here).
    Int(i64),
    /// A double-precision float.
    Float(f64),
    /// A string.
    Str(String),
    /// A rectangular array of values, row-major — the uniform 2-D shape
    /// §4.12 requires range reads/writes to be normalized to.
    Array(Vec<Vec<AutomationValue>>),
}

/// A live handle to a host application that has opened a specific
/// container.
pub struct Session {
    /// Absolute, normalized container path.
    pub path: PathBuf,
    /// Which family this session belongs to.
    pub family: AppFamily,
    /// Whether the session was opened read-only.
    pub read_only: bool,
    opened_at: Instant,
    last_accessed: Mutex<Instant>,
    binding: Box<dyn HostBinding>,
}

impl Session {
    /// Seconds since this session was last touched.
    pub fn idle_seconds(&self) -> u64 {
        self.last_accessed.lock().unwrap().elapsed().as_secs()
    }

    /// Seconds since this session was created.
    pub fn age_seconds(&self) -> u64 {
        self.opened_at.elapsed().as_secs()
    }

    fn touch(&self) {
        *self.last_accessed.lock().unwrap() = Instant::now();
    }

    /// Access to the underlying binding, for the data/invocation/query
    /// bridges. Touches the last-accessed timestamp.
    pub fn binding(&self) -> &dyn HostBinding {
        self.touch();
        self.binding.as_ref()
    }

    /// Mutable access to the underlying binding.
    pub fn binding_mut(&mut self) -> &mut dyn HostBinding {
        self.touch();
        self.binding.as_mut()
    }
}

/// Constructs the right platform binding for a family. Built in as a
/// function pointer so tests can substitute a fake without touching a real
/// host.
pub type BindingFactory = Arc<dyn Fn(AppFamily) -> Box<dyn HostBinding> + Send + Sync>;

/// Tunables for idle eviction (see [`SessionManager::new`]).
#[derive(Debug, Clone, Copy)]
pub struct SessionManagerConfig {
    /// How often the eviction sweep runs. Default 5 minutes.
    pub eviction_interval: Duration,
    /// How long a session may sit idle before eviction. Default 1 hour.
    pub idle_timeout: Duration,
}

impl Default for SessionManagerConfig {
    fn default() -> Self {
        Self {
            eviction_interval: Duration::from_secs(300),
            idle_timeout: Duration::from_secs(3600),
        }
    }
}

/// A process-wide registry of [`Session`]s indexed by absolute path.
///
/// Registry mutations are serialized by a single lock; liveness probes and
/// host operations run outside it, matching §5's concurrency model.
pub struct SessionManager {
    sessions: Mutex<HashMap<String, Session>>,
    factory: BindingFactory,
    config: SessionManagerConfig,
}

fn normalize(path: &Path) -> Result<String> {
    let abs = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    Ok(abs.to_string_lossy().to_ascii_lowercase())
}

impl SessionManager {
    /// Creates a registry; does not start the idle-eviction task (see
    /// [`SessionManager::spawn_idle_eviction`]).
    pub fn new(factory: BindingFactory, config: SessionManagerConfig) -> Arc<Self> {
        Arc::new(Self {
            sessions: Mutex::new(HashMap::new()),
            factory,
            config,
        })
    }

    /// Gets the existing live session for `path`, or creates one.
    ///
    /// Policy: if a cached entry exists and passes the liveness probe,
    /// refresh it and return it. If it exists but is dead, discard it
    /// (without saving) and fall through to creation. Before creating,
    /// probe whether the file is held exclusively by another process.
    pub fn get_or_create(&self, path: &Path, read_only: bool) -> Result<()> {
        let key = normalize(path)?;

        {
            let mut sessions = self.sessions.lock().unwrap();
            if let Some(session) = sessions.get(&key) {
                if session.binding().probe_liveness() {
                    session.touch();
                    debug!(path = %key, "reusing live session");
                    return Ok(());
                }
                warn!(path = %key, "cached session is dead, discarding");
                sessions.remove(&key);
            }
        }

        if !read_only && Self::held_exclusively_elsewhere(path) {
            return Err(AutomationError::Locked {
                path: key,
                reason: "file held by another application, close it and retry".to_string(),
            });
        }

        let family = family_for_suffix(path)?;
        let mut binding = (self.factory)(family);
        binding.open(path, read_only)?;
        let _ = binding.set_visible(false);
        let _ = binding.set_display_alerts(false);

        let session = Session {
            path: path.to_path_buf(),
            family,
            read_only,
            opened_at: Instant::now(),
            last_accessed: Mutex::new(Instant::now()),
            binding,
        };

        let mut sessions = self.sessions.lock().unwrap();
        sessions.insert(key, session);
        Ok(())
    }

    fn held_exclusively_elsewhere(path: &Path) -> bool {
        use std::fs::OpenOptions;
        OpenOptions::new().read(true).write(true).open(path).is_err()
    }

    /// Closes a session: saves first if requested and not read-only, then
    /// releases host-side object references in reverse acquisition order
    /// (file handle, then host) before removing the registry entry.
    pub fn close(&self, path: &Path, save: bool) -> Result<()> {
        let key = normalize(path)?;
        let mut sessions = self.sessions.lock().unwrap();
        if let Some(mut session) = sessions.remove(&key) {
            if save && !session.read_only {
                session.binding_mut().save()?;
            }
            session.binding_mut().close_file()?;
            session.binding_mut().quit()?;
        }
        Ok(())
    }

    /// Closes every session, saving by default.
    pub fn shutdown(&self) {
        let keys: Vec<String> = self.sessions.lock().unwrap().keys().cloned().collect();
        for key in keys {
            let path = PathBuf::from(&key);
            if let Err(e) = self.close(&path, true) {
                warn!(path = %key, error = %e, "error closing session during shutdown");
            }
        }
    }

    /// Runs one idle-eviction sweep: closes any session whose last-accessed
    /// timestamp exceeds the configured timeout, or that fails liveness.
    pub fn evict_idle(&self) {
        let stale: Vec<(String, PathBuf)> = {
            let sessions = self.sessions.lock().unwrap();
            sessions
                .iter()
                .filter(|(_, s)| {
                    s.idle_seconds() > self.config.idle_timeout.as_secs() || !s.binding().probe_liveness()
                })
                .map(|(k, s)| (k.clone(), s.path.clone()))
                .collect()
        };
        for (key, path) in stale {
            info!(path = %key, "evicting idle session");
            let _ = self.close(&path, true);
        }
    }

    /// Spawns a background thread that calls [`SessionManager::evict_idle`]
    /// on `config.eviction_interval`. Returns a handle whose drop does not
    /// stop the thread; use a shutdown flag for cooperative cancellation in
    /// long-running processes.
    pub fn spawn_idle_eviction(self: &Arc<Self>, shutdown: Arc<std::sync::atomic::AtomicBool>) {
        let manager = Arc::clone(self);
        std::thread::spawn(move || {
            while !shutdown.load(std::sync::atomic::Ordering::Relaxed) {
                std::thread::sleep(manager.config.eviction_interval);
                if shutdown.load(std::sync::atomic::Ordering::Relaxed) {
                    break;
                }
                manager.evict_idle();
            }
        });
    }

    /// Number of active sessions, for `list_open_files`.
    pub fn open_paths(&self) -> Vec<PathBuf> {
        self.sessions.lock().unwrap().values().map(|s| s.path.clone()).collect()
    }

    /// Runs `f` against the session for `path`, returning `SessionDead` if
    /// none is registered.
    pub fn with_session<T>(&self, path: &Path, f: impl FnOnce(&Session) -> Result<T>) -> Result<T> {
        let key = normalize(path)?;
        let sessions = self.sessions.lock().unwrap();
        let session = sessions
            .get(&key)
            .ok_or_else(|| AutomationError::SessionDead(key.clone()))?;
        f(session)
    }

    /// Runs `f` against the mutable binding of the session for `path`,
    /// returning `SessionDead` if none is registered. Used by the edit,
    /// data-I/O and invocation bridges for calls that mutate host state.
    pub fn mutate_session<T>(&self, path: &Path, f: impl FnOnce(&mut dyn HostBinding) -> Result<T>) -> Result<T> {
        let key = normalize(path)?;
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions
            .get_mut(&key)
            .ok_or_else(|| AutomationError::SessionDead(key.clone()))?;
        f(session.binding_mut())
    }
}

fn family_for_suffix(path: &Path) -> Result<AppFamily> {
    let suffix = path.extension().and_then(|s| s.to_str()).unwrap_or_default().to_ascii_lowercase();
    match suffix.as_str() {
        "xlsm" | "xltm" | "xlsb" | "xls" => Ok(AppFamily::Spreadsheet),
        "docm" | "dotm" | "doc" | "dot" => Ok(AppFamily::Word),
        "pptm" | "potm" | "ppt" | "pot" => Ok(AppFamily::Word),
        "mdb" | "accdb" => Ok(AppFamily::Database),
        other => Err(AutomationError::Validation(format!("unrecognized suffix: {other}"))),
    }
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// A fake binding for exercising [`SessionManager`] without a real host.
    pub struct FakeBinding {
        pub family: AppFamily,
        pub alive: Arc<AtomicBool>,
        pub saved: Arc<AtomicBool>,
    }

    impl HostBinding for FakeBinding {
        fn family(&self) -> AppFamily {
            self.family
        }
        fn open(&mut self, _path: &Path, _read_only: bool) -> Result<()> {
            Ok(())
        }
        fn set_visible(&mut self, _visible: bool) -> Result<()> {
            Ok(())
        }
        fn set_display_alerts(&mut self, _alerts: bool) -> Result<()> {
            Ok(())
        }
        fn probe_liveness(&self) -> bool {
            self.alive.load(Ordering::Relaxed)
        }
        fn save(&mut self) -> Result<()> {
            self.saved.store(true, Ordering::Relaxed);
            Ok(())
        }
        fn close_file(&mut self) -> Result<()> {
            Ok(())
        }
        fn quit(&mut self) -> Result<()> {
            Ok(())
        }
        fn invoke(&self, _target_path: &str, _member: &str, _args: &[AutomationValue]) -> Result<AutomationValue> {
            Ok(AutomationValue::Empty)
        }
        fn get_property(&self, _target_path: &str, _member: &str) -> Result<AutomationValue> {
            Ok(AutomationValue::Empty)
        }
        fn put_property(&self, _target_path: &str, _member: &str, _value: AutomationValue) -> Result<()> {
            Ok(())
        }
        fn list_components(&self) -> Result<Vec<String>> {
            Ok(vec![])
        }
        fn component_source(&self, _name: &str) -> Result<String> {
            Ok(String::new())
        }
        fn set_component_source(&mut self, _name: &str, _body: &str) -> Result<()> {
            Ok(())
        }
        fn add_component(&mut self, _name: &str, _body: &str) -> Result<()> {
            Ok(())
        }
        fn remove_component(&mut self, _name: &str) -> Result<()> {
            Ok(())
        }
        fn force_reparse(&self, _name: &str) -> Result<()> {
            Ok(())
        }
        fn read_range(&self, _sheet: &str, _address: &str) -> Result<AutomationValue> {
            Ok(AutomationValue::Empty)
        }
        fn write_range(&mut self, _sheet: &str, _address: &str, _values: AutomationValue) -> Result<()> {
            Ok(())
        }
        fn list_sheets_or_tables(&self) -> Result<Vec<String>> {
            Ok(vec![])
        }
        fn execute_sql(&mut self, _sql: &str) -> Result<AutomationValue> {
            Ok(AutomationValue::Empty)
        }
        fn query_rows(&mut self, _sql: &str) -> Result<(Vec<String>, Vec<Vec<AutomationValue>>)> {
            Ok((vec![], vec![]))
        }
        fn list_macros(&self) -> Result<Vec<String>> {
            Ok(vec![])
        }
        fn run_macro(&mut self, _name: &str, _args: &[AutomationValue]) -> Result<AutomationValue> {
            Ok(AutomationValue::Empty)
        }
        fn list_tables(&self, _sheet: Option<&str>) -> Result<Vec<TableInfo>> {
            Ok(vec![])
        }
        fn create_table(&mut self, sheet: &str, range: &str, table_name: &str, has_headers: bool, _style: &str) -> Result<TableInfo> {
            Ok(TableInfo {
                name: table_name.to_string(),
                sheet: sheet.to_string(),
                rows: 0,
                columns: 0,
                headers: vec![],
                range: range.to_string(),
                total_row: false,
            })
        }
        fn insert_rows(&mut self, _sheet: &str, _position: u32, _count: u32, _table_name: Option<&str>) -> Result<u32> {
            Ok(0)
        }
        fn delete_rows(&mut self, _sheet: &str, _start_row: u32, _end_row: u32, _table_name: Option<&str>) -> Result<u32> {
            Ok(0)
        }
        fn insert_columns(
            &mut self,
            _sheet: &str,
            _position: u32,
            _count: u32,
            _table_name: Option<&str>,
            _header_name: Option<&str>,
        ) -> Result<u32> {
            Ok(0)
        }
        fn delete_columns(&mut self, _sheet: &str, _columns: &ColumnSelector, _table_name: Option<&str>) -> Result<u32> {
            Ok(0)
        }
        fn set_calculation_manual(&mut self, _manual: bool) -> Result<()> {
            Ok(())
        }
        fn recalculate(&mut self) -> Result<()> {
            Ok(())
        }
        fn list_queries(&self) -> Result<Vec<QueryInfo>> {
            Ok(vec![])
        }
        fn list_db_tables(&self) -> Result<Vec<DbTableInfo>> {
            Ok(vec![])
        }
    }

    /// The state a [`RecordingBinding`] carries, shared behind a mutex so it
    /// survives the factory rebuilding the binding on every session reopen —
    /// the same way a real host's project model outlives our handle to it.
    #[derive(Default)]
    pub struct Inner {
        pub modules: HashMap<String, String>,
        pub sheets: HashMap<String, Vec<Vec<AutomationValue>>>,
        pub tables: HashMap<String, TableInfo>,
        pub automation_security: i64,
        pub macros_invoked: Vec<String>,
        pub sql_log: Vec<String>,
        pub fail_run_macro: bool,
        pub calculation_manual: bool,
        pub recalculated: u32,
        pub query_results: HashMap<String, (Vec<String>, Vec<Vec<AutomationValue>>)>,
        pub saved_queries: Vec<QueryInfo>,
        pub db_tables: Vec<DbTableInfo>,
    }

    impl Inner {
        pub fn shared() -> Arc<Mutex<Inner>> {
            Arc::new(Mutex::new(Inner {
                automation_security: 2,
                ..Default::default()
            }))
        }
    }

    /// A stateful fake binding backing the edit/data-I/O/invocation/query
    /// bridge tests: modules, sheets and a security level all actually
    /// persist across calls (and across a session being closed and
    /// reopened), the way a real host would, by sharing an `Inner` behind
    /// an `Arc<Mutex<_>>` rather than owning it directly.
    pub struct RecordingBinding {
        pub family: AppFamily,
        pub inner: Arc<Mutex<Inner>>,
    }

    impl RecordingBinding {
        /// A binding with its own private state, for tests that never close
        /// and reopen a session.
        pub fn new(family: AppFamily) -> Self {
            Self::shared(family, Inner::shared())
        }

        /// A binding over caller-supplied shared state, so a factory closure
        /// can hand out a fresh `RecordingBinding` on every reopen that still
        /// sees the same modules/sheets/security level.
        pub fn shared(family: AppFamily, inner: Arc<Mutex<Inner>>) -> Self {
            Self { family, inner }
        }
    }

    impl HostBinding for RecordingBinding {
        fn family(&self) -> AppFamily {
            self.family
        }
        fn open(&mut self, _path: &Path, _read_only: bool) -> Result<()> {
            Ok(())
        }
        fn set_visible(&mut self, _visible: bool) -> Result<()> {
            Ok(())
        }
        fn set_display_alerts(&mut self, _alerts: bool) -> Result<()> {
            Ok(())
        }
        fn probe_liveness(&self) -> bool {
            true
        }
        fn save(&mut self) -> Result<()> {
            Ok(())
        }
        fn close_file(&mut self) -> Result<()> {
            Ok(())
        }
        fn quit(&mut self) -> Result<()> {
            Ok(())
        }
        fn invoke(&self, _target_path: &str, _member: &str, _args: &[AutomationValue]) -> Result<AutomationValue> {
            Ok(AutomationValue::Empty)
        }
        fn get_property(&self, _target_path: &str, member: &str) -> Result<AutomationValue> {
            let inner = self.inner.lock().unwrap();
            if member == "AutomationSecurity" {
                Ok(AutomationValue::Int(inner.automation_security))
            } else {
                Ok(AutomationValue::Empty)
            }
        }
        fn put_property(&self, _target_path: &str, member: &str, value: AutomationValue) -> Result<()> {
            if member == "AutomationSecurity" {
                if let AutomationValue::Int(i) = value {
                    self.inner.lock().unwrap().automation_security = i;
                }
            }
            Ok(())
        }
        fn list_components(&self) -> Result<Vec<String>> {
            Ok(self.inner.lock().unwrap().modules.keys().cloned().collect())
        }
        fn component_source(&self, name: &str) -> Result<String> {
            let inner = self.inner.lock().unwrap();
            inner.modules.get(name).cloned().ok_or_else(|| AutomationError::ModuleNotFound {
                name: name.to_string(),
                available: inner.modules.keys().cloned().collect(),
            })
        }
        fn set_component_source(&mut self, name: &str, body: &str) -> Result<()> {
            self.inner.lock().unwrap().modules.insert(name.to_string(), body.to_string());
            Ok(())
        }
        fn add_component(&mut self, name: &str, body: &str) -> Result<()> {
            self.inner.lock().unwrap().modules.insert(name.to_string(), body.to_string());
            Ok(())
        }
        fn remove_component(&mut self, name: &str) -> Result<()> {
            self.inner.lock().unwrap().modules.remove(name);
            Ok(())
        }
        fn force_reparse(&self, name: &str) -> Result<()> {
            if self.inner.lock().unwrap().modules.contains_key(name) {
                Ok(())
            } else {
                Err(AutomationError::Validation(format!("no such module {name}")))
            }
        }
        fn read_range(&self, sheet: &str, _address: &str) -> Result<AutomationValue> {
            Ok(AutomationValue::Array(self.inner.lock().unwrap().sheets.get(sheet).cloned().unwrap_or_default()))
        }
        fn write_range(&mut self, sheet: &str, _address: &str, values: AutomationValue) -> Result<()> {
            if let AutomationValue::Array(grid) = values {
                self.inner.lock().unwrap().sheets.insert(sheet.to_string(), grid);
            }
            Ok(())
        }
        fn list_sheets_or_tables(&self) -> Result<Vec<String>> {
            Ok(self.inner.lock().unwrap().sheets.keys().cloned().collect())
        }
        fn execute_sql(&mut self, sql: &str) -> Result<AutomationValue> {
            self.inner.lock().unwrap().sql_log.push(sql.to_string());
            Ok(AutomationValue::Int(1))
        }
        fn query_rows(&mut self, sql: &str) -> Result<(Vec<String>, Vec<Vec<AutomationValue>>)> {
            let mut inner = self.inner.lock().unwrap();
            inner.sql_log.push(sql.to_string());
            Ok(inner.query_results.get(sql).cloned().unwrap_or_default())
        }
        fn list_macros(&self) -> Result<Vec<String>> {
            Ok(self.inner.lock().unwrap().modules.keys().cloned().collect())
        }
        fn run_macro(&mut self, name: &str, _args: &[AutomationValue]) -> Result<AutomationValue> {
            let mut inner = self.inner.lock().unwrap();
            inner.macros_invoked.push(name.to_string());
            if inner.fail_run_macro {
                Err(AutomationError::Validation(format!("no such macro {name}")))
            } else {
                Ok(AutomationValue::Str("ok".to_string()))
            }
        }
        fn list_tables(&self, sheet: Option<&str>) -> Result<Vec<TableInfo>> {
            let inner = self.inner.lock().unwrap();
            Ok(inner
                .tables
                .values()
                .filter(|t| sheet.map_or(true, |s| s.eq_ignore_ascii_case(&t.sheet)))
                .cloned()
                .collect())
        }
        fn create_table(&mut self, sheet: &str, range: &str, table_name: &str, has_headers: bool, _style: &str) -> Result<TableInfo> {
            let info = TableInfo {
                name: table_name.to_string(),
                sheet: sheet.to_string(),
                rows: 0,
                columns: 0,
                headers: if has_headers { vec![] } else { vec![] },
                range: range.to_string(),
                total_row: false,
            };
            self.inner.lock().unwrap().tables.insert(table_name.to_string(), info.clone());
            Ok(info)
        }
        fn insert_rows(&mut self, _sheet: &str, _position: u32, count: u32, table_name: Option<&str>) -> Result<u32> {
            let mut inner = self.inner.lock().unwrap();
            if let Some(name) = table_name {
                let table = inner.tables.get_mut(name).ok_or_else(|| AutomationError::Validation(format!("no such table {name}")))?;
                table.rows += count;
                Ok(table.rows)
            } else {
                Ok(count)
            }
        }
        fn delete_rows(&mut self, _sheet: &str, start_row: u32, end_row: u32, table_name: Option<&str>) -> Result<u32> {
            let count = end_row - start_row + 1;
            let mut inner = self.inner.lock().unwrap();
            if let Some(name) = table_name {
                let table = inner.tables.get_mut(name).ok_or_else(|| AutomationError::Validation(format!("no such table {name}")))?;
                table.rows = table.rows.saturating_sub(count);
                Ok(table.rows)
            } else {
                Ok(0)
            }
        }
        fn insert_columns(
            &mut self,
            _sheet: &str,
            _position: u32,
            count: u32,
            table_name: Option<&str>,
            header_name: Option<&str>,
        ) -> Result<u32> {
            let mut inner = self.inner.lock().unwrap();
            if let Some(name) = table_name {
                let table = inner.tables.get_mut(name).ok_or_else(|| AutomationError::Validation(format!("no such table {name}")))?;
                table.columns += count;
                if let Some(header) = header_name {
                    table.headers.push(header.to_string());
                }
                Ok(table.columns)
            } else {
                Ok(count)
            }
        }
        fn delete_columns(&mut self, _sheet: &str, columns: &ColumnSelector, table_name: Option<&str>) -> Result<u32> {
            let mut inner = self.inner.lock().unwrap();
            if let Some(name) = table_name {
                let table = inner.tables.get_mut(name).ok_or_else(|| AutomationError::Validation(format!("no such table {name}")))?;
                let removed = match columns {
                    ColumnSelector::Names(names) => {
                        table.headers.retain(|h| !names.iter().any(|n| n.eq_ignore_ascii_case(h)));
                        names.len() as u32
                    }
                    _ => 1,
                };
                table.columns = table.columns.saturating_sub(removed);
                Ok(table.columns)
            } else {
                Ok(0)
            }
        }
        fn set_calculation_manual(&mut self, manual: bool) -> Result<()> {
            self.inner.lock().unwrap().calculation_manual = manual;
            Ok(())
        }
        fn recalculate(&mut self) -> Result<()> {
            self.inner.lock().unwrap().recalculated += 1;
            Ok(())
        }
        fn list_queries(&self) -> Result<Vec<QueryInfo>> {
            Ok(self.inner.lock().unwrap().saved_queries.clone())
        }
        fn list_db_tables(&self) -> Result<Vec<DbTableInfo>> {
            Ok(self.inner.lock().unwrap().db_tables.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::FakeBinding;
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::NamedTempFile;

    fn factory(alive: Arc<AtomicBool>) -> BindingFactory {
        Arc::new(move |family| {
            Box::new(FakeBinding {
                family,
                alive: Arc::clone(&alive),
                saved: Arc::new(AtomicBool::new(false)),
            }) as Box<dyn HostBinding>
        })
    }

    #[test]
    fn get_or_create_is_idempotent_for_a_live_session() {
        let file = NamedTempFile::with_suffix(".xlsm").unwrap();
        let alive = Arc::new(AtomicBool::new(true));
        let manager = SessionManager::new(factory(alive), SessionManagerConfig::default());
        manager.get_or_create(file.path(), false).unwrap();
        manager.get_or_create(file.path(), false).unwrap();
        assert_eq!(manager.open_paths().len(), 1);
    }

    #[test]
    fn dead_session_is_discarded_and_replaced() {
        let file = NamedTempFile::with_suffix(".xlsm").unwrap();
        let alive = Arc::new(AtomicBool::new(true));
        let manager = SessionManager::new(factory(Arc::clone(&alive)), SessionManagerConfig::default());
        manager.get_or_create(file.path(), false).unwrap();
        alive.store(false, Ordering::Relaxed);
        manager.get_or_create(file.path(), false).unwrap();
        assert_eq!(manager.open_paths().len(), 1);
    }

    #[test]
    fn close_removes_the_session() {
        let file = NamedTempFile::with_suffix(".xlsm").unwrap();
        let alive = Arc::new(AtomicBool::new(true));
        let manager = SessionManager::new(factory(alive), SessionManagerConfig::default());
        manager.get_or_create(file.path(), false).unwrap();
        manager.close(file.path(), true).unwrap();
        assert!(manager.open_paths().is_empty());
    }
}

//! Query bridge (C14): saved-query and table enumeration, and ad-hoc SQL
//! execution, against a live database session.
use crate::error::Result;
use crate::session::{AutomationValue, DbTableInfo, QueryInfo, SessionManager};
use std::path::Path;

/// Whether a SQL statement mutates data/schema (an "action" query) or only
/// reads it (a "selection" query), per §4.14's keyword classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    /// `SELECT` and anything else not recognized as an action verb.
    Selection,
    /// `DELETE`/`UPDATE`/`INSERT`/`DROP`/`ALTER`/`CREATE`/`TRUNCATE`.
    Action,
}

const ACTION_VERBS: &[&str] = &["DELETE", "UPDATE", "INSERT", "DROP", "ALTER", "CREATE", "TRUNCATE"];

/// Classifies `sql` by its leading keyword (case-insensitive, leading
/// whitespace ignored).
pub fn classify(sql: &str) -> QueryKind {
    let first_word = sql.trim_start().split(|c: char| c.is_whitespace()).next().unwrap_or("").to_ascii_uppercase();
    if ACTION_VERBS.contains(&first_word.as_str()) {
        QueryKind::Action
    } else {
        QueryKind::Selection
    }
}

/// The result of [`execute`]: either a selection's rows or an action's
/// affected-row count.
#[derive(Debug, Clone)]
pub enum ExecuteOutcome {
    /// A `SELECT` (or other non-action) statement's headers and rows.
    Rows {
        /// Column names, in order.
        headers: Vec<String>,
        /// Body rows.
        rows: Vec<Vec<AutomationValue>>,
    },
    /// An action statement's affected-row count, as best reported by the
    /// host (a bare integer when it returns one, otherwise `None`).
    Affected(Option<u64>),
}

fn apply_limit(rows: Vec<Vec<AutomationValue>>, limit: Option<u32>) -> Vec<Vec<AutomationValue>> {
    match limit {
        Some(n) => rows.into_iter().take(n as usize).collect(),
        None => rows,
    }
}

/// Runs `sql` against the database session at `path`, branching on
/// [`classify`]: selection queries return headers+rows (optionally capped at
/// `limit`), action queries run once and report an affected-row count.
/// Action-query failures never roll back data; the host's reason is
/// surfaced in [`crate::error::AutomationError::Sql`] verbatim.
pub fn execute(sessions: &SessionManager, path: &Path, sql: &str, limit: Option<u32>) -> Result<ExecuteOutcome> {
    match classify(sql) {
        QueryKind::Selection => {
            let (headers, rows) = sessions.mutate_session(path, |b| b.query_rows(sql))?;
            Ok(ExecuteOutcome::Rows {
                headers,
                rows: apply_limit(rows, limit),
            })
        }
        QueryKind::Action => {
            let result = sessions.mutate_session(path, |b| b.execute_sql(sql))?;
            let affected = match result {
                AutomationValue::Int(n) if n >= 0 => Some(n as u64),
                _ => None,
            };
            Ok(ExecuteOutcome::Affected(affected))
        }
    }
}

/// Runs a saved query by name. The host accepts a query name anywhere it
/// accepts SQL text (`OpenRecordset`/`Execute` both resolve a bare name to
/// its stored definition), so this dispatches on the query's own
/// `query_type` label rather than re-deriving it from the (possibly
/// truncated) SQL preview.
pub fn execute_saved(sessions: &SessionManager, path: &Path, query_name: &str, limit: Option<u32>) -> Result<ExecuteOutcome> {
    let queries = list_queries(sessions, path)?;
    let saved = queries
        .iter()
        .find(|q| q.name.eq_ignore_ascii_case(query_name))
        .ok_or_else(|| crate::error::AutomationError::Validation(format!("no saved query named '{query_name}'")))?;
    if ACTION_VERBS.iter().any(|v| saved.query_type.eq_ignore_ascii_case(v)) || saved.query_type == "Action" {
        let result = sessions.mutate_session(path, |b| b.execute_sql(query_name))?;
        let affected = match result {
            AutomationValue::Int(n) if n >= 0 => Some(n as u64),
            _ => None,
        };
        Ok(ExecuteOutcome::Affected(affected))
    } else {
        let (headers, rows) = sessions.mutate_session(path, |b| b.query_rows(query_name))?;
        Ok(ExecuteOutcome::Rows {
            headers,
            rows: apply_limit(rows, limit),
        })
    }
}

/// Lists saved query definitions, skipping system queries (names beginning
/// with `~`).
pub fn list_queries(sessions: &SessionManager, path: &Path) -> Result<Vec<QueryInfo>> {
    let all = sessions.with_session(path, |s| s.binding().list_queries())?;
    Ok(all.into_iter().filter(|q| !q.name.starts_with('~')).collect())
}

/// Lists database tables with field metadata, skipping system tables (names
/// beginning with `MSys` or `~`).
pub fn list_tables(sessions: &SessionManager, path: &Path) -> Result<Vec<DbTableInfo>> {
    let all = sessions.with_session(path, |s| s.binding().list_db_tables())?;
    Ok(all
        .into_iter()
        .filter(|t| !t.name.starts_with('~') && !t.name.starts_with("MSys"))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::test_support::{Inner, RecordingBinding};
    use crate::session::{AppFamily, BindingFactory, DbTableInfo, FieldInfo, HostBinding, SessionManagerConfig};
    use std::fs;
    use std::sync::{Arc, Mutex};
    use tempfile::NamedTempFile;

    fn manager_with_inner(inner: Arc<Mutex<Inner>>) -> Arc<SessionManager> {
        let factory: BindingFactory =
            Arc::new(move |family| Box::new(RecordingBinding::shared(family, Arc::clone(&inner))) as Box<dyn HostBinding>);
        SessionManager::new(factory, SessionManagerConfig::default())
    }

    fn opened(sessions: &Arc<SessionManager>) -> NamedTempFile {
        let file = NamedTempFile::with_suffix(".accdb").unwrap();
        fs::write(file.path(), b"placeholder").unwrap();
        sessions.get_or_create(file.path(), false).unwrap();
        file
    }

    #[test]
    fn classify_recognizes_every_action_verb_case_insensitively() {
        assert_eq!(classify("select * from T"), QueryKind::Selection);
        assert_eq!(classify("  Select Id from T"), QueryKind::Selection);
        assert_eq!(classify("delete from T"), QueryKind::Action);
        assert_eq!(classify("UPDATE T set x=1"), QueryKind::Action);
        assert_eq!(classify("insert into T values (1)"), QueryKind::Action);
        assert_eq!(classify("DROP TABLE T"), QueryKind::Action);
        assert_eq!(classify("alter table T add column c"), QueryKind::Action);
        assert_eq!(classify("CREATE TABLE T (id int)"), QueryKind::Action);
        assert_eq!(classify("truncate table T"), QueryKind::Action);
    }

    #[test]
    fn selection_queries_return_rows_and_respect_limit() {
        let inner = Inner::shared();
        inner.lock().unwrap().query_results.insert(
            "SELECT * FROM Customers".to_string(),
            (
                vec!["Id".to_string(), "Name".to_string()],
                vec![
                    vec![AutomationValue::Int(1), AutomationValue::Str("A".into())],
                    vec![AutomationValue::Int(2), AutomationValue::Str("B".into())],
                ],
            ),
        );
        let sessions = manager_with_inner(inner);
        let file = opened(&sessions);

        let outcome = execute(&sessions, file.path(), "SELECT * FROM Customers", Some(1)).unwrap();
        match outcome {
            ExecuteOutcome::Rows { headers, rows } => {
                assert_eq!(headers, vec!["Id", "Name"]);
                assert_eq!(rows.len(), 1);
            }
            other => panic!("expected Rows, got {other:?}"),
        }
    }

    #[test]
    fn action_queries_report_affected_count() {
        let sessions = manager_with_inner(Inner::shared());
        let file = opened(&sessions);
        let outcome = execute(&sessions, file.path(), "DELETE FROM Customers WHERE Id = 1", None).unwrap();
        assert!(matches!(outcome, ExecuteOutcome::Affected(_)));
    }

    #[test]
    fn list_queries_skips_system_entries() {
        let inner = Inner::shared();
        inner.lock().unwrap().saved_queries = vec![
            QueryInfo { name: "RegularQuery".into(), query_type: "Select".into(), sql_preview: "SELECT 1".into() },
            QueryInfo { name: "~tmpQuery".into(), query_type: "Select".into(), sql_preview: "SELECT 2".into() },
        ];
        let sessions = manager_with_inner(inner);
        let file = opened(&sessions);
        let queries = list_queries(&sessions, file.path()).unwrap();
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].name, "RegularQuery");
    }

    #[test]
    fn list_tables_skips_system_and_msys_entries() {
        let inner = Inner::shared();
        inner.lock().unwrap().db_tables = vec![
            DbTableInfo {
                name: "Customers".into(),
                fields: vec![FieldInfo { name: "Id".into(), type_name: "Long".into(), size: 4, auto_increment: true }],
                record_count: Some(3),
            },
            DbTableInfo { name: "MSysObjects".into(), fields: vec![], record_count: None },
            DbTableInfo { name: "~tmpTable".into(), fields: vec![], record_count: None },
        ];
        let sessions = manager_with_inner(inner);
        let file = opened(&sessions);
        let tables = list_tables(&sessions, file.path()).unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].name, "Customers");
        assert!(tables[0].fields[0].auto_increment);
    }

    #[test]
    fn execute_saved_dispatches_on_the_queries_own_type_label() {
        let inner = Inner::shared();
        {
            let mut guard = inner.lock().unwrap();
            guard.saved_queries = vec![
                QueryInfo { name: "TopCustomers".into(), query_type: "Select".into(), sql_preview: "SELECT TOP 5 * FROM Customers".into() },
                QueryInfo { name: "PurgeOld".into(), query_type: "Delete".into(), sql_preview: "DELETE FROM Customers WHERE Old".into() },
            ];
            guard.query_results.insert(
                "TopCustomers".to_string(),
                (vec!["Id".to_string()], vec![vec![AutomationValue::Int(1)]]),
            );
        }
        let sessions = manager_with_inner(inner);
        let file = opened(&sessions);

        let selection = execute_saved(&sessions, file.path(), "TopCustomers", None).unwrap();
        assert!(matches!(selection, ExecuteOutcome::Rows { .. }));

        let action = execute_saved(&sessions, file.path(), "PurgeOld", None).unwrap();
        assert!(matches!(action, ExecuteOutcome::Affected(_)));

        let missing = execute_saved(&sessions, file.path(), "NoSuchQuery", None);
        assert!(missing.is_err());
    }

    #[test]
    fn family_is_database_for_accdb() {
        let sessions = manager_with_inner(Inner::shared());
        let file = opened(&sessions);
        let family = sessions.with_session(file.path(), |s| Ok(s.family)).unwrap();
        assert_eq!(family, AppFamily::Database);
    }
}

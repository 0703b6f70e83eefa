use async_trait::async_trait;
use duckdb::Connection;
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use tracing::debug;
use uuid::Uuid;

use super::{LoadReport, TableLoader};
use crate::error::{PipelineError, Result};
use crate::schema::{ColumnType, TRANSACTION_COLUMNS};

/// Local stand-in for the warehouse: a DuckDB table with the transaction
/// schema, fed by files from a [`LocalStore`](crate::storage::LocalStore).
pub struct DuckDbLoader {
    conn: Mutex<Connection>,
    table: String,
}

impl std::fmt::Debug for DuckDbLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DuckDbLoader<{}>", self.table)
    }
}

fn sql_type(ty: ColumnType) -> &'static str {
    match ty {
        ColumnType::Integer => "BIGINT",
        ColumnType::String => "VARCHAR",
        ColumnType::Float => "DOUBLE",
        ColumnType::Date => "DATE",
    }
}

fn quote_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

impl DuckDbLoader {
    /// Open (or create) the database at `path`, in memory when `None`, and
    /// make sure `table` exists.
    pub fn open(path: Option<&Path>, table: &str) -> Result<Self> {
        if table.is_empty() || !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(PipelineError::load_job(table, "table name must be [A-Za-z0-9_]+"));
        }
        let conn = match path {
            Some(p) => Connection::open(p),
            None => Connection::open_in_memory(),
        }
        .map_err(|e| PipelineError::load_job(table, e))?;

        let columns = TRANSACTION_COLUMNS
            .iter()
            .map(|c| {
                let not_null = if c.required { " NOT NULL" } else { "" };
                format!("{} {}{}", c.name, sql_type(c.ty), not_null)
            })
            .collect::<Vec<_>>()
            .join(",\n    ");
        let ddl = format!("CREATE TABLE IF NOT EXISTS {table} (\n    {columns}\n);");
        conn.execute_batch(&ddl)
            .map_err(|e| PipelineError::load_job(table, e))?;

        Ok(Self {
            conn: Mutex::new(conn),
            table: table.to_string(),
        })
    }

    /// Rows currently in the table.
    pub fn row_count(&self) -> Result<u64> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let n: i64 = conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", self.table), [], |r| r.get(0))
            .map_err(|e| PipelineError::load_job(&self.table, e))?;
        Ok(n as u64)
    }

    fn insert_sql(&self, path: &str) -> String {
        // Positional: the header row is skipped, never matched by name.
        let columns = TRANSACTION_COLUMNS
            .iter()
            .map(|c| format!("{}: {}", quote_literal(c.name), quote_literal(sql_type(c.ty))))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "INSERT INTO {table} SELECT * FROM read_csv({path}, header = true, delim = ',', \
             quote = '\"', dateformat = '%Y-%m-%d', columns = {{{columns}}});",
            table = self.table,
            path = quote_literal(path),
        )
    }
}

#[async_trait]
impl TableLoader for DuckDbLoader {
    async fn append_csv(&self, source_uri: &str) -> Result<LoadReport> {
        let path = source_uri.strip_prefix("file://").unwrap_or(source_uri);
        if !Path::new(path).is_file() {
            return Err(PipelineError::load_job(source_uri, "source is not a local file"));
        }
        let sql = self.insert_sql(path);
        let job_id = format!("duckdb_{}", Uuid::new_v4().simple());

        // A single INSERT .. SELECT is atomic: a bad row aborts the whole file.
        let rows = {
            let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
            conn.execute(&sql, [])
                .map_err(|e| PipelineError::load_job(source_uri, e))?
        };
        debug!(job_id = %job_id, rows, table = %self.table, "appended");
        Ok(LoadReport {
            job_id,
            rows: Some(rows as u64),
        })
    }

    fn destination(&self) -> String {
        format!("duckdb:{}", self.table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const HEADER: &str =
        "transaction_id,product_name,category,price,quantity,date,customer_name,customer_email\n";

    #[tokio::test]
    async fn appends_cleaned_csv() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let file = dir.path().join("a_cleaned.csv");
        std::fs::write(
            &file,
            format!("{HEADER}1,Mouse,Tech,19.99,2,2024-01-05,\"Doe, Jane\",\n0,Unknown Product,Tech,5.0,0,2024-01-06,,\n"),
        )?;

        let loader = DuckDbLoader::open(None, "transactions")?;
        let report = loader.append_csv(&file.display().to_string()).await?;
        assert_eq!(report.rows, Some(2));

        let again = loader.append_csv(&file.display().to_string()).await?;
        assert_eq!(again.rows, Some(2));
        assert_eq!(loader.row_count()?, 4);
        Ok(())
    }

    #[tokio::test]
    async fn a_bad_row_aborts_the_whole_file() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let file = dir.path().join("bad.csv");
        std::fs::write(
            &file,
            format!("{HEADER}1,Mouse,Tech,19.99,2,2024-01-05,,\n2,Desk,Home,,1,2024-01-06,,\n"),
        )?;

        let loader = DuckDbLoader::open(None, "transactions")?;
        let err = loader.append_csv(&file.display().to_string()).await.unwrap_err();
        assert!(matches!(err, PipelineError::LoadJob { .. }));
        assert_eq!(loader.row_count()?, 0);
        Ok(())
    }

    #[test]
    fn rejects_unsafe_table_names() {
        assert!(DuckDbLoader::open(None, "t; DROP TABLE x").is_err());
    }
}

use crate::db::connection::DbPool;
use backup_engine::models::DataType;

/// Columns shared by every record table, including restore targets.
pub const RECORD_COLUMNS: &str = "
  id TEXT PRIMARY KEY,
  tenant_id TEXT,
  payload TEXT NOT NULL DEFAULT '{}',
  updated_at INTEGER NOT NULL
";

pub fn create_record_table(conn: &rusqlite::Connection, table: &str) -> rusqlite::Result<()> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {table} ({RECORD_COLUMNS});
         CREATE INDEX IF NOT EXISTS idx_{table}_updated_at ON {table}(updated_at);"
    ))
}

pub fn migrate(pool: &DbPool) -> anyhow::Result<()> {
    let conn = pool.get()?;
    for data_type in DataType::ALL {
        create_record_table(&conn, data_type.as_str())?;
    }
    tracing::info!(tables = DataType::ALL.len(), "Database schema ready");
    Ok(())
}

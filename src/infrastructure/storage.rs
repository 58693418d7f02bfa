use crate::error::ScheduleResult;
use rusqlite::Connection;
use std::path::Path;

const SCHEMA_SQL: &str = include_str!("../../sql/schema.sql");

pub fn initialize_database(path: &Path) -> ScheduleResult<()> {
    let connection = Connection::open(path)?;
    apply_schema(&connection)
}

pub fn apply_schema(connection: &Connection) -> ScheduleResult<()> {
    connection.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

pub fn open_connection(path: &Path) -> ScheduleResult<Connection> {
    let connection = Connection::open(path)?;
    connection.busy_timeout(std::time::Duration::from_secs(5))?;
    connection.pragma_update(None, "foreign_keys", "ON")?;
    Ok(connection)
}

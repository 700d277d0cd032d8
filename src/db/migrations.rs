use anyhow::{bail, Context, Result};
use log::info;
use rusqlite::Connection;

/// Schema steps in order; entry `n` upgrades `user_version` from `n` to `n + 1`.
const MIGRATIONS: &[(&str, &str)] = &[("schema_v1.sql", include_str!("schemas/schema_v1.sql"))];

fn schema_version(conn: &Connection) -> Result<usize> {
    let version: i64 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .context("failed to read user_version pragma")?;
    usize::try_from(version).with_context(|| format!("invalid user_version {version}"))
}

/// Brings the schema up to date, one transaction per step so a failed step
/// leaves the earlier ones applied.
pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    let latest = MIGRATIONS.len();
    let mut version = schema_version(conn)?;

    if version > latest {
        bail!("history database schema v{version} is newer than this build (v{latest})");
    }

    for (name, sql) in &MIGRATIONS[version..] {
        let tx = conn.transaction()?;
        tx.execute_batch(sql)
            .with_context(|| format!("failed to apply {name}"))?;
        version += 1;
        tx.pragma_update(None, "user_version", version as i64)?;
        tx.commit()
            .with_context(|| format!("failed to commit {name}"))?;
        info!("history database migrated to v{version}");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kv_table_count(conn: &Connection) -> i64 {
        conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'kv_entries'",
            [],
            |row| row.get(0),
        )
        .unwrap()
    }

    #[test]
    fn fresh_database_reaches_latest_schema() {
        let mut conn = Connection::open_in_memory().unwrap();
        run_migrations(&mut conn).unwrap();

        assert_eq!(schema_version(&conn).unwrap(), MIGRATIONS.len());
        assert_eq!(kv_table_count(&conn), 1);
    }

    #[test]
    fn rerunning_is_a_no_op() {
        let mut conn = Connection::open_in_memory().unwrap();
        run_migrations(&mut conn).unwrap();
        conn.execute(
            "INSERT INTO kv_entries (key, value, updated_at) VALUES ('k', 'v', 'now')",
            [],
        )
        .unwrap();

        run_migrations(&mut conn).unwrap();
        let value: String = conn
            .query_row("SELECT value FROM kv_entries WHERE key = 'k'", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(value, "v");
    }

    #[test]
    fn refuses_newer_schema() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "user_version", MIGRATIONS.len() as i64 + 1)
            .unwrap();

        let err = run_migrations(&mut conn).unwrap_err();
        assert!(err.to_string().contains("newer than this build"));
        assert_eq!(kv_table_count(&conn), 0);
    }
}

use rusqlite::{Connection, OptionalExtension, params};

use crate::error::Result;
use crate::store::repo::StateRepository;

pub struct SqliteRepo {
    conn: Connection,
}

impl SqliteRepo {
    pub fn open(path: &std::path::Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let repo = Self { conn };
        repo.migrate()?;
        Ok(repo)
    }

    fn migrate(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS meta (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }
}

impl StateRepository for SqliteRepo {
    fn get_text(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(r#"SELECT value FROM meta WHERE key=?1"#, params![key], |r| {
                r.get(0)
            })
            .optional()?;
        Ok(value)
    }

    fn set_many(&self, entries: &[(&str, &str)]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO meta (key, value) VALUES (?1, ?2)
                ON CONFLICT(key) DO UPDATE SET value=excluded.value
                "#,
            )?;
            for (k, v) in entries {
                stmt.execute(params![k, v])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn remove_many(&self, keys: &[&str]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(r#"DELETE FROM meta WHERE key=?1"#)?;
            for k in keys {
                stmt.execute(params![k])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.db");
        {
            let repo = SqliteRepo::open(&path).unwrap();
            repo.set_many(&[("a", "1"), ("b", "two")]).unwrap();
            repo.set_i64("a", 5).unwrap();
        }
        let repo = SqliteRepo::open(&path).unwrap();
        assert_eq!(repo.get_i64("a").unwrap(), Some(5));
        assert_eq!(repo.get_text("b").unwrap().as_deref(), Some("two"));

        repo.remove_many(&["a", "b", "missing"]).unwrap();
        assert_eq!(repo.get_text("a").unwrap(), None);
        assert_eq!(repo.get_text("b").unwrap(), None);
    }
}

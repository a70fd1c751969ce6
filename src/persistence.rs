use crate::subscription::{LastNotified, LastNotifiedStore};
use anyhow::Result;
use rusqlite::{named_params, params, Connection, OptionalExtension};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

pub struct Database {
    path: PathBuf,
    conn: Mutex<Connection>,
}

impl Database {
    pub fn from_path(path: PathBuf) -> Result<Database> {
        let connection = Connection::open(&path)?;
        Ok(Self {
            path,
            conn: Mutex::new(connection),
        })
    }

    pub fn init(&self) -> Result<()> {
        info!("Creating database at {}", self.path.display());
        self.connection()
            .execute_batch(include_str!("../sql/schema.sql"))?;
        Ok(())
    }

    fn connection(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl LastNotifiedStore for Database {
    fn load(&self, key: &str) -> Result<Option<LastNotified>> {
        let conn = self.connection();
        let mut stmt = conn.prepare_cached(
            "SELECT date, identifier, onset, expires, fingerprint \
             FROM last_notified WHERE subscription = (?)",
        )?;
        let record = stmt
            .query_row(params![key], |row| {
                Ok(LastNotified {
                    date: row.get(0)?,
                    identifier: row.get(1)?,
                    onset: row.get(2)?,
                    expires: row.get(3)?,
                    fingerprint: row.get(4)?,
                })
            })
            .optional()?;
        Ok(record)
    }

    fn save(&self, key: &str, record: &LastNotified) -> Result<()> {
        debug!(
            "Saving last notification {} for {} in {}",
            record.identifier,
            key,
            self.path.display()
        );
        let conn = self.connection();
        let mut stmt = conn.prepare_cached(include_str!("../sql/save_last_notified.sql"))?;
        stmt.execute(named_params! {
            ":subscription": key,
            ":date": record.date,
            ":identifier": record.identifier,
            ":onset": record.onset,
            ":expires": record.expires,
            ":fingerprint": record.fingerprint,
        })?;
        Ok(())
    }
}

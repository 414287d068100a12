use std::path::Path;

use indoc::indoc;
use miette::{Context, IntoDiagnostic, Result};
use rusqlite::{params, Connection};
use time::OffsetDateTime;
use tracing::debug;

use super::CandidateStore;
use crate::types::ClipCandidate;

#[derive(Debug)]
pub struct Sqlite {
    conn: Connection,
}

impl CandidateStore for Sqlite {
    fn read_or_create(p: &Path) -> Result<Self> {
        let store = Self {
            conn: Connection::open(p)
                .into_diagnostic()
                .wrap_err("Could not open sqlite file")?,
        };

        store.create_tables().wrap_err("Could not create tables")?;

        Ok(store)
    }

    fn replace_all(&mut self, candidates: &[ClipCandidate]) -> Result<()> {
        let discovered_at = OffsetDateTime::now_utc().unix_timestamp();
        let tx = self
            .conn
            .transaction()
            .into_diagnostic()
            .wrap_err("Could not start transaction")?;

        debug!("Deleting all previously discovered candidates");
        tx.execute("DELETE FROM candidates", [])
            .into_diagnostic()
            .wrap_err("Could not delete previous candidates")?;

        debug!("Inserting {} new candidates", candidates.len());
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO candidates (channel, clip_ref, views, discovered_at)
                    VALUES (?, ?, ?, ?)",
                )
                .into_diagnostic()?;

            for cand in candidates {
                let views = i64::try_from(cand.views)
                    .into_diagnostic()
                    .wrap_err_with(|| format!("View count of {} is too large", cand.clip_ref))?;

                stmt.execute(params![cand.channel, cand.clip_ref, views, discovered_at])
                    .into_diagnostic()
                    .wrap_err_with(|| format!("Could not insert candidate {}", cand.clip_ref))?;
            }
        }

        tx.commit()
            .into_diagnostic()
            .wrap_err("Could not commit new candidates")
    }

    fn load_all(&self) -> Result<Vec<ClipCandidate>> {
        let mut stmt = self
            .conn
            .prepare("SELECT channel, clip_ref, views FROM candidates ORDER BY id")
            .into_diagnostic()?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })
            .into_diagnostic()
            .wrap_err("Could not query candidate rows")?;

        let mut candidates = Vec::new();
        for row in rows {
            let (channel, clip_ref, views) = row
                .into_diagnostic()
                .wrap_err("Malformed candidate row")?;
            candidates.push(ClipCandidate::from_record(channel, clip_ref, views)?);
        }

        Ok(candidates)
    }

    fn count(&self) -> Result<usize> {
        self.conn
            .query_row("SELECT COUNT(id) FROM candidates", [], |row| row.get(0))
            .into_diagnostic()
    }
}

impl Sqlite {
    /// Create the tables if they do not already exist
    fn create_tables(&self) -> Result<()> {
        self.conn
            .execute_batch(indoc! {"
                BEGIN;
                CREATE TABLE IF NOT EXISTS candidates (
                    id              INTEGER PRIMARY KEY,
                    channel         TEXT NOT NULL,
                    clip_ref        TEXT NOT NULL UNIQUE,
                    views           INTEGER NOT NULL,
                    discovered_at   INTEGER
                );
                COMMIT;
            "})
            .into_diagnostic()?;
        Ok(())
    }
}

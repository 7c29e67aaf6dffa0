use std::path::Path;

use rusqlite::Connection;
use tracing::{error, info};

use crate::error::Result;
use crate::model::ResultSet;

pub const DEFAULT_DB_PATH: &str = "data/companies.sqlite";

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    Ok(conn)
}

/// Column widths follow the registry limits; SQLite only enforces them through the CHECKs.
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS companies (
            id            INTEGER PRIMARY KEY,
            company_name  VARCHAR(155) CHECK (length(company_name) <= 155),
            okved         VARCHAR(155) CHECK (length(okved) <= 155),
            inn           VARCHAR(10) CHECK (length(inn) <= 10),
            kpp           VARCHAR(10) CHECK (length(kpp) <= 10),
            legal_address VARCHAR(155) CHECK (length(legal_address) <= 155)
        );
        CREATE INDEX IF NOT EXISTS idx_companies_okved ON companies(okved);
        ",
    )?;
    Ok(())
}

// ── Loading ──

#[derive(Debug)]
pub struct LoadReport {
    pub inserted: usize,
    pub per_code: Vec<(String, usize)>,
}

/// Open the database at `path` and load `results` into it in one transaction.
///
/// The connection is closed on every return path.
pub fn load(path: &Path, results: &ResultSet) -> Result<LoadReport> {
    let conn = connect(path)?;
    load_into(&conn, results)
}

/// Create the table if needed and insert every record, committing once at the end.
///
/// On any database error the transaction is rolled back, so no row of this run
/// is kept, and the error is returned.
pub fn load_into(conn: &Connection, results: &ResultSet) -> Result<LoadReport> {
    match stage_and_commit(conn, results) {
        Ok(report) => {
            info!("Inserted {} companies", report.inserted);
            Ok(report)
        }
        Err(e) => {
            error!("Database error, nothing committed: {}", e);
            Err(e)
        }
    }
}

fn stage_and_commit(conn: &Connection, results: &ResultSet) -> Result<LoadReport> {
    let tx = conn.unchecked_transaction()?;
    init_schema(&tx)?;

    let mut inserted = 0;
    let mut per_code = Vec::with_capacity(results.len());
    {
        let mut stmt = tx.prepare(
            "INSERT INTO companies (company_name, okved, inn, kpp, legal_address)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for (okved, companies) in results.iter() {
            if companies.is_empty() {
                continue;
            }
            for c in companies {
                inserted += stmt.execute(rusqlite::params![
                    c.full_name,
                    okved.as_str(),
                    c.inn,
                    c.kpp,
                    c.legal_address,
                ])?;
            }
            per_code.push((okved.to_string(), companies.len()));
        }
    }
    tx.commit()?;

    Ok(LoadReport { inserted, per_code })
}

// ── Stats ──

pub struct Stats {
    pub total: usize,
    pub per_code: Vec<(String, usize)>,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let total: usize = conn.query_row("SELECT COUNT(*) FROM companies", [], |r| r.get(0))?;
    let mut stmt = conn.prepare(
        "SELECT COALESCE(okved, ''), COUNT(*) FROM companies GROUP BY okved ORDER BY okved",
    )?;
    let per_code = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(Stats { total, per_code })
}

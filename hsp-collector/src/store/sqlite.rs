//! SQLite persistence.

use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use crate::domain::{DateWindow, DayType, Hhmm, ServiceRecord, TaskKey};

use super::{FetchLogEntry, Persistence, StoreError};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS service_records (
        route               TEXT NOT NULL,
        rid                 TEXT NOT NULL,
        date_of_service     TEXT NOT NULL,   -- YYYY-MM-DD
        day_type            TEXT NOT NULL,   -- WEEKDAY, SATURDAY, SUNDAY
        toc_code            TEXT,
        origin              TEXT NOT NULL,
        destination         TEXT NOT NULL,
        scheduled_departure TEXT,            -- HHMM
        scheduled_arrival   TEXT,
        actual_departure    TEXT,
        actual_arrival      TEXT,
        cancel_reason       TEXT,
        PRIMARY KEY (route, rid)
    );

    CREATE INDEX IF NOT EXISTS idx_records_coverage
        ON service_records (route, date_of_service, day_type);

    CREATE TABLE IF NOT EXISTS fetch_log (
        route        TEXT NOT NULL,
        window_start TEXT NOT NULL,
        window_end   TEXT NOT NULL,
        day_type     TEXT NOT NULL,
        services     INTEGER NOT NULL,
        records      INTEGER NOT NULL,
        fetched_at   TEXT NOT NULL,          -- RFC 3339
        PRIMARY KEY (route, window_start, window_end, day_type)
    );
";

/// A [`Persistence`] backend over a single SQLite database file.
pub struct SqliteStore {
    conn: Connection,
    /// Set once the schema has been created on this connection.
    schema_ready: bool,
}

impl SqliteStore {
    /// Open or create the database at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self::from_connection(Connection::open(path)?))
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Ok(Self::from_connection(Connection::open_in_memory()?))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn,
            schema_ready: false,
        }
    }

    fn check_prepared(&self) -> Result<(), StoreError> {
        if self.schema_ready {
            Ok(())
        } else {
            Err(StoreError::NotPrepared)
        }
    }

    fn count(&self, sql: &str, params: impl rusqlite::Params) -> Result<u64, StoreError> {
        self.check_prepared()?;
        let n: i64 = self.conn.query_row(sql, params, |row| row.get(0))?;
        Ok(n.max(0) as u64)
    }
}

fn date_str(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn parse_date(column: &'static str, value: String) -> Result<NaiveDate, StoreError> {
    NaiveDate::parse_from_str(&value, "%Y-%m-%d").map_err(|_| StoreError::Corrupt { column, value })
}

fn time_str(time: Option<Hhmm>) -> Option<String> {
    time.map(|t| t.to_string())
}

impl Persistence for SqliteStore {
    fn prepare(&mut self) -> Result<(), StoreError> {
        if !self.schema_ready {
            self.conn.execute_batch(SCHEMA)?;
            self.schema_ready = true;
            debug!("SQLite schema ready");
        }
        Ok(())
    }

    fn save(&mut self, records: &[ServiceRecord]) -> Result<u64, StoreError> {
        self.check_prepared()?;
        let tx = self.conn.transaction()?;
        let mut written = 0u64;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR REPLACE INTO service_records (
                    route, rid, date_of_service, day_type, toc_code, origin, destination,
                    scheduled_departure, scheduled_arrival, actual_departure, actual_arrival,
                    cancel_reason
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            )?;
            for r in records {
                stmt.execute(params![
                    r.route,
                    r.rid,
                    date_str(r.date_of_service),
                    r.day_type.as_str(),
                    r.toc_code,
                    r.origin.as_str(),
                    r.destination.as_str(),
                    time_str(r.scheduled_departure),
                    time_str(r.scheduled_arrival),
                    time_str(r.actual_departure),
                    time_str(r.actual_arrival),
                    r.cancel_reason,
                ])?;
                written += 1;
            }
        }
        tx.commit()?;
        Ok(written)
    }

    fn query_coverage(
        &self,
        route: &str,
        window: DateWindow,
        day_type: DayType,
    ) -> Result<u64, StoreError> {
        self.count(
            "SELECT COUNT(*) FROM service_records
             WHERE route = ?1 AND date_of_service BETWEEN ?2 AND ?3 AND day_type = ?4",
            params![
                route,
                date_str(window.start()),
                date_str(window.end()),
                day_type.as_str()
            ],
        )
    }

    fn record_fetch(&mut self, entry: &FetchLogEntry) -> Result<(), StoreError> {
        self.check_prepared()?;
        self.conn.execute(
            "INSERT OR REPLACE INTO fetch_log
                (route, window_start, window_end, day_type, services, records, fetched_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                entry.key.route,
                date_str(entry.key.window.start()),
                date_str(entry.key.window.end()),
                entry.key.day_type.as_str(),
                entry.services as i64,
                entry.records as i64,
                entry.fetched_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn fetch_entry(&self, key: &TaskKey) -> Result<Option<FetchLogEntry>, StoreError> {
        self.check_prepared()?;
        let row = self
            .conn
            .query_row(
                "SELECT services, records, fetched_at FROM fetch_log
                 WHERE route = ?1 AND window_start = ?2 AND window_end = ?3 AND day_type = ?4",
                params![
                    key.route,
                    date_str(key.window.start()),
                    date_str(key.window.end()),
                    key.day_type.as_str()
                ],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;

        let Some((services, records, fetched_at)) = row else {
            return Ok(None);
        };
        let fetched_at = DateTime::parse_from_rfc3339(&fetched_at)
            .map_err(|_| StoreError::Corrupt {
                column: "fetch_log.fetched_at",
                value: fetched_at.clone(),
            })?
            .with_timezone(&Utc);

        Ok(Some(FetchLogEntry {
            key: key.clone(),
            services: services.max(0) as u64,
            records: records.max(0) as u64,
            fetched_at,
        }))
    }

    fn distinct_dates(&self, route: &str) -> Result<u64, StoreError> {
        self.count(
            "SELECT COUNT(DISTINCT date_of_service) FROM service_records WHERE route = ?1",
            params![route],
        )
    }

    fn total_records(&self) -> Result<u64, StoreError> {
        self.count("SELECT COUNT(*) FROM service_records", [])
    }
}

impl SqliteStore {
    /// Load every record stored for a route, oldest first.
    pub fn records_for(&self, route: &str) -> Result<Vec<ServiceRecord>, StoreError> {
        self.check_prepared()?;
        let mut stmt = self.conn.prepare(
            "SELECT rid, date_of_service, day_type, toc_code, origin, destination,
                    scheduled_departure, scheduled_arrival, actual_departure, actual_arrival,
                    cancel_reason
             FROM service_records WHERE route = ?1 ORDER BY date_of_service, rid",
        )?;
        let rows = stmt.query_map(params![route], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                [
                    row.get::<_, Option<String>>(6)?,
                    row.get::<_, Option<String>>(7)?,
                    row.get::<_, Option<String>>(8)?,
                    row.get::<_, Option<String>>(9)?,
                ],
                row.get::<_, Option<String>>(10)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (rid, date, day_type, toc_code, origin, destination, times, cancel_reason) = row?;
            let [sched_dep, sched_arr, act_dep, act_arr] = times;
            records.push(ServiceRecord {
                rid,
                route: route.to_string(),
                date_of_service: parse_date("service_records.date_of_service", date)?,
                day_type: day_type.parse().map_err(|_| StoreError::Corrupt {
                    column: "service_records.day_type",
                    value: day_type.clone(),
                })?,
                toc_code,
                origin: origin.parse().map_err(|_| StoreError::Corrupt {
                    column: "service_records.origin",
                    value: origin.clone(),
                })?,
                destination: destination.parse().map_err(|_| StoreError::Corrupt {
                    column: "service_records.destination",
                    value: destination.clone(),
                })?,
                scheduled_departure: parse_time(sched_dep)?,
                scheduled_arrival: parse_time(sched_arr)?,
                actual_departure: parse_time(act_dep)?,
                actual_arrival: parse_time(act_arr)?,
                cancel_reason,
            });
        }
        Ok(records)
    }
}

fn parse_time(value: Option<String>) -> Result<Option<Hhmm>, StoreError> {
    match value {
        None => Ok(None),
        Some(v) => Hhmm::parse(&v).map(Some).map_err(|_| StoreError::Corrupt {
            column: "service_records.*_time",
            value: v,
        }),
    }
}

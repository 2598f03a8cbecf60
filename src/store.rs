use std::path::Path;

use rusqlite::{params, Connection, OpenFlags};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::errors::{AppError, AppResult};
use crate::geocoder::Coordinates;
use crate::normalize::NormalizedRow;

/// A normalized, geocoded row of the `hotels` table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HotelRecord {
    pub brand_name: String,
    pub subbrand_name: Option<String>,
    pub province: Option<String>,
    pub city: Option<String>,
    pub hotel_name: Option<String>,
    pub tv_model: Option<String>,
    pub tv_sales: Option<i64>,
    pub location: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl HotelRecord {
    pub fn from_row(row: NormalizedRow, coordinates: Option<Coordinates>) -> Self {
        Self {
            brand_name: row.brand_name,
            subbrand_name: row.subbrand_name,
            province: row.province,
            city: row.city,
            hotel_name: row.hotel_name,
            tv_model: row.tv_model,
            tv_sales: row.tv_sales,
            location: row.location,
            latitude: coordinates.map(|c| c.lat),
            longitude: coordinates.map(|c| c.lng),
        }
    }
}

pub fn open_store<P: AsRef<Path>>(path: P) -> AppResult<Connection> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE;
    let connection = Connection::open_with_flags(path, flags)?;
    configure(&connection)?;
    run_migrations(&connection)?;
    info!(target: "store", path = %path.display(), "hotel store opened");
    Ok(connection)
}

fn configure(connection: &Connection) -> AppResult<()> {
    connection.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA busy_timeout = 5000;
        "#,
    )?;
    Ok(())
}

fn run_migrations(connection: &Connection) -> AppResult<()> {
    connection.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS hotels (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            brand_name TEXT,
            subbrand_name TEXT DEFAULT NULL,
            province TEXT,
            city TEXT,
            hotel_name TEXT,
            tv_model TEXT,
            tv_sales INTEGER,
            location TEXT,
            latitude REAL,
            longitude REAL
        );
        "#,
    )?;

    ensure_column(connection, "hotels", "subbrand_name TEXT DEFAULT NULL")?;

    // NULLs are distinct under a plain UNIQUE constraint, so key on IFNULL to
    // keep re-runs idempotent for rows with blank cells.
    let colliding = if index_exists(connection, "idx_hotels_identity")? {
        0
    } else {
        null_key_collisions(connection)?
    };
    if colliding == 0 {
        connection.execute(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_hotels_identity ON hotels (
                IFNULL(province, ''),
                IFNULL(city, ''),
                IFNULL(brand_name, ''),
                IFNULL(hotel_name, ''),
                IFNULL(tv_model, ''),
                IFNULL(location, '')
            )",
            [],
        )?;
    } else {
        warn!(
            target: "store",
            colliding,
            "existing rows collide when NULL key members compare equal; \
             falling back to a plain unique key, rows with blank cells may duplicate on re-run"
        );
        connection.execute(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_hotels_identity_legacy ON hotels (
                province, city, brand_name, hotel_name, tv_model, location
            )",
            [],
        )?;
    }
    Ok(())
}

fn null_key_collisions(connection: &Connection) -> AppResult<i64> {
    connection
        .query_row(
            "SELECT COUNT(*) FROM (
                SELECT 1 FROM hotels
                GROUP BY IFNULL(province, ''), IFNULL(city, ''), IFNULL(brand_name, ''),
                         IFNULL(hotel_name, ''), IFNULL(tv_model, ''), IFNULL(location, '')
                HAVING COUNT(*) > 1
            )",
            [],
            |row| row.get(0),
        )
        .map_err(AppError::from)
}

fn index_exists(connection: &Connection, name: &str) -> AppResult<bool> {
    let count: i64 = connection.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name = ?1",
        [name],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn ensure_column(connection: &Connection, table: &str, definition: &str) -> AppResult<()> {
    let column_name = definition
        .split_whitespace()
        .next()
        .ok_or_else(|| AppError::Config(format!("invalid column definition: {definition}")))?;
    if column_exists(connection, table, column_name)? {
        return Ok(());
    }
    let sql = format!("ALTER TABLE {table} ADD COLUMN {definition}");
    connection.execute(&sql, [])?;
    Ok(())
}

fn column_exists(connection: &Connection, table: &str, column: &str) -> AppResult<bool> {
    let pragma = format!("PRAGMA table_info({table})");
    let mut stmt = connection.prepare(&pragma)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Inserts a record unless its identity tuple already exists. Returns whether
/// a row was written.
pub fn insert_hotel(connection: &Connection, record: &HotelRecord) -> AppResult<bool> {
    let changed = connection.execute(
        "INSERT OR IGNORE INTO hotels (
            brand_name, subbrand_name, province, city, hotel_name,
            tv_model, tv_sales, location, latitude, longitude
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            record.brand_name,
            record.subbrand_name,
            record.province,
            record.city,
            record.hotel_name,
            record.tv_model,
            record.tv_sales,
            record.location,
            record.latitude,
            record.longitude,
        ],
    )?;
    if changed == 0 {
        debug!(
            target: "store",
            brand = %record.brand_name,
            hotel = record.hotel_name.as_deref().unwrap_or_default(),
            "duplicate hotel row ignored"
        );
    }
    Ok(changed > 0)
}

pub fn count_hotels(connection: &Connection) -> AppResult<i64> {
    connection
        .query_row("SELECT COUNT(*) FROM hotels", [], |row| row.get(0))
        .map_err(AppError::from)
}

pub fn load_hotels(connection: &Connection) -> AppResult<Vec<HotelRecord>> {
    let mut stmt = connection.prepare(
        "SELECT brand_name, subbrand_name, province, city, hotel_name,
                tv_model, tv_sales, location, latitude, longitude
        FROM hotels
        ORDER BY id ASC",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(HotelRecord {
                brand_name: row.get::<_, Option<String>>(0)?.unwrap_or_default(),
                subbrand_name: row.get(1)?,
                province: row.get(2)?,
                city: row.get(3)?,
                hotel_name: row.get(4)?,
                tv_model: row.get(5)?,
                tv_sales: row.get(6)?,
                location: row.get(7)?,
                latitude: row.get(8)?,
                longitude: row.get(9)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

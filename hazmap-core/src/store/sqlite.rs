//! SQLite-backed [`LocalStore`].

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use geo::Point as GeoPoint;
use rusqlite::{Connection, OptionalExtension, Row, Transaction, params};

use crate::{
    Category, Disability, LocalStore, Point, PointOrigin, StoreError, SyncStatus, Watermark,
};

use super::schema::initialise_schema;

const POINT_COLUMNS: &str =
    "local_id, remote_id, category_id, lon, lat, fields, is_private, is_pending";

/// Durable store kept in a single SQLite database file.
///
/// # Examples
///
/// ```rust
/// use geo::Point as GeoPoint;
/// use hazmap_core::{LocalStore, Point, SqliteLocalStore};
///
/// let mut store = SqliteLocalStore::open_in_memory()?;
/// store.insert_point(&Point::private(1, GeoPoint::new(34.35, 61.78)))?;
/// assert_eq!(store.load_pending_points()?.len(), 1);
/// # Ok::<(), hazmap_core::StoreError>(())
/// ```
pub struct SqliteLocalStore {
    connection: Option<Connection>,
    path: Option<PathBuf>,
}

impl fmt::Debug for SqliteLocalStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteLocalStore")
            .field("path", &self.path)
            .field("open", &self.connection.is_some())
            .finish()
    }
}

impl SqliteLocalStore {
    /// Open or create the store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let connection = Connection::open(path).map_err(|source| StoreError::Open {
            path: path.to_path_buf(),
            source: Arc::new(source),
        })?;
        Self::with_connection(connection, Some(path.to_path_buf()))
    }

    /// Open a throwaway store that lives only as long as the handle.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let connection = Connection::open_in_memory()
            .map_err(|source| StoreError::backend("open in-memory database", source))?;
        Self::with_connection(connection, None)
    }

    fn with_connection(mut connection: Connection, path: Option<PathBuf>) -> Result<Self, StoreError> {
        initialise_schema(&mut connection)?;
        Ok(Self {
            connection: Some(connection),
            path,
        })
    }

    /// Location of the database file, if it has one.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn connection(&self) -> Result<&Connection, StoreError> {
        self.connection.as_ref().ok_or(StoreError::Closed)
    }

    fn transaction(&mut self, operation: &'static str) -> Result<Transaction<'_>, StoreError> {
        self.connection
            .as_mut()
            .ok_or(StoreError::Closed)?
            .transaction()
            .map_err(|source| StoreError::backend(operation, source))
    }

    fn query_points(&self, operation: &'static str, filter: &str) -> Result<Vec<Point>, StoreError> {
        let connection = self.connection()?;
        let query = format!("SELECT {POINT_COLUMNS} FROM points {filter} ORDER BY local_id");
        let mut statement = connection
            .prepare(&query)
            .map_err(|source| StoreError::backend(operation, source))?;
        let rows = statement
            .query_map([], point_row)
            .map_err(|source| StoreError::backend(operation, source))?;

        let mut points = Vec::new();
        for row in rows {
            let (columns, fields) =
                row.map_err(|source| StoreError::backend(operation, source))?;
            points.push(decode_fields(columns, &fields)?);
        }
        Ok(points)
    }
}

struct PointRow {
    local_id: i64,
    remote_id: Option<String>,
    category_id: i64,
    lon: f64,
    lat: f64,
    is_private: bool,
    is_pending: bool,
}

fn point_row(row: &Row<'_>) -> rusqlite::Result<(PointRow, String)> {
    Ok((
        PointRow {
            local_id: row.get(0)?,
            remote_id: row.get(1)?,
            category_id: row.get(2)?,
            lon: row.get(3)?,
            lat: row.get(4)?,
            is_private: row.get(6)?,
            is_pending: row.get(7)?,
        },
        row.get(5)?,
    ))
}

fn decode_fields(row: PointRow, fields: &str) -> Result<Point, StoreError> {
    let fields: BTreeMap<String, String> =
        serde_json::from_str(fields).map_err(|err| StoreError::InvalidFields {
            local_id: row.local_id,
            message: err.to_string(),
        })?;
    Ok(Point {
        local_id: Some(row.local_id),
        remote_id: row.remote_id,
        category_id: row.category_id,
        location: GeoPoint::new(row.lon, row.lat),
        fields,
        origin: if row.is_private {
            PointOrigin::Private
        } else {
            PointOrigin::Remote
        },
        status: if row.is_pending {
            SyncStatus::Pending
        } else {
            SyncStatus::Synchronized
        },
    })
}

fn encode_fields(point: &Point) -> Result<String, StoreError> {
    serde_json::to_string(&point.fields)
        .map_err(|source| StoreError::backend("encode point fields", source))
}

fn insert_point_row(
    transaction: &Transaction<'_>,
    point: &Point,
    on_conflict: &str,
) -> Result<(), StoreError> {
    let sql = format!(
        "INSERT INTO points (remote_id, category_id, lon, lat, fields, is_private, is_pending)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) {on_conflict}"
    );
    transaction
        .execute(
            &sql,
            params![
                point.remote_id,
                point.category_id,
                point.location.x(),
                point.location.y(),
                encode_fields(point)?,
                point.is_private(),
                point.is_private() && point.is_pending(),
            ],
        )
        .map(|_| ())
        .map_err(|source| StoreError::backend("insert point", source))
}

const UPSERT_POINT: &str = "ON CONFLICT(remote_id) DO UPDATE SET
    category_id = excluded.category_id,
    lon = excluded.lon,
    lat = excluded.lat,
    fields = excluded.fields,
    is_private = excluded.is_private,
    is_pending = excluded.is_pending";

const UPSERT_REMOTE_POINT: &str = "ON CONFLICT(remote_id) DO UPDATE SET
    category_id = excluded.category_id,
    lon = excluded.lon,
    lat = excluded.lat,
    fields = excluded.fields
    WHERE points.is_private = 0";

impl LocalStore for SqliteLocalStore {
    fn load_categories(&self) -> Result<Vec<Category>, StoreError> {
        let connection = self.connection()?;
        let mut statement = connection
            .prepare(
                "SELECT id, name, description, url, icon_url, published, active
                 FROM categories ORDER BY id",
            )
            .map_err(|source| StoreError::backend("load categories", source))?;
        let rows = statement
            .query_map([], |row| {
                Ok(Category::new(row.get(0)?, row.get::<_, String>(1)?)
                    .with_description(row.get::<_, String>(2)?)
                    .with_url(row.get::<_, String>(3)?)
                    .with_icon_url(row.get::<_, String>(4)?)
                    .with_published(row.get(5)?)
                    .with_active(row.get(6)?))
            })
            .map_err(|source| StoreError::backend("load categories", source))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|source| StoreError::backend("load categories", source))
    }

    fn load_disabilities(&self) -> Result<Vec<Disability>, StoreError> {
        let connection = self.connection()?;
        let mut statement = connection
            .prepare("SELECT id, label, active FROM disabilities ORDER BY id")
            .map_err(|source| StoreError::backend("load disabilities", source))?;
        let rows = statement
            .query_map([], |row| {
                Ok(Disability {
                    id: row.get(0)?,
                    label: row.get(1)?,
                    active: row.get(2)?,
                })
            })
            .map_err(|source| StoreError::backend("load disabilities", source))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|source| StoreError::backend("load disabilities", source))
    }

    fn load_points(&self) -> Result<Vec<Point>, StoreError> {
        self.query_points("load points", "")
    }

    fn load_private_points(&self) -> Result<Vec<Point>, StoreError> {
        self.query_points("load private points", "WHERE is_private = 1")
    }

    fn load_pending_points(&self) -> Result<Vec<Point>, StoreError> {
        self.query_points("load pending points", "WHERE is_pending = 1")
    }

    fn insert_category(&mut self, category: &Category) -> Result<(), StoreError> {
        self.connection()?
            .execute(
                "INSERT INTO categories (id, name, description, url, icon_url, published, active)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    description = excluded.description,
                    url = excluded.url,
                    icon_url = excluded.icon_url,
                    published = excluded.published",
                params![
                    category.id,
                    category.name().raw(),
                    category.description,
                    category.url,
                    category.icon_url,
                    category.published,
                    category.active,
                ],
            )
            .map(|_| ())
            .map_err(|source| StoreError::backend("insert category", source))
    }

    fn insert_point(&mut self, point: &Point) -> Result<Point, StoreError> {
        let transaction = self.transaction("insert point")?;
        insert_point_row(&transaction, point, "")?;
        let local_id = transaction.last_insert_rowid();
        transaction
            .commit()
            .map_err(|source| StoreError::backend("insert point", source))?;
        Ok(Point {
            local_id: Some(local_id),
            ..point.clone()
        })
    }

    fn insert_points(&mut self, points: &[Point]) -> Result<(), StoreError> {
        let transaction = self.transaction("insert points")?;
        for point in points {
            insert_point_row(&transaction, point, UPSERT_POINT)?;
        }
        transaction
            .commit()
            .map_err(|source| StoreError::backend("insert points", source))
    }

    fn replace_remote_points(
        &mut self,
        category_id: i64,
        points: &[Point],
    ) -> Result<(), StoreError> {
        let transaction = self.transaction("replace remote points")?;
        transaction
            .execute(
                "DELETE FROM points WHERE category_id = ?1 AND is_private = 0",
                [category_id],
            )
            .map_err(|source| StoreError::backend("clear remote points", source))?;
        for point in points {
            insert_point_row(&transaction, point, UPSERT_REMOTE_POINT)?;
        }
        transaction
            .commit()
            .map_err(|source| StoreError::backend("replace remote points", source))
    }

    fn set_disabilities(&mut self, disabilities: &[Disability]) -> Result<(), StoreError> {
        let transaction = self.transaction("set disabilities")?;
        let known: HashMap<i64, bool> = {
            let mut statement = transaction
                .prepare("SELECT id, active FROM disabilities")
                .map_err(|source| StoreError::backend("read disability state", source))?;
            let rows = statement
                .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, bool>(1)?)))
                .map_err(|source| StoreError::backend("read disability state", source))?;
            rows.collect::<Result<_, _>>()
                .map_err(|source| StoreError::backend("read disability state", source))?
        };
        transaction
            .execute("DELETE FROM disabilities", [])
            .map_err(|source| StoreError::backend("clear disabilities", source))?;
        for disability in disabilities {
            let active = known.get(&disability.id).copied().unwrap_or(disability.active);
            transaction
                .execute(
                    "INSERT INTO disabilities (id, label, active) VALUES (?1, ?2, ?3)
                     ON CONFLICT(id) DO UPDATE SET label = excluded.label",
                    params![disability.id, disability.label, active],
                )
                .map_err(|source| StoreError::backend("insert disability", source))?;
        }
        transaction
            .commit()
            .map_err(|source| StoreError::backend("set disabilities", source))
    }

    fn mark_synchronized(&mut self, point: &Point, remote_id: &str) -> Result<(), StoreError> {
        let local_id = point.local_id.ok_or(StoreError::UnsavedPoint)?;
        let transaction = self.transaction("mark synchronized")?;
        let pending: Option<bool> = transaction
            .query_row(
                "SELECT is_pending FROM points WHERE local_id = ?1",
                [local_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|source| StoreError::backend("read point status", source))?;
        match pending {
            None => return Err(StoreError::UnknownPoint { local_id }),
            Some(false) => return Ok(()),
            Some(true) => {}
        }
        // A downloaded copy of the same remote point yields to the local one.
        transaction
            .execute(
                "DELETE FROM points WHERE remote_id = ?1 AND is_private = 0",
                [remote_id],
            )
            .map_err(|source| StoreError::backend("drop downloaded duplicate", source))?;
        transaction
            .execute(
                "UPDATE points SET is_pending = 0, remote_id = ?2 WHERE local_id = ?1",
                params![local_id, remote_id],
            )
            .map_err(|source| StoreError::backend("mark synchronized", source))?;
        transaction
            .commit()
            .map_err(|source| StoreError::backend("mark synchronized", source))
    }

    fn set_category_state(&mut self, category_id: i64, active: bool) -> Result<(), StoreError> {
        let changed = self
            .connection()?
            .execute(
                "UPDATE categories SET active = ?2 WHERE id = ?1",
                params![category_id, active],
            )
            .map_err(|source| StoreError::backend("set category state", source))?;
        if changed == 0 {
            return Err(StoreError::UnknownCategory { id: category_id });
        }
        Ok(())
    }

    fn set_disability_state(
        &mut self,
        disability_id: i64,
        active: bool,
    ) -> Result<(), StoreError> {
        let changed = self
            .connection()?
            .execute(
                "UPDATE disabilities SET active = ?2 WHERE id = ?1",
                params![disability_id, active],
            )
            .map_err(|source| StoreError::backend("set disability state", source))?;
        if changed == 0 {
            return Err(StoreError::UnknownDisability { id: disability_id });
        }
        Ok(())
    }

    fn load_watermark(&self) -> Result<Option<Watermark>, StoreError> {
        self.connection()?
            .query_row(
                "SELECT timestamp, lon, lat FROM watermark WHERE id = 1",
                [],
                |row| {
                    Ok(Watermark::new(
                        row.get(0)?,
                        GeoPoint::new(row.get(1)?, row.get(2)?),
                    ))
                },
            )
            .optional()
            .map_err(|source| StoreError::backend("load watermark", source))
    }

    fn commit_watermark(&mut self, watermark: Watermark) -> Result<(), StoreError> {
        self.connection()?
            .execute(
                "INSERT INTO watermark (id, timestamp, lon, lat) VALUES (1, ?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET
                    timestamp = excluded.timestamp,
                    lon = excluded.lon,
                    lat = excluded.lat",
                params![
                    watermark.timestamp,
                    watermark.location.x(),
                    watermark.location.y(),
                ],
            )
            .map(|_| ())
            .map_err(|source| StoreError::backend("commit watermark", source))
    }

    fn close(&mut self) -> Result<(), StoreError> {
        match self.connection.take() {
            Some(connection) => connection
                .close()
                .map_err(|(_, source)| StoreError::backend("close database", source)),
            None => Ok(()),
        }
    }
}

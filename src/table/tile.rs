//! Tile tables

use std::ops::Deref;

use crate::bbox::BoundingBox;
use crate::catalog::{self, ContentsEntry, DataType};
use crate::container::Container;
use crate::errors::{GpkgError, GpkgResult};
use crate::observability::{log_event, Event, ObservationScope};
use crate::store::{quote_ident, SqlStatement};
use crate::tiles::{TileMatrix, TileMatrixSet, TilePyramid, TileRecord};
use crate::value::Value;

use super::descriptor::TableKind;
use super::feature::validate_identifier;
use super::generic::Table;

/// Handle on a tile pyramid table
#[derive(Debug, Clone)]
pub struct TileTable<'c> {
    table: Table<'c>,
    pyramid: TilePyramid,
}

impl<'c> Deref for TileTable<'c> {
    type Target = Table<'c>;

    fn deref(&self) -> &Table<'c> {
        &self.table
    }
}

impl<'c> TileTable<'c> {
    pub(crate) fn from_table(table: Table<'c>) -> GpkgResult<Self> {
        match table.kind().clone() {
            TableKind::Tile(pyramid) => Ok(Self { table, pyramid }),
            other => Err(GpkgError::validation(format!(
                "'{}' is a {} table, not a tile table",
                table.name(),
                other.name()
            ))),
        }
    }

    /// Registers a tile table with a full pyramid from zoom 0 to `max_zoom`.
    ///
    /// `gsd_x`/`gsd_y` are ground units per pixel at `max_zoom`; each level
    /// above doubles them.
    pub fn create(
        container: &'c Container,
        name: &str,
        bounds: &BoundingBox,
        max_zoom: u32,
        tile_pixels: u32,
        gsd_x: f64,
        gsd_y: f64,
    ) -> GpkgResult<TileTable<'c>> {
        validate_identifier("table", name)?;
        let store = container.store();
        if let Some(existing) = catalog::contents(store, name)? {
            if existing.kind() != Some(DataType::Tiles) {
                return Err(GpkgError::validation(format!(
                    "'{}' is already registered as {}",
                    name, existing.data_type
                )));
            }
            log_event(Event::TableAlreadyRegistered, &[("table", name)]);
            return container.tile_table(name);
        }
        if store.table_exists(name)? {
            return Err(GpkgError::validation(format!(
                "Table '{}' exists but is not registered in the catalog",
                name
            )));
        }
        if catalog::spatial_ref(store, bounds.srs_id)?.is_none() {
            return Err(GpkgError::unknown_srs(bounds.srs_id));
        }

        let pyramid = TilePyramid::build(
            name,
            bounds.srs_id,
            bounds.to_envelope(),
            max_zoom,
            tile_pixels,
            gsd_x,
            gsd_y,
        )?;

        let mut statements = vec![
            SqlStatement::new(format!(
                "CREATE TABLE {} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    zoom_level INTEGER NOT NULL,
                    tile_column INTEGER NOT NULL,
                    tile_row INTEGER NOT NULL,
                    tile_data BLOB NOT NULL,
                    UNIQUE (zoom_level, tile_column, tile_row)
                )",
                quote_ident(name)
            )),
            catalog::contents_insert(&ContentsEntry {
                table_name: name.to_string(),
                data_type: DataType::Tiles.as_str().to_string(),
                identifier: Some(name.to_string()),
                description: None,
                last_change: None,
                bounds: Some(bounds.to_envelope()),
                srs_id: Some(bounds.srs_id),
            }),
            catalog::tile_matrix_set_insert(&pyramid.set),
        ];
        statements.extend(
            pyramid
                .matrices
                .iter()
                .map(|m| catalog::tile_matrix_insert(name, m)),
        );

        let scope = ObservationScope::with_fields("TILE_TABLE_CREATE", &[("table", name)]);
        if let Err(e) = store.execute_atomic(&statements) {
            scope.fail(e.message());
            return Err(e);
        }
        scope.complete();
        let levels = pyramid.matrices.len().to_string();
        log_event(
            Event::TableCreated,
            &[("kind", "tile"), ("levels", levels.as_str()), ("table", name)],
        );

        container.invalidate(name);
        container.tile_table(name)
    }

    pub fn pyramid(&self) -> &TilePyramid {
        &self.pyramid
    }

    pub fn matrix_set(&self) -> &TileMatrixSet {
        &self.pyramid.set
    }

    pub fn tile_matrix(&self, zoom: u32) -> Option<&TileMatrix> {
        self.pyramid.matrix(zoom)
    }

    /// Bounds of a tile; see `TilePyramid::tile_bounds` for the window
    pub fn tile_bounds(&self, column: u32, row: u32, zoom: u32) -> BoundingBox {
        self.pyramid
            .tile_bounds(column, row, zoom, &self.descriptor().organization)
    }

    /// Stores a tile, replacing any tile at the same position
    pub fn insert_tile(&self, tile: &TileRecord) -> GpkgResult<i64> {
        tile.image_format()?;
        let matrix = self.tile_matrix(tile.zoom_level).ok_or_else(|| {
            GpkgError::validation(format!(
                "'{}' has no zoom level {}",
                self.name(),
                tile.zoom_level
            ))
        })?;
        if tile.tile_column >= matrix.matrix_width || tile.tile_row >= matrix.matrix_height {
            return Err(GpkgError::validation(format!(
                "Tile {}/{}/{} is outside the {}x{} matrix",
                tile.zoom_level,
                tile.tile_column,
                tile.tile_row,
                matrix.matrix_width,
                matrix.matrix_height
            )));
        }

        let sql = format!(
            "INSERT OR REPLACE INTO {} (zoom_level, tile_column, tile_row, tile_data)
             VALUES (?, ?, ?, ?)",
            self.quoted_name()
        );
        self.container().store().insert(
            &sql,
            &[
                Value::from(tile.zoom_level),
                Value::from(tile.tile_column),
                Value::from(tile.tile_row),
                Value::Blob(tile.data.clone()),
            ],
        )
    }

    pub fn tile(&self, zoom: u32, column: u32, row: u32) -> GpkgResult<Option<TileRecord>> {
        let set = self.query(
            "WHERE zoom_level = ? AND tile_column = ? AND tile_row = ?",
            &[Value::from(zoom), Value::from(column), Value::from(row)],
        )?;
        set.first().map(|row| tile_from_row(&row)).transpose()
    }

    /// Stored tiles, optionally at one zoom level
    pub fn tile_count(&self, zoom: Option<u32>) -> GpkgResult<usize> {
        match zoom {
            Some(z) => self.row_count(Some("zoom_level = ?"), &[Value::from(z)]),
            None => self.row_count(None, &[]),
        }
    }
}

pub(crate) fn tile_from_row(row: &crate::store::RowView<'_>) -> GpkgResult<TileRecord> {
    let int = |column: &str| -> GpkgResult<u32> {
        row.i64(column)
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| GpkgError::decode(format!("Tile row has no valid '{}'", column)))
    };
    let data = row
        .get("tile_data")
        .and_then(Value::as_blob)
        .map(<[u8]>::to_vec)
        .ok_or_else(|| GpkgError::decode("Tile row has no tile_data"))?;
    Ok(TileRecord::new(
        int("zoom_level")?,
        int("tile_column")?,
        int("tile_row")?,
        data,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ContainerConfig;

    const PNG: [u8; 9] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x01];

    fn world(c: &Container) -> TileTable<'_> {
        let bounds = BoundingBox::new(-180.0, -90.0, 180.0, 90.0);
        TileTable::create(c, "world", &bounds, 2, 256, 0.25, 0.25).unwrap()
    }

    #[test]
    fn test_create_writes_pyramid() {
        let c = Container::in_memory(ContainerConfig::default()).unwrap();
        let t = world(&c);

        assert_eq!(t.pyramid().matrices.len(), 3);
        assert_eq!(
            c.store()
                .query_i64("SELECT COUNT(*) FROM gpkg_tile_matrix WHERE table_name = 'world'", &[])
                .unwrap(),
            Some(3)
        );
        let top = t.tile_matrix(0).unwrap();
        assert_eq!(top.pixel_x_size, 1.0);
        assert_eq!((top.matrix_width, top.matrix_height), (2, 1));
        let bottom = t.tile_matrix(2).unwrap();
        assert_eq!((bottom.matrix_width, bottom.matrix_height), (6, 3));

        // Second create returns the existing table
        let again = world(&c);
        assert_eq!(again.pyramid(), t.pyramid());
    }

    #[test]
    fn test_insert_and_fetch_tile() {
        let c = Container::in_memory(ContainerConfig::default()).unwrap();
        let t = world(&c);

        t.insert_tile(&TileRecord::new(1, 2, 0, PNG.to_vec())).unwrap();
        let mut replaced = PNG.to_vec();
        replaced.push(0x02);
        t.insert_tile(&TileRecord::new(1, 2, 0, replaced.clone())).unwrap();

        assert_eq!(t.tile_count(None).unwrap(), 1);
        assert_eq!(t.tile_count(Some(0)).unwrap(), 0);
        assert_eq!(t.tile(1, 2, 0).unwrap().unwrap().data, replaced);
        assert!(t.tile(1, 0, 0).unwrap().is_none());
    }

    #[test]
    fn test_insert_tile_validation() {
        let c = Container::in_memory(ContainerConfig::default()).unwrap();
        let t = world(&c);

        assert!(t.insert_tile(&TileRecord::new(0, 0, 0, b"GIF89a".to_vec())).is_err());
        assert!(t.insert_tile(&TileRecord::new(7, 0, 0, PNG.to_vec())).is_err());
        assert!(t.insert_tile(&TileRecord::new(0, 2, 0, PNG.to_vec())).is_err());
        assert_eq!(t.tile_count(None).unwrap(), 0);
    }

    #[test]
    fn test_tile_bounds_uses_catalog_organization() {
        let c = Container::in_memory(ContainerConfig::default()).unwrap();
        let t = world(&c);
        let b = t.tile_bounds(1, 1, 0);
        assert_eq!(b.organization, "EPSG");
        assert_eq!((b.min_x, b.max_x), (76.0, 332.0));
        assert!(t.tile_bounds(0, 0, 0).is_empty());
    }
}

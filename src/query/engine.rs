//! Bounding-box queries over feature and tile tables

use crate::bbox::BoundingBox;
use crate::container::Container;
use crate::errors::{GpkgError, GpkgResult};
use crate::geometry::read_envelope;
use crate::mapping::{FeatureReader, FeatureRecord};
use crate::observability::{log_event, Event};
use crate::store::{quote_ident, Cursor};
use crate::table::{tile_from_row, FeatureTable, TableKind, TileTable};
use crate::tiles::TileRecord;
use crate::value::Value;

use super::policy::{
    derived_extent_accepts, feature_extent_accepts, feature_matches, tile_extent_accepts,
};

/// How feature candidates are found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanStrategy {
    /// R-tree when the table has one, linear scan otherwise
    #[default]
    Auto,
    /// Always use the R-tree; fails for tables without one
    SpatialIndex,
    /// Always scan every geometry
    LinearScan,
}

impl ScanStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStrategy::Auto => "auto",
            ScanStrategy::SpatialIndex => "spatial_index",
            ScanStrategy::LinearScan => "linear_scan",
        }
    }
}

/// Result of `QueryEngine::query_bbox`
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    Features(Vec<FeatureRecord>),
    Tiles(Vec<TileRecord>),
}

impl QueryResult {
    pub fn len(&self) -> usize {
        match self {
            QueryResult::Features(f) => f.len(),
            QueryResult::Tiles(t) => t.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_features(self) -> Option<Vec<FeatureRecord>> {
        match self {
            QueryResult::Features(f) => Some(f),
            QueryResult::Tiles(_) => None,
        }
    }

    pub fn into_tiles(self) -> Option<Vec<TileRecord>> {
        match self {
            QueryResult::Tiles(t) => Some(t),
            QueryResult::Features(_) => None,
        }
    }
}

/// Spatial query engine bound to one container
pub struct QueryEngine<'c> {
    container: &'c Container,
    strategy: ScanStrategy,
}

impl<'c> QueryEngine<'c> {
    pub fn new(container: &'c Container) -> Self {
        Self {
            container,
            strategy: ScanStrategy::Auto,
        }
    }

    /// Overrides candidate selection, for diagnostics and differential runs
    pub fn with_strategy(mut self, strategy: ScanStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn strategy(&self) -> ScanStrategy {
        self.strategy
    }

    /// Rows of `table` selected by `bbox`.
    ///
    /// Features match when inside the box, or touching it with
    /// `include_intersect`. Tiles match per zoom level by column/row range.
    /// With `test_extents` a box that cannot hit the table extent returns
    /// nothing without touching rows.
    pub fn query_bbox(
        &self,
        table: &str,
        bbox: &BoundingBox,
        include_intersect: bool,
        test_extents: bool,
    ) -> GpkgResult<QueryResult> {
        let handle = self.container.table(table)?;
        match handle.kind() {
            TableKind::Feature(_) => {
                let features = self.container.feature_table(table)?;
                Ok(QueryResult::Features(self.query_features(
                    &features,
                    bbox,
                    include_intersect,
                    test_extents,
                )?))
            }
            TableKind::Tile(_) => {
                let tiles = self.container.tile_table(table)?;
                Ok(QueryResult::Tiles(self.query_tiles(&tiles, bbox, None, test_extents)?))
            }
            TableKind::System => Err(GpkgError::validation(format!(
                "'{}' holds neither features nor tiles",
                table
            ))),
        }
    }

    pub fn query_features(
        &self,
        table: &FeatureTable<'_>,
        bbox: &BoundingBox,
        include_intersect: bool,
        test_extents: bool,
    ) -> GpkgResult<Vec<FeatureRecord>> {
        let srs_id = table.geometry_column().srs_id;
        let organization = table.descriptor().organization.clone();
        if !bbox.same_reference(srs_id, &organization) {
            log_mismatch(table.name(), bbox, srs_id, &organization);
            return Ok(Vec::new());
        }

        if test_extents {
            let accepted = match table.descriptor().declared_bounds() {
                Some(declared) => feature_extent_accepts(bbox, &declared, include_intersect),
                // Derived bounds wrap the stored envelopes, so any overlap may hit a feature
                None => match table.derived_extent()? {
                    Some(derived) => derived_extent_accepts(bbox, &derived),
                    None => false,
                },
            };
            if !accepted {
                log_event(Event::QueryOutsideExtent, &[("table", table.name())]);
                return Ok(Vec::new());
            }
        }

        let use_index = match self.strategy {
            ScanStrategy::Auto => table.has_spatial_index(),
            ScanStrategy::SpatialIndex => {
                if !table.has_spatial_index() {
                    return Err(GpkgError::validation(format!(
                        "'{}' has no spatial index",
                        table.name()
                    )));
                }
                true
            }
            ScanStrategy::LinearScan => false,
        };

        let reader = FeatureReader::new(table);
        let records = if use_index {
            self.index_scan(table, &reader, bbox, include_intersect)?
        } else {
            self.linear_scan(table, &reader, bbox, include_intersect)?
        };

        let count = records.len().to_string();
        log_event(
            Event::QueryComplete,
            &[
                ("path", if use_index { "spatial_index" } else { "linear_scan" }),
                ("results", count.as_str()),
                ("table", table.name()),
            ],
        );
        Ok(records)
    }

    /// R-tree join on the four intersect inequalities, refined with the
    /// exact envelope since the index stores single-precision bounds
    fn index_scan(
        &self,
        table: &FeatureTable<'_>,
        reader: &FeatureReader<'_, '_>,
        bbox: &BoundingBox,
        include_intersect: bool,
    ) -> GpkgResult<Vec<FeatureRecord>> {
        let key = quote_ident(table.primary_key());
        let geom = table.geometry_column().column_name.clone();
        let sql = format!(
            "SELECT t.* FROM {t} AS t JOIN {r} AS r ON t.{k} = r.id
             WHERE r.minx <= ? AND r.maxx >= ? AND r.miny <= ? AND r.maxy >= ?
             ORDER BY t.{k}",
            t = table.quoted_name(),
            r = quote_ident(&table.rtree_name()),
            k = key
        );
        let set = self.container.store().query(
            &sql,
            &[
                Value::Real(bbox.max_x),
                Value::Real(bbox.min_x),
                Value::Real(bbox.max_y),
                Value::Real(bbox.min_y),
            ],
        )?;

        let mut records = Vec::new();
        for row in set.iter() {
            let Some(blob) = row.get(&geom).and_then(Value::as_blob) else {
                continue;
            };
            let Some(envelope) = read_envelope(blob)? else {
                continue;
            };
            if feature_matches(bbox, &envelope, include_intersect) {
                let index = records.len();
                records.push(reader.map_row(|name| row.get(name), index)?);
            }
        }
        Ok(records)
    }

    /// Phase A pages `(key, geometry)` and classifies envelopes; phase B
    /// loads the hits by key
    fn linear_scan(
        &self,
        table: &FeatureTable<'_>,
        reader: &FeatureReader<'_, '_>,
        bbox: &BoundingBox,
        include_intersect: bool,
    ) -> GpkgResult<Vec<FeatureRecord>> {
        let geom = table.geometry_column().column_name.clone();
        let columns = format!("{}, {}", quote_ident(table.primary_key()), quote_ident(&geom));
        let spec = table.page_spec(None, Vec::new(), &columns);

        let mut hits = Vec::new();
        {
            let mut cursor = self.container.store().open_paged(spec)?;
            while cursor.advance()? {
                let Some(blob) = cursor.get_by_name(&geom).and_then(Value::as_blob) else {
                    continue;
                };
                let Some(envelope) = read_envelope(blob)? else {
                    continue;
                };
                if feature_matches(bbox, &envelope, include_intersect) {
                    if let Some(key) = cursor.current_key() {
                        hits.push(key);
                    }
                }
            }
        }
        if hits.is_empty() {
            return Ok(Vec::new());
        }
        reader.read_keys(&hits)
    }

    /// Tiles touched by `bbox`, at `zoom` or at every level
    pub fn query_tiles(
        &self,
        table: &TileTable<'_>,
        bbox: &BoundingBox,
        zoom: Option<u32>,
        test_extents: bool,
    ) -> GpkgResult<Vec<TileRecord>> {
        let srs_id = table.matrix_set().srs_id;
        let organization = table.descriptor().organization.clone();
        if !bbox.same_reference(srs_id, &organization) {
            log_mismatch(table.name(), bbox, srs_id, &organization);
            return Ok(Vec::new());
        }

        if test_extents {
            let extent = table.descriptor().declared_bounds().unwrap_or_else(|| {
                BoundingBox::from_envelope(&table.matrix_set().bounds, srs_id, &organization)
            });
            if !tile_extent_accepts(bbox, &extent) {
                log_event(Event::QueryOutsideExtent, &[("table", table.name())]);
                return Ok(Vec::new());
            }
        }

        let ranges = match zoom {
            Some(z) => table.pyramid().tile_range(bbox, z).into_iter().collect(),
            None => table.pyramid().tile_ranges(bbox),
        };
        if ranges.is_empty() {
            return Ok(Vec::new());
        }

        let mut clauses = Vec::with_capacity(ranges.len());
        let mut params = Vec::with_capacity(ranges.len() * 5);
        for r in &ranges {
            clauses.push(
                "(zoom_level = ? AND tile_column BETWEEN ? AND ? AND tile_row BETWEEN ? AND ?)",
            );
            params.extend([
                Value::from(r.zoom_level),
                Value::from(r.min_column),
                Value::from(r.max_column),
                Value::from(r.min_row),
                Value::from(r.max_row),
            ]);
        }
        let set = table.query(
            &format!(
                "WHERE {} ORDER BY zoom_level, tile_row, tile_column",
                clauses.join(" OR ")
            ),
            &params,
        )?;
        let tiles = set
            .iter()
            .map(|row| tile_from_row(&row))
            .collect::<GpkgResult<Vec<_>>>()?;

        let count = tiles.len().to_string();
        let levels = ranges.len().to_string();
        log_event(
            Event::QueryComplete,
            &[
                ("levels", levels.as_str()),
                ("results", count.as_str()),
                ("table", table.name()),
            ],
        );
        Ok(tiles)
    }
}

fn log_mismatch(table: &str, bbox: &BoundingBox, srs_id: i32, organization: &str) {
    let query_srs = format!("{}:{}", bbox.organization, bbox.srs_id);
    let table_srs = format!("{}:{}", organization, srs_id);
    log_event(
        Event::QuerySrsMismatch,
        &[
            ("query_srs", query_srs.as_str()),
            ("table", table),
            ("table_srs", table_srs.as_str()),
        ],
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ContainerConfig;
    use crate::geometry::{Coord, GeometryValue, Shape};
    use crate::table::FeatureType;

    fn grid(c: &Container) -> FeatureTable<'_> {
        let t = c
            .create_feature_table(&FeatureType::new("pts", "GEOMETRY", 4326), None)
            .unwrap();
        for x in 0..10 {
            for y in 0..10 {
                t.insert(&[(
                    "geom",
                    Value::from(GeometryValue::point(4326, x as f64, y as f64)),
                )])
                .unwrap();
            }
        }
        let line = Shape::LineString(vec![Coord::xy(3.5, 3.5), Coord::xy(20.0, 20.0)]);
        t.insert(&[("geom", Value::from(GeometryValue::new(4326, line)))])
            .unwrap();
        t
    }

    #[test]
    fn test_index_and_scan_agree() {
        let c = Container::in_memory(ContainerConfig::default().with_page_size(7)).unwrap();
        let t = grid(&c);
        let bbox = BoundingBox::new(2.0, 2.0, 4.0, 4.0);

        for include in [false, true] {
            let indexed = QueryEngine::new(&c)
                .with_strategy(ScanStrategy::SpatialIndex)
                .query_features(&t, &bbox, include, false)
                .unwrap();
            let scanned = QueryEngine::new(&c)
                .with_strategy(ScanStrategy::LinearScan)
                .query_features(&t, &bbox, include, false)
                .unwrap();
            let a: Vec<_> = indexed.iter().map(|r| r.key).collect();
            let b: Vec<_> = scanned.iter().map(|r| r.key).collect();
            assert_eq!(a, b);
            assert_eq!(a.len(), if include { 10 } else { 9 });
        }
    }

    #[test]
    fn test_srs_mismatch_is_empty() {
        let c = Container::in_memory(ContainerConfig::default()).unwrap();
        grid(&c);
        let bbox = BoundingBox::with_srs(0.0, 0.0, 5.0, 5.0, 3857, "EPSG");
        let result = QueryEngine::new(&c).query_bbox("pts", &bbox, true, false).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_extent_rejection() {
        let c = Container::in_memory(ContainerConfig::default()).unwrap();
        grid(&c);
        let far = BoundingBox::new(100.0, 100.0, 110.0, 110.0);
        let result = QueryEngine::new(&c).query_bbox("pts", &far, true, true).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_spatial_index_strategy_requires_index() {
        let c = Container::in_memory(ContainerConfig::default().without_spatial_index()).unwrap();
        let t = grid(&c);
        let bbox = BoundingBox::new(0.0, 0.0, 1.0, 1.0);
        assert!(QueryEngine::new(&c)
            .with_strategy(ScanStrategy::SpatialIndex)
            .query_features(&t, &bbox, false, false)
            .is_err());
        let auto = QueryEngine::new(&c).query_features(&t, &bbox, false, false).unwrap();
        assert_eq!(auto.len(), 4);
    }

    #[test]
    fn test_system_table_rejected() {
        let c = Container::in_memory(ContainerConfig::default()).unwrap();
        let bbox = BoundingBox::new(0.0, 0.0, 1.0, 1.0);
        assert!(QueryEngine::new(&c).query_bbox("gpkg_contents", &bbox, true, false).is_err());
    }
}

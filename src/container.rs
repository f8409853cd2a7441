//! Container: one open GeoPackage file
//!
//! Owns the store connection, the immutable configuration, the geometry
//! codec and the table descriptor cache. Every table handle borrows the
//! container it came from.
//!
//! # Lifecycle
//!
//! - Blank store: install the catalog, write the format marker, validate
//! - Existing store: validate only, never repair
//! - `close()` surfaces errors from the store

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::path::Path;
use std::rc::Rc;

use crate::bbox::BoundingBox;
use crate::catalog::{
    self, DataColumnConstraint, DataType, SpatialRefEntry, MANDATED_TABLES, RTREE_EXTENSION,
};
use crate::config::ContainerConfig;
use crate::errors::{GpkgError, GpkgResult};
use crate::geometry::{register_envelope_functions, Envelope, GeometryCodec};
use crate::observability::{log_event, Event};
use crate::store::{quote_ident, Store};
use crate::table::{
    rtree_table_name, FeatureInfo, FeatureTable, FeatureType, FieldDescriptor, FieldType, Table,
    TableDescriptor, TableKind, TileTable, FEATURE_ID_INDEX_PREFIX,
};
use crate::value::Value;

/// Organization reported for tables without a registered spatial reference
pub const UNKNOWN_ORGANIZATION: &str = "NONE";

/// An open container
pub struct Container {
    store: Store,
    config: ContainerConfig,
    codec: GeometryCodec,
    descriptors: RefCell<HashMap<String, Rc<TableDescriptor>>>,
}

impl Container {
    /// Opens the container at `path`, creating it when the file is new.
    ///
    /// With `overwrite` an existing file is removed first.
    pub fn open_or_create(
        path: impl AsRef<Path>,
        overwrite: bool,
        config: ContainerConfig,
    ) -> GpkgResult<Container> {
        let path = path.as_ref();
        config.validate()?;
        if overwrite && path.exists() {
            fs::remove_file(path).map_err(|e| {
                GpkgError::io_error(format!("Failed to remove {}", path.display()), e)
            })?;
        }
        Self::from_store(Store::open(path)?, config)
    }

    /// Transient container, mainly for tests
    pub fn in_memory(config: ContainerConfig) -> GpkgResult<Container> {
        config.validate()?;
        Self::from_store(Store::open_in_memory()?, config)
    }

    /// Wraps an already opened store
    pub fn from_store(store: Store, config: ContainerConfig) -> GpkgResult<Container> {
        config.validate()?;
        register_envelope_functions(store.connection())?;

        let path = store
            .path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| ":memory:".to_string());
        if store.is_blank()? {
            catalog::install(&store)?;
            catalog::write_marker(&store, config.application_id, config.user_version)?;
            log_event(Event::ContainerCreated, &[("path", path.as_str())]);
        } else {
            log_event(Event::ContainerOpened, &[("path", path.as_str())]);
        }

        let container = Container {
            codec: GeometryCodec::new(&config),
            store,
            config,
            descriptors: RefCell::new(HashMap::new()),
        };
        container.validate(false)?;
        Ok(container)
    }

    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn codec(&self) -> &GeometryCodec {
        &self.codec
    }

    pub fn path(&self) -> Option<&Path> {
        self.store.path()
    }

    /// New feature tables get an R-tree
    pub fn supports_spatial_index(&self) -> bool {
        self.config.spatial_index && self.store.has_spatial_index_support()
    }

    /// Self-check; `deep` adds the full page-level integrity check
    pub fn is_valid(&self, deep: bool) -> GpkgResult<bool> {
        Ok(self.problems(deep)?.is_empty())
    }

    /// Like `is_valid`, but fails with an integrity error naming the problems
    pub fn validate(&self, deep: bool) -> GpkgResult<()> {
        let problems = self.problems(deep)?;
        if problems.is_empty() {
            return Ok(());
        }
        let reason = problems.join("; ");
        log_event(Event::IntegrityCheckFailed, &[("reason", reason.as_str())]);
        Err(GpkgError::integrity("Container failed validation").with_details(reason))
    }

    fn problems(&self, deep: bool) -> GpkgResult<Vec<String>> {
        let mut problems = Vec::new();

        if !catalog::has_marker(&self.store, self.config.application_id)? {
            if self.config.strict {
                problems.push(format!(
                    "format marker 0x{:08X} missing",
                    self.config.application_id
                ));
            } else {
                log_event(Event::MarkerMissingTolerated, &[]);
            }
        }
        if deep {
            problems.extend(self.store.integrity_problems()?);
        }
        for table in self.store.foreign_key_violations()? {
            problems.push(format!("foreign key violation in {}", table));
        }
        for table in catalog::missing_tables(&self.store)? {
            problems.push(format!("missing system table {}", table));
        }
        Ok(problems)
    }

    /// Closes the store connection
    pub fn close(self) -> GpkgResult<()> {
        let path = self
            .store
            .path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| ":memory:".to_string());
        self.store.close()?;
        log_event(Event::ContainerClosed, &[("path", path.as_str())]);
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Descriptors
    // ---------------------------------------------------------------------

    /// Cached descriptor of `name`, loaded from the catalog on first use
    pub fn descriptor(&self, name: &str) -> GpkgResult<Rc<TableDescriptor>> {
        if let Some(d) = self.descriptors.borrow().get(name) {
            return Ok(Rc::clone(d));
        }
        let descriptor = Rc::new(self.load_descriptor(name)?);
        self.descriptors
            .borrow_mut()
            .insert(name.to_string(), Rc::clone(&descriptor));
        Ok(descriptor)
    }

    /// Drops the cached descriptor so the next access reloads it
    pub fn invalidate(&self, name: &str) {
        self.descriptors.borrow_mut().remove(name);
    }

    fn load_descriptor(&self, name: &str) -> GpkgResult<TableDescriptor> {
        if MANDATED_TABLES.contains(&name) {
            if !self.store.table_exists(name)? {
                return Err(GpkgError::not_found("table", name));
            }
            return Ok(TableDescriptor {
                name: name.to_string(),
                kind: TableKind::System,
                identifier: None,
                description: None,
                bounds: None,
                srs_id: None,
                organization: UNKNOWN_ORGANIZATION.to_string(),
                last_change: None,
                fields: self.table_fields(name)?,
            });
        }

        let contents = catalog::contents(&self.store, name)?
            .ok_or_else(|| GpkgError::not_found("table", name))?;
        let mut fields = self.table_fields(name)?;

        for entry in catalog::data_columns(&self.store, name)? {
            if let Some(field) = fields
                .iter_mut()
                .find(|f| f.name.eq_ignore_ascii_case(&entry.column_name))
            {
                field.display_name = entry.name;
                field.title = entry.title;
                field.description = entry.description;
                field.mime_type = entry.mime_type;
                field.constraint_name = entry.constraint_name;
            }
        }
        if let Some(column) = self.feature_id_column(name)? {
            if let Some(field) = fields
                .iter_mut()
                .find(|f| f.name.eq_ignore_ascii_case(&column))
            {
                field.feature_id = true;
            }
        }

        let kind = match contents.kind() {
            Some(DataType::Features) => {
                let geometry_column = catalog::geometry_column(&self.store, name)?.ok_or_else(|| {
                    GpkgError::integrity(format!("Feature table '{}' has no geometry column", name))
                })?;
                let rtree = rtree_table_name(name, &geometry_column.column_name);
                let spatial_index = self.store.table_exists(&rtree)?
                    && catalog::extensions(&self.store, name)?.iter().any(|e| {
                        e.extension_name.eq_ignore_ascii_case(RTREE_EXTENSION)
                            && e.column_name.as_deref().map_or(false, |c| {
                                c.eq_ignore_ascii_case(&geometry_column.column_name)
                            })
                    });
                TableKind::Feature(FeatureInfo {
                    geometry_column,
                    spatial_index,
                })
            }
            Some(DataType::Tiles) => {
                let pyramid = catalog::tile_pyramid(&self.store, name)?.ok_or_else(|| {
                    GpkgError::integrity(format!("Tile table '{}' has no tile matrix set", name))
                })?;
                TableKind::Tile(pyramid)
            }
            _ => TableKind::System,
        };

        let organization = match contents.srs_id {
            Some(srs_id) => catalog::spatial_ref(&self.store, srs_id)?
                .map(|s| s.organization)
                .unwrap_or_else(|| UNKNOWN_ORGANIZATION.to_string()),
            None => UNKNOWN_ORGANIZATION.to_string(),
        };

        Ok(TableDescriptor {
            name: contents.table_name,
            kind,
            identifier: contents.identifier,
            description: contents.description,
            bounds: contents.bounds,
            srs_id: contents.srs_id,
            organization,
            last_change: contents.last_change,
            fields,
        })
    }

    fn table_fields(&self, name: &str) -> GpkgResult<Vec<FieldDescriptor>> {
        let set = self
            .store
            .query(&format!("PRAGMA table_info({})", quote_ident(name)), &[])?;
        set.iter()
            .map(|row| {
                let column = row
                    .text("name")
                    .ok_or_else(|| GpkgError::decode(format!("Column without name in '{}'", name)))?;
                let declared = row.text("type").unwrap_or_default();
                let mut field = FieldDescriptor::new(&column, FieldType::from_declared(&declared)?);
                field.declared_type = declared;
                field.not_null = row.i64("notnull").unwrap_or(0) != 0;
                field.default = row.text("dflt_value");
                field.primary_key = row.i64("pk").unwrap_or(0) != 0;
                Ok(field)
            })
            .collect()
    }

    fn feature_id_column(&self, table: &str) -> GpkgResult<Option<String>> {
        let prefix = format!("{}{}_", FEATURE_ID_INDEX_PREFIX, table);
        let set = self.store.query(
            "SELECT name FROM sqlite_master WHERE type = 'index' AND tbl_name = ?",
            &[Value::from(table)],
        )?;
        let column = set
            .iter()
            .filter_map(|row| row.text("name"))
            .find_map(|index| index.strip_prefix(&prefix).map(str::to_string));
        Ok(column)
    }

    // ---------------------------------------------------------------------
    // Table handles
    // ---------------------------------------------------------------------

    /// Handle on any registered or system table
    pub fn table(&self, name: &str) -> GpkgResult<Table<'_>> {
        Ok(Table::new(self, self.descriptor(name)?))
    }

    pub fn feature_table(&self, name: &str) -> GpkgResult<FeatureTable<'_>> {
        FeatureTable::from_table(self.table(name)?)
    }

    pub fn tile_table(&self, name: &str) -> GpkgResult<TileTable<'_>> {
        TileTable::from_table(self.table(name)?)
    }

    pub fn create_feature_table(
        &self,
        feature_type: &FeatureType,
        bounds: Option<Envelope>,
    ) -> GpkgResult<FeatureTable<'_>> {
        FeatureTable::create(self, feature_type, bounds)
    }

    pub fn create_tile_table(
        &self,
        name: &str,
        bounds: &BoundingBox,
        max_zoom: u32,
        tile_pixels: u32,
        gsd_x: f64,
        gsd_y: f64,
    ) -> GpkgResult<TileTable<'_>> {
        TileTable::create(self, name, bounds, max_zoom, tile_pixels, gsd_x, gsd_y)
    }

    // ---------------------------------------------------------------------
    // Catalog
    // ---------------------------------------------------------------------

    pub fn spatial_ref(&self, srs_id: i32) -> GpkgResult<Option<SpatialRefEntry>> {
        catalog::spatial_ref(&self.store, srs_id)
    }

    pub fn add_spatial_ref(&self, entry: &SpatialRefEntry) -> GpkgResult<()> {
        catalog::add_spatial_ref(&self.store, entry)
    }

    /// Registered tables, optionally of one data type
    pub fn table_names(&self, kind: Option<DataType>) -> GpkgResult<Vec<String>> {
        catalog::table_names(&self.store, kind)
    }

    pub fn add_constraint(&self, constraint: &DataColumnConstraint) -> GpkgResult<()> {
        catalog::add_constraint(&self.store, constraint)
    }

    /// Binds a registered constraint to a column
    pub fn assign_constraint(&self, table: &str, column: &str, constraint: &str) -> GpkgResult<()> {
        catalog::assign_constraint(&self.store, table, column, constraint)?;
        self.invalidate(table);
        Ok(())
    }

    /// Descriptor as a nested map, for display and diagnostics
    pub fn describe_table(&self, name: &str) -> GpkgResult<Value> {
        let d = self.descriptor(name)?;
        let mut map = BTreeMap::new();
        map.insert("name".to_string(), Value::from(d.name.as_str()));
        map.insert("kind".to_string(), Value::from(d.kind.name()));
        map.insert("identifier".to_string(), Value::from(d.identifier.clone()));
        map.insert("description".to_string(), Value::from(d.description.clone()));
        map.insert("srs_id".to_string(), Value::from(d.srs_id));
        map.insert("organization".to_string(), Value::from(d.organization.as_str()));
        map.insert("primary_key".to_string(), Value::from(d.primary_key()));
        map.insert(
            "last_change".to_string(),
            Value::from(d.last_change.map(catalog::format_timestamp)),
        );
        map.insert(
            "bounds".to_string(),
            match d.bounds {
                Some(e) => envelope_map(&e),
                None => Value::Null,
            },
        );

        let mut fields = BTreeMap::new();
        for (position, f) in d.fields.iter().enumerate() {
            let mut field = BTreeMap::new();
            field.insert("position".to_string(), Value::Integer(position as i64));
            field.insert("type".to_string(), Value::from(f.declared_type.as_str()));
            field.insert("not_null".to_string(), Value::Boolean(f.not_null));
            field.insert("primary_key".to_string(), Value::Boolean(f.primary_key));
            field.insert("feature_id".to_string(), Value::Boolean(f.feature_id));
            field.insert("title".to_string(), Value::from(f.title.clone()));
            field.insert("mime_type".to_string(), Value::from(f.mime_type.clone()));
            field.insert("constraint".to_string(), Value::from(f.constraint_name.clone()));
            fields.insert(f.name.clone(), Value::Map(field));
        }
        map.insert("fields".to_string(), Value::Map(fields));

        match &d.kind {
            TableKind::Feature(info) => {
                let g = &info.geometry_column;
                map.insert("geometry_column".to_string(), Value::from(g.column_name.as_str()));
                map.insert(
                    "geometry_type".to_string(),
                    Value::from(g.geometry_type_name.as_str()),
                );
                map.insert("spatial_index".to_string(), Value::Boolean(info.spatial_index));
            }
            TableKind::Tile(pyramid) => {
                map.insert(
                    "zoom_levels".to_string(),
                    Value::Integer(pyramid.matrices.len() as i64),
                );
                map.insert("matrix_set_bounds".to_string(), envelope_map(&pyramid.set.bounds));
            }
            TableKind::System => {}
        }
        Ok(Value::Map(map))
    }
}

fn envelope_map(e: &Envelope) -> Value {
    let mut map = BTreeMap::new();
    map.insert("min_x".to_string(), Value::Real(e.min_x));
    map.insert("max_x".to_string(), Value::Real(e.max_x));
    map.insert("min_y".to_string(), Value::Real(e.min_y));
    map.insert("max_y".to_string(), Value::Real(e.max_y));
    Value::Map(map)
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("path", &self.store.path())
            .field("strict", &self.config.strict)
            .field("cached_descriptors", &self.descriptors.borrow().len())
            .finish()
    }
}

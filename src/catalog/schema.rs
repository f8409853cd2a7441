//! System table, view and trigger definitions installed into a new container

/// Catalog tables every valid container carries
pub const MANDATED_TABLES: [&str; 10] = [
    "gpkg_spatial_ref_sys",
    "gpkg_contents",
    "gpkg_geometry_columns",
    "gpkg_tile_matrix_set",
    "gpkg_tile_matrix",
    "gpkg_data_columns",
    "gpkg_data_column_constraints",
    "gpkg_metadata",
    "gpkg_metadata_reference",
    "gpkg_extensions",
];

/// Read-only companion views
pub const COMPANION_VIEWS: [&str; 4] = [
    "st_spatial_ref_sys",
    "spatial_ref_sys",
    "st_geometry_columns",
    "geometry_columns",
];

pub(crate) const TABLES: [&str; 10] = [
    "CREATE TABLE gpkg_spatial_ref_sys (
        srs_name TEXT NOT NULL,
        srs_id INTEGER NOT NULL PRIMARY KEY,
        organization TEXT NOT NULL,
        organization_coordsys_id INTEGER NOT NULL,
        definition TEXT NOT NULL,
        description TEXT
    )",
    "CREATE TABLE gpkg_contents (
        table_name TEXT NOT NULL PRIMARY KEY,
        data_type TEXT NOT NULL,
        identifier TEXT UNIQUE,
        description TEXT DEFAULT '',
        last_change DATETIME NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
        min_x DOUBLE,
        min_y DOUBLE,
        max_x DOUBLE,
        max_y DOUBLE,
        srs_id INTEGER,
        CONSTRAINT fk_gc_r_srs_id FOREIGN KEY (srs_id) REFERENCES gpkg_spatial_ref_sys(srs_id)
    )",
    "CREATE TABLE gpkg_geometry_columns (
        table_name TEXT NOT NULL,
        column_name TEXT NOT NULL,
        geometry_type_name TEXT NOT NULL,
        srs_id INTEGER NOT NULL,
        z TINYINT NOT NULL,
        m TINYINT NOT NULL,
        CONSTRAINT pk_geom_cols PRIMARY KEY (table_name, column_name),
        CONSTRAINT uk_gc_table_name UNIQUE (table_name),
        CONSTRAINT fk_gc_tn FOREIGN KEY (table_name) REFERENCES gpkg_contents(table_name),
        CONSTRAINT fk_gc_srs FOREIGN KEY (srs_id) REFERENCES gpkg_spatial_ref_sys(srs_id)
    )",
    "CREATE TABLE gpkg_tile_matrix_set (
        table_name TEXT NOT NULL PRIMARY KEY,
        srs_id INTEGER NOT NULL,
        min_x DOUBLE NOT NULL,
        min_y DOUBLE NOT NULL,
        max_x DOUBLE NOT NULL,
        max_y DOUBLE NOT NULL,
        CONSTRAINT fk_gtms_table_name FOREIGN KEY (table_name) REFERENCES gpkg_contents(table_name),
        CONSTRAINT fk_gtms_srs FOREIGN KEY (srs_id) REFERENCES gpkg_spatial_ref_sys(srs_id)
    )",
    "CREATE TABLE gpkg_tile_matrix (
        table_name TEXT NOT NULL,
        zoom_level INTEGER NOT NULL,
        matrix_width INTEGER NOT NULL,
        matrix_height INTEGER NOT NULL,
        tile_width INTEGER NOT NULL,
        tile_height INTEGER NOT NULL,
        pixel_x_size DOUBLE NOT NULL,
        pixel_y_size DOUBLE NOT NULL,
        CONSTRAINT pk_ttm PRIMARY KEY (table_name, zoom_level),
        CONSTRAINT fk_tmm_table_name FOREIGN KEY (table_name) REFERENCES gpkg_contents(table_name)
    )",
    "CREATE TABLE gpkg_data_columns (
        table_name TEXT NOT NULL,
        column_name TEXT NOT NULL,
        name TEXT,
        title TEXT,
        description TEXT,
        mime_type TEXT,
        constraint_name TEXT,
        CONSTRAINT pk_gdc PRIMARY KEY (table_name, column_name),
        CONSTRAINT gdc_tn UNIQUE (table_name, name)
    )",
    "CREATE TABLE gpkg_data_column_constraints (
        constraint_name TEXT NOT NULL,
        constraint_type TEXT NOT NULL,
        value TEXT,
        min NUMERIC,
        min_is_inclusive BOOLEAN,
        max NUMERIC,
        max_is_inclusive BOOLEAN,
        description TEXT,
        CONSTRAINT gdcc_ntv UNIQUE (constraint_name, constraint_type, value)
    )",
    "CREATE TABLE gpkg_metadata (
        id INTEGER CONSTRAINT m_pk PRIMARY KEY ASC NOT NULL,
        md_scope TEXT NOT NULL DEFAULT 'dataset',
        md_standard_uri TEXT NOT NULL,
        mime_type TEXT NOT NULL DEFAULT 'text/xml',
        metadata TEXT NOT NULL DEFAULT ''
    )",
    "CREATE TABLE gpkg_metadata_reference (
        reference_scope TEXT NOT NULL,
        table_name TEXT,
        column_name TEXT,
        row_id_value INTEGER,
        timestamp DATETIME NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
        md_file_id INTEGER NOT NULL,
        md_parent_id INTEGER,
        CONSTRAINT crmr_mfi_fk FOREIGN KEY (md_file_id) REFERENCES gpkg_metadata(id),
        CONSTRAINT crmr_mpi_fk FOREIGN KEY (md_parent_id) REFERENCES gpkg_metadata(id)
    )",
    "CREATE TABLE gpkg_extensions (
        table_name TEXT,
        column_name TEXT,
        extension_name TEXT NOT NULL,
        definition TEXT NOT NULL,
        scope TEXT NOT NULL,
        CONSTRAINT ge_tce UNIQUE (table_name, column_name, extension_name)
    )",
];

pub(crate) const VIEWS: [&str; 4] = [
    "CREATE VIEW st_spatial_ref_sys AS
        SELECT srs_name, srs_id, organization, organization_coordsys_id, definition, description
        FROM gpkg_spatial_ref_sys",
    "CREATE VIEW spatial_ref_sys AS
        SELECT srs_id AS srid, organization AS auth_name, organization_coordsys_id AS auth_srid,
               definition AS srtext
        FROM gpkg_spatial_ref_sys",
    "CREATE VIEW st_geometry_columns AS
        SELECT table_name, column_name, 'ST_' || geometry_type_name AS geometry_type_name,
               g.srs_id, srs_name
        FROM gpkg_geometry_columns AS g JOIN gpkg_spatial_ref_sys AS s
        WHERE g.srs_id = s.srs_id",
    "CREATE VIEW geometry_columns AS
        SELECT table_name AS f_table_name, column_name AS f_geometry_column,
               (CASE geometry_type_name
                    WHEN 'GEOMETRY' THEN 0 WHEN 'POINT' THEN 1 WHEN 'LINESTRING' THEN 2
                    WHEN 'POLYGON' THEN 3 WHEN 'MULTIPOINT' THEN 4 WHEN 'MULTILINESTRING' THEN 5
                    WHEN 'MULTIPOLYGON' THEN 6 WHEN 'GEOMETRYCOLLECTION' THEN 7 ELSE 0 END)
                   AS geometry_type,
               2 + (CASE z WHEN 1 THEN 1 WHEN 2 THEN 1 ELSE 0 END)
                 + (CASE m WHEN 1 THEN 1 WHEN 2 THEN 1 ELSE 0 END) AS coord_dimension,
               srs_id AS srid
        FROM gpkg_geometry_columns",
];

/// Tile-matrix sanity triggers, one insert and one update variant per rule
const TILE_MATRIX_RULES: [(&str, &str, &str); 5] = [
    ("zoom_level", "NEW.zoom_level < 0", "zoom_level cannot be less than 0"),
    ("matrix_width", "NEW.matrix_width < 1", "matrix_width cannot be less than 1"),
    ("matrix_height", "NEW.matrix_height < 1", "matrix_height cannot be less than 1"),
    ("pixel_x_size", "NOT (NEW.pixel_x_size > 0)", "pixel_x_size must be greater than 0"),
    ("pixel_y_size", "NOT (NEW.pixel_y_size > 0)", "pixel_y_size must be greater than 0"),
];

/// Metadata-reference consistency triggers
const METADATA_REFERENCE_RULES: [(&str, &str, &str); 4] = [
    (
        "reference_scope",
        "NOT NEW.reference_scope IN ('geopackage', 'table', 'column', 'row', 'row/col')",
        "reference_scope must be one of geopackage, table, column, row, row/col",
    ),
    (
        "column_name",
        "(NEW.reference_scope IN ('geopackage', 'table', 'row') AND NEW.column_name IS NOT NULL)
            OR (NEW.reference_scope IN ('column', 'row/col') AND NOT NEW.table_name IN (
                SELECT name FROM sqlite_master WHERE type = 'table' AND name = NEW.table_name
                AND sql LIKE ('%' || NEW.column_name || '%')))",
        "column_name must be NULL for this scope or name an existing column",
    ),
    (
        "row_id_value",
        "(NEW.reference_scope IN ('geopackage', 'table', 'column') AND NEW.row_id_value IS NOT NULL)
            OR (NEW.reference_scope IN ('row', 'row/col') AND NEW.row_id_value IS NULL)",
        "row_id_value must be NULL for this scope and set for row scopes",
    ),
    (
        "timestamp",
        "NOT (NEW.timestamp GLOB
            '[1-2][0-9][0-9][0-9]-[0-1][0-9]-[0-3][0-9]T[0-2][0-9]:[0-5][0-9]:[0-5][0-9].[0-9][0-9][0-9]Z'
            AND strftime('%s', NEW.timestamp) NOT NULL)",
        "timestamp must be a valid time in ISO 8601 yyyy-mm-ddThh:mm:ss.cccZ form",
    ),
];

/// Every standard trigger, in install order
pub(crate) fn standard_triggers() -> Vec<String> {
    let mut out = Vec::new();
    for (table, rules) in [
        ("gpkg_tile_matrix", &TILE_MATRIX_RULES[..]),
        ("gpkg_metadata_reference", &METADATA_REFERENCE_RULES[..]),
    ] {
        for (column, condition, message) in rules {
            for (suffix, event) in [
                ("insert", "INSERT".to_string()),
                ("update", format!("UPDATE OF {}", column)),
            ] {
                out.push(format!(
                    "CREATE TRIGGER {table}_{column}_{suffix} BEFORE {event} ON {table}
                     FOR EACH ROW BEGIN
                         SELECT RAISE(ABORT, '{suffix} on table ''{table}'' violates constraint: {message}')
                         WHERE {condition};
                     END",
                    table = table,
                    column = column,
                    suffix = suffix,
                    event = event,
                    message = message,
                    condition = condition,
                ));
            }
        }
    }
    out
}

/// Name and WKT of the well-known reference systems every container starts with
pub(crate) struct DefaultSrs {
    pub name: &'static str,
    pub srs_id: i32,
    pub organization: &'static str,
    pub organization_coordsys_id: i32,
    pub definition: &'static str,
    pub description: &'static str,
}

const WGS84_GEOGCS: &str = "GEOGCS[\"WGS 84\",DATUM[\"WGS_1984\",SPHEROID[\"WGS 84\",6378137,298.257223563,AUTHORITY[\"EPSG\",\"7030\"]],AUTHORITY[\"EPSG\",\"6326\"]],PRIMEM[\"Greenwich\",0,AUTHORITY[\"EPSG\",\"8901\"]],UNIT[\"degree\",0.0174532925199433,AUTHORITY[\"EPSG\",\"9122\"]],AUTHORITY[\"EPSG\",\"4326\"]]";

pub(crate) const DEFAULT_SRS: [DefaultSrs; 5] = [
    DefaultSrs {
        name: "Undefined cartesian SRS",
        srs_id: -1,
        organization: "NONE",
        organization_coordsys_id: -1,
        definition: "undefined",
        description: "undefined cartesian coordinate reference system",
    },
    DefaultSrs {
        name: "Undefined geographic SRS",
        srs_id: 0,
        organization: "NONE",
        organization_coordsys_id: 0,
        definition: "undefined",
        description: "undefined geographic coordinate reference system",
    },
    DefaultSrs {
        name: "WGS 84 geodetic",
        srs_id: 4326,
        organization: "EPSG",
        organization_coordsys_id: 4326,
        definition: WGS84_GEOGCS,
        description: "longitude/latitude coordinates in decimal degrees on the WGS 84 spheroid",
    },
    DefaultSrs {
        name: "WGS 84 / World Mercator",
        srs_id: 3395,
        organization: "EPSG",
        organization_coordsys_id: 3395,
        definition: concat!(
            "PROJCS[\"WGS 84 / World Mercator\",",
            "GEOGCS[\"WGS 84\",DATUM[\"WGS_1984\",SPHEROID[\"WGS 84\",6378137,298.257223563,AUTHORITY[\"EPSG\",\"7030\"]],AUTHORITY[\"EPSG\",\"6326\"]],PRIMEM[\"Greenwich\",0,AUTHORITY[\"EPSG\",\"8901\"]],UNIT[\"degree\",0.0174532925199433,AUTHORITY[\"EPSG\",\"9122\"]],AUTHORITY[\"EPSG\",\"4326\"]],",
            "PROJECTION[\"Mercator_1SP\"],PARAMETER[\"central_meridian\",0],PARAMETER[\"scale_factor\",1],",
            "PARAMETER[\"false_easting\",0],PARAMETER[\"false_northing\",0],",
            "UNIT[\"metre\",1,AUTHORITY[\"EPSG\",\"9001\"]],AXIS[\"Easting\",EAST],AXIS[\"Northing\",NORTH],",
            "AUTHORITY[\"EPSG\",\"3395\"]]"
        ),
        description: "Mercator projection on the WGS 84 ellipsoid",
    },
    DefaultSrs {
        name: "WGS 84 / Pseudo-Mercator",
        srs_id: 3857,
        organization: "EPSG",
        organization_coordsys_id: 3857,
        definition: concat!(
            "PROJCS[\"WGS 84 / Pseudo-Mercator\",",
            "GEOGCS[\"WGS 84\",DATUM[\"WGS_1984\",SPHEROID[\"WGS 84\",6378137,298.257223563,AUTHORITY[\"EPSG\",\"7030\"]],AUTHORITY[\"EPSG\",\"6326\"]],PRIMEM[\"Greenwich\",0,AUTHORITY[\"EPSG\",\"8901\"]],UNIT[\"degree\",0.0174532925199433,AUTHORITY[\"EPSG\",\"9122\"]],AUTHORITY[\"EPSG\",\"4326\"]],",
            "PROJECTION[\"Mercator_1SP\"],PARAMETER[\"central_meridian\",0],PARAMETER[\"scale_factor\",1],",
            "PARAMETER[\"false_easting\",0],PARAMETER[\"false_northing\",0],",
            "UNIT[\"metre\",1,AUTHORITY[\"EPSG\",\"9001\"]],AXIS[\"X\",EAST],AXIS[\"Y\",NORTH],",
            "AUTHORITY[\"EPSG\",\"3857\"]]"
        ),
        description: "Spherical mercator used by web tile services",
    },
];

use crate::error::Result;
use crate::schema::{
    GeoJsonRecord, IconRecord, LayerRecord, OpenGreenMapRecord, Snapshot, StyleOnLayerRecord,
    StyleRecord,
};
use rusqlite::{params, Connection, OpenFlags};
use std::path::Path;

/// Relational copy of the administrative store, read as one snapshot.
///
/// Table and column names follow the admin store: one table per list, file
/// fields stored as `<field>_filename`, relationships as id columns.
pub struct SnapshotDb {
    conn: Connection,
}

impl SnapshotDb {
    /// Open an existing database without write access.
    pub fn open_read_only(path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(SnapshotDb { conn })
    }

    /// Open or create a database and make sure the tables exist.
    pub fn create(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let db = SnapshotDb { conn };
        db.initialize_tables()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = SnapshotDb { conn };
        db.initialize_tables()?;
        Ok(db)
    }

    /// Relationship columns carry no foreign keys: hover links may form
    /// cycles and dangling references are reported by validation instead.
    pub fn initialize_tables(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS "Data_GeoJSON" (
                id TEXT PRIMARY KEY,
                "geoJSON_filename" TEXT,
                "geoJSON_filesize" INTEGER
            );

            CREATE TABLE IF NOT EXISTS "Data_OpenGreenMap" (
                id TEXT PRIMARY KEY,
                "ogmMapId" TEXT NOT NULL DEFAULT ''
            );

            CREATE TABLE IF NOT EXISTS "Layer" (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL DEFAULT '' UNIQUE,
                description TEXT,
                "data_GeoJSON" TEXT,
                "data_OpenGreenMap" TEXT
            );

            CREATE TABLE IF NOT EXISTS "Icon" (
                id TEXT PRIMARY KEY,
                height INTEGER,
                width INTEGER,
                "anchorX" INTEGER,
                "anchorY" INTEGER,
                "bgColor" TEXT,
                "fillColor" TEXT,
                "strokeColor" TEXT,
                svg_filename TEXT,
                svg_filesize INTEGER
            );

            CREATE TABLE IF NOT EXISTS "Style" (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL DEFAULT '' UNIQUE,
                stroke INTEGER NOT NULL DEFAULT 0,
                color TEXT,
                weight REAL,
                opacity REAL,
                "lineCap" TEXT,
                "lineJoin" TEXT,
                "dashArray" TEXT,
                "dashOffset" TEXT,
                fill INTEGER NOT NULL DEFAULT 0,
                "fillColor" TEXT,
                "fillOpacity" REAL,
                "fillRule" TEXT,
                icon TEXT,
                "iconOpacity" REAL,
                "onHover" TEXT
            );

            CREATE TABLE IF NOT EXISTS "StyleOnLayer" (
                id TEXT PRIMARY KEY,
                layer TEXT,
                style TEXT,
                "mapAttrKey" TEXT NOT NULL DEFAULT '',
                "mapAttrVal" TEXT NOT NULL DEFAULT '',
                "mapAttrOper" TEXT NOT NULL DEFAULT '',
                "legendText" TEXT NOT NULL DEFAULT '',
                position INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_style_on_layer_layer ON "StyleOnLayer"(layer, position);
            "#,
        )?;
        Ok(())
    }

    // ── Snapshot Loading ─────────────────────────────────────────────

    /// Read every table inside one transaction so the result is consistent.
    pub fn load_snapshot(&self) -> Result<Snapshot> {
        self.conn.execute_batch("BEGIN DEFERRED TRANSACTION")?;
        let snapshot = self.read_all();
        // A read-only transaction has nothing to roll back; end it either way
        self.conn.execute_batch("COMMIT")?;
        snapshot
    }

    fn read_all(&self) -> Result<Snapshot> {
        Ok(Snapshot {
            layers: self.read_layers()?,
            styles: self.read_styles()?,
            style_rules: self.read_style_rules()?,
            icons: self.read_icons()?,
            geojson_files: self.read_geojson_files()?,
            open_green_maps: self.read_open_green_maps()?,
        })
    }

    fn read_layers(&self) -> Result<Vec<LayerRecord>> {
        let mut stmt = self.conn.prepare(
            r#"SELECT id, title, description, "data_GeoJSON", "data_OpenGreenMap"
               FROM "Layer" ORDER BY rowid"#,
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(LayerRecord {
                id: row.get(0)?,
                title: row.get(1)?,
                description: row.get(2)?,
                data_geojson: row.get(3)?,
                data_open_green_map: row.get(4)?,
            })
        })?;

        let mut layers = Vec::new();
        for row in rows {
            layers.push(row?);
        }
        Ok(layers)
    }

    fn read_styles(&self) -> Result<Vec<StyleRecord>> {
        let mut stmt = self.conn.prepare(
            r#"SELECT id, title, stroke, color, weight, opacity, "lineCap", "lineJoin",
                      "dashArray", "dashOffset", fill, "fillColor", "fillOpacity", "fillRule",
                      icon, "iconOpacity", "onHover"
               FROM "Style" ORDER BY rowid"#,
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(StyleRecord {
                id: row.get(0)?,
                title: row.get(1)?,
                stroke: row.get(2)?,
                color: row.get(3)?,
                weight: row.get(4)?,
                opacity: row.get(5)?,
                line_cap: row.get(6)?,
                line_join: row.get(7)?,
                dash_array: row.get(8)?,
                dash_offset: row.get(9)?,
                fill: row.get(10)?,
                fill_color: row.get(11)?,
                fill_opacity: row.get(12)?,
                fill_rule: row.get(13)?,
                icon: row.get(14)?,
                icon_opacity: row.get(15)?,
                on_hover: row.get(16)?,
            })
        })?;

        let mut styles = Vec::new();
        for row in rows {
            styles.push(row?);
        }
        Ok(styles)
    }

    /// Rules come out in evaluation order: by position, then insertion order.
    fn read_style_rules(&self) -> Result<Vec<StyleOnLayerRecord>> {
        let mut stmt = self.conn.prepare(
            r#"SELECT id, layer, style, "mapAttrKey", "mapAttrVal", "mapAttrOper",
                      "legendText", position
               FROM "StyleOnLayer"
               ORDER BY layer, position IS NULL, position, rowid"#,
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(StyleOnLayerRecord {
                id: row.get(0)?,
                layer: row.get(1)?,
                style: row.get(2)?,
                map_attr_key: row.get(3)?,
                map_attr_val: row.get(4)?,
                map_attr_oper: row.get(5)?,
                legend_text: row.get(6)?,
                position: row.get(7)?,
            })
        })?;

        let mut rules = Vec::new();
        for row in rows {
            rules.push(row?);
        }
        Ok(rules)
    }

    fn read_icons(&self) -> Result<Vec<IconRecord>> {
        let mut stmt = self.conn.prepare(
            r#"SELECT id, width, height, "anchorX", "anchorY", "bgColor", "fillColor",
                      "strokeColor", svg_filename
               FROM "Icon" ORDER BY rowid"#,
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(IconRecord {
                id: row.get(0)?,
                width: row.get(1)?,
                height: row.get(2)?,
                anchor_x: row.get(3)?,
                anchor_y: row.get(4)?,
                bg_color: row.get(5)?,
                fill_color: row.get(6)?,
                stroke_color: row.get(7)?,
                svg: row.get(8)?,
            })
        })?;

        let mut icons = Vec::new();
        for row in rows {
            icons.push(row?);
        }
        Ok(icons)
    }

    fn read_geojson_files(&self) -> Result<Vec<GeoJsonRecord>> {
        let mut stmt = self
            .conn
            .prepare(r#"SELECT id, "geoJSON_filename" FROM "Data_GeoJSON" ORDER BY rowid"#)?;
        let rows = stmt.query_map([], |row| {
            Ok(GeoJsonRecord {
                id: row.get(0)?,
                geo_json: row.get(1)?,
            })
        })?;

        let mut files = Vec::new();
        for row in rows {
            files.push(row?);
        }
        Ok(files)
    }

    fn read_open_green_maps(&self) -> Result<Vec<OpenGreenMapRecord>> {
        let mut stmt = self
            .conn
            .prepare(r#"SELECT id, "ogmMapId" FROM "Data_OpenGreenMap" ORDER BY rowid"#)?;
        let rows = stmt.query_map([], |row| {
            Ok(OpenGreenMapRecord {
                id: row.get(0)?,
                ogm_map_id: row.get(1)?,
            })
        })?;

        let mut maps = Vec::new();
        for row in rows {
            maps.push(row?);
        }
        Ok(maps)
    }

    // ── Seeding ──────────────────────────────────────────────────────

    /// Replace the database contents with `snapshot`.
    /// All-or-nothing: a failing insert rolls the whole import back.
    pub fn import_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        self.conn.execute_batch("BEGIN TRANSACTION")?;
        match self.write_all(snapshot) {
            Ok(()) => {
                self.conn.execute_batch("COMMIT")?;
                Ok(())
            }
            Err(e) => {
                self.conn.execute_batch("ROLLBACK")?;
                Err(e)
            }
        }
    }

    fn write_all(&self, snapshot: &Snapshot) -> Result<()> {
        self.conn.execute_batch(
            r#"
            DELETE FROM "StyleOnLayer";
            DELETE FROM "Layer";
            DELETE FROM "Style";
            DELETE FROM "Icon";
            DELETE FROM "Data_GeoJSON";
            DELETE FROM "Data_OpenGreenMap";
            "#,
        )?;

        for file in &snapshot.geojson_files {
            self.conn.execute(
                r#"INSERT INTO "Data_GeoJSON" (id, "geoJSON_filename") VALUES (?1, ?2)"#,
                params![file.id, file.geo_json],
            )?;
        }
        for ogm in &snapshot.open_green_maps {
            self.conn.execute(
                r#"INSERT INTO "Data_OpenGreenMap" (id, "ogmMapId") VALUES (?1, ?2)"#,
                params![ogm.id, ogm.ogm_map_id],
            )?;
        }
        for icon in &snapshot.icons {
            self.conn.execute(
                r#"INSERT INTO "Icon"
                   (id, width, height, "anchorX", "anchorY", "bgColor", "fillColor", "strokeColor", svg_filename)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"#,
                params![
                    icon.id,
                    icon.width,
                    icon.height,
                    icon.anchor_x,
                    icon.anchor_y,
                    icon.bg_color,
                    icon.fill_color,
                    icon.stroke_color,
                    icon.svg
                ],
            )?;
        }
        for style in &snapshot.styles {
            self.conn.execute(
                r#"INSERT INTO "Style"
                   (id, title, stroke, color, weight, opacity, "lineCap", "lineJoin", "dashArray",
                    "dashOffset", fill, "fillColor", "fillOpacity", "fillRule", icon, "iconOpacity", "onHover")
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)"#,
                params![
                    style.id,
                    style.title,
                    style.stroke,
                    style.color,
                    style.weight,
                    style.opacity,
                    style.line_cap,
                    style.line_join,
                    style.dash_array,
                    style.dash_offset,
                    style.fill,
                    style.fill_color,
                    style.fill_opacity,
                    style.fill_rule,
                    style.icon,
                    style.icon_opacity,
                    style.on_hover
                ],
            )?;
        }
        for layer in &snapshot.layers {
            self.conn.execute(
                r#"INSERT INTO "Layer"
                   (id, title, description, "data_GeoJSON", "data_OpenGreenMap")
                   VALUES (?1, ?2, ?3, ?4, ?5)"#,
                params![
                    layer.id,
                    layer.title,
                    layer.description,
                    layer.data_geojson,
                    layer.data_open_green_map
                ],
            )?;
        }
        for rule in &snapshot.style_rules {
            self.conn.execute(
                r#"INSERT INTO "StyleOnLayer"
                   (id, layer, style, "mapAttrKey", "mapAttrVal", "mapAttrOper", "legendText", position)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
                params![
                    rule.id,
                    rule.layer,
                    rule.style,
                    rule.map_attr_key,
                    rule.map_attr_val,
                    rule.map_attr_oper,
                    rule.legend_text,
                    rule.position
                ],
            )?;
        }
        Ok(())
    }
}

//! Tag definition records
//!
//! A [`TagRecord`] describes one tag hardware model: display dimensions,
//! color capabilities, buffer format and rotation, LUT configuration and
//! content compatibility. Records arrive in two vocabularies - the wire
//! shape served by the remote definition repository and the storage shape
//! persisted locally (which additionally accepts older key spellings).
//! Both canonicalize into the same in-memory record through
//! [`TagRecord::from_parts`], so a record is never partially constructed:
//! every field resolves through a deterministic default when absent.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Default display width in pixels
pub const DEFAULT_WIDTH: u32 = 296;
/// Default display height in pixels
pub const DEFAULT_HEIGHT: u32 = 128;
/// Default color depth in bits per pixel
pub const DEFAULT_BPP: u8 = 2;
/// Default short LUT configuration
pub const DEFAULT_SHORT_LUT: u8 = 2;
/// Default definition format version
pub const DEFAULT_VERSION: u32 = 1;

/// Mapping of color names to RGB triples
pub type ColorTable = BTreeMap<String, [u8; 3]>;

/// Display name used for tag types without a definition
pub fn unknown_type_name(type_id: u16) -> String {
    format!("Unknown Type {}", type_id)
}

/// Color table used when a definition does not carry one
pub fn default_color_table() -> ColorTable {
    BTreeMap::from([
        ("white".to_string(), [255, 255, 255]),
        ("black".to_string(), [0, 0, 0]),
        ("red".to_string(), [255, 0, 0]),
    ])
}

/// Buffer rotation applied before transmitting an image to the tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum BufferRotation {
    /// No rotation
    #[default]
    None,
    /// Rotate 90 degrees clockwise
    Cw90,
    /// Rotate 180 degrees
    Cw180,
    /// Rotate 270 degrees clockwise
    Cw270,
}

impl From<u8> for BufferRotation {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::Cw90,
            2 => Self::Cw180,
            3 => Self::Cw270,
            // Out-of-range values degrade to the default
            _ => Self::None,
        }
    }
}

impl From<BufferRotation> for u8 {
    fn from(value: BufferRotation) -> Self {
        match value {
            BufferRotation::None => 0,
            BufferRotation::Cw90 => 1,
            BufferRotation::Cw180 => 2,
            BufferRotation::Cw270 => 3,
        }
    }
}

/// One tag hardware definition, canonical in-memory shape
#[derive(Debug, Clone, PartialEq)]
pub struct TagRecord {
    /// Numeric identifier for the tag type
    pub type_id: u16,
    /// Format version of the definition
    pub version: u32,
    /// Human-readable name of the tag model
    pub name: String,
    /// Display width in pixels
    pub width: u32,
    /// Display height in pixels
    pub height: u32,
    /// Buffer rotation setting
    pub rotate_buffer: BufferRotation,
    /// Bits per pixel (color depth)
    pub bpp: u8,
    /// Mapping of color names to RGB values
    pub color_table: ColorTable,
    /// Short LUT configuration
    pub short_lut: u8,
    /// Additional tag options
    pub options: Vec<String>,
    /// Compatible content IDs
    pub content_ids: Vec<u32>,
    /// Template configuration (passed through opaquely)
    pub template: Value,
    /// Template usage settings
    pub use_template: Option<Value>,
    /// Compression settings
    pub zlib_compression: Option<Value>,
}

/// Field set shared by both input vocabularies, prior to defaulting
///
/// Both [`WireRecord`] and [`StoredRecord`] reduce to this shape, so the
/// defaulting rules live in exactly one place ([`TagRecord::from_parts`]).
#[derive(Debug, Clone, Default)]
pub struct RecordParts {
    pub version: Option<u32>,
    pub name: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub rotate_buffer: Option<u8>,
    pub bpp: Option<u8>,
    pub color_table: Option<ColorTable>,
    pub short_lut: Option<u8>,
    pub options: Option<Vec<String>>,
    pub content_ids: Option<Vec<u32>>,
    pub template: Option<Value>,
    pub use_template: Option<Value>,
    pub zlib_compression: Option<Value>,
}

/// A tag definition as served by the remote repository
#[derive(Debug, Clone, Deserialize)]
pub struct WireRecord {
    #[serde(default)]
    pub version: Option<u32>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub rotatebuffer: Option<u8>,
    #[serde(default)]
    pub bpp: Option<u8>,
    #[serde(default)]
    pub colortable: Option<ColorTable>,
    #[serde(default)]
    pub shortlut: Option<u8>,
    #[serde(default)]
    pub options: Option<Vec<String>>,
    #[serde(default)]
    pub contentids: Option<Vec<u32>>,
    #[serde(default)]
    pub template: Option<Value>,
    #[serde(default)]
    pub usetemplate: Option<Value>,
    #[serde(default)]
    pub zlib_compression: Option<Value>,
}

impl WireRecord {
    /// Check that the definition carries all required fields
    ///
    /// A usable remote definition must include version, name, width and
    /// height; everything else has defaults.
    pub fn has_required_fields(&self) -> bool {
        self.version.is_some()
            && self.name.is_some()
            && self.width.is_some()
            && self.height.is_some()
    }

    pub fn into_parts(self) -> RecordParts {
        RecordParts {
            version: self.version,
            name: self.name,
            width: self.width,
            height: self.height,
            rotate_buffer: self.rotatebuffer,
            bpp: self.bpp,
            color_table: self.colortable,
            short_lut: self.shortlut,
            options: self.options,
            content_ids: self.contentids,
            template: self.template,
            use_template: self.usetemplate,
            zlib_compression: self.zlib_compression,
        }
    }
}

/// A tag definition as persisted locally
///
/// Canonical keys match the wire vocabulary; deserialization additionally
/// accepts the older storage spellings (`short_lut`, `content_ids`) so
/// payloads written by previous releases still load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    #[serde(default)]
    pub version: Option<u32>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub rotatebuffer: Option<u8>,
    #[serde(default)]
    pub bpp: Option<u8>,
    #[serde(default)]
    pub colortable: Option<ColorTable>,
    #[serde(default, alias = "short_lut")]
    pub shortlut: Option<u8>,
    #[serde(default)]
    pub options: Option<Vec<String>>,
    #[serde(default, alias = "content_ids")]
    pub contentids: Option<Vec<u32>>,
    #[serde(default)]
    pub template: Option<Value>,
    #[serde(default)]
    pub usetemplate: Option<Value>,
    #[serde(default)]
    pub zlib_compression: Option<Value>,
}

impl StoredRecord {
    pub fn into_parts(self) -> RecordParts {
        RecordParts {
            version: self.version,
            name: self.name,
            width: self.width,
            height: self.height,
            rotate_buffer: self.rotatebuffer,
            bpp: self.bpp,
            color_table: self.colortable,
            short_lut: self.shortlut,
            options: self.options,
            content_ids: self.contentids,
            template: self.template,
            use_template: self.usetemplate,
            zlib_compression: self.zlib_compression,
        }
    }
}

/// Names accepted by [`TagRecord::field`]
pub const FIELD_NAMES: &[&str] = &[
    "type_id",
    "version",
    "name",
    "width",
    "height",
    "rotate_buffer",
    "bpp",
    "color_table",
    "short_lut",
    "options",
    "content_ids",
    "template",
    "use_template",
    "zlib_compression",
];

impl TagRecord {
    /// Build a record from an input field set, resolving defaults
    pub fn from_parts(type_id: u16, parts: RecordParts) -> Self {
        Self {
            type_id,
            version: parts.version.unwrap_or(DEFAULT_VERSION),
            name: parts.name.unwrap_or_else(|| unknown_type_name(type_id)),
            width: parts.width.unwrap_or(DEFAULT_WIDTH),
            height: parts.height.unwrap_or(DEFAULT_HEIGHT),
            rotate_buffer: BufferRotation::from(parts.rotate_buffer.unwrap_or(0)),
            bpp: parts.bpp.unwrap_or(DEFAULT_BPP),
            color_table: parts.color_table.unwrap_or_else(default_color_table),
            short_lut: parts.short_lut.unwrap_or(DEFAULT_SHORT_LUT),
            options: parts.options.unwrap_or_default(),
            content_ids: parts.content_ids.unwrap_or_default(),
            template: parts.template.unwrap_or_else(|| json!({})),
            use_template: parts.use_template,
            zlib_compression: parts.zlib_compression,
        }
    }

    /// Build a record from a remote wire-format definition
    pub fn from_wire(type_id: u16, wire: WireRecord) -> Self {
        Self::from_parts(type_id, wire.into_parts())
    }

    /// Reconstruct a record from its persisted shape
    pub fn from_stored(type_id: u16, stored: StoredRecord) -> Self {
        Self::from_parts(type_id, stored.into_parts())
    }

    /// Convert to the canonical persisted shape
    ///
    /// Round-trip safe: `from_stored(id, r.to_stored())` reproduces `r`
    /// for every field the storage shape captures.
    pub fn to_stored(&self) -> StoredRecord {
        StoredRecord {
            version: Some(self.version),
            name: Some(self.name.clone()),
            width: Some(self.width),
            height: Some(self.height),
            rotatebuffer: Some(u8::from(self.rotate_buffer)),
            bpp: Some(self.bpp),
            colortable: Some(self.color_table.clone()),
            shortlut: Some(self.short_lut),
            options: Some(self.options.clone()),
            contentids: Some(self.content_ids.clone()),
            template: Some(self.template.clone()),
            usetemplate: self.use_template.clone(),
            zlib_compression: self.zlib_compression.clone(),
        }
    }

    /// Display dimensions as a (width, height) pair
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Look up a field by name over the fixed field set
    ///
    /// Returns `None` for names outside [`FIELD_NAMES`]. Generic callers
    /// that do not know the attribute set ahead of time use this instead
    /// of reflective access.
    pub fn field(&self, name: &str) -> Option<Value> {
        let value = match name {
            "type_id" => json!(self.type_id),
            "version" => json!(self.version),
            "name" => json!(self.name),
            "width" => json!(self.width),
            "height" => json!(self.height),
            "rotate_buffer" => json!(u8::from(self.rotate_buffer)),
            "bpp" => json!(self.bpp),
            "color_table" => json!(self.color_table),
            "short_lut" => json!(self.short_lut),
            "options" => json!(self.options),
            "content_ids" => json!(self.content_ids),
            "template" => self.template.clone(),
            "use_template" => self.use_template.clone().unwrap_or(Value::Null),
            "zlib_compression" => self.zlib_compression.clone().unwrap_or(Value::Null),
            _ => return None,
        };
        Some(value)
    }

    /// Look up a field by name, with a caller-supplied default
    pub fn field_or(&self, name: &str, default: Value) -> Value {
        self.field(name).unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_defaults() {
        let wire: WireRecord = serde_json::from_str(
            r#"{"version": 3, "name": "M3 2.9\"", "width": 384, "height": 168}"#,
        )
        .unwrap();
        assert!(wire.has_required_fields());

        let record = TagRecord::from_wire(51, wire);
        assert_eq!(record.type_id, 51);
        assert_eq!(record.version, 3);
        assert_eq!(record.name, "M3 2.9\"");
        assert_eq!(record.dimensions(), (384, 168));
        assert_eq!(record.bpp, DEFAULT_BPP);
        assert_eq!(record.short_lut, DEFAULT_SHORT_LUT);
        assert_eq!(record.rotate_buffer, BufferRotation::None);
        assert_eq!(record.color_table, default_color_table());
        assert!(record.options.is_empty());
        assert!(record.content_ids.is_empty());
        assert_eq!(record.template, serde_json::json!({}));
        assert!(record.use_template.is_none());
    }

    #[test]
    fn test_wire_full() {
        let wire: WireRecord = serde_json::from_str(
            r#"{
                "version": 2,
                "name": "Chroma29 2.9\"",
                "width": 296,
                "height": 128,
                "rotatebuffer": 1,
                "bpp": 4,
                "shortlut": 1,
                "colortable": {"white": [255, 255, 255], "black": [0, 0, 0]},
                "options": ["nfc"],
                "contentids": [0, 1, 21],
                "template": {"top": 10}
            }"#,
        )
        .unwrap();

        let record = TagRecord::from_wire(130, wire);
        assert_eq!(record.rotate_buffer, BufferRotation::Cw90);
        assert_eq!(record.bpp, 4);
        assert_eq!(record.short_lut, 1);
        assert_eq!(record.color_table.len(), 2);
        assert_eq!(record.options, vec!["nfc".to_string()]);
        assert_eq!(record.content_ids, vec![0, 1, 21]);
        assert_eq!(record.template, serde_json::json!({"top": 10}));
    }

    #[test]
    fn test_missing_required_fields() {
        let wire: WireRecord =
            serde_json::from_str(r#"{"name": "incomplete", "width": 296}"#).unwrap();
        assert!(!wire.has_required_fields());
    }

    #[test]
    fn test_storage_round_trip() {
        let wire: WireRecord = serde_json::from_str(
            r#"{
                "version": 5,
                "name": "M2 2.9\"",
                "width": 296,
                "height": 128,
                "rotatebuffer": 3,
                "bpp": 2,
                "options": ["fastboot"],
                "contentids": [4, 5],
                "usetemplate": "m2",
                "zlib_compression": true
            }"#,
        )
        .unwrap();
        let record = TagRecord::from_wire(1, wire);

        let stored = record.to_stored();
        let json = serde_json::to_string(&stored).unwrap();
        let reloaded: StoredRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(TagRecord::from_stored(1, reloaded), record);
    }

    #[test]
    fn test_legacy_storage_keys() {
        // Older releases persisted short_lut and content_ids
        let stored: StoredRecord = serde_json::from_str(
            r#"{
                "version": 1,
                "name": "legacy",
                "width": 200,
                "height": 200,
                "short_lut": 1,
                "content_ids": [7, 8]
            }"#,
        )
        .unwrap();

        let record = TagRecord::from_stored(87, stored);
        assert_eq!(record.short_lut, 1);
        assert_eq!(record.content_ids, vec![7, 8]);
    }

    #[test]
    fn test_canonical_storage_keys_emitted() {
        let record = TagRecord::from_parts(3, RecordParts::default());
        let json = serde_json::to_value(record.to_stored()).unwrap();
        assert!(json.get("shortlut").is_some());
        assert!(json.get("contentids").is_some());
        assert!(json.get("short_lut").is_none());
        assert!(json.get("content_ids").is_none());
    }

    #[test]
    fn test_buffer_rotation_out_of_range() {
        assert_eq!(BufferRotation::from(7), BufferRotation::None);
        assert_eq!(u8::from(BufferRotation::Cw270), 3);
    }

    #[test]
    fn test_field_accessor() {
        let record = TagRecord::from_parts(9, RecordParts::default());
        assert_eq!(record.field("width"), Some(serde_json::json!(296)));
        assert_eq!(record.field("name"), Some(serde_json::json!("Unknown Type 9")));
        assert_eq!(record.field("no_such_field"), None);
        assert_eq!(
            record.field_or("no_such_field", serde_json::json!(42)),
            serde_json::json!(42)
        );
        for name in FIELD_NAMES {
            assert!(record.field(name).is_some(), "field {} must resolve", name);
        }
    }
}

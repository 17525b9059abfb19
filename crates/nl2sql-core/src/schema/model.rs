//! The input schema (spec §3.1): tables, columns, foreign keys, indexes, and
//! flattened relationships, plus the deterministic schema fingerprint.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// A column within a [`Table`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    /// The original SQL type string (e.g. `"VARCHAR(255)"`, `"bigint"`).
    #[serde(rename = "type")]
    pub sql_type: String,
    pub nullable: bool,
    #[serde(default)]
    pub primary_key: bool,
}

/// A foreign key constraint on a [`Table`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub constrained_columns: Vec<String>,
    pub referred_table: String,
    pub referred_columns: Vec<String>,
}

/// An index definition, carried through for completeness; unused by the
/// pipeline itself but part of the ingestion contract (spec §3.1).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    pub name: String,
    pub columns: Vec<String>,
    #[serde(default)]
    pub unique: bool,
}

/// A single table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<Column>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKey>,
    #[serde(default)]
    pub indexes: Vec<Index>,
}

/// A flattened relationship between two tables, derived from (or supplied
/// alongside) foreign keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub from_table: String,
    pub from_columns: Vec<String>,
    pub to_table: String,
    pub to_columns: Vec<String>,
}

/// The full schema for one database, keyed by database identifier at the
/// collaborator boundary (spec §3.1); this type is the value side of that
/// mapping. Table insertion order is preserved and drives the canonical
/// view's `table_names_original` ordering (spec §3.2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub db_id: String,
    pub tables: IndexMap<String, Table>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

/// First 16 hex characters of a SHA-256 hash over the schema's canonical
/// JSON (sorted keys). Two schemas are semantically equal iff their
/// fingerprints match (spec §3.1 invariant).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchemaFingerprint(
    #[serde(with = "fingerprint_hex")] pub(crate) [u8; 8], // 16 hex chars = 8 bytes
);

impl fmt::Display for SchemaFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

mod fingerprint_hex {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 8], s: S) -> Result<S::Ok, S::Error> {
        let mut hex = String::with_capacity(16);
        for b in bytes {
            hex.push_str(&format!("{b:02x}"));
        }
        s.serialize_str(&hex)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 8], D::Error> {
        let hex = String::deserialize(d)?;
        let mut out = [0u8; 8];
        for (i, chunk) in hex.as_bytes().chunks(2).take(8).enumerate() {
            let s = std::str::from_utf8(chunk).map_err(serde::de::Error::custom)?;
            out[i] = u8::from_str_radix(s, 16).map_err(serde::de::Error::custom)?;
        }
        Ok(out)
    }
}

impl Schema {
    /// Computes the deterministic fingerprint of this schema.
    ///
    /// `serde_json::Value`'s object representation is a `BTreeMap` by
    /// default (the `preserve_order` feature is not enabled in this crate),
    /// so round-tripping through `to_value` before serializing to bytes
    /// re-sorts every object's keys regardless of the source `IndexMap`'s
    /// insertion order — which is exactly the "canonical JSON with sorted
    /// keys" the spec calls for, without a bespoke canonicalizer.
    pub fn fingerprint(&self) -> SchemaFingerprint {
        let value = serde_json::to_value(self).expect("Schema serialization cannot fail");
        let canonical = serde_json::to_vec(&value).expect("Value serialization cannot fail");
        let digest = Sha256::digest(&canonical);
        let mut out = [0u8; 8];
        out.copy_from_slice(&digest[..8]);
        SchemaFingerprint(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_schema() -> Schema {
        let mut tables = IndexMap::new();
        tables.insert(
            "customers".to_string(),
            Table {
                columns: vec![Column {
                    name: "customer_id".to_string(),
                    sql_type: "int".to_string(),
                    nullable: false,
                    primary_key: true,
                }],
                foreign_keys: vec![],
                indexes: vec![],
            },
        );
        Schema {
            db_id: "shop".to_string(),
            tables,
            relationships: vec![],
        }
    }

    #[test]
    fn fingerprint_is_16_hex_chars() {
        let fp = sample_schema().fingerprint();
        assert_eq!(fp.to_string().len(), 16);
    }

    #[test]
    fn fingerprint_is_deterministic() {
        let s = sample_schema();
        assert_eq!(s.fingerprint(), s.fingerprint());
    }

    #[test]
    fn fingerprint_changes_with_content() {
        let mut s2 = sample_schema();
        s2.db_id = "other".to_string();
        assert_ne!(sample_schema().fingerprint(), s2.fingerprint());
    }

    #[test]
    fn fingerprint_insensitive_to_table_insertion_order() {
        let col = |n: &str| Column {
            name: n.to_string(),
            sql_type: "int".to_string(),
            nullable: false,
            primary_key: false,
        };
        let table = |c: &str| Table {
            columns: vec![col(c)],
            foreign_keys: vec![],
            indexes: vec![],
        };

        let mut forward = IndexMap::new();
        forward.insert("a".to_string(), table("id"));
        forward.insert("b".to_string(), table("id"));
        let s1 = Schema {
            db_id: "x".to_string(),
            tables: forward,
            relationships: vec![],
        };

        let mut backward = IndexMap::new();
        backward.insert("b".to_string(), table("id"));
        backward.insert("a".to_string(), table("id"));
        let s2 = Schema {
            db_id: "x".to_string(),
            tables: backward,
            relationships: vec![],
        };

        assert_eq!(s1.fingerprint(), s2.fingerprint());
    }
}

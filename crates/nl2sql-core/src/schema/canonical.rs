//! The canonical (Spider-style) schema view and the converter that produces
//! it (spec §3.2, §4.1).

use super::model::Schema;
use serde::{Deserialize, Serialize};

/// Coarse type classification used by the GAT ranker's node features and by
/// the Intelligent Fallback's calculation-column heuristics (spec §3.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Number,
    Text,
    Time,
    Boolean,
    Others,
}

impl ColumnType {
    /// Classifies a raw SQL type string per the mapping rules of spec §3.2.
    pub fn classify(sql_type: &str) -> Self {
        let t = sql_type.trim().to_ascii_lowercase();
        let starts_with_any = |prefixes: &[&str]| prefixes.iter().any(|p| t.starts_with(p));

        if starts_with_any(&[
            "int", "dec", "num", "float", "double", "real", "bigint", "smallint",
        ]) {
            ColumnType::Number
        } else if starts_with_any(&["date", "time", "year"]) {
            ColumnType::Time
        } else if starts_with_any(&["bool", "bit"]) {
            ColumnType::Boolean
        } else if starts_with_any(&["varchar", "char", "text", "enum", "set", "json", "blob"]) {
            ColumnType::Text
        } else {
            ColumnType::Others
        }
    }
}

/// `(table_index, column_name)`, with the sentinel `(-1, "*")` at index 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRef {
    pub table_index: i32,
    pub column_name: String,
}

/// The flattened, index-addressed schema view consumed by the GAT ranker
/// (spec §3.2). Column indices are stable across conversion and ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalSchema {
    pub db_id: String,
    pub table_names_original: Vec<String>,
    pub column_names_original: Vec<ColumnRef>,
    pub column_types: Vec<ColumnType>,
    pub primary_keys: Vec<usize>,
    /// `(child_column_index, parent_column_index)` pairs.
    pub foreign_keys: Vec<(usize, usize)>,
}

impl CanonicalSchema {
    pub fn table_index(&self, name: &str) -> Option<usize> {
        self.table_names_original.iter().position(|t| t == name)
    }

    pub fn column_index(&self, table: &str, column: &str) -> Option<usize> {
        let table_idx = self.table_index(table)? as i32;
        self.column_names_original
            .iter()
            .position(|c| c.table_index == table_idx && c.column_name == column)
    }

    /// Columns belonging to the given table, in canonical order.
    pub fn columns_of(&self, table_idx: usize) -> impl Iterator<Item = (usize, &ColumnRef)> {
        self.column_names_original
            .iter()
            .enumerate()
            .filter(move |(_, c)| c.table_index == table_idx as i32)
    }
}

/// Converts an input [`Schema`] to its [`CanonicalSchema`] view.
///
/// Pure and total over well-formed schemas (spec §4.1): table and column
/// order follow the input's insertion order, a foreign key referring to an
/// unknown column is dropped (with a `tracing::warn!`, not an error), and an
/// unrecognized type string maps to [`ColumnType::Others`].
pub fn convert(schema: &Schema) -> CanonicalSchema {
    let table_names_original: Vec<String> = schema.tables.keys().cloned().collect();

    let mut column_names_original = vec![ColumnRef {
        table_index: -1,
        column_name: "*".to_string(),
    }];
    let mut column_types = vec![ColumnType::Others];
    let mut primary_keys = Vec::new();

    for (table_idx, table_name) in table_names_original.iter().enumerate() {
        let table = &schema.tables[table_name];
        for column in &table.columns {
            let col_idx = column_names_original.len();
            column_names_original.push(ColumnRef {
                table_index: table_idx as i32,
                column_name: column.name.clone(),
            });
            column_types.push(ColumnType::classify(&column.sql_type));
            if column.primary_key {
                primary_keys.push(col_idx);
            }
        }
    }

    let mut canonical = CanonicalSchema {
        db_id: schema.db_id.clone(),
        table_names_original,
        column_names_original,
        column_types,
        primary_keys,
        foreign_keys: Vec::new(),
    };

    for (table_name, table) in &schema.tables {
        for fk in &table.foreign_keys {
            for (child_col, parent_col) in fk.constrained_columns.iter().zip(&fk.referred_columns)
            {
                let child_idx = canonical.column_index(table_name, child_col);
                let parent_idx = canonical.column_index(&fk.referred_table, parent_col);
                match (child_idx, parent_idx) {
                    (Some(c), Some(p)) => canonical.foreign_keys.push((c, p)),
                    _ => {
                        #[cfg(feature = "tracing")]
                        tracing::warn!(
                            table = %table_name,
                            child_column = %child_col,
                            referred_table = %fk.referred_table,
                            referred_column = %parent_col,
                            "dropping foreign key referring to an unknown column"
                        );
                    }
                }
            }
        }
    }

    canonical
}

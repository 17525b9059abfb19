//! Shared fixtures for the top-level integration tests: the e-commerce
//! schema named throughout spec §8's testable properties and scenarios.

use indexmap::IndexMap;
use nl2sql_core::schema::model::{Column, ForeignKey, Schema, Table};

/// `customers`, `orders` and `order_items`, with the FK chain
/// `order_items -> orders -> customers`.
pub fn ecommerce_schema() -> Schema {
    let mut tables = IndexMap::new();

    tables.insert(
        "customers".to_string(),
        Table {
            columns: vec![
                Column { name: "customer_id".into(), sql_type: "int".into(), nullable: false, primary_key: true },
                Column { name: "name".into(), sql_type: "varchar(255)".into(), nullable: false, primary_key: false },
                Column { name: "email".into(), sql_type: "varchar(255)".into(), nullable: false, primary_key: false },
                Column { name: "country".into(), sql_type: "varchar(64)".into(), nullable: false, primary_key: false },
                Column { name: "total_spent".into(), sql_type: "decimal(10,2)".into(), nullable: false, primary_key: false },
            ],
            foreign_keys: vec![],
            indexes: vec![],
        },
    );

    tables.insert(
        "orders".to_string(),
        Table {
            columns: vec![
                Column { name: "order_id".into(), sql_type: "int".into(), nullable: false, primary_key: true },
                Column { name: "customer_id".into(), sql_type: "int".into(), nullable: false, primary_key: false },
                Column { name: "order_date".into(), sql_type: "date".into(), nullable: false, primary_key: false },
                Column { name: "status".into(), sql_type: "varchar(32)".into(), nullable: false, primary_key: false },
                Column { name: "total_amount".into(), sql_type: "decimal(10,2)".into(), nullable: false, primary_key: false },
            ],
            foreign_keys: vec![ForeignKey {
                constrained_columns: vec!["customer_id".into()],
                referred_table: "customers".into(),
                referred_columns: vec!["customer_id".into()],
            }],
            indexes: vec![],
        },
    );

    tables.insert(
        "order_items".to_string(),
        Table {
            columns: vec![
                Column { name: "order_item_id".into(), sql_type: "int".into(), nullable: false, primary_key: true },
                Column { name: "order_id".into(), sql_type: "int".into(), nullable: false, primary_key: false },
                Column { name: "quantity".into(), sql_type: "int".into(), nullable: false, primary_key: false },
                Column { name: "unit_price".into(), sql_type: "decimal(10,2)".into(), nullable: false, primary_key: false },
            ],
            foreign_keys: vec![ForeignKey {
                constrained_columns: vec!["order_id".into()],
                referred_table: "orders".into(),
                referred_columns: vec!["order_id".into()],
            }],
            indexes: vec![],
        },
    );

    Schema { db_id: "ecommerce".into(), tables, relationships: vec![] }
}

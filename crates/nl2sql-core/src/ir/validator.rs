//! Rejects any [`Ir`] that violates the invariants of spec §3.4, attaching
//! diagnostics (spec §4.7).

use super::types::{Cte, Expression, Ir, Join, Predicate, PredicateRhs, QueryBody};
use crate::schema::canonical::CanonicalSchema;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ValidationErrorKind {
    UnknownTable,
    UnknownColumn,
    GroupByMissing,
    OrderByInvalid,
    PredicateArity,
    WindowFunctionMisplaced,
    CteInvalid,
    NegativeLimitOffset,
}

#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[error("{kind:?} at {path}: {message}")]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
    /// A JSON-pointer-ish path into the IR for the offending element, e.g.
    /// `select[1]` or `order_by[0]`.
    pub path: String,
    pub message: String,
}

impl ValidationError {
    fn new(kind: ValidationErrorKind, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self { kind, path: path.into(), message: message.into() }
    }
}

/// An [`Ir`] that has passed [`validate`]. No stage may mutate it; the only
/// way to obtain one is successful validation, so the compiler's "consumes
/// a validated IR" contract (spec §3.4) is enforced by the type system
/// rather than by convention.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedIr(Ir);

impl ValidatedIr {
    pub fn get(&self) -> &Ir {
        &self.0
    }
}

impl std::ops::Deref for ValidatedIr {
    type Target = Ir;
    fn deref(&self) -> &Ir {
        &self.0
    }
}

/// Visible names at a given nesting level: real schema tables resolved by
/// name/alias, plus CTE and join-alias names that bypass the schema
/// existence check for column resolution (spec §4.7 rule 1-2).
struct Scope<'a> {
    /// identifier (table name or alias) -> real schema table name, or
    /// `None` if the identifier names a CTE/alias rather than a schema
    /// table.
    tables: HashMap<String, Option<&'a str>>,
}

impl<'a> Scope<'a> {
    fn resolves(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    fn real_table(&self, table: &str) -> Option<&'a str> {
        self.tables.get(table).copied().flatten()
    }
}

/// Validates a full [`Ir`] against the canonical schema, returning the
/// validated wrapper on success or every diagnostic collected, in check
/// order (spec §4.7).
pub fn validate(ir: &Ir, schema: &CanonicalSchema) -> Result<ValidatedIr, Vec<ValidationError>> {
    let mut errors = Vec::new();

    validate_ctes(&ir.ctes, schema, &mut errors);

    let cte_names: HashSet<&str> = ir.ctes.iter().map(|c| c.name.as_str()).collect();
    let scope = build_scope(&ir.body, schema, &cte_names, "");
    validate_query_body(&ir.body, schema, &scope, &cte_names, "", &mut errors);

    if ir.body.limit.is_some_and(|n| n < 0) {
        errors.push(ValidationError::new(
            ValidationErrorKind::NegativeLimitOffset,
            "limit",
            "limit must be >= 0",
        ));
    }
    if ir.body.offset.is_some_and(|n| n < 0) {
        errors.push(ValidationError::new(
            ValidationErrorKind::NegativeLimitOffset,
            "offset",
            "offset must be >= 0",
        ));
    }

    if errors.is_empty() {
        Ok(ValidatedIr(ir.clone()))
    } else {
        Err(errors)
    }
}

/// CTE names unique; a CTE may reference earlier CTEs in the list but not
/// itself or any CTE defined after it (spec §3.4 invariant 5, §4.7 rule 7 —
/// "form a DAG" specializes, for this IR's flat CTE list, to "each CTE may
/// only depend on strictly earlier entries").
fn validate_ctes(ctes: &[Cte], schema: &CanonicalSchema, errors: &mut Vec<ValidationError>) {
    let mut seen = HashSet::new();
    for (i, cte) in ctes.iter().enumerate() {
        if !seen.insert(cte.name.as_str()) {
            errors.push(ValidationError::new(
                ValidationErrorKind::CteInvalid,
                format!("ctes[{i}]"),
                format!("duplicate CTE name {:?}", cte.name),
            ));
        }
        let earlier: HashSet<&str> = ctes[..i].iter().map(|c| c.name.as_str()).collect();
        if references_table(&cte.query, &cte.name) {
            errors.push(ValidationError::new(
                ValidationErrorKind::CteInvalid,
                format!("ctes[{i}]"),
                format!("CTE {:?} references itself", cte.name),
            ));
            continue;
        }
        for referenced in referenced_tables(&cte.query) {
            let is_real_table = schema.table_index(&referenced).is_some();
            let is_earlier_cte = earlier.contains(referenced.as_str());
            let is_later_or_self_cte = ctes[i..].iter().any(|c| c.name == referenced);
            if is_later_or_self_cte && !is_earlier_cte {
                errors.push(ValidationError::new(
                    ValidationErrorKind::CteInvalid,
                    format!("ctes[{i}]"),
                    format!("CTE {:?} references CTE {:?} defined later or not at all", cte.name, referenced),
                ));
            } else if !is_real_table && !is_earlier_cte && !is_later_or_self_cte {
                errors.push(ValidationError::new(
                    ValidationErrorKind::CteInvalid,
                    format!("ctes[{i}]"),
                    format!("CTE {:?} references unknown table or CTE {:?}", cte.name, referenced),
                ));
            }
        }
    }
}

fn references_table(body: &QueryBody, name: &str) -> bool {
    body.from_table == name || body.joins.iter().any(|j| j.table == name)
}

fn referenced_tables(body: &QueryBody) -> Vec<String> {
    let mut tables = vec![body.from_table.clone()];
    tables.extend(body.joins.iter().map(|j| j.table.clone()));
    tables
}

fn build_scope<'a>(
    body: &QueryBody,
    schema: &'a CanonicalSchema,
    cte_names: &HashSet<&str>,
    _path: &str,
) -> Scope<'a> {
    let mut tables = HashMap::new();
    insert_table_ref(&mut tables, schema, cte_names, &body.from_table, None);
    for join in &body.joins {
        insert_table_ref(&mut tables, schema, cte_names, &join.table, join.alias.as_deref());
    }
    Scope { tables }
}

fn insert_table_ref<'a>(
    tables: &mut HashMap<String, Option<&'a str>>,
    schema: &'a CanonicalSchema,
    cte_names: &HashSet<&str>,
    name: &str,
    alias: Option<&str>,
) {
    let real = schema.table_index(name).map(|idx| schema.table_names_original[idx].as_str());
    let is_known = real.is_some() || cte_names.contains(name);
    if is_known {
        tables.insert(name.to_string(), real);
    }
    if let Some(alias) = alias {
        // An alias always resolves to the same table/CTE, but column
        // existence checks key off the aliased table's real schema name
        // when there is one.
        tables.insert(alias.to_string(), real);
    }
}

#[allow(clippy::too_many_arguments)]
fn validate_query_body(
    body: &QueryBody,
    schema: &CanonicalSchema,
    scope: &Scope,
    cte_names: &HashSet<&str>,
    path: &str,
    errors: &mut Vec<ValidationError>,
) {
    // Rule 1: name resolution for from_table and every join target.
    if !scope.resolves(&body.from_table) {
        errors.push(ValidationError::new(
            ValidationErrorKind::UnknownTable,
            format!("{path}from_table"),
            format!("unknown table or CTE {:?}", body.from_table),
        ));
    }
    for (i, join) in body.joins.iter().enumerate() {
        if !scope.resolves(&join.table) {
            errors.push(ValidationError::new(
                ValidationErrorKind::UnknownTable,
                format!("{path}joins[{i}]"),
                format!("unknown table or CTE {:?}", join.table),
            ));
        }
        validate_join(join, schema, scope, &format!("{path}joins[{i}]."), errors);
    }

    // Rule 2: column resolution across every expression-bearing clause.
    for (i, item) in body.select.iter().enumerate() {
        validate_expression(&item.expr, schema, scope, cte_names, &format!("{path}select[{i}]"), errors);
    }
    for (i, predicate) in body.where_.iter().enumerate() {
        validate_predicate(predicate, schema, scope, cte_names, &format!("{path}where[{i}]"), errors);
    }
    for (i, expr) in body.group_by.iter().enumerate() {
        validate_expression(expr, schema, scope, cte_names, &format!("{path}group_by[{i}]"), errors);
    }
    for (i, predicate) in body.having.iter().enumerate() {
        validate_predicate(predicate, schema, scope, cte_names, &format!("{path}having[{i}]"), errors);
    }
    for (i, order) in body.order_by.iter().enumerate() {
        validate_expression(&order.column, schema, scope, cte_names, &format!("{path}order_by[{i}]"), errors);
    }

    // Rule 3: GROUP BY. If any selected expression is an aggregate, every
    // non-aggregate selected expression must be syntactically present in
    // group_by. `SELECT t.*` alongside an aggregate is rejected outright
    // (spec §9 open question, resolved as a design choice).
    let has_aggregate = body.select.iter().any(|item| item.expr.is_aggregate());
    if has_aggregate {
        for (i, item) in body.select.iter().enumerate() {
            if is_star_expression(&item.expr) {
                errors.push(ValidationError::new(
                    ValidationErrorKind::GroupByMissing,
                    format!("{path}select[{i}]"),
                    "SELECT t.* cannot be combined with an aggregate",
                ));
                continue;
            }
            if !item.expr.is_aggregate() && !body.group_by.iter().any(|g| g == &item.expr) {
                errors.push(ValidationError::new(
                    ValidationErrorKind::GroupByMissing,
                    format!("{path}select[{i}]"),
                    "non-aggregate selected expression is missing from GROUP BY",
                ));
            }
        }
    }

    // Rule 4: ORDER BY keys must be a SELECT column/alias, a positional
    // literal integer, or an aggregate also present in SELECT.
    for (i, order) in body.order_by.iter().enumerate() {
        let ok = match &order.column {
            Expression::Literal { value } => value.is_i64() || value.is_u64(),
            Expression::Aggregate { .. } => body.select.iter().any(|item| item.expr == order.column),
            other => {
                body.select.iter().any(|item| &item.expr == other)
                    || matches!(other, Expression::Column { value } if body.select.iter().any(|item| item.alias.as_deref() == Some(value.as_str())))
            }
        };
        if !ok {
            errors.push(ValidationError::new(
                ValidationErrorKind::OrderByInvalid,
                format!("{path}order_by[{i}]"),
                "ORDER BY key must be a selected column, alias, positional integer, or a selected aggregate",
            ));
        }
    }

    // Rule 6 (window placement) for this body's own clauses; `where` and
    // `group_by` may never contain a window function.
    for (i, predicate) in body.where_.iter().enumerate() {
        if predicate_contains_window(predicate) {
            errors.push(ValidationError::new(
                ValidationErrorKind::WindowFunctionMisplaced,
                format!("{path}where[{i}]"),
                "window functions are not allowed in WHERE",
            ));
        }
    }
    for (i, expr) in body.group_by.iter().enumerate() {
        if expr.is_window() {
            errors.push(ValidationError::new(
                ValidationErrorKind::WindowFunctionMisplaced,
                format!("{path}group_by[{i}]"),
                "window functions are not allowed in GROUP BY",
            ));
        }
    }
}

fn is_star_expression(expr: &Expression) -> bool {
    matches!(expr, Expression::Column { value } if value == "*" || value.ends_with(".*"))
}

fn validate_join(
    join: &Join,
    schema: &CanonicalSchema,
    scope: &Scope,
    path: &str,
    errors: &mut Vec<ValidationError>,
) {
    for (i, predicate) in join.on.iter().enumerate() {
        validate_predicate(predicate, schema, scope, &HashSet::new(), &format!("{path}on[{i}]"), errors);
    }
}

fn validate_predicate(
    predicate: &Predicate,
    schema: &CanonicalSchema,
    scope: &Scope,
    cte_names: &HashSet<&str>,
    path: &str,
    errors: &mut Vec<ValidationError>,
) {
    validate_expression(&predicate.left, schema, scope, cte_names, &format!("{path}.left"), errors);

    // Rule 5: predicate arity.
    use super::types::Operator::*;
    match (predicate.operator, &predicate.right) {
        (IsNull | IsNotNull, None) => {}
        (IsNull | IsNotNull, Some(_)) => errors.push(ValidationError::new(
            ValidationErrorKind::PredicateArity,
            path.to_string(),
            "IS NULL / IS NOT NULL must not carry a right-hand side",
        )),
        (Between, Some(PredicateRhs::List(items))) if items.len() == 2 => {}
        (Between, _) => errors.push(ValidationError::new(
            ValidationErrorKind::PredicateArity,
            path.to_string(),
            "BETWEEN requires exactly two right-hand literals",
        )),
        (In | NotIn, Some(PredicateRhs::List(_))) => {}
        (In | NotIn, Some(PredicateRhs::Single(Expression::Subquery { .. }))) => {}
        (In | NotIn, _) => errors.push(ValidationError::new(
            ValidationErrorKind::PredicateArity,
            path.to_string(),
            "IN / NOT IN requires a list or subquery right-hand side",
        )),
        (_, None) => errors.push(ValidationError::new(
            ValidationErrorKind::PredicateArity,
            path.to_string(),
            "comparison operator requires a right-hand side",
        )),
        (_, Some(PredicateRhs::Single(expr))) => {
            validate_expression(expr, schema, scope, cte_names, &format!("{path}.right"), errors);
        }
        (_, Some(PredicateRhs::List(_))) => errors.push(ValidationError::new(
            ValidationErrorKind::PredicateArity,
            path.to_string(),
            "this operator does not accept a list right-hand side",
        )),
    }
}

fn predicate_contains_window(predicate: &Predicate) -> bool {
    expression_contains_window(&predicate.left)
        || match &predicate.right {
            Some(PredicateRhs::Single(e)) => expression_contains_window(e),
            Some(PredicateRhs::List(items)) => items.iter().any(expression_contains_window),
            None => false,
        }
}

fn expression_contains_window(expr: &Expression) -> bool {
    match expr {
        Expression::Window { .. } => true,
        Expression::Function { args, .. } | Expression::Aggregate { args, .. } => {
            args.iter().any(expression_contains_window)
        }
        _ => false,
    }
}

fn validate_expression(
    expr: &Expression,
    schema: &CanonicalSchema,
    scope: &Scope,
    cte_names: &HashSet<&str>,
    path: &str,
    errors: &mut Vec<ValidationError>,
) {
    match expr {
        Expression::Column { value } => validate_column_ref(value, schema, scope, path, errors),
        Expression::Literal { .. } => {}
        Expression::Function { args, .. } => {
            for (i, a) in args.iter().enumerate() {
                validate_expression(a, schema, scope, cte_names, &format!("{path}.args[{i}]"), errors);
            }
        }
        Expression::Aggregate { args, .. } => {
            for (i, a) in args.iter().enumerate() {
                validate_expression(a, schema, scope, cte_names, &format!("{path}.args[{i}]"), errors);
            }
        }
        Expression::Window { function, partition_by, order_by } => {
            validate_expression(function, schema, scope, cte_names, &format!("{path}.function"), errors);
            for (i, p) in partition_by.iter().enumerate() {
                validate_expression(p, schema, scope, cte_names, &format!("{path}.partition_by[{i}]"), errors);
            }
            for (i, o) in order_by.iter().enumerate() {
                validate_expression(&o.column, schema, scope, cte_names, &format!("{path}.order_by[{i}]"), errors);
            }
        }
        Expression::Subquery { query } => {
            let nested_scope = build_scope(query, schema, cte_names, path);
            validate_query_body(query, schema, &nested_scope, cte_names, &format!("{path}."), errors);
        }
    }
}

fn validate_column_ref(
    value: &str,
    schema: &CanonicalSchema,
    scope: &Scope,
    path: &str,
    errors: &mut Vec<ValidationError>,
) {
    if value == "*" {
        return;
    }
    let Some((table, column)) = value.rsplit_once('.') else {
        errors.push(ValidationError::new(
            ValidationErrorKind::UnknownColumn,
            path.to_string(),
            format!("column reference {value:?} must be qualified as table.column"),
        ));
        return;
    };

    if !scope.resolves(table) {
        errors.push(ValidationError::new(
            ValidationErrorKind::UnknownTable,
            path.to_string(),
            format!("column reference uses unknown table {table:?}"),
        ));
        return;
    }

    if column == "*" {
        return;
    }

    match scope.real_table(table) {
        Some(real_table) => {
            if schema.column_index(real_table, column).is_none() {
                errors.push(ValidationError::new(
                    ValidationErrorKind::UnknownColumn,
                    path.to_string(),
                    format!("column {column:?} does not exist on table {real_table:?}"),
                ));
            }
        }
        None => {
            // table is a CTE or bare alias: column existence is not
            // checked against the schema (spec §4.7 rule 2).
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::types::{Direction, JoinType, Operator, OrderBy, SelectItem};
    use crate::schema::canonical::convert;
    use crate::schema::model::{Column, ForeignKey, Schema, Table};
    use indexmap::IndexMap;

    fn ecommerce() -> CanonicalSchema {
        let mut tables = IndexMap::new();
        tables.insert(
            "customers".to_string(),
            Table {
                columns: vec![
                    Column { name: "customer_id".into(), sql_type: "int".into(), nullable: false, primary_key: true },
                    Column { name: "name".into(), sql_type: "varchar(255)".into(), nullable: false, primary_key: false },
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
                ],
                foreign_keys: vec![ForeignKey {
                    constrained_columns: vec!["customer_id".into()],
                    referred_table: "customers".into(),
                    referred_columns: vec!["customer_id".into()],
                }],
                indexes: vec![],
            },
        );
        convert(&Schema { db_id: "ecommerce".into(), tables, relationships: vec![] })
    }

    fn column(value: &str) -> Expression {
        Expression::Column { value: value.to_string() }
    }

    #[test]
    fn scenario_a_validates() {
        let schema = ecommerce();
        let ir = Ir {
            ctes: vec![],
            body: QueryBody {
                select: vec![
                    SelectItem { expr: column("customers.name"), alias: None },
                    SelectItem { expr: column("customers.total_spent"), alias: None },
                ],
                from_table: "customers".into(),
                joins: vec![],
                where_: vec![],
                group_by: vec![],
                having: vec![],
                order_by: vec![OrderBy { column: column("customers.total_spent"), direction: Direction::Desc }],
                limit: Some(5),
                offset: None,
            },
            confidence: 0.9,
            ambiguities: vec![],
            questions: vec![],
        };
        assert!(validate(&ir, &schema).is_ok());
    }

    #[test]
    fn unknown_column_is_rejected() {
        let schema = ecommerce();
        let ir = Ir {
            ctes: vec![],
            body: QueryBody {
                select: vec![SelectItem { expr: column("customers.does_not_exist"), alias: None }],
                from_table: "customers".into(),
                joins: vec![],
                where_: vec![],
                group_by: vec![],
                having: vec![],
                order_by: vec![],
                limit: None,
                offset: None,
            },
            confidence: 0.9,
            ambiguities: vec![],
            questions: vec![],
        };
        let errors = validate(&ir, &schema).unwrap_err();
        assert!(errors.iter().any(|e| e.kind == ValidationErrorKind::UnknownColumn));
    }

    #[test]
    fn aggregate_without_group_by_is_rejected() {
        let schema = ecommerce();
        let ir = Ir {
            ctes: vec![],
            body: QueryBody {
                select: vec![
                    SelectItem { expr: column("customers.name"), alias: None },
                    SelectItem {
                        expr: Expression::Aggregate {
                            name: "SUM".into(),
                            distinct: false,
                            args: vec![column("customers.total_spent")],
                        },
                        alias: None,
                    },
                ],
                from_table: "customers".into(),
                joins: vec![],
                where_: vec![],
                group_by: vec![],
                having: vec![],
                order_by: vec![],
                limit: None,
                offset: None,
            },
            confidence: 0.9,
            ambiguities: vec![],
            questions: vec![],
        };
        let errors = validate(&ir, &schema).unwrap_err();
        assert!(errors.iter().any(|e| e.kind == ValidationErrorKind::GroupByMissing));
    }

    #[test]
    fn predicate_arity_between_requires_two_literals() {
        let schema = ecommerce();
        let ir = Ir {
            ctes: vec![],
            body: QueryBody {
                select: vec![SelectItem { expr: column("customers.name"), alias: None }],
                from_table: "customers".into(),
                joins: vec![],
                where_: vec![Predicate {
                    left: column("customers.total_spent"),
                    operator: Operator::Between,
                    right: Some(PredicateRhs::Single(Expression::Literal { value: serde_json::json!(10) })),
                }],
                group_by: vec![],
                having: vec![],
                order_by: vec![],
                limit: None,
                offset: None,
            },
            confidence: 0.9,
            ambiguities: vec![],
            questions: vec![],
        };
        let errors = validate(&ir, &schema).unwrap_err();
        assert!(errors.iter().any(|e| e.kind == ValidationErrorKind::PredicateArity));
    }

    #[test]
    fn join_on_customers_orders_is_valid() {
        let schema = ecommerce();
        let ir = Ir {
            ctes: vec![],
            body: QueryBody {
                select: vec![SelectItem { expr: column("customers.name"), alias: None }],
                from_table: "customers".into(),
                joins: vec![Join {
                    join_type: JoinType::Inner,
                    table: "orders".into(),
                    alias: None,
                    on: vec![Predicate {
                        left: column("customers.customer_id"),
                        operator: Operator::Eq,
                        right: Some(PredicateRhs::Single(column("orders.customer_id"))),
                    }],
                }],
                where_: vec![],
                group_by: vec![],
                having: vec![],
                order_by: vec![],
                limit: None,
                offset: None,
            },
            confidence: 0.9,
            ambiguities: vec![],
            questions: vec![],
        };
        assert!(validate(&ir, &schema).is_ok());
    }

    #[test]
    fn negative_limit_is_rejected() {
        let schema = ecommerce();
        let ir = Ir {
            ctes: vec![],
            body: QueryBody {
                select: vec![SelectItem { expr: column("customers.name"), alias: None }],
                from_table: "customers".into(),
                joins: vec![],
                where_: vec![],
                group_by: vec![],
                having: vec![],
                order_by: vec![],
                limit: Some(-1),
                offset: None,
            },
            confidence: 0.9,
            ambiguities: vec![],
            questions: vec![],
        };
        let errors = validate(&ir, &schema).unwrap_err();
        assert!(errors.iter().any(|e| e.kind == ValidationErrorKind::NegativeLimitOffset));
    }

    #[test]
    fn duplicate_cte_names_rejected() {
        let schema = ecommerce();
        let body = QueryBody {
            select: vec![SelectItem { expr: column("orders.order_id"), alias: None }],
            from_table: "orders".into(),
            joins: vec![],
            where_: vec![],
            group_by: vec![],
            having: vec![],
            order_by: vec![],
            limit: None,
            offset: None,
        };
        let ir = Ir {
            ctes: vec![
                Cte { name: "recent".into(), query: Box::new(body.clone()) },
                Cte { name: "recent".into(), query: Box::new(body.clone()) },
            ],
            body: QueryBody {
                select: vec![SelectItem { expr: column("recent.order_id"), alias: None }],
                from_table: "recent".into(),
                joins: vec![],
                where_: vec![],
                group_by: vec![],
                having: vec![],
                order_by: vec![],
                limit: None,
                offset: None,
            },
            confidence: 0.9,
            ambiguities: vec![],
            questions: vec![],
        };
        let errors = validate(&ir, &schema).unwrap_err();
        assert!(errors.iter().any(|e| e.kind == ValidationErrorKind::CteInvalid));
    }
}

//! Deterministically compiles a [`ValidatedIr`] into a parameterized SQL
//! string plus an ordered binding map (spec §4.11).
//!
//! The compiler performs no I/O and never string-interpolates a literal
//! value; every literal becomes a `:p_k` placeholder collected into
//! [`CompiledSql::params`] in encounter order.

use super::types::{Direction, Expression, JoinType, Operator, Predicate, PredicateRhs, QueryBody};
use super::validator::ValidatedIr;
use indexmap::IndexMap;
use serde_json::Value;

/// Target SQL dialect, only as far as identifier quoting differs (spec
/// §4.11: "Identifiers are quoted with the target dialect's quoting rule").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    MySql,
    Postgres,
    Sqlite,
}

impl Dialect {
    fn quote(&self, identifier: &str) -> String {
        match self {
            Dialect::MySql => format!("`{identifier}`"),
            Dialect::Postgres | Dialect::Sqlite => format!("\"{identifier}\""),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledSql {
    pub sql: String,
    pub params: IndexMap<String, Value>,
}

struct Compiler {
    dialect: Dialect,
    params: IndexMap<String, Value>,
}

impl Compiler {
    fn new(dialect: Dialect) -> Self {
        Self { dialect, params: IndexMap::new() }
    }

    fn bind(&mut self, value: Value) -> String {
        let name = format!("p_{}", self.params.len());
        self.params.insert(name.clone(), value);
        format!(":{name}")
    }

    /// Renders a `table.column`, `table.*`, or bare `*` reference. Star
    /// forms and bare identifiers never get quoted (spec §4.11).
    fn render_column_ref(&self, value: &str) -> String {
        if value == "*" {
            return "*".to_string();
        }
        if let Some(table) = value.strip_suffix(".*") {
            return format!("{}.*", self.dialect.quote(table));
        }
        match value.rsplit_once('.') {
            Some((table, column)) => format!("{}.{}", self.dialect.quote(table), self.dialect.quote(column)),
            None => self.dialect.quote(value),
        }
    }

    fn render_expression(&mut self, expr: &Expression) -> String {
        match expr {
            Expression::Column { value } => self.render_column_ref(value),
            Expression::Literal { value } => self.bind(value.clone()),
            Expression::Function { name, args } => {
                let rendered: Vec<String> = args.iter().map(|a| self.render_expression(a)).collect();
                format!("{name}({})", rendered.join(", "))
            }
            Expression::Aggregate { name, distinct, args } => self.render_aggregate(name, *distinct, args),
            Expression::Window { function, partition_by, order_by } => {
                let func = self.render_expression(function);
                let mut over = Vec::new();
                if !partition_by.is_empty() {
                    let parts: Vec<String> = partition_by.iter().map(|p| self.render_expression(p)).collect();
                    over.push(format!("PARTITION BY {}", parts.join(", ")));
                }
                if !order_by.is_empty() {
                    let parts: Vec<String> = order_by
                        .iter()
                        .map(|o| format!("{} {}", self.render_order_key(&o.column), direction_sql(o.direction)))
                        .collect();
                    over.push(format!("ORDER BY {}", parts.join(", ")));
                }
                format!("{func} OVER ({})", over.join(" "))
            }
            Expression::Subquery { query } => format!("({})", self.render_query_body(query)),
        }
    }

    /// `COUNT(*)` renders bare; every other aggregate renders
    /// `AGG(DISTINCT? arg1, arg2, ...)` (spec §4.11).
    fn render_aggregate(&mut self, name: &str, distinct: bool, args: &[Expression]) -> String {
        if name.eq_ignore_ascii_case("COUNT")
            && args.len() == 1
            && matches!(&args[0], Expression::Column { value } if value == "*")
        {
            return "COUNT(*)".to_string();
        }
        let rendered: Vec<String> = args.iter().map(|a| self.render_expression(a)).collect();
        let distinct_kw = if distinct { "DISTINCT " } else { "" };
        format!("{name}({distinct_kw}{})", rendered.join(", "))
    }

    /// An ORDER BY key that is itself an aggregate expression renders the
    /// expression, never a quoted identifier (spec §4.11).
    fn render_order_key(&mut self, expr: &Expression) -> String {
        self.render_expression(expr)
    }

    fn render_predicate(&mut self, predicate: &Predicate) -> String {
        let left = self.render_expression(&predicate.left);
        match predicate.operator {
            Operator::IsNull => format!("{left} IS NULL"),
            Operator::IsNotNull => format!("{left} IS NOT NULL"),
            Operator::Between => {
                let Some(PredicateRhs::List(items)) = &predicate.right else {
                    return format!("{left} /* invalid BETWEEN */");
                };
                let lo = self.render_expression(&items[0]);
                let hi = self.render_expression(&items[1]);
                format!("{left} BETWEEN {lo} AND {hi}")
            }
            Operator::In | Operator::NotIn => {
                let keyword = if predicate.operator == Operator::In { "IN" } else { "NOT IN" };
                match &predicate.right {
                    Some(PredicateRhs::List(items)) => {
                        let rendered: Vec<String> = items.iter().map(|i| self.render_expression(i)).collect();
                        format!("{left} {keyword} ({})", rendered.join(", "))
                    }
                    Some(PredicateRhs::Single(Expression::Subquery { query })) => {
                        format!("{left} {keyword} ({})", self.render_query_body(query))
                    }
                    _ => format!("{left} {keyword} ()"),
                }
            }
            _ => {
                let op = operator_sql(predicate.operator);
                let right = match &predicate.right {
                    Some(PredicateRhs::Single(expr)) => self.render_expression(expr),
                    Some(PredicateRhs::List(items)) => {
                        let rendered: Vec<String> = items.iter().map(|i| self.render_expression(i)).collect();
                        format!("({})", rendered.join(", "))
                    }
                    None => String::new(),
                };
                format!("{left} {op} {right}")
            }
        }
    }

    fn render_query_body(&mut self, body: &QueryBody) -> String {
        let mut sql = String::from("SELECT ");
        let select: Vec<String> = body
            .select
            .iter()
            .map(|item| {
                let expr = self.render_expression(&item.expr);
                match &item.alias {
                    Some(alias) => format!("{expr} AS {}", self.dialect.quote(alias)),
                    None => expr,
                }
            })
            .collect();
        sql.push_str(&select.join(", "));

        sql.push_str(" FROM ");
        sql.push_str(&self.dialect.quote(&body.from_table));

        for join in &body.joins {
            sql.push(' ');
            sql.push_str(join_keyword(join.join_type));
            sql.push(' ');
            sql.push_str(&self.dialect.quote(&join.table));
            if let Some(alias) = &join.alias {
                sql.push_str(" AS ");
                sql.push_str(&self.dialect.quote(alias));
            }
            if join.join_type != JoinType::Cross {
                let predicates: Vec<String> = join.on.iter().map(|p| self.render_predicate(p)).collect();
                sql.push_str(" ON ");
                sql.push_str(&predicates.join(" AND "));
            }
        }

        if !body.where_.is_empty() {
            let predicates: Vec<String> = body.where_.iter().map(|p| self.render_predicate(p)).collect();
            sql.push_str(" WHERE ");
            sql.push_str(&predicates.join(" AND "));
        }

        if !body.group_by.is_empty() {
            let cols: Vec<String> = body.group_by.iter().map(|e| self.render_expression(e)).collect();
            sql.push_str(" GROUP BY ");
            sql.push_str(&cols.join(", "));
        }

        if !body.having.is_empty() {
            let predicates: Vec<String> = body.having.iter().map(|p| self.render_predicate(p)).collect();
            sql.push_str(" HAVING ");
            sql.push_str(&predicates.join(" AND "));
        }

        if !body.order_by.is_empty() {
            let keys: Vec<String> = body
                .order_by
                .iter()
                .map(|o| format!("{} {}", self.render_order_key(&o.column), direction_sql(o.direction)))
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&keys.join(", "));
        }

        if let Some(limit) = body.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        if let Some(offset) = body.offset {
            sql.push_str(&format!(" OFFSET {offset}"));
        }

        sql
    }
}

fn join_keyword(join_type: JoinType) -> &'static str {
    match join_type {
        JoinType::Inner => "INNER JOIN",
        JoinType::Left => "LEFT JOIN",
        JoinType::Right => "RIGHT JOIN",
        JoinType::Full => "FULL JOIN",
        JoinType::Cross => "CROSS JOIN",
    }
}

fn direction_sql(direction: Direction) -> &'static str {
    match direction {
        Direction::Asc => "ASC",
        Direction::Desc => "DESC",
    }
}

fn operator_sql(op: Operator) -> &'static str {
    match op {
        Operator::Eq => "=",
        Operator::Ne => "!=",
        Operator::Lt => "<",
        Operator::Le => "<=",
        Operator::Gt => ">",
        Operator::Ge => ">=",
        Operator::Like => "LIKE",
        Operator::NotLike => "NOT LIKE",
        Operator::In | Operator::NotIn | Operator::Between | Operator::IsNull | Operator::IsNotNull => {
            unreachable!("handled by dedicated branches in render_predicate")
        }
    }
}

/// Compiles a validated IR into SQL plus its ordered binding map. Literal
/// values never appear inlined in `sql`; every one is reachable only through
/// `params` by its placeholder name (spec §8.1 invariant 8).
pub fn compile(ir: &ValidatedIr, dialect: Dialect) -> CompiledSql {
    let mut compiler = Compiler::new(dialect);
    let ir = ir.get();

    let mut sql = String::new();
    if !ir.ctes.is_empty() {
        let rendered: Vec<String> = ir
            .ctes
            .iter()
            .map(|cte| format!("{} AS ({})", compiler.dialect.quote(&cte.name), compiler.render_query_body(&cte.query)))
            .collect();
        sql.push_str("WITH ");
        sql.push_str(&rendered.join(", "));
        sql.push(' ');
    }

    sql.push_str(&compiler.render_query_body(&ir.body));

    CompiledSql { sql, params: compiler.params }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::types::{Cte, Ir, Join, Operator as Op, OrderBy, SelectItem};
    use crate::ir::validator::validate;
    use crate::schema::canonical::convert;
    use crate::schema::model::{Column, ForeignKey, Schema, Table};
    use indexmap::IndexMap as Map;

    fn col(v: &str) -> Expression {
        Expression::Column { value: v.to_string() }
    }

    fn ecommerce() -> crate::schema::canonical::CanonicalSchema {
        let mut tables = Map::new();
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

    fn scenario_a_ir() -> Ir {
        Ir {
            ctes: vec![],
            body: QueryBody {
                select: vec![
                    SelectItem { expr: col("customers.name"), alias: None },
                    SelectItem { expr: col("customers.total_spent"), alias: None },
                ],
                from_table: "customers".into(),
                joins: vec![],
                where_: vec![],
                group_by: vec![],
                having: vec![],
                order_by: vec![OrderBy { column: col("customers.total_spent"), direction: Direction::Desc }],
                limit: Some(5),
                offset: None,
            },
            confidence: 0.9,
            ambiguities: vec![],
            questions: vec![],
        }
    }

    #[test]
    fn scenario_a_compiles_to_expected_sql_shape() {
        let schema = ecommerce();
        let ir = scenario_a_ir();
        let validated = validate(&ir, &schema).unwrap();
        let compiled = compile(&validated, Dialect::Postgres);
        assert_eq!(
            compiled.sql,
            "SELECT \"customers\".\"name\", \"customers\".\"total_spent\" FROM \"customers\" ORDER BY \"customers\".\"total_spent\" DESC LIMIT 5"
        );
        assert!(compiled.params.is_empty());
    }

    #[test]
    fn literal_values_become_placeholders_not_inline_text() {
        let schema = ecommerce();
        let mut ir = scenario_a_ir();
        ir.body.where_.push(Predicate {
            left: col("customers.total_spent"),
            operator: Op::Gt,
            right: Some(PredicateRhs::Single(Expression::Literal { value: serde_json::json!(1000) })),
        });
        let validated = validate(&ir, &schema).unwrap();
        let compiled = compile(&validated, Dialect::MySql);
        assert!(compiled.sql.contains(":p_0"));
        assert!(!compiled.sql.contains("1000"));
        assert_eq!(compiled.params.get("p_0"), Some(&serde_json::json!(1000)));
    }

    #[test]
    fn count_star_renders_without_parens_expansion() {
        let schema = ecommerce();
        let ir = Ir {
            ctes: vec![],
            body: QueryBody {
                select: vec![SelectItem { expr: Expression::count_star(), alias: Some("n".into()) }],
                from_table: "orders".into(),
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
        let validated = validate(&ir, &schema).unwrap();
        let compiled = compile(&validated, Dialect::MySql);
        assert!(compiled.sql.contains("COUNT(*) AS `n`"));
    }

    #[test]
    fn join_renders_in_ir_order_with_on_clause() {
        let schema = ecommerce();
        let ir = Ir {
            ctes: vec![],
            body: QueryBody {
                select: vec![SelectItem { expr: col("customers.name"), alias: None }],
                from_table: "customers".into(),
                joins: vec![Join {
                    join_type: crate::ir::types::JoinType::Inner,
                    table: "orders".into(),
                    alias: None,
                    on: vec![Predicate {
                        left: col("customers.customer_id"),
                        operator: Op::Eq,
                        right: Some(PredicateRhs::Single(col("orders.customer_id"))),
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
        let validated = validate(&ir, &schema).unwrap();
        let compiled = compile(&validated, Dialect::Postgres);
        assert!(compiled.sql.contains("INNER JOIN \"orders\" ON \"customers\".\"customer_id\" = \"orders\".\"customer_id\""));
    }

    #[test]
    fn same_ir_and_dialect_compiles_byte_identical_twice() {
        let schema = ecommerce();
        let ir = scenario_a_ir();
        let validated = validate(&ir, &schema).unwrap();
        let first = compile(&validated, Dialect::MySql);
        let second = compile(&validated, Dialect::MySql);
        assert_eq!(first, second);
    }

    #[test]
    fn with_clause_renders_ctes_in_order() {
        let schema = ecommerce();
        let cte_body = QueryBody {
            select: vec![SelectItem { expr: col("orders.order_id"), alias: None }],
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
            ctes: vec![Cte { name: "recent_orders".into(), query: Box::new(cte_body) }],
            body: QueryBody {
                select: vec![SelectItem { expr: col("recent_orders.order_id"), alias: None }],
                from_table: "recent_orders".into(),
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
        let validated = validate(&ir, &schema).unwrap();
        let compiled = compile(&validated, Dialect::Postgres);
        assert!(compiled.sql.starts_with("WITH \"recent_orders\" AS (SELECT"));
    }
}

//! The SQL Corrector (spec §4.10): advisory, structural checks over a
//! validated [`Ir`] that never block compilation and never rewrite the
//! compiled SQL — they only attach hints the caller may act on.

use crate::ir::{Expression, Ir};

#[derive(Debug, Clone, PartialEq)]
pub struct CorrectionHint {
    pub message: String,
}

/// Runs the Corrector's checks against `ir` and its already-compiled `sql`.
///
/// Returns `sql` unchanged alongside any hints: the Corrector is
/// advisory-only (spec §4.10), never a second compiler.
pub fn check(ir: &Ir, sql: &str) -> (String, Vec<CorrectionHint>) {
    let mut hints = Vec::new();

    if ir.body.limit.is_some() && ir.body.order_by.is_empty() {
        hints.push(CorrectionHint {
            message: "LIMIT without ORDER BY returns a non-deterministic row set".to_string(),
        });
    }

    let table_count = 1 + ir.body.joins.len();
    if table_count > 1 {
        if let Some(ambiguous) = first_unqualified_column(ir) {
            hints.push(CorrectionHint {
                message: format!("column \"{ambiguous}\" is unqualified in a multi-table query and may be ambiguous"),
            });
        }
    }

    if ir.has_select_aggregate() {
        let has_bare_column = ir.body.select.iter().any(|item| matches!(&item.expr, Expression::Column { value } if value != "*"));
        if has_bare_column && ir.body.group_by.is_empty() {
            hints.push(CorrectionHint {
                message: "aggregate mixed with non-aggregate columns but no GROUP BY".to_string(),
            });
        }
    }

    (sql.to_string(), hints)
}

fn first_unqualified_column(ir: &Ir) -> Option<String> {
    ir.body.select.iter().find_map(|item| unqualified_name(&item.expr))
}

fn unqualified_name(expr: &Expression) -> Option<String> {
    match expr {
        Expression::Column { value } if value != "*" && !value.contains('.') => Some(value.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Join, JoinType, QueryBody, SelectItem};

    fn base_ir() -> Ir {
        Ir {
            ctes: vec![],
            body: QueryBody {
                select: vec![SelectItem { expr: Expression::Column { value: "customers.name".into() }, alias: None }],
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
        }
    }

    #[test]
    fn clean_query_produces_no_hints() {
        let (sql, hints) = check(&base_ir(), "SELECT customers.name FROM customers");
        assert_eq!(sql, "SELECT customers.name FROM customers");
        assert!(hints.is_empty());
    }

    #[test]
    fn limit_without_order_by_warns() {
        let mut ir = base_ir();
        ir.body.limit = Some(10);
        let (_, hints) = check(&ir, "SELECT ... LIMIT 10");
        assert!(hints.iter().any(|h| h.message.contains("LIMIT without ORDER BY")));
    }

    #[test]
    fn limit_with_order_by_is_silent() {
        let mut ir = base_ir();
        ir.body.limit = Some(10);
        ir.body.order_by = vec![crate::ir::OrderBy {
            column: Expression::Column { value: "customers.name".into() },
            direction: crate::ir::Direction::Asc,
        }];
        let (_, hints) = check(&ir, "SELECT ... ORDER BY ... LIMIT 10");
        assert!(!hints.iter().any(|h| h.message.contains("LIMIT without ORDER BY")));
    }

    #[test]
    fn unqualified_column_in_join_warns() {
        let mut ir = base_ir();
        ir.body.select[0].expr = Expression::Column { value: "name".into() };
        ir.body.joins = vec![Join { join_type: JoinType::Inner, table: "orders".into(), alias: None, on: vec![] }];
        let (_, hints) = check(&ir, "SELECT name FROM customers JOIN orders ...");
        assert!(hints.iter().any(|h| h.message.contains("ambiguous")));
    }

    #[test]
    fn aggregate_without_group_by_warns_as_defense_in_depth() {
        let mut ir = base_ir();
        ir.body.select = vec![
            SelectItem { expr: Expression::Column { value: "customers.name".into() }, alias: None },
            SelectItem { expr: Expression::count_star(), alias: Some("n".into()) },
        ];
        let (_, hints) = check(&ir, "SELECT customers.name, COUNT(*) ...");
        assert!(hints.iter().any(|h| h.message.contains("GROUP BY")));
    }
}

//! Coerces raw LLM JSON into the canonical shape [`crate::ir::types::Ir`]
//! deserializes from, without changing its meaning (spec §4.6).
//!
//! Works purely on [`serde_json::Value`] — the Sanitizer runs *before* any
//! typed parsing is attempted, since the whole point is to absorb shapes the
//! typed deserializer would otherwise reject. Each rule is a no-op on input
//! that is already canonical, which is what makes `sanitize` idempotent
//! (spec §8.1 invariant 6).

use serde_json::{Map, Value};

/// Applies every normalization rule of spec §4.6, in order, and returns the
/// result. Never fails: structures it cannot confidently normalize are left
/// unchanged and surface as Validator diagnostics instead.
pub fn sanitize(raw: &Value) -> Value {
    let Value::Object(map) = raw else {
        return raw.clone();
    };
    let mut out = map.clone();

    rename_cte_fields(&mut out);
    sanitize_ctes(&mut out);
    sanitize_joins(&mut out);
    sanitize_select(&mut out);
    sanitize_order_by(&mut out);
    sanitize_group_by(&mut out);
    sanitize_where_having(&mut out);
    sanitize_limit_offset(&mut out);

    Value::Object(out)
}

fn rename_key(map: &mut Map<String, Value>, from: &str, to: &str) {
    if !map.contains_key(to) {
        if let Some(v) = map.remove(from) {
            map.insert(to.to_string(), v);
        }
    } else {
        map.remove(from);
    }
}

/// `cte_name`/`cte_definition` -> `name`/`query` (spec §4.6 row 1), applied
/// to every element of the top-level `ctes` list.
fn rename_cte_fields(out: &mut Map<String, Value>) {
    if let Some(Value::Array(ctes)) = out.get_mut("ctes") {
        for cte in ctes.iter_mut() {
            if let Value::Object(cte_map) = cte {
                rename_key(cte_map, "cte_name", "name");
                rename_key(cte_map, "cte_definition", "query");
            }
        }
    }
}

/// Recurses into each CTE's nested query body so the same rules apply at
/// every nesting level.
fn sanitize_ctes(out: &mut Map<String, Value>) {
    if let Some(Value::Array(ctes)) = out.get_mut("ctes") {
        for cte in ctes.iter_mut() {
            if let Value::Object(cte_map) = cte {
                if let Some(query) = cte_map.get("query") {
                    let sanitized = sanitize(query);
                    cte_map.insert("query".to_string(), sanitized);
                }
            }
        }
    }
}

/// `target_table`/`condition`/`join_type` -> `table`/`on`/`type`, and a
/// string `on` is parsed into a single equality predicate (spec §4.6 rows 2
/// and 8).
fn sanitize_joins(out: &mut Map<String, Value>) {
    if let Some(Value::Array(joins)) = out.get_mut("joins") {
        for join in joins.iter_mut() {
            let Value::Object(join_map) = join else { continue };
            rename_key(join_map, "target_table", "table");
            rename_key(join_map, "condition", "on");
            rename_key(join_map, "join_type", "type");

            if let Some(Value::String(ty)) = join_map.get("type") {
                join_map.insert("type".to_string(), Value::String(ty.to_ascii_uppercase()));
            }

            if let Some(Value::String(expr)) = join_map.get("on").cloned() {
                if let Some(predicate) = parse_equality_string(&expr) {
                    join_map.insert("on".to_string(), Value::Array(vec![predicate]));
                }
            }

            if let Some(Value::Array(on)) = join_map.get_mut("on") {
                for predicate in on.iter_mut() {
                    sanitize_predicate(predicate);
                }
            }
        }
    }
}

/// Parses `"a.b = c.d"` (or any single comparison) into a canonical
/// predicate object. Returns `None` if the string doesn't look like a simple
/// binary comparison, in which case it is left untouched for the Validator
/// to reject.
fn parse_equality_string(expr: &str) -> Option<Value> {
    let operators = ["!=", "<=", ">=", "=", "<", ">"];
    for op in operators {
        if let Some((left, right)) = expr.split_once(op) {
            let left = left.trim();
            let right = right.trim();
            if left.is_empty() || right.is_empty() {
                continue;
            }
            return Some(serde_json::json!({
                "left": column_or_literal(left),
                "operator": op,
                "right": column_or_literal(right),
            }));
        }
    }
    None
}

fn column_or_literal(token: &str) -> Value {
    if token.contains('.') && !token.starts_with('\'') && !token.starts_with('"') {
        serde_json::json!({"type": "column", "value": token})
    } else {
        let unquoted = token.trim_matches(|c| c == '\'' || c == '"');
        serde_json::json!({"type": "literal", "value": unquoted})
    }
}

/// A bare string in `select` becomes a `column` expression, or the
/// aggregate encoding of `COUNT(*)`; aggregate `args` that are strings are
/// wrapped as `column` expressions; a missing `alias` stays absent (spec
/// §4.6 rows 3-7).
fn sanitize_select(out: &mut Map<String, Value>) {
    if let Some(Value::Array(items)) = out.get_mut("select") {
        for item in items.iter_mut() {
            *item = sanitize_select_item(item);
        }
    }
}

fn sanitize_select_item(item: &Value) -> Value {
    match item {
        Value::String(s) => select_string_to_expression(s),
        Value::Object(map) => {
            let mut map = map.clone();
            if let Some(expr) = map.get("expr").cloned() {
                let sanitized = sanitize_expression(&expr);
                if let Value::Object(expr_map) = sanitized {
                    for (k, v) in expr_map {
                        map.insert(k, v);
                    }
                }
                map.remove("expr");
            }
            let wrapped = Value::Object(map);
            sanitize_expression(&wrapped)
        }
        other => other.clone(),
    }
}

fn select_string_to_expression(s: &str) -> Value {
    let trimmed = s.trim();
    if let Some(agg) = parse_aggregate_call(trimmed) {
        return agg;
    }
    serde_json::json!({"type": "column", "value": trimmed})
}

/// Recognizes `NAME(arg1, arg2, ...)` and `NAME(DISTINCT arg)` as an
/// aggregate call; `COUNT(*)` is the form spec §4.6 calls out explicitly,
/// but the same parse handles any aggregate name uniformly.
fn parse_aggregate_call(s: &str) -> Option<Value> {
    const AGGREGATE_NAMES: &[&str] = &["COUNT", "SUM", "AVG", "MIN", "MAX"];
    let open = s.find('(')?;
    if !s.ends_with(')') {
        return None;
    }
    let name = s[..open].trim().to_ascii_uppercase();
    if !AGGREGATE_NAMES.contains(&name.as_str()) {
        return None;
    }
    let inner = &s[open + 1..s.len() - 1];
    let inner = inner.trim();
    let (distinct, inner) = if let Some(rest) = inner.strip_prefix("DISTINCT ") {
        (true, rest.trim())
    } else if let Some(rest) = inner.strip_prefix("distinct ") {
        (true, rest.trim())
    } else {
        (false, inner)
    };

    let args: Vec<Value> = if inner == "*" {
        vec![serde_json::json!({"type": "column", "value": "*"})]
    } else {
        inner
            .split(',')
            .map(|a| serde_json::json!({"type": "column", "value": a.trim()}))
            .collect()
    };

    Some(serde_json::json!({
        "type": "aggregate",
        "name": name,
        "distinct": distinct,
        "args": args,
    }))
}

/// Normalizes a single expression object in place: wraps bare string `args`
/// as `column` expressions and recurses into nested expressions.
fn sanitize_expression(expr: &Value) -> Value {
    let Value::Object(map) = expr else {
        return expr.clone();
    };
    let mut map = map.clone();

    if let Some(Value::Array(args)) = map.get("args").cloned() {
        let sanitized_args: Vec<Value> = args
            .iter()
            .map(|a| match a {
                Value::String(s) => serde_json::json!({"type": "column", "value": s}),
                other => sanitize_expression(other),
            })
            .collect();
        map.insert("args".to_string(), Value::Array(sanitized_args));
    }

    if let Some(function) = map.get("function").cloned() {
        map.insert("function".to_string(), sanitize_expression(&function));
    }

    if let Some(Value::Object(query)) = map.get("query").cloned() {
        map.insert("query".to_string(), sanitize(&Value::Object(query)));
    }

    Value::Object(map)
}

/// `order_by[].field` / `.col` -> `order_by[].column` (spec §4.6 row 3).
fn sanitize_order_by(out: &mut Map<String, Value>) {
    if let Some(Value::Array(items)) = out.get_mut("order_by") {
        for item in items.iter_mut() {
            let Value::Object(map) = item else { continue };
            rename_key(map, "field", "column");
            rename_key(map, "col", "column");
            if let Some(col) = map.get("column").cloned() {
                if let Value::String(s) = &col {
                    map.insert("column".to_string(), select_string_to_expression(s));
                } else {
                    map.insert("column".to_string(), sanitize_expression(&col));
                }
            }
            if let Some(Value::String(dir)) = map.get("direction") {
                map.insert("direction".to_string(), Value::String(dir.to_ascii_uppercase()));
            }
        }
    }
}

fn sanitize_group_by(out: &mut Map<String, Value>) {
    if let Some(Value::Array(items)) = out.get_mut("group_by") {
        for item in items.iter_mut() {
            *item = match item {
                Value::String(s) => select_string_to_expression(s),
                other => sanitize_expression(other),
            };
        }
    }
}

fn sanitize_where_having(out: &mut Map<String, Value>) {
    for key in ["where", "having"] {
        if let Some(Value::Array(items)) = out.get_mut(key) {
            for predicate in items.iter_mut() {
                sanitize_predicate(predicate);
            }
        }
    }
}

/// Upper-cases the operator and recurses into `left`/`right` (spec §4.6
/// row 9).
fn sanitize_predicate(predicate: &mut Value) {
    let Value::Object(map) = predicate else { return };

    if let Some(left) = map.get("left").cloned() {
        let left = match left {
            Value::String(s) => select_string_to_expression(&s),
            other => sanitize_expression(&other),
        };
        map.insert("left".to_string(), left);
    }

    if let Some(Value::String(op)) = map.get("operator") {
        map.insert("operator".to_string(), Value::String(op.to_ascii_uppercase()));
    }

    if let Some(right) = map.get("right").cloned() {
        let sanitized = match right {
            Value::String(s) => select_string_to_expression(&s),
            Value::Array(items) => Value::Array(
                items
                    .into_iter()
                    .map(|i| match i {
                        Value::String(s) => select_string_to_expression(&s),
                        other => sanitize_expression(&other),
                    })
                    .collect(),
            ),
            other => sanitize_expression(&other),
        };
        map.insert("right".to_string(), sanitized);
    }
}

/// `limit`/`offset` as a purely numeric string are parsed to an integer;
/// any other non-numeric string is dropped (spec §4.6 row 10).
fn sanitize_limit_offset(out: &mut Map<String, Value>) {
    for key in ["limit", "offset"] {
        if let Some(Value::String(s)) = out.get(key).cloned() {
            match s.trim().parse::<i64>() {
                Ok(n) => {
                    out.insert(key.to_string(), Value::Number(n.into()));
                }
                Err(_) => {
                    out.remove(key);
                }
            }
        }
    }
}

//! SQL Guard - Cleans and validates SQL text returned by the delegate
//!
//! Delegate output is accepted when, after removing markdown fences, it
//! parses as exactly one query that reads from known tables. SELECT/WITH text
//! the parser does not understand (SQLite-only syntax such as GLOB) is passed
//! through and left for the store to accept or reject.

use crate::error::{Nl2SqlError, Result};
use sqlparser::ast::{
    Expr, FunctionArg, FunctionArgExpr, Query, SelectItem, SetExpr, Statement, TableFactor,
    TableWithJoins,
};
use sqlparser::dialect::SQLiteDialect;
use sqlparser::parser::Parser;
use std::collections::HashSet;
use tracing::debug;

/// Remove triple-backtick fencing (with or without a language tag) and
/// surrounding whitespace. Text outside the first fenced block is dropped.
pub fn strip_code_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    let Some(open) = trimmed.find("```") else {
        return trimmed.trim_end_matches(';').trim().to_string();
    };

    let after_open = &trimmed[open + 3..];
    let body = match after_open.find("```") {
        Some(close) => &after_open[..close],
        None => after_open,
    };

    // language tag on the opening fence line
    let body = match body.split_once('\n') {
        Some((first, rest)) if is_language_tag(first) => rest,
        _ => match body.trim_start().split_once(char::is_whitespace) {
            Some((tag, rest)) if !tag.is_empty() && is_language_tag(tag) => rest,
            _ => body,
        },
    };

    body.trim().trim_end_matches(';').trim().to_string()
}

fn is_language_tag(line: &str) -> bool {
    let tag = line.trim();
    tag.is_empty() || tag.eq_ignore_ascii_case("sql") || tag.eq_ignore_ascii_case("sqlite")
}

/// Check that `sql` is a single SELECT-style query over `allowed_tables`.
pub fn validate_query(sql: &str, allowed_tables: &[&str]) -> Result<()> {
    if sql.trim().is_empty() {
        return Err(Nl2SqlError::Llm("delegate returned no SQL".to_string()));
    }

    let statements = match Parser::parse_sql(&SQLiteDialect {}, sql) {
        Ok(statements) => statements,
        Err(e) if looks_like_query(sql) => {
            debug!(error = %e, "passing through SQL the parser does not understand");
            return Ok(());
        }
        Err(e) => {
            return Err(Nl2SqlError::Llm(format!(
                "delegate returned unparseable SQL: {}",
                e
            )))
        }
    };

    let query = match statements.as_slice() {
        [Statement::Query(query)] => query,
        [_] => {
            return Err(Nl2SqlError::Llm(
                "delegate returned a statement that is not a query".to_string(),
            ))
        }
        _ => {
            return Err(Nl2SqlError::Llm(format!(
                "delegate returned {} statements, expected exactly one",
                statements.len()
            )))
        }
    };

    let mut known: HashSet<String> = allowed_tables.iter().map(|t| t.to_lowercase()).collect();
    let mut referenced = Vec::new();
    collect_query_tables(query, &mut known, &mut referenced);

    if referenced.is_empty() {
        return Err(Nl2SqlError::Llm("delegate SQL does not read from any table".to_string()));
    }
    if let Some(unknown) = referenced.iter().find(|t| !known.contains(*t)) {
        return Err(Nl2SqlError::Llm(format!(
            "delegate SQL references unknown table '{}'",
            unknown
        )));
    }

    Ok(())
}

fn looks_like_query(sql: &str) -> bool {
    sql.split_whitespace().next().is_some_and(|word| {
        word.eq_ignore_ascii_case("select") || word.eq_ignore_ascii_case("with")
    })
}

fn collect_query_tables(query: &Query, known: &mut HashSet<String>, out: &mut Vec<String>) {
    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            known.insert(cte.alias.name.value.to_lowercase());
            collect_query_tables(&cte.query, known, out);
        }
    }
    collect_set_expr_tables(&query.body, known, out);
}

fn collect_set_expr_tables(expr: &SetExpr, known: &mut HashSet<String>, out: &mut Vec<String>) {
    match expr {
        SetExpr::Select(select) => {
            for table in &select.from {
                collect_table_with_joins(table, known, out);
            }
            for item in &select.projection {
                if let SelectItem::UnnamedExpr(expr) | SelectItem::ExprWithAlias { expr, .. } = item {
                    collect_expr_tables(expr, known, out);
                }
            }
            for expr in select.selection.iter().chain(&select.having) {
                collect_expr_tables(expr, known, out);
            }
        }
        SetExpr::Query(query) => collect_query_tables(query, known, out),
        SetExpr::SetOperation { left, right, .. } => {
            collect_set_expr_tables(left, known, out);
            collect_set_expr_tables(right, known, out);
        }
        _ => {}
    }
}

fn collect_table_with_joins(
    table: &TableWithJoins,
    known: &mut HashSet<String>,
    out: &mut Vec<String>,
) {
    collect_table_factor(&table.relation, known, out);
    for join in &table.joins {
        collect_table_factor(&join.relation, known, out);
    }
}

fn collect_table_factor(factor: &TableFactor, known: &mut HashSet<String>, out: &mut Vec<String>) {
    match factor {
        TableFactor::Table { name, .. } => {
            if let Some(ident) = name.0.last() {
                out.push(ident.value.to_lowercase());
            }
        }
        TableFactor::Derived { subquery, .. } => collect_query_tables(subquery, known, out),
        TableFactor::NestedJoin {
            table_with_joins, ..
        } => collect_table_with_joins(table_with_joins, known, out),
        _ => {}
    }
}

fn collect_expr_tables(expr: &Expr, known: &mut HashSet<String>, out: &mut Vec<String>) {
    match expr {
        Expr::Subquery(query) | Expr::Exists { subquery: query, .. } => {
            collect_query_tables(query, known, out)
        }
        Expr::InSubquery { expr, subquery, .. } => {
            collect_expr_tables(expr, known, out);
            collect_query_tables(subquery, known, out);
        }
        Expr::BinaryOp { left, right, .. } => {
            collect_expr_tables(left, known, out);
            collect_expr_tables(right, known, out);
        }
        Expr::UnaryOp { expr, .. }
        | Expr::Nested(expr)
        | Expr::Cast { expr, .. }
        | Expr::IsNull(expr)
        | Expr::IsNotNull(expr) => collect_expr_tables(expr, known, out),
        Expr::InList { expr, list, .. } => {
            collect_expr_tables(expr, known, out);
            for item in list {
                collect_expr_tables(item, known, out);
            }
        }
        Expr::Between { expr, low, high, .. } => {
            collect_expr_tables(expr, known, out);
            collect_expr_tables(low, known, out);
            collect_expr_tables(high, known, out);
        }
        Expr::Case {
            operand,
            conditions,
            results,
            else_result,
        } => {
            for expr in operand.iter().chain(else_result) {
                collect_expr_tables(expr, known, out);
            }
            for expr in conditions.iter().chain(results) {
                collect_expr_tables(expr, known, out);
            }
        }
        Expr::Function(func) => {
            for arg in &func.args {
                if let FunctionArg::Unnamed(FunctionArgExpr::Expr(expr))
                | FunctionArg::Named {
                    arg: FunctionArgExpr::Expr(expr),
                    ..
                } = arg
                {
                    collect_expr_tables(expr, known, out);
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_sql_fence() {
        let raw = "```sql\nSELECT * FROM sales LIMIT 5;\n```";
        assert_eq!(strip_code_fences(raw), "SELECT * FROM sales LIMIT 5");
    }

    #[test]
    fn test_strip_bare_fence_and_prose() {
        let raw = "Here you go:\n```\nSELECT region FROM sales\n```\nHope it helps";
        assert_eq!(strip_code_fences(raw), "SELECT region FROM sales");
    }

    #[test]
    fn test_strip_inline_tag() {
        assert_eq!(strip_code_fences("```sql SELECT 1 FROM sales```"), "SELECT 1 FROM sales");
        assert_eq!(strip_code_fences("```sqlite SELECT 1 FROM sales```"), "SELECT 1 FROM sales");
        assert_eq!(strip_code_fences("```SELECT 1 FROM sales```"), "SELECT 1 FROM sales");
    }

    #[test]
    fn test_unfenced_text_is_trimmed() {
        assert_eq!(strip_code_fences("  SELECT * FROM sales  \n"), "SELECT * FROM sales");
    }

    #[test]
    fn test_accepts_aggregate_query() {
        let sql = "SELECT region, SUM(total_sales) as total_sales FROM sales GROUP BY region ORDER BY total_sales DESC";
        assert!(validate_query(sql, &["sales"]).is_ok());
    }

    #[test]
    fn test_accepts_cte_over_sales() {
        let sql = "WITH big AS (SELECT * FROM sales WHERE quantity > 3) SELECT COUNT(*) FROM big";
        assert!(validate_query(sql, &["sales"]).is_ok());
    }

    #[test]
    fn test_rejects_unknown_table() {
        let err = validate_query("SELECT * FROM customers", &["sales"]).unwrap_err();
        assert!(err.to_string().contains("customers"));
    }

    #[test]
    fn test_rejects_writes_and_prose() {
        assert!(validate_query("DELETE FROM sales", &["sales"]).is_err());
        assert!(validate_query("I cannot answer that question.", &["sales"]).is_err());
        assert!(validate_query("", &["sales"]).is_err());
        assert!(validate_query("SELECT 1; SELECT 2", &["sales"]).is_err());
    }

    #[test]
    fn test_passes_through_sqlite_only_syntax() {
        let sql = "SELECT product FROM sales WHERE product GLOB 'L*'";
        assert!(validate_query(sql, &["sales"]).is_ok());
    }

    #[test]
    fn test_rejects_unknown_table_in_where_subquery() {
        let sql = "SELECT * FROM sales WHERE customer_id IN (SELECT customer_id FROM vip_list)";
        let err = validate_query(sql, &["sales"]).unwrap_err();
        assert!(err.to_string().contains("vip_list"));

        let sql = "SELECT region FROM sales s WHERE EXISTS (SELECT 1 FROM refunds r WHERE r.order_id = s.order_id)";
        assert!(validate_query(sql, &["sales"]).unwrap_err().to_string().contains("refunds"));

        let sql = "SELECT region, (SELECT MAX(total_sales) FROM archive) AS peak FROM sales GROUP BY region HAVING SUM(total_sales) > 0";
        assert!(validate_query(sql, &["sales"]).unwrap_err().to_string().contains("archive"));
    }

    #[test]
    fn test_accepts_subquery_over_sales() {
        let sql = "SELECT * FROM sales WHERE total_sales > (SELECT AVG(total_sales) FROM sales)";
        assert!(validate_query(sql, &["sales"]).is_ok());
    }
}

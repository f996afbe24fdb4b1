//! `custom_sql_check` safety boundary (`spec.md` §4.6's safety section).
//!
//! Ported from `original_source/src/kontra/engine/sql_validator.py`'s
//! `validate_sql`/`to_count_query`: parse, require exactly one read-only
//! `SELECT`/CTE statement, reject a fixed deny-list of side-effecting
//! function names, then wrap the statement in a `COUNT(*)` query so the
//! executor only ever counts rows rather than returning user data. Always
//! wraps rather than rewriting the projection in place — correct for every
//! shape (`DISTINCT`, `GROUP BY`, `LIMIT`, set operations) at the cost of
//! one extra subquery, unlike the original's rewrite-when-simple
//! optimization.

use sqlparser::{
    ast::{Expr, FunctionArg, FunctionArgExpr, FunctionArguments, Query, SetExpr, Statement},
    dialect::GenericDialect,
    parser::Parser
};

use crate::error::{AppResult, sql_parse_error};

const FORBIDDEN_FUNCTIONS: &[&str] = &[
    "pg_sleep",
    "pg_terminate_backend",
    "pg_cancel_backend",
    "pg_reload_conf",
    "set_config",
    "dblink",
    "dblink_exec",
    "lo_import",
    "lo_export",
    "pg_file_write",
    "pg_read_file",
    "pg_ls_dir",
    "xp_cmdshell",
    "xp_regread",
    "xp_regwrite",
    "sp_executesql",
    "sp_oacreate",
    "openrowset",
    "opendatasource",
    "bulk",
    "exec",
    "execute",
    "call",
    "sleep",
];

/// Validates `sql` and returns the rewritten `SELECT COUNT(*) FROM (...)`
/// query safe to hand to a SQL executor. Rejects anything that is not a
/// single `SELECT`/CTE statement, or that calls a forbidden function.
pub fn validate_custom_sql(sql: &str) -> AppResult<String> {
    let trimmed = sql.trim();
    if trimmed.is_empty() {
        return Err(sql_parse_error("custom_sql_check requires a non-empty SQL statement"));
    }

    let statements =
        Parser::parse_sql(&GenericDialect {}, trimmed).map_err(|e| sql_parse_error(format!("custom_sql_check SQL failed to parse: {e}")))?;

    if statements.len() != 1 {
        return Err(sql_parse_error(format!(
            "custom_sql_check expects exactly one statement, found {}",
            statements.len()
        )));
    }

    let Statement::Query(query) = &statements[0] else {
        return Err(sql_parse_error("custom_sql_check only allows a SELECT statement"));
    };

    if let Some(name) = find_forbidden_function(query) {
        return Err(sql_parse_error(format!("custom_sql_check uses forbidden function '{name}'")));
    }

    Ok(format!("SELECT COUNT(*) FROM ({trimmed}) AS _v"))
}

fn find_forbidden_function(query: &Query) -> Option<String> {
    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            if let Some(name) = find_forbidden_function(&cte.query) {
                return Some(name);
            }
        }
    }
    find_forbidden_in_set_expr(&query.body)
}

fn find_forbidden_in_set_expr(set_expr: &SetExpr) -> Option<String> {
    match set_expr {
        SetExpr::Select(select) => {
            for item in &select.projection {
                let expr = match item {
                    sqlparser::ast::SelectItem::UnnamedExpr(e) | sqlparser::ast::SelectItem::ExprWithAlias { expr: e, .. } => Some(e),
                    _ => None
                };
                if let Some(e) = expr
                    && let Some(name) = find_forbidden_in_expr(e)
                {
                    return Some(name);
                }
            }
            if let Some(selection) = &select.selection
                && let Some(name) = find_forbidden_in_expr(selection)
            {
                return Some(name);
            }
            if let Some(having) = &select.having
                && let Some(name) = find_forbidden_in_expr(having)
            {
                return Some(name);
            }
            None
        }
        SetExpr::SetOperation { left, right, .. } => find_forbidden_in_set_expr(left).or_else(|| find_forbidden_in_set_expr(right)),
        SetExpr::Query(query) => find_forbidden_function(query),
        SetExpr::Values(_) | SetExpr::Insert(_) | SetExpr::Update(_) | SetExpr::Table(_) | SetExpr::Delete(_) | SetExpr::Merge(_) => None
    }
}

fn find_forbidden_in_expr(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Function(func) => {
            let name = func.name.to_string().to_lowercase();
            if FORBIDDEN_FUNCTIONS.contains(&name.as_str()) {
                return Some(name);
            }
            if let FunctionArguments::List(arg_list) = &func.args {
                for arg in &arg_list.args {
                    if let FunctionArg::Unnamed(FunctionArgExpr::Expr(e)) = arg
                        && let Some(found) = find_forbidden_in_expr(e)
                    {
                        return Some(found);
                    }
                }
            }
            None
        }
        Expr::BinaryOp { left, right, .. } => find_forbidden_in_expr(left).or_else(|| find_forbidden_in_expr(right)),
        Expr::UnaryOp { expr, .. } | Expr::IsNull(expr) | Expr::IsNotNull(expr) | Expr::Nested(expr) => find_forbidden_in_expr(expr),
        Expr::Between { expr, low, high, .. } => find_forbidden_in_expr(expr)
            .or_else(|| find_forbidden_in_expr(low))
            .or_else(|| find_forbidden_in_expr(high)),
        Expr::InList { expr, list, .. } => find_forbidden_in_expr(expr).or_else(|| list.iter().find_map(find_forbidden_in_expr)),
        Expr::InSubquery { expr, subquery, .. } => find_forbidden_in_expr(expr).or_else(|| find_forbidden_function(subquery)),
        Expr::Subquery(subquery) | Expr::Exists { subquery, .. } => find_forbidden_function(subquery),
        _ => None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_plain_select() {
        let rewritten = validate_custom_sql("SELECT id FROM orders WHERE total < 0").unwrap();
        assert_eq!(rewritten, "SELECT COUNT(*) FROM (SELECT id FROM orders WHERE total < 0) AS _v");
    }

    #[test]
    fn allows_cte() {
        let rewritten = validate_custom_sql("WITH recent AS (SELECT id FROM orders) SELECT id FROM recent").unwrap();
        assert!(rewritten.starts_with("SELECT COUNT(*) FROM ("));
    }

    #[test]
    fn rejects_multiple_statements() {
        assert!(validate_custom_sql("SELECT 1; SELECT 2").is_err());
    }

    #[test]
    fn rejects_non_select_statement() {
        assert!(validate_custom_sql("DELETE FROM orders").is_err());
    }

    #[test]
    fn rejects_forbidden_function_in_selection() {
        let err = validate_custom_sql("SELECT id FROM orders WHERE pg_sleep(5) IS NULL").unwrap_err();
        assert!(format!("{err}").contains("forbidden function"));
    }

    #[test]
    fn rejects_forbidden_function_in_subquery() {
        let err = validate_custom_sql("SELECT id FROM orders WHERE id IN (SELECT xp_cmdshell('dir'))").unwrap_err();
        assert!(format!("{err}").contains("forbidden function"));
    }
}

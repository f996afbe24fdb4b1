//! Error taxonomy for the validation engine.
//!
//! Every error raised by the engine maps onto one of the kinds in the
//! taxonomy below. Config and resource errors are run-fatal; capability
//! gaps and benign metadata absence are not errors at all (they are
//! control-flow, handled in [`crate::preplan`] and [`crate::sql`]
//! directly) and never constructed here.

pub use masterror::{AppError, AppResult};

/// Malformed contract, unknown rule name, missing/invalid parameter, or an
/// unparseable datasource URI. Fatal at phase 1.
pub fn config_error(message: impl Into<String>) -> AppError {
    AppError::bad_request(message.into())
}

/// File not found, access denied, auth failure, or connection refused.
/// Propagated from the preplan and SQL tiers as run-fatal; never swallowed.
pub fn resource_error(message: impl Into<String>) -> AppError {
    AppError::internal(message.into())
}

/// Cancellation, timeout, or an otherwise-uncategorized failure surfaced at
/// runtime after the contract and handle were already accepted.
pub fn runtime_error(message: impl Into<String>) -> AppError {
    AppError::service(message.into())
}

/// Wrap a SQL parser error with position context when available.
pub fn sql_parse_error(message: impl Into<String>) -> AppError {
    let msg = message.into();
    AppError::bad_request(format_sql_error("SQL parse error", &msg))
}

pub fn io_error(path: &str, source: std::io::Error) -> AppError {
    resource_error(format!("failed to read '{path}': {source}"))
}

fn format_sql_error(prefix: &str, message: &str) -> String {
    if let Some(pos) = extract_position(message) {
        format!(
            "{prefix} at line {line}, column {column}:\n  {message}",
            line = pos.line,
            column = pos.column,
        )
    } else {
        format!("{prefix}:\n  {message}")
    }
}

struct SqlPosition {
    line:   usize,
    column: usize
}

fn extract_position(message: &str) -> Option<SqlPosition> {
    let line_marker = "Line: ";
    let col_marker = ", Column ";
    let line_start = message.find(line_marker)?;
    let line_num_start = line_start + line_marker.len();
    let rest = message.get(line_num_start..)?;
    let col_start = rest.find(col_marker)?;
    let line_str = message.get(line_num_start..line_num_start + col_start)?;
    let col_num_start = line_num_start + col_start + col_marker.len();
    let col_rest = message.get(col_num_start..)?;
    let col_end = col_rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(col_rest.len());
    let col_str = message.get(col_num_start..col_num_start + col_end)?;
    Some(SqlPosition {
        line:   line_str.parse().ok()?,
        column: col_str.parse().ok()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_is_bad_request() {
        let err = config_error("unknown rule 'foo'");
        assert!(err.to_string().contains("unknown rule"));
    }

    #[test]
    fn sql_parse_error_extracts_position() {
        let err = sql_parse_error("Expected ), found: FROM, Line: 2, Column 5");
        assert!(err.to_string().contains("line 2, column 5"));
    }
}

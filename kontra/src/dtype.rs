//! Dtype family normalization shared by the Preplan metadata engine and the
//! columnar-tier `Dtype` rule. `Utf8` and `String` are equivalent; integer
//! and float families are compared exactly, per `spec.md` §4.2.

use arrow::datatypes::DataType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DtypeFamily {
    Utf8,
    Integer,
    Float,
    Bool,
    Timestamp,
    Unknown
}

pub fn normalize_alias(name: &str) -> DtypeFamily {
    match name.to_ascii_lowercase().as_str() {
        "utf8" | "string" | "str" | "varchar" | "text" => DtypeFamily::Utf8,
        "int" | "integer" | "int32" | "int64" | "bigint" | "smallint" => DtypeFamily::Integer,
        "float" | "double" | "float32" | "float64" | "numeric" | "decimal" => DtypeFamily::Float,
        "bool" | "boolean" => DtypeFamily::Bool,
        "timestamp" | "datetime" | "date" => DtypeFamily::Timestamp,
        _ => DtypeFamily::Unknown
    }
}

/// Maps a Parquet physical type to the same family space as
/// [`normalize_alias`]/[`arrow_family`], for [`crate::preplan`]'s
/// metadata-only dtype decision (no Arrow schema is materialized there).
pub fn parquet_physical_family(ty: parquet::basic::Type) -> DtypeFamily {
    use parquet::basic::Type;
    match ty {
        Type::BOOLEAN => DtypeFamily::Bool,
        Type::INT32 | Type::INT64 | Type::INT96 => DtypeFamily::Integer,
        Type::FLOAT | Type::DOUBLE => DtypeFamily::Float,
        Type::BYTE_ARRAY | Type::FIXED_LEN_BYTE_ARRAY => DtypeFamily::Utf8
    }
}

pub fn arrow_family(dt: &DataType) -> DtypeFamily {
    match dt {
        DataType::Utf8 | DataType::LargeUtf8 => DtypeFamily::Utf8,
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => DtypeFamily::Integer,
        DataType::Float16 | DataType::Float32 | DataType::Float64 | DataType::Decimal128(..) => {
            DtypeFamily::Float
        }
        DataType::Boolean => DtypeFamily::Bool,
        DataType::Timestamp(..) | DataType::Date32 | DataType::Date64 => DtypeFamily::Timestamp,
        _ => DtypeFamily::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf8_and_string_are_equivalent() {
        assert_eq!(normalize_alias("utf8"), normalize_alias("string"));
    }

    #[test]
    fn integer_and_float_families_are_distinct() {
        assert_ne!(normalize_alias("integer"), normalize_alias("float"));
    }
}

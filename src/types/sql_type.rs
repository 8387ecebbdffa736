//! ClickHouse type tags for bound query parameters.
//!
//! A [`SqlType`] renders to the exact type name ClickHouse expects inside a
//! `{name: Type}` parameter binding. Rendering is pure and cannot fail.

use std::fmt;

/// Column or parameter type understood by the ClickHouse binding syntax.
///
/// `Nullable` may wrap any tag, including another `Nullable`. ClickHouse rejects
/// nested nullables at execution time; that is not checked here.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SqlType {
    Int8,
    Int16,
    Int32,
    Int64,
    Int128,
    Int256,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    UInt128,
    UInt256,
    Float32,
    Float64,
    String,
    Boolean,
    DateTime,
    Decimal { precision: u8, scale: u8 },
    Nullable(Box<SqlType>),
}

impl SqlType {
    /// Fixed-width integer tag for a bit width and signedness.
    ///
    /// Returns `None` for widths ClickHouse has no integer type for.
    pub fn fixed_int(bits: u16, signed: bool) -> Option<Self> {
        let tag = match (bits, signed) {
            (8, true) => Self::Int8,
            (16, true) => Self::Int16,
            (32, true) => Self::Int32,
            (64, true) => Self::Int64,
            (128, true) => Self::Int128,
            (256, true) => Self::Int256,
            (8, false) => Self::UInt8,
            (16, false) => Self::UInt16,
            (32, false) => Self::UInt32,
            (64, false) => Self::UInt64,
            (128, false) => Self::UInt128,
            (256, false) => Self::UInt256,
            _ => return None,
        };
        Some(tag)
    }

    pub fn decimal(precision: u8, scale: u8) -> Self {
        Self::Decimal { precision, scale }
    }

    pub fn nullable(inner: SqlType) -> Self {
        Self::Nullable(Box::new(inner))
    }

    /// Text form used in the `{name: Type}` binding.
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int8 => f.write_str("Int8"),
            Self::Int16 => f.write_str("Int16"),
            Self::Int32 => f.write_str("Int32"),
            Self::Int64 => f.write_str("Int64"),
            Self::Int128 => f.write_str("Int128"),
            Self::Int256 => f.write_str("Int256"),
            Self::UInt8 => f.write_str("UInt8"),
            Self::UInt16 => f.write_str("UInt16"),
            Self::UInt32 => f.write_str("UInt32"),
            Self::UInt64 => f.write_str("UInt64"),
            Self::UInt128 => f.write_str("UInt128"),
            Self::UInt256 => f.write_str("UInt256"),
            Self::Float32 => f.write_str("Float32"),
            Self::Float64 => f.write_str("Float64"),
            Self::String => f.write_str("String"),
            Self::Boolean => f.write_str("Boolean"),
            Self::DateTime => f.write_str("DateTime"),
            Self::Decimal { precision, scale } => write!(f, "Decimal({},{})", precision, scale),
            Self::Nullable(inner) => write!(f, "Nullable({})", inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(SqlType::Int8, "Int8")]
    #[case(SqlType::UInt32, "UInt32")]
    #[case(SqlType::UInt256, "UInt256")]
    #[case(SqlType::Float64, "Float64")]
    #[case(SqlType::String, "String")]
    #[case(SqlType::Boolean, "Boolean")]
    #[case(SqlType::DateTime, "DateTime")]
    fn test_render_simple_tags(#[case] tag: SqlType, #[case] expected: &str) {
        assert_eq!(tag.render(), expected);
    }

    #[rstest]
    fn test_render_decimal() {
        assert_eq!(SqlType::decimal(10, 2).render(), "Decimal(10,2)");
    }

    #[rstest]
    fn test_render_nullable_string() {
        assert_eq!(SqlType::nullable(SqlType::String).render(), "Nullable(String)");
    }

    #[rstest]
    fn test_render_nested_nullable_is_not_validated() {
        let tag = SqlType::nullable(SqlType::nullable(SqlType::decimal(18, 4)));
        assert_eq!(tag.render(), "Nullable(Nullable(Decimal(18,4)))");
    }

    #[rstest]
    #[case(8, true, Some(SqlType::Int8))]
    #[case(64, false, Some(SqlType::UInt64))]
    #[case(128, true, Some(SqlType::Int128))]
    #[case(24, true, None)]
    fn test_fixed_int(#[case] bits: u16, #[case] signed: bool, #[case] expected: Option<SqlType>) {
        assert_eq!(SqlType::fixed_int(bits, signed), expected);
    }
}

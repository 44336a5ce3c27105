use serde::Serialize;
use sqlx::query::Query;
use sqlx::sqlite::SqliteArguments;
use sqlx::Sqlite;

use crate::db::schema::ColumnType;

/// A cell after coercion against its column's storage class.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }
}

/// Coerce one raw cell.
///
/// Blank cells become NULL. Numeric columns parse when they can and otherwise
/// keep the trimmed text, leaving SQLite's column affinity to decide.
pub fn coerce_cell(raw: &str, column_type: ColumnType) -> CellValue {
    let s = raw.trim();
    if s.is_empty() {
        return CellValue::Null;
    }
    match column_type {
        ColumnType::Integer => parse_integer(s)
            .map(CellValue::Integer)
            .unwrap_or_else(|| CellValue::Text(s.to_string())),
        ColumnType::Real => parse_real(s)
            .map(CellValue::Real)
            .unwrap_or_else(|| CellValue::Text(s.to_string())),
        ColumnType::Text | ColumnType::Other => CellValue::Text(s.to_string()),
    }
}

fn parse_integer(s: &str) -> Option<i64> {
    if let Ok(value) = s.parse::<i64>() {
        return Some(value);
    }
    // Spreadsheets hand back whole numbers as "3.0".
    let float = parse_real(s)?;
    if float.fract() == 0.0 && float >= i64::MIN as f64 && float < i64::MAX as f64 {
        Some(float as i64)
    } else {
        None
    }
}

fn parse_real(s: &str) -> Option<f64> {
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

pub(crate) fn bind_cell<'q>(
    q: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &CellValue,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        CellValue::Null => q.bind(Option::<i64>::None),
        CellValue::Integer(i) => q.bind(*i),
        CellValue::Real(f) => q.bind(*f),
        CellValue::Text(s) => q.bind(s.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn blank_is_null_for_every_type() {
        for ty in [
            ColumnType::Integer,
            ColumnType::Real,
            ColumnType::Text,
            ColumnType::Other,
        ] {
            assert_eq!(coerce_cell("", ty), CellValue::Null);
            assert_eq!(coerce_cell("   ", ty), CellValue::Null);
        }
    }

    #[test]
    fn real_column_parses_decimal_text() {
        assert_eq!(coerce_cell("12.50", ColumnType::Real), CellValue::Real(12.5));
        assert_eq!(coerce_cell(" 7 ", ColumnType::Real), CellValue::Real(7.0));
        assert_eq!(
            coerce_cell("twelve", ColumnType::Real),
            CellValue::Text("twelve".into())
        );
        assert_eq!(coerce_cell("inf", ColumnType::Real), CellValue::Text("inf".into()));
    }

    #[test]
    fn integer_column_accepts_whole_floats_only() {
        assert_eq!(coerce_cell("42", ColumnType::Integer), CellValue::Integer(42));
        assert_eq!(coerce_cell("3.0", ColumnType::Integer), CellValue::Integer(3));
        assert_eq!(
            coerce_cell("3.7", ColumnType::Integer),
            CellValue::Text("3.7".into())
        );
        assert_eq!(
            coerce_cell("abc", ColumnType::Integer),
            CellValue::Text("abc".into())
        );
    }

    #[test]
    fn text_is_trimmed_not_parsed() {
        assert_eq!(
            coerce_cell("  0123 ", ColumnType::Text),
            CellValue::Text("0123".into())
        );
    }

    proptest! {
        #[test]
        fn any_i64_round_trips(n in any::<i64>()) {
            prop_assert_eq!(coerce_cell(&n.to_string(), ColumnType::Integer), CellValue::Integer(n));
        }

        #[test]
        fn alphabetic_text_passes_through_numeric_columns(s in "[a-zA-Z][a-zA-Z ]{0,20}[a-zA-Z]") {
            prop_assert_eq!(coerce_cell(&s, ColumnType::Integer), CellValue::Text(s.clone()));
            prop_assert_eq!(coerce_cell(&s, ColumnType::Real), CellValue::Text(s.clone()));
        }

        #[test]
        fn finite_floats_parse_into_real(f in -1.0e12f64..1.0e12f64) {
            prop_assert_eq!(coerce_cell(&f.to_string(), ColumnType::Real), CellValue::Real(f));
        }
    }
}

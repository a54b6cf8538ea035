use ordered_float::OrderedFloat;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Why a cell evaluated to an error value.
///
/// Error values flow through cell evaluation like any other value; both the native `HAVING`
/// clause and the interpreted non-empty filter treat them as empty.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CellError {
    DivZero,
    /// A calculated measure references a member that no longer resolves.
    Unresolved,
    /// A calculated member in context has no evaluable definition.
    NotComputable,
}

impl CellError {
    pub fn as_code(self) -> &'static str {
        match self {
            CellError::DivZero => "#DIV/0!",
            CellError::Unresolved => "#REF!",
            CellError::NotComputable => "#CALC!",
        }
    }
}

impl fmt::Display for CellError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_code())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Value {
    Null,
    Boolean(bool),
    Number(OrderedFloat<f64>),
    Text(Arc<str>),
    Error(CellError),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    /// A cell "has data" when it is neither null nor an error value.
    pub fn has_data(&self) -> bool {
        !self.is_null() && !self.is_error()
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(n.0),
            Value::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// Total order used for `ORDER BY` and member ordering: nulls sort last.
    pub fn cmp_nulls_last(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Null, _) => Ordering::Greater,
            (_, Value::Null) => Ordering::Less,
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::Boolean(_), _) => Ordering::Less,
            (_, Value::Boolean(_)) => Ordering::Greater,
            (Value::Number(a), Value::Number(b)) => a.cmp(b),
            (Value::Number(_), _) => Ordering::Less,
            (_, Value::Number(_)) => Ordering::Greater,
            (Value::Text(a), Value::Text(b)) => a.as_ref().cmp(b.as_ref()),
            (Value::Text(_), _) => Ordering::Less,
            (_, Value::Text(_)) => Ordering::Greater,
            (Value::Error(a), Value::Error(b)) => a.as_code().cmp(b.as_code()),
        }
    }

    /// Render the value as a SQL literal.
    pub fn to_sql_literal(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Boolean(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            Value::Number(n) => format_number(n.0),
            Value::Text(s) => format!("'{}'", s.replace('\'', "''")),
            Value::Error(e) => format!("'{e}'"),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("#null"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Number(n) => f.write_str(&format_number(n.0)),
            Value::Text(s) => f.write_str(s),
            Value::Error(e) => write!(f, "{e}"),
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(OrderedFloat(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Number(OrderedFloat(value as f64))
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Number(OrderedFloat(f64::from(value)))
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(Arc::from(value))
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(Arc::from(value))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nulls_sort_after_everything() {
        let mut values = vec![Value::Null, Value::from(2), Value::from("a"), Value::from(1)];
        values.sort_by(Value::cmp_nulls_last);
        assert_eq!(
            values,
            vec![Value::from(1), Value::from(2), Value::from("a"), Value::Null]
        );
    }

    #[test]
    fn sql_literals_escape_quotes_and_render_integers() {
        assert_eq!(Value::from("O'Brien").to_sql_literal(), "'O''Brien'");
        assert_eq!(Value::from(1997).to_sql_literal(), "1997");
        assert_eq!(Value::from(2.5).to_sql_literal(), "2.5");
        assert_eq!(Value::Null.to_sql_literal(), "NULL");
    }

    #[test]
    fn errors_and_nulls_have_no_data() {
        assert!(!Value::Null.has_data());
        assert!(!Value::Error(CellError::DivZero).has_data());
        assert!(Value::from(0).has_data());
    }
}

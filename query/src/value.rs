//! Bound parameter values and their conversions for the database drivers

use serde_json::Value;

/// A caller-supplied compare value, bound through a placeholder and never inlined.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl SqlValue {
    pub fn is_null(&self) -> bool { matches!(self, SqlValue::Null) }

    /// Lowercased copy, for the case-folding operators.
    pub fn to_lowercase(&self) -> SqlValue {
        match self {
            SqlValue::Text(s) => SqlValue::Text(s.to_lowercase()),
            other => SqlValue::Text(other.to_string().to_lowercase()),
        }
    }
}

impl std::fmt::Display for SqlValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlValue::Null => write!(f, "NULL"),
            SqlValue::Bool(b) => write!(f, "{}", b),
            SqlValue::Integer(i) => write!(f, "{}", i),
            SqlValue::Float(x) => write!(f, "{}", x),
            SqlValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<&Value> for SqlValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => SqlValue::Null,
            Value::Bool(b) => SqlValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => SqlValue::Integer(i),
                None => SqlValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => SqlValue::Text(s.clone()),
            // nested structures are compared by their JSON text
            Value::Array(_) | Value::Object(_) => SqlValue::Text(value.to_string()),
        }
    }
}

impl From<Value> for SqlValue {
    fn from(value: Value) -> Self { SqlValue::from(&value) }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self { SqlValue::Text(value.to_owned()) }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self { SqlValue::Text(value) }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self { SqlValue::Integer(value) }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self { SqlValue::Float(value) }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self { SqlValue::Bool(value) }
}

/// Cast a compare value for a numeric column. Strings that do not parse are left untouched and the
/// database decides.
pub fn cast_numeric(value: &Value) -> Value {
    match value {
        Value::String(s) => match s.trim().parse::<i64>() {
            Ok(i) => Value::from(i),
            Err(_) => match s.trim().parse::<f64>() {
                Ok(f) if f.is_finite() => serde_json::Number::from_f64(f).map(Value::Number).unwrap_or_else(|| value.clone()),
                _ => value.clone(),
            },
        },
        Value::Array(items) => Value::Array(items.iter().map(cast_numeric).collect()),
        other => other.clone(),
    }
}

#[cfg(feature = "sqlite")]
mod sqlite {
    use rusqlite::types::{ToSqlOutput, Value};
    use rusqlite::ToSql;

    use super::SqlValue;

    impl ToSql for SqlValue {
        fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
            Ok(ToSqlOutput::Owned(match self {
                SqlValue::Null => Value::Null,
                SqlValue::Bool(b) => Value::Integer(if *b { 1 } else { 0 }),
                SqlValue::Integer(i) => Value::Integer(*i),
                SqlValue::Float(f) => Value::Real(*f),
                SqlValue::Text(s) => Value::Text(s.clone()),
            }))
        }
    }
}

#[cfg(feature = "postgres")]
mod postgres {
    use bytes::BytesMut;
    use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type};

    use super::SqlValue;

    type BoxError = Box<dyn std::error::Error + Sync + Send>;

    impl ToSql for SqlValue {
        fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
            match self {
                SqlValue::Null => Ok(IsNull::Yes),
                SqlValue::Bool(b) => b.to_sql(ty, out),
                SqlValue::Integer(i) => {
                    if *ty == Type::INT2 {
                        i16::try_from(*i)?.to_sql(ty, out)
                    } else if *ty == Type::INT4 {
                        i32::try_from(*i)?.to_sql(ty, out)
                    } else if *ty == Type::FLOAT4 {
                        (*i as f32).to_sql(ty, out)
                    } else if *ty == Type::FLOAT8 {
                        (*i as f64).to_sql(ty, out)
                    } else if *ty == Type::TEXT || *ty == Type::VARCHAR {
                        i.to_string().to_sql(ty, out)
                    } else {
                        i.to_sql(ty, out)
                    }
                }
                SqlValue::Float(f) => {
                    if *ty == Type::FLOAT4 {
                        (*f as f32).to_sql(ty, out)
                    } else if *ty == Type::TEXT || *ty == Type::VARCHAR {
                        f.to_string().to_sql(ty, out)
                    } else {
                        f.to_sql(ty, out)
                    }
                }
                SqlValue::Text(s) => {
                    if *ty == Type::JSON || *ty == Type::JSONB {
                        serde_json::Value::String(s.clone()).to_sql(ty, out)
                    } else {
                        s.to_sql(ty, out)
                    }
                }
            }
        }

        fn accepts(ty: &Type) -> bool {
            <bool as ToSql>::accepts(ty)
                || <i64 as ToSql>::accepts(ty)
                || <i32 as ToSql>::accepts(ty)
                || <i16 as ToSql>::accepts(ty)
                || <f64 as ToSql>::accepts(ty)
                || <f32 as ToSql>::accepts(ty)
                || <String as ToSql>::accepts(ty)
                || <serde_json::Value as ToSql>::accepts(ty)
        }

        to_sql_checked!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json() {
        assert_eq!(SqlValue::from(&json!(3)), SqlValue::Integer(3));
        assert_eq!(SqlValue::from(&json!(1.5)), SqlValue::Float(1.5));
        assert_eq!(SqlValue::from(&json!("a")), SqlValue::Text("a".into()));
        assert_eq!(SqlValue::from(&json!(null)), SqlValue::Null);
        assert_eq!(SqlValue::from(&json!({ "a": 1 })), SqlValue::Text(r#"{"a":1}"#.into()));
    }

    #[test]
    fn test_cast_numeric() {
        assert_eq!(cast_numeric(&json!("42")), json!(42));
        assert_eq!(cast_numeric(&json!("4.5")), json!(4.5));
        assert_eq!(cast_numeric(&json!("abc")), json!("abc"));
        assert_eq!(cast_numeric(&json!(["1", "x"])), json!([1, "x"]));
    }

    #[test]
    fn test_lowercase() {
        assert_eq!(SqlValue::from("RED").to_lowercase(), SqlValue::Text("red".into()));
    }
}

use chrono::{NaiveDate, NaiveDateTime};

use crate::error::{OrmError, Result};
use crate::mapping::StorageType;

/// Core value type for everything that crosses the storage boundary:
/// entity attributes, bound statement parameters, and raw result cells.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Boolean(bool),
    DateTime(NaiveDateTime),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "NULL",
            Self::Integer(_) => "INTEGER",
            Self::Real(_) => "REAL",
            Self::Text(_) => "TEXT",
            Self::Boolean(_) => "BOOLEAN",
            Self::DateTime(_) => "DATETIME",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Whether this value can be bound to a column of the given storage
    /// type without loss. `Null` fits everywhere; nullability is checked
    /// separately against the field mapping.
    pub fn fits(&self, storage_type: StorageType) -> bool {
        match (self, storage_type) {
            (Self::Null, _) => true,
            (Self::Integer(_), StorageType::Integer) => true,
            (Self::Real(_) | Self::Integer(_), StorageType::Real) => true,
            (Self::Text(_), StorageType::Text) => true,
            (Self::Boolean(_), StorageType::Boolean) => true,
            (Self::DateTime(_), StorageType::DateTime) => true,
            _ => false,
        }
    }

    /// Coerce a raw store cell into the value shape of the mapped field.
    ///
    /// The store keeps booleans as 0/1 integers and datetimes as ISO-8601
    /// text (or epoch seconds from foreign writers); materialization maps
    /// them back to the typed representation.
    pub fn coerce(raw: Self, field: &str, storage_type: StorageType) -> Result<Self> {
        let mismatch = |field: &str| OrmError::ValueTypeMismatch {
            field: field.to_string(),
            expected: storage_type,
        };
        match (raw, storage_type) {
            (Self::Null, _) => Ok(Self::Null),
            (Self::Integer(i), StorageType::Integer) => Ok(Self::Integer(i)),
            (Self::Real(f), StorageType::Real) => Ok(Self::Real(f)),
            (Self::Integer(i), StorageType::Real) => Ok(Self::Real(i as f64)),
            (Self::Text(s), StorageType::Text) => Ok(Self::Text(s)),
            (Self::Integer(i), StorageType::Boolean) => Ok(Self::Boolean(i != 0)),
            (Self::Boolean(b), StorageType::Boolean) => Ok(Self::Boolean(b)),
            (Self::Text(s), StorageType::DateTime) => {
                parse_datetime(&s).map(Self::DateTime).ok_or_else(|| mismatch(field))
            }
            (Self::Integer(i), StorageType::DateTime) => {
                chrono::DateTime::from_timestamp(i, 0)
                    .map(|dt| Self::DateTime(dt.naive_utc()))
                    .ok_or_else(|| mismatch(field))
            }
            (Self::DateTime(dt), StorageType::DateTime) => Ok(Self::DateTime(dt)),
            _ => Err(mismatch(field)),
        }
    }
}

/// Accepts full ISO-8601 datetimes (`1981-01-01T00:00:00`, space
/// separator tolerated) and bare dates, which mean midnight.
pub(crate) fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(dt);
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Real(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::Real(f64::from(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Self::DateTime(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        // Bare dates persist as midnight datetimes.
        Self::DateTime(v.and_time(chrono::NaiveTime::MIN))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coerces_integer_to_boolean() {
        let v = Value::coerce(Value::Integer(1), "flag", StorageType::Boolean).unwrap();
        assert_eq!(v, Value::Boolean(true));
        let v = Value::coerce(Value::Integer(0), "flag", StorageType::Boolean).unwrap();
        assert_eq!(v, Value::Boolean(false));
    }

    #[test]
    fn coerces_iso_text_to_datetime() {
        let v = Value::coerce(
            Value::Text("1981-01-01T00:00:00".into()),
            "when",
            StorageType::DateTime,
        )
        .unwrap();
        let expected = NaiveDate::from_ymd_opt(1981, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(v, Value::DateTime(expected));
    }

    #[test]
    fn coerces_epoch_seconds_to_datetime() {
        let v = Value::coerce(Value::Integer(0), "when", StorageType::DateTime).unwrap();
        let expected = NaiveDate::from_ymd_opt(1970, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(v, Value::DateTime(expected));
    }

    #[test]
    fn widens_integer_to_real() {
        let v = Value::coerce(Value::Integer(2), "f", StorageType::Real).unwrap();
        assert_eq!(v, Value::Real(2.0));
    }

    #[test]
    fn rejects_text_as_integer() {
        let err = Value::coerce(Value::Text("x".into()), "n", StorageType::Integer).unwrap_err();
        assert!(matches!(err, OrmError::ValueTypeMismatch { .. }));
    }

    #[test]
    fn null_fits_every_type() {
        for ty in [
            StorageType::Integer,
            StorageType::Text,
            StorageType::Real,
            StorageType::Boolean,
            StorageType::DateTime,
        ] {
            assert!(Value::Null.fits(ty));
        }
    }
}

// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Engine-neutral cell values and their conversion to JSON-safe payloads.
//!
//! Execution engines decode driver values into [`SqlValue`]; the streaming
//! runner converts them with [`SqlValue::into_json`] before anything reaches
//! the event stream, so every row payload can be encoded without custom
//! serializers.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Utc};
use serde_json::Value;

/// A single decoded cell.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Arbitrary-precision decimal in its canonical text form.
    Decimal(String),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    Timestamp(DateTime<Utc>),
    Uuid(uuid::Uuid),
}

impl SqlValue {
    /// Converts into a JSON value that any encoder accepts.
    ///
    /// Decimals and uuids become strings, date/time values ISO-8601 strings,
    /// bytes are decoded as UTF-8 with invalid sequences replaced, and
    /// non-finite floats are stringified.
    pub fn into_json(self) -> Value {
        match self {
            SqlValue::Null => Value::Null,
            SqlValue::Bool(b) => Value::Bool(b),
            SqlValue::Int(i) => Value::from(i),
            SqlValue::Float(f) => serde_json::Number::from_f64(f)
                .map(Value::Number)
                .unwrap_or_else(|| Value::String(f.to_string())),
            SqlValue::Decimal(d) => Value::String(d),
            SqlValue::Text(s) => Value::String(s),
            SqlValue::Bytes(b) => Value::String(String::from_utf8_lossy(&b).into_owned()),
            SqlValue::Date(d) => Value::String(d.format("%Y-%m-%d").to_string()),
            SqlValue::Time(t) => Value::String(t.format("%H:%M:%S%.f").to_string()),
            SqlValue::DateTime(dt) => Value::String(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
            SqlValue::Timestamp(ts) => {
                Value::String(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            SqlValue::Uuid(u) => Value::String(u.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn decimals_and_uuids_are_stringified() {
        assert_eq!(
            SqlValue::Decimal("12.500".into()).into_json(),
            Value::String("12.500".into())
        );
        let id = uuid::Uuid::nil();
        assert_eq!(
            SqlValue::Uuid(id).into_json(),
            Value::String("00000000-0000-0000-0000-000000000000".into())
        );
    }

    #[test]
    fn dates_are_iso_formatted() {
        let d = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        assert_eq!(SqlValue::Date(d).into_json(), Value::String("2026-03-01".into()));

        let dt = d.and_hms_opt(13, 5, 9).unwrap();
        assert_eq!(
            SqlValue::DateTime(dt).into_json(),
            Value::String("2026-03-01T13:05:09".into())
        );

        let ts = dt.and_utc();
        assert_eq!(
            SqlValue::Timestamp(ts).into_json(),
            Value::String("2026-03-01T13:05:09Z".into())
        );
    }

    #[test]
    fn invalid_utf8_bytes_are_replaced() {
        let v = SqlValue::Bytes(vec![b'o', b'k', 0xff]).into_json();
        assert_eq!(v, Value::String("ok\u{FFFD}".into()));
    }

    #[test]
    fn non_finite_floats_become_strings() {
        assert_eq!(SqlValue::Float(f64::NAN).into_json(), Value::String("NaN".into()));
        assert_eq!(SqlValue::Float(1.5).into_json(), serde_json::json!(1.5));
    }

    fn any_sql_value() -> impl Strategy<Value = SqlValue> {
        prop_oneof![
            Just(SqlValue::Null),
            any::<bool>().prop_map(SqlValue::Bool),
            any::<i64>().prop_map(SqlValue::Int),
            any::<f64>().prop_map(SqlValue::Float),
            prop_oneof![Just(f64::NAN), Just(f64::INFINITY), Just(f64::NEG_INFINITY)]
                .prop_map(SqlValue::Float),
            "-?[0-9]{1,20}\\.[0-9]{0,10}".prop_map(SqlValue::Decimal),
            any::<String>().prop_map(SqlValue::Text),
            proptest::collection::vec(any::<u8>(), 0..64).prop_map(SqlValue::Bytes),
            (-2_000_000_000i64..2_000_000_000i64).prop_map(|secs| {
                SqlValue::Timestamp(DateTime::from_timestamp(secs, 0).unwrap_or_default())
            }),
            any::<[u8; 16]>().prop_map(|b| SqlValue::Uuid(uuid::Uuid::from_bytes(b))),
        ]
    }

    proptest! {
        #[test]
        fn every_value_encodes_as_json(value in any_sql_value()) {
            let is_null = value == SqlValue::Null;
            let json = value.into_json();
            prop_assert!(serde_json::to_string(&json).is_ok());
            prop_assert_eq!(json.is_null(), is_null);
        }

        #[test]
        fn floats_never_panic(f in any::<f64>()) {
            let json = SqlValue::Float(f).into_json();
            if f.is_finite() {
                prop_assert!(json.is_number());
            } else {
                prop_assert!(json.is_string());
            }
        }

        #[test]
        fn bytes_always_decode_to_text(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
            let json = SqlValue::Bytes(bytes).into_json();
            prop_assert!(json.is_string());
        }
    }
}

//! # JSON Value Wrapper
//!
//! A single JSON value with soft, logged type coercion. The wrapper owns its
//! value outright; arrays and objects handed out by the accessors are
//! independent copies.

use serde_json::{Map, Number, Value};
use log::error;

use super::object::JsonObject;

/// Type tag reported by `JsonValue::get_type`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JsonType {
    /// Wrapper holds no value at all
    None,
    Null,
    String,
    Number,
    Boolean,
    Array,
    Object,
}

impl JsonType {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::String(_) => Self::String,
            Value::Number(_) => Self::Number,
            Value::Bool(_) => Self::Boolean,
            Value::Array(_) => Self::Array,
            Value::Object(_) => Self::Object,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Null => "Null",
            Self::String => "String",
            Self::Number => "Number",
            Self::Boolean => "Boolean",
            Self::Array => "Array",
            Self::Object => "Object",
        }
    }
}

/// Wrapper around one JSON value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JsonValue {
    value: Option<Value>,
}

impl JsonValue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn null() -> Self {
        Self { value: Some(Value::Null) }
    }

    pub fn from_number(number: f64) -> Self {
        Self { value: Some(number_value(number)) }
    }

    pub fn from_string(text: impl Into<String>) -> Self {
        Self { value: Some(Value::String(text.into())) }
    }

    pub fn from_bool(flag: bool) -> Self {
        Self { value: Some(Value::Bool(flag)) }
    }

    /// Build an array value. Elements holding no value are skipped.
    pub fn from_array(values: Vec<JsonValue>) -> Self {
        Self {
            value: Some(Value::Array(values.into_iter().filter_map(|v| v.value).collect())),
        }
    }

    pub fn from_object(object: JsonObject) -> Self {
        Self { value: Some(Value::Object(object.into_root_object())) }
    }

    /// Drop the held value; the wrapper reports type `None` afterwards
    pub fn reset(&mut self) {
        self.value = None;
    }

    pub fn get_root_value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    pub fn set_root_value(&mut self, value: Value) {
        self.value = Some(value);
    }

    pub fn into_root_value(self) -> Option<Value> {
        self.value
    }

    pub fn get_type(&self) -> JsonType {
        self.value.as_ref().map_or(JsonType::None, JsonType::of)
    }

    pub fn get_type_string(&self) -> &'static str {
        self.get_type().as_str()
    }

    /// True for JSON null and for an empty wrapper
    pub fn is_null(&self) -> bool {
        matches!(self.value, None | Some(Value::Null))
    }

    pub fn as_number(&self) -> f64 {
        match &self.value {
            Some(Value::Number(n)) => n.as_f64().unwrap_or_default(),
            other => {
                self.error_message("Number");
                other.as_ref().and_then(coerce_number).unwrap_or_default()
            }
        }
    }

    pub fn as_int32(&self) -> i32 {
        self.as_number() as i32
    }

    pub fn as_int64(&self) -> i64 {
        match &self.value {
            Some(Value::Number(n)) => n.as_i64().unwrap_or_else(|| n.as_f64().unwrap_or_default() as i64),
            _ => self.as_number() as i64,
        }
    }

    pub fn as_string(&self) -> String {
        match &self.value {
            Some(Value::String(s)) => s.clone(),
            other => {
                self.error_message("String");
                other.as_ref().and_then(coerce_string).unwrap_or_default()
            }
        }
    }

    pub fn as_bool(&self) -> bool {
        match &self.value {
            Some(Value::Bool(b)) => *b,
            other => {
                self.error_message("Boolean");
                other.as_ref().and_then(coerce_bool).unwrap_or_default()
            }
        }
    }

    pub fn as_array(&self) -> Vec<JsonValue> {
        match &self.value {
            Some(Value::Array(values)) => values.iter().cloned().map(JsonValue::from).collect(),
            _ => {
                self.error_message("Array");
                Vec::new()
            }
        }
    }

    pub fn as_object(&self) -> JsonObject {
        match &self.value {
            Some(Value::Object(map)) => JsonObject::from(map.clone()),
            _ => {
                self.error_message("Object");
                JsonObject::new()
            }
        }
    }

    fn error_message(&self, requested: &str) {
        error!("Json Value of type '{}' used as a '{}'.", self.get_type_string(), requested);
    }
}

impl From<Value> for JsonValue {
    fn from(value: Value) -> Self {
        Self { value: Some(value) }
    }
}

impl From<JsonObject> for JsonValue {
    fn from(object: JsonObject) -> Self {
        Self::from_object(object)
    }
}

impl From<String> for JsonValue {
    fn from(text: String) -> Self {
        Self::from_string(text)
    }
}

impl From<&str> for JsonValue {
    fn from(text: &str) -> Self {
        Self::from_string(text)
    }
}

impl From<bool> for JsonValue {
    fn from(flag: bool) -> Self {
        Self::from_bool(flag)
    }
}

impl From<f64> for JsonValue {
    fn from(number: f64) -> Self {
        Self::from_number(number)
    }
}

impl From<f32> for JsonValue {
    fn from(number: f32) -> Self {
        Self::from_number(number as f64)
    }
}

macro_rules! integer_into_json_value {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for JsonValue {
                fn from(number: $ty) -> Self {
                    Self { value: Some(Value::from(number)) }
                }
            }
        )*
    };
}

integer_into_json_value!(u8, i32, u32, i64, u64);

/// Number value for a float, falling back to null for NaN and infinities
/// which JSON cannot represent.
pub(crate) fn number_value(number: f64) -> Value {
    Number::from_f64(number).map_or(Value::Null, Value::Number)
}

// Best-effort coercions. None means the value has no sensible reading as
// the requested type.

pub(crate) fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

pub(crate) fn coerce_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub(crate) fn coerce_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => Some(n.as_f64().is_some_and(|f| f != 0.0)),
        Value::String(s) => {
            let s = s.trim();
            if ["true", "yes", "on"].iter().any(|t| s.eq_ignore_ascii_case(t)) {
                Some(true)
            } else {
                Some(s.parse::<f64>().is_ok_and(|f| f != 0.0))
            }
        }
        _ => None,
    }
}

pub(crate) fn coerce_object(value: &Value) -> Option<Map<String, Value>> {
    match value {
        Value::Object(map) => Some(map.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_wrapper() {
        let value = JsonValue::new();
        assert_eq!(value.get_type(), JsonType::None);
        assert_eq!(value.get_type_string(), "None");
        assert!(value.is_null());
        assert_eq!(value.as_number(), 0.0);
        assert_eq!(value.as_string(), "");
        assert!(!value.as_bool());
        assert!(value.as_array().is_empty());
        assert!(value.as_object().get_field_names().is_empty());
    }

    #[test]
    fn test_matching_accessors() {
        assert_eq!(JsonValue::from_number(2.5).as_number(), 2.5);
        assert_eq!(JsonValue::from(42i64).as_int64(), 42);
        assert_eq!(JsonValue::from(7i32).as_int32(), 7);
        assert_eq!(JsonValue::from_string("hi").as_string(), "hi");
        assert!(JsonValue::from_bool(true).as_bool());
        assert_eq!(JsonValue::from(json!([1, "a"])).as_array().len(), 2);
        assert_eq!(
            JsonValue::from(json!({"a": 1})).as_object().get_integer_field("a"),
            1
        );
    }

    #[test]
    fn test_soft_coercions() {
        assert_eq!(JsonValue::from_string("3.5").as_number(), 3.5);
        assert_eq!(JsonValue::from_string("abc").as_number(), 0.0);
        assert_eq!(JsonValue::from_bool(true).as_number(), 1.0);
        assert_eq!(JsonValue::from(12i32).as_string(), "12");
        assert_eq!(JsonValue::from_bool(false).as_string(), "false");
        assert_eq!(JsonValue::null().as_string(), "");
        assert!(JsonValue::from(3i32).as_bool());
        assert!(JsonValue::from_string("Yes").as_bool());
        assert!(!JsonValue::from_string("nope").as_bool());
        assert!(JsonValue::from_number(1.0).as_array().is_empty());
    }

    #[test]
    fn test_large_int64_keeps_precision() {
        let big = 9_007_199_254_740_993i64;
        assert_eq!(JsonValue::from(big).as_int64(), big);
    }

    #[test]
    fn test_non_finite_numbers_become_null() {
        assert_eq!(JsonValue::from_number(f64::NAN).get_type(), JsonType::Null);
    }

    #[test]
    fn test_from_array_skips_empty_wrappers() {
        let array = JsonValue::from_array(vec![
            JsonValue::from(1i32),
            JsonValue::new(),
            JsonValue::null(),
        ]);
        assert_eq!(array.get_root_value(), Some(&json!([1, null])));
    }

    #[test]
    fn test_reset() {
        let mut value = JsonValue::from_string("x");
        value.reset();
        assert_eq!(value.get_type(), JsonType::None);
    }
}

//! # JSON Object Wrapper
//!
//! Typed field access over a JSON object. Reads never fail: a missing or
//! mistyped field logs a warning and yields the zero value for the requested
//! type. Writes with an empty field name are ignored.
//!
//! Field order is preserved, so an object encodes with its fields in the
//! order they were first set.

use std::path::Path;

use log::{debug, error, warn};
use serde_json::{Map, Value};

use worldsbase_shared::WorldsbaseResult;

use super::reader::JsonStreamReader;
use super::value::{
    coerce_bool, coerce_number, coerce_object, coerce_string, number_value, JsonType, JsonValue,
};

/// Element type that can be read out of a JSON array field
pub trait FromJsonElement: Sized {
    /// Name used in mismatch diagnostics
    const TYPE_NAME: &'static str;

    /// Whether the element already holds this type
    fn matches(value: &Value) -> bool;

    /// Best-effort conversion; yields the zero value when no reading exists
    fn coerce(value: &Value) -> Self;
}

impl FromJsonElement for f64 {
    const TYPE_NAME: &'static str = "number";

    fn matches(value: &Value) -> bool {
        value.is_number()
    }

    fn coerce(value: &Value) -> Self {
        coerce_number(value).unwrap_or_default()
    }
}

impl FromJsonElement for f32 {
    const TYPE_NAME: &'static str = "number";

    fn matches(value: &Value) -> bool {
        value.is_number()
    }

    fn coerce(value: &Value) -> Self {
        coerce_number(value).unwrap_or_default() as f32
    }
}

impl FromJsonElement for i32 {
    const TYPE_NAME: &'static str = "number";

    fn matches(value: &Value) -> bool {
        value.is_number()
    }

    fn coerce(value: &Value) -> Self {
        coerce_number(value).unwrap_or_default() as i32
    }
}

impl FromJsonElement for i64 {
    const TYPE_NAME: &'static str = "number";

    fn matches(value: &Value) -> bool {
        value.is_number()
    }

    fn coerce(value: &Value) -> Self {
        value
            .as_i64()
            .unwrap_or_else(|| coerce_number(value).unwrap_or_default() as i64)
    }
}

impl FromJsonElement for String {
    const TYPE_NAME: &'static str = "string";

    fn matches(value: &Value) -> bool {
        value.is_string()
    }

    fn coerce(value: &Value) -> Self {
        coerce_string(value).unwrap_or_default()
    }
}

impl FromJsonElement for bool {
    const TYPE_NAME: &'static str = "boolean";

    fn matches(value: &Value) -> bool {
        value.is_boolean()
    }

    fn coerce(value: &Value) -> Self {
        coerce_bool(value).unwrap_or_default()
    }
}

impl FromJsonElement for JsonObject {
    const TYPE_NAME: &'static str = "object";

    fn matches(value: &Value) -> bool {
        value.is_object()
    }

    fn coerce(value: &Value) -> Self {
        coerce_object(value).map(JsonObject::from).unwrap_or_default()
    }
}

impl FromJsonElement for JsonValue {
    const TYPE_NAME: &'static str = "value";

    fn matches(_value: &Value) -> bool {
        true
    }

    fn coerce(value: &Value) -> Self {
        JsonValue::from(value.clone())
    }
}

/// Coerce every element of `values`, counting the ones that did not
/// already hold the requested type. One error line is logged per mismatch.
pub(crate) fn coerce_array<T: FromJsonElement>(values: &[Value], field_name: &str) -> (Vec<T>, usize) {
    let mut mismatches = 0;
    let coerced = values
        .iter()
        .map(|value| {
            if !T::matches(value) {
                mismatches += 1;
                error!(
                    "Not {} element in array with field name {}",
                    T::TYPE_NAME,
                    field_name
                );
            }
            T::coerce(value)
        })
        .collect();
    (coerced, mismatches)
}

/// Wrapper around one JSON object
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JsonObject {
    root: Map<String, Value>,
}

impl From<Map<String, Value>> for JsonObject {
    fn from(root: Map<String, Value>) -> Self {
        Self { root }
    }
}

impl JsonObject {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear every field
    pub fn reset(&mut self) {
        self.root = Map::new();
    }

    pub fn get_root_object(&self) -> &Map<String, Value> {
        &self.root
    }

    pub fn set_root_object(&mut self, root: Map<String, Value>) {
        self.root = root;
    }

    pub fn into_root_object(self) -> Map<String, Value> {
        self.root
    }

    //////////////////////////////////////////////////////////////////////////
    // Serialization

    /// Pretty-printed JSON text
    pub fn encode_json(&self) -> String {
        serde_json::to_string_pretty(&self.root).unwrap_or_else(|e| {
            error!("Failed to encode JSON object: {}", e);
            String::new()
        })
    }

    /// Condensed single-line JSON text
    pub fn encode_json_to_single_string(&self) -> String {
        serde_json::to_string(&self.root).unwrap_or_else(|e| {
            error!("Failed to encode JSON object: {}", e);
            String::new()
        })
    }

    /// Replace the contents with the object parsed from `text`.
    ///
    /// On failure the object is left empty, never partially filled.
    pub fn decode_json(&mut self, text: &str) -> bool {
        match serde_json::from_str::<Map<String, Value>>(text) {
            Ok(root) => {
                self.root = root;
                true
            }
            Err(e) => {
                self.reset();
                error!("Json decoding failed for {} ({})", excerpt(text), e);
                false
            }
        }
    }

    /// Decode by pushing `text` through the incremental reader one char at a
    /// time. Gives the same result as `decode_json`.
    pub fn decode_stream<I>(&mut self, chars: I) -> bool
    where
        I: IntoIterator<Item = char>,
    {
        let mut reader = JsonStreamReader::new();
        for c in chars {
            reader.push(c);
        }
        reader.end_of_input();

        match reader.take_value() {
            Some(Value::Object(root)) => {
                self.root = root;
                true
            }
            _ => {
                self.reset();
                error!("Json stream decoding failed");
                false
            }
        }
    }

    /// Decode the first top-level object in a UTF-8 byte buffer.
    ///
    /// Returns the number of bytes consumed through the end of that object,
    /// or 0 after resetting when the buffer does not start with a complete
    /// object. Bytes after the object are not inspected.
    pub fn decode_from_utf8_bytes(&mut self, bytes: &[u8]) -> usize {
        let text = match std::str::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => {
                self.reset();
                error!("Response is not valid UTF-8: {}", e);
                return 0;
            }
        };

        let mut reader = JsonStreamReader::new();
        for c in text.chars() {
            if reader.push(c).is_finished() {
                break;
            }
        }
        reader.end_of_input();

        let consumed = reader.consumed_bytes();
        match reader.take_value() {
            Some(Value::Object(root)) => {
                self.root = root;
                consumed
            }
            _ => {
                self.reset();
                0
            }
        }
    }

    //////////////////////////////////////////////////////////////////////////
    // FJsonObject API

    pub fn get_field_names(&self) -> Vec<String> {
        self.root.keys().cloned().collect()
    }

    pub fn has_field(&self, field_name: &str) -> bool {
        if field_name.is_empty() {
            return false;
        }
        self.root.contains_key(field_name)
    }

    pub fn remove_field(&mut self, field_name: &str) {
        if field_name.is_empty() {
            return;
        }
        self.root.remove(field_name);
    }

    pub fn get_field_type(&self, field_name: &str) -> JsonType {
        self.root.get(field_name).map_or(JsonType::None, JsonType::of)
    }

    /// Copy of the field's value, or an empty wrapper when absent
    pub fn get_field(&self, field_name: &str) -> JsonValue {
        match self.root.get(field_name) {
            Some(value) => JsonValue::from(value.clone()),
            None => {
                warn!("Field {} was not found", field_name);
                JsonValue::new()
            }
        }
    }

    /// Set a field from a value wrapper. Empty wrappers are not stored.
    pub fn set_field(&mut self, field_name: &str, value: impl Into<JsonValue>) {
        if field_name.is_empty() {
            return;
        }
        match value.into().into_root_value() {
            Some(value) => {
                self.root.insert(field_name.to_string(), value);
            }
            None => warn!("Refusing to set field {} from an empty value", field_name),
        }
    }

    pub fn get_number_field(&self, field_name: &str) -> f64 {
        self.typed_field(field_name, "Number", Value::is_number)
            .and_then(coerce_number)
            .unwrap_or_default()
    }

    pub fn set_number_field(&mut self, field_name: &str, number: f64) {
        self.insert(field_name, number_value(number));
    }

    pub fn get_integer_field(&self, field_name: &str) -> i32 {
        self.get_number_field(field_name) as i32
    }

    pub fn set_integer_field(&mut self, field_name: &str, number: i32) {
        self.insert(field_name, Value::from(number));
    }

    pub fn get_int64_field(&self, field_name: &str) -> i64 {
        self.typed_field(field_name, "Number", Value::is_number)
            .map(i64::coerce)
            .unwrap_or_default()
    }

    pub fn set_int64_field(&mut self, field_name: &str, number: i64) {
        self.insert(field_name, Value::from(number));
    }

    pub fn get_string_field(&self, field_name: &str) -> String {
        self.typed_field(field_name, "String", Value::is_string)
            .and_then(coerce_string)
            .unwrap_or_default()
    }

    pub fn set_string_field(&mut self, field_name: &str, text: &str) {
        self.insert(field_name, Value::String(text.to_string()));
    }

    pub fn get_bool_field(&self, field_name: &str) -> bool {
        self.typed_field(field_name, "Boolean", Value::is_boolean)
            .and_then(coerce_bool)
            .unwrap_or_default()
    }

    pub fn set_bool_field(&mut self, field_name: &str, flag: bool) {
        self.insert(field_name, Value::Bool(flag));
    }

    /// Copy of a nested object, or an empty object when absent or mistyped
    pub fn get_object_field(&self, field_name: &str) -> JsonObject {
        self.typed_field(field_name, "Object", Value::is_object)
            .and_then(coerce_object)
            .map(JsonObject::from)
            .unwrap_or_default()
    }

    pub fn set_object_field(&mut self, field_name: &str, object: &JsonObject) {
        self.insert(field_name, Value::Object(object.root.clone()));
    }

    /// Array field as value wrappers
    pub fn get_array_field_values(&self, field_name: &str) -> Vec<JsonValue> {
        self.get_array_field::<JsonValue>(field_name)
    }

    /// Set an array field from value wrappers. Empty wrappers are skipped.
    pub fn set_array_field(&mut self, field_name: &str, values: Vec<JsonValue>) {
        if field_name.is_empty() {
            return;
        }
        if let Some(array) = JsonValue::from_array(values).into_root_value() {
            self.root.insert(field_name.to_string(), array);
        }
    }

    /// Read an array field, coercing each element to `T`.
    ///
    /// The result has one entry per source element. An element holding a
    /// different type is logged and converted with its own coercion.
    pub fn get_array_field<T: FromJsonElement>(&self, field_name: &str) -> Vec<T> {
        match self.typed_field(field_name, "Array", Value::is_array) {
            Some(Value::Array(values)) => coerce_array(values, field_name).0,
            _ => Vec::new(),
        }
    }

    pub fn get_number_array_field(&self, field_name: &str) -> Vec<f64> {
        self.get_array_field(field_name)
    }

    pub fn get_integer_array_field(&self, field_name: &str) -> Vec<i32> {
        self.get_array_field(field_name)
    }

    pub fn get_string_array_field(&self, field_name: &str) -> Vec<String> {
        self.get_array_field(field_name)
    }

    pub fn get_bool_array_field(&self, field_name: &str) -> Vec<bool> {
        self.get_array_field(field_name)
    }

    pub fn get_object_array_field(&self, field_name: &str) -> Vec<JsonObject> {
        self.get_array_field(field_name)
    }

    pub fn set_number_array_field(&mut self, field_name: &str, numbers: &[f64]) {
        self.insert(
            field_name,
            Value::Array(numbers.iter().copied().map(number_value).collect()),
        );
    }

    pub fn set_integer_array_field(&mut self, field_name: &str, numbers: &[i32]) {
        self.insert(
            field_name,
            Value::Array(numbers.iter().copied().map(Value::from).collect()),
        );
    }

    pub fn set_string_array_field<S: AsRef<str>>(&mut self, field_name: &str, strings: &[S]) {
        self.insert(
            field_name,
            Value::Array(
                strings
                    .iter()
                    .map(|s| Value::String(s.as_ref().to_string()))
                    .collect(),
            ),
        );
    }

    pub fn set_bool_array_field(&mut self, field_name: &str, flags: &[bool]) {
        self.insert(
            field_name,
            Value::Array(flags.iter().copied().map(Value::Bool).collect()),
        );
    }

    pub fn set_object_array_field(&mut self, field_name: &str, objects: &[JsonObject]) {
        self.insert(
            field_name,
            Value::Array(
                objects
                    .iter()
                    .map(|object| Value::Object(object.root.clone()))
                    .collect(),
            ),
        );
    }

    /// Set one field per map entry
    pub fn set_map_fields<I, K, V>(&mut self, fields: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<JsonValue>,
    {
        for (key, value) in fields {
            self.set_field(key.as_ref(), value);
        }
    }

    /// Copy fields from `other`. Existing fields are replaced only when
    /// `overwrite` is set.
    pub fn merge_json_object(&mut self, other: &JsonObject, overwrite: bool) {
        for (key, value) in &other.root {
            if !overwrite && self.root.contains_key(key) {
                continue;
            }
            self.root.insert(key.clone(), value.clone());
        }
    }

    //////////////////////////////////////////////////////////////////////////
    // File I/O

    /// Load and decode a JSON file, honouring a UTF-8 or UTF-16 byte-order
    /// mark. Returns whether the contents decoded as an object.
    pub fn load_from_file(&mut self, path: impl AsRef<Path>) -> WorldsbaseResult<bool> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let text = decode_text(&bytes);
        debug!("Loaded {} bytes from {}", bytes.len(), path.display());
        Ok(self.decode_json(&text))
    }

    /// Write the pretty-printed object as UTF-8
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> WorldsbaseResult<()> {
        std::fs::write(path, self.encode_json())?;
        Ok(())
    }

    fn insert(&mut self, field_name: &str, value: Value) {
        if field_name.is_empty() {
            return;
        }
        self.root.insert(field_name.to_string(), value);
    }

    fn typed_field(&self, field_name: &str, type_name: &str, is_type: fn(&Value) -> bool) -> Option<&Value> {
        match self.root.get(field_name) {
            Some(value) if is_type(value) => Some(value),
            Some(value) => {
                warn!(
                    "Field {} is of type {}, expected {}",
                    field_name,
                    JsonType::of(value).as_str(),
                    type_name
                );
                None
            }
            None => {
                warn!("No field with name {} of type {}", field_name, type_name);
                None
            }
        }
    }
}

/// Decode file contents according to its byte-order mark
fn decode_text(bytes: &[u8]) -> String {
    match bytes {
        [0xFF, 0xFE, rest @ ..] => utf16_to_string(rest, u16::from_le_bytes),
        [0xFE, 0xFF, rest @ ..] => utf16_to_string(rest, u16::from_be_bytes),
        [0xEF, 0xBB, 0xBF, rest @ ..] => String::from_utf8_lossy(rest).into_owned(),
        _ => String::from_utf8_lossy(bytes).into_owned(),
    }
}

fn utf16_to_string(bytes: &[u8], to_unit: fn([u8; 2]) -> u16) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| to_unit([pair[0], pair[1]]))
        .collect();
    String::from_utf16_lossy(&units)
}

/// Length and a short prefix of `text`, for failure logs
fn excerpt(text: &str) -> String {
    const PREFIX_CHARS: usize = 32;

    let count = text.chars().count();
    let prefix: String = text.chars().take(PREFIX_CHARS).collect();
    if count > PREFIX_CHARS {
        format!("{} chars: '{}...'", count, prefix)
    } else {
        format!("{} chars: '{}'", count, prefix)
    }
}

//! # Scripting Bridge
//!
//! Name-based entry points for loosely typed hosts (script VMs, editor
//! tooling, RPC shims). Calls arrive as a method name plus JSON arguments
//! and are routed onto the typed `JsonObject` and `RequestJson` APIs.
//!
//! Numbers cross this boundary as single-precision floats, matching what
//! script hosts store. The typed API underneath keeps `f64`.

use log::debug;
use serde_json::{Map, Value};

use worldsbase_shared::{RequestContentType, RequestVerb, WorldsbaseError, WorldsbaseResult};

use crate::json::object::FromJsonElement;
use crate::json::value::number_value;
use crate::json::JsonObject;
use crate::request::RequestJson;

/// Dispatches script calls onto documents and requests
pub struct ScriptBridge;

impl ScriptBridge {
    /// Call a `JsonObject` method by name.
    ///
    /// Getters return their value, setters and mutators return `null`.
    pub fn call_object(object: &mut JsonObject, method: &str, args: &[Value]) -> WorldsbaseResult<Value> {
        debug!("Bridge call JsonObject::{}", method);
        let result = match method {
            "Reset" => {
                object.reset();
                Value::Null
            }
            "EncodeJson" => Value::String(object.encode_json()),
            "EncodeJsonToSingleString" => Value::String(object.encode_json_to_single_string()),
            "DecodeJson" => Value::Bool(object.decode_json(arg_str(method, args, 0)?)),
            "GetFieldNames" => Value::Array(object.get_field_names().into_iter().map(Value::String).collect()),
            "HasField" => Value::Bool(object.has_field(arg_str(method, args, 0)?)),
            "RemoveField" => {
                object.remove_field(arg_str(method, args, 0)?);
                Value::Null
            }
            "GetNumberField" => narrow(object.get_number_field(arg_str(method, args, 0)?)),
            "SetNumberField" => {
                let value = widen(arg_f64(method, args, 1)?);
                object.set_number_field(arg_str(method, args, 0)?, value);
                Value::Null
            }
            "GetIntegerField" => Value::from(object.get_integer_field(arg_str(method, args, 0)?)),
            "SetIntegerField" => {
                let value = arg_f64(method, args, 1)? as i32;
                object.set_integer_field(arg_str(method, args, 0)?, value);
                Value::Null
            }
            "GetStringField" => Value::String(object.get_string_field(arg_str(method, args, 0)?)),
            "SetStringField" => {
                let value = arg_str(method, args, 1)?.to_string();
                object.set_string_field(arg_str(method, args, 0)?, &value);
                Value::Null
            }
            "GetBoolField" => Value::Bool(object.get_bool_field(arg_str(method, args, 0)?)),
            "SetBoolField" => {
                let value = arg_bool(method, args, 1)?;
                object.set_bool_field(arg_str(method, args, 0)?, value);
                Value::Null
            }
            "GetObjectField" => Value::Object(object.get_object_field(arg_str(method, args, 0)?).into_root_object()),
            "SetObjectField" => {
                let value = JsonObject::from(arg_object(method, args, 1)?.clone());
                object.set_object_field(arg_str(method, args, 0)?, &value);
                Value::Null
            }
            "GetNumberArrayField" => Value::Array(
                object
                    .get_number_array_field(arg_str(method, args, 0)?)
                    .into_iter()
                    .map(narrow)
                    .collect(),
            ),
            "SetNumberArrayField" => {
                let values: Vec<f64> = arg_array::<f32>(method, args, 1)?
                    .into_iter()
                    .map(|n| n as f64)
                    .collect();
                object.set_number_array_field(arg_str(method, args, 0)?, &values);
                Value::Null
            }
            "GetStringArrayField" => Value::Array(
                object
                    .get_string_array_field(arg_str(method, args, 0)?)
                    .into_iter()
                    .map(Value::String)
                    .collect(),
            ),
            "SetStringArrayField" => {
                let values = arg_array::<String>(method, args, 1)?;
                object.set_string_array_field(arg_str(method, args, 0)?, &values);
                Value::Null
            }
            "GetBoolArrayField" => Value::Array(
                object
                    .get_bool_array_field(arg_str(method, args, 0)?)
                    .into_iter()
                    .map(Value::Bool)
                    .collect(),
            ),
            "SetBoolArrayField" => {
                let values = arg_array::<bool>(method, args, 1)?;
                object.set_bool_array_field(arg_str(method, args, 0)?, &values);
                Value::Null
            }
            "MergeJsonObject" => {
                let other = JsonObject::from(arg_object(method, args, 0)?.clone());
                object.merge_json_object(&other, arg_bool(method, args, 1)?);
                Value::Null
            }
            _ => return Err(WorldsbaseError::bridge(method, "unknown JsonObject method")),
        };
        Ok(result)
    }

    /// Call a `RequestJson` method by name
    pub fn call_request(request: &RequestJson, method: &str, args: &[Value]) -> WorldsbaseResult<Value> {
        debug!("Bridge call RequestJson::{}", method);
        let result = match method {
            "SetVerb" => {
                request.set_verb(parse_verb(method, arg_str(method, args, 0)?)?);
                Value::Null
            }
            "SetCustomVerb" => {
                request.set_custom_verb(arg_str(method, args, 0)?);
                Value::Null
            }
            "SetContentType" => {
                request.set_content_type(parse_content_type(method, arg_str(method, args, 0)?)?);
                Value::Null
            }
            "SetHeader" => {
                request.set_header(arg_str(method, args, 0)?, arg_str(method, args, 1)?);
                Value::Null
            }
            "SetStringRequestContent" => {
                request.set_string_request_content(arg_str(method, args, 0)?);
                Value::Null
            }
            "SetRequestObject" => {
                request.set_request_object(JsonObject::from(arg_object(method, args, 0)?.clone()));
                Value::Null
            }
            "GetRequestObject" => Value::Object(request.get_request_object().into_root_object()),
            "SetURL" => {
                request.set_url(arg_str(method, args, 0)?);
                Value::Null
            }
            "GetURL" => Value::String(request.get_url()),
            "ProcessURL" => Value::Bool(request.process_url(arg_str(method, args, 0)?)),
            "ExecuteProcessRequest" => Value::Bool(request.execute_process_request()),
            "Cancel" => {
                request.cancel();
                Value::Null
            }
            "ResetData" => {
                request.reset_data();
                Value::Null
            }
            "GetResponseCode" => Value::from(request.get_response_code()),
            "GetResponseObject" => Value::Object(request.get_response_object().into_root_object()),
            "GetResponseContentAsString" => {
                let cache = args.first().and_then(Value::as_bool).unwrap_or(true);
                Value::String(request.get_response_content_as_string(cache))
            }
            "GetResponseHeader" => Value::String(request.get_response_header(arg_str(method, args, 0)?)),
            "IsValidJsonResponse" => Value::Bool(request.is_valid_json_response()),
            "AddTag" => {
                request.add_tag(arg_str(method, args, 0)?);
                Value::Null
            }
            "RemoveTag" => Value::from(request.remove_tag(arg_str(method, args, 0)?)),
            "HasTag" => Value::Bool(request.has_tag(arg_str(method, args, 0)?)),
            _ => return Err(WorldsbaseError::bridge(method, "unknown RequestJson method")),
        };
        Ok(result)
    }

    /// String form of `call_object` for hosts that only pass text:
    /// `args_json` must be a JSON array, the result is JSON text.
    pub fn call_object_json(object: &mut JsonObject, method: &str, args_json: &str) -> WorldsbaseResult<String> {
        let args = parse_args(method, args_json)?;
        let result = Self::call_object(object, method, &args)?;
        Ok(result.to_string())
    }
}

fn parse_args(method: &str, args_json: &str) -> WorldsbaseResult<Vec<Value>> {
    match serde_json::from_str::<Value>(args_json) {
        Ok(Value::Array(args)) => Ok(args),
        Ok(_) => Err(WorldsbaseError::bridge(method, "arguments must be a JSON array")),
        Err(e) => Err(WorldsbaseError::bridge(method, format!("arguments are not JSON: {}", e))),
    }
}

fn parse_verb(method: &str, name: &str) -> WorldsbaseResult<RequestVerb> {
    match name.to_ascii_uppercase().as_str() {
        "GET" => Ok(RequestVerb::Get),
        "POST" => Ok(RequestVerb::Post),
        "PUT" => Ok(RequestVerb::Put),
        "DEL" | "DELETE" => Ok(RequestVerb::Delete),
        "CUSTOM" => Ok(RequestVerb::Custom),
        other => Err(WorldsbaseError::bridge(method, format!("unknown verb '{}'", other))),
    }
}

fn parse_content_type(method: &str, name: &str) -> WorldsbaseResult<RequestContentType> {
    match name {
        "x_www_form_urlencoded_url" | "UrlEncodedUrl" => Ok(RequestContentType::UrlEncodedUrl),
        "x_www_form_urlencoded_body" | "UrlEncodedBody" => Ok(RequestContentType::UrlEncodedBody),
        "json" | "Json" => Ok(RequestContentType::Json),
        "binary" | "Binary" => Ok(RequestContentType::Binary),
        other => Err(WorldsbaseError::bridge(method, format!("unknown content type '{}'", other))),
    }
}

/// Script-side number for a stored double
fn narrow(number: f64) -> Value {
    number_value(number as f32 as f64)
}

/// Stored double for a script-side number
fn widen(number: f64) -> f64 {
    number as f32 as f64
}

fn arg<'a>(method: &str, args: &'a [Value], index: usize) -> WorldsbaseResult<&'a Value> {
    args.get(index)
        .ok_or_else(|| WorldsbaseError::bridge(method, format!("missing argument {}", index)))
}

fn arg_str<'a>(method: &str, args: &'a [Value], index: usize) -> WorldsbaseResult<&'a str> {
    arg(method, args, index)?
        .as_str()
        .ok_or_else(|| WorldsbaseError::bridge(method, format!("argument {} must be a string", index)))
}

fn arg_f64(method: &str, args: &[Value], index: usize) -> WorldsbaseResult<f64> {
    arg(method, args, index)?
        .as_f64()
        .ok_or_else(|| WorldsbaseError::bridge(method, format!("argument {} must be a number", index)))
}

fn arg_bool(method: &str, args: &[Value], index: usize) -> WorldsbaseResult<bool> {
    arg(method, args, index)?
        .as_bool()
        .ok_or_else(|| WorldsbaseError::bridge(method, format!("argument {} must be a boolean", index)))
}

fn arg_object<'a>(method: &str, args: &'a [Value], index: usize) -> WorldsbaseResult<&'a Map<String, Value>> {
    arg(method, args, index)?
        .as_object()
        .ok_or_else(|| WorldsbaseError::bridge(method, format!("argument {} must be an object", index)))
}

/// Array argument whose elements all hold `T` already
fn arg_array<T: FromJsonElement>(method: &str, args: &[Value], index: usize) -> WorldsbaseResult<Vec<T>> {
    let values = arg(method, args, index)?
        .as_array()
        .ok_or_else(|| WorldsbaseError::bridge(method, format!("argument {} must be an array", index)))?;

    values
        .iter()
        .map(|value| {
            if T::matches(value) {
                Ok(T::coerce(value))
            } else {
                Err(WorldsbaseError::bridge(
                    method,
                    format!("argument {} must hold only {} elements", index, T::TYPE_NAME),
                ))
            }
        })
        .collect()
}

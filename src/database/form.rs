use std::collections::HashMap;

use serde_json::Value;

use super::error::{ErrorKind, FieldError};

pub type FormData = HashMap<String, Value>;

pub const REQUIRED: &str = "This field is required.";
pub const INVALID_INTEGER: &str = "A valid integer is required.";
pub const INVALID_STRING: &str = "Not a valid string.";
pub const INVALID_LIST: &str = "Expected a list of items.";

/// Field-by-field access to a JSON request body, so that every failure can
/// name the key it came from.
pub struct Form {
    inner: FormData,
}

impl Form {
    pub fn from_data(data: FormData) -> Self {
        Self { inner: data }
    }

    pub fn from_json(body: &str) -> Result<Self, FieldError> {
        serde_json::from_str::<FormData>(body)
            .map(Self::from_data)
            .map_err(|e| ErrorKind::Validation.on("non_field_errors", &format!("Invalid JSON: {e}")))
    }

    pub fn get_value(&self, key: &str) -> Option<&Value> {
        self.inner.get(key).filter(|value| !value.is_null())
    }

    pub fn get_str(&self, key: &str) -> Result<String, FieldError> {
        match self.get_optional_str(key)? {
            Some(value) if !value.trim().is_empty() => Ok(value),
            _ => Err(ErrorKind::Validation.on(key, REQUIRED)),
        }
    }

    pub fn get_optional_str(&self, key: &str) -> Result<Option<String>, FieldError> {
        match self.get_value(key) {
            Some(value) => value
                .as_str()
                .map(|v| Some(v.to_string()))
                .ok_or_else(|| ErrorKind::Validation.on(key, INVALID_STRING)),
            None => Ok(None),
        }
    }

    pub fn get_integer(&self, key: &str) -> Result<i64, FieldError> {
        match self.get_value(key) {
            Some(value) => as_integer(value).ok_or_else(|| ErrorKind::Validation.on(key, INVALID_INTEGER)),
            None => Err(ErrorKind::Validation.on(key, REQUIRED)),
        }
    }

    pub fn get_list(&self, key: &str) -> Result<&Vec<Value>, FieldError> {
        match self.get_value(key) {
            Some(Value::Array(items)) => Ok(items),
            Some(_) => Err(ErrorKind::Validation.on(key, INVALID_LIST)),
            None => Err(ErrorKind::Validation.on(key, REQUIRED)),
        }
    }
}

/// Integers arrive either as JSON numbers or as numeric strings.
pub fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

use std::fmt::{self, Display};

use potion::Error;
use serde_json::{json, Map, Value};

pub struct QueryError {
    info: String,
}

impl QueryError {
    pub fn new(info: String) -> Self {
        Self { info }
    }
}

impl From<sqlx::Error> for QueryError {
    fn from(value: sqlx::Error) -> Self {
        match value {
            sqlx::Error::Database(e) => Self::new(format!("{e}")),
            sqlx::Error::RowNotFound => Self::new(format!("RowNotFound")),
            sqlx::Error::ColumnNotFound(e) => Self::new(format!("Column not found: {e}")),
            sqlx::Error::ColumnDecode { index, source } => {
                Self::new(format!("Column decode {index} ({source})"))
            }
            sqlx::Error::PoolTimedOut => Self::new(format!("Pool timed out")),
            sqlx::Error::PoolClosed => Self::new(format!("Pool closed")),
            sqlx::Error::Migrate(e) => Self::new(format!("{e}")),
            e => Self::new(format!("{e}")),
        }
    }
}

impl Into<Error> for QueryError {
    fn into(self) -> Error {
        log::error!("Query failed: {}", self.info);
        Error {
            code: 500,
            info: Some(self.info),
            redirect: None,
        }
    }
}

pub struct CacheError {
    info: String,
}

impl From<redis::RedisError> for CacheError {
    fn from(value: redis::RedisError) -> Self {
        Self {
            info: format!("{:?} - {:?}", value.code(), value.detail()),
        }
    }
}

impl Into<Error> for CacheError {
    fn into(self) -> Error {
        Error {
            code: 500,
            info: Some(self.info),
            redirect: None,
        }
    }
}

#[derive(Debug)]
pub struct MediaError {
    info: String,
}

impl MediaError {
    pub fn new(info: String) -> Self {
        Self { info }
    }
}

impl From<std::io::Error> for MediaError {
    fn from(value: std::io::Error) -> Self {
        Self::new(format!("{value}"))
    }
}

impl Into<Error> for MediaError {
    fn into(self) -> Error {
        log::error!("Media storage failed: {}", self.info);
        Error {
            code: 500,
            info: Some(self.info),
            redirect: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Forbidden,
}

impl ErrorKind {
    pub fn on(self, field: &str, info: &str) -> FieldError {
        FieldError {
            kind: self,
            field: field.to_string(),
            info: info.to_string(),
        }
    }
}

/// Error pointing at the offending input field.
///
/// Converted into a `potion::Error` whose `info` is the JSON object
/// `{"<field>": ["<info>"]}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub kind: ErrorKind,
    pub field: String,
    pub info: String,
}

impl FieldError {
    pub fn to_json(&self) -> Value {
        let mut object = Map::new();
        object.insert(self.field.to_owned(), json!([self.info]));
        Value::Object(object)
    }
}

impl Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.info)
    }
}

impl std::error::Error for FieldError {}

impl Into<Error> for FieldError {
    fn into(self) -> Error {
        let info = Some(self.to_json().to_string());
        Error {
            code: match self.kind {
                ErrorKind::Validation | ErrorKind::Conflict => 400,
                ErrorKind::NotFound => 404,
                ErrorKind::Forbidden => 403,
            },
            info,
            redirect: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    Unique,
    ForeignKey,
    Check,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintViolation {
    pub kind: ViolationKind,
    pub constraint: Option<String>,
}

impl ConstraintViolation {
    pub fn from_error(error: &sqlx::Error) -> Option<Self> {
        let sqlx::Error::Database(e) = error else {
            return None;
        };

        let kind = if e.is_unique_violation() {
            ViolationKind::Unique
        } else if e.is_foreign_key_violation() {
            ViolationKind::ForeignKey
        } else if e.is_check_violation() {
            ViolationKind::Check
        } else {
            return None;
        };

        Some(Self {
            kind,
            constraint: e.constraint().map(String::from),
        })
    }
}

/// Maps a failed write to a field error when `handler` recognizes the
/// violated constraint, otherwise to a plain query error.
pub fn map_write_error<F>(error: sqlx::Error, handler: F) -> Error
where
    F: FnOnce(&ConstraintViolation) -> Option<FieldError>,
{
    match ConstraintViolation::from_error(&error).and_then(|v| handler(&v)) {
        Some(field_error) => field_error.into(),
        None => QueryError::from(error).into(),
    }
}

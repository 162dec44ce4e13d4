//! The per-request transport options bag.
//!
//! Options are an open key/value map carried verbatim from the request to the
//! transport. The core never interprets them; the typed readers below exist
//! for transport implementations.

use crate::errors::TransportError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::time::Duration;

/// Total exchange timeout in seconds. `0` disables the timeout.
pub const TIMEOUT: &str = "timeout";
/// Redirect policy: `true`, `false` or `{"max": n}`.
pub const ALLOW_REDIRECTS: &str = "allow_redirects";
/// Proxy URL, or `{"http": url, "https": url}`.
pub const PROXY: &str = "proxy";
/// Headers applied to the outgoing request, overriding request headers.
pub const HEADERS: &str = "headers";
/// Query parameters: an object or a raw query string.
pub const QUERY: &str = "query";
/// Credentials: `[user, pass]` or `[user, pass, "basic"]`.
pub const AUTH: &str = "auth";
/// TLS verification: a bool or a path to a PEM CA bundle.
pub const VERIFY: &str = "verify";
/// Raw request body.
pub const BODY: &str = "body";
/// JSON request body.
pub const JSON: &str = "json";
/// URL-encoded form body.
pub const FORM_PARAMS: &str = "form_params";

/// Number of redirects followed when redirects are enabled without a limit.
pub const DEFAULT_MAX_REDIRECTS: usize = 5;

/// Redirect handling requested by `allow_redirects`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RedirectPolicy {
    /// Never follow redirects; the 3xx reply is the response.
    Disabled,
    /// Follow at most this many redirects.
    Limited(usize),
}

impl Default for RedirectPolicy {
    fn default() -> Self {
        Self::Limited(DEFAULT_MAX_REDIRECTS)
    }
}

/// Proxy routing requested by `proxy`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProxySetting {
    /// Route every scheme through one proxy.
    All(String),
    /// Route schemes through separate proxies.
    PerScheme {
        /// Proxy for plain HTTP.
        http: Option<String>,
        /// Proxy for HTTPS.
        https: Option<String>,
    },
}

/// TLS verification requested by `verify`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TlsVerify {
    /// Verify against the system roots (`true`) or not at all (`false`).
    Enabled(bool),
    /// Verify against an additional PEM bundle.
    CaBundle(PathBuf),
}

/// Query parameters requested by `query`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuerySetting {
    /// A pre-encoded query string.
    Raw(String),
    /// Key/value pairs to encode.
    Pairs(Vec<(String, String)>),
}

/// Credentials requested by `auth`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicAuth {
    /// User name.
    pub username: String,
    /// Password, if any.
    pub password: Option<String>,
}

/// The options bag attached to a request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestOptions {
    values: Map<String, Value>,
}

impl From<Map<String, Value>> for RequestOptions {
    fn from(values: Map<String, Value>) -> Self {
        Self { values }
    }
}

impl RequestOptions {
    /// Creates an empty options bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an options bag from a JSON object.
    ///
    /// Non-object values yield an empty bag.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(values) => Self { values },
            _ => Self::default(),
        }
    }

    /// Sets an option, returning the updated bag.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Sets an option, replacing any previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    /// Removes an option.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    /// Returns the raw value of an option.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Whether an option is set.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Iterates over all options.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    /// Number of options set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no option is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the underlying JSON object.
    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }

    /// Reads `timeout`. `0` means no timeout.
    ///
    /// # Errors
    ///
    /// Returns an `InvalidOptions` transport error for negative,
    /// non-numeric or unrepresentably large values.
    pub fn timeout(&self) -> Result<Option<Duration>, TransportError> {
        match self.get(TIMEOUT) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => match value.as_f64() {
                Some(secs) if secs == 0.0 => Ok(None),
                Some(secs) if secs > 0.0 => Duration::try_from_secs_f64(secs)
                    .map(Some)
                    .map_err(|_| invalid(TIMEOUT, value)),
                _ => Err(invalid(TIMEOUT, value)),
            },
        }
    }

    /// Reads `allow_redirects`.
    ///
    /// # Errors
    ///
    /// Returns an `InvalidOptions` transport error for unsupported shapes.
    pub fn allow_redirects(&self) -> Result<Option<RedirectPolicy>, TransportError> {
        match self.get(ALLOW_REDIRECTS) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Bool(true)) => Ok(Some(RedirectPolicy::default())),
            Some(Value::Bool(false)) => Ok(Some(RedirectPolicy::Disabled)),
            Some(value @ Value::Object(map)) => match map.get("max") {
                None => Ok(Some(RedirectPolicy::default())),
                Some(max) => max
                    .as_u64()
                    .and_then(|n| usize::try_from(n).ok())
                    .map(|n| Some(RedirectPolicy::Limited(n)))
                    .ok_or_else(|| invalid(ALLOW_REDIRECTS, value)),
            },
            Some(value) => Err(invalid(ALLOW_REDIRECTS, value)),
        }
    }

    /// Reads `proxy`.
    ///
    /// # Errors
    ///
    /// Returns an `InvalidOptions` transport error for unsupported shapes.
    pub fn proxy(&self) -> Result<Option<ProxySetting>, TransportError> {
        match self.get(PROXY) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(url)) if !url.is_empty() => Ok(Some(ProxySetting::All(url.clone()))),
            Some(value @ Value::Object(map)) => {
                let scheme = |key: &str| -> Result<Option<String>, TransportError> {
                    match map.get(key) {
                        None | Some(Value::Null) => Ok(None),
                        Some(Value::String(url)) => Ok(Some(url.clone())),
                        Some(_) => Err(invalid(PROXY, value)),
                    }
                };
                Ok(Some(ProxySetting::PerScheme {
                    http: scheme("http")?,
                    https: scheme("https")?,
                }))
            }
            Some(value) => Err(invalid(PROXY, value)),
        }
    }

    /// Reads `headers` as `(name, values)` pairs.
    ///
    /// # Errors
    ///
    /// Returns an `InvalidOptions` transport error if the value is not an
    /// object of strings or string arrays.
    pub fn headers(&self) -> Result<Vec<(String, Vec<String>)>, TransportError> {
        match self.get(HEADERS) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(value @ Value::Object(map)) => map
                .iter()
                .map(|(name, v)| match v {
                    Value::Array(items) => items
                        .iter()
                        .map(scalar_to_string)
                        .collect::<Option<Vec<_>>>()
                        .map(|values| (name.clone(), values))
                        .ok_or_else(|| invalid(HEADERS, value)),
                    other => scalar_to_string(other)
                        .map(|s| (name.clone(), vec![s]))
                        .ok_or_else(|| invalid(HEADERS, value)),
                })
                .collect(),
            Some(value) => Err(invalid(HEADERS, value)),
        }
    }

    /// Reads `query`.
    ///
    /// # Errors
    ///
    /// Returns an `InvalidOptions` transport error for nested objects or
    /// other unsupported shapes.
    pub fn query(&self) -> Result<Option<QuerySetting>, TransportError> {
        match self.get(QUERY) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(raw)) => Ok(Some(QuerySetting::Raw(raw.trim_start_matches('?').to_string()))),
            Some(value @ Value::Object(map)) => {
                pairs_from_map(map).map(|pairs| Some(QuerySetting::Pairs(pairs))).ok_or_else(|| invalid(QUERY, value))
            }
            Some(value) => Err(invalid(QUERY, value)),
        }
    }

    /// Reads `auth`.
    ///
    /// # Errors
    ///
    /// Returns an `InvalidOptions` transport error for schemes other than
    /// basic, or malformed credentials.
    pub fn auth(&self) -> Result<Option<BasicAuth>, TransportError> {
        match self.get(AUTH) {
            None | Some(Value::Null) => Ok(None),
            Some(value @ Value::Array(parts)) => {
                let part = |idx: usize| parts.get(idx).and_then(Value::as_str);
                let username = part(0).ok_or_else(|| invalid(AUTH, value))?;
                let password = part(1).map(str::to_string);
                match parts.get(2) {
                    None => {}
                    Some(Value::String(scheme)) if scheme.eq_ignore_ascii_case("basic") => {}
                    Some(_) => {
                        return Err(TransportError::invalid_options(format!(
                            "unsupported auth scheme in {value}; only basic is available"
                        )))
                    }
                }
                Ok(Some(BasicAuth {
                    username: username.to_string(),
                    password,
                }))
            }
            Some(value) => Err(invalid(AUTH, value)),
        }
    }

    /// Reads `verify`.
    ///
    /// # Errors
    ///
    /// Returns an `InvalidOptions` transport error for unsupported shapes.
    pub fn verify(&self) -> Result<Option<TlsVerify>, TransportError> {
        match self.get(VERIFY) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Bool(enabled)) => Ok(Some(TlsVerify::Enabled(*enabled))),
            Some(Value::String(path)) if !path.is_empty() => Ok(Some(TlsVerify::CaBundle(PathBuf::from(path)))),
            Some(value) => Err(invalid(VERIFY, value)),
        }
    }

    /// Reads `body`.
    ///
    /// # Errors
    ///
    /// Returns an `InvalidOptions` transport error if the body is not a string.
    pub fn body(&self) -> Result<Option<String>, TransportError> {
        match self.get(BODY) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(body)) => Ok(Some(body.clone())),
            Some(value) => Err(invalid(BODY, value)),
        }
    }

    /// Reads `json`.
    #[must_use]
    pub fn json(&self) -> Option<&Value> {
        self.get(JSON).filter(|v| !v.is_null())
    }

    /// Reads `form_params`.
    ///
    /// # Errors
    ///
    /// Returns an `InvalidOptions` transport error for nested objects or
    /// non-object values.
    pub fn form_params(&self) -> Result<Option<Vec<(String, String)>>, TransportError> {
        match self.get(FORM_PARAMS) {
            None | Some(Value::Null) => Ok(None),
            Some(value @ Value::Object(map)) => pairs_from_map(map).map(Some).ok_or_else(|| invalid(FORM_PARAMS, value)),
            Some(value) => Err(invalid(FORM_PARAMS, value)),
        }
    }
}

fn invalid(key: &str, value: &Value) -> TransportError {
    TransportError::invalid_options(format!("unsupported value for option '{key}': {value}"))
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(true) => Some("1".to_string()),
        Value::Bool(false) => Some("0".to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Flattens an object into pairs; arrays repeat the key, nulls are skipped.
fn pairs_from_map(map: &Map<String, Value>) -> Option<Vec<(String, String)>> {
    let mut pairs = Vec::with_capacity(map.len());
    for (key, value) in map {
        match value {
            Value::Null => {}
            Value::Array(items) => {
                for item in items {
                    pairs.push((key.clone(), scalar_to_string(item)?));
                }
            }
            other => pairs.push((key.clone(), scalar_to_string(other)?)),
        }
    }
    Some(pairs)
}

use crate::field::{Encoder, Field, FieldError};
use crate::header::CRLF;
use crate::uri::uri_field;
use tracing::debug;

pub const REQUEST_LINE: &str = "request line";
pub const METHOD: &str = "method";
pub const VERSION: &str = "version";

/// One request method, or several alternatives for the engine to choose from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Single(String),
    Choices(Vec<String>),
}

impl Method {
    /// The alternatives as a list; a single method becomes a one-element list.
    pub fn into_values(self) -> Vec<String> {
        match self {
            Method::Single(method) => vec![method],
            Method::Choices(methods) => methods,
        }
    }
}

impl From<&str> for Method {
    fn from(method: &str) -> Self {
        Method::Single(method.to_string())
    }
}

impl From<Vec<String>> for Method {
    fn from(methods: Vec<String>) -> Self {
        Method::Choices(methods)
    }
}

impl From<&[&str]> for Method {
    fn from(methods: &[&str]) -> Self {
        Method::Choices(methods.iter().map(|m| m.to_string()).collect())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RequestLineOptions {
    pub protocol: String,
    pub version: f64,
    pub fuzzable_method: bool,
    pub fuzzable_uri: bool,
    /// Mutation flag of the whole line; when off, nothing inside it is a target.
    pub fuzzable: bool,
}

impl Default for RequestLineOptions {
    fn default() -> Self {
        Self {
            protocol: "HTTP".to_string(),
            version: 1.0,
            fuzzable_method: false,
            fuzzable_uri: true,
            fuzzable: true,
        }
    }
}

/// Builds `METHOD SP URI SP PROTOCOL/VERSION CRLF`.
///
/// The method is always a group (a single method is a one-element group), the URI
/// is split into path and optional query nodes, and the version is printed with one
/// fractional digit (`1.0`).
pub fn request_line(
    method: Method,
    uri: &str,
    options: &RequestLineOptions,
) -> Result<Field, FieldError> {
    let method = Field::group(METHOD, method.into_values())?.fuzzable(options.fuzzable_method);
    let uri = uri_field(uri)?.fuzzable(options.fuzzable_uri);
    let version = Field::float(VERSION, options.version).with_encoder(Encoder::FixedPointAscii(1))?;

    let fields = vec![
        method,
        Field::fixed(" "),
        uri,
        Field::fixed(" "),
        Field::fixed(options.protocol.as_str()).named("protocol"),
        Field::fixed("/"),
        version,
        Field::fixed(CRLF),
    ];
    debug!(protocol = %options.protocol, version = options.version, "composed request line");
    Ok(Field::container(REQUEST_LINE, fields)?.fuzzable(options.fuzzable))
}

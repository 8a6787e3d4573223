use crate::field::{Field, FieldError};
use crate::header::{
    AUTHORIZATION, BasicCredentials, HeaderOptions, authorization_field, content_length_field,
    custom_header_field, int_field, text_field,
};
use crate::message::{BODY, body_field, http_request};
use crate::request::{Method, RequestLineOptions, request_line};
use crate::template::Template;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum MethodConfig {
    One(String),
    Many(Vec<String>),
}

impl From<MethodConfig> for Method {
    fn from(method: MethodConfig) -> Self {
        match method {
            MethodConfig::One(method) => Method::Single(method),
            MethodConfig::Many(methods) => Method::Choices(methods),
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct RequestLineConfig {
    pub method: MethodConfig,
    pub uri: String,
    #[serde(default = "default_protocol")]
    pub protocol: String,
    #[serde(default = "default_version")]
    pub version: f64,
    #[serde(default)]
    pub fuzzable_method: bool,
    #[serde(default = "default_true")]
    pub fuzzable_uri: bool,
    #[serde(default = "default_true")]
    pub fuzzable: bool,
}

fn default_protocol() -> String {
    "HTTP".to_string()
}

fn default_version() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

fn default_authorization_key() -> String {
    AUTHORIZATION.to_string()
}

fn default_delim() -> String {
    ":".to_string()
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct ParamConfig {
    pub name: String,
    pub value: String,
}

/// Mutation flags of a header, given as a `flags` table on the header entry.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct HeaderFlags {
    #[serde(default = "default_true")]
    pub fuzzable: bool,
    #[serde(default)]
    pub fuzzable_key: bool,
    #[serde(default = "default_true")]
    pub fuzzable_value: bool,
    #[serde(default)]
    pub name: Option<String>,
}

impl Default for HeaderFlags {
    fn default() -> Self {
        Self {
            fuzzable: true,
            fuzzable_key: false,
            fuzzable_value: true,
            name: None,
        }
    }
}

impl HeaderFlags {
    fn options(&self, end: bool) -> HeaderOptions {
        HeaderOptions {
            end,
            fuzzable: self.fuzzable,
            fuzzable_key: self.fuzzable_key,
            fuzzable_value: self.fuzzable_value,
            name: self.name.clone(),
        }
    }
}

/// One header of a message definition, tagged by `kind`.
///
/// The end-of-headers flag is not configurable: the message builder sets it on the
/// last header.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "kebab-case", rename_all_fields = "kebab-case")]
#[serde(deny_unknown_fields)]
pub enum HeaderConfig {
    Text {
        key: String,
        value: String,
        #[serde(default)]
        params: Vec<ParamConfig>,
        #[serde(default)]
        flags: HeaderFlags,
    },
    Int {
        key: String,
        value: i64,
        #[serde(default)]
        bits: Option<u32>,
        #[serde(default)]
        flags: HeaderFlags,
    },
    ContentLength {
        value: i64,
        #[serde(default = "default_body_name")]
        sized_field: String,
        #[serde(default)]
        flags: HeaderFlags,
    },
    Authorization {
        #[serde(default = "default_authorization_key")]
        key: String,
        username: String,
        password: String,
        #[serde(default = "default_delim")]
        delim: String,
        #[serde(default = "default_true")]
        fuzz_username: bool,
        #[serde(default = "default_true")]
        fuzz_password: bool,
        #[serde(default)]
        fuzz_delim: bool,
        #[serde(default)]
        flags: HeaderFlags,
    },
    /// A header whose value is a choice among literal alternatives.
    Custom {
        key: String,
        choices: Vec<String>,
        #[serde(default)]
        params: Vec<ParamConfig>,
        #[serde(default)]
        flags: HeaderFlags,
    },
}

fn default_body_name() -> String {
    BODY.to_string()
}

fn param_pairs(params: &[ParamConfig]) -> Vec<(&str, &str)> {
    params
        .iter()
        .map(|p| (p.name.as_str(), p.value.as_str()))
        .collect()
}

impl HeaderConfig {
    pub fn build(&self, end: bool) -> Result<Field, FieldError> {
        match self {
            HeaderConfig::Text {
                key,
                value,
                params,
                flags,
            } => custom_header_field(
                key,
                Field::string("value", value),
                &param_pairs(params),
                &flags.options(end),
            ),
            HeaderConfig::Int {
                key,
                value,
                bits,
                flags,
            } => int_field(key, i128::from(*value), *bits, &flags.options(end)),
            HeaderConfig::ContentLength {
                value,
                sized_field,
                flags,
            } => content_length_field(i128::from(*value), sized_field, &flags.options(end)),
            HeaderConfig::Authorization {
                key,
                username,
                password,
                delim,
                fuzz_username,
                fuzz_password,
                fuzz_delim,
                flags,
            } => {
                let credentials = BasicCredentials {
                    username: username.clone(),
                    password: password.clone(),
                    delim: delim.clone(),
                    fuzz_username: *fuzz_username,
                    fuzz_password: *fuzz_password,
                    fuzz_delim: *fuzz_delim,
                };
                authorization_field(key, &credentials, &flags.options(end))
            }
            HeaderConfig::Custom {
                key,
                choices,
                params,
                flags,
            } => custom_header_field(
                key,
                Field::group("value", choices.clone())?,
                &param_pairs(params),
                &flags.options(end),
            ),
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct BodyConfig {
    pub value: String,
    #[serde(default = "default_true")]
    pub fuzzable: bool,
}

/// A complete request definition, usually loaded from TOML.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct MessageConfig {
    pub request_line: RequestLineConfig,
    #[serde(default)]
    pub headers: Vec<HeaderConfig>,
    #[serde(default)]
    pub body: Option<BodyConfig>,
}

impl MessageConfig {
    pub fn load_from_file(path: &PathBuf) -> Result<Self, anyhow::Error> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read template file at {:?}: {}", path, e))?;

        let config: MessageConfig = toml::from_str(&content).map_err(|e| {
            anyhow::anyhow!("Failed to parse TOML from template file {:?}: {}", path, e)
        })?;

        Ok(config)
    }

    /// Composes the configured message and validates it as a template.
    pub fn build(&self) -> Result<Template, FieldError> {
        let line = &self.request_line;
        let options = RequestLineOptions {
            protocol: line.protocol.clone(),
            version: line.version,
            fuzzable_method: line.fuzzable_method,
            fuzzable_uri: line.fuzzable_uri,
            fuzzable: line.fuzzable,
        };
        let request = request_line(line.method.clone().into(), &line.uri, &options)?;

        let last = self.headers.len().checked_sub(1);
        let headers = self
            .headers
            .iter()
            .enumerate()
            .map(|(index, header)| header.build(Some(index) == last))
            .collect::<Result<Vec<_>, _>>()?;

        let body = self
            .body
            .as_ref()
            .map(|body| body_field(&body.value).fuzzable(body.fuzzable));
        http_request(request, headers, body)
    }
}

impl Default for MessageConfig {
    fn default() -> Self {
        let flags = HeaderFlags::default();
        Self {
            request_line: RequestLineConfig {
                method: MethodConfig::Many(vec!["POST".to_string(), "PUT".to_string()]),
                uri: "/submit?debug=1".to_string(),
                protocol: default_protocol(),
                version: 1.1,
                fuzzable_method: false,
                fuzzable_uri: true,
                fuzzable: true,
            },
            headers: vec![
                HeaderConfig::Text {
                    key: "Host".to_string(),
                    value: "localhost".to_string(),
                    params: Vec::new(),
                    flags: flags.clone(),
                },
                HeaderConfig::Text {
                    key: "Content-Type".to_string(),
                    value: "text/plain".to_string(),
                    params: vec![ParamConfig {
                        name: "charset".to_string(),
                        value: "utf-8".to_string(),
                    }],
                    flags: flags.clone(),
                },
                HeaderConfig::Authorization {
                    key: default_authorization_key(),
                    username: "admin".to_string(),
                    password: "admin".to_string(),
                    delim: default_delim(),
                    fuzz_username: true,
                    fuzz_password: true,
                    fuzz_delim: false,
                    flags: flags.clone(),
                },
                HeaderConfig::ContentLength {
                    value: 11,
                    sized_field: default_body_name(),
                    flags,
                },
            ],
            body: Some(BodyConfig {
                value: "hello world".to_string(),
                fuzzable: true,
            }),
        }
    }
}

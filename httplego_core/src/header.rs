//! Composers for `key: value[; param="val"]*\r\n` header lines.

use crate::bits::infer_bits;
use crate::field::{Encoder, Field, FieldError};
use std::collections::HashSet;
use tracing::debug;

pub const CRLF: &str = "\r\n";
/// Name of the blank line closing the header block.
pub const END_OF_HEADERS: &str = "end of headers";
pub const CONTENT_LENGTH: &str = "Content-Length";
pub const AUTHORIZATION: &str = "Authorization";
/// Integer header values never use fewer bits than this unless a width is given.
pub const DEFAULT_INT_FIELD_BITS: u32 = 32;

/// Options shared by every header composer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderOptions {
    /// Append the blank line that ends the header block.
    pub end: bool,
    /// Flag on the whole header container. When off, nothing inside the header is
    /// a mutation target, whatever the key and value flags say.
    pub fuzzable: bool,
    /// Let the engine mutate the key. Off by default: a broken key rarely reaches
    /// the code that parses the value.
    pub fuzzable_key: bool,
    pub fuzzable_value: bool,
    /// Container name; defaults to the key. Needed when a key repeats in one message.
    pub name: Option<String>,
}

impl Default for HeaderOptions {
    fn default() -> Self {
        Self {
            end: false,
            fuzzable: true,
            fuzzable_key: false,
            fuzzable_value: true,
            name: None,
        }
    }
}

impl HeaderOptions {
    pub fn ending(mut self, end: bool) -> Self {
        self.end = end;
        self
    }
}

/// Builds a header line around an arbitrary value node.
///
/// `value` is wrapped in a `"{key} value"` container so a single leaf and a whole
/// sub-tree are handled the same way. Each `(name, value)` in `params` adds
/// `; name="value"` with two mutable text nodes named after the value container and
/// the parameter name; a repeated parameter name is rejected.
pub fn custom_header_field(
    key: &str,
    value: Field,
    params: &[(&str, &str)],
    options: &HeaderOptions,
) -> Result<Field, FieldError> {
    let header_name = options.name.clone().unwrap_or_else(|| key.to_string());
    let key_name = format!("{key} key");
    let key_field = if options.fuzzable_key {
        Field::string(key_name, key)
    } else {
        Field::fixed(key).named(key_name)
    };
    let value_name = format!("{key} value");
    let value_field = Field::container(&value_name, vec![value])?.fuzzable(options.fuzzable_value);

    let mut fields = vec![key_field, Field::fixed(": "), value_field];
    let mut seen = HashSet::new();
    for (param, param_value) in params {
        if !seen.insert(*param) {
            return Err(FieldError::DuplicateParam {
                header: header_name,
                param: param.to_string(),
            });
        }
        fields.push(Field::fixed("; "));
        fields.push(Field::string(format!("{value_name} {param}"), *param));
        fields.push(Field::fixed("=\""));
        fields.push(Field::string(
            format!("{value_name} {param} value"),
            *param_value,
        ));
        fields.push(Field::fixed("\""));
    }
    fields.push(Field::fixed(CRLF));
    if options.end {
        fields.push(Field::fixed(CRLF).named(END_OF_HEADERS));
    }

    debug!(header = %header_name, params = params.len(), end = options.end, "composed header");
    Ok(Field::container(header_name, fields)?.fuzzable(options.fuzzable))
}

/// Whether `header` carries the end-of-headers blank line.
pub fn ends_headers(header: &Field) -> bool {
    header
        .children()
        .last()
        .is_some_and(|last| last.name() == Some(END_OF_HEADERS))
}

/// `key: value\r\n` with a mutable text value.
pub fn text_field(key: &str, value: &str, options: &HeaderOptions) -> Result<Field, FieldError> {
    custom_header_field(key, Field::string("value", value), &[], options)
}

/// `key: value\r\n` with a signed decimal value.
///
/// Without an explicit `bits`, the width is inferred from `value` and raised to
/// `DEFAULT_INT_FIELD_BITS`.
pub fn int_field(
    key: &str,
    value: i128,
    bits: Option<u32>,
    options: &HeaderOptions,
) -> Result<Field, FieldError> {
    let bits = match bits {
        Some(bits) => bits,
        None => infer_bits(key, value)?.max(DEFAULT_INT_FIELD_BITS),
    };
    let value = narrow(key, value, bits)?;
    let value_field = Field::int("value", value, bits, true)?.with_encoder(Encoder::DecimalAscii)?;
    custom_header_field(key, value_field, &[], options)
}

/// `Content-Length: n\r\n` whose value is a choice between the live size of
/// `sized_field` (selected by default) and the literal `value`.
///
/// Both branches use the width inferred from `value`. Selecting the literal branch
/// lets the declared length drift from the real payload size.
pub fn content_length_field(
    value: i128,
    sized_field: &str,
    options: &HeaderOptions,
) -> Result<Field, FieldError> {
    let bits = infer_bits(CONTENT_LENGTH, value)?;
    let literal = narrow(CONTENT_LENGTH, value, bits)?;
    let choice = Field::one_of(
        "value",
        vec![
            Field::size("size", sized_field, bits)?.with_encoder(Encoder::DecimalAscii)?,
            Field::int("literal", literal, bits, true)?.with_encoder(Encoder::DecimalAscii)?,
        ],
    )?;
    custom_header_field(CONTENT_LENGTH, choice, &[], options)
}

/// Username and password for a Basic authorization header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    pub username: String,
    pub password: String,
    pub delim: String,
    pub fuzz_username: bool,
    pub fuzz_password: bool,
    pub fuzz_delim: bool,
}

impl BasicCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            delim: ":".to_string(),
            fuzz_username: true,
            fuzz_password: true,
            fuzz_delim: false,
        }
    }

    pub fn with_delim(mut self, delim: impl Into<String>) -> Self {
        self.delim = delim.into();
        self
    }
}

/// `key: Basic base64(username delim password)\r\n`.
///
/// The base64 transform covers the concatenated bytes of the credentials container,
/// so mutating the username or password changes the encoded blob as a whole.
pub fn authorization_field(
    key: &str,
    credentials: &BasicCredentials,
    options: &HeaderOptions,
) -> Result<Field, FieldError> {
    let encoded = Field::container(
        "credentials",
        vec![
            Field::string("username", &credentials.username).fuzzable(credentials.fuzz_username),
            Field::delimiter(&credentials.delim)
                .named("delim")
                .fuzzable(credentials.fuzz_delim),
            Field::string("password", &credentials.password).fuzzable(credentials.fuzz_password),
        ],
    )?
    .with_encoder(Encoder::Base64)?;
    let value = Field::container("basic", vec![Field::fixed("Basic ").named("scheme"), encoded])?;
    custom_header_field(key, value, &[], options)
}

fn narrow(field: &str, value: i128, bits: u32) -> Result<i64, FieldError> {
    i64::try_from(value).map_err(|_| FieldError::IntegerTooWide {
        field: field.to_string(),
        value,
        bits,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{FieldKind, Value};
    use crate::template::Template;
    use base64::Engine;
    use base64::prelude::BASE64_STANDARD;

    fn value_leaf<'a>(header: &'a Field, key: &str) -> &'a Field {
        &header
            .child(&format!("{key} value"))
            .expect("header should have a value container")
            .children()[0]
    }

    #[test]
    fn text_field_renders_single_line() {
        let header = text_field("Host", "example.com", &HeaderOptions::default()).unwrap();
        assert_eq!(header.render().unwrap(), b"Host: example.com\r\n");
        assert_eq!(header.name(), Some("Host"));
    }

    #[test]
    fn end_flag_adds_exactly_one_blank_line() {
        let open = text_field("Host", "a", &HeaderOptions::default()).unwrap();
        let closed = text_field("Host", "a", &HeaderOptions::default().ending(true)).unwrap();
        assert!(open.render().unwrap().ends_with(b"a\r\n"));
        assert!(!open.render().unwrap().ends_with(b"\r\n\r\n"));
        assert!(closed.render().unwrap().ends_with(b"a\r\n\r\n"));
        assert!(!ends_headers(&open));
        assert!(ends_headers(&closed));
    }

    #[test]
    fn key_is_fixed_and_value_mutable_by_default() {
        let header = text_field("Host", "example.com", &HeaderOptions::default()).unwrap();
        let key = header.child("Host key").unwrap();
        assert!(matches!(key.kind(), FieldKind::Static(_)));
        assert!(!key.is_fuzzable());
        let value = header.child("Host value").unwrap();
        assert!(value.is_fuzzable());
        assert!(value_leaf(&header, "Host").is_fuzzable());
    }

    #[test]
    fn fuzzable_key_becomes_a_string_node() {
        let options = HeaderOptions {
            fuzzable_key: true,
            fuzzable_value: false,
            ..Default::default()
        };
        let header = text_field("Host", "x", &options).unwrap();
        let key = header.child("Host key").unwrap();
        assert!(matches!(key.kind(), FieldKind::String(_)));
        assert!(key.is_fuzzable());
        assert!(!header.child("Host value").unwrap().is_fuzzable());
    }

    #[test]
    fn params_are_appended_before_terminator() {
        let header = custom_header_field(
            "Content-Type",
            Field::string("value", "text/html"),
            &[("charset", "utf-8"), ("boundary", "xyz")],
            &HeaderOptions::default(),
        )
        .unwrap();
        assert_eq!(
            header.render().unwrap(),
            b"Content-Type: text/html; charset=\"utf-8\"; boundary=\"xyz\"\r\n"
        );
        let name = header.child("Content-Type value charset").unwrap();
        let value = header.child("Content-Type value charset value").unwrap();
        assert_eq!(name.render().unwrap(), b"charset");
        assert_eq!(value.render().unwrap(), b"utf-8");
    }

    #[test]
    fn repeated_param_is_rejected() {
        let result = custom_header_field(
            "Content-Type",
            Field::string("value", "text/html"),
            &[("charset", "utf-8"), ("charset", "latin1")],
            &HeaderOptions::default(),
        );
        assert_eq!(
            result,
            Err(FieldError::DuplicateParam {
                header: "Content-Type".to_string(),
                param: "charset".to_string(),
            })
        );
    }

    #[test]
    fn custom_name_overrides_container_name() {
        let options = HeaderOptions {
            name: Some("second cookie".to_string()),
            ..Default::default()
        };
        let header = text_field("Cookie", "b=2", &options).unwrap();
        assert_eq!(header.name(), Some("second cookie"));
    }

    #[test]
    fn int_field_defaults_to_32_bits() {
        let header = int_field("Content-Length", 12345, None, &HeaderOptions::default()).unwrap();
        assert_eq!(header.render().unwrap(), b"Content-Length: 12345\r\n");
        assert_eq!(
            value_leaf(&header, "Content-Length").kind(),
            &FieldKind::Int {
                value: 12345,
                bits: 32,
                signed: true,
            }
        );
    }

    #[test]
    fn int_field_widens_for_large_values_and_honors_explicit_width() {
        let big = int_field("X-Big", 1 << 40, None, &HeaderOptions::default()).unwrap();
        assert!(matches!(
            value_leaf(&big, "X-Big").kind(),
            FieldKind::Int { bits: 64, .. }
        ));

        let narrow = int_field("X-Small", -3, Some(8), &HeaderOptions::default()).unwrap();
        assert_eq!(narrow.render().unwrap(), b"X-Small: -3\r\n");
        assert!(int_field("X-Small", 300, Some(8), &HeaderOptions::default()).is_err());
    }

    #[test]
    fn int_field_rejects_values_wider_than_64_bits() {
        let result = int_field("X-Huge", i128::MAX, None, &HeaderOptions::default());
        assert!(matches!(
            result,
            Err(FieldError::IntegerTooWide { ref field, .. }) if field == "X-Huge"
        ));
    }

    #[test]
    fn content_length_tracks_sized_field() {
        let header = content_length_field(10, "body", &HeaderOptions::default().ending(true)).unwrap();
        let mut message = Field::container(
            "message",
            vec![header, Field::string("body", "0123456789abc")],
        )
        .unwrap();
        assert_eq!(
            message.render().unwrap(),
            b"Content-Length: 13\r\n\r\n0123456789abc"
        );

        message
            .child_mut("body")
            .unwrap()
            .set_value(Value::Text("xy".into()))
            .unwrap();
        assert_eq!(message.render().unwrap(), b"Content-Length: 2\r\n\r\nxy");
    }

    #[test]
    fn content_length_literal_branch_ignores_sized_field() {
        let header = content_length_field(10, "body", &HeaderOptions::default()).unwrap();
        let mut message = Field::container(
            "message",
            vec![header, Field::string("body", "0123456789abc")],
        )
        .unwrap();
        message
            .find_path_mut("Content-Length/Content-Length value/value")
            .unwrap()
            .select(1)
            .unwrap();
        assert_eq!(message.render().unwrap(), b"Content-Length: 10\r\n0123456789abc");

        message
            .child_mut("body")
            .unwrap()
            .set_value(Value::Text("x".into()))
            .unwrap();
        assert_eq!(message.render().unwrap(), b"Content-Length: 10\r\nx");
    }

    #[test]
    fn content_length_width_follows_literal() {
        let header = content_length_field(300, "body", &HeaderOptions::default()).unwrap();
        let choice = value_leaf(&header, CONTENT_LENGTH);
        assert!(matches!(
            choice.child("size").unwrap().kind(),
            FieldKind::Size { bits: 16, .. }
        ));
        assert!(matches!(
            choice.child("literal").unwrap().kind(),
            FieldKind::Int {
                value: 300,
                bits: 16,
                ..
            }
        ));
    }

    #[test]
    fn authorization_value_decodes_to_credentials() {
        let header = authorization_field(
            AUTHORIZATION,
            &BasicCredentials::new("alice", "s3cret"),
            &HeaderOptions::default(),
        )
        .unwrap();
        let rendered = header.render().unwrap();
        let text = String::from_utf8(rendered).unwrap();
        let encoded = text
            .strip_prefix("Authorization: Basic ")
            .and_then(|rest| rest.strip_suffix("\r\n"))
            .expect("header should be 'Authorization: Basic <b64>\\r\\n'");
        assert_eq!(BASE64_STANDARD.decode(encoded).unwrap(), b"alice:s3cret");
    }

    #[test]
    fn authorization_delimiter_is_fixed_unless_overridden() {
        let credentials = BasicCredentials::new("u", "p");
        let header = authorization_field(AUTHORIZATION, &credentials, &HeaderOptions::default()).unwrap();
        let delim = header
            .find_path("Authorization value/basic/credentials/delim")
            .unwrap();
        assert!(!delim.is_fuzzable());

        let credentials = BasicCredentials {
            fuzz_delim: true,
            fuzz_password: false,
            ..BasicCredentials::new("u", "p").with_delim("|")
        };
        let header = authorization_field(AUTHORIZATION, &credentials, &HeaderOptions::default()).unwrap();
        let scope = header
            .find_path("Authorization value/basic/credentials")
            .unwrap();
        assert!(scope.child("delim").unwrap().is_fuzzable());
        assert!(!scope.child("password").unwrap().is_fuzzable());
        assert!(scope.child("username").unwrap().is_fuzzable());
        assert_eq!(scope.render().unwrap(), BASE64_STANDARD.encode("u|p").as_bytes());
    }

    #[test]
    fn non_fuzzable_header_hides_every_target() {
        let options = HeaderOptions {
            fuzzable: false,
            fuzzable_key: true,
            ..Default::default()
        };
        let credentials = BasicCredentials::new("admin", "admin");
        let header = authorization_field(AUTHORIZATION, &credentials, &options).unwrap();
        assert!(!header.is_fuzzable());

        let root = Field::container(
            "message",
            vec![header, text_field("Host", "a", &HeaderOptions::default()).unwrap()],
        )
        .unwrap();
        let targets = Template::new(root).unwrap().mutation_targets();
        assert!(
            targets.iter().all(|t| !t.path.starts_with(AUTHORIZATION)),
            "Nothing under a non-fuzzable header should be listed, got {targets:?}"
        );
        assert!(targets.iter().any(|t| t.path == "Host/Host value/value"));
    }

    #[test]
    fn key_with_path_separator_is_rejected() {
        let result = text_field("X/Y", "1", &HeaderOptions::default());
        assert!(
            matches!(result, Err(FieldError::InvalidName { ref name, .. }) if name == "X/Y key"),
            "got {result:?}"
        );
    }
}

pub mod bits;
pub mod config;
pub mod field;
pub mod header;
pub mod input;
pub mod message;
pub mod request;
pub mod template;
pub mod uri;

pub use bits::{bit_width, infer_bits};
pub use config::{HeaderConfig, MessageConfig};
pub use field::{Encoder, Field, FieldError, FieldKind, Value};
pub use header::{
    BasicCredentials, HeaderOptions, authorization_field, content_length_field,
    custom_header_field, int_field, text_field,
};
pub use input::{Input, Payload};
pub use message::{body_field, http_request};
pub use request::{Method, RequestLineOptions, request_line};
pub use template::{MutationTarget, Template};
pub use uri::{UriParts, split_uri, uri_field, uri_nodes};

use crate::field::{Field, FieldError};
use crate::header::{CRLF, END_OF_HEADERS, ends_headers};
use crate::template::Template;

pub const HTTP_REQUEST: &str = "http request";
pub const BODY: &str = "body";

/// Mutable body node, the usual target of a `Content-Length` size reference.
pub fn body_field(value: &str) -> Field {
    Field::string(BODY, value)
}

/// Assembles request line, headers and optional body into a validated template.
///
/// The header block is closed exactly once: by the last header if it was composed
/// with `end`, otherwise by an appended blank line. A header other than the last one
/// carrying the marker is rejected.
pub fn http_request(
    request_line: Field,
    headers: Vec<Field>,
    body: Option<Field>,
) -> Result<Template, FieldError> {
    let last = headers.len().checked_sub(1);
    if let Some((_, misplaced)) = headers
        .iter()
        .enumerate()
        .find(|(index, header)| Some(*index) != last && ends_headers(header))
    {
        return Err(FieldError::MisplacedHeaderEnd {
            header: misplaced.display_name().to_string(),
        });
    }
    let closed = headers.last().is_some_and(ends_headers);

    let mut fields = Vec::with_capacity(headers.len() + 3);
    fields.push(request_line);
    fields.extend(headers);
    if !closed {
        fields.push(Field::fixed(CRLF).named(END_OF_HEADERS));
    }
    fields.extend(body);
    Template::new(Field::container(HTTP_REQUEST, fields)?)
}

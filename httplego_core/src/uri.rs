use crate::field::{Field, FieldError};
use tracing::debug;
use url::Url;

pub const PATH: &str = "path";
pub const QUERY: &str = "query";
pub const URI: &str = "uri";

/// Path and query of a URI, as they appear in an origin-form request target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriParts {
    pub path: String,
    pub query: Option<String>,
}

/// Splits `uri` into its path and (non-empty) query, keeping the caller's bytes.
///
/// Origin-form (`/a?b`), asterisk-form (`*`) and any other relative target are cut
/// at the first `?` and `#` without normalization, so dot segments, spaces and raw
/// `<`/`>` survive. Absolute-form URIs (`scheme://authority/...`) are validated with
/// `url` and reduced to origin form by dropping scheme and authority; an empty path
/// there becomes `/`. The fragment is never part of a request target and is dropped.
pub fn split_uri(uri: &str) -> Result<UriParts, FieldError> {
    if uri.is_empty() {
        return Err(FieldError::InvalidUri {
            uri: String::new(),
            reason: "empty request target".to_string(),
        });
    }
    match absolute_target(uri)? {
        Some(target) if target.is_empty() || target.starts_with(['?', '#']) => {
            let mut parts = split_target(target);
            parts.path = "/".to_string();
            Ok(parts)
        }
        Some(target) => Ok(split_target(target)),
        None => Ok(split_target(uri)),
    }
}

/// For `scheme://authority<target>`, returns `<target>` as a slice of `uri`.
fn absolute_target(uri: &str) -> Result<Option<&str>, FieldError> {
    let Some((scheme, rest)) = uri.split_once("://") else {
        return Ok(None);
    };
    if !is_scheme(scheme) {
        return Ok(None);
    }
    Url::parse(uri).map_err(|e| FieldError::InvalidUri {
        uri: uri.to_string(),
        reason: e.to_string(),
    })?;
    let authority_end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    Ok(Some(&rest[authority_end..]))
}

fn is_scheme(candidate: &str) -> bool {
    let mut chars = candidate.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

fn split_target(target: &str) -> UriParts {
    let (without_fragment, fragment) = match target.split_once('#') {
        Some((head, fragment)) => (head, Some(fragment)),
        None => (target, None),
    };
    if let Some(fragment) = fragment {
        debug!(target, fragment, "dropped URI fragment");
    }
    let (path, query) = match without_fragment.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (without_fragment, None),
    };
    UriParts {
        path: path.to_string(),
        query: query.filter(|query| !query.is_empty()).map(str::to_string),
    }
}

/// Mutable sub-nodes of `uri`: the path, followed by the query when there is one.
pub fn uri_nodes(uri: &str) -> Result<Vec<Field>, FieldError> {
    let parts = split_uri(uri)?;
    let mut nodes = vec![Field::string(PATH, parts.path)];
    if let Some(query) = parts.query {
        nodes.push(Field::string(QUERY, query));
    }
    Ok(nodes)
}

/// Wraps [`uri_nodes`] in a `uri` container, keeping the `?` separator as fixed
/// text between the path and query nodes.
pub fn uri_field(uri: &str) -> Result<Field, FieldError> {
    let mut nodes = uri_nodes(uri)?.into_iter();
    let mut children: Vec<Field> = nodes.next().into_iter().collect();
    if let Some(query) = nodes.next() {
        children.push(Field::fixed("?"));
        children.push(query);
    }
    Field::container(URI, children)
}

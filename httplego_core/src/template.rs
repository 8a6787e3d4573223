use crate::field::{Field, FieldError, FieldKind, Value};
use crate::input::Payload;
use serde::Serialize;
use tracing::debug;

/// A leaf (or alternative) the external engine may perturb.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MutationTarget {
    /// Slash-separated names from the root's children down to the node.
    pub path: String,
    pub kind: &'static str,
}

/// A validated field tree, ready to be serialized and handed to a generation engine.
///
/// Construction checks every size reference in the tree (including those in
/// unselected alternatives) and renders once, so a template that exists always
/// serializes in its initial state.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    root: Field,
}

impl Template {
    pub fn new(root: Field) -> Result<Self, FieldError> {
        check_references(&root, &root)?;
        let rendered = root.render()?;
        debug!(
            template = root.display_name(),
            bytes = rendered.len(),
            "template validated"
        );
        Ok(Self { root })
    }

    pub fn root(&self) -> &Field {
        &self.root
    }

    pub fn render(&self) -> Result<Vec<u8>, FieldError> {
        self.root.render()
    }

    pub fn payload(&self) -> Result<Payload, FieldError> {
        self.render().map(Payload::new)
    }

    pub fn field(&self, path: &str) -> Result<&Field, FieldError> {
        self.root
            .find_path(path)
            .ok_or_else(|| FieldError::NotFound {
                path: path.to_string(),
            })
    }

    /// Mutable access to a node. The tree shape cannot change through it; only
    /// values and selections can.
    pub fn field_mut(&mut self, path: &str) -> Result<&mut Field, FieldError> {
        self.root
            .find_path_mut(path)
            .ok_or_else(|| FieldError::NotFound {
                path: path.to_string(),
            })
    }

    pub fn set_value(&mut self, path: &str, value: Value) -> Result<(), FieldError> {
        self.field_mut(path)?.set_value(value)
    }

    /// Parses `raw` according to the kind of the node at `path` and assigns it.
    pub fn set_raw(&mut self, path: &str, raw: &str) -> Result<(), FieldError> {
        self.field_mut(path)?.set_raw(raw)
    }

    pub fn select(&mut self, path: &str, index: usize) -> Result<(), FieldError> {
        self.field_mut(path)?.select(index)
    }

    /// Lists addressable nodes whose own flag and every ancestor's flag allow
    /// mutation. Static nodes are never targets; containers are walked, not listed.
    pub fn mutation_targets(&self) -> Vec<MutationTarget> {
        let mut targets = Vec::new();
        if self.root.is_fuzzable() {
            for child in self.root.children() {
                collect_targets(child, "", &mut targets);
            }
        }
        targets
    }
}

fn collect_targets(field: &Field, prefix: &str, targets: &mut Vec<MutationTarget>) {
    let Some(name) = field.name() else {
        return;
    };
    if !field.is_fuzzable() {
        return;
    }
    let path = if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}/{name}")
    };
    match field.kind() {
        FieldKind::Static(_) => {}
        FieldKind::Container(children) => {
            for child in children {
                collect_targets(child, &path, targets);
            }
        }
        FieldKind::OneOf { options, .. } => {
            for option in options {
                collect_targets(option, &path, targets);
            }
            targets.push(MutationTarget {
                path,
                kind: field.kind().label(),
            });
        }
        kind => targets.push(MutationTarget {
            path,
            kind: kind.label(),
        }),
    }
}

fn check_references(root: &Field, field: &Field) -> Result<(), FieldError> {
    if let FieldKind::Size { target, .. } = field.kind() {
        root.resolve_reference(field.display_name(), target)?;
    }
    field
        .children()
        .iter()
        .try_for_each(|child| check_references(root, child))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Encoder;
    use crate::header::{HeaderOptions, content_length_field, text_field};
    use crate::input::Input;
    use crate::request::{RequestLineOptions, request_line};

    fn sample() -> Template {
        let root = Field::container(
            "message",
            vec![
                request_line("GET".into(), "/search?q=x", &RequestLineOptions::default()).unwrap(),
                text_field("Host", "example.com", &HeaderOptions::default()).unwrap(),
                content_length_field(4, "body", &HeaderOptions::default().ending(true)).unwrap(),
                Field::string("body", "ping"),
            ],
        )
        .unwrap();
        Template::new(root).unwrap()
    }

    #[test]
    fn renders_whole_tree() {
        let template = sample();
        assert_eq!(
            template.render().unwrap(),
            b"GET /search?q=x HTTP/1.0\r\nHost: example.com\r\nContent-Length: 4\r\n\r\nping"
        );
    }

    #[test]
    fn rejects_unresolvable_size_in_unselected_branch() {
        let hidden = Field::one_of(
            "choice",
            vec![
                Field::string("plain", "x"),
                Field::size("length", "missing", 8)
                    .unwrap()
                    .with_encoder(Encoder::DecimalAscii)
                    .unwrap(),
            ],
        )
        .unwrap();
        let root = Field::container("root", vec![hidden]).unwrap();
        assert_eq!(
            Template::new(root),
            Err(FieldError::UnresolvedReference {
                field: "length".to_string(),
                target: "missing".to_string(),
            })
        );
    }

    #[test]
    fn lists_mutation_targets_respecting_ancestors() {
        let template = sample();
        let paths: Vec<String> = template
            .mutation_targets()
            .into_iter()
            .map(|t| t.path)
            .collect();
        assert_eq!(
            paths,
            vec![
                "request line/uri/path",
                "request line/uri/query",
                "request line/version",
                "Host/Host value/value",
                "Content-Length/Content-Length value/value/size",
                "Content-Length/Content-Length value/value/literal",
                "Content-Length/Content-Length value/value",
                "body",
            ]
        );
    }

    #[test]
    fn non_fuzzable_ancestor_hides_descendants() {
        let options = RequestLineOptions {
            fuzzable: false,
            ..Default::default()
        };
        let root = Field::container(
            "message",
            vec![request_line("GET".into(), "/a?b", &options).unwrap()],
        )
        .unwrap();
        let template = Template::new(root).unwrap();
        assert!(template.mutation_targets().is_empty());
    }

    #[test]
    fn engine_can_reassign_values_by_path() {
        let mut template = sample();
        template
            .set_value("request line/uri/path", Value::Text("/other".into()))
            .unwrap();
        template.set_raw("body", "pong!").unwrap();
        template
            .select("Content-Length/Content-Length value/value", 1)
            .unwrap();
        assert_eq!(
            template.render().unwrap(),
            b"GET /other?q=x HTTP/1.0\r\nHost: example.com\r\nContent-Length: 4\r\n\r\npong!"
        );
        assert_eq!(
            template.set_raw("nowhere", "x"),
            Err(FieldError::NotFound {
                path: "nowhere".to_string()
            })
        );
    }

    #[test]
    fn payload_carries_rendered_bytes() {
        let template = sample();
        let payload = template.payload().unwrap();
        assert_eq!(payload.as_bytes(), template.render().unwrap().as_slice());
        assert_eq!(payload.digest_hex().len(), 32);
    }
}

use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use thiserror::Error;

/// Placeholder used in error messages for nodes constructed without a name.
const UNNAMED: &str = "<unnamed>";
/// Separates the child names of a path; never allowed inside a name.
pub const PATH_SEPARATOR: char = '/';
/// Widest integer a numeric node may carry.
pub const MAX_INT_BITS: u32 = 64;

/// Defines errors raised while composing a template or while an external engine
/// touches its values.
///
/// Every variant names the field (or parameter) at fault so that template authors
/// can fix the definition before anything is serialized.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FieldError {
    /// Two direct children of the same container share a name.
    #[error("Duplicate child name '{name}' in container '{parent}'")]
    DuplicateName { parent: String, name: String },

    /// A child name contains the path separator `/`, so no path could address it.
    #[error("Field name '{name}' in container '{parent}' contains '/'")]
    InvalidName { parent: String, name: String },

    /// A header parameter key was given more than once.
    #[error("Header '{header}' repeats parameter '{param}'")]
    DuplicateParam { header: String, param: String },

    /// The value cannot be represented within the supported or declared width.
    #[error("Field '{field}': value {value} does not fit in {bits} bits")]
    IntegerTooWide { field: String, value: i128, bits: u32 },

    /// A declared bit width is zero or exceeds `MAX_INT_BITS`.
    #[error("Field '{field}': unsupported bit width {bits}")]
    InvalidWidth { field: String, bits: u32 },

    #[error("Invalid URI '{uri}': {reason}")]
    InvalidUri { uri: String, reason: String },

    /// A group or one-of node was built without any option.
    #[error("Field '{field}' has no alternatives")]
    EmptyAlternatives { field: String },

    #[error("Encoder {encoder:?} cannot be attached to {kind} field '{field}'")]
    IncompatibleEncoder {
        field: String,
        kind: &'static str,
        encoder: Encoder,
    },

    /// A size node points at a name that does not exist in the tree.
    #[error("Size field '{field}' references unknown field '{target}'")]
    UnresolvedReference { field: String, target: String },

    /// A size node points at a name carried by more than one node.
    #[error("Size field '{field}' references '{target}', which matches {count} fields")]
    AmbiguousReference {
        field: String,
        target: String,
        count: usize,
    },

    /// Resolving a size reference led back to a field already being measured.
    #[error("Size reference to '{target}' is cyclic")]
    ReferenceCycle { target: String },

    /// The end-of-headers blank line was requested on a header that is not the last one.
    #[error("Header '{header}' ends the header block but is not the last header")]
    MisplacedHeaderEnd { header: String },

    #[error("No field at path '{path}'")]
    NotFound { path: String },

    /// A value of the wrong shape was assigned to a node.
    #[error("Field '{field}' of kind {kind} cannot take value {value}")]
    ValueMismatch {
        field: String,
        kind: &'static str,
        value: String,
    },

    #[error("Field '{field}': alternative {index} out of range (have {len})")]
    SelectionOutOfRange {
        field: String,
        index: usize,
        len: usize,
    },

    /// Static nodes always serialize verbatim.
    #[error("Field '{field}' is fixed and cannot be reassigned")]
    FixedValue { field: String },
}

/// Post-processing transform attached to a node's serialized output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoder {
    /// Standard base64 over the node's bytes (for containers: the concatenation of
    /// all children).
    Base64,
    /// Integer rendered as ASCII decimal digits.
    DecimalAscii,
    /// Float rendered as ASCII with a fixed number of fractional digits.
    FixedPointAscii(usize),
}

/// A value the external engine may assign to a leaf.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Int(i64),
    Float(f64),
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Text(text) => write!(f, "{text:?}"),
            Value::Int(value) => write!(f, "{value}"),
            Value::Float(value) => write!(f, "{value}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    /// Fixed bytes, never reassigned.
    Static(Vec<u8>),
    /// Variable text.
    String(String),
    /// Separator text; only a mutation target when explicitly flagged.
    Delimiter(String),
    Int {
        value: i64,
        bits: u32,
        signed: bool,
    },
    Float(f64),
    /// Choice among literal values.
    Group { values: Vec<String>, selected: usize },
    /// Choice among sub-trees.
    OneOf { options: Vec<Field>, selected: usize },
    /// Ordered children.
    Container(Vec<Field>),
    /// Byte length of another named node, unless overridden.
    Size {
        target: String,
        bits: u32,
        length_override: Option<i64>,
    },
}

impl FieldKind {
    pub fn label(&self) -> &'static str {
        match self {
            FieldKind::Static(_) => "static",
            FieldKind::String(_) => "string",
            FieldKind::Delimiter(_) => "delimiter",
            FieldKind::Int { .. } => "int",
            FieldKind::Float(_) => "float",
            FieldKind::Group { .. } => "group",
            FieldKind::OneOf { .. } => "one-of",
            FieldKind::Container(_) => "container",
            FieldKind::Size { .. } => "size",
        }
    }
}

/// A node of a protocol-fragment tree.
///
/// Fields are built once, at template-definition time. Their shape is fixed from
/// then on; only leaf values and alternative selections may change, through
/// [`Field::set_value`] and [`Field::select`].
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    name: Option<String>,
    fuzzable: bool,
    kind: FieldKind,
    encoder: Option<Encoder>,
}

impl Field {
    fn new(name: Option<String>, fuzzable: bool, kind: FieldKind) -> Self {
        Self {
            name,
            fuzzable,
            kind,
            encoder: None,
        }
    }

    /// Unnamed fixed bytes. Use [`Field::named`] when the node must be addressable.
    pub fn fixed(value: impl Into<Vec<u8>>) -> Self {
        Self::new(None, false, FieldKind::Static(value.into()))
    }

    pub fn string(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(Some(name.into()), true, FieldKind::String(value.into()))
    }

    pub fn delimiter(value: impl Into<String>) -> Self {
        Self::new(None, false, FieldKind::Delimiter(value.into()))
    }

    /// Creates an integer node, checking that `value` fits the declared width.
    pub fn int(
        name: impl Into<String>,
        value: i64,
        bits: u32,
        signed: bool,
    ) -> Result<Self, FieldError> {
        let name = name.into();
        check_width(&name, bits)?;
        check_fits(&name, value, bits, signed)?;
        Ok(Self::new(
            Some(name),
            true,
            FieldKind::Int {
                value,
                bits,
                signed,
            },
        ))
    }

    pub fn float(name: impl Into<String>, value: f64) -> Self {
        Self::new(Some(name.into()), true, FieldKind::Float(value))
    }

    /// Creates a choice among literal values. The first value is selected.
    pub fn group(name: impl Into<String>, values: Vec<String>) -> Result<Self, FieldError> {
        let name = name.into();
        if values.is_empty() {
            return Err(FieldError::EmptyAlternatives { field: name });
        }
        Ok(Self::new(
            Some(name),
            true,
            FieldKind::Group {
                values,
                selected: 0,
            },
        ))
    }

    /// Creates a choice among sub-trees. The first option is selected.
    pub fn one_of(name: impl Into<String>, options: Vec<Field>) -> Result<Self, FieldError> {
        let name = name.into();
        if options.is_empty() {
            return Err(FieldError::EmptyAlternatives { field: name });
        }
        check_unique_names(&name, &options)?;
        Ok(Self::new(
            Some(name),
            true,
            FieldKind::OneOf {
                options,
                selected: 0,
            },
        ))
    }

    pub fn container(name: impl Into<String>, children: Vec<Field>) -> Result<Self, FieldError> {
        let name = name.into();
        check_unique_names(&name, &children)?;
        Ok(Self::new(Some(name), true, FieldKind::Container(children)))
    }

    /// Creates a node rendering the byte length of the field named `target`.
    ///
    /// `target` is either a plain name, which must match exactly one node of the
    /// tree being rendered, or a slash-separated path from the root's children.
    pub fn size(
        name: impl Into<String>,
        target: impl Into<String>,
        bits: u32,
    ) -> Result<Self, FieldError> {
        let name = name.into();
        check_width(&name, bits)?;
        Ok(Self::new(
            Some(name),
            true,
            FieldKind::Size {
                target: target.into(),
                bits,
                length_override: None,
            },
        ))
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn fuzzable(mut self, fuzzable: bool) -> Self {
        self.fuzzable = fuzzable;
        self
    }

    /// Attaches an output encoder, rejecting combinations that have no meaning
    /// (e.g. decimal rendering of a text node).
    pub fn with_encoder(mut self, encoder: Encoder) -> Result<Self, FieldError> {
        let compatible = match encoder {
            Encoder::Base64 => !matches!(self.kind, FieldKind::Float(_)),
            Encoder::DecimalAscii => {
                matches!(self.kind, FieldKind::Int { .. } | FieldKind::Size { .. })
            }
            Encoder::FixedPointAscii(_) => matches!(self.kind, FieldKind::Float(_)),
        };
        if !compatible {
            return Err(FieldError::IncompatibleEncoder {
                field: self.display_name().to_string(),
                kind: self.kind.label(),
                encoder,
            });
        }
        self.encoder = Some(encoder);
        Ok(self)
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn is_fuzzable(&self) -> bool {
        self.fuzzable
    }

    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    pub fn encoder(&self) -> Option<Encoder> {
        self.encoder
    }

    pub(crate) fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(UNNAMED)
    }

    /// Direct children: container children or one-of options.
    pub fn children(&self) -> &[Field] {
        match &self.kind {
            FieldKind::Container(children) => children,
            FieldKind::OneOf { options, .. } => options,
            _ => &[],
        }
    }

    fn children_mut(&mut self) -> &mut [Field] {
        match &mut self.kind {
            FieldKind::Container(children) => children,
            FieldKind::OneOf { options, .. } => options,
            _ => &mut [],
        }
    }

    pub fn child(&self, name: &str) -> Option<&Field> {
        self.children().iter().find(|c| c.name() == Some(name))
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut Field> {
        self.children_mut()
            .iter_mut()
            .find(|c| c.name() == Some(name))
    }

    /// Follows a slash-separated path of child names, starting below `self`.
    pub fn find_path(&self, path: &str) -> Option<&Field> {
        path.split(PATH_SEPARATOR)
            .try_fold(self, |node, segment| node.child(segment))
    }

    pub fn find_path_mut(&mut self, path: &str) -> Option<&mut Field> {
        path.split(PATH_SEPARATOR)
            .try_fold(self, |node, segment| node.child_mut(segment))
    }

    /// Collects every node in this subtree (self included) named `name`.
    pub fn find_named<'a>(&'a self, name: &str, found: &mut Vec<&'a Field>) {
        if self.name() == Some(name) {
            found.push(self);
        }
        for child in self.children() {
            child.find_named(name, found);
        }
    }

    /// Assigns a new leaf value.
    ///
    /// Integers are range-checked against the node's width. Assigning an integer to
    /// a size node overrides the computed length, which lets the engine desynchronize
    /// a declared length from the real one.
    pub fn set_value(&mut self, value: Value) -> Result<(), FieldError> {
        let field = self.display_name().to_string();
        let kind = self.kind.label();
        match (&mut self.kind, value) {
            (FieldKind::Static(_), _) => Err(FieldError::FixedValue { field }),
            (FieldKind::String(current), Value::Text(text))
            | (FieldKind::Delimiter(current), Value::Text(text)) => {
                *current = text;
                Ok(())
            }
            (
                FieldKind::Int {
                    value: current,
                    bits,
                    signed,
                },
                Value::Int(new_value),
            ) => {
                check_fits(&field, new_value, *bits, *signed)?;
                *current = new_value;
                Ok(())
            }
            (FieldKind::Float(current), Value::Float(new_value)) => {
                *current = new_value;
                Ok(())
            }
            (
                FieldKind::Size {
                    length_override, ..
                },
                Value::Int(new_value),
            ) => {
                *length_override = Some(new_value);
                Ok(())
            }
            (_, value) => Err(FieldError::ValueMismatch {
                field,
                kind,
                value: value.to_string(),
            }),
        }
    }

    /// Parses `raw` according to this node's kind and assigns it.
    pub fn set_raw(&mut self, raw: &str) -> Result<(), FieldError> {
        let mismatch = |field: &Field| FieldError::ValueMismatch {
            field: field.display_name().to_string(),
            kind: field.kind.label(),
            value: raw.to_string(),
        };
        if matches!(self.kind, FieldKind::Group { .. } | FieldKind::OneOf { .. }) {
            let index: usize = raw.parse().map_err(|_| mismatch(self))?;
            return self.select(index);
        }
        let value = match &self.kind {
            FieldKind::Int { .. } | FieldKind::Size { .. } => {
                Value::Int(raw.parse().map_err(|_| mismatch(self))?)
            }
            FieldKind::Float(_) => Value::Float(raw.parse().map_err(|_| mismatch(self))?),
            _ => Value::Text(raw.to_string()),
        };
        self.set_value(value)
    }

    /// Drops a length override so the size node tracks its target again.
    pub fn clear_override(&mut self) {
        if let FieldKind::Size {
            length_override, ..
        } = &mut self.kind
        {
            *length_override = None;
        }
    }

    /// Selects the alternative at `index` of a group or one-of node.
    pub fn select(&mut self, index: usize) -> Result<(), FieldError> {
        let field = self.display_name().to_string();
        let kind = self.kind.label();
        let (len, selected) = match &mut self.kind {
            FieldKind::Group { values, selected } => (values.len(), selected),
            FieldKind::OneOf { options, selected } => (options.len(), selected),
            _ => {
                return Err(FieldError::ValueMismatch {
                    field,
                    kind,
                    value: format!("alternative {index}"),
                });
            }
        };
        if index >= len {
            return Err(FieldError::SelectionOutOfRange { field, index, len });
        }
        *selected = index;
        Ok(())
    }

    /// Serializes this field, resolving size references against itself as root.
    pub fn render(&self) -> Result<Vec<u8>, FieldError> {
        let mut context = RenderContext {
            root: self,
            measuring: Vec::new(),
        };
        let mut out = Vec::new();
        self.render_into(&mut context, &mut out)?;
        Ok(out)
    }

    /// Finds the single node a size reference points at, searching from `self`.
    pub(crate) fn resolve_reference(
        &self,
        from: &str,
        target: &str,
    ) -> Result<&Field, FieldError> {
        if target.contains(PATH_SEPARATOR) {
            return self
                .find_path(target)
                .ok_or_else(|| FieldError::UnresolvedReference {
                    field: from.to_string(),
                    target: target.to_string(),
                });
        }
        let mut found = Vec::new();
        self.find_named(target, &mut found);
        match found.as_slice() {
            [] => Err(FieldError::UnresolvedReference {
                field: from.to_string(),
                target: target.to_string(),
            }),
            [single] => Ok(*single),
            many => Err(FieldError::AmbiguousReference {
                field: from.to_string(),
                target: target.to_string(),
                count: many.len(),
            }),
        }
    }

    fn render_into<'a>(
        &'a self,
        context: &mut RenderContext<'a>,
        out: &mut Vec<u8>,
    ) -> Result<(), FieldError> {
        match &self.kind {
            FieldKind::Static(bytes) => self.emit_bytes(bytes, out),
            FieldKind::String(text) | FieldKind::Delimiter(text) => {
                self.emit_bytes(text.as_bytes(), out)
            }
            FieldKind::Group { values, selected } => {
                self.emit_bytes(values[*selected].as_bytes(), out)
            }
            FieldKind::Int {
                value,
                bits,
                signed,
            } => self.emit_int(*value, *bits, *signed, out)?,
            FieldKind::Float(value) => {
                let text = match self.encoder {
                    Some(Encoder::FixedPointAscii(precision)) => format!("{value:.precision$}"),
                    _ => value.to_string(),
                };
                out.extend_from_slice(text.as_bytes());
            }
            FieldKind::OneOf { options, selected } => {
                let mut inner = Vec::new();
                options[*selected].render_into(context, &mut inner)?;
                self.emit_bytes(&inner, out);
            }
            FieldKind::Container(children) => {
                let mut inner = Vec::new();
                for child in children {
                    child.render_into(context, &mut inner)?;
                }
                self.emit_bytes(&inner, out);
            }
            FieldKind::Size {
                target,
                bits,
                length_override,
            } => {
                let length = match length_override {
                    Some(length) => *length,
                    None => {
                        let measured = context.length_of(self.display_name(), target)?;
                        i64::try_from(measured).map_err(|_| FieldError::IntegerTooWide {
                            field: self.display_name().to_string(),
                            value: measured as i128,
                            bits: *bits,
                        })?
                    }
                };
                self.emit_int(length, *bits, false, out)?;
            }
        }
        Ok(())
    }

    fn emit_bytes(&self, bytes: &[u8], out: &mut Vec<u8>) {
        match self.encoder {
            Some(Encoder::Base64) => out.extend_from_slice(BASE64_STANDARD.encode(bytes).as_bytes()),
            _ => out.extend_from_slice(bytes),
        }
    }

    fn emit_int(
        &self,
        value: i64,
        bits: u32,
        signed: bool,
        out: &mut Vec<u8>,
    ) -> Result<(), FieldError> {
        if self.encoder == Some(Encoder::DecimalAscii) {
            out.extend_from_slice(value.to_string().as_bytes());
            return Ok(());
        }
        // Binary forms must not truncate: the value has to fit its declared width.
        check_fits(self.display_name(), value, bits, signed)?;
        let width = bits.div_ceil(8) as usize;
        let bytes = value.to_be_bytes();
        self.emit_bytes(&bytes[bytes.len() - width..], out);
        Ok(())
    }
}

struct RenderContext<'a> {
    root: &'a Field,
    measuring: Vec<&'a str>,
}

impl<'a> RenderContext<'a> {
    fn length_of(&mut self, from: &str, target: &'a str) -> Result<usize, FieldError> {
        if self.measuring.contains(&target) {
            return Err(FieldError::ReferenceCycle {
                target: target.to_string(),
            });
        }
        let root = self.root;
        let node = root.resolve_reference(from, target)?;
        self.measuring.push(target);
        let mut buffer = Vec::new();
        let rendered = node.render_into(self, &mut buffer);
        self.measuring.pop();
        rendered?;
        Ok(buffer.len())
    }
}

fn check_width(field: &str, bits: u32) -> Result<(), FieldError> {
    if bits == 0 || bits > MAX_INT_BITS {
        return Err(FieldError::InvalidWidth {
            field: field.to_string(),
            bits,
        });
    }
    Ok(())
}

fn check_fits(field: &str, value: i64, bits: u32, signed: bool) -> Result<(), FieldError> {
    let value = value as i128;
    let (min, max) = if signed {
        (-(1i128 << (bits - 1)), (1i128 << (bits - 1)) - 1)
    } else {
        (0, (1i128 << bits) - 1)
    };
    if value < min || value > max {
        return Err(FieldError::IntegerTooWide {
            field: field.to_string(),
            value,
            bits,
        });
    }
    Ok(())
}

fn check_unique_names(parent: &str, children: &[Field]) -> Result<(), FieldError> {
    let mut seen = std::collections::HashSet::new();
    for name in children.iter().filter_map(Field::name) {
        if name.contains(PATH_SEPARATOR) {
            return Err(FieldError::InvalidName {
                parent: parent.to_string(),
                name: name.to_string(),
            });
        }
        if !seen.insert(name) {
            return Err(FieldError::DuplicateName {
                parent: parent.to_string(),
                name: name.to_string(),
            });
        }
    }
    Ok(())
}

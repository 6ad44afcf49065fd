//! Validated identifiers taken from the search document.
//!
//! Attribute and entity names come straight from user-controlled JSON. Both
//! types strip every character outside `[A-Za-z0-9_.]` before the name is
//! used anywhere near SQL text.

use std::fmt;

use crate::error::CompileError;

/// Prefix marking an attribute of the record itself rather than of one of its
/// typed objects, e.g. `doc.creationDate`.
pub const SYSTEM_ATTRIBUTE_PREFIX: &str = "doc.";

/// Token prepended to an attribute name when descendant terms must match too.
pub const EXTENDED_MARKER: &str = "extended_";

const NAMESPACE_SEPARATOR: char = '.';

fn sanitize(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '.')
        .collect()
}

/// A namespaced record type, e.g. `PhenoTips.PatientClass`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityKind {
    namespace: String,
    type_name: String,
}

impl EntityKind {
    /// Parses `Namespace.Type`. A bare `Type` lands in `default_namespace`.
    pub fn parse(raw: &str, default_namespace: &str) -> Result<Self, CompileError> {
        let clean = sanitize(raw.trim());
        let clean = clean.trim_matches(NAMESPACE_SEPARATOR);
        if clean.is_empty() {
            return Err(CompileError::malformed("class", "value is blank"));
        }

        match clean.rsplit_once(NAMESPACE_SEPARATOR) {
            Some((namespace, type_name)) => Ok(Self {
                namespace: namespace.to_string(),
                type_name: type_name.to_string(),
            }),
            None => {
                let namespace = sanitize(default_namespace);
                if namespace.is_empty() {
                    return Err(CompileError::malformed(
                        "class",
                        format!("`{}` has no namespace and no default is configured", clean),
                    ));
                }
                Ok(Self {
                    namespace,
                    type_name: clean.to_string(),
                })
            }
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// The full `Namespace.Type` form, as stored in the objects table.
    pub fn qualified(&self) -> String {
        format!("{}{}{}", self.namespace, NAMESPACE_SEPARATOR, self.type_name)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.namespace, NAMESPACE_SEPARATOR, self.type_name)
    }
}

/// A sanitized attribute name.
///
/// Equality and hashing use the normalized name only, so `doc.author` and
/// `doc.au<thor` are the same attribute.
#[derive(Debug, Clone)]
pub struct AttributeName {
    name: String,
    is_system_attribute: bool,
    is_extended: bool,
}

impl AttributeName {
    pub fn parse(raw: &str, extended: bool) -> Result<Self, CompileError> {
        let trimmed = raw.trim();
        let (body, is_system_attribute) = match trimmed.strip_prefix(SYSTEM_ATTRIBUTE_PREFIX) {
            Some(rest) => (rest, true),
            None => (trimmed, false),
        };

        let clean = sanitize(body);
        if clean.is_empty() {
            return Err(CompileError::malformed("property_name", "value is blank"));
        }

        // Record columns have no subterm expansion.
        let is_extended = extended && !is_system_attribute;
        let name = if is_extended {
            format!("{}{}", EXTENDED_MARKER, clean)
        } else {
            clean
        };

        Ok(Self {
            name,
            is_system_attribute,
            is_extended,
        })
    }

    /// The effective name: the stored property name, or the record column for
    /// system attributes.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_system_attribute(&self) -> bool {
        self.is_system_attribute
    }

    pub fn is_extended(&self) -> bool {
        self.is_extended
    }

    /// The attribute as the schema declares it, without the subterm marker.
    pub fn declared(&self) -> AttributeName {
        match self.name.strip_prefix(EXTENDED_MARKER) {
            Some(base) if self.is_extended => Self {
                name: base.to_string(),
                is_system_attribute: self.is_system_attribute,
                is_extended: false,
            },
            _ => self.clone(),
        }
    }
}

impl PartialEq for AttributeName {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.is_system_attribute == other.is_system_attribute
    }
}

impl Eq for AttributeName {}

impl std::hash::Hash for AttributeName {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.is_system_attribute.hash(state);
    }
}

impl fmt::Display for AttributeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_system_attribute {
            write!(f, "{}{}", SYSTEM_ATTRIBUTE_PREFIX, self.name)
        } else {
            f.write_str(&self.name)
        }
    }
}

//! Schema lookup: which attributes exist on an entity kind and how their
//! values are typed.
//!
//! The compiler only ever asks one question, "what is the value type of
//! attribute A on kind K", through [`SchemaLookup`]. Record-level system
//! attributes (`doc.*`) are answered here without consulting the schema.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::identifier::{AttributeName, EntityKind};

/// Declared value type of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    String,
    TextArea,
    Integer,
    Long,
    Float,
    Double,
    Date,
    /// A date stored obscured as a `yyyy-MM-dd` string.
    EncryptedDate,
    Boolean,
    SingleList,
    /// Multi-select stored as one `|`-delimited string.
    MultiList,
    /// Multi-select stored one row per selected item.
    RelationalList,
    User,
    Group,
}

/// Read-only schema introspection.
pub trait SchemaLookup {
    /// Returns the declared type, or `None` when the attribute does not exist.
    fn attribute_type(&self, kind: &EntityKind, attribute: &AttributeName) -> Option<ValueType>;
}

impl<F> SchemaLookup for F
where
    F: Fn(&EntityKind, &AttributeName) -> Option<ValueType>,
{
    fn attribute_type(&self, kind: &EntityKind, attribute: &AttributeName) -> Option<ValueType> {
        self(kind, attribute)
    }
}

/// A column of the records table exposed as a `doc.` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemAttribute {
    pub column: &'static str,
    pub value_type: ValueType,
}

const DOCUMENT_COLUMNS: &[(&str, &str)] = &[
    ("fullName", "full_name"),
    ("name", "name"),
    ("space", "space"),
    ("title", "title"),
    ("parent", "parent"),
    ("language", "language"),
    ("author", "author"),
    ("creator", "creator"),
    ("contentAuthor", "content_author"),
    ("creationDate", "creation_date"),
    ("date", "date"),
    ("contentUpdateDate", "content_update_date"),
];

const USER_COLUMNS: &[&str] = &["author", "creator", "contentAuthor"];

impl SystemAttribute {
    /// Resolves a system attribute name to its column. Names that are not
    /// record columns do not exist.
    pub fn lookup(name: &str) -> Option<Self> {
        let &(attribute, column) = DOCUMENT_COLUMNS
            .iter()
            .find(|(attribute, _)| attribute.eq_ignore_ascii_case(name))?;

        let value_type = if attribute.to_ascii_lowercase().ends_with("date") {
            ValueType::Date
        } else if USER_COLUMNS.contains(&attribute) {
            ValueType::User
        } else {
            ValueType::String
        };

        Some(Self { column, value_type })
    }
}

/// Resolves the value type of any attribute, system or custom.
pub fn resolve_type(
    schema: &dyn SchemaLookup,
    kind: &EntityKind,
    attribute: &AttributeName,
) -> Option<ValueType> {
    if attribute.is_system_attribute() {
        SystemAttribute::lookup(attribute.name()).map(|system| system.value_type)
    } else {
        schema.attribute_type(kind, &attribute.declared())
    }
}

/// In-memory schema keyed by qualified class name, loadable from JSON:
///
/// ```json
/// { "PhenoTips.PatientClass": { "first_name": "string", "date_of_birth": "date" } }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StaticSchema {
    classes: HashMap<String, HashMap<String, ValueType>>,
}

impl StaticSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_attribute(
        mut self,
        class: impl Into<String>,
        attribute: impl Into<String>,
        value_type: ValueType,
    ) -> Self {
        self.classes
            .entry(class.into())
            .or_default()
            .insert(attribute.into(), value_type);
        self
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        if !path_ref.exists() {
            return Err(ConfigError::NotFound(path_ref.display().to_string()));
        }
        let content = fs::read_to_string(path_ref).map_err(|source| ConfigError::Io {
            path: path_ref.display().to_string(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path_ref.display().to_string(),
            source,
        })
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }
}

impl SchemaLookup for StaticSchema {
    fn attribute_type(&self, kind: &EntityKind, attribute: &AttributeName) -> Option<ValueType> {
        self.classes
            .get(&kind.qualified())?
            .get(attribute.name())
            .copied()
    }
}

/// Caches answers of another lookup for the lifetime of one compilation.
///
/// Never keep one across requests: the schema may change between searches.
pub struct MemoizedSchema<'a> {
    inner: &'a dyn SchemaLookup,
    cache: RefCell<HashMap<(EntityKind, AttributeName), Option<ValueType>>>,
}

impl<'a> MemoizedSchema<'a> {
    pub fn new(inner: &'a dyn SchemaLookup) -> Self {
        Self {
            inner,
            cache: RefCell::new(HashMap::new()),
        }
    }
}

impl SchemaLookup for MemoizedSchema<'_> {
    fn attribute_type(&self, kind: &EntityKind, attribute: &AttributeName) -> Option<ValueType> {
        let key = (kind.clone(), attribute.clone());
        if let Some(cached) = self.cache.borrow().get(&key) {
            return *cached;
        }
        let answer = self.inner.attribute_type(kind, attribute);
        self.cache.borrow_mut().insert(key, answer);
        answer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn patient() -> EntityKind {
        EntityKind::parse("PhenoTips.PatientClass", "XWiki").unwrap()
    }

    #[test]
    fn test_static_schema_lookup() {
        let schema = StaticSchema::new()
            .with_attribute("PhenoTips.PatientClass", "first_name", ValueType::String)
            .with_attribute("PhenoTips.PatientClass", "date_of_birth", ValueType::Date);

        let name = AttributeName::parse("first_name", false).unwrap();
        let missing = AttributeName::parse("nickname", false).unwrap();
        assert_eq!(schema.attribute_type(&patient(), &name), Some(ValueType::String));
        assert_eq!(schema.attribute_type(&patient(), &missing), None);
    }

    #[test]
    fn test_schema_from_json() {
        let schema: StaticSchema = serde_json::from_str(
            r#"{"PhenoTips.PatientClass": {"phenotype": "relational_list", "notes": "text_area"}}"#,
        )
        .unwrap();
        let phenotype = AttributeName::parse("phenotype", false).unwrap();
        assert_eq!(
            schema.attribute_type(&patient(), &phenotype),
            Some(ValueType::RelationalList)
        );
        assert_eq!(schema.class_count(), 1);
    }

    #[test]
    fn test_system_attributes() {
        let created = SystemAttribute::lookup("creationDate").unwrap();
        assert_eq!(created.column, "creation_date");
        assert_eq!(created.value_type, ValueType::Date);

        assert_eq!(SystemAttribute::lookup("date").unwrap().value_type, ValueType::Date);
        assert_eq!(SystemAttribute::lookup("author").unwrap().value_type, ValueType::User);
        assert_eq!(SystemAttribute::lookup("space").unwrap().value_type, ValueType::String);
        assert!(SystemAttribute::lookup("password").is_none());
    }

    #[test]
    fn test_resolve_type_skips_schema_for_system_attributes() {
        let schema = |_: &EntityKind, _: &AttributeName| -> Option<ValueType> {
            panic!("schema must not be consulted")
        };
        let attr = AttributeName::parse("doc.creationDate", false).unwrap();
        assert_eq!(resolve_type(&schema, &patient(), &attr), Some(ValueType::Date));
    }

    #[test]
    fn test_resolve_type_of_subterm_search_uses_declared_name() {
        let schema = StaticSchema::new().with_attribute(
            "PhenoTips.PatientClass",
            "phenotype",
            ValueType::RelationalList,
        );
        let attr = AttributeName::parse("phenotype", true).unwrap();
        assert_eq!(
            resolve_type(&schema, &patient(), &attr),
            Some(ValueType::RelationalList)
        );
    }

    #[test]
    fn test_memoized_schema_asks_once() {
        let calls = Cell::new(0);
        let counting = |_: &EntityKind, _: &AttributeName| {
            calls.set(calls.get() + 1);
            Some(ValueType::Integer)
        };
        let memo = MemoizedSchema::new(&counting);
        let attr = AttributeName::parse("age", false).unwrap();

        assert_eq!(memo.attribute_type(&patient(), &attr), Some(ValueType::Integer));
        assert_eq!(memo.attribute_type(&patient(), &attr), Some(ValueType::Integer));
        assert_eq!(calls.get(), 1);
    }
}

//! Builds typed predicates from filter rows.

use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::ast::{FilterSpec, NodeKind};
use crate::config::CompilerConfig;
use crate::error::CompileError;
use crate::identifier::{AttributeName, EntityKind};
use crate::schema::{resolve_type, SchemaLookup, ValueType};

use super::{
    literal_text, BooleanFilter, CrossReference, DateFilter, ListFilter, ListStorage,
    NumberFilter, Operand, OrderFilter, Predicate, ReferenceFilter, Strategy, StringFilter,
};

/// Back-references point at the direct parent unless told otherwise.
const DEFAULT_REFERENCE_LEVEL: usize = 1;
/// Cross references read from the predicate's own query unless told otherwise.
const DEFAULT_CROSS_REFERENCE_LEVEL: usize = 0;

pub struct FilterFactory;

impl FilterFactory {
    /// Turns one filter row into a predicate.
    ///
    /// Returns `Ok(None)` when the row names no class or attribute, when the
    /// attribute does not exist, or when the predicate has nothing to compare
    /// with. Blank identifiers and unknown `type`s are errors.
    pub fn create(
        spec: &FilterSpec,
        schema: &dyn SchemaLookup,
        config: &CompilerConfig,
        today: NaiveDate,
    ) -> Result<Option<Predicate>, CompileError> {
        let node_kind = match spec.kind.as_deref() {
            Some(raw) => match NodeKind::parse(raw) {
                Some(kind) => Some(kind),
                None => {
                    warn!(filter_type = raw, "unsupported filter type");
                    return Err(CompileError::UnsupportedType(raw.to_string()));
                }
            },
            None => None,
        };

        let (Some(class), Some(property)) = (spec.class.as_deref(), spec.property_name.as_deref())
        else {
            debug!("filter row without class or property_name, skipping");
            return Ok(None);
        };
        let entity_kind = EntityKind::parse(class, &config.default_namespace)?;
        let attribute = AttributeName::parse(property, spec.subterms)?;

        let Some(value_type) = resolve_type(schema, &entity_kind, &attribute) else {
            debug!(class = %entity_kind, attribute = %attribute, "unknown attribute, skipping");
            return Ok(None);
        };

        let strategy = match node_kind {
            Some(NodeKind::Order) => Strategy::Order(OrderFilter::new(spec.order.unwrap_or_default())),
            Some(NodeKind::Reference) => {
                let reference =
                    ReferenceFilter::new(spec.parent_level.unwrap_or(DEFAULT_REFERENCE_LEVEL));
                if attribute.is_system_attribute() {
                    Strategy::SystemReference(reference)
                } else {
                    Strategy::Reference(reference)
                }
            }
            _ => Self::value_strategy(spec, &attribute, value_type, config, today),
        };

        let mut predicate = Predicate::new(entity_kind.clone(), attribute, value_type, strategy)
            .with_negate(spec.negate);

        let cross_references = Self::cross_references(spec, &entity_kind, schema, config)?;
        if !cross_references.is_empty() {
            predicate = predicate.with_operand(Operand::Column(cross_references));
        }

        if !predicate.is_valid() {
            debug!(
                class = %predicate.entity_kind(),
                attribute = %predicate.attribute(),
                "predicate has nothing to compare with, skipping"
            );
            return Ok(None);
        }
        Ok(Some(predicate))
    }

    fn value_strategy(
        spec: &FilterSpec,
        attribute: &AttributeName,
        value_type: ValueType,
        config: &CompilerConfig,
        today: NaiveDate,
    ) -> Strategy {
        let texts = || spec.values.iter().filter_map(literal_text).collect::<Vec<_>>();
        let mode = spec.match_mode.unwrap_or_default();

        match value_type {
            ValueType::Integer | ValueType::Long | ValueType::Float | ValueType::Double => {
                Strategy::Number(NumberFilter::from_spec(spec, value_type))
            }
            ValueType::Date => Strategy::Date(DateFilter::from_spec(spec, false, today)),
            ValueType::EncryptedDate => Strategy::Date(DateFilter::from_spec(spec, true, today)),
            ValueType::Boolean => Strategy::Boolean(BooleanFilter::from_spec(spec)),
            ValueType::SingleList => {
                Strategy::List(ListFilter::from_spec(spec, ListStorage::Single, attribute.name()))
            }
            ValueType::MultiList => {
                Strategy::List(ListFilter::from_spec(spec, ListStorage::Flat, attribute.name()))
            }
            ValueType::RelationalList => Strategy::List(ListFilter::from_spec(
                spec,
                ListStorage::Relational,
                attribute.name(),
            )),
            ValueType::User if attribute.is_system_attribute() => Strategy::String(
                StringFilter::new(texts(), mode, true, Some(config.user_prefix.clone())),
            ),
            ValueType::TextArea | ValueType::User | ValueType::Group => {
                Strategy::String(StringFilter::new(texts(), mode, true, None))
            }
            ValueType::String => Strategy::String(StringFilter::new(texts(), mode, false, None)),
        }
    }

    /// Resolves `ref_values`. Entries without an attribute, or naming one that
    /// does not exist, are skipped.
    fn cross_references(
        spec: &FilterSpec,
        own_kind: &EntityKind,
        schema: &dyn SchemaLookup,
        config: &CompilerConfig,
    ) -> Result<Vec<CrossReference>, CompileError> {
        let mut references = Vec::with_capacity(spec.ref_values.len());
        for entry in &spec.ref_values {
            let Some(property) = entry.property_name.as_deref() else {
                continue;
            };
            let entity_kind = match entry.class.as_deref() {
                Some(class) => EntityKind::parse(class, &config.default_namespace)?,
                None => own_kind.clone(),
            };
            let attribute = AttributeName::parse(property, entry.subterms)?;
            let Some(value_type) = resolve_type(schema, &entity_kind, &attribute) else {
                debug!(class = %entity_kind, attribute = %attribute, "unknown cross reference, skipping");
                continue;
            };
            references.push(CrossReference::new(
                entity_kind,
                attribute,
                value_type,
                entry.parent_level.unwrap_or(DEFAULT_CROSS_REFERENCE_LEVEL),
            ));
        }
        Ok(references)
    }
}

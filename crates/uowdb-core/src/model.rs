use crate::value::Value;

///
/// EntityModel
/// Minimal runtime model for one entity, written by hand where the
/// schema is declared.
///

pub struct EntityModel {
    /// Fully-qualified Rust type path (for dispatch and diagnostics).
    pub path: &'static str,
    /// Stable external name used in diagnostics.
    pub entity_name: &'static str,
    /// Primary key name. The key itself lives outside the attribute map
    /// and is allocated by the engine when absent at flush.
    pub primary_key: &'static str,
    /// Ordered attribute list (authoritative for validation and planning).
    pub fields: &'static [FieldModel],
}

impl EntityModel {
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&'static FieldModel> {
        self.fields.iter().find(|field| field.name == name)
    }

    #[must_use]
    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }
}

///
/// FieldModel
/// Runtime attribute metadata used by validation and predicates.
///

pub struct FieldModel {
    /// Attribute name as used in predicates and rows.
    pub name: &'static str,
    /// Runtime type shape, aligned with `Value` variants.
    pub kind: FieldKind,
}

///
/// FieldKind
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FieldKind {
    Int,
    Text,
    Decimal,
    Date,
}

impl FieldKind {
    #[must_use]
    pub const fn matches(self, value: &Value) -> bool {
        matches!(
            (self, value),
            (Self::Int, Value::Int(_))
                | (Self::Text, Value::Text(_))
                | (Self::Decimal, Value::Decimal(_))
                | (Self::Date, Value::Date(_))
        )
    }
}

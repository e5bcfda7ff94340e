use crate::{error::ModelError, model::EntityModel, value::Value};
use derive_more::{Deref, DerefMut};
use serde::Serialize;
use std::collections::BTreeMap;

///
/// Row
///
/// Committed attribute values for one entity, keyed by model field name.
/// Absent and explicitly-null fields both read back as None.
///

#[derive(Clone, Debug, Default, Deref, DerefMut, PartialEq, Serialize)]
pub struct Row(BTreeMap<&'static str, Option<Value>>);

impl Row {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn value(&self, field: &str) -> Option<Value> {
        self.0.get(field).cloned().flatten()
    }

    pub fn set(&mut self, field: &'static str, value: Option<Value>) {
        self.0.insert(field, value);
    }

    /// Validate field names and value kinds against the model.
    pub fn validate(&self, model: &EntityModel) -> Result<(), ModelError> {
        for (name, value) in &self.0 {
            let Some(field) = model.field(name) else {
                return Err(ModelError::UnknownField {
                    path: model.path,
                    field: (*name).to_string(),
                });
            };

            if let Some(value) = value
                && !field.kind.matches(value)
            {
                return Err(ModelError::KindMismatch {
                    path: model.path,
                    field: field.name,
                });
            }
        }

        Ok(())
    }
}

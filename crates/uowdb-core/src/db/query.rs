use crate::{
    db::{instance::Instance, session::Session},
    error::{Error, ModelError},
    model::{EntityModel, FieldKind},
    traits::EntityKind,
    types::Key,
    value::Value,
};
use std::marker::PhantomData;

///
/// Predicate
///

#[derive(Clone, Debug)]
pub(crate) enum Predicate {
    KeyEq { key: Key },
    Eq { field: &'static str, value: Value },
    StartsWith { field: &'static str, prefix: String },
}

impl Predicate {
    pub(crate) fn validate(&self, model: &EntityModel) -> Result<(), ModelError> {
        match self {
            Self::KeyEq { .. } => Ok(()),
            Self::Eq { field, value } => {
                let field_model = model.field(field).ok_or(ModelError::UnknownField {
                    path: model.path,
                    field: (*field).to_string(),
                })?;
                if field_model.kind.matches(value) {
                    Ok(())
                } else {
                    Err(ModelError::KindMismatch {
                        path: model.path,
                        field: field_model.name,
                    })
                }
            }
            Self::StartsWith { field, .. } => {
                let field_model = model.field(field).ok_or(ModelError::UnknownField {
                    path: model.path,
                    field: (*field).to_string(),
                })?;
                if field_model.kind == FieldKind::Text {
                    Ok(())
                } else {
                    Err(ModelError::KindMismatch {
                        path: model.path,
                        field: field_model.name,
                    })
                }
            }
        }
    }

    /// Evaluate against one effective row view. Null attributes never
    /// match an equality or prefix predicate.
    pub(crate) fn matches(
        &self,
        key: Option<Key>,
        view: &dyn Fn(&str) -> Option<Value>,
    ) -> bool {
        match self {
            Self::KeyEq { key: expected } => key == Some(*expected),
            Self::Eq { field, value } => view(field).as_ref() == Some(value),
            Self::StartsWith { field, prefix } => {
                view(field).is_some_and(|value| value.starts_with_text(prefix))
            }
        }
    }
}

///
/// Query
///
/// Fluent filter surface over one entity. Rows pending in the same
/// session are visible; other sessions see only committed state.
///

pub struct Query<'a, E: EntityKind> {
    session: &'a mut Session,
    predicates: Vec<Predicate>,
    _marker: PhantomData<E>,
}

impl<'a, E: EntityKind> Query<'a, E> {
    pub(crate) const fn new(session: &'a mut Session) -> Self {
        Self {
            session,
            predicates: Vec::new(),
            _marker: PhantomData,
        }
    }

    #[must_use]
    pub fn filter_key(mut self, key: impl Into<Key>) -> Self {
        self.predicates.push(Predicate::KeyEq { key: key.into() });
        self
    }

    #[must_use]
    pub fn filter_eq(mut self, field: &'static str, value: impl Into<Value>) -> Self {
        self.predicates.push(Predicate::Eq {
            field,
            value: value.into(),
        });
        self
    }

    #[must_use]
    pub fn filter_starts_with(mut self, field: &'static str, prefix: impl Into<String>) -> Self {
        self.predicates.push(Predicate::StartsWith {
            field,
            prefix: prefix.into(),
        });
        self
    }

    /// Matching instances in key order (keyless pending rows last).
    pub fn all(self) -> Result<Vec<Instance<E>>, Error> {
        self.session.execute_query(&self.predicates)
    }

    pub fn first(self) -> Result<Option<Instance<E>>, Error> {
        Ok(self.all()?.into_iter().next())
    }

    pub fn count(self) -> Result<usize, Error> {
        Ok(self.all()?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{Movie, movie_engine};

    #[test]
    fn unknown_predicate_field_fails_at_the_terminal() {
        let engine = movie_engine();
        let mut session = engine.session().expect("session");

        let err = session
            .query::<Movie>()
            .filter_eq("director", "anyone")
            .all()
            .expect_err("unknown field");
        assert!(matches!(
            err,
            Error::Model(ModelError::UnknownField { .. })
        ));
        session.close();
    }

    #[test]
    fn prefix_predicate_requires_a_text_field() {
        let engine = movie_engine();
        let mut session = engine.session().expect("session");

        let err = session
            .query::<Movie>()
            .filter_starts_with("budget", "1")
            .all()
            .expect_err("non-text prefix");
        assert!(matches!(
            err,
            Error::Model(ModelError::KindMismatch { field: "budget", .. })
        ));
        session.close();
    }

    #[test]
    fn null_attributes_never_match_equality() {
        let view = |_: &str| None;
        let predicate = Predicate::Eq {
            field: "title",
            value: Value::from("Test Movie"),
        };

        assert!(!predicate.matches(Some(Key::new(1)), &view));
    }
}

//! Field reference resolution.

use super::error::ValidationError;
use super::expr::Expression;
use super::types::FieldRef;
use crate::model::{FieldHandle, ModelHandle, ModelRegistry, OrderHandle};

/// What a field reference resolved to.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    /// A bare name: the whole model.
    Model(ModelHandle),
    /// `Model.field`.
    Field(FieldHandle),
    /// `+Model.field` or `-Model.field`.
    Ordered(OrderHandle),
}

/// Parse and resolve a reference string.
pub fn resolve(models: &dyn ModelRegistry, reference: &str) -> Result<Resolved, ValidationError> {
    resolve_ref(models, &FieldRef::parse(reference)?)
}

/// Resolve an already-parsed reference.
pub fn resolve_ref(
    models: &dyn ModelRegistry,
    reference: &FieldRef,
) -> Result<Resolved, ValidationError> {
    match reference {
        FieldRef::Bare(name) => Ok(Resolved::Model(models.resolve_model(name)?)),
        FieldRef::Qualified {
            direction,
            model,
            field,
        } => {
            let model = models.resolve_model(model)?;
            let field = models.resolve_field(&model, field)?;
            match direction {
                Some(direction) => Ok(Resolved::Ordered(models.order(field, *direction)?)),
                None => Ok(Resolved::Field(field)),
            }
        }
    }
}

impl From<Resolved> for Expression {
    fn from(resolved: Resolved) -> Self {
        match resolved {
            Resolved::Model(model) => Expression::entity(model),
            Resolved::Field(FieldHandle::Column { model, field }) => {
                Expression::column(&model, &field)
            }
            Resolved::Field(FieldHandle::Relationship {
                model,
                relationship,
            }) => Expression::relationship(model, relationship),
            Resolved::Ordered(handle) => Expression::ordered(handle),
        }
    }
}

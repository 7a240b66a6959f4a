//! Model handles and the registry the search compiler resolves against.
//!
//! The compiler never touches tables or columns by raw name: every
//! reference in a search request goes through [`ModelRegistry`], which
//! returns typed handles or a [`ValidationError`] naming the miss.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::search::ValidationError;

/// Ordering direction requested by a `+`/`-` marker on a field reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    /// Parse a leading direction marker.
    pub fn from_marker(marker: char) -> Option<Self> {
        match marker {
            '+' => Some(Self::Asc),
            '-' => Some(Self::Desc),
            _ => None,
        }
    }
}

/// Cardinality of a relationship, seen from its owning model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationshipKind {
    /// Scalar reference (many-to-one / one-to-one).
    One,
    /// Collection (one-to-many).
    #[default]
    Many,
}

/// A plain column exposed under a field name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub column: String,
}

/// A relationship from one model to another.
///
/// `local` is a column of the owning model, `remote` a column of `target`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelationshipDescriptor {
    pub name: String,
    pub target: String,
    pub local: String,
    pub remote: String,
    pub kind: RelationshipKind,
}

/// Everything the compiler knows about one model.
#[derive(Debug, Clone, Serialize)]
pub struct ModelDescriptor {
    pub name: String,
    pub table: String,
    pub fields: Vec<FieldDescriptor>,
    pub relationships: Vec<RelationshipDescriptor>,
}

/// Cheaply clonable handle to a registered model.
#[derive(Debug, Clone)]
pub struct ModelHandle(Arc<ModelDescriptor>);

impl ModelHandle {
    pub fn new(descriptor: ModelDescriptor) -> Self {
        Self(Arc::new(descriptor))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn table(&self) -> &str {
        &self.0.table
    }

    pub fn descriptor(&self) -> &ModelDescriptor {
        &self.0
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.0.fields.iter().find(|f| f.name == name)
    }

    pub fn relationship(&self, name: &str) -> Option<&RelationshipDescriptor> {
        self.0.relationships.iter().find(|r| r.name == name)
    }

    /// Column name for a field name, if declared.
    pub fn column(&self, field: &str) -> Option<&str> {
        self.field(field).map(|f| f.column.as_str())
    }
}

impl PartialEq for ModelHandle {
    fn eq(&self, other: &Self) -> bool {
        self.0.name == other.0.name
    }
}

impl Eq for ModelHandle {}

/// A resolved `Model.field` reference.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldHandle {
    Column {
        model: ModelHandle,
        field: FieldDescriptor,
    },
    Relationship {
        model: ModelHandle,
        relationship: RelationshipDescriptor,
    },
}

impl FieldHandle {
    pub fn model(&self) -> &ModelHandle {
        match self {
            Self::Column { model, .. } | Self::Relationship { model, .. } => model,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Column { field, .. } => &field.name,
            Self::Relationship { relationship, .. } => &relationship.name,
        }
    }

    /// `Model.field` form, for error messages.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.model().name(), self.name())
    }
}

/// A column paired with an ordering direction.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderHandle {
    pub model: ModelHandle,
    pub field: FieldDescriptor,
    pub direction: Direction,
}

/// Lookup service mapping model and field names to typed handles.
pub trait ModelRegistry: Send + Sync {
    /// Find a model by name.
    fn resolve_model(&self, name: &str) -> Result<ModelHandle, ValidationError>;

    /// All registered models, in declaration order.
    fn models(&self) -> Vec<ModelHandle>;

    /// Find a field (column or relationship) on a resolved model.
    fn resolve_field(
        &self,
        model: &ModelHandle,
        name: &str,
    ) -> Result<FieldHandle, ValidationError> {
        if let Some(field) = model.field(name) {
            return Ok(FieldHandle::Column {
                model: model.clone(),
                field: field.clone(),
            });
        }
        if let Some(relationship) = model.relationship(name) {
            return Ok(FieldHandle::Relationship {
                model: model.clone(),
                relationship: relationship.clone(),
            });
        }
        Err(ValidationError::UnknownField {
            model: model.name().to_string(),
            field: name.to_string(),
        })
    }

    /// Attach a direction to a column. Relationships cannot be ordered.
    fn order(
        &self,
        field: FieldHandle,
        direction: Direction,
    ) -> Result<OrderHandle, ValidationError> {
        match field {
            FieldHandle::Column { model, field } => Ok(OrderHandle {
                model,
                field,
                direction,
            }),
            FieldHandle::Relationship { .. } => Err(ValidationError::InvalidOperand {
                field: field.qualified_name(),
                reason: "a relationship cannot be ordered".to_string(),
            }),
        }
    }
}

/// In-memory registry built from model declarations.
#[derive(Debug, Default, Clone)]
pub struct SchemaRegistry {
    models: HashMap<String, ModelHandle>,
    declared: Vec<String>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a model. Returns `false` if the name was already taken.
    pub fn insert(&mut self, descriptor: ModelDescriptor) -> bool {
        if self.models.contains_key(&descriptor.name) {
            return false;
        }
        self.declared.push(descriptor.name.clone());
        self.models
            .insert(descriptor.name.clone(), ModelHandle::new(descriptor));
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

impl ModelRegistry for SchemaRegistry {
    fn resolve_model(&self, name: &str) -> Result<ModelHandle, ValidationError> {
        self.models
            .get(name)
            .cloned()
            .ok_or_else(|| ValidationError::UnknownModel(name.to_string()))
    }

    fn models(&self) -> Vec<ModelHandle> {
        self.declared
            .iter()
            .filter_map(|name| self.models.get(name).cloned())
            .collect()
    }
}

//! YAML model declarations.
//!
//! Models are not defined by the search compiler; they are declared in a
//! YAML file loaded once at startup and turned into a [`SchemaRegistry`].
//!
//! ```yaml
//! models:
//!   - name: User
//!     table: users
//!     fields: [id, name, { name: createdAt, column: created_at }]
//!     relationships:
//!       - { name: orders, target: Order, local: id, remote: user_id, kind: many }
//! ```

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use super::registry::{
    FieldDescriptor, ModelDescriptor, ModelRegistry, RelationshipDescriptor, RelationshipKind,
    SchemaRegistry,
};

/// Maximum declaration file size (1 MB).
const MAX_MODELS_FILE_SIZE: u64 = 1024 * 1024;

/// Errors raised while loading model declarations, each naming the
/// model and member at fault.
#[derive(Debug, Error)]
pub enum DeclarationError {
    #[error("failed to read models file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("models file {path} is larger than {MAX_MODELS_FILE_SIZE} bytes")]
    TooLarge { path: String },

    #[error("failed to parse model declarations: {0}")]
    Parse(#[from] serde_yml::Error),

    #[error("model '{0}' is declared more than once")]
    DuplicateModel(String),

    #[error("model '{model}': '{member}' is declared more than once")]
    DuplicateMember { model: String, member: String },

    #[error("model '{model}': {what} must not be empty")]
    Empty { model: String, what: &'static str },

    #[error("model '{model}': relationship '{relationship}' targets unknown model '{target}'")]
    UnknownTarget {
        model: String,
        relationship: String,
        target: String,
    },

    #[error("model '{model}': relationship '{relationship}' uses unknown column '{column}'")]
    UnknownColumn {
        model: String,
        relationship: String,
        column: String,
    },
}

/// Top-level document.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelsFile {
    pub models: Vec<ModelDeclaration>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelDeclaration {
    pub name: String,
    /// Defaults to the lowercased model name.
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldDeclaration>,
    #[serde(default)]
    pub relationships: Vec<RelationshipDeclaration>,
}

/// A field is either a bare name (column of the same name) or a mapping.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum FieldDeclaration {
    Name(String),
    Mapped { name: String, column: String },
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelationshipDeclaration {
    pub name: String,
    pub target: String,
    pub local: String,
    pub remote: String,
    #[serde(default)]
    pub kind: RelationshipKind,
}

impl FieldDeclaration {
    fn into_descriptor(self) -> FieldDescriptor {
        match self {
            Self::Name(name) => FieldDescriptor {
                column: name.clone(),
                name,
            },
            Self::Mapped { name, column } => FieldDescriptor { name, column },
        }
    }
}

impl SchemaRegistry {
    /// Parse a YAML declaration document.
    pub fn from_yaml(source: &str) -> Result<Self, DeclarationError> {
        let file: ModelsFile = serde_yml::from_str(source)?;
        Self::from_declarations(file)
    }

    /// Read and parse a YAML declaration file.
    pub fn load(path: &Path) -> Result<Self, DeclarationError> {
        let display = path.display().to_string();
        let metadata = std::fs::metadata(path).map_err(|source| DeclarationError::Io {
            path: display.clone(),
            source,
        })?;
        if metadata.len() > MAX_MODELS_FILE_SIZE {
            return Err(DeclarationError::TooLarge { path: display });
        }
        let source = std::fs::read_to_string(path).map_err(|source| DeclarationError::Io {
            path: display.clone(),
            source,
        })?;
        Self::from_yaml(&source)
    }

    /// Build a registry, checking names and relationship endpoints.
    pub fn from_declarations(file: ModelsFile) -> Result<Self, DeclarationError> {
        let mut descriptors = Vec::with_capacity(file.models.len());

        for declaration in file.models {
            let model = declaration.name;
            if model.is_empty() {
                return Err(DeclarationError::Empty {
                    model,
                    what: "name",
                });
            }
            let table = declaration
                .table
                .unwrap_or_else(|| model.to_lowercase());
            if table.is_empty() {
                return Err(DeclarationError::Empty {
                    model,
                    what: "table",
                });
            }

            let fields: Vec<FieldDescriptor> = declaration
                .fields
                .into_iter()
                .map(FieldDeclaration::into_descriptor)
                .collect();
            let relationships: Vec<RelationshipDescriptor> = declaration
                .relationships
                .into_iter()
                .map(|r| RelationshipDescriptor {
                    name: r.name,
                    target: r.target,
                    local: r.local,
                    remote: r.remote,
                    kind: r.kind,
                })
                .collect();

            let mut members = HashSet::new();
            let names = fields
                .iter()
                .map(|f| f.name.as_str())
                .chain(relationships.iter().map(|r| r.name.as_str()));
            for name in names {
                if name.is_empty() {
                    return Err(DeclarationError::Empty {
                        model,
                        what: "field name",
                    });
                }
                if !members.insert(name.to_string()) {
                    return Err(DeclarationError::DuplicateMember {
                        model,
                        member: name.to_string(),
                    });
                }
            }

            descriptors.push(ModelDescriptor {
                name: model,
                table,
                fields,
                relationships,
            });
        }

        check_relationships(&descriptors)?;

        let mut registry = SchemaRegistry::new();
        for descriptor in descriptors {
            let name = descriptor.name.clone();
            if !registry.insert(descriptor) {
                return Err(DeclarationError::DuplicateModel(name));
            }
        }

        debug!(models = registry.len(), "model declarations loaded");
        Ok(registry)
    }

    /// Models as a serializable listing, for the models endpoint and CLI.
    pub fn describe(&self) -> Vec<ModelDescriptor> {
        self.models()
            .iter()
            .map(|m| m.descriptor().clone())
            .collect()
    }
}

fn check_relationships(descriptors: &[ModelDescriptor]) -> Result<(), DeclarationError> {
    let has_column = |model: &ModelDescriptor, column: &str| {
        model.fields.iter().any(|f| f.column == column)
    };

    for model in descriptors {
        for relationship in &model.relationships {
            let Some(target) = descriptors.iter().find(|d| d.name == relationship.target) else {
                return Err(DeclarationError::UnknownTarget {
                    model: model.name.clone(),
                    relationship: relationship.name.clone(),
                    target: relationship.target.clone(),
                });
            };
            if !has_column(model, &relationship.local) {
                return Err(DeclarationError::UnknownColumn {
                    model: model.name.clone(),
                    relationship: relationship.name.clone(),
                    column: relationship.local.clone(),
                });
            }
            if !has_column(target, &relationship.remote) {
                return Err(DeclarationError::UnknownColumn {
                    model: target.name.clone(),
                    relationship: relationship.name.clone(),
                    column: relationship.remote.clone(),
                });
            }
        }
    }
    Ok(())
}

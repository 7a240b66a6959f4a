//! Model registry.
//!
//! Declared models, their columns and relationships, and the lookup
//! interface the search compiler resolves field references against.

mod declaration;
mod registry;

pub use declaration::{
    DeclarationError, FieldDeclaration, ModelDeclaration, ModelsFile, RelationshipDeclaration,
};
pub use registry::{
    Direction, FieldDescriptor, FieldHandle, ModelDescriptor, ModelHandle, ModelRegistry,
    OrderHandle, RelationshipDescriptor, RelationshipKind, SchemaRegistry,
};

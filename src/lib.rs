//! crudgen library
//!
//! This crate provides the code generation logic for turning CRUD
//! instruction sequences (produced by a SQL dialect from protobuf-derived
//! type descriptors) into a Go source module implementing the
//! create/read/update/delete operations.

#![deny(warnings)]
#![deny(missing_docs)]

pub mod ast;
pub mod codegen;
pub mod gotype;
pub mod input;
pub mod prerendered;
pub mod render;

use thiserror::Error;

/// Errors that can occur during code generation
#[derive(Error, Debug)]
pub enum GeneratorError {
    /// A type named in the `crud` input is missing from `types`
    #[error("The type {0} is named in the crud input but is not among the type descriptors")]
    UnknownType(String),

    /// CRUD operations were requested for an enum type
    #[error("CRUD operations were requested for {0}, which is an enum, not a message")]
    NotAMessage(String),

    /// A message type's declared ID field does not exist among its fields
    #[error("The message type {type_name} does not have its declared ID field {field}")]
    MissingIdField {
        /// Fully qualified name of the offending message type
        type_name: String,
        /// The declared ID field name
        field: String,
    },

    /// An instruction referenced a field that the message type lacks
    #[error("An instruction references field {field}, which does not exist on message type {type_name}")]
    UnknownField {
        /// Fully qualified name of the message type being compiled
        type_name: String,
        /// The nonexistent field name
        field: String,
    },

    /// A type descriptor has no source file recorded
    #[error("The type {0} has no source file recorded, so its package cannot be determined")]
    MissingFile(String),

    /// A file's options lack the Go package qualification option
    #[error("The file {0} has no goPackage option, so generated references to its types cannot be qualified")]
    MissingPackageOption(String),

    /// A delete instruction sequence queried field inclusion
    #[error("A delete operation queried whether field {0} is included; deletes operate on the ID alone")]
    InclusionInDelete(String),

    /// An exec-with-tuples instruction has the wrong number of array-valued parameters
    #[error("An exec-with-tuples instruction must have exactly one array- or field-mask-valued parameter, but {0} were found")]
    MultiplicityCount(usize),

    /// An exec-with-tuples instruction has a non-field parameter
    #[error("An exec-with-tuples instruction referenced the inclusion of field {0}; its parameters must all be field references")]
    TupleParameterKind(String),

    /// A read-array destination field is neither array- nor field-mask-typed
    #[error("A read-array destination must be an array or field mask, but field {field} of {type_name} is neither")]
    ReadArrayDestination {
        /// Fully qualified name of the message type being compiled
        type_name: String,
        /// The offending destination field name
        field: String,
    },

    /// Two sources disagree about the alias of the same Go import path
    #[error("There is a package alias name conflict for the package {package}: it is already imported as {existing:?}, but {requested:?} was requested")]
    ImportAliasConflict {
        /// The Go import path in question
        package: String,
        /// The alias already recorded for the path, if any
        existing: Option<String>,
        /// The conflicting alias requested later, if any
        requested: Option<String>,
    },

    /// The Go AST failed its shape validation before rendering
    #[error("Malformed Go AST: {0}")]
    MalformedAst(String),
}

/// Generate a Go CRUD module from the specified input document.
///
/// This is the main entry point for the code generator. The returned
/// string is the text of a complete Go source file.
pub fn generate(input: &input::Input) -> Result<String, GeneratorError> {
    codegen::generate(input)
}

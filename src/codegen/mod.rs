//! Code generation modules
//!
//! This module assembles the output file: four CRUD functions per message
//! type, the imports their signatures need, the helper declarations
//! pulled in by the closure pass, and finally the rendered text.

pub mod crud;
pub mod instruction;
pub mod ledger;

use crate::ast::{Declaration, GoFile};
use crate::gotype::PackageAliases;
use crate::input::{Input, TypeDescriptor};
use crate::{prerendered, render, GeneratorError};
use std::collections::BTreeMap;

const FILE_DOCUMENTATION: &str = "Package crud provides create/read/update/delete (CRUD) database operations\n\
     for protocol buffer message types.\n\
     \n\
     This file is generated code. Please do not modify it by hand.";

/// Generate the text of a Go CRUD module from the input document.
///
/// Message types are emitted in sorted order of their fully qualified
/// names; each contributes a Create, Read, Update, and Delete function.
/// Generation is deterministic: the same input always yields
/// byte-identical output.
pub fn generate(input: &Input) -> Result<String, GeneratorError> {
    input.validate()?;

    let mut aliases = PackageAliases::new(&input.types, &input.options);
    let mut declarations = Vec::new();

    for (type_name, operations) in &input.crud {
        let message = match input.types.iter().find(|t| t.name() == type_name) {
            Some(TypeDescriptor::Message(message)) => message,
            Some(TypeDescriptor::Enum(_)) => {
                return Err(GeneratorError::NotAMessage(type_name.clone()))
            }
            None => return Err(GeneratorError::UnknownType(type_name.clone())),
        };

        declarations.push(Declaration::Function(crud::create_function(
            message,
            &operations.create,
            &mut aliases,
        )?));
        declarations.push(Declaration::Function(crud::read_function(
            message,
            &operations.read,
            &mut aliases,
        )?));
        declarations.push(Declaration::Function(crud::update_function(
            message,
            &operations.update,
            &mut aliases,
        )?));
        declarations.push(Declaration::Function(crud::delete_function(
            message,
            &operations.delete,
            &mut aliases,
        )?));
    }

    // Imports referenced by every function signature, plus one aliased
    // import per distinct Go package of generated protobuf code.
    let mut imports: BTreeMap<String, Option<String>> = BTreeMap::new();
    imports.insert("context".to_owned(), None);
    imports.insert("database/sql".to_owned(), None);
    for (package, alias) in aliases.snapshot() {
        imports.insert(package.clone(), Some(alias.clone()));
    }

    let mut file = GoFile {
        documentation: Some(FILE_DOCUMENTATION.to_owned()),
        package: "crud".to_owned(),
        imports,
        declarations,
    };

    prerendered::include_prerendered(&mut file)?;
    prerendered::include_standard_imports(&mut file)?;

    render::render_file(&file)
}

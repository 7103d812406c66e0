//! Go type mapping and package aliasing
//!
//! Deterministic mapping from the schema's abstract field types to Go
//! type names, plus the stateful aliasing scheme that disambiguates
//! same-named types from different packages. The first Go package
//! encountered is aliased `pb`, the second distinct one `pb2`, and so on
//! in first-use order; re-querying an already-seen type always returns
//! the same alias.

use crate::input::{Builtin, ElementType, FieldType, FileOptions, TypeDescriptor};
use crate::GeneratorError;
use heck::ToUpperCamelCase;
use indexmap::IndexMap;
use std::collections::BTreeMap;

/// The Go spelling of a builtin type. Scalars map to native types;
/// well-known message types map to pointers to their generated structs.
pub fn builtin_go_type(builtin: Builtin) -> &'static str {
    match builtin {
        Builtin::Double => "float64",
        Builtin::Float => "float32",
        Builtin::Int64 => "int64",
        Builtin::Uint64 => "uint64",
        Builtin::Int32 => "int32",
        Builtin::Uint32 => "uint32",
        Builtin::Bool => "bool",
        Builtin::String => "string",
        Builtin::Bytes => "[]byte",
        Builtin::Timestamp => "*timestamp.Timestamp",
        Builtin::Date => "*date.Date",
        Builtin::FieldMask => "*field_mask.FieldMask",
    }
}

/// The Go struct field name generated for a protobuf field name. The
/// protobuf convention is lower_snake_case (not enforced), while the
/// generated Go code uses TitleCamelCase.
pub fn field_to_go(proto_field_name: &str) -> String {
    proto_field_name.to_upper_camel_case()
}

/// The Go type name generated for a protobuf message or enum name. The
/// input is fully qualified (e.g. `.scouts.BoyScout`); only the basename
/// contributes.
pub fn type_basename_to_go(type_name: &str) -> String {
    let basename = type_name.rsplit('.').next().unwrap_or(type_name);
    basename.to_upper_camel_case()
}

/// Assigns Go package aliases to type names, lazily and in first-use
/// order. Also resolves a type name to its Go import path via the type's
/// source file and that file's `goPackage` option.
pub struct PackageAliases<'a> {
    types: BTreeMap<&'a str, &'a TypeDescriptor>,
    options: &'a BTreeMap<String, FileOptions>,
    assigned: IndexMap<String, String>,
}

impl<'a> PackageAliases<'a> {
    /// Create an alias registry over the specified type descriptors and
    /// per-file options.
    pub fn new(
        types: &'a [TypeDescriptor],
        options: &'a BTreeMap<String, FileOptions>,
    ) -> Self {
        PackageAliases {
            types: types
                .iter()
                .map(|descriptor| (descriptor.name(), descriptor))
                .collect(),
            options,
            assigned: IndexMap::new(),
        }
    }

    /// The alias of the Go package that the specified type's generated
    /// code lives in, assigning a fresh alias if the package has not been
    /// seen before. Assignment order is "first call wins," not sorted.
    pub fn lookup(&mut self, type_name: &str) -> Result<String, GeneratorError> {
        let descriptor = self
            .types
            .get(type_name)
            .ok_or_else(|| GeneratorError::UnknownType(type_name.to_owned()))?;
        let file = descriptor
            .file()
            .ok_or_else(|| GeneratorError::MissingFile(type_name.to_owned()))?;
        let go_package = self
            .options
            .get(file)
            .and_then(|options| options.go_package.as_deref())
            .ok_or_else(|| GeneratorError::MissingPackageOption(file.to_owned()))?;

        if let Some(alias) = self.assigned.get(go_package) {
            return Ok(alias.clone());
        }

        let alias = if self.assigned.is_empty() {
            "pb".to_owned()
        } else {
            format!("pb{}", self.assigned.len() + 1)
        };
        self.assigned.insert(go_package.to_owned(), alias.clone());
        Ok(alias)
    }

    /// All aliases assigned so far: Go import path → alias, in
    /// assignment order. Used to emit the file's aliased imports.
    pub fn snapshot(&self) -> &IndexMap<String, String> {
        &self.assigned
    }
}

/// The package-qualified Go type name of a message or enum, e.g.
/// `pb.BoyScout`.
pub fn qualified_type_name(
    type_name: &str,
    aliases: &mut PackageAliases,
) -> Result<String, GeneratorError> {
    let alias = aliases.lookup(type_name)?;
    Ok(format!("{}.{}", alias, type_basename_to_go(type_name)))
}

/// The Go spelling of a field type. Arrays render as slices of their
/// element's rendering.
pub fn type_to_go(
    field_type: &FieldType,
    aliases: &mut PackageAliases,
) -> Result<String, GeneratorError> {
    match field_type {
        FieldType::Builtin { builtin } => Ok(builtin_go_type(*builtin).to_owned()),
        FieldType::Enum { name } => qualified_type_name(name, aliases),
        FieldType::Array { array } => Ok(format!("[]{}", element_to_go(array, aliases)?)),
    }
}

/// The Go spelling of an array element type.
pub fn element_to_go(
    element: &ElementType,
    aliases: &mut PackageAliases,
) -> Result<String, GeneratorError> {
    match element {
        ElementType::Builtin { builtin } => Ok(builtin_go_type(*builtin).to_owned()),
        ElementType::Enum { name } => qualified_type_name(name, aliases),
    }
}

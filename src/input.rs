//! Input document model
//!
//! This module defines the serde model for the JSON document that drives
//! generation: `{crud, types, options}`. The `crud` member is produced by
//! a SQL dialect (instruction sequences per message type), `types` holds
//! the protobuf-derived type descriptors, and `options` holds per-file
//! protobuf options, of which `goPackage` is the one we need.
//!
//! The shapes here deliberately make malformed documents unrepresentable:
//! unknown instruction names, unknown builtin type names, and nested
//! arrays are all rejected by deserialization. The residual invariants
//! that serde cannot express are checked by [`Input::validate`].

use crate::GeneratorError;
use serde::Deserialize;
use std::collections::BTreeMap;

/// The complete input document for one generation run.
#[derive(Debug, Clone, Deserialize)]
pub struct Input {
    /// CRUD instruction sequences, keyed by fully qualified message type
    /// name. A `BTreeMap` keeps generation order independent of JSON key
    /// order.
    pub crud: BTreeMap<String, CrudOperations>,

    /// Descriptors for every type involved: the message types named in
    /// `crud` plus any enum types their fields reference.
    pub types: Vec<TypeDescriptor>,

    /// Protobuf file options, keyed by `.proto` file path.
    pub options: BTreeMap<String, FileOptions>,
}

/// The four instruction sequences of one message type.
#[derive(Debug, Clone, Deserialize)]
pub struct CrudOperations {
    /// Instructions that add a new instance to the database.
    pub create: Vec<Instruction>,
    /// Instructions that read an instance by its ID.
    pub read: Vec<Instruction>,
    /// Instructions that update a subset of an instance's fields.
    pub update: Vec<Instruction>,
    /// Instructions that remove an instance by its ID.
    pub delete: Vec<Instruction>,
}

/// One atomic unit of database interaction in the language-agnostic
/// intermediate representation. The SQL text is opaque to this crate; the
/// dialect that produced the instruction already rendered it.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "instruction", rename_all = "kebab-case")]
pub enum Instruction {
    /// Read-only SQL query.
    Query {
        /// The SQL statement to execute.
        sql: String,
        /// Input parameters bound to the statement's placeholders.
        parameters: Vec<InputParameter>,
    },

    /// Extract column values from the current result row, and advance to
    /// the next row.
    ReadRow {
        /// Where each column of the row lands.
        destinations: Vec<Destination>,
    },

    /// Extract the first column of all remaining rows, appending each
    /// value to the array-valued destination field.
    ReadArray {
        /// The array- or field-mask-valued field appended to.
        destination: OutputField,
    },

    /// Read/write SQL statement. Not expected to produce any rows.
    Exec {
        /// If present, the statement executes only when the named field
        /// is included in the operation.
        #[serde(default)]
        condition: Option<Condition>,
        /// The SQL statement to execute.
        sql: String,
        /// Input parameters bound to the statement's placeholders.
        parameters: Vec<InputParameter>,
    },

    /// Read/write SQL statement executed once for a whole batch of
    /// tuples, e.g. replacing the rows of an array table in one round
    /// trip. `sql` is the fixed prefix; at runtime it is followed by one
    /// copy of `tuple` per element of the single array-valued parameter.
    ExecWithTuples {
        /// If present, the statement executes only when the named field
        /// is included in the operation (and the array is nonempty).
        #[serde(default)]
        condition: Option<Condition>,
        /// The SQL fragment repeated once per array element.
        tuple: String,
        /// The fixed SQL prefix.
        sql: String,
        /// Input parameters; exactly one must reference an array- or
        /// field-mask-valued field.
        parameters: Vec<InputParameter>,
    },
}

/// An inclusion condition attached to an `exec` or `exec-with-tuples`
/// instruction.
#[derive(Debug, Clone, Deserialize)]
pub struct Condition {
    /// Name of the message field whose inclusion gates the statement.
    pub included: String,
}

/// An input parameter of a SQL statement: either the value of a message
/// field, or the boolean "is this field part of the operation."
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum InputParameter {
    /// The value of the named message field.
    Field {
        /// Protobuf field name as it appears in the `.proto` file.
        field: String,
    },
    /// Whether the named field is included in the current operation.
    Included {
        /// Protobuf field name whose inclusion is queried.
        included: String,
    },
}

/// An output destination of a `read-row` instruction.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Destination {
    /// Scan the column into the named message field.
    Field {
        /// Protobuf field name of the destination.
        field: String,
    },
    /// Scan the column into a discard sink. The dialect uses this for
    /// row-existence probes, where only "was there a row" matters.
    Ignore(IgnoreKeyword),
}

/// The literal string `"ignore"`; see [`Destination::Ignore`].
#[derive(Debug, Clone, Copy, Deserialize)]
pub enum IgnoreKeyword {
    /// The only value.
    #[serde(rename = "ignore")]
    Ignore,
}

/// The destination field of a `read-array` instruction.
#[derive(Debug, Clone, Deserialize)]
pub struct OutputField {
    /// Protobuf field name of the array- or field-mask-valued field.
    pub field: String,
}

/// A protobuf-derived type descriptor: either a message or an enum.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TypeDescriptor {
    /// A protobuf `message`.
    Message(MessageType),
    /// A protobuf `enum`.
    Enum(EnumType),
}

impl TypeDescriptor {
    /// Fully qualified name of the type, including the leading dot.
    pub fn name(&self) -> &str {
        match self {
            TypeDescriptor::Message(message) => &message.name,
            TypeDescriptor::Enum(enumeration) => &enumeration.name,
        }
    }

    /// Path to the `.proto` file where the type is defined, if recorded.
    pub fn file(&self) -> Option<&str> {
        match self {
            TypeDescriptor::Message(message) => message.file.as_deref(),
            TypeDescriptor::Enum(enumeration) => enumeration.file.as_deref(),
        }
    }
}

/// A protobuf message type.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageType {
    /// Path to the `.proto` file where this message is defined.
    #[serde(default)]
    pub file: Option<String>,
    /// Fully qualified type name, e.g. `.scouts.BoyScout`.
    pub name: String,
    /// Documentation derived from comments in the `.proto` file.
    #[serde(default)]
    pub description: Option<String>,
    /// Name of the field that identifies instances of this message.
    pub id_field_name: String,
    /// The message's fields, in declaration order.
    pub fields: Vec<Field>,
}

impl MessageType {
    /// Look up a field by its protobuf name.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|field| field.name == name)
    }
}

/// One field of a message type.
#[derive(Debug, Clone, Deserialize)]
pub struct Field {
    /// The field's protobuf tag number.
    pub id: i32,
    /// Protobuf field name as it appears in the `.proto` file.
    pub name: String,
    /// The field's type.
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Documentation derived from comments in the `.proto` file.
    #[serde(default)]
    pub description: Option<String>,
}

/// A protobuf enum type.
#[derive(Debug, Clone, Deserialize)]
pub struct EnumType {
    /// Path to the `.proto` file where this enum is defined.
    #[serde(default)]
    pub file: Option<String>,
    /// Fully qualified type name, e.g. `.scouts.Badge`.
    pub name: String,
    /// Documentation derived from comments in the `.proto` file.
    #[serde(default)]
    pub description: Option<String>,
    /// The enum's values.
    pub values: Vec<EnumValue>,
}

/// One value of an enum type.
#[derive(Debug, Clone, Deserialize)]
pub struct EnumValue {
    /// The value's protobuf number.
    pub id: i32,
    /// The value's name.
    pub name: String,
    /// Documentation derived from comments in the `.proto` file.
    #[serde(default)]
    pub description: Option<String>,
}

/// The type of a message field. Arrays do not nest and cannot contain
/// message types; both restrictions hold by construction.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum FieldType {
    /// A builtin scalar or well-known type.
    Builtin {
        /// Which builtin.
        builtin: Builtin,
    },
    /// A user-defined enum.
    Enum {
        /// Fully qualified enum type name.
        #[serde(rename = "enum")]
        name: String,
    },
    /// A repeated field of scalars or enums.
    Array {
        /// The element type.
        array: ElementType,
    },
}

impl FieldType {
    /// Whether this is the well-known FieldMask type.
    pub fn is_field_mask(&self) -> bool {
        matches!(
            self,
            FieldType::Builtin {
                builtin: Builtin::FieldMask
            }
        )
    }

    /// Whether values of this type have array-like multiplicity: a
    /// repeated field, or a FieldMask (a list of field paths).
    pub fn is_multiple(&self) -> bool {
        matches!(self, FieldType::Array { .. }) || self.is_field_mask()
    }
}

/// The element type of a repeated field.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ElementType {
    /// A builtin scalar or well-known type.
    Builtin {
        /// Which builtin.
        builtin: Builtin,
    },
    /// A user-defined enum.
    Enum {
        /// Fully qualified enum type name.
        #[serde(rename = "enum")]
        name: String,
    },
}

/// The closed set of builtin type names: a subset of the scalar type
/// names from `google/protobuf/descriptor.proto`, plus three well-known
/// message types that are treated as builtins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum Builtin {
    /// 64-bit floating point.
    #[serde(rename = "TYPE_DOUBLE")]
    Double,
    /// 32-bit floating point.
    #[serde(rename = "TYPE_FLOAT")]
    Float,
    /// 64-bit signed integer.
    #[serde(rename = "TYPE_INT64")]
    Int64,
    /// 64-bit unsigned integer.
    #[serde(rename = "TYPE_UINT64")]
    Uint64,
    /// 32-bit signed integer.
    #[serde(rename = "TYPE_INT32")]
    Int32,
    /// 32-bit unsigned integer.
    #[serde(rename = "TYPE_UINT32")]
    Uint32,
    /// Boolean.
    #[serde(rename = "TYPE_BOOL")]
    Bool,
    /// String.
    #[serde(rename = "TYPE_STRING")]
    String,
    /// Byte array.
    #[serde(rename = "TYPE_BYTES")]
    Bytes,
    /// `google.protobuf.Timestamp`, stored as microseconds since the
    /// Unix epoch.
    #[serde(rename = ".google.protobuf.Timestamp")]
    Timestamp,
    /// `google.type.Date`, stored as a `YYYY-MM-DD` string.
    #[serde(rename = ".google.type.Date")]
    Date,
    /// `google.protobuf.FieldMask`, stored like a repeated string.
    #[serde(rename = ".google.protobuf.FieldMask")]
    FieldMask,
}

/// Per-file protobuf options. Only `goPackage` is interpreted; everything
/// else is carried along untouched.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileOptions {
    /// The `go_package` option: the Go import path for code generated
    /// from this file.
    #[serde(default)]
    pub go_package: Option<String>,
    /// Any other file options, preserved verbatim.
    #[serde(flatten)]
    pub other: BTreeMap<String, serde_json::Value>,
}

impl Input {
    /// Check the invariants that the serde shapes cannot express: every
    /// type named in `crud` must exist in `types` and be a message, and
    /// every message's declared ID field must exist among its fields.
    pub fn validate(&self) -> Result<(), GeneratorError> {
        for descriptor in &self.types {
            if let TypeDescriptor::Message(message) = descriptor {
                if message.field(&message.id_field_name).is_none() {
                    return Err(GeneratorError::MissingIdField {
                        type_name: message.name.clone(),
                        field: message.id_field_name.clone(),
                    });
                }
            }
        }

        for type_name in self.crud.keys() {
            match self.types.iter().find(|t| t.name() == type_name) {
                None => return Err(GeneratorError::UnknownType(type_name.clone())),
                Some(TypeDescriptor::Enum(_)) => {
                    return Err(GeneratorError::NotAMessage(type_name.clone()))
                }
                Some(TypeDescriptor::Message(_)) => {}
            }
        }

        Ok(())
    }
}

//! Per-instruction compilation
//!
//! Each CRUD instruction translates to a short run of Go statements that
//! are expanded into the body of a CRUD function. All of the translations
//! assume that the following variables are in scope:
//!
//! - `message` is the protobuf message struct being read from or written
//!   to,
//! - `transaction` is the `sql.Tx` for the current database transaction,
//! - `ctx` is the cancellation context, and
//! - `err` is the `error` result variable.
//!
//! When an instruction encounters an error it assigns to `err` and
//! returns with a bare `return` statement; the enclosing function uses
//! named results, so `err` travels with it. That is the only
//! error-propagation idiom; the sole distinguished error kind at this
//! layer is `noRow()` for a failed single-row read.

use crate::ast::{Callback, Expression, Statement};
use crate::codegen::ledger::VariableLedger;
use crate::gotype::{element_to_go, field_to_go, type_basename_to_go, PackageAliases};
use crate::input::{
    Builtin, Destination, ElementType, FieldType, InputParameter, Instruction, MessageType,
};
use crate::GeneratorError;

/// How "is this field included in the operation" answers during
/// compilation of one CRUD function.
pub enum Inclusion {
    /// Inclusion is statically true (create and read touch every field).
    /// Conjunctions and conditional wrappers on inclusion are elided.
    Always,
    /// Inclusion is decided at runtime by the `included` closure built
    /// from the caller's field mask (update). Records whether any
    /// instruction actually asked, so the mask boilerplate is only
    /// emitted when referenced.
    FieldMask {
        /// Whether some instruction queried inclusion.
        referenced: bool,
    },
    /// Inclusion must never be queried (delete operates on the ID
    /// alone); a query is a contract violation by the dialect.
    Forbidden,
}

/// Everything one CRUD function's compilation needs: the message type,
/// the alias registry, the variable ledger, and the inclusion mode.
pub struct FunctionContext<'i, 'a> {
    /// The message type whose CRUD function is being synthesized.
    pub message: &'i MessageType,
    /// The package alias registry, shared across the whole output file.
    pub aliases: &'a mut PackageAliases<'i>,
    /// The function's variable ledger.
    pub ledger: VariableLedger,
    /// The function's inclusion mode.
    pub inclusion: Inclusion,
}

impl<'i, 'a> FunctionContext<'i, 'a> {
    /// A fresh context with an empty ledger.
    pub fn new(
        message: &'i MessageType,
        aliases: &'a mut PackageAliases<'i>,
        inclusion: Inclusion,
    ) -> Self {
        FunctionContext {
            message,
            aliases,
            ledger: VariableLedger::new(),
            inclusion,
        }
    }

    /// The type of the named field, or an error if the instruction
    /// references a field the message does not have.
    pub fn field_type(&self, field_name: &str) -> Result<&'i FieldType, GeneratorError> {
        self.message
            .field(field_name)
            .map(|field| &field.field_type)
            .ok_or_else(|| GeneratorError::UnknownField {
                type_name: self.message.name.clone(),
                field: field_name.to_owned(),
            })
    }

    /// The expression for "is this field included," for use in a
    /// parameter list.
    fn inclusion_parameter(&mut self, field_name: &str) -> Result<Expression, GeneratorError> {
        match &mut self.inclusion {
            Inclusion::Always => Ok(Expression::Bool(true)),
            Inclusion::FieldMask { referenced } => {
                *referenced = true;
                Ok(Expression::call(
                    "included",
                    vec![Expression::str(field_name)],
                ))
            }
            Inclusion::Forbidden => Err(GeneratorError::InclusionInDelete(field_name.to_owned())),
        }
    }

    /// The expression for "is this field included," for use as a guard
    /// condition. `None` means the guard is statically true and should be
    /// elided entirely.
    fn inclusion_condition(
        &mut self,
        field_name: &str,
    ) -> Result<Option<Expression>, GeneratorError> {
        match &mut self.inclusion {
            Inclusion::Always => Ok(None),
            Inclusion::FieldMask { referenced } => {
                *referenced = true;
                Ok(Some(Expression::call(
                    "included",
                    vec![Expression::str(field_name)],
                )))
            }
            Inclusion::Forbidden => Err(GeneratorError::InclusionInDelete(field_name.to_owned())),
        }
    }
}

/// `if err != nil { return }` — the shared error path of every
/// instruction.
pub(crate) fn if_error_return() -> Statement {
    Statement::If {
        condition: Expression::not_equal(Expression::symbol("err"), Expression::Nil),
        body: vec![Statement::bare_return()],
        else_body: None,
    }
}

/// `message.<GoField>` for the named proto field.
fn message_field(field_name: &str) -> Expression {
    Expression::Dot(vec!["message".to_owned(), field_to_go(field_name)])
}

/// The expression for a field's value in an input-parameter position,
/// with the marshal wrapper its type demands: timestamps and dates go
/// through their valuer constructors, enums are converted to `int32`,
/// and everything else is passed as is.
fn input_expression(
    ctx: &FunctionContext,
    field_name: &str,
) -> Result<Expression, GeneratorError> {
    let value = message_field(field_name);
    Ok(match ctx.field_type(field_name)? {
        FieldType::Builtin {
            builtin: Builtin::Timestamp,
        } => Expression::call("fromTimestamp", vec![value]),
        FieldType::Builtin {
            builtin: Builtin::Date,
        } => Expression::call("fromDate", vec![value]),
        FieldType::Enum { .. } => Expression::call("int32", vec![value]),
        _ => value,
    })
}

/// The expression for one input parameter: a (possibly wrapped) field
/// value, or the inclusion predicate.
fn input_parameter(
    ctx: &mut FunctionContext,
    parameter: &InputParameter,
) -> Result<Expression, GeneratorError> {
    match parameter {
        InputParameter::Field { field } => input_expression(ctx, field),
        InputParameter::Included { included } => ctx.inclusion_parameter(included),
    }
}

/// `target = pb.<Enum>(value)` wrapped in the one-line callback that
/// `intoEnum` expects. The enum's package alias is resolved (and
/// assigned, if new) on the way.
fn into_enum(
    ctx: &mut FunctionContext,
    enum_name: &str,
    target: Expression,
) -> Result<Expression, GeneratorError> {
    let alias = ctx.aliases.lookup(enum_name)?;
    let basename = type_basename_to_go(enum_name);
    Ok(Expression::call(
        "intoEnum",
        vec![Expression::Callback(Callback {
            parameter_name: "value".to_owned(),
            parameter_type: "int32".to_owned(),
            body: Box::new(Statement::Assign {
                left: vec![target],
                right: vec![Expression::call_dot(
                    &[alias.as_str(), basename.as_str()],
                    vec![Expression::symbol("value")],
                )],
            }),
        })],
    ))
}

/// The expression for a `read-row` destination field: an address-of-field
/// expression, wrapped in the unmarshal call its type demands.
fn scan_destination(
    ctx: &mut FunctionContext,
    field_name: &str,
) -> Result<Expression, GeneratorError> {
    let target = message_field(field_name);
    let address = Expression::address(target.clone());
    match ctx.field_type(field_name)? {
        FieldType::Builtin {
            builtin: Builtin::Timestamp,
        } => Ok(Expression::call("intoTimestamp", vec![address])),
        FieldType::Builtin {
            builtin: Builtin::Date,
        } => Ok(Expression::call("intoDate", vec![address])),
        FieldType::Enum { name } => {
            let name = name.clone();
            into_enum(ctx, &name, target)
        }
        _ => Ok(address),
    }
}

/// Compile one CRUD instruction into the Go statements that perform it.
pub fn compile(
    instruction: &Instruction,
    ctx: &mut FunctionContext,
) -> Result<Vec<Statement>, GeneratorError> {
    match instruction {
        Instruction::Query { sql, parameters } => compile_query(ctx, sql, parameters),
        Instruction::ReadRow { destinations } => compile_read_row(ctx, destinations),
        Instruction::ReadArray { destination } => compile_read_array(ctx, &destination.field),
        Instruction::Exec {
            condition,
            sql,
            parameters,
        } => compile_exec(ctx, condition.as_ref().map(|c| c.included.as_str()), sql, parameters),
        Instruction::ExecWithTuples {
            condition,
            tuple,
            sql,
            parameters,
        } => compile_exec_with_tuples(
            ctx,
            condition.as_ref().map(|c| c.included.as_str()),
            tuple,
            sql,
            parameters,
        ),
    }
}

// rows, err = transaction.QueryContext(ctx, $sql, $parameters)
// if err != nil {
//     return
// }
fn compile_query(
    ctx: &mut FunctionContext,
    sql: &str,
    parameters: &[InputParameter],
) -> Result<Vec<Statement>, GeneratorError> {
    let mut arguments = vec![Expression::symbol("ctx"), Expression::str(sql)];
    for parameter in parameters {
        arguments.push(input_parameter(ctx, parameter)?);
    }

    ctx.ledger.register("rows", "*sql.Rows");

    Ok(vec![
        Statement::Assign {
            left: vec![Expression::symbol("rows"), Expression::symbol("err")],
            right: vec![Expression::call_dot(
                &["transaction", "QueryContext"],
                arguments,
            )],
        },
        if_error_return(),
    ])
}

// ok = rows.Next()
//
// if !ok {
//     err = noRow()
//     return
// }
//
// err = rows.Scan($destinations)
// if err != nil {
//     return
// }
// rows.Next()
fn compile_read_row(
    ctx: &mut FunctionContext,
    destinations: &[Destination],
) -> Result<Vec<Statement>, GeneratorError> {
    let mut scanned = Vec::with_capacity(destinations.len());
    for destination in destinations {
        scanned.push(match destination {
            Destination::Field { field } => scan_destination(ctx, field)?,
            Destination::Ignore(_) => Expression::call("ignore", vec![]),
        });
    }

    ctx.ledger.register("rows", "*sql.Rows");
    ctx.ledger.register("ok", "bool");

    Ok(vec![
        Statement::assign(
            Expression::symbol("ok"),
            Expression::call_dot(&["rows", "Next"], vec![]),
        ),
        Statement::Spacer(1),
        // The missing row is the one semantically distinguished error:
        // callers can tell "not found" apart from everything else.
        Statement::If {
            condition: Expression::not(Expression::symbol("ok")),
            body: vec![
                Statement::assign(Expression::symbol("err"), Expression::call("noRow", vec![])),
                Statement::bare_return(),
            ],
            else_body: None,
        },
        Statement::Spacer(1),
        Statement::assign(
            Expression::symbol("err"),
            Expression::call_dot(&["rows", "Scan"], scanned),
        ),
        if_error_return(),
        // Advance past the row so the result set is exhausted before the
        // next query reuses the cursor.
        Statement::Expression(Expression::call_dot(&["rows", "Next"], vec![])),
    ])
}

// ok = rows.Next()
//
// for ; ok; ok = rows.Next() {
//     var temp $elementGoType
//     err = rows.Scan($intoTemp)
//     if err != nil {
//         return
//     }
//     $destination = append($destination, temp)
// }
fn compile_read_array(
    ctx: &mut FunctionContext,
    field_name: &str,
) -> Result<Vec<Statement>, GeneratorError> {
    let destination = message_field(field_name);
    let temp = Expression::symbol("temp");
    let temp_address = Expression::address(temp.clone());

    // The destination's element type governs the scratch variable's type
    // and which unmarshal wrapper applies. A FieldMask is not naturally
    // array-shaped in Go, so it gets a different append contract.
    let (temp_type, scanned, append) = match ctx.field_type(field_name)? {
        FieldType::Array { array } => {
            let array = array.clone();
            let temp_type = element_to_go(&array, ctx.aliases)?;
            let scanned = match &array {
                ElementType::Builtin {
                    builtin: Builtin::Timestamp,
                } => Expression::call("intoTimestamp", vec![temp_address]),
                ElementType::Builtin {
                    builtin: Builtin::Date,
                } => Expression::call("intoDate", vec![temp_address]),
                ElementType::Enum { name } => into_enum(ctx, name, temp.clone())?,
                ElementType::Builtin { .. } => temp_address,
            };
            let append = Statement::assign(
                destination.clone(),
                Expression::call("append", vec![destination.clone(), temp.clone()]),
            );
            (temp_type, scanned, append)
        }
        FieldType::Builtin {
            builtin: Builtin::FieldMask,
        } => {
            let append = Statement::assign(
                destination.clone(),
                Expression::call("appendField", vec![destination.clone(), temp.clone()]),
            );
            ("string".to_owned(), temp_address, append)
        }
        _ => {
            return Err(GeneratorError::ReadArrayDestination {
                type_name: ctx.message.name.clone(),
                field: field_name.to_owned(),
            })
        }
    };

    ctx.ledger.register("rows", "*sql.Rows");
    ctx.ledger.register("ok", "bool");

    Ok(vec![
        Statement::assign(
            Expression::symbol("ok"),
            Expression::call_dot(&["rows", "Next"], vec![]),
        ),
        Statement::Spacer(1),
        Statement::IterationFor {
            init: None,
            condition: Some(Expression::symbol("ok")),
            post: Some(Box::new(Statement::assign(
                Expression::symbol("ok"),
                Expression::call_dot(&["rows", "Next"], vec![]),
            ))),
            body: vec![
                Statement::Variable {
                    name: "temp".to_owned(),
                    type_name: temp_type,
                    value: None,
                },
                Statement::assign(
                    Expression::symbol("err"),
                    Expression::call_dot(&["rows", "Scan"], vec![scanned]),
                ),
                if_error_return(),
                append,
            ],
        },
    ])
}

// _, err = transaction.ExecContext(ctx, $sql, $parameters)
// if err != nil {
//     return
// }
//
// …wrapped in `if included("field") { … }` when the instruction carries a
// condition and inclusion is mask-driven.
fn compile_exec(
    ctx: &mut FunctionContext,
    condition: Option<&str>,
    sql: &str,
    parameters: &[InputParameter],
) -> Result<Vec<Statement>, GeneratorError> {
    let mut arguments = vec![Expression::symbol("ctx"), Expression::str(sql)];
    for parameter in parameters {
        arguments.push(input_parameter(ctx, parameter)?);
    }

    let statements = vec![
        Statement::Assign {
            left: vec![Expression::symbol("_"), Expression::symbol("err")],
            right: vec![Expression::call_dot(
                &["transaction", "ExecContext"],
                arguments,
            )],
        },
        if_error_return(),
    ];

    match condition {
        None => Ok(statements),
        Some(field_name) => match ctx.inclusion_condition(field_name)? {
            None => Ok(statements),
            Some(included) => Ok(vec![Statement::If {
                condition: included,
                body: statements,
                else_body: None,
            }]),
        },
    }
}

/// The marshal wrapper for one element of the multiplicity field inside
/// the tuple-accumulation loop.
fn element_expression(element: Option<&ElementType>) -> Expression {
    let value = Expression::symbol("element");
    match element {
        Some(ElementType::Builtin {
            builtin: Builtin::Timestamp,
        }) => Expression::call("fromTimestamp", vec![value]),
        Some(ElementType::Builtin {
            builtin: Builtin::Date,
        }) => Expression::call("fromDate", vec![value]),
        Some(ElementType::Enum { .. }) => Expression::call("int32", vec![value]),
        // Plain scalar elements, and FieldMask paths (strings), pass
        // through unwrapped.
        Some(ElementType::Builtin { .. }) | None => value,
    }
}

// if [included("field") && ]len($field) != 0 {
//     parameters = nil
//     for _, element := range $field {
//         parameters = append(parameters, $tuple…)
//     }
//     _, err = transaction.ExecContext(ctx, withTuples($sql, $tuple, len($field)), parameters...)
//     if err != nil {
//         return
//     }
// }
fn compile_exec_with_tuples(
    ctx: &mut FunctionContext,
    condition: Option<&str>,
    tuple: &str,
    sql: &str,
    parameters: &[InputParameter],
) -> Result<Vec<Statement>, GeneratorError> {
    // All parameters must be field references, and exactly one of them
    // must be array- or field-mask-valued: the multiplicity field, whose
    // length determines the number of tuples.
    let mut fields = Vec::with_capacity(parameters.len());
    let mut multiple = Vec::new();
    for parameter in parameters {
        match parameter {
            InputParameter::Included { included } => {
                return Err(GeneratorError::TupleParameterKind(included.clone()))
            }
            InputParameter::Field { field } => {
                if ctx.field_type(field)?.is_multiple() {
                    multiple.push(field.as_str());
                }
                fields.push(field.as_str());
            }
        }
    }
    if multiple.len() != 1 {
        return Err(GeneratorError::MultiplicityCount(multiple.len()));
    }
    let multiplicity_field = multiple[0];

    let destination = message_field(multiplicity_field);
    let (length, sequence, element_type) = match ctx.field_type(multiplicity_field)? {
        FieldType::Array { array } => (
            Expression::call("len", vec![destination.clone()]),
            destination.clone(),
            Some(array.clone()),
        ),
        // A FieldMask's length and element sequence go through its Paths
        // member; fieldMaskLen also tolerates a nil mask.
        _ => (
            Expression::call("fieldMaskLen", vec![destination.clone()]),
            Expression::Dot(vec![
                "message".to_owned(),
                field_to_go(multiplicity_field),
                "Paths".to_owned(),
            ]),
            None,
        ),
    };

    // One full parameter tuple per element, with `element` substituted
    // for the multiplicity field's own slot.
    let mut tuple_values = vec![Expression::symbol("parameters")];
    for field in fields {
        if field == multiplicity_field {
            tuple_values.push(element_expression(element_type.as_ref()));
        } else {
            tuple_values.push(input_expression(ctx, field)?);
        }
    }

    ctx.ledger.register("parameters", "[]interface{}");

    let length_check = Expression::not_equal(length.clone(), Expression::Int(0));
    let guard = match condition {
        None => length_check,
        Some(field_name) => match ctx.inclusion_condition(field_name)? {
            None => length_check,
            Some(included) => Expression::and(included, length_check),
        },
    };

    Ok(vec![Statement::If {
        condition: guard,
        body: vec![
            Statement::assign(Expression::symbol("parameters"), Expression::Nil),
            Statement::RangeFor {
                variables: vec!["_".to_owned(), "element".to_owned()],
                sequence,
                body: vec![Statement::assign(
                    Expression::symbol("parameters"),
                    Expression::call("append", tuple_values),
                )],
            },
            Statement::Assign {
                left: vec![Expression::symbol("_"), Expression::symbol("err")],
                right: vec![Expression::call_dot_variadic(
                    &["transaction", "ExecContext"],
                    vec![
                        Expression::symbol("ctx"),
                        Expression::call(
                            "withTuples",
                            vec![Expression::str(sql), Expression::str(tuple), length],
                        ),
                    ],
                    Expression::symbol("parameters"),
                )],
            },
            if_error_return(),
        ],
        else_body: None,
    }])
}

/// Whether an instruction consumes the result set of the query before
/// it. Consumers attach directly to their query with no separating blank
/// line.
pub fn continues_result_set(instruction: &Instruction) -> bool {
    matches!(
        instruction,
        Instruction::ReadRow { .. } | Instruction::ReadArray { .. }
    )
}

//! Per-verb CRUD function synthesis
//!
//! One public function per CRUD verb, each taking the message type, its
//! instruction sequence, and the package alias registry, and returning a
//! Go function declaration. All four verbs share the transactional
//! skeleton: begin a transaction whose rollback-on-error rides on the
//! `transaction` variable's deferred cleanup, run the instructions with
//! one shared `err` result slot, commit, return.
//!
//! The verbs differ in how field inclusion answers: create and read
//! include every field (statically true, elided from the output), update
//! builds an `included` closure from the caller's field mask, and delete
//! must never ask.

use crate::ast::{Expression, Function, Parameter, Statement};
use crate::codegen::instruction::{self, FunctionContext, Inclusion};
use crate::gotype::{field_to_go, qualified_type_name, type_basename_to_go, type_to_go, PackageAliases};
use crate::input::{Instruction, MessageType};
use crate::GeneratorError;

/// Synthesize the `Create<T>` function: adds a message to the database,
/// writing every field.
pub fn create_function<'i>(
    message: &'i MessageType,
    instructions: &[Instruction],
    aliases: &mut PackageAliases<'i>,
) -> Result<Function, GeneratorError> {
    let go_name = type_basename_to_go(&message.name);
    let documentation = format!(
        "Create{0} adds the specified message to the specified db, subject to the\n\
         specified cancellation context ctx. Return nil on success, or return a\n\
         non-nil value if an error occurs.",
        go_name
    );
    message_function(message, instructions, aliases, "Create", documentation)
}

/// Synthesize the `Read<T>` function: reads the whole row (and any array
/// tables) into a message whose ID the caller pre-populated. A missing
/// row surfaces the distinguished `NoRow` error.
pub fn read_function<'i>(
    message: &'i MessageType,
    instructions: &[Instruction],
    aliases: &mut PackageAliases<'i>,
) -> Result<Function, GeneratorError> {
    let go_name = type_basename_to_go(&message.name);
    let documentation = format!(
        "Read{0} reads from the specified db into the specified message, where\n\
         the ID of the message must be pre-populated by the caller. On success, the\n\
         error returned will be nil. On error, the error returned will not be nil.\n\
         The specified cancellation context ctx is forwarded wherever appropriate.",
        go_name
    );
    message_function(message, instructions, aliases, "Read", documentation)
}

/// Synthesize the `Update<T>` function: updates the fields selected by
/// the caller's field mask, where an empty mask means "update
/// everything."
pub fn update_function<'i>(
    message: &'i MessageType,
    instructions: &[Instruction],
    aliases: &mut PackageAliases<'i>,
) -> Result<Function, GeneratorError> {
    let go_name = type_basename_to_go(&message.name);
    let message_go_type = qualified_type_name(&message.name, aliases)?;

    let mut ctx = FunctionContext::new(
        message,
        aliases,
        Inclusion::FieldMask { referenced: false },
    );
    ctx.ledger.register("transaction", "*sql.Tx");
    let mut statements = transactional_body(instructions, &mut ctx)?;

    // The mask boilerplate is emitted only if some instruction actually
    // queried inclusion; a message with only an ID field would otherwise
    // end up with unused locals.
    if matches!(ctx.inclusion, Inclusion::FieldMask { referenced: true }) {
        ctx.ledger.register("fieldMaskMap", "map[string]bool");
        ctx.ledger.register("included", "func(string) bool");
        let mut prologue = field_mask_boilerplate();
        prologue.push(Statement::Spacer(1));
        prologue.append(&mut statements);
        statements = prologue;
    }

    Ok(Function {
        documentation: Some(format!(
            "Update{0} updates within the specified db the fields of the specified\n\
             message that are indicated by the specified fieldMask, subject to\n\
             specified cancellation context ctx. Each element of fieldMask is the\n\
             name of a field in message whose value is to be used in the database\n\
             update. If fieldMask is empty or nil, then update all fields from\n\
             message. Return nil on success, or a non-nil error if an error occurs.",
            go_name
        )),
        name: format!("Update{}", go_name),
        parameters: vec![
            Parameter::named("ctx", "context.Context"),
            Parameter::named("db", "*sql.DB"),
            Parameter::named("message", &format!("*{}", message_go_type)),
            Parameter::named("fieldMask", "[]string"),
        ],
        results: vec![Parameter::named("err", "error")],
        variables: ctx.ledger.into_variables(),
        statements,
    })
}

/// Synthesize the `Delete<T>` function: removes the message having the
/// specified ID. Deletions are idempotent and operate on the ID alone; an
/// instruction sequence that queries inclusion here is rejected.
pub fn delete_function<'i>(
    message: &'i MessageType,
    instructions: &[Instruction],
    aliases: &mut PackageAliases<'i>,
) -> Result<Function, GeneratorError> {
    let go_name = type_basename_to_go(&message.name);
    let message_go_type = qualified_type_name(&message.name, aliases)?;
    let id_field = message
        .field(&message.id_field_name)
        .ok_or_else(|| GeneratorError::MissingIdField {
            type_name: message.name.clone(),
            field: message.id_field_name.clone(),
        })?;
    let id_go_type = type_to_go(&id_field.field_type, aliases)?;

    let mut ctx = FunctionContext::new(message, aliases, Inclusion::Forbidden);
    // The instructions reference fields through a message value, so
    // declare one and seed its ID from the parameter.
    ctx.ledger.register("message", &message_go_type);
    ctx.ledger.register("transaction", "*sql.Tx");

    let mut statements = vec![Statement::assign(
        Expression::Dot(vec![
            "message".to_owned(),
            field_to_go(&message.id_field_name),
        ]),
        Expression::symbol("id"),
    )];
    statements.extend(transactional_body(instructions, &mut ctx)?);

    Ok(Function {
        documentation: Some(format!(
            "Delete{0} deletes the message having the specified id from the specified\n\
             db, subject to the specified cancellation context ctx. On success, the error\n\
             returned will be nil. On error, the error returned will not be nil. It is\n\
             not considered an error if there is no message having the specified id in\n\
             the database; i.e. deletions are idempotent.",
            go_name
        )),
        name: format!("Delete{}", go_name),
        parameters: vec![
            Parameter::named("ctx", "context.Context"),
            Parameter::named("db", "*sql.DB"),
            Parameter::named("id", &id_go_type),
        ],
        results: vec![Parameter::named("err", "error")],
        variables: ctx.ledger.into_variables(),
        statements,
    })
}

/// The shared shape of create and read.
fn message_function<'i>(
    message: &'i MessageType,
    instructions: &[Instruction],
    aliases: &mut PackageAliases<'i>,
    name_prefix: &str,
    documentation: String,
) -> Result<Function, GeneratorError> {
    let go_name = type_basename_to_go(&message.name);
    let message_go_type = qualified_type_name(&message.name, aliases)?;

    let mut ctx = FunctionContext::new(message, aliases, Inclusion::Always);
    ctx.ledger.register("transaction", "*sql.Tx");
    let statements = transactional_body(instructions, &mut ctx)?;

    Ok(Function {
        documentation: Some(documentation),
        name: format!("{}{}", name_prefix, go_name),
        parameters: vec![
            Parameter::named("ctx", "context.Context"),
            Parameter::named("db", "*sql.DB"),
            Parameter::named("message", &format!("*{}", message_go_type)),
        ],
        results: vec![Parameter::named("err", "error")],
        variables: ctx.ledger.into_variables(),
        statements,
    })
}

/// Begin the transaction, compile each instruction, commit. Instruction
/// groups are separated by one blank line, except that row/array readers
/// attach directly to their query.
fn transactional_body(
    instructions: &[Instruction],
    ctx: &mut FunctionContext,
) -> Result<Vec<Statement>, GeneratorError> {
    let mut statements = vec![
        Statement::Assign {
            left: vec![
                Expression::symbol("transaction"),
                Expression::symbol("err"),
            ],
            right: vec![Expression::call_dot(
                &["db", "BeginTx"],
                vec![Expression::symbol("ctx"), Expression::Nil],
            )],
        },
        instruction::if_error_return(),
    ];

    for instr in instructions {
        if !instruction::continues_result_set(instr) {
            statements.push(Statement::Spacer(1));
        }
        statements.extend(instruction::compile(instr, ctx)?);
    }

    statements.push(Statement::Spacer(1));
    statements.push(Statement::assign(
        Expression::symbol("err"),
        Expression::call_dot(&["transaction", "Commit"], vec![]),
    ));
    statements.push(Statement::bare_return());
    Ok(statements)
}

/// The update prologue that turns the caller's field mask into an
/// `included` predicate. An empty mask means every field is included.
fn field_mask_boilerplate() -> Vec<Statement> {
    let mask_length = Expression::call("len", vec![Expression::symbol("fieldMask")]);
    let mask_index = || Expression::Index {
        object: Box::new(Expression::symbol("fieldMaskMap")),
        index: Box::new(Expression::symbol("field")),
    };

    vec![Statement::If {
        condition: Expression::equal(mask_length.clone(), Expression::Int(0)),
        body: vec![Statement::AssignFunc {
            left: Box::new(Expression::symbol("included")),
            parameters: vec![Parameter::anonymous("string")],
            results: vec![Parameter::anonymous("bool")],
            body: vec![Statement::Return(vec![Expression::Bool(true)])],
        }],
        else_body: Some(vec![
            Statement::assign(
                Expression::symbol("fieldMaskMap"),
                Expression::call(
                    "make",
                    vec![Expression::Raw("map[string]bool".to_owned()), mask_length],
                ),
            ),
            Statement::RangeFor {
                variables: vec!["_".to_owned(), "field".to_owned()],
                sequence: Expression::symbol("fieldMask"),
                body: vec![Statement::Assign {
                    left: vec![mask_index()],
                    right: vec![Expression::Bool(true)],
                }],
            },
            Statement::AssignFunc {
                left: Box::new(Expression::symbol("included")),
                parameters: vec![Parameter::named("field", "string")],
                results: vec![Parameter::anonymous("bool")],
                body: vec![Statement::Return(vec![mask_index()])],
            },
        ]),
    }]
}

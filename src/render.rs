//! Go source rendering
//!
//! This module turns a [`GoFile`] AST into Go source text. Rendering is
//! preceded by a shape-validation pass: the Rust types already rule out
//! most malformed trees, and `validate` catches the residual invariants
//! (empty assignment sides, one-component dotted paths, and so on). A
//! validation failure indicates a bug in the compiler that built the
//! tree, not bad user input, so it fails the whole generation run.
//!
//! Expressions render to a single line. Parenthesization is conservative:
//! only the negation of a compound sub-expression is wrapped. Builders
//! are expected to construct trees that do not rely on the renderer for
//! operator-precedence rescue.

use crate::ast::{
    Call, Callback, Callee, Declaration, Expression, Function, GoFile, Parameter, Statement,
};
use crate::GeneratorError;

/// Render the specified file to Go source text, validating its shape
/// first.
pub fn render_file(file: &GoFile) -> Result<String, GeneratorError> {
    validate_file(file)?;

    let mut lines: Vec<String> = Vec::new();

    if let Some(documentation) = &file.documentation {
        render_documentation(documentation, &mut lines, 0);
    }
    push(&mut lines, 0, &format!("package {}", file.package));

    if !file.imports.is_empty() {
        push(&mut lines, 0, "");
        push(&mut lines, 0, "import (");
        for (package, alias) in &file.imports {
            let entry = match alias {
                Some(alias) => format!("{} {}", alias, quote_string(package)),
                None => quote_string(package),
            };
            push(&mut lines, 1, &entry);
        }
        push(&mut lines, 0, ")");
    }

    for declaration in &file.declarations {
        push(&mut lines, 0, "");
        match declaration {
            Declaration::Function(function) => render_function(function, &mut lines),
            Declaration::Raw(text) => {
                for line in text.split('\n') {
                    lines.push(line.to_owned());
                }
            }
        }
    }

    let mut text = lines.join("\n");
    text.push('\n');
    Ok(text)
}

/// Append a line at the specified indentation level (one tab per level).
fn push(lines: &mut Vec<String>, indent: usize, line: &str) {
    if line.is_empty() {
        lines.push(String::new());
    } else {
        lines.push(format!("{}{}", "\t".repeat(indent), line));
    }
}

/// Render each line of the text as a `// ` line comment.
fn render_documentation(text: &str, lines: &mut Vec<String>, indent: usize) {
    for line in text.split('\n') {
        if line.is_empty() {
            push(lines, indent, "//");
        } else {
            push(lines, indent, &format!("// {}", line));
        }
    }
}

/// Quote the text as a Go string literal. Go string literals are
/// compatible with JSON string literals, which keeps the quoting of
/// embedded SQL statements consistent.
fn quote_string(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    for character in text.chars() {
        match character {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            control if (control as u32) < 0x20 => {
                quoted.push_str(&format!("\\u{:04x}", control as u32));
            }
            other => quoted.push(other),
        }
    }
    quoted.push('"');
    quoted
}

fn callee_to_string(callee: &Callee) -> String {
    match callee {
        Callee::Name(name) => name.clone(),
        Callee::Dot(parts) => parts.join("."),
    }
}

fn call_to_string(call: &Call) -> String {
    let mut arguments: Vec<String> = call.arguments.iter().map(expression_to_string).collect();
    if let Some(rest) = &call.rest {
        arguments.push(format!("{}...", expression_to_string(rest)));
    }
    format!(
        "{}({})",
        callee_to_string(&call.function),
        arguments.join(", ")
    )
}

/// Whether negating the expression requires parentheses. Negation of a
/// compound boolean expression is the one place where ambiguity is
/// structurally possible in the trees this crate builds.
fn negation_needs_parentheses(expression: &Expression) -> bool {
    matches!(
        expression,
        Expression::Equal { .. }
            | Expression::NotEqual { .. }
            | Expression::And { .. }
            | Expression::Not(_)
    )
}

fn expression_to_string(expression: &Expression) -> String {
    match expression {
        Expression::Raw(text) => text.clone(),
        Expression::Int(value) => value.to_string(),
        Expression::Str(text) => quote_string(text),
        Expression::Bool(value) => value.to_string(),
        Expression::Nil => "nil".to_owned(),
        Expression::Symbol(name) => name.clone(),
        Expression::Dot(parts) => parts.join("."),
        Expression::Call(call) => call_to_string(call),
        Expression::SequenceLiteral {
            type_name,
            elements,
        } => {
            let elements: Vec<String> = elements.iter().map(expression_to_string).collect();
            format!(
                "{}{{{}}}",
                type_name.as_deref().unwrap_or(""),
                elements.join(", ")
            )
        }
        Expression::Address(inner) => format!("&{}", expression_to_string(inner)),
        Expression::Equal { left, right } => format!(
            "{} == {}",
            expression_to_string(left),
            expression_to_string(right)
        ),
        Expression::NotEqual { left, right } => format!(
            "{} != {}",
            expression_to_string(left),
            expression_to_string(right)
        ),
        Expression::And { left, right } => format!(
            "{} && {}",
            expression_to_string(left),
            expression_to_string(right)
        ),
        Expression::Not(inner) => {
            if negation_needs_parentheses(inner) {
                format!("!({})", expression_to_string(inner))
            } else {
                format!("!{}", expression_to_string(inner))
            }
        }
        Expression::Index { object, index } => format!(
            "{}[{}]",
            expression_to_string(object),
            expression_to_string(index)
        ),
        Expression::Callback(callback) => format!(
            "func({} {}) {{ {} }}",
            callback.parameter_name,
            callback.parameter_type,
            inline_statement_to_string(&callback.body)
        ),
    }
}

fn parameter_to_string(parameter: &Parameter) -> String {
    match &parameter.name {
        Some(name) => format!("{} {}", name, parameter.type_name),
        None => parameter.type_name.clone(),
    }
}

/// Render a result list. A single unnamed result is spelled bare; any
/// named result, or more than one result, gets the tuple form. The
/// returned string carries its own trailing space when nonempty.
fn results_to_string(results: &[Parameter]) -> String {
    if results.is_empty() {
        return String::new();
    }
    if results.len() == 1 && results[0].name.is_none() {
        return format!("{} ", results[0].type_name);
    }
    let rendered: Vec<String> = results.iter().map(parameter_to_string).collect();
    format!("({}) ", rendered.join(", "))
}

fn assignment_to_string(left: &[Expression], right: &[Expression]) -> String {
    let left: Vec<String> = left.iter().map(expression_to_string).collect();
    let right: Vec<String> = right.iter().map(expression_to_string).collect();
    format!("{} = {}", left.join(", "), right.join(", "))
}

/// Render a statement that must fit on one line: a loop header slot or a
/// callback body. Validation has already restricted these to assignments
/// and expressions.
fn inline_statement_to_string(statement: &Statement) -> String {
    match statement {
        Statement::Assign { left, right } => assignment_to_string(left, right),
        Statement::Expression(expression) => expression_to_string(expression),
        // Unreachable after validation; render something greppable
        // rather than panic.
        other => format!("/* unrenderable inline statement: {:?} */", other),
    }
}

fn variable_to_string(name: &str, type_name: &str, value: Option<&Expression>) -> String {
    match value {
        Some(value) => format!(
            "var {} {} = {}",
            name,
            type_name,
            expression_to_string(value)
        ),
        None => format!("var {} {}", name, type_name),
    }
}

fn render_block(body: &[Statement], lines: &mut Vec<String>, indent: usize) {
    for statement in body {
        render_statement(statement, lines, indent);
    }
}

fn render_statement(statement: &Statement, lines: &mut Vec<String>, indent: usize) {
    match statement {
        Statement::Expression(expression) => {
            push(lines, indent, &expression_to_string(expression));
        }
        Statement::Assign { left, right } => {
            push(lines, indent, &assignment_to_string(left, right));
        }
        Statement::AssignFunc {
            left,
            parameters,
            results,
            body,
        } => {
            let parameters: Vec<String> = parameters.iter().map(parameter_to_string).collect();
            push(
                lines,
                indent,
                &format!(
                    "{} = func({}) {}{{",
                    expression_to_string(left),
                    parameters.join(", "),
                    results_to_string(results)
                ),
            );
            render_block(body, lines, indent + 1);
            push(lines, indent, "}");
        }
        Statement::If {
            condition,
            body,
            else_body,
        } => {
            push(
                lines,
                indent,
                &format!("if {} {{", expression_to_string(condition)),
            );
            render_block(body, lines, indent + 1);
            match else_body {
                Some(else_body) => {
                    push(lines, indent, "} else {");
                    render_block(else_body, lines, indent + 1);
                    push(lines, indent, "}");
                }
                None => push(lines, indent, "}"),
            }
        }
        Statement::RangeFor {
            variables,
            sequence,
            body,
        } => {
            push(
                lines,
                indent,
                &format!(
                    "for {} := range {} {{",
                    variables.join(", "),
                    expression_to_string(sequence)
                ),
            );
            render_block(body, lines, indent + 1);
            push(lines, indent, "}");
        }
        Statement::ConditionFor { condition, body } => {
            push(
                lines,
                indent,
                &format!("for {} {{", expression_to_string(condition)),
            );
            render_block(body, lines, indent + 1);
            push(lines, indent, "}");
        }
        Statement::IterationFor {
            init,
            condition,
            post,
            body,
        } => {
            let init = init
                .as_deref()
                .map(inline_statement_to_string)
                .unwrap_or_default();
            let condition = condition
                .as_ref()
                .map(expression_to_string)
                .unwrap_or_default();
            let post = post
                .as_deref()
                .map(inline_statement_to_string)
                .unwrap_or_default();
            push(
                lines,
                indent,
                &format!("for {}; {}; {} {{", init, condition, post),
            );
            render_block(body, lines, indent + 1);
            push(lines, indent, "}");
        }
        Statement::Return(expressions) => {
            if expressions.is_empty() {
                push(lines, indent, "return");
            } else {
                let expressions: Vec<String> =
                    expressions.iter().map(expression_to_string).collect();
                push(lines, indent, &format!("return {}", expressions.join(", ")));
            }
        }
        Statement::Spacer(count) => {
            for _ in 0..*count {
                lines.push(String::new());
            }
        }
        Statement::Variable {
            name,
            type_name,
            value,
        } => {
            push(
                lines,
                indent,
                &variable_to_string(name, type_name, value.as_ref()),
            );
        }
        Statement::Defer(expression) => {
            push(
                lines,
                indent,
                &format!("defer {}", expression_to_string(expression)),
            );
        }
        Statement::DeferBlock(body) => {
            push(lines, indent, "defer func() {");
            render_block(body, lines, indent + 1);
            push(lines, indent, "}()");
        }
    }
}

fn render_function(function: &Function, lines: &mut Vec<String>) {
    if let Some(documentation) = &function.documentation {
        render_documentation(documentation, lines, 0);
    }

    let parameters: Vec<String> = function.parameters.iter().map(parameter_to_string).collect();
    push(
        lines,
        0,
        &format!(
            "func {}({}) {}{{",
            function.name,
            parameters.join(", "),
            results_to_string(&function.results)
        ),
    );

    for variable in &function.variables {
        push(
            lines,
            1,
            &variable_to_string(&variable.name, &variable.type_name, variable.value.as_ref()),
        );
        if let Some(cleanup) = &variable.cleanup {
            render_statement(&Statement::DeferBlock(cleanup.clone()), lines, 1);
        }
    }

    // A blank line separates the variable block from the statements, but
    // only if neither is empty.
    if !function.variables.is_empty() && !function.statements.is_empty() {
        lines.push(String::new());
    }

    render_block(&function.statements, lines, 1);
    push(lines, 0, "}");
}

//
// Validation
//

fn malformed(message: impl Into<String>) -> GeneratorError {
    GeneratorError::MalformedAst(message.into())
}

fn validate_identifier(name: &str, what: &str) -> Result<(), GeneratorError> {
    if name.is_empty() {
        return Err(malformed(format!("{} must not be empty", what)));
    }
    Ok(())
}

fn is_lvalue(expression: &Expression) -> bool {
    matches!(
        expression,
        Expression::Symbol(_) | Expression::Dot(_) | Expression::Index { .. }
    )
}

fn is_inline_statement(statement: &Statement) -> bool {
    matches!(
        statement,
        Statement::Assign { .. } | Statement::Expression(_)
    )
}

fn validate_dot(parts: &[String]) -> Result<(), GeneratorError> {
    if parts.len() < 2 {
        return Err(malformed(
            "a dotted path must have at least two components",
        ));
    }
    for part in parts {
        validate_identifier(part, "dotted path component")?;
    }
    Ok(())
}

fn validate_expression(expression: &Expression) -> Result<(), GeneratorError> {
    match expression {
        Expression::Raw(_)
        | Expression::Int(_)
        | Expression::Str(_)
        | Expression::Bool(_)
        | Expression::Nil => Ok(()),
        Expression::Symbol(name) => validate_identifier(name, "symbol"),
        Expression::Dot(parts) => validate_dot(parts),
        Expression::Call(call) => {
            match &call.function {
                Callee::Name(name) => validate_identifier(name, "callee")?,
                Callee::Dot(parts) => validate_dot(parts)?,
            }
            for argument in &call.arguments {
                validate_expression(argument)?;
            }
            if let Some(rest) = &call.rest {
                validate_expression(rest)?;
            }
            Ok(())
        }
        Expression::SequenceLiteral { elements, .. } => {
            for element in elements {
                validate_expression(element)?;
            }
            Ok(())
        }
        Expression::Address(inner) | Expression::Not(inner) => validate_expression(inner),
        Expression::Equal { left, right }
        | Expression::NotEqual { left, right }
        | Expression::And { left, right } => {
            validate_expression(left)?;
            validate_expression(right)
        }
        Expression::Index { object, index } => {
            validate_expression(object)?;
            validate_expression(index)
        }
        Expression::Callback(callback) => validate_callback(callback),
    }
}

fn validate_callback(callback: &Callback) -> Result<(), GeneratorError> {
    validate_identifier(&callback.parameter_name, "callback parameter name")?;
    validate_identifier(&callback.parameter_type, "callback parameter type")?;
    if !is_inline_statement(&callback.body) {
        return Err(malformed(
            "a callback body must be an assignment or an expression",
        ));
    }
    validate_statement(&callback.body)
}

fn validate_assignment(left: &[Expression], right: &[Expression]) -> Result<(), GeneratorError> {
    if left.is_empty() || right.is_empty() {
        return Err(malformed("both sides of an assignment must be nonempty"));
    }
    for expression in left {
        if !is_lvalue(expression) {
            return Err(malformed(format!(
                "assignment target is not an lvalue: {:?}",
                expression
            )));
        }
        validate_expression(expression)?;
    }
    for expression in right {
        validate_expression(expression)?;
    }
    Ok(())
}

fn validate_parameters(parameters: &[Parameter]) -> Result<(), GeneratorError> {
    for parameter in parameters {
        validate_identifier(&parameter.type_name, "parameter type")?;
        if let Some(name) = &parameter.name {
            validate_identifier(name, "parameter name")?;
        }
    }
    Ok(())
}

fn validate_block(body: &[Statement]) -> Result<(), GeneratorError> {
    for statement in body {
        validate_statement(statement)?;
    }
    Ok(())
}

fn validate_statement(statement: &Statement) -> Result<(), GeneratorError> {
    match statement {
        Statement::Expression(expression) => validate_expression(expression),
        Statement::Assign { left, right } => validate_assignment(left, right),
        Statement::AssignFunc {
            left,
            parameters,
            results,
            body,
        } => {
            if !is_lvalue(left) {
                return Err(malformed("assignFunc target is not an lvalue"));
            }
            validate_expression(left)?;
            validate_parameters(parameters)?;
            validate_parameters(results)?;
            validate_block(body)
        }
        Statement::If {
            condition,
            body,
            else_body,
        } => {
            validate_expression(condition)?;
            validate_block(body)?;
            match else_body {
                Some(else_body) => validate_block(else_body),
                None => Ok(()),
            }
        }
        Statement::RangeFor {
            variables,
            sequence,
            body,
        } => {
            if variables.is_empty() {
                return Err(malformed("a range-for must bind at least one variable"));
            }
            for variable in variables {
                validate_identifier(variable, "range-for variable")?;
            }
            validate_expression(sequence)?;
            validate_block(body)
        }
        Statement::ConditionFor { condition, body } => {
            validate_expression(condition)?;
            validate_block(body)
        }
        Statement::IterationFor {
            init,
            condition,
            post,
            body,
        } => {
            for slot in [init, post].into_iter().flatten() {
                if !is_inline_statement(slot) {
                    return Err(malformed(
                        "a for-loop header slot must be an assignment or an expression",
                    ));
                }
                validate_statement(slot)?;
            }
            if let Some(condition) = condition {
                validate_expression(condition)?;
            }
            validate_block(body)
        }
        Statement::Return(expressions) => {
            for expression in expressions {
                validate_expression(expression)?;
            }
            Ok(())
        }
        Statement::Spacer(count) => {
            if *count == 0 {
                return Err(malformed("a spacer must emit at least one blank line"));
            }
            Ok(())
        }
        Statement::Variable {
            name,
            type_name,
            value,
        } => {
            validate_identifier(name, "variable name")?;
            validate_identifier(type_name, "variable type")?;
            match value {
                Some(value) => validate_expression(value),
                None => Ok(()),
            }
        }
        Statement::Defer(expression) => validate_expression(expression),
        Statement::DeferBlock(body) => validate_block(body),
    }
}

fn validate_function(function: &Function) -> Result<(), GeneratorError> {
    validate_identifier(&function.name, "function name")?;
    validate_parameters(&function.parameters)?;
    validate_parameters(&function.results)?;
    for variable in &function.variables {
        validate_identifier(&variable.name, "variable name")?;
        validate_identifier(&variable.type_name, "variable type")?;
        if let Some(value) = &variable.value {
            validate_expression(value)?;
        }
        if let Some(cleanup) = &variable.cleanup {
            validate_block(cleanup)?;
        }
    }
    validate_block(&function.statements)
}

fn validate_file(file: &GoFile) -> Result<(), GeneratorError> {
    validate_identifier(&file.package, "package name")?;
    for (package, alias) in &file.imports {
        validate_identifier(package, "import path")?;
        if let Some(alias) = alias {
            validate_identifier(alias, "import alias")?;
        }
    }
    for declaration in &file.declarations {
        match declaration {
            Declaration::Function(function) => validate_function(function)?,
            Declaration::Raw(text) => {
                if text.is_empty() {
                    return Err(malformed("a raw declaration must not be empty"));
                }
            }
        }
    }
    Ok(())
}

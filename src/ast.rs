//! Go AST node model
//!
//! This is not a full abstract syntax tree for Go — it is just enough
//! structure to assemble the generated CRUD modules without resorting to
//! a rat's nest of template strings. The subset is C89-flavored: most
//! variables are declared at the top of a function, optionally with an
//! attached deferred cleanup block.
//!
//! The tree is a pure value tree. Nodes are never shared between
//! declarations; builders copy or re-synthesize instead.

use std::collections::BTreeMap;

/// An expression. Expressions render to a single line of Go source.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Verbatim Go source, expanded as is.
    Raw(String),
    /// An integer literal.
    Int(i64),
    /// A string literal. The renderer does the quoting; the value here is
    /// the unescaped text.
    Str(String),
    /// `true` or `false`.
    Bool(bool),
    /// `nil`.
    Nil,
    /// A bare identifier, e.g. the name of a variable.
    Symbol(String),
    /// `a.b.c` — field or package-qualified access.
    Dot(Vec<String>),
    /// A function call.
    Call(Call),
    /// `T{a, b, c}` or `{a, b, c}` — a slice/composite literal.
    SequenceLiteral {
        /// The literal's type, if spelled.
        type_name: Option<String>,
        /// The elements.
        elements: Vec<Expression>,
    },
    /// `&expr`.
    Address(Box<Expression>),
    /// `left == right`.
    Equal {
        /// Left operand.
        left: Box<Expression>,
        /// Right operand.
        right: Box<Expression>,
    },
    /// `left != right`.
    NotEqual {
        /// Left operand.
        left: Box<Expression>,
        /// Right operand.
        right: Box<Expression>,
    },
    /// `left && right`.
    And {
        /// Left operand.
        left: Box<Expression>,
        /// Right operand.
        right: Box<Expression>,
    },
    /// `!expr`.
    Not(Box<Expression>),
    /// `object[index]`.
    Index {
        /// The indexed object.
        object: Box<Expression>,
        /// The index expression.
        index: Box<Expression>,
    },
    /// A one-line function literal with exactly one parameter and one
    /// statement, e.g. `func(value int32) { message.Rank = pb.Rank(value) }`.
    Callback(Callback),
}

/// A function call expression, `f(a, b)` or `f(a, b, rest...)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    /// What is being called.
    pub function: Callee,
    /// The ordinary arguments.
    pub arguments: Vec<Expression>,
    /// An optional trailing variadic argument, e.g. `parameters` in
    /// `f(a, parameters...)`.
    pub rest: Option<Box<Expression>>,
}

/// The callee of a [`Call`]: a bare name or a dotted path.
#[derive(Debug, Clone, PartialEq)]
pub enum Callee {
    /// A bare function name, e.g. `append`.
    Name(String),
    /// A dotted path, e.g. `rows.Scan`.
    Dot(Vec<String>),
}

/// A one-line unary function literal; see [`Expression::Callback`].
#[derive(Debug, Clone, PartialEq)]
pub struct Callback {
    /// The parameter's name.
    pub parameter_name: String,
    /// The parameter's Go type.
    pub parameter_type: String,
    /// The single statement of the body.
    pub body: Box<Statement>,
}

/// A statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// An expression in statement position, e.g. a bare `rows.Next()`.
    Expression(Expression),
    /// `left, left2 = right, right2`. The left-hand expressions must be
    /// lvalues (symbols, dotted paths, or index expressions).
    Assign {
        /// The assigned-to expressions.
        left: Vec<Expression>,
        /// The assigned values.
        right: Vec<Expression>,
    },
    /// `left = func(parameters) results { body }` — assignment of a
    /// multi-line function literal.
    AssignFunc {
        /// The assigned-to lvalue.
        left: Box<Expression>,
        /// The function literal's parameters.
        parameters: Vec<Parameter>,
        /// The function literal's results.
        results: Vec<Parameter>,
        /// The function literal's body.
        body: Vec<Statement>,
    },
    /// `if condition { body }` with an optional `else { else_body }`.
    If {
        /// The condition.
        condition: Expression,
        /// The statements of the `if` branch.
        body: Vec<Statement>,
        /// The statements of the `else` branch, if any.
        else_body: Option<Vec<Statement>>,
    },
    /// `for v1, v2 := range sequence { body }`.
    RangeFor {
        /// The bound loop variables.
        variables: Vec<String>,
        /// The ranged-over expression.
        sequence: Expression,
        /// The loop body.
        body: Vec<Statement>,
    },
    /// `for condition { body }`.
    ConditionFor {
        /// The loop condition.
        condition: Expression,
        /// The loop body.
        body: Vec<Statement>,
    },
    /// `for init; condition; post { body }`. Any of the three header
    /// slots may be empty.
    IterationFor {
        /// The init statement, if any.
        init: Option<Box<Statement>>,
        /// The condition, if any.
        condition: Option<Expression>,
        /// The post statement, if any.
        post: Option<Box<Statement>>,
        /// The loop body.
        body: Vec<Statement>,
    },
    /// `return a, b` (or a bare `return` when empty).
    Return(Vec<Expression>),
    /// The specified number of blank lines, for separating logical
    /// sections of generated code.
    Spacer(usize),
    /// `var name type` or `var name type = value`. Most variables are
    /// declared in the function's variable block instead; this statement
    /// form is for loop-scoped temporaries.
    Variable {
        /// The variable's name.
        name: String,
        /// The variable's Go type.
        type_name: String,
        /// The initial value, if any.
        value: Option<Expression>,
    },
    /// `defer expr`.
    Defer(Expression),
    /// `defer func() { body }()`.
    DeferBlock(Vec<Statement>),
}

/// A parameter or result of a function: an optional name and a type.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    /// The parameter's name, if named.
    pub name: Option<String>,
    /// The parameter's Go type.
    pub type_name: String,
}

impl Parameter {
    /// A named parameter.
    pub fn named(name: &str, type_name: &str) -> Self {
        Parameter {
            name: Some(name.to_owned()),
            type_name: type_name.to_owned(),
        }
    }

    /// An anonymous parameter (type only).
    pub fn anonymous(type_name: &str) -> Self {
        Parameter {
            name: None,
            type_name: type_name.to_owned(),
        }
    }
}

/// A variable declared in a function's up-front variable block,
/// optionally with a deferred cleanup block that runs when the function
/// returns.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionVariable {
    /// The variable's name.
    pub name: String,
    /// The variable's Go type.
    pub type_name: String,
    /// The initial value, if any.
    pub value: Option<Expression>,
    /// Statements of a `defer func() { … }()` emitted immediately after
    /// the declaration, if cleanup is required.
    pub cleanup: Option<Vec<Statement>>,
}

/// A function declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    /// Documentation rendered as line comments above the function.
    pub documentation: Option<String>,
    /// The function's name.
    pub name: String,
    /// The function's parameters.
    pub parameters: Vec<Parameter>,
    /// The function's results.
    pub results: Vec<Parameter>,
    /// The up-front variable block.
    pub variables: Vec<FunctionVariable>,
    /// The function body proper.
    pub statements: Vec<Statement>,
}

/// A file-level declaration: a function, or verbatim Go source (used for
/// predetermined helper snippets that do not depend on the input).
#[derive(Debug, Clone, PartialEq)]
pub enum Declaration {
    /// A function.
    Function(Function),
    /// Verbatim Go source.
    Raw(String),
}

/// A Go source file.
#[derive(Debug, Clone, PartialEq)]
pub struct GoFile {
    /// Documentation rendered as line comments above the package clause.
    pub documentation: Option<String>,
    /// The package name.
    pub package: String,
    /// Imports: package path → alias (`None` for no alias). A `BTreeMap`
    /// so the import block renders sorted by path.
    pub imports: BTreeMap<String, Option<String>>,
    /// The file's declarations, in order.
    pub declarations: Vec<Declaration>,
}

impl Expression {
    /// A bare identifier.
    pub fn symbol(name: &str) -> Self {
        Expression::Symbol(name.to_owned())
    }

    /// A string literal.
    pub fn str(text: &str) -> Self {
        Expression::Str(text.to_owned())
    }

    /// A dotted path, e.g. `message.Id`.
    pub fn dot(parts: &[&str]) -> Self {
        Expression::Dot(parts.iter().map(|part| (*part).to_owned()).collect())
    }

    /// `&expr`.
    pub fn address(expression: Expression) -> Self {
        Expression::Address(Box::new(expression))
    }

    /// `!expr`.
    pub fn not(expression: Expression) -> Self {
        Expression::Not(Box::new(expression))
    }

    /// `left && right`.
    pub fn and(left: Expression, right: Expression) -> Self {
        Expression::And {
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// `left == right`.
    pub fn equal(left: Expression, right: Expression) -> Self {
        Expression::Equal {
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// `left != right`.
    pub fn not_equal(left: Expression, right: Expression) -> Self {
        Expression::NotEqual {
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// A call through a bare function name.
    pub fn call(function: &str, arguments: Vec<Expression>) -> Self {
        Expression::Call(Call {
            function: Callee::Name(function.to_owned()),
            arguments,
            rest: None,
        })
    }

    /// A call through a dotted path, e.g. `rows.Scan(args)`.
    pub fn call_dot(path: &[&str], arguments: Vec<Expression>) -> Self {
        Expression::Call(Call {
            function: Callee::Dot(path.iter().map(|part| (*part).to_owned()).collect()),
            arguments,
            rest: None,
        })
    }

    /// A call through a dotted path with a trailing variadic argument,
    /// e.g. `transaction.ExecContext(ctx, sql, parameters...)`.
    pub fn call_dot_variadic(
        path: &[&str],
        arguments: Vec<Expression>,
        rest: Expression,
    ) -> Self {
        Expression::Call(Call {
            function: Callee::Dot(path.iter().map(|part| (*part).to_owned()).collect()),
            arguments,
            rest: Some(Box::new(rest)),
        })
    }
}

impl Statement {
    /// `left = right` with a single expression on each side.
    pub fn assign(left: Expression, right: Expression) -> Self {
        Statement::Assign {
            left: vec![left],
            right: vec![right],
        }
    }

    /// A bare `return`.
    pub fn bare_return() -> Self {
        Statement::Return(Vec::new())
    }
}

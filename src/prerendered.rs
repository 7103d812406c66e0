//! Pre-rendered helper snippets
//!
//! Some parts of the generated Go code do not change based on the input,
//! but are conditionally included in the output based on what the
//! generated code references. For example, if no message type has a
//! timestamp-valued field, the timestamp marshaling code is not needed;
//! if one does, several timestamp-related chunks of Go must be included,
//! verbatim.
//!
//! Each snippet is keyed by the function name that generated code would
//! call. [`include_prerendered`] walks the assembled declarations looking
//! for calls to registered names and pulls in exactly the declarations
//! and imports those names need, so the output never carries dead helper
//! code. [`include_standard_imports`] does the same for calls through a
//! fixed table of standard-library package identifiers.
//!
//! Snippets do not reference each other, so a single walk suffices; if
//! that ever changes, this needs to become a proper fixed-point closure.

use crate::ast::{Callee, Declaration, Expression, GoFile, Statement};
use crate::GeneratorError;
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// A conditionally included chunk of Go: the imports it needs and its
/// file-level declarations, verbatim.
pub struct Snippet {
    /// Go import paths required by the declarations, with optional
    /// aliases.
    pub imports: &'static [(&'static str, Option<&'static str>)],
    /// File-level Go declarations, included in the output as is.
    pub declarations: &'static [&'static str],
}

const TIMESTAMP_PACKAGE: &str = "github.com/golang/protobuf/ptypes/timestamp";
const DATE_PACKAGE: &str = "google.golang.org/genproto/googleapis/type/date";
const FIELD_MASK_PACKAGE: &str = "google.golang.org/genproto/protobuf/field_mask";

static PRERENDERED: Lazy<HashMap<&'static str, Snippet>> = Lazy::new(|| {
    let mut snippets = HashMap::new();

    // When a timestamp is an output parameter in SQL, `intoTimestamp`
    // wraps the conversion from the storage representation (microseconds
    // since the Unix epoch) into the protobuf representation.
    snippets.insert(
        "intoTimestamp",
        Snippet {
            imports: &[("database/sql", None), (TIMESTAMP_PACKAGE, None)],
            declarations: &[
                "type timestampScanner struct {
	destination  **timestamp.Timestamp
	intermediary sql.NullInt64 // microseconds since unix epoch
}",
                "func (scanner timestampScanner) Scan(value interface{}) error {
	err := scanner.intermediary.Scan(value)
	if err != nil {
		return err
	}

	if !scanner.intermediary.Valid {
		// \"not valid\" means null, which means nil
		*scanner.destination = nil
	} else {
		microsecondsSinceEpoch := scanner.intermediary.Int64
		*scanner.destination = &timestamp.Timestamp{
			Seconds: microsecondsSinceEpoch / 1_000_000,
			Nanos:   int32(microsecondsSinceEpoch%1_000_000) * 1000}
	}

	return nil
}",
                "// intoTimestamp is a constructor for timestampScanner.
func intoTimestamp(destination **timestamp.Timestamp) timestampScanner {
	return timestampScanner{destination: destination}
}",
            ],
        },
    );

    // When a date is an output parameter in SQL, `intoDate` wraps the
    // conversion from the storage representation ("YYYY-MM-DD") to the
    // protobuf representation.
    snippets.insert(
        "intoDate",
        Snippet {
            imports: &[("database/sql", None), ("fmt", None), (DATE_PACKAGE, None)],
            declarations: &[
                "type dateScanner struct {
	destination  **date.Date
	intermediary sql.NullString // YYYY-MM-DD
}",
                "func (scanner dateScanner) Scan(value interface{}) error {
	err := scanner.intermediary.Scan(value)
	if err != nil {
		return err
	}

	if !scanner.intermediary.Valid {
		// \"not valid\" means null, which means nil
		*scanner.destination = nil
	} else {
		dateString := scanner.intermediary.String
		var result date.Date

		n, err := fmt.Sscanf(dateString, \"%d-%d-%d\", &result.Year, &result.Month, &result.Day)
		if err != nil {
			return err
		}
		if n != 3 {
			return fmt.Errorf(
				\"Failed to sscanf a date. Expected 3 fields but parsed only %d in string %s\",
				n,
				dateString)
		}

		*scanner.destination = &result
	}

	return nil
}",
                "// intoDate is a constructor for dateScanner.
func intoDate(destination **date.Date) dateScanner {
	return dateScanner{destination: destination}
}",
            ],
        },
    );

    // When a timestamp is an input parameter in SQL, `fromTimestamp`
    // wraps the conversion from the protobuf representation to the
    // storage representation (microseconds since the Unix epoch).
    snippets.insert(
        "fromTimestamp",
        Snippet {
            imports: &[("database/sql/driver", None), (TIMESTAMP_PACKAGE, None)],
            declarations: &[
                "// timestampValuer is a driver.Valuer that produces a numeric representation of a
// timestamp.Timestamp (number of microseconds since the unix epoch).
type timestampValuer struct {
	source *timestamp.Timestamp
}",
                "func (valuer timestampValuer) Value() (driver.Value, error) {
	if valuer.source == nil {
		return nil, nil
	}

	ts := *valuer.source
	var microsecondsSinceEpoch int64 = ts.Seconds*1_000_000 + int64(ts.Nanos)/1000

	return driver.Value(microsecondsSinceEpoch), nil
}",
                "// fromTimestamp is a constructor for timestampValuer.
func fromTimestamp(source *timestamp.Timestamp) timestampValuer {
	return timestampValuer{source: source}
}",
            ],
        },
    );

    // When a date is an input parameter in SQL, `fromDate` wraps the
    // conversion from the protobuf representation to the storage
    // representation ("YYYY-MM-DD").
    snippets.insert(
        "fromDate",
        Snippet {
            imports: &[
                ("database/sql/driver", None),
                ("fmt", None),
                (DATE_PACKAGE, None),
            ],
            declarations: &[
                "// dateValuer is a driver.Valuer that produces a string representation of a
// date.Date.
type dateValuer struct {
	source *date.Date
}",
                "func (valuer dateValuer) Value() (driver.Value, error) {
	if valuer.source == nil {
		return nil, nil
	}

	d := valuer.source // for brevity
	dateString := fmt.Sprintf(\"%04d-%02d-%02d\", d.Year, d.Month, d.Day)
	return driver.Value(dateString), nil
}",
                "// fromDate is a constructor for dateValuer.
func fromDate(source *date.Date) dateValuer {
	return dateValuer{source: source}
}",
            ],
        },
    );

    // There can be many enum types, each of which is just an int32 on the
    // wire. Rather than a scanner per enum type, one scanner takes a
    // flush function that encapsulates the destination's enum type at the
    // call site.
    snippets.insert(
        "intoEnum",
        Snippet {
            imports: &[("database/sql", None)],
            declarations: &[
                "type enumScanner struct {
	// flush assigns the specified int32 to the destination enum field.
	// The idea is that enumScanner doesn't know about the underlying
	// enum type. That information is encapsulated within flush.
	flush        func(int32)
	intermediary sql.NullInt64
}",
                "func (scanner enumScanner) Scan(value interface{}) error {
	if err := scanner.intermediary.Scan(value); err != nil {
		return err
	}

	var intValue int32
	if scanner.intermediary.Valid {
		intValue = int32(scanner.intermediary.Int64)
	}
	scanner.flush(intValue)
	return nil
}",
                "// intoEnum is a constructor for enumScanner.
func intoEnum(flush func(int32)) enumScanner {
	return enumScanner{flush: flush}
}",
            ],
        },
    );

    // If a query fails, the transaction has to be rolled back, and the
    // rollback itself can fail. When both fail, the two errors are
    // combined into one CompositeError so that neither cause is lost.
    snippets.insert(
        "combineErrors",
        Snippet {
            imports: &[("strings", None)],
            declarations: &[
                "// CompositeError is an error type that contains zero or more error types.
type CompositeError []error",
                "func (errs CompositeError) Error() string {
	if len(errs) == 0 {
		return \"\"
	}

	var builder strings.Builder
	i := 0
	builder.WriteString(errs[i].Error())

	for i++; i < len(errs); i++ {
		builder.WriteString(\"\\n\")
		builder.WriteString(errs[i].Error())
	}

	return builder.String()
}",
                "func combineErrors(errs ...error) CompositeError {
	var filtered []error
	for _, err := range errs {
		if err != nil {
			filtered = append(filtered, err)
		}
	}

	return CompositeError(filtered)
}",
            ],
        },
    );

    snippets.insert(
        "withTuples",
        Snippet {
            imports: &[("fmt", None), ("strings", None)],
            declarations: &[
                "// withTuples returns a string consisting of the specified sqlStatement
// followed by the specified numTuples copies of the specified sqlTuple
// separated by commas and spaces. numTuples must be greater than zero.
//
// For example, the following invocation:
//
//     withTuples(\"insert into foobar(x, y) values\", \"(?, ?)\", 3)
//
// returns the following string:
//
//     \"insert into foobar(x, y) values(?, ?), (?, ?), (?, ?)\"
//
func withTuples(sqlStatement string, sqlTuple string, numTuples int) string {
	if numTuples < 1 {
		panic(fmt.Sprintf(\"withTuples requires at least one tuple, but %d were specified\",
			numTuples))
	}

	var builder strings.Builder
	builder.WriteString(sqlStatement)
	i := 0
	builder.WriteString(sqlTuple)
	for i++; i < numTuples; i++ {
		builder.WriteString(\", \")
		builder.WriteString(sqlTuple)
	}

	return builder.String()
}",
            ],
        },
    );

    // A field_mask.FieldMask is treated as if it were a slice of strings,
    // but it's a struct containing one. fieldMaskLen and appendField are
    // like len and append for FieldMask objects.
    snippets.insert(
        "fieldMaskLen",
        Snippet {
            imports: &[(FIELD_MASK_PACKAGE, None)],
            declarations: &[
                "// fieldMaskLen returns the length of the slice of paths within the specified
// field mask, or returns zero if the mask is nil.
func fieldMaskLen(mask *field_mask.FieldMask) int {
	if mask == nil {
		return 0
	}

	return len(mask.Paths)
}",
            ],
        },
    );

    snippets.insert(
        "appendField",
        Snippet {
            imports: &[(FIELD_MASK_PACKAGE, None)],
            declarations: &[
                "// appendField adds the specified string to the end of the paths within the
// specified field mask and returns the field mask. If the field mask is nil,
// then a new field mask is first created.
func appendField(mask *field_mask.FieldMask, fieldName string) *field_mask.FieldMask {
	if mask == nil {
		mask = &field_mask.FieldMask{}
	}

	mask.Paths = append(mask.Paths, fieldName)
	return mask
}",
            ],
        },
    );

    // It is helpful to distinguish "not found" errors from other kinds of
    // errors. noRow returns an instance of an error type, NoRow, that
    // users can identify using a type switch.
    snippets.insert(
        "noRow",
        Snippet {
            imports: &[],
            declarations: &[
                "// NoRow is the error that occurs when a row is expected from SQL but none is
// available. This is \"not found\" for \"read\" operations.
type NoRow struct{}",
                "// Error returns the error message associated with the NoRow error.
func (NoRow) Error() string {
	return \"There is no corresponding row in the database.\"
}",
                "func noRow() NoRow {
	return NoRow{}
}",
            ],
        },
    );

    // ignore() is used to discard results from SQL, e.g. in the "is there
    // any row to update?" check at the beginning of update operations.
    snippets.insert(
        "ignore",
        Snippet {
            imports: &[],
            declarations: &[
                "// ignore returns an output parameter for use in sql.Rows.Scan. The returned
// value accepts any SQL value and does nothing with it.
func ignore() interface{} {
	var dummy interface{}
	var pointer interface{} = &dummy
	return pointer
}",
            ],
        },
    );

    snippets
});

/// Identifiers that, when called through a dotted path (e.g.
/// `fmt.Errorf`), imply a standard-library import.
static STANDARD_IMPORTS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    let mut imports = HashMap::new();
    imports.insert("fmt", "fmt");
    imports
});

/// Look up a registered snippet by the name generated code would call.
pub fn snippet(name: &str) -> Option<&'static Snippet> {
    PRERENDERED.get(name)
}

/// Merge one import into the file's import table, raising a hard error
/// if the same path is already bound to a different alias. This protects
/// against silent shadowing.
fn merge_import(
    file: &mut GoFile,
    package: &str,
    alias: Option<&str>,
) -> Result<(), GeneratorError> {
    if let Some(existing) = file.imports.get(package) {
        if existing.as_deref() != alias {
            return Err(GeneratorError::ImportAliasConflict {
                package: package.to_owned(),
                existing: existing.clone(),
                requested: alias.map(str::to_owned),
            });
        }
        return Ok(());
    }
    file.imports
        .insert(package.to_owned(), alias.map(str::to_owned));
    Ok(())
}

/// Search the file's declarations for references to pre-rendered helper
/// functions, then add the imports and file-level declarations necessary
/// to satisfy those references. The file is modified in place.
pub fn include_prerendered(file: &mut GoFile) -> Result<(), GeneratorError> {
    let mut referenced: Vec<&'static str> = Vec::new();
    walk_declarations(&file.declarations, &mut |expression| {
        if let Expression::Call(call) = expression {
            if let Callee::Name(name) = &call.function {
                if let Some((key, _)) = PRERENDERED.get_key_value(name.as_str()) {
                    if !referenced.contains(key) {
                        referenced.push(*key);
                    }
                }
            }
        }
    });

    for name in referenced {
        let snippet = &PRERENDERED[name];
        for (package, alias) in snippet.imports {
            merge_import(file, package, *alias)?;
        }
        for declaration in snippet.declarations {
            file.declarations
                .push(Declaration::Raw((*declaration).to_owned()));
        }
    }

    Ok(())
}

/// Search the file's declarations for calls through standard package
/// identifiers (e.g. `fmt.Errorf`) and add the corresponding bare
/// imports. The file is modified in place.
pub fn include_standard_imports(file: &mut GoFile) -> Result<(), GeneratorError> {
    let mut needed: Vec<&'static str> = Vec::new();
    walk_declarations(&file.declarations, &mut |expression| {
        if let Expression::Call(call) = expression {
            if let Callee::Dot(parts) = &call.function {
                if let Some(package) = parts.first().and_then(|head| {
                    STANDARD_IMPORTS.get(head.as_str()).copied()
                }) {
                    if !needed.contains(&package) {
                        needed.push(package);
                    }
                }
            }
        }
    });

    for package in needed {
        merge_import(file, package, None)?;
    }

    Ok(())
}

/// Walk every expression in the declarations, depth-first pre-order,
/// invoking the visitor on each node. Function variables (initial values
/// and cleanup blocks) are walked as well as statements, so a helper
/// referenced only from a deferred cleanup is still found. Raw
/// declarations are opaque text and are not searched.
fn walk_declarations<F: FnMut(&Expression)>(declarations: &[Declaration], visit: &mut F) {
    for declaration in declarations {
        if let Declaration::Function(function) = declaration {
            for variable in &function.variables {
                if let Some(value) = &variable.value {
                    walk_expression(value, visit);
                }
                if let Some(cleanup) = &variable.cleanup {
                    for statement in cleanup {
                        walk_statement(statement, visit);
                    }
                }
            }
            for statement in &function.statements {
                walk_statement(statement, visit);
            }
        }
    }
}

fn walk_statements<F: FnMut(&Expression)>(statements: &[Statement], visit: &mut F) {
    for statement in statements {
        walk_statement(statement, visit);
    }
}

fn walk_statement<F: FnMut(&Expression)>(statement: &Statement, visit: &mut F) {
    match statement {
        Statement::Expression(expression) => walk_expression(expression, visit),
        Statement::Assign { left, right } => {
            for expression in left.iter().chain(right) {
                walk_expression(expression, visit);
            }
        }
        Statement::AssignFunc { left, body, .. } => {
            walk_expression(left, visit);
            walk_statements(body, visit);
        }
        Statement::If {
            condition,
            body,
            else_body,
        } => {
            walk_expression(condition, visit);
            walk_statements(body, visit);
            if let Some(else_body) = else_body {
                walk_statements(else_body, visit);
            }
        }
        Statement::RangeFor {
            sequence, body, ..
        } => {
            walk_expression(sequence, visit);
            walk_statements(body, visit);
        }
        Statement::ConditionFor { condition, body } => {
            walk_expression(condition, visit);
            walk_statements(body, visit);
        }
        Statement::IterationFor {
            init,
            condition,
            post,
            body,
        } => {
            for slot in [init, post].into_iter().flatten() {
                walk_statement(slot, visit);
            }
            if let Some(condition) = condition {
                walk_expression(condition, visit);
            }
            walk_statements(body, visit);
        }
        Statement::Return(expressions) => {
            for expression in expressions {
                walk_expression(expression, visit);
            }
        }
        Statement::Spacer(_) => {}
        Statement::Variable { value, .. } => {
            if let Some(value) = value {
                walk_expression(value, visit);
            }
        }
        Statement::Defer(expression) => walk_expression(expression, visit),
        Statement::DeferBlock(body) => walk_statements(body, visit),
    }
}

fn walk_expression<F: FnMut(&Expression)>(expression: &Expression, visit: &mut F) {
    visit(expression);
    match expression {
        Expression::Raw(_)
        | Expression::Int(_)
        | Expression::Str(_)
        | Expression::Bool(_)
        | Expression::Nil
        | Expression::Symbol(_)
        | Expression::Dot(_) => {}
        Expression::Call(call) => {
            for argument in &call.arguments {
                walk_expression(argument, visit);
            }
            if let Some(rest) = &call.rest {
                walk_expression(rest, visit);
            }
        }
        Expression::SequenceLiteral { elements, .. } => {
            for element in elements {
                walk_expression(element, visit);
            }
        }
        Expression::Address(inner) | Expression::Not(inner) => walk_expression(inner, visit),
        Expression::Equal { left, right }
        | Expression::NotEqual { left, right }
        | Expression::And { left, right } => {
            walk_expression(left, visit);
            walk_expression(right, visit);
        }
        Expression::Index { object, index } => {
            walk_expression(object, visit);
            walk_expression(index, visit);
        }
        Expression::Callback(callback) => walk_statement(&callback.body, visit),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Function, FunctionVariable, Parameter};
    use std::collections::BTreeMap;

    fn file_with_statements(statements: Vec<Statement>) -> GoFile {
        GoFile {
            documentation: None,
            package: "crud".to_owned(),
            imports: BTreeMap::new(),
            declarations: vec![Declaration::Function(Function {
                documentation: None,
                name: "Test".to_owned(),
                parameters: vec![],
                results: vec![Parameter::named("err", "error")],
                variables: vec![],
                statements,
            })],
        }
    }

    #[test]
    fn test_registry_contents() {
        for name in [
            "intoTimestamp",
            "fromTimestamp",
            "intoDate",
            "fromDate",
            "intoEnum",
            "combineErrors",
            "withTuples",
            "fieldMaskLen",
            "appendField",
            "noRow",
            "ignore",
        ] {
            assert!(snippet(name).is_some(), "missing snippet {}", name);
        }
        assert!(snippet("intoUint64").is_none());

        let into_timestamp = snippet("intoTimestamp").unwrap();
        assert!(into_timestamp
            .imports
            .iter()
            .any(|(package, _)| *package == TIMESTAMP_PACKAGE));
    }

    #[test]
    fn test_include_referenced_helper() {
        let mut file = file_with_statements(vec![Statement::assign(
            Expression::symbol("err"),
            Expression::call("noRow", vec![]),
        )]);
        include_prerendered(&mut file).unwrap();

        // noRow's declarations were appended; nothing else was.
        assert!(file
            .declarations
            .iter()
            .any(|declaration| matches!(declaration, Declaration::Raw(text) if text.contains("type NoRow struct{}"))));
        assert!(!file
            .declarations
            .iter()
            .any(|declaration| matches!(declaration, Declaration::Raw(text) if text.contains("withTuples"))));
        assert!(file.imports.is_empty());
    }

    #[test]
    fn test_include_helper_referenced_from_cleanup() {
        let mut file = file_with_statements(vec![]);
        if let Declaration::Function(function) = &mut file.declarations[0] {
            function.variables.push(FunctionVariable {
                name: "transaction".to_owned(),
                type_name: "*sql.Tx".to_owned(),
                value: None,
                cleanup: Some(vec![Statement::assign(
                    Expression::symbol("err"),
                    Expression::call(
                        "combineErrors",
                        vec![
                            Expression::symbol("err"),
                            Expression::call_dot(&["transaction", "Rollback"], vec![]),
                        ],
                    ),
                )]),
            });
        }
        include_prerendered(&mut file).unwrap();

        assert_eq!(file.imports.get("strings"), Some(&None));
        assert!(file
            .declarations
            .iter()
            .any(|declaration| matches!(declaration, Declaration::Raw(text) if text.contains("func combineErrors"))));
    }

    #[test]
    fn test_import_alias_conflict() {
        let mut file = file_with_statements(vec![Statement::Expression(Expression::call(
            "combineErrors",
            vec![],
        ))]);
        file.imports
            .insert("strings".to_owned(), Some("str".to_owned()));
        assert!(matches!(
            include_prerendered(&mut file),
            Err(GeneratorError::ImportAliasConflict { .. })
        ));
    }

    #[test]
    fn test_standard_imports() {
        let mut file = file_with_statements(vec![Statement::assign(
            Expression::symbol("err"),
            Expression::call_dot(
                &["fmt", "Errorf"],
                vec![Expression::str("it broke")],
            ),
        )]);
        include_standard_imports(&mut file).unwrap();
        assert_eq!(file.imports.get("fmt"), Some(&None));

        // A second pass is idempotent.
        include_standard_imports(&mut file).unwrap();
        assert_eq!(file.imports.len(), 1);
    }
}

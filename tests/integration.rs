//! Integration tests for crudgen
//!
//! These tests exercise the full code generation pipeline: a JSON input
//! document goes in, Go source text comes out.

use crudgen::input::Input;
use crudgen::GeneratorError;

fn parse(json: &str) -> Input {
    serde_json::from_str(json).expect("test input should parse")
}

/// A message with one string ID field and nothing else, with the four
/// minimal instruction sequences the MySQL dialect would emit for it.
fn girl_scout_input() -> Input {
    parse(
        r#"{
            "crud": {
                ".scouts.GirlScout": {
                    "create": [
                        {"instruction": "exec",
                         "sql": "insert into `girl_scout`( `id`) values (?);",
                         "parameters": [{"field": "id"}]}
                    ],
                    "read": [
                        {"instruction": "query",
                         "sql": "select `id` from `girl_scout` where `id` = ?;",
                         "parameters": [{"field": "id"}]},
                        {"instruction": "read-row",
                         "destinations": [{"field": "id"}]}
                    ],
                    "update": [
                        {"instruction": "query",
                         "sql": "select null from `girl_scout` where `id` = ?;",
                         "parameters": [{"field": "id"}]},
                        {"instruction": "read-row",
                         "destinations": ["ignore"]}
                    ],
                    "delete": [
                        {"instruction": "exec",
                         "sql": "delete from `girl_scout` where `id` = ?;",
                         "parameters": [{"field": "id"}]}
                    ]
                }
            },
            "types": [
                {"kind": "message",
                 "file": "scouts.proto",
                 "name": ".scouts.GirlScout",
                 "idFieldName": "id",
                 "fields": [
                     {"id": 1, "name": "id", "type": {"builtin": "TYPE_STRING"}}
                 ]}
            ],
            "options": {
                "scouts.proto": {"goPackage": "example.com/scouts"}
            }
        }"#,
    )
}

/// The spec's Person: an int64 ID, a string name, and a repeated string
/// tags field stored in a child table.
fn person_input() -> Input {
    parse(
        r#"{
            "crud": {
                ".foo.Person": {
                    "create": [
                        {"instruction": "exec",
                         "sql": "insert into `person`( `id`, `name`) values (?, ?);",
                         "parameters": [{"field": "id"}, {"field": "name"}]},
                        {"instruction": "exec-with-tuples",
                         "condition": {"included": "tags"},
                         "tuple": "(?, ?)",
                         "sql": "insert into `person_tags`( `id`, `value`) values",
                         "parameters": [{"field": "id"}, {"field": "tags"}]}
                    ],
                    "read": [
                        {"instruction": "query",
                         "sql": "select `id`, `name` from `person` where `id` = ?;",
                         "parameters": [{"field": "id"}]},
                        {"instruction": "read-row",
                         "destinations": [{"field": "id"}, {"field": "name"}]},
                        {"instruction": "query",
                         "sql": "select `value` from `person_tags` where `id` = ?;",
                         "parameters": [{"field": "id"}]},
                        {"instruction": "read-array",
                         "destination": {"field": "tags"}}
                    ],
                    "update": [
                        {"instruction": "exec",
                         "sql": "update `person` set `name` = case when ? then ? else `name` end where `id` = ?;",
                         "parameters": [{"included": "name"}, {"field": "name"}, {"field": "id"}]},
                        {"instruction": "exec",
                         "condition": {"included": "tags"},
                         "sql": "delete from `person_tags` where `id` = ?;",
                         "parameters": [{"field": "id"}]},
                        {"instruction": "exec-with-tuples",
                         "condition": {"included": "tags"},
                         "tuple": "(?, ?)",
                         "sql": "insert into `person_tags`( `id`, `value`) values",
                         "parameters": [{"field": "id"}, {"field": "tags"}]}
                    ],
                    "delete": [
                        {"instruction": "exec",
                         "sql": "delete from `person_tags` where `id` = ?;",
                         "parameters": [{"field": "id"}]},
                        {"instruction": "exec",
                         "sql": "delete from `person` where `id` = ?;",
                         "parameters": [{"field": "id"}]}
                    ]
                }
            },
            "types": [
                {"kind": "message",
                 "file": "person.proto",
                 "name": ".foo.Person",
                 "idFieldName": "id",
                 "fields": [
                     {"id": 1, "name": "id", "type": {"builtin": "TYPE_INT64"}},
                     {"id": 2, "name": "name", "type": {"builtin": "TYPE_STRING"}},
                     {"id": 3, "name": "tags", "type": {"array": {"builtin": "TYPE_STRING"}}}
                 ]}
            ],
            "options": {
                "person.proto": {"goPackage": "example.com/foo"}
            }
        }"#,
    )
}

/// The text of one generated function, located by name.
fn function_section<'a>(text: &'a str, name: &str) -> &'a str {
    let start = text
        .find(&format!("func {}(", name))
        .unwrap_or_else(|| panic!("function {} not found in output", name));
    let end = text[start..]
        .find("\n}\n")
        .map(|offset| start + offset + 3)
        .unwrap_or(text.len());
    &text[start..end]
}

#[test]
fn test_round_trip_determinism() {
    let input = person_input();
    let first = crudgen::generate(&input).unwrap();
    let second = crudgen::generate(&input).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_girl_scout_create() {
    let text = crudgen::generate(&girl_scout_input()).unwrap();
    let expected = "\
// CreateGirlScout adds the specified message to the specified db, subject to the
// specified cancellation context ctx. Return nil on success, or return a
// non-nil value if an error occurs.
func CreateGirlScout(ctx context.Context, db *sql.DB, message *pb.GirlScout) (err error) {
	var transaction *sql.Tx
	defer func() {
		if err != nil && transaction != nil {
			err = combineErrors(err, transaction.Rollback())
		}
	}()

	transaction, err = db.BeginTx(ctx, nil)
	if err != nil {
		return
	}

	_, err = transaction.ExecContext(ctx, \"insert into `girl_scout`( `id`) values (?);\", message.Id)
	if err != nil {
		return
	}

	err = transaction.Commit()
	return
}
";
    assert!(
        text.contains(expected),
        "create function mismatch; output was:\n{}",
        text
    );
}

#[test]
fn test_girl_scout_read() {
    let text = crudgen::generate(&girl_scout_input()).unwrap();
    let expected = "\
func ReadGirlScout(ctx context.Context, db *sql.DB, message *pb.GirlScout) (err error) {
	var transaction *sql.Tx
	defer func() {
		if err != nil && transaction != nil {
			err = combineErrors(err, transaction.Rollback())
		}
	}()
	var rows *sql.Rows
	defer func() {
		if rows != nil {
			rows.Close()
		}
	}()
	var ok bool

	transaction, err = db.BeginTx(ctx, nil)
	if err != nil {
		return
	}

	rows, err = transaction.QueryContext(ctx, \"select `id` from `girl_scout` where `id` = ?;\", message.Id)
	if err != nil {
		return
	}
	ok = rows.Next()

	if !ok {
		err = noRow()
		return
	}

	err = rows.Scan(&message.Id)
	if err != nil {
		return
	}
	rows.Next()

	err = transaction.Commit()
	return
}
";
    assert!(
        text.contains(expected),
        "read function mismatch; output was:\n{}",
        text
    );
}

#[test]
fn test_girl_scout_delete_declares_message() {
    let text = crudgen::generate(&girl_scout_input()).unwrap();
    let expected = "\
func DeleteGirlScout(ctx context.Context, db *sql.DB, id string) (err error) {
	var message pb.GirlScout
	var transaction *sql.Tx
	defer func() {
		if err != nil && transaction != nil {
			err = combineErrors(err, transaction.Rollback())
		}
	}()

	message.Id = id
	transaction, err = db.BeginTx(ctx, nil)
	if err != nil {
		return
	}

	_, err = transaction.ExecContext(ctx, \"delete from `girl_scout` where `id` = ?;\", message.Id)
	if err != nil {
		return
	}

	err = transaction.Commit()
	return
}
";
    assert!(
        text.contains(expected),
        "delete function mismatch; output was:\n{}",
        text
    );
}

#[test]
fn test_update_boilerplate_suppressed_for_id_only_message() {
    // GirlScout's update sequence never queries inclusion, so the
    // generated UpdateGirlScout must not declare the mask lookup locals.
    let text = crudgen::generate(&girl_scout_input()).unwrap();
    let update = function_section(&text, "UpdateGirlScout");
    assert!(!update.contains("fieldMaskMap"));
    assert!(!update.contains("included"));
    // The existence probe scans into the discard sink.
    assert!(update.contains("err = rows.Scan(ignore())"));
    assert!(update.contains("err = noRow()"));
}

#[test]
fn test_person_create_scenario() {
    let text = crudgen::generate(&person_input()).unwrap();
    let create = function_section(&text, "CreatePerson");

    // One ExecContext call with plain field accesses: no marshal
    // wrappers for int64 and string.
    assert!(create.contains(
        "_, err = transaction.ExecContext(ctx, \"insert into `person`( `id`, `name`) values (?, ?);\", message.Id, message.Name)"
    ));

    // The tuple batch is guarded by the length check alone: creation
    // includes every field, so the inclusion conjunct is elided.
    assert!(create.contains("\tif len(message.Tags) != 0 {"));
    assert!(create.contains("\t\tparameters = nil"));
    assert!(create.contains("\t\tfor _, element := range message.Tags {"));
    assert!(create.contains("\t\t\tparameters = append(parameters, message.Id, element)"));
    assert!(create.contains(
        "_, err = transaction.ExecContext(ctx, withTuples(\"insert into `person_tags`( `id`, `value`) values\", \"(?, ?)\", len(message.Tags)), parameters...)"
    ));

    // Create never reads rows.
    assert!(!create.contains("rows"));
    assert!(!create.contains("Scan"));
}

#[test]
fn test_person_read_array() {
    let text = crudgen::generate(&person_input()).unwrap();
    let read = function_section(&text, "ReadPerson");

    let expected = "\
	ok = rows.Next()

	for ; ok; ok = rows.Next() {
		var temp string
		err = rows.Scan(&temp)
		if err != nil {
			return
		}
		message.Tags = append(message.Tags, temp)
	}
";
    assert!(
        read.contains(expected),
        "read-array mismatch; function was:\n{}",
        read
    );

    // The scratch cursor and row-found flag are declared exactly once
    // even though two queries and two readers reference them.
    assert_eq!(read.matches("\tvar rows *sql.Rows\n").count(), 1);
    assert_eq!(read.matches("\tvar ok bool\n").count(), 1);
    assert_eq!(read.matches("rows.Close()").count(), 1);
}

#[test]
fn test_person_update_inclusion() {
    let text = crudgen::generate(&person_input()).unwrap();
    let update = function_section(&text, "UpdatePerson");

    // The mask boilerplate, verbatim.
    let boilerplate = "\
	if len(fieldMask) == 0 {
		included = func(string) bool {
			return true
		}
	} else {
		fieldMaskMap = make(map[string]bool, len(fieldMask))
		for _, field := range fieldMask {
			fieldMaskMap[field] = true
		}
		included = func(field string) bool {
			return fieldMaskMap[field]
		}
	}
";
    assert!(
        update.contains(boilerplate),
        "mask boilerplate mismatch; function was:\n{}",
        update
    );

    // Inclusion parameters compile to included(...) calls in update.
    assert!(update.contains("included(\"name\"), message.Name"));

    // The conditional child-table delete is wrapped, and the tuple batch
    // guard conjoins inclusion with the length check.
    assert!(update.contains("\tif included(\"tags\") {"));
    assert!(update.contains("\tif included(\"tags\") && len(message.Tags) != 0 {"));

    // Update declares the mask locals after the instruction-registered
    // scratch variables.
    assert!(update.contains("\tvar parameters []interface{}\n"));
    assert!(update.contains("\tvar fieldMaskMap map[string]bool\n"));
    assert!(update.contains("\tvar included func(string) bool\n"));
}

#[test]
fn test_helper_closure_no_dead_code() {
    let text = crudgen::generate(&girl_scout_input()).unwrap();

    // Referenced helpers are pulled in…
    assert!(text.contains("func combineErrors(errs ...error) CompositeError"));
    assert!(text.contains("func noRow() NoRow"));
    assert!(text.contains("func ignore() interface{}"));

    // …and unreferenced ones are not.
    assert!(!text.contains("func withTuples"));
    assert!(!text.contains("func intoTimestamp"));
    assert!(!text.contains("func fromDate"));
    assert!(!text.contains("func intoEnum"));
    assert!(!text.contains("func fieldMaskLen"));
    assert!(!text.contains("func appendField"));
}

#[test]
fn test_imports_sorted_and_aliased() {
    let text = crudgen::generate(&girl_scout_input()).unwrap();
    let expected = "\
package crud

import (
	\"context\"
	\"database/sql\"
	pb \"example.com/scouts\"
	\"strings\"
)
";
    assert!(
        text.contains(expected),
        "import block mismatch; output was:\n{}",
        text
    );
}

#[test]
fn test_enum_marshaling() {
    let input = parse(
        r#"{
            "crud": {
                ".scouts.BoyScout": {
                    "create": [
                        {"instruction": "exec",
                         "sql": "insert into `boy_scout`( `id`, `rank`) values (?, ?);",
                         "parameters": [{"field": "id"}, {"field": "rank"}]}
                    ],
                    "read": [
                        {"instruction": "query",
                         "sql": "select `id`, `rank` from `boy_scout` where `id` = ?;",
                         "parameters": [{"field": "id"}]},
                        {"instruction": "read-row",
                         "destinations": [{"field": "id"}, {"field": "rank"}]},
                        {"instruction": "query",
                         "sql": "select `value` from `boy_scout_badges` where `id` = ?;",
                         "parameters": [{"field": "id"}]},
                        {"instruction": "read-array",
                         "destination": {"field": "badges"}}
                    ],
                    "update": [],
                    "delete": []
                }
            },
            "types": [
                {"kind": "message",
                 "file": "scouts.proto",
                 "name": ".scouts.BoyScout",
                 "idFieldName": "id",
                 "fields": [
                     {"id": 1, "name": "id", "type": {"builtin": "TYPE_STRING"}},
                     {"id": 2, "name": "rank", "type": {"enum": ".badges.Rank"}},
                     {"id": 3, "name": "badges", "type": {"array": {"enum": ".badges.Badge"}}}
                 ]},
                {"kind": "enum",
                 "file": "badges.proto",
                 "name": ".badges.Rank",
                 "values": [{"id": 0, "name": "TENDERFOOT"}]},
                {"kind": "enum",
                 "file": "badges.proto",
                 "name": ".badges.Badge",
                 "values": [{"id": 0, "name": "KNOTS"}]}
            ],
            "options": {
                "scouts.proto": {"goPackage": "example.com/scouts"},
                "badges.proto": {"goPackage": "example.com/badges"}
            }
        }"#,
    );
    let text = crudgen::generate(&input).unwrap();

    // The message's own package is first, so it gets "pb"; the enums'
    // package is second, so "pb2".
    assert!(text.contains("pb \"example.com/scouts\""));
    assert!(text.contains("pb2 \"example.com/badges\""));

    // Enum input parameters convert to int32; enum destinations scan
    // through intoEnum with a flush callback.
    assert!(text.contains("message.Id, int32(message.Rank)"));
    assert!(text
        .contains("intoEnum(func(value int32) { message.Rank = pb2.Rank(value) })"));

    // An enum array reads element-by-element through a typed temporary.
    assert!(text.contains("\t\tvar temp pb2.Badge\n"));
    assert!(text.contains("intoEnum(func(value int32) { temp = pb2.Badge(value) })"));
    assert!(text.contains("message.Badges = append(message.Badges, temp)"));

    // The helper came along.
    assert!(text.contains("func intoEnum(flush func(int32)) enumScanner"));
}

#[test]
fn test_timestamp_and_date_marshaling() {
    let input = parse(
        r#"{
            "crud": {
                ".scouts.BoyScout": {
                    "create": [
                        {"instruction": "exec",
                         "sql": "insert into `boy_scout`( `id`, `birthdate`, `join_time`) values (?, ?, ?);",
                         "parameters": [{"field": "id"}, {"field": "birthdate"}, {"field": "join_time"}]}
                    ],
                    "read": [
                        {"instruction": "query",
                         "sql": "select `id`, `birthdate`, `join_time` from `boy_scout` where `id` = ?;",
                         "parameters": [{"field": "id"}]},
                        {"instruction": "read-row",
                         "destinations": [{"field": "id"}, {"field": "birthdate"}, {"field": "join_time"}]}
                    ],
                    "update": [],
                    "delete": []
                }
            },
            "types": [
                {"kind": "message",
                 "file": "scouts.proto",
                 "name": ".scouts.BoyScout",
                 "idFieldName": "id",
                 "fields": [
                     {"id": 1, "name": "id", "type": {"builtin": "TYPE_STRING"}},
                     {"id": 2, "name": "birthdate", "type": {"builtin": ".google.type.Date"}},
                     {"id": 3, "name": "join_time", "type": {"builtin": ".google.protobuf.Timestamp"}}
                 ]}
            ],
            "options": {
                "scouts.proto": {"goPackage": "example.com/scouts"}
            }
        }"#,
    );
    let text = crudgen::generate(&input).unwrap();

    assert!(text.contains("message.Id, fromDate(message.Birthdate), fromTimestamp(message.JoinTime)"));
    assert!(text.contains("rows.Scan(&message.Id, intoDate(&message.Birthdate), intoTimestamp(&message.JoinTime))"));

    // The marshal helpers and their imports came along.
    assert!(text.contains("func fromDate(source *date.Date) dateValuer"));
    assert!(text.contains("func intoTimestamp(destination **timestamp.Timestamp) timestampScanner"));
    assert!(text.contains("\"database/sql/driver\""));
    assert!(text.contains("\"github.com/golang/protobuf/ptypes/timestamp\""));
    assert!(text.contains("\"google.golang.org/genproto/googleapis/type/date\""));
    assert!(text.contains("\"fmt\""));
}

#[test]
fn test_field_mask_vs_array_dispatch() {
    let input = parse(
        r#"{
            "crud": {
                ".foo.UpdateItem": {
                    "create": [
                        {"instruction": "exec",
                         "sql": "insert into `update_item`( `id`) values (?);",
                         "parameters": [{"field": "id"}]},
                        {"instruction": "exec-with-tuples",
                         "condition": {"included": "stuff"},
                         "tuple": "(?, ?)",
                         "sql": "insert into `update_item_stuff`( `id`, `value`) values",
                         "parameters": [{"field": "id"}, {"field": "stuff"}]}
                    ],
                    "read": [
                        {"instruction": "query",
                         "sql": "select `value` from `update_item_stuff` where `id` = ?;",
                         "parameters": [{"field": "id"}]},
                        {"instruction": "read-array",
                         "destination": {"field": "stuff"}},
                        {"instruction": "query",
                         "sql": "select `value` from `update_item_tags` where `id` = ?;",
                         "parameters": [{"field": "id"}]},
                        {"instruction": "read-array",
                         "destination": {"field": "tags"}}
                    ],
                    "update": [],
                    "delete": []
                }
            },
            "types": [
                {"kind": "message",
                 "file": "items.proto",
                 "name": ".foo.UpdateItem",
                 "idFieldName": "id",
                 "fields": [
                     {"id": 1, "name": "id", "type": {"builtin": "TYPE_STRING"}},
                     {"id": 2, "name": "stuff", "type": {"builtin": ".google.protobuf.FieldMask"}},
                     {"id": 3, "name": "tags", "type": {"array": {"builtin": "TYPE_STRING"}}}
                 ]}
            ],
            "options": {
                "items.proto": {"goPackage": "example.com/items"}
            }
        }"#,
    );
    let text = crudgen::generate(&input).unwrap();

    // Same instruction shape, different dispatch: the FieldMask
    // destination appends through appendField, the true repeated field
    // through append.
    assert!(text.contains("message.Stuff = appendField(message.Stuff, temp)"));
    assert!(text.contains("message.Tags = append(message.Tags, temp)"));

    // A FieldMask multiplicity field measures length with fieldMaskLen
    // and ranges over its Paths.
    assert!(text.contains("\tif fieldMaskLen(message.Stuff) != 0 {"));
    assert!(text.contains("\t\tfor _, element := range message.Stuff.Paths {"));
    assert!(text.contains("withTuples(\"insert into `update_item_stuff`( `id`, `value`) values\", \"(?, ?)\", fieldMaskLen(message.Stuff))"));

    assert!(text.contains("func fieldMaskLen(mask *field_mask.FieldMask) int"));
    assert!(text.contains("func appendField(mask *field_mask.FieldMask, fieldName string) *field_mask.FieldMask"));
    assert!(text.contains("\"google.golang.org/genproto/protobuf/field_mask\""));
}

#[test]
fn test_import_alias_conflict_detected() {
    // The message's goPackage collides with the "strings" import that
    // combineErrors needs, under a different alias. That must fail, not
    // silently pick one.
    let input = parse(
        r#"{
            "crud": {
                ".foo.Thing": {
                    "create": [],
                    "read": [],
                    "update": [],
                    "delete": []
                }
            },
            "types": [
                {"kind": "message",
                 "file": "thing.proto",
                 "name": ".foo.Thing",
                 "idFieldName": "id",
                 "fields": [
                     {"id": 1, "name": "id", "type": {"builtin": "TYPE_STRING"}}
                 ]}
            ],
            "options": {
                "thing.proto": {"goPackage": "strings"}
            }
        }"#,
    );
    assert!(matches!(
        crudgen::generate(&input),
        Err(GeneratorError::ImportAliasConflict { .. })
    ));
}

#[test]
fn test_missing_package_option_fails() {
    let mut input = girl_scout_input();
    input.options.clear();
    assert!(matches!(
        crudgen::generate(&input),
        Err(GeneratorError::MissingPackageOption(_))
    ));
}

#[test]
fn test_crud_for_unknown_type_fails() {
    let mut input = girl_scout_input();
    input.types.clear();
    assert!(matches!(
        crudgen::generate(&input),
        Err(GeneratorError::UnknownType(_))
    ));
}

#[test]
fn test_file_header() {
    let text = crudgen::generate(&girl_scout_input()).unwrap();
    assert!(text.starts_with(
        "// Package crud provides create/read/update/delete (CRUD) database operations\n\
         // for protocol buffer message types.\n\
         //\n\
         // This file is generated code. Please do not modify it by hand.\n\
         package crud\n"
    ));
}

//! # End-to-End SQL Tests
//!
//! Exercises the full pipeline through the public `Database` API over the
//! in-memory engine: DDL guards, INSERT forms, SELECT streaming and
//! projection, UPDATE/DELETE semantics, parameter binding, index
//! maintenance and statement atomicity.
//!
//! Expected values are written out by hand from the statement semantics,
//! not derived from running the code.

use strata::encoding::key::ordered_key;
use strata::{Database, Error, Field, FieldBuffer, MemoryEngine, Param, Value};

fn database() -> Database {
    Database::new(MemoryEngine::new()).unwrap()
}

/// Runs a query and renders the final SELECT as CSV.
fn csv(db: &Database, sql: &str, params: &[Param]) -> String {
    let mut result = db.query(sql, params).unwrap();
    let mut buf = Vec::new();
    result.to_csv(&mut buf).unwrap();
    result.close().unwrap();
    String::from_utf8(buf).unwrap()
}

fn index_entries(db: &Database, name: &str) -> Vec<(Vec<u8>, Vec<u8>)> {
    let tx = db.begin(false).unwrap();
    let (_, index) = tx.get_index(name).unwrap();
    let mut entries = Vec::new();
    index
        .ascend_greater_or_equal(None, &mut |v, k| {
            entries.push((v.to_vec(), k.to_vec()));
            Ok(())
        })
        .unwrap();
    drop(index);
    tx.rollback().unwrap();
    entries
}

mod scenarios {
    use super::*;

    #[test]
    fn insert_values_then_select_key_and_star() {
        let db = database();
        let out = csv(
            &db,
            "CREATE TABLE test; \
             INSERT INTO test (a, b, c) VALUES ('a', 'b', 'c'); \
             SELECT key(), * FROM test",
            &[],
        );
        assert_eq!(out, "1,a,b,c\n");
    }

    #[test]
    fn insert_records_evaluates_pair_expressions() {
        let db = database();
        let out = csv(
            &db,
            "CREATE TABLE test; \
             INSERT INTO test RECORDS (a: 'a', b: 2.3, c: 1 = 1); \
             SELECT key(), * FROM test",
            &[],
        );
        assert_eq!(out, "1,a,2.3,true\n");
    }

    #[test]
    fn primary_key_collisions_fail_with_duplicate_record() {
        let db = database();
        db.exec("CREATE TABLE test (foo INTEGER PRIMARY KEY)", &[])
            .unwrap();
        db.exec("INSERT INTO test (bar, foo) VALUES (1, 2)", &[])
            .unwrap();
        let err = db
            .exec("INSERT INTO test (bar, foo) VALUES (1, 2)", &[])
            .unwrap_err();
        assert!(
            Error::DuplicateRecord.is(&err),
            "second insert with the same key SHOULD fail with DuplicateRecord"
        );

        // a record without the primary key field is rejected outright
        assert!(db.exec("INSERT INTO test (bar) VALUES (1)", &[]).is_err());
    }

    #[test]
    fn unique_index_violation_rolls_the_statement_back() {
        let db = database();
        db.exec("CREATE TABLE t; CREATE UNIQUE INDEX idx ON t (a)", &[])
            .unwrap();
        db.exec("INSERT INTO t (a) VALUES (1)", &[]).unwrap();
        let err = db.exec("INSERT INTO t (a) VALUES (1)", &[]).unwrap_err();
        assert!(Error::DuplicateIndexValue.is(&err));

        assert_eq!(csv(&db, "SELECT a FROM t", &[]), "1\n");
        assert_eq!(index_entries(&db, "idx").len(), 1);
    }

    #[test]
    fn update_then_order_by() {
        let db = database();
        db.exec("CREATE TABLE t; INSERT INTO t (a) VALUES (1), (2), (3)", &[])
            .unwrap();
        db.exec("UPDATE t SET a = 10 WHERE a = 2", &[]).unwrap();
        assert_eq!(csv(&db, "SELECT a FROM t ORDER BY a", &[]), "1\n3\n10\n");
    }

    #[test]
    fn delete_maintains_the_index_pointwise() {
        let db = database();
        db.exec(
            "CREATE TABLE t; \
             CREATE INDEX idx_a ON t (a); \
             INSERT INTO t (a, b) VALUES ('x', 1), ('y', 2), ('x', 3)",
            &[],
        )
        .unwrap();
        db.exec("DELETE FROM t WHERE a = 'x'", &[]).unwrap();

        assert_eq!(csv(&db, "SELECT key(), * FROM t", &[]), "2,y,2\n");

        let entries = index_entries(&db, "idx_a");
        assert_eq!(entries.len(), 1, "only the 'y' entry SHOULD remain");
        assert_eq!(
            entries[0].0,
            ordered_key(&Value::string("y")).unwrap().unwrap()
        );
    }
}

mod ddl {
    use super::*;

    #[test]
    fn create_table_guard_swallows_only_with_if_not_exists() {
        let db = database();
        db.exec("CREATE TABLE t", &[]).unwrap();
        db.exec("CREATE TABLE IF NOT EXISTS t", &[]).unwrap();
        let err = db.exec("CREATE TABLE t", &[]).unwrap_err();
        assert!(Error::TableAlreadyExists.is(&err));
    }

    #[test]
    fn create_index_guard_swallows_only_with_if_not_exists() {
        let db = database();
        db.exec("CREATE TABLE t; CREATE INDEX idx ON t (a)", &[])
            .unwrap();
        db.exec("CREATE INDEX IF NOT EXISTS idx ON t (a)", &[])
            .unwrap();
        let err = db.exec("CREATE INDEX idx ON t (a)", &[]).unwrap_err();
        assert!(Error::IndexAlreadyExists.is(&err));
    }

    #[test]
    fn drop_table_and_drop_index_honor_if_exists() {
        let db = database();
        assert!(Error::TableNotFound.is(&db.exec("DROP TABLE t", &[]).unwrap_err()));
        db.exec("DROP TABLE IF EXISTS t", &[]).unwrap();
        assert!(Error::IndexNotFound.is(&db.exec("DROP INDEX idx", &[]).unwrap_err()));
        db.exec("DROP INDEX IF EXISTS idx", &[]).unwrap();

        db.exec("CREATE TABLE t; INSERT INTO t (a) VALUES (1)", &[])
            .unwrap();
        db.exec("DROP TABLE t", &[]).unwrap();
        db.exec("CREATE TABLE t", &[]).unwrap();
        assert_eq!(csv(&db, "SELECT * FROM t", &[]), "");
    }

    #[test]
    fn create_index_backfills_existing_records() {
        let db = database();
        db.exec("CREATE TABLE t; INSERT INTO t (a) VALUES ('x'), ('y')", &[])
            .unwrap();
        db.exec("CREATE INDEX idx_a ON t (a)", &[]).unwrap();
        assert_eq!(index_entries(&db, "idx_a").len(), 2);
    }
}

mod inserts {
    use super::*;

    #[test]
    fn values_without_a_field_list_fail() {
        let db = database();
        db.exec("CREATE TABLE test", &[]).unwrap();
        assert!(db
            .exec("INSERT INTO test VALUES ('a', 'b')", &[])
            .is_err());
    }

    #[test]
    fn arity_mismatch_is_rejected() {
        let db = database();
        db.exec("CREATE TABLE test", &[]).unwrap();
        let err = db
            .exec("INSERT INTO test (a, b) VALUES ('c', 'd', 'e')", &[])
            .unwrap_err();
        assert!(Error::ArityMismatch {
            expected: 2,
            found: 3
        }
        .is(&err));
    }

    #[test]
    fn identifiers_in_values_position_are_errors() {
        let db = database();
        db.exec("CREATE TABLE test", &[]).unwrap();
        assert!(db.exec("INSERT INTO test (a) VALUES (a)", &[]).is_err());
        // double quotes are identifiers, not strings
        assert!(db.exec(r#"INSERT INTO test (a) VALUES ("a")"#, &[]).is_err());
    }

    #[test]
    fn quoted_field_names_are_plain_fields() {
        let db = database();
        let out = csv(
            &db,
            "CREATE TABLE test; \
             INSERT INTO test (a, \"foo bar\") VALUES ('c', 'd'); \
             SELECT key(), * FROM test",
            &[],
        );
        assert_eq!(out, "1,c,d\n");
    }

    #[test]
    fn record_lists_and_duplicate_keys_are_rejected() {
        let db = database();
        db.exec("CREATE TABLE test", &[]).unwrap();
        assert!(db
            .exec("INSERT INTO test RECORDS (a: (1, 2, 3))", &[])
            .is_err());
        assert!(db
            .exec("INSERT INTO test (a) VALUES ((1, 2, 3))", &[])
            .is_err());
        assert!(db
            .exec("INSERT INTO test RECORDS (a: 1, a: 2)", &[])
            .is_err());
    }

    #[test]
    fn multi_row_insert_reports_rows_and_last_key() {
        let db = database();
        db.exec("CREATE TABLE t", &[]).unwrap();
        let mut result = db
            .query("INSERT INTO t (a) VALUES (1), (2), (3)", &[])
            .unwrap();
        assert_eq!(result.rows_affected(), 3);
        assert_eq!(result.last_insert_key(), Some(Value::int64(3).data.as_slice()));
        result.close().unwrap();
    }
}

mod params {
    use super::*;

    #[test]
    fn positional_params_bind_in_order() {
        let db = database();
        let out = csv(
            &db,
            "CREATE TABLE test; \
             INSERT INTO test (a, b, c) VALUES (?, 'e', ?); \
             SELECT key(), * FROM test",
            &[Param::new("d"), Param::new("f")],
        );
        assert_eq!(out, "1,d,e,f\n");
    }

    #[test]
    fn named_params_bind_by_name_in_any_order() {
        let db = database();
        let out = csv(
            &db,
            "CREATE TABLE test; \
             INSERT INTO test (a, b, c) VALUES ($d, 'e', $f); \
             SELECT key(), * FROM test",
            &[Param::named("f", "f"), Param::named("d", "d")],
        );
        assert_eq!(out, "1,d,e,f\n");
    }

    #[test]
    fn missing_bindings_fail() {
        let db = database();
        db.exec("CREATE TABLE test", &[]).unwrap();
        assert!(db
            .exec("INSERT INTO test (a, b) VALUES ('d', ?)", &[])
            .is_err());
        assert!(db
            .exec("INSERT INTO test (a) VALUES ($nope)", &[Param::new(1i64)])
            .is_err());
    }

    #[test]
    fn records_bind_whole_record_params() {
        let db = database();
        db.exec("CREATE TABLE test", &[]).unwrap();

        let mut rec = FieldBuffer::new();
        rec.add(Field::new("a", Value::string("a")))
            .add(Field::new("b", Value::float64(2.3)));
        db.exec("INSERT INTO test RECORDS ?", &[Param::record(rec)])
            .unwrap();
        assert_eq!(csv(&db, "SELECT key(), * FROM test", &[]), "1,a,2.3\n");

        // a scalar argument cannot stand in for a record
        let err = db
            .exec("INSERT INTO test RECORDS ?", &[Param::new(1i64)])
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::TypeMismatch(_))
        ));
    }

    #[test]
    fn where_clauses_accept_params() {
        let db = database();
        db.exec("CREATE TABLE t; INSERT INTO t (a) VALUES (1), (2), (3)", &[])
            .unwrap();
        assert_eq!(
            csv(&db, "SELECT a FROM t WHERE a = ?", &[Param::new(2i64)]),
            "2\n"
        );
    }
}

mod selects {
    use super::*;

    #[test]
    fn where_filters_and_projection() {
        let db = database();
        db.exec(
            "CREATE TABLE t; INSERT INTO t (a, b) VALUES (1, 'x'), (2, 'y'), (3, 'z')",
            &[],
        )
        .unwrap();
        assert_eq!(csv(&db, "SELECT b FROM t WHERE a >= 2", &[]), "y\nz\n");
        assert_eq!(csv(&db, "SELECT b, a FROM t WHERE b = 'y'", &[]), "y,2\n");
    }

    #[test]
    fn limit_and_offset_apply_after_filters() {
        let db = database();
        db.exec(
            "CREATE TABLE t; INSERT INTO t (a) VALUES (1), (2), (3), (4), (5)",
            &[],
        )
        .unwrap();
        assert_eq!(
            csv(&db, "SELECT a FROM t WHERE a > 1 LIMIT 2 OFFSET 1", &[]),
            "3\n4\n"
        );
        assert_eq!(csv(&db, "SELECT a FROM t LIMIT 0", &[]), "");
    }

    #[test]
    fn order_by_sorts_missing_fields_first_ascending() {
        let db = database();
        db.exec(
            "CREATE TABLE t; \
             INSERT INTO t RECORDS (a: 1, b: 'two'), (a: 2), (a: 3, b: 'one')",
            &[],
        )
        .unwrap();
        assert_eq!(csv(&db, "SELECT a FROM t ORDER BY b", &[]), "2\n3\n1\n");
        assert_eq!(csv(&db, "SELECT a FROM t ORDER BY b DESC", &[]), "1\n3\n2\n");
    }

    #[test]
    fn order_by_applies_before_limit_and_offset() {
        let db = database();
        db.exec(
            "CREATE TABLE t; INSERT INTO t (a) VALUES (3), (1), (5), (2), (4)",
            &[],
        )
        .unwrap();
        assert_eq!(
            csv(&db, "SELECT a FROM t ORDER BY a DESC LIMIT 2 OFFSET 1", &[]),
            "4\n3\n"
        );
    }

    #[test]
    fn selecting_from_a_missing_table_fails_eagerly() {
        let db = database();
        let err = db.query("SELECT * FROM nope", &[]).err().unwrap();
        assert!(Error::TableNotFound.is(&err));
    }

    #[test]
    fn is_null_and_in_predicates() {
        let db = database();
        db.exec(
            "CREATE TABLE t; INSERT INTO t RECORDS (a: 1, b: 'x'), (a: 2)",
            &[],
        )
        .unwrap();
        assert_eq!(csv(&db, "SELECT a FROM t WHERE b IS NULL", &[]), "2\n");
        assert_eq!(csv(&db, "SELECT a FROM t WHERE b IS NOT NULL", &[]), "1\n");
        assert_eq!(csv(&db, "SELECT a FROM t WHERE a IN (2, 9)", &[]), "2\n");
    }
}

mod index_usage {
    use super::*;

    #[test]
    fn indexed_lookups_find_rows_inserted_with_other_widths() {
        let db = database();
        db.exec(
            "CREATE TABLE t; CREATE INDEX idx_a ON t (a); \
             INSERT INTO t (a) VALUES (1), (300), (70000)",
            &[],
        )
        .unwrap();
        // literal 1 types as Int8, 300 as Int16, 70000 as Int32; an Int64
        // parameter probe must still find them through the index
        assert_eq!(
            csv(&db, "SELECT a FROM t WHERE a = ?", &[Param::new(300i64)]),
            "300\n"
        );
        assert_eq!(
            csv(&db, "SELECT a FROM t WHERE a > 1 ORDER BY a", &[]),
            "300\n70000\n"
        );
    }

    #[test]
    fn primary_key_lookup_returns_the_single_row() {
        let db = database();
        db.exec(
            "CREATE TABLE t (id INTEGER PRIMARY KEY); \
             INSERT INTO t (id, a) VALUES (1, 'x'), (2, 'y')",
            &[],
        )
        .unwrap();
        assert_eq!(csv(&db, "SELECT key(), a FROM t WHERE id = 2", &[]), "2,y\n");
        assert_eq!(csv(&db, "SELECT a FROM t WHERE id = 99", &[]), "");
    }

    #[test]
    fn update_keeps_indexes_in_sync() {
        let db = database();
        db.exec(
            "CREATE TABLE t; CREATE INDEX idx_a ON t (a); \
             INSERT INTO t (a) VALUES ('x'), ('y')",
            &[],
        )
        .unwrap();
        db.exec("UPDATE t SET a = 'z' WHERE a = 'x'", &[]).unwrap();

        let entries = index_entries(&db, "idx_a");
        assert_eq!(entries.len(), 2);
        assert_eq!(csv(&db, "SELECT a FROM t WHERE a = 'z'", &[]), "z\n");
        assert_eq!(csv(&db, "SELECT a FROM t WHERE a = 'x'", &[]), "");
    }

    #[test]
    fn string_values_containing_the_separator_byte_roundtrip() {
        let db = database();
        db.exec("CREATE TABLE t; CREATE INDEX idx_a ON t (a)", &[])
            .unwrap();
        db.exec(
            "INSERT INTO t (a) VALUES (?), (?)",
            &[
                Param::new("a\u{1e}b"),
                Param::new("a\u{1e}b\u{1e}c"),
            ],
        )
        .unwrap();
        assert_eq!(
            csv(
                &db,
                "SELECT key() FROM t WHERE a = ?",
                &[Param::new("a\u{1e}b")]
            ),
            "1\n"
        );
        db.exec(
            "DELETE FROM t WHERE a = ?",
            &[Param::new("a\u{1e}b\u{1e}c")],
        )
        .unwrap();
        assert_eq!(index_entries(&db, "idx_a").len(), 1);
    }
}

mod atomicity {
    use super::*;

    #[test]
    fn a_failing_statement_leaves_no_partial_writes() {
        let db = database();
        db.exec(
            "CREATE TABLE t; CREATE UNIQUE INDEX idx ON t (a); \
             INSERT INTO t (a) VALUES (5)",
            &[],
        )
        .unwrap();

        // the first row of this insert succeeds before the second hits the
        // unique constraint; the rollback must discard both
        let err = db
            .exec("INSERT INTO t (a) VALUES (6), (5)", &[])
            .unwrap_err();
        assert!(Error::DuplicateIndexValue.is(&err));

        assert_eq!(csv(&db, "SELECT a FROM t", &[]), "5\n");
        assert_eq!(index_entries(&db, "idx").len(), 1);
    }

    #[test]
    fn earlier_statements_of_a_query_commit_independently() {
        let db = database();
        let err = db
            .exec(
                "CREATE TABLE t; INSERT INTO t (a) VALUES (1); SELECT * FROM missing",
                &[],
            )
            .unwrap_err();
        assert!(Error::TableNotFound.is(&err));
        // the create and the insert each committed before the failure
        assert_eq!(csv(&db, "SELECT a FROM t", &[]), "1\n");
    }
}

mod transactions {
    use super::*;

    #[test]
    fn view_rejects_writes_without_promotion() {
        let db = database();
        db.exec("CREATE TABLE t", &[]).unwrap();
        let err = db
            .view(|tx| tx.exec("INSERT INTO t (a) VALUES (1)", &[]))
            .unwrap_err();
        assert!(Error::TransactionReadOnly.is(&err));
        assert_eq!(csv(&db, "SELECT * FROM t", &[]), "");
    }

    #[test]
    fn read_only_transactions_promote_for_writes() {
        let db = database();
        db.exec("CREATE TABLE t", &[]).unwrap();
        let mut tx = db.begin(false).unwrap();
        tx.exec("INSERT INTO t (a) VALUES (1)", &[]).unwrap();
        assert!(tx.writable());
        tx.commit().unwrap();
        assert_eq!(csv(&db, "SELECT a FROM t", &[]), "1\n");
    }

    #[test]
    fn update_scope_runs_multiple_statements_in_one_transaction() {
        let db = database();
        db.update(|tx| {
            tx.exec("CREATE TABLE t", &[])?;
            tx.exec("INSERT INTO t (a) VALUES (1)", &[])?;
            let mut result = tx.query("SELECT a FROM t", &[])?;
            let mut rows = 0;
            result.iterate(|_| {
                rows += 1;
                Ok(())
            })?;
            result.close()?;
            assert_eq!(rows, 1);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn queries_in_aborted_update_scopes_leave_nothing_behind() {
        let db = database();
        let res: eyre::Result<()> = db.update(|tx| {
            tx.exec("CREATE TABLE t; INSERT INTO t (a) VALUES (1)", &[])?;
            eyre::bail!("abort")
        });
        assert!(res.is_err());
        assert!(Error::TableNotFound.is(&db.query("SELECT * FROM t", &[]).err().unwrap()));
    }
}

mod results {
    use super::*;

    #[test]
    fn results_are_single_shot_and_close_once() {
        let db = database();
        db.exec("CREATE TABLE t; INSERT INTO t (a) VALUES (1)", &[])
            .unwrap();

        let mut result = db.query("SELECT a FROM t", &[]).unwrap();
        result.iterate(|_| Ok(())).unwrap();
        assert!(
            result.iterate(|_| Ok(())).is_err(),
            "streams are not restartable"
        );
        result.close().unwrap();
        assert!(Error::ResultClosed.is(&result.close().unwrap_err()));
        assert!(Error::ResultClosed.is(&result.iterate(|_| Ok(())).unwrap_err()));
    }

    #[test]
    fn dropping_an_unclosed_result_rolls_its_transaction_back() {
        let db = database();
        db.exec("CREATE TABLE t", &[]).unwrap();
        {
            let _result = db
                .query("INSERT INTO t (a) VALUES (1)", &[])
                .unwrap();
            // dropped without close: the insert is rolled back
        }
        assert_eq!(csv(&db, "SELECT * FROM t", &[]), "");
    }

    #[test]
    fn user_callback_errors_stop_iteration_verbatim() {
        let db = database();
        db.exec("CREATE TABLE t; INSERT INTO t (a) VALUES (1), (2)", &[])
            .unwrap();
        let mut result = db.query("SELECT a FROM t", &[]).unwrap();
        let mut seen = 0;
        let err = result
            .iterate(|_| {
                seen += 1;
                eyre::bail!("enough")
            })
            .unwrap_err();
        assert_eq!(err.to_string(), "enough");
        assert_eq!(seen, 1);
        result.close().unwrap();
    }
}

mod errors {
    use super::*;
    use strata::ParseError;

    #[test]
    fn parse_errors_surface_with_positions() {
        let db = database();
        let err = db.exec("SELEC * FROM t", &[]).unwrap_err();
        let parse_err = err.downcast_ref::<ParseError>().unwrap();
        assert_eq!(parse_err.pos.line, 1);
        assert_eq!(parse_err.pos.column, 1);
    }

    #[test]
    fn record_fields_resolve_through_the_public_trait() {
        let db = database();
        db.exec("CREATE TABLE t; INSERT INTO t (a, b) VALUES ('x', 2)", &[])
            .unwrap();
        let mut result = db.query("SELECT * FROM t", &[]).unwrap();
        result
            .iterate(|record| {
                assert_eq!(record.field("a")?.value, Value::string("x"));
                assert_eq!(record.field("b")?.value, Value::int8(2));
                assert!(Error::FieldNotFound.is(&record.field("zzz").unwrap_err()));
                Ok(())
            })
            .unwrap();
        result.close().unwrap();
    }
}

//! End-to-end tests running composed SQLite statements against a real database
//!
//! These tests:
//! 1. Create an in-memory SQLite database from the generated DDL
//! 2. Insert sample data through composed inserts
//! 3. Compose queries, bind their parameters and execute them
//! 4. Verify the rows that come back

use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, Result as SqliteResult};

use ormsql::sql::{
    create_crm_schema, ComposerConfig, DdlGenerator, QueryComposer, SchemaMetadata, SqlDialect,
};
use ormsql::{
    ArithmeticOp, ComparisonOp, ComposedQuery, DeleteBuilder, Direction, Expression, Filter,
    InsertBuilder, Join, Operand, Query, SelectBuilder, UpdateBuilder, Value,
};
use pretty_assertions::assert_eq;

fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Int(i) => SqlValue::Integer(*i),
        Value::Float(f) => SqlValue::Real(*f),
        Value::String(s) => SqlValue::Text(s.clone()),
    }
}

fn composer(schema: &SchemaMetadata) -> QueryComposer<'_> {
    QueryComposer::new(schema, SqlDialect::Sqlite, ComposerConfig::default())
}

/// Compose and execute a statement, returning the affected row count
fn execute(conn: &Connection, schema: &SchemaMetadata, query: impl Into<Query>) -> usize {
    let composed = composer(schema).compose(&query.into()).unwrap();
    run(conn, &composed).unwrap()
}

fn run(conn: &Connection, composed: &ComposedQuery) -> SqliteResult<usize> {
    conn.execute(
        &composed.sql,
        params_from_iter(composed.parameters.iter().map(to_sql_value)),
    )
}

/// Compose a select and collect every row as SQL values
fn fetch_with(composer: &QueryComposer<'_>, conn: &Connection, query: &Query) -> Vec<Vec<SqlValue>> {
    let composed = composer.compose(query).unwrap();
    let mut stmt = conn.prepare(&composed.sql).unwrap();
    let width = stmt.column_count();
    let rows = stmt
        .query_map(
            params_from_iter(composed.parameters.iter().map(to_sql_value)),
            |row| {
                (0..width)
                    .map(|i| row.get::<_, SqlValue>(i))
                    .collect::<SqliteResult<Vec<_>>>()
            },
        )
        .unwrap();
    rows.collect::<SqliteResult<Vec<_>>>().unwrap()
}

fn fetch(conn: &Connection, schema: &SchemaMetadata, query: impl Into<Query>) -> Vec<Vec<SqlValue>> {
    fetch_with(&composer(schema), conn, &query.into())
}

/// First column of every row, as text
fn fetch_texts(conn: &Connection, schema: &SchemaMetadata, query: impl Into<Query>) -> Vec<String> {
    fetch(conn, schema, query)
        .into_iter()
        .map(|row| match row.into_iter().next() {
            Some(SqlValue::Text(s)) => s,
            other => panic!("expected text, got {:?}", other),
        })
        .collect()
}

fn text(s: &str) -> SqlValue {
    SqlValue::Text(s.to_string())
}

/// Set up the database with the CRM tables and sample data
fn setup_database(schema: &SchemaMetadata) -> SqliteResult<Connection> {
    let conn = Connection::open_in_memory()?;

    let ddl = DdlGenerator::new(SqlDialect::Sqlite).generate_schema(schema);
    for statement in ddl.split(';') {
        let trimmed = statement.trim();
        if !trimmed.is_empty() {
            conn.execute(trimmed, [])?;
        }
    }

    let users = InsertBuilder::new("User")
        .columns(["id", "userName", "isActive", "deleted"])
        .row([Value::from("u1"), "admin".into(), true.into(), false.into()])
        .row([Value::from("u2"), "sales".into(), true.into(), false.into()])
        .build()
        .unwrap();

    let accounts = InsertBuilder::new("Account")
        .columns(["id", "name", "type", "billingCity", "employees", "annualRevenue", "createdById", "deleted"])
        .row([Value::from("a1"), "Acme".into(), "Customer".into(), "Oslo".into(), 120.into(), 1_500_000.0.into(), "u1".into(), false.into()])
        .row([Value::from("a2"), "Globex".into(), "Partner".into(), "Bergen".into(), 40.into(), 250_000.0.into(), "u2".into(), false.into()])
        .row([Value::from("a3"), "Initech".into(), "Customer".into(), "Oslo".into(), 15.into(), Value::Null, "u1".into(), true.into()])
        .build()
        .unwrap();

    let contacts = InsertBuilder::new("Contact")
        .columns(["id", "firstName", "lastName", "emailAddress", "birthday", "accountId", "deleted"])
        .row([Value::from("c1"), "John".into(), "Smith".into(), "john@acme.test".into(), "1980-04-02".into(), "a1".into(), false.into()])
        .row([Value::from("c2"), "Jane".into(), "Doe".into(), "jane@acme.test".into(), Value::Null, "a1".into(), false.into()])
        .row([Value::from("c3"), "Bob".into(), "Brown".into(), Value::Null, Value::Null, "a2".into(), false.into()])
        .row([Value::from("c4"), "Ann".into(), "Orphan".into(), Value::Null, Value::Null, Value::Null, false.into()])
        .build()
        .unwrap();

    let posts = InsertBuilder::new("Post")
        .columns(["id", "name", "body", "createdById", "deleted"])
        .row([Value::from("p1"), "Composing SQL".into(), "...".into(), "u1".into(), false.into()])
        .row([Value::from("p2"), "Upserts".into(), "...".into(), "u2".into(), false.into()])
        .row([Value::from("p3"), "Drafts".into(), "...".into(), "u1".into(), false.into()])
        .build()
        .unwrap();

    let tags = InsertBuilder::new("Tag")
        .columns(["id", "name", "deleted"])
        .row([Value::from("t1"), "rust".into(), false.into()])
        .row([Value::from("t2"), "sql".into(), false.into()])
        .row([Value::from("t3"), "legacy".into(), true.into()])
        .build()
        .unwrap();

    let post_tags = InsertBuilder::new("PostTag")
        .columns(["id", "postId", "tagId", "deleted"])
        .row([Value::from("pt1"), "p1".into(), "t1".into(), false.into()])
        .row([Value::from("pt2"), "p1".into(), "t2".into(), false.into()])
        .row([Value::from("pt3"), "p2".into(), "t2".into(), false.into()])
        .row([Value::from("pt4"), "p3".into(), "t3".into(), true.into()])
        .build()
        .unwrap();

    let comments = InsertBuilder::new("Comment")
        .columns(["id", "postId", "body", "likes", "deleted"])
        .row([Value::from("m1"), "p1".into(), "Nice".into(), 3.into(), false.into()])
        .row([Value::from("m2"), "p1".into(), "Agreed".into(), 0.into(), false.into()])
        .row([Value::from("m3"), "p2".into(), "Hm".into(), 1.into(), false.into()])
        .build()
        .unwrap();

    let composer = composer(schema);
    for query in [
        Query::from(users),
        accounts.into(),
        contacts.into(),
        posts.into(),
        tags.into(),
        post_tags.into(),
        comments.into(),
    ] {
        run(&conn, &composer.compose(&query).unwrap())?;
    }

    Ok(conn)
}

// ==================== Schema ====================

#[test]
fn test_ddl_creates_every_table() {
    let schema = create_crm_schema();
    let conn = setup_database(&schema).unwrap();

    let tables: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(tables, schema.len() as i64);

    let drop = DdlGenerator::new(SqlDialect::Sqlite).generate_drop_schema(&schema);
    conn.execute_batch(&drop).unwrap();
    let tables: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(tables, 0);
}

// ==================== Selects ====================

#[test]
fn test_select_all_fields() {
    let schema = create_crm_schema();
    let conn = setup_database(&schema).unwrap();

    let rows = fetch(
        &conn,
        &schema,
        SelectBuilder::new("Tag")
            .order_by("id", Direction::Asc)
            .build()
            .unwrap(),
    );
    assert_eq!(
        rows,
        vec![
            vec![text("t1"), text("rust"), SqlValue::Integer(0)],
            vec![text("t2"), text("sql"), SqlValue::Integer(0)],
            vec![text("t3"), text("legacy"), SqlValue::Integer(1)],
        ]
    );
}

#[test]
fn test_belongs_to_join() {
    let schema = create_crm_schema();
    let conn = setup_database(&schema).unwrap();

    let query = SelectBuilder::new("Contact")
        .select(["lastName", "account.name"])
        .join(Join::left("account"))
        .filter(Filter::eq("account.billingCity", "Oslo"))
        .order_by("lastName", Direction::Asc)
        .build()
        .unwrap();

    assert_eq!(
        fetch(&conn, &schema, query),
        vec![
            vec![text("Doe"), text("Acme")],
            vec![text("Smith"), text("Acme")],
        ]
    );
}

#[test]
fn test_left_join_keeps_unmatched_rows() {
    let schema = create_crm_schema();
    let conn = setup_database(&schema).unwrap();

    let query = SelectBuilder::new("Contact")
        .select(["lastName"])
        .join(Join::left("account"))
        .filter(Filter::is_null("account.id"))
        .build()
        .unwrap();

    assert_eq!(fetch_texts(&conn, &schema, query), vec!["Orphan"]);
}

#[test]
fn test_many_to_many_join() {
    let schema = create_crm_schema();
    let conn = setup_database(&schema).unwrap();

    let query = SelectBuilder::new("Post")
        .distinct()
        .select(["name"])
        .join(Join::inner("tags"))
        .filter(Filter::eq("tags.name", "sql"))
        .order_by("name", Direction::Asc)
        .build()
        .unwrap();

    assert_eq!(
        fetch_texts(&conn, &schema, query),
        vec!["Composing SQL", "Upserts"]
    );

    let query = SelectBuilder::new("Tag")
        .select(["name"])
        .join(Join::inner("posts"))
        .filter(Filter::eq("posts.id", "p1"))
        .order_by("name", Direction::Asc)
        .build()
        .unwrap();

    assert_eq!(fetch_texts(&conn, &schema, query), vec!["rust", "sql"]);
}

#[test]
fn test_has_many_aggregate() {
    let schema = create_crm_schema();
    let conn = setup_database(&schema).unwrap();

    let query = SelectBuilder::new("Post")
        .select(["name"])
        .select_as(Expression::count("comments.id"), "comments")
        .select_as(Expression::sum("comments.likes"), "likes")
        .join(Join::left("comments"))
        .group_by("id")
        .group_by("name")
        .having(Filter::compare(
            Expression::count("comments.id"),
            ComparisonOp::Greater,
            Operand::Value(Value::Int(0)),
        ))
        .order_by(Expression::count("comments.id"), Direction::Desc)
        .build()
        .unwrap();

    assert_eq!(
        fetch(&conn, &schema, query),
        vec![
            vec![text("Composing SQL"), SqlValue::Integer(2), SqlValue::Integer(3)],
            vec![text("Upserts"), SqlValue::Integer(1), SqlValue::Integer(1)],
        ]
    );
}

#[test]
fn test_chained_join_through_post() {
    let schema = create_crm_schema();
    let conn = setup_database(&schema).unwrap();

    let query = SelectBuilder::new("Comment")
        .select(["id", "post.createdBy.userName"])
        .join(Join::inner("post"))
        .join(Join::inner("createdBy").from_alias("post"))
        .order_by("id", Direction::Asc)
        .build()
        .unwrap();

    assert_eq!(
        fetch(&conn, &schema, query),
        vec![
            vec![text("m1"), text("admin")],
            vec![text("m2"), text("admin")],
            vec![text("m3"), text("sales")],
        ]
    );
}

#[test]
fn test_correlated_exists_and_in_subquery() {
    let schema = create_crm_schema();
    let conn = setup_database(&schema).unwrap();

    let with_contacts = SelectBuilder::new("Contact")
        .select(["id"])
        .filter(Filter::columns_eq("accountId", "a.id"))
        .build()
        .unwrap();
    let query = SelectBuilder::new("Account")
        .alias("a")
        .select(["name"])
        .filter(Filter::exists(with_contacts))
        .order_by("name", Direction::Asc)
        .build()
        .unwrap();
    assert_eq!(fetch_texts(&conn, &schema, query), vec!["Acme", "Globex"]);

    let customers = SelectBuilder::new("Account")
        .select(["id"])
        .filter(Filter::eq("type", "Customer"))
        .build()
        .unwrap();
    let query = SelectBuilder::new("Contact")
        .select(["firstName"])
        .filter(Filter::in_subquery("accountId", customers))
        .filter(Filter::is_not_null("emailAddress"))
        .order_by("firstName", Direction::Asc)
        .build()
        .unwrap();
    assert_eq!(fetch_texts(&conn, &schema, query), vec!["Jane", "John"]);
}

#[test]
fn test_null_and_empty_list_filters() {
    let schema = create_crm_schema();
    let conn = setup_database(&schema).unwrap();

    let query = SelectBuilder::new("Contact")
        .select(["id"])
        .filter(Filter::eq("birthday", Value::Null))
        .order_by("id", Direction::Asc)
        .build()
        .unwrap();
    assert_eq!(fetch_texts(&conn, &schema, query), vec!["c2", "c3", "c4"]);

    let query = SelectBuilder::new("Contact")
        .select(["id"])
        .filter(Filter::in_list("id", Vec::<String>::new()))
        .build()
        .unwrap();
    assert!(fetch(&conn, &schema, query).is_empty());

    let query = SelectBuilder::new("Contact")
        .select(["id"])
        .filter(Filter::not_in("id", Vec::<String>::new()))
        .build()
        .unwrap();
    assert_eq!(fetch(&conn, &schema, query).len(), 4);
}

#[test]
fn test_or_inside_and() {
    let schema = create_crm_schema();
    let conn = setup_database(&schema).unwrap();

    let query = SelectBuilder::new("Account")
        .select(["name"])
        .filter(Filter::and(vec![
            Filter::or(vec![
                Filter::eq("billingCity", "Bergen"),
                Filter::gt("employees", 100),
            ]),
            Filter::eq("deleted", false),
        ]))
        .order_by("name", Direction::Asc)
        .build()
        .unwrap();

    assert_eq!(fetch_texts(&conn, &schema, query), vec!["Acme", "Globex"]);
}

#[test]
fn test_limit_and_offset() {
    let schema = create_crm_schema();
    let conn = setup_database(&schema).unwrap();

    let page = |limit: Option<u64>, offset: Option<u64>| {
        let mut builder = SelectBuilder::new("Contact")
            .select(["id"])
            .order_by("id", Direction::Asc);
        if let Some(limit) = limit {
            builder = builder.limit(limit);
        }
        if let Some(offset) = offset {
            builder = builder.offset(offset);
        }
        fetch_texts(&conn, &schema, builder.build().unwrap())
    };

    assert_eq!(page(Some(2), None), vec!["c1", "c2"]);
    assert_eq!(page(Some(2), Some(1)), vec!["c2", "c3"]);
    assert_eq!(page(None, Some(3)), vec!["c4"]);
}

#[test]
fn test_for_update_is_dropped() {
    let schema = create_crm_schema();
    let conn = setup_database(&schema).unwrap();

    let query = SelectBuilder::new("Account")
        .select(["id"])
        .filter(Filter::eq("id", "a1"))
        .for_update()
        .build()
        .unwrap();
    assert_eq!(fetch_texts(&conn, &schema, query), vec!["a1"]);
}

#[test]
fn test_soft_deleted_rows_filtered() {
    let schema = create_crm_schema();
    let conn = setup_database(&schema).unwrap();

    let filtering = QueryComposer::new(
        &schema,
        SqlDialect::Sqlite,
        ComposerConfig {
            filter_deleted: true,
            ..Default::default()
        },
    );
    let query: Query = SelectBuilder::new("Account")
        .select(["name"])
        .filter(Filter::or(vec![
            Filter::eq("type", "Customer"),
            Filter::eq("type", "Partner"),
        ]))
        .order_by("name", Direction::Asc)
        .build()
        .unwrap()
        .into();

    let names = |rows: Vec<Vec<SqlValue>>| -> Vec<SqlValue> {
        rows.into_iter().flatten().collect()
    };
    assert_eq!(
        names(fetch_with(&filtering, &conn, &query)),
        vec![text("Acme"), text("Globex")]
    );
    assert_eq!(
        names(fetch_with(&composer(&schema), &conn, &query)),
        vec![text("Acme"), text("Globex"), text("Initech")]
    );
}

// ==================== Inserts and upserts ====================

#[test]
fn test_upsert_on_composite_unique_key_updates() {
    let schema = create_crm_schema();
    let conn = setup_database(&schema).unwrap();

    // pt4 links p3 and t3 and is soft-deleted; re-linking restores it
    let query = InsertBuilder::new("PostTag")
        .values([("id", "pt9"), ("postId", "p3"), ("tagId", "t3")])
        .update_set([("deleted", 0)])
        .build()
        .unwrap();
    assert_eq!(execute(&conn, &schema, query), 1);

    let rows = fetch(
        &conn,
        &schema,
        SelectBuilder::new("PostTag")
            .select(["id", "deleted"])
            .filter(Filter::eq("postId", "p3"))
            .build()
            .unwrap(),
    );
    assert_eq!(rows, vec![vec![text("pt4"), SqlValue::Integer(0)]]);
}

#[test]
fn test_upsert_with_proposed_value() {
    let schema = create_crm_schema();
    let conn = setup_database(&schema).unwrap();

    let rename = |name: &str| {
        InsertBuilder::new("Account")
            .values([
                ("id", Value::from("a2")),
                ("name", Value::from(name)),
                ("deleted", Value::Bool(false)),
            ])
            .update_set_expression("name", Expression::proposed("name"))
            .build()
            .unwrap()
    };
    execute(&conn, &schema, rename("Globex Corporation"));

    let query = SelectBuilder::new("Account")
        .select(["name"])
        .filter(Filter::eq("id", "a2"))
        .build()
        .unwrap();
    assert_eq!(fetch_texts(&conn, &schema, query), vec!["Globex Corporation"]);

    let count = SelectBuilder::new("Account")
        .select_as(Expression::count_all(), "total")
        .build()
        .unwrap();
    assert_eq!(fetch(&conn, &schema, count), vec![vec![SqlValue::Integer(3)]]);
}

#[test]
fn test_insert_ignoring_duplicates() {
    let schema = create_crm_schema();
    let conn = setup_database(&schema).unwrap();

    let query = InsertBuilder::new("Tag")
        .columns(["id", "name", "deleted"])
        .row([Value::from("t1"), "renamed".into(), false.into()])
        .row([Value::from("t4"), "orm".into(), false.into()])
        .ignore_duplicates()
        .build()
        .unwrap();
    assert_eq!(execute(&conn, &schema, query), 1);

    let query = SelectBuilder::new("Tag")
        .select(["name"])
        .filter(Filter::in_list("id", ["t1", "t4"]))
        .order_by("id", Direction::Asc)
        .build()
        .unwrap();
    assert_eq!(fetch_texts(&conn, &schema, query), vec!["rust", "orm"]);
}

#[test]
fn test_insert_from_select_with_upsert() {
    let schema = create_crm_schema();
    let conn = setup_database(&schema).unwrap();

    // A select without WHERE followed by ON CONFLICT must still parse
    let source = SelectBuilder::new("Tag")
        .select(["id", "name", "deleted"])
        .build()
        .unwrap();
    let query = InsertBuilder::new("Tag")
        .columns(["id", "name", "deleted"])
        .select(source)
        .update_set([("deleted", false)])
        .build()
        .unwrap();
    execute(&conn, &schema, query);

    let query = SelectBuilder::new("Tag")
        .select(["name"])
        .filter(Filter::eq("deleted", true))
        .build()
        .unwrap();
    assert!(fetch(&conn, &schema, query).is_empty());
}

#[test]
fn test_insert_from_ordered_select_with_upsert() {
    let schema = create_crm_schema();
    let conn = setup_database(&schema).unwrap();

    let source = SelectBuilder::new("Tag")
        .select(["id", "name", "deleted"])
        .order_by("name", Direction::Asc)
        .limit(5)
        .build()
        .unwrap();
    let query = InsertBuilder::new("Tag")
        .columns(["id", "name", "deleted"])
        .select(source)
        .update_set([("deleted", false)])
        .build()
        .unwrap();
    assert_eq!(execute(&conn, &schema, query), 3);

    let query = SelectBuilder::new("Tag")
        .select(["name"])
        .filter(Filter::eq("deleted", true))
        .build()
        .unwrap();
    assert!(fetch(&conn, &schema, query).is_empty());
}

#[test]
fn test_insert_from_grouped_select_with_upsert() {
    let schema = create_crm_schema();
    let conn = setup_database(&schema).unwrap();

    // One row per tag that links at least one post
    let source = SelectBuilder::new("Tag")
        .select(["id", "name"])
        .select_as(Expression::value(true), "deleted")
        .join(Join::inner("posts"))
        .group_by("id")
        .group_by("name")
        .having(Filter::compare(
            Expression::count("posts.id"),
            ComparisonOp::GreaterOrEqual,
            Operand::Value(Value::Int(2)),
        ))
        .build()
        .unwrap();
    let query = InsertBuilder::new("Tag")
        .columns(["id", "name", "deleted"])
        .select(source)
        .update_set_expression("deleted", Expression::proposed("deleted"))
        .build()
        .unwrap();
    assert_eq!(execute(&conn, &schema, query), 1);

    let query = SelectBuilder::new("Tag")
        .select(["name"])
        .filter(Filter::eq("deleted", true))
        .order_by("name", Direction::Asc)
        .build()
        .unwrap();
    assert_eq!(fetch_texts(&conn, &schema, query), vec!["legacy", "sql"]);
}

#[test]
fn test_plain_insert_conflict_fails() {
    let schema = create_crm_schema();
    let conn = setup_database(&schema).unwrap();

    let query: Query = InsertBuilder::new("PostTag")
        .values([("id", "pt9"), ("postId", "p1"), ("tagId", "t1")])
        .build()
        .unwrap()
        .into();
    let composed = composer(&schema).compose(&query).unwrap();
    assert!(run(&conn, &composed).is_err());
}

// ==================== Updates and deletes ====================

#[test]
fn test_update_with_arithmetic() {
    let schema = create_crm_schema();
    let conn = setup_database(&schema).unwrap();

    let query = UpdateBuilder::new("Comment")
        .set_expression(
            "likes",
            Expression::arithmetic(
                Expression::column("likes"),
                ArithmeticOp::Add,
                Expression::value(1),
            ),
        )
        .filter(Filter::eq("postId", "p1"))
        .build()
        .unwrap();
    assert_eq!(execute(&conn, &schema, query), 2);

    let rows = fetch(
        &conn,
        &schema,
        SelectBuilder::new("Comment")
            .select(["likes"])
            .order_by("id", Direction::Asc)
            .build()
            .unwrap(),
    );
    assert_eq!(
        rows,
        vec![
            vec![SqlValue::Integer(4)],
            vec![SqlValue::Integer(1)],
            vec![SqlValue::Integer(1)],
        ]
    );
}

#[test]
fn test_soft_delete_then_delete() {
    let schema = create_crm_schema();
    let conn = setup_database(&schema).unwrap();

    let query = UpdateBuilder::new("Contact")
        .set("deleted", true)
        .filter(Filter::eq("accountId", "a1"))
        .build()
        .unwrap();
    assert_eq!(execute(&conn, &schema, query), 2);

    let query = DeleteBuilder::new("Contact")
        .filter(Filter::eq("deleted", true))
        .build()
        .unwrap();
    assert_eq!(execute(&conn, &schema, query), 2);

    let query = SelectBuilder::new("Contact")
        .select(["id"])
        .order_by("id", Direction::Asc)
        .build()
        .unwrap();
    assert_eq!(fetch_texts(&conn, &schema, query), vec!["c3", "c4"]);
}

#[test]
fn test_delete_with_in_list() {
    let schema = create_crm_schema();
    let conn = setup_database(&schema).unwrap();

    let query = DeleteBuilder::new("Comment")
        .filter(Filter::in_list("id", ["m1", "m3", "missing"]))
        .build()
        .unwrap();
    assert_eq!(execute(&conn, &schema, query), 2);
}

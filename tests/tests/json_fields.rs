mod common;
use anyhow::Result;
use serde_json::{json, Value};
use skein_query::{Dialect, JsonFieldRequest, Query};

use common::{compile, fetch, filter, seed};

const NAMES: &str = "json(metadata, $.tags[*].name)";

fn column(rows: &[skein_query::Row], key: &str) -> Vec<Value> { rows.iter().map(|row| row.get(key).cloned().unwrap_or(Value::Null)).collect() }

#[test]
fn definite_paths() -> Result<()> {
    let conn = seed()?;
    let q = Query::new().fields(["id", "json(metadata, $.color)", "json(metadata, $.tags[0])"]).sort(["id"]);
    let rows = fetch(&conn, &compile(Dialect::Sqlite, "articles", &q)?)?;

    assert_eq!(column(&rows, "json(metadata, $.color)"), vec![json!("red"), json!("blue"), Value::Null, Value::Null]);
    assert_eq!(column(&rows, "json(metadata, $.tags[0])"), vec![json!({ "name": "a" }), json!({ "name": "Red" }), Value::Null, Value::Null]);
    Ok(())
}

#[test]
fn wildcard_through_row_expansion() -> Result<()> {
    let conn = seed()?;
    let q = Query::new().fields(["id", NAMES]).sort(["id"]);
    let compiled = compile(Dialect::Sqlite, "articles", &q)?;

    let (sql, _) = compiled.to_sql();
    assert!(sql.starts_with(r#"WITH "j1" AS (SELECT "j2"."id" AS "pk", json_group_array("#), "{}", sql);
    assert!(sql.contains(r#"json_each("j2"."metadata", '$.tags') AS "j3""#), "{}", sql);

    let rows = fetch(&conn, &compiled)?;
    assert_eq!(column(&rows, NAMES), vec![json!(["a", "b"]), json!(["Red", "c"]), json!([]), json!([])]);
    Ok(())
}

#[test]
fn fallback_matches_sql_extraction() -> Result<()> {
    let conn = seed()?;
    let q = Query::new().fields(["id", NAMES]).sort(["id"]);

    let fallback = compile(Dialect::Fallback, "articles", &q)?;
    assert_eq!(fallback.to_sql().0, format!(r#"SELECT "articles"."id", "articles"."metadata" AS "{}" FROM "articles" ORDER BY "articles"."id" ASC"#, NAMES));

    let expected = fetch(&conn, &compile(Dialect::Sqlite, "articles", &q)?)?;
    assert_eq!(fetch(&conn, &fallback)?, expected);
    Ok(())
}

#[test]
fn unparseable_documents_are_null() -> Result<()> {
    let conn = seed()?;
    conn.execute("UPDATE articles SET metadata = 'not json' WHERE id = 3", [])?;
    let q = Query::new().fields(["id", NAMES, "json(metadata, $.color)"]).sort(["id"]);

    let rows = fetch(&conn, &compile(Dialect::Fallback, "articles", &q)?)?;
    assert_eq!(column(&rows, NAMES), vec![json!(["a", "b"]), json!(["Red", "c"]), Value::Null, json!([])]);
    assert_eq!(column(&rows, "json(metadata, $.color)"), vec![json!("red"), json!("blue"), Value::Null, Value::Null]);
    Ok(())
}

#[test]
fn element_filter() -> Result<()> {
    let conn = seed()?;
    let request = JsonFieldRequest::new("metadata", "$.tags").filter(filter(json!({ "name": { "_icontains": "RED" } }))?).key("red_tags");
    let q = Query::new().fields(["id"]).json_field(request).sort(["id"]);

    let rows = fetch(&conn, &compile(Dialect::Sqlite, "articles", &q)?)?;
    assert_eq!(column(&rows, "red_tags"), vec![json!([]), json!([{ "name": "Red" }]), json!([]), json!([])]);

    let rows = fetch(&conn, &compile(Dialect::Fallback, "articles", &q)?)?;
    assert_eq!(column(&rows, "red_tags"), vec![json!([]), json!([{ "name": "Red" }]), json!([]), json!([])]);
    Ok(())
}

#[test]
fn path_filters_evaluate_in_memory() -> Result<()> {
    let conn = seed()?;
    let key = r#"json(metadata, $.tags[?(@.name == "a")].name)"#;
    let q = Query::new().fields(["id", key]).sort(["id"]);

    let compiled = compile(Dialect::Sqlite, "articles", &q)?;
    assert!(compiled.needs_correction());
    let rows = fetch(&conn, &compiled)?;
    assert_eq!(column(&rows, key), vec![json!(["a"]), json!([]), json!([]), json!([])]);
    Ok(())
}

#[test]
fn relational_document() -> Result<()> {
    let conn = seed()?;
    let q = Query::new().fields(["id", "json(articles.metadata, $.color)"]).sort(["id"]);
    assert!(compile(Dialect::Sqlite, "users", &q).is_err());

    let q = Query::new().fields(["id"]).json_field(JsonFieldRequest::new("author.country", "$").key("country")).sort(["id"]);
    let compiled = compile(Dialect::Fallback, "articles", &q)?;
    assert!(compiled.to_sql().0.contains(r#"LEFT JOIN "users" AS "j1""#));
    assert_eq!(fetch(&conn, &compiled)?.len(), 4);
    Ok(())
}

#[test]
fn postgres_rendering() -> Result<()> {
    let q = Query::new().fields([NAMES]);
    assert_eq!(
        compile(Dialect::Postgres14, "articles", &q)?.to_sql().0,
        format!(r#"SELECT jsonb_path_query_array(CAST("articles"."metadata" AS jsonb), '$.tags[*].name') AS "{}" FROM "articles""#, NAMES)
    );

    let request = JsonFieldRequest::new("metadata", "$.tags").filter(filter(json!({ "name": { "_icontains": "RED" } }))?).key("red_tags");
    let (sql, args) = compile(Dialect::Postgres14, "articles", &Query::new().json_field(request))?.to_sql();
    assert_eq!(
        sql,
        r#"SELECT jsonb_path_query_array(CAST("articles"."metadata" AS jsonb), '$.tags[*] ? (@.name like_regex "RED" flag "i")') AS "red_tags" FROM "articles""#
    );
    assert!(args.is_empty());
    Ok(())
}

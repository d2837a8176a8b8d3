mod common;
use anyhow::Result;
use serde_json::json;
use skein_query::{CompileError, Dialect, Query};

use common::{compile, filter, ids, query, seed};

#[test]
fn relational_filter() -> Result<()> {
    let conn = seed()?;
    let q = Query::new().fields(["id", "title"]).filter(filter(json!({ "author": { "country": { "_eq": "NL" } } }))?).sort(["id"]);

    let compiled = compile(Dialect::Sqlite, "articles", &q)?;
    assert_eq!(
        compiled.to_sql().0,
        r#"SELECT "articles"."id", "articles"."title" FROM "articles" LEFT JOIN "users" AS "j1" ON "articles"."author" = "j1"."id" WHERE "j1"."country" = ? ORDER BY "articles"."id" ASC"#
    );
    assert_eq!(ids(&query(&conn, "articles", &q)?), vec![1, 3]);
    Ok(())
}

#[test]
fn or_with_null_check() -> Result<()> {
    let conn = seed()?;
    let q = Query::new()
        .filter(filter(json!({ "_or": [{ "author": { "country": { "_eq": "NL" } } }, { "author": { "country": { "_null": true } } }] }))?)
        .sort(["id"]);
    assert_eq!(ids(&query(&conn, "articles", &q)?), vec![1, 3, 4]);

    // an empty branch matches everything
    let q = Query::new().filter(filter(json!({ "_or": [{}, { "id": { "_eq": 2 } }] }))?).sort(["id"]);
    assert_eq!(ids(&query(&conn, "articles", &q)?), vec![1, 2, 3, 4]);
    Ok(())
}

#[test]
fn null_flags() -> Result<()> {
    let conn = seed()?;
    let q = Query::new().filter(filter(json!({ "metadata": { "_null": true } }))?);
    assert_eq!(ids(&query(&conn, "articles", &q)?), vec![4]);

    let q = Query::new().filter(filter(json!({ "metadata": { "_null": false } }))?).sort(["id"]);
    assert_eq!(ids(&query(&conn, "articles", &q)?), vec![1, 2, 3]);
    Ok(())
}

#[test]
fn lists_and_ranges() -> Result<()> {
    let conn = seed()?;
    let q = Query::new().filter(filter(json!({ "id": { "_in": "1,3" } }))?).sort(["id"]);
    assert_eq!(compile(Dialect::Sqlite, "articles", &q)?.to_sql().1, vec![1i64.into(), 3i64.into()]);
    assert_eq!(ids(&query(&conn, "articles", &q)?), vec![1, 3]);

    let q = Query::new().filter(filter(json!({ "id": { "_nin": [1, 3] } }))?).sort(["id"]);
    assert_eq!(ids(&query(&conn, "articles", &q)?), vec![2, 4]);

    // between is inclusive
    let q = Query::new().filter(filter(json!({ "views": { "_between": [7, 10] } }))?).sort(["id"]);
    assert_eq!(ids(&query(&conn, "articles", &q)?), vec![1, 3]);

    let q = Query::new().filter(filter(json!({ "views": { "_nbetween": "7,10" } }))?).sort(["id"]);
    assert_eq!(compile(Dialect::Postgres14, "articles", &q)?.to_sql().1, vec![7i64.into(), 10i64.into()]);
    assert_eq!(ids(&query(&conn, "articles", &q)?), vec![2, 4]);
    Ok(())
}

#[test]
fn string_operators() -> Result<()> {
    let conn = seed()?;
    let q = Query::new().filter(filter(json!({ "title": { "_icontains": "WOR" } }))?).sort(["id"]);
    assert_eq!(ids(&query(&conn, "articles", &q)?), vec![1, 2]);

    let q = Query::new().filter(filter(json!({ "title": { "_starts_with": "B" } }))?);
    assert_eq!(ids(&query(&conn, "articles", &q)?), vec![3]);

    let q = Query::new().filter(filter(json!({ "title": { "_nends_with": "d" } }))?).sort(["id"]);
    assert_eq!(ids(&query(&conn, "articles", &q)?), vec![1]);
    Ok(())
}

#[test]
fn one_to_many_filter() -> Result<()> {
    let conn = seed()?;
    let q = Query::new().fields(["id", "name"]).filter(filter(json!({ "articles": { "title": { "_icontains": "fire" } } }))?);
    let rows = query(&conn, "users", &q)?;
    assert_eq!(ids(&rows), vec![1]);
    assert_eq!(rows[0]["name"], json!("Ada"));
    Ok(())
}

#[test]
fn one_to_many_filter_returns_each_parent_once() -> Result<()> {
    let conn = seed()?;
    // Ada matches through both of her articles
    let matching = filter(json!({ "articles": { "views": { "_gte": 0 } } }))?;
    let q = Query::new().filter(matching.clone()).sort(["id"]);
    assert!(!compile(Dialect::Sqlite, "users", &q)?.to_sql().0.contains("JOIN"));
    assert_eq!(ids(&query(&conn, "users", &q)?), vec![1, 2, 3]);

    let q = Query::new().filter(matching.clone()).sort(["id"]).limit(2);
    assert_eq!(ids(&query(&conn, "users", &q)?), vec![1, 2]);
    let q = Query::new().filter(matching).sort(["id"]).limit(2).page(2);
    assert_eq!(ids(&query(&conn, "users", &q)?), vec![3]);

    // one related row has to satisfy the whole entry
    let q = Query::new().filter(filter(json!({ "articles": { "_and": [{ "views": { "_gt": 8 } }, { "title": { "_starts_with": "B" } }] } }))?);
    assert!(query(&conn, "users", &q)?.is_empty());
    Ok(())
}

#[test]
fn quantified_one_to_many() -> Result<()> {
    let conn = seed()?;
    let q = Query::new().filter(filter(json!({ "articles": { "_some": { "views": { "_gt": 8 } } } }))?).sort(["id"]);
    assert_eq!(ids(&query(&conn, "users", &q)?), vec![1, 2]);

    let q = Query::new().filter(filter(json!({ "articles": { "_none": { "views": { "_gt": 8 } } } }))?).sort(["id"]);
    assert_eq!(ids(&query(&conn, "users", &q)?), vec![3]);

    let q = Query::new().filter(filter(json!({ "_or": [{ "articles": { "_none": { "views": { "_gt": 8 } } } }, { "name": { "_eq": "Bob" } }] }))?).sort(["id"]);
    assert_eq!(ids(&query(&conn, "users", &q)?), vec![2, 3]);

    // on the relation itself, the null flags ask whether there are related rows
    let q = Query::new().filter(filter(json!({ "articles": { "_null": true } }))?);
    assert!(query(&conn, "users", &q)?.is_empty());
    let q = Query::new().filter(filter(json!({ "articles": { "_in": [2, 4] } }))?).sort(["id"]);
    assert_eq!(ids(&query(&conn, "users", &q)?), vec![2, 3]);

    let q = Query::new().filter(filter(json!({ "author": { "_none": { "name": { "_eq": "Ada" } } } }))?);
    assert!(matches!(compile(Dialect::Sqlite, "articles", &q).map(|_| ()), Err(e) if matches!(e.downcast_ref::<CompileError>(), Some(CompileError::InvalidQuery(_)))));
    Ok(())
}

#[test]
fn json_filter_keys() -> Result<()> {
    let conn = seed()?;
    let q = Query::new().filter(filter(json!({ "json(metadata, $.rating)": { "_gt": 3 } }))?).sort(["id"]);
    assert_eq!(compile(Dialect::Sqlite, "articles", &q)?.to_sql().0, r#"SELECT "articles".* FROM "articles" WHERE "articles"."metadata" ->> '$.rating' > ? ORDER BY "articles"."id" ASC"#);
    assert_eq!(ids(&query(&conn, "articles", &q)?), vec![1, 3]);

    let q = Query::new().filter(filter(json!({ "json(metadata, $.color)": "red" }))?);
    assert_eq!(ids(&query(&conn, "articles", &q)?), vec![1]);

    // through a relation
    let q = Query::new().filter(filter(json!({ "articles": { "json(metadata, $.color)": { "_eq": "blue" } } }))?);
    assert_eq!(ids(&query(&conn, "users", &q)?), vec![2]);
    Ok(())
}

#[test]
fn rejected_before_any_sql() -> Result<()> {
    let q = Query::new().filter(filter(json!({ "json(metadata, $.tags[*].name)": { "_eq": "a" } }))?);
    assert!(matches!(compile(Dialect::Sqlite, "articles", &q).map(|_| ()), Err(e) if matches!(e.downcast_ref::<CompileError>(), Some(CompileError::UnsupportedCapability { .. }))));

    let q = Query::new().filter(filter(json!({ "_and": { "id": 1 } }))?);
    assert!(compile(Dialect::Sqlite, "articles", &q).is_err());
    Ok(())
}

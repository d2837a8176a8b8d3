mod common;
use anyhow::Result;
use serde_json::json;
use skein_query::{Aggregate, CompileError, Dialect, Query};

use common::{compile, ids, query, seed};

#[test]
fn search_across_fields() -> Result<()> {
    let conn = seed()?;
    assert_eq!(ids(&query(&conn, "articles", &Query::new().search("HELLO"))?), vec![2]);
    assert_eq!(ids(&query(&conn, "articles", &Query::new().search("42"))?), vec![2]);
    // numeric fields match exact numbers only
    assert_eq!(ids(&query(&conn, "articles", &Query::new().search("3").sort(["id"]))?), vec![3, 4]);
    assert!(query(&conn, "articles", &Query::new().search("4.20"))?.is_empty());
    Ok(())
}

#[test]
fn pagination() -> Result<()> {
    let conn = seed()?;
    let q = Query::new().sort(["-views"]).limit(2).page(2);
    assert_eq!(ids(&query(&conn, "articles", &q)?), vec![3, 4]);

    // offset without a limit still needs a LIMIT clause
    let q = Query::new().sort(["id"]).offset(3);
    assert_eq!(compile(Dialect::Sqlite, "articles", &q)?.to_sql().0, r#"SELECT "articles".* FROM "articles" ORDER BY "articles"."id" ASC LIMIT -1 OFFSET ?"#);
    assert_eq!(ids(&query(&conn, "articles", &q)?), vec![4]);

    let q = Query::new().sort(["id"]).limit(-1);
    assert_eq!(ids(&query(&conn, "articles", &q)?), vec![1, 2, 3, 4]);

    let (sql, args) = compile(Dialect::MsSql, "articles", &Query::new().limit(2).page(3))?.to_sql();
    assert_eq!(sql, "SELECT [articles].* FROM [articles] ORDER BY (SELECT NULL) OFFSET @p1 ROWS FETCH NEXT @p2 ROWS ONLY");
    assert_eq!(args, vec![4i64.into(), 2i64.into()]);
    Ok(())
}

#[test]
fn sort_through_relation() -> Result<()> {
    let conn = seed()?;
    let rows = query(&conn, "articles", &Query::new().fields(["id", "author.name"]).sort(["-author.name", "id"]))?;
    assert_eq!(ids(&rows), vec![4, 2, 1, 3]);
    assert_eq!(rows[0]["author.name"], json!("Cy"));
    Ok(())
}

#[test]
fn aliased_fields() -> Result<()> {
    let conn = seed()?;
    let q = Query::new().fields(["id", "heading", "writer"]).alias("heading", "title").alias("writer", "author.name").sort(["id"]);
    let rows = query(&conn, "articles", &q)?;
    assert_eq!(rows[0]["heading"], json!("Fireworks"));
    assert_eq!(rows[0]["writer"], json!("Ada"));

    let q = Query::new().fields(["id", "articles.title"]);
    assert!(matches!(compile(Dialect::Sqlite, "users", &q).map(|_| ()), Err(e) if matches!(e.downcast_ref::<CompileError>(), Some(CompileError::InvalidQuery(_)))));
    Ok(())
}

#[test]
fn grouped_aggregates() -> Result<()> {
    let conn = seed()?;
    let aggregate = Aggregate { count: vec!["*".into()], sum: vec!["views".into()], max: vec!["views".into()], ..Default::default() };
    let rows = query(&conn, "articles", &Query::new().group(["author"]).aggregate(aggregate).sort(["author"]))?;

    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0]["author"], json!(1));
    assert_eq!(rows[0]["count"], json!(2));
    assert_eq!(rows[0]["sum->views"], json!(17));
    assert_eq!(rows[0]["max->views"], json!(10));
    assert_eq!(rows[1]["sum->views"], json!(42));
    Ok(())
}

#[test]
fn distinct_counts_across_joins() -> Result<()> {
    let conn = seed()?;
    let aggregate = Aggregate { count_distinct: vec!["id".into()], ..Default::default() };
    let q = Query::new().filter(common::filter(json!({ "author": { "country": { "_nnull": true } } }))?).aggregate(aggregate.clone());

    let compiled = compile(Dialect::Sqlite, "articles", &q)?;
    assert!(compiled.to_sql().0.starts_with(r#"SELECT COUNT(DISTINCT "articles"."id") AS "countDistinct->id""#));
    assert_eq!(common::fetch(&conn, &compiled)?[0]["countDistinct->id"], json!(3));

    // a one-to-many filter does not multiply the rows being counted
    let q = Query::new().filter(common::filter(json!({ "articles": { "views": { "_gte": 0 } } }))?).aggregate(aggregate);
    let compiled = compile(Dialect::Sqlite, "users", &q)?;
    assert!(compiled.to_sql().0.starts_with(r#"SELECT COUNT("users"."id") AS "countDistinct->id""#));
    assert_eq!(common::fetch(&conn, &compiled)?[0]["countDistinct->id"], json!(3));
    Ok(())
}

#[test]
fn invalid_envelopes() -> Result<()> {
    for q in [Query::new().page(0), Query::new().limit(-2), Query::new().offset(-1)] {
        assert!(compile(Dialect::Sqlite, "articles", &q).is_err());
    }
    assert!(compile(Dialect::Sqlite, "comments", &Query::new()).is_err());

    let q = Query::new().limit(10).page(i64::MAX);
    assert!(matches!(compile(Dialect::Sqlite, "articles", &q).map(|_| ()), Err(e) if matches!(e.downcast_ref::<CompileError>(), Some(CompileError::InvalidQuery(_)))));
    Ok(())
}

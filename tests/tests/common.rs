use rusqlite::types::ValueRef;
use rusqlite::Connection;
use serde_json::Value;
use skein_ql::FilterNode;
use skein_query::{Collection, CompiledQuery, Dialect, Field, FieldType, Query, QueryCompiler, Relation, Row, Schema};
use tracing::{debug, Level};

// Initialize tracing for tests
#[ctor::ctor]
fn init_tracing() {
    let level = std::env::var("LOG_LEVEL").ok().and_then(|level| level.parse::<Level>().ok()).unwrap_or(Level::INFO);
    tracing_subscriber::fmt().with_max_level(level).with_test_writer().init();
}

pub fn catalog() -> Schema {
    Schema::new()
        .collection(
            "articles",
            Collection::new("id")
                .field("id", Field::new(FieldType::Integer))
                .field("title", Field::new(FieldType::String))
                .field("views", Field::new(FieldType::Integer))
                .field("author", Field::new(FieldType::Integer))
                .field("metadata", Field::new(FieldType::Json).with_data_type("text")),
        )
        .collection(
            "users",
            Collection::new("id")
                .field("id", Field::new(FieldType::Integer))
                .field("name", Field::new(FieldType::String))
                .field("country", Field::new(FieldType::String))
                .field("articles", Field::new(FieldType::Alias)),
        )
        .relation(Relation::many_to_one("articles", "author", "users", "id").with_reverse("articles"))
}

/// An in-memory database with three users and four articles.
pub fn seed() -> anyhow::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    conn.execute_batch(
        r#"
        CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT, country TEXT);
        CREATE TABLE articles (id INTEGER PRIMARY KEY, title TEXT, views INTEGER, author INTEGER REFERENCES users (id), metadata TEXT);

        INSERT INTO users VALUES (1, 'Ada', 'NL'), (2, 'Bob', 'US'), (3, 'Cy', NULL);
        INSERT INTO articles VALUES
            (1, 'Fireworks', 10, 1, '{"color":"red","rating":5,"tags":[{"name":"a"},{"name":"b"}]}'),
            (2, 'Hello world', 42, 2, '{"color":"blue","rating":2,"tags":[{"name":"Red"},{"name":"c"}]}'),
            (3, 'Bored', 7, 1, '{"rating":4,"tags":[]}'),
            (4, 'Untitled', 0, 3, NULL);
        "#,
    )?;
    Ok(conn)
}

#[allow(unused)]
pub fn filter(value: Value) -> anyhow::Result<FilterNode> { Ok(FilterNode::try_from(value)?) }

#[allow(unused)]
pub fn compile(dialect: Dialect, collection: &str, query: &Query) -> anyhow::Result<CompiledQuery> {
    let schema = catalog();
    Ok(QueryCompiler::new(&schema, dialect).compile(collection, query)?)
}

/// Run a compiled statement and return its corrected rows.
pub fn fetch(conn: &Connection, compiled: &CompiledQuery) -> anyhow::Result<Vec<Row>> {
    let (sql, args) = compiled.to_sql();
    debug!("{} {:?}", sql, args);

    let mut stmt = conn.prepare(&sql)?;
    let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let rows = stmt
        .query_map(rusqlite::params_from_iter(args.iter()), |row| {
            let mut out = Row::new();
            for (i, name) in names.iter().enumerate() {
                out.insert(name.clone(), to_json(row.get_ref(i)?));
            }
            Ok(out)
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(compiled.correct(rows))
}

#[allow(unused)]
pub fn query(conn: &Connection, collection: &str, query: &Query) -> anyhow::Result<Vec<Row>> { fetch(conn, &compile(Dialect::Sqlite, collection, query)?) }

#[allow(unused)]
pub fn ids(rows: &[Row]) -> Vec<i64> { rows.iter().filter_map(|row| row.get("id").and_then(Value::as_i64)).collect() }

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Value::from(f),
        ValueRef::Text(text) | ValueRef::Blob(text) => Value::String(String::from_utf8_lossy(text).into_owned()),
    }
}

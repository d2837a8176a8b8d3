//! SQL dialects and capability negotiation.
//!
//! Every supported database is one variant of [`Dialect`]. Detection walks a fixed priority list
//! of candidates, asking each whether it supports the reported product and version, and settles on
//! [`Dialect::Fallback`] when nothing matches. Everything dialect-specific about JSON lives in
//! [`crate::json`]; this module only knows about spelling (quoting, placeholders, literals).

mod version;

use std::fmt;

use tracing::debug;

pub use version::Version;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// PostgreSQL 14+: SQL/JSON path queries (`jsonb_path_query_array`) with filter predicates.
    Postgres14,
    /// PostgreSQL 10 to 13: `#>` extraction only.
    Postgres10,
    CockroachDb,
    Redshift,
    /// MySQL 5.7: `JSON_EXTRACT`, including wildcard paths.
    MySql5,
    /// MySQL 8: adds `JSON_TABLE`.
    MySql8,
    /// MariaDB 10.6+ (`JSON_TABLE`).
    MariaDb,
    /// SQLite 3.38+ (`->` operators built in, `json_each`).
    Sqlite,
    /// SQL Server 2016+ (`JSON_VALUE` / `JSON_QUERY`).
    MsSql,
    /// Oracle 12.2+ (`JSON_VALUE` / `JSON_QUERY` / `JSON_TABLE`).
    Oracle,
    /// Anything else: raw columns are fetched and sub-paths evaluated in memory.
    Fallback,
}

/// Bind placeholder spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    /// `$1`, `$2`, ...
    Dollar,
    /// `?`
    Question,
    /// `@p1`, `@p2`, ...
    AtP,
    /// `:1`, `:2`, ...
    Colon,
}

impl Placeholder {
    pub fn render(&self, index: usize) -> String {
        match self {
            Placeholder::Dollar => format!("${}", index),
            Placeholder::Question => "?".to_string(),
            Placeholder::AtP => format!("@p{}", index),
            Placeholder::Colon => format!(":{}", index),
        }
    }
}

impl Dialect {
    /// Candidates in detection order; the first one supporting the server wins.
    pub const CANDIDATES: [Dialect; 10] = [
        Dialect::CockroachDb,
        Dialect::Redshift,
        Dialect::Postgres14,
        Dialect::Postgres10,
        Dialect::MariaDb,
        Dialect::MySql8,
        Dialect::MySql5,
        Dialect::Sqlite,
        Dialect::MsSql,
        Dialect::Oracle,
    ];

    /// Select the dialect for a database reporting `product` and `version`.
    ///
    /// `product` is the client/driver family (`postgres`, `mysql`, `sqlite3`, `mssql`, `oracle`, ...)
    /// and `version` the server's own version string, which is inspected in full: CockroachDB and
    /// Redshift present themselves as PostgreSQL, MariaDB as MySQL.
    pub fn detect(product: &str, version: &str) -> Dialect {
        let product = normalize_product(product);
        let parsed = Version::parse(version);

        let selected = Self::CANDIDATES.into_iter().find(|d| d.is_supported(&product, parsed, version)).unwrap_or(Dialect::Fallback);
        debug!("selected dialect {} for {} {:?} ({:?})", selected, product, version, parsed);
        selected
    }

    /// Static capability predicate of each variant.
    pub fn is_supported(&self, product: &str, version: Option<Version>, full_version: &str) -> bool {
        let is_cockroach = full_version.contains("CockroachDB");
        let is_redshift = full_version.contains("Redshift");
        let is_mariadb = full_version.contains("MariaDB");
        let at_least = |major: u64, minor: u64, patch: u64| version.is_some_and(|v| v >= Version::new(major, minor, patch));

        match self {
            Dialect::CockroachDb => product == "postgres" && is_cockroach,
            Dialect::Redshift => product == "postgres" && is_redshift,
            Dialect::Postgres14 => product == "postgres" && !is_cockroach && !is_redshift && at_least(14, 0, 0),
            Dialect::Postgres10 => product == "postgres" && !is_cockroach && !is_redshift && at_least(10, 0, 0),
            Dialect::MariaDb => product == "mysql" && is_mariadb && at_least(10, 6, 0),
            Dialect::MySql8 => product == "mysql" && !is_mariadb && at_least(8, 0, 4),
            Dialect::MySql5 => product == "mysql" && !is_mariadb && at_least(5, 7, 8),
            Dialect::Sqlite => product == "sqlite" && at_least(3, 38, 0),
            Dialect::MsSql => product == "mssql" && at_least(13, 0, 0),
            Dialect::Oracle => product == "oracle" && at_least(12, 2, 0),
            Dialect::Fallback => true,
        }
    }

    pub fn placeholder(&self) -> Placeholder {
        match self {
            Dialect::Postgres14 | Dialect::Postgres10 | Dialect::CockroachDb | Dialect::Redshift => Placeholder::Dollar,
            Dialect::MySql5 | Dialect::MySql8 | Dialect::MariaDb | Dialect::Sqlite | Dialect::Fallback => Placeholder::Question,
            Dialect::MsSql => Placeholder::AtP,
            Dialect::Oracle => Placeholder::Colon,
        }
    }

    /// Quote an identifier, doubling any embedded closing quote.
    pub fn quote_ident(&self, name: &str) -> String {
        match self {
            Dialect::MySql5 | Dialect::MySql8 | Dialect::MariaDb => format!("`{}`", name.replace('`', "``")),
            Dialect::MsSql => format!("[{}]", name.replace(']', "]]")),
            _ => format!("\"{}\"", name.replace('"', "\"\"")),
        }
    }

    /// Inline string literal, used for JSON paths and other compiler-generated text.
    pub fn quote_literal(&self, text: &str) -> String {
        let escaped = text.replace('\'', "''");
        match self {
            // backslash is an escape character inside MySQL string literals
            Dialect::MySql5 | Dialect::MySql8 | Dialect::MariaDb => format!("'{}'", escaped.replace('\\', "\\\\")),
            Dialect::MsSql => format!("N'{}'", escaped),
            _ => format!("'{}'", escaped),
        }
    }

    /// Spelling of a constant boolean condition.
    pub fn constant(&self, value: bool) -> &'static str {
        match (self, value) {
            (Dialect::MsSql | Dialect::Oracle, true) => "1 = 1",
            (Dialect::MsSql | Dialect::Oracle, false) => "1 = 0",
            (_, true) => "TRUE",
            (_, false) => "FALSE",
        }
    }

    /// Whether `AS` may precede a table alias.
    pub fn table_alias_keyword(&self) -> &'static str {
        match self {
            Dialect::Oracle => " ",
            _ => " AS ",
        }
    }

    pub fn is_postgres_family(&self) -> bool { matches!(self, Dialect::Postgres14 | Dialect::Postgres10 | Dialect::CockroachDb | Dialect::Redshift) }

    pub fn is_mysql_family(&self) -> bool { matches!(self, Dialect::MySql5 | Dialect::MySql8 | Dialect::MariaDb) }

    /// `LIMIT ... OFFSET ...` as opposed to `OFFSET ... ROWS FETCH NEXT ... ROWS ONLY`.
    pub fn uses_limit_clause(&self) -> bool { !matches!(self, Dialect::MsSql | Dialect::Oracle) }

    /// Value standing in for "no limit" when only an offset is requested, for dialects whose
    /// grammar has no `OFFSET` without `LIMIT`.
    pub fn unlimited(&self) -> Option<&'static str> {
        match self {
            Dialect::Sqlite => Some("-1"),
            Dialect::MySql5 | Dialect::MySql8 | Dialect::MariaDb => Some("18446744073709551615"),
            _ => None,
        }
    }

    /// The SQL type used to compare extracted JSON scalars as numbers.
    pub fn numeric_type(&self) -> &'static str {
        match self {
            Dialect::Postgres14 | Dialect::Postgres10 | Dialect::CockroachDb => "numeric",
            Dialect::Redshift => "float8",
            Dialect::MySql5 | Dialect::MySql8 | Dialect::MariaDb => "DOUBLE",
            Dialect::Sqlite | Dialect::Fallback => "REAL",
            Dialect::MsSql => "float",
            Dialect::Oracle => "NUMBER",
        }
    }

    /// The SQL type used for extracted JSON strings in derived tables.
    pub fn text_type(&self) -> &'static str {
        match self {
            Dialect::Oracle => "VARCHAR2(4000)",
            Dialect::MsSql => "nvarchar(max)",
            Dialect::Sqlite | Dialect::Fallback => "TEXT",
            Dialect::MySql5 | Dialect::MySql8 | Dialect::MariaDb => "VARCHAR(255)",
            _ => "text",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Dialect::Postgres14 => "PostgreSQL 14+",
            Dialect::Postgres10 => "PostgreSQL 10",
            Dialect::CockroachDb => "CockroachDB",
            Dialect::Redshift => "Redshift",
            Dialect::MySql5 => "MySQL 5.7",
            Dialect::MySql8 => "MySQL 8",
            Dialect::MariaDb => "MariaDB",
            Dialect::Sqlite => "SQLite",
            Dialect::MsSql => "SQL Server",
            Dialect::Oracle => "Oracle",
            Dialect::Fallback => "generic SQL",
        })
    }
}

fn normalize_product(product: &str) -> String {
    let product = product.trim().to_ascii_lowercase();
    match product.as_str() {
        "pg" | "postgresql" | "postgres" | "cockroachdb" | "redshift" => "postgres".to_string(),
        "mysql" | "mysql2" | "mariadb" => "mysql".to_string(),
        "sqlite" | "sqlite3" | "better-sqlite3" => "sqlite".to_string(),
        "mssql" | "sqlserver" | "tedious" => "mssql".to_string(),
        "oracle" | "oracledb" => "oracle".to_string(),
        _ => product,
    }
}

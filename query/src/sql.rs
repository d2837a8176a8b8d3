//! Dialect-neutral statement model and its rendering.
//!
//! The compiler builds a [`Statement`] out of [`Expr`] and [`Predicate`] trees; [`SqlBuilder`]
//! flattens it into SQL text plus the ordered list of bound values, numbering placeholders the way
//! the target dialect spells them.

use crate::dialect::Dialect;
use crate::value::SqlValue;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// `"table"."column"`
    Column { table: String, column: String },
    /// `"table".*`
    Star(String),
    /// A caller value, always bound through a placeholder.
    Bind(SqlValue),
    /// A compiler-generated string (JSON paths, key lists), inlined as an escaped literal.
    Literal(String),
    /// Compiler-generated SQL text, emitted as-is.
    Raw(String),
    Func(String, Vec<Expr>),
    Cast(Box<Expr>, String),
    Lower(Box<Expr>),
    /// `left op right` for operators such as `#>`, `->` or `||`.
    Infix(Box<Expr>, &'static str, Box<Expr>),
    /// Parts rendered back to back with no separator.
    Seq(Vec<Expr>),
}

impl Expr {
    pub fn column(table: impl Into<String>, column: impl Into<String>) -> Self { Expr::Column { table: table.into(), column: column.into() } }

    pub fn func(name: impl Into<String>, args: Vec<Expr>) -> Self { Expr::Func(name.into(), args) }

    pub fn raw(sql: impl Into<String>) -> Self { Expr::Raw(sql.into()) }

    pub fn literal(text: impl Into<String>) -> Self { Expr::Literal(text.into()) }

    pub fn cast(self, ty: impl Into<String>) -> Self { Expr::Cast(Box::new(self), ty.into()) }

    pub fn lower(self) -> Self { Expr::Lower(Box::new(self)) }

    pub fn infix(self, op: &'static str, right: Expr) -> Self { Expr::Infix(Box::new(self), op, Box::new(right)) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Like,
    NotLike,
}

impl SqlOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            SqlOp::Eq => "=",
            SqlOp::Ne => "<>",
            SqlOp::Gt => ">",
            SqlOp::Ge => ">=",
            SqlOp::Lt => "<",
            SqlOp::Le => "<=",
            SqlOp::Like => "LIKE",
            SqlOp::NotLike => "NOT LIKE",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Compare { left: Expr, op: SqlOp, right: Expr },
    In { expr: Expr, values: Vec<Expr>, negated: bool },
    Between { expr: Expr, low: Expr, high: Expr, negated: bool },
    IsNull { expr: Expr, negated: bool },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
    Constant(bool),
    /// `[NOT] EXISTS (select)`, a correlated sub-select.
    Exists { select: Box<Select>, negated: bool },
}

impl Predicate {
    pub fn compare(left: Expr, op: SqlOp, right: Expr) -> Self { Predicate::Compare { left, op, right } }

    pub fn eq(left: Expr, right: Expr) -> Self { Predicate::Compare { left, op: SqlOp::Eq, right } }

    pub fn is_null(expr: Expr, negated: bool) -> Self { Predicate::IsNull { expr, negated } }

    /// AND the given conditions, collapsing the trivial cases.
    pub fn all(mut items: Vec<Predicate>) -> Option<Predicate> {
        match items.len() {
            0 => None,
            1 => items.pop(),
            _ => Some(Predicate::And(items)),
        }
    }

    pub fn any(mut items: Vec<Predicate>) -> Option<Predicate> {
        match items.len() {
            0 => None,
            1 => items.pop(),
            _ => Some(Predicate::Or(items)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    pub expr: Expr,
    pub alias: Option<String>,
}

impl SelectItem {
    pub fn new(expr: Expr) -> Self { Self { expr, alias: None } }

    pub fn aliased(expr: Expr, alias: impl Into<String>) -> Self { Self { expr, alias: Some(alias.into()) } }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    Table { name: String, alias: Option<String> },
    /// A parenthesized sub-select.
    Derived { select: Box<Select>, alias: String },
    /// A table-valued function call (`json_each(...)`, `JSON_TABLE(...)`).
    Function { call: Expr, alias: String },
}

impl Source {
    pub fn table(name: impl Into<String>) -> Self { Source::Table { name: name.into(), alias: None } }

    pub fn aliased(name: impl Into<String>, alias: impl Into<String>) -> Self { Source::Table { name: name.into(), alias: Some(alias.into()) } }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Join {
    /// `LEFT JOIN source ON condition`, the only join the compiler adds for relations.
    Left { source: Source, on: Predicate },
    /// `, source`: an implicitly lateral row expansion inside a derived table.
    Lateral(Source),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub expr: Expr,
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub columns: Vec<SelectItem>,
    pub from: Source,
    pub joins: Vec<Join>,
    pub filter: Option<Predicate>,
    pub group_by: Vec<Expr>,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl Select {
    pub fn from(source: Source) -> Self {
        Self { columns: Vec::new(), from: source, joins: Vec::new(), filter: None, group_by: Vec::new(), order_by: Vec::new(), limit: None, offset: None }
    }

    /// AND another condition onto the WHERE tree.
    pub fn and_where(&mut self, predicate: Predicate) {
        self.filter = match self.filter.take() {
            None => Some(predicate),
            Some(Predicate::And(mut items)) => {
                items.push(predicate);
                Some(Predicate::And(items))
            }
            Some(existing) => Some(Predicate::And(vec![existing, predicate])),
        };
    }
}

/// A named common table expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Cte {
    pub name: String,
    pub select: Select,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub ctes: Vec<Cte>,
    pub select: Select,
}

pub enum SqlFragment {
    Sql(String),
    Argument(SqlValue),
}

pub struct SqlBuilder {
    dialect: Dialect,
    fragments: Vec<SqlFragment>,
}

impl SqlBuilder {
    pub fn new(dialect: Dialect) -> Self { Self { dialect, fragments: Vec::new() } }

    pub fn push(&mut self, fragment: SqlFragment) { self.fragments.push(fragment); }

    pub fn arg(&mut self, arg: impl Into<SqlValue>) { self.push(SqlFragment::Argument(arg.into())); }

    pub fn sql(&mut self, s: impl AsRef<str>) { self.push(SqlFragment::Sql(s.as_ref().to_owned())); }

    fn ident(&mut self, name: &str) {
        let quoted = self.dialect.quote_ident(name);
        self.sql(quoted);
    }

    /// Collapse the fragments into SQL text, numbering placeholders in order of appearance.
    pub fn build(self) -> (String, Vec<SqlValue>) {
        let placeholder = self.dialect.placeholder();
        let mut counter = 1;
        let mut sql = String::new();
        let mut args = Vec::new();

        for fragment in self.fragments {
            match fragment {
                SqlFragment::Argument(arg) => {
                    sql += &placeholder.render(counter);
                    args.push(arg);
                    counter += 1;
                }
                SqlFragment::Sql(s) => sql += &s,
            }
        }

        (sql, args)
    }

    fn list<T>(&mut self, items: &[T], separator: &str, mut each: impl FnMut(&mut Self, &T)) {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                self.sql(separator);
            }
            each(self, item);
        }
    }

    // --- AST flattening ---
    pub fn expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Column { table, column } => {
                self.ident(table);
                self.sql(".");
                self.ident(column);
            }
            Expr::Star(table) => {
                self.ident(table);
                self.sql(".*");
            }
            Expr::Bind(value) => self.arg(value.clone()),
            Expr::Literal(text) => {
                let quoted = self.dialect.quote_literal(text);
                self.sql(quoted);
            }
            Expr::Raw(sql) => self.sql(sql),
            Expr::Func(name, args) => {
                self.sql(name);
                self.sql("(");
                self.list(args, ", ", |b, arg| b.expr(arg));
                self.sql(")");
            }
            Expr::Cast(inner, ty) => {
                self.sql("CAST(");
                self.expr(inner);
                self.sql(format!(" AS {})", ty));
            }
            Expr::Lower(inner) => {
                self.sql("LOWER(");
                self.expr(inner);
                self.sql(")");
            }
            Expr::Infix(left, op, right) => {
                self.expr(left);
                self.sql(format!(" {} ", op));
                self.expr(right);
            }
            Expr::Seq(parts) => {
                for part in parts {
                    self.expr(part);
                }
            }
        }
    }

    pub fn predicate(&mut self, predicate: &Predicate) {
        match predicate {
            Predicate::Compare { left, op, right } => {
                self.expr(left);
                self.sql(format!(" {} ", op.as_str()));
                self.expr(right);
            }
            Predicate::In { expr, values, negated } => {
                self.expr(expr);
                self.sql(if *negated { " NOT IN (" } else { " IN (" });
                self.list(values, ", ", |b, value| b.expr(value));
                self.sql(")");
            }
            Predicate::Between { expr, low, high, negated } => {
                self.expr(expr);
                self.sql(if *negated { " NOT BETWEEN " } else { " BETWEEN " });
                self.expr(low);
                self.sql(" AND ");
                self.expr(high);
            }
            Predicate::IsNull { expr, negated } => {
                self.expr(expr);
                self.sql(if *negated { " IS NOT NULL" } else { " IS NULL" });
            }
            Predicate::And(items) if items.is_empty() => self.sql(self.dialect.constant(true)),
            Predicate::Or(items) if items.is_empty() => self.sql(self.dialect.constant(false)),
            Predicate::And(items) => {
                self.sql("(");
                self.list(items, " AND ", |b, item| b.predicate(item));
                self.sql(")");
            }
            Predicate::Or(items) => {
                self.sql("(");
                self.list(items, " OR ", |b, item| b.predicate(item));
                self.sql(")");
            }
            Predicate::Not(inner) => {
                self.sql("NOT (");
                self.predicate(inner);
                self.sql(")");
            }
            Predicate::Constant(value) => self.sql(self.dialect.constant(*value)),
            Predicate::Exists { select, negated } => {
                self.sql(if *negated { "NOT EXISTS (" } else { "EXISTS (" });
                self.select(select);
                self.sql(")");
            }
        }
    }

    pub fn source(&mut self, source: &Source) {
        let keyword = self.dialect.table_alias_keyword();
        match source {
            Source::Table { name, alias } => {
                self.ident(name);
                if let Some(alias) = alias {
                    self.sql(keyword);
                    self.ident(alias);
                }
            }
            Source::Derived { select, alias } => {
                self.sql("(");
                self.select(select);
                self.sql(")");
                self.sql(keyword);
                self.ident(alias);
            }
            Source::Function { call, alias } => {
                self.expr(call);
                self.sql(keyword);
                self.ident(alias);
            }
        }
    }

    pub fn select(&mut self, select: &Select) {
        self.sql("SELECT ");
        self.list(&select.columns, ", ", |b, item| {
            b.expr(&item.expr);
            if let Some(alias) = &item.alias {
                b.sql(" AS ");
                b.ident(alias);
            }
        });
        self.sql(" FROM ");
        self.source(&select.from);

        for join in &select.joins {
            match join {
                Join::Left { source, on } => {
                    self.sql(" LEFT JOIN ");
                    self.source(source);
                    self.sql(" ON ");
                    self.predicate(on);
                }
                Join::Lateral(source) => {
                    self.sql(", ");
                    self.source(source);
                }
            }
        }

        if let Some(filter) = &select.filter {
            self.sql(" WHERE ");
            self.predicate(filter);
        }

        if !select.group_by.is_empty() {
            self.sql(" GROUP BY ");
            self.list(&select.group_by, ", ", |b, expr| b.expr(expr));
        }

        let paged = select.limit.is_some() || select.offset.is_some();
        if !select.order_by.is_empty() {
            self.sql(" ORDER BY ");
            self.list(&select.order_by, ", ", |b, order| {
                b.expr(&order.expr);
                b.sql(match order.direction {
                    Direction::Asc => " ASC",
                    Direction::Desc => " DESC",
                });
            });
        } else if paged && self.dialect == Dialect::MsSql {
            // OFFSET / FETCH is part of the ORDER BY clause in T-SQL
            self.sql(" ORDER BY (SELECT NULL)");
        }

        self.window(select.limit, select.offset);
    }

    fn window(&mut self, limit: Option<i64>, offset: Option<i64>) {
        if self.dialect.uses_limit_clause() {
            match (limit, self.dialect.unlimited()) {
                (Some(limit), _) => {
                    self.sql(" LIMIT ");
                    self.arg(limit);
                }
                (None, Some(unlimited)) if offset.is_some() => self.sql(format!(" LIMIT {}", unlimited)),
                _ => {}
            }
            if let Some(offset) = offset {
                self.sql(" OFFSET ");
                self.arg(offset);
            }
        } else if limit.is_some() || offset.is_some() {
            self.sql(" OFFSET ");
            self.arg(offset.unwrap_or(0));
            self.sql(" ROWS");
            if let Some(limit) = limit {
                self.sql(" FETCH NEXT ");
                self.arg(limit);
                self.sql(" ROWS ONLY");
            }
        }
    }

    pub fn statement(&mut self, statement: &Statement) {
        if !statement.ctes.is_empty() {
            self.sql("WITH ");
            self.list(&statement.ctes, ", ", |b, cte| {
                b.ident(&cte.name);
                b.sql(" AS (");
                b.select(&cte.select);
                b.sql(")");
            });
            self.sql(" ");
        }
        self.select(&statement.select);
    }
}

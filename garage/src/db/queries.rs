//! Named SQL statements and templated query fragments.
//!
//! Statements live in `.sql` files split by `-- name: <Name>` headers. Each statement is a
//! [minijinja] template so that optional filters, sort order and pagination can be composed
//! at request time. Value bindings never reach the template text: the render context only
//! sees *whether* a value is bound, and the rendered statement refers to it with a
//! `:name` placeholder that [`QueryTemplates::resolve`] rewrites to a positional `$n`
//! parameter. The only text interpolated into SQL are identifiers drawn from closed enums
//! implementing [`SqlIdent`].
//!
//! ```sql
//! -- name: CountUsersBase
//! SELECT COUNT(*) FROM users
//! WHERE TRUE
//! {%- if name %} AND name ILIKE '%' || :name || '%'{% endif %}
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use anyhow::Context as _;
use minijinja::{Environment, ErrorKind, UndefinedBehavior, Value};
use sqlx::postgres::PgArguments;
use sqlx::Arguments;
use thiserror::Error;
use uuid::Uuid;

use crate::db::errors::{DbError, Result as DbResult};

const BUILTIN_SOURCES: &[(&str, &str)] = &[
    ("users.sql", include_str!("../../queries/users.sql")),
    ("cars.sql", include_str!("../../queries/cars.sql")),
];

/// Errors produced while turning a named template into executable SQL.
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("query template '{0}' not found")]
    TemplateNotFound(String),

    #[error("failed to render query template '{name}': {reason}")]
    TemplateRenderError { name: String, reason: String },
}

/// An identifier that may be interpolated into SQL text.
///
/// Only implement this for closed enums whose every variant maps to a fixed, trusted
/// identifier.
pub trait SqlIdent {
    fn sql_ident(&self) -> &'static str;
}

/// A single bound value.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryArg {
    Uuid(Uuid),
    UuidList(Vec<Uuid>),
    Text(String),
    Int(i32),
    BigInt(i64),
    Bool(bool),
    OptText(Option<String>),
}

impl From<Uuid> for QueryArg {
    fn from(v: Uuid) -> Self {
        QueryArg::Uuid(v)
    }
}

impl From<Vec<Uuid>> for QueryArg {
    fn from(v: Vec<Uuid>) -> Self {
        QueryArg::UuidList(v)
    }
}

impl From<String> for QueryArg {
    fn from(v: String) -> Self {
        QueryArg::Text(v)
    }
}

impl From<&str> for QueryArg {
    fn from(v: &str) -> Self {
        QueryArg::Text(v.to_string())
    }
}

impl From<i32> for QueryArg {
    fn from(v: i32) -> Self {
        QueryArg::Int(v)
    }
}

impl From<i64> for QueryArg {
    fn from(v: i64) -> Self {
        QueryArg::BigInt(v)
    }
}

impl From<bool> for QueryArg {
    fn from(v: bool) -> Self {
        QueryArg::Bool(v)
    }
}

impl From<Option<String>> for QueryArg {
    fn from(v: Option<String>) -> Self {
        QueryArg::OptText(v)
    }
}

/// Values and identifiers handed to [`QueryTemplates::resolve`].
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    values: BTreeMap<&'static str, QueryArg>,
    idents: BTreeMap<&'static str, &'static str>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a value to `:name`.
    pub fn bind(mut self, name: &'static str, value: impl Into<QueryArg>) -> Self {
        self.values.insert(name, value.into());
        self
    }

    /// Bind a value only when present; absent values leave `name` undefined in the template.
    pub fn bind_opt<T: Into<QueryArg>>(self, name: &'static str, value: Option<T>) -> Self {
        match value {
            Some(v) => self.bind(name, v),
            None => self,
        }
    }

    /// Expose an identifier to the template as `{{ name }}`.
    pub fn ident(mut self, name: &'static str, ident: &impl SqlIdent) -> Self {
        self.idents.insert(name, ident.sql_ident());
        self
    }

    fn context(&self) -> Value {
        let mut ctx: BTreeMap<&'static str, Value> = BTreeMap::new();
        for name in self.values.keys() {
            ctx.insert(name, Value::from(true));
        }
        for (name, ident) in &self.idents {
            ctx.insert(name, Value::from(*ident));
        }
        Value::from_serialize(&ctx)
    }
}

/// Executable statement text plus its positional arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedQuery {
    pub sql: String,
    pub args: Vec<QueryArg>,
}

impl ResolvedQuery {
    /// Encode the arguments for `sqlx::query_*_with`.
    pub fn arguments(&self) -> DbResult<PgArguments> {
        let mut out = PgArguments::default();
        for arg in &self.args {
            let added = match arg.clone() {
                QueryArg::Uuid(v) => out.add(v),
                QueryArg::UuidList(v) => out.add(v),
                QueryArg::Text(v) => out.add(v),
                QueryArg::Int(v) => out.add(v),
                QueryArg::BigInt(v) => out.add(v),
                QueryArg::Bool(v) => out.add(v),
                QueryArg::OptText(v) => out.add(v),
            };
            added.map_err(|e| DbError::Other(anyhow::anyhow!("failed to encode query argument: {e}")))?;
        }
        Ok(out)
    }
}

/// Named statement store backed by a minijinja environment.
#[derive(Debug)]
pub struct QueryTemplates {
    env: Environment<'static>,
}

impl QueryTemplates {
    /// Statements compiled into the binary.
    pub fn builtin() -> anyhow::Result<Self> {
        let mut templates = Self::empty();
        for (file, source) in BUILTIN_SOURCES {
            templates.add_source(file, source)?;
        }
        Ok(templates)
    }

    /// Builtin statements, with any `*.sql` file in `dir` overriding or extending them.
    pub fn load(dir: Option<&Path>) -> anyhow::Result<Self> {
        let mut templates = Self::builtin()?;
        let Some(dir) = dir else {
            return Ok(templates);
        };

        let mut files: Vec<_> = std::fs::read_dir(dir)
            .with_context(|| format!("failed to read query directory {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "sql"))
            .collect();
        files.sort();

        for path in files {
            let source = std::fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?;
            templates.add_source(&path.display().to_string(), &source)?;
            tracing::info!("Loaded query overrides from {}", path.display());
        }
        Ok(templates)
    }

    fn empty() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::SemiStrict);
        Self { env }
    }

    fn add_source(&mut self, file: &str, source: &str) -> anyhow::Result<()> {
        for (name, body) in split_named(source) {
            self.env
                .add_template_owned(name.clone(), body)
                .with_context(|| format!("invalid query template '{name}' in {file}"))?;
        }
        Ok(())
    }

    /// Render `name` with `bindings` and rewrite its placeholders to positional parameters.
    pub fn resolve(&self, name: &str, bindings: &Bindings) -> Result<ResolvedQuery, QueryError> {
        let template = self.env.get_template(name).map_err(|e| match e.kind() {
            ErrorKind::TemplateNotFound => QueryError::TemplateNotFound(name.to_string()),
            _ => render_error(name, e),
        })?;

        let rendered = template.render(bindings.context()).map_err(|e| render_error(name, e))?;
        number_placeholders(name, &rendered, bindings)
    }
}

fn render_error(name: &str, err: minijinja::Error) -> QueryError {
    QueryError::TemplateRenderError {
        name: name.to_string(),
        reason: err.to_string(),
    }
}

/// Split a file into `(name, body)` pairs on `-- name:` header lines.
fn split_named(source: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let mut current: Option<(String, String)> = None;

    for line in source.lines() {
        if let Some(name) = line.trim().strip_prefix("-- name:") {
            if let Some((n, body)) = current.take() {
                out.push((n, body.trim_end().to_string()));
            }
            current = Some((name.trim().to_string(), String::new()));
        } else if let Some((_, body)) = current.as_mut() {
            body.push_str(line);
            body.push('\n');
        }
    }
    if let Some((n, body)) = current {
        out.push((n, body.trim_end().to_string()));
    }
    out
}

/// Rewrite `:name` placeholders to `$n` in first-appearance order.
///
/// Quoted literals and identifiers, dollar-quoted strings, comments and `::type` casts pass
/// through untouched. A placeholder without a bound value is a render error.
fn number_placeholders(name: &str, sql: &str, bindings: &Bindings) -> Result<ResolvedQuery, QueryError> {
    let mut out = String::with_capacity(sql.len());
    let mut args = Vec::new();
    let mut positions: HashMap<&str, usize> = HashMap::new();
    let bytes = sql.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        match c {
            b'\'' | b'"' => {
                let end = sql[i + 1..].find(c as char).map_or(sql.len(), |p| i + 1 + p + 1);
                out.push_str(&sql[i..end]);
                i = end;
            }
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                let end = sql[i..].find('\n').map_or(sql.len(), |p| i + p);
                out.push_str(&sql[i..end]);
                i = end;
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                let end = block_comment_end(sql, i);
                out.push_str(&sql[i..end]);
                i = end;
            }
            b'$' if dollar_tag(sql, i).is_some() => {
                let end = dollar_quote_end(sql, i);
                out.push_str(&sql[i..end]);
                i = end;
            }
            b':' if bytes.get(i + 1) == Some(&b':') => {
                out.push_str("::");
                i += 2;
            }
            b':' if bytes.get(i + 1).is_some_and(|b| b.is_ascii_alphabetic() || *b == b'_') => {
                let start = i + 1;
                let mut end = start;
                while end < bytes.len() && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_') {
                    end += 1;
                }
                let key = &sql[start..end];
                let position = match positions.get(key) {
                    Some(p) => *p,
                    None => {
                        let value = bindings.values.get(key).ok_or_else(|| QueryError::TemplateRenderError {
                            name: name.to_string(),
                            reason: format!("placeholder :{key} has no bound value"),
                        })?;
                        args.push(value.clone());
                        positions.insert(key, args.len());
                        args.len()
                    }
                };
                out.push('$');
                out.push_str(&position.to_string());
                i = end;
            }
            _ => {
                let ch_len = sql[i..].chars().next().map_or(1, char::len_utf8);
                out.push_str(&sql[i..i + ch_len]);
                i += ch_len;
            }
        }
    }

    Ok(ResolvedQuery { sql: out, args })
}

/// End (exclusive) of the block comment opening at `start`. Block comments nest.
fn block_comment_end(sql: &str, start: usize) -> usize {
    let bytes = sql.as_bytes();
    let mut depth = 0;
    let mut i = start;
    while i + 1 < bytes.len() {
        match (bytes[i], bytes[i + 1]) {
            (b'/', b'*') => {
                depth += 1;
                i += 2;
            }
            (b'*', b'/') => {
                depth -= 1;
                i += 2;
                if depth == 0 {
                    return i;
                }
            }
            _ => i += 1,
        }
    }
    sql.len()
}

/// The `$tag$` opening a dollar-quoted string at `start`, if there is one. `$1` is a
/// positional parameter, not a tag.
fn dollar_tag(sql: &str, start: usize) -> Option<&str> {
    let rest = &sql[start + 1..];
    let tag_len = rest
        .bytes()
        .enumerate()
        .take_while(|(n, b)| b.is_ascii_alphabetic() || *b == b'_' || (*n > 0 && b.is_ascii_digit()))
        .count();
    (rest.as_bytes().get(tag_len) == Some(&b'$')).then(|| &sql[start..start + tag_len + 2])
}

/// End (exclusive) of the dollar-quoted string opening at `start`.
fn dollar_quote_end(sql: &str, start: usize) -> usize {
    let Some(tag) = dollar_tag(sql, start) else {
        return start + 1;
    };
    let body = start + tag.len();
    sql[body..].find(tag).map_or(sql.len(), |p| body + p + tag.len())
}

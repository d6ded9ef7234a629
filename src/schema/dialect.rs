//! SQL dialects used to render `CREATE TABLE` statements

use crate::schema::column::Primitive;
use std::fmt;

const COLUMN_SEPARATOR: &str = "\n    , ";

/// Maps abstract column types to a database's physical column types
pub trait SqlDialect: fmt::Debug + Send + Sync {
    /// Physical type for a primitive. Must be total.
    fn column_type(&self, primitive: Primitive) -> &'static str;

    /// Render one `"name" TYPE` column definition
    fn ddl_column(&self, name: &str, column_type: &str) -> String;

    /// Render a complete create-table statement from rendered columns
    fn ddl(&self, schema: &str, table: &str, columns: &[String]) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {}.{} (\n    {}\n);",
            quote_identifier(schema),
            quote_identifier(table),
            columns.join(COLUMN_SEPARATOR)
        )
    }
}

/// Double-quote an identifier, doubling any embedded quotes
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Postgres (and Redshift) column types
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl SqlDialect for PostgresDialect {
    fn column_type(&self, primitive: Primitive) -> &'static str {
        match primitive {
            Primitive::Int => "BIGINT",
            Primitive::Datetime => "TIMESTAMP",
            Primitive::Float => "FLOAT",
            Primitive::Str => "VARCHAR(65535)",
            Primitive::Bool => "BOOLEAN",
            // A column that only ever held nulls still needs some type
            Primitive::None => "BOOLEAN",
        }
    }

    fn ddl_column(&self, name: &str, column_type: &str) -> String {
        format!("{} {}", quote_identifier(name), column_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_postgres_column_escapes_quotes() {
        let column = PostgresDialect.ddl_column("say \"hi\"", "BIGINT");
        assert_eq!(column, "\"say \"\"hi\"\"\" BIGINT");
    }

    #[test]
    fn test_postgres_ddl_template() {
        let columns = vec![
            PostgresDialect.ddl_column("a", PostgresDialect.column_type(Primitive::Int)),
            PostgresDialect.ddl_column("b", PostgresDialect.column_type(Primitive::Str)),
        ];
        let ddl = PostgresDialect.ddl("public", "users", &columns);
        assert_eq!(
            ddl,
            "CREATE TABLE IF NOT EXISTS \"public\".\"users\" (\n    \"a\" BIGINT\n    , \"b\" VARCHAR(65535)\n);"
        );
    }
}

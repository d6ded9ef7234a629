//! Choice-aware schema for flattened rows
//!
//! Types are accumulated one row at a time with [`Schema::read_object`]. A
//! column that sees values of different types becomes a *choice* column, which
//! [`Schema::convert_object`] splits into one physical column per type
//! (`<column>_<type>`). Schemas built over separate shards of the same table
//! can be combined with [`Schema::merge`].

use crate::error::SchemaError;
use crate::melt::Row;
use crate::schema::column::{classify, ColumnType, Primitive};
use crate::schema::dialect::{PostgresDialect, SqlDialect};
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, trace, warn};
use unicase::UniCase;

/// Characters besides alphanumerics allowed in column names by default
pub const DEFAULT_ALLOWED_COLUMN_CHARS: &[char] = &[' ', '-', '_'];

/// Column name to column type, rendered through a SQL dialect
#[derive(Debug, Clone)]
pub struct Schema<D = PostgresDialect> {
    columns: IndexMap<String, ColumnType>,
    dialect: D,
}

impl Schema<PostgresDialect> {
    /// Create an empty schema using the Postgres dialect
    pub fn new() -> Self {
        Self::with_dialect(PostgresDialect)
    }
}

impl Default for Schema<PostgresDialect> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: SqlDialect> PartialEq for Schema<D> {
    fn eq(&self, other: &Self) -> bool {
        self.columns == other.columns
    }
}

impl<D: SqlDialect> Schema<D> {
    /// Create an empty schema rendering DDL through `dialect`
    pub fn with_dialect(dialect: D) -> Self {
        Schema {
            columns: IndexMap::new(),
            dialect,
        }
    }

    /// Create a schema from an existing column mapping
    pub fn from_columns(columns: IndexMap<String, ColumnType>, dialect: D) -> Self {
        Schema { columns, dialect }
    }

    pub fn columns(&self) -> &IndexMap<String, ColumnType> {
        &self.columns
    }

    pub fn get(&self, column: &str) -> Option<&ColumnType> {
        self.columns.get(column)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn dialect(&self) -> &D {
        &self.dialect
    }

    /// Fold one flat row into the schema
    pub fn read_object(&mut self, record: &Row) {
        for (key, value) in record {
            self.read_value(key, value);
        }
    }

    fn read_value(&mut self, key: &str, value: &Value) {
        let observed = classify(value);

        let Some(existing) = self.columns.get_mut(key) else {
            if let ColumnType::Unsupported(name) = &observed {
                warn!(column = key, type_name = %name, "Unsupported value type");
            }
            self.columns.insert(key.to_string(), observed);
            return;
        };

        if *existing == observed {
            return;
        }

        let merged = existing.union(&observed);
        if merged != *existing {
            if let ColumnType::Unsupported(name) = &merged {
                warn!(column = key, type_name = %name, "Unsupported value type");
            }
            trace!(column = key, from = %existing, to = %merged, "Column type widened");
            *existing = merged;
        }
    }

    /// Fold every column of `other` into this schema
    pub fn merge_from<E>(&mut self, other: &Schema<E>) {
        for (key, column_type) in &other.columns {
            match self.columns.get_mut(key) {
                Some(existing) => {
                    if existing != column_type {
                        *existing = existing.union(column_type);
                    }
                }
                None => {
                    self.columns.insert(key.clone(), column_type.clone());
                }
            }
        }
    }

    /// Merge independently built schemas into a new one.
    ///
    /// The result is the same as reading every shard's rows through a single
    /// schema, and merging is associative.
    pub fn merge<'a, I>(schemas: I) -> Self
    where
        I: IntoIterator<Item = &'a Schema<D>>,
        D: Default + 'a,
    {
        let mut merged = Schema::with_dialect(D::default());
        for schema in schemas {
            merged.merge_from(schema);
        }
        merged
    }

    /// Convert a row according to the schema.
    ///
    /// Choice columns are split into `<key>_<type>` columns; everything else,
    /// nulls included, passes through. Keys the schema does not know are
    /// dropped.
    pub fn convert_object(&self, record: Row) -> Result<Row, SchemaError> {
        if self.columns.len() > record.len() {
            self.convert_by_record(record)
        } else {
            self.convert_by_schema(record)
        }
    }

    fn convert_by_schema(&self, mut record: Row) -> Result<Row, SchemaError> {
        let mut output = Row::new();
        for (key, column_type) in &self.columns {
            if let Some(value) = record.remove(key) {
                convert_value(key, column_type, value, &mut output)?;
            }
        }
        Ok(output)
    }

    fn convert_by_record(&self, record: Row) -> Result<Row, SchemaError> {
        let mut output = Row::new();
        for (key, value) in record {
            if let Some(column_type) = self.columns.get(&key) {
                convert_value(&key, column_type, value, &mut output)?;
            }
        }
        Ok(output)
    }

    /// Sorted names of every column `convert_object` can produce
    pub fn generate_output_columns(&self) -> Vec<String> {
        let mut columns = Vec::with_capacity(self.columns.len());
        for (key, column_type) in &self.columns {
            match column_type {
                ColumnType::Choice(choice) => {
                    columns.extend(choice.members().map(|member| choice_column(key, member)));
                }
                _ => columns.push(key.clone()),
            }
        }
        columns.sort();
        columns
    }

    /// Render a `CREATE TABLE` statement, one physical column per output
    /// column, sorted by name.
    pub fn generate_ddl(&self, table: &str, schema: &str) -> Result<String, SchemaError> {
        let mut physical: Vec<(String, Primitive)> = Vec::with_capacity(self.columns.len());
        for (key, column_type) in &self.columns {
            match column_type {
                ColumnType::Primitive(primitive) => physical.push((key.clone(), *primitive)),
                ColumnType::Choice(choice) => {
                    physical.extend(
                        choice
                            .members()
                            .map(|member| (choice_column(key, member), member)),
                    );
                }
                ColumnType::Unsupported(name) => {
                    return Err(SchemaError::UnsupportedColumn {
                        column: key.clone(),
                        type_name: name.clone(),
                    });
                }
            }
        }
        physical.sort_by(|a, b| a.0.cmp(&b.0));

        let columns: Vec<String> = physical
            .iter()
            .map(|(name, primitive)| {
                self.dialect
                    .ddl_column(name, self.dialect.column_type(*primitive))
            })
            .collect();

        Ok(self.dialect.ddl(schema, table, &columns))
    }

    /// Drop columns that have only ever seen nulls. Returns the number dropped.
    pub fn drop_null_columns(&mut self) -> usize {
        let before = self.columns.len();
        self.columns.retain(|_, column_type| !column_type.is_none());
        let dropped = before - self.columns.len();
        debug!(dropped, "Dropped null columns");
        dropped
    }

    /// Drop columns whose name contains anything other than alphanumerics
    /// and `allowed_extra`. Returns the number dropped.
    pub fn drop_special_char_columns(&mut self, allowed_extra: &[char]) -> usize {
        let before = self.columns.len();
        self.columns.retain(|key, _| {
            key.chars()
                .all(|c| c.is_alphanumeric() || allowed_extra.contains(&c))
        });
        let dropped = before - self.columns.len();
        debug!(dropped, "Dropped special character columns");
        dropped
    }

    /// Drop columns whose name matches an earlier column under Unicode case
    /// folding (`straße` repeats `STRASSE`). Returns the number dropped.
    pub fn drop_duplicate_columns(&mut self) -> usize {
        let before = self.columns.len();
        let mut seen: HashSet<UniCase<String>> = HashSet::new();
        self.columns
            .retain(|key, _| seen.insert(UniCase::unicode(key.clone())));
        let dropped = before - self.columns.len();
        debug!(dropped, "Dropped duplicate columns");
        dropped
    }

    /// Serialize to a JSON object of column name to type tag
    pub fn serialize(&self) -> Result<String, SchemaError> {
        Ok(serde_json::to_string(&self.columns)?)
    }

    /// Parse a schema produced by [`Schema::serialize`]
    pub fn deserialize(content: &str) -> Result<Self, SchemaError>
    where
        D: Default,
    {
        let columns: IndexMap<String, ColumnType> = serde_json::from_str(content)?;
        Ok(Schema::from_columns(columns, D::default()))
    }
}

fn choice_column(key: &str, member: Primitive) -> String {
    format!("{}_{}", key, member)
}

fn convert_value(
    key: &str,
    column_type: &ColumnType,
    value: Value,
    output: &mut Row,
) -> Result<(), SchemaError> {
    let ColumnType::Choice(choice) = column_type else {
        output.insert(key.to_string(), value);
        return Ok(());
    };

    if value.is_null() {
        output.insert(key.to_string(), value);
        return Ok(());
    }

    match classify(&value) {
        ColumnType::Primitive(found) if choice.contains(found) => {
            output.insert(choice_column(key, found), value);
            Ok(())
        }
        found => Err(SchemaError::TypeMismatch {
            column: key.to_string(),
            expected: column_type.to_string(),
            found: found.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            other => panic!("expected an object, got {other}"),
        }
    }

    fn case_1() -> Row {
        row(json!({"1": 1, "2": "foobar", "3": false, "4": 1.2}))
    }

    fn case_2() -> Row {
        row(json!({"1": "foobar", "2": 9.9, "3": true, "4": 9.5}))
    }

    fn tags(schema: &Schema) -> Value {
        serde_json::from_str(&schema.serialize().unwrap()).unwrap()
    }

    fn schema_of(rows: &[Row]) -> Schema {
        let mut schema = Schema::new();
        for r in rows {
            schema.read_object(r);
        }
        schema
    }

    const CASE_1_DDL: &str = r#"CREATE TABLE IF NOT EXISTS "public"."test" (
    "1" BIGINT
    , "2" VARCHAR(65535)
    , "3" BOOLEAN
    , "4" FLOAT
);"#;

    const CASE_2_DDL: &str = r#"CREATE TABLE IF NOT EXISTS "public"."test" (
    "1_int" BIGINT
    , "1_str" VARCHAR(65535)
    , "2_float" FLOAT
    , "2_str" VARCHAR(65535)
    , "3" BOOLEAN
    , "4" FLOAT
);"#;

    #[test]
    fn test_all_types_no_choice() {
        let schema = schema_of(&[case_1()]);
        assert_eq!(
            tags(&schema),
            json!({"1": "int", "2": "str", "3": "bool", "4": "float"})
        );
    }

    #[test]
    fn test_basic_choice() {
        let schema = schema_of(&[case_1(), case_2()]);
        assert_eq!(
            tags(&schema),
            json!({"1": "c-int-str", "2": "c-float-str", "3": "bool", "4": "float"})
        );
    }

    #[test]
    fn test_read_order_independent() {
        let a = row(json!({"x": 1, "y": null, "z": true}));
        let b = row(json!({"x": "s", "y": 2.5, "w": 1}));
        let c = row(json!({"x": false, "y": null}));

        let forward = schema_of(&[a.clone(), b.clone(), c.clone()]);
        let backward = schema_of(&[c.clone(), b.clone(), a.clone()]);
        let shuffled = schema_of(&[b, a, c]);

        assert_eq!(forward, backward);
        assert_eq!(forward, shuffled);
        assert_eq!(forward.get("x").unwrap().to_string(), "c-bool-int-str");
        assert_eq!(forward.get("y").unwrap().to_string(), "float");
    }

    #[test]
    fn test_wide_integer_stays_int() {
        let wide: Row = serde_json::from_str(r#"{"a": 123456789012345678901234}"#).unwrap();
        let schema = schema_of(&[row(json!({"a": 1})), wide.clone()]);
        assert_eq!(schema.get("a").unwrap().to_string(), "int");

        let converted = schema.convert_object(wide).unwrap();
        assert_eq!(
            serde_json::to_string(&converted).unwrap(),
            r#"{"a":123456789012345678901234}"#
        );
    }

    #[test]
    fn test_none_cases() {
        let mut schema = Schema::new();
        schema.read_object(&row(json!({"1": null})));
        assert_eq!(tags(&schema), json!({"1": "none"}));

        schema.read_object(&row(json!({"1": 1})));
        assert_eq!(tags(&schema), json!({"1": "int"}));

        schema.read_object(&row(json!({"1": "foobar"})));
        assert_eq!(tags(&schema), json!({"1": "c-int-str"}));

        schema.read_object(&row(json!({"1": null})));
        assert_eq!(tags(&schema), json!({"1": "c-int-str"}));
    }

    #[test]
    fn test_merge_noop() {
        let s1 = schema_of(&[case_1()]);
        let s2 = schema_of(&[case_1()]);
        let s3 = schema_of(&[case_1()]);

        let merged = Schema::merge([&s1, &s2, &s3]);
        assert_eq!(merged, s1);
    }

    #[test]
    fn test_merge_choice() {
        let s1 = schema_of(&[case_1()]);
        let s2 = schema_of(&[case_2()]);

        let merged = Schema::merge([&s1, &s2]);
        assert_eq!(
            tags(&merged),
            json!({"1": "c-int-str", "2": "c-float-str", "3": "bool", "4": "float"})
        );
    }

    #[test]
    fn test_merge_equals_single_pass() {
        let s1 = schema_of(&[case_1()]);
        let s2 = schema_of(&[case_2()]);
        let single = schema_of(&[case_1(), case_2()]);

        assert_eq!(Schema::merge([&s1, &s2]), single);
    }

    #[test]
    fn test_merge_associative() {
        let s1 = schema_of(&[row(json!({"a": 1, "b": null}))]);
        let s2 = schema_of(&[row(json!({"a": "x", "c": true}))]);
        let s3 = schema_of(&[row(json!({"a": 1.5, "b": 3}))]);

        let left = Schema::merge([&Schema::merge([&s1, &s2]), &s3]);
        let right = Schema::merge([&s1, &Schema::merge([&s2, &s3])]);
        let flat = Schema::merge([&s1, &s2, &s3]);

        assert_eq!(left, right);
        assert_eq!(left, flat);
        assert_eq!(flat.get("a").unwrap().to_string(), "c-float-int-str");
        assert_eq!(flat.get("b").unwrap().to_string(), "int");
    }

    #[test]
    fn test_merge_reflects_shard_observations() {
        let ints = schema_of(&[row(json!({"a": 1}))]);
        let strs = schema_of(&[row(json!({"a": "x"}))]);

        assert_eq!(Schema::merge([&ints, &ints]).get("a").unwrap().to_string(), "int");
        assert_eq!(
            Schema::merge([&ints, &strs, &ints]).get("a").unwrap().to_string(),
            "c-int-str"
        );
    }

    #[test]
    fn test_merge_keeps_all_null_column() {
        let s1 = schema_of(&[row(json!({"a": null}))]);
        let s2 = schema_of(&[row(json!({"a": null}))]);
        assert!(Schema::merge([&s1, &s2]).get("a").unwrap().is_none());
    }

    #[test]
    fn test_convert_object_no_choice() {
        let schema = schema_of(&[case_1()]);
        assert_eq!(schema.convert_object(case_1()).unwrap(), case_1());
    }

    #[test]
    fn test_convert_object_choice() {
        let schema = schema_of(&[case_1(), case_2()]);

        let converted = schema.convert_object(case_1()).unwrap();
        assert_eq!(
            Value::Object(converted),
            json!({"1_int": 1, "2_str": "foobar", "3": false, "4": 1.2})
        );

        let converted = schema.convert_object(case_2()).unwrap();
        assert_eq!(
            Value::Object(converted),
            json!({"1_str": "foobar", "2_float": 9.9, "3": true, "4": 9.5})
        );
    }

    #[test]
    fn test_convert_strategies_agree() {
        let schema = schema_of(&[case_1(), case_2()]);

        // Fewer keys than the schema walks the record, more walks the schema
        let small = row(json!({"1": "foobar"}));
        assert_eq!(
            Value::Object(schema.convert_object(small).unwrap()),
            json!({"1_str": "foobar"})
        );

        let large = row(json!({"1": 7, "2": 0.5, "3": true, "4": 1.0, "extra": 1}));
        assert_eq!(
            Value::Object(schema.convert_object(large).unwrap()),
            json!({"1_int": 7, "2_float": 0.5, "3": true, "4": 1.0})
        );
    }

    #[test]
    fn test_none_convert() {
        let schema = schema_of(&[row(json!({"1": null})), row(json!({"1": 1})), row(json!({"1": "foobar"}))]);

        let null = schema.convert_object(row(json!({"1": null}))).unwrap();
        assert_eq!(Value::Object(null), json!({"1": null}));

        let int = schema.convert_object(row(json!({"1": 1}))).unwrap();
        assert_eq!(Value::Object(int), json!({"1_int": 1}));

        let string = schema.convert_object(row(json!({"1": "foobar"}))).unwrap();
        assert_eq!(Value::Object(string), json!({"1_str": "foobar"}));
    }

    #[test]
    fn test_convert_type_mismatch() {
        let schema = schema_of(&[row(json!({"1": 1})), row(json!({"1": "x"}))]);
        let err = schema.convert_object(row(json!({"1": true}))).unwrap_err();

        match err {
            SchemaError::TypeMismatch { column, expected, found } => {
                assert_eq!(column, "1");
                assert_eq!(expected, "c-int-str");
                assert_eq!(found, "bool");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_generate_output_columns() {
        let schema = schema_of(&[case_1()]);
        assert_eq!(schema.generate_output_columns(), vec!["1", "2", "3", "4"]);

        let schema = schema_of(&[case_1(), case_2()]);
        assert_eq!(
            schema.generate_output_columns(),
            vec!["1_int", "1_str", "2_float", "2_str", "3", "4"]
        );
    }

    #[test]
    fn test_generate_ddl_no_choice() {
        let schema = schema_of(&[case_1()]);
        assert_eq!(schema.generate_ddl("test", "public").unwrap(), CASE_1_DDL);
    }

    #[test]
    fn test_generate_ddl_choice() {
        let schema = schema_of(&[case_1(), case_2()]);
        assert_eq!(schema.generate_ddl("test", "public").unwrap(), CASE_2_DDL);
    }

    #[test]
    fn test_generate_ddl_rejects_unsupported() {
        let schema = schema_of(&[row(json!({"a": [1, 2]}))]);
        assert!(matches!(
            schema.generate_ddl("t", "public"),
            Err(SchemaError::UnsupportedColumn { .. })
        ));
    }

    #[test]
    fn test_drop_null_columns() {
        let mut schema = schema_of(&[row(json!({"1": null}))]);
        assert!(schema.generate_ddl("t", "public").unwrap().contains("\"1\" BOOLEAN"));
        assert_eq!(schema.drop_null_columns(), 1);
        assert!(schema.is_empty());

        let mut schema = schema_of(&[row(json!({"1": null})), row(json!({"1": 1}))]);
        assert_eq!(schema.drop_null_columns(), 0);
        assert_eq!(tags(&schema), json!({"1": "int"}));
    }

    #[test]
    fn test_drop_special_char_columns() {
        let mut schema = schema_of(&[row(
            json!({"abc ": 1, "def@#": 1, "$$ghi": 1, "jkl": 1, "!@#mno": 1}),
        )]);
        assert_eq!(schema.drop_special_char_columns(DEFAULT_ALLOWED_COLUMN_CHARS), 3);
        assert_eq!(tags(&schema), json!({"abc ": "int", "jkl": "int"}));

        let mut schema = schema_of(&[row(json!({"abc": 1, "de-f": 2, "GH_I ": 3}))]);
        assert_eq!(schema.drop_special_char_columns(DEFAULT_ALLOWED_COLUMN_CHARS), 0);

        let mut schema = schema_of(&[row(json!({"a.b": 1, "c": 2}))]);
        assert_eq!(schema.drop_special_char_columns(&['.']), 0);
        assert_eq!(schema.drop_special_char_columns(&[]), 1);
    }

    #[test]
    fn test_drop_duplicate_columns() {
        let mut schema = schema_of(&[row(json!({
            "ABc ": 1, "DEf ": 1, "ghi": 1, "jkl": 1, "ABC": 1, "abc ": 1, "JkL": 1
        }))]);
        assert_eq!(schema.drop_duplicate_columns(), 2);
        let kept: Vec<&String> = schema.columns().keys().collect();
        assert_eq!(kept, vec!["ABc ", "DEf ", "ghi", "jkl", "ABC"]);

        let mut schema = schema_of(&[row(json!({
            "abc": 1, "ABC": 2, "ABc": 3, "abC ": 4, "D E F": 5, "DEF": 5
        }))]);
        assert_eq!(schema.drop_duplicate_columns(), 2);
        let kept: Vec<&String> = schema.columns().keys().collect();
        assert_eq!(kept, vec!["abc", "abC ", "D E F", "DEF"]);

        let mut schema = schema_of(&[row(json!({"abc": 1, "def": 2, "GH I ": 3}))]);
        assert_eq!(schema.drop_duplicate_columns(), 0);
    }

    #[test]
    fn test_drop_duplicate_columns_case_folds() {
        let mut schema = schema_of(&[row(json!({"STRASSE": 1, "straße": 2, "Ǆ": 3, "ǆ": 4}))]);
        assert_eq!(schema.drop_duplicate_columns(), 2);
        let kept: Vec<&String> = schema.columns().keys().collect();
        assert_eq!(kept, vec!["STRASSE", "Ǆ"]);
    }

    #[test]
    fn test_serialize_round_trip() {
        let mut schema = schema_of(&[case_1(), case_2(), row(json!({"n": null, "u": {"a": 1}}))]);
        schema.read_object(&row(json!({"n": null})));

        let serialized = schema.serialize().unwrap();
        let restored: Schema = Schema::deserialize(&serialized).unwrap();
        assert_eq!(restored, schema);
        assert_eq!(restored.get("u").unwrap().to_string(), "unsupported:object");
    }

    #[test]
    fn test_deserialize_rejects_unknown_tag() {
        assert!(Schema::<PostgresDialect>::deserialize(r#"{"a": "integer"}"#).is_err());
    }

    #[test]
    fn test_deserialized_datetime_renders_timestamp() {
        let schema: Schema = Schema::deserialize(r#"{"at": "datetime"}"#).unwrap();
        assert!(schema
            .generate_ddl("events", "public")
            .unwrap()
            .contains("\"at\" TIMESTAMP"));
    }
}

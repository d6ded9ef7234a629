use crate::melt::types::Row;
use crate::schema::Schema;
use indexmap::IndexMap;

/// Notified once for every row the relationalizer writes
pub trait WriteObserver {
    fn on_write(&mut self, table_key: &str, row: &Row);
}

/// Ignores every write
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl WriteObserver for NoopObserver {
    fn on_write(&mut self, _table_key: &str, _row: &Row) {}
}

impl<F> WriteObserver for F
where
    F: FnMut(&str, &Row),
{
    fn on_write(&mut self, table_key: &str, row: &Row) {
        self(table_key, row)
    }
}

/// Builds one schema per table while rows are being written
#[derive(Debug, Clone, Default)]
pub struct SchemaCollector {
    schemas: IndexMap<String, Schema>,
}

impl SchemaCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schemas(&self) -> &IndexMap<String, Schema> {
        &self.schemas
    }

    pub fn get(&self, table_key: &str) -> Option<&Schema> {
        self.schemas.get(table_key)
    }

    pub fn into_schemas(self) -> IndexMap<String, Schema> {
        self.schemas
    }
}

impl WriteObserver for SchemaCollector {
    fn on_write(&mut self, table_key: &str, row: &Row) {
        match self.schemas.get_mut(table_key) {
            Some(schema) => schema.read_object(row),
            None => {
                let mut schema = Schema::new();
                schema.read_object(row);
                self.schemas.insert(table_key.to_string(), schema);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_schema_collector_groups_by_table() {
        let mut collector = SchemaCollector::new();
        let a: Row = serde_json::from_value(json!({"x": 1})).unwrap();
        let b: Row = serde_json::from_value(json!({"x": "s"})).unwrap();

        collector.on_write("t", &a);
        collector.on_write("t", &b);
        collector.on_write("t_y", &a);

        assert_eq!(collector.schemas().len(), 2);
        assert_eq!(collector.get("t").unwrap().get("x").unwrap().to_string(), "c-int-str");
        assert_eq!(collector.get("t_y").unwrap().get("x").unwrap().to_string(), "int");
    }

    #[test]
    fn test_closure_observer() {
        let mut seen = Vec::new();
        {
            let mut observer = |key: &str, row: &Row| seen.push((key.to_string(), row.len()));
            observer.on_write("t", &Row::new());
        }
        assert_eq!(seen, vec![("t".to_string(), 0)]);
    }
}

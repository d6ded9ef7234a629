use crate::error::RelationalizeError;
use crate::melt::observer::{NoopObserver, WriteObserver};
use crate::melt::types::{join_path, sub_table_key, Rid, Row, INDEX_COLUMN, RID_COLUMN, VAL_COLUMN};
use crate::melt::writer::OutputFactory;
use indexmap::IndexMap;
use serde_json::Value;
use std::io::Write;
use tracing::debug;

/// Flattens nested JSON records into linked flat tables.
///
/// Objects are flattened into their parent row with `_`-joined column names.
/// Every array gets a fresh linkage id: the parent row stores the id in place
/// of the array, and each element becomes a row of the sub-table
/// `<name>_<path>` carrying `_rid_` (the id) and `_index_` (its position).
/// Scalar elements are stored under `_val_`.
///
/// Streams are opened lazily, one per table key, and stay owned by the
/// relationalizer until [`Relationalizer::finish`] flushes and returns them.
/// Dropping the relationalizer early (for example after an error) closes them.
pub struct Relationalizer<F: OutputFactory, O: WriteObserver = NoopObserver> {
    name: String,
    factory: F,
    observer: O,
    outputs: IndexMap<String, F::Output>,
}

/// Streams and observer handed back by [`Relationalizer::finish`]
pub struct Finished<W, O> {
    pub outputs: IndexMap<String, W>,
    pub observer: O,
}

impl<F: OutputFactory> Relationalizer<F, NoopObserver> {
    /// Create a relationalizer writing tables named after `name`
    pub fn new(name: impl Into<String>, factory: F) -> Self {
        Relationalizer {
            name: name.into(),
            factory,
            observer: NoopObserver,
            outputs: IndexMap::new(),
        }
    }
}

impl<F: OutputFactory, O: WriteObserver> Relationalizer<F, O> {
    /// Replace the write observer
    pub fn with_observer<P: WriteObserver>(self, observer: P) -> Relationalizer<F, P> {
        Relationalizer {
            name: self.name,
            factory: self.factory,
            observer,
            outputs: self.outputs,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Streams opened so far, keyed by table key
    pub fn outputs(&self) -> &IndexMap<String, F::Output> {
        &self.outputs
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    /// Relationalize every record, writing the root rows to the table `name`
    pub fn relationalize<I>(&mut self, records: I) -> Result<(), RelationalizeError>
    where
        I: IntoIterator<Item = Value>,
    {
        for record in records {
            self.relationalize_one(record)?;
        }
        Ok(())
    }

    /// Relationalize a single record
    pub fn relationalize_one(&mut self, record: Value) -> Result<(), RelationalizeError> {
        if !record.is_object() {
            return Err(RelationalizeError::Structural(value_kind(&record)));
        }

        let row = self.flatten(record, "")?;
        let table = self.name.clone();
        self.write_row(&table, row)
    }

    /// Flush every stream and hand them back along with the observer
    pub fn finish(mut self) -> Result<Finished<F::Output, O>, RelationalizeError> {
        for (table_key, output) in self.outputs.iter_mut() {
            debug!(table = %table_key, "Closing table stream");
            output.flush()?;
        }
        Ok(Finished {
            outputs: self.outputs,
            observer: self.observer,
        })
    }

    /// Recursive flattening. Returns the columns this value contributes to the
    /// row that contains it; array elements are written as they are produced.
    fn flatten(&mut self, value: Value, path: &str) -> Result<Row, RelationalizeError> {
        match value {
            Value::Object(object) => {
                let mut row = Row::new();
                for (key, child) in object {
                    let child_path = join_path(path, &key);
                    row.extend(self.flatten(child, &child_path)?);
                }
                Ok(row)
            }
            Value::Array(items) => {
                let rid = Rid::generate();
                let table_key = sub_table_key(&self.name, path);

                for (index, item) in items.into_iter().enumerate() {
                    let element = link_element(item, &rid, index);
                    let row = self.flatten(Value::Object(element), path)?;
                    self.write_row(&table_key, row)?;
                }

                let mut row = Row::new();
                row.insert(path.to_string(), rid.into());
                Ok(row)
            }
            scalar => {
                let mut row = Row::new();
                row.insert(path.to_string(), scalar);
                Ok(row)
            }
        }
    }

    fn write_row(&mut self, table_key: &str, row: Row) -> Result<(), RelationalizeError> {
        if !self.outputs.contains_key(table_key) {
            debug!(table = table_key, "Opening table stream");
            let output = self.factory.open(table_key)?;
            self.outputs.insert(table_key.to_string(), output);
        }

        if let Some(output) = self.outputs.get_mut(table_key) {
            serde_json::to_writer(&mut *output, &row)?;
            output.write_all(b"\n")?;
        }
        self.observer.on_write(table_key, &row);
        Ok(())
    }
}

/// Attach the linkage columns to an array element, wrapping scalars
fn link_element(item: Value, rid: &Rid, index: usize) -> Row {
    let mut element = match item {
        Value::Object(object) => object,
        scalar => {
            let mut wrapper = Row::new();
            wrapper.insert(VAL_COLUMN.to_string(), scalar);
            wrapper
        }
    };
    element.insert(RID_COLUMN.to_string(), Value::String(rid.to_string()));
    element.insert(INDEX_COLUMN.to_string(), Value::from(index));
    element
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

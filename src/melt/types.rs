use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

/// One flat record: column name to scalar value
pub type Row = Map<String, Value>;

/// Separator used when joining paths and table names
pub const DELIMITER: &str = "_";

/// Prefix of every generated linkage id
pub const ID_PREFIX: &str = "R";

/// Reserved column holding the linkage id of the parent array
pub const RID_COLUMN: &str = "_rid_";

/// Reserved column holding the position within the parent array
pub const INDEX_COLUMN: &str = "_index_";

/// Reserved column holding a scalar array element
pub const VAL_COLUMN: &str = "_val_";

/// Linkage id shared by an array's parent field and all of its child rows
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Rid(String);

impl Rid {
    /// Mint a new id, e.g. `R_2d0418f3b5de415086f1297cf0a9d9a5`
    pub fn generate() -> Self {
        Rid(format!("{}{}{}", ID_PREFIX, DELIMITER, Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Rid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<Rid> for Value {
    fn from(rid: Rid) -> Self {
        Value::String(rid.0)
    }
}

/// Join a path segment onto a path; the root path gets no separator
pub fn join_path(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{}{}{}", path, DELIMITER, key)
    }
}

/// Table key for rows exploded from the array at `path`
pub fn sub_table_key(table: &str, path: &str) -> String {
    format!("{}{}{}", table, DELIMITER, path)
}

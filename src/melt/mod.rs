//! JSON relationalizing - flatten nested JSON into linked relational tables
//!
//! Nested objects are flattened into their parent row; arrays are exploded
//! into sub-tables whose rows point back at the parent through a generated
//! linkage id. Output streams come from an [`OutputFactory`] and every written
//! row is reported to a [`WriteObserver`], typically a [`SchemaCollector`].

pub mod extractor;
pub mod observer;
pub mod types;
pub mod writer;

pub use extractor::{Finished, Relationalizer};
pub use observer::{NoopObserver, SchemaCollector, WriteObserver};
pub use types::{Rid, Row, DELIMITER, INDEX_COLUMN, RID_COLUMN, VAL_COLUMN};
pub use writer::{table_file_name, BufferOutput, LocalFileOutput, OutputFactory};

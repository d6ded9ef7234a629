//! Output stream factories
//!
//! The relationalizer asks a factory for one writable stream per table key,
//! the first time a row for that table is written.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Opens a writable stream for a table key
pub trait OutputFactory {
    type Output: Write;

    fn open(&mut self, table_key: &str) -> io::Result<Self::Output>;
}

impl<W, F> OutputFactory for F
where
    W: Write,
    F: FnMut(&str) -> io::Result<W>,
{
    type Output = W;

    fn open(&mut self, table_key: &str) -> io::Result<W> {
        self(table_key)
    }
}

/// Writes each table to `<dir>/<table_key>.json` as newline-delimited JSON
#[derive(Debug, Clone)]
pub struct LocalFileOutput {
    dir: PathBuf,
}

impl LocalFileOutput {
    /// Create a factory writing into `dir`, creating it if needed
    pub fn new<P: AsRef<Path>>(dir: P) -> io::Result<Self> {
        std::fs::create_dir_all(&dir)?;
        Ok(LocalFileOutput {
            dir: dir.as_ref().to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file backing `table_key`
    pub fn path_for(&self, table_key: &str) -> PathBuf {
        self.dir.join(table_file_name(table_key, "json"))
    }
}

/// File name for a table, with path separators percent-encoded.
///
/// Table keys come from record keys, so `a/b` or `../x` must stay a single
/// file inside the output directory. `%` is encoded too, which keeps distinct
/// keys on distinct files.
pub fn table_file_name(table_key: &str, extension: &str) -> String {
    let mut name = String::with_capacity(table_key.len() + extension.len() + 1);
    for c in table_key.chars() {
        match c {
            '%' => name.push_str("%25"),
            '/' => name.push_str("%2F"),
            '\\' => name.push_str("%5C"),
            '\0' => name.push_str("%00"),
            c => name.push(c),
        }
    }
    name.push('.');
    name.push_str(extension);
    name
}

impl OutputFactory for LocalFileOutput {
    type Output = BufWriter<File>;

    fn open(&mut self, table_key: &str) -> io::Result<Self::Output> {
        let path = self.path_for(table_key);
        debug!(path = %path.display(), "Opening table file");
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;
        Ok(BufWriter::new(file))
    }
}

/// Keeps every table in an in-memory buffer
#[derive(Debug, Clone, Copy, Default)]
pub struct BufferOutput;

impl OutputFactory for BufferOutput {
    type Output = Vec<u8>;

    fn open(&mut self, table_key: &str) -> io::Result<Self::Output> {
        debug!(table = table_key, "Opening table buffer");
        Ok(Vec::new())
    }
}

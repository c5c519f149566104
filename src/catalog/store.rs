use crate::Result;
use crate::catalog::Record;
use camino::{Utf8Path, Utf8PathBuf};
use ohno::{IntoAppError, bail};
use serde_yaml::Value;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use walkdir::WalkDir;

const LOG_TARGET: &str = "     store";

/// A record together with the file it was read from
#[derive(Debug, Clone)]
pub struct StoredRecord {
    pub path: Utf8PathBuf,
    pub record: Record,
}

/// Directory of YAML record files
#[derive(Debug, Clone)]
pub struct RecordStore {
    dir: Utf8PathBuf,
}

impl RecordStore {
    #[must_use]
    pub fn new(dir: impl Into<Utf8PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    /// Path a record is expected to live at
    #[must_use]
    pub fn path_for(&self, record: &Record) -> Utf8PathBuf {
        self.dir.join(format!("{}.yml", record.slug()))
    }

    /// Read every `*.yml`/`*.yaml` file in the directory, ordered by file name
    ///
    /// # Errors
    ///
    /// Fails if the directory cannot be listed or any file is not a valid record.
    pub fn load_all(&self) -> Result<Vec<StoredRecord>> {
        let mut records = Vec::new();

        for entry in WalkDir::new(&self.dir).min_depth(1).max_depth(1).sort_by_file_name() {
            let entry = entry.into_app_err_with(|| format!("listing records in {}", self.dir))?;
            if !entry.file_type().is_file() {
                continue;
            }

            let Some(path) = Utf8Path::from_path(entry.path()) else {
                log::warn!(target: LOG_TARGET, "Skipping record file with a non UTF-8 path: {}", entry.path().display());
                continue;
            };

            if !matches!(path.extension(), Some("yml" | "yaml")) {
                continue;
            }

            let record = self.load(path)?;
            if path.file_stem() != Some(record.slug().as_str()) {
                log::warn!(target: LOG_TARGET, "Record '{}' is stored in {path}, expected {}", record.name(), self.path_for(&record));
            }

            records.push(StoredRecord {
                path: path.to_path_buf(),
                record,
            });
        }

        log::debug!(target: LOG_TARGET, "Loaded {} records from {}", records.len(), self.dir);
        Ok(records)
    }

    /// Read a single record file
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or does not hold exactly one record mapping.
    pub fn load(&self, path: &Utf8Path) -> Result<Record> {
        let value = read_yaml(path)?;
        Record::from_value(value).into_app_err_with(|| format!("reading record from {path}"))
    }

    /// Rewrite a record at its stored location
    ///
    /// The new content is written to a temporary file next to the target and renamed over it, so
    /// readers only ever observe the old or the new document.
    ///
    /// # Errors
    ///
    /// Fails if the document cannot be serialized, written or renamed into place.
    pub fn save(&self, stored: &StoredRecord) -> Result<()> {
        write_atomic(&stored.path, &stored.record)
    }
}

/// Read records from a single file holding either one mapping or a sequence of mappings
///
/// # Errors
///
/// Fails if the file cannot be read or any entry is not a valid record.
pub fn load_file(path: &Utf8Path) -> Result<Vec<Record>> {
    match read_yaml(path)? {
        Value::Sequence(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| Record::from_value(item).into_app_err_with(|| format!("reading record #{i} from {path}")))
            .collect(),
        value @ Value::Mapping(_) => Ok(vec![Record::from_value(value)?]),
        _ => bail!("{path} holds neither a record nor a list of records"),
    }
}

fn read_yaml(path: &Utf8Path) -> Result<Value> {
    let file = File::open(path).into_app_err_with(|| format!("unable to open file '{path}'"))?;
    let reader = BufReader::new(file);
    serde_yaml::from_reader(reader).into_app_err_with(|| format!("unable to parse file '{path}'"))
}

fn write_atomic(path: &Utf8Path, record: &Record) -> Result<()> {
    let Some(file_name) = path.file_name() else {
        bail!("record path '{path}' has no file name");
    };
    let tmp_path = path.with_file_name(format!(".{file_name}.tmp"));

    let file = File::create(&tmp_path).into_app_err_with(|| format!("unable to create file '{tmp_path}'"))?;
    let mut writer = BufWriter::new(file);
    serde_yaml::to_writer(&mut writer, record.fields()).into_app_err_with(|| format!("unable to serialize record '{}'", record.name()))?;
    writer.flush().into_app_err_with(|| format!("unable to flush file '{tmp_path}'"))?;

    let file = writer.into_inner().into_app_err_with(|| format!("unable to flush file '{tmp_path}'"))?;
    file.sync_all().into_app_err_with(|| format!("unable to sync file '{tmp_path}'"))?;
    drop(file);

    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e).into_app_err_with(|| format!("unable to replace '{path}'"));
    }

    log::debug!(target: LOG_TARGET, "Saved record '{}' to {path}", record.name());
    Ok(())
}

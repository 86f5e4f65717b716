//! Parsing of the manifest: the ordered list of files and directories to
//! freeze, one `source,target,storage_class,force` record per line.

mod storage_class;

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use log::warn;
use tokio::task::spawn_blocking;

use crate::{
    error::{Error, Result},
    format::format_path,
};

pub use storage_class::{StorageClass, UnknownStorageClass};

pub const ARCHIVE_SUFFIX: &str = ".tar.gz";
pub const FORCE_TOKEN: &str = "force";

const BYTE_ORDER_MARK: char = '\u{feff}';
const MIN_FIELDS: usize = 2;
const MAX_FIELDS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Uploaded as-is.
    File,
    /// Archived to a `.tar.gz` first, then uploaded.
    Directory,
}

/// A manifest record as written, before its source has been looked at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestLine {
    pub source: String,
    pub target_key: String,
    pub storage_class: StorageClass,
    pub force: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub source: PathBuf,
    pub target_key: String,
    pub storage_class: StorageClass,
    pub force: bool,
    pub kind: EntryKind,
}

impl ManifestEntry {
    pub fn is_directory(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    entries: Vec<ManifestEntry>,
}

impl Manifest {
    /// Reads the manifest at `path`, resolving relative sources against the
    /// current working directory.
    pub async fn load(path: &Path) -> Result<Self> {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read manifest {}", format_path(path)))?;
        let base_dir = std::env::current_dir()?;
        spawn_blocking(move || Manifest::parse(&text, &base_dir)).await?
    }

    /// Parses every line of `text`. Any bad line rejects the whole manifest.
    pub fn parse(text: &str, base_dir: &Path) -> Result<Self> {
        let text = text.strip_prefix(BYTE_ORDER_MARK).unwrap_or(text);
        let mut entries = vec![];

        for (index, raw_line) in text.lines().enumerate() {
            let line_number = index + 1;
            if let Some(line) = parse_line(raw_line, line_number)? {
                entries.push(resolve(line, base_dir, line_number)?);
            }
        }

        Ok(Manifest { entries })
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, target_key: &str) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.target_key == target_key)
    }
}

/// Parses one raw line. Blank lines yield `None`.
pub fn parse_line(raw_line: &str, line_number: usize) -> Result<Option<ManifestLine>> {
    if raw_line.trim().is_empty() {
        return Ok(None);
    }

    let fields = split_fields(raw_line).map_err(|reason| Error::malformed(line_number, reason))?;
    if !(MIN_FIELDS..=MAX_FIELDS).contains(&fields.len()) {
        return Err(Error::malformed(
            line_number,
            format!(
                "expected {MIN_FIELDS} to {MAX_FIELDS} fields, found {}",
                fields.len()
            ),
        ));
    }

    let field = |i: usize| fields.get(i).map_or("", Field::value);

    let source = field(0);
    if source.is_empty() {
        return Err(Error::malformed(line_number, "source is empty"));
    }

    let target_key = field(1);
    if target_key.is_empty() {
        return Err(Error::malformed(line_number, "target is empty"));
    }

    let storage_class = match field(2) {
        "" => StorageClass::default(),
        name => name
            .parse()
            .map_err(|err: UnknownStorageClass| Error::malformed(line_number, err.to_string()))?,
    };

    let force = match field(3) {
        "" => false,
        token if token.eq_ignore_ascii_case(FORCE_TOKEN) => true,
        token => {
            warn!("manifest line {line_number}: ignoring unrecognized force flag `{token}`");
            false
        }
    };

    Ok(Some(ManifestLine {
        source: source.to_owned(),
        target_key: target_key.to_owned(),
        storage_class,
        force,
    }))
}

fn resolve(line: ManifestLine, base_dir: &Path, line_number: usize) -> Result<ManifestEntry> {
    let source = base_dir.join(&line.source);
    let is_dir = fs::metadata(&source).is_ok_and(|metadata| metadata.is_dir());

    let kind = if is_dir {
        if !line.target_key.ends_with(ARCHIVE_SUFFIX) {
            return Err(Error::malformed(
                line_number,
                format!(
                    "`{}` is a directory but target `{}` does not end in `{ARCHIVE_SUFFIX}`",
                    line.source, line.target_key
                ),
            ));
        }
        EntryKind::Directory
    } else {
        EntryKind::File
    };

    Ok(ManifestEntry {
        source,
        target_key: line.target_key,
        storage_class: line.storage_class,
        force: line.force,
        kind,
    })
}

/// A raw field. Quoted fields keep their whitespace.
#[derive(Debug, Default)]
struct Field {
    text: String,
    quoted: bool,
}

impl Field {
    fn value(&self) -> &str {
        if self.quoted {
            &self.text
        } else {
            self.text.trim()
        }
    }
}

fn split_fields(line: &str) -> std::result::Result<Vec<Field>, &'static str> {
    let mut fields = vec![];
    let mut field = Field::default();
    let mut in_quotes = false;
    let mut closed = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            if c != '"' {
                field.text.push(c);
            } else if chars.peek() == Some(&'"') {
                chars.next();
                field.text.push('"');
            } else {
                in_quotes = false;
                closed = true;
            }
            continue;
        }

        match c {
            ',' => {
                fields.push(std::mem::take(&mut field));
                closed = false;
            }
            c if closed => {
                if !c.is_whitespace() {
                    return Err("unexpected text after closing quote");
                }
            }
            '"' if field.text.trim().is_empty() => {
                field.text.clear();
                field.quoted = true;
                in_quotes = true;
            }
            c => field.text.push(c),
        }
    }

    if in_quotes {
        return Err("unterminated quoted field");
    }

    fields.push(field);
    Ok(fields)
}

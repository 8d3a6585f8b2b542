//! Uploaded files and their placement in a file tree.
//!
//! Mirrors the PHP `$_FILES` entry: client name, MIME type, temporary path,
//! size and upload error code, plus the uid/gid the file is handed to.
//! Reference: $PHP_SRC_PATH/main/rfc1867.c

use crate::tree::{DuplicatePolicy, KeyConflict, Leaf, Tree};
use log::warn;
use serde::{Serialize, Serializer};
use std::fs;
use std::io;
use std::path::PathBuf;
use std::rc::Rc;

/// There is no error, the file uploaded with success.
pub const UPLOAD_ERR_OK: i32 = 0;
/// The uploaded file exceeds the configured size limit.
pub const UPLOAD_ERR_INI_SIZE: i32 = 1;
/// No file was uploaded.
pub const UPLOAD_ERR_NO_FILE: i32 = 4;

/// Raw file part as decoded from a multipart body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    pub filename: String,
    pub content_type: String,
    /// Spooled copy of the part data; `None` when nothing was stored.
    pub tmp_name: Option<PathBuf>,
    pub size: u64,
    pub error: i32,
}

impl FileHeader {
    /// Header for a file input submitted without a file.
    pub fn empty(content_type: impl Into<String>) -> Self {
        Self {
            filename: String::new(),
            content_type: content_type.into(),
            tmp_name: None,
            size: 0,
            error: UPLOAD_ERR_NO_FILE,
        }
    }
}

/// One uploaded file, as placed into the file tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileUpload {
    pub name: String,
    pub mime: String,
    /// Spooled file; serialized as a (lossy) string, empty when absent.
    #[serde(serialize_with = "serialize_tmp_name")]
    pub tmp_name: Option<PathBuf>,
    pub error: i32,
    pub size: u64,
    pub uid: u32,
    pub gid: u32,
}

impl FileUpload {
    /// Wrap a decoded file part, recording who should own it.
    pub fn new(header: &FileHeader, uid: u32, gid: u32) -> Self {
        Self {
            name: header.filename.clone(),
            mime: header.content_type.clone(),
            tmp_name: header.tmp_name.clone(),
            error: header.error,
            size: header.size,
            uid,
            gid,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error == UPLOAD_ERR_OK
    }
}

fn serialize_tmp_name<S: Serializer>(
    tmp_name: &Option<PathBuf>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match tmp_name {
        Some(path) => serializer.serialize_str(&path.to_string_lossy()),
        None => serializer.serialize_str(""),
    }
}

impl Leaf for Rc<FileUpload> {
    const DUPLICATES: DuplicatePolicy = DuplicatePolicy::FirstWins;

    fn is_blank(&self) -> bool {
        self.error == UPLOAD_ERR_NO_FILE
    }
}

/// Tree of upload references.
pub type FileTree = Tree<Rc<FileUpload>>;

/// Uploaded files of one request: nested by field name, and as a flat list.
#[derive(Debug, Clone, Default)]
pub struct Uploads {
    tree: FileTree,
    list: Vec<Rc<FileUpload>>,
}

impl Uploads {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the files submitted under one field name.
    pub fn push(&mut self, name: &str, files: Vec<Rc<FileUpload>>) -> Result<(), KeyConflict> {
        self.tree.push(name, &files)?;
        self.list.extend(files);
        Ok(())
    }

    pub fn tree(&self) -> &FileTree {
        &self.tree
    }

    /// Every upload in the order it was recorded.
    pub fn list(&self) -> &[Rc<FileUpload>] {
        &self.list
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn into_parts(self) -> (FileTree, Vec<Rc<FileUpload>>) {
        (self.tree, self.list)
    }

    /// Remove the temporary files behind every upload.
    pub fn clear(&self) {
        for upload in &self.list {
            let Some(path) = &upload.tmp_name else {
                continue;
            };
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!("cannot remove upload {}: {}", path.display(), e),
            }
        }
    }
}

impl Serialize for Uploads {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.tree.serialize(serializer)
    }
}

//! Request adapters.
//!
//! Turn the decoded fields of one request into nested trees, the way PHP
//! fills `$_GET`, `$_POST` and `$_FILES`.
//! Reference: $PHP_SRC_PATH/main/php_variables.c - php_default_treat_data

pub mod body;
pub mod upload;

use crate::tree::{DataTree, KeyConflict};
use log::warn;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::rc::Rc;
use thiserror::Error;
use upload::{FileHeader, FileUpload, Uploads};

/// Field name to submitted values, in submission order per field.
pub type Values = HashMap<String, Vec<String>>;

/// Decoded `multipart/form-data` body.
#[derive(Debug, Clone, Default)]
pub struct MultipartForm {
    pub value: Values,
    pub file: HashMap<String, Vec<FileHeader>>,
}

impl MultipartForm {
    /// Remove every spooled file part.
    pub fn remove_all(&self) {
        for header in self.file.values().flatten() {
            let Some(path) = &header.tmp_name else {
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

/// Form fields of one request, before nesting.
#[derive(Debug, Clone, Default)]
pub struct FormRequest {
    /// Fields of the URL query string.
    pub query: Values,
    /// Fields of an `application/x-www-form-urlencoded` body.
    pub post_form: Option<Values>,
    pub multipart: Option<MultipartForm>,
}

/// Body decoding settings.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Directory for spooled file parts; the system temp dir when unset.
    pub tmp_dir: Option<PathBuf>,
    /// Largest accepted file part in bytes. Larger parts are recorded with
    /// [`upload::UPLOAD_ERR_INI_SIZE`] and not stored.
    pub max_file_size: Option<u64>,
}

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("multipart/form-data request is missing a boundary")]
    MissingBoundary,
    #[error("malformed multipart body: {0}")]
    Multipart(#[source] io::Error),
    #[error("cannot store uploaded file: {0}")]
    Spool(#[source] io::Error),
    #[error(transparent)]
    Conflict(#[from] KeyConflict),
}

/// Field names in lexicographic order, so conflicts surface the same way on
/// every run.
fn sorted<V>(fields: &HashMap<String, V>) -> Vec<(&String, &V)> {
    let mut fields: Vec<_> = fields.iter().collect();
    fields.sort_unstable_by(|a, b| a.0.cmp(b.0));
    fields
}

/// Nest the urlencoded and multipart text fields of a request into one tree.
pub fn parse_data(request: &FormRequest) -> Result<DataTree, KeyConflict> {
    let mut data = DataTree::new();

    if let Some(form) = &request.post_form {
        for (name, values) in sorted(form) {
            data.push(name, values)?;
        }
    }

    if let Some(multipart) = &request.multipart {
        for (name, values) in sorted(&multipart.value) {
            data.push(name, values)?;
        }
    }

    Ok(data)
}

/// Nest the query string fields of a request.
pub fn parse_query(request: &FormRequest) -> Result<DataTree, KeyConflict> {
    let mut data = DataTree::new();
    for (name, values) in sorted(&request.query) {
        data.push(name, values)?;
    }
    Ok(data)
}

/// Collect the uploaded files of a request, handing each one to `uid`/`gid`.
pub fn parse_uploads(request: &FormRequest, uid: u32, gid: u32) -> Result<Uploads, KeyConflict> {
    let mut uploads = Uploads::new();

    let Some(multipart) = &request.multipart else {
        return Ok(uploads);
    };

    for (name, headers) in sorted(&multipart.file) {
        let files = headers
            .iter()
            .map(|header| Rc::new(FileUpload::new(header, uid, gid)))
            .collect();
        uploads.push(name, files)?;
    }

    Ok(uploads)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Node;

    fn values(fields: &[(&str, &[&str])]) -> Values {
        fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.iter().map(|s| s.to_string()).collect()))
            .collect()
    }

    fn header(filename: &str) -> FileHeader {
        FileHeader {
            filename: filename.to_string(),
            content_type: "image/png".to_string(),
            tmp_name: Some(PathBuf::from(format!("/tmp/{filename}"))),
            size: 10,
            error: upload::UPLOAD_ERR_OK,
        }
    }

    #[test]
    fn test_parse_data_merges_form_and_multipart() {
        let request = FormRequest {
            post_form: Some(values(&[("user[name]", &["ann"])])),
            multipart: Some(MultipartForm {
                value: values(&[("user[age]", &["30"])]),
                file: HashMap::new(),
            }),
            ..Default::default()
        };

        let data = parse_data(&request).unwrap();
        let user = data.get("user").and_then(Node::as_branch).unwrap();
        assert_eq!(user.keys().collect::<Vec<_>>(), vec!["name", "age"]);
    }

    #[test]
    fn test_parse_data_placeholder_before_children() {
        // "options" sorts before "options[0][id]"
        let request = FormRequest {
            post_form: Some(values(&[
                ("options[0][id]", &["1"]),
                ("options", &[""]),
                ("options[1][id]", &["2"]),
            ])),
            ..Default::default()
        };

        let data = parse_data(&request).unwrap();
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"options": {"0": {"id": "1"}, "1": {"id": "2"}}})
        );
    }

    #[test]
    fn test_parse_data_conflict_stops_parse() {
        let request = FormRequest {
            post_form: Some(values(&[("a", &["x"]), ("a[b]", &["y"])])),
            ..Default::default()
        };
        let err = parse_data(&request).unwrap_err();
        assert_eq!(err.key, "a");
    }

    #[test]
    fn test_parse_data_empty_request() {
        let data = parse_data(&FormRequest::default()).unwrap();
        assert!(data.is_empty());
    }

    #[test]
    fn test_parse_query() {
        let request = FormRequest {
            query: values(&[("page", &["2"]), ("filter[tags][]", &["a", "b"])]),
            post_form: Some(values(&[("ignored", &["1"])])),
            ..Default::default()
        };
        let query = parse_query(&request).unwrap();
        assert_eq!(
            serde_json::to_value(&query).unwrap(),
            serde_json::json!({"filter": {"tags": ["a", "b"]}, "page": "2"})
        );
    }

    #[test]
    fn test_parse_uploads_without_multipart() {
        let uploads = parse_uploads(&FormRequest::default(), 1, 1).unwrap();
        assert!(uploads.is_empty());
        assert!(uploads.tree().is_empty());
    }

    #[test]
    fn test_parse_uploads_sets_owner() {
        let mut file = HashMap::new();
        file.insert("avatar".to_string(), vec![header("me.png")]);
        let request = FormRequest {
            multipart: Some(MultipartForm {
                value: Values::new(),
                file,
            }),
            ..Default::default()
        };

        let uploads = parse_uploads(&request, 501, 20).unwrap();
        let avatar = uploads.tree().get("avatar").and_then(Node::as_scalar).unwrap();
        assert_eq!(avatar.name, "me.png");
        assert_eq!((avatar.uid, avatar.gid), (501, 20));
        assert!(Rc::ptr_eq(avatar, &uploads.list()[0]));
    }

    #[test]
    fn test_parse_uploads_conflict() {
        let mut file = HashMap::new();
        file.insert("doc".to_string(), vec![header("a.pdf")]);
        file.insert("doc[x]".to_string(), vec![header("b.pdf")]);
        let request = FormRequest {
            multipart: Some(MultipartForm {
                value: Values::new(),
                file,
            }),
            ..Default::default()
        };
        let err = parse_uploads(&request, 0, 0).unwrap_err();
        assert_eq!(err.key, "doc");
    }
}

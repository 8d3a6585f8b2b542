//! Request body decoding.
//!
//! Splits a raw request into query fields, urlencoded fields and multipart
//! parts. File parts are spooled to temporary files that outlive the parse.
//! Reference: php-src/main/rfc1867.c, php-src/main/SAPI.c

use super::upload::{FileHeader, UPLOAD_ERR_INI_SIZE, UPLOAD_ERR_OK};
use super::{Config, FormRequest, MultipartForm, RequestError, Values};
use log::debug;
use multipart::server::Multipart;
use std::io::{self, Cursor, Read};
use tempfile::{Builder, NamedTempFile};

const DEFAULT_FILE_TYPE: &str = "application/octet-stream";

impl FormRequest {
    /// Decode the query string and, for methods carrying a form body, the
    /// urlencoded or multipart body.
    pub fn from_body(
        method: &str,
        content_type: &str,
        query_string: &str,
        body: &[u8],
        config: &Config,
    ) -> Result<Self, RequestError> {
        let mut request = FormRequest {
            query: parse_query_string(query_string.as_bytes()),
            ..Default::default()
        };

        if !has_form_body(method) {
            return Ok(request);
        }

        match media_type(content_type).as_str() {
            "application/x-www-form-urlencoded" => {
                request.post_form = Some(parse_query_string(body));
            }
            "multipart/form-data" => {
                request.multipart = Some(parse_multipart(content_type, body, config)?);
            }
            other => debug!("no form fields in {} body", other),
        }

        Ok(request)
    }
}

fn has_form_body(method: &str) -> bool {
    matches!(
        method.to_ascii_uppercase().as_str(),
        "POST" | "PUT" | "PATCH"
    )
}

/// Lowercased `type/subtype` part of a Content-Type header.
fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Parse URL-encoded pairs, keeping every value of a repeated name.
pub fn parse_query_string(data: &[u8]) -> Values {
    let mut result = Values::new();
    for (key, value) in form_urlencoded::parse(data) {
        result
            .entry(key.into_owned())
            .or_default()
            .push(value.into_owned());
    }
    result
}

/// Parse multipart/form-data into text fields and spooled file parts.
pub fn parse_multipart(
    content_type: &str,
    body: &[u8],
    config: &Config,
) -> Result<MultipartForm, RequestError> {
    let boundary = extract_boundary(content_type).ok_or(RequestError::MissingBoundary)?;

    let mut form = MultipartForm::default();
    let mut multipart = Multipart::with_body(Cursor::new(body), boundary);

    while let Some(mut field) = multipart.read_entry().map_err(RequestError::Multipart)? {
        let name = field.headers.name.to_string();

        if let Some(filename) = field.headers.filename.clone() {
            let content_type = field
                .headers
                .content_type
                .as_ref()
                .map(|m| m.to_string())
                .unwrap_or_else(|| DEFAULT_FILE_TYPE.to_string());

            let header = spool(&mut field.data, filename, content_type, config)?;
            form.file.entry(name).or_default().push(header);
        } else {
            let mut data = Vec::new();
            field
                .data
                .read_to_end(&mut data)
                .map_err(RequestError::Multipart)?;
            form.value
                .entry(name)
                .or_default()
                .push(String::from_utf8_lossy(&data).into_owned());
        }
    }

    Ok(form)
}

/// Copy one file part to a temporary file and describe it.
fn spool<R: Read>(
    data: &mut R,
    filename: String,
    content_type: String,
    config: &Config,
) -> Result<FileHeader, RequestError> {
    let mut temp = temp_file(config).map_err(RequestError::Spool)?;

    let size = match config.max_file_size {
        Some(limit) => io::copy(&mut data.by_ref().take(limit.saturating_add(1)), &mut temp),
        None => io::copy(data, &mut temp),
    }
    .map_err(RequestError::Spool)?;

    if filename.is_empty() && size == 0 {
        return Ok(FileHeader::empty(content_type));
    }

    if config.max_file_size.is_some_and(|limit| size > limit) {
        debug!("upload {:?} exceeds {:?} bytes", filename, config.max_file_size);
        return Ok(FileHeader {
            filename,
            content_type,
            tmp_name: None,
            size: 0,
            error: UPLOAD_ERR_INI_SIZE,
        });
    }

    let (_, path) = temp.keep().map_err(|e| RequestError::Spool(e.error))?;

    Ok(FileHeader {
        filename,
        content_type,
        tmp_name: Some(path),
        size,
        error: UPLOAD_ERR_OK,
    })
}

fn temp_file(config: &Config) -> io::Result<NamedTempFile> {
    let mut builder = Builder::new();
    builder.prefix("upload-");
    match &config.tmp_dir {
        Some(dir) => builder.tempfile_in(dir),
        None => builder.tempfile(),
    }
}

/// Extract boundary from Content-Type header.
fn extract_boundary(content_type: &str) -> Option<String> {
    let idx = content_type.find("boundary=")?;
    let boundary = &content_type[idx + 9..];
    let boundary = boundary.split(';').next().unwrap_or(boundary);
    let boundary = boundary.trim().trim_matches('"');
    if boundary.is_empty() {
        return None;
    }
    Some(boundary.to_string())
}

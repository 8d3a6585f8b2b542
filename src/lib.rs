//! Nested trees from bracketed HTTP form fields.
//!
//! Field names like `options[0][name]` or `photos[]` are expanded into the
//! same nested arrays PHP builds for `$_GET`, `$_POST` and `$_FILES`.
//!
//! - [`tree`] holds the key tokenizer and the mount algorithm.
//! - [`sapi`] decodes request bodies and runs the fields through the trees.

pub mod sapi;
pub mod tree;

pub use sapi::upload::{FileHeader, FileTree, FileUpload, Uploads};
pub use sapi::{
    Config, FormRequest, MultipartForm, RequestError, Values, parse_data, parse_query,
    parse_uploads,
};
pub use tree::{DataTree, KeyConflict, Leaf, MAX_LEVEL, Node, Tree, fetch_indexes};

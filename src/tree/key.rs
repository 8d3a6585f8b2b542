//! Bracketed field name tokenizer.
//!
//! Splits `options[0][name]` into `["options", "0", "name"]`, the way PHP
//! splits request variable names before building `$_POST` arrays.
//! Reference: $PHP_SRC_PATH/main/php_variables.c - php_register_variable_ex

/// Ordered index list produced from one field name. Never empty.
pub type Path = Vec<String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bracket {
    None,
    Opened,
    Closed,
}

/// Parse a field name into its index list.
///
/// Spaces are dropped anywhere in the name, `[]` yields an empty index
/// (unindexed array) and unbalanced brackets never fail: the scan simply
/// produces whatever segments it has seen.
pub fn fetch_indexes(name: &str) -> Path {
    let mut state = Bracket::None;
    let mut keys = vec![String::new()];

    for ch in name.chars() {
        match ch {
            ' ' => continue,
            '[' => state = Bracket::Opened,
            ']' => {
                if state == Bracket::Opened {
                    keys.push(String::new());
                }
                state = Bracket::Closed;
            }
            _ => {
                if state != Bracket::None {
                    keys.push(String::new());
                }
                if let Some(last) = keys.last_mut() {
                    last.push(ch);
                }
                state = Bracket::None;
            }
        }
    }

    keys
}

//! Recursive insertion of value groups into a [`Tree`].

use super::{DuplicatePolicy, KeyConflict, Leaf, MAX_LEVEL, Node, Tree, fetch_indexes};
use log::debug;

/// No values at all, or a leading empty placeholder.
fn is_empty_group<T: Leaf>(values: &[T]) -> bool {
    values.first().is_none_or(T::is_blank)
}

impl<T: Leaf> Tree<T> {
    /// Parse a field name and mount its values.
    ///
    /// Names nested deeper than [`MAX_LEVEL`] are skipped without error.
    pub fn push(&mut self, name: &str, values: &[T]) -> Result<(), KeyConflict> {
        self.mount(&fetch_indexes(name), values)
    }

    /// Mount `values` at `path`, creating branches along the way.
    ///
    /// - `[.., "a", ""]` stores the whole group as an array under `a`.
    /// - `[.., "a"]` stores a single value picked by [`Leaf::DUPLICATES`], or
    ///   the empty group when nothing was submitted.
    /// - Empty placeholders met on the way are promoted to branches.
    /// - An empty group arriving for an existing branch is ignored.
    ///
    /// Paths longer than [`MAX_LEVEL`] are skipped without error.
    pub fn mount<S: AsRef<str>>(&mut self, path: &[S], values: &[T]) -> Result<(), KeyConflict> {
        if path.len() > MAX_LEVEL {
            debug!(
                "ignoring field nested {} levels deep (max {})",
                path.len(),
                MAX_LEVEL
            );
            return Ok(());
        }
        let Some((head, rest)) = path.split_first() else {
            return Ok(());
        };
        let head = head.as_ref();
        let append = matches!(rest, [tail] if tail.as_ref().is_empty());

        match self.map.get(head) {
            None => {}
            Some(Node::Branch(branch)) => {
                // A value group never replaces structured data.
                if rest.is_empty() || (append && !branch.is_empty()) {
                    if is_empty_group(values) {
                        return Ok(());
                    }
                    return Err(self.conflict(head, values));
                }
            }
            Some(node) if node.is_blank() => {}
            Some(Node::Scalar(_)) if rest.is_empty() => {
                self.resolve_duplicate(head, values);
                return Ok(());
            }
            Some(_) => return Err(self.conflict(head, values)),
        }

        let slot = self
            .map
            .entry(head.to_owned())
            .or_insert_with(|| Node::Branch(Tree::new()));

        if append {
            // non associated array of elements
            *slot = Node::Array(values.to_vec());
        } else if rest.is_empty() {
            *slot = match T::DUPLICATES.pick(values) {
                Some(value) => Node::Scalar(value.clone()),
                None => Node::Array(Vec::new()),
            };
        } else {
            if !matches!(slot, Node::Branch(_)) {
                *slot = Node::Branch(Tree::new());
            }
            if let Node::Branch(branch) = slot {
                return branch.mount(rest, values);
            }
        }

        Ok(())
    }

    /// A flat key holding a value is submitted again.
    fn resolve_duplicate(&mut self, key: &str, values: &[T]) {
        if T::DUPLICATES == DuplicatePolicy::FirstWins {
            return;
        }
        match T::DUPLICATES.pick(values) {
            Some(value) if !value.is_blank() => {
                self.map.insert(key.to_owned(), Node::Scalar(value.clone()));
            }
            _ => {}
        }
    }

    fn conflict(&self, key: &str, values: &[T]) -> KeyConflict {
        KeyConflict {
            key: key.to_owned(),
            values: format!("{values:?}"),
            tree: format!("{self:?}"),
        }
    }
}

//! Rich-text editing over the canonical document text.
//!
//! `parse` and `serialize` are exact inverses on any string. While editing,
//! input events mutate the tree in place and the canonical text is derived
//! from it; the tree is rebuilt from text only when the text changed behind
//! its back, so the caret survives ordinary typing.

mod edit;
mod session;
mod tree;

pub use edit::InputEvent;
pub use session::{DocumentSession, Phase, SessionError, Workspace};
pub use tree::{
    BLOCK_SEPARATOR, Block, Caret, Inline, Position, RichTree, Table, TableRow, parse, serialize,
};

#[derive(Debug, Clone)]
pub struct EditorState {
    tree: RichTree,
    last_canonical: String,
    caret: Caret,
}

impl EditorState {
    /// Parses the document once; the caret starts at the end.
    pub fn new(canonical: &str) -> Self {
        let tree = parse(canonical);
        let caret = tree.end_caret();
        Self {
            tree,
            last_canonical: canonical.to_string(),
            caret,
        }
    }

    pub fn apply(&mut self, event: InputEvent) -> &str {
        self.caret = edit::apply(&mut self.tree, self.caret, &event);
        self.last_canonical = serialize(&self.tree);
        &self.last_canonical
    }

    /// Brings the tree in line with `canonical`. Returns whether a re-parse
    /// was needed; when it was, the caret keeps its byte offset.
    pub fn sync(&mut self, canonical: &str) -> bool {
        debug_assert_eq!(serialize(&self.tree), self.last_canonical);
        if self.last_canonical == canonical {
            return false;
        }
        let offset = self.tree.offset_of(self.caret);
        self.tree = parse(canonical);
        self.caret = self.tree.caret_at(offset.min(canonical.len()));
        self.last_canonical = canonical.to_string();
        true
    }

    pub fn canonical(&self) -> &str {
        &self.last_canonical
    }

    pub fn tree(&self) -> &RichTree {
        &self.tree
    }

    pub fn caret(&self) -> Caret {
        self.caret
    }

    pub fn caret_offset(&self) -> usize {
        self.tree.offset_of(self.caret)
    }
}

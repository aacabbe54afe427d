use thiserror::Error;

use super::{EditorState, InputEvent};
use crate::annotate::{AnnotatedDocument, Annotation, Annotator, ImageContext, QualityReport};
use crate::buffer::{BufferError, Fragment, IncrementBuffer};
use crate::render;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Streaming,
    Rendered,
    Editing,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("document is still streaming")]
    StillStreaming,
    #[error("document is no longer streaming")]
    NotStreaming,
    #[error("document is not being edited")]
    NotEditing,
    #[error(transparent)]
    Buffer(#[from] BufferError),
}

/// One transcription: the raw stream while it arrives, then the canonical
/// document the user can view and edit.
#[derive(Debug, Clone)]
pub struct DocumentSession {
    buffer: IncrementBuffer,
    document: String,
    phase: Phase,
    editor: Option<EditorState>,
    annotations: Vec<Annotation>,
    report: Option<QualityReport>,
}

impl Default for DocumentSession {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentSession {
    pub fn new() -> Self {
        Self {
            buffer: IncrementBuffer::new(),
            document: String::new(),
            phase: Phase::Streaming,
            editor: None,
            annotations: Vec::new(),
            report: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn document(&self) -> &str {
        &self.document
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn report(&self) -> Option<&QualityReport> {
        self.report.as_ref()
    }

    pub fn push_fragment(&mut self, fragment: Fragment) -> Result<&str, SessionError> {
        if self.phase != Phase::Streaming {
            return Err(SessionError::NotStreaming);
        }
        self.document = self.buffer.append(fragment)?.to_string();
        Ok(&self.document)
    }

    pub fn push_text(&mut self, text: &str) -> Result<&str, SessionError> {
        let seq = self.buffer.fragments_received();
        self.push_fragment(Fragment {
            seq,
            text: text.to_string(),
        })
    }

    /// Ends the stream and runs the annotator once over the final text.
    pub fn finish(
        &mut self,
        annotator: &Annotator,
        context: ImageContext,
    ) -> Result<AnnotatedDocument, SessionError> {
        if self.phase != Phase::Streaming {
            return Err(SessionError::NotStreaming);
        }
        let annotated = annotator.annotate(self.buffer.normalized(), context);
        self.document = annotated.text.clone();
        self.annotations = annotated.annotations.clone();
        self.report = Some(annotated.report.clone());
        self.phase = Phase::Rendered;
        Ok(annotated)
    }

    /// Ends the stream without annotation, keeping whatever arrived.
    pub fn abort(&mut self) {
        if self.phase == Phase::Streaming {
            self.phase = Phase::Rendered;
        }
    }

    pub fn begin_edit(&mut self) -> Result<&mut EditorState, SessionError> {
        match self.phase {
            Phase::Streaming => Err(SessionError::StillStreaming),
            Phase::Rendered | Phase::Editing => {
                self.phase = Phase::Editing;
                Ok(self
                    .editor
                    .get_or_insert_with(|| EditorState::new(&self.document)))
            }
        }
    }

    pub fn apply(&mut self, event: InputEvent) -> Result<&str, SessionError> {
        let editor = self.editor.as_mut().ok_or(SessionError::NotEditing)?;
        self.document = editor.apply(event).to_string();
        Ok(&self.document)
    }

    /// Leaves edit mode; the edited text is already the document.
    pub fn end_edit(&mut self) {
        if let Some(editor) = self.editor.take() {
            self.document = editor.canonical().to_string();
        }
        if self.phase == Phase::Editing {
            self.phase = Phase::Rendered;
        }
    }

    pub fn render_html(&self) -> String {
        render::render_html(&self.document)
    }

    pub fn plain_text(&self) -> String {
        render::plain_text(&self.document)
    }
}

/// The open documents, one per source image, and which one is shown.
#[derive(Debug, Default)]
pub struct Workspace {
    sessions: Vec<DocumentSession>,
    current: usize,
}

impl Workspace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a document and selects it.
    pub fn open(&mut self, session: DocumentSession) -> usize {
        self.sessions.push(session);
        let index = self.sessions.len() - 1;
        self.select(index);
        index
    }

    /// Switching away always ends editing on the document being left.
    pub fn select(&mut self, index: usize) -> bool {
        if index >= self.sessions.len() {
            return false;
        }
        if index != self.current
            && let Some(previous) = self.sessions.get_mut(self.current)
        {
            previous.end_edit();
        }
        self.current = index;
        true
    }

    pub fn next(&mut self) -> bool {
        self.select(self.current + 1)
    }

    pub fn previous(&mut self) -> bool {
        self.current > 0 && self.select(self.current - 1)
    }

    /// Destroys the document for a discarded image.
    pub fn discard(&mut self, index: usize) -> Option<DocumentSession> {
        if index >= self.sessions.len() {
            return None;
        }
        let removed = self.sessions.remove(index);
        if index < self.current || (index == self.current && self.current >= self.sessions.len()) {
            self.current = self.current.saturating_sub(1);
        }
        Some(removed)
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current(&self) -> Option<&DocumentSession> {
        self.sessions.get(self.current)
    }

    /// The only mutable access; editing elsewhere means selecting first.
    pub fn current_mut(&mut self) -> Option<&mut DocumentSession> {
        self.sessions.get_mut(self.current)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

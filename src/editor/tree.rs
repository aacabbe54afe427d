use regex::Regex;
use std::sync::LazyLock;

use crate::normalize::{is_pipe_row, is_separator_row};

pub const BLOCK_SEPARATOR: &str = "\n\n";

static INLINE_SPAN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\*\*([^*\n]+)\*\*|\*([^*\n]+)\*|\$([^$\n]+)\$").expect("valid inline regex")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inline {
    Text(String),
    Strong(String),
    Emphasis(String),
    Math(String),
}

impl Inline {
    fn marker(&self) -> &'static str {
        match self {
            Inline::Text(_) => "",
            Inline::Strong(_) => "**",
            Inline::Emphasis(_) => "*",
            Inline::Math(_) => "$",
        }
    }

    pub fn content(&self) -> &str {
        match self {
            Inline::Text(text) | Inline::Strong(text) | Inline::Emphasis(text) | Inline::Math(text) => {
                text
            }
        }
    }

    pub(super) fn content_mut(&mut self) -> &mut String {
        match self {
            Inline::Text(text) | Inline::Strong(text) | Inline::Emphasis(text) | Inline::Math(text) => {
                text
            }
        }
    }

    /// Same kind, different content.
    pub(super) fn with_content(&self, content: String) -> Inline {
        match self {
            Inline::Text(_) => Inline::Text(content),
            Inline::Strong(_) => Inline::Strong(content),
            Inline::Emphasis(_) => Inline::Emphasis(content),
            Inline::Math(_) => Inline::Math(content),
        }
    }

    pub(super) fn marker_len(&self) -> usize {
        self.marker().len()
    }

    pub(super) fn serialized_len(&self) -> usize {
        self.content().len() + 2 * self.marker_len()
    }

    fn write_to(&self, output: &mut String) {
        output.push_str(self.marker());
        output.push_str(self.content());
        output.push_str(self.marker());
    }
}

/// One table line split at its pipes. Cell text keeps its padding so the row
/// serializes back byte for byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRow {
    pub indent: String,
    pub cells: Vec<String>,
    pub trailing: String,
}

impl TableRow {
    fn parse(line: &str) -> Self {
        let indent_len = line.len() - line.trim_start().len();
        let trailing_len = line.trim_start().len() - line.trim().len();
        let core = &line[indent_len..line.len() - trailing_len];
        let inner = &core[1..core.len() - 1];
        Self {
            indent: line[..indent_len].to_string(),
            cells: inner.split('|').map(str::to_string).collect(),
            trailing: line[line.len() - trailing_len..].to_string(),
        }
    }

    pub(super) fn serialized_len(&self) -> usize {
        self.indent.len()
            + self.cells.iter().map(String::len).sum::<usize>()
            + self.cells.len()
            + 1
            + self.trailing.len()
    }

    fn write_to(&self, output: &mut String) {
        output.push_str(&self.indent);
        output.push('|');
        output.push_str(&self.cells.join("|"));
        output.push('|');
        output.push_str(&self.trailing);
    }
}

/// Row 1 is always the separator row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub rows: Vec<TableRow>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Paragraph(Vec<Inline>),
    Table(Table),
    /// Display formula without its `$$` delimiters.
    Formula(String),
    /// Anything not recognized, kept exactly as it was.
    Verbatim(String),
}

impl Block {
    fn parse(segment: &str) -> Self {
        if let Some(table) = parse_table(segment) {
            return Block::Table(table);
        }
        if let Some(inner) = parse_formula(segment) {
            return Block::Formula(inner.to_string());
        }
        if segment.is_empty() || segment.contains('\n') {
            return Block::Verbatim(segment.to_string());
        }
        Block::Paragraph(parse_inlines(segment))
    }

    pub fn serialized_len(&self) -> usize {
        match self {
            Block::Paragraph(inlines) => inlines.iter().map(Inline::serialized_len).sum(),
            Block::Table(table) => {
                table.rows.iter().map(TableRow::serialized_len).sum::<usize>()
                    + table.rows.len().saturating_sub(1)
            }
            Block::Formula(inner) => inner.len() + 4,
            Block::Verbatim(text) => text.len(),
        }
    }

    fn write_to(&self, output: &mut String) {
        match self {
            Block::Paragraph(inlines) => {
                for inline in inlines {
                    inline.write_to(output);
                }
            }
            Block::Table(table) => {
                for (index, row) in table.rows.iter().enumerate() {
                    if index > 0 {
                        output.push('\n');
                    }
                    row.write_to(output);
                }
            }
            Block::Formula(inner) => {
                output.push_str("$$");
                output.push_str(inner);
                output.push_str("$$");
            }
            Block::Verbatim(text) => output.push_str(text),
        }
    }

    /// Byte offset of `position` inside this block's serialized text.
    pub(super) fn offset_of(&self, position: Position) -> usize {
        match (self, position) {
            (Block::Paragraph(inlines), Position::Inline { index, offset }) => {
                let before = inlines
                    .iter()
                    .take(index)
                    .map(Inline::serialized_len)
                    .sum::<usize>();
                match inlines.get(index) {
                    Some(inline) => before + inline.marker_len() + offset.min(inline.content().len()),
                    None => before,
                }
            }
            (Block::Table(table), Position::Cell { row, column, offset }) => {
                let before = table
                    .rows
                    .iter()
                    .take(row)
                    .map(|row| row.serialized_len() + 1)
                    .sum::<usize>();
                let Some(current) = table.rows.get(row) else {
                    return before.saturating_sub(1);
                };
                let cells_before = current
                    .cells
                    .iter()
                    .take(column)
                    .map(|cell| cell.len() + 1)
                    .sum::<usize>();
                let cell_len = current.cells.get(column).map_or(0, String::len);
                before + current.indent.len() + 1 + cells_before + offset.min(cell_len)
            }
            (Block::Formula(inner), Position::Raw { offset }) => 2 + offset.min(inner.len()),
            (Block::Verbatim(text), Position::Raw { offset }) => offset.min(text.len()),
            _ => 0,
        }
    }

    /// Structural position for a byte offset inside this block. Offsets that
    /// fall on markup snap to the nearest editable content.
    pub(super) fn position_at(&self, local: usize) -> Position {
        match self {
            Block::Paragraph(inlines) => {
                let mut start = 0;
                for (index, inline) in inlines.iter().enumerate() {
                    let content_start = start + inline.marker_len();
                    let content_end = content_start + inline.content().len();
                    let end = content_end + inline.marker_len();
                    if local <= end || index + 1 == inlines.len() {
                        let offset = local.clamp(content_start, content_end) - content_start;
                        return Position::Inline {
                            index,
                            offset: floor_char_boundary(inline.content(), offset),
                        };
                    }
                    start = end;
                }
                Position::Inline {
                    index: 0,
                    offset: 0,
                }
            }
            Block::Table(table) => {
                let mut start = 0;
                for (row_index, row) in table.rows.iter().enumerate() {
                    let row_end = start + row.serialized_len();
                    if local <= row_end || row_index + 1 == table.rows.len() {
                        let mut cursor = start + row.indent.len() + 1;
                        for (column, cell) in row.cells.iter().enumerate() {
                            if local <= cursor + cell.len() || column + 1 == row.cells.len() {
                                let offset = local.saturating_sub(cursor).min(cell.len());
                                return Position::Cell {
                                    row: row_index,
                                    column,
                                    offset: floor_char_boundary(cell, offset),
                                };
                            }
                            cursor += cell.len() + 1;
                        }
                    }
                    start = row_end + 1;
                }
                Position::Cell {
                    row: 0,
                    column: 0,
                    offset: 0,
                }
            }
            Block::Formula(inner) => Position::Raw {
                offset: floor_char_boundary(inner, local.saturating_sub(2).min(inner.len())),
            },
            Block::Verbatim(text) => Position::Raw {
                offset: floor_char_boundary(text, local.min(text.len())),
            },
        }
    }

    pub(super) fn end_position(&self) -> Position {
        self.position_at(self.serialized_len())
    }
}

pub(super) fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    index = index.min(text.len());
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

/// Where the caret sits inside a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    /// Byte offset into the content of one paragraph inline.
    Inline { index: usize, offset: usize },
    /// Byte offset into one table cell, padding included.
    Cell {
        row: usize,
        column: usize,
        offset: usize,
    },
    /// Byte offset into a formula body or a verbatim block.
    Raw { offset: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caret {
    pub block: usize,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RichTree {
    pub blocks: Vec<Block>,
}

impl RichTree {
    fn block_start(&self, block: usize) -> usize {
        self.blocks
            .iter()
            .take(block)
            .map(|block| block.serialized_len() + BLOCK_SEPARATOR.len())
            .sum()
    }

    /// Byte offset of the caret in the serialized document.
    pub fn offset_of(&self, caret: Caret) -> usize {
        match self.blocks.get(caret.block) {
            Some(block) => self.block_start(caret.block) + block.offset_of(caret.position),
            None => serialize(self).len(),
        }
    }

    /// Caret for a byte offset in the serialized document. Offsets inside a
    /// block separator belong to the end of the preceding block.
    pub fn caret_at(&self, offset: usize) -> Caret {
        let mut start = 0;
        for (index, block) in self.blocks.iter().enumerate() {
            let end = start + block.serialized_len();
            if offset < end + BLOCK_SEPARATOR.len() || index + 1 == self.blocks.len() {
                return Caret {
                    block: index,
                    position: block.position_at(offset.saturating_sub(start)),
                };
            }
            start = end + BLOCK_SEPARATOR.len();
        }
        Caret {
            block: 0,
            position: Position::Raw { offset: 0 },
        }
    }

    pub fn end_caret(&self) -> Caret {
        match self.blocks.last() {
            Some(block) => Caret {
                block: self.blocks.len() - 1,
                position: block.end_position(),
            },
            None => Caret {
                block: 0,
                position: Position::Raw { offset: 0 },
            },
        }
    }
}

pub fn parse(text: &str) -> RichTree {
    RichTree {
        blocks: text.split(BLOCK_SEPARATOR).map(Block::parse).collect(),
    }
}

pub fn serialize(tree: &RichTree) -> String {
    let mut output = String::new();
    for (index, block) in tree.blocks.iter().enumerate() {
        if index > 0 {
            output.push_str(BLOCK_SEPARATOR);
        }
        block.write_to(&mut output);
    }
    output
}

fn parse_table(segment: &str) -> Option<Table> {
    let lines = segment.split('\n').collect::<Vec<_>>();
    if lines.len() < 2 || !lines.iter().all(|line| is_pipe_row(line)) || !is_separator_row(lines[1])
    {
        return None;
    }
    Some(Table {
        rows: lines.into_iter().map(TableRow::parse).collect(),
    })
}

fn parse_formula(segment: &str) -> Option<&str> {
    let inner = segment.strip_prefix("$$")?.strip_suffix("$$")?;
    if inner.contains("$$") || inner.contains('\n') {
        return None;
    }
    Some(inner)
}

pub(super) fn parse_inlines(text: &str) -> Vec<Inline> {
    let mut inlines = Vec::new();
    let mut last = 0;
    for caps in INLINE_SPAN.captures_iter(text) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        if whole.start() > last {
            inlines.push(Inline::Text(text[last..whole.start()].to_string()));
        }
        let inline = if let Some(strong) = caps.get(1) {
            Inline::Strong(strong.as_str().to_string())
        } else if let Some(emphasis) = caps.get(2) {
            Inline::Emphasis(emphasis.as_str().to_string())
        } else {
            Inline::Math(caps.get(3).map_or("", |math| math.as_str()).to_string())
        };
        inlines.push(inline);
        last = whole.end();
    }
    if last < text.len() {
        inlines.push(Inline::Text(text[last..].to_string()));
    }
    inlines
}

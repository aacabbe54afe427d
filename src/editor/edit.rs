use super::tree::{Block, Caret, Inline, Position, RichTree, floor_char_boundary};

/// A user action against the editable surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    InsertText(String),
    /// Plain-text paste. Line breaks split paragraphs.
    Paste(String),
    DeleteBackward,
    DeleteForward,
    InsertLineBreak,
    SetCell {
        block: usize,
        row: usize,
        column: usize,
        text: String,
    },
    MoveCaret(Caret),
}

/// Applies one event to the tree and returns where the caret ends up.
pub(super) fn apply(tree: &mut RichTree, caret: Caret, event: &InputEvent) -> Caret {
    if tree.blocks.is_empty() {
        tree.blocks.push(Block::Paragraph(Vec::new()));
    }
    let caret = clamp(tree, caret);
    match event {
        InputEvent::InsertText(text) => insert_text(tree, caret, text),
        InputEvent::Paste(text) => paste(tree, caret, text),
        InputEvent::DeleteBackward => delete_backward(tree, caret),
        InputEvent::DeleteForward => delete_forward(tree, caret),
        InputEvent::InsertLineBreak => line_break(tree, caret),
        InputEvent::SetCell {
            block,
            row,
            column,
            text,
        } => set_cell(tree, caret, *block, *row, *column, text),
        InputEvent::MoveCaret(target) => clamp(tree, *target),
    }
}

/// Snaps a caret that no longer fits the tree onto the nearest valid spot.
fn clamp(tree: &RichTree, caret: Caret) -> Caret {
    if caret.block >= tree.blocks.len() {
        return tree.end_caret();
    }
    let block = &tree.blocks[caret.block];
    let offset = block.offset_of(caret.position);
    let snapped = block.position_at(offset);
    let position = match (caret.position, snapped) {
        (Position::Inline { .. }, Position::Inline { .. })
        | (Position::Cell { .. }, Position::Cell { .. })
        | (Position::Raw { .. }, Position::Raw { .. }) => snapped,
        _ => block.end_position(),
    };
    Caret {
        block: caret.block,
        position,
    }
}

fn insert_text(tree: &mut RichTree, caret: Caret, text: &str) -> Caret {
    let block_index = caret.block;
    let position = match (&mut tree.blocks[block_index], caret.position) {
        (Block::Paragraph(inlines), Position::Inline { index, offset }) => {
            if inlines.is_empty() {
                inlines.push(Inline::Text(String::new()));
            }
            let content = inlines[index].content_mut();
            content.insert_str(offset, text);
            Position::Inline {
                index,
                offset: offset + text.len(),
            }
        }
        (Block::Table(table), Position::Cell { row, column, offset }) => {
            let text = cell_safe(text);
            table.rows[row].cells[column].insert_str(offset, &text);
            Position::Cell {
                row,
                column,
                offset: offset + text.len(),
            }
        }
        (Block::Formula(inner), Position::Raw { offset }) => {
            let text = text.replace('\n', " ");
            inner.insert_str(offset, &text);
            Position::Raw {
                offset: offset + text.len(),
            }
        }
        (Block::Verbatim(raw), Position::Raw { offset }) => {
            raw.insert_str(offset, text);
            Position::Raw {
                offset: offset + text.len(),
            }
        }
        (_, position) => position,
    };
    Caret {
        block: block_index,
        position,
    }
}

fn paste(tree: &mut RichTree, caret: Caret, text: &str) -> Caret {
    let text = text.replace("\r\n", "\n").replace('\r', "\n");
    if !matches!(tree.blocks[caret.block], Block::Paragraph(_)) {
        return insert_text(tree, caret, &text);
    }
    let mut caret = caret;
    for (index, line) in text.split('\n').enumerate() {
        if index > 0 {
            caret = line_break(tree, caret);
        }
        caret = insert_text(tree, caret, line);
    }
    caret
}

fn delete_backward(tree: &mut RichTree, caret: Caret) -> Caret {
    let block_index = caret.block;
    match (&mut tree.blocks[block_index], caret.position) {
        (Block::Paragraph(inlines), Position::Inline { index, offset }) => {
            if offset > 0 {
                let content = inlines[index].content_mut();
                let start = previous_char_start(content, offset);
                content.replace_range(start..offset, "");
                return tidy(tree, block_index, index, start);
            }
            if index > 0 {
                let previous = inlines[index - 1].content_mut();
                let end = previous.len();
                let start = previous_char_start(previous, end);
                previous.replace_range(start..end, "");
                return tidy(tree, block_index, index - 1, start);
            }
            merge_into_previous(tree, block_index).unwrap_or(caret)
        }
        (Block::Table(table), Position::Cell { row, column, offset }) if offset > 0 => {
            let cell = &mut table.rows[row].cells[column];
            let start = previous_char_start(cell, offset);
            cell.replace_range(start..offset, "");
            Caret {
                block: block_index,
                position: Position::Cell {
                    row,
                    column,
                    offset: start,
                },
            }
        }
        (Block::Formula(raw) | Block::Verbatim(raw), Position::Raw { offset }) if offset > 0 => {
            let start = previous_char_start(raw, offset);
            raw.replace_range(start..offset, "");
            Caret {
                block: block_index,
                position: Position::Raw { offset: start },
            }
        }
        _ => caret,
    }
}

fn delete_forward(tree: &mut RichTree, caret: Caret) -> Caret {
    let block_index = caret.block;
    match (&mut tree.blocks[block_index], caret.position) {
        (Block::Paragraph(inlines), Position::Inline { index, offset }) => {
            if let Some(inline) = inlines.get_mut(index)
                && offset < inline.content().len()
            {
                let content = inline.content_mut();
                let end = next_char_end(content, offset);
                content.replace_range(offset..end, "");
                return tidy(tree, block_index, index, offset);
            }
            if let Some(next) = inlines.get_mut(index + 1) {
                let content = next.content_mut();
                let end = next_char_end(content, 0);
                content.replace_range(0..end, "");
                return tidy(tree, block_index, index, offset);
            }
            merge_next(tree, block_index);
            tidy(tree, block_index, index, offset)
        }
        (Block::Table(table), Position::Cell { row, column, offset }) => {
            let cell = &mut table.rows[row].cells[column];
            if offset < cell.len() {
                let end = next_char_end(cell, offset);
                cell.replace_range(offset..end, "");
            }
            caret
        }
        (Block::Formula(raw) | Block::Verbatim(raw), Position::Raw { offset }) => {
            if offset < raw.len() {
                let end = next_char_end(raw, offset);
                raw.replace_range(offset..end, "");
            }
            caret
        }
        _ => caret,
    }
}

/// Splits the paragraph at the caret; the caret moves to the start of the
/// new paragraph. Verbatim blocks take a raw newline instead.
fn line_break(tree: &mut RichTree, caret: Caret) -> Caret {
    let block_index = caret.block;
    match (&mut tree.blocks[block_index], caret.position) {
        (Block::Paragraph(inlines), Position::Inline { index, offset }) => {
            let mut right = if index < inlines.len() {
                inlines.split_off(index)
            } else {
                Vec::new()
            };
            if let Some(first) = right.first_mut() {
                let tail = first.content_mut().split_off(offset);
                let head = std::mem::take(first.content_mut());
                inlines.push(first.with_content(head));
                *first = first.with_content(tail);
            }
            tidy_inlines(inlines);
            tidy_inlines(&mut right);
            tree.blocks.insert(block_index + 1, Block::Paragraph(right));
            Caret {
                block: block_index + 1,
                position: Position::Inline {
                    index: 0,
                    offset: 0,
                },
            }
        }
        (Block::Verbatim(raw), Position::Raw { offset }) => {
            raw.insert(offset, '\n');
            Caret {
                block: block_index,
                position: Position::Raw { offset: offset + 1 },
            }
        }
        _ => caret,
    }
}

fn set_cell(
    tree: &mut RichTree,
    caret: Caret,
    block: usize,
    row: usize,
    column: usize,
    text: &str,
) -> Caret {
    let Some(Block::Table(table)) = tree.blocks.get_mut(block) else {
        return caret;
    };
    let Some(cell) = table
        .rows
        .get_mut(row)
        .and_then(|row| row.cells.get_mut(column))
    else {
        return caret;
    };
    *cell = format!(" {} ", cell_safe(text.trim()));
    Caret {
        block,
        position: Position::Cell {
            row,
            column,
            offset: cell.len() - 1,
        },
    }
}

/// Pipes and line breaks would split a cell or a row.
fn cell_safe(text: &str) -> String {
    text.replace('\n', " ").replace('|', "\\|")
}

/// Joins this paragraph onto the previous one. An empty block is simply
/// removed when the previous block is not a paragraph.
fn merge_into_previous(tree: &mut RichTree, block_index: usize) -> Option<Caret> {
    if block_index == 0 {
        return None;
    }
    let joint = match &tree.blocks[block_index - 1] {
        Block::Paragraph(previous) => Some(content_len(previous)),
        _ => None,
    };
    match joint {
        Some(joint) => {
            if let Block::Paragraph(current) = tree.blocks.remove(block_index)
                && let Block::Paragraph(previous) = &mut tree.blocks[block_index - 1]
            {
                previous.extend(current);
            }
            Some(tidy_at_content_offset(tree, block_index - 1, joint))
        }
        None if tree.blocks[block_index].serialized_len() == 0 => {
            tree.blocks.remove(block_index);
            Some(Caret {
                block: block_index - 1,
                position: tree.blocks[block_index - 1].end_position(),
            })
        }
        None => None,
    }
}

fn merge_next(tree: &mut RichTree, block_index: usize) {
    let next_is_paragraph = matches!(tree.blocks.get(block_index + 1), Some(Block::Paragraph(_)));
    let next_is_empty = tree
        .blocks
        .get(block_index + 1)
        .is_some_and(|block| block.serialized_len() == 0);
    if !next_is_paragraph && !next_is_empty {
        return;
    }
    let next = tree.blocks.remove(block_index + 1);
    if let (Block::Paragraph(current), Block::Paragraph(next)) = (&mut tree.blocks[block_index], next)
    {
        current.extend(next);
    }
}

fn content_len(inlines: &[Inline]) -> usize {
    inlines.iter().map(|inline| inline.content().len()).sum()
}

/// Re-tidies a paragraph after an edit at `(index, offset)` and returns the
/// caret at the same logical spot.
fn tidy(tree: &mut RichTree, block_index: usize, index: usize, offset: usize) -> Caret {
    let content_offset = match &tree.blocks[block_index] {
        Block::Paragraph(inlines) => content_len(&inlines[..index.min(inlines.len())]) + offset,
        _ => offset,
    };
    tidy_at_content_offset(tree, block_index, content_offset)
}

fn tidy_at_content_offset(tree: &mut RichTree, block_index: usize, content_offset: usize) -> Caret {
    let Block::Paragraph(inlines) = &mut tree.blocks[block_index] else {
        return tree.end_caret();
    };
    tidy_inlines(inlines);
    let mut start = 0;
    for (index, inline) in inlines.iter().enumerate() {
        let len = inline.content().len();
        if content_offset <= start + len {
            return Caret {
                block: block_index,
                position: Position::Inline {
                    index,
                    offset: floor_char_boundary(inline.content(), content_offset - start),
                },
            };
        }
        start += len;
    }
    Caret {
        block: block_index,
        position: Position::Inline {
            index: inlines.len().saturating_sub(1),
            offset: inlines.last().map_or(0, |inline| inline.content().len()),
        },
    }
}

/// Drops empty inlines and merges neighbouring plain text.
fn tidy_inlines(inlines: &mut Vec<Inline>) {
    let mut tidied: Vec<Inline> = Vec::with_capacity(inlines.len());
    for inline in inlines.drain(..) {
        if inline.content().is_empty() {
            continue;
        }
        if let (Some(Inline::Text(previous)), Inline::Text(text)) = (tidied.last_mut(), &inline) {
            previous.push_str(text);
            continue;
        }
        tidied.push(inline);
    }
    *inlines = tidied;
}

fn previous_char_start(text: &str, offset: usize) -> usize {
    text[..offset]
        .char_indices()
        .next_back()
        .map_or(0, |(index, _)| index)
}

fn next_char_end(text: &str, offset: usize) -> usize {
    text[offset..]
        .chars()
        .next()
        .map_or(offset, |ch| offset + ch.len_utf8())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::tree::{parse, serialize};

    fn run(text: &str, offset: usize, events: &[InputEvent]) -> (String, usize) {
        let mut tree = parse(text);
        let mut caret = tree.caret_at(offset);
        for event in events {
            caret = apply(&mut tree, caret, event);
        }
        let offset = tree.offset_of(caret);
        (serialize(&tree), offset)
    }

    #[test]
    fn typing_inserts_at_the_caret() {
        let (text, caret) = run("Hello world", 5, &[InputEvent::InsertText(",".to_string())]);
        assert_eq!(text, "Hello, world");
        assert_eq!(caret, 6);
    }

    #[test]
    fn typing_inside_strong_stays_strong() {
        let (text, caret) = run("a **bc**", 5, &[InputEvent::InsertText("x".to_string())]);
        assert_eq!(text, "a **bxc**");
        assert_eq!(caret, 6);
    }

    #[test]
    fn backspace_removes_previous_char() {
        let (text, caret) = run("abc", 2, &[InputEvent::DeleteBackward]);
        assert_eq!((text.as_str(), caret), ("ac", 1));
    }

    #[test]
    fn backspace_handles_multibyte_chars() {
        let (text, caret) = run("日本語", 6, &[InputEvent::DeleteBackward]);
        assert_eq!((text.as_str(), caret), ("日語", 3));
    }

    #[test]
    fn emptied_emphasis_disappears() {
        let (text, caret) = run("a *b* c", 4, &[InputEvent::DeleteBackward]);
        assert_eq!((text.as_str(), caret), ("a  c", 2));
    }

    #[test]
    fn backspace_at_paragraph_start_merges_paragraphs() {
        let (text, caret) = run("first\n\nsecond", 7, &[InputEvent::DeleteBackward]);
        assert_eq!((text.as_str(), caret), ("firstsecond", 5));
    }

    #[test]
    fn backspace_never_merges_into_a_table() {
        let text = "| a |\n|---|\n\nafter";
        let (edited, _) = run(text, 13, &[InputEvent::DeleteBackward]);
        assert_eq!(edited, text);
    }

    #[test]
    fn delete_forward_at_paragraph_end_pulls_next_paragraph() {
        let (text, caret) = run("one\n\ntwo", 3, &[InputEvent::DeleteForward]);
        assert_eq!((text.as_str(), caret), ("onetwo", 3));
    }

    #[test]
    fn line_break_splits_paragraph_and_inline() {
        let (text, caret) = run("a **bold** c", 5, &[InputEvent::InsertLineBreak]);
        assert_eq!(text, "a **b**\n\n**old** c");
        assert_eq!(caret, 11);
    }

    #[test]
    fn paste_splits_lines_into_paragraphs() {
        let (text, caret) = run("ab", 1, &[InputEvent::Paste("x\r\ny".to_string())]);
        assert_eq!(text, "ax\n\nyb");
        assert_eq!(caret, 5);
    }

    #[test]
    fn cell_edits_keep_the_table_intact() {
        let text = "| a | b |\n|---|---|\n| 1 | 2 |";
        let (edited, _) = run(
            text,
            0,
            &[InputEvent::SetCell {
                block: 0,
                row: 2,
                column: 1,
                text: "x|y\nz".to_string(),
            }],
        );
        assert_eq!(edited, "| a | b |\n|---|---|\n| 1 | x\\|y z |");
    }

    #[test]
    fn typing_in_a_cell_escapes_pipes() {
        let text = "| a |\n|---|";
        let (edited, caret) = run(text, 3, &[InputEvent::InsertText("|".to_string())]);
        assert_eq!(edited, "| a\\| |\n|---|");
        assert_eq!(caret, 5);
    }

    #[test]
    fn formula_edits_stay_on_one_line() {
        let (text, _) = run("$$x$$", 3, &[InputEvent::Paste("+\ny".to_string())]);
        assert_eq!(text, "$$x+ y$$");
    }
}

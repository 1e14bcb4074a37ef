//! Space gobbling.
//!
//! A post-parse transform over text nodes. The parser records the spans of
//! directives that produce no output ("markers") and the head/end pairs of
//! block directives ("regions"); this module decides which whitespace around
//! them disappears and rewrites the affected text nodes.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::ast::{Block, NodeKind, Span};
use crate::config::SpaceGobbling;

#[derive(Debug, Default)]
pub struct Markers {
    lines: Vec<Span>,
    regions: Vec<(Span, Span)>,
}

impl Markers {
    /// A directive that may be gobbled when alone on its line.
    pub fn line(&mut self, span: Span) {
        self.lines.push(span);
    }

    /// A block directive's head and `#end`.
    pub fn region(&mut self, head: Span, end: Span) {
        self.regions.push((head, end));
    }
}

pub fn apply(root: &mut Block, source: &str, markers: &Markers, policy: SpaceGobbling) {
    if policy == SpaceGobbling::None || markers.lines.is_empty() {
        return;
    }

    let mut removed = vec![false; source.len()];
    for span in &markers.lines {
        if let Some(line) = standalone(source, *span) {
            mark(&mut removed, line.indent_start, span.start);
            mark(&mut removed, span.end, line.tail_end);
        }
    }

    if policy == SpaceGobbling::Structured {
        for (line_start, amount) in dedents(source, markers) {
            let leading = leading_blanks(source, line_start);
            mark(&mut removed, line_start, line_start + amount.min(leading));
        }
    }

    strip(root, source, &removed);
}

struct Standalone {
    indent_start: usize,
    tail_end: usize,
}

fn is_blank(c: char) -> bool {
    c == ' ' || c == '\t'
}

fn line_start(source: &str, offset: usize) -> usize {
    source[..offset].rfind('\n').map_or(0, |i| i + 1)
}

fn leading_blanks(source: &str, line_start: usize) -> usize {
    source[line_start..]
        .bytes()
        .take_while(|b| *b == b' ' || *b == b'\t')
        .count()
}

/// Returns the removable indentation and tail when `span` is alone on its line.
fn standalone(source: &str, span: Span) -> Option<Standalone> {
    if span.end > source.len() || span.start > span.end {
        return None;
    }
    let indent_start = line_start(source, span.start);
    if !source[indent_start..span.start].chars().all(is_blank) {
        return None;
    }

    // Line comments already own their terminator.
    if source[..span.end].ends_with('\n') {
        return Some(Standalone {
            indent_start,
            tail_end: span.end,
        });
    }

    let tail_end = source[span.end..]
        .find('\n')
        .map_or(source.len(), |i| span.end + i + 1);
    let tail = &source[span.end..tail_end];
    if !tail.chars().all(|c| is_blank(c) || c == '\r' || c == '\n') {
        return None;
    }
    Some(Standalone {
        indent_start,
        tail_end,
    })
}

/// Extra indentation to remove per body line of gobbled block directives,
/// summed over nested regions.
fn dedents(source: &str, markers: &Markers) -> BTreeMap<usize, usize> {
    let mut amounts: BTreeMap<usize, usize> = BTreeMap::new();
    for (head, end) in &markers.regions {
        let Some(line) = standalone(source, *head) else {
            continue;
        };
        let head_indent = head.start - line.indent_start;
        let body_start = line.tail_end;
        let body_end = line_start(source, end.start);
        if body_start >= body_end {
            continue;
        }

        let mut starts = vec![body_start];
        starts.extend(
            source[body_start..body_end]
                .match_indices('\n')
                .map(|(i, _)| body_start + i + 1)
                .filter(|s| *s < body_end),
        );

        let first = starts.iter().find(|s| {
            let rest = &source[**s..];
            let content = rest.split('\n').next().unwrap_or_default();
            !content.trim().is_empty()
        });
        let Some(first) = first else {
            continue;
        };
        let extra = leading_blanks(source, *first).saturating_sub(head_indent);
        if extra == 0 {
            continue;
        }
        for start in starts {
            *amounts.entry(start).or_default() += extra;
        }
    }
    amounts
}

fn mark(removed: &mut [bool], start: usize, end: usize) {
    let end = end.min(removed.len());
    if start < end {
        removed[start..end].iter_mut().for_each(|r| *r = true);
    }
}

fn strip(block: &mut Block, source: &str, removed: &[bool]) {
    block.nodes.retain_mut(|node| {
        match &mut node.kind {
            NodeKind::Text(text) => {
                let Span { start, end } = node.pos.span;
                if end > source.len() || !removed[start..end].contains(&true) {
                    return true;
                }
                *text = source[start..end]
                    .char_indices()
                    .filter(|(i, _)| !removed[start + i])
                    .map(|(_, c)| c)
                    .collect();
                !text.is_empty()
            }
            NodeKind::If {
                branches,
                otherwise,
            } => {
                for branch in branches.iter_mut() {
                    strip(&mut branch.body, source, removed);
                }
                if let Some(block) = otherwise {
                    strip(block, source, removed);
                }
                true
            }
            NodeKind::Foreach {
                body, otherwise, ..
            } => {
                strip(body, source, removed);
                if let Some(block) = otherwise {
                    strip(block, source, removed);
                }
                true
            }
            NodeKind::MacroDef(def) => {
                // Freshly parsed definitions are not shared yet.
                if let Some(def) = Arc::get_mut(def) {
                    strip(&mut def.body, source, removed);
                }
                true
            }
            NodeKind::MacroCall(call) => {
                if let Some(body) = &mut call.body {
                    strip(body, source, removed);
                }
                true
            }
            _ => true,
        }
    });
}

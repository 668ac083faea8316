//! In-document search: match indexing, circular navigation, a highlight
//! overlay that never rewrites the text, and scroll planning.

use std::ops::Range;
use std::time::{Duration, Instant};

/// Slack around the scroll container within which a match counts as visible.
pub const VISIBLE_MARGIN: f64 = 50.0;

/// Navigations closer together than this jump instead of animating.
pub const FAST_SCROLL_THRESHOLD: Duration = Duration::from_millis(300);

/// Simple case folding: the lowercase form when it is a single char.
fn fold(c: char) -> char {
    let mut lower = c.to_lowercase();
    match (lower.next(), lower.next()) {
        (Some(l), None) => l,
        _ => c,
    }
}

/// Byte ranges of every case-insensitive occurrence of `query` in `text`,
/// scanning left to right without overlap. A blank query matches nothing.
pub fn find_matches(text: &str, query: &str) -> Vec<Range<usize>> {
    if query.trim().is_empty() {
        return Vec::new();
    }
    let needle: Vec<char> = query.chars().map(fold).collect();
    let haystack: Vec<(usize, char)> = text.char_indices().collect();

    let mut matches = Vec::new();
    let mut i = 0;
    while i + needle.len() <= haystack.len() {
        let hit = needle
            .iter()
            .zip(&haystack[i..])
            .all(|(n, (_, c))| *n == fold(*c));
        if hit {
            let start = haystack[i].0;
            let end = haystack
                .get(i + needle.len())
                .map_or(text.len(), |(offset, _)| *offset);
            matches.push(start..end);
            i += needle.len();
        } else {
            i += 1;
        }
    }
    matches
}

/// Next position when cycling forward through `len` matches.
pub fn next_index(current: Option<usize>, len: usize) -> Option<usize> {
    if len == 0 {
        return None;
    }
    Some(match current {
        Some(i) if i + 1 < len => i + 1,
        Some(_) => 0,
        None => 0,
    })
}

/// Previous position when cycling backward through `len` matches.
pub fn previous_index(current: Option<usize>, len: usize) -> Option<usize> {
    if len == 0 {
        return None;
    }
    Some(match current {
        Some(i) if i > 0 => i - 1,
        _ => len - 1,
    })
}

/// Query, matches in the current text, and the focused match.
#[derive(Debug, Clone, Default)]
pub struct SearchState {
    query: String,
    matches: Vec<Range<usize>>,
    current: Option<usize>,
}

impl SearchState {
    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn matches(&self) -> &[Range<usize>] {
        &self.matches
    }

    pub fn current(&self) -> Option<usize> {
        self.current
    }

    pub fn current_match(&self) -> Option<Range<usize>> {
        self.current.and_then(|i| self.matches.get(i).cloned())
    }

    /// New query: focus starts over.
    pub fn set_query(&mut self, query: &str, text: &str) {
        self.query = query.to_string();
        self.current = None;
        self.reindex(text);
    }

    /// The text changed under the same query.
    pub fn set_text(&mut self, text: &str) {
        self.reindex(text);
    }

    fn reindex(&mut self, text: &str) {
        self.matches = find_matches(text, &self.query);
        self.current = match (self.current, self.matches.len()) {
            (_, 0) => None,
            (None, _) => Some(0),
            (Some(i), len) => Some(i.min(len - 1)),
        };
    }

    pub fn next(&mut self) -> Option<usize> {
        self.current = next_index(self.current, self.matches.len());
        self.current
    }

    pub fn previous(&mut self) -> Option<usize> {
        self.current = previous_index(self.current, self.matches.len());
        self.current
    }

    /// Highlight spans covering all of `text`.
    pub fn spans(&self, text: &str) -> Vec<Span> {
        highlight_spans(text.len(), &self.matches, self.current)
    }
}

/// How one stretch of text is painted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanKind {
    Plain,
    Match,
    Current,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub range: Range<usize>,
    pub kind: SpanKind,
}

/// Partition `0..len` into plain and highlighted spans. The text itself is
/// never touched; callers paint each span over it.
pub fn highlight_spans(len: usize, matches: &[Range<usize>], current: Option<usize>) -> Vec<Span> {
    let mut spans = Vec::with_capacity(matches.len() * 2 + 1);
    let mut pos = 0;
    for (i, m) in matches.iter().enumerate() {
        if m.start > pos {
            spans.push(Span {
                range: pos..m.start,
                kind: SpanKind::Plain,
            });
        }
        let kind = if current == Some(i) {
            SpanKind::Current
        } else {
            SpanKind::Match
        };
        spans.push(Span {
            range: m.clone(),
            kind,
        });
        pos = m.end;
    }
    if pos < len {
        spans.push(Span {
            range: pos..len,
            kind: SpanKind::Plain,
        });
    }
    spans
}

// ── Scrolling ────────────────────────────────────────────────────────────────

/// An axis-aligned box in viewport coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    /// Whether `self` lies inside `container` grown by `margin` on every side.
    pub fn within(&self, container: &Rect, margin: f64) -> bool {
        self.top >= container.top - margin
            && self.bottom() <= container.bottom() + margin
            && self.left >= container.left - margin
            && self.right() <= container.right() + margin
    }
}

/// What the caller should do with its scroll container.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScrollAction {
    /// Already visible enough.
    Stay,
    /// Set the scroll offset immediately.
    Jump { top: f64 },
    /// Stop any running animation, then animate to `top`. Drop the animation
    /// once `generation` is no longer current.
    Smooth { top: f64, generation: u64 },
}

/// Decides how to bring a match into view.
#[derive(Debug, Clone)]
pub struct ScrollPlanner {
    last_navigation: Option<Instant>,
    generation: u64,
}

impl Default for ScrollPlanner {
    fn default() -> Self {
        Self::new()
    }
}

impl ScrollPlanner {
    pub fn new() -> Self {
        Self {
            last_navigation: None,
            generation: 0,
        }
    }

    /// Plan a scroll to `target` inside `container` whose content is
    /// currently scrolled to `scroll_top`. Every call supersedes earlier
    /// smooth scrolls.
    pub fn plan(&mut self, target: Rect, container: Rect, scroll_top: f64, now: Instant) -> ScrollAction {
        self.generation += 1;
        let fast = self
            .last_navigation
            .is_some_and(|last| now.saturating_duration_since(last) < FAST_SCROLL_THRESHOLD);
        self.last_navigation = Some(now);

        if target.within(&container, VISIBLE_MARGIN) {
            return ScrollAction::Stay;
        }

        let top = (scroll_top + target.top - container.top - container.height / 2.0
            + target.height / 2.0)
            .max(0.0);
        if fast {
            ScrollAction::Jump { top }
        } else {
            ScrollAction::Smooth {
                top,
                generation: self.generation,
            }
        }
    }

    /// Whether a smooth scroll started for `generation` may still run.
    pub fn is_current(&self, generation: u64) -> bool {
        generation == self.generation
    }
}

/// Geometry of monospace text laid out from a fixed origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineLayout {
    pub origin_left: f64,
    pub origin_top: f64,
    pub line_height: f64,
    pub char_width: f64,
}

impl LineLayout {
    /// Box of `range` (assumed on one line) when the content is scrolled
    /// to `scroll_top`.
    pub fn rect_for(&self, text: &str, range: &Range<usize>, scroll_top: f64) -> Rect {
        let (line, column) = line_col(text, range.start);
        let width = text
            .get(range.clone())
            .map_or(0, |s| s.chars().count()) as f64
            * self.char_width;
        Rect::new(
            self.origin_left + column as f64 * self.char_width,
            self.origin_top + line as f64 * self.line_height - scroll_top,
            width,
            self.line_height,
        )
    }
}

/// A scroll container showing one document laid out by a [`LineLayout`].
#[derive(Debug, Clone)]
pub struct Viewport {
    pub layout: LineLayout,
    pub container: Rect,
    pub scroll_top: f64,
    planner: ScrollPlanner,
}

impl Default for Viewport {
    /// 80x24 cells of 8x16px.
    fn default() -> Self {
        Self::new(
            LineLayout {
                origin_left: 0.0,
                origin_top: 0.0,
                line_height: 16.0,
                char_width: 8.0,
            },
            Rect::new(0.0, 0.0, 640.0, 384.0),
        )
    }
}

impl Viewport {
    pub fn new(layout: LineLayout, container: Rect) -> Self {
        Self {
            layout,
            container,
            scroll_top: 0.0,
            planner: ScrollPlanner::new(),
        }
    }

    /// Plan how to bring `range` of `text` into view. Jumps take effect
    /// immediately; smooth scrolls take effect through [`Viewport::settle`].
    pub fn scroll_to(&mut self, text: &str, range: &Range<usize>, now: Instant) -> ScrollAction {
        let target = self.layout.rect_for(text, range, self.scroll_top);
        let action = self.planner.plan(target, self.container, self.scroll_top, now);
        if let ScrollAction::Jump { top } = action {
            self.scroll_top = top;
        }
        action
    }

    /// Finish a smooth scroll. Returns `false` (and leaves the offset alone)
    /// when a later plan superseded it.
    pub fn settle(&mut self, top: f64, generation: u64) -> bool {
        if !self.planner.is_current(generation) {
            return false;
        }
        self.scroll_top = top;
        true
    }

    /// A different document is shown.
    pub fn reset(&mut self) {
        self.scroll_top = 0.0;
    }
}

/// Zero-based line and column (in chars) of a byte offset.
pub fn line_col(text: &str, offset: usize) -> (usize, usize) {
    let before = &text[..offset.min(text.len())];
    let line = before.matches('\n').count();
    let column = before.rsplit('\n').next().map_or(0, |l| l.chars().count());
    (line, column)
}

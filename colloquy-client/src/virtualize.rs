//! Windowed rendering of the root comment list
//!
//! Only the rows that intersect the viewport, plus `overscan` rows on each side,
//! are mounted. Rows start with an estimated height and switch to their measured
//! height once the host has laid them out. Heights are keyed by comment id, so
//! rows inserted or removed out of band do not shuffle measurements around.

use std::{collections::HashMap, ops::Range};

use crate::{
    api::{Comment, CommentId},
    ThreadConfig,
};

/// Where the scroll position and viewport size come from
///
/// All offsets are in pixels, relative to the top of the comment list.
pub trait ScrollSource: Send {
    fn scroll_offset(&self) -> f64;
    fn viewport_size(&self) -> f64;

    /// Called with the raw scroll position reported by the host
    fn set_scroll(&mut self, raw: f64);
    fn set_viewport(&mut self, size: f64);

    fn scroll_to(&mut self, offset: f64);
}

/// The comment list is its own scrollable container
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ContainerScroll {
    offset: f64,
    viewport: f64,
}

impl ContainerScroll {
    pub fn new(viewport: f64) -> ContainerScroll {
        ContainerScroll {
            offset: 0.0,
            viewport,
        }
    }
}

impl ScrollSource for ContainerScroll {
    fn scroll_offset(&self) -> f64 {
        self.offset
    }

    fn viewport_size(&self) -> f64 {
        self.viewport
    }

    fn set_scroll(&mut self, raw: f64) {
        self.offset = raw.max(0.0);
    }

    fn set_viewport(&mut self, size: f64) {
        self.viewport = size.max(0.0);
    }

    fn scroll_to(&mut self, offset: f64) {
        self.offset = offset.max(0.0);
    }
}

/// The comment list scrolls along with the whole document
///
/// The list starts `list_top` pixels below the top of the document, so parts of
/// the window may show things above it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DocumentScroll {
    scroll_y: f64,
    window_height: f64,
    list_top: f64,
}

impl DocumentScroll {
    pub fn new(window_height: f64, list_top: f64) -> DocumentScroll {
        DocumentScroll {
            scroll_y: 0.0,
            window_height,
            list_top,
        }
    }

    pub fn set_list_top(&mut self, list_top: f64) {
        self.list_top = list_top;
    }

    /// Document scroll position, eg. to apply to the window after `scroll_to`
    pub fn document_scroll(&self) -> f64 {
        self.scroll_y
    }
}

impl ScrollSource for DocumentScroll {
    fn scroll_offset(&self) -> f64 {
        (self.scroll_y - self.list_top).max(0.0)
    }

    fn viewport_size(&self) -> f64 {
        let hidden_above_list = (self.list_top - self.scroll_y).max(0.0);
        (self.window_height - hidden_above_list).max(0.0)
    }

    fn set_scroll(&mut self, raw: f64) {
        self.scroll_y = raw.max(0.0);
    }

    fn set_viewport(&mut self, size: f64) {
        self.window_height = size.max(0.0);
    }

    fn scroll_to(&mut self, offset: f64) {
        self.scroll_y = (self.list_top + offset).max(0.0);
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Align {
    Start,
    Center,
    End,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MountedRow {
    pub index: usize,
    pub id: CommentId,
    /// Offset of the row's top relative to the list's top
    pub top: f64,
    pub height: f64,
    /// False while `height` is only an estimate
    pub measured: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Layout {
    pub rows: Vec<MountedRow>,
    pub range: Range<usize>,
    /// Translation to apply to the mounted rows: the height of all rows before them
    pub offset: f64,
    /// Height of the whole list, for sizing the scroll area
    pub total_height: f64,
    /// The last mounted row is within one row of the end of the loaded list
    pub near_end: bool,
}

#[derive(Clone, Debug)]
pub struct Virtualizer {
    estimated_height: f64,
    overscan: usize,
    measured: HashMap<CommentId, f64>,
}

impl Virtualizer {
    pub fn new(config: &ThreadConfig) -> Virtualizer {
        Virtualizer {
            estimated_height: config.estimated_row_height,
            overscan: config.overscan,
            measured: HashMap::new(),
        }
    }

    pub fn height_of(&self, id: CommentId) -> (f64, bool) {
        match self.measured.get(&id) {
            Some(h) => (*h, true),
            None => (self.estimated_height, false),
        }
    }

    /// Records the laid-out height of a row, returns true if it changed
    pub fn measure(&mut self, id: CommentId, height: f64) -> bool {
        let height = height.max(0.0);
        self.measured.insert(id, height) != Some(height)
    }

    pub fn forget(&mut self, id: CommentId) {
        self.measured.remove(&id);
    }

    /// tops[i] is the offset of row i, tops[rows.len()] the total height
    fn tops(&self, rows: &[Comment]) -> Vec<f64> {
        let mut tops = Vec::with_capacity(rows.len() + 1);
        let mut acc = 0.0;
        tops.push(acc);
        for r in rows {
            acc += self.height_of(r.id).0;
            tops.push(acc);
        }
        tops
    }

    pub fn layout(&self, rows: &[Comment], scroll: &dyn ScrollSource) -> Layout {
        let tops = self.tops(rows);
        let total_height = tops[rows.len()];
        if rows.is_empty() {
            return Layout {
                rows: Vec::new(),
                range: 0..0,
                offset: 0.0,
                total_height,
                near_end: true,
            };
        }
        let last_index = rows.len() - 1;
        let view_top = scroll.scroll_offset().min(total_height);
        let view_bottom = view_top + scroll.viewport_size();

        // First row whose bottom is below the viewport's top
        let first = tops[1..]
            .partition_point(|bottom| *bottom <= view_top)
            .min(last_index);
        // Last row whose top is above the viewport's bottom
        let last = tops[..rows.len()]
            .partition_point(|top| *top < view_bottom)
            .saturating_sub(1)
            .clamp(first, last_index);

        let start = first.saturating_sub(self.overscan);
        let end = last
            .saturating_add(1)
            .saturating_add(self.overscan)
            .min(rows.len());
        let mounted = rows[start..end]
            .iter()
            .enumerate()
            .map(|(i, r)| {
                let (height, measured) = self.height_of(r.id);
                MountedRow {
                    index: start + i,
                    id: r.id,
                    top: tops[start + i],
                    height,
                    measured,
                }
            })
            .collect();
        Layout {
            rows: mounted,
            range: start..end,
            offset: tops[start],
            total_height,
            // the last mounted row, end - 1, is at most one row before the last one
            near_end: end >= last_index,
        }
    }

    /// Scroll offset that brings row `index` to the given place of the viewport
    pub fn scroll_offset_for(
        &self,
        rows: &[Comment],
        index: usize,
        align: Align,
        viewport: f64,
    ) -> f64 {
        let tops = self.tops(rows);
        let total_height = tops[rows.len()];
        let index = index.min(rows.len().saturating_sub(1));
        let top = tops[index];
        let height = tops.get(index + 1).map(|b| b - top).unwrap_or(0.0);
        let target = match align {
            Align::Start => top,
            Align::Center => top + height / 2.0 - viewport / 2.0,
            Align::End => top + height - viewport,
        };
        target.clamp(0.0, (total_height - viewport).max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::comment;

    fn rows(n: i64) -> Vec<Comment> {
        (0..n).map(|i| comment(i, None)).collect()
    }

    fn virt(overscan: usize) -> Virtualizer {
        Virtualizer::new(&ThreadConfig {
            estimated_row_height: 100.0,
            overscan,
            ..ThreadConfig::default()
        })
    }

    fn scrolled(offset: f64, viewport: f64) -> ContainerScroll {
        let mut s = ContainerScroll::new(viewport);
        s.set_scroll(offset);
        s
    }

    #[test]
    fn top_of_list() {
        let v = virt(2);
        let rows = rows(50);
        let l = v.layout(&rows, &scrolled(0.0, 350.0));
        // rows 0..=3 are visible, plus 2 rows of overscan below
        assert_eq!(l.range, 0..6);
        assert_eq!(l.offset, 0.0);
        assert_eq!(l.total_height, 5000.0);
        assert!(!l.near_end);
        assert!(l.rows.iter().all(|r| !r.measured));
    }

    #[test]
    fn offset_is_height_of_unmounted_rows() {
        let mut v = virt(1);
        let rows = rows(50);
        v.measure(CommentId(0), 30.0);
        v.measure(CommentId(3), 250.0);
        let l = v.layout(&rows, &scrolled(1000.0, 300.0));
        let expected: f64 = rows[..l.range.start]
            .iter()
            .map(|r| v.height_of(r.id).0)
            .sum();
        assert_eq!(l.offset, expected);
        assert_eq!(l.rows[0].top, l.offset);
        for w in l.rows.windows(2) {
            assert_eq!(w[0].top + w[0].height, w[1].top);
        }
    }

    #[test]
    fn mounted_rows_cover_viewport_and_overscan() {
        let mut v = virt(3);
        let rows = rows(200);
        for (i, r) in rows.iter().enumerate() {
            if i % 3 == 0 {
                v.measure(r.id, 40.0 + (i % 7) as f64 * 25.0);
            }
        }
        for offset in [0.0, 17.5, 999.0, 5432.1, 12000.0, 1e9] {
            for viewport in [0.0, 1.0, 300.0, 2000.0] {
                let l = v.layout(&rows, &scrolled(offset, viewport));
                let first = l.rows.first().unwrap();
                let last = l.rows.last().unwrap();
                let view_top = offset.min(l.total_height);
                let view_bottom = (view_top + viewport).min(l.total_height);
                assert!(first.top <= view_top, "{offset} {viewport}");
                assert!(last.top + last.height >= view_bottom, "{offset} {viewport}");

                // overscan rows exist on both sides unless the list ends
                let visible_first = l
                    .rows
                    .iter()
                    .find(|r| r.top + r.height > view_top)
                    .map(|r| r.index)
                    .unwrap_or(l.range.end - 1);
                assert!(l.range.start == 0 || visible_first - l.range.start >= 3);
            }
        }
    }

    #[test]
    fn near_end_triggers_within_one_row() {
        let v = virt(0);
        let rows = rows(10);
        assert!(!v.layout(&rows, &scrolled(0.0, 250.0)).near_end);
        // rows 7 and 8 visible, 9 is the last one
        let l = v.layout(&rows, &scrolled(750.0, 150.0));
        assert_eq!(l.range, 7..9);
        assert!(l.near_end);
        let l = v.layout(&rows, &scrolled(550.0, 150.0));
        assert_eq!(l.range, 5..7);
        assert!(!l.near_end);
    }

    #[test]
    fn huge_overscan_mounts_everything() {
        let v = virt(usize::MAX);
        let rows = rows(5);
        let l = v.layout(&rows, &scrolled(0.0, 300.0));
        assert_eq!(l.range, 0..5);
        assert_eq!(l.offset, 0.0);
        assert!(l.near_end);
    }

    #[test]
    fn empty_list_is_near_end() {
        let l = virt(2).layout(&[], &scrolled(10.0, 300.0));
        assert!(l.rows.is_empty());
        assert!(l.near_end);
        assert_eq!(l.total_height, 0.0);
    }

    #[test]
    fn measurements_follow_ids() {
        let mut v = virt(0);
        let mut rows = rows(5);
        assert!(v.measure(CommentId(2), 300.0));
        assert!(!v.measure(CommentId(2), 300.0));
        rows.insert(0, comment(99, None));
        let l = v.layout(&rows, &scrolled(0.0, 1000.0));
        let r = l.rows.iter().find(|r| r.id == CommentId(2)).unwrap();
        assert_eq!(r.index, 3);
        assert_eq!(r.height, 300.0);
        assert!(r.measured);
        v.forget(CommentId(2));
        assert_eq!(v.height_of(CommentId(2)), (100.0, false));
    }

    #[test]
    fn scroll_targets() {
        let v = virt(0);
        let rows = rows(20);
        assert_eq!(v.scroll_offset_for(&rows, 10, Align::Start, 300.0), 1000.0);
        assert_eq!(v.scroll_offset_for(&rows, 10, Align::Center, 300.0), 900.0);
        assert_eq!(v.scroll_offset_for(&rows, 10, Align::End, 300.0), 800.0);
        // clamped to the scrollable range
        assert_eq!(v.scroll_offset_for(&rows, 0, Align::Center, 300.0), 0.0);
        assert_eq!(v.scroll_offset_for(&rows, 19, Align::Start, 300.0), 1700.0);
    }

    #[test]
    fn document_scroll_accounts_for_list_position() {
        let mut s = DocumentScroll::new(800.0, 500.0);
        assert_eq!(s.scroll_offset(), 0.0);
        assert_eq!(s.viewport_size(), 300.0);
        s.set_scroll(700.0);
        assert_eq!(s.scroll_offset(), 200.0);
        assert_eq!(s.viewport_size(), 800.0);
        s.scroll_to(1000.0);
        assert_eq!(s.document_scroll(), 1500.0);
        assert_eq!(s.scroll_offset(), 1000.0);
    }
}

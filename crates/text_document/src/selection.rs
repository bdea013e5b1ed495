use crate::change::{Change, adjust_for_change};
use crate::error::EditError;
use crate::position::{Position, Range};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Backward,
    Forward,
}

impl Direction {
    pub fn reverse(self) -> Self {
        match self {
            Self::Backward => Self::Forward,
            Self::Forward => Self::Backward,
        }
    }
}

/// A non-empty set of sorted, non-overlapping ranges with one primary range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    ranges: Vec<Range>,
    primary: usize,
}

impl Selection {
    pub fn single(range: Range) -> Self {
        Selection {
            ranges: vec![range],
            primary: 0,
        }
    }

    pub fn cursor(pos: Position) -> Self {
        Self::single(Range::cursor(pos))
    }

    /// Sorts `ranges` and merges the ones that overlap.
    ///
    /// Touching ranges merge too, unless `may_touch` is set and the later
    /// range is non-empty. The primary index follows its range through
    /// sorting and merging.
    pub fn normalize(ranges: Vec<Range>, primary: usize, may_touch: bool) -> Result<Self, EditError> {
        if ranges.is_empty() {
            return Err(EditError::EmptySelection);
        }
        let primary = primary.min(ranges.len() - 1);
        let mut indexed: Vec<(usize, Range)> = ranges.into_iter().enumerate().collect();
        indexed.sort_by_key(|(_, range)| range.from());
        let mut primary = indexed
            .iter()
            .position(|(index, _)| *index == primary)
            .unwrap_or(0);
        let mut ranges: Vec<Range> = indexed.into_iter().map(|(_, range)| range).collect();

        let mut i = 1;
        while i < ranges.len() {
            let current = ranges[i];
            let previous = ranges[i - 1];
            let overlap = previous.to().cmp(&current.from());
            let merge = if may_touch && !current.is_empty() {
                overlap == Ordering::Greater
            } else {
                overlap != Ordering::Less
            };
            if !merge {
                i += 1;
                continue;
            }
            let from = previous.from().min(current.from());
            let to = previous.to().max(current.to());
            let inverted = if previous.is_empty() {
                current.from() == current.head
            } else {
                previous.from() == previous.head
            };
            if i <= primary {
                primary -= 1;
            }
            ranges[i - 1] = if inverted {
                Range::new(to, from)
            } else {
                Range::new(from, to)
            };
            ranges.remove(i);
        }

        Ok(Selection { ranges, primary })
    }

    pub fn ranges(&self) -> &[Range] {
        &self.ranges
    }

    pub fn primary(&self) -> Range {
        self.ranges[self.primary]
    }

    pub fn primary_index(&self) -> usize {
        self.primary
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn something_selected(&self) -> bool {
        self.ranges.iter().any(|range| !range.is_empty())
    }

    /// Index of the first range touching `pos..=end`.
    pub fn contains(&self, pos: Position, end: Option<Position>) -> Option<usize> {
        let end = end.unwrap_or(pos);
        self.ranges
            .iter()
            .position(|range| end >= range.from() && pos <= range.to())
    }

    pub(crate) fn map_positions<F>(&mut self, mut f: F)
    where
        F: FnMut(&mut Position),
    {
        for range in &mut self.ranges {
            f(&mut range.anchor);
            f(&mut range.head);
        }
    }
}

/// Computes the range a shift-extension of `range` towards `head` produces.
///
/// Without `extend` the result is a fresh range from `other` (or `head`) to
/// `head`. With it the anchor is kept, and when `other` is given the ends
/// are swapped as needed so the result covers both `head` and `other`.
pub fn extend_range(range: Range, head: Position, other: Option<Position>, extend: bool) -> Range {
    if !extend {
        return Range::new(other.unwrap_or(head), head);
    }
    let mut anchor = range.anchor;
    let mut head = head;
    if let Some(other) = other {
        let head_before = head < anchor;
        if head_before != (other < anchor) {
            anchor = head;
            head = other;
        } else if head_before != (head < other) {
            head = other;
        }
    }
    Range::new(anchor, head)
}

/// The selection after `change`, with every range mapped through it.
pub(crate) fn selection_after_change(selection: &Selection, change: &Change, may_touch: bool) -> Result<Selection, EditError> {
    let ranges = selection
        .ranges()
        .iter()
        .map(|range| {
            Range::new(
                adjust_for_change(range.anchor, change),
                adjust_for_change(range.head, change),
            )
        })
        .collect();
    Selection::normalize(ranges, selection.primary_index(), may_touch)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(line: usize, column: usize) -> Position {
        Position::new(line, column)
    }

    fn range(anchor: (usize, usize), head: (usize, usize)) -> Range {
        Range::new(anchor.into(), head.into())
    }

    #[test]
    fn normalize_sorts_and_tracks_primary() {
        let selection = Selection::normalize(
            vec![range((2, 0), (2, 1)), range((0, 0), (0, 1)), range((1, 0), (1, 1))],
            0,
            false,
        )
        .unwrap();
        assert_eq!(selection.ranges()[0], range((0, 0), (0, 1)));
        assert_eq!(selection.primary(), range((2, 0), (2, 1)));
        assert_eq!(selection.primary_index(), 2);
    }

    #[test]
    fn overlapping_ranges_merge_keeping_direction() {
        let selection = Selection::normalize(
            vec![range((0, 5), (0, 2)), range((0, 4), (0, 1))],
            1,
            false,
        )
        .unwrap();
        assert_eq!(selection.ranges(), &[range((0, 5), (0, 1))]);
        assert_eq!(selection.primary_index(), 0);
    }

    #[test]
    fn touching_ranges_merge_by_default() {
        let selection =
            Selection::normalize(vec![range((0, 0), (0, 2)), range((0, 2), (0, 4))], 0, false).unwrap();
        assert_eq!(selection.ranges(), &[range((0, 0), (0, 4))]);
    }

    #[test]
    fn touching_ranges_stay_apart_when_allowed() {
        let selection =
            Selection::normalize(vec![range((0, 0), (0, 2)), range((0, 2), (0, 4))], 0, true).unwrap();
        assert_eq!(selection.len(), 2);

        // a cursor touching a range is still absorbed
        let selection =
            Selection::normalize(vec![range((0, 0), (0, 2)), range((0, 2), (0, 2))], 1, true).unwrap();
        assert_eq!(selection.ranges(), &[range((0, 0), (0, 2))]);
        assert_eq!(selection.primary_index(), 0);
    }

    #[test]
    fn normalized_ranges_never_overlap() {
        let input: Vec<Range> = (0..20)
            .map(|n| range((n % 3, n % 7), (n % 5, (n * 3) % 8)))
            .collect();
        let selection = Selection::normalize(input, 7, false).unwrap();
        for pair in selection.ranges().windows(2) {
            assert!(pair[0].to() < pair[1].from());
        }
        assert!(selection.primary_index() < selection.len());
    }

    #[test]
    fn empty_input_is_rejected() {
        assert_eq!(
            Selection::normalize(Vec::new(), 0, false),
            Err(EditError::EmptySelection)
        );
    }

    #[test]
    fn contains_finds_touching_range() {
        let selection =
            Selection::normalize(vec![range((0, 0), (0, 2)), range((1, 0), (1, 3))], 0, false).unwrap();
        assert_eq!(selection.contains(pos(1, 3), None), Some(1));
        assert_eq!(selection.contains(pos(0, 3), Some(pos(0, 9))), None);
        assert_eq!(selection.contains(pos(0, 1), Some(pos(1, 1))), Some(0));
    }

    #[test]
    fn extend_keeps_anchor() {
        let base = range((0, 2), (0, 4));
        assert_eq!(extend_range(base, pos(0, 8), None, true), range((0, 2), (0, 8)));
        assert_eq!(extend_range(base, pos(0, 8), None, false), range((0, 8), (0, 8)));
        assert_eq!(
            extend_range(base, pos(0, 8), Some(pos(0, 6)), false),
            range((0, 6), (0, 8))
        );
    }

    #[test]
    fn extend_with_other_covers_both_ends() {
        let base = range((0, 5), (0, 5));
        // head and other on opposite sides of the anchor
        assert_eq!(
            extend_range(base, pos(0, 2), Some(pos(0, 8)), true),
            range((0, 2), (0, 8))
        );
        // both before the anchor, other further out
        assert_eq!(
            extend_range(base, pos(0, 3), Some(pos(0, 1)), true),
            range((0, 5), (0, 1))
        );
    }
}

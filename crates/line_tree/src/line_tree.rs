mod node;

use node::{Branch, Chunk, ChunkId, ChunkNode, Leaf};
use std::ops::ControlFlow;
use thiserror::Error;

/// Stable handle to a line stored in a [`LineTree`].
///
/// Handles survive insertions and removals around the line they name. Once the
/// line itself is removed the handle goes stale and never aliases a line that
/// later reuses the same slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LineId {
    index: usize,
    generation: u32,
}

#[derive(Debug)]
struct LineSlot<L> {
    value: Option<L>,
    generation: u32,
    chunk: Option<ChunkId>,
    height: f64,
}

/// Height-balanced chunk tree of lines.
///
/// Leaves hold runs of line handles, branches cache the line count and summed
/// height of everything below them, so index lookup, line-number lookup and
/// height queries are logarithmic in the number of lines.
#[derive(Debug)]
pub struct LineTree<L> {
    slots: Vec<LineSlot<L>>,
    free_slots: Vec<usize>,
    chunks: Vec<Option<ChunkNode>>,
    free_chunks: Vec<usize>,
    root: ChunkId,
    default_height: f64,
}

impl<L> LineTree<L> {
    pub fn new() -> Self {
        Self::with_default_height(1.0)
    }

    /// Creates an empty tree whose new lines start out `height` tall.
    pub fn with_default_height(height: f64) -> Self {
        let root = ChunkNode {
            parent: None,
            chunk: Chunk::Branch(Branch::default()),
        };
        LineTree {
            slots: Vec::new(),
            free_slots: Vec::new(),
            chunks: vec![Some(root)],
            free_chunks: Vec::new(),
            root: ChunkId(0),
            default_height: height,
        }
    }

    pub fn from_lines<I: IntoIterator<Item = L>>(lines: I) -> Self {
        let mut tree = Self::new();
        tree.insert_unchecked(0, lines);
        tree
    }

    pub fn len(&self) -> usize {
        self.node(self.root).chunk.size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sum of all line heights.
    pub fn height(&self) -> f64 {
        self.node(self.root).chunk.height()
    }

    pub fn default_height(&self) -> f64 {
        self.default_height
    }

    /// Handle of the line at `index`.
    pub fn id_at(&self, index: usize) -> Result<LineId, LineTreeError> {
        let len = self.len();
        if index >= len {
            return Err(LineTreeError::OutOfRange { index, len });
        }
        let mut chunk = self.root;
        let mut at = index;
        loop {
            match &self.node(chunk).chunk {
                Chunk::Leaf(leaf) => {
                    return leaf
                        .lines
                        .get(at)
                        .copied()
                        .ok_or(LineTreeError::OutOfRange { index, len });
                }
                Chunk::Branch(branch) => {
                    let mut next = None;
                    for child in &branch.children {
                        let size = self.node(*child).chunk.size();
                        if at < size {
                            next = Some(*child);
                            break;
                        }
                        at -= size;
                    }
                    chunk = next.ok_or(LineTreeError::OutOfRange { index, len })?;
                }
            }
        }
    }

    pub fn get(&self, index: usize) -> Result<&L, LineTreeError> {
        let id = self.id_at(index)?;
        self.line(id).ok_or(LineTreeError::OutOfRange {
            index,
            len: self.len(),
        })
    }

    pub fn get_mut(&mut self, index: usize) -> Result<&mut L, LineTreeError> {
        let len = self.len();
        let id = self.id_at(index)?;
        self.line_mut(id)
            .ok_or(LineTreeError::OutOfRange { index, len })
    }

    fn slot(&self, id: LineId) -> Option<&LineSlot<L>> {
        self.slots
            .get(id.index)
            .filter(|slot| slot.generation == id.generation && slot.value.is_some())
    }

    fn slot_mut(&mut self, id: LineId) -> Option<&mut LineSlot<L>> {
        self.slots
            .get_mut(id.index)
            .filter(|slot| slot.generation == id.generation && slot.value.is_some())
    }

    pub fn line(&self, id: LineId) -> Option<&L> {
        self.slot(id).and_then(|slot| slot.value.as_ref())
    }

    pub fn line_mut(&mut self, id: LineId) -> Option<&mut L> {
        self.slot_mut(id).and_then(|slot| slot.value.as_mut())
    }

    pub fn contains(&self, id: LineId) -> bool {
        self.slot(id).is_some()
    }

    /// Current index of the line behind `id`, or `None` for a stale handle.
    pub fn line_number_of(&self, id: LineId) -> Option<usize> {
        let mut chunk = self.slot(id)?.chunk?;
        let Chunk::Leaf(leaf) = &self.node(chunk).chunk else {
            return None;
        };
        let mut number = leaf.lines.iter().position(|line| *line == id)?;
        while let Some(parent) = self.node(chunk).parent {
            if let Chunk::Branch(branch) = &self.node(parent).chunk {
                for child in &branch.children {
                    if *child == chunk {
                        break;
                    }
                    number += self.node(*child).chunk.size();
                }
            }
            chunk = parent;
        }
        Some(number)
    }

    /// Inserts `lines` so the first of them ends up at index `at`.
    pub fn insert<I: IntoIterator<Item = L>>(
        &mut self,
        at: usize,
        lines: I,
    ) -> Result<Vec<LineId>, LineTreeError> {
        let len = self.len();
        if at > len {
            return Err(LineTreeError::OutOfRange { index: at, len });
        }
        Ok(self.insert_unchecked(at, lines))
    }

    fn insert_unchecked<I: IntoIterator<Item = L>>(&mut self, at: usize, lines: I) -> Vec<LineId> {
        let ids: Vec<LineId> = lines.into_iter().map(|line| self.alloc_line(line)).collect();
        if ids.is_empty() {
            return ids;
        }
        let root = self.root;
        let root_is_empty = match &self.node(root).chunk {
            Chunk::Branch(branch) => branch.children.is_empty(),
            Chunk::Leaf(_) => false,
        };
        if root_is_empty {
            let leaf = self.alloc_chunk(Some(root), Chunk::Leaf(Leaf::default()));
            if let Chunk::Branch(branch) = &mut self.node_mut(root).chunk {
                branch.children.push(leaf);
            }
        }
        let height = self.default_height * ids.len() as f64;
        self.insert_inner(root, at, &ids, height);
        ids
    }

    /// Removes `count` lines starting at `at` and hands them back with their handles.
    pub fn remove(&mut self, at: usize, count: usize) -> Result<Vec<(LineId, L)>, LineTreeError> {
        let len = self.len();
        if at.checked_add(count).is_none_or(|end| end > len) {
            return Err(LineTreeError::OutOfRange {
                index: at.saturating_add(count),
                len,
            });
        }
        if count == 0 {
            return Ok(Vec::new());
        }
        let mut removed = Vec::with_capacity(count);
        let root = self.root;
        self.remove_inner(root, at, count, &mut removed);
        Ok(removed
            .into_iter()
            .filter_map(|id| self.free_line(id).map(|line| (id, line)))
            .collect())
    }

    fn alloc_line(&mut self, value: L) -> LineId {
        let height = self.default_height;
        match self.free_slots.pop() {
            Some(index) => {
                let slot = &mut self.slots[index];
                slot.value = Some(value);
                slot.chunk = None;
                slot.height = height;
                LineId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                self.slots.push(LineSlot {
                    value: Some(value),
                    generation: 0,
                    chunk: None,
                    height,
                });
                LineId {
                    index: self.slots.len() - 1,
                    generation: 0,
                }
            }
        }
    }

    fn free_line(&mut self, id: LineId) -> Option<L> {
        let slot = self.slot_mut(id)?;
        let value = slot.value.take();
        slot.chunk = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_slots.push(id.index);
        value
    }

    /// Visits lines `from..to` in order until `visit` breaks.
    pub fn iter_range<F>(&self, from: usize, to: usize, mut visit: F) -> Result<(), LineTreeError>
    where
        F: FnMut(usize, LineId, &L) -> ControlFlow<()>,
    {
        let len = self.len();
        if from > to || to > len {
            return Err(LineTreeError::OutOfRange {
                index: from.max(to),
                len,
            });
        }
        let mut index = from;
        let _ = self.iter_inner(self.root, from, to - from, &mut index, &mut visit);
        Ok(())
    }

    fn iter_inner<F>(
        &self,
        chunk: ChunkId,
        mut at: usize,
        mut n: usize,
        index: &mut usize,
        visit: &mut F,
    ) -> ControlFlow<()>
    where
        F: FnMut(usize, LineId, &L) -> ControlFlow<()>,
    {
        match &self.node(chunk).chunk {
            Chunk::Leaf(leaf) => {
                for id in &leaf.lines[at..at + n] {
                    if let Some(line) = self.line(*id) {
                        visit(*index, *id, line)?;
                    }
                    *index += 1;
                }
            }
            Chunk::Branch(branch) => {
                for child in &branch.children {
                    if n == 0 {
                        break;
                    }
                    let size = self.node(*child).chunk.size();
                    if at < size {
                        let used = n.min(size - at);
                        self.iter_inner(*child, at, used, index, visit)?;
                        n -= used;
                        at = 0;
                    } else {
                        at -= size;
                    }
                }
            }
        }
        ControlFlow::Continue(())
    }

    /// All lines in document order.
    pub fn iter(&self) -> impl Iterator<Item = (LineId, &L)> + '_ {
        let mut ids = Vec::with_capacity(self.len());
        self.collect_lines(self.root, &mut ids);
        ids.into_iter()
            .filter_map(move |id| self.line(id).map(|line| (id, line)))
    }

    pub fn line_height(&self, id: LineId) -> Option<f64> {
        self.slot(id).map(|slot| slot.height)
    }

    /// Updates one line's height and the cached sums of every chunk above it.
    pub fn set_line_height(&mut self, id: LineId, height: f64) -> bool {
        let Some(slot) = self.slot_mut(id) else {
            return false;
        };
        let diff = height - slot.height;
        slot.height = height;
        let mut chunk = slot.chunk;
        while let Some(current) = chunk {
            let node = self.node_mut(current);
            match &mut node.chunk {
                Chunk::Leaf(leaf) => leaf.height += diff,
                Chunk::Branch(branch) => branch.height += diff,
            }
            chunk = node.parent;
        }
        true
    }

    /// Index of the line covering vertical offset `height`, clamped to the last line.
    pub fn line_at_height(&self, height: f64) -> usize {
        let last = self.len().saturating_sub(1);
        let mut remaining = height;
        let mut number = 0;
        let mut chunk = self.root;
        'descend: loop {
            match &self.node(chunk).chunk {
                Chunk::Leaf(leaf) => {
                    for (offset, id) in leaf.lines.iter().enumerate() {
                        let line_height = self.line_height(*id).unwrap_or(0.0);
                        if remaining < line_height {
                            return number + offset;
                        }
                        remaining -= line_height;
                    }
                    return (number + leaf.lines.len()).min(last);
                }
                Chunk::Branch(branch) => {
                    for child in &branch.children {
                        let child_chunk = &self.node(*child).chunk;
                        if remaining < child_chunk.height() {
                            chunk = *child;
                            continue 'descend;
                        }
                        remaining -= child_chunk.height();
                        number += child_chunk.size();
                    }
                    return last;
                }
            }
        }
    }

    /// Vertical offset of the top of the line behind `id`.
    pub fn height_at_line(&self, id: LineId) -> Option<f64> {
        let mut chunk = self.slot(id)?.chunk?;
        let mut height = 0.0;
        if let Chunk::Leaf(leaf) = &self.node(chunk).chunk {
            for line in &leaf.lines {
                if *line == id {
                    break;
                }
                height += self.line_height(*line).unwrap_or(0.0);
            }
        }
        while let Some(parent) = self.node(chunk).parent {
            if let Chunk::Branch(branch) = &self.node(parent).chunk {
                for child in &branch.children {
                    if *child == chunk {
                        break;
                    }
                    height += self.node(*child).chunk.height();
                }
            }
            chunk = parent;
        }
        Some(height)
    }

    /// Verifies cached sizes, heights, parent links and fan-out limits.
    pub fn check_invariants(&self) -> Result<(), String> {
        let (size, _) = self.check_chunk(self.root, None)?;
        let live = self.slots.iter().filter(|slot| slot.value.is_some()).count();
        if live != size {
            return Err(format!("tree holds {size} lines but {live} slots are live"));
        }
        Ok(())
    }
}

impl<L> Default for LineTree<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L> FromIterator<L> for LineTree<L> {
    fn from_iter<I: IntoIterator<Item = L>>(iter: I) -> Self {
        Self::from_lines(iter)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LineTreeError {
    #[error("line {index} is out of range for a tree of {len} lines")]
    OutOfRange { index: usize, len: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree_of(count: usize) -> LineTree<String> {
        (0..count).map(|n| n.to_string()).collect()
    }

    fn contents(tree: &LineTree<String>) -> Vec<String> {
        tree.iter().map(|(_, line)| line.clone()).collect()
    }

    #[test]
    fn get_by_index() {
        let tree = tree_of(500);
        assert_eq!(tree.len(), 500);
        assert_eq!(tree.get(0).unwrap(), "0");
        assert_eq!(tree.get(257).unwrap(), "257");
        assert_eq!(tree.get(499).unwrap(), "499");
        assert_eq!(
            tree.get(500),
            Err(LineTreeError::OutOfRange {
                index: 500,
                len: 500
            })
        );
    }

    #[test]
    fn insert_at_beginning() {
        let mut tree = tree_of(3);
        tree.insert(0, ["a".to_string()]).unwrap();
        assert_eq!(contents(&tree), vec!["a", "0", "1", "2"]);
    }

    #[test]
    fn insert_at_end() {
        let mut tree = tree_of(3);
        tree.insert(3, ["a".to_string(), "b".to_string()]).unwrap();
        assert_eq!(contents(&tree), vec!["0", "1", "2", "a", "b"]);
    }

    #[test]
    fn insert_past_end_is_rejected() {
        let mut tree = tree_of(3);
        assert_eq!(
            tree.insert(4, ["x".to_string()]),
            Err(LineTreeError::OutOfRange { index: 4, len: 3 })
        );
        assert_eq!(tree.len(), 3);
    }

    #[test]
    fn remove_in_middle() {
        let mut tree = tree_of(200);
        let removed = tree.remove(50, 100).unwrap();
        assert_eq!(removed.len(), 100);
        assert_eq!(removed[0].1, "50");
        assert_eq!(tree.len(), 100);
        assert_eq!(tree.get(50).unwrap(), "150");
        tree.check_invariants().unwrap();
    }

    #[test]
    fn remove_past_end_is_rejected() {
        let mut tree = tree_of(10);
        assert!(tree.remove(5, 6).is_err());
        assert_eq!(tree.len(), 10);
    }

    #[test]
    fn line_numbers_follow_edits() {
        let mut tree = tree_of(300);
        let id = tree.id_at(120).unwrap();
        tree.insert(10, (0..40).map(|n| format!("new {n}"))).unwrap();
        assert_eq!(tree.line_number_of(id), Some(160));
        tree.remove(0, 100).unwrap();
        assert_eq!(tree.line_number_of(id), Some(60));
        assert_eq!(tree.line(id).unwrap(), "120");
    }

    #[test]
    fn removed_handles_go_stale() {
        let mut tree = tree_of(5);
        let id = tree.id_at(2).unwrap();
        tree.remove(2, 1).unwrap();
        assert!(!tree.contains(id));
        assert_eq!(tree.line_number_of(id), None);

        // the freed slot is reused without reviving the old handle
        let fresh = tree.insert(0, ["x".to_string()]).unwrap()[0];
        assert_ne!(fresh, id);
        assert!(tree.line(id).is_none());
    }

    #[test]
    fn line_index_invariant_holds_after_mixed_edits() {
        let mut tree = tree_of(50);
        for round in 0..40 {
            let at = (round * 37) % (tree.len() + 1);
            tree.insert(at, (0..round % 7 + 1).map(|n| format!("{round}-{n}")))
                .unwrap();
            if tree.len() > 30 {
                let at = (round * 13) % (tree.len() - 20);
                tree.remove(at, round % 20).unwrap();
            }
            tree.check_invariants().unwrap();
        }
        for index in 0..tree.len() {
            let id = tree.id_at(index).unwrap();
            assert_eq!(tree.line_number_of(id), Some(index));
        }
    }

    #[test]
    fn iter_range_stops_early() {
        let tree = tree_of(100);
        let mut seen = Vec::new();
        tree.iter_range(40, 60, |index, _, line| {
            seen.push((index, line.clone()));
            if index == 44 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
        .unwrap();
        assert_eq!(seen.len(), 5);
        assert_eq!(seen[0], (40, "40".to_string()));
        assert!(tree.iter_range(60, 101, |_, _, _| ControlFlow::Continue(())).is_err());
    }

    #[test]
    fn heights_propagate_through_chunks() {
        let mut tree = tree_of(200);
        assert_eq!(tree.height(), 200.0);
        let id = tree.id_at(150).unwrap();
        assert!(tree.set_line_height(id, 3.0));
        assert_eq!(tree.height(), 202.0);
        assert_eq!(tree.height_at_line(id), Some(150.0));
        assert_eq!(tree.line_at_height(150.5), 150);
        assert_eq!(tree.line_at_height(152.5), 150);
        assert_eq!(tree.line_at_height(153.0), 151);
        assert_eq!(tree.line_at_height(10_000.0), 199);
        tree.check_invariants().unwrap();
    }

    #[test]
    fn default_height_applies_to_new_lines() {
        let mut tree: LineTree<&str> = LineTree::with_default_height(2.0);
        tree.insert(0, ["a", "b", "c"]).unwrap();
        assert_eq!(tree.height(), 6.0);
        tree.remove(1, 1).unwrap();
        assert_eq!(tree.height(), 4.0);
    }
}

use crate::{LineId, LineTree};
use tracing::trace;

/// Line count a freshly split leaf is cut down to.
pub const LEAF_TARGET: usize = 25;
pub const LEAF_MAX: usize = 50;
pub const BRANCH_MAX: usize = 10;
pub const BRANCH_SPILL: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkId(pub usize);

#[derive(Debug)]
pub enum Chunk {
    Branch(Branch),
    Leaf(Leaf),
}

impl Chunk {
    pub fn is_leaf(&self) -> bool {
        match self {
            Self::Branch(_) => false,
            Self::Leaf(_) => true,
        }
    }

    pub fn size(&self) -> usize {
        match self {
            Self::Branch(branch) => branch.size,
            Self::Leaf(leaf) => leaf.lines.len(),
        }
    }

    pub fn height(&self) -> f64 {
        match self {
            Self::Branch(branch) => branch.height,
            Self::Leaf(leaf) => leaf.height,
        }
    }
}

#[derive(Debug, Default)]
pub struct Branch {
    pub children: Vec<ChunkId>,
    pub size: usize,
    pub height: f64,
}

#[derive(Debug, Default)]
pub struct Leaf {
    pub lines: Vec<LineId>,
    pub height: f64,
}

#[derive(Debug)]
pub struct ChunkNode {
    pub parent: Option<ChunkId>,
    pub chunk: Chunk,
}

impl<L> LineTree<L> {
    pub(crate) fn node(&self, id: ChunkId) -> &ChunkNode {
        self.chunks[id.0].as_ref().expect("chunk id refers to a live chunk")
    }

    pub(crate) fn node_mut(&mut self, id: ChunkId) -> &mut ChunkNode {
        self.chunks[id.0].as_mut().expect("chunk id refers to a live chunk")
    }

    pub(crate) fn alloc_chunk(&mut self, parent: Option<ChunkId>, chunk: Chunk) -> ChunkId {
        let node = Some(ChunkNode { parent, chunk });
        match self.free_chunks.pop() {
            Some(index) => {
                self.chunks[index] = node;
                ChunkId(index)
            }
            None => {
                self.chunks.push(node);
                ChunkId(self.chunks.len() - 1)
            }
        }
    }

    // frees `id` and every chunk below it, the lines themselves are left alone
    fn free_subtree(&mut self, id: ChunkId) {
        if let Some(node) = self.chunks[id.0].take() {
            if let Chunk::Branch(branch) = node.chunk {
                for child in branch.children {
                    self.free_subtree(child);
                }
            }
            self.free_chunks.push(id.0);
        }
    }

    fn children_of(&self, id: ChunkId) -> Vec<ChunkId> {
        match &self.node(id).chunk {
            Chunk::Branch(branch) => branch.children.clone(),
            Chunk::Leaf(_) => Vec::new(),
        }
    }

    fn measure(&self, children: &[ChunkId]) -> (usize, f64) {
        children.iter().fold((0, 0.0), |(size, height), child| {
            let chunk = &self.node(*child).chunk;
            (size + chunk.size(), height + chunk.height())
        })
    }

    pub(crate) fn sum_heights(&self, lines: &[LineId]) -> f64 {
        lines.iter().filter_map(|id| self.line_height(*id)).sum()
    }

    pub(crate) fn collect_lines(&self, id: ChunkId, out: &mut Vec<LineId>) {
        match &self.node(id).chunk {
            Chunk::Leaf(leaf) => out.extend_from_slice(&leaf.lines),
            Chunk::Branch(branch) => {
                for child in &branch.children {
                    self.collect_lines(*child, out);
                }
            }
        }
    }

    /// Splices `ids` in at line `at` of the subtree rooted at `id`.
    pub(crate) fn insert_inner(&mut self, id: ChunkId, mut at: usize, ids: &[LineId], height: f64) {
        let children = match &mut self.node_mut(id).chunk {
            Chunk::Leaf(leaf) => {
                leaf.lines.splice(at..at, ids.iter().copied());
                leaf.height += height;
                None
            }
            Chunk::Branch(branch) => {
                branch.size += ids.len();
                branch.height += height;
                Some(branch.children.clone())
            }
        };
        let Some(children) = children else {
            for line in ids {
                self.slots[line.index].chunk = Some(id);
            }
            return;
        };

        for (index, child) in children.iter().enumerate() {
            let size = self.node(*child).chunk.size();
            if at <= size {
                self.insert_inner(*child, at, ids, height);
                let oversized = match &self.node(*child).chunk {
                    Chunk::Leaf(leaf) => leaf.lines.len() > LEAF_MAX,
                    Chunk::Branch(_) => false,
                };
                if oversized {
                    self.split_leaf(id, index, *child);
                    self.maybe_spill(id);
                }
                break;
            }
            at -= size;
        }
    }

    // keeps `len % 25 + 25` lines in the leaf and moves the rest into
    // 25-line siblings placed right after it
    fn split_leaf(&mut self, parent: ChunkId, index: usize, leaf_id: ChunkId) {
        let moved = match &mut self.node_mut(leaf_id).chunk {
            Chunk::Leaf(leaf) => {
                let keep = leaf.lines.len() % LEAF_TARGET + LEAF_TARGET;
                leaf.lines.split_off(keep)
            }
            Chunk::Branch(_) => return,
        };

        let mut position = index;
        for piece in moved.chunks(LEAF_TARGET) {
            let height = self.sum_heights(piece);
            let sibling = self.alloc_chunk(
                Some(parent),
                Chunk::Leaf(Leaf {
                    lines: piece.to_vec(),
                    height,
                }),
            );
            for line in piece {
                self.slots[line.index].chunk = Some(sibling);
            }
            position += 1;
            if let Chunk::Branch(branch) = &mut self.node_mut(parent).chunk {
                branch.children.insert(position, sibling);
            }
        }

        let mut kept = Vec::new();
        self.collect_lines(leaf_id, &mut kept);
        let height = self.sum_heights(&kept);
        if let Chunk::Leaf(leaf) = &mut self.node_mut(leaf_id).chunk {
            leaf.height = height;
        }
        trace!(
            leaf = leaf_id.0,
            kept = kept.len(),
            moved = moved.len(),
            "split oversized leaf"
        );
    }

    /// Moves children out of an overfull branch until every branch on the
    /// path to the root holds at most `BRANCH_MAX` children.
    pub(crate) fn maybe_spill(&mut self, id: ChunkId) {
        if self.children_of(id).len() <= BRANCH_MAX {
            return;
        }
        let mut me = id;
        loop {
            let spilled = match &mut self.node_mut(me).chunk {
                Chunk::Branch(branch) => {
                    let at = branch.children.len() - BRANCH_SPILL;
                    branch.children.split_off(at)
                }
                Chunk::Leaf(_) => return,
            };
            let (size, height) = self.measure(&spilled);
            let sibling = self.alloc_chunk(
                None,
                Chunk::Branch(Branch {
                    children: spilled.clone(),
                    size,
                    height,
                }),
            );
            for child in &spilled {
                self.node_mut(*child).parent = Some(sibling);
            }

            match self.node(me).parent {
                None => {
                    // the root keeps its identity, its remaining children move into a copy
                    let rest = match &mut self.node_mut(me).chunk {
                        Chunk::Branch(branch) => std::mem::take(&mut branch.children),
                        Chunk::Leaf(_) => return,
                    };
                    let (size, height) = self.measure(&rest);
                    let copy = self.alloc_chunk(
                        Some(me),
                        Chunk::Branch(Branch {
                            children: rest.clone(),
                            size,
                            height,
                        }),
                    );
                    for child in &rest {
                        self.node_mut(*child).parent = Some(copy);
                    }
                    if let Chunk::Branch(branch) = &mut self.node_mut(me).chunk {
                        branch.children = vec![copy, sibling];
                    }
                    self.node_mut(sibling).parent = Some(me);
                    trace!(root = me.0, "root spilled into two branches");
                    me = copy;
                }
                Some(parent) => {
                    if let Chunk::Branch(branch) = &mut self.node_mut(me).chunk {
                        branch.size -= size;
                        branch.height -= height;
                    }
                    if let Chunk::Branch(branch) = &mut self.node_mut(parent).chunk {
                        let position = branch
                            .children
                            .iter()
                            .position(|child| *child == me)
                            .map_or(branch.children.len(), |position| position + 1);
                        branch.children.insert(position, sibling);
                    }
                    self.node_mut(sibling).parent = Some(parent);
                }
            }

            if self.children_of(me).len() <= BRANCH_MAX {
                break;
            }
        }
        if let Some(parent) = self.node(me).parent {
            self.maybe_spill(parent);
        }
    }

    /// Removes `n` lines starting at `at` below `id`, pushing their ids onto `removed`.
    pub(crate) fn remove_inner(&mut self, id: ChunkId, mut at: usize, mut n: usize, removed: &mut Vec<LineId>) {
        if let Chunk::Leaf(leaf) = &mut self.node_mut(id).chunk {
            removed.extend(leaf.lines.drain(at..at + n));
            let remaining = leaf.lines.clone();
            let height = self.sum_heights(&remaining);
            if let Chunk::Leaf(leaf) = &mut self.node_mut(id).chunk {
                leaf.height = height;
            }
            return;
        }

        if let Chunk::Branch(branch) = &mut self.node_mut(id).chunk {
            branch.size -= n;
        }
        let mut height_removed = 0.0;
        let mut emptied = Vec::new();
        for child in self.children_of(id) {
            if n == 0 {
                break;
            }
            let size = self.node(child).chunk.size();
            if at < size {
                let take = n.min(size - at);
                let before = self.node(child).chunk.height();
                self.remove_inner(child, at, take, removed);
                height_removed += before - self.node(child).chunk.height();
                if take == size {
                    emptied.push(child);
                }
                n -= take;
                at = 0;
            } else {
                at -= size;
            }
        }

        if let Chunk::Branch(branch) = &mut self.node_mut(id).chunk {
            branch.height -= height_removed;
            branch.children.retain(|child| !emptied.contains(child));
        }
        for child in emptied {
            self.free_subtree(child);
        }

        let children = self.children_of(id);
        let size = self.node(id).chunk.size();
        let single_leaf = children.len() == 1 && self.node(children[0]).chunk.is_leaf();
        if size < LEAF_TARGET && !children.is_empty() && !single_leaf {
            self.collapse(id);
        }
    }

    // replaces everything below `id` with a single leaf holding the same lines
    fn collapse(&mut self, id: ChunkId) {
        let mut lines = Vec::new();
        self.collect_lines(id, &mut lines);
        for child in self.children_of(id) {
            self.free_subtree(child);
        }
        let height = self.sum_heights(&lines);
        let count = lines.len();
        let leaf = self.alloc_chunk(
            Some(id),
            Chunk::Leaf(Leaf {
                lines: lines.clone(),
                height,
            }),
        );
        for line in &lines {
            self.slots[line.index].chunk = Some(leaf);
        }
        if let Chunk::Branch(branch) = &mut self.node_mut(id).chunk {
            branch.children = vec![leaf];
        }
        trace!(branch = id.0, lines = count, "collapsed branch into one leaf");
    }

    // Walks the whole tree and reports the first inconsistency found
    pub(crate) fn check_chunk(&self, id: ChunkId, parent: Option<ChunkId>) -> Result<(usize, f64), String> {
        let node = self
            .chunks
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or_else(|| format!("chunk {} is not allocated", id.0))?;
        if node.parent != parent {
            return Err(format!(
                "chunk {} has parent {:?}, expected {:?}",
                id.0, node.parent, parent
            ));
        }
        match &node.chunk {
            Chunk::Leaf(leaf) => {
                if leaf.lines.len() > LEAF_MAX {
                    return Err(format!("leaf {} holds {} lines", id.0, leaf.lines.len()));
                }
                if leaf.lines.is_empty() {
                    return Err(format!("leaf {} is empty", id.0));
                }
                for line in &leaf.lines {
                    let slot = self
                        .slots
                        .get(line.index)
                        .filter(|slot| slot.generation == line.generation && slot.value.is_some())
                        .ok_or_else(|| format!("leaf {} refers to a dead line {line:?}", id.0))?;
                    if slot.chunk != Some(id) {
                        return Err(format!(
                            "line {line:?} points at chunk {:?} but lives in leaf {}",
                            slot.chunk, id.0
                        ));
                    }
                }
                let height = self.sum_heights(&leaf.lines);
                check_height(id, leaf.height, height)?;
                Ok((leaf.lines.len(), leaf.height))
            }
            Chunk::Branch(branch) => {
                if branch.children.len() > BRANCH_MAX {
                    return Err(format!(
                        "branch {} has {} children",
                        id.0,
                        branch.children.len()
                    ));
                }
                if parent.is_some() && branch.children.is_empty() {
                    return Err(format!("inner branch {} has no children", id.0));
                }
                let mut size = 0;
                let mut height = 0.0;
                for child in &branch.children {
                    let (child_size, child_height) = self.check_chunk(*child, Some(id))?;
                    size += child_size;
                    height += child_height;
                }
                if size != branch.size {
                    return Err(format!(
                        "branch {} caches size {} but its children hold {size}",
                        id.0, branch.size
                    ));
                }
                check_height(id, branch.height, height)?;
                Ok((size, branch.height))
            }
        }
    }
}

fn check_height(id: ChunkId, cached: f64, actual: f64) -> Result<(), String> {
    if (cached - actual).abs() > 1e-6 * actual.abs().max(1.0) {
        return Err(format!(
            "chunk {} caches height {cached} but its lines add up to {actual}",
            id.0
        ));
    }
    Ok(())
}

// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Pyramid tree: an arena of grid nodes ordered by subsampling.
//!
//! Tiles are grouped by subsampling and processed from the finest group to the coarsest.
//! Every tile of a group is a *cell*. A subtree built from finer groups hangs below the
//! cell that contains it, provided its subsampling divides the cell's subsampling on
//! both axes; otherwise it waits for a coarser group. What never finds a cell ends up
//! under the root.
//!
//! When the children of one node mix subsamplings that do not divide each other (9 and 15
//! under 45, say), each conflicting group is moved below its own [`NodeKind::Separator`]
//! so that no rank holds incompatible factors.
//!
//! Every node records the union of its subtree's absolute regions and the per-axis
//! maximum of its subtree's subsamplings; queries prune on both. Removal shrinks the
//! bounds but leaves the subsamplings alone, so a node keeps the rank it was built at.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::tile::Tile;
use crate::types::{Region, Subsampling, div_floor, union_all};

/// Handle to a node of a [`GridTree`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    const fn new(i: usize) -> Self {
        Self(i)
    }

    /// Position of the node in the tree's arena.
    pub const fn get(self) -> usize {
        self.0
    }
}

/// What a node stands for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeKind {
    /// A tile. Leaves have no children.
    Leaf(Tile),
    /// Aggregates children: a cell's own leaf plus the finer subtrees it encloses, or the
    /// synthetic root.
    Branch,
    /// Holds one group of subtrees whose subsampling conflicts with a sibling group.
    Separator,
}

/// One node of a [`GridTree`].
#[derive(Clone, Debug)]
pub struct Node {
    bounds: Region,
    subsampling: Subsampling,
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl Node {
    fn leaf(tile: Tile) -> Self {
        Self {
            bounds: tile.absolute_region(),
            subsampling: tile.subsampling(),
            kind: NodeKind::Leaf(tile),
            parent: None,
            children: Vec::new(),
        }
    }

    /// Union of the absolute regions below this node.
    pub fn bounds(&self) -> Region {
        self.bounds
    }

    /// Per-axis maximum subsampling below this node when the tree was built. An upper
    /// bound once tiles have been removed.
    pub fn subsampling(&self) -> Subsampling {
        self.subsampling
    }

    /// Node variant.
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// The tile of a leaf.
    pub fn tile(&self) -> Option<&Tile> {
        match &self.kind {
            NodeKind::Leaf(tile) => Some(tile),
            _ => None,
        }
    }

    /// Parent node, `None` for the root.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Children in subsampling order, finest first.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

/// Tree of tiles ordered by subsampling, exclusively owning its nodes.
///
/// Built once from a flat tile list. The only structural mutation afterwards is
/// [`GridTree::remove`]; adding tiles means rebuilding.
#[derive(Clone, Default)]
pub struct GridTree {
    nodes: Vec<Option<Node>>,
    root: Option<NodeId>,
    len: usize,
}

impl GridTree {
    /// Build a tree from `tiles`. Input order does not matter.
    pub fn build(tiles: impl IntoIterator<Item = Tile>) -> Self {
        let mut groups: BTreeMap<Subsampling, Vec<Tile>> = BTreeMap::new();
        for tile in tiles {
            groups.entry(tile.subsampling()).or_default().push(tile);
        }
        let mut tree = Self::default();
        let mut pending: Vec<NodeId> = Vec::new();
        for (subsampling, mut cells) in groups {
            cells.sort_by(|a, b| tile_order(a, b));
            tree.len += cells.len();
            let regions: Vec<Region> = cells.iter().map(Tile::absolute_region).collect();
            let grid = LevelGrid::new(&regions);

            let mut attached: Vec<Vec<NodeId>> = vec![Vec::new(); cells.len()];
            let mut waiting = Vec::new();
            for id in pending {
                let node = tree.at(id);
                let cell = node
                    .subsampling
                    .divides(&subsampling)
                    .then(|| grid.find(&regions, &node.bounds))
                    .flatten();
                match cell {
                    Some(i) => attached[i].push(id),
                    None => waiting.push(id),
                }
            }

            for (tile, children) in cells.into_iter().zip(attached) {
                let leaf = tree.push(Node::leaf(tile));
                if children.is_empty() {
                    waiting.push(leaf);
                } else {
                    let mut all = Vec::with_capacity(children.len() + 1);
                    all.push(leaf);
                    all.extend(children);
                    waiting.push(tree.push_parent(NodeKind::Branch, all));
                }
            }
            pending = waiting;
        }

        tree.root = match pending.len() {
            0 => None,
            1 => Some(pending[0]),
            _ => Some(tree.push_parent(NodeKind::Branch, pending)),
        };
        debug_assert!(
            {
                tree.check_invariants();
                true
            },
            "invariants hold after build"
        );
        tree
    }

    /// Number of tiles.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the tree holds no tiles.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Root node, `None` for an empty tree.
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Look up a node. Removed nodes are gone.
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.get()).and_then(Option::as_ref)
    }

    /// Bounds of the whole tree.
    pub fn bounds(&self) -> Option<Region> {
        self.root.map(|r| self.at(r).bounds)
    }

    /// Number of nodes on the longest root-to-leaf path; 0 when empty.
    pub fn depth(&self) -> usize {
        let Some(root) = self.root else {
            return 0;
        };
        let mut deepest = 0;
        let mut stack = vec![(root, 1)];
        while let Some((id, d)) = stack.pop() {
            deepest = deepest.max(d);
            stack.extend(self.at(id).children.iter().map(|&c| (c, d + 1)));
        }
        deepest
    }

    /// All tiles, in arena order.
    pub fn leaves(&self) -> impl Iterator<Item = &Tile> + '_ {
        self.nodes.iter().flatten().filter_map(Node::tile)
    }

    /// Tiles whose absolute region shares area with `region`.
    pub fn intersecting(&self, region: &Region) -> Vec<&Tile> {
        self.collect(
            |node| node.bounds.intersects(region),
            |tile| tile.absolute_region().intersects(region),
        )
    }

    /// Tiles whose absolute region lies entirely inside `region`.
    pub fn contained_in(&self, region: &Region) -> Vec<&Tile> {
        self.collect(
            |node| node.bounds.intersects(region),
            |tile| region.contains(&tile.absolute_region()),
        )
    }

    /// Tiles at exactly `subsampling` intersecting `region`.
    pub fn select(&self, region: &Region, subsampling: Subsampling) -> Vec<&Tile> {
        self.collect(
            |node| subsampling.is_within(&node.subsampling) && node.bounds.intersects(region),
            |tile| {
                tile.subsampling() == subsampling && tile.absolute_region().intersects(region)
            },
        )
    }

    /// Whether a tile not coarser than `subsampling` on either axis intersects `region`,
    /// i.e. whether a read of `region` at `subsampling` would find pixels.
    pub fn any_intersecting(&self, region: &Region, subsampling: Subsampling) -> bool {
        let Some(root) = self.root else {
            return false;
        };
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let node = self.at(id);
            if !node.bounds.intersects(region) {
                continue;
            }
            match &node.kind {
                NodeKind::Leaf(tile) if tile.subsampling().is_within(&subsampling) => return true,
                NodeKind::Leaf(_) => {}
                _ => stack.extend(node.children.iter().rev().copied()),
            }
        }
        false
    }

    /// Remove one occurrence of `tile`.
    ///
    /// Emptied branches and separators are dropped and the bounds of the remaining
    /// ancestors shrink to their children. Subsamplings are kept as built. Returns `false` when the tile is absent.
    pub fn remove(&mut self, tile: &Tile) -> bool {
        let Some(leaf) = self.find_leaf(tile) else {
            return false;
        };
        let mut current = leaf;
        loop {
            let parent = self.at(current).parent;
            self.nodes[current.get()] = None;
            let Some(p) = parent else {
                self.root = None;
                break;
            };
            let siblings = &mut self.at_mut(p).children;
            siblings.retain(|&c| c != current);
            if siblings.is_empty() {
                current = p;
            } else {
                self.refresh_upward(p);
                break;
            }
        }
        self.len -= 1;
        debug_assert!(
            {
                self.check_invariants();
                true
            },
            "invariants hold after removal"
        );
        true
    }

    /// Panic unless the structural invariants hold.
    ///
    /// Checked: each inner node's bounds equal the union of its children, no child is
    /// coarser than its parent on either axis, parents link back, leaves mirror their
    /// tile, and the plain (non-separator) children of a node have pairwise nesting
    /// subsamplings.
    pub fn check_invariants(&self) {
        let Some(root) = self.root else {
            assert_eq!(self.len, 0, "empty tree cannot hold tiles");
            return;
        };
        assert!(self.at(root).parent.is_none(), "root has no parent");
        let mut leaves = 0;
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let node = self.at(id);
            if let NodeKind::Leaf(tile) = &node.kind {
                assert!(node.children.is_empty(), "leaf {id:?} has children");
                assert_eq!(node.bounds, tile.absolute_region(), "leaf {id:?} bounds");
                assert_eq!(node.subsampling, tile.subsampling(), "leaf {id:?} subsampling");
                leaves += 1;
                continue;
            }
            assert!(!node.children.is_empty(), "inner node {id:?} is empty");
            let bounds = union_all(node.children.iter().map(|&c| self.at(c).bounds));
            assert_eq!(Some(node.bounds), bounds, "bounds of {id:?} are the union");
            for &c in &node.children {
                let child = self.at(c);
                assert_eq!(child.parent, Some(id), "child {c:?} links to {id:?}");
                assert!(
                    node.bounds.contains(&child.bounds),
                    "{id:?} contains child {c:?}"
                );
                assert!(
                    child.subsampling.is_within(&node.subsampling),
                    "subsampling of {c:?} does not exceed its parent"
                );
            }
            let plain: Vec<Subsampling> = node
                .children
                .iter()
                .map(|&c| self.at(c))
                .filter(|c| c.kind != NodeKind::Separator)
                .map(|c| c.subsampling)
                .collect();
            for (i, a) in plain.iter().enumerate() {
                for b in &plain[i + 1..] {
                    assert!(a.is_compatible(b), "{a} and {b} share a rank under {id:?}");
                }
            }
            stack.extend(node.children.iter().copied());
        }
        assert_eq!(leaves, self.len, "every tile is reachable");
    }

    fn at(&self, id: NodeId) -> &Node {
        match &self.nodes[id.get()] {
            Some(node) => node,
            None => panic!("node {id:?} was removed"),
        }
    }

    fn at_mut(&mut self, id: NodeId) -> &mut Node {
        match &mut self.nodes[id.get()] {
            Some(node) => node,
            None => panic!("node {id:?} was removed"),
        }
    }

    fn push(&mut self, node: Node) -> NodeId {
        let id = NodeId::new(self.nodes.len());
        self.nodes.push(Some(node));
        id
    }

    /// Create an inner node over `children`, inserting separators where subsampling
    /// groups conflict.
    fn push_parent(&mut self, kind: NodeKind, children: Vec<NodeId>) -> NodeId {
        let mut groups: Vec<(Subsampling, Vec<NodeId>)> = Vec::new();
        for id in children {
            let s = self.at(id).subsampling;
            match groups.iter_mut().find(|(g, _)| *g == s) {
                Some((_, members)) => members.push(id),
                None => groups.push((s, vec![id])),
            }
        }
        let conflicts: Vec<bool> = groups
            .iter()
            .map(|(s, _)| groups.iter().any(|(o, _)| !s.is_compatible(o)))
            .collect();
        let mut direct = Vec::new();
        for ((_, members), conflicting) in groups.into_iter().zip(conflicts) {
            if conflicting {
                direct.push(self.adopt(NodeKind::Separator, members));
            } else {
                direct.extend(members);
            }
        }
        direct.sort_by_key(|&c| self.at(c).subsampling);
        self.adopt(kind, direct)
    }

    fn adopt(&mut self, kind: NodeKind, children: Vec<NodeId>) -> NodeId {
        let id = NodeId::new(self.nodes.len());
        for &c in &children {
            self.at_mut(c).parent = Some(id);
        }
        let (bounds, subsampling) = self.summarize(&children);
        self.nodes.push(Some(Node {
            bounds,
            subsampling,
            kind,
            parent: None,
            children,
        }));
        id
    }

    fn summarize(&self, children: &[NodeId]) -> (Region, Subsampling) {
        let mut bounds = self.at(children[0]).bounds;
        let mut subsampling = self.at(children[0]).subsampling;
        for &c in &children[1..] {
            let child = self.at(c);
            bounds = bounds.union(&child.bounds);
            subsampling = subsampling.max_each(&child.subsampling);
        }
        (bounds, subsampling)
    }

    fn refresh_upward(&mut self, from: NodeId) {
        let mut next = Some(from);
        while let Some(id) = next {
            let (bounds, _) = self.summarize(&self.at(id).children);
            let node = self.at_mut(id);
            node.bounds = bounds;
            next = node.parent;
        }
    }

    fn find_leaf(&self, tile: &Tile) -> Option<NodeId> {
        let target = tile.absolute_region();
        let s = tile.subsampling();
        let mut stack = vec![self.root?];
        while let Some(id) = stack.pop() {
            let node = self.at(id);
            if !s.is_within(&node.subsampling) || !node.bounds.contains(&target) {
                continue;
            }
            match &node.kind {
                NodeKind::Leaf(t) if t == tile => return Some(id),
                NodeKind::Leaf(_) => {}
                _ => stack.extend(node.children.iter().copied()),
            }
        }
        None
    }

    fn collect(
        &self,
        visit: impl Fn(&Node) -> bool,
        keep: impl Fn(&Tile) -> bool,
    ) -> Vec<&Tile> {
        let mut out = Vec::new();
        let Some(root) = self.root else {
            return out;
        };
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let node = self.at(id);
            if !visit(node) {
                continue;
            }
            match &node.kind {
                NodeKind::Leaf(tile) => {
                    if keep(tile) {
                        out.push(tile);
                    }
                }
                _ => stack.extend(node.children.iter().rev().copied()),
            }
        }
        out
    }

    fn sorted_leaves(&self) -> Vec<&Tile> {
        let mut v: Vec<&Tile> = self.leaves().collect();
        v.sort_by(|a, b| tile_order(a, b));
        v
    }
}

/// Trees are equal when they hold the same multiset of tiles, whatever their shape.
impl PartialEq for GridTree {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.sorted_leaves() == other.sorted_leaves()
    }
}

impl Eq for GridTree {}

impl fmt::Debug for GridTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let live = self.nodes.iter().flatten().count();
        f.debug_struct("GridTree")
            .field("tiles", &self.len)
            .field("live_nodes", &live)
            .field("arena_nodes", &self.nodes.len())
            .field("depth", &self.depth())
            .finish_non_exhaustive()
    }
}

/// Total order on tiles: subsampling, then row-major position, then payload.
pub(crate) fn tile_order(a: &Tile, b: &Tile) -> std::cmp::Ordering {
    let (ra, rb) = (a.region(), b.region());
    a.subsampling()
        .cmp(&b.subsampling())
        .then(ra.min_y.cmp(&rb.min_y))
        .then(ra.min_x.cmp(&rb.min_x))
        .then(ra.max_y.cmp(&rb.max_y))
        .then(ra.max_x.cmp(&rb.max_x))
        .then_with(|| a.payload().cmp(b.payload()))
}

/// Cell lookup for one level.
///
/// Cells aligned on the level's dominant tile size are found by hashing their grid
/// position; any other cell is scanned.
struct LevelGrid {
    origin_x: i64,
    origin_y: i64,
    cell_w: i64,
    cell_h: i64,
    cells: HashMap<(i64, i64), usize>,
    irregular: Vec<usize>,
}

impl LevelGrid {
    fn new(regions: &[Region]) -> Self {
        let origin_x = regions.iter().map(|r| r.min_x).min().unwrap_or(0);
        let origin_y = regions.iter().map(|r| r.min_y).min().unwrap_or(0);
        let mut sizes: BTreeMap<(i64, i64), usize> = BTreeMap::new();
        for r in regions {
            *sizes.entry((r.width(), r.height())).or_default() += 1;
        }
        let mut dominant = (1, 1);
        let mut best = 0;
        for (size, count) in sizes {
            if count > best {
                dominant = size;
                best = count;
            }
        }
        let (cell_w, cell_h) = dominant;
        let mut grid = Self {
            origin_x,
            origin_y,
            cell_w,
            cell_h,
            cells: HashMap::with_capacity(regions.len()),
            irregular: Vec::new(),
        };
        for (i, r) in regions.iter().enumerate() {
            let dx = r.min_x - origin_x;
            let dy = r.min_y - origin_y;
            let aligned = dx % cell_w == 0
                && dy % cell_h == 0
                && r.width() <= cell_w
                && r.height() <= cell_h;
            match grid.cells.entry((dx.div_euclid(cell_w), dy.div_euclid(cell_h))) {
                Entry::Vacant(slot) if aligned => {
                    slot.insert(i);
                }
                _ => grid.irregular.push(i),
            }
        }
        grid
    }

    /// Index of a cell containing `bounds`.
    fn find(&self, regions: &[Region], bounds: &Region) -> Option<usize> {
        if bounds.is_empty() {
            return None;
        }
        let key = (
            div_floor(bounds.min_x - self.origin_x, self.cell_w),
            div_floor(bounds.min_y - self.origin_y, self.cell_h),
        );
        if let Some(&i) = self.cells.get(&key)
            && regions[i].contains(bounds)
        {
            return Some(i);
        }
        self.irregular
            .iter()
            .copied()
            .find(|&i| regions[i].contains(bounds))
    }
}

//! Directed acyclic graph used to order reconciliation actions.
//!
//! Vertices live in a dense arena and are addressed by [`VertexId`] handles
//! assigned at insertion time. Identity is the handle, never the payload: adding
//! two equal payloads yields two distinct vertices. Edges are stored as handle
//! pairs in an ordered set, so a pair can only be stored once.
//!
//! A graph is built once per planning pass, validated, walked, and dropped.
//! There is no internal locking; callers that plan in parallel build disjoint
//! graphs.

use std::collections::BTreeSet;
use std::fmt;

/// Stable handle of a vertex inside one [`Dag`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexId(usize);

impl VertexId {
    /// Position of the vertex in the arena.
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// An ordered pair: `from` is visited before `to` in forward order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Edge {
    pub from: VertexId,
    pub to: VertexId,
}

impl Edge {
    pub fn new(from: VertexId, to: VertexId) -> Self {
        Self { from, to }
    }
}

/// Structural violations that block a walk.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("no single root found ({roots} vertices without incoming edges)")]
    NoSingleRoot { roots: usize },
    #[error("self-cycle found: {0}")]
    SelfLoop(VertexId),
    #[error("cycle found through {0}")]
    Cycle(VertexId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Per-slot adjacency lists, built once per validation or walk.
struct Adjacency {
    incoming: Vec<Vec<usize>>,
    outgoing: Vec<Vec<usize>>,
}

/// A set of unique vertices and a deduplicated set of edges between them.
#[derive(Debug, Clone)]
pub struct Dag<V> {
    /// Removed vertices leave a `None` so existing handles never get reused.
    slots: Vec<Option<V>>,
    edges: BTreeSet<Edge>,
}

impl<V> Default for Dag<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Dag<V> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            edges: BTreeSet::new(),
        }
    }

    /// Insert a payload and return its handle.
    pub fn add_vertex(&mut self, payload: V) -> VertexId {
        self.slots.push(Some(payload));
        VertexId(self.slots.len() - 1)
    }

    /// Whether `id` names a live vertex of this graph.
    pub fn contains(&self, id: VertexId) -> bool {
        self.slots.get(id.0).is_some_and(Option::is_some)
    }

    /// Delete a vertex together with every edge that starts or ends at it.
    /// Unknown or already removed handles are a no-op.
    pub fn remove_vertex(&mut self, id: VertexId) -> Option<V> {
        let payload = self.slots.get_mut(id.0)?.take()?;
        self.edges.retain(|e| e.from != id && e.to != id);
        Some(payload)
    }

    pub fn vertex(&self, id: VertexId) -> Option<&V> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    pub fn vertex_mut(&mut self, id: VertexId) -> Option<&mut V> {
        self.slots.get_mut(id.0).and_then(Option::as_mut)
    }

    /// Live vertex handles in insertion order.
    pub fn vertices(&self) -> impl Iterator<Item = VertexId> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(i, _)| VertexId(i))
    }

    /// Live vertices with their payloads, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (VertexId, &V)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|v| (VertexId(i), v)))
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn edges(&self) -> impl Iterator<Item = Edge> + '_ {
        self.edges.iter().copied()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn has_edge(&self, from: VertexId, to: VertexId) -> bool {
        self.edges.contains(&Edge::new(from, to))
    }

    /// Store `edge` unless an edge with the same endpoints already exists.
    /// Returns false without mutating when either endpoint is not a live vertex.
    pub fn add_edge(&mut self, edge: Edge) -> bool {
        if !self.contains(edge.from) || !self.contains(edge.to) {
            return false;
        }
        self.edges.insert(edge);
        true
    }

    /// Connect `from` to `to`; see [`Dag::add_edge`].
    pub fn connect(&mut self, from: VertexId, to: VertexId) -> bool {
        self.add_edge(Edge::new(from, to))
    }

    /// Remove the edge with `edge`'s endpoints. Returns whether one was stored.
    pub fn remove_edge(&mut self, edge: Edge) -> bool {
        self.edges.remove(&edge)
    }

    /// All vertices without incoming edges, in insertion order.
    pub fn roots(&self) -> Vec<VertexId> {
        let mut has_incoming = vec![false; self.slots.len()];
        for edge in &self.edges {
            has_incoming[edge.to.0] = true;
        }
        self.vertices().filter(|id| !has_incoming[id.0]).collect()
    }

    /// The unique vertex without incoming edges, if exactly one exists.
    pub fn root(&self) -> Option<VertexId> {
        match self.roots().as_slice() {
            [root] => Some(*root),
            _ => None,
        }
    }

    /// Check single root, then self-loops, then longer cycles.
    pub fn validate(&self) -> Result<(), GraphError> {
        let roots = self.roots();
        if roots.len() != 1 {
            return Err(GraphError::NoSingleRoot { roots: roots.len() });
        }

        if let Some(edge) = self.edges.iter().find(|e| e.from == e.to) {
            return Err(GraphError::SelfLoop(edge.from));
        }

        match self.find_cycle(&self.adjacency()) {
            Some(at) => Err(GraphError::Cycle(at)),
            None => Ok(()),
        }
    }

    /// Validate and return the vertex order of a forward (producers first) or
    /// reverse (consumers first) walk. Only the partial order given by edges is
    /// meaningful; unconstrained vertices may appear in any relative order.
    pub fn topological_order(&self, reverse: bool) -> Result<Vec<VertexId>, GraphError> {
        self.validate()?;
        let adjacency = self.adjacency();
        let lists = if reverse {
            &adjacency.outgoing
        } else {
            &adjacency.incoming
        };
        Ok(self.post_order(lists))
    }

    /// Visit every vertex in forward topological order, stopping at the first
    /// error returned by `walk`. Structural errors are raised before any visit.
    pub fn walk_topo_order<E, F>(&self, walk: F) -> Result<(), E>
    where
        E: From<GraphError>,
        F: FnMut(VertexId, &V) -> Result<(), E>,
    {
        self.walk(false, walk)
    }

    /// Like [`Dag::walk_topo_order`], consumers before producers.
    pub fn walk_reverse_topo_order<E, F>(&self, walk: F) -> Result<(), E>
    where
        E: From<GraphError>,
        F: FnMut(VertexId, &V) -> Result<(), E>,
    {
        self.walk(true, walk)
    }

    /// Forward walk with mutable access to each payload.
    pub fn walk_topo_order_mut<E, F>(&mut self, walk: F) -> Result<(), E>
    where
        E: From<GraphError>,
        F: FnMut(VertexId, &mut V) -> Result<(), E>,
    {
        self.walk_mut(false, walk)
    }

    /// Reverse walk with mutable access to each payload.
    pub fn walk_reverse_topo_order_mut<E, F>(&mut self, walk: F) -> Result<(), E>
    where
        E: From<GraphError>,
        F: FnMut(VertexId, &mut V) -> Result<(), E>,
    {
        self.walk_mut(true, walk)
    }

    fn walk<E, F>(&self, reverse: bool, mut walk: F) -> Result<(), E>
    where
        E: From<GraphError>,
        F: FnMut(VertexId, &V) -> Result<(), E>,
    {
        for id in self.topological_order(reverse)? {
            if let Some(payload) = self.vertex(id) {
                walk(id, payload)?;
            }
        }
        Ok(())
    }

    fn walk_mut<E, F>(&mut self, reverse: bool, mut walk: F) -> Result<(), E>
    where
        E: From<GraphError>,
        F: FnMut(VertexId, &mut V) -> Result<(), E>,
    {
        for id in self.topological_order(reverse)? {
            if let Some(payload) = self.vertex_mut(id) {
                walk(id, payload)?;
            }
        }
        Ok(())
    }

    fn adjacency(&self) -> Adjacency {
        let mut adjacency = Adjacency {
            incoming: vec![Vec::new(); self.slots.len()],
            outgoing: vec![Vec::new(); self.slots.len()],
        };
        for edge in &self.edges {
            adjacency.outgoing[edge.from.0].push(edge.to.0);
            adjacency.incoming[edge.to.0].push(edge.from.0);
        }
        adjacency
    }

    /// Three-color DFS over outgoing edges with an explicit stack. Reaching a
    /// gray vertex means it is on the current path, which closes a cycle.
    fn find_cycle(&self, adjacency: &Adjacency) -> Option<VertexId> {
        let mut color = vec![Color::White; self.slots.len()];
        let mut stack: Vec<(usize, usize)> = Vec::new();

        for start in self.vertices().map(VertexId::index) {
            if color[start] != Color::White {
                continue;
            }
            color[start] = Color::Gray;
            stack.push((start, 0));

            while let Some(frame) = stack.last_mut() {
                let (v, next) = *frame;
                if let Some(&w) = adjacency.outgoing[v].get(next) {
                    frame.1 += 1;
                    match color[w] {
                        Color::White => {
                            color[w] = Color::Gray;
                            stack.push((w, 0));
                        }
                        Color::Gray => return Some(VertexId(w)),
                        Color::Black => {}
                    }
                } else {
                    color[v] = Color::Black;
                    stack.pop();
                }
            }
        }
        None
    }

    /// Post-order DFS over `lists`. Assumes the graph has been validated.
    fn post_order(&self, lists: &[Vec<usize>]) -> Vec<VertexId> {
        let mut walked = vec![false; self.slots.len()];
        let mut order = Vec::with_capacity(self.len());
        let mut stack: Vec<(usize, usize)> = Vec::new();

        for start in self.vertices().map(VertexId::index) {
            if walked[start] {
                continue;
            }
            walked[start] = true;
            stack.push((start, 0));

            while let Some(frame) = stack.last_mut() {
                let (v, next) = *frame;
                if let Some(&w) = lists[v].get(next) {
                    frame.1 += 1;
                    if !walked[w] {
                        walked[w] = true;
                        stack.push((w, 0));
                    }
                } else {
                    stack.pop();
                    order.push(VertexId(v));
                }
            }
        }
        order
    }
}

/// Renders the reverse topological order as `|->a->b`, or `->err` when the
/// graph does not validate.
impl<V: fmt::Display> fmt::Display for Dag<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Ok(order) = self.topological_order(true) else {
            return f.write_str("->err");
        };
        f.write_str("|")?;
        for id in order {
            if let Some(payload) = self.vertex(id) {
                write!(f, "->{payload}")?;
            }
        }
        Ok(())
    }
}

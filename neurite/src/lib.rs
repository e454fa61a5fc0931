pub mod channel;
pub mod render;
pub mod solver;

// SoA, CSR adjacency
pub struct Morphology {
    /// Neighbors of node i live in neighbors[neighbor_offset[i]..neighbor_offset[i+1]]
    neighbor_offset: Vec<u32>,
    /// Flat undirected adjacency; every edge appears once per endpoint
    neighbors: Vec<u32>,
    /// Open terminals (dendrite caps) subject to per-tick leak
    boundary: Vec<bool>,
}

impl Morphology {
    /// Build from per-node neighbor lists, as supplied by a geometry loader.
    /// Neighbor order is kept as given; it is part of the deterministic
    /// sweep order downstream.
    pub fn from_adjacency(adjacency: Vec<Vec<u32>>, boundary: Vec<bool>) -> Self {
        debug_assert_eq!(adjacency.len(), boundary.len());

        let mut neighbor_offset = Vec::with_capacity(adjacency.len() + 1);
        let mut neighbors = Vec::new();

        // CSR prefix
        neighbor_offset.push(0);
        for list in &adjacency {
            neighbors.extend_from_slice(list);
            neighbor_offset.push(neighbors.len() as u32);
        }

        Self {
            neighbor_offset,
            neighbors,
            boundary,
        }
    }

    /// Build an unbranched cable: 0 - 1 - 2 - ... - (n-1).
    /// Both ends are open terminals.
    pub fn chain(nodes: usize) -> Self {
        let mut neighbor_offset = Vec::with_capacity(nodes + 1);
        let mut neighbors = Vec::with_capacity(2 * nodes.saturating_sub(1));
        let mut boundary = vec![false; nodes];

        neighbor_offset.push(0);
        for i in 0..nodes {
            if i > 0 {
                neighbors.push((i - 1) as u32);
            }
            if i + 1 < nodes {
                neighbors.push((i + 1) as u32);
            }
            neighbor_offset.push(neighbors.len() as u32);
        }

        if nodes > 0 {
            boundary[0] = true;
            boundary[nodes - 1] = true;
        }

        Self {
            neighbor_offset,
            neighbors,
            boundary,
        }
    }

    /// Build a trunk of `trunk` compartments that splits into two branches of
    /// `branch` compartments each. The soma end of the trunk and both branch
    /// tips are open terminals.
    ///
    /// Node index layout: trunk is 0..trunk, branch A is
    /// trunk..trunk+branch, branch B is trunk+branch..trunk+2*branch.
    pub fn bifurcation(trunk: usize, branch: usize) -> Self {
        assert!(trunk > 0, "bifurcation needs a non-empty trunk");

        let n = trunk + 2 * branch;
        let mut adjacency = vec![Vec::new(); n];
        let mut boundary = vec![false; n];

        let mut link = |a: usize, b: usize| {
            adjacency[a].push(b as u32);
            adjacency[b].push(a as u32);
        };

        for i in 1..trunk {
            link(i - 1, i);
        }
        let fork = trunk - 1;
        for b in 0..2 {
            let base = trunk + b * branch;
            for i in 0..branch {
                let prev = if i == 0 { fork } else { base + i - 1 };
                link(prev, base + i);
            }
            if branch > 0 {
                boundary[base + branch - 1] = true;
            }
        }
        boundary[0] = true;

        Self::from_adjacency(adjacency, boundary)
    }

    pub fn node_count(&self) -> usize {
        self.boundary.len()
    }

    pub fn neighbors(&self, node: usize) -> &[u32] {
        let start = self.neighbor_offset[node] as usize;
        let end = self.neighbor_offset[node + 1] as usize;
        &self.neighbors[start..end]
    }

    pub fn is_boundary(&self, node: usize) -> bool {
        self.boundary[node]
    }

    pub fn boundary_nodes(&self) -> impl Iterator<Item = usize> + '_ {
        self.boundary
            .iter()
            .enumerate()
            .filter_map(|(i, &b)| b.then_some(i))
    }

    /// Render this morphology using Graphviz' **neato** engine and return a
    /// PNG in-memory. Requires a `dot`/Graphviz installation.
    pub fn to_neato_png(&self) -> std::io::Result<Vec<u8>> {
        render::to_neato_png(self)
    }
}

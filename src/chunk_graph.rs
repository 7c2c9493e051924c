use crate::best_graph::BestOverlapGraph;
use crate::types::*;
use fxhash::FxHashSet;

/// Which best-edges are safe to chain without branching, plus a seed
/// ordering: fragments with the longest unambiguous neighborhoods first.
#[derive(Debug, Clone, Default)]
pub struct ChunkGraph {
    path_len: Vec<u32>,
    frag_order: Vec<FragId>,
    cursor: usize,
}

/// The unambiguity test: the edge's target end must have in-degree
/// exactly one, and the target's own best edge at that end must point
/// straight back.
pub fn is_chunkable(g: &BestOverlapGraph, id: FragId, end: End) -> bool {
    let e = g.best_edge(id, end);
    if e.is_null() {
        return false;
    }
    if g.in_degree(e.frag_id, e.end) != 1 {
        return false;
    }
    let back = g.best_edge(e.frag_id, e.end);
    back.frag_id == id && back.end == end
}

/// Permissive variant: follow any best edge, reciprocal or not.
pub fn follows_best(g: &BestOverlapGraph, id: FragId, end: End) -> bool {
    !g.best_edge(id, end).is_null()
}

impl ChunkGraph {
    pub fn build(g: &BestOverlapGraph, config: &PipelineConfig) -> ChunkGraph {
        let n = g.num_fragments();
        let mut path_len = vec![0u32; n as usize + 1];
        let mut frag_order = Vec::with_capacity(n as usize);
        for id in 1..=n {
            if g.is_contained(id) {
                continue;
            }
            let c5 = chain_count(g, id, End::Five, config.chunk_walk_limit);
            let c3 = chain_count(g, id, End::Three, config.chunk_walk_limit);
            path_len[id as usize] = c5.min(c3);
            frag_order.push(id);
        }
        frag_order.sort_by(|a, b| {
            path_len[*b as usize]
                .cmp(&path_len[*a as usize])
                .then(a.cmp(b))
        });
        log::info!(
            "Chunk graph ranked {} free fragments (longest chain {})",
            frag_order.len(),
            frag_order
                .first()
                .map(|f| path_len[*f as usize])
                .unwrap_or(0)
        );
        ChunkGraph { path_len, frag_order, cursor: 0 }
    }

    #[inline]
    pub fn chunk_length(&self, id: FragId) -> u32 {
        self.path_len[id as usize]
    }

    /// Seed cursor: fragments in descending chunk-length order, each
    /// returned once.
    pub fn next_frag_by_chunk_length(&mut self) -> Option<FragId> {
        let r = self.frag_order.get(self.cursor).copied();
        self.cursor += 1;
        r
    }

    pub fn ranking(&self) -> &[FragId] {
        &self.frag_order
    }
}

/// Distinct fragments reachable by chunkable edges in one direction,
/// bounded so a pathological graph cannot stall the ranking.
fn chain_count(g: &BestOverlapGraph, id: FragId, end: End, limit: usize) -> u32 {
    let mut visited = FxHashSet::default();
    visited.insert(id);
    let mut cur = id;
    let mut cur_end = end;
    let mut count = 1u32;
    for _ in 0..limit {
        if !is_chunkable(g, cur, cur_end) {
            break;
        }
        let e = g.best_edge(cur, cur_end);
        if !visited.insert(e.frag_id) {
            break;
        }
        count += 1;
        cur = e.frag_id;
        cur_end = e.end.opposite();
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FragmentInfo, Overlap, PipelineConfig};

    fn chain_graph(n: u32) -> (BestOverlapGraph, FragmentInfo) {
        // n fragments of 100bp, each overlapping the next by 20bp
        let mut fi = FragmentInfo::new();
        for _ in 0..n {
            fi.push(100, 0, 1);
        }
        let mut ovls = Vec::new();
        for a in 1..=n {
            if a > 1 {
                ovls.push(Overlap { a_id: a, b_id: a - 1, a_hang: -80, b_hang: -80, flipped: false, erate: 0.01 });
            }
            if a < n {
                ovls.push(Overlap { a_id: a, b_id: a + 1, a_hang: 80, b_hang: 80, flipped: false, erate: 0.01 });
            }
        }
        let g = BestOverlapGraph::build(&ovls, &fi, &PipelineConfig::default());
        (g, fi)
    }

    #[test]
    fn test_chain_is_chunkable() {
        let (g, _) = chain_graph(4);
        assert!(is_chunkable(&g, 1, End::Three));
        assert!(is_chunkable(&g, 2, End::Three));
        assert!(is_chunkable(&g, 2, End::Five));
        assert!(!is_chunkable(&g, 1, End::Five));
        assert!(!is_chunkable(&g, 4, End::Three));
    }

    #[test]
    fn test_ranking_prefers_interior() {
        let (g, _) = chain_graph(5);
        let cg = ChunkGraph::build(&g, &PipelineConfig::default());
        // middle fragment sees the longest chain in both directions
        assert_eq!(cg.ranking()[0], 3);
        // ends see only themselves in one direction
        assert_eq!(cg.chunk_length(1), 1);
        assert_eq!(cg.chunk_length(5), 1);
        assert_eq!(cg.chunk_length(3), 3);
    }

    #[test]
    fn test_ranking_idempotent() {
        let (g, _) = chain_graph(6);
        let config = PipelineConfig::default();
        let a = ChunkGraph::build(&g, &config);
        let b = ChunkGraph::build(&g, &config);
        assert_eq!(a.ranking(), b.ranking());
    }

    #[test]
    fn test_cursor_exhausts() {
        let (g, _) = chain_graph(3);
        let mut cg = ChunkGraph::build(&g, &PipelineConfig::default());
        let mut seen = Vec::new();
        while let Some(f) = cg.next_frag_by_chunk_length() {
            seen.push(f);
        }
        assert_eq!(seen.len(), 3);
    }
}

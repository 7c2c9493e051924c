use crate::types::*;
use fxhash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::constants::MISMATCH_LIMIT;

/// The single best dovetail edge out of one fragment end.
/// `frag_id == NULL_FRAG` means no edge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct BestEdgeOverlap {
    pub frag_id: FragId,
    pub end: End,
    pub a_hang: i32,
    pub b_hang: i32,
}

impl BestEdgeOverlap {
    #[inline]
    pub fn is_null(&self) -> bool {
        self.frag_id == NULL_FRAG
    }

    /// The same overlap, seen from the target fragment's side: an edge
    /// stored on (target, self.end) pointing back at (source, source_end).
    /// Hangs swap when the two ends match and negate when they differ.
    pub fn reversed(&self, source: FragId, source_end: End) -> BestEdgeOverlap {
        if self.end == source_end {
            BestEdgeOverlap {
                frag_id: source,
                end: source_end,
                a_hang: self.b_hang,
                b_hang: self.a_hang,
            }
        } else {
            BestEdgeOverlap {
                frag_id: source,
                end: source_end,
                a_hang: -self.a_hang,
                b_hang: -self.b_hang,
            }
        }
    }
}

/// The single best container for one contained fragment. Hangs are in
/// the container's frame: [a_hang, container_len + b_hang] is the
/// containee's interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct BestContainment {
    pub container: FragId,
    pub score: u64,
    pub same_orientation: bool,
    pub a_hang: i32,
    pub b_hang: i32,
    pub is_placed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BestOverlapGraph {
    best5: Vec<BestEdgeOverlap>,
    best3: Vec<BestEdgeOverlap>,
    in_degree5: Vec<u32>,
    in_degree3: Vec<u32>,
    contains: FxHashMap<FragId, BestContainment>,
    /// Same-orientation contain-to-contain adjacency, kept for mate
    /// bookkeeping after contained fragments lose their dovetail edges.
    pub contain_edges: FxHashMap<FragId, Vec<FragId>>,
}

impl BestOverlapGraph {
    /// Two passes over the overlap stream: containments first (they take
    /// ownership of a fragment and suppress its dovetail edges), then
    /// dovetail best edges with in-degree accounting.
    pub fn build(overlaps: &[Overlap], fi: &FragmentInfo, config: &PipelineConfig) -> BestOverlapGraph {
        let n = fi.num_fragments() as usize + 1;
        let mut g = BestOverlapGraph {
            best5: vec![BestEdgeOverlap::default(); n],
            best3: vec![BestEdgeOverlap::default(); n],
            in_degree5: vec![0; n],
            in_degree3: vec![0; n],
            contains: FxHashMap::default(),
            contain_edges: FxHashMap::default(),
        };

        let mut contain_score: FxHashMap<FragId, u64> = FxHashMap::default();
        for ovl in overlaps {
            if g.is_bad_quality(ovl, fi, config) {
                continue;
            }
            g.score_containment(ovl, fi, config, &mut contain_score);
        }
        log::info!("Containment pass found {} contained fragments", g.contains.len());

        let mut score5 = vec![0u64; n];
        let mut score3 = vec![0u64; n];
        let mut len5 = vec![0i32; n];
        let mut len3 = vec![0i32; n];
        let mut last_a = NULL_FRAG;
        for ovl in overlaps {
            if ovl.a_id != last_a {
                g.flush_in_degree(last_a);
                last_a = ovl.a_id;
            }
            if g.is_bad_quality(ovl, fi, config) {
                continue;
            }
            g.score_edge(ovl, fi, config, &mut score5, &mut score3, &mut len5, &mut len3);
        }
        g.flush_in_degree(last_a);

        // A contained fragment never keeps dovetail edges.
        for id in g.contains.keys() {
            g.best5[*id as usize] = BestEdgeOverlap::default();
            g.best3[*id as usize] = BestEdgeOverlap::default();
        }

        g.resolve_transitive_containments();
        g
    }

    /// Error-rate gate applied before either scoring pass. High-error
    /// overlaps still pass if the absolute mismatch count is tiny.
    fn is_bad_quality(&self, ovl: &Overlap, fi: &FragmentInfo, config: &PipelineConfig) -> bool {
        if (ovl.erate as f64) <= config.erate_cutoff {
            return false;
        }
        let olen = ovl.length(fi).max(0) as f64;
        olen * ovl.erate as f64 > MISMATCH_LIMIT
    }

    /// Containment candidates are records where A is contained in B; the
    /// stream reports both directions, so every containee sees its own
    /// record with itself as A.
    fn score_containment(
        &mut self,
        ovl: &Overlap,
        fi: &FragmentInfo,
        config: &PipelineConfig,
        contain_score: &mut FxHashMap<FragId, u64>,
    ) {
        if !ovl.b_contains_a() {
            return;
        }
        // Exact duplicates: keep the lower id as the container.
        if ovl.a_hang == 0 && ovl.b_hang == 0 && ovl.a_id < ovl.b_id {
            return;
        }
        let olen = ovl.length(fi);
        let shorter = fi.length(ovl.a_id).min(fi.length(ovl.b_id)) as i32;
        if olen + config.min_overlap_len < shorter {
            // Spur, not a containment.
            return;
        }
        let score = config.score.score(ovl, fi);
        if score == 0 {
            return;
        }
        let old = contain_score.get(&ovl.a_id).copied().unwrap_or(0);
        if score <= old {
            return;
        }
        contain_score.insert(ovl.a_id, score);
        let (a_hang, b_hang) = if ovl.flipped {
            (ovl.b_hang, ovl.a_hang)
        } else {
            (-ovl.a_hang, -ovl.b_hang)
        };
        self.contains.insert(
            ovl.a_id,
            BestContainment {
                container: ovl.b_id,
                score,
                same_orientation: !ovl.flipped,
                a_hang,
                b_hang,
                is_placed: false,
            },
        );
    }

    fn score_edge(
        &mut self,
        ovl: &Overlap,
        fi: &FragmentInfo,
        config: &PipelineConfig,
        score5: &mut [u64],
        score3: &mut [u64],
        len5: &mut [i32],
        len3: &mut [i32],
    ) {
        if !ovl.is_dovetail() {
            return;
        }
        let a_in = self.contains.contains_key(&ovl.a_id);
        let b_in = self.contains.contains_key(&ovl.b_id);
        if a_in || b_in {
            if a_in && b_in && !ovl.flipped {
                self.contain_edges.entry(ovl.a_id).or_default().push(ovl.b_id);
            }
            return;
        }
        let score = config.score.score(ovl, fi);
        if score == 0 {
            return;
        }
        let olen = ovl.length(fi);
        let a = ovl.a_id as usize;
        let (slot, sscore, slen) = match ovl.a_end() {
            End::Five => (&mut self.best5[a], &mut score5[a], &mut len5[a]),
            End::Three => (&mut self.best3[a], &mut score3[a], &mut len3[a]),
        };
        if score > *sscore || (score == *sscore && olen > *slen) {
            *slot = BestEdgeOverlap {
                frag_id: ovl.b_id,
                end: ovl.b_end(),
                a_hang: ovl.a_hang,
                b_hang: ovl.b_hang,
            };
            *sscore = score;
            *slen = olen;
        }
    }

    /// Records arrive grouped by A id; once the group for `a` is over,
    /// its best edges are final and the targets' in-degrees can be bumped.
    fn flush_in_degree(&mut self, a: FragId) {
        if a == NULL_FRAG {
            return;
        }
        for e in [self.best5[a as usize], self.best3[a as usize]] {
            if e.is_null() {
                continue;
            }
            match e.end {
                End::Five => self.in_degree5[e.frag_id as usize] += 1,
                End::Three => self.in_degree3[e.frag_id as usize] += 1,
            }
        }
    }

    /// Collapse container chains: every containee ends up pointing at a
    /// root container with hangs folded through each hop. A chain that
    /// returns to the containee itself is a true cycle and the containee's
    /// entry is dropped; a chain that revisits an earlier ancestor
    /// re-points the containee there and evicts the intermediate entry.
    fn resolve_transitive_containments(&mut self) {
        let mut ids: Vec<FragId> = self.contains.keys().copied().collect();
        ids.sort_unstable();
        for c in ids {
            let Some(start) = self.contains.get(&c).copied() else {
                continue;
            };
            let mut cur = start.container;
            let mut fold = (start.a_hang, start.b_hang, start.same_orientation);
            let mut visited: FxHashMap<FragId, (i32, i32, bool)> = FxHashMap::default();
            visited.insert(cur, fold);
            let mut dropped = false;
            loop {
                let Some(outer) = self.contains.get(&cur).copied() else {
                    break;
                };
                if outer.container == c {
                    log::debug!("containment cycle through fragment {}, entry removed", c);
                    self.contains.remove(&c);
                    dropped = true;
                    break;
                }
                let next_fold = fold_containment(fold, &outer);
                if let Some(&at_ancestor) = visited.get(&outer.container) {
                    self.contains.remove(&cur);
                    cur = outer.container;
                    fold = at_ancestor;
                    break;
                }
                visited.insert(outer.container, next_fold);
                fold = next_fold;
                cur = outer.container;
            }
            if !dropped {
                if let Some(bc) = self.contains.get_mut(&c) {
                    bc.container = cur;
                    bc.a_hang = fold.0;
                    bc.b_hang = fold.1;
                    bc.same_orientation = fold.2;
                }
            }
        }
    }

    #[inline]
    pub fn num_fragments(&self) -> u32 {
        (self.best5.len() - 1) as u32
    }

    #[inline]
    pub fn best_edge(&self, id: FragId, end: End) -> &BestEdgeOverlap {
        match end {
            End::Five => &self.best5[id as usize],
            End::Three => &self.best3[id as usize],
        }
    }

    #[inline]
    pub fn in_degree(&self, id: FragId, end: End) -> u32 {
        match end {
            End::Five => self.in_degree5[id as usize],
            End::Three => self.in_degree3[id as usize],
        }
    }

    #[inline]
    pub fn is_contained(&self, id: FragId) -> bool {
        self.contains.contains_key(&id)
    }

    #[inline]
    pub fn containment(&self, id: FragId) -> Option<&BestContainment> {
        self.contains.get(&id)
    }

    pub fn set_placed(&mut self, id: FragId) {
        if let Some(bc) = self.contains.get_mut(&id) {
            bc.is_placed = true;
        }
    }

    pub fn containments(&self) -> impl Iterator<Item = (&FragId, &BestContainment)> {
        self.contains.iter()
    }

    pub fn num_contained(&self) -> usize {
        self.contains.len()
    }

    /// TSV dump of every best edge and containment, for inspection.
    pub fn report_best_edges(&self, path: &Path) -> io::Result<()> {
        let mut w = BufWriter::new(File::create(path)?);
        writeln!(w, "#frag\tkind\ttarget\tend\ta_hang\tb_hang")?;
        for id in 1..=self.num_fragments() {
            if let Some(bc) = self.contains.get(&id) {
                writeln!(
                    w,
                    "{}\tcontained\t{}\t{}\t{}\t{}",
                    id,
                    bc.container,
                    if bc.same_orientation { "N" } else { "I" },
                    bc.a_hang,
                    bc.b_hang
                )?;
                continue;
            }
            for (end, tag) in [(End::Five, "5"), (End::Three, "3")] {
                let e = self.best_edge(id, end);
                if e.is_null() {
                    continue;
                }
                writeln!(
                    w,
                    "{}\tbest{}\t{}\t{}\t{}\t{}",
                    id,
                    tag,
                    e.frag_id,
                    if e.end == End::Five { "5" } else { "3" },
                    e.a_hang,
                    e.b_hang
                )?;
            }
        }
        Ok(())
    }
}

/// Placement of a fragment inside its container, folded through the
/// container's own placement inside a grandparent.
fn fold_containment(inner: (i32, i32, bool), outer: &BestContainment) -> (i32, i32, bool) {
    let (ah, bh, same) = inner;
    if outer.same_orientation {
        (outer.a_hang + ah, outer.b_hang + bh, same)
    } else {
        (outer.a_hang - bh, outer.b_hang - ah, !same)
    }
}

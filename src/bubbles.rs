use fxhash::FxHashMap;
use rust_lapper::{Interval, Lapper};

use crate::best_graph::{BestEdgeOverlap, BestOverlapGraph};
use crate::constants::*;
use crate::types::*;
use crate::unitig::PlacedFragment;
use crate::unitig_graph::UnitigGraph;

/// A mate-bubble candidate: a small unitig whose external mates pile up
/// on one larger unitig. Reported, not acted on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MateBubble {
    pub bubble: TigId,
    pub target: TigId,
    pub mate_count: u32,
}

impl UnitigGraph {
    /// Fold short alternate-path unitigs into the unitig their best
    /// edges agree on. Each candidate passes three gates before any
    /// mutation: edge-consensus election, span/length validation of the
    /// projected placements, and per-base overlap coverage against the
    /// landing region.
    pub fn pop_intersection_bubbles(
        &mut self,
        bog: &BestOverlapGraph,
        fi: &FragmentInfo,
        overlaps: &[Overlap],
        oi: &OverlapIndex,
        config: &PipelineConfig,
    ) {
        let mut popped = 0usize;
        let mut examined = 0usize;
        for tid in self.live_ids() {
            let nfrags = match self.tig(tid) {
                Some(t) => t.num_frags(),
                None => continue,
            };
            if nfrags == 0 || nfrags > config.bubble_max_frags {
                continue;
            }
            examined += 1;
            let Some(target) = self.elect_bubble_target(tid, bog) else {
                continue;
            };
            let Some(region) = self.validate_bubble_placement(tid, target, bog, fi) else {
                continue;
            };
            if !self.bubble_coverage_ok(tid, target, region, overlaps, oi, fi, config) {
                continue;
            }
            if self.merge_bubble(tid, target, bog, fi) {
                popped += 1;
            }
        }
        log::info!(
            "Popped {} of {} small-unitig bubble candidates",
            popped,
            examined
        );
    }

    /// Tally which unitig the candidate's best edges point into. Null
    /// edges (spurs), edges back into the candidate, and contained
    /// fragments are excused; more than a couple of votes for a second
    /// unitig means this is a real branch, not a bubble.
    fn elect_bubble_target(&self, tid: TigId, bog: &BestOverlapGraph) -> Option<TigId> {
        let tig = self.tig(tid)?;
        let mut votes: FxHashMap<TigId, u32> = FxHashMap::default();
        for pf in &tig.path {
            if pf.contained {
                continue;
            }
            for end in [End::Five, End::Three] {
                let e = bog.best_edge(pf.id, end);
                if e.is_null() {
                    continue;
                }
                let other = self.unitig_of(e.frag_id);
                if other == NULL_TIG || other == tid {
                    continue;
                }
                *votes.entry(other).or_insert(0) += 1;
            }
        }
        let (&winner, &won) = votes.iter().max_by_key(|&(t, v)| (*v, std::cmp::Reverse(*t)))?;
        let conflicts: u32 = votes.values().sum::<u32>() - won;
        if won == 0 || conflicts as usize > BUBBLE_CONFLICT_SLACK {
            return None;
        }
        Some(winner)
    }

    /// Project every candidate fragment into the target by its best
    /// edge and check the result is shaped like the candidate: the
    /// landed span within 25% of the candidate's own length, and no
    /// single fragment stretched past 1.25x its read length. Returns
    /// the landing interval on the target.
    fn validate_bubble_placement(
        &self,
        tid: TigId,
        target_tid: TigId,
        bog: &BestOverlapGraph,
        fi: &FragmentInfo,
    ) -> Option<(i32, i32)> {
        let tig = self.tig(tid)?;
        let target = self.tig(target_tid)?;
        let mut lo = i32::MAX;
        let mut hi = i32::MIN;
        for pf in &tig.path {
            if pf.contained {
                // lands wherever its container does
                continue;
            }
            let frag_len = fi.length(pf.id) as i64;
            let mut landed = false;
            for end in [End::Five, End::Three] {
                let e = bog.best_edge(pf.id, end);
                if e.is_null() {
                    continue;
                }
                let Some(parent) = target.placed(e.frag_id) else { continue };
                let (bgn, end_pos) = raw_projection(pf.id, end, e, parent);
                let span = (end_pos - bgn).abs() as i64;
                if span as f64 > frag_len as f64 * BUBBLE_FRAG_STRETCH {
                    return None;
                }
                lo = lo.min(bgn.min(end_pos));
                hi = hi.max(bgn.max(end_pos));
                landed = true;
            }
            if !landed {
                return None;
            }
        }
        if lo >= hi {
            return None;
        }
        let bubble_len = tig.length() as f64;
        let landed_span = (hi - lo) as f64;
        if (landed_span - bubble_len).abs() > bubble_len * BUBBLE_SPAN_SLACK {
            return None;
        }
        Some((lo, hi))
    }

    /// The candidate's overlaps into target-resident fragments must
    /// blanket the landing region: at most 10% of its bases uncovered,
    /// and no gap wider than a minimum overlap.
    fn bubble_coverage_ok(
        &self,
        tid: TigId,
        target_tid: TigId,
        region: (i32, i32),
        overlaps: &[Overlap],
        oi: &OverlapIndex,
        fi: &FragmentInfo,
        config: &PipelineConfig,
    ) -> bool {
        let Some(tig) = self.tig(tid) else { return false };
        let Some(target) = self.tig(target_tid) else { return false };
        let (lo, hi) = region;
        let mut intervals: Vec<Interval<u32, bool>> = Vec::new();
        for pf in &tig.path {
            for ovl in oi.overlaps_for(overlaps, pf.id) {
                if ovl.length(fi) < config.min_overlap_len {
                    continue;
                }
                let Some(other) = target.placed(ovl.b_id) else { continue };
                // credit at fragment granularity: the stretch of the
                // overlapped target fragment inside the landing region
                let s = other.min().max(lo);
                let e = other.max().min(hi);
                if e > s {
                    intervals.push(Interval {
                        start: (s - lo) as u32,
                        stop: (e - lo) as u32,
                        val: true,
                    });
                }
            }
        }
        if intervals.is_empty() {
            return false;
        }
        let mut lapper = Lapper::new(intervals);
        lapper.merge_overlaps();
        let region_len = (hi - lo) as u64;
        let mut covered = 0u64;
        let mut cursor = 0u32;
        let mut max_gap = 0u32;
        for iv in lapper.iter() {
            if iv.start > cursor {
                max_gap = max_gap.max(iv.start - cursor);
            }
            covered += (iv.stop - iv.start) as u64;
            cursor = cursor.max(iv.stop);
        }
        if (hi - lo) as u32 > cursor {
            max_gap = max_gap.max((hi - lo) as u32 - cursor);
        }
        let uncovered = region_len.saturating_sub(covered);
        uncovered as f64 <= region_len as f64 * BUBBLE_MAX_UNCOVERED_FRACTION
            && max_gap as i32 <= config.min_overlap_len
    }

    /// Move the candidate's fragments into the target, dovetails by
    /// their best edges and containees under their containers, looping
    /// until everything lands or a round makes no progress. A stalled
    /// merge keeps whatever landed and leaves the rest standing as the
    /// trimmed candidate.
    fn merge_bubble(
        &mut self,
        tid: TigId,
        target_tid: TigId,
        bog: &BestOverlapGraph,
        fi: &FragmentInfo,
    ) -> bool {
        let mut bubble = self.unitigs[tid as usize]
            .take()
            .unwrap_or_else(|| panic!("bubble unitig {} missing", tid));
        let mut target = self.unitigs[target_tid as usize]
            .take()
            .unwrap_or_else(|| panic!("bubble target unitig {} missing", target_tid));

        let mut pending: Vec<PlacedFragment> = std::mem::take(&mut bubble.path);
        loop {
            let before = pending.len();
            pending.retain(|pf| {
                if let Some(bc) = bog.containment(pf.id) {
                    if let Some(parent) = target.placed(bc.container).copied() {
                        target.add_contained_frag(pf.id, fi.length(pf.id), bc, &parent);
                        return false;
                    }
                    return true;
                }
                let e5 = *bog.best_edge(pf.id, End::Five);
                let e3 = *bog.best_edge(pf.id, End::Three);
                !target.add_and_place_frag(pf.id, fi.length(pf.id), Some(&e5), Some(&e3))
            });
            if pending.is_empty() || pending.len() == before {
                break;
            }
        }

        let complete = pending.is_empty();
        target.sort_path();
        target.normalize();
        self.unitigs[target_tid as usize] = Some(target);
        self.reclaim(target_tid);
        if complete {
            // tid stays tombstoned
            log::debug!("popped bubble unitig {} into {}", tid, target_tid);
        } else {
            log::debug!(
                "bubble merge {} -> {} stalled with {} fragment(s) left",
                tid,
                target_tid,
                pending.len()
            );
            bubble.path = pending;
            bubble.normalize();
            self.unitigs[tid as usize] = Some(bubble);
            self.reclaim(tid);
        }
        complete
    }

    /// Flag small unitigs whose off-unitig mates concentrate on one
    /// larger unitig. Diagnostic only; no merge is performed.
    pub fn find_mate_bubbles(
        &self,
        fi: &FragmentInfo,
        config: &PipelineConfig,
    ) -> Vec<MateBubble> {
        let mut found = Vec::new();
        for tid in self.live_ids() {
            let Some(tig) = self.tig(tid) else { continue };
            if tig.num_frags() > config.bubble_max_frags {
                continue;
            }
            let mut counts: FxHashMap<TigId, u32> = FxHashMap::default();
            for pf in &tig.path {
                let mate = fi.mate_id(pf.id);
                if mate == NULL_FRAG {
                    continue;
                }
                let other = self.unitig_of(mate);
                if other == NULL_TIG || other == tid {
                    continue;
                }
                *counts.entry(other).or_insert(0) += 1;
            }
            let Some((&best, &n)) = counts.iter().max_by_key(|&(t, v)| (*v, std::cmp::Reverse(*t)))
            else {
                continue;
            };
            if (n as usize) < MATE_BUBBLE_MIN_COUNT {
                continue;
            }
            let larger = self
                .tig(best)
                .map_or(false, |t| t.length() > tig.length());
            if !larger {
                continue;
            }
            log::info!(
                "mate bubble candidate: unitig {} ({} frags) -> unitig {} ({} mates)",
                tid,
                tig.num_frags(),
                best,
                n
            );
            found.push(MateBubble { bubble: tid, target: best, mate_count: n });
        }
        found
    }
}

/// The landing interval of `frag` in the parent's unitig, straight from
/// the projected hangs with no length pinning. Stretch beyond the read
/// length is exactly what the bubble validator wants to see.
fn raw_projection(
    frag: FragId,
    frag_end: End,
    edge: &BestEdgeOverlap,
    parent: &PlacedFragment,
) -> (i32, i32) {
    let rev = edge.reversed(frag, frag_end);
    let same_ori = frag_end != edge.end;
    let (pa, pb) = if parent.is_reverse() {
        (parent.bgn - rev.a_hang, parent.end - rev.b_hang)
    } else {
        (parent.bgn + rev.a_hang, parent.end + rev.b_hang)
    };
    if same_ori {
        (pa, pb)
    } else {
        (pb, pa)
    }
}

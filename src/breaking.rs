use crate::best_graph::BestOverlapGraph;
use crate::types::*;
use crate::unitig::Unitig;
use crate::unitig_graph::UnitigGraph;

/// A proposed split: cut the unitig at one end of one fragment.
/// `in_size`/`in_frags` describe the intersecting unitig whose edge
/// provoked the cut.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitigBreakPoint {
    pub frag_end: FragEnd,
    pub position: (i32, i32),
    pub frags_before: u32,
    pub frags_after: u32,
    pub in_size: i64,
    pub in_frags: u32,
}

impl UnitigBreakPoint {
    pub fn is_big(&self, config: &PipelineConfig) -> bool {
        self.in_frags > config.min_break_frags && self.in_size > config.min_break_length
    }

    /// Layout coordinate of the cut end.
    fn cut_coord(&self) -> i32 {
        if self.frag_end.end == End::Five {
            self.position.0
        } else {
            self.position.1
        }
    }

    /// True when the cut is at the fragment's left-facing end in the
    /// layout, so the fragment itself lands on the right side of the
    /// split and must not be counted on the left.
    fn cuts_left_side(&self) -> bool {
        let rev = self.position.0 > self.position.1;
        (rev && self.frag_end.end == End::Three) || (!rev && self.frag_end.end == End::Five)
    }
}

impl UnitigGraph {
    /// Split unitigs wherever an internal fragment has a recorded
    /// incoming intersection; greedy layout over-extended past a branch
    /// point there.
    pub fn break_unitigs(&mut self, bog: &BestOverlapGraph, config: &PipelineConfig) {
        let mut splits = 0usize;
        for tid in self.live_ids() {
            let bps = self.compute_break_points(tid, bog);
            if bps.is_empty() {
                continue;
            }
            let filtered = {
                let tig = self.tig(tid).unwrap_or_else(|| panic!("live unitig {} missing", tid));
                filter_break_points(tig, bps, config)
            };
            if filtered.is_empty() {
                continue;
            }
            if self.apply_breaks(tid, &filtered) {
                splits += 1;
            }
        }
        log::info!("Intersection breaking split {} unitigs", splits);
    }

    /// Break points for one unitig, in path order. Only dovetail
    /// fragments can carry one; the before/after counts also only count
    /// dovetail fragments.
    pub fn compute_break_points(&self, tid: TigId, bog: &BestOverlapGraph) -> Vec<UnitigBreakPoint> {
        let tig = self.tig(tid).unwrap_or_else(|| panic!("live unitig {} missing", tid));
        let n_dove = tig.num_dovetail_frags() as u32;
        let mut bps = Vec::new();
        let mut before = 0u32;
        for pf in &tig.path {
            if pf.contained {
                continue;
            }
            if let Some(srcs) = self.unitig_intersect.get(&pf.id) {
                for &src in srcs.iter() {
                    let Some((hit_end, _)) = incoming_edge_end(bog, src, pf.id) else {
                        continue;
                    };
                    let src_tig = self.unitig_of(src);
                    if src_tig == NULL_TIG {
                        continue;
                    }
                    let Some(other) = self.tig(src_tig) else { continue };
                    bps.push(UnitigBreakPoint {
                        frag_end: FragEnd::new(pf.id, hit_end),
                        position: (pf.bgn, pf.end),
                        frags_before: before,
                        frags_after: n_dove - before - 1,
                        in_size: other.length(),
                        in_frags: other.num_frags() as u32,
                    });
                }
            }
            before += 1;
        }
        bps
    }

    /// Execute a filtered break list. Returns false when the pre-pass
    /// finds the list would not actually split anything (a known defect
    /// of break-point generation upstream); nothing is mutated then.
    pub fn apply_breaks(&mut self, tid: TigId, breaks: &[UnitigBreakPoint]) -> bool {
        let pieces = {
            let tig = self.tig(tid).unwrap_or_else(|| panic!("live unitig {} missing", tid));
            simulate_split(tig, breaks)
        };
        if pieces < 2 {
            log::debug!(
                "unitig {}: break list would produce {} piece(s), split skipped",
                tid,
                pieces
            );
            return false;
        }
        let old = self.unitigs[tid as usize]
            .take()
            .unwrap_or_else(|| panic!("live unitig {} missing", tid));
        let new_paths = split_path(&old, breaks);
        for path in new_paths {
            let id = self.alloc_slot();
            let mut tig = Unitig { id, path, stats: None };
            tig.normalize();
            self.install(tig);
        }
        true
    }
}

/// The end of `target` hit by `src`'s best edge.
fn incoming_edge_end(bog: &BestOverlapGraph, src: FragId, target: FragId) -> Option<(End, End)> {
    for src_end in [End::Five, End::Three] {
        let e = bog.best_edge(src, src_end);
        if e.frag_id == target {
            return Some((e.end, src_end));
        }
    }
    None
}

/// Keep big breaks as-is (deduplicating repeats at one fragment end);
/// reduce each run of small breaks to at most one representative with a
/// convincing arrival-rate discontinuity. A sentinel break at the far
/// end of the path stands in for "end of unitig" so trailing smalls are
/// reduced the same way.
pub fn filter_break_points(
    tig: &Unitig,
    mut bps: Vec<UnitigBreakPoint>,
    config: &PipelineConfig,
) -> Vec<UnitigBreakPoint> {
    let Some(last) = tig.path.iter().rev().find(|p| !p.contained) else {
        return Vec::new();
    };
    let right_end = if last.is_reverse() { End::Five } else { End::Three };
    let n_dove = tig.num_dovetail_frags() as u32;
    bps.push(UnitigBreakPoint {
        frag_end: FragEnd::new(last.id, right_end),
        position: (last.bgn, last.end),
        frags_before: n_dove.saturating_sub(1),
        frags_after: 0,
        in_size: i64::MAX,
        in_frags: u32::MAX,
    });

    let mut kept: Vec<UnitigBreakPoint> = Vec::new();
    let mut smalls: Vec<UnitigBreakPoint> = Vec::new();
    let mut last_coord = 0i32;
    let mut last_frag_num = 0i32;
    for bp in bps {
        if bp.is_big(config) {
            // consecutive big breaks at the same fragment end collapse
            let sentinel = bp.in_size == i64::MAX;
            if !sentinel && kept.last().map_or(false, |p| p.frag_end == bp.frag_end) {
                continue;
            }
            if smalls.is_empty() {
                last_coord = bp.cut_coord();
                last_frag_num = bp.frags_before as i32;
                if bp.cuts_left_side() {
                    last_frag_num -= 1;
                }
            } else {
                if let Some(small) =
                    select_small(&smalls, &bp, &mut last_coord, &mut last_frag_num)
                {
                    kept.push(small);
                }
                smalls.clear();
            }
            if !sentinel {
                kept.push(bp);
            }
        } else {
            smalls.push(bp);
        }
    }
    kept
}

/// Among a run of small breaks, pick the one with the sharpest local
/// arrival-rate discontinuity, provided the two sides differ by more
/// than the configured ratio. The right-hand rate is bounded by the big
/// break that terminates the run, not by the unitig end. Most small
/// intersections are noise; a genuine hidden branch point shows up as a
/// density step.
fn select_small(
    smalls: &[UnitigBreakPoint],
    big: &UnitigBreakPoint,
    last_coord: &mut i32,
    last_frag_num: &mut i32,
) -> Option<UnitigBreakPoint> {
    let mut best: Option<(f64, UnitigBreakPoint)> = None;
    let right = big.cut_coord();
    let mut r_frags = big.frags_before as i32;
    if big.cuts_left_side() {
        r_frags -= 1;
    }
    for bp in smalls {
        if bp.frag_end.id == big.frag_end.id {
            continue;
        }
        let mut l_frags = bp.frags_before as i32;
        if bp.cuts_left_side() {
            l_frags -= 1;
        }
        if r_frags - l_frags == 1 {
            continue;
        }
        // middle of the frag instead of the end, to keep some overlap
        let coord = (bp.position.0 + bp.position.1) as f64 / 2.0;
        let l_rate = (l_frags - *last_frag_num) as f64 / (coord - *last_coord as f64);
        let r_rate = (r_frags - l_frags) as f64 / (right as f64 - coord);
        let ratio = if l_rate > r_rate { l_rate / r_rate } else { r_rate / l_rate };
        if ratio <= crate::constants::SMALL_BREAK_RATE_RATIO {
            continue;
        }
        let diff = (l_rate - r_rate).abs();
        if best.as_ref().map_or(true, |(d, _)| diff > *d) {
            best = Some((diff, *bp));
        }
    }
    *last_coord = right;
    *last_frag_num = r_frags;
    best.map(|(_, bp)| bp)
}

/// How the break walk treats each fragment: a break at the fragment's
/// left-facing end starts a new piece with it, a break at its
/// right-facing end closes the current piece after it, and breaks at
/// both ends make it a singleton.
fn breaks_for_frag<'a>(
    breaks: &'a [UnitigBreakPoint],
    frag: FragId,
) -> impl Iterator<Item = &'a UnitigBreakPoint> {
    breaks.iter().filter(move |bp| bp.frag_end.id == frag)
}

fn simulate_split(tig: &Unitig, breaks: &[UnitigBreakPoint]) -> usize {
    let mut pieces = 0usize;
    let mut open = false;
    for pf in &tig.path {
        let left_end = if pf.is_reverse() { End::Three } else { End::Five };
        let mut at_left = false;
        let mut at_right = false;
        for bp in breaks_for_frag(breaks, pf.id) {
            if bp.frag_end.end == left_end {
                at_left = true;
            } else {
                at_right = true;
            }
        }
        if at_left && at_right {
            if open {
                pieces += 1;
                open = false;
            }
            pieces += 1; // the singleton
        } else if at_left {
            if open {
                pieces += 1;
            }
            open = true;
        } else if at_right {
            pieces += 1;
            open = false;
        } else if !open {
            open = true;
        }
    }
    if open {
        pieces += 1;
    }
    pieces
}

fn split_path(
    tig: &Unitig,
    breaks: &[UnitigBreakPoint],
) -> Vec<Vec<crate::unitig::PlacedFragment>> {
    let mut out: Vec<Vec<crate::unitig::PlacedFragment>> = Vec::new();
    let mut cur: Vec<crate::unitig::PlacedFragment> = Vec::new();
    for pf in &tig.path {
        let left_end = if pf.is_reverse() { End::Three } else { End::Five };
        let mut at_left = false;
        let mut at_right = false;
        for bp in breaks_for_frag(breaks, pf.id) {
            if bp.frag_end.end == left_end {
                at_left = true;
            } else {
                at_right = true;
            }
        }
        if at_left && at_right {
            if !cur.is_empty() {
                out.push(std::mem::take(&mut cur));
            }
            out.push(vec![*pf]);
        } else if at_left {
            if !cur.is_empty() {
                out.push(std::mem::take(&mut cur));
            }
            cur.push(*pf);
        } else if at_right {
            cur.push(*pf);
            out.push(std::mem::take(&mut cur));
        } else {
            cur.push(*pf);
        }
    }
    if !cur.is_empty() {
        out.push(cur);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unitig::PlacedFragment;

    fn chain_tig(n: u32) -> Unitig {
        let mut u = Unitig::new(1);
        for i in 0..n {
            u.add_frag(PlacedFragment {
                id: i + 1,
                bgn: (i * 80) as i32,
                end: (i * 80 + 100) as i32,
                ..Default::default()
            });
        }
        u
    }

    fn big_bp(frag: FragId, end: End, pos: (i32, i32), before: u32, after: u32) -> UnitigBreakPoint {
        UnitigBreakPoint {
            frag_end: FragEnd::new(frag, end),
            position: pos,
            frags_before: before,
            frags_after: after,
            in_size: 10_000,
            in_frags: 100,
        }
    }

    #[test]
    fn test_split_at_left_end() {
        let tig = chain_tig(4);
        let bp = big_bp(3, End::Five, (160, 260), 2, 1);
        assert_eq!(simulate_split(&tig, &[bp]), 2);
        let paths = split_path(&tig, &[bp]);
        assert_eq!(paths.len(), 2);
        assert_eq!(paths[0].iter().map(|p| p.id).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(paths[1].iter().map(|p| p.id).collect::<Vec<_>>(), vec![3, 4]);
    }

    #[test]
    fn test_split_at_right_end() {
        let tig = chain_tig(4);
        let bp = big_bp(2, End::Three, (80, 180), 1, 2);
        let paths = split_path(&tig, &[bp]);
        assert_eq!(paths.len(), 2);
        assert_eq!(paths[0].iter().map(|p| p.id).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_both_ends_singleton() {
        let tig = chain_tig(3);
        let bps = vec![
            big_bp(2, End::Five, (80, 180), 1, 1),
            big_bp(2, End::Three, (80, 180), 1, 1),
        ];
        assert_eq!(simulate_split(&tig, &bps), 3);
        let paths = split_path(&tig, &bps);
        assert_eq!(paths.len(), 3);
        assert_eq!(paths[1].len(), 1);
        assert_eq!(paths[1][0].id, 2);
    }

    #[test]
    fn test_pathological_list_rejected() {
        // a break at the very first fragment's left end splits nothing
        let tig = chain_tig(3);
        let bp = big_bp(1, End::Five, (0, 100), 0, 2);
        assert_eq!(simulate_split(&tig, &[bp]), 1);
    }

    #[test]
    fn test_filter_keeps_big_drops_weak_smalls() {
        let tig = chain_tig(10);
        let config = PipelineConfig::default();
        // a small break in a uniform-density chain has no rate step
        let small = UnitigBreakPoint {
            in_size: 200,
            in_frags: 2,
            ..big_bp(5, End::Three, (320, 420), 4, 5)
        };
        let big = big_bp(8, End::Three, (560, 660), 7, 2);
        let kept = filter_break_points(&tig, vec![small, big], &config);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].frag_end.id, 8);
    }

    // dense block, sparse middle, then a big break in front of a dense
    // tail: the rate step at the block boundary is only visible when the
    // right-hand rate stops at the big break instead of the unitig end
    fn stepped_tig() -> Unitig {
        let mut u = Unitig::new(1);
        let mut add = |id: u32, bgn: i32| {
            u.add_frag(PlacedFragment {
                id,
                bgn,
                end: bgn + 100,
                ..Default::default()
            });
        };
        for i in 0..6u32 {
            add(i + 1, i as i32 * 20);
        }
        for i in 0..5u32 {
            add(i + 7, 300 + i as i32 * 200);
        }
        for i in 0..30u32 {
            add(i + 12, 1120 + i as i32 * 20);
        }
        u
    }

    #[test]
    fn test_select_small_bounded_by_next_big() {
        let tig = stepped_tig();
        let config = PipelineConfig::default();
        let small = UnitigBreakPoint {
            in_size: 200,
            in_frags: 2,
            ..big_bp(6, End::Three, (100, 200), 5, 35)
        };
        let big = big_bp(11, End::Three, (1100, 1200), 10, 30);
        // bounded by the big break: left 5/150 vs right 5/1050, ratio 7;
        // measured to the unitig end the dense tail hides the step
        let kept = filter_break_points(&tig, vec![small, big], &config);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].frag_end.id, 6);
        assert_eq!(kept[1].frag_end.id, 11);
    }

    #[test]
    fn test_select_small_skips_adjacent_to_big() {
        let tig = stepped_tig();
        let config = PipelineConfig::default();
        // one fragment apart from the big break: splitting there would
        // shave a single fragment off, never worth it
        let small = UnitigBreakPoint {
            in_size: 200,
            in_frags: 2,
            ..big_bp(10, End::Three, (900, 1000), 9, 31)
        };
        let big = big_bp(11, End::Three, (1100, 1200), 10, 30);
        let kept = filter_break_points(&tig, vec![small, big], &config);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].frag_end.id, 11);
    }

    #[test]
    fn test_filter_dedupes_consecutive_bigs() {
        let tig = chain_tig(6);
        let config = PipelineConfig::default();
        let a = big_bp(4, End::Five, (240, 340), 3, 2);
        let b = big_bp(4, End::Five, (240, 340), 3, 2);
        let kept = filter_break_points(&tig, vec![a, b], &config);
        assert_eq!(kept.len(), 1);
    }
}

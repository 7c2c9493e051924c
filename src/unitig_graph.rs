use crate::best_graph::BestOverlapGraph;
use crate::chunk_graph::ChunkGraph;
use crate::constants::RHO_RECALIBRATION_MIN;
use crate::types::*;
use crate::unitig::{PlacedFragment, Unitig};
use fxhash::FxHashMap;
use rayon::prelude::*;
use smallvec::SmallVec;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// The unitig collection: an arena of slots addressed by stable id.
/// Destroyed unitigs leave a tombstoned (None) slot; ids are never
/// reused. Slot 0 is a permanent placeholder so ids double as indices.
#[derive(Debug, Clone, Default)]
pub struct UnitigGraph {
    pub unitigs: Vec<Option<Unitig>>,
    in_unitig: Vec<TigId>,
    /// Fragments whose best edge was found pointing into an
    /// already-built unitig during path extraction: target fragment to
    /// the source fragments whose edges hit it. Consumed by breaking.
    pub unitig_intersect: FxHashMap<FragId, SmallVec<[FragId; 4]>>,
    pub global_arrival_rate: f64,
}

impl UnitigGraph {
    pub fn new(num_frags: u32) -> UnitigGraph {
        UnitigGraph {
            unitigs: vec![None],
            in_unitig: vec![NULL_TIG; num_frags as usize + 1],
            unitig_intersect: FxHashMap::default(),
            global_arrival_rate: 0.0,
        }
    }

    #[inline]
    pub fn unitig_of(&self, id: FragId) -> TigId {
        self.in_unitig[id as usize]
    }

    pub fn tig(&self, id: TigId) -> Option<&Unitig> {
        self.unitigs.get(id as usize).and_then(|s| s.as_ref())
    }

    pub fn tig_mut(&mut self, id: TigId) -> Option<&mut Unitig> {
        self.unitigs.get_mut(id as usize).and_then(|s| s.as_mut())
    }

    pub fn live_ids(&self) -> Vec<TigId> {
        (1..self.unitigs.len() as TigId)
            .filter(|id| self.unitigs[*id as usize].is_some())
            .collect()
    }

    pub fn num_live(&self) -> usize {
        self.unitigs.iter().filter(|s| s.is_some()).count()
    }

    /// Reserve the next unitig id. The caller installs the finished
    /// unitig with `install`.
    pub fn alloc_slot(&mut self) -> TigId {
        self.unitigs.push(None);
        (self.unitigs.len() - 1) as TigId
    }

    pub fn install(&mut self, tig: Unitig) {
        let id = tig.id;
        for pf in &tig.path {
            self.in_unitig[pf.id as usize] = id;
        }
        self.unitigs[id as usize] = Some(tig);
    }

    pub fn tombstone(&mut self, id: TigId) {
        self.unitigs[id as usize] = None;
    }

    pub fn reclaim(&mut self, id: TigId) {
        let path_ids: Vec<FragId> = self
            .tig(id)
            .map(|t| t.path.iter().map(|p| p.id).collect())
            .unwrap_or_default();
        for f in path_ids {
            self.in_unitig[f as usize] = id;
        }
    }

    /// Path extraction: seed from the chunk-graph ranking, then a pickup
    /// pass for anything the ranking missed.
    pub fn build(
        bog: &BestOverlapGraph,
        cg: &mut ChunkGraph,
        fi: &FragmentInfo,
    ) -> UnitigGraph {
        let n = fi.num_fragments();
        let mut g = UnitigGraph::new(n);
        while let Some(seed) = cg.next_frag_by_chunk_length() {
            if g.in_unitig[seed as usize] != NULL_TIG || bog.is_contained(seed) {
                continue;
            }
            g.populate_unitig(seed, bog, fi);
        }
        for seed in 1..=n {
            if g.in_unitig[seed as usize] != NULL_TIG || bog.is_contained(seed) {
                continue;
            }
            g.populate_unitig(seed, bog, fi);
        }
        log::info!(
            "Extracted {} unitigs, {} recorded intersections",
            g.num_live(),
            g.unitig_intersect.values().map(|v| v.len()).sum::<usize>()
        );
        g
    }

    /// Walk the 3' chain off the seed, flip, walk the 5' chain, flip
    /// back. The final flip does not re-sort the path; downstream code
    /// relies on the resulting order, quirks included.
    fn populate_unitig(&mut self, seed: FragId, bog: &BestOverlapGraph, fi: &FragmentInfo) {
        let id = self.alloc_slot();
        let mut tig = Unitig::new(id);
        tig.add_frag(PlacedFragment::seed(seed, fi.length(seed)));
        self.in_unitig[seed as usize] = id;
        self.walk(&mut tig, seed, End::Three, bog, fi);
        tig.reverse_complement();
        self.walk(&mut tig, seed, End::Five, bog, fi);
        tig.reverse_complement();
        tig.normalize();
        self.unitigs[id as usize] = Some(tig);
    }

    fn walk(
        &mut self,
        tig: &mut Unitig,
        from: FragId,
        from_end: End,
        bog: &BestOverlapGraph,
        fi: &FragmentInfo,
    ) {
        let mut cur = from;
        let mut cur_end = from_end;
        loop {
            let e = *bog.best_edge(cur, cur_end);
            if e.is_null() {
                break;
            }
            let tgt = e.frag_id;
            let owner = self.in_unitig[tgt as usize];
            if owner == tig.id {
                log::debug!("unitig {} is circular at fragment {}", tig.id, tgt);
                self.unitig_intersect.entry(tgt).or_default().push(cur);
                break;
            }
            if owner != NULL_TIG {
                self.unitig_intersect.entry(tgt).or_default().push(cur);
                break;
            }
            let parent = *tig.path.last().unwrap_or_else(|| {
                panic!("walk from fragment {} on an empty path", cur)
            });
            let rev = e.reversed(cur, cur_end);
            let pf = Unitig::place_frag(tgt, fi.length(tgt), e.end, &rev, &parent);
            tig.add_frag(pf);
            self.in_unitig[tgt as usize] = tig.id;
            cur = tgt;
            cur_end = e.end.opposite();
        }
    }

    /// Recursively settle containees under their placed containers;
    /// repeat passes so a containee placed this round can act as a
    /// container next round. Placement is idempotent per fragment.
    pub fn place_contains(&mut self, bog: &mut BestOverlapGraph, fi: &FragmentInfo) {
        let mut by_container: FxHashMap<FragId, Vec<FragId>> = FxHashMap::default();
        for (c, bc) in bog.containments() {
            if !bc.is_placed {
                by_container.entry(bc.container).or_default().push(*c);
            }
        }
        for kids in by_container.values_mut() {
            kids.sort_unstable();
        }

        let mut total = 0usize;
        loop {
            let mut placed = 0usize;
            for tid in self.live_ids() {
                let mut tig = self.unitigs[tid as usize].take().unwrap_or_else(|| {
                    panic!("unitig {} vanished during containment placement", tid)
                });
                let mut i = 0;
                // new containees land at the path tail and are scanned
                // by the same pass, handling nesting in one sweep
                while i < tig.path.len() {
                    let parent = tig.path[i];
                    if let Some(kids) = by_container.remove(&parent.id) {
                        for k in kids {
                            let bc = *bog.containment(k).unwrap_or_else(|| {
                                panic!("containee {} lost its containment entry", k)
                            });
                            tig.add_contained_frag(k, fi.length(k), &bc, &parent);
                            bog.set_placed(k);
                            self.in_unitig[k as usize] = tid;
                            placed += 1;
                        }
                    }
                    i += 1;
                }
                self.unitigs[tid as usize] = Some(tig);
            }
            total += placed;
            if placed == 0 {
                break;
            }
        }
        for tid in self.live_ids() {
            if let Some(t) = self.tig_mut(tid) {
                t.sort_path();
                t.normalize();
            }
        }
        log::info!("Placed {} contained fragments", total);
    }

    /// Fragments left without a home (e.g. containees whose container
    /// chain broke during cycle resolution) come back as singletons.
    pub fn place_zombies(&mut self, fi: &FragmentInfo) {
        let mut zombies = 0usize;
        for f in 1..=fi.num_fragments() {
            if self.in_unitig[f as usize] != NULL_TIG {
                continue;
            }
            let id = self.alloc_slot();
            let tig = Unitig::singleton(id, f, fi.length(f));
            self.install(tig);
            zombies += 1;
        }
        if zombies > 0 {
            log::warn!("Resurrected {} unplaced fragments as singleton unitigs", zombies);
        }
    }

    /// Full-universe sanity scan: every fragment is owned by exactly the
    /// unitig that lists it. A violation means earlier phases corrupted
    /// shared state, which is not recoverable.
    pub fn check_unitig_membership(&self, fi: &FragmentInfo) {
        let mut seen = vec![false; fi.num_fragments() as usize + 1];
        for tid in self.live_ids() {
            let tig = self.tig(tid).unwrap_or_else(|| panic!("live unitig {} missing", tid));
            for pf in &tig.path {
                if self.in_unitig[pf.id as usize] != tid {
                    panic!(
                        "fragment {} placed in unitig {} but owned by {}",
                        pf.id, tid, self.in_unitig[pf.id as usize]
                    );
                }
                if seen[pf.id as usize] {
                    panic!("fragment {} placed twice", pf.id);
                }
                seen[pf.id as usize] = true;
            }
        }
        let missing = (1..=fi.num_fragments()).filter(|f| !seen[*f as usize]).count();
        if missing > 0 {
            panic!("{} fragments not placed in any unitig", missing);
        }
    }

    /// Reads-per-base across the assembly. With a known genome size this
    /// is exact; otherwise estimate from unitig rho values, then
    /// recalibrate over long unitigs with percentile and jump trimming
    /// so a single repeat-collapsed unitig cannot drag the estimate.
    pub fn set_global_arrival_rate(&mut self, fi: &FragmentInfo, config: &PipelineConfig) {
        let total_frags = fi.num_fragments() as f64;
        if config.genome_size > 0 {
            self.global_arrival_rate = total_frags / config.genome_size as f64;
            log::info!("Global arrival rate {:.6} (genome size {})", self.global_arrival_rate, config.genome_size);
            return;
        }

        let mut total_rho = 0.0f64;
        let mut total_arrival_frags = 0.0f64;
        let mut rho_gt = 0usize;
        for tid in self.live_ids() {
            let tig = self.tig(tid).unwrap_or_else(|| panic!("live unitig {} missing", tid));
            let rho = tig.avg_rho(fi);
            total_rho += rho;
            if rho > RHO_RECALIBRATION_MIN {
                rho_gt += (rho / RHO_RECALIBRATION_MIN) as usize;
            }
            total_arrival_frags += tig.num_frags().saturating_sub(1) as f64;
        }
        let mut gar = if total_rho > 0.0 { total_arrival_frags / total_rho } else { 0.0 };
        log::info!("Calculated global arrival rate {:.6}", gar);

        if rho_gt as f64 * 2.0 * RHO_RECALIBRATION_MIN > total_rho {
            let mut rates: Vec<f64> = Vec::with_capacity(rho_gt);
            for tid in self.live_ids() {
                let tig = self.tig(tid).unwrap_or_else(|| panic!("live unitig {} missing", tid));
                let rho = tig.avg_rho(fi);
                if rho > RHO_RECALIBRATION_MIN {
                    let rate = tig.num_frags() as f64 / rho;
                    // weight long unitigs by their span
                    for _ in 0..(rho / RHO_RECALIBRATION_MIN) as usize {
                        rates.push(rate);
                    }
                }
            }
            if !rates.is_empty() {
                rates.sort_by(|a, b| a.partial_cmp(b).unwrap());
                let n = rates.len();
                let min10 = rates[n / 10];
                let median_index = n / 2;
                let median = rates[median_index];
                let mut recalibrated = rates[(n * 19) / 20];

                let mut max_diff = 0.0f64;
                let mut prev = min10;
                for r in &rates[n / 10..median_index] {
                    let d = r - prev;
                    prev = *r;
                    if d > max_diff {
                        max_diff = d;
                    }
                }
                max_diff *= 2.0;
                let mut max_diff_index = n - 1;
                for (i, r) in rates.iter().enumerate().take(n).skip(median_index) {
                    let d = r - prev;
                    prev = *r;
                    if d > max_diff {
                        max_diff_index = i.saturating_sub(1);
                        break;
                    }
                }
                let jump_capped = rates[max_diff_index];
                let tmp = (min10 * 2.0).min(median * 1.25);
                if tmp < recalibrated {
                    recalibrated = tmp;
                }
                if jump_capped < recalibrated {
                    recalibrated = jump_capped;
                }
                if recalibrated > gar {
                    gar = recalibrated;
                    log::info!("Using recalibrated global arrival rate {:.6}", gar);
                }
            }
        }
        self.global_arrival_rate = gar;
        if gar > 0.0 {
            log::info!("Estimated genome size {:.0}", total_frags / gar);
        }
    }

    /// Per-unitig stat refresh; slots are independent.
    pub fn refresh_stats(&mut self, fi: &FragmentInfo) {
        let gar = self.global_arrival_rate;
        self.unitigs.par_iter_mut().for_each(|slot| {
            if let Some(t) = slot {
                t.compute_stats(fi, gar);
            }
        });
    }

    /// Layout records for downstream consensus: one block per live
    /// unitig, one line per placed fragment.
    pub fn write_layout(&self, path: &Path, fi: &FragmentInfo) -> io::Result<()> {
        let mut w = BufWriter::new(File::create(path)?);
        for tid in self.live_ids() {
            let tig = self.tig(tid).unwrap_or_else(|| panic!("live unitig {} missing", tid));
            writeln!(w, "unitig {}", tid)?;
            writeln!(w, "len {}", tig.length())?;
            writeln!(w, "rho {:.1}", tig.avg_rho(fi))?;
            writeln!(w, "cov_stat {:.4}", tig.cov_stat(fi, self.global_arrival_rate))?;
            writeln!(w, "arrival_rate {:.6}", tig.local_arrival_rate(fi))?;
            writeln!(w, "nfrags {}", tig.num_frags())?;
            for pf in &tig.path {
                writeln!(
                    w,
                    "FRG {} parent {} hang {} {} position {} {}",
                    pf.id, pf.parent, pf.a_hang, pf.b_hang, pf.bgn, pf.end
                )?;
            }
        }
        Ok(())
    }

    /// Fragment-count-balanced partition assignment plus the fragment to
    /// unitig iid map. File emission of the partitions themselves is a
    /// downstream concern; this is only the mapping.
    pub fn write_partition_map(&self, path: &Path, fi: &FragmentInfo, partitions: usize) -> io::Result<()> {
        let mut w = BufWriter::new(File::create(path)?);
        let per_partition = (fi.num_fragments() as usize).div_ceil(partitions.max(1));
        let mut part = 1usize;
        let mut in_part = 0usize;
        writeln!(w, "#unitig\tpartition\tnfrags")?;
        for tid in self.live_ids() {
            let tig = self.tig(tid).unwrap_or_else(|| panic!("live unitig {} missing", tid));
            if in_part > 0 && in_part + tig.num_frags() > per_partition {
                part += 1;
                in_part = 0;
            }
            in_part += tig.num_frags();
            writeln!(w, "{}\t{}\t{}", tid, part, tig.num_frags())?;
        }
        writeln!(w, "#frag\tunitig")?;
        for f in 1..=fi.num_fragments() {
            writeln!(w, "{}\t{}", f, self.in_unitig[f as usize])?;
        }
        Ok(())
    }

    pub fn print_statistics(&self, fi: &FragmentInfo) {
        let mut n = 0usize;
        let mut singletons = 0usize;
        let mut total_len = 0i64;
        let mut max_len = 0i64;
        let mut total_frags = 0usize;
        for tid in self.live_ids() {
            let tig = self.tig(tid).unwrap_or_else(|| panic!("live unitig {} missing", tid));
            n += 1;
            let len = tig.length();
            total_len += len;
            max_len = max_len.max(len);
            total_frags += tig.num_frags();
            if tig.num_frags() == 1 {
                singletons += 1;
            }
        }
        log::info!(
            "{} unitigs ({} singletons), {} fragments, total span {}, longest {}",
            n,
            singletons,
            total_frags,
            total_len,
            max_len
        );
        let _ = fi;
    }
}

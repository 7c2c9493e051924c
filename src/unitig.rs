use crate::best_graph::{BestContainment, BestEdgeOverlap};
use crate::constants::LN2;
use crate::types::*;
use serde::{Deserialize, Serialize};

/// One fragment placed on a unitig. `bgn` is the 5' coordinate and `end`
/// the 3' coordinate, so a reversed fragment has `end < bgn`. `parent`
/// and the hangs record the edge that placed it (parent 0 for seeds).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PlacedFragment {
    pub id: FragId,
    pub parent: FragId,
    pub a_hang: i32,
    pub b_hang: i32,
    pub bgn: i32,
    pub end: i32,
    pub contained: bool,
    /// Containment nesting depth; 0 for dovetail fragments.
    pub delta: u32,
}

impl PlacedFragment {
    pub fn seed(id: FragId, len: u32) -> PlacedFragment {
        PlacedFragment { id, end: len as i32, ..Default::default() }
    }

    #[inline]
    pub fn min(&self) -> i32 {
        self.bgn.min(self.end)
    }

    #[inline]
    pub fn max(&self) -> i32 {
        self.bgn.max(self.end)
    }

    #[inline]
    pub fn is_reverse(&self) -> bool {
        self.end < self.bgn
    }
}

/// Cached per-unitig statistics; refreshed in bulk once the global
/// arrival rate is known.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct UnitigStats {
    pub length: i64,
    pub avg_rho: f64,
    pub local_arrival_rate: f64,
    pub cov_stat: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Unitig {
    pub id: TigId,
    pub path: Vec<PlacedFragment>,
    pub stats: Option<UnitigStats>,
}

impl Unitig {
    pub fn new(id: TigId) -> Unitig {
        Unitig { id, path: Vec::new(), stats: None }
    }

    pub fn singleton(id: TigId, frag: FragId, len: u32) -> Unitig {
        let mut u = Unitig::new(id);
        u.add_frag(PlacedFragment::seed(frag, len));
        u
    }

    #[inline]
    pub fn num_frags(&self) -> usize {
        self.path.len()
    }

    pub fn num_dovetail_frags(&self) -> usize {
        self.path.iter().filter(|p| !p.contained).count()
    }

    /// Span of the layout; positions are normalized to start at 0, so
    /// this is just the maximum coordinate.
    pub fn length(&self) -> i64 {
        self.path.iter().map(|p| p.max() as i64).max().unwrap_or(0)
    }

    pub fn add_frag(&mut self, pf: PlacedFragment) {
        self.path.push(pf);
        self.stats = None;
    }

    pub fn placed(&self, id: FragId) -> Option<&PlacedFragment> {
        self.path.iter().find(|p| p.id == id)
    }

    pub fn first_frag(&self) -> Option<&PlacedFragment> {
        self.path.first()
    }

    pub fn last_frag(&self) -> Option<&PlacedFragment> {
        self.path.last()
    }

    /// Position a fragment off an already-placed parent. `edge` is the
    /// best edge stored on `frag_id` at `frag_end`, pointing at the
    /// parent. The hangs are re-expressed in the parent's frame, mapped
    /// through the parent's placed interval, and the span is then pinned
    /// to the fragment's length at its leftmost coordinate.
    pub fn place_frag(
        frag_id: FragId,
        frag_len: u32,
        frag_end: End,
        edge: &BestEdgeOverlap,
        parent: &PlacedFragment,
    ) -> PlacedFragment {
        debug_assert_eq!(edge.frag_id, parent.id);
        let rev = edge.reversed(frag_id, frag_end);
        // Ends differ across a same-orientation overlap.
        let same_ori = frag_end != edge.end;
        let (bgn, end) = project_hangs(rev.a_hang, rev.b_hang, same_ori, frag_len, parent, None);
        PlacedFragment {
            id: frag_id,
            parent: parent.id,
            a_hang: edge.a_hang,
            b_hang: edge.b_hang,
            bgn,
            end,
            contained: false,
            delta: 0,
        }
    }

    /// Place a containee under its already-placed container. Containment
    /// hangs are in the container's frame; the containee's span is pinned
    /// to its length and clipped to the container's interval.
    pub fn place_contained_frag(
        frag_id: FragId,
        frag_len: u32,
        bc: &BestContainment,
        parent: &PlacedFragment,
    ) -> PlacedFragment {
        debug_assert_eq!(bc.container, parent.id);
        let clip = (parent.min(), parent.max());
        let (bgn, end) = project_hangs(
            bc.a_hang,
            bc.b_hang,
            bc.same_orientation,
            frag_len,
            parent,
            Some(clip),
        );
        PlacedFragment {
            id: frag_id,
            parent: parent.id,
            a_hang: bc.a_hang,
            b_hang: bc.b_hang,
            bgn,
            end,
            contained: true,
            delta: parent.delta + 1,
        }
    }

    pub fn add_contained_frag(
        &mut self,
        frag_id: FragId,
        frag_len: u32,
        bc: &BestContainment,
        parent: &PlacedFragment,
    ) {
        let pf = Unitig::place_contained_frag(frag_id, frag_len, bc, parent);
        self.add_frag(pf);
    }

    /// Place via whichever of the fragment's two best edges lands on a
    /// parent already in this unitig, preferring the thicker overlap.
    /// Shifts the whole unitig right if the placement goes negative.
    pub fn add_and_place_frag(
        &mut self,
        frag_id: FragId,
        frag_len: u32,
        e5: Option<&BestEdgeOverlap>,
        e3: Option<&BestEdgeOverlap>,
    ) -> bool {
        let thickness = |e: &BestEdgeOverlap| {
            frag_len as i32 + if e.a_hang < 0 { e.b_hang } else { -e.a_hang }
        };
        let mut best: Option<(i32, PlacedFragment)> = None;
        for (end, e) in [(End::Five, e5), (End::Three, e3)] {
            let Some(e) = e else { continue };
            if e.is_null() {
                continue;
            }
            let Some(parent) = self.placed(e.frag_id) else { continue };
            let pf = Unitig::place_frag(frag_id, frag_len, end, e, parent);
            let t = thickness(e);
            if best.as_ref().map_or(true, |(bt, _)| t > *bt) {
                best = Some((t, pf));
            }
        }
        let Some((_, mut pf)) = best else {
            return false;
        };
        if pf.min() < 0 {
            let d = -pf.min();
            self.shift(d);
            pf.bgn += d;
            pf.end += d;
        }
        self.add_frag(pf);
        true
    }

    pub fn shift(&mut self, delta: i32) {
        for p in &mut self.path {
            p.bgn += delta;
            p.end += delta;
        }
        self.stats = None;
    }

    /// Shift so the leftmost coordinate is 0.
    pub fn normalize(&mut self) {
        let min = self.path.iter().map(|p| p.min()).min().unwrap_or(0);
        if min != 0 {
            self.shift(-min);
        }
    }

    /// Mirror every position and reverse the path order. The path is
    /// deliberately not re-sorted afterwards; initial construction
    /// depends on the resulting order.
    pub fn reverse_complement(&mut self) {
        let len = self.length() as i32;
        for p in &mut self.path {
            p.bgn = len - p.bgn;
            p.end = len - p.end;
        }
        self.path.reverse();
        self.stats = None;
    }

    /// Layout order: leftmost first; ties put the longer interval first
    /// so containers precede their containees, then shallower nesting.
    pub fn sort_path(&mut self) {
        self.path
            .sort_by(|a, b| a.min().cmp(&b.min()).then(b.max().cmp(&a.max())).then(a.delta.cmp(&b.delta)));
        self.stats = None;
    }

    /// Rho: layout length minus the average terminal fragment length,
    /// clamped positive. Approximates the genomic span covered by
    /// fragment start points.
    pub fn avg_rho(&self, fi: &FragmentInfo) -> f64 {
        let len = self.length() as f64;
        let first = self.path.first().map(|p| fi.length(p.id)).unwrap_or(0) as f64;
        let last = self.path.last().map(|p| fi.length(p.id)).unwrap_or(0) as f64;
        let rho = len - (first + last) / 2.0;
        if rho <= 0.0 {
            1.0
        } else {
            rho
        }
    }

    pub fn local_arrival_rate(&self, fi: &FragmentInfo) -> f64 {
        (self.num_frags().saturating_sub(1)) as f64 / self.avg_rho(fi)
    }

    pub fn cov_stat(&self, fi: &FragmentInfo, global_arrival_rate: f64) -> f64 {
        let n = self.num_frags();
        if n < 2 {
            return 0.0;
        }
        self.avg_rho(fi) * global_arrival_rate - LN2 * (n - 1) as f64
    }

    pub fn compute_stats(&mut self, fi: &FragmentInfo, global_arrival_rate: f64) {
        self.stats = Some(UnitigStats {
            length: self.length(),
            avg_rho: self.avg_rho(fi),
            local_arrival_rate: self.local_arrival_rate(fi),
            cov_stat: self.cov_stat(fi, global_arrival_rate),
        });
    }
}

/// Map hangs expressed in a placed parent's frame onto unitig
/// coordinates. `same_ori` says whether the child runs the same
/// direction as the parent. The a_hang-side coordinate is authoritative;
/// the other endpoint is recomputed from the fragment length (hangs from
/// noisy overlaps drift, lengths do not), then optionally clipped to the
/// parent's interval for containments.
fn project_hangs(
    ah: i32,
    bh: i32,
    same_ori: bool,
    frag_len: u32,
    parent: &PlacedFragment,
    clip: Option<(i32, i32)>,
) -> (i32, i32) {
    let (pa, pb) = if parent.is_reverse() {
        (parent.bgn - ah, parent.end - bh)
    } else {
        (parent.bgn + ah, parent.end + bh)
    };
    let child_rev = if same_ori { parent.is_reverse() } else { !parent.is_reverse() };
    let len = frag_len as i32;
    let (mut bgn, mut end) = if same_ori { (pa, pb) } else { (pb, pa) };
    if same_ori {
        // child's 5' coordinate pinned by a_hang
        end = if child_rev { bgn - len } else { bgn + len };
    } else {
        // child's 3' coordinate pinned by a_hang
        bgn = if child_rev { end + len } else { end - len };
    }
    if let Some((lo, hi)) = clip {
        bgn = bgn.clamp(lo, hi);
        end = end.clamp(lo, hi);
    }
    (bgn, end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::best_graph::BestEdgeOverlap;

    fn fi3() -> FragmentInfo {
        let mut fi = FragmentInfo::new();
        fi.push(100, 0, 1);
        fi.push(100, 0, 1);
        fi.push(100, 0, 1);
        fi
    }

    /// A(0-100), B(80-180), C(160-260) as a placed chain.
    fn chain_tig() -> Unitig {
        let mut u = Unitig::new(1);
        u.add_frag(PlacedFragment::seed(1, 100));
        // edge stored on B's 5' end pointing at A's 3' end
        let e_b = BestEdgeOverlap { frag_id: 1, end: End::Three, a_hang: -80, b_hang: -80 };
        let pf_b = Unitig::place_frag(2, 100, End::Five, &e_b, u.placed(1).unwrap());
        u.add_frag(pf_b);
        let e_c = BestEdgeOverlap { frag_id: 2, end: End::Three, a_hang: -80, b_hang: -80 };
        let pf_c = Unitig::place_frag(3, 100, End::Five, &e_c, u.placed(2).unwrap());
        u.add_frag(pf_c);
        u
    }

    #[test]
    fn test_chain_positions_and_rho() {
        let u = chain_tig();
        assert_eq!((u.path[0].bgn, u.path[0].end), (0, 100));
        assert_eq!((u.path[1].bgn, u.path[1].end), (80, 180));
        assert_eq!((u.path[2].bgn, u.path[2].end), (160, 260));
        assert_eq!(u.length(), 260);
        let fi = fi3();
        assert_eq!(u.avg_rho(&fi), 160.0);
        assert!((u.local_arrival_rate(&fi) - 2.0 / 160.0).abs() < 1e-12);
    }

    #[test]
    fn test_place_frag_flipped() {
        let mut u = Unitig::new(1);
        u.add_frag(PlacedFragment::seed(1, 100));
        // 3'-3' overlap: partner sits reversed to the right
        let e = BestEdgeOverlap { frag_id: 1, end: End::Three, a_hang: 80, b_hang: 80 };
        let pf = Unitig::place_frag(2, 100, End::Three, &e, u.placed(1).unwrap());
        assert!(pf.is_reverse());
        assert_eq!((pf.min(), pf.max()), (80, 180));
    }

    #[test]
    fn test_place_frag_off_reversed_parent() {
        let mut u = Unitig::new(1);
        u.add_frag(PlacedFragment { id: 1, bgn: 180, end: 80, ..Default::default() });
        // flipped overlap off the parent's 5' end; child continues forward
        let e = BestEdgeOverlap { frag_id: 1, end: End::Five, a_hang: -80, b_hang: -80 };
        let pf = Unitig::place_frag(2, 100, End::Five, &e, u.placed(1).unwrap());
        assert!(!pf.is_reverse());
        assert_eq!((pf.bgn, pf.end), (160, 260));
    }

    #[test]
    fn test_contained_placement() {
        // D (100bp) inside E (200bp) at hangs (10, -10)
        let mut u = Unitig::new(1);
        u.add_frag(PlacedFragment::seed(2, 200));
        let bc = BestContainment {
            container: 2,
            score: 1,
            same_orientation: true,
            a_hang: 10,
            b_hang: -10,
            is_placed: false,
        };
        u.add_contained_frag(1, 100, &bc, &u.placed(2).copied().unwrap());
        let d = u.placed(1).unwrap();
        assert_eq!((d.bgn, d.end), (10, 110));
        assert!(d.contained);
        assert_eq!(d.delta, 1);
        // containee inside container's interval
        assert!(d.min() >= 0 && d.max() <= 200);
    }

    #[test]
    fn test_contained_placement_reversed_container() {
        let mut u = Unitig::new(1);
        u.add_frag(PlacedFragment { id: 2, bgn: 200, end: 0, ..Default::default() });
        let bc = BestContainment {
            container: 2,
            score: 1,
            same_orientation: true,
            a_hang: 10,
            b_hang: -10,
            is_placed: false,
        };
        u.add_contained_frag(1, 100, &bc, &u.placed(2).copied().unwrap());
        let d = u.placed(1).unwrap();
        // container reversed, containee follows: 5' at the high coordinate
        assert!(d.is_reverse());
        assert_eq!((d.min(), d.max()), (90, 190));
    }

    #[test]
    fn test_reverse_complement_mirrors() {
        let mut u = chain_tig();
        u.reverse_complement();
        assert_eq!(u.path[0].id, 3);
        assert_eq!((u.path[0].bgn, u.path[0].end), (100, 0));
        assert_eq!((u.path[2].bgn, u.path[2].end), (260, 160));
        assert_eq!(u.length(), 260);
        u.reverse_complement();
        assert_eq!(u.path[0].id, 1);
        assert_eq!((u.path[0].bgn, u.path[0].end), (0, 100));
    }

    #[test]
    fn test_sort_containers_first() {
        let mut u = Unitig::new(1);
        u.add_frag(PlacedFragment { id: 3, bgn: 10, end: 110, contained: true, delta: 1, ..Default::default() });
        u.add_frag(PlacedFragment { id: 1, bgn: 0, end: 200, ..Default::default() });
        u.add_frag(PlacedFragment { id: 2, bgn: 150, end: 260, ..Default::default() });
        u.sort_path();
        let ids: Vec<FragId> = u.path.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![1, 3, 2]);
    }

    #[test]
    fn test_add_and_place_prefers_thicker() {
        let mut u = Unitig::new(1);
        u.add_frag(PlacedFragment::seed(1, 100));
        u.add_frag(PlacedFragment { id: 2, bgn: 150, end: 250, ..Default::default() });
        // thin edge to 1 (20bp), thick edge to 2 (60bp)
        let e5 = BestEdgeOverlap { frag_id: 1, end: End::Three, a_hang: -80, b_hang: -80 };
        let e3 = BestEdgeOverlap { frag_id: 2, end: End::Five, a_hang: 40, b_hang: 40 };
        assert!(u.add_and_place_frag(3, 100, Some(&e5), Some(&e3)));
        let pf = u.placed(3).unwrap();
        assert_eq!(pf.parent, 2);
        assert_eq!((pf.bgn, pf.end), (110, 210));
    }

    #[test]
    fn test_cov_stat_single_frag_zero() {
        let u = Unitig::singleton(1, 1, 100);
        let fi = fi3();
        assert_eq!(u.cov_stat(&fi, 0.01), 0.0);
    }
}

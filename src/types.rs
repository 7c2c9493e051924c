use fxhash::FxHashMap;
use serde::{Deserialize, Serialize};

pub type FragId = u32;
pub type TigId = u32;

// id 0 is the null fragment / unmated sentinel throughout.
pub const NULL_FRAG: FragId = 0;
pub const NULL_TIG: TigId = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum End {
    #[default]
    Five,
    Three,
}

impl End {
    #[inline]
    pub fn opposite(self) -> End {
        match self {
            End::Five => End::Three,
            End::Three => End::Five,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct FragEnd {
    pub id: FragId,
    pub end: End,
}

impl FragEnd {
    pub fn new(id: FragId, end: End) -> FragEnd {
        FragEnd { id, end }
    }
}

/// One pairwise overlap record, as reported by the upstream overlapper.
/// Hangs are signed offsets with `a_id` as the reference fragment; the
/// stream reports every overlap in both directions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Overlap {
    pub a_id: FragId,
    pub b_id: FragId,
    pub a_hang: i32,
    pub b_hang: i32,
    pub flipped: bool,
    pub erate: f32,
}

impl Overlap {
    /// True iff this record says A contains B.
    #[inline]
    pub fn a_contains_b(&self) -> bool {
        self.a_hang >= 0 && self.b_hang <= 0
    }

    /// True iff this record says B contains A.
    #[inline]
    pub fn b_contains_a(&self) -> bool {
        self.a_hang <= 0 && self.b_hang >= 0
    }

    #[inline]
    pub fn is_dovetail(&self) -> bool {
        !self.a_contains_b() && !self.b_contains_a()
    }

    /// Which end of A this overlap hangs off. Only meaningful for dovetails.
    #[inline]
    pub fn a_end(&self) -> End {
        if self.a_hang < 0 {
            End::Five
        } else {
            End::Three
        }
    }

    /// Which end of B this overlap hangs off. Only meaningful for dovetails.
    #[inline]
    pub fn b_end(&self) -> End {
        if self.flipped {
            self.a_end()
        } else {
            self.a_end().opposite()
        }
    }

    /// Number of aligned bases, seen from A's side.
    pub fn length(&self, fi: &FragmentInfo) -> i32 {
        let alen = fi.length(self.a_id) as i32;
        if self.a_hang < 0 {
            if self.b_hang < 0 {
                alen + self.b_hang
            } else {
                alen
            }
        } else if self.b_hang < 0 {
            alen - self.a_hang + self.b_hang
        } else {
            alen - self.a_hang
        }
    }
}

/// Per-fragment metadata. Fragments are numbered 1..=num_fragments;
/// index 0 is a dead slot so ids can be used directly.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FragmentInfo {
    lengths: Vec<u32>,
    mate_ids: Vec<FragId>,
    library_ids: Vec<u32>,
}

impl FragmentInfo {
    pub fn new() -> FragmentInfo {
        FragmentInfo {
            lengths: vec![0],
            mate_ids: vec![0],
            library_ids: vec![0],
        }
    }

    /// Fragments must be added in increasing id order with no gaps.
    pub fn push(&mut self, length: u32, mate_id: FragId, library_id: u32) -> FragId {
        self.lengths.push(length);
        self.mate_ids.push(mate_id);
        self.library_ids.push(library_id);
        (self.lengths.len() - 1) as FragId
    }

    #[inline]
    pub fn num_fragments(&self) -> u32 {
        (self.lengths.len() - 1) as u32
    }

    #[inline]
    pub fn length(&self, id: FragId) -> u32 {
        self.lengths[id as usize]
    }

    #[inline]
    pub fn mate_id(&self, id: FragId) -> FragId {
        self.mate_ids[id as usize]
    }

    #[inline]
    pub fn library_id(&self, id: FragId) -> u32 {
        self.library_ids[id as usize]
    }

    #[inline]
    pub fn valid(&self, id: FragId) -> bool {
        id != NULL_FRAG && (id as usize) < self.lengths.len()
    }
}

/// Insert-size distribution for one library, as supplied upstream and as
/// re-estimated by the mate checker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct LibraryStats {
    pub mean: f64,
    pub stddev: f64,
    pub samples: u32,
}

pub type LibraryTable = FxHashMap<u32, LibraryStats>;

/// Replaceable overlap scoring policy for best-edge selection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ScoreStrategy {
    /// Lower error rate wins; ties broken downstream by overlap length.
    ErrorRate,
    /// Longer overlap wins.
    Length,
    /// Longer overlap wins, but only above an identity floor.
    LengthIdent { min_identity: f64 },
}

impl ScoreStrategy {
    /// Score for one overlap record; 0 discards the overlap.
    pub fn score(&self, ovl: &Overlap, fi: &FragmentInfo) -> u64 {
        let olen = ovl.length(fi).max(0) as u64;
        if olen == 0 {
            return 0;
        }
        match *self {
            ScoreStrategy::ErrorRate => {
                ((1.0 - ovl.erate as f64).max(0.0) * 1_000_000_000.0) as u64
            }
            ScoreStrategy::Length => olen,
            ScoreStrategy::LengthIdent { min_identity } => {
                if (1.0 - ovl.erate as f64) < min_identity {
                    0
                } else {
                    olen
                }
            }
        }
    }
}

/// Tunables threaded through every phase; replaces ad-hoc globals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub score: ScoreStrategy,
    pub erate_cutoff: f64,
    pub min_overlap_len: i32,
    pub genome_size: u64,
    pub chunk_walk_limit: usize,
    pub min_break_frags: u32,
    pub min_break_length: i64,
    pub bubble_max_frags: usize,
    pub badmate_inter_stddev: f64,
    pub badmate_intra_stddev: f64,
    pub partitions: usize,
}

impl Default for PipelineConfig {
    fn default() -> PipelineConfig {
        use crate::constants::*;
        PipelineConfig {
            score: ScoreStrategy::ErrorRate,
            erate_cutoff: DEFAULT_ERATE_CUTOFF,
            min_overlap_len: MIN_OVERLAP_LEN,
            genome_size: 0,
            chunk_walk_limit: CHUNK_WALK_LIMIT,
            min_break_frags: MIN_BREAK_FRAGS,
            min_break_length: MIN_BREAK_LENGTH,
            bubble_max_frags: BUBBLE_MAX_FRAGS,
            badmate_inter_stddev: BADMATE_INTER_STDDEV,
            badmate_intra_stddev: BADMATE_INTRA_STDDEV,
            partitions: 1,
        }
    }
}

/// Index into an overlap stream grouped by a_id: for each fragment, the
/// half-open range of records where it is the A fragment.
#[derive(Debug, Clone, Default)]
pub struct OverlapIndex {
    ranges: Vec<(u32, u32)>,
}

impl OverlapIndex {
    pub fn build(overlaps: &[Overlap], num_frags: u32) -> OverlapIndex {
        let mut ranges = vec![(0u32, 0u32); num_frags as usize + 1];
        let mut i = 0;
        while i < overlaps.len() {
            let a = overlaps[i].a_id;
            let start = i;
            while i < overlaps.len() && overlaps[i].a_id == a {
                i += 1;
            }
            ranges[a as usize] = (start as u32, i as u32);
        }
        OverlapIndex { ranges }
    }

    pub fn overlaps_for<'a>(&self, overlaps: &'a [Overlap], id: FragId) -> &'a [Overlap] {
        let (s, e) = self.ranges[id as usize];
        &overlaps[s as usize..e as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlap_classification() {
        let contain = Overlap {
            a_id: 5,
            b_id: 4,
            a_hang: 10,
            b_hang: -10,
            flipped: false,
            erate: 0.01,
        };
        assert!(contain.a_contains_b());
        assert!(!contain.is_dovetail());

        let dove = Overlap {
            a_id: 1,
            b_id: 2,
            a_hang: 80,
            b_hang: 80,
            flipped: false,
            erate: 0.01,
        };
        assert!(dove.is_dovetail());
        assert_eq!(dove.a_end(), End::Three);
        assert_eq!(dove.b_end(), End::Five);

        let dove_flip = Overlap { flipped: true, ..dove };
        assert_eq!(dove_flip.b_end(), End::Three);
    }

    #[test]
    fn test_overlap_length() {
        let mut fi = FragmentInfo::new();
        fi.push(100, 0, 1);
        fi.push(100, 0, 1);
        // 20 bp dovetail off A's 3' end
        let dove = Overlap {
            a_id: 1,
            b_id: 2,
            a_hang: 80,
            b_hang: 80,
            flipped: false,
            erate: 0.0,
        };
        assert_eq!(dove.length(&fi), 20);

        // B fully inside A
        let contain = Overlap {
            a_id: 1,
            b_id: 2,
            a_hang: 10,
            b_hang: -10,
            flipped: false,
            erate: 0.0,
        };
        assert_eq!(contain.length(&fi), 80);
    }

    #[test]
    fn test_overlap_index() {
        let ovls = vec![
            Overlap { a_id: 1, b_id: 2, ..Default::default() },
            Overlap { a_id: 1, b_id: 3, ..Default::default() },
            Overlap { a_id: 3, b_id: 1, ..Default::default() },
        ];
        let idx = OverlapIndex::build(&ovls, 3);
        assert_eq!(idx.overlaps_for(&ovls, 1).len(), 2);
        assert_eq!(idx.overlaps_for(&ovls, 2).len(), 0);
        assert_eq!(idx.overlaps_for(&ovls, 3).len(), 1);
    }
}

// Overlap / best-edge selection
pub const DEFAULT_ERATE_CUTOFF: f64 = 0.06;
pub const MISMATCH_LIMIT: f64 = 2.5;
pub const MIN_OVERLAP_LEN: i32 = 40;

// Chunk graph
pub const CHUNK_WALK_LIMIT: usize = 30;

// Intersection breaking
pub const MIN_BREAK_FRAGS: u32 = 10;
pub const MIN_BREAK_LENGTH: i64 = 500;
pub const SMALL_BREAK_RATE_RATIO: f64 = 1.8;

// Arrival-rate statistics
pub const RHO_RECALIBRATION_MIN: f64 = 10000.0;
pub const LN2: f64 = 0.693_147_180_559_945_3;

// Bubble popping
pub const BUBBLE_MAX_FRAGS: usize = 30;
pub const BUBBLE_SPAN_SLACK: f64 = 0.25;
pub const BUBBLE_FRAG_STRETCH: f64 = 1.25;
pub const BUBBLE_MAX_UNCOVERED_FRACTION: f64 = 0.10;
pub const BUBBLE_CONFLICT_SLACK: usize = 2;
pub const MATE_BUBBLE_MIN_COUNT: usize = 5;

// Mate happiness
pub const MATE_TRIM_STDDEV: f64 = 5.0;
pub const BADMATE_INTER_STDDEV: f64 = 5.0;
pub const BADMATE_INTRA_STDDEV: f64 = BADMATE_INTER_STDDEV;
pub const MATE_PEAK_MIN_BAD: i32 = 3;

// Markers carried on mate-driven break points so they rank as "big"
pub const MATE_BREAK_SIZE: i64 = 100_000;
pub const MATE_BREAK_FRAGS: u32 = 11;

use clap::{Parser, ValueEnum};

use crate::constants::*;
use crate::types::{PipelineConfig, ScoreStrategy};

#[derive(Parser, Debug)]
#[command(
    name = "unitiger",
    about = "unitiger - best-overlap-graph unitig construction from pairwise fragment overlaps.",
    version,
    author
)]
pub struct Cli {
    /// Fragment table: id, length, mate_id, library_id (TSV)
    #[arg(short, long)]
    pub fragments: String,

    /// Overlap table grouped by a_id: a_id, b_id, a_hang, b_hang, N/I, erate (TSV)
    #[arg(short, long)]
    pub overlaps: String,

    /// Library table: lib_id, mean, stddev, sample_count (TSV)
    #[arg(short, long)]
    pub libraries: Option<String>,

    /// Output directory for results
    #[arg(short = 'd', long, default_value = "output")]
    pub output_dir: String,

    /// Number of threads to use for processing
    #[arg(short, long, default_value = "4")]
    pub threads: usize,

    /// Verbosity level
    #[arg(long, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Genome size in bases; 0 estimates the arrival rate from the data
    #[arg(short, long, default_value_t = 0)]
    pub genome_size: u64,

    /// Overlap scoring policy for best-edge selection
    #[arg(long, value_enum, default_value = "erate")]
    pub score: ScoreArg,

    /// Identity floor for the length-identity scoring policy
    #[arg(long, default_value_t = 0.985)]
    pub min_identity: f64,

    /// Discard overlaps above this error rate
    #[arg(short, long, default_value_t = DEFAULT_ERATE_CUTOFF)]
    pub erate_cutoff: f64,

    /// Minimum usable overlap length
    #[arg(long, default_value_t = MIN_OVERLAP_LEN)]
    pub min_overlap_len: i32,

    /// Incoming paths shorter than this many fragments are weak breaks
    #[arg(long, default_value_t = MIN_BREAK_FRAGS)]
    pub min_break_frags: u32,

    /// Incoming paths shorter than this many bases are weak breaks
    #[arg(long, default_value_t = MIN_BREAK_LENGTH)]
    pub min_break_length: i64,

    /// Largest unitig considered for bubble popping, in fragments
    #[arg(long, default_value_t = BUBBLE_MAX_FRAGS)]
    pub bubble_max_frags: usize,

    /// Bad-mate tolerance in library stddevs (mate in another unitig)
    #[arg(long, default_value_t = BADMATE_INTER_STDDEV)]
    pub badmate_inter_stddev: f64,

    /// Bad-mate tolerance in library stddevs (mate in the same unitig)
    #[arg(long, default_value_t = BADMATE_INTRA_STDDEV)]
    pub badmate_intra_stddev: f64,

    /// Skip the mate-evidence split pass
    #[arg(long)]
    pub no_mate_splits: bool,

    /// Number of consensus partitions to carve the output into
    #[arg(short, long, default_value_t = 1)]
    pub partitions: usize,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

#[derive(Debug, Copy, Clone, PartialEq, ValueEnum)]
pub enum ScoreArg {
    /// Lowest error rate wins
    Erate,
    /// Longest overlap wins
    Length,
    /// Longest overlap above the identity floor wins
    LengthIdent,
}

impl Cli {
    pub fn log_level_filter(&self) -> log::LevelFilter {
        match self.log_level {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            score: match self.score {
                ScoreArg::Erate => ScoreStrategy::ErrorRate,
                ScoreArg::Length => ScoreStrategy::Length,
                ScoreArg::LengthIdent => ScoreStrategy::LengthIdent {
                    min_identity: self.min_identity,
                },
            },
            erate_cutoff: self.erate_cutoff,
            min_overlap_len: self.min_overlap_len,
            genome_size: self.genome_size,
            min_break_frags: self.min_break_frags,
            min_break_length: self.min_break_length,
            bubble_max_frags: self.bubble_max_frags,
            badmate_inter_stddev: self.badmate_inter_stddev,
            badmate_intra_stddev: self.badmate_intra_stddev,
            partitions: self.partitions.max(1),
            ..PipelineConfig::default()
        }
    }
}

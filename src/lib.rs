pub mod types;
pub mod constants;
pub mod ovl_parse;
pub mod best_graph;
pub mod chunk_graph;
pub mod unitig;
pub mod unitig_graph;
pub mod breaking;
pub mod joining;
pub mod bubbles;
pub mod mates;
pub mod cli;
pub mod utils;

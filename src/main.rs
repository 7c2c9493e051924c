use std::io::{BufReader, BufWriter};
use std::path::Path;

use clap::Parser;

use unitiger::best_graph::BestOverlapGraph;
use unitiger::chunk_graph::ChunkGraph;
use unitiger::cli;
use unitiger::mates;
use unitiger::ovl_parse;
use unitiger::types::OverlapIndex;
use unitiger::unitig_graph::UnitigGraph;
use unitiger::utils::log_memory_usage;

fn main() {
    let args = cli::Cli::parse();

    // Initialize logger with CLI-specified level
    simple_logger::SimpleLogger::new()
        .with_level(args.log_level_filter())
        .init()
        .unwrap();

    rayon::ThreadPoolBuilder::new()
        .num_threads(args.threads)
        .build_global()
        .unwrap();

    let output_dir = Path::new(args.output_dir.as_str());
    if !output_dir.exists() {
        std::fs::create_dir_all(output_dir).unwrap();
    } else if !output_dir.is_dir() {
        log::error!("Output directory is not a directory.");
        std::process::exit(1);
    }

    let config = args.pipeline_config();

    log::info!("Reading fragment table...");
    let start = std::time::Instant::now();
    let fi = match ovl_parse::read_fragments(Path::new(&args.fragments)) {
        Ok(fi) => fi,
        Err(e) => {
            log::error!("Failed to read fragments: {}", e);
            std::process::exit(1);
        }
    };
    let mut libs = match &args.libraries {
        Some(path) => match ovl_parse::read_libraries(Path::new(path)) {
            Ok(libs) => libs,
            Err(e) => {
                log::error!("Failed to read libraries: {}", e);
                std::process::exit(1);
            }
        },
        None => Default::default(),
    };
    let overlaps = match ovl_parse::read_overlaps(Path::new(&args.overlaps), &fi) {
        Ok(o) => o,
        Err(e) => {
            log::error!("Failed to read overlaps: {}", e);
            std::process::exit(1);
        }
    };
    let oi = OverlapIndex::build(&overlaps, fi.num_fragments());
    log::info!(
        "Read {} fragments and {} overlap records in {:?}",
        fi.num_fragments(),
        overlaps.len(),
        start.elapsed()
    );
    log_memory_usage(false, "After loading input tables");

    let start = std::time::Instant::now();
    let checkpoint = output_dir.join("best_graph.bin");
    let mut bog: BestOverlapGraph = if checkpoint.exists() {
        log::info!("Resuming best overlap graph from {}", checkpoint.display());
        bincode::deserialize_from(BufReader::new(
            std::fs::File::open(&checkpoint).unwrap(),
        ))
        .unwrap()
    } else {
        let bog = BestOverlapGraph::build(&overlaps, &fi, &config);
        bincode::serialize_into(
            BufWriter::new(std::fs::File::create(&checkpoint).unwrap()),
            &bog,
        )
        .unwrap();
        bog
    };
    log::info!(
        "Best overlap graph: {} contained fragments, built in {:?}",
        bog.num_contained(),
        start.elapsed()
    );
    if let Err(e) = bog.report_best_edges(&output_dir.join("best_edges.tsv")) {
        log::warn!("Failed to write best edge report: {}", e);
    }

    let start = std::time::Instant::now();
    let mut cg = ChunkGraph::build(&bog, &config);
    let mut graph = UnitigGraph::build(&bog, &mut cg, &fi);
    log::info!(
        "Extracted {} unitigs in {:?}",
        graph.num_live(),
        start.elapsed()
    );
    log_memory_usage(false, "After path extraction");

    let start = std::time::Instant::now();
    graph.break_unitigs(&bog, &config);
    graph.join_unitigs(&bog, &fi);
    log::info!(
        "Intersection breaking and joining left {} unitigs in {:?}",
        graph.num_live(),
        start.elapsed()
    );

    let start = std::time::Instant::now();
    graph.place_contains(&mut bog, &fi);
    graph.place_zombies(&fi);
    graph.check_unitig_membership(&fi);
    log::info!("Placed contained fragments in {:?}", start.elapsed());

    let start = std::time::Instant::now();
    graph.pop_intersection_bubbles(&bog, &fi, &overlaps, &oi, &config);
    for mb in graph.find_mate_bubbles(&fi, &config) {
        log::debug!(
            "Mate bubble candidate: unitig {} against {} ({} mate links)",
            mb.bubble,
            mb.target,
            mb.mate_count
        );
    }
    log::info!(
        "Bubble popping left {} unitigs in {:?}",
        graph.num_live(),
        start.elapsed()
    );

    if !libs.is_empty() {
        let start = std::time::Instant::now();
        mates::recompute_library_stats(&graph, &fi, &mut libs);
        if !args.no_mate_splits {
            let split = graph.split_bad_mates(&bog, &fi, &libs, &config);
            log::info!("Split {} unitigs on bad mate evidence", split);
            graph.check_unitig_membership(&fi);
        }
        if let Err(e) = graph.write_happiness_summary(
            &output_dir.join("mate_happiness.tsv"),
            &fi,
            &libs,
            &config,
        ) {
            log::warn!("Failed to write mate happiness summary: {}", e);
        }
        log::info!("Mate evaluation finished in {:?}", start.elapsed());
    }

    graph.set_global_arrival_rate(&fi, &config);
    graph.refresh_stats(&fi);

    if let Err(e) = graph.write_layout(&output_dir.join("unitigs.layout"), &fi) {
        log::error!("Failed to write layout: {}", e);
        std::process::exit(1);
    }
    if let Err(e) = graph.write_partition_map(
        &output_dir.join("partitioning.tsv"),
        &fi,
        config.partitions,
    ) {
        log::error!("Failed to write partition map: {}", e);
        std::process::exit(1);
    }
    log_memory_usage(true, "Done");
    graph.print_statistics(&fi);
}

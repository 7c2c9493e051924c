use memory_stats::memory_stats;

pub fn log_memory_usage(info: bool, message: &str) {
    if let Some(usage) = memory_stats() {
        let gb = usage.physical_mem as f64 / 1_000_000_000.;
        if info {
            log::info!("{} --- Memory usage: {:.2} GB", message, gb);
        } else {
            log::debug!("{} --- Memory usage: {:.2} GB", message, gb);
        }
    } else {
        log::info!("Memory usage: unknown (WARNING)");
    }
}

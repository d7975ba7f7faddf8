use ferric_cuckoo::{CuckooFilter, FilterConfig, Workload};
use std::time::Instant;

/// Fill/verify passes per invocation
const ROUNDS: usize = 5;

/// Keys checked for false positives after each pass
const PROBE_KEYS: [u16; 8] = [1, 2, 17, 33, 1000, 4242, 8448, 65535];

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // RUST_LOG controls verbosity; CUCKOO_SEED pins victim selection
    let mut config = FilterConfig::default();
    if let Ok(seed) = std::env::var("CUCKOO_SEED") {
        config = config.with_seed(seed.parse()?);
    }

    let mut filter: CuckooFilter = config.build()?;
    let workload = Workload::for_filter(&filter);

    println!("Cuckoo filter workload");
    println!("{}", "=".repeat(40));
    println!(
        "{} buckets, {} keys, max {} relocations",
        filter.num_buckets(),
        workload.num_keys,
        filter.max_relocations()
    );

    for round in 0..ROUNDS {
        println!("start");
        let start = Instant::now();
        let stats = workload.run(&mut filter);
        let elapsed = start.elapsed();

        for key in &stats.failed_keys {
            println!("insert: key {:04x} failed", key);
        }
        for key in &stats.missing_keys {
            println!("lookup: key {:04x} not member", key);
        }

        let probes = workload.probe(&filter, PROBE_KEYS);
        println!("end");
        println!("{}", stats);
        println!(
            "round {}: {:?}, {} false positives in {} probes",
            round,
            elapsed,
            probes.false_positives.len(),
            probes.probed
        );
    }

    println!("\n{}", filter.stats());
    println!("\n{}", filter.snapshot());

    Ok(())
}

//! Basic usage examples for ferric-cuckoo

use ferric_cuckoo::cuckoo::FilterSnapshot;
use ferric_cuckoo::{CuckooError, CuckooFilter, FilterConfig, KeyGenerator, Workload};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Ferric Cuckoo Filter Examples ===\n");

    // Example 1: Basic insert and lookup
    println!("1. Basic Cuckoo Filter:");
    let mut filter = CuckooFilter::with_seed(128, 8, 7)?;

    let test_data: Vec<u16> = KeyGenerator::default().take(5).collect();
    for &item in &test_data {
        filter.insert(item);
    }

    for &item in &test_data {
        println!("  {} in filter: {}", item, filter.lookup(item));
    }
    for &item in &[1u16, 2, 3, 4, 5] {
        println!("  {} in filter: {}", item, filter.lookup(item));
    }

    println!("  {}", filter.stats());
    println!();

    // Example 2: Reference workload
    println!("2. Reference workload (N/4 keys):");
    let mut filter = FilterConfig::default().with_seed(1).build()?;
    let workload = Workload::for_filter(&filter);
    let stats = workload.run(&mut filter);
    println!("  {}", stats);
    let probes = workload.probe(&filter, 0..=200u16);
    println!(
        "  {} false positives in {} probes",
        probes.false_positives.len(),
        probes.probed
    );
    println!();

    // Example 3: Overfilling a tiny table
    println!("3. Eviction chain failures:");
    let mut tiny = CuckooFilter::with_seed(8, 4, 3)?;
    for key in KeyGenerator::default().take(12) {
        match tiny.try_insert(key) {
            Ok(placement) => println!(
                "  {:5} -> bucket {} ({} relocations)",
                key, placement.bucket, placement.relocations
            ),
            Err(CuckooError::InsertionFailed {
                lost_fingerprint, ..
            }) => println!("  {:5} -> lost fingerprint {:04x}", key, lost_fingerprint),
            Err(e) => return Err(e.into()),
        }
    }
    if let Some(advisory) = tiny.capacity_advisory() {
        println!("  advisory: {}", advisory);
    }
    println!();

    // Example 4: Snapshot for an external checkpoint
    println!("4. Snapshot and restore:");
    let snapshot = tiny.snapshot();
    print!("{}", snapshot);

    let saved = snapshot.into_buckets();
    let mut restored = CuckooFilter::with_seed(8, 4, 3)?;
    restored.restore(&FilterSnapshot::from_buckets(saved))?;
    println!("  restored occupancy: {}", restored.occupied());

    Ok(())
}

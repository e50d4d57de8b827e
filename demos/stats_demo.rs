use std::hash::BuildHasher;

use clap::Parser;
use robin_hash::HashTable;
use robin_hash::hash_table::Entry;
use robin_hash::storage::Flat;
use robin_hash::storage::Pooled;
use robin_hash::storage::StoragePolicy;
use siphasher::sip::SipHasher;

#[derive(Parser, Debug)]
struct Args {
    #[arg(short = 'c', long = "target_capacity", default_value_t = 1000)]
    target_capacity: usize,

    #[arg(short = 'l', long = "load_factor")]
    load_factor: Option<f32>,

    /// Remove and reinsert this many keys after filling the table.
    #[arg(long = "churn", default_value_t = 0)]
    churn: usize,

    /// Use pointer-stable pooled storage instead of flat storage.
    #[arg(short = 'p', long = "pooled")]
    pooled: bool,
}

#[derive(Clone, Default)]
struct SipBuilder;

impl BuildHasher for SipBuilder {
    type Hasher = SipHasher;

    fn build_hasher(&self) -> SipHasher {
        SipHasher::new()
    }
}

fn hash_u64(value: u64) -> u64 {
    SipBuilder.hash_one(value)
}

fn run<P: StoragePolicy>(args: &Args, policy: P) {
    let mut table: HashTable<u64, P> = match args.load_factor {
        Some(load_factor) => {
            HashTable::with_capacity_and_load_factor_in(args.target_capacity, load_factor, policy)
        }
        None => HashTable::with_capacity_in(args.target_capacity, policy),
    };

    println!(
        "Actual capacity: {} ({} buckets, max load factor {:.3})",
        table.capacity(),
        table.bucket_capacity(),
        table.max_load_factor()
    );

    let num_values = table.capacity() as u64;
    for value in 0..num_values {
        match table.entry(hash_u64(value), |&v| v == value) {
            Entry::Vacant(entry) => {
                entry.insert(value);
            }
            Entry::Occupied(_) => {
                panic!("Value already exists in table: {}", value);
            }
        }
    }

    for round in 0..args.churn as u64 {
        let old = round % num_values.max(1);
        table.remove(hash_u64(old), |&v| v == old);
        let fresh = num_values + round;
        table.insert_unique(hash_u64(fresh), fresh);
    }

    println!("Inserted {} values into table", table.len());
    table.print_probe_histogram();
    table.debug_stats().print();
}

fn main() {
    let args = Args::parse();

    println!(
        "Creating {} HashTable with target capacity: {}",
        if args.pooled { "pooled" } else { "flat" },
        args.target_capacity
    );

    if args.pooled {
        run(&args, Pooled);
    } else {
        run(&args, Flat);
    }
}

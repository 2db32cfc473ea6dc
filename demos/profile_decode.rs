use qs_codec::{DecodeOptions, decode};
use serde::Deserialize;
use std::collections::HashMap;
use std::hint::black_box;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Deserialize)]
#[allow(dead_code)]
struct Address {
    city: String,
    street: String,
    postcode: String,
}

#[derive(Debug, Clone, Deserialize)]
#[allow(dead_code)]
struct QueryParams {
    id: u8,
    name: String,
    phone: u32,
    address: Address,
    user_ids: Vec<u8>,
}

const COMPLEX_QUERY: &str = "id=42&name=Acme&phone=12345&address[city]=Carrot+City&\
                             address[street]=Special-Street*+No.+11&address[postcode]=12345&\
                             user_ids[0]=1&user_ids[1]=2&user_ids[2]=3&user_ids[3]=4";

fn main() {
    let profile_duration = Duration::from_secs(30);
    println!("Profiling decoding for {:?}...", profile_duration);

    match std::env::args().nth(1).as_deref() {
        Some("flat") => profile_flat(profile_duration),
        Some("deep") => profile_deep(profile_duration),
        Some("mixed") => profile_mixed_workload(profile_duration),
        _ => {
            println!("Usage: cargo run --release --example profile_decode [flat|deep|mixed]");
            println!("Defaulting to mixed workload...");
            profile_mixed_workload(profile_duration);
        }
    }
}

fn report(count: u64, elapsed: Duration) {
    println!("Completed {} decodes in {:?}", count, elapsed);
    println!("Average: {:?} per operation", elapsed / count.max(1) as u32);
}

fn profile_flat(duration: Duration) {
    println!("Running flat decoding profile...");
    let query: String = (0..200).map(|i| format!("key{i}=value{i}")).collect::<Vec<_>>().join("&");
    let options = DecodeOptions::new();

    let start = Instant::now();
    let mut count = 0u64;
    while start.elapsed() < duration {
        for _ in 0..100 {
            let _ = decode(black_box(&query), &options).unwrap();
            count += 1;
        }
    }
    report(count, start.elapsed());
}

fn profile_deep(duration: Duration) {
    println!("Running deep key decoding profile...");
    let mut query = String::from("a");
    for _ in 0..2000 {
        query.push_str("[b]");
    }
    query.push_str("=c");
    let options = DecodeOptions::new().depth(2000);

    let start = Instant::now();
    let mut count = 0u64;
    while start.elapsed() < duration {
        for _ in 0..10 {
            let _ = decode(black_box(&query), &options).unwrap();
            count += 1;
        }
    }
    report(count, start.elapsed());
}

fn profile_mixed_workload(duration: Duration) {
    println!("Running mixed workload profile...");

    let map_query = "key1=value1&key2=value2&key3=value3&key4=value4&key5=value5";
    let list_query: String = (0..100).map(|i| format!("a[]={i}")).collect::<Vec<_>>().join("&");
    let options = DecodeOptions::new();

    let start = Instant::now();
    let mut map_count = 0u64;
    let mut list_count = 0u64;
    let mut complex_count = 0u64;

    while start.elapsed() < duration {
        for _ in 0..100 {
            let _: HashMap<String, String> = qs_codec::from_str(black_box(map_query)).unwrap();
            map_count += 1;
        }

        for _ in 0..100 {
            let _ = decode(black_box(&list_query), &options).unwrap();
            list_count += 1;
        }

        for _ in 0..100 {
            let _: QueryParams = qs_codec::from_str(black_box(COMPLEX_QUERY)).unwrap();
            complex_count += 1;
        }
    }

    let elapsed = start.elapsed();
    let total = map_count + list_count + complex_count;

    println!("\nProfile complete:");
    println!("Total operations: {}", total);
    println!("- Map: {}", map_count);
    println!("- Overflowing list: {}", list_count);
    println!("- Struct: {}", complex_count);
    report(total, elapsed);
}

use qs_codec::{EncodeOptions, ListFormat, SharedValue, Value, encode};
use serde::Serialize;
use std::hint::black_box;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Serialize)]
struct Address {
    city: String,
    street: String,
    postcode: String,
}

#[derive(Debug, Clone, Serialize)]
struct QueryParams {
    id: u8,
    name: String,
    phone: u32,
    address: Address,
    user_ids: Vec<u8>,
}

fn query_params() -> QueryParams {
    QueryParams {
        id: 42,
        name: "Acme".to_string(),
        phone: 12345,
        address: Address {
            city: "Carrot City".to_string(),
            street: "Special-Street* No. 11".to_string(),
            postcode: "12345".to_string(),
        },
        user_ids: vec![1, 2, 3, 4],
    }
}

fn main() {
    let profile_duration = Duration::from_secs(30);
    println!("Profiling encoding for {:?}...", profile_duration);

    match std::env::args().nth(1).as_deref() {
        Some("wide") => profile_wide(profile_duration),
        Some("deep") => profile_deep(profile_duration),
        Some("mixed") => profile_mixed_workload(profile_duration),
        _ => {
            println!("Usage: cargo run --release --example profile_encode [wide|deep|mixed]");
            println!("Defaulting to mixed workload...");
            profile_mixed_workload(profile_duration);
        }
    }
}

fn report(count: u64, elapsed: Duration) {
    println!("Completed {} encodes in {:?}", count, elapsed);
    println!("Average: {:?} per operation", elapsed / count.max(1) as u32);
}

fn profile_wide(duration: Duration) {
    println!("Running wide map encoding profile...");
    let value: Value = (0..200)
        .map(|i| (format!("key{i}"), Value::from(format!("value {i}"))))
        .collect();
    let options = EncodeOptions::new();

    let start = Instant::now();
    let mut count = 0u64;
    while start.elapsed() < duration {
        for _ in 0..100 {
            let _ = encode(black_box(&value), &options).unwrap();
            count += 1;
        }
    }
    report(count, start.elapsed());
}

fn profile_deep(duration: Duration) {
    println!("Running deep chain encoding profile...");
    let mut value = Value::from("c");
    for _ in 0..2000 {
        value = [("b", value)].into_iter().collect();
    }
    let value: Value = [("a", value)].into_iter().collect();
    // the sort hook forces the frame-by-frame path
    let options = EncodeOptions::new().sort(|a, b| a.cmp(b));

    let start = Instant::now();
    let mut count = 0u64;
    while start.elapsed() < duration {
        for _ in 0..10 {
            let _ = encode(black_box(&value), &options).unwrap();
            count += 1;
        }
    }
    report(count, start.elapsed());
}

fn profile_mixed_workload(duration: Duration) {
    println!("Running mixed workload profile...");

    let params = query_params();
    let value = qs_codec::to_value(&params).unwrap();
    let shared = SharedValue::with_value(value.clone());
    let aliased: Value = (0..10)
        .map(|i| (format!("p{i}"), Value::Shared(shared.clone())))
        .collect();
    let comma = EncodeOptions::new()
        .list_format(ListFormat::Comma)
        .encode_values_only(true);
    let plain = EncodeOptions::new();

    let start = Instant::now();
    let mut struct_count = 0u64;
    let mut comma_count = 0u64;
    let mut shared_count = 0u64;

    while start.elapsed() < duration {
        for _ in 0..100 {
            let _ = qs_codec::to_string(black_box(&params)).unwrap();
            struct_count += 1;
        }

        for _ in 0..100 {
            let _ = encode(black_box(&value), &comma).unwrap();
            comma_count += 1;
        }

        for _ in 0..100 {
            let _ = encode(black_box(&aliased), &plain).unwrap();
            shared_count += 1;
        }
    }

    let elapsed = start.elapsed();
    let total = struct_count + comma_count + shared_count;

    println!("\nProfile complete:");
    println!("Total operations: {}", total);
    println!("- Struct: {}", struct_count);
    println!("- Comma lists: {}", comma_count);
    println!("- Shared subtrees: {}", shared_count);
    report(total, elapsed);
}

//! Basic usage examples for radish.

use radish::{RadixTree, RangeOptions, ScoreBound, Store};

fn main() {
    example_radix_tree();
    example_store();
    example_sorted_set();
}

fn example_radix_tree() {
    println!("=== RadixTree ===\n");

    let mut tree = RadixTree::new();
    tree.insert(b"/", "root").unwrap();
    tree.insert(b"/api", "api").unwrap();
    tree.insert(b"/api/v1/users", "users").unwrap();

    // Lookups
    println!("/api = {:?}", tree.get(b"/api"));
    let hit = tree.longest_prefix_match(b"/api/v1/users/42").map(|(k, v)| (String::from_utf8_lossy(k), *v));
    println!("route for /api/v1/users/42 = {:?}", hit);

    // Ordered iteration, both ways
    for (key, value) in tree.iter().rev() {
        println!("  {} -> {}", String::from_utf8_lossy(key), value);
    }
    println!("Count: {}\n", tree.len());
}

fn example_store() {
    println!("=== Store ===\n");

    let mut store = Store::new();
    let reader = store.reader();

    for i in 0..25 {
        store.set(format!("user:{:03}", i).as_bytes(), i.to_string().into_bytes()).unwrap();
    }
    let snapshot = reader.snapshot();
    println!("Removed {} keys under user:01", store.delete_prefix(b"user:01"));
    println!("Live keys: {}, snapshot keys: {}", store.len(), snapshot.len());

    // Page through what is left
    let mut cursor = "0".to_string();
    loop {
        let page = store.scan(&cursor, b"user:", Some(8)).unwrap();
        let keys: Vec<_> = page.entries.iter().map(|(k, _)| String::from_utf8_lossy(k)).collect();
        println!("  page: {:?}", keys);
        if page.is_done() {
            break;
        }
        cursor = page.cursor.to_string();
    }
    println!();
}

fn example_sorted_set() {
    println!("=== Sorted sets ===\n");

    let mut store = Store::new();
    store
        .zadd(
            b"leaderboard",
            [
                (310.0, "carol", Vec::new()),
                (120.0, "alice", Vec::new()),
                (310.0, "bob", Vec::new()),
                (95.5, "dave", Vec::new()),
            ],
        )
        .unwrap();

    let top = store.zrange_by_score(
        b"leaderboard",
        ScoreBound::Exclusive(100.0),
        ScoreBound::MAX,
        RangeOptions::default().rev().with_scores(),
    );
    for entry in &top {
        println!("  {} {:?}", String::from_utf8_lossy(entry.member), entry.score);
    }
    println!("Cardinality: {}", store.zcard(b"leaderboard"));
}

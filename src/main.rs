use std::sync::Arc;

use bramble::buffer::BufferPoolManager;
use bramble::index::{BPlusTree, IntegerComparator};
use bramble::storage::disk::DiskManager;
use bramble::{PageId, RecordId, SlotId};

fn main() {
    println!("Bramble - an educational disk-oriented storage core");
    println!("====================================================\n");

    let db_path = "demo.db";

    let disk_manager = Arc::new(DiskManager::new(db_path).expect("Failed to create disk manager"));
    println!("Created disk manager for: {}", db_path);

    let bpm = Arc::new(BufferPoolManager::new(16, disk_manager));
    println!("Created buffer pool with 16 frames\n");

    let mut tree = BPlusTree::new("demo_index", Arc::clone(&bpm), IntegerComparator, 4, 4, 5)
        .expect("Failed to create index");

    // Small fan-out so a handful of keys already exercises splits
    for key in [13u32, 7, 42, 1, 28, 19, 3, 56, 35, 21] {
        let record = RecordId::new(PageId::new(100 + key), SlotId::new(0));
        tree.insert(&key.to_le_bytes(), record)
            .expect("Failed to insert");
        println!("Inserted key {}", key);
    }

    println!(
        "\nRoot page after splits: {}",
        tree.root_page_id().expect("tree is non-empty")
    );

    let probe = 28u32;
    match tree.get_value(&probe.to_le_bytes()).expect("Lookup failed") {
        Some(record) => println!("Lookup {} -> {}", probe, record),
        None => println!("Lookup {} -> not found", probe),
    }

    println!("\nIterating in key order:");
    for entry in tree.begin().expect("Failed to build iterator") {
        let (key, record) = entry.expect("Iteration failed");
        let key = u32::from_le_bytes(key[..4].try_into().unwrap());
        println!("  {} -> {}", key, record);
    }

    for key in [7u32, 42, 1] {
        tree.remove(&key.to_le_bytes()).expect("Failed to remove");
        println!("Removed key {}", key);
    }

    println!("\nAfter removals:");
    for entry in tree.begin().expect("Failed to build iterator") {
        let (key, record) = entry.expect("Iteration failed");
        let key = u32::from_le_bytes(key[..4].try_into().unwrap());
        println!("  {} -> {}", key, record);
    }

    bpm.flush_all_pages().expect("Failed to flush");
    println!("\nFlushed all pages to disk");

    std::fs::remove_file(db_path).ok();
    println!("Demo completed successfully!");
}

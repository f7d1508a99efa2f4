use basalt::{Basalt, EngineConfig};

fn main() {
    println!("Basalt - a relational storage engine core in Rust");
    println!("==================================================\n");

    let db_dir = "basalt_demo";
    let cfg = EngineConfig {
        recreate: true,
        ..EngineConfig::default()
    };

    let db = Basalt::new(db_dir, cfg).expect("Failed to open database");
    println!("Opened database directory: {}", db_dir);

    // Write some values inside a transaction and commit them.
    let mut tx = db.new_tx().expect("Failed to start transaction");
    let blk = tx.append("demo.tbl").expect("Failed to append block");
    tx.pin(&blk).expect("Failed to pin block");
    tx.set_int(&blk, 80, 1, true).expect("Failed to write int");
    tx.set_string(&blk, 40, "one", true)
        .expect("Failed to write string");
    tx.unpin(&blk);
    tx.commit().expect("Failed to commit");
    println!("Committed: int 1 at offset 80, string \"one\" at offset 40");

    // A second transaction overwrites the values, then rolls back.
    let mut tx = db.new_tx().expect("Failed to start transaction");
    tx.pin(&blk).expect("Failed to pin block");
    tx.set_int(&blk, 80, 9999, true).expect("Failed to write int");
    println!("Wrote 9999 at offset 80, rolling back...");
    tx.rollback().expect("Failed to roll back");

    // The committed values survive.
    let mut tx = db.new_tx().expect("Failed to start transaction");
    tx.pin(&blk).expect("Failed to pin block");
    let i = tx.get_int(&blk, 80).expect("Failed to read int");
    let s = tx.get_string(&blk, 40).expect("Failed to read string");
    println!("After rollback: int = {}, string = \"{}\"", i, s);
    tx.unpin(&blk);
    tx.commit().expect("Failed to commit");

    std::fs::remove_dir_all(db_dir).ok();
    println!("\nDone.");
}

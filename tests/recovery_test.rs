use basalt::storage::Page;
use basalt::{Basalt, BlockId, EngineConfig};
use tempfile::TempDir;

const BLOCK_SIZE: usize = basalt::common::config::BLOCK_SIZE;

/// Commits values, then simulates losing the data pages (no-force): the
/// block on disk is reverted to stale bytes before reopening. Restart
/// recovery must redo the committed writes from the log.
#[test]
fn test_commit_survives_lost_page_writes() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("db");

    let blk;
    {
        let db = Basalt::open(&path).unwrap();
        let mut tx = db.new_tx().unwrap();
        blk = tx.append("t.tbl").unwrap();
        tx.pin(&blk).unwrap();
        tx.set_int(&blk, 80, 1, true).unwrap();
        tx.set_string(&blk, 40, "one", true).unwrap();
        tx.unpin(&blk);
        tx.commit().unwrap();

        // Crash simulation: the committed page write is undone on disk,
        // as if the buffer never reached stable storage.
        let stale = Page::new(BLOCK_SIZE);
        db.file_manager().write(&blk, &stale).unwrap();
    }

    let db = Basalt::open(&path).unwrap();
    let mut tx = db.new_tx().unwrap();
    tx.pin(&blk).unwrap();
    assert_eq!(tx.get_int(&blk, 80).unwrap(), 1);
    assert_eq!(tx.get_string(&blk, 40).unwrap(), "one");
    tx.unpin(&blk);
    tx.commit().unwrap();
}

/// An uncommitted transaction's writes reach disk (steal), then the process
/// dies. Restart recovery must undo them back to the committed values.
#[test]
fn test_uncommitted_flushed_writes_are_undone() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("db");

    let blk;
    {
        let db = Basalt::open(&path).unwrap();
        let mut tx = db.new_tx().unwrap();
        blk = tx.append("t.tbl").unwrap();
        tx.pin(&blk).unwrap();
        tx.set_int(&blk, 80, 1, true).unwrap();
        tx.unpin(&blk);
        tx.commit().unwrap();

        // Transaction B overwrites and its dirty page is stolen to disk,
        // but B never commits before the "crash".
        let mut tx_b = db.new_tx().unwrap();
        tx_b.pin(&blk).unwrap();
        tx_b.set_int(&blk, 80, 9999, true).unwrap();
        db.buffer_manager().flush_all(tx_b.tx_id()).unwrap();
        drop(tx_b);
    }

    let db = Basalt::open(&path).unwrap();
    let mut tx = db.new_tx().unwrap();
    tx.pin(&blk).unwrap();
    assert_eq!(tx.get_int(&blk, 80).unwrap(), 1);
    tx.unpin(&blk);
    tx.commit().unwrap();
}

#[test]
fn test_recovery_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("db");

    let blk;
    {
        let db = Basalt::open(&path).unwrap();
        let mut tx = db.new_tx().unwrap();
        blk = tx.append("t.tbl").unwrap();
        tx.pin(&blk).unwrap();
        tx.set_int(&blk, 0, 42, true).unwrap();
        tx.unpin(&blk);
        tx.commit().unwrap();
    }

    // Each reopen runs recovery; repeated runs leave the data unchanged.
    for _ in 0..3 {
        let db = Basalt::open(&path).unwrap();
        let mut tx = db.new_tx().unwrap();
        tx.pin(&blk).unwrap();
        assert_eq!(tx.get_int(&blk, 0).unwrap(), 42);
        tx.unpin(&blk);
        tx.commit().unwrap();
    }
}

/// Redo and undo write fixed images, so applying either twice leaves the
/// same state as applying it once.
#[test]
fn test_redo_and_undo_are_idempotent() {
    use basalt::tx::recovery::LogRecord;

    let dir = TempDir::new().unwrap();
    let db = Basalt::open(dir.path().join("db")).unwrap();

    let mut setup = db.new_tx().unwrap();
    let blk = setup.append("t.tbl").unwrap();
    setup.commit().unwrap();

    let rec = LogRecord::SetInt {
        tx: 999,
        blk: blk.clone(),
        offset: 12,
        old: 5,
        new: 7,
    };

    let mut tx = db.new_tx().unwrap();
    rec.redo(&mut tx).unwrap();
    rec.redo(&mut tx).unwrap();
    tx.pin(&blk).unwrap();
    assert_eq!(tx.get_int(&blk, 12).unwrap(), 7);
    tx.unpin(&blk);

    rec.undo(&mut tx).unwrap();
    rec.undo(&mut tx).unwrap();
    tx.pin(&blk).unwrap();
    assert_eq!(tx.get_int(&blk, 12).unwrap(), 5);
    tx.unpin(&blk);
    tx.commit().unwrap();
}

/// A checkpoint bounds the reverse pass: writes of transactions finished
/// before the checkpoint stay untouched even with junk later in the log.
#[test]
fn test_checkpoint_bounds_recovery() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("db");

    let blk;
    {
        let db = Basalt::open(&path).unwrap();
        let mut tx = db.new_tx().unwrap();
        blk = tx.append("t.tbl").unwrap();
        tx.pin(&blk).unwrap();
        tx.set_int(&blk, 0, 1, true).unwrap();
        tx.unpin(&blk);
        tx.commit().unwrap();
    }
    // First reopen writes a checkpoint after recovering.
    {
        let db = Basalt::open(&path).unwrap();
        let mut tx = db.new_tx().unwrap();
        tx.pin(&blk).unwrap();
        tx.set_int(&blk, 0, 2, true).unwrap();
        tx.unpin(&blk);
        tx.commit().unwrap();
    }
    let db = Basalt::open(&path).unwrap();
    let mut tx = db.new_tx().unwrap();
    tx.pin(&blk).unwrap();
    assert_eq!(tx.get_int(&blk, 0).unwrap(), 2);
    tx.unpin(&blk);
    tx.commit().unwrap();
}

/// With a tiny pool, eviction steals dirty pages mid-transaction; the WAL
/// ordering keeps rollback able to restore every old value.
#[test]
fn test_rollback_across_evictions() {
    let dir = TempDir::new().unwrap();
    let cfg = EngineConfig {
        pool_size: 2,
        ..EngineConfig::default()
    };
    let db = Basalt::new(dir.path().join("db"), cfg).unwrap();

    let mut setup = db.new_tx().unwrap();
    let blks: Vec<BlockId> = (0..6).map(|_| setup.append("t.tbl").unwrap()).collect();
    for blk in &blks {
        setup.pin(blk).unwrap();
        setup.set_int(blk, 0, 100, false).unwrap();
        setup.unpin(blk);
    }
    setup.commit().unwrap();

    let mut tx = db.new_tx().unwrap();
    for blk in &blks {
        tx.pin(blk).unwrap();
        tx.set_int(blk, 0, 200, true).unwrap();
        tx.unpin(blk);
    }
    tx.rollback().unwrap();

    let mut check = db.new_tx().unwrap();
    for blk in &blks {
        check.pin(blk).unwrap();
        assert_eq!(check.get_int(blk, 0).unwrap(), 100);
        check.unpin(blk);
    }
    check.commit().unwrap();
}

use std::fmt;

/// Log sequence number. One log-wide sequence, assigned at append time;
/// the total order defines what must be durable before what.
pub type Lsn = u64;

/// Transaction number, globally unique across the process.
pub type TxId = u64;

/// Block number reserved to mean "end of file". Locking this pseudo-block
/// serializes file-growth operations against concurrent size observations.
pub const END_OF_FILE: u64 = u64::MAX;

/// Logical address of one fixed-size block: a file name plus a block number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId {
    file_name: String,
    num: u64,
}

impl BlockId {
    pub fn new(file_name: impl Into<String>, num: u64) -> Self {
        Self {
            file_name: file_name.into(),
            num,
        }
    }

    /// The sentinel block used to lock file-size-changing operations.
    pub fn end_of_file(file_name: impl Into<String>) -> Self {
        Self::new(file_name, END_OF_FILE)
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn num(&self) -> u64 {
        self.num
    }

    pub fn is_end_of_file(&self) -> bool {
        self.num == END_OF_FILE
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_end_of_file() {
            write!(f, "[{}, eof]", self.file_name)
        } else {
            write!(f, "[{}, {}]", self.file_name, self.num)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_block_id_equality() {
        let a = BlockId::new("users.tbl", 3);
        let b = BlockId::new("users.tbl", 3);
        let c = BlockId::new("users.tbl", 4);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, BlockId::new("orders.tbl", 3));
    }

    #[test]
    fn test_block_id_hashable() {
        let mut map = HashMap::new();
        map.insert(BlockId::new("t", 0), 1);
        map.insert(BlockId::new("t", 1), 2);
        assert_eq!(map.get(&BlockId::new("t", 0)), Some(&1));
    }

    #[test]
    fn test_end_of_file_sentinel() {
        let eof = BlockId::end_of_file("t");
        assert!(eof.is_end_of_file());
        assert!(!BlockId::new("t", 0).is_end_of_file());
        assert_eq!(format!("{}", eof), "[t, eof]");
        assert_eq!(format!("{}", BlockId::new("t", 7)), "[t, 7]");
    }
}

use redb::TableDefinition;

/// Document collections: id -> field map (msgpack)
pub type Collection = TableDefinition<'static, &'static str, &'static [u8]>;

pub const USERS: Collection = TableDefinition::new("users");

pub const FILES: Collection = TableDefinition::new("files");

/// Last insertion sequence number handed out per collection
pub const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");

/// Collection holding documents for the named entity.
pub fn collection(name: &'static str) -> Collection {
    TableDefinition::new(name)
}

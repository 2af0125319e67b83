pub mod clock;
pub mod in_memory;
pub mod locks;
pub mod notifier;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;

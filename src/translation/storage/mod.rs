//! 存储模块
//!
//! 提供内容寻址的翻译缓存。

pub mod cache;

pub use cache::{
    cache_key, normalize, CacheRecord, CacheStatus, CacheStore, ContentCache, MemoryStore,
    RedbStore,
};

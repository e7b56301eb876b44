//! 翻译缓存模块
//!
//! 以规范化后的原文内容寻址：键为 `blake3(normalize(text))` 的十六进制摘要。
//! 两种存储实现共用 [`CacheStore`] 接口：
//! - [`RedbStore`]：磁盘持久化，单表 `translations`
//! - [`MemoryStore`]：进程内 LRU
//!
//! 存储层的任何错误都只记录警告：读取退化为未命中，写入退化为空操作。

use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use lru::LruCache;
use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition};
use serde::{Deserialize, Serialize};

use crate::translation::config::{constants, TranslationConfig};
use crate::translation::error::{helpers::cache_error, TranslationResult};

const TRANSLATIONS: TableDefinition<&str, &[u8]> = TableDefinition::new(constants::CACHE_TABLE_NAME);

// ============================================================================
// 核心类型
// ============================================================================

/// 持久化的缓存记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheRecord {
    pub hash: String,
    pub translation: String,
    /// 写入时间（Unix 毫秒）
    pub timestamp: u64,
    pub model_id: String,
}

/// 缓存状态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatus {
    pub count: usize,
    pub approx_size_bytes: usize,
}

/// 缓存存储后端
pub trait CacheStore: Send + Sync {
    fn get(&self, key: &str) -> TranslationResult<Option<CacheRecord>>;

    /// 批量读取，结果与 `keys` 一一对应
    fn get_many(&self, keys: &[String]) -> TranslationResult<Vec<Option<CacheRecord>>> {
        keys.iter().map(|key| self.get(key)).collect()
    }

    fn put(&self, record: CacheRecord) -> TranslationResult<()>;

    /// 批量写入
    fn put_many(&self, records: Vec<CacheRecord>) -> TranslationResult<()> {
        records.into_iter().try_for_each(|record| self.put(record))
    }

    fn clear(&self) -> TranslationResult<()>;

    fn status(&self) -> TranslationResult<CacheStatus>;
}

/// 规范化文本：统一换行、压缩空白、去除首尾空白
pub fn normalize(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");
    unified.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 生成缓存键
pub fn cache_key(text: &str) -> String {
    blake3::hash(normalize(text).as_bytes()).to_hex().to_string()
}

fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

// ============================================================================
// redb 存储
// ============================================================================

/// 基于 redb 的磁盘缓存
pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    /// 打开或创建缓存文件
    pub fn open(path: &Path) -> TranslationResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| cache_error(format!("创建缓存目录失败: {}", e)))?;
            }
        }

        let db = Database::create(path).map_err(cache_error)?;
        Ok(Self { db })
    }

    fn decode(bytes: &[u8]) -> TranslationResult<CacheRecord> {
        serde_json::from_slice(bytes).map_err(|e| cache_error(format!("缓存记录损坏: {}", e)))
    }
}

impl CacheStore for RedbStore {
    fn get(&self, key: &str) -> TranslationResult<Option<CacheRecord>> {
        Ok(self.get_many(&[key.to_string()])?.pop().flatten())
    }

    fn get_many(&self, keys: &[String]) -> TranslationResult<Vec<Option<CacheRecord>>> {
        let read_txn = self.db.begin_read().map_err(cache_error)?;
        let table = match read_txn.open_table(TRANSLATIONS) {
            Ok(table) => table,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(vec![None; keys.len()]),
            Err(e) => return Err(cache_error(e)),
        };

        let mut records = Vec::with_capacity(keys.len());
        for key in keys {
            let record = match table.get(key.as_str()).map_err(cache_error)? {
                Some(guard) => Some(Self::decode(guard.value())?),
                None => None,
            };
            records.push(record);
        }

        Ok(records)
    }

    fn put(&self, record: CacheRecord) -> TranslationResult<()> {
        self.put_many(vec![record])
    }

    /// 所有记录在同一个写事务中提交
    fn put_many(&self, records: Vec<CacheRecord>) -> TranslationResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        let write_txn = self.db.begin_write().map_err(cache_error)?;
        {
            let mut table = write_txn.open_table(TRANSLATIONS).map_err(cache_error)?;
            for record in &records {
                let bytes = serde_json::to_vec(record)?;
                table
                    .insert(record.hash.as_str(), bytes.as_slice())
                    .map_err(cache_error)?;
            }
        }
        write_txn.commit().map_err(cache_error)?;
        Ok(())
    }

    fn clear(&self) -> TranslationResult<()> {
        let write_txn = self.db.begin_write().map_err(cache_error)?;
        write_txn.delete_table(TRANSLATIONS).map_err(cache_error)?;
        write_txn.commit().map_err(cache_error)?;
        Ok(())
    }

    fn status(&self) -> TranslationResult<CacheStatus> {
        let read_txn = self.db.begin_read().map_err(cache_error)?;
        let table = match read_txn.open_table(TRANSLATIONS) {
            Ok(table) => table,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(CacheStatus::default()),
            Err(e) => return Err(cache_error(e)),
        };

        let count = table.len().map_err(cache_error)? as usize;
        let mut approx_size_bytes = 0;
        for entry in table.iter().map_err(cache_error)? {
            let (key, value) = entry.map_err(cache_error)?;
            approx_size_bytes += key.value().len() + value.value().len();
        }

        Ok(CacheStatus {
            count,
            approx_size_bytes,
        })
    }
}

// ============================================================================
// 内存存储
// ============================================================================

/// 进程内 LRU 缓存
pub struct MemoryStore {
    entries: Mutex<LruCache<String, CacheRecord>>,
}

impl MemoryStore {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn lock(&self) -> TranslationResult<std::sync::MutexGuard<'_, LruCache<String, CacheRecord>>> {
        self.entries
            .lock()
            .map_err(|_| cache_error("内存缓存锁已中毒"))
    }
}

impl CacheStore for MemoryStore {
    fn get(&self, key: &str) -> TranslationResult<Option<CacheRecord>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn put(&self, record: CacheRecord) -> TranslationResult<()> {
        self.lock()?.put(record.hash.clone(), record);
        Ok(())
    }

    fn clear(&self) -> TranslationResult<()> {
        self.lock()?.clear();
        Ok(())
    }

    fn status(&self) -> TranslationResult<CacheStatus> {
        let entries = self.lock()?;
        let approx_size_bytes = entries
            .iter()
            .map(|(key, record)| key.len() + record.translation.len() + record.model_id.len())
            .sum();

        Ok(CacheStatus {
            count: entries.len(),
            approx_size_bytes,
        })
    }
}

// ============================================================================
// 内容寻址缓存
// ============================================================================

/// 内容寻址的翻译缓存
pub struct ContentCache {
    store: Option<Box<dyn CacheStore>>,
    ttl: Duration,
}

impl ContentCache {
    pub fn new(store: Box<dyn CacheStore>, ttl: Duration) -> Self {
        Self {
            store: Some(store),
            ttl,
        }
    }

    /// 不读不写的空缓存
    pub fn disabled() -> Self {
        Self {
            store: None,
            ttl: constants::DEFAULT_CACHE_TTL,
        }
    }

    pub fn in_memory(capacity: usize, ttl: Duration) -> Self {
        Self::new(Box::new(MemoryStore::new(capacity)), ttl)
    }

    pub fn open(path: &Path, ttl: Duration) -> TranslationResult<Self> {
        Ok(Self::new(Box::new(RedbStore::open(path)?), ttl))
    }

    /// 按配置创建缓存，磁盘缓存打开失败时退回内存缓存
    pub fn from_config(config: &TranslationConfig) -> Self {
        if !config.cache_enabled {
            return Self::disabled();
        }

        match &config.cache_path {
            Some(path) => match Self::open(path, config.cache_ttl()) {
                Ok(cache) => {
                    tracing::debug!("使用磁盘缓存: {}", path.display());
                    cache
                }
                Err(e) => {
                    tracing::warn!("打开缓存文件失败，改用内存缓存: {}", e);
                    Self::in_memory(config.memory_cache_size, config.cache_ttl())
                }
            },
            None => Self::in_memory(config.memory_cache_size, config.cache_ttl()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// 读取译文，不存在或已过期返回 `None`
    pub fn get(&self, text: &str) -> Option<String> {
        self.get_at(text, now_ms())
    }

    /// 以给定时刻判断过期的读取
    pub fn get_at(&self, text: &str, now_ms: u64) -> Option<String> {
        self.get_many_at(&[text], now_ms).pop().flatten()
    }

    /// 批量读取，结果与 `texts` 一一对应
    pub fn get_many(&self, texts: &[&str]) -> Vec<Option<String>> {
        self.get_many_at(texts, now_ms())
    }

    fn get_many_at(&self, texts: &[&str], now_ms: u64) -> Vec<Option<String>> {
        let Some(store) = &self.store else {
            return vec![None; texts.len()];
        };

        let keys: Vec<String> = texts.iter().map(|text| cache_key(text)).collect();
        match store.get_many(&keys) {
            Ok(records) => records
                .into_iter()
                .map(|record| {
                    record
                        .filter(|record| !self.is_expired(record, now_ms))
                        .map(|record| record.translation)
                })
                .collect(),
            Err(e) => {
                tracing::warn!("读取缓存失败，按未命中处理: {}", e);
                vec![None; texts.len()]
            }
        }
    }

    /// 写入译文
    pub fn set(&self, text: &str, translation: &str, model_id: &str) {
        self.set_at(text, translation, model_id, now_ms());
    }

    /// 以给定时间戳写入
    pub fn set_at(&self, text: &str, translation: &str, model_id: &str, now_ms: u64) {
        self.set_many_at(&[(text, translation)], model_id, now_ms);
    }

    /// 批量写入 `(原文, 译文)`，一次提交
    pub fn set_many(&self, pairs: &[(&str, &str)], model_id: &str) {
        self.set_many_at(pairs, model_id, now_ms());
    }

    fn set_many_at(&self, pairs: &[(&str, &str)], model_id: &str, now_ms: u64) {
        let Some(store) = &self.store else {
            return;
        };
        if pairs.is_empty() {
            return;
        }

        let records = pairs
            .iter()
            .map(|(text, translation)| CacheRecord {
                hash: cache_key(text),
                translation: translation.to_string(),
                timestamp: now_ms,
                model_id: model_id.to_string(),
            })
            .collect();

        if let Err(e) = store.put_many(records) {
            tracing::warn!("写入缓存失败: {}", e);
        }
    }

    /// 清空缓存
    pub fn clear(&self) -> TranslationResult<()> {
        match &self.store {
            Some(store) => store.clear(),
            None => Ok(()),
        }
    }

    /// 缓存状态，读取失败时返回空状态
    pub fn status(&self) -> CacheStatus {
        let Some(store) = &self.store else {
            return CacheStatus::default();
        };

        store.status().unwrap_or_else(|e| {
            tracing::warn!("读取缓存状态失败: {}", e);
            CacheStatus::default()
        })
    }

    fn is_expired(&self, record: &CacheRecord, now_ms: u64) -> bool {
        now_ms.saturating_sub(record.timestamp) > self.ttl.as_millis() as u64
    }
}

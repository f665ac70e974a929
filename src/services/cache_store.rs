//! 缓存存储服务 - 业务能力层
//!
//! 基于 SQLite 的题目缓存：按请求与内容指纹存储题目及审核结果，
//! 提供近似查找、查重和清理能力。
//!
//! 每次调用都是一个独立的短事务（打开连接 → 操作 → 提交 → 关闭），
//! 多进程并发读写依赖 SQLite 自身的锁。

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, Row};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, error, warn};

use crate::error::CacheError;
use crate::models::{CacheEntry, GenerationRequest, Question, ValidationResult};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS question_cache (
        cache_key TEXT PRIMARY KEY,
        question_data TEXT NOT NULL,
        validation_data TEXT NOT NULL,
        created_at TEXT NOT NULL
    );
";

/// 查重时读取的缓存条目数量上限
pub const DUPLICATE_SCAN_LIMIT: usize = 50;

/// 默认查重阈值
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.8;

/// 统计中保留的键前缀长度
const KEY_PREFIX_LEN: usize = 10;

/// 缓存统计
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub top_cached_patterns: Vec<KeyPattern>,
}

/// 缓存键前缀及其条目数
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyPattern {
    pub pattern: String,
    pub count: usize,
}

/// SQLite 缓存存储
#[derive(Debug, Clone)]
pub struct CacheStore {
    db_path: PathBuf,
}

impl CacheStore {
    /// 打开（必要时创建）缓存数据库
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let db_path = db_path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| CacheError::Io {
                path: parent.display().to_string(),
                source,
            })?;
        }

        let store = Self { db_path };
        let conn = store.connect()?;
        conn.execute_batch(SCHEMA)?;
        Ok(store)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn connect(&self) -> Result<Connection, CacheError> {
        let conn = Connection::open(&self.db_path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(conn)
    }

    /// 写入缓存（键冲突时覆盖），返回缓存键
    pub fn cache_question(
        &self,
        request: &GenerationRequest,
        question: &Question,
        validation: &ValidationResult,
    ) -> Result<String, CacheError> {
        self.cache_question_at(request, question, validation, Utc::now())
    }

    pub(crate) fn cache_question_at(
        &self,
        request: &GenerationRequest,
        question: &Question,
        validation: &ValidationResult,
        created_at: DateTime<Utc>,
    ) -> Result<String, CacheError> {
        let cache_key = generate_cache_key(request, &question.statement);
        let question_data = serde_json::to_string(question)?;
        let validation_data = serde_json::to_string(validation)?;

        let conn = self.connect()?;
        conn.execute(
            "INSERT OR REPLACE INTO question_cache
                (cache_key, question_data, validation_data, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                cache_key,
                question_data,
                validation_data,
                format_timestamp(created_at)
            ],
        )?;

        debug!("💾 已写入缓存: {} ({})", cache_key, request.code);
        Ok(cache_key)
    }

    /// 查找与请求匹配（代码、题型、学科）的缓存条目，按创建时间倒序
    ///
    /// 只读取最近的 `max(50, 3 × limit)` 条记录并在内存中过滤。
    pub fn get_cached_questions(
        &self,
        request: &GenerationRequest,
        limit: usize,
    ) -> Result<Vec<CacheEntry>, CacheError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let window = DUPLICATE_SCAN_LIMIT.max(limit.saturating_mul(3));

        let entries = self
            .read_entries(Some(window))?
            .into_iter()
            .filter(|entry| matches_request(entry, request))
            .take(limit)
            .collect();

        Ok(entries)
    }

    /// 检查候选题目是否与已缓存题目过于相似（词集合 Jaccard 相似度）
    pub fn is_duplicate(
        &self,
        request: &GenerationRequest,
        candidate: &Question,
        similarity_threshold: f64,
    ) -> Result<bool, CacheError> {
        let cached = self.get_cached_questions(request, DUPLICATE_SCAN_LIMIT)?;

        let duplicate = cached.iter().any(|entry| {
            jaccard_similarity(&candidate.statement, &entry.question.statement)
                .is_some_and(|similarity| similarity >= similarity_threshold)
        });

        Ok(duplicate)
    }

    /// 全部缓存条目，按创建时间倒序
    pub fn get_all_entries(&self) -> Result<Vec<CacheEntry>, CacheError> {
        self.read_entries(None)
    }

    /// 删除早于 `now - older_than_days` 的条目，返回删除数量；失败时返回 0
    pub fn clear_cache(&self, older_than_days: u32) -> usize {
        // 天数超出时间范围时没有任何条目早于截止时间
        let Some(cutoff) = chrono::Duration::try_days(i64::from(older_than_days))
            .and_then(|age| Utc::now().checked_sub_signed(age))
        else {
            warn!("⚠️ 清理天数超出范围，未删除任何条目: {}", older_than_days);
            return 0;
        };
        match self.delete_before(cutoff) {
            Ok(deleted) => deleted,
            Err(e) => {
                error!("❌ 清理缓存失败: {}", e);
                0
            }
        }
    }

    fn delete_before(&self, cutoff: DateTime<Utc>) -> Result<usize, CacheError> {
        let conn = self.connect()?;
        let deleted = conn.execute(
            "DELETE FROM question_cache WHERE created_at < ?1",
            params![format_timestamp(cutoff)],
        )?;
        Ok(deleted)
    }

    /// 按缓存键删除；返回是否删除了条目
    pub fn remove_by_key(&self, cache_key: &str) -> bool {
        let result = self.connect().and_then(|conn| {
            conn.execute(
                "DELETE FROM question_cache WHERE cache_key = ?1",
                params![cache_key],
            )
            .map_err(CacheError::from)
        });

        match result {
            Ok(deleted) => deleted > 0,
            Err(e) => {
                error!("❌ 删除缓存条目失败 ({}): {}", cache_key, e);
                false
            }
        }
    }

    /// 按题干原文精确匹配删除；返回是否删除了条目
    pub fn remove_by_content(&self, statement: &str) -> bool {
        let result = self.get_all_entries().map(|entries| {
            entries
                .into_iter()
                .filter(|entry| entry.question.statement == statement)
                .map(|entry| entry.cache_key)
                .collect::<Vec<_>>()
        });

        match result {
            Ok(keys) => keys
                .iter()
                .fold(false, |removed, key| self.remove_by_key(key) || removed),
            Err(e) => {
                error!("❌ 按内容删除缓存失败: {}", e);
                false
            }
        }
    }

    /// 缓存统计：总条目数 + 前 10 个键前缀分布
    pub fn get_cache_stats(&self) -> Result<CacheStats, CacheError> {
        let conn = self.connect()?;

        let total_entries: i64 =
            conn.query_row("SELECT COUNT(*) FROM question_cache", [], |row| row.get(0))?;

        let mut stmt = conn.prepare(
            "SELECT COUNT(*) AS count, substr(cache_key, 1, ?1) AS key_prefix
             FROM question_cache
             GROUP BY key_prefix
             ORDER BY count DESC
             LIMIT 10",
        )?;
        let top_cached_patterns = stmt
            .query_map(params![KEY_PREFIX_LEN as i64], |row| {
                Ok(KeyPattern {
                    count: row.get::<_, i64>(0)? as usize,
                    pattern: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(CacheStats {
            total_entries: total_entries as usize,
            top_cached_patterns,
        })
    }

    /// 读取条目；无法反序列化的行记录警告后跳过
    fn read_entries(&self, limit: Option<usize>) -> Result<Vec<CacheEntry>, CacheError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT cache_key, question_data, validation_data, created_at
             FROM question_cache
             ORDER BY created_at DESC
             LIMIT ?1",
        )?;

        // SQLite 中 LIMIT -1 表示不限制
        let limit = limit.map_or(-1, |n| n as i64);
        let rows = stmt.query_map(params![limit], RawRow::from_row)?;

        let mut entries = Vec::new();
        for row in rows {
            let raw = row?;
            match raw.decode() {
                Ok(entry) => entries.push(entry),
                Err(reason) => warn!("⚠️ 跳过无法解析的缓存条目 {}: {}", raw.cache_key, reason),
            }
        }

        Ok(entries)
    }
}

/// 数据库中的原始行
struct RawRow {
    cache_key: String,
    question_data: String,
    validation_data: String,
    created_at: String,
}

impl RawRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            cache_key: row.get(0)?,
            question_data: row.get(1)?,
            validation_data: row.get(2)?,
            created_at: row.get(3)?,
        })
    }

    fn decode(&self) -> Result<CacheEntry, String> {
        let question: Question =
            serde_json::from_str(&self.question_data).map_err(|e| format!("question_data: {e}"))?;
        let validation: ValidationResult = serde_json::from_str(&self.validation_data)
            .map_err(|e| format!("validation_data: {e}"))?;
        let created_at = parse_timestamp(&self.created_at)
            .ok_or_else(|| format!("created_at: {}", self.created_at))?;

        Ok(CacheEntry {
            cache_key: self.cache_key.clone(),
            question,
            validation,
            created_at,
        })
    }
}

/// 缓存条目是否匹配请求：代码与题型必须一致；学科仅在缓存题目带学科时比较
fn matches_request(entry: &CacheEntry, request: &GenerationRequest) -> bool {
    let question = &entry.question;
    question.code == request.code
        && question.question_type == request.question_type
        && question
            .subject
            .map_or(true, |subject| subject == request.subject)
}

/// 计算缓存键
///
/// `sha256(规范 JSON {code, content_hash, question_type, subject})` 的前 16 位十六进制，
/// 其中 `content_hash` 是题干的短哈希，因此同一请求下不同题干得到不同的键。
pub fn generate_cache_key(request: &GenerationRequest, statement: &str) -> String {
    let content_hash = &sha256_hex(statement)[..8];
    // serde_json::Map 默认按键排序，输出即为规范形式
    let key_data = serde_json::json!({
        "code": request.code,
        "question_type": request.question_type.as_str(),
        "subject": request.subject.name(),
        "content_hash": content_hash,
    });
    sha256_hex(&key_data.to_string())[..16].to_string()
}

fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

/// 词集合 Jaccard 相似度（小写、按空白分词）；任一词集合为空时返回 `None`
pub fn jaccard_similarity(a: &str, b: &str) -> Option<f64> {
    let a_lower = a.to_lowercase();
    let b_lower = b.to_lowercase();
    let a_words: HashSet<&str> = a_lower.split_whitespace().collect();
    let b_words: HashSet<&str> = b_lower.split_whitespace().collect();

    if a_words.is_empty() || b_words.is_empty() {
        return None;
    }

    let intersection = a_words.intersection(&b_words).count();
    let union = a_words.union(&b_words).count();
    Some(intersection as f64 / union as f64)
}

/// 固定宽度的 RFC 3339 时间，保证文本比较与时间先后一致
fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    // 旧记录可能不带时区
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

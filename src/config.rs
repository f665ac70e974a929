use std::str::FromStr;

use crate::error::ConfigError;

/// 程序配置
#[derive(Clone, Debug)]
pub struct Config {
    /// BNCC 参考数据文件
    pub catalog_path: String,
    /// SQLite 缓存文件
    pub cache_db_path: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    /// 出题温度
    pub generation_temperature: f32,
    /// 审核温度（更低，结果更稳定）
    pub validation_temperature: f32,
    // --- 流程配置 ---
    /// 首次生成的最大尝试次数
    pub max_attempts: usize,
    /// 重新生成的最大尝试次数
    pub max_regeneration_attempts: usize,
    /// 查重的 Jaccard 相似度阈值
    pub similarity_threshold: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            catalog_path: "data/BNCC_4ano_Mapeamento.json".to_string(),
            cache_db_path: "db/questions_cache.db".to_string(),
            verbose_logging: false,
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.openai.com/v1".to_string(),
            llm_model_name: "gpt-4o-mini".to_string(),
            generation_temperature: 0.7,
            validation_temperature: 0.3,
            max_attempts: 3,
            max_regeneration_attempts: 8,
            similarity_threshold: 0.8,
        }
    }
}

impl Config {
    /// 从环境变量（及 `.env` 文件）加载配置，缺失或无法解析的项使用默认值
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let default = Self::default();
        Self {
            catalog_path: std::env::var("BNCC_DATA_PATH").unwrap_or(default.catalog_path),
            cache_db_path: std::env::var("CACHE_DB_PATH").unwrap_or(default.cache_db_path),
            verbose_logging: env_or("VERBOSE_LOGGING", default.verbose_logging),
            llm_api_key: std::env::var("OPENAI_API_KEY").unwrap_or(default.llm_api_key),
            llm_api_base_url: std::env::var("LLM_API_BASE_URL").unwrap_or(default.llm_api_base_url),
            llm_model_name: std::env::var("LLM_MODEL_NAME").unwrap_or(default.llm_model_name),
            generation_temperature: env_or("GENERATION_TEMPERATURE", default.generation_temperature),
            validation_temperature: env_or("VALIDATION_TEMPERATURE", default.validation_temperature),
            max_attempts: env_or("MAX_ATTEMPTS", default.max_attempts).max(1),
            max_regeneration_attempts: env_or(
                "MAX_REGENERATION_ATTEMPTS",
                default.max_regeneration_attempts,
            )
            .max(1),
            similarity_threshold: env_or("SIMILARITY_THRESHOLD", default.similarity_threshold),
        }
    }

    /// 调用 LLM 前检查必需配置
    pub fn require_llm_credentials(&self) -> Result<(), ConfigError> {
        if self.llm_api_key.trim().is_empty() {
            return Err(ConfigError::EnvVarNotFound {
                var_name: "OPENAI_API_KEY".to_string(),
            });
        }
        Ok(())
    }
}

/// 读取并解析环境变量；解析失败时记录警告并返回默认值
fn env_or<T: FromStr>(var_name: &str, default: T) -> T {
    match std::env::var(var_name) {
        Ok(value) => parse_env(var_name, &value).unwrap_or_else(|e| {
            tracing::warn!("⚠️ {}，使用默认值", e);
            default
        }),
        Err(_) => default,
    }
}

fn parse_env<T: FromStr>(var_name: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| ConfigError::EnvVarParseFailed {
            var_name: var_name.to_string(),
            value: value.to_string(),
            expected_type: std::any::type_name::<T>().to_string(),
        })
}

use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 参考数据 / 技能目录错误
    #[error("目录错误: {0}")]
    Catalog(#[from] CatalogError),
    /// 缓存存储错误
    #[error("缓存错误: {0}")]
    Cache(#[from] CacheError),
    /// LLM 服务错误
    #[error("LLM错误: {0}")]
    Llm(#[from] LlmError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 其他错误（用于包装第三方库错误）
    #[error("错误: {0}")]
    Other(String),
}

/// 技能目录错误
///
/// 均属于配置类错误：立即报告给调用方，不重试。
#[derive(Debug, Error)]
pub enum CatalogError {
    /// 参考数据文件不存在
    #[error("参考数据文件不存在: {path}")]
    NotFound { path: String },
    /// 读取文件失败
    #[error("读取参考数据文件失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// JSON 解析失败
    #[error("参考数据解析失败 ({path}): {source}")]
    ParseFailed {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    /// 未知技能代码
    #[error("技能代码不存在: {code}")]
    UnknownSkillCode { code: String },
}

/// 缓存存储错误
#[derive(Debug, Error)]
pub enum CacheError {
    /// 数据库操作失败
    #[error("数据库操作失败: {0}")]
    Database(#[from] rusqlite::Error),
    /// 文件系统错误（例如无法创建数据库目录）
    #[error("文件系统错误 ({path}): {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// 序列化失败
    #[error("序列化失败: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// LLM 服务错误
#[derive(Debug, Error)]
pub enum LlmError {
    /// API 调用失败
    #[error("LLM API调用失败 (模型: {model}): {message}")]
    ApiCallFailed { model: String, message: String },
    /// 返回内容为空
    #[error("LLM返回内容为空 (模型: {model})")]
    EmptyContent { model: String },
    /// 结构化输出不符合预期
    #[error("LLM返回格式错误: {reason}")]
    MalformedOutput { reason: String },
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
    /// 必需的环境变量不存在
    #[error("环境变量 {var_name} 不存在")]
    EnvVarNotFound { var_name: String },
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建未知技能代码错误
    pub fn unknown_skill_code(code: impl Into<String>) -> Self {
        AppError::Catalog(CatalogError::UnknownSkillCode { code: code.into() })
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_nests_source() {
        let err = AppError::unknown_skill_code("EF04XX99");
        assert_eq!(err.to_string(), "目录错误: 技能代码不存在: EF04XX99");

        let err: AppError = LlmError::EmptyContent {
            model: "gpt-4o-mini".to_string(),
        }
        .into();
        assert!(err.to_string().contains("gpt-4o-mini"));
    }
}

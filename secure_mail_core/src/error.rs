//! 错误类型定义

use thiserror::Error;

/// 错误类型
#[derive(Debug, Error)]
pub enum Error {
    /// Base64 解码失败
    #[error("Malformed base64: {0}")]
    Decode(String),

    /// 密钥编码无效（SPKI / PKCS#8）
    #[error("Invalid key encoding: {0}")]
    KeyFormat(String),

    /// 明文超过单次 OAEP 加密容量
    #[error("Plaintext of {len} bytes exceeds the {max}-byte OAEP capacity")]
    PayloadTooLarge { len: usize, max: usize },

    /// 收件人没有可用公钥
    #[error("No public key on file for recipient '{0}'")]
    RecipientKeyUnavailable(String),

    /// 无法解密（私钥不匹配或密文损坏）
    #[error("Content cannot be decrypted with the available private key")]
    UndecryptableContent,

    /// 密码学错误
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// 网络错误
    #[error("Network error: {0}")]
    Network(String),

    /// API 错误
    #[error("API error (code {code}): {message}")]
    Api { code: u16, message: String },

    /// 参数错误
    #[error("Invalid parameter: {0}")]
    InvalidParam(String),

    /// 状态错误
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// 记录不存在
    #[error("Not found: {0}")]
    NotFound(String),

    /// 记录已存在
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// 未认证错误
    #[error("Not authenticated")]
    NotAuthenticated,

    /// 存储错误
    #[error("Storage error: {0}")]
    Storage(String),

    /// JSON 错误
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO 错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// 结果类型
pub type Result<T> = std::result::Result<T, Error>;

//! 端到端加密邮件客户端核心库
//!
//! 提供安全邮件协议的客户端实现，包括：
//! - 密钥生成与导入导出（RSA-OAEP 2048 / SHA-256）
//! - 主题与正文加解密
//! - 发信（收件人副本 + 自留副本）、草稿、收件箱/已发送/草稿列表解密

pub mod audit;
pub mod backend;
pub mod cipher;
pub mod client;
pub mod codec;
pub mod error;
pub mod keys;
pub mod keystore;
pub mod memory;
pub mod protocol;
pub mod session;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use audit::TracingAuditSink;
pub use backend::{AuditSink, Directory, Storage};
pub use cipher::{Decrypted, MessageCipher, UNDECRYPTABLE_PLACEHOLDER};
pub use client::{ClientConfig, MailClient};
pub use error::{Error, Result};
pub use keys::{KeyPair, KeyPairProvider};
pub use keystore::KeyStore;
pub use memory::InMemoryBackend;
pub use protocol::MailProtocol;
pub use session::MailSession;
pub use types::*;

//! 客户端会话上下文：身份与密钥对
//!
//! 所有协议操作都显式接收 [`MailSession`]，不依赖全局状态。

use crate::backend::Directory;
use crate::error::{Error, Result};
use crate::keys::{KeyPair, KeyPairProvider};
use crate::keystore::KeyStore;
use tracing::{info, warn};

/// 会话上下文
#[derive(Debug, Clone)]
pub struct MailSession {
    identity: String,
    key_pair: KeyPair,
}

impl MailSession {
    pub fn new(identity: impl Into<String>, key_pair: KeyPair) -> Self {
        Self {
            identity: identity.into(),
            key_pair,
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn key_pair(&self) -> &KeyPair {
        &self.key_pair
    }

    /// 账户引导：读取本地密钥对；若不存在则生成、保存到本地并上传公钥。
    ///
    /// 返回会话以及本次是否生成了新密钥。
    pub async fn bootstrap(
        identity: &str,
        key_store: &KeyStore,
        directory: &dyn Directory,
        provider: &KeyPairProvider,
    ) -> Result<(Self, bool)> {
        if let Some(key_pair) = key_store.load(identity)? {
            return Ok((Self::new(identity, key_pair), false));
        }

        info!("No local key pair for {}, generating one", identity);
        let provider = provider.clone();
        let key_pair = tokio::task::spawn_blocking(move || provider.generate())
            .await
            .map_err(|e| Error::Crypto(format!("Key generation task failed: {}", e)))??;

        key_store.save(identity, &key_pair)?;
        let upload = match key_pair.public_key_base64() {
            Ok(public_key) => directory.upload_public_key(identity, &public_key).await,
            Err(e) => Err(e),
        };
        if let Err(e) = upload {
            // 未上传的密钥不保留，下次引导重新生成
            if let Err(remove_err) = key_store.remove(identity) {
                warn!("Failed to discard unpublished key pair: {}", remove_err);
            }
            return Err(e);
        }

        info!("Uploaded public key for {}", identity);
        Ok((Self::new(identity, key_pair), true))
    }
}

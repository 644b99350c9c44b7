//! 短文本（主题、正文）的 RSA-OAEP/SHA-256 加解密
//!
//! 单次加密的明文上限为 `k - 2*hLen - 2` 字节，2048 位密钥即 190 字节。
//! 解密永不向调用方抛错：任何失败都返回 [`Decrypted::Undecryptable`]，
//! 以便列表渲染时单条失败不影响其余记录。

use crate::codec::{base64_decode, base64_encode};
use crate::error::{Error, Result};
use rand::rngs::OsRng;
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use std::fmt;
use tracing::debug;

/// 无法解密时展示的占位文本
pub const UNDECRYPTABLE_PLACEHOLDER: &str = "(Unable to decrypt message)";

/// SHA-256 输出长度
const HASH_LEN: usize = 32;

/// 解密结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decrypted {
    Plaintext(String),
    Undecryptable,
}

impl Decrypted {
    pub fn is_plaintext(&self) -> bool {
        matches!(self, Decrypted::Plaintext(_))
    }

    /// 明文或占位文本
    pub fn as_str(&self) -> &str {
        match self {
            Decrypted::Plaintext(text) => text,
            Decrypted::Undecryptable => UNDECRYPTABLE_PLACEHOLDER,
        }
    }

    pub fn into_option(self) -> Option<String> {
        match self {
            Decrypted::Plaintext(text) => Some(text),
            Decrypted::Undecryptable => None,
        }
    }

    /// 需要真实明文的场景（如重新编辑草稿）转换为错误
    pub fn require(self) -> Result<String> {
        self.into_option().ok_or(Error::UndecryptableContent)
    }
}

impl fmt::Display for Decrypted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 消息加解密
pub struct MessageCipher;

impl MessageCipher {
    /// 指定公钥下单次 OAEP 的最大明文字节数
    pub fn max_payload(key: &RsaPublicKey) -> usize {
        key.size().saturating_sub(2 * HASH_LEN + 2)
    }

    /// 以 UTF-8 编码明文并用公钥加密
    pub fn encrypt(key: &RsaPublicKey, plaintext: &str) -> Result<Vec<u8>> {
        let data = plaintext.as_bytes();
        let max = Self::max_payload(key);
        if data.len() > max {
            return Err(Error::PayloadTooLarge {
                len: data.len(),
                max,
            });
        }

        key.encrypt(&mut OsRng, Oaep::new::<Sha256>(), data)
            .map_err(|e| Error::Crypto(e.to_string()))
    }

    /// 加密并输出 Base64 密文
    pub fn encrypt_to_base64(key: &RsaPublicKey, plaintext: &str) -> Result<String> {
        Self::encrypt(key, plaintext).map(|ciphertext| base64_encode(&ciphertext))
    }

    /// 用私钥解密，失败时返回占位结果
    pub fn decrypt(key: &RsaPrivateKey, ciphertext: &[u8]) -> Decrypted {
        let plaintext = match key.decrypt(Oaep::new::<Sha256>(), ciphertext) {
            Ok(plaintext) => plaintext,
            Err(e) => {
                debug!("OAEP decryption failed: {}", e);
                return Decrypted::Undecryptable;
            }
        };

        match String::from_utf8(plaintext) {
            Ok(text) => Decrypted::Plaintext(text),
            Err(_) => {
                debug!("Decrypted payload is not valid UTF-8");
                Decrypted::Undecryptable
            }
        }
    }

    /// 解密 Base64 密文，Base64 无效同样视为无法解密
    pub fn decrypt_from_base64(key: &RsaPrivateKey, encoded: &str) -> Decrypted {
        match base64_decode(encoded) {
            Ok(ciphertext) => Self::decrypt(key, &ciphertext),
            Err(e) => {
                debug!("Ciphertext is not valid base64: {}", e);
                Decrypted::Undecryptable
            }
        }
    }
}

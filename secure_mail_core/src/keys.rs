//! RSA-OAEP 密钥对的生成、导入与导出
//!
//! 公钥以 SubjectPublicKeyInfo (DER) 导出，私钥以 PKCS#8 (DER) 导出，
//! 二者在边界上都以 Base64 文本传输。私钥只保存在生成它的客户端本地。

use crate::codec::{base64_decode, base64_encode};
use crate::error::{Error, Result};
use rand::rngs::OsRng;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use std::fmt;
use tracing::debug;

/// 默认模长（位）
pub const DEFAULT_KEY_BITS: usize = 2048;

/// 导入时接受的最小模长（位）
pub const MIN_KEY_BITS: usize = 2048;

/// 加密用密钥对，仅用于加密（公钥）与解密（私钥），不用于签名
#[derive(Clone)]
pub struct KeyPair {
    pub public_key: RsaPublicKey,
    pub private_key: RsaPrivateKey,
}

impl KeyPair {
    /// 由私钥恢复完整密钥对
    pub fn from_private_key(private_key: RsaPrivateKey) -> Self {
        let public_key = RsaPublicKey::from(&private_key);
        Self {
            public_key,
            private_key,
        }
    }

    /// 公钥的 Base64 SPKI 编码，唯一允许上传的一半
    pub fn public_key_base64(&self) -> Result<String> {
        KeyPairProvider::export_public(&self.public_key)
    }

    /// 公钥指纹（SPKI 的 SHA-256，十六进制）
    pub fn fingerprint(&self) -> Result<String> {
        fingerprint(&self.public_key)
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("bits", &(self.public_key.size() * 8))
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// 密钥对提供者
#[derive(Debug, Clone)]
pub struct KeyPairProvider {
    bits: usize,
}

impl KeyPairProvider {
    /// 创建 2048 位密钥提供者
    pub fn new() -> Self {
        Self {
            bits: DEFAULT_KEY_BITS,
        }
    }

    /// 指定模长
    pub fn with_bits(bits: usize) -> Result<Self> {
        if bits < MIN_KEY_BITS {
            return Err(Error::InvalidParam(format!(
                "Key size {} is below the {}-bit minimum",
                bits, MIN_KEY_BITS
            )));
        }
        Ok(Self { bits })
    }

    pub fn bits(&self) -> usize {
        self.bits
    }

    /// 生成新的密钥对，每次调用相互独立
    pub fn generate(&self) -> Result<KeyPair> {
        debug!("Generating {}-bit RSA key pair", self.bits);
        let private_key =
            RsaPrivateKey::new(&mut OsRng, self.bits).map_err(|e| Error::Crypto(e.to_string()))?;
        Ok(KeyPair::from_private_key(private_key))
    }

    /// 导出公钥（SPKI → Base64）
    pub fn export_public(key: &RsaPublicKey) -> Result<String> {
        let der = key
            .to_public_key_der()
            .map_err(|e| Error::KeyFormat(e.to_string()))?;
        Ok(base64_encode(der.as_bytes()))
    }

    /// 导出私钥（PKCS#8 → Base64）
    pub fn export_private(key: &RsaPrivateKey) -> Result<String> {
        let der = key
            .to_pkcs8_der()
            .map_err(|e| Error::KeyFormat(e.to_string()))?;
        Ok(base64_encode(der.as_bytes()))
    }

    /// 导入公钥
    pub fn import_public(encoded: &str) -> Result<RsaPublicKey> {
        let der = base64_decode(encoded).map_err(|e| Error::KeyFormat(e.to_string()))?;
        let key = RsaPublicKey::from_public_key_der(&der)
            .map_err(|e| Error::KeyFormat(e.to_string()))?;
        check_modulus(key.size())?;
        Ok(key)
    }

    /// 导入私钥
    pub fn import_private(encoded: &str) -> Result<RsaPrivateKey> {
        let der = base64_decode(encoded).map_err(|e| Error::KeyFormat(e.to_string()))?;
        let key = RsaPrivateKey::from_pkcs8_der(&der)
            .map_err(|e| Error::KeyFormat(e.to_string()))?;
        check_modulus(key.size())?;
        Ok(key)
    }

    /// 从本地保存的两段 Base64 恢复密钥对，并校验两者匹配
    pub fn import_key_pair(public_b64: &str, private_b64: &str) -> Result<KeyPair> {
        let public_key = Self::import_public(public_b64)?;
        let private_key = Self::import_private(private_b64)?;
        if RsaPublicKey::from(&private_key) != public_key {
            return Err(Error::KeyFormat(
                "Public key does not match private key".to_string(),
            ));
        }
        Ok(KeyPair {
            public_key,
            private_key,
        })
    }
}

impl Default for KeyPairProvider {
    fn default() -> Self {
        Self::new()
    }
}

/// SPKI 编码的 SHA-256 指纹
pub fn fingerprint(key: &RsaPublicKey) -> Result<String> {
    let der = key
        .to_public_key_der()
        .map_err(|e| Error::KeyFormat(e.to_string()))?;
    Ok(hex::encode(Sha256::digest(der.as_bytes())))
}

fn check_modulus(size_bytes: usize) -> Result<()> {
    if size_bytes * 8 < MIN_KEY_BITS {
        return Err(Error::KeyFormat(format!(
            "{}-bit modulus is below the {}-bit minimum",
            size_bytes * 8,
            MIN_KEY_BITS
        )));
    }
    Ok(())
}

//! 单元测试共用的密钥夹具，避免重复生成 RSA 密钥

use crate::keys::{KeyPair, KeyPairProvider};
use crate::session::MailSession;
use std::sync::OnceLock;

fn cached(cell: &'static OnceLock<KeyPair>) -> &'static KeyPair {
    cell.get_or_init(|| KeyPairProvider::new().generate().unwrap())
}

pub fn alice() -> &'static KeyPair {
    static KEYS: OnceLock<KeyPair> = OnceLock::new();
    cached(&KEYS)
}

pub fn bob() -> &'static KeyPair {
    static KEYS: OnceLock<KeyPair> = OnceLock::new();
    cached(&KEYS)
}

pub fn session(identity: &str, keys: &KeyPair) -> MailSession {
    MailSession::new(identity, keys.clone())
}

//! 集成测试共用夹具

#![allow(dead_code)]

use secure_mail_core::{
    Directory, InMemoryBackend, KeyPair, KeyPairProvider, KeyStore, MailProtocol, MailSession,
};
use std::sync::{Arc, OnceLock};
use tempfile::TempDir;

/// 预生成的密钥对，按名字缓存
pub fn keys(name: &str) -> &'static KeyPair {
    static ALICE: OnceLock<KeyPair> = OnceLock::new();
    static BOB: OnceLock<KeyPair> = OnceLock::new();
    static MALLORY: OnceLock<KeyPair> = OnceLock::new();

    let cell = match name {
        "alice" => &ALICE,
        "bob" => &BOB,
        _ => &MALLORY,
    };
    cell.get_or_init(|| KeyPairProvider::new().generate().expect("key generation"))
}

/// 测试上下文：内存后端 + 临时密钥目录
pub struct TestContext {
    pub backend: Arc<InMemoryBackend>,
    pub protocol: MailProtocol,
    pub key_store: KeyStore,
    pub temp_dir: TempDir,
}

impl TestContext {
    pub fn new() -> Self {
        let backend = Arc::new(InMemoryBackend::new());
        let protocol = MailProtocol::new(backend.clone(), backend.clone())
            .with_audit(backend.clone());
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let key_store = KeyStore::new(temp_dir.path());

        TestContext {
            backend,
            protocol,
            key_store,
            temp_dir,
        }
    }

    /// 注册用户并以预生成密钥完成引导
    pub async fn sign_up(&self, name: &str) -> MailSession {
        self.backend
            .create_user(name, None)
            .await
            .expect("create user");
        self.key_store.save(name, keys(name)).expect("save keys");

        // 本地已有密钥时引导不会上传，这里补上首次登录时的上传
        self.backend
            .upload_public_key(name, &keys(name).public_key_base64().unwrap())
            .await
            .expect("upload public key");

        let (session, _) = MailSession::bootstrap(
            name,
            &self.key_store,
            self.backend.as_ref(),
            &KeyPairProvider::new(),
        )
        .await
        .expect("bootstrap");
        session
    }
}

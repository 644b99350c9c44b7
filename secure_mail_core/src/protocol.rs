//! 端到端加密邮件协议
//!
//! 协议流程：
//! 1. 发信：查询收件人公钥，主题/正文分别用收件人公钥与自己的公钥加密，
//!    四段密文一次性提交为一条消息记录
//! 2. 草稿：只用自己的公钥加密主题/正文，不校验收件人
//! 3. 读取：按视图选取对应密文对，用查看者私钥逐字段独立解密，
//!    失败字段以占位结果展示
//!
//! 加密全部完成之前不会调用存储，因此不会出现残缺的消息记录。

use crate::backend::{AuditSink, Directory, Storage};
use crate::cipher::{Decrypted, MessageCipher};
use crate::error::{Error, Result};
use crate::keys::KeyPairProvider;
use crate::keystore::KeyStore;
use crate::session::MailSession;
use crate::types::*;
use rsa::{RsaPrivateKey, RsaPublicKey};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// 同一公钥下的一对密文（Base64）
#[derive(Debug, Clone)]
struct SealedPair {
    subject: String,
    body: String,
}

/// 在阻塞线程池上加密主题与正文
fn seal_pair(key: RsaPublicKey, subject: String, body: String) -> JoinHandle<Result<SealedPair>> {
    tokio::task::spawn_blocking(move || {
        Ok(SealedPair {
            subject: MessageCipher::encrypt_to_base64(&key, &subject)?,
            body: MessageCipher::encrypt_to_base64(&key, &body)?,
        })
    })
}

/// 在阻塞线程池上解密一对密文
fn open_pair(key: RsaPrivateKey, subject: String, body: String) -> JoinHandle<(Decrypted, Decrypted)> {
    tokio::task::spawn_blocking(move || {
        (
            MessageCipher::decrypt_from_base64(&key, &subject),
            MessageCipher::decrypt_from_base64(&key, &body),
        )
    })
}

/// 等待解密的列表条目：标识、发件人、收件人、时间、解密任务
type PendingPreview = (
    RecordId,
    String,
    String,
    chrono::DateTime<chrono::Utc>,
    JoinHandle<(Decrypted, Decrypted)>,
);

async fn join_sealed(handle: JoinHandle<Result<SealedPair>>) -> Result<SealedPair> {
    handle
        .await
        .map_err(|e| Error::Crypto(format!("Encryption task failed: {}", e)))?
}

/// 协议实例
#[derive(Clone)]
pub struct MailProtocol {
    directory: Arc<dyn Directory>,
    storage: Arc<dyn Storage>,
    audit: Option<Arc<dyn AuditSink>>,
}

impl MailProtocol {
    /// 创建协议实例
    pub fn new(directory: Arc<dyn Directory>, storage: Arc<dyn Storage>) -> Self {
        Self {
            directory,
            storage,
            audit: None,
        }
    }

    /// 附加审计日志
    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// 账户引导，新生成的公钥上传后记录审计事件
    pub async fn bootstrap(
        &self,
        identity: &str,
        key_store: &KeyStore,
        provider: &KeyPairProvider,
    ) -> Result<(MailSession, bool)> {
        let (session, generated) =
            MailSession::bootstrap(identity, key_store, self.directory.as_ref(), provider).await?;
        if generated {
            self.audit(AuditEvent::new(AuditKind::KeyUploaded, identity, None))
                .await;
        }
        Ok((session, generated))
    }

    /// 发信
    pub async fn send(
        &self,
        session: &MailSession,
        to: &str,
        subject: &str,
        body: &str,
    ) -> Result<RecordId> {
        let to = to.trim();
        if to.is_empty() {
            return Err(Error::InvalidParam("Recipient is required".to_string()));
        }

        info!("Sending message from {} to {}", session.identity(), to);

        // 先确定收件人公钥，失败则不做任何加密
        let encoded = self
            .directory
            .lookup_public_key(to)
            .await?
            .ok_or_else(|| Error::RecipientKeyUnavailable(to.to_string()))?;
        let recipient_key = KeyPairProvider::import_public(&encoded)?;

        let for_recipient = seal_pair(recipient_key, subject.to_string(), body.to_string());
        let for_self = seal_pair(
            session.key_pair().public_key.clone(),
            subject.to_string(),
            body.to_string(),
        );
        let (for_recipient, for_self) =
            tokio::try_join!(join_sealed(for_recipient), join_sealed(for_self))?;

        let id = self
            .storage
            .create_message(NewMessage {
                from: session.identity().to_string(),
                to: to.to_string(),
                subject_for_recipient: for_recipient.subject,
                body_for_recipient: for_recipient.body,
                subject_for_self: for_self.subject,
                body_for_self: for_self.body,
            })
            .await?;

        self.audit(AuditEvent::new(
            AuditKind::MessageSent,
            session.identity(),
            Some(to),
        ))
        .await;

        info!("Message {} stored", id);
        Ok(id)
    }

    /// 保存草稿，只生成自留密文
    pub async fn save_draft(
        &self,
        session: &MailSession,
        to: &str,
        subject: &str,
        body: &str,
    ) -> Result<RecordId> {
        debug!("Saving draft for {}", session.identity());

        let sealed = join_sealed(seal_pair(
            session.key_pair().public_key.clone(),
            subject.to_string(),
            body.to_string(),
        ))
        .await?;

        let id = self
            .storage
            .create_draft(NewDraft {
                owner: session.identity().to_string(),
                to: to.trim().to_string(),
                subject_encrypted: sealed.subject,
                body_encrypted: sealed.body,
            })
            .await?;

        self.audit(AuditEvent::new(AuditKind::DraftSaved, session.identity(), None))
            .await;

        Ok(id)
    }

    /// 列出并解密指定视图
    pub async fn list(&self, session: &MailSession, mailbox: Mailbox) -> Result<Vec<MailPreview>> {
        match mailbox {
            Mailbox::Inbox => self.inbox(session).await,
            Mailbox::Sent => self.sent(session).await,
            Mailbox::Drafts => self.drafts(session).await,
        }
    }

    /// 收件箱：解密收件人副本
    pub async fn inbox(&self, session: &MailSession) -> Result<Vec<MailPreview>> {
        let records = self
            .storage
            .list_messages(MessageFilter::ReceivedBy(session.identity().to_string()))
            .await?;

        let items = records
            .into_iter()
            .filter(|m| self.owned_by(session, &m.to, m.id))
            .map(|m| {
                let handle = open_pair(
                    session.key_pair().private_key.clone(),
                    m.subject_for_recipient,
                    m.body_for_recipient,
                );
                (m.id, m.from, m.to, m.timestamp, handle)
            })
            .collect();

        Ok(Self::collect(items).await)
    }

    /// 已发送：解密自留副本
    pub async fn sent(&self, session: &MailSession) -> Result<Vec<MailPreview>> {
        let records = self
            .storage
            .list_messages(MessageFilter::SentBy(session.identity().to_string()))
            .await?;

        let items = records
            .into_iter()
            .filter(|m| self.owned_by(session, &m.from, m.id))
            .map(|m| {
                let handle = open_pair(
                    session.key_pair().private_key.clone(),
                    m.subject_for_self,
                    m.body_for_self,
                );
                (m.id, m.from, m.to, m.timestamp, handle)
            })
            .collect();

        Ok(Self::collect(items).await)
    }

    /// 草稿箱
    pub async fn drafts(&self, session: &MailSession) -> Result<Vec<MailPreview>> {
        let records = self.storage.list_drafts(session.identity()).await?;

        let items = records
            .into_iter()
            .filter(|d| d.owner.is_empty() || self.owned_by(session, &d.owner, d.id))
            .map(|d| {
                let handle = open_pair(
                    session.key_pair().private_key.clone(),
                    d.subject_encrypted,
                    d.body_encrypted,
                );
                (d.id, session.identity().to_string(), d.to, d.timestamp, handle)
            })
            .collect();

        Ok(Self::collect(items).await)
    }

    /// 重新打开草稿用于编辑，解密存储的密文填充撰写表单。
    ///
    /// 编辑即：重新打开 → 删除旧草稿 → 重新保存。
    pub async fn reopen_draft(&self, session: &MailSession, id: RecordId) -> Result<Compose> {
        let draft = self
            .storage
            .list_drafts(session.identity())
            .await?
            .into_iter()
            .find(|d| d.id == id && (d.owner.is_empty() || d.owner == session.identity()))
            .ok_or_else(|| Error::NotFound(format!("draft {}", id)))?;

        let (subject, body) = open_pair(
            session.key_pair().private_key.clone(),
            draft.subject_encrypted,
            draft.body_encrypted,
        )
        .await
        .map_err(|e| Error::Crypto(format!("Decryption task failed: {}", e)))?;

        Ok(Compose {
            to: draft.to,
            subject: subject.require()?,
            body: body.require()?,
        })
    }

    /// 删除消息
    pub async fn delete_message(&self, session: &MailSession, id: RecordId) -> Result<()> {
        self.storage.delete_message(session.identity(), id).await?;
        info!("Deleted message {}", id);
        Ok(())
    }

    /// 删除草稿
    pub async fn delete_draft(&self, session: &MailSession, id: RecordId) -> Result<()> {
        self.storage.delete_draft(session.identity(), id).await?;
        info!("Deleted draft {}", id);
        Ok(())
    }

    fn owned_by(&self, session: &MailSession, party: &str, id: RecordId) -> bool {
        if party == session.identity() {
            return true;
        }
        warn!(
            "Storage returned record {} belonging to {}, skipping",
            id, party
        );
        false
    }

    /// 按列表顺序收集解密结果，任务异常时退化为占位结果
    async fn collect(items: Vec<PendingPreview>) -> Vec<MailPreview> {
        let mut previews = Vec::with_capacity(items.len());
        for (id, from, to, timestamp, handle) in items {
            let (subject, body) = match handle.await {
                Ok(pair) => pair,
                Err(e) => {
                    warn!("Decryption task for {} failed: {}", id, e);
                    (Decrypted::Undecryptable, Decrypted::Undecryptable)
                }
            };
            previews.push(MailPreview {
                id,
                from,
                to,
                subject,
                body,
                timestamp,
            });
        }
        previews
    }

    async fn audit(&self, event: AuditEvent) {
        if let Some(sink) = &self.audit {
            if let Err(e) = sink.record(event).await {
                warn!("Failed to record audit event: {}", e);
            }
        }
    }
}

//! 协议依赖的外部协作方：公钥目录、记录存储、审计日志
//!
//! 核心只通过这些 trait 与服务端交互，网络或持久化失败原样向上传递。

use crate::error::Result;
use crate::types::{
    AuditEvent, DraftRecord, MessageFilter, MessageRecord, NewDraft, NewMessage, RecordId,
};
use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

/// 公钥目录
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Directory: Send + Sync {
    /// 查询用户的 Base64 公钥，用户不存在或从未上传时返回 `None`
    async fn lookup_public_key(&self, username: &str) -> Result<Option<String>>;

    /// 上传（覆盖）用户公钥
    async fn upload_public_key(&self, username: &str, public_key: &str) -> Result<()>;
}

/// 消息与草稿存储
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Storage: Send + Sync {
    async fn create_message(&self, message: NewMessage) -> Result<RecordId>;

    async fn create_draft(&self, draft: NewDraft) -> Result<RecordId>;

    async fn list_messages(&self, filter: MessageFilter) -> Result<Vec<MessageRecord>>;

    async fn list_drafts(&self, owner: &str) -> Result<Vec<DraftRecord>>;

    /// 按标识删除，`viewer` 须为发件人或收件人
    async fn delete_message(&self, viewer: &str, id: RecordId) -> Result<()>;

    async fn delete_draft(&self, owner: &str, id: RecordId) -> Result<()>;
}

/// 审计日志
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: AuditEvent) -> Result<()>;
}

//! 数据类型定义

use crate::cipher::Decrypted;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 消息、草稿的稳定标识，创建时由存储端分配
pub type RecordId = Uuid;

/// 用户记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub username: String,
    /// Base64 SPKI，首次上传前为空
    #[serde(rename = "publicKey", default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
}

/// 已存储的消息，四个内容字段均为 Base64 密文
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: RecordId,
    pub from: String,
    pub to: String,
    /// 收件箱列表不下发自留副本，已发送列表不下发收件人副本
    #[serde(rename = "subjectForRecipient", default)]
    pub subject_for_recipient: String,
    #[serde(rename = "bodyForRecipient", default)]
    pub body_for_recipient: String,
    #[serde(rename = "subjectForSelf", default)]
    pub subject_for_self: String,
    #[serde(rename = "bodyForSelf", default)]
    pub body_for_self: String,
    pub timestamp: DateTime<Utc>,
}

/// 待提交的消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessage {
    pub from: String,
    pub to: String,
    #[serde(rename = "subjectForRecipient")]
    pub subject_for_recipient: String,
    #[serde(rename = "bodyForRecipient")]
    pub body_for_recipient: String,
    #[serde(rename = "subjectForSelf")]
    pub subject_for_self: String,
    #[serde(rename = "bodyForSelf")]
    pub body_for_self: String,
}

/// 已存储的草稿，仅所有者私钥可解
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftRecord {
    pub id: RecordId,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub to: String,
    #[serde(rename = "subjectEncrypted")]
    pub subject_encrypted: String,
    #[serde(rename = "bodyEncrypted")]
    pub body_encrypted: String,
    pub timestamp: DateTime<Utc>,
}

/// 待提交的草稿
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDraft {
    pub owner: String,
    pub to: String,
    #[serde(rename = "subjectEncrypted")]
    pub subject_encrypted: String,
    #[serde(rename = "bodyEncrypted")]
    pub body_encrypted: String,
}

/// 消息列表过滤条件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageFilter {
    /// 收件箱
    ReceivedBy(String),
    /// 已发送
    SentBy(String),
}

/// 列表视图
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mailbox {
    Inbox,
    Sent,
    Drafts,
}

/// 解密后用于展示的条目
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailPreview {
    pub id: RecordId,
    pub from: String,
    pub to: String,
    pub subject: Decrypted,
    pub body: Decrypted,
    pub timestamp: DateTime<Utc>,
}

/// 撰写表单内容（明文，仅存在于客户端内存）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compose {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// 审计事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AuditKind {
    KeyUploaded,
    MessageSent,
    DraftSaved,
}

/// 审计事件，只追加
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub kind: AuditKind,
    pub time: DateTime<Utc>,
    pub actor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
}

impl AuditEvent {
    pub fn new(kind: AuditKind, actor: &str, subject: Option<&str>) -> Self {
        Self {
            kind,
            time: Utc::now(),
            actor: actor.to_string(),
            subject: subject.map(str::to_string),
        }
    }
}

/// 服务端错误响应体
#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
    pub error: String,
}

/// 公钥查询响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicKeyResponse {
    #[serde(rename = "publicKey")]
    pub public_key: String,
}

/// 创建记录响应
#[derive(Debug, Clone, Deserialize)]
pub struct CreatedResponse {
    pub success: bool,
    pub id: RecordId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_record_wire_names() {
        let json = serde_json::json!({
            "id": "6f9619ff-8b86-4011-b42d-00c04fc964ff",
            "from": "alice",
            "to": "bob",
            "subjectForRecipient": "c3Vi",
            "bodyForRecipient": "Ym9keQ==",
            "timestamp": "2024-05-01T12:00:00.000Z",
        });
        let record: MessageRecord = serde_json::from_value(json).unwrap();
        assert_eq!(record.subject_for_recipient, "c3Vi");
        assert!(record.subject_for_self.is_empty());
        assert_eq!(record.timestamp.to_rfc3339(), "2024-05-01T12:00:00+00:00");
    }

    #[test]
    fn test_draft_record_without_owner() {
        let json = serde_json::json!({
            "id": "6f9619ff-8b86-4011-b42d-00c04fc964ff",
            "to": "bob",
            "subjectEncrypted": "YQ==",
            "bodyEncrypted": "Yg==",
            "timestamp": "2024-05-01T12:00:00Z",
        });
        let record: DraftRecord = serde_json::from_value(json).unwrap();
        assert!(record.owner.is_empty());
        assert_eq!(record.to, "bob");
    }

    #[test]
    fn test_new_message_serialization() {
        let message = NewMessage {
            from: "alice".into(),
            to: "bob".into(),
            subject_for_recipient: "a".into(),
            body_for_recipient: "b".into(),
            subject_for_self: "c".into(),
            body_for_self: "d".into(),
        };
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["subjectForSelf"], "c");
        assert_eq!(value["bodyForRecipient"], "b");
    }

    #[test]
    fn test_audit_kind_serialization() {
        let event = AuditEvent::new(AuditKind::MessageSent, "alice", Some("bob"));
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["kind"], "messageSent");
        assert_eq!(value["subject"], "bob");
    }
}

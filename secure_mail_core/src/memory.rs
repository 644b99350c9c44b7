//! 内存后端，同时实现公钥目录、存储与审计日志
//!
//! 行为与服务端一致：用户名唯一、创建时分配标识与时间、
//! 拒绝发往不存在用户的消息、按查看者过滤列表。

use crate::backend::{AuditSink, Directory, Storage};
use crate::error::{Error, Result};
use crate::types::*;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Default)]
struct State {
    users: HashMap<String, UserRecord>,
    messages: Vec<MessageRecord>,
    drafts: Vec<DraftRecord>,
    events: Vec<AuditEvent>,
}

/// 内存后端
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    state: RwLock<State>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建账户，公钥可选
    pub async fn create_user(&self, username: &str, public_key: Option<&str>) -> Result<()> {
        let mut state = self.state.write().await;
        if state.users.contains_key(username) {
            return Err(Error::AlreadyExists(format!("user {}", username)));
        }
        state.users.insert(
            username.to_string(),
            UserRecord {
                username: username.to_string(),
                public_key: public_key.map(str::to_string),
            },
        );
        debug!("Created user {}", username);
        Ok(())
    }

    /// 删除账户及其收发的全部消息和草稿
    pub async fn delete_user(&self, username: &str) -> Result<()> {
        let mut state = self.state.write().await;
        if state.users.remove(username).is_none() {
            return Err(Error::NotFound(format!("user {}", username)));
        }
        state
            .messages
            .retain(|m| m.from != username && m.to != username);
        state.drafts.retain(|d| d.owner != username);
        Ok(())
    }

    pub async fn user(&self, username: &str) -> Option<UserRecord> {
        self.state.read().await.users.get(username).cloned()
    }

    pub async fn message_count(&self) -> usize {
        self.state.read().await.messages.len()
    }

    pub async fn draft_count(&self) -> usize {
        self.state.read().await.drafts.len()
    }

    /// 全部消息，不做查看者过滤
    pub async fn all_messages(&self) -> Vec<MessageRecord> {
        self.state.read().await.messages.clone()
    }

    /// 全部草稿，不做所有者过滤
    pub async fn all_drafts(&self) -> Vec<DraftRecord> {
        self.state.read().await.drafts.clone()
    }

    pub async fn events(&self) -> Vec<AuditEvent> {
        self.state.read().await.events.clone()
    }
}

#[async_trait]
impl Directory for InMemoryBackend {
    async fn lookup_public_key(&self, username: &str) -> Result<Option<String>> {
        let state = self.state.read().await;
        Ok(state
            .users
            .get(username)
            .and_then(|user| user.public_key.clone()))
    }

    async fn upload_public_key(&self, username: &str, public_key: &str) -> Result<()> {
        let mut state = self.state.write().await;
        let user = state
            .users
            .get_mut(username)
            .ok_or_else(|| Error::NotFound(format!("user {}", username)))?;
        user.public_key = Some(public_key.to_string());
        Ok(())
    }
}

#[async_trait]
impl Storage for InMemoryBackend {
    async fn create_message(&self, message: NewMessage) -> Result<RecordId> {
        let mut state = self.state.write().await;
        if !state.users.contains_key(&message.to) {
            return Err(Error::NotFound(format!("recipient {}", message.to)));
        }

        let id = Uuid::new_v4();
        state.messages.push(MessageRecord {
            id,
            from: message.from,
            to: message.to,
            subject_for_recipient: message.subject_for_recipient,
            body_for_recipient: message.body_for_recipient,
            subject_for_self: message.subject_for_self,
            body_for_self: message.body_for_self,
            timestamp: Utc::now(),
        });
        Ok(id)
    }

    async fn create_draft(&self, draft: NewDraft) -> Result<RecordId> {
        if draft.subject_encrypted.is_empty() || draft.body_encrypted.is_empty() {
            return Err(Error::InvalidParam(
                "Missing subjectEncrypted or bodyEncrypted".to_string(),
            ));
        }

        let id = Uuid::new_v4();
        self.state.write().await.drafts.push(DraftRecord {
            id,
            owner: draft.owner,
            to: draft.to,
            subject_encrypted: draft.subject_encrypted,
            body_encrypted: draft.body_encrypted,
            timestamp: Utc::now(),
        });
        Ok(id)
    }

    async fn list_messages(&self, filter: MessageFilter) -> Result<Vec<MessageRecord>> {
        let state = self.state.read().await;
        let records = state
            .messages
            .iter()
            .filter(|m| match &filter {
                MessageFilter::ReceivedBy(user) => &m.to == user,
                MessageFilter::SentBy(user) => &m.from == user,
            })
            .cloned()
            .collect();
        Ok(records)
    }

    async fn list_drafts(&self, owner: &str) -> Result<Vec<DraftRecord>> {
        let state = self.state.read().await;
        Ok(state
            .drafts
            .iter()
            .filter(|d| d.owner == owner)
            .cloned()
            .collect())
    }

    async fn delete_message(&self, viewer: &str, id: RecordId) -> Result<()> {
        let mut state = self.state.write().await;
        let position = state
            .messages
            .iter()
            .position(|m| m.id == id && (m.from == viewer || m.to == viewer))
            .ok_or_else(|| Error::NotFound(format!("message {}", id)))?;
        state.messages.remove(position);
        Ok(())
    }

    async fn delete_draft(&self, owner: &str, id: RecordId) -> Result<()> {
        let mut state = self.state.write().await;
        let position = state
            .drafts
            .iter()
            .position(|d| d.id == id && d.owner == owner)
            .ok_or_else(|| Error::NotFound(format!("draft {}", id)))?;
        state.drafts.remove(position);
        Ok(())
    }
}

#[async_trait]
impl AuditSink for InMemoryBackend {
    async fn record(&self, event: AuditEvent) -> Result<()> {
        self.state.write().await.events.push(event);
        Ok(())
    }
}

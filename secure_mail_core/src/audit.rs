//! 写入 tracing 日志的审计实现

use crate::backend::AuditSink;
use crate::error::Result;
use crate::types::AuditEvent;
use async_trait::async_trait;
use tracing::info;

/// 将审计事件写入日志
#[derive(Debug, Default, Clone)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, event: AuditEvent) -> Result<()> {
        info!(
            target: "secure_mail::audit",
            kind = ?event.kind,
            actor = %event.actor,
            subject = event.subject.as_deref().unwrap_or("-"),
            time = %event.time.to_rfc3339(),
            "audit event"
        );
        Ok(())
    }
}

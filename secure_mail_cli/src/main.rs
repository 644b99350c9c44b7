//! 安全邮件 CLI 工具

use anyhow::Context;
use clap::{Parser, Subcommand};
use secure_mail_core::keys::fingerprint;
use secure_mail_core::{
    ClientConfig, Directory, KeyPairProvider, KeyStore, MailClient, MailPreview, MailProtocol,
    MailSession, Mailbox, TracingAuditSink,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// 列表预览截断长度（字符）
const PREVIEW_CHARS: usize = 100;

#[derive(Parser)]
#[command(name = "secure-mail")]
#[command(about = "端到端加密邮件客户端工具", long_about = None)]
struct Cli {
    /// 服务器地址
    #[arg(short, long, default_value = "http://127.0.0.1:3000")]
    server: String,

    /// 本地密钥与会话目录
    #[arg(long, default_value = ".secure-mail")]
    key_dir: PathBuf,

    /// 请求超时（秒）
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    /// 跳过 TLS 证书校验
    #[arg(long)]
    insecure: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 注册账户并生成密钥对
    Register {
        /// 用户名
        #[arg(short, long)]
        username: String,
        /// 密码
        #[arg(short, long)]
        password: String,
    },
    /// 用户登录
    Login {
        /// 用户名
        #[arg(short, long)]
        username: String,
        /// 密码
        #[arg(short, long)]
        password: String,
        /// 保持登录 7 天
        #[arg(long)]
        remember: bool,
    },
    /// 用户登出
    Logout,
    /// 发送加密邮件
    Send {
        /// 收件人
        #[arg(short, long)]
        to: String,
        /// 主题
        #[arg(short, long)]
        subject: String,
        /// 正文
        #[arg(short, long)]
        body: String,
    },
    /// 保存加密草稿
    Draft {
        /// 收件人
        #[arg(short, long, default_value = "")]
        to: String,
        /// 主题
        #[arg(short, long)]
        subject: String,
        /// 正文
        #[arg(short, long)]
        body: String,
    },
    /// 收件箱
    Inbox,
    /// 已发送
    Sent,
    /// 草稿箱
    Drafts,
    /// 编辑草稿：解密、修改后重新保存或直接发送
    EditDraft {
        /// 草稿 ID
        id: Uuid,
        /// 新收件人
        #[arg(short, long)]
        to: Option<String>,
        /// 新主题
        #[arg(short, long)]
        subject: Option<String>,
        /// 新正文
        #[arg(short, long)]
        body: Option<String>,
        /// 修改后直接发送
        #[arg(long)]
        send: bool,
    },
    /// 删除邮件
    DeleteMessage {
        /// 邮件 ID
        id: Uuid,
    },
    /// 删除草稿
    DeleteDraft {
        /// 草稿 ID
        id: Uuid,
    },
    /// 删除账户及本地密钥
    DeleteAccount,
    /// 显示公钥指纹
    Fingerprint {
        /// 查询其他用户的公钥指纹
        #[arg(short, long)]
        user: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = ClientConfig {
        server_url: cli.server.clone(),
        timeout: cli.timeout,
        verify_tls: !cli.insecure,
    };
    let ctx = App::new(config, &cli.key_dir)?;

    match cli.command {
        Commands::Register { username, password } => {
            do_register(&ctx, &username, &password).await?;
        }
        Commands::Login {
            username,
            password,
            remember,
        } => {
            do_login(&ctx, &username, &password, remember).await?;
        }
        Commands::Logout => {
            do_logout(&ctx).await?;
        }
        Commands::Send { to, subject, body } => {
            let session = ctx.restore().await?;
            let id = ctx.protocol.send(&session, &to, &subject, &body).await?;
            println!("已发送，邮件ID: {}", id);
        }
        Commands::Draft { to, subject, body } => {
            let session = ctx.restore().await?;
            let id = ctx.protocol.save_draft(&session, &to, &subject, &body).await?;
            println!("草稿已保存，草稿ID: {}", id);
        }
        Commands::Inbox => {
            do_list(&ctx, Mailbox::Inbox).await?;
        }
        Commands::Sent => {
            do_list(&ctx, Mailbox::Sent).await?;
        }
        Commands::Drafts => {
            do_list(&ctx, Mailbox::Drafts).await?;
        }
        Commands::EditDraft {
            id,
            to,
            subject,
            body,
            send,
        } => {
            do_edit_draft(&ctx, id, to, subject, body, send).await?;
        }
        Commands::DeleteMessage { id } => {
            let session = ctx.restore().await?;
            ctx.protocol.delete_message(&session, id).await?;
            println!("邮件已删除");
        }
        Commands::DeleteDraft { id } => {
            let session = ctx.restore().await?;
            ctx.protocol.delete_draft(&session, id).await?;
            println!("草稿已删除");
        }
        Commands::DeleteAccount => {
            do_delete_account(&ctx).await?;
        }
        Commands::Fingerprint { user } => {
            do_fingerprint(&ctx, user.as_deref()).await?;
        }
    }

    Ok(())
}

/// 命令执行上下文
struct App {
    client: Arc<MailClient>,
    protocol: MailProtocol,
    key_store: KeyStore,
}

impl App {
    fn new(config: ClientConfig, key_dir: &Path) -> anyhow::Result<Self> {
        let client = Arc::new(MailClient::new(config)?);
        let protocol = MailProtocol::new(client.clone(), client.clone())
            .with_audit(Arc::new(TracingAuditSink));

        Ok(Self {
            client,
            protocol,
            key_store: KeyStore::new(key_dir),
        })
    }

    fn user_file(&self) -> PathBuf {
        self.key_store.dir().join("user")
    }

    fn cookie_file(&self) -> PathBuf {
        self.key_store.dir().join("session")
    }

    fn save_login(&self, username: &str, cookie: &str) -> anyhow::Result<()> {
        std::fs::create_dir_all(self.key_store.dir())?;
        std::fs::write(self.user_file(), username)?;
        std::fs::write(self.cookie_file(), cookie)?;
        Ok(())
    }

    fn clear_login(&self) {
        let _ = std::fs::remove_file(self.user_file());
        let _ = std::fs::remove_file(self.cookie_file());
    }

    /// 恢复会话 Cookie 与密钥对
    async fn restore(&self) -> anyhow::Result<MailSession> {
        let username = std::fs::read_to_string(self.user_file())
            .map_err(|_| anyhow::anyhow!("请先登录（user 文件不存在）"))?;
        let cookie = std::fs::read_to_string(self.cookie_file())
            .map_err(|_| anyhow::anyhow!("请先登录（session 文件不存在）"))?;
        self.client.set_session_cookie(cookie.trim().to_string()).await;
        debug!(
            "Restoring session for {} from {} against {}",
            username.trim(),
            self.key_store.dir().display(),
            self.client.config().server_url
        );

        let (session, generated) = self
            .protocol
            .bootstrap(username.trim(), &self.key_store, &KeyPairProvider::new())
            .await?;
        if generated {
            println!("本地没有密钥，已生成新密钥对并上传公钥（旧邮件将无法解密）");
        }
        Ok(session)
    }
}

async fn do_register(ctx: &App, username: &str, password: &str) -> anyhow::Result<()> {
    println!("正在注册用户: {}", username);

    let provider = KeyPairProvider::new();
    println!("正在生成 {} 位 RSA 密钥对...", provider.bits());
    let key_pair = tokio::task::spawn_blocking(move || provider.generate()).await??;
    ctx.client
        .register(username, password, &key_pair.public_key_base64()?)
        .await?;
    ctx.key_store.save(username, &key_pair)?;

    println!("注册成功!");
    println!("公钥指纹: {}", key_pair.fingerprint()?);
    println!("私钥已保存到 {} 目录，请勿泄露", ctx.key_store.dir().display());
    Ok(())
}

async fn do_login(
    ctx: &App,
    username: &str,
    password: &str,
    remember: bool,
) -> anyhow::Result<()> {
    println!("正在登录用户: {}", username);

    ctx.client.login(username, password, remember).await?;
    let cookie = ctx
        .client
        .session_cookie()
        .await
        .context("服务器未返回会话")?;
    ctx.save_login(username, &cookie)?;

    let session = ctx.restore().await?;
    println!("登录成功!");
    println!("公钥指纹: {}", session.key_pair().fingerprint()?);
    Ok(())
}

async fn do_logout(ctx: &App) -> anyhow::Result<()> {
    println!("正在登出...");

    if let Ok(cookie) = std::fs::read_to_string(ctx.cookie_file()) {
        ctx.client.set_session_cookie(cookie.trim().to_string()).await;
        ctx.client.logout().await?;
    }
    ctx.clear_login();

    println!("登出成功!");
    Ok(())
}

async fn do_list(ctx: &App, mailbox: Mailbox) -> anyhow::Result<()> {
    let session = ctx.restore().await?;
    let previews = ctx.protocol.list(&session, mailbox).await?;

    if previews.is_empty() {
        println!("（{}为空）", mailbox_label(mailbox));
        return Ok(());
    }

    for preview in &previews {
        print_preview(preview, mailbox);
    }
    Ok(())
}

fn mailbox_label(mailbox: Mailbox) -> &'static str {
    match mailbox {
        Mailbox::Inbox => "收件箱",
        Mailbox::Sent => "已发送",
        Mailbox::Drafts => "草稿箱",
    }
}

/// 收件箱显示发件人，已发送与草稿显示收件人
fn party_line(preview: &MailPreview, mailbox: Mailbox) -> String {
    match mailbox {
        Mailbox::Inbox => format!("发件人: {}", preview.from),
        Mailbox::Sent | Mailbox::Drafts => format!("收件人: {}", preview.to),
    }
}

fn print_preview(preview: &MailPreview, mailbox: Mailbox) {
    println!(
        "{}  {}  {}",
        preview.id,
        preview.timestamp.to_rfc3339(),
        party_line(preview, mailbox)
    );
    println!("  {}", truncate(preview.subject.as_str()));
    println!("  {}", truncate(preview.body.as_str()));
}

fn truncate(text: &str) -> String {
    text.chars().take(PREVIEW_CHARS).collect()
}

async fn do_edit_draft(
    ctx: &App,
    id: Uuid,
    to: Option<String>,
    subject: Option<String>,
    body: Option<String>,
    send: bool,
) -> anyhow::Result<()> {
    let session = ctx.restore().await?;
    let mut compose = ctx.protocol.reopen_draft(&session, id).await?;

    if let Some(to) = to {
        compose.to = to;
    }
    if let Some(subject) = subject {
        compose.subject = subject;
    }
    if let Some(body) = body {
        compose.body = body;
    }

    // 先生成新记录再删除旧草稿，失败时旧草稿仍在
    if send {
        let message_id = ctx
            .protocol
            .send(&session, &compose.to, &compose.subject, &compose.body)
            .await?;
        ctx.protocol.delete_draft(&session, id).await?;
        println!("草稿已发送，邮件ID: {}", message_id);
    } else {
        let draft_id = ctx
            .protocol
            .save_draft(&session, &compose.to, &compose.subject, &compose.body)
            .await?;
        ctx.protocol.delete_draft(&session, id).await?;
        println!("草稿已更新，草稿ID: {}", draft_id);
    }
    Ok(())
}

async fn do_delete_account(ctx: &App) -> anyhow::Result<()> {
    let session = ctx.restore().await?;
    ctx.client.delete_account().await?;
    ctx.key_store.remove(session.identity())?;
    ctx.clear_login();

    println!("账户已删除");
    Ok(())
}

async fn do_fingerprint(ctx: &App, user: Option<&str>) -> anyhow::Result<()> {
    let session = ctx.restore().await?;
    match user {
        None => {
            println!("{}: {}", session.identity(), session.key_pair().fingerprint()?);
        }
        Some(user) => {
            let encoded = ctx
                .client
                .lookup_public_key(user)
                .await?
                .with_context(|| format!("用户 {} 没有公钥", user))?;
            let key = KeyPairProvider::import_public(&encoded)?;
            println!("{}: {}", user, fingerprint(&key)?);
        }
    }
    Ok(())
}

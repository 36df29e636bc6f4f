//! Bounded mail queue and its delivery worker.
//!
//! Services render a template and `enqueue` it; a single worker drains the
//! channel and hands each message to an [`EmailSender`]. Every send runs
//! under a deadline and failed sends are retried with exponential backoff
//! and jitter until `max_attempts` is reached, then dropped with an error log.
//!
//! Accounts are read from `EMAIL_TYPE_<KIND>_ADDRESS` (plus `_PASSWORD`,
//! `_SMTP`, `_PORT`). The default sender, `LogEmailSender`, only logs.

use anyhow::Result;
use async_trait::async_trait;
use rand::Rng;
use secrecy::SecretString;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tracing::{error, info, warn};

use crate::error::ServiceError;

const FALLBACK_FROM: &str = "no-reply@localhost";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MailKind {
    ResetPassword,
    Feedback,
}

impl MailKind {
    #[must_use]
    pub const fn env_key(self) -> &'static str {
        match self {
            Self::ResetPassword => "RESET_PASSWORD",
            Self::Feedback => "FEEDBACK",
        }
    }

    fn from_env_key(key: &str) -> Option<Self> {
        match key {
            "RESET_PASSWORD" => Some(Self::ResetPassword),
            "FEEDBACK" => Some(Self::Feedback),
            _ => None,
        }
    }

    fn template(self) -> (&'static str, &'static str) {
        match self {
            Self::ResetPassword => (
                "Your password reset code",
                include_str!("../templates/reset_password.html"),
            ),
            Self::Feedback => (
                "New feedback: {{subject}}",
                include_str!("../templates/feedback.html"),
            ),
        }
    }
}

impl fmt::Display for MailKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.env_key())
    }
}

#[derive(Clone, Debug)]
pub struct MailAccount {
    pub address: String,
    pub password: Option<SecretString>,
    pub smtp: Option<String>,
    pub port: Option<u16>,
}

#[derive(Clone, Debug, Default)]
pub struct MailAccounts {
    accounts: HashMap<MailKind, MailAccount>,
}

impl MailAccounts {
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    /// Build from `(name, value)` pairs; unknown kinds are ignored.
    #[must_use]
    pub fn from_vars<I>(vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let vars: BTreeMap<String, String> = vars
            .into_iter()
            .filter(|(name, _)| name.starts_with("EMAIL_TYPE_"))
            .collect();
        let mut accounts = HashMap::new();
        for (name, address) in &vars {
            let Some(kind_key) = name
                .strip_prefix("EMAIL_TYPE_")
                .and_then(|rest| rest.strip_suffix("_ADDRESS"))
            else {
                continue;
            };
            let Some(kind) = MailKind::from_env_key(kind_key) else {
                warn!("ignoring mail account for unknown kind {kind_key}");
                continue;
            };
            let sibling = |suffix: &str| vars.get(&format!("EMAIL_TYPE_{kind_key}_{suffix}")).cloned();
            accounts.insert(
                kind,
                MailAccount {
                    address: address.clone(),
                    password: sibling("PASSWORD").map(SecretString::from),
                    smtp: sibling("SMTP"),
                    port: sibling("PORT").and_then(|port| port.parse().ok()),
                },
            );
        }
        Self { accounts }
    }

    #[must_use]
    pub fn get(&self, kind: MailKind) -> Option<&MailAccount> {
        self.accounts.get(&kind)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmailMessage {
    pub kind: MailKind,
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// Replace every `{{key}}` with its HTML-escaped value; unknown placeholders stay as-is.
#[must_use]
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    vars.iter().fold(template.to_string(), |acc, (key, value)| {
        acc.replace(&format!("{{{{{key}}}}}"), &escape_html(value))
    })
}

/// Same substitution for plain-text fields such as the subject line.
#[must_use]
pub fn render_plain(template: &str, vars: &[(&str, &str)]) -> String {
    vars.iter().fold(template.to_string(), |acc, (key, value)| {
        acc.replace(&format!("{{{{{key}}}}}"), value)
    })
}

#[must_use]
pub fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<()>;
}

#[derive(Clone, Debug)]
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        info!(
            kind = %message.kind,
            from = %message.from,
            to = %message.to,
            subject = %message.subject,
            "email send stub"
        );
        Ok(())
    }
}

#[derive(Clone, Copy, Debug)]
pub struct MailerConfig {
    capacity: usize,
    max_attempts: u32,
    send_timeout: Duration,
    backoff_base: Duration,
    backoff_max: Duration,
}

impl MailerConfig {
    /// 256 queued messages, 5 attempts, 10s per send, 1s->60s backoff.
    #[must_use]
    pub fn new() -> Self {
        Self {
            capacity: 256,
            max_attempts: 5,
            send_timeout: Duration::from_secs(10),
            backoff_base: Duration::from_secs(1),
            backoff_max: Duration::from_secs(60),
        }
    }

    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    #[must_use]
    pub fn with_send_timeout(mut self, send_timeout: Duration) -> Self {
        self.send_timeout = send_timeout;
        self
    }

    #[must_use]
    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.backoff_base = base;
        self.backoff_max = max;
        self
    }

    #[must_use]
    pub fn normalize(self) -> Self {
        let backoff_max = self.backoff_max.max(self.backoff_base);
        Self {
            capacity: self.capacity.max(1),
            max_attempts: self.max_attempts.max(1),
            send_timeout: if self.send_timeout.is_zero() {
                Duration::from_secs(10)
            } else {
                self.send_timeout
            },
            backoff_base: self.backoff_base,
            backoff_max,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl Default for MailerConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug)]
pub struct MailQueue {
    tx: mpsc::Sender<EmailMessage>,
    accounts: Arc<MailAccounts>,
}

impl MailQueue {
    /// Queue plus the receiving end for a worker.
    #[must_use]
    pub fn bounded(config: MailerConfig, accounts: MailAccounts) -> (Self, mpsc::Receiver<EmailMessage>) {
        let (tx, rx) = mpsc::channel(config.normalize().capacity());
        (
            Self {
                tx,
                accounts: Arc::new(accounts),
            },
            rx,
        )
    }

    /// Queue with its worker already running.
    #[must_use]
    pub fn spawn(
        config: MailerConfig,
        accounts: MailAccounts,
        sender: Arc<dyn EmailSender>,
    ) -> (Self, tokio::task::JoinHandle<()>) {
        let (queue, rx) = Self::bounded(config, accounts);
        let handle = spawn_worker(rx, sender, config);
        (queue, handle)
    }

    /// Render `kind` with `vars` and queue it for `to`.
    ///
    /// # Errors
    /// Returns an internal error when the queue is full or closed.
    pub fn enqueue(&self, kind: MailKind, to: &str, vars: &[(&str, &str)]) -> Result<(), ServiceError> {
        let (subject, body) = kind.template();
        let from = self
            .accounts
            .get(kind)
            .map_or_else(|| FALLBACK_FROM.to_string(), |account| account.address.clone());
        let message = EmailMessage {
            kind,
            from,
            to: to.to_string(),
            subject: render_plain(subject, vars),
            html: render_template(body, vars),
        };
        self.tx.try_send(message).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => ServiceError::internal(format!("mail queue full, dropping {kind} mail")),
            mpsc::error::TrySendError::Closed(_) => ServiceError::internal("mail queue closed"),
        })
    }
}

/// Drain `rx` until every queue handle is dropped.
pub fn spawn_worker(
    mut rx: mpsc::Receiver<EmailMessage>,
    sender: Arc<dyn EmailSender>,
    config: MailerConfig,
) -> tokio::task::JoinHandle<()> {
    let config = config.normalize();
    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            deliver(sender.as_ref(), &message, &config).await;
        }
        info!("mail queue closed, worker exiting");
    })
}

async fn deliver(sender: &dyn EmailSender, message: &EmailMessage, config: &MailerConfig) {
    for attempt in 1..=config.max_attempts {
        let result = match timeout(config.send_timeout, sender.send(message)).await {
            Ok(result) => result,
            Err(_) => Err(anyhow::anyhow!("send timed out after {:?}", config.send_timeout)),
        };
        match result {
            Ok(()) => return,
            Err(err) if attempt < config.max_attempts => {
                warn!(kind = %message.kind, attempt, "mail send failed: {err}");
                sleep(backoff_delay(attempt, config.backoff_base, config.backoff_max)).await;
            }
            Err(err) => {
                error!(
                    kind = %message.kind,
                    to = %message.to,
                    attempts = attempt,
                    "giving up on mail: {err}"
                );
            }
        }
    }
}

fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let shift = attempt.saturating_sub(1).min(31);
    let factor = 1u32 << shift;
    let delay = base.checked_mul(factor).unwrap_or(max);
    let capped = if delay > max { max } else { delay };
    jitter_delay(capped)
}

fn jitter_delay(delay: Duration) -> Duration {
    let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
    if delay_ms < 2 {
        return delay;
    }
    let half = delay_ms / 2;
    let jitter = rand::thread_rng().gen_range(0..=half);
    Duration::from_millis(half + jitter)
}

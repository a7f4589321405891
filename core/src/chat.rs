use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};

// -- Fixed session parameters --

pub const SYSTEM_INSTRUCTION: &str = "你是一位溫柔且專業的貓咪照護助理，協助飼主照顧一隻正在從糖尿病酮酸中毒（DKA）康復的貓。\
飼主會記錄血糖（mg/dL）、血酮（mmol/L）、餵食量（ml）、皮下輸液（ml）與用藥。\
請使用繁體中文回答，語氣溫暖、簡潔、具體。\
你可以解釋數值的意義、提醒需要留意的徵兆、提供日常照護建議，\
但不能取代獸醫的診斷；遇到低血糖、血酮過高、嘔吐、嗜睡或拒食等情況，務必建議飼主立即聯絡獸醫。";

pub const TEMPERATURE: f32 = 0.7;

/// Shown as the first model message when a session opens.
pub const GREETING: &str =
    "喵～我是照護小幫手！關於血糖、血酮、餵食或皮下輸液有任何問題，都可以問我喔。";

/// Substituted when the model returns no text.
pub const EMPTY_REPLY: &str = "抱歉，我暫時想不到該怎麼回答，可以換個方式再問一次嗎？";

/// Substituted when the remote call fails.
pub const ERROR_REPLY: &str = "抱歉，目前無法連線到 AI 服務，請稍後再試。";

// -- Types --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Model,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub text: String,
    pub timestamp: i64,
}

impl ChatMessage {
    #[must_use]
    pub fn new(role: ChatRole, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}

/// One outbound turn as handed to a [`ChatProvider`].
#[derive(Debug, Clone, Copy)]
pub struct ChatRequest<'a> {
    pub system_instruction: &'a str,
    pub temperature: f32,
    /// Earlier successful exchanges, oldest first.
    pub history: &'a [ChatMessage],
    pub message: &'a str,
}

/// Remote conversational API.
///
/// The CLI implements this with reqwest against Gemini. Calls block until the
/// remote settles; there is no timeout or retry at this layer.
pub trait ChatProvider: Send + Sync {
    /// Returns the model text, or `None` when the reply carried no text.
    fn generate(&self, request: &ChatRequest<'_>) -> Result<Option<String>>;
}

/// Conversation state the remote model sees on each turn.
#[derive(Debug, Default)]
pub struct ChatSession {
    history: Vec<ChatMessage>,
}

impl ChatSession {
    #[must_use]
    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }
}

pub struct ChatBridge {
    provider: Box<dyn ChatProvider>,
    session: Option<ChatSession>,
    transcript: Vec<ChatMessage>,
}

impl ChatBridge {
    #[must_use]
    pub fn new(provider: Box<dyn ChatProvider>) -> Self {
        Self {
            provider,
            session: None,
            transcript: Vec::new(),
        }
    }

    /// Create the session on first use and greet the user.
    pub fn open(&mut self) -> &ChatSession {
        if self.session.is_none() {
            self.transcript
                .push(ChatMessage::new(ChatRole::Model, GREETING));
        }
        self.session.get_or_insert_with(ChatSession::default)
    }

    #[must_use]
    pub fn transcript(&self) -> &[ChatMessage] {
        &self.transcript
    }

    /// Send one user message and return the model's reply. Never fails: errors
    /// and empty replies turn into fixed apology strings.
    pub fn send(&mut self, text: &str) -> ChatMessage {
        self.open();

        let user = ChatMessage::new(ChatRole::User, text);
        self.transcript.push(user.clone());

        let history = self.session.as_ref().map_or(&[][..], ChatSession::history);
        let result = self.provider.generate(&ChatRequest {
            system_instruction: SYSTEM_INSTRUCTION,
            temperature: TEMPERATURE,
            history,
            message: text,
        });

        let reply_text = match result {
            Ok(Some(reply)) if !reply.trim().is_empty() => {
                if let Some(session) = self.session.as_mut() {
                    session.history.push(user);
                    session
                        .history
                        .push(ChatMessage::new(ChatRole::Model, reply.clone()));
                }
                reply
            }
            Ok(_) => EMPTY_REPLY.to_string(),
            Err(e) => {
                tracing::warn!("chat request failed: {e:#}");
                ERROR_REPLY.to_string()
            }
        };

        let reply = ChatMessage::new(ChatRole::Model, reply_text);
        self.transcript.push(reply.clone());
        reply
    }
}

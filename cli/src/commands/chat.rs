use anyhow::{Context, Result, bail};
use std::io::{self, BufRead, Write};

use catlog_core::chat::{ChatBridge, ChatMessage};

use crate::config::ChatConfig;
use crate::gemini::GeminiClient;

/// Run one turn on a blocking thread. The provider blocks on the runtime
/// handle, which is not allowed from an async worker.
async fn send_blocking(mut bridge: ChatBridge, text: String) -> Result<(ChatBridge, ChatMessage)> {
    tokio::task::spawn_blocking(move || {
        let reply = bridge.send(&text);
        (bridge, reply)
    })
    .await
    .context("chat task failed")
}

fn read_prompt() -> Result<Option<String>> {
    eprint!("> ");
    io::stderr().flush()?;
    let stdin = io::stdin();
    match stdin.lock().lines().next() {
        Some(line) => {
            let line = line?;
            let line = line.trim();
            Ok((!line.is_empty()).then(|| line.to_string()))
        }
        None => Ok(None),
    }
}

pub(crate) async fn cmd_chat(
    config: Option<ChatConfig>,
    message: Option<String>,
    json: bool,
) -> Result<()> {
    let Some(config) = config else {
        bail!("Chat is not configured. Set GEMINI_API_KEY to enable it");
    };
    let client = GeminiClient::new(&config)?;
    let mut bridge = ChatBridge::new(Box::new(client));
    tracing::debug!(model = %config.model, "chat session ready");

    if let Some(message) = message {
        let message = message.trim().to_string();
        if message.is_empty() {
            bail!("Message is empty");
        }
        let (_, reply) = send_blocking(bridge, message).await?;
        if json {
            println!("{}", serde_json::to_string_pretty(&reply)?);
        } else {
            println!("{}", reply.text);
        }
        return Ok(());
    }

    bridge.open();
    if !json {
        for greeting in bridge.transcript() {
            println!("{}", greeting.text);
        }
        eprintln!("(empty line or Ctrl-D to quit)");
    }

    while let Some(text) = read_prompt()? {
        let (next, reply) = send_blocking(bridge, text).await?;
        bridge = next;
        if json {
            println!("{}", serde_json::to_string(&reply)?);
        } else {
            println!("{}\n", reply.text);
        }
    }

    Ok(())
}

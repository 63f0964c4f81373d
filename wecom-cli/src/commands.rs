//! Command implementations.
//!
//! Each command writes its result to `out` so it can be exercised against a
//! mock server in tests.

use std::io::Write;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use wecom_core::{ClientConfig, CredentialStore, PersistenceFailure, Recipients, TextMessage, WecomClient};

/// Arguments of `wecom send-text`, with the agent ID already resolved.
#[derive(Debug, Clone, Default)]
pub struct SendTextArgs {
    pub content: String,
    pub users: Vec<String>,
    pub parties: Vec<String>,
    pub tags: Vec<String>,
    pub agent_id: Option<i64>,
    pub safe: bool,
}

pub async fn send_text(client: &WecomClient, args: SendTextArgs, out: &mut impl Write) -> Result<()> {
    let Some(agent_id) = args.agent_id else {
        bail!("No agent ID given; pass --agent-id or set agent_id in the configuration");
    };

    let recipients = Recipients::users(args.users)
        .with_parties(args.parties)
        .with_tags(args.tags);
    if recipients.is_empty() {
        bail!("No recipients given; pass at least one --user, --party or --tag");
    }

    let mut message = TextMessage::new(recipients, args.content).with_agent_id(agent_id);
    if args.safe {
        message = message.confidential();
    }

    let response = client
        .send_text(&message)
        .await
        .context("Failed to send message")?;
    report_persistence(response.persistence_failure.as_ref());

    let receipt = response.value;
    match &receipt.msgid {
        Some(msgid) => writeln!(out, "Message sent (msgid {})", msgid)?,
        None => writeln!(out, "Message sent")?,
    }
    for (kind, ids) in [
        ("users", &receipt.invaliduser),
        ("parties", &receipt.invalidparty),
        ("tags", &receipt.invalidtag),
    ] {
        if let Some(ids) = ids.as_deref().filter(|ids| !ids.is_empty()) {
            writeln!(out, "  Invalid {}: {}", kind, ids)?;
        }
    }

    Ok(())
}

pub async fn token(client: &WecomClient, refresh: bool, json: bool, out: &mut impl Write) -> Result<()> {
    let response = if refresh {
        client.refresh_access_token().await
    } else {
        client.access_token().await
    }
    .context("Failed to obtain access token")?;
    report_persistence(response.persistence_failure.as_ref());

    let credential = response.value;
    let expires_in = credential.remaining(Utc::now()).num_seconds();

    if json {
        let body = serde_json::json!({
            "corp_id": client.corp_id(),
            "access_token": credential.token().expose(),
            "expires_at": credential.expires_at().to_rfc3339(),
            "expires_in": expires_in,
        });
        writeln!(out, "{}", serde_json::to_string_pretty(&body)?)?;
    } else {
        writeln!(out, "{}", credential.token().expose())?;
    }

    Ok(())
}

pub async fn clear_token(client: &WecomClient, out: &mut impl Write) -> Result<()> {
    client
        .clear_access_token()
        .await
        .context("Failed to clear stored access token")?;
    writeln!(
        out,
        "Cleared access token for {} from the {} store",
        client.corp_id(),
        client.store().backend_name()
    )?;
    Ok(())
}

pub fn check_config(config: &ClientConfig, out: &mut impl Write) -> Result<()> {
    let client = WecomClient::from_config(&ClientConfig {
        strict: false,
        ..config.clone()
    })
    .context("Configuration is invalid")?;

    writeln!(out, "Corp ID:         {}", client.corp_id())?;
    writeln!(out, "Base URL:        {}", config.base_url)?;
    writeln!(out, "Deployment mode: {:?}", config.deployment_mode)?;
    writeln!(out, "Credential store: {}", client.store().backend_name())?;

    if client.diagnostics().is_empty() {
        writeln!(out, "No problems found")?;
        return Ok(());
    }

    for diagnostic in client.diagnostics() {
        writeln!(out, "warning: {}", diagnostic)?;
    }
    if config.strict {
        bail!(
            "{} problem(s) found and strict mode is enabled",
            client.diagnostics().len()
        );
    }
    Ok(())
}

fn report_persistence(failure: Option<&PersistenceFailure>) {
    if let Some(failure) = failure {
        tracing::warn!("{}", failure);
    }
}

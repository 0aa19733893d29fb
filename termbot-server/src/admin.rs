//! Offline edits of the access-control file.
//!
//! The running bot never removes a block; these subcommands are the only way
//! to do so. They go through the same atomic store as the gateway, so a crash
//! mid-edit leaves the previous file intact. Run them while the bot is stopped:
//! a running instance keeps its own in-memory copy and would overwrite the
//! edit on its next block.

use anyhow::{bail, Context, Result};
use tracing::info;

use termbot_core::{AccessStore, FileAccessStore, GatewayConfig, Identity};

use crate::config::AdminAction;

pub async fn run(store: &FileAccessStore, action: &AdminAction) -> Result<String> {
    let mut config = store
        .load()
        .await
        .with_context(|| format!("loading {}", store.path().display()))?;

    let message = match action {
        AdminAction::Show => return Ok(render(&config)),
        AdminAction::Authorize { id } => authorize(&mut config, Identity(*id))?,
        AdminAction::Revoke { id } => revoke(&mut config, Identity(*id))?,
        AdminAction::Unblock { id } => unblock(&mut config, Identity(*id))?,
    };

    store
        .persist(&config)
        .await
        .with_context(|| format!("writing {}", store.path().display()))?;
    info!(path = %store.path().display(), ?action, "Access-control file updated");
    Ok(message)
}

fn authorize(config: &mut GatewayConfig, identity: Identity) -> Result<String> {
    if config.blocked_ids.contains(&identity) {
        bail!("{identity} is blocked; run `admin unblock {identity}` first");
    }
    if !config.authorized_ids.insert(identity) {
        bail!("{identity} is already authorized");
    }
    Ok(format!("Authorized {identity}"))
}

fn revoke(config: &mut GatewayConfig, identity: Identity) -> Result<String> {
    if !config.authorized_ids.remove(&identity) {
        bail!("{identity} is not authorized");
    }
    Ok(format!("Revoked {identity}"))
}

fn unblock(config: &mut GatewayConfig, identity: Identity) -> Result<String> {
    if !config.blocked_ids.remove(&identity) {
        bail!("{identity} is not blocked");
    }
    Ok(format!("Unblocked {identity}"))
}

fn join(ids: &std::collections::BTreeSet<Identity>) -> String {
    if ids.is_empty() {
        "(none)".to_string()
    } else {
        ids.iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn render(config: &GatewayConfig) -> String {
    let owner = if config.owner_handle.is_empty() {
        "(unset)"
    } else {
        config.owner_handle.as_str()
    };
    format!(
        "authorized:   {}\nblocked:      {}\nmax attempts: {}\nowner:        {owner}",
        join(&config.authorized_ids),
        join(&config.blocked_ids),
        config.max_attempts,
    )
}

//! Inbound ref-update notifications
//!
//! Messages arrive in the source-repository pub/sub JSON form. A message is
//! acknowledged only when [`handle_message`] succeeds; a malformed message is
//! a permanent failure (see [`HandleError::is_retriable`]).

use revindex_core::{RefUpdate, RefUpdateEvent, UpdateType};
use serde::Deserialize;
use std::collections::BTreeMap;

use crate::error::HandleError;
use crate::incremental::UpdateProcessor;
use crate::stats::UpdateStats;

const REPOS_SEGMENT: &str = "/repos/";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Notification {
    name: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    event_time: Option<String>,
    #[serde(default)]
    ref_update_event: Option<WireRefUpdateEvent>,
    #[serde(default)]
    create_repo_event: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireRefUpdateEvent {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    ref_updates: BTreeMap<String, WireRefUpdate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireRefUpdate {
    #[serde(default)]
    ref_name: Option<String>,
    update_type: WireUpdateType,
    #[serde(default)]
    old_id: String,
    #[serde(default)]
    new_id: String,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum WireUpdateType {
    UpdateFastForward,
    UpdateNonFastForward,
    Create,
    Delete,
    #[serde(other)]
    Unknown,
}

impl From<WireUpdateType> for UpdateType {
    fn from(value: WireUpdateType) -> Self {
        match value {
            WireUpdateType::UpdateFastForward => UpdateType::FastForward,
            WireUpdateType::Create => UpdateType::Create,
            WireUpdateType::Delete => UpdateType::Delete,
            WireUpdateType::UpdateNonFastForward | WireUpdateType::Unknown => UpdateType::Update,
        }
    }
}

/// Extracts the repository name from "projects/<p>/repos/<repo>"
fn repo_name(resource: &str) -> Result<&str, HandleError> {
    match resource.split_once(REPOS_SEGMENT) {
        Some((_, name)) if !name.is_empty() => Ok(name),
        _ => Err(HandleError::InvalidRepoName(resource.to_string())),
    }
}

/// Decodes a notification into a [`RefUpdateEvent`].
///
/// Notifications without a ref-update payload, such as repository creation,
/// decode to an event with no ref updates.
pub fn parse_notification(payload: &[u8]) -> Result<RefUpdateEvent, HandleError> {
    let notification: Notification = serde_json::from_slice(payload)?;
    let repo_name = repo_name(&notification.name)?.to_string();

    if notification.create_repo_event.is_some() {
        log::debug!("Repository {} created", repo_name);
    }
    log::trace!(
        "Notification for {} at {:?} ({:?})",
        repo_name,
        notification.event_time,
        notification.url
    );

    let mut ref_updates = BTreeMap::new();
    if let Some(event) = notification.ref_update_event {
        log::trace!("Pushed by {:?}", event.email);
        for (key, update) in event.ref_updates {
            let ref_name = update.ref_name.filter(|n| !n.is_empty()).unwrap_or(key);
            ref_updates.insert(
                ref_name,
                RefUpdate {
                    old_hash: update.old_id,
                    new_hash: update.new_id,
                    update_type: update.update_type.into(),
                },
            );
        }
    }

    Ok(RefUpdateEvent {
        repo_name,
        ref_updates,
    })
}

/// Decodes and processes one notification message
pub async fn handle_message(processor: &UpdateProcessor, payload: &[u8]) -> Result<UpdateStats, HandleError> {
    let event = match parse_notification(payload) {
        Ok(event) => event,
        Err(e) => {
            log::error!("Dropping notification: {}", e);
            return Err(e);
        }
    };
    Ok(processor.process(&event).await?)
}

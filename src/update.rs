use chrono::Utc;
use rusqlite::Connection;
use tracing::info;

use crate::{
    error::ApiError,
    models::{ContactDetailsPatch, Note, Resource, Status, UpdatePatch, User},
    resources,
};

/// Upper bound on a single note, shared by both append paths.
pub const MAX_NOTE_LEN: usize = 500;

/// Apply one combined mutation (status transition, contact-detail merge,
/// note append) to a resource. `expectedVersion`, when supplied, turns the
/// write into an optimistic-concurrency check.
pub fn apply_update(
    conn: &Connection,
    resource_id: i64,
    patch: &UpdatePatch,
    acting: &User,
) -> Result<Resource, ApiError> {
    let mut resource = resources::get_by_id(conn, resource_id)?;
    let prev_version = resource.version;

    if let Some(expected) = patch.expected_version {
        if expected != prev_version {
            return Err(ApiError::conflict(
                "Resource was modified by someone else; refresh and retry",
            ));
        }
    }

    let mut changed = false;

    if let Some(status) = patch.status {
        resource.status = status;
        changed = true;
    }
    if patch.suggest_removal == Some(true) {
        info!(
            user_id = acting.id,
            resource_id, "Removal suggested for resource"
        );
        // An uncontested suggestion becomes an actual status change; an
        // explicit status in the same request wins.
        if patch.status.is_none() {
            resource.status = Status::Unavailable;
            changed = true;
        }
    }

    if let Some(value) = &patch.contact_details {
        if !value.is_object() {
            return Err(ApiError::validation("contactDetails must be an object"));
        }
        let details_patch: ContactDetailsPatch = serde_json::from_value(value.clone())
            .map_err(|_| ApiError::validation("contactDetails must be an object"))?;
        details_patch.apply_to(&mut resource.contact_details);
        changed = true;
    }

    if let Some(raw) = &patch.note_content {
        let trimmed = raw.trim();
        // Empty note content on the combined path is a no-op, not an error.
        if !trimmed.is_empty() {
            resource.notes.push(build_note(trimmed, acting)?);
            changed = true;
        }
    }

    if !changed {
        return Err(ApiError::validation("No update data provided"));
    }

    resource.version = prev_version + 1;
    resource.last_updated = Utc::now();

    if !resources::write_back(conn, &resource, prev_version)? {
        return Err(ApiError::conflict(
            "Resource was modified by someone else; refresh and retry",
        ));
    }

    info!(
        resource_id,
        user_id = acting.id,
        version = resource.version,
        "Resource updated"
    );
    Ok(resource)
}

/// Standalone note append. Unlike the combined path, empty content is an
/// error here.
pub fn add_note(
    conn: &Connection,
    resource_id: i64,
    content: &str,
    acting: &User,
) -> Result<Vec<Note>, ApiError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(ApiError::validation(
            "Note content is required and must be a non-empty string",
        ));
    }

    let mut resource = resources::get_by_id(conn, resource_id)?;
    let prev_version = resource.version;

    resource.notes.push(build_note(trimmed, acting)?);
    resource.version = prev_version + 1;
    resource.last_updated = Utc::now();

    if !resources::write_back(conn, &resource, prev_version)? {
        return Err(ApiError::conflict(
            "Resource was modified by someone else; refresh and retry",
        ));
    }

    info!(
        resource_id,
        user_id = acting.id,
        notes = resource.notes.len(),
        "Note added"
    );
    Ok(resource.notes)
}

fn build_note(trimmed: &str, acting: &User) -> Result<Note, ApiError> {
    if trimmed.chars().count() > MAX_NOTE_LEN {
        return Err(ApiError::validation(format!(
            "Notes cannot exceed {MAX_NOTE_LEN} characters"
        )));
    }
    Ok(Note {
        user_id: acting.id,
        username: acting.username.clone(),
        content: trimmed.to_string(),
        timestamp: Utc::now(),
    })
}

use agora_core::{Hub, NewChannel};
use agora_types::models::Author;
use anyhow::Result;
use tracing::info;
use uuid::Uuid;

/// (name, title, description, admin-only)
const DEFAULT_CHANNELS: &[(&str, &str, &str, bool)] = &[
    ("announcements", "Announcements", "Official updates from the team", true),
    ("general", "General", "Anything goes", false),
    ("mewing-hacks", "Mewing Hacks", "Tongue posture and jaw training", false),
    ("fitness", "Fitness", "Training, diet and recovery", false),
    ("skincare", "Skincare", "Routines and product talk", false),
    ("style", "Style", "Hair, clothes and grooming", false),
    ("mindset", "Mindset", "Confidence and discipline", false),
];

/// Create the default channels on a fresh store. Returns how many were added.
pub fn default_channels(hub: &Hub) -> Result<usize> {
    if hub.has_channels() {
        return Ok(0);
    }

    let system = Author::new(Uuid::nil(), "system", true);
    for (position, (name, title, description, is_admin_only)) in
        DEFAULT_CHANNELS.iter().enumerate()
    {
        hub.create_channel(
            &system,
            NewChannel {
                name: name.to_string(),
                title: Some(title.to_string()),
                description: description.to_string(),
                is_admin_only: *is_admin_only,
                position: position as i32,
            },
        )?;
    }

    info!("Seeded {} default channels", DEFAULT_CHANNELS.len());
    Ok(DEFAULT_CHANNELS.len())
}

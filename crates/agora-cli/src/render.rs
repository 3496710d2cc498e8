use agora_types::api::{ChannelResponse, MessageResponse};

pub fn channel_line(c: &ChannelResponse) -> String {
    let mut line = format!(
        "#{:<16} {:<20} {:>4} threads {:>5} msgs",
        c.name, c.title, c.thread_count, c.message_count
    );
    if c.is_admin_only {
        line.push_str("  [admin posts only]");
    }
    if !c.description.is_empty() {
        line.push_str("  ");
        line.push_str(&c.description);
    }
    line
}

pub fn message_line(m: &MessageResponse, pending: bool) -> String {
    let mut line = format!(
        "{} {}{}",
        m.created_at.format("%H:%M:%S"),
        m.author_name,
        if m.is_admin_authored { " [admin]" } else { "" }
    );
    if let Some(parent) = m.parent_id {
        line.push_str(&format!(" ↳ {parent}"));
    }
    line.push_str(": ");
    line.push_str(&m.content);
    if let Some(a) = &m.attachment {
        line.push_str(&format!(" <{} {}>", a.kind, a.url));
    }
    if !m.reactions.is_empty() {
        let reactions: Vec<String> = m
            .reactions
            .iter()
            .map(|(emoji, users)| format!("{emoji}{}", users.len()))
            .collect();
        line.push_str(&format!("  [{}]", reactions.join(" ")));
    }
    if pending {
        line.push_str("  (sending)");
    } else {
        line.push_str(&format!("  ({})", m.id));
    }
    line
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use agora_types::models::Attachment;
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    use super::*;

    #[test]
    fn message_line_shows_thread_attachment_and_reactions() {
        let parent = Uuid::new_v4();
        let m = MessageResponse {
            id: Uuid::new_v4(),
            channel_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            author_name: "coach".into(),
            content: "form check".into(),
            attachment: Some(Attachment {
                url: "http://x/files/a.mp4".into(),
                kind: "video".into(),
            }),
            created_at: Utc.with_ymd_and_hms(2025, 3, 1, 9, 30, 0).unwrap(),
            parent_id: Some(parent),
            is_admin_authored: true,
            nonce: None,
            reactions: BTreeMap::from([("🔥".to_string(), vec![Uuid::new_v4(), Uuid::new_v4()])]),
        };

        let line = message_line(&m, false);
        assert!(line.starts_with("09:30:00 coach [admin] ↳ "));
        assert!(line.contains(&parent.to_string()));
        assert!(line.contains("<video http://x/files/a.mp4>"));
        assert!(line.contains("[🔥2]"));
        assert!(message_line(&m, true).ends_with("(sending)"));
    }
}

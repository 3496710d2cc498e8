use std::sync::Arc;

use agora_core::{EventSink, Hub, NewChannel, NewMessage, Window};
use agora_db::{Database, Journal};
use agora_types::events::StoreEvent;
use agora_types::models::{Attachment, Author};
use uuid::Uuid;

#[tokio::test]
async fn journal_replay_reproduces_hub_state() {
    let dir = tempfile::tempdir().unwrap();
    let db = Arc::new(Database::open(&dir.path().join("agora.db")).unwrap());

    let (journal, task) = Journal::spawn(db.clone());
    let hub = Hub::with_sink(Arc::new(journal));

    let admin = Author::new(Uuid::new_v4(), "admin", true);
    let member = Author::new(Uuid::new_v4(), "member", false);

    let news = hub
        .create_channel(
            &admin,
            NewChannel {
                name: "announcements".into(),
                title: Some("Announcements".into()),
                description: "Official updates".into(),
                is_admin_only: true,
                position: 0,
            },
        )
        .unwrap()
        .channel;

    let post = hub
        .post_message(
            news.id,
            &admin,
            NewMessage {
                content: "Launch day".into(),
                attachment: Some(Attachment {
                    url: "x".into(),
                    kind: "image".into(),
                }),
                nonce: Some("tmp-1".into()),
                ..Default::default()
            },
        )
        .unwrap();
    let reply = hub
        .post_message(news.id, &member, NewMessage::reply(post.id, "let's go"))
        .unwrap();

    hub.toggle_reaction(news.id, post.id, member.user_id, "🔥").unwrap();
    hub.toggle_reaction(news.id, post.id, admin.user_id, "🔥").unwrap();
    hub.toggle_reaction(news.id, post.id, admin.user_id, "🔥").unwrap();
    hub.toggle_reaction(news.id, reply.id, admin.user_id, "👍").unwrap();

    // Dropping the hub drops the last journal handle; the writer drains and stops.
    drop(hub);
    task.finish().await;

    let restored = Hub::new();
    let stats = restored.restore(db.load_snapshot().unwrap());
    assert_eq!((stats.channels, stats.messages, stats.reactions, stats.skipped), (1, 2, 2, 0));

    let summary = restored.channel(news.id).unwrap();
    assert_eq!(summary.channel, news);
    assert_eq!((summary.thread_count, summary.message_count), (1, 2));

    let page = restored.messages(news.id, &Window::latest(10)).unwrap();
    assert_eq!(page[0].0, post);
    assert_eq!(page[1].0, reply);
    assert_eq!(page[0].1["🔥"].iter().copied().collect::<Vec<_>>(), [member.user_id]);
    assert!(page[1].1.contains_key("👍"));

    // Restored logs keep accepting appends after the replayed tail
    let later = restored
        .post_message(news.id, &admin, NewMessage::text("day two"))
        .unwrap();
    assert!(later.sort_key() > reply.sort_key());
}

#[tokio::test]
async fn migrations_are_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("agora.db");

    let channel = {
        let db = Database::open(&path).unwrap();
        let hub = Hub::new();
        let channel = hub
            .create_channel(
                &Author::new(Uuid::new_v4(), "admin", true),
                NewChannel {
                    name: "general".into(),
                    ..Default::default()
                },
            )
            .unwrap()
            .channel;
        db.apply_events(&[StoreEvent::ChannelCreated(channel.clone())])
            .unwrap();
        channel
    };

    let db = Database::open(&path).unwrap();
    assert_eq!(db.load_channels().unwrap(), vec![channel]);
    assert!(db.load_messages().unwrap().is_empty());
}

#[tokio::test]
async fn failing_event_does_not_sink_its_batch() {
    let dir = tempfile::tempdir().unwrap();
    let db = Arc::new(Database::open(&dir.path().join("agora.db")).unwrap());
    let (journal, task) = Journal::spawn(db.clone());
    let hub = Hub::with_sink(Arc::new(journal.clone()));

    let admin = Author::new(Uuid::new_v4(), "admin", true);
    let general = hub
        .create_channel(
            &admin,
            NewChannel {
                name: "general".into(),
                ..Default::default()
            },
        )
        .unwrap()
        .channel;
    let first = hub
        .post_message(general.id, &admin, NewMessage::text("before"))
        .unwrap();

    // A reaction on a message the journal never saw violates the foreign key
    journal.record(StoreEvent::ReactionChanged {
        message_id: Uuid::new_v4(),
        emoji: "🔥".into(),
        user_id: admin.user_id,
        present: true,
    });

    let second = hub
        .post_message(general.id, &admin, NewMessage::text("after"))
        .unwrap();
    hub.toggle_reaction(general.id, second.id, admin.user_id, "👍")
        .unwrap();

    drop(journal);
    drop(hub);
    task.finish().await;

    let stored = db.load_messages().unwrap();
    assert_eq!(stored, vec![first, second.clone()]);
    assert_eq!(
        db.load_reactions().unwrap(),
        vec![(second.id, "👍".to_string(), admin.user_id)]
    );
}

#[test]
fn batch_is_atomic_but_single_events_are_not() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(&dir.path().join("agora.db")).unwrap();

    let hub = Hub::new();
    let admin = Author::new(Uuid::new_v4(), "admin", true);
    let channel = hub
        .create_channel(
            &admin,
            NewChannel {
                name: "general".into(),
                ..Default::default()
            },
        )
        .unwrap()
        .channel;
    let good = hub
        .post_message(channel.id, &admin, NewMessage::text("keep me"))
        .unwrap();
    let events = [
        StoreEvent::ChannelCreated(channel),
        StoreEvent::MessageAppended(good.clone()),
        StoreEvent::ReactionChanged {
            message_id: Uuid::new_v4(),
            emoji: "💀".into(),
            user_id: admin.user_id,
            present: true,
        },
    ];

    assert!(db.apply_events(&events).is_err());
    assert!(db.load_messages().unwrap().is_empty());

    let failed = db.apply_each(&events).unwrap();
    assert_eq!(failed.iter().map(|(i, _)| *i).collect::<Vec<_>>(), [2]);
    assert_eq!(db.load_messages().unwrap(), vec![good]);
}

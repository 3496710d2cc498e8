use std::sync::Arc;
use std::time::Duration;

use agora_api::auth::issue_token;
use agora_api::blobs::DiskBlobStore;
use agora_api::{AppStateInner, router};
use agora_core::{Hub, NewChannel};
use agora_sync::{
    ChannelSession, ChannelTransport, Draft, HttpTransport, SyncConfig, SyncError, SyncPhase,
};
use agora_types::models::Author;
use uuid::Uuid;

const SECRET: &str = "sync-test-secret";

struct Server {
    base_url: String,
    hub: Arc<Hub>,
    _blobs: tempfile::TempDir,
}

async fn serve() -> Server {
    let hub = Arc::new(Hub::new());
    let root = Author::new(Uuid::new_v4(), "root", true);
    for (name, is_admin_only) in [("announcements", true), ("general", false)] {
        hub.create_channel(
            &root,
            NewChannel {
                name: name.into(),
                is_admin_only,
                ..Default::default()
            },
        )
        .unwrap();
    }

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());

    let dir = tempfile::tempdir().unwrap();
    let blobs = DiskBlobStore::new(dir.path().to_path_buf(), base_url.clone())
        .await
        .unwrap();
    let app = router(Arc::new(AppStateInner {
        hub: hub.clone(),
        blobs: Arc::new(blobs),
        jwt_secret: SECRET.into(),
        max_upload_bytes: 1024 * 1024,
    }));
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

    Server {
        base_url,
        hub,
        _blobs: dir,
    }
}

fn client(server: &Server, viewer: &Author) -> HttpTransport {
    let token = issue_token(
        SECRET,
        viewer.user_id,
        &viewer.name,
        viewer.is_privileged,
        chrono::Duration::hours(1),
    )
    .unwrap();
    HttpTransport::new(&server.base_url, token)
}

#[tokio::test]
async fn session_over_http() {
    let server = serve().await;
    let member = Author::new(Uuid::new_v4(), "chad", false);
    let transport = Arc::new(client(&server, &member));

    let channels = transport.list_channels(None).await.unwrap();
    let general = channels.iter().find(|c| c.name == "general").unwrap().id;
    let announcements = channels.iter().find(|c| c.is_admin_only).unwrap().id;

    let config = SyncConfig {
        poll_interval: Duration::from_millis(50),
        ..Default::default()
    };
    let session = ChannelSession::open(transport.clone(), general, member.clone(), config);
    let mut rx = session.subscribe();

    let post = session.post(Draft::text("jawline check")).await.unwrap();
    assert_eq!(post.author_name, "chad");
    assert!(post.nonce.is_some());

    let reply = session
        .post(Draft::reply(post.id, "looking sharp"))
        .await
        .unwrap();
    assert_eq!(reply.parent_id, Some(post.id));

    let on = session.toggle_reaction(post.id, "💪").await.unwrap();
    assert_eq!(on.user_ids, [member.user_id]);

    let snap = rx
        .wait_for(|s| s.entries.len() == 2 && s.entries.iter().all(|e| !e.pending))
        .await
        .unwrap()
        .clone();
    assert_eq!(snap.entries[0].message.reaction_count("💪"), 1);

    let hits = session.search("sharp").await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(session.phase(), SyncPhase::Searching);
    session.clear_search();

    session.shutdown().await;
    assert_eq!(server.hub.total_messages(), 2);

    // Error bodies map back onto typed errors
    let err = transport
        .post_message(
            announcements,
            &agora_types::api::SendMessageRequest {
                content: "hi".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::AdminOnlyChannel(_)));

    let err = transport.list_messages(Uuid::new_v4(), 10, None).await.unwrap_err();
    assert!(matches!(err, SyncError::NotFound(_)));
}

#[tokio::test]
async fn bad_token_and_uploads() {
    let server = serve().await;
    let bogus = HttpTransport::new(&server.base_url, "not-a-jwt");
    assert_eq!(
        bogus.list_channels(None).await.unwrap_err(),
        SyncError::Unauthorized
    );

    let member = Author::new(Uuid::new_v4(), "chad", false);
    let transport = client(&server, &member);
    let uploaded = transport
        .upload("jaw.jpg", "image/jpeg", b"jpeg bytes".to_vec())
        .await
        .unwrap();
    assert_eq!(uploaded.kind, "image");
    assert!(uploaded.url.ends_with(".jpg"));
}

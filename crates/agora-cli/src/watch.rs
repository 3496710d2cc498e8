use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use agora_sync::{ChannelSession, Draft, HttpTransport, SyncConfig, ViewSnapshot};
use agora_types::models::Author;
use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use uuid::Uuid;

use crate::render;

const HELP: &str = "Type to post. Commands: /reply <id> <text>, /react <id> <emoji>, \
                    /parent <id>, /search <text>, /clear, /quit";

/// Prints each confirmed message once, and search results per query.
#[derive(Default)]
struct Printer {
    shown: HashSet<Uuid>,
    search: Option<String>,
    search_shown: HashSet<Uuid>,
}

impl Printer {
    fn update(&mut self, snapshot: &ViewSnapshot) {
        if snapshot.search != self.search {
            match &snapshot.search {
                Some(q) => println!("-- search results for '{q}' --"),
                None => println!("-- back to live --"),
            }
            self.search = snapshot.search.clone();
            self.search_shown.clear();
        }

        let seen = if self.search.is_some() {
            &mut self.search_shown
        } else {
            &mut self.shown
        };
        for m in snapshot.confirmed() {
            if seen.insert(m.id) {
                println!("{}", render::message_line(m, false));
            }
        }
    }
}

pub async fn run(client: HttpTransport, channel_id: Uuid, viewer: Author, interval: u64) -> Result<()> {
    let config = SyncConfig {
        poll_interval: Duration::from_secs(interval.max(1)),
        ..Default::default()
    };
    let session = ChannelSession::open(Arc::new(client), channel_id, viewer, config);
    let mut updates = session.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut printer = Printer::default();
    eprintln!("{HELP}");

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                printer.update(&snapshot);
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if !command(&session, line.trim()).await {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    session.shutdown().await;
    Ok(())
}

/// Returns false when the user asked to quit.
async fn command(session: &ChannelSession, line: &str) -> bool {
    let (head, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();

    let outcome = match head {
        "" => Ok(()),
        "/quit" => return false,
        "/help" => {
            eprintln!("{HELP}");
            Ok(())
        }
        "/clear" => {
            session.clear_search();
            Ok(())
        }
        "/search" => session.search(rest).await.map(|_| ()),
        "/reply" | "/react" | "/parent" => {
            let (id, arg) = rest.split_once(' ').unwrap_or((rest, ""));
            let Ok(id) = id.parse::<Uuid>() else {
                eprintln!("expected a message id");
                return true;
            };
            match head {
                "/reply" => session.post(Draft::reply(id, arg.trim())).await.map(|_| ()),
                "/react" => session.toggle_reaction(id, arg.trim()).await.map(|r| {
                    eprintln!("{} now has {}", r.emoji, r.count);
                }),
                _ => session.fetch_message(id).await.map(|m| {
                    println!("{}", render::message_line(&m, false));
                }),
            }
        }
        _ => session.post(Draft::text(line)).await.map(|_| ()),
    };

    if let Err(e) = outcome {
        eprintln!("error: {e}");
    }
    true
}

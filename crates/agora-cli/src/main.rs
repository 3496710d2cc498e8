mod render;
mod watch;

use std::path::PathBuf;

use agora_sync::{ChannelTransport, HttpTransport};
use agora_types::api::{Claims, CreateChannelRequest, SendMessageRequest};
use agora_types::models::Author;
use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "agora-cli")]
#[command(author, version, about = "Command-line client for an Agora server", long_about = None)]
struct Args {
    /// Server base URL
    #[arg(long, env = "AGORA_URL", default_value = "http://localhost:3000")]
    url: String,

    /// Bearer token issued by the identity provider
    #[arg(long, env = "AGORA_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Log filter, e.g. `agora_sync=debug`
    #[arg(long, env = "AGORA_LOG", default_value = "warn")]
    log: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List channels, optionally filtered
    Channels {
        #[arg(short, long)]
        query: Option<String>,
    },
    /// Print the most recent messages of a channel
    Read {
        /// Channel name or id
        channel: String,
        #[arg(short, long, default_value_t = 50)]
        limit: usize,
    },
    /// Follow a channel live. Lines typed on stdin are posted.
    Watch {
        channel: String,
        /// Poll interval in seconds
        #[arg(long, default_value_t = 5)]
        interval: u64,
    },
    /// Post a message or reply
    Post {
        channel: String,
        content: String,
        /// Id of the message to reply to
        #[arg(long)]
        reply_to: Option<Uuid>,
        /// File to upload and attach
        #[arg(long)]
        attach: Option<PathBuf>,
    },
    /// Toggle a reaction on a message
    React {
        channel: String,
        message_id: Uuid,
        emoji: String,
    },
    /// Search a channel's messages
    Search {
        channel: String,
        query: String,
        #[arg(short, long, default_value_t = 50)]
        limit: usize,
    },
    /// Provision a channel (admin token required)
    CreateChannel {
        name: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        admin_only: bool,
        #[arg(long, default_value_t = 0)]
        position: i32,
    },
    /// Mint a development token with the shared secret
    MintToken {
        #[arg(long)]
        name: String,
        #[arg(long)]
        user_id: Option<Uuid>,
        #[arg(long)]
        admin: bool,
        #[arg(long, env = "AGORA_JWT_SECRET", hide_env_values = true)]
        secret: String,
        /// Lifetime in hours
        #[arg(long, default_value_t = 24)]
        hours: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&args.log))
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        Command::MintToken {
            name,
            user_id,
            admin,
            secret,
            hours,
        } => {
            let user_id = user_id.unwrap_or_else(Uuid::new_v4);
            let token = agora_api::auth::issue_token(
                &secret,
                user_id,
                &name,
                admin,
                token_lifetime(hours)?,
            )?;
            println!("{token}");
        }
        Command::Channels { query } => {
            let (client, _) = connect(&args.url, args.token.as_deref())?;
            let channels = client.list_channels(query.as_deref()).await?;
            if channels.is_empty() {
                println!("No channels match.");
            }
            for c in &channels {
                println!("{}", render::channel_line(c));
            }
        }
        Command::Read { channel, limit } => {
            let (client, _) = connect(&args.url, args.token.as_deref())?;
            let channel_id = resolve_channel(&client, &channel).await?;
            for m in client.list_messages(channel_id, limit, None).await? {
                println!("{}", render::message_line(&m, false));
            }
        }
        Command::Watch { channel, interval } => {
            let (client, viewer) = connect(&args.url, args.token.as_deref())?;
            let channel_id = resolve_channel(&client, &channel).await?;
            watch::run(client, channel_id, viewer, interval).await?;
        }
        Command::Post {
            channel,
            content,
            reply_to,
            attach,
        } => {
            let (client, _) = connect(&args.url, args.token.as_deref())?;
            let channel_id = resolve_channel(&client, &channel).await?;
            let mut request = SendMessageRequest {
                content,
                parent_id: reply_to,
                ..Default::default()
            };
            if let Some(path) = attach {
                let uploaded = upload_file(&client, &path).await?;
                request.attachment_url = Some(uploaded.url);
                request.attachment_type = Some(uploaded.kind);
            }
            let message = client.post_message(channel_id, &request).await?;
            println!("{}", render::message_line(&message, false));
        }
        Command::React {
            channel,
            message_id,
            emoji,
        } => {
            let (client, viewer) = connect(&args.url, args.token.as_deref())?;
            let channel_id = resolve_channel(&client, &channel).await?;
            let resp = client.toggle_reaction(channel_id, message_id, &emoji).await?;
            let state = if resp.user_ids.contains(&viewer.user_id) {
                "added"
            } else {
                "removed"
            };
            println!("{} {} ({} total)", state, resp.emoji, resp.count);
        }
        Command::Search {
            channel,
            query,
            limit,
        } => {
            let (client, _) = connect(&args.url, args.token.as_deref())?;
            let channel_id = resolve_channel(&client, &channel).await?;
            let hits = client
                .list_messages(channel_id, limit, Some(&query))
                .await?;
            println!("{} result(s) for '{}'", hits.len(), query);
            for m in &hits {
                println!("{}", render::message_line(m, false));
            }
        }
        Command::CreateChannel {
            name,
            title,
            description,
            admin_only,
            position,
        } => {
            let (client, _) = connect(&args.url, args.token.as_deref())?;
            let created = client
                .create_channel(&CreateChannelRequest {
                    name,
                    title,
                    description,
                    is_admin_only: admin_only,
                    position,
                })
                .await?;
            println!("{}", render::channel_line(&created));
        }
    }

    Ok(())
}

fn token_lifetime(hours: i64) -> Result<chrono::Duration> {
    if hours <= 0 {
        bail!("--hours must be positive");
    }
    chrono::Duration::try_hours(hours).ok_or_else(|| anyhow!("--hours {hours} is out of range"))
}

fn connect(url: &str, token: Option<&str>) -> Result<(HttpTransport, Author)> {
    let token = token.context("no token given, set AGORA_TOKEN or pass --token")?;
    let viewer = viewer_from_token(token)?;
    Ok((HttpTransport::new(url, token), viewer))
}

/// Read the identity out of our own token. The server verifies it; here
/// it only tells the sync session who "me" is.
fn viewer_from_token(token: &str) -> Result<Author> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    let data = decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation)
        .context("token is not a valid JWT")?;
    Ok(data.claims.author())
}

async fn resolve_channel(client: &HttpTransport, channel: &str) -> Result<Uuid> {
    if let Ok(id) = channel.parse::<Uuid>() {
        return Ok(id);
    }

    let name = channel.trim().trim_start_matches('#').to_lowercase();
    let channels = client.list_channels(Some(&name)).await?;
    channels
        .into_iter()
        .find(|c| c.name == name)
        .map(|c| c.id)
        .ok_or_else(|| anyhow!("no channel named #{name}"))
}

fn content_type(path: &std::path::Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mp3" => "audio/mpeg",
        "ogg" => "audio/ogg",
        "wav" => "audio/wav",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

async fn upload_file(
    client: &HttpTransport,
    path: &std::path::Path,
) -> Result<agora_types::api::UploadResponse> {
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    if data.is_empty() {
        bail!("{} is empty", path.display());
    }
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload");
    Ok(client.upload(file_name, content_type(path), data).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viewer_is_read_from_unverified_claims() {
        let id = Uuid::new_v4();
        let token = agora_api::auth::issue_token(
            "some-secret",
            id,
            "mogger",
            true,
            chrono::Duration::hours(1),
        )
        .unwrap();

        let viewer = viewer_from_token(&token).unwrap();
        assert_eq!(viewer, Author::new(id, "mogger", true));
        assert!(viewer_from_token("nope").is_err());
    }

    #[test]
    fn token_lifetime_is_bounded() {
        assert_eq!(token_lifetime(24).unwrap(), chrono::Duration::days(1));
        assert!(token_lifetime(0).is_err());
        assert!(token_lifetime(i64::MAX).is_err());
    }

    #[test]
    fn content_types_from_extension() {
        assert_eq!(content_type("a/b/face.JPG".as_ref()), "image/jpeg");
        assert_eq!(content_type("clip.webm".as_ref()), "video/webm");
        assert_eq!(content_type("notes".as_ref()), "application/octet-stream");
    }
}

use std::{env, path::PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use videotube::client::{
    FilePart, PublishForm, RegisterForm, Session, Store, VideoListQuery,
    format::{format_duration, format_relative_time, format_view_count, is_owner},
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Command-line front end for a VideoTube server.")]
struct Cli {
    #[arg(long = "session", value_name = "PATH", help = "Session file (default ~/.config/videotube/session.toml)")]
    session: Option<PathBuf>,
    #[arg(long = "server", value_name = "URL", help = "API root, e.g. http://127.0.0.1:8000/api/v1")]
    server: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an account.
    Register {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long = "full-name")]
        full_name: String,
        #[arg(long, env = "VIDEOTUBE_PASSWORD")]
        password: String,
        #[arg(long, value_name = "PATH")]
        avatar: PathBuf,
        #[arg(long = "cover", value_name = "PATH")]
        cover_image: Option<PathBuf>,
    },
    /// Log in by username or email.
    Login {
        login: String,
        #[arg(long, env = "VIDEOTUBE_PASSWORD")]
        password: String,
    },
    Logout,
    Whoami,
    /// Browse published videos.
    Videos {
        #[arg(long)]
        query: Option<String>,
        #[arg(long)]
        page: Option<u32>,
        #[arg(long = "sort-by")]
        sort_by: Option<String>,
        #[arg(long = "sort-type")]
        sort_type: Option<String>,
        #[arg(long = "user")]
        user_id: Option<String>,
    },
    Watch {
        video_id: String,
    },
    Publish {
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: String,
        #[arg(long, value_name = "PATH")]
        video: PathBuf,
        #[arg(long, value_name = "PATH")]
        thumbnail: PathBuf,
    },
    TogglePublish {
        video_id: String,
    },
    DeleteVideo {
        video_id: String,
    },
    Comments {
        video_id: String,
        #[arg(long)]
        page: Option<u32>,
    },
    Comment {
        video_id: String,
        content: String,
    },
    /// Toggle a like on a video.
    Like {
        video_id: String,
    },
    Liked,
    /// Toggle a subscription to a channel (user id).
    Subscribe {
        channel_id: String,
    },
    Channel {
        username: String,
    },
    History,
    Tweet {
        content: String,
    },
    Tweets {
        user_id: String,
    },
    Playlists {
        user_id: String,
    },
    PlaylistCreate {
        name: String,
        description: String,
    },
    PlaylistAdd {
        video_id: String,
        playlist_id: String,
    },
    Stats,
    MyVideos {
        #[arg(long = "sort-by")]
        sort_by: Option<String>,
        #[arg(long = "sort-type")]
        sort_type: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let session_path = match cli.session {
        Some(path) => path,
        None => default_session_path()?,
    };

    let mut session = Session::load(&session_path)?;
    if let Some(server) = cli.server {
        session.base_url = server;
    }
    let store = session.into_store();

    let outcome = run(&store, cli.command);
    Session::from_store(&store).save(&session_path)?;
    outcome
}

fn default_session_path() -> Result<PathBuf> {
    let home = env::var_os("HOME").context("HOME is not set; pass --session")?;
    Ok(PathBuf::from(home).join(".config/videotube/session.toml"))
}

fn run(store: &Store, command: Command) -> Result<()> {
    match command {
        Command::Register {
            username,
            email,
            full_name,
            password,
            avatar,
            cover_image,
        } => {
            let cover_image = match cover_image {
                Some(path) => Some(read_file(&path)?),
                None => None,
            };
            store.register(&RegisterForm {
                username,
                email,
                full_name,
                password,
                avatar: read_file(&avatar)?,
                cover_image,
            })?;
            println!("Registered. Log in with `videotube login`.");
        }
        Command::Login { login, password } => {
            store.login(&login, &password)?;
            if let Some(user) = store.auth().user {
                println!("Logged in as {} ({})", user.username, user.full_name);
            }
        }
        Command::Logout => {
            store.logout()?;
            println!("Logged out");
        }
        Command::Whoami => {
            store.load_current_user()?;
            if let Some(user) = store.auth().user {
                println!("{} <{}> id {}", user.username, user.email, user.id);
            }
        }
        Command::Videos {
            query,
            page,
            sort_by,
            sort_type,
            user_id,
        } => {
            store.load_videos(&VideoListQuery {
                page,
                limit: None,
                query,
                sort_by,
                sort_type,
                user_id,
            })?;
            let state = store.video();
            for video in &state.videos {
                println!(
                    "{}  {}  [{}]  {} views  {}  by {}",
                    video.id,
                    video.title,
                    format_duration(video.duration),
                    format_view_count(video.views),
                    format_relative_time(&video.created_at),
                    video.owner.username
                );
            }
            if let Some(meta) = state.meta {
                println!("page {}/{} ({} videos)", meta.page, meta.total_pages, meta.total);
            }
        }
        Command::Watch { video_id } => {
            store.load_video(&video_id)?;
            let Some(video) = store.video().current else {
                bail!("video {video_id} not loaded");
            };
            println!("{}\n{}", video.title, video.description);
            println!(
                "{} views, {} long, uploaded {} by {}",
                format_view_count(video.views),
                format_duration(video.duration),
                format_relative_time(&video.created_at),
                video.owner.username
            );
            println!("stream: {}", video.video_file);
            if is_owner(store.auth().user.as_ref(), &video) && !video.is_published {
                println!("(unpublished; only you can see this)");
            }
        }
        Command::Publish {
            title,
            description,
            video,
            thumbnail,
        } => {
            let id = store.publish_video(&PublishForm {
                title,
                description,
                video_file: read_file(&video)?,
                thumbnail: read_file(&thumbnail)?,
            })?;
            println!("Published video {id}");
        }
        Command::TogglePublish { video_id } => {
            store.toggle_publish(&video_id)?;
            println!("Toggled publish status of {video_id}");
        }
        Command::DeleteVideo { video_id } => {
            store.delete_video(&video_id)?;
            println!("Deleted video {video_id}");
        }
        Command::Comments { video_id, page } => {
            store.load_comments(&video_id, page, None)?;
            let state = store.comment();
            for comment in &state.comments {
                println!(
                    "{}  {}: {}  ({} likes, {})",
                    comment.id,
                    comment.owner.username,
                    comment.content,
                    comment.likes_count,
                    format_relative_time(&comment.created_at)
                );
            }
            println!("{} comments", state.total_comments);
        }
        Command::Comment { video_id, content } => {
            store.add_comment(&video_id, &content)?;
            println!("Comment added");
        }
        Command::Like { video_id } => {
            store.toggle_video_like(&video_id)?;
            if let Some(toggle) = store.like().video_likes.get(&video_id) {
                let verb = if toggle.liked { "Liked" } else { "Unliked" };
                println!("{verb} ({} likes)", toggle.likes_count);
            }
        }
        Command::Liked => {
            store.load_liked_videos(None, None)?;
            for like in store.like().liked_videos {
                println!("{}  {}", like.video, like.video_details.title);
            }
        }
        Command::Subscribe { channel_id } => {
            store.toggle_subscription(&channel_id)?;
            if let Some(toggle) = store.subscription().subscription_status.get(&channel_id) {
                let verb = if toggle.subscribed { "Subscribed" } else { "Unsubscribed" };
                println!("{verb} ({} subscribers)", toggle.subscribers_count);
            }
        }
        Command::Channel { username } => {
            store.load_channel_profile(&username)?;
            if let Some(profile) = store.auth().channel_profile {
                println!("{} (@{}) id {}", profile.full_name, profile.username, profile.id);
                println!(
                    "{} subscribers, subscribed to {}{}",
                    profile.subscribers_count,
                    profile.channels_subscribed_to_count,
                    if profile.is_subscribed { ", you are subscribed" } else { "" }
                );
            }
        }
        Command::History => {
            store.load_watch_history()?;
            for video in store.auth().watch_history {
                println!("{}  {}  by {}", video.id, video.title, video.owner.username);
            }
        }
        Command::Tweet { content } => {
            store.create_tweet(&content)?;
            println!("Tweet posted");
        }
        Command::Tweets { user_id } => {
            store.load_user_tweets(&user_id, None, None)?;
            for tweet in store.tweet().tweets {
                println!(
                    "{}  {}  ({} likes, {})",
                    tweet.id,
                    tweet.content,
                    tweet.likes_count,
                    format_relative_time(&tweet.created_at)
                );
            }
        }
        Command::Playlists { user_id } => {
            store.load_user_playlists(&user_id)?;
            for playlist in store.playlist().user_playlists {
                println!(
                    "{}  {}  ({} videos)",
                    playlist.id, playlist.name, playlist.total_videos
                );
            }
        }
        Command::PlaylistCreate { name, description } => {
            store.create_playlist(&name, &description)?;
            println!("Playlist created");
        }
        Command::PlaylistAdd {
            video_id,
            playlist_id,
        } => {
            store.add_to_playlist(&video_id, &playlist_id)?;
            if let Some(playlist) = store.playlist().current {
                println!("{} now has {} videos", playlist.name, playlist.total_videos);
            }
        }
        Command::Stats => {
            store.load_stats()?;
            if let Some(stats) = store.dashboard().stats {
                println!(
                    "{} videos, {} views, {} likes, {} subscribers",
                    stats.total_videos,
                    format_view_count(stats.total_views),
                    stats.total_likes,
                    stats.total_subscribers
                );
                for entry in stats.recent_subscribers {
                    println!("  + {}", entry.subscriber.username);
                }
            }
        }
        Command::MyVideos { sort_by, sort_type } => {
            store.load_channel_videos(None, None, sort_by.as_deref(), sort_type.as_deref())?;
            for video in store.dashboard().videos {
                println!(
                    "{}  {}  {}  {} views  {} likes  {} comments",
                    video.id,
                    if video.is_published { "public " } else { "private" },
                    video.title,
                    format_view_count(video.views),
                    video.likes_count,
                    video.comments_count
                );
            }
        }
    }
    Ok(())
}

fn read_file(path: &std::path::Path) -> Result<FilePart> {
    FilePart::from_path(path).with_context(|| format!("reading {}", path.display()))
}

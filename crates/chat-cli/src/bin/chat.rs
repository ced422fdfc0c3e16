//! Umbral Chat interactive client shell.
//!
//! Connects to a server, then reads line-based commands from stdin and
//! dispatches them to a [`chat_client::ClientSession`].

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use chat_client::session::ClientSession;
use chat_client::ClientConfig;
use chat_core::chat_entry::ChatKind;
use chat_core::notify::{ChannelSink, Event};
use chat_core::time::SystemClock;
use chat_transport::udp_async::AsyncUdpTransport;

/// Umbral Chat client.
#[derive(Parser)]
#[command(name = "chat")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Server address to connect to.
    #[arg(long)]
    server: SocketAddr,

    /// Enable verbose (debug) logging.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let exit_code = run().await;
    std::process::exit(exit_code);
}

async fn run() -> i32 {
    let cli = Cli::parse();

    let filter = std::env::var("CHATROOM_LOG").unwrap_or_else(|_| {
        if cli.verbose { "debug".into() } else { "warn".into() }
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let transport = match AsyncUdpTransport::bind("0.0.0.0:0".parse().unwrap()).await {
        Ok(t) => Arc::new(t),
        Err(e) => {
            eprintln!("failed to bind local socket: {e}");
            return 1;
        }
    };

    let (sink, mut events) = ChannelSink::new(256);
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            print_event(&event);
        }
    });

    let session = match ClientSession::connect(
        transport,
        cli.server,
        ClientConfig::default(),
        Arc::new(sink),
        Arc::new(SystemClock),
    )
    .await
    {
        Ok(s) => s,
        Err(e) => {
            eprintln!("failed to connect to {}: {e}", cli.server);
            return 1;
        }
    };

    println!("connected to {}. type /help for commands.", cli.server);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                eprintln!("stdin error: {e}");
                break;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if line == "/quit" || line == "/exit" {
            session.disconnect().await;
            return 0;
        }

        if let Err(e) = dispatch(&session, line).await {
            println!("error: {e}");
        }
    }

    session.disconnect().await;
    0
}

async fn dispatch(
    session: &Arc<ClientSession<AsyncUdpTransport>>,
    line: &str,
) -> anyhow::Result<()> {
    let mut parts = line.splitn(2, ' ');
    let cmd = parts.next().unwrap_or("");
    let rest = parts.next().unwrap_or("").trim();

    match cmd {
        "/help" => {
            println!(
                "commands: /register <user> <pass>, /login <user> <pass>, /logout, \
                 /passwd <old> <new>, /say <text>, /msg <user> <text>, /status, \
                 /chats [user], /who, /me, /quit"
            );
            Ok(())
        }
        "/register" => {
            let (user, pass) = split_two(rest)?;
            session.register(user, pass).await?;
            println!("registered and logged in as {user}");
            Ok(())
        }
        "/login" => {
            let (user, pass) = split_two(rest)?;
            session.login(user, pass).await?;
            println!("logged in as {user}");
            Ok(())
        }
        "/logout" => {
            session.logout().await?;
            println!("logged out");
            Ok(())
        }
        "/passwd" => {
            let (old, new) = split_two(rest)?;
            session.change_password(old, new).await?;
            println!("password changed");
            Ok(())
        }
        "/say" => {
            session.say(None, rest).await?;
            Ok(())
        }
        "/msg" => {
            let (user, text) = split_two(rest)?;
            session.say(Some(user.to_string()), text).await?;
            Ok(())
        }
        "/status" => {
            let status = session.fetch_chatroom_status().await?;
            println!(
                "online: {}, public log: {} messages",
                status.online_count, status.public_log_len
            );
            Ok(())
        }
        "/chats" => {
            let peer = if rest.is_empty() { None } else { Some(rest.to_string()) };
            let entries = session.get_chats(peer).await?;
            for entry in entries {
                print_chat_entry(&entry);
            }
            Ok(())
        }
        "/who" => {
            let roster = session.get_user_info().await?;
            for user in roster {
                println!("{} [{}]", user.name, if user.online { "online" } else { "offline" });
            }
            Ok(())
        }
        "/me" => {
            let info = session.personal_info();
            println!("username: {:?}, state: {:?}", info.username, info.state);
            Ok(())
        }
        other => {
            println!("unknown command: {other} (try /help)");
            Ok(())
        }
    }
}

fn split_two(rest: &str) -> anyhow::Result<(&str, &str)> {
    let mut parts = rest.splitn(2, ' ');
    let a = parts.next().filter(|s| !s.is_empty());
    let b = parts.next().map(str::trim).filter(|s| !s.is_empty());
    match (a, b) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => anyhow::bail!("expected two arguments"),
    }
}

fn print_chat_entry(entry: &chat_core::chat_entry::ChatEntry) {
    match &entry.kind {
        ChatKind::Message(text) => println!("{}: {text}", entry.speaker),
        ChatKind::Online => println!("* {} came online", entry.speaker),
        ChatKind::Offline => println!("* {} went offline", entry.speaker),
    }
}

fn print_event(event: &Event) {
    match event {
        Event::Log(line) => tracing::debug!("{line}"),
        Event::UsersUpdated => println!("* roster updated"),
        Event::Online(user) => println!("* {user} came online"),
        Event::Offline(user) => println!("* {user} went offline"),
        Event::NewMsg(Some(from)) => println!("* new message from {from} (/chats {from} to view)"),
        Event::NewMsg(None) => println!("* new public message (/chats to view)"),
        Event::ConnectionLost => println!("* connection to server lost"),
        Event::NotLogin => println!("* that requires logging in first"),
    }
}

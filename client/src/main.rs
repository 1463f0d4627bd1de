use clap::Parser;
use client::network::Connection;
use client::view::TerminalView;
use client::{present, ClientError};
use log::{info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:5461")]
    server: String,

    /// Username to log in with; prompted for when omitted
    #[arg(short = 'u', long)]
    username: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    let (mut connection, prompt) = Connection::open(&args.server).await?;
    let username = match args.username {
        Some(username) => username,
        None => {
            println!("{}", prompt);
            match stdin.next_line().await? {
                Some(line) => line.trim().to_string(),
                None => return Ok(()),
            }
        }
    };

    let welcome = match connection.login(&username).await {
        Ok(welcome) => welcome,
        Err(ClientError::LoginRejected(reason)) => {
            eprintln!("{}", reason);
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };
    println!("{}", welcome);
    println!("Type /help for commands");

    let (mut incoming, mut outgoing) = connection.split();
    let (envelope_tx, mut envelope_rx) = mpsc::channel(64);

    tokio::spawn(async move {
        loop {
            match incoming.next_envelope().await {
                Ok(Some(envelope)) => {
                    if envelope_tx.send(envelope).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("Failed to read from server: {}", e);
                    break;
                }
            }
        }
    });

    let mut view = TerminalView::stdout();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            line = stdin.next_line(), if stdin_open => match line? {
                Some(line) if line.trim().is_empty() => {}
                Some(line) => outgoing.send_line(line.trim()).await?,
                None => {
                    stdin_open = false;
                    outgoing.send_line("/quit").await?;
                }
            },
            envelope = envelope_rx.recv() => match envelope {
                Some(envelope) => {
                    present(&envelope, &mut view);
                    if view.quit_reason().is_some() {
                        break;
                    }
                }
                None => {
                    info!("Server closed the connection");
                    break;
                }
            },
        }
    }

    let _ = outgoing.close().await;
    Ok(())
}

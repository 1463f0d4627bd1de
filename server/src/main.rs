use clap::Parser;
use log::{error, info};
use server::config::Args;
use server::network::Server;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config = Args::parse().into_config();
    match &config.state_file {
        Some(path) => info!("Persisting state to {}", path.display()),
        None => info!("Persistence disabled"),
    }

    let server = Server::bind(&config).await?;
    let handle = server.handle();
    let mut server_task = tokio::spawn(server.run());

    let result = tokio::select! {
        result = &mut server_task => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
            if let Err(e) = handle.shutdown().await {
                error!("Failed to request shutdown: {}", e);
            }
            server_task.await
        }
    };

    match result {
        Ok(Ok(state)) => {
            info!("Server stopped with {} known users", state.users.len());
            Ok(())
        }
        Ok(Err(e)) => Err(e.into()),
        Err(e) => {
            error!("Server task panicked: {}", e);
            Err(e.into())
        }
    }
}

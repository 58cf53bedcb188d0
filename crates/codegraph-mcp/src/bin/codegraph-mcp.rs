use clap::{Parser, Subcommand};
use rmcp::{transport::stdio, ServiceExt};
use tracing::info;

use codegraph_mcp::CodeGraphServer;

#[derive(Parser, Debug)]
#[command(name = "codegraph-mcp", about = "Code-intelligence MCP server: property graph + vector index + hybrid retriever")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the MCP server.
    Serve {
        /// Transport to speak. Only stdio is implemented.
        #[arg(long, default_value = "stdio")]
        transport: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { transport } => match transport.as_str() {
            "stdio" => {
                info!("starting codegraph-mcp server on stdio");
                let server = CodeGraphServer::new();
                let service = server.serve(stdio()).await.map_err(|e| {
                    tracing::error!(error = %e, "failed to start MCP server");
                    e
                })?;
                info!("codegraph-mcp server ready");
                service.waiting().await?;
            }
            other => return Err(format!("unsupported transport: {other}").into()),
        },
    }

    Ok(())
}

use clap::Parser;
use tracing_subscriber::EnvFilter;

use a3s_lsp::actions::ActionInvocation;
use a3s_lsp::cli::{Cli, Commands};
use a3s_lsp::LspManager;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries JSON results
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let manager = LspManager::global();

    let succeeded = match cli.command {
        Commands::Run {
            action,
            file,
            line,
            character,
            new_name,
            apply_edits,
            range,
            only,
        } => {
            let invocation = ActionInvocation {
                action,
                file,
                line,
                character,
                new_name,
                apply_edits,
                range,
                only,
            };
            let outcome = tokio::select! {
                outcome = a3s_lsp::cli::run::execute(invocation, manager) => outcome,
                _ = tokio::signal::ctrl_c() => {
                    tracing::warn!("Interrupted; killing language servers");
                    manager.kill_all();
                    std::process::exit(130);
                }
            };
            manager.shutdown_all().await;
            outcome?
        }
        Commands::Servers => {
            a3s_lsp::cli::servers::execute(manager).await?;
            true
        }
    };

    if !succeeded {
        // process::exit skips destructors
        manager.kill_all();
        std::process::exit(1);
    }
    Ok(())
}

use crate::error::Result;
use crate::manager::LspManager;

/// Execute the `servers` command: display the language server table.
pub async fn execute(manager: &LspManager) -> Result<()> {
    let descriptors = manager.descriptors().await;

    println!("{:<12} {:<30} {:<20} ACTIONS", "LANGUAGE", "COMMAND", "EXTENSIONS");
    for descriptor in &descriptors {
        println!(
            "{:<12} {:<30} {:<20} {}",
            descriptor.language,
            descriptor.command,
            descriptor.extensions.join(","),
            descriptor.supported_actions(),
        );
    }

    println!("\n{} server(s) configured", descriptors.len());
    Ok(())
}

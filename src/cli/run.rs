use crate::actions::{run_action, ActionInvocation, ActionRequest};
use crate::error::Result;
use crate::manager::LspManager;

/// Execute the `run` command: perform one action and print its result.
///
/// Returns whether the action succeeded.
pub async fn execute(invocation: ActionInvocation, manager: &LspManager) -> Result<bool> {
    let request = ActionRequest::try_from(invocation)?;
    let result = run_action(manager, request).await;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(!result.is_error())
}

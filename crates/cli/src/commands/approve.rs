use recfm_platform::WorkflowError;
use serde_json::json;

use crate::commands::context::{block_on, CommandContext};
use crate::commands::CommandResult;
use crate::GlobalArgs;

const COMMAND: &str = "approve";

pub fn run(global: &GlobalArgs) -> CommandResult {
    let context = match CommandContext::load(COMMAND, global) {
        Ok(context) => context,
        Err(result) => return result,
    };

    let outcome = block_on(COMMAND, async {
        let mut state = context.load_state()?;
        let registry = context.workflow().approve(&mut state).await?;
        context.save_state(&state)?;
        Ok::<_, WorkflowError>(registry)
    });

    match outcome {
        Ok(registry) => CommandResult::success_with(
            COMMAND,
            format!("{} is {}", registry.package_arn, registry.approval_status),
            &json!({ "registry": registry }),
        ),
        Err(result) => result,
    }
}

use recfm_platform::WorkflowError;
use serde_json::json;

use crate::commands::context::{block_on, CommandContext};
use crate::commands::CommandResult;
use crate::GlobalArgs;

const COMMAND: &str = "register";

pub fn run(global: &GlobalArgs) -> CommandResult {
    let context = match CommandContext::load(COMMAND, global) {
        Ok(context) => context,
        Err(result) => return result,
    };

    let outcome = block_on(COMMAND, async {
        let mut state = context.load_state()?;
        let registered = context.workflow().register(&mut state).await?;
        context.save_state(&state)?;
        Ok::<_, WorkflowError>(registered)
    });

    match outcome {
        Ok((lineage, registry)) => CommandResult::success_with(
            COMMAND,
            format!("registered {} ({})", registry.package_arn, registry.approval_status),
            &json!({ "lineage": lineage, "registry": registry }),
        ),
        Err(result) => result,
    }
}

use recfm_platform::WorkflowError;

use crate::commands::context::{block_on, CommandContext};
use crate::commands::CommandResult;
use crate::GlobalArgs;

const COMMAND: &str = "teardown";

pub fn run(global: &GlobalArgs) -> CommandResult {
    let context = match CommandContext::load(COMMAND, global) {
        Ok(context) => context,
        Err(result) => return result,
    };

    let outcome = block_on(COMMAND, async {
        let mut state = context.load_state()?;
        let deleted = context.workflow().teardown(&mut state).await?;
        context.save_state(&state)?;
        Ok::<_, WorkflowError>(deleted)
    });

    match outcome {
        Ok(name) => CommandResult::success(COMMAND, format!("deleted endpoint {name}")),
        Err(result) => result,
    }
}

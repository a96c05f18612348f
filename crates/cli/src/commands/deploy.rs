use recfm_platform::WorkflowError;

use crate::commands::context::{block_on, CommandContext};
use crate::commands::CommandResult;
use crate::GlobalArgs;

const COMMAND: &str = "deploy";

pub fn run(global: &GlobalArgs) -> CommandResult {
    let context = match CommandContext::load(COMMAND, global) {
        Ok(context) => context,
        Err(result) => return result,
    };

    let outcome = block_on(COMMAND, async {
        let mut state = context.load_state()?;
        let endpoint = context.workflow().deploy(&mut state).await?;
        context.save_state(&state)?;
        Ok::<_, WorkflowError>(endpoint)
    });

    match outcome {
        Ok(endpoint) => CommandResult::success_with(
            COMMAND,
            format!("endpoint {} is {}", endpoint.name, endpoint.status),
            &endpoint,
        ),
        Err(result) => result,
    }
}

use recfm_platform::WorkflowError;

use crate::commands::context::{block_on, CommandContext};
use crate::commands::CommandResult;
use crate::GlobalArgs;

const COMMAND: &str = "train";

pub fn run(global: &GlobalArgs) -> CommandResult {
    let context = match CommandContext::load(COMMAND, global) {
        Ok(context) => context,
        Err(result) => return result,
    };

    let outcome = block_on(COMMAND, async {
        let mut state = context.load_state()?;
        let training = context.workflow().train(&mut state).await?;
        context.save_state(&state)?;
        Ok::<_, WorkflowError>(training)
    });

    match outcome {
        Ok(training) => CommandResult::success_with(
            COMMAND,
            format!("training job {} completed", training.job_name),
            &training,
        ),
        Err(result) => result,
    }
}

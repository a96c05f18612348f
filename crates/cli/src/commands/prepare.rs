use recfm_platform::WorkflowError;

use crate::commands::context::{workflow_failure, CommandContext};
use crate::commands::CommandResult;
use crate::GlobalArgs;

const COMMAND: &str = "prepare";

pub fn run(global: &GlobalArgs) -> CommandResult {
    let context = match CommandContext::load(COMMAND, global) {
        Ok(context) => context,
        Err(result) => return result,
    };

    let result = (|| {
        let mut state = context.load_state()?;
        let summary = context.workflow().prepare(&mut state)?;
        context.save_state(&state)?;
        Ok::<_, WorkflowError>(summary)
    })();

    match result {
        Ok(summary) => CommandResult::success_with(
            COMMAND,
            format!(
                "prepared {} training and {} test rows with {} features",
                summary.train_rows, summary.test_rows, summary.feature_dim
            ),
            &summary,
        ),
        Err(error) => workflow_failure(COMMAND, &error),
    }
}

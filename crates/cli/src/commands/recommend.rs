use recfm_core::dataset::normalize_customer_id;
use recfm_platform::{RecommendRequest, WorkflowError};
use serde_json::json;

use crate::commands::context::{block_on, CommandContext};
use crate::commands::CommandResult;
use crate::{GlobalArgs, ScoringArgs};

const COMMAND: &str = "recommend";

pub fn run(global: &GlobalArgs, customer: &str, scoring: &ScoringArgs) -> CommandResult {
    let context = match CommandContext::load(COMMAND, global) {
        Ok(context) => context,
        Err(result) => return result,
    };

    let request = RecommendRequest {
        customer_id: normalize_customer_id(customer),
        pool_size: scoring.pool,
        count: scoring.count,
    };
    let outcome = block_on(COMMAND, async {
        let state = context.load_state()?;
        let ranked = context.workflow().recommend(&state, &request).await?;
        Ok::<_, WorkflowError>(ranked)
    });

    match outcome {
        Ok(ranked) => CommandResult::success_with(
            COMMAND,
            format!("{} recommendations for customer {}", ranked.len(), request.customer_id),
            &json!({ "request": request, "recommendations": ranked }),
        ),
        Err(result) => result,
    }
}

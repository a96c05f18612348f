//! `recfm run`: every step in order, persisting state after each one.

use recfm_core::dataset::normalize_customer_id;
use recfm_core::state::WorkflowState;
use recfm_platform::{RecommendRequest, WorkflowError};
use serde_json::{json, Map, Value};

use crate::commands::context::{block_on, CommandContext};
use crate::commands::CommandResult;
use crate::{GlobalArgs, ScoringArgs};

const COMMAND: &str = "run";

/// A failed step keeps the state written by the steps before it.
#[derive(Debug)]
struct StepFailure {
    step: &'static str,
    error: WorkflowError,
}

trait AtStep<T> {
    fn at(self, step: &'static str) -> Result<T, StepFailure>;
}

impl<T, E: Into<WorkflowError>> AtStep<T> for Result<T, E> {
    fn at(self, step: &'static str) -> Result<T, StepFailure> {
        self.map_err(|error| StepFailure { step, error: error.into() })
    }
}

pub fn run(
    global: &GlobalArgs,
    customer: Option<&str>,
    scoring: &ScoringArgs,
    teardown: bool,
) -> CommandResult {
    let context = match CommandContext::load(COMMAND, global) {
        Ok(context) => context,
        Err(result) => return result,
    };

    let outcome = block_on(COMMAND, async {
        Ok::<_, WorkflowError>(run_steps(&context, customer, scoring, teardown).await)
    });

    match outcome {
        Ok(Ok(details)) => CommandResult::success_with(
            COMMAND,
            if context.dry_run { "dry run completed" } else { "workflow completed" },
            &details,
        ),
        Ok(Err(failure)) => {
            tracing::warn!(
                event_name = "cli.run.step_failed",
                step = failure.step,
                error = %failure.error,
                "workflow stopped"
            );
            CommandResult::failure(
                COMMAND,
                failure.error.error_class(),
                format!("{} step failed: {}", failure.step, failure.error),
                1,
            )
        }
        Err(result) => result,
    }
}

async fn run_steps(
    context: &CommandContext,
    customer: Option<&str>,
    scoring: &ScoringArgs,
    teardown: bool,
) -> Result<Value, StepFailure> {
    let workflow = context.workflow();
    let mut state: WorkflowState = context.load_state().at("load_state")?;
    let mut details = Map::new();

    let summary = workflow.prepare(&mut state).at("prepare")?;
    context.save_state(&state).at("prepare")?;
    details.insert("prepare".to_owned(), json!(summary));

    let training = workflow.train(&mut state).await.at("train")?;
    context.save_state(&state).at("train")?;
    details.insert("train".to_owned(), json!(training));

    let (lineage, registry) = workflow.register(&mut state).await.at("register")?;
    context.save_state(&state).at("register")?;
    details.insert("register".to_owned(), json!({ "lineage": lineage, "registry": registry }));

    let endpoint = workflow.deploy(&mut state).await.at("deploy")?;
    context.save_state(&state).at("deploy")?;
    details.insert("deploy".to_owned(), json!(endpoint));

    if let Some(customer) = customer {
        let request = RecommendRequest {
            customer_id: normalize_customer_id(customer),
            pool_size: scoring.pool,
            count: scoring.count,
        };
        let ranked = workflow.recommend(&state, &request).await.at("recommend")?;
        details.insert(
            "recommend".to_owned(),
            json!({ "request": request, "recommendations": ranked }),
        );
    }

    if teardown {
        let deleted = workflow.teardown(&mut state).await.at("teardown")?;
        context.save_state(&state).at("teardown")?;
        details.insert("teardown".to_owned(), json!({ "deleted_endpoint": deleted }));
    }

    Ok(Value::Object(details))
}

use pharmabot_core::{FailoverClient, GenerationRequest, StatusReporter};
use serde_json::json;

use crate::cli::ProbeArgs;
use crate::error::CliError;
use crate::output::format_snapshot;

use super::CommandResult;

pub async fn run(args: &ProbeArgs, client: &FailoverClient) -> Result<CommandResult, CliError> {
    let request = GenerationRequest::new(args.prompt.as_str())
        .with_temperature(0.0)
        .with_max_output_tokens(16);
    let outcome = client.generate(&request).await;
    let snapshot = StatusReporter::new(client.pool().clone()).snapshot();

    match outcome {
        Ok(outcome) => {
            let summary = format!(
                "probe ok via {} ({} ms)\n\n{}",
                outcome.credential_id,
                outcome.latency_ms,
                format_snapshot(&snapshot)
            );
            let data = json!({
                "reply": outcome.text,
                "credential_id": outcome.credential_id,
                "attempts": outcome.attempts,
                "status": snapshot,
            });
            Ok(CommandResult::ok(data)
                .with_summary(summary)
                .with_warnings(outcome.warnings)
                .with_latency(outcome.latency_ms))
        }
        Err(error) => {
            let data = json!({
                "attempts": error.attempts(),
                "status": snapshot,
            });
            Ok(CommandResult::ok(data)
                .with_summary(format!("probe failed\n\n{}", format_snapshot(&snapshot)))
                .with_error(error.to_string()))
        }
    }
}

use pharmabot_core::{Answer, Pharmabot};
use serde::Serialize;

use crate::cli::AskArgs;
use crate::error::CliError;

use super::CommandResult;

#[derive(Debug, Serialize)]
struct AskResponseData<'a> {
    question: &'a str,
    #[serde(flatten)]
    answer: &'a Answer,
}

pub async fn run(args: &AskArgs, bot: &Pharmabot) -> Result<CommandResult, CliError> {
    let question = args.question();
    let answer = bot.answer(&question).await?;
    answer_result(&question, answer)
}

/// Shape one answer for output; shared with the chat loop.
pub fn answer_result(question: &str, answer: Answer) -> Result<CommandResult, CliError> {
    let data = serde_json::to_value(AskResponseData {
        question,
        answer: &answer,
    })?;

    let mut summary = answer.text.trim().to_string();
    if answer.degraded {
        summary.push_str(&format!(
            "\n\n(degraded: answered by {} after {} failed attempt(s))",
            answer.credential_id,
            answer.attempts.len().saturating_sub(1)
        ));
    }

    Ok(CommandResult::ok(data)
        .with_summary(summary)
        .with_warnings(answer.warnings)
        .with_latency(answer.latency_ms))
}

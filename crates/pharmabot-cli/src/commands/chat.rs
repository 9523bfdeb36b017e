use pharmabot_core::{AnswerError, Pharmabot};
use serde_json::json;
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;

use crate::cli::OutputFormat;
use crate::error::CliError;
use crate::output::{self, format_snapshot};

use super::ask::answer_result;
use super::CommandResult;

const PROMPT: &str = "you> ";

#[derive(Debug, PartialEq, Eq)]
enum ChatInput<'a> {
    Blank,
    Quit,
    Status,
    Reset,
    Question(&'a str),
}

fn parse_line(line: &str) -> ChatInput<'_> {
    match line.trim() {
        "" => ChatInput::Blank,
        ":quit" | ":exit" | ":q" => ChatInput::Quit,
        ":status" => ChatInput::Status,
        ":reset" => ChatInput::Reset,
        question => ChatInput::Question(question),
    }
}

pub async fn run(bot: &Pharmabot, format: OutputFormat, pretty: bool) -> Result<CommandResult, CliError> {
    let mut lines = BufReader::new(io::stdin()).lines();
    let mut stdout = io::stdout();
    let mut answered = 0_u64;
    let mut failed = 0_u64;

    if format == OutputFormat::Table {
        println!("pharmabot chat: ask about medicines in the catalog. :status, :reset, :quit");
    }

    loop {
        if format == OutputFormat::Table {
            stdout.write_all(PROMPT.as_bytes()).await?;
            stdout.flush().await?;
        }

        let Some(line) = lines.next_line().await? else {
            break;
        };

        match parse_line(&line) {
            ChatInput::Blank => continue,
            ChatInput::Quit => break,
            ChatInput::Status => {
                let snapshot = bot.pool_status();
                let result = CommandResult::ok(serde_json::to_value(&snapshot)?)
                    .with_summary(format_snapshot(&snapshot));
                output::render(&result, format, pretty)?;
            }
            ChatInput::Reset => {
                bot.pool().reset();
                let result = CommandResult::ok(json!({ "reset": true }))
                    .with_summary("credential pool reset");
                output::render(&result, format, pretty)?;
            }
            ChatInput::Question(question) => match bot.answer(question).await {
                Ok(answer) => {
                    answered += 1;
                    output::render(&answer_result(question, answer)?, format, pretty)?;
                }
                Err(AnswerError::EmptyQuestion) => continue,
                Err(error) => {
                    failed += 1;
                    let result = CommandResult::ok(json!({ "question": question }))
                        .with_summary("unable to answer right now")
                        .with_error(error.to_string());
                    output::render(&result, format, pretty)?;
                }
            },
        }
    }

    info!(answered, failed, "chat session ended");
    let summary = format!("session ended: {answered} answered, {failed} failed");
    Ok(CommandResult::ok(json!({ "answered": answered, "failed": failed })).with_summary(summary))
}

use std::sync::Arc;

use pharmabot_core::{CredentialPool, StatusReporter};

use crate::error::CliError;
use crate::output::format_snapshot;

use super::CommandResult;

pub fn run(pool: &Arc<CredentialPool>) -> Result<CommandResult, CliError> {
    let snapshot = StatusReporter::new(Arc::clone(pool)).snapshot();
    let data = serde_json::to_value(&snapshot)?;
    Ok(CommandResult::ok(data).with_summary(format_snapshot(&snapshot)))
}

use crate::cli::HistoryArgs;
use crate::config::{self, CliOverrides};
use crate::error::Result;
use crate::model::ImportRecord;
use crate::output::OutputContext;
use crate::util::format_timestamp;

/// Execute the history command.
///
/// # Errors
///
/// Returns an error if the database cannot be opened or queried.
pub fn execute(args: &HistoryArgs, cli: &CliOverrides, ctx: &OutputContext) -> Result<()> {
    let storage = config::load_config(cli)?.open_storage()?;
    let records = storage.list_imports(args.limit)?;

    if ctx.is_json() {
        return ctx.json_pretty(&records);
    }
    if records.is_empty() {
        ctx.print("No imports recorded.");
        return Ok(());
    }
    for record in &records {
        ctx.print(&render_record(record));
    }
    Ok(())
}

fn render_record(record: &ImportRecord) -> String {
    let mut line = format!(
        "{}  {:<7}  {} conversations, {} messages  {}  {}",
        format_timestamp(&record.imported_at),
        record.status.as_str(),
        record.conversations_count,
        record.messages_count,
        short_hash(&record.file_hash),
        record.file_path,
    );
    if let Some(error) = &record.error_message {
        line.push_str("\n    ");
        line.push_str(error);
    }
    line
}

fn short_hash(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}

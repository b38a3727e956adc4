use crate::cli::ImportArgs;
use crate::config::{self, CliOverrides};
use crate::error::Result;
use crate::import::Importer;
use crate::model::{ImportStats, ImportStatus};
use crate::output::OutputContext;
use crate::util::progress::ProgressTracker;

/// Execute the import command.
///
/// # Errors
///
/// Returns an error if configuration is invalid, the database cannot be
/// opened, or the import fails fatally (including a duplicate file).
pub fn execute(args: &ImportArgs, cli: &CliOverrides, ctx: &OutputContext) -> Result<()> {
    let resolved = config::load_config(cli)?;
    let mut storage = resolved.open_storage()?;

    let progress = if ctx.is_json() || ctx.is_quiet() {
        ProgressTracker::hidden()
    } else {
        ProgressTracker::new_spinner("Importing export")
    };
    let stats = Importer::new(&mut storage, resolved.import)
        .with_progress(progress)
        .import(&args.file)?;

    if ctx.is_json() {
        return ctx.json_pretty(&stats);
    }
    for error in &stats.errors {
        ctx.warning(&error.to_string());
    }
    ctx.print(&render_summary(&stats));
    Ok(())
}

fn render_summary(stats: &ImportStats) -> String {
    let headline = match stats.status() {
        ImportStatus::Success => "Import complete",
        ImportStatus::Partial => "Import partially complete",
        ImportStatus::Failed => "Import failed",
    };
    format!(
        "{headline} in {:.2}s\n  \
         conversations: {} new, {} updated\n  \
         messages:      {} new, {} already present\n  \
         branches:      {} new\n  \
         errors:        {}",
        stats.duration.as_secs_f64(),
        stats.conversations_imported,
        stats.conversations_updated,
        stats.messages_imported,
        stats.messages_skipped,
        stats.branches_created,
        stats.errors.len(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ThreadkeepError;

    #[test]
    fn summary_reports_counts_and_status() {
        let stats = ImportStats {
            conversations_imported: 2,
            conversations_updated: 1,
            messages_imported: 10,
            messages_skipped: 4,
            branches_created: 1,
            errors: vec![ThreadkeepError::conversation("c9", "bad")],
            ..ImportStats::default()
        };
        let text = render_summary(&stats);
        assert!(text.starts_with("Import partially complete"));
        assert!(text.contains("2 new, 1 updated"));
        assert!(text.contains("10 new, 4 already present"));
        assert!(text.contains("errors:        1"));
    }
}

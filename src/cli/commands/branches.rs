use serde::Serialize;
use std::collections::HashMap;

use crate::cli::BranchesArgs;
use crate::config::{self, CliOverrides};
use crate::error::{Result, ThreadkeepError};
use crate::model::{Branch, Conversation};
use crate::output::OutputContext;
use crate::storage::SqliteStorage;

#[derive(Serialize)]
struct BranchesOutput<'a> {
    conversation: &'a Conversation,
    branches: Vec<BranchSummary<'a>>,
}

#[derive(Serialize)]
struct BranchSummary<'a> {
    #[serde(flatten)]
    branch: &'a Branch,
    message_count: usize,
}

/// Execute the branches command.
///
/// # Errors
///
/// Returns an error if the conversation is unknown or the database query fails.
pub fn execute(args: &BranchesArgs, cli: &CliOverrides, ctx: &OutputContext) -> Result<()> {
    let storage = config::load_config(cli)?.open_storage()?;
    let conversation = storage
        .get_conversation(&args.conversation)?
        .ok_or_else(|| {
            ThreadkeepError::validation(
                "conversation",
                format!("no conversation with uuid {}", args.conversation),
            )
        })?;
    let branches = storage.list_branches(&conversation.uuid)?;
    let counts = messages_per_branch(&storage, &conversation.uuid)?;

    if ctx.is_json() {
        let output = BranchesOutput {
            conversation: &conversation,
            branches: branches
                .iter()
                .map(|branch| BranchSummary {
                    branch,
                    message_count: counts.get(&branch.id).copied().unwrap_or(0),
                })
                .collect(),
        };
        return ctx.json_pretty(&output);
    }

    let title = if conversation.name.is_empty() {
        conversation.uuid.as_str()
    } else {
        conversation.name.as_str()
    };
    ctx.print(&format!(
        "{title} ({} messages, {} branches)",
        conversation.message_count,
        branches.len()
    ));
    for line in render_tree(&branches, &counts) {
        ctx.print(&line);
    }
    Ok(())
}

fn messages_per_branch(storage: &SqliteStorage, conversation_uuid: &str) -> Result<HashMap<i64, usize>> {
    let mut counts = HashMap::new();
    for message in storage.list_messages(conversation_uuid)? {
        *counts.entry(message.branch_id).or_insert(0) += 1;
    }
    Ok(counts)
}

/// Indented tree, children listed under their parent branch in creation order.
fn render_tree(branches: &[Branch], counts: &HashMap<i64, usize>) -> Vec<String> {
    let mut children: HashMap<Option<i64>, Vec<&Branch>> = HashMap::new();
    for branch in branches {
        children.entry(branch.parent_branch_id).or_default().push(branch);
    }

    let mut lines = Vec::new();
    let mut stack: Vec<(&Branch, usize)> = children
        .get(&None)
        .map(|roots| roots.iter().rev().map(|b| (*b, 0)).collect())
        .unwrap_or_default();

    while let Some((branch, depth)) = stack.pop() {
        lines.push(format!(
            "{}{} ({} messages)",
            "  ".repeat(depth + 1),
            branch.name,
            counts.get(&branch.id).copied().unwrap_or(0)
        ));
        if let Some(kids) = children.get(&Some(branch.id)) {
            stack.extend(kids.iter().rev().map(|kid| (*kid, depth + 1)));
        }
    }
    lines
}

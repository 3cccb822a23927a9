// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `keepsake chat`: one orchestrator turn from the command line.

use std::path::{Path, PathBuf};

use keepsake_config::KeepsakeConfig;
use keepsake_core::KeepsakeError;
use keepsake_memory::{CorpusEntry, SubjectProfile, TurnOutcome, TurnRequest};
use serde_json::json;

use crate::memories::{describe_outcome, open_engine};

pub struct ChatArgs {
    pub owner: String,
    pub subject: SubjectProfile,
    pub corpus: Option<PathBuf>,
    pub json: bool,
    pub message: String,
}

/// One corpus entry per non-blank line.
pub fn parse_corpus(text: &str) -> Vec<CorpusEntry> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(CorpusEntry::new)
        .collect()
}

async fn load_corpus(path: &Path) -> Result<Vec<CorpusEntry>, KeepsakeError> {
    let text = tokio::fs::read_to_string(path).await.map_err(|e| {
        KeepsakeError::Config(format!("failed to read corpus {}: {e}", path.display()))
    })?;
    Ok(parse_corpus(&text))
}

pub fn render_outcome(outcome: &TurnOutcome) -> String {
    let mut out = outcome.reply.clone();
    if !outcome.retrieved.is_empty() {
        out.push_str("\n\ncontext:");
        for item in &outcome.retrieved {
            out.push_str(&format!(
                "\n  {:.3}  [{}] {} ({})",
                item.relevance_score,
                item.happened_at.format("%Y-%m-%d"),
                item.content,
                item.source_type
            ));
        }
    }
    if let Some(extracted) = &outcome.extracted {
        out.push_str(&format!("\n\nmemory: {}", describe_outcome(extracted)));
    }
    out
}

pub async fn run_chat(config: &KeepsakeConfig, args: ChatArgs) -> Result<(), KeepsakeError> {
    let corpus = match &args.corpus {
        Some(path) => load_corpus(path).await?,
        None => Vec::new(),
    };
    let engine = open_engine(config).await?;
    let request = TurnRequest::new(args.owner, args.subject, args.message).with_corpus(corpus);
    let outcome = engine.turn(&request).await;

    if args.json {
        let value = json!({
            "reply": outcome.reply,
            "route": outcome.route.route.as_str(),
            "retrieved": outcome.retrieved,
            "memory": outcome.extracted.as_ref().map(describe_outcome),
            "stages": outcome.stages,
        });
        println!("{value:#}");
    } else {
        println!("{}", render_outcome(&outcome));
    }
    Ok(())
}

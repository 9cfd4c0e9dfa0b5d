//! Replaying a recorded conversation against a live agent.
//!
//! Every recorded user message is sent to the agent again. The actions the
//! agent picks in between are compared with the recorded ones; differences
//! are reported but never stop the replay, since a retrained model is
//! expected to diverge now and then.

use std::path::Path;

use parley_channel::OutputChannel;
use parley_core::story::ACTION_LISTEN_NAME;
use parley_core::{DialogueStateTracker, Domain, DomainModel, Event, TranscriptDump};

use crate::agent::Agent;
use crate::error::AgentError;

/// Placeholder for a step missing from one side of an alignment.
const GAP: &str = "None";

/// A span where the live agent did something other than the recording.
#[derive(Debug, Clone, PartialEq)]
pub struct Divergence {
    /// Live actions, padded with `None` where the recording has extra steps.
    pub predicted: Vec<String>,
    /// Recorded actions, padded with `None` where the agent has extra steps.
    pub expected: Vec<String>,
}

/// Result of replaying a transcript.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplayReport {
    pub utterances: usize,
    pub divergences: Vec<Divergence>,
}

impl ReplayReport {
    pub fn is_consistent(&self) -> bool {
        self.divergences.is_empty()
    }
}

/// Read a transcript dump and rebuild its tracker with the domain's slots.
pub fn load_tracker_from_json(path: &Path, domain: &Domain) -> Result<DialogueStateTracker, AgentError> {
    let dump = TranscriptDump::load(path)?;
    Ok(DialogueStateTracker::from_dump(dump, domain.slots().to_vec()))
}

/// Pad two action sequences so that their longest common subsequence lines
/// up. Steps only one side has are matched with `None`.
pub fn align_lists(predicted: &[String], actual: &[String]) -> (Vec<String>, Vec<String>) {
    let (n, m) = (predicted.len(), actual.len());
    // lcs[i][j] is the LCS length of predicted[i..] and actual[j..].
    let mut lcs = vec![vec![0usize; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lcs[i][j] = if predicted[i] == actual[j] {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }

    let mut padded_predicted = Vec::with_capacity(n.max(m));
    let mut padded_actual = Vec::with_capacity(n.max(m));
    let (mut i, mut j) = (0, 0);
    let (mut span_i, mut span_j) = (0, 0);

    while i < n && j < m {
        if predicted[i] == actual[j] {
            pad_span(
                &predicted[span_i..i],
                &actual[span_j..j],
                &mut padded_predicted,
                &mut padded_actual,
            );
            padded_predicted.push(predicted[i].clone());
            padded_actual.push(actual[j].clone());
            i += 1;
            j += 1;
            span_i = i;
            span_j = j;
        } else if lcs[i + 1][j] >= lcs[i][j + 1] {
            i += 1;
        } else {
            j += 1;
        }
    }
    pad_span(
        &predicted[span_i..],
        &actual[span_j..],
        &mut padded_predicted,
        &mut padded_actual,
    );
    (padded_predicted, padded_actual)
}

/// Append two unmatched spans, padding the shorter one to the same length.
fn pad_span(predicted: &[String], actual: &[String], out_p: &mut Vec<String>, out_a: &mut Vec<String>) {
    let len = predicted.len().max(actual.len());
    out_p.extend(predicted.iter().cloned());
    out_p.extend(std::iter::repeat(GAP.to_string()).take(len - predicted.len()));
    out_a.extend(actual.iter().cloned());
    out_a.extend(std::iter::repeat(GAP.to_string()).take(len - actual.len()));
}

fn check_alignment(predicted: &[String], recorded: &[String], report: &mut ReplayReport) {
    let (predicted, expected) = align_lists(predicted, recorded);
    if predicted != expected {
        tracing::warn!(
            expected = ?expected,
            predicted = ?predicted,
            "Model predicted different actions than the model used to create the story"
        );
        report.divergences.push(Divergence {
            predicted,
            expected,
        });
    }
}

/// Send every user message recorded after the latest restart to `agent`
/// and compare the actions it takes with the recorded ones.
///
/// Afterwards the agent's tracker for the same sender closely matches the
/// replayed one.
pub async fn replay_events(
    tracker: &DialogueStateTracker,
    agent: &Agent,
    output: &dyn OutputChannel,
) -> Result<ReplayReport, AgentError> {
    let sender_id = tracker.sender_id();
    let mut report = ReplayReport::default();
    let mut recorded: Vec<String> = Vec::new();
    let mut last_prediction = vec![ACTION_LISTEN_NAME.to_string()];

    for event in tracker.events_after_latest_restart() {
        match event {
            Event::UserUttered { text, .. } => {
                check_alignment(&last_prediction, &recorded, &mut report);
                recorded.clear();
                tracing::info!(sender_id = %sender_id, text = %text, "Replaying user message");
                agent.handle_message(text, sender_id, output).await?;
                report.utterances += 1;
                last_prediction = agent
                    .tracker(sender_id)
                    .await
                    .map(|t| t.actions_since_last_utterance())
                    .unwrap_or_default();
            }
            Event::ActionExecuted { name, .. } => recorded.push(name.clone()),
            _ => {}
        }
    }
    check_alignment(&last_prediction, &recorded, &mut report);
    Ok(report)
}

//! Call-priority analyzer: "who to call next and why".
//!
//! Signals are evaluated independently, weighted from the shared weight
//! store, summed, and bucketed by fixed thresholds. Analyses are recomputed
//! on demand and never persisted as authoritative state.
mod signals;

use crate::config::{PriorityThresholds, SignalWindows};
use crate::error::{EngineError, EngineResult, EntityKind};
use crate::learning::{CallOutcome, FeedbackRecord, WeightStore};
use crate::model::{Contact, Interaction, InteractionKind};
use crate::store::{ContactFilter, ContactStore};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Fixed label explaining why a contact scored points.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    HotLead,
    TicketUrgent,
    TicketWaiting,
    NoShow,
    ProposalSent,
    EmailReplied,
    MeetingFollowup,
    InactiveCustomer,
    Reactivation,
}

impl ReasonCode {
    pub const ALL: [ReasonCode; 9] = [
        ReasonCode::HotLead,
        ReasonCode::TicketUrgent,
        ReasonCode::TicketWaiting,
        ReasonCode::NoShow,
        ReasonCode::ProposalSent,
        ReasonCode::EmailReplied,
        ReasonCode::MeetingFollowup,
        ReasonCode::InactiveCustomer,
        ReasonCode::Reactivation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::HotLead => "hot_lead",
            ReasonCode::TicketUrgent => "ticket_urgent",
            ReasonCode::TicketWaiting => "ticket_waiting",
            ReasonCode::NoShow => "no_show",
            ReasonCode::ProposalSent => "proposal_sent",
            ReasonCode::EmailReplied => "email_replied",
            ReasonCode::MeetingFollowup => "meeting_followup",
            ReasonCode::InactiveCustomer => "inactive_customer",
            ReasonCode::Reactivation => "reactivation",
        }
    }

    /// Starting weight before any feedback.
    pub fn default_weight(&self) -> u32 {
        match self {
            ReasonCode::TicketUrgent => 90,
            ReasonCode::HotLead => 80,
            ReasonCode::EmailReplied => 75,
            ReasonCode::NoShow => 70,
            ReasonCode::ProposalSent => 65,
            ReasonCode::TicketWaiting => 60,
            ReasonCode::MeetingFollowup => 55,
            ReasonCode::InactiveCustomer => 40,
            ReasonCode::Reactivation => 30,
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReasonCode {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase().replace('-', "_");
        ReasonCode::ALL
            .into_iter()
            .find(|code| code.as_str() == normalized)
            .ok_or_else(|| format!("unknown reason code {raw:?}"))
    }
}

/// Discretized score range, ordered from `none` to `urgent`.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    None,
    Low,
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub const ALL: [Priority; 5] = [
        Priority::None,
        Priority::Low,
        Priority::Medium,
        Priority::High,
        Priority::Urgent,
    ];

    pub fn from_score(score: u32, thresholds: &PriorityThresholds) -> Self {
        if score >= thresholds.urgent {
            Priority::Urgent
        } else if score >= thresholds.high {
            Priority::High
        } else if score >= thresholds.medium {
            Priority::Medium
        } else if score > 0 {
            Priority::Low
        } else {
            Priority::None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::None => "none",
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }

    fn call_to_action(&self) -> &'static str {
        match self {
            Priority::None => "No call needed right now",
            Priority::Low => "Call when time allows",
            Priority::Medium => "Call this week",
            Priority::High => "Call today",
            Priority::Urgent => "Call now",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase();
        Priority::ALL
            .into_iter()
            .find(|priority| priority.as_str() == normalized)
            .ok_or_else(|| format!("unknown priority {raw:?}"))
    }
}

/// One weighted contribution to a score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScoreReason {
    pub code: ReasonCode,
    pub weight: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days_since: Option<u64>,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScoreAnalysis {
    pub contact_id: String,
    pub score: u32,
    pub priority: Priority,
    /// Ordered by descending weight.
    pub reasons: Vec<ScoreReason>,
    pub recommendation: String,
}

impl ScoreAnalysis {
    fn unreachable(contact_id: &str) -> Self {
        Self {
            contact_id: contact_id.to_string(),
            score: 0,
            priority: Priority::None,
            reasons: Vec::new(),
            recommendation: "No phone number on file".to_string(),
        }
    }

    pub fn top_reason(&self) -> Option<&ScoreReason> {
        self.reasons.first()
    }
}

pub struct CallPriorityAnalyzer {
    contacts: Arc<dyn ContactStore>,
    weights: Arc<WeightStore>,
    thresholds: PriorityThresholds,
    windows: SignalWindows,
}

impl CallPriorityAnalyzer {
    pub fn new(
        contacts: Arc<dyn ContactStore>,
        weights: Arc<WeightStore>,
        thresholds: PriorityThresholds,
        windows: SignalWindows,
    ) -> Self {
        Self {
            contacts,
            weights,
            thresholds,
            windows,
        }
    }

    pub fn weights(&self) -> &WeightStore {
        &self.weights
    }

    fn load_contact(&self, contact_id: &str) -> EngineResult<Contact> {
        self.contacts
            .get(contact_id)?
            .ok_or_else(|| EngineError::not_found(EntityKind::Contact, contact_id))
    }

    pub fn analyze(&self, contact_id: &str, now: u64) -> EngineResult<ScoreAnalysis> {
        let contact = self.load_contact(contact_id)?;
        Ok(self.analyze_contact(&contact, now))
    }

    /// Score one contact with the current weights.
    pub fn analyze_contact(&self, contact: &Contact, now: u64) -> ScoreAnalysis {
        if !contact.has_phone() {
            return ScoreAnalysis::unreachable(&contact.id);
        }
        let mut reasons: Vec<ScoreReason> = signals::evaluate(contact, &self.windows, now)
            .into_iter()
            .map(|hit| ScoreReason {
                code: hit.code,
                weight: self.weights.weight(hit.code),
                days_since: hit.days_since,
                detail: hit.detail,
            })
            .collect();
        reasons.sort_by_key(|reason| (Reverse(reason.weight), reason.code));

        let score = reasons.iter().map(|reason| reason.weight).sum();
        let priority = Priority::from_score(score, &self.thresholds);
        let recommendation = match reasons.first() {
            Some(top) => format!("{}: {}", priority.call_to_action(), top.detail),
            None => priority.call_to_action().to_string(),
        };
        ScoreAnalysis {
            contact_id: contact.id.clone(),
            score,
            priority,
            reasons,
            recommendation,
        }
    }

    /// Analyze, filter by bucket, sort by score then contact id, truncate.
    pub fn rank(
        &self,
        contacts: &[Contact],
        min_priority: Priority,
        limit: usize,
        now: u64,
    ) -> Vec<ScoreAnalysis> {
        let mut ranked: Vec<ScoreAnalysis> = contacts
            .iter()
            .map(|contact| self.analyze_contact(contact, now))
            .filter(|analysis| analysis.priority >= min_priority)
            .collect();
        ranked.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| a.contact_id.cmp(&b.contact_id))
        });
        ranked.truncate(limit);
        ranked
    }

    /// Rank the store's reachable, consenting contacts.
    pub fn rank_candidates(
        &self,
        min_priority: Priority,
        limit: usize,
        now: u64,
    ) -> EngineResult<Vec<ScoreAnalysis>> {
        let pool = self.contacts.find_many(&ContactFilter::call_candidates())?;
        Ok(self.rank(&pool, min_priority, limit, now))
    }

    /// Record a call outcome against the reason that justified the call.
    ///
    /// The call itself is logged on the contact so later analyses see it.
    pub fn record_feedback(
        &self,
        contact_id: &str,
        reason: ReasonCode,
        outcome: CallOutcome,
        now: u64,
    ) -> EngineResult<FeedbackRecord> {
        self.load_contact(contact_id)?;
        let record = self.weights.apply_feedback(contact_id, reason, outcome, now);
        self.contacts.append_interaction(
            contact_id,
            Interaction::new(InteractionKind::CallPlaced, now)
                .with_note(format!("{reason}: {outcome}")),
        )?;
        tracing::info!(
            contact_id,
            reason = %reason,
            outcome = %outcome,
            weight_before = record.weight_before,
            weight_after = record.weight_after,
            "recorded call feedback"
        );
        Ok(record)
    }
}

#[cfg(test)]
#[path = "scoring_tests.rs"]
mod tests;

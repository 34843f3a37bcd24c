//! Independent signal checks over a single contact.
//!
//! Each check reads only the contact record and the clock and reports at most
//! one hit. Weighting happens in the caller so these stay pure.
use super::ReasonCode;
use crate::config::SignalWindows;
use crate::model::{days_between, Contact, Interaction, InteractionKind, Stage};

/// One triggered signal before weighting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SignalHit {
    pub(crate) code: ReasonCode,
    pub(crate) days_since: Option<u64>,
    pub(crate) detail: String,
}

impl SignalHit {
    fn new(code: ReasonCode, days_since: Option<u64>, detail: String) -> Self {
        Self {
            code,
            days_since,
            detail,
        }
    }
}

fn days_ago(days: u64) -> String {
    match days {
        0 => "today".to_string(),
        1 => "1 day ago".to_string(),
        n => format!("{n} days ago"),
    }
}

fn within(interaction: &Interaction, now: u64, window_days: u64) -> Option<u64> {
    let days = days_between(interaction.at, now);
    (days <= window_days).then_some(days)
}

fn last_touch(contact: &Contact, fallback: u64) -> u64 {
    contact
        .last_interaction()
        .map(|interaction| interaction.at)
        .unwrap_or(fallback)
}

pub(crate) fn evaluate(contact: &Contact, windows: &SignalWindows, now: u64) -> Vec<SignalHit> {
    let checks: [fn(&Contact, &SignalWindows, u64) -> Option<SignalHit>; 9] = [
        ticket_urgent,
        hot_lead,
        email_replied,
        no_show,
        proposal_sent,
        ticket_waiting,
        meeting_followup,
        inactive_customer,
        reactivation,
    ];
    checks
        .iter()
        .filter_map(|check| check(contact, windows, now))
        .collect()
}

fn ticket_urgent(contact: &Contact, windows: &SignalWindows, now: u64) -> Option<SignalHit> {
    let ticket = contact.last_of(|i| i.kind == InteractionKind::TicketOpened && i.urgent)?;
    let days = within(ticket, now, windows.ticket_urgent_days)?;
    if contact.any_after(ticket.at, |i| i.kind.is_outbound()) {
        return None;
    }
    Some(SignalHit::new(
        ReasonCode::TicketUrgent,
        Some(days),
        format!("urgent support ticket opened {} with no reply", days_ago(days)),
    ))
}

fn hot_lead(contact: &Contact, windows: &SignalWindows, now: u64) -> Option<SignalHit> {
    if !matches!(contact.stage, Stage::Prospect | Stage::Contacted) {
        return None;
    }
    let engagement = contact.last_of(|i| i.kind.is_inbound())?;
    let days = within(engagement, now, windows.hot_lead_days)?;
    Some(SignalHit::new(
        ReasonCode::HotLead,
        Some(days),
        format!("{} engaged ({}) {}", contact.stage, engagement.kind, days_ago(days)),
    ))
}

fn email_replied(contact: &Contact, windows: &SignalWindows, now: u64) -> Option<SignalHit> {
    let reply = contact.last_kind(InteractionKind::EmailReplied)?;
    let days = within(reply, now, windows.email_reply_days)?;
    Some(SignalHit::new(
        ReasonCode::EmailReplied,
        Some(days),
        format!("replied to an email {}", days_ago(days)),
    ))
}

fn no_show(contact: &Contact, windows: &SignalWindows, now: u64) -> Option<SignalHit> {
    let missed = contact.last_kind(InteractionKind::MeetingNoShow)?;
    let days = within(missed, now, windows.no_show_days)?;
    if contact.any_after(missed.at, |i| i.kind == InteractionKind::MeetingHeld) {
        return None;
    }
    Some(SignalHit::new(
        ReasonCode::NoShow,
        Some(days),
        format!("missed a meeting {}", days_ago(days)),
    ))
}

fn proposal_sent(contact: &Contact, windows: &SignalWindows, now: u64) -> Option<SignalHit> {
    if contact.stage != Stage::ProposalSent {
        return None;
    }
    let days = days_between(contact.stage_changed_at, now);
    if days < windows.proposal_followup_days {
        return None;
    }
    if contact.any_after(contact.stage_changed_at, |i| i.kind.is_inbound()) {
        return None;
    }
    Some(SignalHit::new(
        ReasonCode::ProposalSent,
        Some(days),
        format!("proposal sent {} with no response", days_ago(days)),
    ))
}

fn ticket_waiting(contact: &Contact, windows: &SignalWindows, now: u64) -> Option<SignalHit> {
    let ticket = contact.last_of(|i| {
        i.kind == InteractionKind::TicketAwaitingReply
            || (i.kind == InteractionKind::TicketOpened && !i.urgent)
    })?;
    let days = within(ticket, now, windows.ticket_waiting_days)?;
    if contact.any_after(ticket.at, |i| i.kind.is_outbound()) {
        return None;
    }
    Some(SignalHit::new(
        ReasonCode::TicketWaiting,
        Some(days),
        format!("support ticket waiting on us since {}", days_ago(days)),
    ))
}

fn meeting_followup(contact: &Contact, windows: &SignalWindows, now: u64) -> Option<SignalHit> {
    if contact.stage != Stage::MeetingDone {
        return None;
    }
    let meeting = contact.last_kind(InteractionKind::MeetingHeld)?;
    let days = days_between(meeting.at, now);
    if days < 1 || days > windows.meeting_followup_days {
        return None;
    }
    Some(SignalHit::new(
        ReasonCode::MeetingFollowup,
        Some(days),
        format!("meeting held {}, follow-up window open", days_ago(days)),
    ))
}

fn inactive_customer(contact: &Contact, windows: &SignalWindows, now: u64) -> Option<SignalHit> {
    if !contact.stage.is_customer() {
        return None;
    }
    let days = days_between(last_touch(contact, contact.created_at), now);
    if days < windows.inactive_customer_days {
        return None;
    }
    Some(SignalHit::new(
        ReasonCode::InactiveCustomer,
        Some(days),
        format!("customer with no contact for {days} days"),
    ))
}

fn reactivation(contact: &Contact, windows: &SignalWindows, now: u64) -> Option<SignalHit> {
    if !contact.stage.is_exit() {
        return None;
    }
    let days = days_between(last_touch(contact, contact.stage_changed_at), now);
    if days < windows.reactivation_days {
        return None;
    }
    Some(SignalHit::new(
        ReasonCode::Reactivation,
        Some(days),
        format!("{} {days} days ago, candidate for reactivation", contact.stage),
    ))
}

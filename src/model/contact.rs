use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Ordered sales pipeline stage.
///
/// Variant order is the pipeline order; `churned` and `lost` are both exits.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Lead,
    Prospect,
    Contacted,
    MeetingScheduled,
    MeetingDone,
    ProposalSent,
    Customer,
    Active,
    Churned,
    Lost,
}

impl Stage {
    pub const ALL: [Stage; 10] = [
        Stage::Lead,
        Stage::Prospect,
        Stage::Contacted,
        Stage::MeetingScheduled,
        Stage::MeetingDone,
        Stage::ProposalSent,
        Stage::Customer,
        Stage::Active,
        Stage::Churned,
        Stage::Lost,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Lead => "lead",
            Stage::Prospect => "prospect",
            Stage::Contacted => "contacted",
            Stage::MeetingScheduled => "meeting_scheduled",
            Stage::MeetingDone => "meeting_done",
            Stage::ProposalSent => "proposal_sent",
            Stage::Customer => "customer",
            Stage::Active => "active",
            Stage::Churned => "churned",
            Stage::Lost => "lost",
        }
    }

    pub fn is_customer(&self) -> bool {
        matches!(self, Stage::Customer | Stage::Active)
    }

    pub fn is_exit(&self) -> bool {
        matches!(self, Stage::Churned | Stage::Lost)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase().replace('-', "_");
        Stage::ALL
            .into_iter()
            .find(|stage| stage.as_str() == normalized)
            .ok_or_else(|| format!("unknown stage {raw:?}"))
    }
}

/// What happened in a single logged interaction.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    EmailSent,
    EmailReplied,
    CallPlaced,
    InboundCall,
    SmsSent,
    SmsReceived,
    MeetingScheduled,
    MeetingHeld,
    MeetingNoShow,
    TicketOpened,
    TicketAwaitingReply,
    TaskCompleted,
    Note,
}

impl InteractionKind {
    pub const ALL: [InteractionKind; 13] = [
        InteractionKind::EmailSent,
        InteractionKind::EmailReplied,
        InteractionKind::CallPlaced,
        InteractionKind::InboundCall,
        InteractionKind::SmsSent,
        InteractionKind::SmsReceived,
        InteractionKind::MeetingScheduled,
        InteractionKind::MeetingHeld,
        InteractionKind::MeetingNoShow,
        InteractionKind::TicketOpened,
        InteractionKind::TicketAwaitingReply,
        InteractionKind::TaskCompleted,
        InteractionKind::Note,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionKind::EmailSent => "email_sent",
            InteractionKind::EmailReplied => "email_replied",
            InteractionKind::CallPlaced => "call_placed",
            InteractionKind::InboundCall => "inbound_call",
            InteractionKind::SmsSent => "sms_sent",
            InteractionKind::SmsReceived => "sms_received",
            InteractionKind::MeetingScheduled => "meeting_scheduled",
            InteractionKind::MeetingHeld => "meeting_held",
            InteractionKind::MeetingNoShow => "meeting_no_show",
            InteractionKind::TicketOpened => "ticket_opened",
            InteractionKind::TicketAwaitingReply => "ticket_awaiting_reply",
            InteractionKind::TaskCompleted => "task_completed",
            InteractionKind::Note => "note",
        }
    }

    /// The contact reached out to us.
    pub fn is_inbound(&self) -> bool {
        matches!(
            self,
            InteractionKind::EmailReplied | InteractionKind::InboundCall | InteractionKind::SmsReceived
        )
    }

    /// We reached out to the contact.
    pub fn is_outbound(&self) -> bool {
        matches!(
            self,
            InteractionKind::EmailSent | InteractionKind::CallPlaced | InteractionKind::SmsSent
        )
    }
}

impl fmt::Display for InteractionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InteractionKind {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase().replace('-', "_");
        InteractionKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| format!("unknown interaction kind {raw:?}"))
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct Interaction {
    pub kind: InteractionKind,
    pub at: u64,
    /// Only meaningful for tickets.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub urgent: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl Interaction {
    pub fn new(kind: InteractionKind, at: u64) -> Self {
        Self {
            kind,
            at,
            urgent: false,
            note: None,
        }
    }

    pub fn urgent(mut self) -> Self {
        self.urgent = true;
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct Contact {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub stage: Stage,
    pub stage_changed_at: u64,
    #[serde(default)]
    pub opted_out: bool,
    /// Back-reference to the single non-terminal enrollment, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_enrollment: Option<String>,
    /// Append-only, ordered by `at`.
    #[serde(default)]
    pub interactions: Vec<Interaction>,
    pub created_at: u64,
}

impl Contact {
    pub fn new(id: impl Into<String>, name: impl Into<String>, email: impl Into<String>, now: u64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            company: None,
            email: email.into(),
            phone: None,
            stage: Stage::Lead,
            stage_changed_at: now,
            opted_out: false,
            active_enrollment: None,
            interactions: Vec::new(),
            created_at: now,
        }
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    pub fn with_company(mut self, company: impl Into<String>) -> Self {
        self.company = Some(company.into());
        self
    }

    pub fn with_stage(mut self, stage: Stage, at: u64) -> Self {
        self.stage = stage;
        self.stage_changed_at = at;
        self
    }

    pub fn has_phone(&self) -> bool {
        self.phone
            .as_deref()
            .is_some_and(|phone| !phone.trim().is_empty())
    }

    pub fn first_name(&self) -> &str {
        self.name.split_whitespace().next().unwrap_or(self.name.as_str())
    }

    pub fn set_stage(&mut self, stage: Stage, at: u64) {
        if self.stage != stage {
            self.stage = stage;
            self.stage_changed_at = at;
        }
    }

    /// Record an interaction, keeping the log ordered by time.
    ///
    /// Records with equal timestamps keep arrival order.
    pub fn push_interaction(&mut self, interaction: Interaction) {
        let position = self
            .interactions
            .partition_point(|existing| existing.at <= interaction.at);
        self.interactions.insert(position, interaction);
    }

    pub fn last_interaction(&self) -> Option<&Interaction> {
        self.interactions.last()
    }

    pub fn last_of(&self, predicate: impl Fn(&Interaction) -> bool) -> Option<&Interaction> {
        self.interactions.iter().rev().find(|interaction| predicate(interaction))
    }

    pub fn last_kind(&self, kind: InteractionKind) -> Option<&Interaction> {
        self.last_of(|interaction| interaction.kind == kind)
    }

    /// Any interaction strictly after `at` that satisfies `predicate`.
    pub fn any_after(&self, at: u64, predicate: impl Fn(&Interaction) -> bool) -> bool {
        self.interactions
            .iter()
            .rev()
            .take_while(|interaction| interaction.at > at)
            .any(predicate)
    }
}

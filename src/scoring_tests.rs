use super::*;
use crate::config::{default_initial_weights, LearningConfig};
use crate::model::{Stage, DAY_MS};
use crate::store::MemoryStore;
use std::collections::BTreeMap;

const NOW: u64 = 400 * DAY_MS;

fn reachable(id: &str) -> Contact {
    Contact::new(id, format!("Contact {id}"), format!("{id}@example.com"), 0).with_phone("+1 555 0100")
}

fn urgent_ticket(id: &str) -> Contact {
    let mut contact = reachable(id);
    contact.push_interaction(Interaction::new(InteractionKind::TicketOpened, NOW - DAY_MS).urgent());
    contact
}

fn lost_deal(id: &str) -> Contact {
    reachable(id).with_stage(Stage::Lost, 0)
}

fn analyzer_with(
    contacts: Vec<Contact>,
    weights: &BTreeMap<ReasonCode, u32>,
) -> (CallPriorityAnalyzer, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::with_contacts(contacts));
    let analyzer = CallPriorityAnalyzer::new(
        store.clone(),
        Arc::new(WeightStore::new(LearningConfig::default(), weights)),
        PriorityThresholds::default(),
        SignalWindows::default(),
    );
    (analyzer, store)
}

fn analyzer(contacts: Vec<Contact>) -> (CallPriorityAnalyzer, Arc<MemoryStore>) {
    analyzer_with(contacts, &default_initial_weights())
}

#[test]
fn bucket_boundaries_are_exact() {
    let thresholds = PriorityThresholds::default();
    let cases = [
        (0, Priority::None),
        (1, Priority::Low),
        (29, Priority::Low),
        (30, Priority::Medium),
        (59, Priority::Medium),
        (60, Priority::High),
        (89, Priority::High),
        (90, Priority::Urgent),
        (250, Priority::Urgent),
    ];
    for (score, expected) in cases {
        assert_eq!(Priority::from_score(score, &thresholds), expected, "score {score}");
    }
}

#[test]
fn contact_without_phone_scores_zero() {
    let contact = Contact::new("c1", "Ada", "ada@example.com", 0);
    let (analyzer, _) = analyzer(vec![contact]);
    let analysis = analyzer.analyze("c1", NOW).expect("analyze");
    assert_eq!(analysis.priority, Priority::None);
    assert_eq!(analysis.score, 0);
    assert!(analysis.reasons.is_empty());
    assert_eq!(analysis.recommendation, "No phone number on file");
}

#[test]
fn quiet_reachable_contact_has_no_reasons() {
    let (analyzer, _) = analyzer(vec![reachable("c1")]);
    let analysis = analyzer.analyze("c1", NOW).expect("analyze");
    assert_eq!(analysis.priority, Priority::None);
    assert!(analysis.reasons.is_empty());
}

#[test]
fn reasons_sum_and_sort_by_contribution() {
    let mut contact = reachable("c1").with_stage(Stage::Prospect, 0);
    contact.push_interaction(Interaction::new(InteractionKind::EmailReplied, NOW - DAY_MS));
    let (analyzer, _) = analyzer(vec![contact]);

    let analysis = analyzer.analyze("c1", NOW).expect("analyze");
    assert_eq!(analysis.score, 80 + 75);
    assert_eq!(analysis.priority, Priority::Urgent);
    let codes: Vec<ReasonCode> = analysis.reasons.iter().map(|reason| reason.code).collect();
    assert_eq!(codes, vec![ReasonCode::HotLead, ReasonCode::EmailReplied]);
    assert_eq!(analysis.reasons[1].days_since, Some(1));
    assert!(analysis.recommendation.starts_with("Call now"));
}

#[test]
fn unknown_contact_is_not_found() {
    let (analyzer, _) = analyzer(Vec::new());
    let err = analyzer.analyze("ghost", NOW).expect_err("missing contact");
    assert_eq!(err.code(), "not_found");
}

#[test]
fn rank_with_high_floor_drops_medium_and_low() {
    let weights = BTreeMap::from([(ReasonCode::Reactivation, 20)]);
    let mut customer = reachable("b-customer").with_stage(Stage::Customer, 0);
    customer.push_interaction(Interaction::new(InteractionKind::Note, NOW - 70 * DAY_MS));
    let contacts = vec![urgent_ticket("a-urgent"), customer, lost_deal("c-lost")];
    let (analyzer, _) = analyzer_with(contacts.clone(), &weights);

    let everything = analyzer.rank(&contacts, Priority::Low, 10, NOW);
    let buckets: Vec<Priority> = everything.iter().map(|analysis| analysis.priority).collect();
    assert_eq!(buckets, vec![Priority::Urgent, Priority::Medium, Priority::Low]);

    let high = analyzer.rank(&contacts, Priority::High, 10, NOW);
    assert_eq!(high.len(), 1);
    assert!(high.iter().all(|analysis| analysis.priority >= Priority::High));
}

#[test]
fn rank_breaks_score_ties_by_contact_id_and_truncates() {
    let contacts = vec![urgent_ticket("z"), urgent_ticket("m"), urgent_ticket("a")];
    let (analyzer, _) = analyzer(contacts.clone());
    let ranked = analyzer.rank(&contacts, Priority::Low, 2, NOW);
    let ids: Vec<&str> = ranked.iter().map(|analysis| analysis.contact_id.as_str()).collect();
    assert_eq!(ids, vec!["a", "m"]);
}

#[test]
fn rank_candidates_skips_opted_out_and_unreachable() {
    let mut opted_out = urgent_ticket("b");
    opted_out.opted_out = true;
    let mut no_phone = urgent_ticket("c");
    no_phone.phone = None;
    let (analyzer, _) = analyzer(vec![urgent_ticket("a"), opted_out, no_phone]);

    let ranked = analyzer
        .rank_candidates(Priority::None, 10, NOW)
        .expect("rank candidates");
    let ids: Vec<&str> = ranked.iter().map(|analysis| analysis.contact_id.as_str()).collect();
    assert_eq!(ids, vec!["a"]);
}

#[test]
fn feedback_changes_the_next_analysis() {
    let mut contact = reachable("c1").with_stage(Stage::Contacted, 0);
    contact.push_interaction(Interaction::new(InteractionKind::InboundCall, NOW - 3 * DAY_MS));
    let (analyzer, _) = analyzer(vec![contact]);
    assert_eq!(analyzer.analyze("c1", NOW).expect("before").score, 80);

    let record = analyzer
        .record_feedback("c1", ReasonCode::HotLead, CallOutcome::Successful, NOW)
        .expect("feedback");
    assert_eq!(record.weight_after, 82);
    assert_eq!(analyzer.analyze("c1", NOW).expect("after").score, 82);
}

#[test]
fn feedback_logs_the_call_on_the_contact() {
    let (analyzer, store) = analyzer(vec![urgent_ticket("c1")]);
    analyzer
        .record_feedback("c1", ReasonCode::TicketUrgent, CallOutcome::NoAnswer, NOW)
        .expect("feedback");

    let contact = store.get("c1").expect("get").expect("contact");
    let last = contact.last_interaction().expect("call logged");
    assert_eq!(last.kind, InteractionKind::CallPlaced);
    assert_eq!(last.note.as_deref(), Some("ticket_urgent: no_answer"));
    assert!(analyzer.analyze("c1", NOW).expect("analyze").reasons.is_empty());
}

#[test]
fn feedback_for_unknown_contact_leaves_weights_alone() {
    let (analyzer, _) = analyzer(Vec::new());
    let err = analyzer
        .record_feedback("ghost", ReasonCode::HotLead, CallOutcome::Successful, NOW)
        .expect_err("unknown contact");
    assert_eq!(err.code(), "not_found");
    assert_eq!(analyzer.weights().weight(ReasonCode::HotLead), 80);
}

#[test]
fn codes_and_priorities_parse_from_cli_text() {
    assert_eq!("hot-lead".parse::<ReasonCode>(), Ok(ReasonCode::HotLead));
    assert_eq!("High".parse::<Priority>(), Ok(Priority::High));
    assert!("lukewarm".parse::<Priority>().is_err());
}

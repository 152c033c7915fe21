//! End-to-end lifecycle scenarios across several events.

use chronicle_core::narrative::{
    CharacterRegistry, CharacterRole, CharacterStatus, EventChain, LifecycleKind, PatternDetector,
};
use chronicle_core::testing::{assert_alive, assert_dead, assert_died_in, assert_violations};
use chronicle_core::TestHarness;

#[test]
fn test_assassination_mourning_and_resurrection() {
    let mut registry = CharacterRegistry::new();
    registry.add_character("King Alaric", CharacterRole::Main, 1);
    let mut chain = EventChain::new();
    let detector = PatternDetector::new();

    chain.add_event(2, "King Alaric was assassinated by a hidden blade.");
    let changes = chain.analyze_event_and_update(2, &mut registry, &detector);
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].kind, LifecycleKind::Death);

    let alaric = registry.get_character("King Alaric").unwrap();
    assert_eq!(alaric.status, CharacterStatus::Dead);
    assert_eq!(alaric.death_event, Some(2));

    chain.add_event(3, "Queen Lyra mourned King Alaric's passing.");
    let changes = chain.analyze_event_and_update(3, &mut registry, &detector);
    assert!(changes.is_empty());

    let usage = registry.validate_character_usage("Queen Lyra mourned King Alaric's passing.");
    assert!(!usage.is_valid);
    assert_eq!(usage.violations, vec!["King Alaric (died in Event 2)"]);

    chain.add_event(4, "Through an ancient ritual, King Alaric was resurrected.");
    let changes = chain.analyze_event_and_update(4, &mut registry, &detector);
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].kind, LifecycleKind::Revival);

    let alaric = registry.get_character("King Alaric").unwrap();
    assert_eq!(alaric.status, CharacterStatus::Alive);
    assert_eq!(alaric.revival_event, Some(4));
    assert_eq!(alaric.death_event, Some(2));

    let usage = registry.validate_character_usage("King Alaric returned to the throne room.");
    assert!(usage.is_valid);
    assert!(usage.violations.is_empty());

    assert_eq!(chain.len(), 3);
    assert!(chain
        .get_event(4)
        .unwrap()
        .affected_characters
        .contains(&"King Alaric".to_string()));
}

#[test]
fn test_fond_memory_does_not_revive() {
    let mut registry = CharacterRegistry::new();
    registry.add_character("King Alaric", CharacterRole::Main, 1);
    registry.add_character("Queen Lyra", CharacterRole::Main, 1);
    registry.set_current_event(2);
    assert!(registry.kill_character("King Alaric", "assassinated"));

    let mut chain = EventChain::new();
    chain.add_event(3, "Queen Lyra thinks fondly of King Alaric.");
    let changes = chain.analyze_event_and_update(3, &mut registry, &PatternDetector::new());

    assert!(changes.is_empty());
    assert!(!registry.is_character_alive("King Alaric"));
}

#[test]
fn test_session_flags_dead_reference_in_later_event() {
    let mut harness = TestHarness::new();

    let opening = harness.event("King Alaric and Queen Lyra ruled the realm together.");
    assert_eq!(opening.introduced.len(), 2);
    assert!(opening.is_valid());

    let murder = harness.event("King Alaric was assassinated by a hidden blade.");
    assert!(murder.is_valid());
    assert_dead(&harness, "King Alaric");
    assert_died_in(&harness, "King Alaric", 2);

    let mourning = harness.event("Queen Lyra mourned King Alaric's passing.");
    assert_violations(&mourning, &["King Alaric (died in Event 2)"]);
    assert!(mourning.changes.is_empty());

    let ritual = harness.event("Through an ancient ritual, King Alaric was resurrected.");
    assert_eq!(ritual.changes.len(), 1);
    assert!(ritual.is_valid());
    assert_alive(&harness, "King Alaric");
    assert_alive(&harness, "Queen Lyra");
}

#[test]
fn test_repeated_death_and_revival_cycles() {
    let mut harness = TestHarness::new().with_character("Sir Gareth", CharacterRole::Supporting);

    harness.event("Sir Gareth stood watch over the pass.");
    harness.event("Sir Gareth was slain by raiders at dawn.");
    harness.event("By divine intervention, Sir Gareth was revived.");
    harness.event("Sir Gareth was killed by a falling tower.");

    assert_dead(&harness, "Gareth");
    assert_died_in(&harness, "Gareth", 4);

    let gareth = harness.session.registry().get_character("Sir Gareth").unwrap();
    assert_eq!(gareth.death_count(), 2);
    assert_eq!(gareth.revival_event, Some(3));
    assert!(gareth
        .notable_actions
        .iter()
        .any(|a| a.starts_with("Revived:") && a.ends_with("(Event 3)")));
}

#[test]
fn test_threads_stay_capped_over_many_events() {
    let config = chronicle_core::SessionConfig::new("Border wars").with_max_open_threads(2);
    let mut harness = TestHarness::with_config(config);

    for i in 0..6 {
        harness.event(&format!(
            "Riders crossed the river at night, but raid number {i} left the border towns burning."
        ));
    }

    let chain = harness.session.chain();
    assert_eq!(chain.len(), 6);
    assert_eq!(
        chain.open_threads(),
        &[
            "raid number 4 left the border towns burning",
            "raid number 5 left the border towns burning"
        ]
    );
}

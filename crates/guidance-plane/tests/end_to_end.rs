use guidance_plane::config::GuidanceConfig;
use guidance_plane::orchestrator::{Orchestrator, StateDir};
use guidance_plane::retriever::RetrievalRequest;
use guidance_plane::types::{GateDecision, RunEvent, RunOutcome, TaskIntent};
use std::collections::BTreeMap;

const RULES_DOC: &str = r#"# Safety Invariants

[SEC001] Never commit secrets or API keys to the repository @security #secrets priority:50

# General Guidance

[R010] Write tests for new behavior before merging @testing #quality priority:5 (medium)
"#;

fn new_event(id: &str, intent: TaskIntent) -> RunEvent {
    RunEvent {
        schema_version: 1,
        id: id.to_string(),
        task_intent: intent,
        prompt_digest: "digest".to_string(),
        guidance_hash: "hash".to_string(),
        retrieved_rule_ids: vec![],
        tools_used: vec![],
        files_modified: vec![],
        diff_summary: Default::default(),
        tests_passed: None,
        violations: vec![],
        started_at: 0,
        finalized_at: None,
        outcome: None,
        extra: BTreeMap::new(),
    }
}

#[test]
fn compile_retrieve_gate_ledger_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let rules_path = dir.path().join("GUIDANCE.md");
    std::fs::write(&rules_path, RULES_DOC).unwrap();
    let state_dir = StateDir::new(dir.path().join(".guidance"));
    std::fs::create_dir_all(&state_dir.root).unwrap();

    let mut orchestrator = Orchestrator::bootstrap(
        &rules_path,
        None,
        GuidanceConfig::default(),
        state_dir,
        1_000,
    )
    .unwrap();

    assert!(orchestrator.bundle.warnings.is_empty());
    assert_eq!(orchestrator.bundle.constitution.rules.len(), 1);
    assert_eq!(orchestrator.bundle.shards.len(), 1);

    let retrieval = orchestrator.retrieve(&RetrievalRequest {
        task_description: "write tests for the new parser".to_string(),
        ..Default::default()
    });
    assert_eq!(retrieval.detected_intent, TaskIntent::Testing);
    assert!(!retrieval.selected_shards.is_empty());

    let gate_result = orchestrator.gate_command("rm -rf /var/data");
    assert_eq!(gate_result.decision, GateDecision::RequireConfirmation);

    let secret_gate = orchestrator.gate_tool_use("http.post", r#"{"apiKey": "sk-abcdefghijklmnopqrstuvwxyz"}"#);
    assert_eq!(secret_gate.decision, GateDecision::Block);

    let mut event = orchestrator.create_event(new_event("run-1", TaskIntent::Testing));
    event.tests_passed = Some(true);
    let finalized = orchestrator
        .finalize_event(event, 2_000, RunOutcome::Success)
        .unwrap();
    assert!(finalized.is_finalized());
    assert_eq!(orchestrator.ledger.events().len(), 1);
}

#[test]
fn reopening_orchestrator_preserves_persisted_ledger_state() {
    let dir = tempfile::tempdir().unwrap();
    let rules_path = dir.path().join("GUIDANCE.md");
    std::fs::write(&rules_path, RULES_DOC).unwrap();
    let guidance_dir = dir.path().join(".guidance");

    {
        let mut orchestrator = Orchestrator::bootstrap(
            &rules_path,
            None,
            GuidanceConfig::default(),
            StateDir::new(&guidance_dir),
            0,
        )
        .unwrap();
        let event = orchestrator.create_event(new_event("run-1", TaskIntent::BugFix));
        orchestrator.finalize_event(event, 1, RunOutcome::Success).unwrap();
    }

    let orchestrator = Orchestrator::bootstrap(
        &rules_path,
        None,
        GuidanceConfig::default(),
        StateDir::new(&guidance_dir),
        10,
    )
    .unwrap();
    assert_eq!(orchestrator.ledger.events().len(), 1);
    assert_eq!(orchestrator.ledger.events()[0].id, "run-1");
}

#[test]
fn missing_rules_document_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("does-not-exist.md");
    let err = Orchestrator::bootstrap(
        &missing,
        None,
        GuidanceConfig::default(),
        StateDir::new(dir.path().join(".guidance")),
        0,
    )
    .unwrap_err();
    assert_eq!(err.code(), "config.document_missing");
}

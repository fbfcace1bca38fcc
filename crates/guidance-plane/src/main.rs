use guidance_plane::config::GuidanceConfig;
use guidance_plane::orchestrator::{Orchestrator, StateDir};
use guidance_plane::retriever::RetrievalRequest;
use guidance_plane::types::{GateDecision, RunEvent, Violation};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

mod cli;

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn load_config(explicit: Option<&str>, rules_doc: &Path) -> GuidanceConfig {
    let path = match explicit {
        Some(p) => PathBuf::from(p),
        None => rules_doc
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join("guidance.toml"),
    };
    match GuidanceConfig::load(&path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("guidance-plane: {e}");
            std::process::exit(2);
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(e) => {
            eprintln!("guidance-plane: failed to serialize output: {e}");
            std::process::exit(1);
        }
    }
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(String::as_str);

    match command {
        Some("version") | Some("--version") | Some("-V") => {
            println!("{}", env!("CARGO_PKG_VERSION"));
        }
        Some("help") | Some("--help") | Some("-h") | None => {
            cli::print_help();
        }
        Some("compile") => {
            let parsed = match cli::parse_compile_cli(&args[2..]) {
                Ok(v) => v,
                Err(e) => {
                    eprintln!("guidance-plane: {e}");
                    std::process::exit(2);
                }
            };
            let rules_doc = PathBuf::from(&parsed.rules_doc);
            let overlay = parsed.overlay.as_ref().map(PathBuf::from);
            let config = load_config(parsed.config.as_deref(), &rules_doc);
            let state_dir = StateDir::new(PathBuf::from(&parsed.state_dir));
            std::fs::create_dir_all(&state_dir.root).ok();
            match Orchestrator::bootstrap(&rules_doc, overlay.as_deref(), config, state_dir, now_millis()) {
                Ok(orchestrator) => {
                    print_json(&orchestrator.bundle);
                    if !orchestrator.bundle.warnings.is_empty() {
                        std::process::exit(1);
                    }
                }
                Err(e) => {
                    eprintln!("guidance-plane: {e} ({})", e.code());
                    std::process::exit(1);
                }
            }
        }
        Some("retrieve") => {
            let parsed = match cli::parse_retrieve_cli(&args[2..]) {
                Ok(v) => v,
                Err(e) => {
                    eprintln!("guidance-plane: {e}");
                    std::process::exit(2);
                }
            };
            let rules_doc = PathBuf::from(&parsed.rules_doc);
            let config = load_config(parsed.config.as_deref(), &rules_doc);
            let state_dir = StateDir::new(PathBuf::from(&parsed.state_dir));
            std::fs::create_dir_all(&state_dir.root).ok();
            match Orchestrator::bootstrap(&rules_doc, None, config, state_dir, now_millis()) {
                Ok(orchestrator) => {
                    let request = RetrievalRequest {
                        task_description: parsed.task,
                        repo_path: parsed.repo_path,
                        top_k: parsed.top_k,
                        ..Default::default()
                    };
                    let result = orchestrator.retrieve(&request);
                    print_json(&result);
                }
                Err(e) => {
                    eprintln!("guidance-plane: {e} ({})", e.code());
                    std::process::exit(1);
                }
            }
        }
        Some("gate") => {
            let sub = args.get(2).map(String::as_str);
            let rules_doc_hint = PathBuf::from("GUIDANCE.md");
            let config = load_config(None, &rules_doc_hint);
            let gate_config = match guidance_plane::gates::GateConfig::compile(&config) {
                Ok(c) => c,
                Err(e) => {
                    eprintln!("guidance-plane: {e}");
                    std::process::exit(2);
                }
            };
            let result = match sub {
                Some("command") => {
                    let Some(cmd) = args.get(3) else {
                        eprintln!("guidance-plane: missing <cmd-string>");
                        std::process::exit(2);
                    };
                    guidance_plane::gates::aggregate(&guidance_plane::gates::evaluate_command(cmd, &gate_config))
                }
                Some("tool") => {
                    let (Some(tool_name), Some(params)) = (args.get(3), args.get(4)) else {
                        eprintln!("guidance-plane: usage: gate tool <tool-name> <params-json>");
                        std::process::exit(2);
                    };
                    guidance_plane::gates::aggregate(&guidance_plane::gates::evaluate_tool_use(
                        tool_name,
                        params,
                        &gate_config,
                    ))
                }
                Some("edit") => {
                    let (Some(path), Some(diff_lines)) = (args.get(3), args.get(4)) else {
                        eprintln!("guidance-plane: usage: gate edit <path> <diff-lines>");
                        std::process::exit(2);
                    };
                    let diff_lines: u64 = diff_lines.parse().unwrap_or_else(|_| {
                        eprintln!("guidance-plane: invalid diff-lines value `{diff_lines}`");
                        std::process::exit(2);
                    });
                    guidance_plane::gates::aggregate(&guidance_plane::gates::evaluate_edit(
                        path, "", diff_lines, &gate_config,
                    ))
                }
                _ => {
                    eprintln!("guidance-plane: usage: gate command|tool|edit ...");
                    std::process::exit(2);
                }
            };
            print_json(&result);
            if result.decision == GateDecision::Block {
                std::process::exit(1);
            }
        }
        Some("ledger") => {
            let parsed = match cli::parse_ledger_cli(&args[2..]) {
                Ok(v) => v,
                Err(e) => {
                    eprintln!("guidance-plane: {e}");
                    std::process::exit(2);
                }
            };
            let rules_doc = PathBuf::from(&parsed.rules_doc);
            let config = load_config(parsed.config.as_deref(), &rules_doc);
            let state_dir = StateDir::new(PathBuf::from(&parsed.state_dir));
            std::fs::create_dir_all(&state_dir.root).ok();
            match Orchestrator::bootstrap(&rules_doc, None, config, state_dir, now_millis()) {
                Ok(mut orchestrator) => {
                    let mut event = orchestrator.create_event(RunEvent {
                        schema_version: 1,
                        id: parsed.event_id,
                        task_intent: parsed.task_intent,
                        prompt_digest: parsed.prompt_digest,
                        guidance_hash: parsed.guidance_hash,
                        retrieved_rule_ids: Vec::new(),
                        tools_used: Vec::new(),
                        files_modified: Vec::new(),
                        diff_summary: Default::default(),
                        tests_passed: parsed.tests_passed,
                        violations: Vec::new(),
                        started_at: now_millis(),
                        finalized_at: None,
                        outcome: None,
                        extra: BTreeMap::new(),
                    });
                    if let Some(diff) = parsed.diff {
                        if let Err(e) = orchestrator.accumulate_diff(
                            &mut event,
                            diff.lines_added,
                            diff.lines_removed,
                            diff.files_changed,
                            diff.rework_lines,
                        ) {
                            eprintln!("guidance-plane: {e} ({})", e.code());
                            std::process::exit(1);
                        }
                    }
                    for v in parsed.violations {
                        let violation = Violation {
                            rule_id: v.rule_id,
                            gate_name: v.gate_name,
                            detail: String::new(),
                            severity: v.severity,
                            occurred_at: now_millis(),
                            cost: v.cost,
                        };
                        if let Err(e) = orchestrator.record_violation(&mut event, violation) {
                            eprintln!("guidance-plane: {e} ({})", e.code());
                            std::process::exit(1);
                        }
                    }
                    let finalized_at = parsed.finalized_at.unwrap_or_else(now_millis);
                    match orchestrator.finalize_event(event, finalized_at, parsed.outcome) {
                        Ok(frozen) => print_json(&frozen),
                        Err(e) => {
                            eprintln!("guidance-plane: {e} ({})", e.code());
                            std::process::exit(1);
                        }
                    }
                }
                Err(e) => {
                    eprintln!("guidance-plane: {e} ({})", e.code());
                    std::process::exit(1);
                }
            }
        }
        Some("optimize") => {
            let rules_doc = args.get(2).cloned().unwrap_or_default();
            if rules_doc.is_empty() {
                eprintln!("guidance-plane: missing <rules-doc> argument");
                std::process::exit(2);
            }
            let rules_doc = PathBuf::from(rules_doc);
            let config = load_config(None, &rules_doc);
            let state_dir = StateDir::new(".guidance");
            std::fs::create_dir_all(&state_dir.root).ok();
            match Orchestrator::bootstrap(&rules_doc, None, config, state_dir, now_millis()) {
                Ok(mut orchestrator) => match orchestrator.run_cycle(None, 30_000, now_millis()) {
                    Ok(outcome) => print_json(&outcome.adrs),
                    Err(e) => {
                        eprintln!("guidance-plane: {e} ({})", e.code());
                        std::process::exit(1);
                    }
                },
                Err(e) => {
                    eprintln!("guidance-plane: {e} ({})", e.code());
                    std::process::exit(1);
                }
            }
        }
        Some(other) => {
            eprintln!("guidance-plane: unknown command `{other}`; use compile|retrieve|gate|ledger|optimize");
            std::process::exit(2);
        }
    }
}

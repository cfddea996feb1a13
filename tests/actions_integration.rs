//! Action integration tests
//!
//! End-to-end tests running actions through `LspManager` against scripted
//! in-memory language servers. Covers rename preview and apply, code action
//! selection, organize imports filtering, null results, definition shapes,
//! completion truncation, and session recovery after a server dies.

mod common;

use a3s_lsp::{run_action, Action, ActionRequest, CursorPosition};
use common::{manager_with, range, text_edit, FakeLauncher, GoWorkspace};
use serde_json::{json, Value};
use std::sync::Arc;

const MAIN_GO: &str = "package main\n\nfunc foo() {}\n\nfunc main() { foo() }\n";
const UTIL_GO: &str = "package main\n\nfunc useFoo() { foo() }\n";

fn at(line: u32, character: u32) -> CursorPosition {
    CursorPosition::new(line, character).unwrap()
}

async fn run(
    manager: &a3s_lsp::LspManager,
    file: std::path::PathBuf,
    action: Action,
) -> Value {
    let result = run_action(manager, ActionRequest { file, action }).await;
    serde_json::to_value(&result).unwrap()
}

fn rename_launcher(ws: &GoWorkspace) -> FakeLauncher {
    let main_uri = ws.uri("main.go");
    let util_uri = ws.uri("util.go");
    FakeLauncher::new(move |method, params| match method {
        "textDocument/rename" => {
            let new_name = params["newName"].as_str().unwrap_or_default();
            json!({
                "changes": {
                    main_uri.clone(): [
                        text_edit(2, 5, 8, new_name),
                        text_edit(4, 14, 17, new_name)
                    ],
                    util_uri.clone(): [text_edit(2, 16, 19, new_name)]
                }
            })
        }
        _ => Value::Null,
    })
}

// ─── Rename ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_rename_preview_leaves_files_untouched() {
    let ws = GoWorkspace::new(&[("main.go", MAIN_GO), ("util.go", UTIL_GO)]);
    let launcher = Arc::new(rename_launcher(&ws));
    let manager = manager_with(launcher.clone());

    let result = run(
        &manager,
        ws.path("main.go"),
        Action::Rename {
            at: at(3, 5),
            new_name: "bar".to_string(),
            apply_edits: false,
        },
    )
    .await;

    assert_eq!(result["action"], "rename");
    assert_eq!(result["new_name"], "bar");
    assert_eq!(result["files"].as_array().unwrap().len(), 2);
    assert_eq!(result["edits"].as_array().unwrap().len(), 3);
    assert_eq!(result["edits"][0]["line"], 3);
    assert!(result.get("applied").is_none());
    assert!(result.get("error").is_none());

    assert_eq!(ws.read("main.go"), MAIN_GO);
    assert_eq!(ws.read("util.go"), UTIL_GO);
}

#[tokio::test]
async fn test_rename_apply_writes_every_file() {
    let ws = GoWorkspace::new(&[("main.go", MAIN_GO), ("util.go", UTIL_GO)]);
    let launcher = Arc::new(rename_launcher(&ws));
    let manager = manager_with(launcher.clone());

    let result = run(
        &manager,
        ws.path("main.go"),
        Action::Rename {
            at: at(3, 5),
            new_name: "bar".to_string(),
            apply_edits: true,
        },
    )
    .await;

    assert_eq!(result["applied"]["success"], true);
    assert_eq!(result["applied"]["applied"].as_array().unwrap().len(), 2);
    assert_eq!(
        ws.read("main.go"),
        "package main\n\nfunc bar() {}\n\nfunc main() { bar() }\n"
    );
    assert_eq!(ws.read("util.go"), "package main\n\nfunc useFoo() { bar() }\n");
}

#[tokio::test]
async fn test_rename_null_is_informational() {
    let ws = GoWorkspace::new(&[("main.go", MAIN_GO)]);
    let manager = manager_with(Arc::new(FakeLauncher::new(|_, _| Value::Null)));

    let result = run(
        &manager,
        ws.path("main.go"),
        Action::Rename {
            at: at(1, 0),
            new_name: "bar".to_string(),
            apply_edits: true,
        },
    )
    .await;

    assert!(result["message"].as_str().unwrap().contains("not possible"));
    assert!(result.get("error").is_none());
    assert_eq!(ws.read("main.go"), MAIN_GO);
}

// ─── Code Actions ───────────────────────────────────────────────

fn code_action_launcher(ws: &GoWorkspace) -> FakeLauncher {
    let uri = ws.uri("main.go");
    FakeLauncher::new(move |method, _| match method {
        "textDocument/codeAction" => json!([
            {
                "title": "Add missing return",
                "kind": "quickfix",
                "edit": {"changes": {uri.clone(): [text_edit(0, 0, 0, "// quickfix\n")]}}
            },
            {
                "title": "Organize imports",
                "kind": "source.organizeImports",
                "edit": {"changes": {uri.clone(): [text_edit(0, 0, 0, "// organized\n")]}}
            },
            {
                "title": "Extract function",
                "kind": "refactor.extract",
                "isPreferred": true,
                "edit": {"changes": {uri.clone(): [text_edit(0, 0, 0, "// extracted\n")]}}
            },
            {"title": "Run tests", "command": "gopls.run_tests", "arguments": []}
        ]),
        _ => Value::Null,
    })
}

#[tokio::test]
async fn test_organize_imports_applies_only_matching_kind() {
    let ws = GoWorkspace::new(&[("main.go", MAIN_GO)]);
    let launcher = Arc::new(code_action_launcher(&ws));
    let manager = manager_with(launcher.clone());

    let result = run(
        &manager,
        ws.path("main.go"),
        Action::OrganizeImports { apply_edits: true },
    )
    .await;

    assert_eq!(result["action"], "organize_imports");
    // quickfix and refactor are filtered out; the bare command has no kind and stays
    assert_eq!(result["count"], 2);
    assert_eq!(result["actions"][0]["title"], "Organize imports");
    assert_eq!(result["commands"], json!(["gopls.run_tests"]));
    assert_eq!(result["applied"]["success"], true);

    let content = ws.read("main.go");
    assert!(content.starts_with("// organized\n"));
    assert!(!content.contains("quickfix"));
    assert!(!content.contains("extracted"));

    // the request asked for the organize-imports kind over the whole file
    let received = launcher.received.lock().unwrap().clone();
    let (_, params) = received
        .iter()
        .find(|(method, _)| method == "textDocument/codeAction")
        .unwrap();
    assert_eq!(params["context"]["only"], json!(["source.organizeImports"]));
    assert_eq!(params["range"]["start"], json!({"line": 0, "character": 0}));
    assert_eq!(params["range"]["end"], json!({"line": 5, "character": 0}));
}

#[tokio::test]
async fn test_organize_imports_failure_rolls_back_every_edit() {
    let ws = GoWorkspace::new(&[("main.go", MAIN_GO), ("util.go", UTIL_GO)]);
    let main_uri = ws.uri("main.go");
    let util_uri = ws.uri("util.go");
    let manager = manager_with(Arc::new(FakeLauncher::new(move |method, _| match method {
        "textDocument/codeAction" => json!([
            {
                "title": "Organize imports",
                "kind": "source.organizeImports",
                "edit": {"changes": {main_uri.clone(): [text_edit(0, 0, 0, "// organized\n")]}}
            },
            {
                "title": "Organize imports (util)",
                "kind": "source.organizeImports",
                "edit": {"changes": {util_uri.clone(): [
                    text_edit(2, 0, 6, "a"),
                    text_edit(2, 3, 9, "b")
                ]}}
            }
        ]),
        _ => Value::Null,
    })));

    let result = run(
        &manager,
        ws.path("main.go"),
        Action::OrganizeImports { apply_edits: true },
    )
    .await;

    assert_eq!(result["count"], 2);
    assert_eq!(result["applied"]["success"], false);
    assert_eq!(result["applied"]["applied"], json!([]));
    assert!(!result["applied"]["errors"].as_array().unwrap().is_empty());
    assert_eq!(ws.read("main.go"), MAIN_GO);
    assert_eq!(ws.read("util.go"), UTIL_GO);
}

#[tokio::test]
async fn test_code_action_applies_preferred() {
    let ws = GoWorkspace::new(&[("main.go", MAIN_GO)]);
    let manager = manager_with(Arc::new(code_action_launcher(&ws)));

    let result = run(
        &manager,
        ws.path("main.go"),
        Action::CodeAction {
            range: Some("3:0-3:13".parse().unwrap()),
            only: vec![],
            apply_edits: true,
        },
    )
    .await;

    assert_eq!(result["count"], 4);
    assert_eq!(result["actions"][3]["has_edit"], false);
    assert_eq!(result["applied"]["success"], true);
    assert!(ws.read("main.go").starts_with("// extracted\n"));
}

#[tokio::test]
async fn test_code_action_preview_lists_without_applying() {
    let ws = GoWorkspace::new(&[("main.go", MAIN_GO)]);
    let manager = manager_with(Arc::new(code_action_launcher(&ws)));

    let result = run(
        &manager,
        ws.path("main.go"),
        Action::CodeAction {
            range: None,
            only: vec!["quickfix".to_string()],
            apply_edits: false,
        },
    )
    .await;

    assert_eq!(result["actions"][0]["kind"], "quickfix");
    assert!(result.get("applied").is_none());
    assert_eq!(ws.read("main.go"), MAIN_GO);
}

// ─── Queries ────────────────────────────────────────────────────

#[tokio::test]
async fn test_hover_null_has_null_contents() {
    let ws = GoWorkspace::new(&[("main.go", MAIN_GO)]);
    let manager = manager_with(Arc::new(FakeLauncher::new(|_, _| Value::Null)));

    let result = run(&manager, ws.path("main.go"), Action::Hover { at: at(1, 0) }).await;
    assert!(result["contents"].is_null());
    assert!(result["message"].is_string());
    assert!(result.get("error").is_none());
}

#[tokio::test]
async fn test_hover_markup() {
    let ws = GoWorkspace::new(&[("main.go", MAIN_GO)]);
    let manager = manager_with(Arc::new(FakeLauncher::new(|_, _| {
        json!({"contents": {"kind": "markdown", "value": "func foo()"}})
    })));

    let result = run(&manager, ws.path("main.go"), Action::Hover { at: at(3, 6) }).await;
    assert_eq!(result["contents"], "func foo()");
}

#[tokio::test]
async fn test_definition_shapes() {
    let ws = GoWorkspace::new(&[("main.go", MAIN_GO)]);
    let uri = ws.uri("main.go");
    let manager = manager_with(Arc::new(FakeLauncher::new(move |_, params| {
        let location = json!({"uri": uri.clone(), "range": range(2, 5, 8)});
        match params["position"]["line"].as_u64() {
            Some(1) => json!(location),
            Some(2) => json!([location.clone(), location]),
            Some(3) => json!([{
                "targetUri": uri.clone(),
                "targetRange": range(2, 0, 13),
                "targetSelectionRange": range(2, 5, 8)
            }]),
            _ => Value::Null,
        }
    })));
    let file = ws.path("main.go");

    let none = run(&manager, file.clone(), Action::Definition { at: at(1, 0) }).await;
    assert_eq!(none["definition"]["kind"], "none");

    let single = run(&manager, file.clone(), Action::Definition { at: at(2, 0) }).await;
    assert_eq!(single["definition"]["kind"], "single");
    assert_eq!(single["definition"]["location"]["line"], 3);
    assert_eq!(single["definition"]["location"]["character"], 5);

    let multiple = run(&manager, file.clone(), Action::Definition { at: at(3, 0) }).await;
    assert_eq!(multiple["definition"]["kind"], "multiple");
    assert_eq!(multiple["definition"]["locations"].as_array().unwrap().len(), 2);

    let links = run(&manager, file, Action::Definition { at: at(4, 0) }).await;
    assert_eq!(links["definition"]["kind"], "links");
    assert_eq!(links["definition"]["locations"][0]["character"], 5);
}

#[tokio::test]
async fn test_references_count() {
    let ws = GoWorkspace::new(&[("main.go", MAIN_GO)]);
    let uri = ws.uri("main.go");
    let manager = manager_with(Arc::new(FakeLauncher::new(move |method, params| {
        assert_eq!(method, "textDocument/references");
        assert_eq!(params["context"]["includeDeclaration"], true);
        json!([
            {"uri": uri.clone(), "range": range(2, 5, 8)},
            {"uri": uri.clone(), "range": range(4, 14, 17)}
        ])
    })));

    let result = run(&manager, ws.path("main.go"), Action::References { at: at(3, 5) }).await;
    assert_eq!(result["count"], 2);
    assert_eq!(result["references"][1]["line"], 5);
}

#[tokio::test]
async fn test_completion_is_truncated() {
    let ws = GoWorkspace::new(&[("main.go", MAIN_GO)]);
    let manager = manager_with(Arc::new(FakeLauncher::new(|_, _| {
        let items: Vec<Value> = (0..60).map(|i| json!({"label": format!("item{}", i)})).collect();
        json!({"isIncomplete": true, "items": items})
    })));

    let result = run(&manager, ws.path("main.go"), Action::Completion { at: at(5, 14) }).await;
    assert_eq!(result["total"], 60);
    assert_eq!(result["is_incomplete"], true);
    assert_eq!(result["items"].as_array().unwrap().len(), 50);
    assert_eq!(result["items"][0]["label"], "item0");
}

#[tokio::test]
async fn test_document_opened_before_each_request() {
    let ws = GoWorkspace::new(&[("main.go", MAIN_GO)]);
    let launcher = Arc::new(FakeLauncher::new(|_, _| Value::Null));
    let manager = manager_with(launcher.clone());

    run(&manager, ws.path("main.go"), Action::Hover { at: at(1, 0) }).await;
    run(&manager, ws.path("main.go"), Action::Symbols).await;

    assert_eq!(
        launcher.methods(),
        vec![
            "initialize",
            "initialized",
            "textDocument/didOpen",
            "textDocument/hover",
            "textDocument/didOpen",
            "textDocument/documentSymbol",
        ]
    );

    let received = launcher.received.lock().unwrap().clone();
    assert_eq!(received[2].1["textDocument"]["text"], MAIN_GO);
    assert_eq!(received[2].1["textDocument"]["languageId"], "go");
    assert_eq!(received[0].1["rootUri"], json!(a3s_lsp::protocol::path_to_uri(&ws.root).unwrap()));
}

// ─── Session Lifecycle ──────────────────────────────────────────

#[tokio::test]
async fn test_dead_server_is_evicted_and_restarted() {
    let ws = GoWorkspace::new(&[("main.go", MAIN_GO)]);
    let launcher = Arc::new(FakeLauncher::new(|_, _| Value::Null).dying_on("textDocument/hover"));
    let manager = manager_with(launcher.clone());

    let result = run(&manager, ws.path("main.go"), Action::Hover { at: at(1, 0) }).await;
    assert!(result["error"].is_string());
    assert!(manager.list_running().await.is_empty());

    let result = run(&manager, ws.path("main.go"), Action::Definition { at: at(1, 0) }).await;
    assert_eq!(result["definition"]["kind"], "none");
    assert_eq!(launcher.launches(), 2);
    assert_eq!(
        manager.list_running().await,
        vec![("go".to_string(), ws.root.clone())]
    );
}

#[tokio::test]
async fn test_sessions_are_shared_across_actions() {
    let ws = GoWorkspace::new(&[("main.go", MAIN_GO), ("util.go", UTIL_GO)]);
    let launcher = Arc::new(FakeLauncher::new(|_, _| Value::Null));
    let manager = manager_with(launcher.clone());

    run(&manager, ws.path("main.go"), Action::Hover { at: at(1, 0) }).await;
    run(&manager, ws.path("util.go"), Action::Symbols).await;
    run(&manager, ws.path("main.go"), Action::Completion { at: at(1, 0) }).await;
    assert_eq!(launcher.launches(), 1);

    manager.shutdown_all().await;
    assert!(manager.list_running().await.is_empty());
    assert!(launcher.methods().contains(&"shutdown".to_string()));
}

#[tokio::test]
async fn test_rejections_never_launch() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("notes.txt"), "hello").unwrap();
    std::fs::write(dir.path().join("lib.rs"), "fn main() {}\n").unwrap();
    let launcher = Arc::new(FakeLauncher::new(|_, _| Value::Null));
    let manager = manager_with(launcher.clone());

    let unsupported = run(&manager, dir.path().join("notes.txt"), Action::Symbols).await;
    assert!(unsupported["error"].as_str().unwrap().contains("go, python"));

    let gap = run(
        &manager,
        dir.path().join("lib.rs"),
        Action::OrganizeImports { apply_edits: false },
    )
    .await;
    assert!(gap["error"].as_str().unwrap().contains("rust"));

    let missing = run(&manager, dir.path().join("missing.go"), Action::Hover { at: at(1, 0) }).await;
    assert!(missing["error"].as_str().unwrap().contains("not found"));

    let diagnostics = run(&manager, dir.path().join("notes.txt"), Action::Diagnostics).await;
    assert!(diagnostics["message"].is_string());

    assert_eq!(launcher.launches(), 0);
}

//! Integration tests for the reviews-autosave preset.
//!
//! Runs the full step list against a pre-refactor reviews page and compares
//! the result with a checked-in golden file.

use std::fs;
use tempfile::TempDir;
use text_patcher::{presets, Pipeline, RunOptions, StepOutcome, WorkspaceGuard};

const PAGE: &str = include_str!("../fixtures/reviews_page.tsx");
const EXPECTED: &str = include_str!("../fixtures/reviews_page.expected.tsx");
const TARGET: &str = "src/app/stores/[storeId]/reviews/page.tsx";

fn setup_mock_workspace() -> TempDir {
    let dir = TempDir::new().unwrap();
    let page = dir.path().join(TARGET);
    fs::create_dir_all(page.parent().unwrap()).unwrap();
    fs::write(&page, PAGE).unwrap();
    dir
}

#[test]
fn test_preset_matches_golden_output() {
    let workspace = setup_mock_workspace();
    let page = workspace.path().join(TARGET);

    let report = text_patcher::run(&page).unwrap();

    assert!(report.written);
    assert_eq!(report.steps.len(), 19);
    for step in &report.steps {
        assert_eq!(
            step.outcome,
            StepOutcome::Applied { replacements: 1 },
            "step {} did not apply exactly once",
            step.id
        );
    }
    assert_eq!(fs::read_to_string(&page).unwrap(), EXPECTED);
}

#[test]
fn test_preset_removes_manual_save() {
    let workspace = setup_mock_workspace();
    let page = workspace.path().join(TARGET);

    text_patcher::run(&page).unwrap();
    let content = fs::read_to_string(&page).unwrap();

    assert!(!content.contains("savingReply"));
    assert!(!content.contains("savingComplaint"));
    assert!(!content.contains("handleSaveReply"));
    assert!(!content.contains("handleSaveComplaint"));
    assert!(!content.contains(" Save,"));
    assert!(content.contains("useAutoSave(storeId)"));
    assert!(content.contains("<BulkActionsBar"));
}

#[test]
fn test_preset_target_resolves_inside_workspace() {
    let workspace = setup_mock_workspace();
    let config = presets::load_default().unwrap();
    let guard = WorkspaceGuard::new(workspace.path()).unwrap();
    let target = guard.resolve(config.meta.target.as_deref().unwrap());

    let pipeline = Pipeline::from_config(&config).unwrap();
    let options = RunOptions {
        dry_run: true,
        guard: Some(guard),
    };
    let report = pipeline.run(&target, &options).unwrap();

    assert!(!report.written);
    assert_eq!(report.transformed, EXPECTED);
    assert_eq!(fs::read_to_string(&target).unwrap(), PAGE);
}

#[test]
fn test_second_run_duplicates_anchored_inserts() {
    let workspace = setup_mock_workspace();
    let page = workspace.path().join(TARGET);

    text_patcher::run(&page).unwrap();
    let second = text_patcher::run(&page).unwrap();

    let inserts = second
        .steps
        .iter()
        .filter(|s| s.outcome != StepOutcome::NoMatch)
        .count();
    assert!(inserts > 0);

    let content = fs::read_to_string(&page).unwrap();
    assert_eq!(
        content
            .matches("import { useAutoSave } from '@/components/reviews/useAutoSave';")
            .count(),
        2
    );
    assert_ne!(content, EXPECTED);
}

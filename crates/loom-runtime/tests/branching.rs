#![allow(missing_docs)]

mod common;

use std::sync::Arc;

use common::{ScriptedProvider, contents, harness, settings};
use loom_core::{LoomError, ValidationError};
use loom_runtime::{NewMessage, Segment, resolve};

fn shape(segments: &[Segment]) -> Vec<String> {
    segments
        .iter()
        .map(|s| match s {
            Segment::ActiveMessage(m) => m.content.clone(),
            Segment::OutdatedBranch(ms) => format!("[{}]", contents(ms).join(" ")),
        })
        .collect()
}

fn quiet() -> common::Harness {
    let mut s = settings(20, 10);
    s.compaction.enabled = false;
    harness(Arc::new(ScriptedProvider::default()), &s)
}

#[tokio::test]
async fn linear_history_is_all_active() {
    let h = quiet();
    let a = h.start("A").await;
    let sid = a.session_id.clone();
    let _ = h.say(&sid, "B").await;
    let _ = h.say(&sid, "C").await;

    let segments = h.controller.current_segments(&sid).await.unwrap();
    assert!(segments.iter().all(Segment::is_active));
    assert_eq!(shape(&segments), ["A", "B", "C"]);
}

#[tokio::test]
async fn editing_moves_old_branch_aside() {
    let h = quiet();
    let a = h.start("A").await;
    let sid = a.session_id.clone();
    let b = h.say(&sid, "B").await;

    let _ = h.controller.edit_message(&b.id, "B'").await.unwrap();

    let segments = h.controller.current_segments(&sid).await.unwrap();
    assert_eq!(shape(&segments), ["A", "[B]", "B'"]);
    assert_eq!(segments, h.controller.current_segments(&sid).await.unwrap());
}

#[tokio::test]
async fn edited_subtree_is_one_outdated_branch() {
    let h = quiet();
    let a = h.start("A").await;
    let sid = a.session_id.clone();
    let b = h.say(&sid, "B").await;
    let _ = h.say(&sid, "C").await;
    let _ = h.say(&sid, "D").await;

    let _ = h.controller.edit_message(&b.id, "B2").await.unwrap();
    let _ = h.say(&sid, "E").await;

    let segments = h.controller.current_segments(&sid).await.unwrap();
    assert_eq!(shape(&segments), ["A", "[B C D]", "B2", "E"]);
}

#[tokio::test]
async fn editing_the_first_message_forks_a_new_root() {
    let h = quiet();
    let a = h.start("A").await;
    let sid = a.session_id.clone();
    let _ = h.say(&sid, "B").await;

    let a2 = h.controller.edit_message(&a.id, "A2").await.unwrap();
    assert!(a2.parent_id.is_none());

    let segments = h.controller.current_segments(&sid).await.unwrap();
    assert_eq!(shape(&segments), ["[A B]", "A2"]);
}

#[tokio::test]
async fn activating_an_old_branch_switches_the_path() {
    let h = quiet();
    let a = h.start("A").await;
    let sid = a.session_id.clone();
    let b = h.say(&sid, "B").await;
    let c = h.say(&sid, "C").await;
    let _ = h.controller.edit_message(&b.id, "B2").await.unwrap();

    h.controller.activate_branch(&c.id).await.unwrap();
    let segments = h.controller.current_segments(&sid).await.unwrap();
    assert_eq!(shape(&segments), ["A", "[B2]", "B", "C"]);

    // appending continues the selected branch
    let d = h.say(&sid, "D").await;
    assert_eq!(d.parent_id.as_ref(), Some(&c.id));
}

#[tokio::test]
async fn explicit_parent_becomes_active() {
    let h = quiet();
    let a = h.start("A").await;
    let sid = a.session_id.clone();
    let b = h.say(&sid, "B").await;
    let _ = h.say(&sid, "C").await;

    let c2 = h
        .controller
        .append_message(NewMessage::assistant("C2").in_session(sid.clone()).with_parent(b.id.clone()))
        .await
        .unwrap();

    let segments = h.controller.current_segments(&sid).await.unwrap();
    assert_eq!(shape(&segments), ["A", "B", "[C]", "C2"]);
    assert_eq!(c2.parent_id, Some(b.id));
}

#[tokio::test]
async fn retry_forks_failed_message() {
    let h = quiet();
    let a = h.start("A").await;
    let sid = a.session_id.clone();
    let b = h.say(&sid, "B").await;
    let failed = h.controller.mark_message_failed(&b.id).await.unwrap();
    assert!(failed.failed);

    let retried = h.controller.retry_failed_message(&b.id).await.unwrap();
    assert_eq!(retried.content, "B");

    let segments = h.controller.current_segments(&sid).await.unwrap();
    assert_eq!(shape(&segments), ["A", "[B]", "B"]);
    let outdated = segments[1].messages();
    assert!(outdated[0].failed);
    assert!(!segments[2].messages()[0].failed);
}

#[tokio::test]
async fn retry_of_healthy_message_is_rejected() {
    let h = quiet();
    let a = h.start("A").await;
    let err = h.controller.retry_failed_message(&a.id).await.unwrap_err();
    assert!(matches!(err, LoomError::Validation(ValidationError::NotFailed(_))));
}

#[tokio::test]
async fn resolve_agrees_with_stored_history() {
    let h = quiet();
    let a = h.start("A").await;
    let sid = a.session_id.clone();
    let b = h.say(&sid, "B").await;
    let _ = h.controller.edit_message(&b.id, "B'").await.unwrap();

    let stored = h.controller.compactor().memory(&sid).await.unwrap();
    let messages = loom_store::MessageStore::new(h.repo.clone())
        .messages(&sid)
        .await
        .unwrap();
    assert_eq!(shape(&resolve(&messages)), ["A", "[B]", "B'"]);
    assert_eq!(contents(&stored.raw_window), ["A", "B'"]);
}

#[tokio::test]
async fn concurrent_appends_form_one_chain() {
    let h = quiet();
    let a = h.start("A").await;
    let sid = a.session_id.clone();

    let names: Vec<String> = (0..10).map(|i| format!("m{i}")).collect();
    let appended = futures::future::join_all(names.iter().map(|n| h.say(&sid, n))).await;
    assert_eq!(appended.len(), 10);

    let segments = h.controller.current_segments(&sid).await.unwrap();
    assert_eq!(segments.len(), 11);
    assert!(segments.iter().all(Segment::is_active));
}

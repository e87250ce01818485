//! Integration tests for the assistant controller
//!
//! Drives full turns against a scripted backend: streaming into the timeline,
//! error handling, mode switches and session recovery.

mod common;

use common::{ScriptedBackend, Turn, source};
use edututor::ai::{ConfigError, ReplyChunk, SessionProvider, StreamError};
use edututor::modes::{switched_text, welcome_text};
use edututor::types::{HistoryTurn, Role};
use edututor::{Assistant, Mode, TurnOutcome};
use std::time::Duration;

fn completed(outcome: TurnOutcome) -> edututor::timeline::MessageId {
    match outcome {
        TurnOutcome::Completed(id) => id,
        other => panic!("expected completion, got {other:?}"),
    }
}

mod startup_tests {
    use super::*;

    #[test]
    fn test_welcome_message_and_session_on_start() {
        let backend = ScriptedBackend::new();
        let assistant = Assistant::new(backend.provider(), Mode::Chat);

        assert_eq!(assistant.config_error(), None);
        assert_eq!(assistant.timeline().len(), 1);
        let welcome = &assistant.timeline().messages()[0];
        assert_eq!(welcome.role(), Role::Model);
        assert_eq!(welcome.content(), welcome_text(Mode::Chat));
        assert_eq!(assistant.session().map(|s| s.mode()), Some(Mode::Chat));
    }

    #[tokio::test]
    async fn test_missing_key_blocks_every_turn() {
        let provider = SessionProvider::unavailable(ConfigError::MissingApiKey);
        let mut assistant = Assistant::new(provider, Mode::Chat);

        assert!(assistant.timeline().is_empty());
        assert!(assistant.config_error().unwrap().contains("GEMINI_API_KEY"));

        let outcome = assistant.send_message("hello").await;
        let TurnOutcome::Aborted(id) = outcome else {
            panic!("expected abort, got {outcome:?}");
        };
        let msg = assistant.timeline().get(id).unwrap();
        assert!(msg.content().starts_with("Error: Could not re-initialize chat"));
        assert_eq!(assistant.timeline().len(), 1);
    }

    #[tokio::test]
    async fn test_reinitialize_recovers_from_missing_key() {
        let provider = SessionProvider::unavailable(ConfigError::MissingApiKey);
        let mut assistant = Assistant::new(provider, Mode::Research);

        let backend = ScriptedBackend::new();
        assistant.reinitialize(backend.provider());
        assert_eq!(assistant.config_error(), None);
        assert_eq!(assistant.session().map(|s| s.mode()), Some(Mode::Research));

        backend.reply(&["ok"]);
        completed(assistant.send_message("go").await);
    }
}

mod streaming_tests {
    use super::*;

    #[tokio::test]
    async fn test_reply_folds_fragments_and_deduplicates_sources() {
        let backend = ScriptedBackend::new();
        let a = source("https://a.example", "A");
        let b = source("https://b.example", "B");
        backend.push(Turn::Chunks(vec![
            Ok(ReplyChunk::text("The answer ")),
            Ok(ReplyChunk {
                text: Some("is ".into()),
                sources: vec![a.clone()],
            }),
            Ok(ReplyChunk::sources(vec![a.clone(), b.clone()])),
            Ok(ReplyChunk::text("42.")),
        ]));
        let mut assistant = Assistant::new(backend.provider(), Mode::Research);

        let mut snapshots = Vec::new();
        let outcome = assistant
            .send_message_with("  what is it?  ", |msg| {
                snapshots.push((msg.content().to_string(), msg.is_loading()))
            })
            .await;
        let id = completed(outcome);

        let msg = assistant.timeline().get(id).unwrap();
        assert_eq!(msg.content(), "The answer is 42.");
        assert_eq!(msg.sources(), &[a, b]);
        assert!(!msg.is_loading());
        assert!(!assistant.is_busy());

        assert!(snapshots.iter().rev().skip(1).all(|(_, loading)| *loading));
        assert_eq!(snapshots.last().unwrap(), &("The answer is 42.".to_string(), false));

        let roles: Vec<_> = assistant.timeline().messages().iter().map(|m| m.role()).collect();
        assert_eq!(roles, vec![Role::Model, Role::User, Role::Model]);
        assert_eq!(assistant.timeline().messages()[1].content(), "what is it?");
        assert_eq!(backend.requests()[0].user_text, "what is it?");
    }

    #[tokio::test]
    async fn test_error_replaces_partial_reply_and_session_survives() {
        let backend = ScriptedBackend::new();
        backend.push(Turn::Chunks(vec![
            Ok(ReplyChunk::text("one ")),
            Ok(ReplyChunk::text("two ")),
            Err(StreamError::Api {
                status: 503,
                message: "overloaded".into(),
            }),
        ]));
        backend.reply(&["fine now"]);
        let mut assistant = Assistant::new(backend.provider(), Mode::Chat);

        let outcome = assistant.send_message("first").await;
        let TurnOutcome::Failed(id) = outcome else {
            panic!("expected failure, got {outcome:?}");
        };
        let msg = assistant.timeline().get(id).unwrap();
        assert_eq!(msg.content(), "API error 503: overloaded");
        assert!(!msg.is_loading());
        assert_eq!(assistant.config_error(), None);

        let id = completed(assistant.send_message("second").await);
        assert_eq!(assistant.timeline().get(id).unwrap().content(), "fine now");
        // The failed turn never entered the session's history.
        assert!(backend.requests()[1].history.is_empty());
    }

    #[tokio::test]
    async fn test_refused_stream_fails_the_turn() {
        let backend = ScriptedBackend::new();
        backend.push(Turn::Refuse(StreamError::Blocked("SAFETY".into())));
        let mut assistant = Assistant::new(backend.provider(), Mode::Chat);

        let outcome = assistant.send_message("hmm").await;
        let TurnOutcome::Failed(id) = outcome else {
            panic!("expected failure, got {outcome:?}");
        };
        assert_eq!(
            assistant.timeline().get(id).unwrap().content(),
            "response blocked: SAFETY"
        );
    }

    #[tokio::test]
    async fn test_rejected_credential_disables_further_turns() {
        let backend = ScriptedBackend::new();
        backend.push(Turn::Refuse(StreamError::Credential("API key not valid".into())));
        let mut assistant = Assistant::new(backend.provider(), Mode::Chat);

        assert!(matches!(
            assistant.send_message("hi").await,
            TurnOutcome::Failed(_)
        ));
        assert!(assistant.config_error().unwrap().contains("rejected"));
        assert!(assistant.session().is_none());

        assert!(matches!(
            assistant.send_message("again").await,
            TurnOutcome::Aborted(_)
        ));
        assistant.set_mode(Mode::Quiz);
        assert!(assistant.session().is_none());
        assert_eq!(backend.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_completed_turns_extend_session_history() {
        let backend = ScriptedBackend::new();
        backend.reply(&["Paris"]);
        backend.reply(&["About 2 million"]);
        let mut assistant = Assistant::new(backend.provider(), Mode::Chat);

        completed(assistant.send_message("Capital of France?").await);
        completed(assistant.send_message("Population?").await);

        let requests = backend.requests();
        assert!(requests[0].history.is_empty());
        assert_eq!(
            requests[1].history,
            vec![
                HistoryTurn::new(Role::User, "Capital of France?"),
                HistoryTurn::new(Role::Model, "Paris"),
            ]
        );
    }

    #[tokio::test]
    async fn test_blank_input_is_ignored() {
        let backend = ScriptedBackend::new();
        let mut assistant = Assistant::new(backend.provider(), Mode::Chat);
        assert_eq!(assistant.send_message("   \n").await, TurnOutcome::Ignored);
        assert_eq!(assistant.timeline().len(), 1);
        assert!(backend.requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_reply_is_settled_by_next_turn() {
        let backend = ScriptedBackend::new();
        backend.push(Turn::Hang(vec![Ok(ReplyChunk::text("partial"))]));
        backend.reply(&["complete"]);
        let mut assistant = Assistant::new(backend.provider(), Mode::Chat);

        let abandoned =
            tokio::time::timeout(Duration::from_secs(5), assistant.send_message("slow")).await;
        assert!(abandoned.is_err());
        assert!(assistant.is_busy());
        let stale = assistant.timeline().in_flight().unwrap().id();

        let id = completed(assistant.send_message("next").await);
        assert!(!assistant.is_busy());
        let stale = assistant.timeline().get(stale).unwrap();
        assert_eq!(stale.content(), "partial");
        assert!(!stale.is_loading());
        assert_eq!(assistant.timeline().get(id).unwrap().content(), "complete");
    }
}

mod quiz_tests {
    use super::*;

    #[tokio::test]
    async fn test_structured_reply_gets_parsed_quiz() {
        let backend = ScriptedBackend::new();
        backend.reply(&[
            "```json\n{\"questions\":[{\"question\":\"2+2?\",",
            "\"options\":[\"3\",\"4\",\"5\",\"6\"],\"correctAnswer\":\"B\"}]}\n```",
        ]);
        let mut assistant = Assistant::new(backend.provider(), Mode::Quiz);

        let id = completed(assistant.send_message("arithmetic").await);
        let msg = assistant.timeline().get(id).unwrap();
        let quiz = msg.quiz().expect("quiz attached");
        let questions = quiz.typed_questions();
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].correct_answer, "B");
        assert!(msg.content().starts_with("```json"));
    }

    #[tokio::test]
    async fn test_malformed_structured_reply_keeps_raw_text() {
        let backend = ScriptedBackend::new();
        backend.reply(&["Sorry, I can't make a quiz about that."]);
        let mut assistant = Assistant::new(backend.provider(), Mode::Quiz);

        let id = completed(assistant.send_message("???").await);
        let msg = assistant.timeline().get(id).unwrap();
        assert!(msg.quiz().is_none());
        assert_eq!(msg.content(), "Sorry, I can't make a quiz about that.");
    }

    #[tokio::test]
    async fn test_free_text_modes_never_attach_quiz() {
        let backend = ScriptedBackend::new();
        backend.reply(&["[{\"question\":\"Q\"}]"]);
        let mut assistant = Assistant::new(backend.provider(), Mode::StudyNotes);
        let id = completed(assistant.send_message("notes").await);
        assert!(assistant.timeline().get(id).unwrap().quiz().is_none());
    }
}

mod mode_tests {
    use super::*;
    use edututor::controller::rebuild_history;

    #[test]
    fn test_mode_switch_restarts_conversation() {
        let backend = ScriptedBackend::new();
        let mut assistant = Assistant::new(backend.provider(), Mode::Chat);
        assistant.set_mode(Mode::Summarize);

        assert_eq!(assistant.mode(), Mode::Summarize);
        assert_eq!(assistant.timeline().len(), 1);
        assert_eq!(
            assistant.timeline().messages()[0].content(),
            switched_text(Mode::Summarize)
        );
        let session = assistant.session().unwrap();
        assert_eq!(session.mode(), Mode::Summarize);
        assert!(session.history().is_empty());
    }

    #[tokio::test]
    async fn test_rebuilt_history_mirrors_timeline() {
        let backend = ScriptedBackend::new();
        backend.reply(&["a1"]);
        backend.reply(&["a2"]);
        let mut assistant = Assistant::new(backend.provider(), Mode::Chat);
        completed(assistant.send_message("q1").await);
        completed(assistant.send_message("q2").await);

        let timeline = assistant.timeline();
        let history = rebuild_history(timeline);
        assert_eq!(history.len(), timeline.len());
        for (turn, msg) in history.iter().zip(timeline.messages()) {
            assert_eq!(turn.role, msg.role());
            assert_eq!(turn.text, msg.content());
        }

        let session = backend
            .provider()
            .create_session(Mode::Quiz, Some(history.clone()))
            .unwrap();
        assert_eq!(session.history(), history.as_slice());
    }

    #[tokio::test]
    async fn test_stale_session_is_rebuilt_from_timeline_before_sending() {
        let backend = ScriptedBackend::new();
        backend.reply(&["chat answer"]);
        let mut assistant = Assistant::new(backend.provider(), Mode::Chat);
        completed(assistant.send_message("chat question").await);

        // The switch cannot build a Quiz session, so the Chat one lingers.
        backend.reject_bindings(true);
        assistant.set_mode(Mode::Quiz);
        assert_eq!(assistant.session().map(|s| s.mode()), Some(Mode::Chat));

        backend.reject_bindings(false);
        backend.reply(&["[]"]);
        let expected_history = rebuild_history(assistant.timeline());
        completed(assistant.send_message("quiz me").await);

        assert_eq!(assistant.session().map(|s| s.mode()), Some(Mode::Quiz));
        let last = backend.requests().pop().unwrap();
        assert_eq!(last.mode, Mode::Quiz);
        assert_eq!(last.history, expected_history);
        assert_eq!(
            last.history,
            vec![HistoryTurn::new(Role::Model, switched_text(Mode::Quiz))]
        );
    }

    #[tokio::test]
    async fn test_failed_recovery_aborts_without_sending() {
        let backend = ScriptedBackend::new();
        let mut assistant = Assistant::new(backend.provider(), Mode::Chat);
        backend.reject_bindings(true);
        assistant.set_mode(Mode::Research);

        let outcome = assistant.send_message("anything").await;
        let TurnOutcome::Aborted(id) = outcome else {
            panic!("expected abort, got {outcome:?}");
        };
        assert!(
            assistant
                .timeline()
                .get(id)
                .unwrap()
                .content()
                .starts_with("Error: Could not re-initialize chat")
        );
        // Only the switch banner and the failure notice; the user turn was not sent.
        assert_eq!(assistant.timeline().len(), 2);
        assert!(backend.requests().is_empty());
        // Capability rejections are local, not a banner-level failure.
        assert_eq!(assistant.config_error(), None);
        assert!(!assistant.is_busy());
        assert!(
            assistant
                .timeline()
                .messages()
                .iter()
                .all(|msg| msg.role() == Role::Model && !msg.is_loading())
        );
    }

    #[tokio::test]
    async fn test_missing_session_is_rebuilt_from_whole_conversation() {
        let backend = ScriptedBackend::new();
        backend.reply(&["a1"]);
        backend.reply(&["a2"]);
        let mut assistant = Assistant::new(backend.provider(), Mode::Chat);
        completed(assistant.send_message("q1").await);
        completed(assistant.send_message("q2").await);

        // Re-initializing cannot build a session, so none is held.
        backend.reject_bindings(true);
        assistant.reinitialize(backend.provider());
        assert!(assistant.session().is_none());
        assert_eq!(assistant.timeline().len(), 5);

        backend.reject_bindings(false);
        backend.reply(&["a3"]);
        completed(assistant.send_message("q3").await);

        let last = backend.requests().pop().unwrap();
        assert_eq!(last.mode, Mode::Chat);
        assert_eq!(last.user_text, "q3");
        assert_eq!(
            last.history,
            vec![
                HistoryTurn::new(Role::Model, welcome_text(Mode::Chat)),
                HistoryTurn::new(Role::User, "q1"),
                HistoryTurn::new(Role::Model, "a1"),
                HistoryTurn::new(Role::User, "q2"),
                HistoryTurn::new(Role::Model, "a2"),
            ]
        );
        assert_eq!(assistant.session().map(|s| s.history().len()), Some(7));
    }
}

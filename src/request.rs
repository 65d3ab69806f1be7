//! Intake data model: build requests, rounds, and result payloads.

use serde::{Deserialize, Serialize};

/// A caller-submitted unit of work.
///
/// The tuple (email, task, round, nonce) uniquely identifies a request;
/// resubmitting the same tuple must never re-run side effects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildRequest {
    pub email: String,
    /// Opaque task identifier, doubles as the target repository name.
    pub task: String,
    pub round: u32,
    pub nonce: String,
    /// Free-text description of the app to build.
    pub brief: String,
    /// Ordered acceptance checks passed through to the generator.
    #[serde(default)]
    pub checks: Vec<String>,
    #[serde(default)]
    pub attachments: Vec<AttachmentUpload>,
    /// Callback endpoint for the evaluation server.
    pub evaluation_url: String,
    /// Shared-secret credential, verified before any other work.
    #[serde(default)]
    pub secret: String,
}

/// An attachment as submitted at intake: inline base64 content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentUpload {
    /// Relative file path inside the target repository.
    pub name: String,
    #[serde(default)]
    pub mime: String,
    /// Base64-encoded bytes, optionally wrapped in a data URI.
    pub content: String,
}

/// Build phase. There is no round 3; anything outside {1, 2} is rejected
/// at the intake boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Round {
    /// Round 1: build the repository from scratch.
    Fresh,
    /// Round 2: revise an existing build.
    Revision,
}

impl Round {
    pub fn from_wire(value: u32) -> Option<Round> {
        match value {
            1 => Some(Round::Fresh),
            2 => Some(Round::Revision),
            _ => None,
        }
    }

    /// The wire integer for this round.
    pub fn number(&self) -> u32 {
        match self {
            Round::Fresh => 1,
            Round::Revision => 2,
        }
    }
}

/// Derive the ledger lookup key for one logical request instance.
///
/// Must produce the same string at intake and at persistence time.
pub fn idempotency_key(email: &str, task: &str, round: Round, nonce: &str) -> String {
    format!("{}::{}::round{}::nonce{}", email, task, round.number(), nonce)
}

/// The record persisted to the ledger and delivered to the evaluation
/// server. Immutable once written; duplicates get this exact payload back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultPayload {
    pub email: String,
    pub task: String,
    pub round: u32,
    pub nonce: String,
    pub repo_url: String,
    pub commit_sha: Option<String>,
    pub pages_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_from_wire() {
        assert_eq!(Round::from_wire(1), Some(Round::Fresh));
        assert_eq!(Round::from_wire(2), Some(Round::Revision));
        assert_eq!(Round::from_wire(0), None);
        assert_eq!(Round::from_wire(3), None);
    }

    #[test]
    fn test_idempotency_key_format() {
        let key = idempotency_key("a@b.c", "task-1", Round::Fresh, "n0nce");
        assert_eq!(key, "a@b.c::task-1::round1::noncen0nce");

        let revised = idempotency_key("a@b.c", "task-1", Round::Revision, "n0nce");
        assert_ne!(key, revised);
        assert!(revised.contains("::round2::"));
    }

    #[test]
    fn test_request_deserializes_with_defaults() {
        let json = serde_json::json!({
            "email": "dev@example.com",
            "task": "demo-app",
            "round": 1,
            "nonce": "abc",
            "brief": "a todo list",
            "evaluation_url": "https://eval.example.com/notify"
        });
        let request: BuildRequest = serde_json::from_value(json).unwrap();
        assert!(request.checks.is_empty());
        assert!(request.attachments.is_empty());
        assert!(request.secret.is_empty());
    }

    #[test]
    fn test_payload_serializes_null_degradations() {
        let payload = ResultPayload {
            email: "dev@example.com".to_string(),
            task: "demo-app".to_string(),
            round: 1,
            nonce: "abc".to_string(),
            repo_url: "https://github.com/u/demo-app".to_string(),
            commit_sha: None,
            pages_url: None,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert!(json.get("commit_sha").unwrap().is_null());
        assert!(json.get("pages_url").unwrap().is_null());
    }
}

//! Deterministic [`chronicle_types::RecordingHash`] computation.
//!
//! The hash covers the normalized request — prompt text, provider id, model
//! id, structured-output schema, permission mode, max turns — and
//! deliberately excludes wall-clock timestamps, session ids, and `caused_by`
//! pointers, so two requests that differ only in those fields hash
//! identically and hit the same cache entry on replay.

use chronicle_types::{JsonSchema, RecordingHash};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::ProviderQuery;

/// The fields of a [`ProviderQuery`] that participate in the hash, in a
/// stable, serializable shape. Kept separate from `ProviderQuery` itself so
/// the hash input is visibly decoupled from fields like `session_id` and
/// `abort_signal` that must never affect it.
#[derive(Serialize)]
struct Canonical<'a> {
    prompt_system: &'a Option<String>,
    prompt_messages: Vec<(&'a str, &'a str)>,
    provider_id: &'a str,
    model: &'a Option<String>,
    max_turns: &'a Option<usize>,
    permission_mode: &'a str,
    output_schema: &'a JsonSchema,
}

/// Compute the stable [`RecordingHash`] for `query` against `provider_id`.
///
/// Canonicalization is `serde_json`'s default key ordering over a struct
/// with a fixed field order (not a `Value`, so there is no ambiguity from
/// map key reordering), hashed with SHA-256 and hex-encoded.
#[must_use]
pub fn compute_hash(query: &ProviderQuery, provider_id: &str) -> RecordingHash {
    let canonical = Canonical {
        prompt_system: &query.prompt.system,
        prompt_messages: query
            .prompt
            .messages
            .iter()
            .map(|m| (role_str(m.role), m.content.as_str()))
            .collect(),
        provider_id,
        model: &query.model,
        max_turns: &query.max_turns,
        permission_mode: query.permission_mode.as_str(),
        output_schema: &query.output_schema,
    };

    let bytes = serde_json::to_vec(&canonical).expect("canonical query is always serializable");
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    RecordingHash::new(hex::encode(hasher.finalize()))
}

fn role_str(role: chronicle_types::PromptRole) -> &'static str {
    match role {
        chronicle_types::PromptRole::User => "user",
        chronicle_types::PromptRole::Assistant => "assistant",
    }
}

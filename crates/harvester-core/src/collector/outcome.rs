//! Outcome model: what a single `collect()` call produces.
//!
//! Three shapes exist and only three:
//! - [`CollectOutcome::Success`]: every expected field was obtained
//! - [`CollectOutcome::Partial`]: some fields are missing, the rest is kept
//! - [`CollectOutcome::Failed`]: nothing usable was obtained
//!
//! The smart constructors on [`CollectOutcome`] are the intended entry points:
//! they downgrade an empty "success" to `Failed` and guarantee that
//! `Partial`/`Failed` always carry at least one message.

use serde_json::{Map, Value};

/// One section of a result (`blockchain` or `workload`): an ordered JSON object.
pub type Section = Map<String, Value>;

/// Fallback message for a failure reported without any reason.
pub const GENERIC_FAILURE: &str = "collector failed without reporting a reason";

/// Fallback message for a partial result reported without any reason.
pub const GENERIC_PARTIAL: &str = "Partial data only.";

/// Data obtained by a collector.
///
/// At least one of the two sections is non-empty; an empty result cannot be
/// constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectResult {
    blockchain: Section,
    workload: Section,
}

impl CollectResult {
    /// Builds a result from its two sections.
    ///
    /// Returns `None` when both sections are empty.
    pub fn new(blockchain: Section, workload: Section) -> Option<Self> {
        if blockchain.is_empty() && workload.is_empty() {
            None
        } else {
            Some(Self {
                blockchain,
                workload,
            })
        }
    }

    /// Chain identity fields (ecosystem, network name, chain id).
    pub fn blockchain(&self) -> &Section {
        &self.blockchain
    }

    /// Node/process identity fields (client name, client version, endpoint).
    pub fn workload(&self) -> &Section {
        &self.workload
    }

    /// Consumes the result, returning `(blockchain, workload)`.
    pub fn into_sections(self) -> (Section, Section) {
        (self.blockchain, self.workload)
    }
}

/// Non-empty, ordered list of human-readable messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Messages(Vec<String>);

impl Messages {
    /// Collects messages, dropping blank ones. Uses `fallback` if nothing remains.
    pub fn new<I, S>(messages: I, fallback: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let list: Vec<String> = messages
            .into_iter()
            .map(Into::into)
            .filter(|m| !m.trim().is_empty())
            .collect();
        if list.is_empty() {
            Self(vec![fallback.to_string()])
        } else {
            Self(list)
        }
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }

    /// Messages joined with `"; "`.
    pub fn joined(&self) -> String {
        self.0.join("; ")
    }
}

/// Tagged result of one collect invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum CollectOutcome {
    Success(CollectResult),
    Partial {
        result: CollectResult,
        messages: Messages,
    },
    Failed(Messages),
}

impl CollectOutcome {
    /// Full success. Degrades to `Failed` when both sections are empty.
    pub fn success(blockchain: Section, workload: Section) -> Self {
        match CollectResult::new(blockchain, workload) {
            Some(result) => Self::Success(result),
            None => Self::failed(["collector returned no data"]),
        }
    }

    /// Partial data with reasons for the gaps.
    ///
    /// Degrades to `Failed` (keeping the messages) when both sections are empty.
    pub fn partial<I, S>(blockchain: Section, workload: Section, messages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        match CollectResult::new(blockchain, workload) {
            Some(result) => Self::Partial {
                result,
                messages: Messages::new(messages, GENERIC_PARTIAL),
            },
            None => Self::Failed(Messages::new(messages, GENERIC_FAILURE)),
        }
    }

    /// Total failure.
    pub fn failed<I, S>(messages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Failed(Messages::new(messages, GENERIC_FAILURE))
    }

    /// Short status label used in logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::Partial { .. } => "partial",
            Self::Failed(_) => "failed",
        }
    }

    /// Messages attached to the outcome (empty for success).
    pub fn messages(&self) -> &[String] {
        match self {
            Self::Success(_) => &[],
            Self::Partial { messages, .. } | Self::Failed(messages) => messages.as_slice(),
        }
    }
}

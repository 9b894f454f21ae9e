//! Cheap, always-on, per-decode-call diagnostic notes.
//!
//! `Logs` is the lightweight counterpart to [`crate::diagnostics`]'s opt-in
//! collector: every decoder returns one alongside its parsed record, at
//! essentially zero cost when nothing unusual was seen (an empty `Vec`).
//! When a [`crate::reader::Reader`] has `collect_diagnostics` enabled, these
//! notes are folded into the shared [`crate::diagnostics::DiagnosticCollector`].

use serde::Serialize;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum LogCode {
    WarningConversion,
    WarningUnrecognizedBitflag,
    WarningLengthMismatch,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Log {
    pub code: LogCode,
    pub text: String,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct Logs(Vec<Log>);

impl Logs {
    pub fn add(&mut self, code: LogCode, text: &str) {
        self.0.push(Log {
            code,
            text: text.to_string(),
        });
    }

    pub fn get(&self) -> Option<&Vec<Log>> {
        if self.0.is_empty() {
            None
        } else {
            Some(&self.0)
        }
    }

    pub fn extend(&mut self, other: Logs) {
        self.0.extend(other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Log> {
        self.0.iter()
    }
}

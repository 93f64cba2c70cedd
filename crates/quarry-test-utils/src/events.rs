// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Assertions over a collected pipeline event sequence.

use quarry_core::{
    AnswerEvent, DoneEvent, ErrorEvent, PipelineEvent, RowsEvent, RunStatus, SqlEvent, Stage,
    StepEvent, StepStatus,
};

/// Every event of one run, in emission order.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<PipelineEvent>,
}

impl From<Vec<PipelineEvent>> for EventLog {
    fn from(events: Vec<PipelineEvent>) -> Self {
        Self { events }
    }
}

impl EventLog {
    pub fn events(&self) -> &[PipelineEvent] {
        &self.events
    }

    /// Event kinds in order, e.g. `["step", "sql", "rows", "answer", "done"]`.
    pub fn kinds(&self) -> Vec<&'static str> {
        self.events.iter().map(PipelineEvent::kind).collect()
    }

    pub fn steps(&self) -> Vec<&StepEvent> {
        self.events
            .iter()
            .filter_map(|e| match e {
                PipelineEvent::Step(step) => Some(step),
                _ => None,
            })
            .collect()
    }

    /// Steps of one stage carrying one status.
    pub fn steps_with(&self, stage: Stage, status: StepStatus) -> Vec<&StepEvent> {
        self.steps()
            .into_iter()
            .filter(|s| s.stage == stage && s.status == Some(status))
            .collect()
    }

    pub fn sql(&self) -> Vec<&SqlEvent> {
        self.events
            .iter()
            .filter_map(|e| match e {
                PipelineEvent::Sql(sql) => Some(sql),
                _ => None,
            })
            .collect()
    }

    pub fn rows(&self) -> Vec<&RowsEvent> {
        self.events
            .iter()
            .filter_map(|e| match e {
                PipelineEvent::Rows(rows) => Some(rows),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<&ErrorEvent> {
        self.events
            .iter()
            .filter_map(|e| match e {
                PipelineEvent::Error(error) => Some(error),
                _ => None,
            })
            .collect()
    }

    pub fn error_codes(&self) -> Vec<&str> {
        self.errors().iter().map(|e| e.error_code.as_str()).collect()
    }

    pub fn answers(&self) -> Vec<&AnswerEvent> {
        self.events
            .iter()
            .filter_map(|e| match e {
                PipelineEvent::Answer(answer) => Some(answer),
                _ => None,
            })
            .collect()
    }

    /// The single answer's markdown. Panics unless exactly one was sent.
    pub fn answer(&self) -> &str {
        let answers = self.answers();
        assert_eq!(answers.len(), 1, "expected exactly one answer, got {answers:?}");
        &answers[0].markdown
    }

    pub fn done(&self) -> Option<&DoneEvent> {
        match self.events.last() {
            Some(PipelineEvent::Done(done)) => Some(done),
            _ => None,
        }
    }

    /// Status of the closing `done` event. Panics if the log does not end
    /// with one.
    pub fn status(&self) -> RunStatus {
        match self.done() {
            Some(done) => done.status,
            None => panic!("event log does not end with done: {:?}", self.kinds()),
        }
    }

    /// Checks the framing every run must satisfy: exactly one `answer`,
    /// immediately followed by the one and only `done`, which is last.
    pub fn assert_well_formed(&self) {
        let kinds = self.kinds();
        assert_eq!(
            kinds.iter().filter(|k| **k == "done").count(),
            1,
            "expected one done: {kinds:?}"
        );
        assert_eq!(
            kinds.iter().filter(|k| **k == "answer").count(),
            1,
            "expected one answer: {kinds:?}"
        );
        let n = kinds.len();
        assert!(n >= 2, "too few events: {kinds:?}");
        assert_eq!(&kinds[n - 2..], ["answer", "done"], "bad tail: {kinds:?}");
    }
}

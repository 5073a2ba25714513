//! Quiz progress over a growing list of questions: subject filter, score,
//! and a per-question countdown.

use itertools::Itertools;

use crate::model::Question;

pub const DEFAULT_SECONDS_PER_QUESTION: u32 = 60;

/// Which questions are in play.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SubjectFilter {
    #[default]
    All,
    Only(String),
}

impl SubjectFilter {
    fn matches(&self, question: &Question) -> bool {
        match self {
            SubjectFilter::All => true,
            SubjectFilter::Only(subject) => &question.math_subject == subject,
        }
    }
}

impl From<&str> for SubjectFilter {
    fn from(s: &str) -> Self {
        if s.eq_ignore_ascii_case("all") {
            SubjectFilter::All
        } else {
            SubjectFilter::Only(s.to_string())
        }
    }
}

/// Result of one timer tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Seconds left on the current question.
    Running(u32),
    /// Time ran out and the current selection was submitted.
    Expired { correct: bool },
    /// Nothing to count down: answer submitted, quiz over, or no question.
    Idle,
}

#[derive(Debug, Clone)]
pub struct QuizSession {
    questions: Vec<Question>,
    filter: SubjectFilter,
    index: usize,
    selected: Option<String>,
    submitted: bool,
    completed: bool,
    score: u32,
    seconds_per_question: u32,
    remaining: u32,
}

impl QuizSession {
    pub fn new(seconds_per_question: u32) -> Self {
        let seconds_per_question = seconds_per_question.max(1);
        Self {
            questions: Vec::new(),
            filter: SubjectFilter::All,
            index: 0,
            selected: None,
            submitted: false,
            completed: false,
            score: 0,
            seconds_per_question,
            remaining: seconds_per_question,
        }
    }

    /// Append newly arrived questions without disturbing progress.
    pub fn extend(&mut self, questions: impl IntoIterator<Item = Question>) {
        self.questions.extend(questions);
    }

    /// `All` followed by each subject once, in first-seen order.
    pub fn subjects(&self) -> Vec<String> {
        std::iter::once("All".to_string())
            .chain(self.questions.iter().map(|q| q.math_subject.clone()).unique())
            .collect()
    }

    pub fn filter(&self) -> &SubjectFilter {
        &self.filter
    }

    /// Change the subject filter and start over.
    pub fn set_filter(&mut self, filter: SubjectFilter) {
        self.filter = filter;
        self.restart();
    }

    fn in_play(&self) -> impl Iterator<Item = &Question> {
        self.questions.iter().filter(|q| self.filter.matches(q))
    }

    /// Number of questions matching the filter.
    pub fn len(&self) -> usize {
        self.in_play().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn current(&self) -> Option<&Question> {
        if self.completed {
            return None;
        }
        self.in_play().nth(self.index)
    }

    pub fn select(&mut self, choice: impl Into<String>) {
        if !self.submitted {
            self.selected = Some(choice.into());
        }
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Submit the current selection. Returns whether it was correct, or
    /// `None` if nothing is selected or there is nothing to submit to.
    pub fn submit(&mut self) -> Option<bool> {
        self.selected.as_ref()?;
        self.lock_in()
    }

    /// Score whatever is selected, possibly nothing.
    fn lock_in(&mut self) -> Option<bool> {
        if self.submitted {
            return None;
        }
        let question = self.current()?;
        let correct = self
            .selected
            .as_deref()
            .is_some_and(|choice| question.is_correct(choice));

        self.submitted = true;
        if correct {
            self.score += 1;
        }
        Some(correct)
    }

    pub fn is_submitted(&self) -> bool {
        self.submitted
    }

    /// Count one second off the current question.
    pub fn tick(&mut self) -> Tick {
        if self.submitted || self.current().is_none() {
            return Tick::Idle;
        }
        if self.remaining <= 1 {
            self.remaining = 0;
            let correct = self.lock_in().unwrap_or(false);
            return Tick::Expired { correct };
        }
        self.remaining -= 1;
        Tick::Running(self.remaining)
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn seconds_per_question(&self) -> u32 {
        self.seconds_per_question
    }

    /// Change the time allowed per question. An unanswered question starts
    /// its countdown over with the new duration.
    pub fn set_seconds_per_question(&mut self, seconds: u32) {
        self.seconds_per_question = seconds.max(1);
        if !self.submitted {
            self.remaining = self.seconds_per_question;
        }
    }

    /// Move to the next question, completing the quiz after the last one.
    ///
    /// A completed quiz resumes here once `extend` has added questions past
    /// the last one answered.
    pub fn next(&mut self) {
        if self.is_empty() {
            return;
        }
        if self.index + 1 < self.len() {
            self.index += 1;
            self.completed = false;
        } else {
            self.completed = true;
        }
        self.reset_question();
    }

    pub fn restart(&mut self) {
        self.index = 0;
        self.score = 0;
        self.completed = false;
        self.reset_question();
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    fn reset_question(&mut self) {
        self.selected = None;
        self.submitted = false;
        self.remaining = self.seconds_per_question;
    }
}

impl Default for QuizSession {
    fn default() -> Self {
        Self::new(DEFAULT_SECONDS_PER_QUESTION)
    }
}

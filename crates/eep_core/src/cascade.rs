//! Ordered fallback strategies for placing one EEP.

use tracing::debug;

/// One way of locating an EEP, with the note recorded if it succeeds.
pub struct Attempt<'a> {
    pub note: String,
    run: Box<dyn Fn() -> Option<usize> + 'a>,
}

impl<'a> Attempt<'a> {
    pub fn new(note: impl Into<String>, run: impl Fn() -> Option<usize> + 'a) -> Self {
        Self {
            note: note.into(),
            run: Box::new(run),
        }
    }

    pub fn run(&self) -> Option<usize> {
        (self.run)()
    }
}

/// Runs `attempts` in order and returns the first index found with its note.
pub fn first_success(eep: &str, attempts: Vec<Attempt<'_>>) -> Option<(usize, String)> {
    for attempt in attempts {
        match attempt.run() {
            Some(index) => return Some((index, attempt.note)),
            None => debug!(eep, strategy = %attempt.note, "strategy found nothing"),
        }
    }
    None
}

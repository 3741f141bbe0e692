use crate::gesture::Hand;

/// Events posted to the UI event loop from other threads.
#[derive(Debug)]
pub enum Cmd {
    /// One frame from the hand tracker; `None` when no hand was detected.
    Frame(Option<Hand>),

    /// The landmark source is gone. Camera input stays unavailable, everything else keeps working.
    DetectorFailed { reason: String },
}

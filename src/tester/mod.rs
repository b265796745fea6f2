//! Write/verify tester
//!
//! The tester runs one test as a sequential state machine on a single thread:
//!
//! ```text
//!   Writing ──► AwaitingRemount ──► Reading ──► Finished
//!      │               ▲                │
//!      │ low space     │ operator       │ reached the
//!      └── skip ───────┘ continues      └ write cutoff
//! ```
//!
//! A Controller (CLI, GUI, test harness) observes the run through the
//! `TesterEvent` channel and steers it through `TesterControl`. The only
//! steering it can do is ask to leave `AwaitingRemount` and ask to stop.

mod events;
mod machine;
mod phase;

pub use events::{DefectCounts, RunReport, TesterEvent};
pub use machine::Tester;
pub use phase::{Phase, TesterControl};

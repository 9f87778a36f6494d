//! A closed, totally ordered scheduling priority.

/// Scheduling priority for a [`Request`](crate::request::Request).
///
/// Ordered `Low < Normal < High < Critical`; `#[derive(Ord)]` gives the
/// total order directly from declaration order, so the queue can compare
/// priorities with plain `Ord` rather than matching on magic numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

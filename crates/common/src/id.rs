//! Row identifiers.

use std::sync::{LazyLock, Mutex, PoisonError};

use ulid::{Generator, Ulid};

/// Process-wide monotonic source, so IDs created within one millisecond
/// still sort in creation order.
static GENERATOR: LazyLock<Mutex<Generator>> = LazyLock::new(|| Mutex::new(Generator::new()));

/// Generates lowercase ULIDs for every stored row.
///
/// IDs sort by creation order, which is what message history and `untilId`
/// cursors rely on.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdGenerator;

impl IdGenerator {
    /// Create a new ID generator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// A fresh 26-character ID, greater than every ID generated before it.
    #[must_use]
    pub fn generate(&self) -> String {
        let ulid = {
            let mut generator = GENERATOR.lock().unwrap_or_else(PoisonError::into_inner);
            // Overflow needs 2^80 IDs in one millisecond.
            generator.generate().unwrap_or_else(|_| Ulid::new())
        };
        ulid.to_string().to_lowercase()
    }
}

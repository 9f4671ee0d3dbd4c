use std::sync::Mutex;

use once_cell::sync::Lazy;
use ulid::{Generator, Ulid};

/// Process-wide ULID generator; every shard draws task and table ids from it.
static GENERATOR: Lazy<Mutex<Generator>> = Lazy::new(|| Mutex::new(Generator::new()));

/// Next monotonic, time-ordered identifier.
pub(crate) fn generate_id() -> Ulid {
    let mut generator = GENERATOR
        .lock()
        .expect("id generator mutex should not be poisoned");
    generator
        .generate()
        .expect("id generator should advance without error")
}

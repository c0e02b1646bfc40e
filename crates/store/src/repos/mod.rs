//! Repository traits for record and lock operations.

pub mod locks;
pub mod records;

pub use locks::LockRepo;
pub use records::RecordRepo;

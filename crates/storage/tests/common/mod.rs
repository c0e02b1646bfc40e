//! Storage test utilities.

pub mod fixtures;

#[allow(unused_imports)]
pub use fixtures::{
    POSTGRES_CONTAINER_START_ERR_PREFIX, PostgresTestStorage, TestStorage, init_tracing,
    run_storage_test_both,
};

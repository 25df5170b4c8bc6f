/*! Integration tests for Ordinal.
 *
 * This test suite is organized as a single integration test binary
 * following the pattern described by matklad in
 * https://matklad.github.io/2021/02/27/delete-cargo-integration-tests.html
 *
 * The module structure mirrors the main library structure:
 * - position: Property tests for the position algebra
 * - rebalance: Tests for the GapRebalancer against real backends
 * - moves: Tests for the move protocol, including conflicts and concurrency
 * - board: Tests for the Board facade (creation, bulk inserts, imports)
 * - diagnostics: Tests for diagnostic reports
 * - backend: Tests for the BackendImpl trait and implementations
 */

use tracing_subscriber::EnvFilter;

#[ctor::ctor]
fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("ordinal=info".parse().unwrap()),
        )
        .with_test_writer()
        .try_init();
}

mod backend;
mod helpers;
mod moves;

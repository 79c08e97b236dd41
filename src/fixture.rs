//! Service-level test fixtures wrapped by a harness.
//! The harness only sequences them; what a fixture sets up (database rows,
//! default accounts, a running server) is up to the implementor.

/// Hooks a harness calls on the fixture it wraps.
///
/// Construction is the fixture's own setup: pass a factory to
/// [`Harness::setup_with`](crate::Harness::setup_with).
pub trait Fixture {
    /// Populate the usual baseline data. Called by [`Harness::init_basic`](crate::Harness::init_basic).
    fn init_basic(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Release whatever setup acquired. Called once, before the temp dir is removed.
    fn tear_down(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// No fixture.
impl Fixture for () {}

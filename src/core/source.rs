//! Producers of observation batches

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use crate::core::beacon::RangingSender;

/// Something that delivers ranging events to the engine until cancelled or exhausted
#[async_trait::async_trait]
pub trait ObservationSource {
    /// Pushes events through `sender`. Sends a final `Stopped` event on a clean exit.
    async fn run(&mut self, sender: RangingSender, cancel_token: CancellationToken) -> Result<()>;
}

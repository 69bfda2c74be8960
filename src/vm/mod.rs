use async_trait::async_trait;

use crate::errors::PilotResult;

pub mod hyperv;

/// Lifecycle control of the VM behind the remote session.
#[async_trait(?Send)]
pub trait VmControl {
    async fn restore_snapshot(&mut self, name: &str) -> PilotResult<()>;
}

// Hyper-V control through PowerShell cmdlets.
use async_trait::async_trait;
use tokio::process::Command;

use crate::errors::{PilotError, PilotResult};
use crate::vm::VmControl;

pub struct HyperV {
    vm_name: String,
}

/// Quote for a PowerShell single-quoted literal, where only `'` is special.
fn ps_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

async fn powershell(script: &str, label: &str) -> PilotResult<String> {
    let output = Command::new("powershell")
        .args(["-NoProfile", "-NonInteractive", "-Command", script])
        .output()
        .await
        .map_err(|e| PilotError::Vm(format!("{label}: powershell failed to start: {e}")))?;

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    if output.status.success() {
        return Ok(stdout);
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    let detail = if stderr.trim().is_empty() {
        stdout.trim().to_string()
    } else {
        stderr.trim().to_string()
    };
    Err(PilotError::Vm(format!(
        "{label} failed (exit={}): {detail}",
        output.status.code().unwrap_or(-1)
    )))
}

impl HyperV {
    /// Verify the VM exists. Failure here stops startup.
    pub async fn connect(vm_name: &str) -> PilotResult<Self> {
        let script = format!("Get-VM -Name {} | Select-Object -ExpandProperty State", ps_quote(vm_name));
        let state = powershell(&script, "Get-VM").await?;
        tracing::info!(vm = vm_name, state = state.trim(), "connected to VM");
        Ok(Self {
            vm_name: vm_name.to_string(),
        })
    }
}

#[async_trait(?Send)]
impl VmControl for HyperV {
    async fn restore_snapshot(&mut self, name: &str) -> PilotResult<()> {
        let script = format!(
            "Restore-VMSnapshot -VMName {} -Name {} -Confirm:$false",
            ps_quote(&self.vm_name),
            ps_quote(name)
        );
        powershell(&script, "Restore-VMSnapshot").await?;
        tracing::info!(vm = %self.vm_name, snapshot = name, "snapshot restored");
        Ok(())
    }
}

use std::process::{Command, Output};
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info, warn};
use nix::unistd::Uid;

use crate::bundle::{PersistableBundle, PersistableValue};
use crate::carrier::{
    CarrierConfigError, CarrierConfigResult, CarrierConfigService, SubscriptionId,
};
use crate::delegation::{DelegationError, DelegationResult, IdentityDelegate};

const AID_ROOT: u32 = 0;
const AID_SHELL: u32 = 2000;

/// Outcome of probing the delegation broker, for status reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelegateStatus {
    /// Shell reachable and running with a delegable identity.
    Granted,
    /// Shell reachable but not running as shell/root.
    NotGranted,
    /// No device shell reachable at all.
    Stopped,
}

/// Drives an attached device's shell through the `adb` binary, optionally
/// pinned to a device serial. Implements both the delegation capability
/// and the carrier config service by invoking the platform's
/// `cmd phone cc` tool.
///
/// The delegation session is process-global and non-reentrant, tracked
/// with an atomic flag.
pub struct AdbShell {
    serial: Option<String>,
    delegated: AtomicBool,
}

impl AdbShell {
    pub fn new(serial: Option<String>) -> Self {
        AdbShell {
            serial,
            delegated: AtomicBool::new(false),
        }
    }

    fn run_shell(&self, args: &[&str]) -> std::io::Result<Output> {
        let mut cmd = Command::new("adb");
        if let Some(serial) = &self.serial {
            cmd.arg("-s").arg(serial);
        }
        cmd.arg("shell");
        cmd.args(args);
        debug!("running {cmd:?}");
        cmd.output()
    }

    fn shell_uid(&self) -> DelegationResult<u32> {
        let output = self
            .run_shell(&["id", "-u"])
            .map_err(DelegationError::BrokerUnreachable)?;
        if !output.status.success() {
            return Err(DelegationError::StartFailed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        stdout
            .trim()
            .parse()
            .map_err(|_| DelegationError::StartFailed(format!("unexpected id output: {stdout}")))
    }

    pub fn delegate_status(&self) -> DelegateStatus {
        match self.shell_uid() {
            Ok(AID_ROOT | AID_SHELL) => DelegateStatus::Granted,
            Ok(_) => DelegateStatus::NotGranted,
            Err(_) => DelegateStatus::Stopped,
        }
    }

    fn run_cc(&self, args: &[&str]) -> CarrierConfigResult<String> {
        let output = self
            .run_shell(args)
            .map_err(CarrierConfigError::ServiceUnreachable)?;
        if !output.status.success() {
            return Err(CarrierConfigError::CommandRejected {
                command: args.join(" "),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl IdentityDelegate for AdbShell {
    fn start_delegate(&self, uid: Uid) -> DelegationResult<()> {
        if self
            .delegated
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(DelegationError::AlreadyHeld);
        }
        match self.shell_uid() {
            Ok(shell_uid @ (AID_ROOT | AID_SHELL)) => {
                info!("delegating shell identity (uid {shell_uid}) to uid {uid}");
                Ok(())
            }
            Ok(other) => {
                self.delegated.store(false, Ordering::SeqCst);
                Err(DelegationError::StartFailed(format!(
                    "device shell runs as uid {other}, refusing to delegate"
                )))
            }
            Err(err) => {
                self.delegated.store(false, Ordering::SeqCst);
                Err(err)
            }
        }
    }

    fn stop_delegate(&self) {
        if self.delegated.swap(false, Ordering::SeqCst) {
            info!("released delegated shell identity");
        } else {
            warn!("stop_delegate called with no delegation held");
        }
    }
}

impl CarrierConfigService for AdbShell {
    fn override_config(
        &self,
        sub_id: SubscriptionId,
        overrides: Option<&PersistableBundle>,
        persist: bool,
    ) -> CarrierConfigResult<()> {
        let sub = sub_id.to_string();
        match overrides {
            Some(bundle) => {
                for (key, value) in bundle.iter() {
                    let rendered = render_value(key, value)?;
                    let mut args: Vec<&str> =
                        vec!["cmd", "phone", "cc", "set-value", "-s", sub.as_str()];
                    if persist {
                        args.push("-p");
                    }
                    args.push(key);
                    args.push(&rendered);
                    self.run_cc(&args)?;
                }
            }
            None => {
                self.run_cc(&["cmd", "phone", "cc", "clear-values", "-s", sub.as_str()])?;
            }
        }
        Ok(())
    }

    fn query_config(&self, sub_id: SubscriptionId, key: &str) -> CarrierConfigResult<String> {
        let sub = sub_id.to_string();
        self.run_cc(&["cmd", "phone", "cc", "get-value", "-s", sub.as_str(), key])
    }
}

// `cmd phone cc set-value` takes a single textual value; primitive arrays
// are comma-joined, nested bundles have no rendering at all.
fn render_value(key: &str, value: &PersistableValue) -> CarrierConfigResult<String> {
    let rendered = match value {
        PersistableValue::Bool(v) => v.to_string(),
        PersistableValue::Int(v) => v.to_string(),
        PersistableValue::Long(v) => v.to_string(),
        PersistableValue::Double(v) => v.to_string(),
        PersistableValue::String(v) => v.clone(),
        PersistableValue::BoolArray(vs) => join(vs),
        PersistableValue::IntArray(vs) => join(vs),
        PersistableValue::LongArray(vs) => join(vs),
        PersistableValue::DoubleArray(vs) => join(vs),
        PersistableValue::StringArray(vs) => vs.join(","),
        PersistableValue::Bundle(_) => {
            return Err(CarrierConfigError::UnsupportedOverride {
                key: key.to_string(),
                type_name: "PersistableBundle",
            });
        }
    };
    Ok(rendered)
}

fn join<T: ToString>(values: &[T]) -> String {
    values
        .iter()
        .map(T::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

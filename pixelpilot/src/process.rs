//! Process lookup and control for the automation target.

use std::path::Path;

use sysinfo::{ProcessesToUpdate, System};
use tracing::{info, warn};

use crate::errors::AutomationError;

/// All pids whose process name matches `name`, case-insensitively.
pub fn pids_by_name(name: &str) -> Vec<u32> {
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::All, true);

    let needle = name.to_lowercase();
    let mut pids: Vec<u32> = system
        .processes()
        .iter()
        .filter(|(_, process)| {
            process
                .name()
                .to_string_lossy()
                .to_lowercase()
                .eq(&needle)
        })
        .map(|(pid, _)| pid.as_u32())
        .collect();
    pids.sort_unstable();
    pids
}

pub fn is_running(name: &str) -> bool {
    !pids_by_name(name).is_empty()
}

/// Launch the target executable detached; stdout/stderr are discarded.
pub fn launch(exe_path: &Path) -> Result<(), AutomationError> {
    if !exe_path.exists() {
        return Err(AutomationError::ConfigError(format!(
            "executable not found: {}",
            exe_path.display()
        )));
    }
    std::process::Command::new(exe_path)
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
        .map_err(|e| {
            AutomationError::PlatformError(format!("Failed to launch {}: {e}", exe_path.display()))
        })?;
    info!("launched {}", exe_path.display());
    Ok(())
}

/// Kill every process matching `name`. Returns the number of processes
/// signalled; failures on individual processes are logged, not fatal.
pub fn kill_all(name: &str) -> usize {
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::All, true);

    let needle = name.to_lowercase();
    let mut killed = 0;
    for (pid, process) in system.processes() {
        let process_name = process.name().to_string_lossy().to_lowercase();
        if process_name != needle {
            continue;
        }
        if process.kill() {
            killed += 1;
        } else {
            warn!("failed to kill {} (pid {})", process_name, pid.as_u32());
        }
    }
    if killed > 0 {
        info!("killed {killed} process(es) named {name}");
    }
    killed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_process_has_no_pids() {
        assert!(pids_by_name("pixelpilot-no-such-process.exe").is_empty());
        assert!(!is_running("pixelpilot-no-such-process.exe"));
    }

    #[test]
    fn launch_missing_executable_is_config_error() {
        let err = launch(Path::new("/nonexistent/app.exe")).unwrap_err();
        assert!(matches!(err, AutomationError::ConfigError(_)));
    }
}

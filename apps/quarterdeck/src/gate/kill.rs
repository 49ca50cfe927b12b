/// Emergency-stop sub-flow. Reachable from any gate state; confirming it
/// is the one transition allowed to interrupt an executing command.
use quarterdeck_proto::ProcessInfo;
use tracing::warn;

#[derive(Debug, Default)]
enum KillFlow {
    #[default]
    Idle,
    AwaitingProcesses,
    /// Snapshot held only for the confirmation render.
    AwaitingConfirm(Vec<ProcessInfo>),
}

#[derive(Debug, Default)]
pub struct EmergencyKill {
    flow: KillFlow,
}

impl EmergencyKill {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        !matches!(self.flow, KillFlow::Idle)
    }

    /// Start the flow. Returns `false` when one is already underway.
    pub fn begin(&mut self) -> bool {
        if self.is_active() {
            return false;
        }
        warn!("emergency kill requested");
        self.flow = KillFlow::AwaitingProcesses;
        true
    }

    /// Process snapshot arrived. Returns the list to render, or `None` for
    /// a stray snapshot nobody asked for.
    pub fn on_process_list(&mut self, processes: Vec<ProcessInfo>) -> Option<Vec<ProcessInfo>> {
        match self.flow {
            KillFlow::AwaitingProcesses => {
                self.flow = KillFlow::AwaitingConfirm(processes.clone());
                Some(processes)
            }
            _ => None,
        }
    }

    /// User confirmed. Returns `true` when a kill-all should be sent.
    pub fn confirm(&mut self) -> bool {
        match std::mem::take(&mut self.flow) {
            KillFlow::AwaitingConfirm(processes) => {
                warn!(count = processes.len(), "kill-all confirmed");
                true
            }
            other => {
                self.flow = other;
                false
            }
        }
    }

    pub fn abort(&mut self) {
        self.flow = KillFlow::Idle;
    }

    pub fn reset(&mut self) {
        self.flow = KillFlow::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn procs() -> Vec<ProcessInfo> {
        vec![ProcessInfo {
            pid: 42,
            command: "sleep 600".to_string(),
        }]
    }

    #[test]
    fn full_flow_snapshots_then_confirms() {
        let mut kill = EmergencyKill::new();
        assert!(kill.begin());
        let snapshot = kill.on_process_list(procs()).unwrap();
        assert_eq!(snapshot.len(), 1);
        assert!(kill.confirm());
        assert!(!kill.is_active());
    }

    #[test]
    fn begin_is_not_reentrant() {
        let mut kill = EmergencyKill::new();
        assert!(kill.begin());
        assert!(!kill.begin());
    }

    #[test]
    fn stray_process_list_is_ignored() {
        let mut kill = EmergencyKill::new();
        assert!(kill.on_process_list(procs()).is_none());
    }

    #[test]
    fn confirm_without_snapshot_does_nothing() {
        let mut kill = EmergencyKill::new();
        kill.begin();
        assert!(!kill.confirm());
        // Still waiting for the snapshot.
        assert!(kill.is_active());
    }

    #[test]
    fn abort_returns_to_idle() {
        let mut kill = EmergencyKill::new();
        kill.begin();
        kill.on_process_list(procs());
        kill.abort();
        assert!(!kill.is_active());
        assert!(!kill.confirm());
    }
}

//! In-memory stand-ins for the process table and the supervisor launcher.
use std::{
    collections::{BTreeMap, HashSet},
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicBool, AtomicU32, Ordering},
    },
};

use nix::{errno::Errno, sys::signal::Signal};

use crate::{
    control::SupervisorLauncher,
    error::ControlError,
    process::{ProcessLocator, ProcessPattern, ProcessSnapshot, Signaller},
};

#[derive(Debug, Default)]
struct FakeTable {
    processes: BTreeMap<u32, Vec<String>>,
    stubborn: HashSet<u32>,
    signals: Vec<(u32, Signal)>,
}

/// Process table whose contents are set by the test.
///
/// SIGTERM removes a process unless it was marked stubborn; SIGKILL always does.
/// Clones share the same table.
#[derive(Debug, Clone, Default)]
pub struct FakeProcessTable {
    inner: Arc<Mutex<FakeTable>>,
}

impl FakeProcessTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FakeTable> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Adds a live process.
    pub fn spawn(&self, pid: u32, argv: Vec<String>) {
        self.lock().processes.insert(pid, argv);
    }

    /// Removes a process without recording a signal, as if it crashed.
    pub fn exit(&self, pid: u32) {
        self.lock().processes.remove(&pid);
    }

    /// Makes `pid` ignore SIGTERM.
    pub fn make_stubborn(&self, pid: u32) {
        self.lock().stubborn.insert(pid);
    }

    /// Every signal delivered so far, in order.
    pub fn signals(&self) -> Vec<(u32, Signal)> {
        self.lock().signals.clone()
    }
}

impl ProcessLocator for FakeProcessTable {
    fn find_by_pattern(&self, pattern: &ProcessPattern) -> Vec<u32> {
        self.lock()
            .processes
            .iter()
            .filter(|(_, argv)| pattern.matches(argv))
            .map(|(pid, _)| *pid)
            .collect()
    }

    fn is_alive(&self, pid: u32) -> bool {
        self.lock().processes.contains_key(&pid)
    }

    fn inspect(&self, pid: u32) -> Option<ProcessSnapshot> {
        self.lock().processes.get(&pid).map(|argv| ProcessSnapshot {
            pid,
            elapsed_secs: 90,
            start_time: 1_700_000_000,
            command: argv.join(" "),
        })
    }
}

impl Signaller for FakeProcessTable {
    fn signal(&self, pid: u32, signal: Signal) -> Result<(), Errno> {
        let mut table = self.lock();
        table.signals.push((pid, signal));
        let terminates = match signal {
            Signal::SIGKILL => true,
            Signal::SIGTERM | Signal::SIGINT => !table.stubborn.contains(&pid),
            _ => false,
        };
        if terminates {
            table.processes.remove(&pid);
        }
        Ok(())
    }
}

/// Launcher that registers each "supervisor" in a [`FakeProcessTable`].
#[derive(Debug, Clone)]
pub struct FakeLauncher {
    table: FakeProcessTable,
    argv: Vec<String>,
    next_pid: Arc<AtomicU32>,
    launches: Arc<AtomicU32>,
    die_on_launch: Arc<AtomicBool>,
}

impl FakeLauncher {
    pub fn new(table: FakeProcessTable, argv: Vec<String>) -> Self {
        Self {
            table,
            argv,
            next_pid: Arc::new(AtomicU32::new(3000)),
            launches: Arc::new(AtomicU32::new(0)),
            die_on_launch: Arc::new(AtomicBool::new(false)),
        }
    }

    /// When set, launched supervisors never appear in the process table.
    pub fn die_on_launch(&self, die: bool) {
        self.die_on_launch.store(die, Ordering::SeqCst);
    }

    pub fn launches(&self) -> u32 {
        self.launches.load(Ordering::SeqCst)
    }
}

impl SupervisorLauncher for FakeLauncher {
    fn launch(&self) -> Result<u32, ControlError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        let pid = self.next_pid.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.die_on_launch.load(Ordering::SeqCst) {
            self.table.spawn(pid, self.argv.clone());
        }
        Ok(pid)
    }
}

use serde::Serialize;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use wsbridge_common::config::{BridgeConfig, GcMode, WorkerLayout};
use wsbridge_common::host::Host;
use wsbridge_common::protocol::{BridgeError, InstanceId, Result, SlotId, SlotRef, WorkerId};

use crate::runtime::async_engine::AsyncState;
use crate::runtime::interpreter::Interpreter;

/// One execution slot: an interpreter (possibly shared with the other
/// cooperative slots of its thread) plus the slot's async state.
pub struct Slot {
    id: SlotRef,
    instance: Rc<RefCell<Interpreter>>,
    pub(crate) state: AsyncState,
    requests: u64,
    gc_runs: u64,
}

impl Slot {
    pub fn id(&self) -> SlotRef {
        self.id
    }

    pub fn instance(&self) -> &Rc<RefCell<Interpreter>> {
        &self.instance
    }

    pub fn state(&self) -> &AsyncState {
        &self.state
    }

    pub fn is_suspended(&self) -> bool {
        self.state.is_suspended()
    }

    /// Completed request cycles on this slot.
    pub fn requests(&self) -> u64 {
        self.requests
    }

    /// Collections triggered by cycles completed on this slot.
    pub fn gc_runs(&self) -> u64 {
        self.gc_runs
    }
}

struct WorkerSlots {
    slots: Vec<Slot>,
    requests: u64,
}

/// Snapshot of one slot, for logs and the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotStats {
    pub slot: SlotRef,
    pub instance: InstanceId,
    pub requests: u64,
    pub gc_runs: u64,
    pub state: String,
}

/// Table of interpreter instances indexed by `[worker, slot]`.
///
/// Each worker gets `threads` instances. With a single thread the worker's
/// `cores` cooperative slots share one instance; with several threads every
/// thread is one slot with its own instance. The pool lives on the thread
/// that drives it and is handed to the [`crate::Dispatcher`].
pub struct SlotPool {
    config: BridgeConfig,
    layout: WorkerLayout,
    host: Rc<dyn Host>,
    workers: BTreeMap<WorkerId, WorkerSlots>,
}

impl SlotPool {
    /// Create an empty pool; no instance exists until a worker is initialized.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::Config` if the layout is invalid.
    pub fn new(config: BridgeConfig, layout: WorkerLayout, host: Rc<dyn Host>) -> Result<Self> {
        layout.validate().map_err(BridgeError::Config)?;
        Ok(Self {
            config,
            layout,
            host,
            workers: BTreeMap::new(),
        })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn layout(&self) -> &WorkerLayout {
        &self.layout
    }

    pub fn host(&self) -> &Rc<dyn Host> {
        &self.host
    }

    /// Build every instance of `worker`.
    ///
    /// Each instance gets the bindings, loads the preload files and the
    /// application, records its cooperative slots in `wsbridge.cores` and
    /// ends with a full collection. Load errors are logged and leave the
    /// instance on the stub entry point. Initializing a worker twice is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if `worker` is outside `1..=workers` or an instance
    /// cannot be created.
    pub fn initialize_worker(&mut self, worker: WorkerId) -> Result<()> {
        if worker == 0 || worker > self.layout.workers {
            return Err(BridgeError::Config(format!(
                "worker {} is outside 1..={}",
                worker, self.layout.workers
            )));
        }
        if self.workers.contains_key(&worker) {
            tracing::debug!("worker {} already initialized", worker);
            return Ok(());
        }

        let threads = self.layout.threads;
        let cores = self.layout.cores_per_instance();
        let mut slots = Vec::with_capacity(usize::from(self.layout.slots_per_worker()));

        for thread in 0..threads {
            let base: SlotId = thread * cores;
            let owner = SlotRef::new(worker, base);
            let sid = u32::from(worker - 1) * u32::from(threads) + u32::from(thread);

            let mut interpreter = Interpreter::new(owner, sid, self.host.clone())?;
            interpreter.load(&self.config);
            if cores > 1 {
                let extra: Vec<(u16, SlotId)> = (1..cores).map(|i| (i, base + i)).collect();
                interpreter.record_cores(&extra)?;
            }
            interpreter.collect_garbage(GcMode::Full);
            tracing::info!(
                "initialized instance {} (sid {}) for worker {} with {} slot(s)",
                interpreter.id(),
                sid,
                worker,
                cores
            );

            let instance = Rc::new(RefCell::new(interpreter));
            for core in 0..cores {
                slots.push(Slot {
                    id: SlotRef::new(worker, base + core),
                    instance: instance.clone(),
                    state: AsyncState::Idle,
                    requests: 0,
                    gc_runs: 0,
                });
            }
        }

        self.workers.insert(worker, WorkerSlots { slots, requests: 0 });
        Ok(())
    }

    /// Initialize every worker up front.
    pub fn initialize_all(&mut self) -> Result<()> {
        for worker in 1..=self.layout.workers {
            self.initialize_worker(worker)?;
        }
        Ok(())
    }

    pub fn is_initialized(&self, worker: WorkerId) -> bool {
        self.workers.contains_key(&worker)
    }

    pub fn slot(&self, slot: SlotRef) -> Option<&Slot> {
        self.workers
            .get(&slot.worker)?
            .slots
            .get(usize::from(slot.slot))
    }

    pub fn slot_mut(&mut self, slot: SlotRef) -> Option<&mut Slot> {
        self.workers
            .get_mut(&slot.worker)?
            .slots
            .get_mut(usize::from(slot.slot))
    }

    /// The instance serving `slot`.
    pub fn instance(&self, slot: SlotRef) -> Option<Rc<RefCell<Interpreter>>> {
        self.slot(slot).map(|s| s.instance.clone())
    }

    /// Drop whatever continuation `slot` holds and return it to `Idle`.
    pub fn recycle(&mut self, slot: SlotRef) -> Result<()> {
        let cell = self.slot_mut(slot).ok_or(BridgeError::UnknownSlot(slot))?;
        if cell.is_suspended() {
            tracing::debug!("slot {}: dropping pending continuation", slot);
        }
        cell.state = AsyncState::Idle;
        Ok(())
    }

    /// Completed cycles of `worker` across all its slots.
    pub fn worker_requests(&self, worker: WorkerId) -> Option<u64> {
        self.workers.get(&worker).map(|w| w.requests)
    }

    /// Records a completed cycle and returns the count the collection policy
    /// looks at: per worker with a single thread, per slot otherwise.
    pub(crate) fn complete_cycle(&mut self, slot: SlotRef) -> u64 {
        let per_worker = self.layout.threads == 1;
        let Some(worker) = self.workers.get_mut(&slot.worker) else {
            return 0;
        };
        worker.requests += 1;
        let worker_count = worker.requests;
        let Some(cell) = worker.slots.get_mut(usize::from(slot.slot)) else {
            return worker_count;
        };
        cell.requests += 1;
        if per_worker {
            worker_count
        } else {
            cell.requests
        }
    }

    pub(crate) fn record_gc(&mut self, slot: SlotRef) {
        if let Some(cell) = self.slot_mut(slot) {
            cell.gc_runs += 1;
        }
    }

    pub fn stats(&self) -> Vec<SlotStats> {
        self.workers
            .values()
            .flat_map(|w| w.slots.iter())
            .map(|s| SlotStats {
                slot: s.id,
                instance: s.instance.borrow().id(),
                requests: s.requests,
                gc_runs: s.gc_runs,
                state: s.state.to_string(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;
    use wsbridge_common::host::MemoryHost;

    fn create_test_script(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn pool(config: BridgeConfig, layout: WorkerLayout) -> SlotPool {
        SlotPool::new(config, layout, Rc::new(MemoryHost::new())).unwrap()
    }

    fn read_global(pool: &SlotPool, slot: SlotRef, src: &str) -> String {
        let instance = pool.instance(slot).unwrap();
        let mut interp = instance.borrow_mut();
        let value = interp.eval(src).unwrap();
        interp.display(&value)
    }

    #[test]
    fn test_invalid_layout_rejected() {
        let layout = WorkerLayout { workers: 1, threads: 0, cores: 2, async_enabled: false };
        let result = SlotPool::new(BridgeConfig::new(), layout, Rc::new(MemoryHost::new()));
        assert!(matches!(result, Err(BridgeError::Config(_))));
    }

    #[test]
    fn test_threads_override_cores() {
        let script = create_test_script("(function(env) { return '200 OK'; })");
        let layout = WorkerLayout { workers: 1, threads: 2, cores: 4, async_enabled: false };
        let mut pool = pool(BridgeConfig::new().with_app(script.path()), layout);
        pool.initialize_all().unwrap();

        assert_eq!(pool.stats().len(), 2);
        assert!(pool.slot(SlotRef::new(1, 1)).is_some());
        assert!(pool.slot(SlotRef::new(1, 2)).is_none());
    }

    #[test]
    fn test_threaded_workers_get_one_instance_per_thread() {
        let script = create_test_script("(function(env) { return '200 OK'; })");
        let layout = WorkerLayout { workers: 2, threads: 3, cores: 1, async_enabled: false };
        let mut pool = pool(BridgeConfig::new().with_app(script.path()), layout);
        pool.initialize_all().unwrap();

        let stats = pool.stats();
        assert_eq!(stats.len(), 6);
        let mut instances: Vec<_> = stats.iter().map(|s| s.instance).collect();
        instances.sort();
        instances.dedup();
        assert_eq!(instances.len(), 6);

        assert_eq!(read_global(&pool, SlotRef::new(2, 1), "wsbridge.mywid"), "2");
        assert_eq!(read_global(&pool, SlotRef::new(2, 1), "wsbridge.mysid"), "4");
        assert_eq!(read_global(&pool, SlotRef::new(1, 0), "wsbridge.mysid"), "0");
    }

    #[test]
    fn test_cooperative_slots_share_instance() {
        let layout = WorkerLayout { workers: 1, threads: 1, cores: 3, async_enabled: true };
        let mut pool = pool(BridgeConfig::new(), layout);
        pool.initialize_worker(1).unwrap();

        let a = pool.instance(SlotRef::new(1, 0)).unwrap();
        let c = pool.instance(SlotRef::new(1, 2)).unwrap();
        assert!(Rc::ptr_eq(&a, &c));
        assert!(pool.slot(SlotRef::new(1, 3)).is_none());
        assert_eq!(read_global(&pool, SlotRef::new(1, 0), "wsbridge.cores[2]"), "2");
        assert_eq!(read_global(&pool, SlotRef::new(1, 0), "wsbridge.cores[0]"), "undefined");
    }

    #[test]
    fn test_lazy_worker_initialization() {
        let layout = WorkerLayout { workers: 2, threads: 1, cores: 1, async_enabled: false };
        let mut pool = pool(BridgeConfig::new(), layout);
        pool.initialize_worker(2).unwrap();
        assert!(!pool.is_initialized(1));
        assert!(pool.is_initialized(2));
        assert!(pool.slot(SlotRef::new(1, 0)).is_none());
        assert!(pool.initialize_worker(3).is_err());

        let before = pool.instance(SlotRef::new(2, 0)).unwrap().borrow().id();
        pool.initialize_worker(2).unwrap();
        let after = pool.instance(SlotRef::new(2, 0)).unwrap().borrow().id();
        assert_eq!(before, after);
    }

    #[test]
    fn test_missing_application_falls_back_to_stub() {
        let mut pool = pool(
            BridgeConfig::new().with_app("/nonexistent/app.js"),
            WorkerLayout::default(),
        );
        pool.initialize_all().unwrap();
        let instance = pool.instance(SlotRef::new(1, 0)).unwrap();
        assert!(instance.borrow().entry_point().is_stub());
    }

    #[test]
    fn test_stats_serialize() {
        let mut pool = pool(BridgeConfig::new(), WorkerLayout::default());
        pool.initialize_all().unwrap();
        let json = serde_json::to_value(pool.stats()).unwrap();
        assert_eq!(json[0]["slot"]["worker"], 1);
        assert_eq!(json[0]["requests"], 0);
        assert_eq!(json[0]["state"], "idle");
    }

    #[test]
    fn test_recycle_unknown_slot() {
        let mut pool = pool(BridgeConfig::new(), WorkerLayout::default());
        assert!(matches!(
            pool.recycle(SlotRef::new(1, 0)),
            Err(BridgeError::UnknownSlot(_))
        ));
        pool.initialize_all().unwrap();
        assert!(pool.recycle(SlotRef::new(1, 0)).is_ok());
    }
}

pub mod config;
pub mod history;
pub mod timer;
pub mod worker;

use std::time::Duration;

use pomoloop_core::process::{PidProbe, WorkerLauncher};
use pomoloop_core::timer::unix_now;
use pomoloop_core::time_fmt::format_mmss;
use pomoloop_core::{Config, IntervalStore, Paths, StoreError, WorkerManager};

use crate::output::Output;

pub type CommandResult = Result<(), Box<dyn std::error::Error>>;

/// Extra wait on top of one worker poll before a live worker is trusted to
/// serve a freshly started interval.
const SETTLE_MARGIN: Duration = Duration::from_millis(500);

/// Everything a command needs: resolved paths, loaded config and the output
/// mode.
pub struct Context {
    pub paths: Paths,
    pub config: Config,
    pub out: Output,
}

impl Context {
    pub fn new(paths: Paths, out: Output) -> Self {
        let config = Config::load_or_default(&paths.config_path);
        Self { paths, config, out }
    }

    pub fn open_store(&self) -> Result<IntervalStore, StoreError> {
        IntervalStore::open(&self.paths.db_path, self.config.busy_timeout())
    }

    pub fn workers(&self) -> std::io::Result<WorkerManager<PidProbe, WorkerLauncher>> {
        WorkerManager::for_paths(&self.paths, self.config.poll_interval() + SETTLE_MARGIN)
    }

    /// Open the store and interrupt a running interval whose worker died.
    pub fn open_reconciled(&self) -> Result<IntervalStore, StoreError> {
        let store = self.open_store()?;
        match self.workers() {
            Ok(workers) => {
                if let Some(recovered) = workers.reconcile(&store, unix_now())? {
                    self.out.notice(&format!(
                        "Timer worker was not running; interval interrupted at {} worked.",
                        format_mmss(recovered.worked_sec)
                    ));
                }
            }
            Err(e) => tracing::warn!(error = %e, "Cannot locate worker executable, skipping recovery"),
        }
        Ok(store)
    }
}

//! CM HAL Backend Service
//!
//! Drives the command-buffer core end to end on the host:
//! 1. Loads the device configuration (TOML path as first argument)
//! 2. Creates the software submission backend and the sync tracker
//! 3. Builds and submits a demo workload through the command sequencer
//! 4. Executes submitted streams on the software command streamer
//! 5. Polls task completion and reports GPU timestamps

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use cmhal_backend::{
    CommandSequencer, CommandStreamer, Config, DependencyPattern, DispatchMode,
    KernelDispatchDescriptor, LinearStateHeap, SoftwareBackend, SubmittedBuffer, SyncTracker,
    TaskParams,
};

/// Bytes reserved for the dynamic state heap of the demo workload.
const STATE_HEAP_SIZE: usize = 64 * 1024;
const CURBE_SIZE: u32 = 16 * 1024;
/// Curbe bytes requested by each demo task.
const TASK_CURBE_SIZE: u32 = 256;

/// Backend service state
struct BackendService {
    config: Config,
    sequencer: Option<CommandSequencer<SoftwareBackend, LinearStateHeap>>,
    streamer_handle: Option<JoinHandle<u64>>,
    shutdown: Arc<AtomicBool>,
}

impl BackendService {
    fn new(config: Config) -> Self {
        Self {
            config,
            sequencer: None,
            streamer_handle: None,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Create the backend, sync tracker and sequencer, and start the streamer
    fn init_device(&mut self) -> Result<()> {
        let seq_config = self.config.sequencer_config()?;
        info!(
            "Initializing device context: platform={:?}, l3_plane={}, features={:?}",
            seq_config.platform, seq_config.l3_plane, seq_config.features
        );

        let (tx, rx) = mpsc::unbounded_channel();
        let mut backend = SoftwareBackend::new(self.config.command_pool_size).with_sink(tx);

        let tracker = Arc::new(SyncTracker::new(
            backend.resources_mut(),
            seq_config.platform,
            self.config.task_slots,
            self.config.batching,
        ));
        let (_, state_heap) = backend.resources_mut().create("state-heap", STATE_HEAP_SIZE);
        let heap = LinearStateHeap::new(
            state_heap.gpu_address(),
            STATE_HEAP_SIZE as u32,
            self.config.demo_kernels.max(1),
            CURBE_SIZE,
        );

        let generation = seq_config.platform.generation();
        let sequencer = CommandSequencer::new(seq_config, backend, heap, tracker)?;
        self.sequencer = Some(sequencer);

        self.streamer_handle = Some(Self::start_streamer(
            rx,
            CommandStreamer::new(generation, self.config.ticks_per_command),
        ));

        info!(
            "Device context ready: {} sync slots, {} KB command pool",
            self.config.task_slots,
            self.config.command_pool_size / 1024
        );
        Ok(())
    }

    /// Start the command streamer on a blocking worker
    ///
    /// Executes every submitted stream in order until the backend drops
    /// its sender. Returns the number of streams executed.
    fn start_streamer(
        mut rx: mpsc::UnboundedReceiver<SubmittedBuffer>,
        mut streamer: CommandStreamer,
    ) -> JoinHandle<u64> {
        tokio::task::spawn_blocking(move || {
            info!("Command streamer started");
            let mut executed = 0u64;
            while let Some(submitted) = rx.blocking_recv() {
                match streamer.execute(&submitted) {
                    Ok(summary) => {
                        executed += 1;
                        debug!(
                            "Executed {:?}: {} commands, {} bytes, {} ticks{}",
                            submitted.handle,
                            summary.commands,
                            summary.bytes,
                            summary.elapsed_ticks,
                            if summary.ended_early { ", ended early" } else { "" }
                        );
                    }
                    Err(e) => {
                        error!("Command stream {:?} faulted: {}", submitted.handle, e);
                    }
                }
            }
            info!("Command streamer exiting after {} streams", executed);
            executed
        })
    }

    /// Kernels and options of the demo task number `n`
    fn demo_task(&self, n: u32) -> (Vec<KernelDispatchDescriptor>, TaskParams) {
        let config = &self.config;
        let kernels: Vec<_> = (0..config.demo_kernels.max(1))
            .map(|k| {
                let pattern = match k % 3 {
                    0 => DependencyPattern::None,
                    1 => DependencyPattern::Wavefront,
                    _ => DependencyPattern::HorizontalWave,
                };
                let mut kernel = KernelDispatchDescriptor::raster(
                    &format!("demo_{}_{}", n, k),
                    k,
                    config.thread_space_width,
                    config.thread_space_height,
                )
                .with_pattern(pattern);
                kernel.indirect_data_length = 64;
                kernel
            })
            .collect();

        let params = TaskParams {
            mode: if n % 4 == 3 {
                DispatchMode::Gpgpu
            } else {
                DispatchMode::MediaWalker
            },
            // Every other kernel waits for its predecessor.
            sync_bitmap: 0x5555_5555_5555_5555,
            curbe_size: TASK_CURBE_SIZE,
            max_threads: config.max_threads,
            null_hw: config.null_hw,
            ..TaskParams::default()
        };
        (kernels, params)
    }

    /// Main processing loop
    async fn run_loop(&mut self) -> Result<()> {
        info!("Entering main processing loop...");
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        let timeout = Duration::from_millis(self.config.task_timeout_ms);
        let mut n = 0u32;

        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                info!("Shutdown requested");
                break;
            }
            if self.config.demo_tasks != 0 && n >= self.config.demo_tasks {
                info!("Demo workload finished: {} tasks", n);
                break;
            }

            let task_id = n % self.config.task_slots;
            let (kernels, params) = self.demo_task(n);
            let sequencer = self
                .sequencer
                .as_mut()
                .ok_or_else(|| anyhow::anyhow!("Sequencer not initialized"))?;

            sequencer.heap_mut().reset();
            let receipt = sequencer
                .submit_task(task_id, &kernels, &params)
                .with_context(|| format!("submitting task {}", n))?;
            debug!(
                "Submitted task {} on slot {}: {} bytes, sync tag {}",
                n, receipt.task_id, receipt.length, receipt.sync_tag
            );

            if receipt.null_hw {
                n += 1;
                continue;
            }

            let started = Instant::now();
            loop {
                if sequencer.poll_task_complete(task_id)? {
                    break;
                }
                if started.elapsed() > timeout {
                    return Err(anyhow::anyhow!(
                        "task {} did not complete within {:?}",
                        n,
                        timeout
                    ));
                }
                if self.shutdown.load(Ordering::Relaxed) {
                    warn!("Shutdown while task {} is in flight", n);
                    return Ok(());
                }
                tokio::time::sleep(poll_interval).await;
            }

            match sequencer.tracker().task_timestamps(task_id)? {
                Some(ts) => info!(
                    "Task {} complete: {} ticks -> {} ticks ({} ns)",
                    n, ts.submit_ticks, ts.complete_ticks, ts.elapsed_ns
                ),
                None => warn!("Task {} complete without timestamps", n),
            }

            let retired = sequencer.retire_completed();
            debug!("Retired {} buffers, last sync tag {}", retired, sequencer.last_sync_tag());
            n += 1;
        }

        Ok(())
    }

    /// Request shutdown
    fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Drop the device context and wait for the streamer to drain
    async fn stop(&mut self) {
        if let Some(sequencer) = self.sequencer.take() {
            info!(
                "Submitted {} command buffers, {} still in flight",
                sequencer.backend().submit_count(),
                sequencer.in_flight()
            );
        }
        if let Some(handle) = self.streamer_handle.take() {
            if let Err(e) = handle.await {
                error!("Command streamer panicked: {}", e);
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .with_target(true)
        .init();

    info!("CM HAL Backend Service starting...");

    // Load or create default config
    let config = match std::env::args().nth(1) {
        Some(path) => Config::load(&path).with_context(|| format!("loading {}", path))?,
        None => Config::default(),
    };
    info!("Configuration loaded: {:?}", config);

    // Create service
    let mut service = BackendService::new(config);

    // Setup Ctrl+C handler
    let shutdown = service.shutdown.clone();
    ctrlc::set_handler(move || {
        info!("Ctrl+C received, shutting down...");
        shutdown.store(true, Ordering::Relaxed);
    })
    .context("Error setting Ctrl+C handler")?;

    service.init_device()?;

    info!("Backend service ready. Submitting tasks...");
    let result = service.run_loop().await;
    if let Err(e) = &result {
        error!("Processing loop failed: {:#}", e);
    }

    service.request_shutdown();
    service.stop().await;
    info!("Backend service shutting down");

    result
}

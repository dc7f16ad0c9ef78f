//! Render engine (spec §4.5): tile dispatch, per-worker pool, periodic
//! master-canvas aggregation, and sync/teardown.
//!
//! Grounded in `original_source/integrator.h`'s `RenderEngine`/`RenderThread`/
//! `RenderMessage` struct layout for the state machine (tile queue, a
//! completion semaphore waited on `semaphore_passes_pending` times,
//! `rebuild_master_canvas`), reinterpreted per spec §9's explicit guidance to
//! eliminate the original's back-pointer (`RenderThread::parent`) and replace
//! its pthread semaphore/mutex pair with channels. The per-worker message
//! queue and `Quit`-then-join teardown shape is read from
//! `other_examples/..._thread_pool_2.rs.rs`'s `Msg`/`SyncSender`/`Receiver`
//! pattern.

use crate::canvas::Canvas;
use crate::integrator::{Integrator, PassDescriptor, Scene};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

enum WorkerMessage {
    Pass(PassDescriptor),
    Terminate,
}

/// A non-owning handle the engine holds to a running worker (spec §9 "model
/// this as the engine owning the workers and handing each worker a
/// non-owning handle"). `is_running`/`currently_processing` are read by the
/// progress reporter without locking, per spec §3 "Worker state".
struct WorkerHandle {
    inbox: Sender<WorkerMessage>,
    join_handle: Option<JoinHandle<()>>,
    integrator: Arc<Mutex<Integrator>>,
    pub is_running: Arc<AtomicBool>,
    pub currently_processing: Arc<Mutex<Option<PassDescriptor>>>,
}

/// Tile queue, worker pool, and master-canvas aggregation (spec §3 "Render
/// engine state", §4.5). The scene is shared read-only across every worker
/// via `Arc`.
pub struct RenderEngine {
    pub width: usize,
    pub height: usize,
    scene: Arc<Scene>,
    workers: Vec<WorkerHandle>,
    pub tile_width: usize,
    pub tile_height: usize,
    total_passes_issued: AtomicU64,
    total_passes_completed: Arc<AtomicU64>,
    /// Count of completions already drained from `completion_rx` by `sync`
    /// (spec §4.5 "Sync"). Distinct from `total_passes_completed`, which
    /// workers bump the moment a pass finishes — by the time `sync` samples
    /// that counter some completions may already be sitting in the channel
    /// unconsumed, so waiting on `issued - total_passes_completed` would
    /// under-count and return before every outstanding pass is drained.
    /// `sync` instead tracks its own consumption against `passes_synced`.
    passes_synced: AtomicU64,
    completion_rx: Receiver<()>,
    completion_tx: Sender<()>,
    master_canvas: Mutex<Canvas>,
    next_worker: std::sync::atomic::AtomicUsize,
}

/// Falls back to 8 when the platform can't report hardware concurrency
/// (spec §5 "default 8 if unknown"), matching
/// `original_source/utils.cpp::get_optimal_thread_count`.
pub fn default_thread_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(8)
}

impl RenderEngine {
    pub fn new(width: usize, height: usize, scene: Arc<Scene>, thread_count: usize) -> Self {
        let thread_count = thread_count.max(1);
        let (completion_tx, completion_rx) = mpsc::channel();
        let total_passes_completed = Arc::new(AtomicU64::new(0));
        let mut workers = Vec::with_capacity(thread_count);
        for i in 0..thread_count {
            let (inbox_tx, inbox_rx) = mpsc::channel::<WorkerMessage>();
            let integrator = Arc::new(Mutex::new(Integrator::new(
                scene.clone(),
                width,
                height,
                worker_seed(i),
            )));
            let is_running = Arc::new(AtomicBool::new(false));
            let currently_processing = Arc::new(Mutex::new(None));

            let thread_integrator = integrator.clone();
            let thread_is_running = is_running.clone();
            let thread_currently_processing = currently_processing.clone();
            let thread_completion_tx = completion_tx.clone();
            let thread_completed = total_passes_completed.clone();
            let join_handle = std::thread::Builder::new()
                .name(format!("photon-worker-{i}"))
                .spawn(move || {
                    worker_main(
                        inbox_rx,
                        thread_integrator,
                        thread_is_running,
                        thread_currently_processing,
                        thread_completion_tx,
                        thread_completed,
                    )
                })
                .expect("failed to spawn render worker thread");

            workers.push(WorkerHandle {
                inbox: inbox_tx,
                join_handle: Some(join_handle),
                integrator,
                is_running,
                currently_processing,
            });
        }

        Self {
            width,
            height,
            scene,
            workers,
            tile_width: 64,
            tile_height: 64,
            total_passes_issued: AtomicU64::new(0),
            total_passes_completed,
            passes_synced: AtomicU64::new(0),
            completion_rx,
            completion_tx,
            master_canvas: Mutex::new(Canvas::new(width, height)),
            next_worker: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn scene(&self) -> &Arc<Scene> {
        &self.scene
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn total_passes_issued(&self) -> u64 {
        self.total_passes_issued.load(Ordering::SeqCst)
    }

    pub fn total_passes_completed(&self) -> u64 {
        self.total_passes_completed.load(Ordering::SeqCst)
    }

    /// True while any worker holds `is_running`; read without locking by the
    /// progress reporter (spec §3).
    pub fn any_worker_running(&self) -> bool {
        self.workers.iter().any(|w| w.is_running.load(Ordering::Relaxed))
    }

    /// The descriptors currently in flight, one slot per worker (`None` if
    /// that worker is idle) — consumed by the live-preview tile markers.
    pub fn currently_processing(&self) -> Vec<Option<PassDescriptor>> {
        self.workers
            .iter()
            .map(|w| *w.currently_processing.lock().expect("worker mutex poisoned"))
            .collect()
    }

    fn issue_pass(&self, desc: PassDescriptor) {
        let worker_idx = self.next_worker.fetch_add(1, Ordering::Relaxed) % self.workers.len();
        self.workers[worker_idx]
            .inbox
            .send(WorkerMessage::Pass(desc))
            .expect("worker inbox closed");
        self.total_passes_issued.fetch_add(1, Ordering::SeqCst);
    }

    /// Enumerates all tile origins covering the canvas at the configured
    /// tile stride, repeats each `pass_count` times, sorts the resulting list
    /// by squared distance from the canvas center (stable, so visually
    /// central tiles render first), and dispatches each as a pass descriptor
    /// via round-robin (spec §4.5 "Dispatch").
    pub fn perform_full_passes(&self, pass_count: u32) {
        let cx = self.width as f64 / 2.0;
        let cy = self.height as f64 / 2.0;

        let mut origins = Vec::new();
        let mut y = 0usize;
        while y < self.height {
            let mut x = 0usize;
            while x < self.width {
                origins.push((x, y));
                x += self.tile_width;
            }
            y += self.tile_height;
        }

        let mut tiles: Vec<(f64, PassDescriptor)> = Vec::with_capacity(origins.len() * pass_count as usize);
        for &(x, y) in &origins {
            let dx = x as f64 + self.tile_width as f64 / 2.0 - cx;
            let dy = y as f64 + self.tile_height as f64 / 2.0 - cy;
            let dist_sq = dx * dx + dy * dy;
            let desc = PassDescriptor {
                start_x: x as i64,
                start_y: y as i64,
                width: self.tile_width as i64,
                height: self.tile_height as i64,
            };
            for _ in 0..pass_count {
                tiles.push((dist_sq, desc));
            }
        }
        tiles.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

        for (_, desc) in tiles {
            self.issue_pass(desc);
        }
    }

    /// Waits on the completion channel exactly
    /// `total_passes_issued - passes_synced` times (spec §4.5 "Sync"), i.e.
    /// until every currently-outstanding pass has reported in. Counted
    /// against `passes_synced` rather than the live `total_passes_completed`
    /// counter: a worker may bump that counter before its completion message
    /// is drained from the channel, which would otherwise under-count the
    /// number of receives still needed and return `sync` early.
    pub fn sync(&self) {
        let issued = self.total_passes_issued.load(Ordering::SeqCst);
        let synced = self.passes_synced.load(Ordering::SeqCst);
        let pending = issued.saturating_sub(synced);
        for _ in 0..pending {
            self.completion_rx
                .recv()
                .expect("all worker completion senders dropped before sync finished");
        }
        self.passes_synced.store(issued, Ordering::SeqCst);
    }

    /// Clears the master canvas and sums every worker's private canvas into
    /// it. Takes a short per-worker lock on the integrator mutex to snapshot
    /// its canvas (spec §9 Open Question (i)/DESIGN.md): not held across a
    /// whole pass, so a live preview mid-render tolerates tiny tearing, while
    /// the final post-`sync` call is race-free because no worker is active.
    pub fn rebuild_master_canvas(&self) {
        let mut master = self.master_canvas.lock().expect("master canvas mutex poisoned");
        master.zero();
        for worker in &self.workers {
            let integrator = worker
                .integrator
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            master.add_from(&integrator.canvas);
        }
    }

    pub fn master_canvas(&self) -> std::sync::MutexGuard<'_, Canvas> {
        self.master_canvas.lock().expect("master canvas mutex poisoned")
    }

    /// Sends a terminate message to every worker and joins each thread.
    /// `sync`s first so no in-flight pass is abandoned mid-descriptor (spec
    /// §4.5 "Teardown": "The engine must sync before destroying the
    /// semaphore").
    pub fn shutdown(&mut self) {
        self.sync();
        for worker in &self.workers {
            let _ = worker.inbox.send(WorkerMessage::Terminate);
        }
        for worker in &mut self.workers {
            if let Some(handle) = worker.join_handle.take() {
                let _ = handle.join();
            }
        }
    }
}

impl Drop for RenderEngine {
    fn drop(&mut self) {
        for worker in &self.workers {
            let _ = worker.inbox.send(WorkerMessage::Terminate);
        }
        for worker in &mut self.workers {
            if let Some(handle) = worker.join_handle.take() {
                let _ = handle.join();
            }
        }
    }
}

fn worker_seed(index: usize) -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    nanos ^ (index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

/// A single worker's loop (spec §4.5 "Workers"): wait on the inbox, dequeue
/// one message, terminate on the sentinel, otherwise mark `is_running`, take
/// the integrator mutex only across the single pass, release, bump the
/// shared completed counter, and post the completion channel.
#[allow(clippy::too_many_arguments)]
fn worker_main(
    inbox: Receiver<WorkerMessage>,
    integrator: Arc<Mutex<Integrator>>,
    is_running: Arc<AtomicBool>,
    currently_processing: Arc<Mutex<Option<PassDescriptor>>>,
    completion_tx: Sender<()>,
    completed: Arc<AtomicU64>,
) {
    while let Ok(message) = inbox.recv() {
        match message {
            WorkerMessage::Terminate => break,
            WorkerMessage::Pass(desc) => {
                is_running.store(true, Ordering::Relaxed);
                *currently_processing.lock().expect("mutex poisoned") = Some(desc);

                {
                    let mut guard = integrator
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner());
                    // Worker threads never propagate exceptions past their
                    // main loop (spec §7): a panicking pass is swallowed so a
                    // single bad descriptor can't wedge `sync` or poison the
                    // shared integrator mutex for every later pass.
                    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                        guard.perform_pass(desc);
                    }));
                    if result.is_err() {
                        log::error!("render pass panicked; dropping this pass's contribution");
                    }
                }

                *currently_processing.lock().expect("mutex poisoned") = None;
                is_running.store(false, Ordering::Relaxed);
                // Bumps the engine's shared counter directly (an `Arc` handle,
                // not a back-reference to `RenderEngine` itself — spec §9 "no
                // cycles in ownership") before waking `sync` via the channel.
                completed.fetch_add(1, Ordering::SeqCst);
                let _ = completion_tx.send(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::Camera;
    use crate::integrator::Light;
    use crate::kdtree::{KdTree, MaxChildCount};
    use crate::math::{Color, Point3, Vec3};
    use crate::mesh::Mesh;

    fn single_triangle_scene() -> Arc<Scene> {
        let mesh = Arc::new(Mesh::from_triangles(vec![(
            Point3::new(-1.0, -1.0, 0.0),
            Point3::new(1.0, -1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        )]));
        let tree = Arc::new(KdTree::build(mesh.clone(), &MaxChildCount).unwrap());
        let camera = Camera::new(
            Point3::new(0.0, 0.0, 2.0),
            Vec3::new(0.0, 0.0, -1.0),
            Vec3::unit_y(),
            1.0,
        );
        Arc::new(Scene {
            mesh,
            tree,
            lights: vec![Light {
                position: Point3::new(0.0, 0.0, 3.0),
                color: Color::new(1.0, 1.0, 1.0),
            }],
            camera,
        })
    }

    #[test]
    fn s5_parallel_aggregation_completes_every_issued_pass() {
        let scene = single_triangle_scene();
        let mut engine = RenderEngine::new(16, 16, scene, 4);
        engine.tile_width = 4;
        engine.tile_height = 4;
        engine.perform_full_passes(4); // 16 tiles * 4 passes = 64 descriptors
        engine.sync();
        assert_eq!(engine.total_passes_issued(), 64);
        assert_eq!(engine.total_passes_completed(), 64);

        engine.rebuild_master_canvas();
        let master = engine.master_canvas();
        for y in 0..16 {
            for x in 0..16 {
                assert_eq!(master.passes_at(x, y), 4.0);
            }
        }
    }

    #[test]
    fn s6_shutdown_stops_workers_cleanly_after_sync() {
        let scene = single_triangle_scene();
        let mut engine = RenderEngine::new(8, 8, scene, 2);
        engine.tile_width = 8;
        engine.tile_height = 8;
        engine.perform_full_passes(5);
        engine.shutdown();
        assert_eq!(engine.total_passes_issued(), engine.total_passes_completed());
    }

    #[test]
    fn dispatch_issues_one_descriptor_per_tile_per_pass() {
        let scene = single_triangle_scene();
        let mut engine = RenderEngine::new(32, 16, scene, 2);
        engine.tile_width = 16;
        engine.tile_height = 16;
        engine.perform_full_passes(3);
        engine.sync();
        // 2x1 tiles * 3 passes = 6 descriptors.
        assert_eq!(engine.total_passes_issued(), 6);
    }

    #[test]
    fn s9_poisoned_integrator_mutex_does_not_wedge_the_engine() {
        // Simulates a worker pass panicking mid-pass (spec §8 S9): a thread
        // that panics while holding the integrator mutex poisons it, but
        // `worker_main`/`rebuild_master_canvas` recover via `into_inner()`
        // rather than propagating the poison to every later operation.
        let scene = single_triangle_scene();
        let mut engine = RenderEngine::new(8, 8, scene, 1);
        engine.tile_width = 8;
        engine.tile_height = 8;

        let integrator = engine.workers[0].integrator.clone();
        let _ = std::thread::spawn(move || {
            let _guard = integrator.lock().unwrap();
            panic!("simulated render-pass panic");
        })
        .join();

        engine.perform_full_passes(2);
        engine.sync();
        assert_eq!(engine.total_passes_issued(), engine.total_passes_completed());
        engine.rebuild_master_canvas();
    }
}

//! # stackbeat - In-Process Statistical Stack Sampler
//!
//! stackbeat is a low-overhead sampling engine that lives inside a
//! managed-language process. A per-thread interval timer interrupts each
//! registered application thread once per millisecond; a signal-safe
//! handler defers the actual stack capture through the host runtime's
//! safepoint queue, and the captured traces accumulate in a fixed-size
//! per-thread buffer that consumers drain one timing layer at a time.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Application Thread                           │
//! │            (managed code, fibers, safepoints)                   │
//! └───────┬─────────────────────────────────────────────┬───────────┘
//!         │ SIGPROF (per-thread timer, 1 ms)            │ safepoint
//!         ▼                                             ▼
//! ┌──────────────────┐   enqueue_deferred    ┌──────────────────────┐
//! │ Interrupt Handler│──────────────────────▶│  Deferred Capture    │
//! │  (atomics only)  │                       │ (capture_stack → buf)│
//! └──────────────────┘                       └──────────┬───────────┘
//!         │ skip + count                                │ append
//!         ▼                                             ▼
//! ┌──────────────────┐                       ┌──────────────────────┐
//! │  Skip Counters   │                       │  Trace Ring Buffer   │
//! │ (gc / reentrant /│                       │ (2000 × 512 frames,  │
//! │  pending / ctx)  │                       │  trim + drain cursor)│
//! └──────────────────┘                       └──────────┬───────────┘
//!                                                       │ drain_frames
//!                                                       ▼
//!                                            ┌──────────────────────┐
//!                                            │  Consumer (reports)  │
//!                                            └──────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`sampling`]: the engine core
//!   - `global`: process-wide install/run state, signal handler setup
//!   - `thread_state`: per-thread atomic state (single writer plus that
//!     thread's own asynchronous interrupt handler)
//!   - `interrupt`: the signal handler and deferred capture routine
//!   - `timer`: per-thread POSIX timers, fork hooks, platform fallback
//!   - `control`: register/unregister, start/stop, trim, drain
//!
//! - [`runtime`]: the host-runtime collaborator seam ([`runtime::RuntimeBridge`])
//!   and a lock-free synthetic implementation for tests and diagnostics
//!
//! - [`frames`]: frame-handle field extraction (pass-through)
//!
//! - [`export`]: raw JSON profile reports from drained traces
//!
//! - [`domain`]: core domain types (`FrameHandle`, `ContextId`, `Tid`)
//!   and structured errors
//!
//! - [`cli`]: argument parsing for the diagnostic binary
//!
//! ## Key Concepts
//!
//! - **Deferred capture**: the interrupt handler never walks the stack;
//!   it only asks the runtime to call back later in a context where the
//!   introspection API is legal (outside GC, right thread, no locks).
//! - **Layer**: a caller-defined timing scope delimited by trim indices
//!   (`update_indexes`) inside the shared per-thread buffer, so nested
//!   scopes share one allocation.
//! - **Best-effort sampling**: every reason a tick can be dropped (GC in
//!   progress, reentrant handler, queue full, fiber switched) is counted
//!   and otherwise ignored. Losing samples is fine; destabilizing the
//!   host process is not.
//!
//! ## Typical Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use stackbeat::runtime::SyntheticRuntime;
//! use stackbeat::sampling;
//!
//! sampling::install();
//! sampling::start();
//!
//! let bridge = Arc::new(SyntheticRuntime::with_stack_depth(10));
//! sampling::register_thread(bridge.clone());
//! sampling::start_sampling();
//! // ... workload runs, runtime pumps its safepoint queue ...
//! sampling::stop_sampling(false);
//! let _traces = sampling::drain_frames();
//! sampling::unregister_thread();
//! ```

// Expose modules for testing
pub mod cli;
pub mod domain;
pub mod export;
pub mod frames;
pub mod runtime;
pub mod sampling;

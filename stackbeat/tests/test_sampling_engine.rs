//! End-to-end engine scenarios against the synthetic runtime bridge.
//!
//! Sampler state is thread-local, so every scenario runs on its own
//! freshly spawned thread and cleans up with `unregister_thread`.
//! Captures are forced synchronously through `run_deferred_capture`
//! (the entry point the runtime's safepoint queue would call), which
//! keeps counts deterministic even while the real per-thread timer is
//! ticking underneath.

use std::sync::Arc;
use std::thread;

use stackbeat::domain::ContextId;
use stackbeat::runtime::{RuntimeBridge, SyntheticRuntime};
use stackbeat::sampling;
use stackbeat_common::MAX_BUFFERED_TRACES;

fn on_fresh_thread(f: impl FnOnce() + Send + 'static) {
    thread::Builder::new()
        .name("engine-test".into())
        .spawn(f)
        .expect("failed to spawn test thread")
        .join()
        .expect("test thread panicked");
}

/// Register the current thread against a synthetic runtime of the given
/// stack depth, with sampling started.
fn start_synthetic(depth: usize) -> Arc<SyntheticRuntime> {
    sampling::install();
    let rt = Arc::new(SyntheticRuntime::with_stack_depth(depth));
    let bridge: Arc<dyn RuntimeBridge> = rt.clone();
    assert!(sampling::register_thread(bridge));
    assert!(sampling::start_sampling());
    rt
}

#[test]
fn test_five_captures_of_a_ten_frame_stack() {
    on_fresh_thread(|| {
        let _rt = start_synthetic(10);

        for _ in 0..5 {
            sampling::run_deferred_capture();
        }
        assert_eq!(sampling::current_trace_index(), 5);

        sampling::stop_sampling(false);
        let drained = sampling::drain_frames();
        assert_eq!(drained.len(), 5);
        // 10 frames - start_frame_index 0 - the 2-frame bottom window
        for trace in &drained {
            assert_eq!(trace.len(), 8);
        }
        assert!(sampling::unregister_thread());
    });
}

#[test]
fn test_trim_deeper_than_stack_discards_sample() {
    on_fresh_thread(|| {
        let _rt = start_synthetic(10);
        sampling::update_indexes(9, 0);

        sampling::run_deferred_capture();
        assert_eq!(sampling::current_trace_index(), 0);

        sampling::stop_sampling(false);
        sampling::unregister_thread();
    });
}

#[test]
fn test_full_buffer_drops_silently() {
    on_fresh_thread(|| {
        let _rt = start_synthetic(10);

        for _ in 0..MAX_BUFFERED_TRACES {
            sampling::run_deferred_capture();
        }
        assert_eq!(usize::from(sampling::current_trace_index()), MAX_BUFFERED_TRACES);

        let before = sampling::skip_counters();
        sampling::run_deferred_capture();
        assert_eq!(usize::from(sampling::current_trace_index()), MAX_BUFFERED_TRACES);
        // Documented quirk: the overflow drop is not counted anywhere
        assert_eq!(sampling::skip_counters(), before);

        sampling::stop_sampling(false);
        sampling::unregister_thread();
    });
}

#[test]
fn test_drain_honors_trim_point_and_is_idempotent() {
    on_fresh_thread(|| {
        let _rt = start_synthetic(10);

        for _ in 0..4 {
            sampling::run_deferred_capture();
        }
        sampling::stop_sampling(false);

        // The first two traces belong to an outer layer
        sampling::update_indexes(0, 2);
        let drained = sampling::drain_frames();
        assert_eq!(drained.len(), 2);
        assert_eq!(sampling::current_trace_index(), 2);

        // Nothing new captured: the second drain is empty
        assert!(sampling::drain_frames().is_empty());
        assert_eq!(sampling::current_trace_index(), 2);

        sampling::unregister_thread();
    });
}

#[test]
fn test_stop_with_reset_zeroes_everything() {
    on_fresh_thread(|| {
        let rt = start_synthetic(10);

        sampling::run_deferred_capture();
        rt.set_gc_active(true);
        sampling::run_deferred_capture();
        rt.set_gc_active(false);
        sampling::update_indexes(3, 1);
        assert!(sampling::current_trace_index() > 0);

        sampling::stop_sampling(true);
        assert_eq!(sampling::current_trace_index(), 0);
        let counters = sampling::skip_counters();
        assert_eq!(counters.in_gc, 0);
        assert_eq!(counters.in_handler, 0);
        assert_eq!(counters.in_pending, 0);
        assert_eq!(counters.not_current, 0);

        sampling::unregister_thread();
    });
}

#[test]
fn test_gc_and_foreign_context_captures_are_counted_not_stored() {
    on_fresh_thread(|| {
        let rt = start_synthetic(10);

        rt.set_gc_active(true);
        sampling::run_deferred_capture();
        // >= because the live timer may land ticks during the GC window
        assert!(sampling::skip_counters().in_gc >= 1);
        assert_eq!(sampling::current_trace_index(), 0);
        rt.set_gc_active(false);

        rt.switch_context(ContextId(99));
        sampling::run_deferred_capture();
        assert!(sampling::skip_counters().not_current >= 1);
        assert_eq!(sampling::current_trace_index(), 0);

        sampling::stop_sampling(false);
        sampling::unregister_thread();
    });
}

#[test]
fn test_drain_on_unregistered_thread_is_empty() {
    on_fresh_thread(|| {
        sampling::install();
        assert!(sampling::drain_frames().is_empty());
        assert_eq!(sampling::current_trace_index(), 0);
    });
}

#[test]
fn test_start_sampling_requires_registration() {
    on_fresh_thread(|| {
        sampling::install();
        assert!(!sampling::start_sampling());
    });
}

#[test]
fn test_register_is_idempotent_and_tracks_gc_root() {
    on_fresh_thread(|| {
        sampling::install();
        let rt = Arc::new(SyntheticRuntime::with_stack_depth(5));
        let bridge: Arc<dyn RuntimeBridge> = rt.clone();
        assert!(sampling::register_thread(bridge.clone()));
        assert_eq!(rt.gc_root_count(), 1);

        // Second registration changes nothing
        assert!(sampling::register_thread(bridge));
        assert_eq!(rt.gc_root_count(), 1);

        assert!(sampling::unregister_thread());
        assert_eq!(rt.gc_root_count(), 0);

        // Unregistering again is a quiet no-op
        assert!(sampling::unregister_thread());
        assert_eq!(rt.gc_root_count(), 0);
    });
}

#[test]
fn test_current_frame_index_reports_caller_depth() {
    on_fresh_thread(|| {
        let _rt = start_synthetic(10);
        assert_eq!(sampling::current_frame_index(), 9);
        sampling::stop_sampling(false);
        sampling::unregister_thread();
    });
}

#[test]
fn test_mark_live_frames_visits_every_buffered_handle() {
    on_fresh_thread(|| {
        let _rt = start_synthetic(10);
        sampling::run_deferred_capture();
        sampling::run_deferred_capture();

        let mut seen = Vec::new();
        sampling::mark_live_frames(&mut |frame| seen.push(frame));
        // Two traces of 8 counted lines each
        assert_eq!(seen.len(), 16);

        sampling::stop_sampling(false);
        sampling::unregister_thread();
    });
}

#[test]
fn test_stale_frames_are_screened_out_of_drains() {
    on_fresh_thread(|| {
        let rt = start_synthetic(10);
        sampling::run_deferred_capture();

        // The collector reclaims one frame between capture and drain
        rt.kill_frame(stackbeat::domain::FrameHandle(0x1003));

        sampling::stop_sampling(false);
        let drained = sampling::drain_frames();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].len(), 7);

        sampling::unregister_thread();
    });
}

//! Locks, broadcast channels and timers through a context opened from a
//! `DeviceConfig`, the way applications use the driver.

use aie_driver::prelude::*;
use aie_driver::{BackendType, ErrorKind, Generation, NUM_BROADCAST_CHANNELS};

fn open(config: &DeviceConfig) -> DeviceContext {
    DeviceContext::open(config).expect("simulated backend opens")
}

#[test]
fn default_config_opens_simulated_npu1() {
    let ctx = open(&DeviceConfig::default());
    assert_eq!(ctx.backend().backend_type(), BackendType::Simulated);
    assert_eq!(ctx.generation(), Generation::AieMl);
    assert_eq!(ctx.timer_target_count(), 50);
    assert_eq!(ctx.free_broadcast_channels(), u32::from(NUM_BROADCAST_CHANNELS));
}

#[test]
fn semaphore_lock_counts_up_and_down() {
    let mut ctx = open(&DeviceConfig::default());
    let tile = TileLoc::new(1, 3);

    // Nothing to take yet.
    let err = ctx.acquire_lock(tile, Lock::new(4, -1), 0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::LockOperationFailed);

    ctx.release_lock(tile, Lock::new(4, 2), 0).expect("release +2");
    assert_eq!(ctx.lock_value(tile, 4).expect("value"), 2);

    ctx.acquire_lock(tile, Lock::new(4, -1), 100).expect("acquire 1");
    ctx.acquire_lock(tile, Lock::new(4, -1), 100).expect("acquire 1");
    assert_eq!(ctx.lock_value(tile, 4).expect("value"), 0);
    assert!(ctx.acquire_lock(tile, Lock::new(4, -1), 50).is_err());
}

#[test]
fn semaphore_value_is_settable() {
    let mut ctx = open(&DeviceConfig::default());
    let mem_tile = TileLoc::new(2, 1);
    ctx.set_lock_value(mem_tile, 40, 63).expect("set");
    assert_eq!(ctx.lock_value(mem_tile, 40).expect("value"), 63);

    // Already at the ceiling.
    assert!(ctx.release_lock(mem_tile, Lock::new(40, 1), 0).is_err());
    assert_eq!(
        ctx.set_lock_value(mem_tile, 40, 64).unwrap_err().kind(),
        ErrorKind::InvalidArgument
    );
}

#[test]
fn binary_lock_on_first_generation() {
    let config = DeviceConfig::default().with_partition(Partition::vc1902());
    let mut ctx = open(&config);
    let tile = TileLoc::new(7, 2);

    ctx.acquire_lock(tile, Lock::new(3, -1), 0).expect("free lock");
    assert!(ctx.acquire_lock(tile, Lock::new(3, -1), 20).is_err(), "held lock granted");
    ctx.release_lock(tile, Lock::new(3, 1), 0).expect("release with value");

    // Only a request for the value it was released with succeeds.
    assert!(ctx.acquire_lock(tile, Lock::new(3, 0), 0).is_err());
    ctx.acquire_lock(tile, Lock::new(3, 1), 0).expect("matching value");
    ctx.release_lock(tile, Lock::new(3, -1), 0).expect("plain release");

    assert_eq!(
        ctx.lock_value(tile, 3).unwrap_err().kind(),
        ErrorKind::InvalidArgument,
        "first-generation locks have no value register"
    );
}

#[test]
fn bad_lock_requests_touch_nothing() {
    let mut ctx = open(&DeviceConfig::default());
    let tile = TileLoc::new(0, 2);
    assert_eq!(
        ctx.acquire_lock(tile, Lock::new(16, -1), 0).unwrap_err().kind(),
        ErrorKind::InvalidArgument
    );
    assert_eq!(
        ctx.acquire_lock(TileLoc::new(9, 2), Lock::new(0, -1), 0).unwrap_err().kind(),
        ErrorKind::InvalidTile
    );
}

#[test]
fn channel_reservations_are_partition_wide() {
    let mut ctx = open(&DeviceConfig::default());
    let a = ctx.request_broadcast_channels(4).expect("first");
    let b = ctx.request_broadcast_channels(4).expect("second");
    assert_eq!(a.channels(), vec![0, 1, 2, 3]);
    assert_eq!(b.channels(), vec![4, 5, 6, 7]);
    assert_eq!(a.records.len(), 4 * ctx.timer_target_count());

    ctx.release_broadcast_channels(&a.records).expect("release");
    let c = ctx.request_broadcast_channels(2).expect("reuse");
    assert_eq!(c.channels(), vec![0, 1]);
    // b holds 4..8, c holds 0..2
    assert_eq!(ctx.free_broadcast_channels(), 10);

    let err = ctx.request_broadcast_channels(11).unwrap_err();
    assert!(matches!(
        err,
        AieError::ResourceExhausted {
            requested: 11,
            available: 10
        }
    ));
    assert_eq!(ctx.free_broadcast_channels(), 10);
}

#[test]
fn timer_reset_and_wait() {
    let mut ctx = open(&DeviceConfig::default());
    let tile = TileLoc::new(4, 5);

    ctx.wait_cycles(tile, Module::Core, 1_000).expect("wait");
    assert!(ctx.read_timer(tile, Module::Core).expect("read") >= 1_000);

    ctx.reset_timer(tile, Module::Core).expect("reset");
    assert!(ctx.read_timer(tile, Module::Core).expect("read") < 1_000);
}

#[test]
fn generated_event_resets_armed_timer() {
    use aie_driver::aie_chip::events::core;

    let mut ctx = open(&DeviceConfig::default());
    let tile = TileLoc::new(3, 2);
    ctx.wait_cycles(tile, Module::Core, 5_000).expect("wait");
    ctx.set_timer_reset_event(tile, Module::Core, core::USER_EVENT_2, ResetMode::Disable)
        .expect("arm");
    ctx.generate_event(tile, Module::Core, core::USER_EVENT_2).expect("generate");
    assert!(ctx.read_timer(tile, Module::Core).expect("read") < 5_000);
}

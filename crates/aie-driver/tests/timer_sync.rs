//! Timer synchronization against the simulated array
//!
//! Covers the happy path and every rollback point: a shim that refuses its
//! broadcast configuration, a target that refuses arming, a failed trigger,
//! a failed clean-up write after the trigger, and a partition with no free
//! broadcast channel.

use aie_driver::{
    DeviceContext, ErrorKind, Generation, Module, Partition, ResourceRecord, SimulatedArray,
    TileLoc,
};

fn context(partition: Partition) -> DeviceContext<SimulatedArray> {
    DeviceContext::new(partition, SimulatedArray::new(partition, 0)).expect("valid partition")
}

fn ctrl_address(ctx: &DeviceContext<SimulatedArray>, loc: TileLoc, module: Module) -> u64 {
    let props = ctx.module_props(loc, module).expect("timer module");
    ctx.tile_address(loc) + u64::from(props.timer.ctrl)
}

fn reset_event_field(ctx: &DeviceContext<SimulatedArray>, loc: TileLoc, module: Module) -> u32 {
    let props = ctx.module_props(loc, module).expect("timer module");
    props
        .timer
        .reset_event
        .get(ctx.backend().register(ctrl_address(ctx, loc, module)))
}

fn shim_broadcast_address(ctx: &DeviceContext<SimulatedArray>, col: u8, channel: u8) -> u64 {
    let shim = TileLoc::shim(col);
    let props = ctx.module_props(shim, Module::Pl).expect("shim PL module");
    ctx.tile_address(shim) + u64::from(props.events.broadcast(channel))
}

/// Reset every timer at a different cycle so they start out misaligned.
fn stagger(ctx: &mut DeviceContext<SimulatedArray>) {
    for (i, (loc, module)) in ctx.timer_targets().into_iter().enumerate() {
        ctx.backend_mut().advance(37 * (i as u64 + 1));
        ctx.reset_timer(loc, module).expect("reset");
    }
}

fn assert_quiescent(ctx: &DeviceContext<SimulatedArray>) {
    assert_eq!(ctx.free_broadcast_channels(), 16, "channel left reserved");
    for (loc, module) in ctx.timer_targets() {
        assert_eq!(reset_event_field(ctx, loc, module), 0, "{loc} {module} left armed");
    }
    for col in 0..ctx.partition().num_cols {
        assert_eq!(
            ctx.backend().register(shim_broadcast_address(ctx, col, 0)),
            0,
            "shim {col} still broadcasting"
        );
    }
}

#[test]
fn npu1_timers_share_one_origin() {
    let mut ctx = context(Partition::npu1());
    stagger(&mut ctx);

    let targets = ctx.timer_targets();
    let before: Vec<u64> = targets
        .iter()
        .map(|&(loc, module)| ctx.backend().timer_origin(loc, module))
        .collect();
    assert!(before.windows(2).all(|w| w[0] != w[1]));

    let report = ctx.synchronize_timers().expect("sync");
    assert_eq!(report.channel, 0);
    assert_eq!(report.columns, 5);
    assert_eq!(report.targets, 50);

    let origin = ctx.backend().timer_origin(TileLoc::shim(0), Module::Pl);
    for &(loc, module) in &targets {
        assert_eq!(ctx.backend().timer_origin(loc, module), origin, "{loc} {module}");
    }
    assert!(origin > before[before.len() - 1]);
    assert_quiescent(&ctx);
}

#[test]
fn aie_partition_timers_share_one_origin() {
    let p = Partition::new(Generation::Aie, 4, 5, 0).with_noc_columns(0b0110);
    let mut ctx = context(p);
    stagger(&mut ctx);

    let report = ctx.synchronize_timers().expect("sync");
    assert_eq!(report.targets, ctx.timer_target_count());

    let origin = ctx.backend().timer_origin(TileLoc::shim(0), Module::Pl);
    for (loc, module) in ctx.timer_targets() {
        assert_eq!(ctx.backend().timer_origin(loc, module), origin, "{loc} {module}");
    }
    assert_quiescent(&ctx);
}

#[test]
fn timers_read_back_aligned_after_sync() {
    let mut ctx = context(Partition::npu1());
    stagger(&mut ctx);
    ctx.synchronize_timers().expect("sync");

    let values: Vec<u64> = ctx
        .timer_targets()
        .into_iter()
        .map(|(loc, module)| ctx.backend().timer_value(loc, module))
        .collect();
    assert!(values.iter().all(|&v| v == values[0]));
}

#[test]
fn sync_skips_reserved_channels() {
    let mut ctx = context(Partition::npu1());
    let held = ctx.request_broadcast_channels(3).expect("reserve");

    let report = ctx.synchronize_timers().expect("sync");
    assert_eq!(report.channel, 3);
    assert_eq!(ctx.free_broadcast_channels(), 13);

    ctx.release_broadcast_channels(&held.records).expect("release");
    assert_eq!(ctx.free_broadcast_channels(), 16);
}

#[test]
fn repeated_sync_reuses_the_channel() {
    let mut ctx = context(Partition::npu1());
    for _ in 0..3 {
        assert_eq!(ctx.synchronize_timers().expect("sync").channel, 0);
    }
    assert_quiescent(&ctx);
}

#[test]
fn exhausted_channels_change_nothing() {
    let mut ctx = context(Partition::npu1());
    let held = ctx.request_broadcast_channels(15).expect("reserve");
    // Block the last channel on a single compute tile.
    ctx.reserve_broadcast_channel(ResourceRecord {
        loc: TileLoc::new(3, 4),
        module: Module::Core,
        rsc_id: 15,
    })
    .expect("reserve one");
    ctx.backend_mut().clear_write_log();

    let err = ctx.synchronize_timers().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ResourceExhausted);
    assert!(ctx.backend().writes().is_empty(), "registers touched");
    assert_eq!(ctx.free_broadcast_channels(), 0);

    ctx.release_broadcast_channels(&held.records).expect("release");
    assert_eq!(ctx.free_broadcast_channels(), 15);
}

#[test]
fn shim_fault_rolls_back_earlier_shims() {
    let mut ctx = context(Partition::npu1());
    let faulty = shim_broadcast_address(&ctx, 3, 0);
    ctx.backend_mut().inject_write_fault(faulty);

    let err = ctx.synchronize_timers().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::HardwareAccessFailed);

    // Shims 0..3 were configured and then cleared; nothing was armed.
    for col in 0..3 {
        let address = shim_broadcast_address(&ctx, col, 0);
        let writes: Vec<u32> = ctx
            .backend()
            .writes()
            .iter()
            .filter(|&&(a, _)| a == address)
            .map(|&(_, v)| v)
            .collect();
        assert_eq!(writes.len(), 2, "shim {col}");
        assert_ne!(writes[0], 0);
        assert_eq!(writes[1], 0);
    }
    let untouched = shim_broadcast_address(&ctx, 4, 0);
    assert!(ctx.backend().writes().iter().all(|&(a, _)| a != untouched));
    for (loc, module) in ctx.timer_targets() {
        let ctrl = ctrl_address(&ctx, loc, module);
        assert!(ctx.backend().writes().iter().all(|&(a, _)| a != ctrl));
    }
    assert_quiescent(&ctx);
}

#[test]
fn shim_fault_at_first_column() {
    let mut ctx = context(Partition::npu1());
    let faulty = shim_broadcast_address(&ctx, 0, 0);
    ctx.backend_mut().inject_write_fault(faulty);

    assert!(ctx.synchronize_timers().is_err());
    assert!(ctx.backend().writes().is_empty());
    assert_quiescent(&ctx);
}

#[test]
fn arming_fault_disarms_earlier_targets() {
    let mut ctx = context(Partition::npu1());
    let targets = ctx.timer_targets();
    let j = 17;
    let (bad_loc, bad_module) = targets[j];
    let faulty = ctrl_address(&ctx, bad_loc, bad_module);
    ctx.backend_mut().inject_write_fault(faulty);

    let err = ctx.synchronize_timers().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::HardwareAccessFailed);

    for (i, &(loc, module)) in targets.iter().enumerate() {
        let ctrl = ctrl_address(&ctx, loc, module);
        let writes = ctx.backend().writes().iter().filter(|&&(a, _)| a == ctrl).count();
        let expected = if i < j { 2 } else { 0 };
        assert_eq!(writes, expected, "{loc} {module}");
    }
    assert_quiescent(&ctx);

    // No event was generated: the timers kept their own origins.
    let origins: Vec<u64> = targets
        .iter()
        .map(|&(loc, module)| ctx.backend().timer_origin(loc, module))
        .collect();
    assert!(origins.iter().all(|&o| o == 0));
}

#[test]
fn trigger_fault_releases_channel_and_leaves_arming() {
    let mut ctx = context(Partition::npu1());
    let shim = TileLoc::shim(0);
    let generate = {
        let props = ctx.module_props(shim, Module::Pl).expect("shim PL module");
        ctx.tile_address(shim) + u64::from(props.events.generate)
    };
    ctx.backend_mut().inject_write_fault(generate);

    let err = ctx.synchronize_timers().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::HardwareAccessFailed);
    assert_eq!(ctx.free_broadcast_channels(), 16);

    for (loc, module) in ctx.timer_targets() {
        assert_ne!(reset_event_field(&ctx, loc, module), 0, "{loc} {module} disarmed");
    }
    for col in 0..5 {
        assert_eq!(ctx.backend().register(shim_broadcast_address(&ctx, col, 0)), 0, "shim {col}");
    }

    // The channel comes back with no shim driving it.
    let grant = ctx.request_broadcast_channels(1).expect("regrant");
    assert_eq!(grant.channels(), vec![0]);
}

fn assert_aligned(ctx: &DeviceContext<SimulatedArray>) {
    let origin = ctx.backend().timer_origin(TileLoc::shim(0), Module::Pl);
    assert_ne!(origin, 0);
    for (loc, module) in ctx.timer_targets() {
        assert_eq!(ctx.backend().timer_origin(loc, module), origin, "{loc} {module}");
    }
}

#[test]
fn disarm_fault_finishes_cleanup_and_reports() {
    let mut ctx = context(Partition::npu1());
    let targets = ctx.timer_targets();
    let (bad_loc, bad_module) = targets[23];
    let ctrl = ctrl_address(&ctx, bad_loc, bad_module);
    // The arming write goes through; the disarm write fails.
    ctx.backend_mut().inject_write_fault_after(ctrl, 1);

    let err = ctx.synchronize_timers().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::HardwareAccessFailed);
    assert_aligned(&ctx);

    assert_eq!(ctx.free_broadcast_channels(), 16);
    for &(loc, module) in &targets {
        let field = reset_event_field(&ctx, loc, module);
        if (loc, module) == (bad_loc, bad_module) {
            assert_ne!(field, 0);
        } else {
            assert_eq!(field, 0, "{loc} {module} left armed");
        }
    }
    for col in 0..5 {
        assert_eq!(ctx.backend().register(shim_broadcast_address(&ctx, col, 0)), 0, "shim {col}");
    }
}

#[test]
fn shim_clear_fault_finishes_cleanup_and_reports() {
    let mut ctx = context(Partition::npu1());
    let stuck = shim_broadcast_address(&ctx, 2, 0);
    ctx.backend_mut().inject_write_fault_after(stuck, 1);

    let err = ctx.synchronize_timers().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::HardwareAccessFailed);
    assert_aligned(&ctx);

    assert_eq!(ctx.free_broadcast_channels(), 16);
    for (loc, module) in ctx.timer_targets() {
        assert_eq!(reset_event_field(&ctx, loc, module), 0, "{loc} {module} left armed");
    }
    for col in 0..5 {
        let value = ctx.backend().register(shim_broadcast_address(&ctx, col, 0));
        if col == 2 {
            assert_ne!(value, 0);
        } else {
            assert_eq!(value, 0, "shim {col}");
        }
    }
}

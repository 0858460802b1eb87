//! Producer/consumer handoff over one AIE-ML semaphore lock

use aie_driver::{DeviceConfig, DeviceContext, Lock, Result, TileLoc};

const LOCK: u8 = 2;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("aie_driver=debug")
        .init();

    let mut ctx = DeviceContext::open(&DeviceConfig::default())?;
    let mem_tile = TileLoc::new(0, 1);

    // Producer fills three buffers.
    for _ in 0..3 {
        ctx.release_lock(mem_tile, Lock::new(LOCK, 1), 0)?;
    }
    println!("📤 Produced: lock value {}", ctx.lock_value(mem_tile, LOCK)?);

    // Consumer drains them, then finds nothing left.
    for _ in 0..3 {
        ctx.acquire_lock(mem_tile, Lock::new(LOCK, -1), 1_000)?;
    }
    println!("📥 Consumed: lock value {}", ctx.lock_value(mem_tile, LOCK)?);

    match ctx.acquire_lock(mem_tile, Lock::new(LOCK, -1), 100) {
        Ok(()) => println!("⚠️  Acquired an empty lock"),
        Err(e) => println!("✅ Empty lock refused: {e}"),
    }

    Ok(())
}

//! Simulated AI Engine array
//!
//! A register-level model of one partition, good enough to run every driver
//! operation without hardware:
//!
//! - one global cycle counter, advanced by every register access;
//! - per-module 64-bit timers (`now - origin`), reset by the control
//!   register's one-shot reset bit or by the configured reset event;
//! - lock request windows with per-generation semantics (AIE binary locks
//!   with an optional value, AIE-ML semaphores in `0..=63`);
//! - event generate and broadcast: a shim that broadcasts an event on
//!   channel `c` drives `c` along the shim row, and every shim configured to
//!   re-broadcast it passes it on and up its own column;
//! - read/write fault injection and a log of accepted writes.
//!
//! Everything else is plain storage.
//!
//! ```text
//!   col 0      col 1      col 2
//!   ▲ │        ▲ │        ▲        broadcast c delivered to every module
//!   │ │        │ │        │        of rows ≥ 1 in a forwarding column
//!  [shim] ───▶ [shim] ───▶ [shim]  forwards only if its broadcast register c
//!   generate                        holds its own broadcast-c number
//! ```

use crate::backend::{BackendType, RegisterIo};
use crate::error::{AieError, Result};
use aie_chip::regs::{aie, aieml, LockRegs};
use aie_chip::{DeviceProps, Generation, Module, ModuleProps, Partition, TileLoc};
use std::collections::{HashMap, HashSet};
use tracing::{debug, trace};

/// Largest AIE-ML lock value.
const MAX_LOCK_VALUE: i32 = 63;

/// What a decoded register address refers to.
#[derive(Debug, Clone, Copy)]
enum Reg {
    TimerCtrl(&'static ModuleProps),
    TimerLow(&'static ModuleProps),
    TimerHigh(&'static ModuleProps),
    Generate(&'static ModuleProps),
    LockRequest(LockRegs, u32),
    LockValue(u8),
    Plain,
}

#[derive(Debug, Clone, Copy, Default)]
struct LockState {
    value: u8,
    held: bool,
}

/// Register-level software model of a partition
#[derive(Debug)]
pub struct SimulatedArray {
    partition: Partition,
    props: &'static DeviceProps,
    base_address: u64,
    cycle: u64,
    cycles_per_access: u64,
    registers: HashMap<u64, u32>,
    timer_origin: HashMap<(TileLoc, Module), u64>,
    locks: HashMap<(TileLoc, u8), LockState>,
    read_faults: HashSet<u64>,
    /// Writes still accepted before each faulty address starts failing.
    write_faults: HashMap<u64, u32>,
    writes: Vec<(u64, u32)>,
}

impl SimulatedArray {
    /// Model `partition` with tile (0, 0) at `base_address`
    pub fn new(partition: Partition, base_address: u64) -> Self {
        debug!(
            "Simulated {} partition: {} columns x {} rows at {base_address:#x}",
            partition.generation, partition.num_cols, partition.num_rows
        );
        Self {
            partition,
            props: DeviceProps::for_generation(partition.generation),
            base_address,
            cycle: 0,
            cycles_per_access: 1,
            registers: HashMap::new(),
            timer_origin: HashMap::new(),
            locks: HashMap::new(),
            read_faults: HashSet::new(),
            write_faults: HashMap::new(),
            writes: Vec::new(),
        }
    }

    /// Set how many cycles each register access takes (default 1)
    #[must_use]
    pub fn with_cycles_per_access(mut self, cycles: u64) -> Self {
        self.cycles_per_access = cycles;
        self
    }

    /// Modelled partition
    pub const fn partition(&self) -> &Partition {
        &self.partition
    }

    /// Current global cycle count
    pub const fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Let `cycles` pass without any register access
    pub fn advance(&mut self, cycles: u64) {
        self.cycle = self.cycle.wrapping_add(cycles);
    }

    /// Make every write to `address` fail
    pub fn inject_write_fault(&mut self, address: u64) {
        self.inject_write_fault_after(address, 0);
    }

    /// Accept `count` more writes to `address`, then fail every one after
    pub fn inject_write_fault_after(&mut self, address: u64, count: u32) {
        self.write_faults.insert(address, count);
    }

    /// Make every read of `address` fail
    pub fn inject_read_fault(&mut self, address: u64) {
        self.read_faults.insert(address);
    }

    /// Remove all injected faults
    pub fn clear_faults(&mut self) {
        self.read_faults.clear();
        self.write_faults.clear();
    }

    /// Accepted writes, oldest first
    pub fn writes(&self) -> &[(u64, u32)] {
        &self.writes
    }

    /// Forget the write log
    pub fn clear_write_log(&mut self) {
        self.writes.clear();
    }

    /// Stored value of a plain register, without side effects
    pub fn register(&self, address: u64) -> u32 {
        self.registers.get(&address).copied().unwrap_or(0)
    }

    /// Cycle at which the timer of `module` at `loc` was last reset
    pub fn timer_origin(&self, loc: TileLoc, module: Module) -> u64 {
        self.timer_origin.get(&(loc, module)).copied().unwrap_or(0)
    }

    /// Current value of the timer of `module` at `loc`
    pub fn timer_value(&self, loc: TileLoc, module: Module) -> u64 {
        self.cycle.wrapping_sub(self.timer_origin(loc, module))
    }

    /// Current value of lock `id` at `loc`
    pub fn lock_value(&self, loc: TileLoc, id: u8) -> u8 {
        self.locks.get(&(loc, id)).map_or(0, |l| l.value)
    }

    /// Whether binary lock `id` at `loc` is held
    pub fn lock_held(&self, loc: TileLoc, id: u8) -> bool {
        self.locks.get(&(loc, id)).is_some_and(|l| l.held)
    }

    fn tile_base(&self, loc: TileLoc) -> u64 {
        self.base_address + self.props.layout.tile_offset(loc)
    }

    fn module(&self, loc: TileLoc, module: Module) -> Option<&'static ModuleProps> {
        self.props.module(self.partition.tile_type(loc)?, module)
    }

    fn decode(&self, address: u64) -> Option<(TileLoc, Reg)> {
        let offset = address.checked_sub(self.base_address)?;
        let layout = self.props.layout;
        let (loc, reg) = layout.decode(offset);
        if layout.tile_offset(loc) + u64::from(reg) != offset {
            return None;
        }
        let tile = self.props.tile(self.partition.tile_type(loc)?)?;

        for m in tile.modules {
            let kind = if reg == m.timer.ctrl {
                Reg::TimerCtrl(m)
            } else if reg == m.timer.low {
                Reg::TimerLow(m)
            } else if reg == m.timer.high {
                Reg::TimerHigh(m)
            } else if reg == m.events.generate {
                Reg::Generate(m)
            } else {
                continue;
            };
            return Some((loc, kind));
        }

        if let Some(locks) = tile.locks {
            if locks.is_request(reg) {
                return Some((loc, Reg::LockRequest(locks, reg - locks.request_base)));
            }
            if let Some(base) = locks.value_base {
                if reg >= base && (reg - base) % locks.value_stride == 0 {
                    if let Ok(id) = u8::try_from((reg - base) / locks.value_stride) {
                        if id < locks.num_locks {
                            return Some((loc, Reg::LockValue(id)));
                        }
                    }
                }
            }
        }

        Some((loc, Reg::Plain))
    }

    fn tick(&mut self) {
        self.cycle = self.cycle.wrapping_add(self.cycles_per_access);
    }

    fn reset_timer(&mut self, loc: TileLoc, module: Module) {
        trace!("Timer reset at {loc} {module} (cycle {})", self.cycle);
        self.timer_origin.insert((loc, module), self.cycle);
    }

    /// Event `number` occurs in `module` at `loc`.
    fn deliver(&mut self, loc: TileLoc, module: &ModuleProps, number: u8) {
        if number == 0 {
            return;
        }
        let ctrl = self.register(self.tile_base(loc) + u64::from(module.timer.ctrl));
        if module.timer.reset_event.get(ctrl) == u32::from(number) {
            self.reset_timer(loc, module.module);
        }
    }

    /// Event `number` is generated in `module` at `loc`.
    fn raise(&mut self, loc: TileLoc, module: &'static ModuleProps, number: u8) {
        trace!("Event {number} generated at {loc} {}", module.module);
        self.deliver(loc, module, number);
        if number == 0 {
            return;
        }
        let base = self.tile_base(loc);
        let channels: Vec<u8> = (0..module.events.num_broadcasts)
            .filter(|&ch| self.register(base + u64::from(module.events.broadcast(ch))) == u32::from(number))
            .collect();
        for channel in channels {
            self.propagate(loc, channel);
        }
    }

    fn propagate(&mut self, origin: TileLoc, channel: u8) {
        trace!("Broadcast channel {channel} driven from {origin}");
        self.deliver_column(origin.col, channel);
        if !origin.is_shim() {
            return;
        }

        let mut col = origin.col + 1;
        while col < self.partition.num_cols && self.shim_receives(col, channel) {
            col += 1;
        }

        let mut col = origin.col;
        while col > 0 {
            col -= 1;
            if !self.shim_receives(col, channel) {
                break;
            }
        }
    }

    /// Deliver broadcast `channel` to every module above the shim of `col`.
    fn deliver_column(&mut self, col: u8, channel: u8) {
        for row in 1..self.partition.num_rows {
            let loc = TileLoc::new(col, row);
            let Some(tile) = self.partition.tile_type(loc).and_then(|tt| self.props.tile(tt)) else {
                continue;
            };
            for m in tile.modules {
                if let Ok(number) = m.event_table.translate(m.event_table.broadcast_event(channel)) {
                    self.deliver(loc, m, number);
                }
            }
        }
    }

    /// Broadcast `channel` reaches the shim of `col`; returns whether that
    /// shim drives it further.
    fn shim_receives(&mut self, col: u8, channel: u8) -> bool {
        let loc = TileLoc::shim(col);
        let Some(pl) = self.module(loc, Module::Pl) else {
            return false;
        };
        let Ok(number) = pl.event_table.translate(pl.event_table.broadcast_event(channel)) else {
            return false;
        };
        self.deliver(loc, pl, number);
        let forwarding = self.register(self.tile_base(loc) + u64::from(pl.events.broadcast(channel)));
        if forwarding != u32::from(number) {
            return false;
        }
        self.deliver_column(col, channel);
        true
    }

    /// Lock request read at `offset` into the request window; returns the
    /// result bit.
    fn lock_request(&mut self, loc: TileLoc, regs: &LockRegs, offset: u32) -> bool {
        let Ok(id) = u8::try_from(offset / regs.lock_stride) else {
            return false;
        };
        let within = offset % regs.lock_stride;
        let acquire = within & regs.acquire_offset != 0;
        let generation = self.props.generation;
        let state = self.locks.entry((loc, id)).or_default();

        let granted = match generation {
            Generation::AieMl => {
                let raw = (within >> aieml::LOCK_VALUE_SHIFT) & aieml::LOCK_VALUE_MASK;
                // 7-bit two's complement
                #[allow(clippy::cast_possible_wrap)]
                let delta = if raw & 0x40 != 0 { raw as i32 - 0x80 } else { raw as i32 };
                let current = i32::from(state.value);
                let next = if acquire { current - delta.abs() } else { current + delta };
                match u8::try_from(next) {
                    Ok(v) if next <= MAX_LOCK_VALUE => {
                        state.value = v;
                        true
                    }
                    _ => false,
                }
            }
            Generation::Aie => {
                let value = match within & 0x30 {
                    aie::LOCK_VALUE0_OFFSET => Some(0),
                    aie::LOCK_VALUE1_OFFSET => Some(1),
                    _ => None,
                };
                if acquire {
                    if state.held || value.is_some_and(|v| state.value != v) {
                        false
                    } else {
                        state.held = true;
                        true
                    }
                } else {
                    state.held = false;
                    if let Some(v) = value {
                        state.value = v;
                    }
                    true
                }
            }
        };

        trace!(
            "Lock {id} at {loc}: {} {} (value {})",
            if acquire { "acquire" } else { "release" },
            if granted { "granted" } else { "refused" },
            state.value
        );
        granted
    }

    fn outside(address: u64) -> AieError {
        AieError::hardware_access_failed(address, "address outside the simulated partition")
    }
}

impl RegisterIo for SimulatedArray {
    fn read32(&mut self, address: u64) -> Result<u32> {
        self.tick();
        if self.read_faults.contains(&address) {
            return Err(AieError::hardware_access_failed(address, "injected read fault"));
        }
        let (loc, reg) = self.decode(address).ok_or_else(|| Self::outside(address))?;

        #[allow(clippy::cast_possible_truncation)]
        let value = match reg {
            Reg::TimerLow(m) => self.timer_value(loc, m.module) as u32,
            Reg::TimerHigh(m) => (self.timer_value(loc, m.module) >> 32) as u32,
            Reg::LockRequest(regs, offset) => u32::from(self.lock_request(loc, &regs, offset)),
            Reg::LockValue(id) => u32::from(self.lock_value(loc, id)),
            Reg::TimerCtrl(_) | Reg::Generate(_) | Reg::Plain => self.register(address),
        };

        trace!("Read u32 @ {address:#x} = {value:#x}");
        Ok(value)
    }

    fn write32(&mut self, address: u64, value: u32) -> Result<()> {
        self.tick();
        match self.write_faults.get_mut(&address) {
            Some(0) => return Err(AieError::hardware_access_failed(address, "injected write fault")),
            Some(left) => *left -= 1,
            None => {}
        }
        let (loc, reg) = self.decode(address).ok_or_else(|| Self::outside(address))?;

        trace!("Write u32 @ {address:#x} = {value:#x}");
        self.writes.push((address, value));

        match reg {
            Reg::TimerCtrl(m) => {
                if m.timer.reset.get(value) != 0 {
                    self.reset_timer(loc, m.module);
                }
                // Reset is one-shot and reads back as 0.
                self.registers.insert(address, value & !m.timer.reset.mask);
            }
            Reg::TimerLow(_) | Reg::TimerHigh(_) | Reg::LockRequest(..) => {}
            Reg::Generate(m) => {
                #[allow(clippy::cast_possible_truncation)]
                let number = (value & 0xFF) as u8;
                self.raise(loc, m, number);
            }
            Reg::LockValue(id) => {
                #[allow(clippy::cast_possible_truncation)]
                let v = (value & 0x3F) as u8;
                self.locks.entry((loc, id)).or_default().value = v;
            }
            Reg::Plain => {
                self.registers.insert(address, value);
            }
        }
        Ok(())
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Simulated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aie_chip::events::{core, pl, CORE_TABLE, PL_TABLE};
    use aie_chip::regs::aieml::{AIE_LOCKS, CORE_EVENTS, CORE_TIMER, PL_EVENTS, PL_TIMER};

    const BASE: u64 = 0x2000_0000;

    fn npu1() -> SimulatedArray {
        SimulatedArray::new(Partition::npu1(), BASE)
    }

    fn addr(loc: TileLoc, reg: u32) -> u64 {
        BASE + Generation::AieMl.layout().tile_offset(loc) + u64::from(reg)
    }

    #[test]
    fn timers_count_accesses() {
        let mut sim = npu1().with_cycles_per_access(10);
        let loc = TileLoc::new(1, 2);
        let low = sim.read32(addr(loc, CORE_TIMER.low)).unwrap();
        assert_eq!(low, 10);
        sim.advance(100);
        let low = sim.read32(addr(loc, CORE_TIMER.low)).unwrap();
        assert_eq!(low, 120);
    }

    #[test]
    fn control_reset_is_one_shot() {
        let mut sim = npu1();
        let loc = TileLoc::new(0, 2);
        sim.advance(1000);
        let ctrl = addr(loc, CORE_TIMER.ctrl);
        sim.write32(ctrl, CORE_TIMER.reset.set(1)).unwrap();
        assert_eq!(sim.read32(ctrl).unwrap(), 0);
        assert_eq!(sim.timer_origin(loc, Module::Core), 1001);
        assert!(sim.read32(addr(loc, CORE_TIMER.low)).unwrap() < 10);
    }

    #[test]
    fn generated_event_resets_armed_timer() {
        let mut sim = npu1();
        let loc = TileLoc::new(2, 3);
        let user_event_0 = u32::from(CORE_TABLE.translate(core::USER_EVENT_0).unwrap());
        sim.write32(addr(loc, CORE_TIMER.ctrl), CORE_TIMER.reset_event.set(user_event_0)).unwrap();
        sim.advance(500);
        sim.write32(addr(loc, CORE_EVENTS.generate), user_event_0).unwrap();
        assert_eq!(sim.timer_origin(loc, Module::Core), sim.cycle());
        assert!(sim.read32(addr(loc, CORE_TIMER.low)).unwrap() < 10);
    }

    #[test]
    fn broadcast_walks_configured_shims() {
        let mut sim = npu1();
        let channel = 2;
        let shim_number = u32::from(PL_TABLE.translate(pl::BROADCAST_0.offset(2)).unwrap());
        let core_number = u32::from(CORE_TABLE.translate(core::BROADCAST_0.offset(2)).unwrap());

        // Shims 0..=2 forward channel 2; shim 3 does not.
        for col in 0..3 {
            sim.write32(addr(TileLoc::shim(col), PL_EVENTS.broadcast(channel)), shim_number).unwrap();
        }
        for col in 0..5 {
            let loc = TileLoc::new(col, 2);
            sim.write32(addr(loc, CORE_TIMER.ctrl), CORE_TIMER.reset_event.set(core_number)).unwrap();
        }
        sim.write32(addr(TileLoc::shim(0), PL_TIMER.ctrl), PL_TIMER.reset_event.set(shim_number)).unwrap();
        sim.advance(10_000);

        sim.write32(addr(TileLoc::shim(0), PL_EVENTS.generate), shim_number).unwrap();
        let fired = sim.cycle();

        assert_eq!(sim.timer_origin(TileLoc::shim(0), Module::Pl), fired);
        for col in 0..3 {
            assert_eq!(sim.timer_origin(TileLoc::new(col, 2), Module::Core), fired);
        }
        for col in 3..5 {
            assert_ne!(sim.timer_origin(TileLoc::new(col, 2), Module::Core), fired);
        }
    }

    #[test]
    fn aieml_semaphore_locks() {
        let mut sim = npu1();
        let loc = TileLoc::new(1, 3);
        let acquire_one = addr(loc, AIE_LOCKS.request_base + 5 * 0x400 + 0x200 + (0x7F << 2));
        let release_one = addr(loc, AIE_LOCKS.request_base + 5 * 0x400 + (1 << 2));

        assert_eq!(sim.read32(acquire_one).unwrap(), 0);
        assert_eq!(sim.read32(release_one).unwrap(), 1);
        assert_eq!(sim.lock_value(loc, 5), 1);
        assert_eq!(sim.read32(acquire_one).unwrap(), 1);
        assert_eq!(sim.lock_value(loc, 5), 0);

        let value_reg = addr(loc, AIE_LOCKS.value_register(5).unwrap());
        sim.write32(value_reg, 63).unwrap();
        assert_eq!(sim.read32(value_reg).unwrap(), 63);
        assert_eq!(sim.read32(release_one).unwrap(), 0, "overflow is refused");
    }

    #[test]
    fn aie_binary_locks() {
        let partition = Partition::vc1902();
        let mut sim = SimulatedArray::new(partition, 0);
        let loc = TileLoc::new(3, 1);
        let tile = Generation::Aie.layout().tile_offset(loc);
        let lock = |off: u32| tile + u64::from(aie::AIE_LOCKS.request_base + 2 * 0x80 + off);

        // acquire with value 1 fails while the value is 0
        assert_eq!(sim.read32(lock(0x40 + aie::LOCK_VALUE1_OFFSET)).unwrap(), 0);
        assert_eq!(sim.read32(lock(0x40)).unwrap(), 1);
        assert!(sim.lock_held(loc, 2));
        assert_eq!(sim.read32(lock(0x40)).unwrap(), 0);
        assert_eq!(sim.read32(lock(aie::LOCK_VALUE1_OFFSET)).unwrap(), 1);
        assert!(!sim.lock_held(loc, 2));
        assert_eq!(sim.read32(lock(0x40 + aie::LOCK_VALUE1_OFFSET)).unwrap(), 1);
    }

    #[test]
    fn faults_and_write_log() {
        let mut sim = npu1();
        let reg = addr(TileLoc::shim(1), PL_EVENTS.broadcast(0));
        sim.inject_write_fault(reg);
        assert!(sim.write32(reg, 110).is_err());
        assert!(sim.writes().is_empty());
        sim.clear_faults();
        sim.write32(reg, 110).unwrap();
        assert_eq!(sim.writes(), &[(reg, 110)]);
        assert_eq!(sim.register(reg), 110);
    }

    #[test]
    fn delayed_write_fault() {
        let mut sim = npu1();
        let reg = addr(TileLoc::shim(2), PL_EVENTS.broadcast(3));
        sim.inject_write_fault_after(reg, 2);
        sim.write32(reg, 1).unwrap();
        sim.write32(reg, 2).unwrap();
        assert!(sim.write32(reg, 3).is_err());
        assert!(sim.write32(reg, 4).is_err());
        assert_eq!(sim.register(reg), 2);
    }

    #[test]
    fn read_fault_leaves_other_registers() {
        let mut sim = npu1();
        let reg = addr(TileLoc::shim(0), PL_EVENTS.broadcast(0));
        let other = addr(TileLoc::shim(0), PL_EVENTS.broadcast(1));
        sim.inject_read_fault(reg);
        assert!(sim.read32(reg).is_err());
        sim.read32(other).unwrap();
        sim.clear_faults();
        sim.read32(reg).unwrap();
    }

    #[test]
    fn addresses_outside_partition_fail() {
        let mut sim = npu1();
        assert!(sim.read32(BASE - 4).is_err());
        assert!(sim.read32(addr(TileLoc::new(5, 0), 0)).is_err());
        assert!(sim.read32(addr(TileLoc::new(0, 6), 0)).is_err());
    }
}

//! Event generate and broadcast primitives

use crate::backend::RegisterIo;
use crate::device::DeviceContext;
use crate::error::{AieError, Result};
use aie_chip::{Event, Module, TileLoc, TranslateError};

impl<B: RegisterIo> DeviceContext<B> {
    /// Hardware number of `event` in `module` at `loc`
    ///
    /// # Errors
    ///
    /// Returns `InvalidTile` for an unsupported module, `InvalidArgument` if
    /// the event belongs to another module's range and
    /// `EventTranslationFailed` if the module has no number for it.
    pub fn translate_event(&self, loc: TileLoc, module: Module, event: Event) -> Result<u8> {
        let props = self.module_props(loc, module)?;
        props.event_table.translate(event).map_err(|e| match e {
            TranslateError::OutOfRange => {
                AieError::invalid_argument(format!("{event} is not a {module} module event"))
            }
            TranslateError::Unmapped => AieError::EventTranslationFailed { event, module },
        })
    }

    /// Abstract event carried by broadcast `channel` in `module` at `loc`
    ///
    /// # Errors
    ///
    /// Returns `InvalidTile` for an unsupported module and
    /// `InvalidArgument` for a channel above 15.
    pub fn broadcast_event_for_channel(&self, loc: TileLoc, module: Module, channel: u8) -> Result<Event> {
        let props = self.module_props(loc, module)?;
        check_channel(channel, props.events.num_broadcasts)?;
        Ok(props.event_table.broadcast_event(channel))
    }

    /// Drive broadcast `channel` from `event` in `module` at `loc`
    ///
    /// Broadcasting the module's `NONE` event clears the channel.
    ///
    /// # Errors
    ///
    /// Translation errors as [`DeviceContext::translate_event`], plus
    /// register access failures.
    pub fn broadcast_event(&mut self, loc: TileLoc, module: Module, channel: u8, event: Event) -> Result<()> {
        let props = self.module_props(loc, module)?;
        check_channel(channel, props.events.num_broadcasts)?;
        let number = self.translate_event(loc, module, event)?;
        let address = self.tile_address(loc) + u64::from(props.events.broadcast(channel));
        tracing::debug!("Broadcast channel {channel} at {loc} {module} <- event {number}");
        self.io.write32(address, u32::from(number))
    }

    /// Raise `event` in `module` at `loc`
    ///
    /// # Errors
    ///
    /// Translation errors as [`DeviceContext::translate_event`], plus
    /// register access failures.
    pub fn generate_event(&mut self, loc: TileLoc, module: Module, event: Event) -> Result<()> {
        let props = self.module_props(loc, module)?;
        let number = self.translate_event(loc, module, event)?;
        let address = self.tile_address(loc) + u64::from(props.events.generate);
        tracing::debug!("Generate event {number} at {loc} {module}");
        self.io.write32(address, u32::from(number))
    }
}

fn check_channel(channel: u8, num_broadcasts: u8) -> Result<()> {
    if channel >= num_broadcasts {
        return Err(AieError::invalid_argument(format!(
            "broadcast channel {channel} out of range (0..{num_broadcasts})"
        )));
    }
    Ok(())
}

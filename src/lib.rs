//! # mediacomp
//!
//! A base component runtime for media codec and filter nodes.
//!
//! A [`Component`] hosts one processing element (a decoder, an encoder, a
//! filter) behind a uniform control surface: a state machine driven by
//! queued commands, ports that own a fixed set of buffers, and pluggable
//! transports that move buffers between the client and the codec. The
//! codec itself plugs in as a [`Processor`].
//!
//! ## Features
//!
//! - **Single worker per component**: commands and data wake-ups are
//!   serialized on one thread; commands always run first
//! - **Tracked buffer ownership**: every header is tagged client,
//!   component or codec, and illegal hand-offs are refused
//! - **Pluggable transports**: a ring queue and a kanal channel are built in;
//!   more can be registered by name
//! - **Watermark trigger**: data processing runs when ports cross their
//!   watermarks, combined with any/all semantics
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use mediacomp::prelude::*;
//!
//! struct Passthrough;
//!
//! impl Processor for Passthrough {
//!     fn data_notify(&mut self, ctx: &ProcessContext) -> Result<()> {
//!         while let Some(header) = ctx.dequeue(0)? {
//!             ctx.send(header).map_err(|rejected| rejected.error)?;
//!         }
//!         Ok(())
//!     }
//! }
//!
//! let config = ComponentConfig::new("pass").with_port(PortConfig::input());
//! let component = Component::new(config, &DioRegistry::builtin(), Passthrough)?;
//! let mut events = component.subscribe();
//! component.send_command(Command::StateSet(State::Idle))?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod buffer;
pub mod component;
pub mod config;
pub mod dio;
pub mod error;
pub mod event;
pub mod metadata;
pub mod observability;
pub mod param;
pub mod port;
pub mod trigger;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::buffer::{BufferHeader, BufferId, Owner};
    pub use crate::component::{
        ALL_PORTS, Command, Completion, Component, PortTarget, ProcessContext, Processor, State,
    };
    pub use crate::config::{ComponentConfig, PortConfig};
    pub use crate::dio::{DioChannel, DioRegistry};
    pub use crate::error::{BufferRejected, Error, Result};
    pub use crate::event::{ClientCallbacks, CommandDone, ComponentEvent, EventReceiver};
    pub use crate::metadata::{BufferFlags, MarkData, Metadata};
    pub use crate::param::{ParamIndex, ParamValue, PortDefinition};
    pub use crate::port::{PortDirection, PortProps};
    pub use crate::trigger::NotifyMode;
}

pub use component::{Component, Processor, State};
pub use error::{BufferRejected, Error, Result};

//! # Replay HAL
//!
//! The contract between the command-graph runtime and a device backend.
//!
//! This crate owns no behavior of its own. It defines:
//!
//! - typed native handles and device addresses
//! - the error taxonomy and public result codes
//! - device capability reporting
//! - the descriptors passed to native command-list primitives
//! - the [`NativeDevice`] trait family a backend implements
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        replay-hal                           │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐  │
//! │  │   Traits    │  │   Types     │  │  Error / ResultCode │  │
//! │  │  (Events,   │  │ (Handle,    │  │                     │  │
//! │  │   Lists)    │  │  GpuAddr)   │  │                     │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

// =============================================================================
// MODULE EXPORTS
// =============================================================================

pub mod caps;
pub mod command;
pub mod error;
pub mod traits;
pub mod types;

// Re-exports for convenience
pub use caps::*;
pub use command::*;
pub use error::{Error, Result, ResultCode};
pub use traits::*;
pub use types::*;

//! Shared tooltip visibility engine.
//!
//! One [`store::TooltipStore`] per running interface owns the single state
//! slot every tooltip instance coordinates through. Instances bind raw input
//! to machine events via [`binding::TooltipTrigger`]; the daemon and the
//! control client share the [`ipc`] and [`config`] types.

pub mod binding;
pub mod bus;
pub mod config;
pub mod geometry;
pub mod ids;
pub mod ipc;
pub mod machine;
pub mod placement;
pub mod store;
pub mod timer;

//! nbdkit export composition.
//!
//! An access plugin, zero or more content filters and an embedded qemu-img
//! command are combined into one nbdkit invocation.

mod export;
mod invocation;
mod plugin;

pub use export::ExportConfig;
pub use invocation::{build_args, ParsedInvocation, QemuImgCommand, NBD_PLACEHOLDER};
pub use plugin::{NbdkitFilter, NbdkitPlugin, RenderSource, SourceRenderers};

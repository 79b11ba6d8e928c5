//! CLI command implementations.

pub(crate) mod dev;
pub(crate) mod listen;
pub(crate) mod patch;

pub(crate) use dev::DevArgs;
pub(crate) use listen::ListenArgs;
pub(crate) use patch::PatchArgs;

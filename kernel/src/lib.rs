// Neoman Kernel
//
// Core of the Neovim version manager: the nightly ledger, directory
// resolution, eviction and the active-version switch.

pub mod activate;
pub mod adapters;
pub mod config;
pub mod ledger;
pub mod lock;
pub mod manager;
pub mod resolve;

use std::fmt;

use super::{load, DeferralModule, Loader};

/// Registration record for a [`DeferralModule`]
#[derive(Clone, Copy)]
pub struct ModuleEntry {
    pub name: &'static str,
    pub(crate) loader: Loader,
}

impl ModuleEntry {
    pub fn of<M: DeferralModule>() -> Self {
        Self {
            name: M::NAME,
            loader: load::<M>,
        }
    }
}

impl fmt::Debug for ModuleEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleEntry").field("name", &self.name).finish()
    }
}

/// Global distributed slice of discoverable modules
///
/// Populated by `#[deferral_module]`. Entries are picked up by
/// [`ModuleHostBuilder::discover`](super::ModuleHostBuilder::discover).
#[linkme::distributed_slice]
pub static MODULES: [fn() -> ModuleEntry] = [..];

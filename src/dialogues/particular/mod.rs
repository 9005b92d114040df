pub mod credentials;
pub mod denylist;
pub mod lots;

use crate::prelude::*;
use teloxide::prelude::*;

pub fn handler() -> HandlerResult {
    dptree::entry()
        .branch(denylist::handler())
        .branch(credentials::handler())
        .branch(lots::handler())
}

pub fn write_deps(deps: &mut DependencyMap) {
    denylist::write_deps(deps);
    credentials::write_deps(deps);
    lots::write_deps(deps);
}

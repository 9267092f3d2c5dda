//! Hand-written bindings for a handful of CDP domains: `Browser`, `Target`,
//! `Page`, `Runtime`. This is not a PDL-driven generator pulling down the
//! full `browser_protocol`/`js_protocol` surface — it is the small,
//! explicitly non-exhaustive set of commands and events the rest of this
//! workspace's scenarios actually exercise. Add a domain here the same way:
//! a command struct implementing `cdpdrive_types::Command`, a result struct
//! it names as `Response`, and, for anything pushed as an event, a struct
//! implementing `cdpdrive_types::Event` with its wire method name as `NAME`.

pub mod browser;
pub mod page;
pub mod runtime;
pub mod target;

pub use browser::*;
pub use page::*;
pub use runtime::*;
pub use target::*;

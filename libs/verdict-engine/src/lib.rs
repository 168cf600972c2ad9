pub mod capture;
pub mod comparator;
pub mod context;
pub mod detector;
pub mod error;
pub mod executor;
pub mod invoker;
pub mod runner;
pub mod worker;


pub use comparator::Comparator;
pub use detector::{detect, detect_entry_point, EntryPoint, EntryPointKind};
pub use error::{ContextError, EngineError, InvokeError};
pub use executor::Engine;

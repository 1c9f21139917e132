//! Versioned logic-module loading: contract, registry, and scanner.

pub mod contract;
pub mod registry;
pub mod scanner;

pub use contract::{BoxLogicModule, LogicModule, ModuleInfo, ModuleLoader};
pub use registry::ModuleRegistry;
pub use scanner::{ModuleScanner, ScanChange, ScanChangeKind};

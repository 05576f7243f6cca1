pub use semantic::*;

mod semantic;

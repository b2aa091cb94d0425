pub mod policy;
pub mod reports;
pub mod simulation;
pub mod tester;

pub use policy::Strategy;
pub use tester::*;

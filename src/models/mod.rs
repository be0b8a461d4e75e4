pub mod appointment;
pub mod enums;
pub mod filters;
pub mod payment;
pub mod prescription;
pub mod schedule;
pub mod user;

pub use appointment::*;
pub use filters::*;
pub use lab_test::*;
pub use payment::*;
pub use prescription::*;
pub use schedule::*;
pub use user::*;

//! Core data types: enums, quotes and bars, instruments, and the order family
//! (request → working order → position → deal).

pub mod enums;
pub mod instrument;
pub mod market_data;
pub mod trading;

pub use enums::*;
pub use instrument::*;
pub use market_data::*;
pub use trading::*;

//! Background loops for continuous processing.

pub mod directory_refresh_loop;

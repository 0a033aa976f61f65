pub mod image;
pub mod math;
pub mod io;

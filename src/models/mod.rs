pub mod coordinate;
pub mod courier;
pub mod marker;
pub mod package;
pub mod session;

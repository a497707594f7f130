pub mod chord;
pub mod console;
pub mod discovery;
pub mod error;
pub mod network;
pub mod upload;

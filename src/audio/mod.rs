pub mod output;

pub use output::{output_device_names, RodioHost};

mod color;
mod decoder;
mod encoder;

pub use color::Rgb;
pub use decoder::{decode_frame, decode_image};
pub use encoder::{encode, export_png, suggested_filename, EncodeError, EncodeOptions, MAX_EDGE};

#![doc = include_str!(concat!("../", env!("CARGO_PKG_README")))]

#[doc(inline)]
pub use vision_union_image as image;

#[doc(inline)]
pub use vision_union_imgproc as imgproc;

pub mod conv;
pub mod dropout;
pub mod layer;
pub mod linear;
pub mod normalization;
pub mod param;
pub mod pooling;
pub mod relu;

pub use conv::Conv2d;
pub use dropout::Dropout;
pub use layer::Layer;
pub use linear::Linear;
pub use normalization::BatchNorm;
pub use param::{Param, ParamState};
pub use pooling::MaxPool2d;
pub use relu::ReLU;

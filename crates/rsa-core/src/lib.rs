#![deny(warnings)]
pub mod fit;
pub mod infer;
pub mod model;
pub mod rsa;

pub mod classifier;
pub mod controller;

pub use classifier::{Classification, Classifier, HttpClassifier};
pub use controller::RelayController;

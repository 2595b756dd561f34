pub mod clock;
pub mod db;
pub mod device;

pub use clock::SystemClock;
pub use db::DbAdapter;
pub use device::{SubmittedLocation, SubmittedPhoto};

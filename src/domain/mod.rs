//! Plain domain types, independent of how they are stored.
//!
//! These mirror the entities of spec.md §3 one-to-one; the `store::entities` module
//! holds the SeaORM row shapes and converts to/from these.

mod asset;
mod caption;
mod embedding;
pub mod face;
mod person;
mod task;

pub use asset::{Asset, AssetStatus};
pub use caption::{Caption, CaptionStyle, MAX_GENERATED_CAPTION_VARIANTS};
pub use embedding::{Embedding, Modality};
pub use face::{BoundingBox, FaceDetection};
pub use person::Person;
pub use task::{ReclusterScope, Task, TaskState, TaskType};
